use clap::{command, value_parser, Arg, ArgAction, Command, ValueHint};

pub fn build_command() -> Command {
    command!().args([
        Arg::new("api_key")
            .short('k')
            .long("api-key")
            .alias("key")
            .required(false)
            .value_hint(ValueHint::FilePath)
            .value_name("PATH")
            .help("Path to a file containing a Steam API key."),
        Arg::new("config")
            .short('c')
            .long("config-file")
            .alias("config")
            .required(false)
            .value_hint(ValueHint::FilePath)
            .value_name("PATH")
            .help("Path to the YAML config file. Defaults to ./config.yaml when present."),
        Arg::new("steam_id")
            .long("steam-id")
            .alias("user")
            .required(false)
            .value_name("STEAM-ID")
            .help("17-digit Steam ID of the account to analyze."),
        Arg::new("name")
            .long("name")
            .required(false)
            .value_name("NAME")
            .help("Label for the account's cache folder. Defaults to the Steam persona name."),
        Arg::new("cache_dir")
            .long("cache-dir")
            .required(false)
            .value_hint(ValueHint::DirPath)
            .value_name("DIR")
            .help("Directory holding per-account caches and the log file."),
        Arg::new("country")
            .long("country")
            .required(false)
            .value_name("CC")
            .help("Store region used for prices, e.g. FR or US."),
        Arg::new("mode")
            .short('m')
            .long("mode")
            .required(false)
            .value_parser(["one-game", "all-games", "cached", "stats"])
            .help("Run a single operation and exit instead of showing the menu."),
        Arg::new("app_id")
            .long("app-id")
            .required_if_eq("mode", "one-game")
            .value_parser(value_parser!(u32))
            .value_name("APP-ID")
            .help("Game to refresh in one-game mode."),
        Arg::new("verbose")
            .short('v')
            .long("verbose")
            .action(ArgAction::Count)
            .help("Log more to the terminal (-v debug, -vv trace)."),
    ])
}
