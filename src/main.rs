use clap::ArgMatches;
use playtime_ratio::cache::CacheStore;
use playtime_ratio::config::{Credential, Settings, API_KEY_ENV};
use playtime_ratio::console::{Console, MenuChoice, Mode};
use playtime_ratio::error::{AppError, Result};
use playtime_ratio::reconcile::{compute_global_stats, ReconcileOptions, Reconciler};
use playtime_ratio::steam::SteamClient;
use playtime_ratio::user::{known_accounts, Account, SteamId};
use playtime_ratio::{cli, report};
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const LOG_FILE: &str = "playtime-ratio.log";
const DEFAULT_CONFIG: &str = "config.yaml";

/// Ctrl-C while an operation runs asks it to stop and save; Ctrl-C while
/// idle (or a second one) exits immediately.
#[derive(Default)]
struct InterruptState {
    busy: AtomicBool,
    abort: Arc<AtomicBool>,
}

struct Session {
    settings: Settings,
    credential: Option<Credential>,
    account: Account,
    store: CacheStore,
    client: SteamClient,
    app_id: Option<u32>,
    interrupt: Arc<InterruptState>,
}

fn main() -> ExitCode {
    let matches = cli::build_command().get_matches();

    let settings = match load_settings(&matches) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("ERROR: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = init_logging(matches.get_count("verbose"), &settings.cache_dir) {
        eprintln!("ERROR: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let interrupt = Arc::new(InterruptState::default());
    if let Err(e) = install_interrupt_handler(Arc::clone(&interrupt)) {
        log::warn!("Ctrl-C will not save progress: {e}");
    }

    let credential = match Credential::resolve(
        matches.get_one::<String>("api_key").map(Path::new),
        std::env::var(API_KEY_ENV).ok(),
        &settings,
        Path::new(".env"),
    ) {
        Ok(credential) => credential,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    if credential.is_none() {
        log::warn!("{}", AppError::CredentialMissing);
    }

    let client = match SteamClient::new(&settings.country) {
        Ok(client) => client,
        Err(e) => {
            log::error!("Cannot create HTTP client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mode = matches
        .get_one::<String>("mode")
        .and_then(|m| Mode::from_arg(m));
    let mut console = Console::stdio();

    let account = match resolve_account(
        &settings,
        credential.as_ref(),
        &client,
        mode.is_none().then_some(&mut console),
    ) {
        Ok(Some(account)) => account,
        Ok(None) => return ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    log::info!("Using account {account}");

    let session = Session {
        store: CacheStore::new(account.cache_folder(&settings.cache_dir)),
        settings,
        credential,
        account,
        client,
        app_id: matches.get_one::<u32>("app_id").copied(),
        interrupt,
    };

    if let Some(mode) = mode {
        return match session.run(mode, &mut console) {
            Ok(()) => ExitCode::SUCCESS,
            Err(AppError::Interrupted) => {
                log::warn!("{}", AppError::Interrupted);
                ExitCode::from(130)
            }
            Err(e) => {
                log::error!("{e}");
                ExitCode::FAILURE
            }
        };
    }

    loop {
        let choice = match console.menu() {
            Ok(choice) => choice,
            Err(e) => {
                log::error!("Cannot read from the terminal: {e}");
                return ExitCode::FAILURE;
            }
        };
        let MenuChoice::Run(mode) = choice else {
            return ExitCode::SUCCESS;
        };

        // errors end the operation, not the session
        match session.run(mode, &mut console) {
            Ok(()) => {}
            Err(AppError::Interrupted) => log::warn!("{}", AppError::Interrupted),
            Err(e) => log::error!("{e}"),
        }
    }
}

fn load_settings(matches: &ArgMatches) -> Result<Settings> {
    let mut settings = match matches.get_one::<String>("config") {
        Some(path) => Settings::load(Path::new(path))?,
        None if Path::new(DEFAULT_CONFIG).is_file() => Settings::load(Path::new(DEFAULT_CONFIG))?,
        None => Settings::default(),
    };

    if let Some(dir) = matches.get_one::<String>("cache_dir") {
        settings.cache_dir = PathBuf::from(dir);
    }
    if let Some(country) = matches.get_one::<String>("country") {
        settings.country = country.to_uppercase();
    }
    if let Some(id) = matches.get_one::<String>("steam_id") {
        settings.steam_id = Some(id.clone());
    }
    if let Some(name) = matches.get_one::<String>("name") {
        settings.account_name = Some(name.clone());
    }
    Ok(settings)
}

fn init_logging(verbosity: u8, cache_root: &Path) -> std::result::Result<(), String> {
    let term_level = match verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let config = ConfigBuilder::new()
        .set_thread_level(LevelFilter::Off)
        .add_filter_allow_str("playtime_ratio")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        term_level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));

    std::fs::create_dir_all(cache_root).map_err(|e| e.to_string())?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(cache_root.join(LOG_FILE))
        .map_err(|e| e.to_string())?;
    loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));

    CombinedLogger::init(loggers).map_err(|e| e.to_string())
}

fn install_interrupt_handler(state: Arc<InterruptState>) -> std::io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    std::thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if state.busy.load(Ordering::SeqCst) && !state.abort.swap(true, Ordering::SeqCst)
                    {
                        log::warn!("Interrupted; saving progress after the current request");
                    } else {
                        std::process::exit(130);
                    }
                }
            });
        })?;
    Ok(())
}

fn resolve_account<R: BufRead, W: Write>(
    settings: &Settings,
    credential: Option<&Credential>,
    client: &SteamClient,
    console: Option<&mut Console<R, W>>,
) -> Result<Option<Account>> {
    let known = known_accounts(&settings.cache_dir)?;

    if let Some(raw) = settings.steam_id.as_deref() {
        let steam_id = SteamId::parse(raw)?;
        if let Some(name) = settings.account_name.as_deref() {
            return Ok(Some(Account::new(name, steam_id)));
        }
        if let Some(account) = known.into_iter().find(|a| a.steam_id == steam_id) {
            return Ok(Some(account));
        }
        let name = credential
            .and_then(|c| match client.persona_name(c, &steam_id) {
                Ok(name) => Some(name),
                Err(e) => {
                    log::warn!("Could not look up the persona name: {e}");
                    None
                }
            })
            .unwrap_or_default();
        return Ok(Some(Account::new(&name, steam_id)));
    }

    let Some(console) = console else {
        return Err(AppError::Config(
            "no Steam ID given; use --steam-id or set steam_id in the config file".into(),
        ));
    };

    let mut options: Vec<String> = known.iter().map(ToString::to_string).collect();
    options.push("Add Steam ID".to_string());
    let Some(choice) = console.choose("Select Steam ID", &options)? else {
        return Ok(None);
    };
    if let Some(account) = known.get(choice) {
        return Ok(Some(account.clone()));
    }

    let Some(name) = console.prompt("Account name (only labels the cache folder)")? else {
        return Ok(None);
    };
    loop {
        let Some(raw) = console.prompt("Steam ID (17 digits)")? else {
            return Ok(None);
        };
        match SteamId::parse(&raw) {
            Ok(steam_id) => return Ok(Some(Account::new(&name, steam_id))),
            Err(e) => console.say(&e.to_string())?,
        }
    }
}

impl Session {
    fn run<R: BufRead, W: Write>(&self, mode: Mode, console: &mut Console<R, W>) -> Result<()> {
        self.interrupt.abort.store(false, Ordering::SeqCst);
        self.interrupt.busy.store(true, Ordering::SeqCst);
        let result = self.dispatch(mode, console);
        self.interrupt.busy.store(false, Ordering::SeqCst);
        result
    }

    fn dispatch<R: BufRead, W: Write>(&self, mode: Mode, console: &mut Console<R, W>) -> Result<()> {
        if mode.needs_network() && self.credential.is_none() {
            return Err(AppError::CredentialMissing);
        }

        let reconciler = Reconciler::new(
            &self.client,
            &self.client,
            &self.store,
            ReconcileOptions::from(&self.settings),
        )
        .with_abort_flag(Arc::clone(&self.interrupt.abort));
        let target = self.settings.target_ratio;

        match mode {
            Mode::SingleGame => {
                let Some(credential) = self.credential.as_ref() else {
                    return Err(AppError::CredentialMissing);
                };
                let mut cache = self.store.load()?;
                if cache.is_empty() {
                    return console.say(NO_CACHE).map_err(Into::into);
                }
                let app_id = match self.app_id {
                    Some(id) => id,
                    None => match pick_game(console, &cache)? {
                        Some(id) => id,
                        None => return Ok(()),
                    },
                };
                let record =
                    reconciler.refresh_one(&mut cache, app_id, &self.account.steam_id, credential)?;
                console.say(&report::render_game(&record, target))?;
            }
            Mode::AllGames => {
                let Some(credential) = self.credential.as_ref() else {
                    return Err(AppError::CredentialMissing);
                };
                let mut cache = self.store.load()?;
                let summary =
                    reconciler.refresh_all(&mut cache, &self.account.steam_id, credential)?;
                log::info!("{summary}");
                self.write_report(console, &cache)?;
            }
            Mode::CachedRefresh => {
                if !self.store.exists() {
                    return console.say(NO_CACHE).map_err(Into::into);
                }
                let mut cache = self.store.load()?;
                if self.credential.is_some() {
                    let summary = reconciler.refresh_cached(&mut cache)?;
                    log::info!("{summary}");
                } else {
                    log::warn!("No API key; reporting cached prices without refreshing them");
                }
                self.write_report(console, &cache)?;
            }
            Mode::GlobalStats => {
                let cache = self.store.load()?;
                if cache.is_empty() {
                    return console.say(NO_CACHE).map_err(Into::into);
                }
                console.say(&report::render_summary(&compute_global_stats(&cache)))?;
            }
        }
        Ok(())
    }

    fn write_report<R: BufRead, W: Write>(
        &self,
        console: &mut Console<R, W>,
        cache: &playtime_ratio::Cache,
    ) -> Result<()> {
        let stats = compute_global_stats(cache);
        let text = report::render_report(cache, &stats, self.settings.target_ratio);
        let path = self.store.write_report(&text)?;
        console.say(&report::render_summary(&stats))?;
        console.say(&format!("You will find the formatted stats in: {}", path.display()))?;
        Ok(())
    }
}

const NO_CACHE: &str = "No cached data for this account. Run \"All games\" first.";

fn pick_game<R: BufRead, W: Write>(
    console: &mut Console<R, W>,
    cache: &playtime_ratio::Cache,
) -> Result<Option<u32>> {
    let Some(query) = console.prompt("Game name or app id")? else {
        return Ok(None);
    };
    if let Ok(app_id) = query.parse::<u32>() {
        return Ok(Some(app_id));
    }

    let hits = cache.find_by_name(&query);
    match hits.as_slice() {
        [] => {
            console.say(&format!("No cached game matches {query:?}"))?;
            Ok(None)
        }
        [only] => Ok(Some(only.app_id)),
        many => {
            let shown = &many[..many.len().min(20)];
            let options: Vec<String> = shown
                .iter()
                .map(|g| format!("{} ({})", g.name, g.app_id))
                .collect();
            Ok(console
                .choose("Select game", &options)?
                .map(|i| shown[i].app_id))
        }
    }
}
