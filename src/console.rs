use std::io::{self, BufRead, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    SingleGame,
    AllGames,
    CachedRefresh,
    GlobalStats,
}

impl Mode {
    pub const ALL: [Self; 4] = [
        Self::SingleGame,
        Self::AllGames,
        Self::CachedRefresh,
        Self::GlobalStats,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::SingleGame => "One game",
            Self::AllGames => "All games",
            Self::CachedRefresh => "Cached games",
            Self::GlobalStats => "Global stats",
        }
    }

    pub fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "one-game" => Some(Self::SingleGame),
            "all-games" => Some(Self::AllGames),
            "cached" => Some(Self::CachedRefresh),
            "stats" => Some(Self::GlobalStats),
            _ => None,
        }
    }

    /// Whether this mode cannot do anything useful without an API key.
    pub const fn needs_network(self) -> bool {
        matches!(self, Self::SingleGame | Self::AllGames)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    Run(Mode),
    Quit,
}

/// Numbered prompts over any reader/writer pair. `None` means end of input.
pub struct Console<R, W> {
    input: R,
    output: W,
}

impl Console<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> Console<R, W> {
    pub const fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn say(&mut self, text: &str) -> io::Result<()> {
        writeln!(self.output, "{text}")?;
        self.output.flush()
    }

    pub fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{label}: ")?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    /// Asks until the answer is one of the listed numbers. Returns the
    /// 0-based index.
    pub fn choose(&mut self, title: &str, options: &[String]) -> io::Result<Option<usize>> {
        writeln!(self.output, "\n{title}")?;
        for (i, option) in options.iter().enumerate() {
            writeln!(self.output, "{}. {option}", i + 1)?;
        }

        loop {
            let Some(answer) = self.prompt("\nChoose an option")? else {
                return Ok(None);
            };
            match answer.parse::<usize>() {
                Ok(n) if (1..=options.len()).contains(&n) => return Ok(Some(n - 1)),
                _ => writeln!(self.output, "Enter a number between 1 and {}", options.len())?,
            }
        }
    }

    pub fn menu(&mut self) -> io::Result<MenuChoice> {
        let mut options: Vec<String> = Mode::ALL.iter().map(|m| m.label().to_string()).collect();
        options.push("Quit".to_string());

        Ok(match self.choose("Select mode", &options)? {
            Some(i) if i < Mode::ALL.len() => MenuChoice::Run(Mode::ALL[i]),
            _ => MenuChoice::Quit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console(input: &str) -> Console<&[u8], Vec<u8>> {
        Console::new(input.as_bytes(), Vec::new())
    }

    #[test]
    fn menu_maps_numbers_to_modes() {
        assert_eq!(
            console("2\n").menu().unwrap(),
            MenuChoice::Run(Mode::AllGames)
        );
        assert_eq!(
            console("4\n").menu().unwrap(),
            MenuChoice::Run(Mode::GlobalStats)
        );
        assert_eq!(console("5\n").menu().unwrap(), MenuChoice::Quit);
    }

    #[test]
    fn invalid_answers_are_asked_again() {
        let mut console = console("0\nabc\n3\n");
        assert_eq!(
            console.menu().unwrap(),
            MenuChoice::Run(Mode::CachedRefresh)
        );
        let shown = String::from_utf8(console.output).unwrap();
        assert_eq!(shown.matches("Enter a number between 1 and 5").count(), 2);
    }

    #[test]
    fn end_of_input_quits() {
        assert_eq!(console("").menu().unwrap(), MenuChoice::Quit);
    }

    #[test]
    fn prompt_trims_the_answer() {
        let mut console = console("  76561198142605500  \n");
        assert_eq!(
            console.prompt("Steam ID").unwrap().as_deref(),
            Some("76561198142605500")
        );
        assert_eq!(console.prompt("again").unwrap(), None);
    }

    #[test]
    fn mode_args_match_cli_values() {
        for (arg, mode) in [
            ("one-game", Mode::SingleGame),
            ("all-games", Mode::AllGames),
            ("cached", Mode::CachedRefresh),
            ("stats", Mode::GlobalStats),
        ] {
            assert_eq!(Mode::from_arg(arg), Some(mode));
        }
        assert!(Mode::AllGames.needs_network());
        assert!(!Mode::GlobalStats.needs_network());
    }
}
