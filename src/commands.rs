use lazy_static::lazy_static;
use regex::Regex;

pub const EXIT_COMMAND: &str = "/q";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    Help,
    Clear,
    Save,
    System,
    Model(String),
    Color(String),
    Prompt(String),
}

lazy_static! {
    static ref WITH_ARG: Regex = Regex::new(r"^/(model|color)\s+(\S.*)$").unwrap();
}

pub const HELP_ENTRIES: [(&str, &str); 7] = [
    (EXIT_COMMAND,    "Exit program"),
    ("/help",         "Show this help"),
    ("/clear",        "Clear conversation history"),
    ("/save",         "Save conversation to file"),
    ("/model [name]", "Change model (gpt-3.5-turbo, gpt-4, ...)"),
    ("/system",       "Show system information"),
    ("/color [name]", "Change rain color (green, red, blue, ...)"),
];

impl Command {
    /// Interprets one submitted line. Anything that isn't a known command is a prompt.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line {
            EXIT_COMMAND => return Command::Quit,
            "/help"      => return Command::Help,
            "/clear"     => return Command::Clear,
            "/save"      => return Command::Save,
            "/system"    => return Command::System,
            _ => {}
        }
        if let Some(caps) = WITH_ARG.captures(line) {
            let arg = caps[2].trim().to_string();
            return match &caps[1] {
                "model" => Command::Model(arg),
                _       => Command::Color(arg),
            };
        }
        Command::Prompt(line.to_string())
    }
}
