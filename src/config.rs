use std::path::{Path, PathBuf};

use log::warn;
use serde::{Deserialize, Serialize};

pub const ALLOWED_MODELS: [&str; 3] = ["gpt-3.5-turbo", "gpt-4", "gpt-4-turbo"];

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Trinity from The Matrix. Respond as if you are this character - \
    cool, direct, and technically knowledgeable. You have a slight edge to your personality, but you're helpful. \
    If asked about who you are, mention you're Trinity from The Matrix. \
    Keep your responses concise and efficient, like Trinity would.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RainColor { Green, Red, Blue, Cyan, Magenta, Yellow, White }

impl RainColor {
    pub const ALL: [RainColor; 7] = [
        RainColor::Green, RainColor::Red, RainColor::Blue, RainColor::Cyan,
        RainColor::Magenta, RainColor::Yellow, RainColor::White,
    ];
    pub fn name(self) -> &'static str {
        match self {
            RainColor::Green   => "green",
            RainColor::Red     => "red",
            RainColor::Blue    => "blue",
            RainColor::Cyan    => "cyan",
            RainColor::Magenta => "magenta",
            RainColor::Yellow  => "yellow",
            RainColor::White   => "white",
        }
    }
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|c| c.name() == name)
    }
    pub fn names() -> String {
        Self::ALL.iter().map(|c| c.name()).collect::<Vec<_>>().join(", ")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub endpoint:             String,
    pub model:                String,
    pub api_key_env:          String,
    pub system_prompt:        String,
    pub max_tokens:           u32,
    pub max_tokens_cap:       u32,
    pub temperature:          f32,
    pub max_retries:          u32,
    pub retry_delay_ms:       u64,
    pub request_timeout_secs: u64,
    pub max_reply_chars:      usize,
    pub rain_color:           RainColor,
    pub text_color:           RainColor,
    pub history_file:         PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint:             "https://api.openai.com/v1".into(),
            model:                ALLOWED_MODELS[0].into(),
            api_key_env:          "OPENAI_API_KEY".into(),
            system_prompt:        DEFAULT_SYSTEM_PROMPT.into(),
            max_tokens:           150,
            max_tokens_cap:       300,
            temperature:          0.7,
            max_retries:          2,
            retry_delay_ms:       2000,
            request_timeout_secs: 60,
            max_reply_chars:      1000,
            rain_color:           RainColor::Green,
            text_color:           RainColor::White,
            history_file:         PathBuf::from("matrix_chat_history.txt"),
        }
    }
}

impl Config {
    pub fn load() -> Self { Self::load_from(&Self::path()) }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(data) => serde_json::from_str::<Config>(&data).unwrap_or_else(|e| {
                warn!("ignoring unreadable config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() { std::fs::create_dir_all(dir)?; }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn path() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join("trinity").join("config.json")
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.trim().is_empty())
    }

    /// Token budget for a request, growing with the length of the user's prompt.
    pub fn request_max_tokens(&self, prompt: &str) -> u32 {
        let estimate = (prompt.chars().count() / 4) as u32;
        (self.max_tokens + estimate).min(self.max_tokens_cap)
    }
}
