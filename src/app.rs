use std::path::PathBuf;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, TryRecvError};
use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::Rng;

use crate::ai::{AiClient, AiEvent};
use crate::chat::{Conversation, InputHistory};
use crate::commands::{Command, HELP_ENTRIES};
use crate::config::{Config, RainColor, ALLOWED_MODELS};
use crate::rain::layout::FOOTER_ROWS;
use crate::rain::{Grid, Phase, RevealEngine};
use crate::terminal::{Paint, Screen};

pub const INPUT_PREFIX: &str = "Type your message: ";
pub const STATUS_TTL: Duration = Duration::from_secs(3);

pub const WELCOME: &str = "Welcome to the Matrix. I'm Trinity.

Follow the white rabbit. Or just type your questions below.

Useful commands:
- /help : Show full help
- /q : Exit program

Type your message and press Enter to start.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome { Continue, Quit }

pub struct App<R: Rng = StdRng> {
    engine:       RevealEngine<R>,
    config:       Config,
    config_path:  Option<PathBuf>,
    conversation: Conversation,
    history:      InputHistory,
    input:        String,
    pending:      Option<Receiver<AiEvent>>,
    progress:     String,
    status:       Option<(String, Instant)>,
    help_open:    bool,
    grid:         Grid,
    last_tick:    Instant,
}

impl<R: Rng> App<R> {
    /// `config_path` is where reconfiguration is persisted; `None` keeps changes in memory.
    pub fn new(config: Config, config_path: Option<PathBuf>, engine: RevealEngine<R>, grid: Grid) -> Self {
        let mut app = Self {
            conversation: Conversation::new(config.system_prompt.clone()),
            engine, config, config_path,
            history: InputHistory::default(), input: String::new(),
            pending: None, progress: String::new(), status: None, help_open: false,
            grid, last_tick: Instant::now(),
        };
        app.announce(WELCOME);
        app
    }

    pub fn engine(&self) -> &RevealEngine<R> { &self.engine }
    pub fn config(&self) -> &Config { &self.config }
    pub fn conversation(&self) -> &Conversation { &self.conversation }
    pub fn input(&self) -> &str { &self.input }
    pub fn is_waiting(&self) -> bool { self.pending.is_some() }
    pub fn help_open(&self) -> bool { self.help_open }
    pub fn status(&self) -> Option<&str> { self.status.as_ref().map(|(s, _)| s.as_str()) }

    /// Hands `text` to the reveal engine, replacing whatever is on screen.
    pub fn announce(&mut self, text: &str) {
        self.engine.submit(text, self.grid);
    }

    /// Applies a configuration change and persists it.
    pub fn reconfigure(&mut self, change: impl FnOnce(&mut Config)) {
        change(&mut self.config);
        if let Some(path) = &self.config_path {
            if let Err(e) = self.config.save_to(path) {
                warn!("could not save config to {}: {e}", path.display());
            }
        }
    }

    fn set_status(&mut self, text: impl Into<String>) {
        self.status = Some((text.into(), Instant::now()));
    }

    fn max_input_len(&self) -> usize {
        self.grid.width.saturating_sub(INPUT_PREFIX.len() + 5)
    }

    pub fn resize(&mut self, width: usize, height: usize) {
        self.grid = Grid::new(width, height);
        self.engine.resize(self.grid);
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Outcome {
        if key.kind == KeyEventKind::Release { return Outcome::Continue; }
        if key.modifiers.contains(KeyModifiers::CONTROL) && matches!(key.code, KeyCode::Char('c') | KeyCode::Char('d')) {
            return Outcome::Quit;
        }
        if self.help_open {
            self.help_open = false;
            return Outcome::Continue;
        }
        match key.code {
            KeyCode::Enter => return self.submit_line(),
            _ if self.is_waiting() => {}
            KeyCode::Backspace => { self.input.pop(); }
            KeyCode::Up => self.input = self.history.previous(&self.input),
            KeyCode::Down => self.input = self.history.next(&self.input),
            KeyCode::Char(c) if !c.is_control() => {
                if self.input.chars().count() < self.max_input_len() { self.input.push(c); }
            }
            _ => {}
        }
        Outcome::Continue
    }

    pub fn submit_line(&mut self) -> Outcome {
        if self.input.trim().is_empty() || self.is_waiting() { return Outcome::Continue; }
        let line = std::mem::take(&mut self.input).trim().to_string();
        match Command::parse(&line) {
            Command::Quit => return Outcome::Quit,
            Command::Help => {
                self.history.push(&line);
                self.help_open = true;
            }
            Command::Clear => {
                self.history.push(&line);
                self.conversation.clear();
                self.announce("Conversation history cleared.");
            }
            Command::Save => {
                self.history.push(&line);
                let path = self.config.history_file.clone();
                let msg = match self.conversation.save_to(&path) {
                    Ok(()) => format!("Conversation saved to {}", path.display()),
                    Err(e) => format!("Error saving conversation: {e:#}"),
                };
                self.announce(&msg);
            }
            Command::Model(name) => {
                self.history.push(&line);
                if ALLOWED_MODELS.contains(&name.as_str()) {
                    info!("model changed to {name}");
                    self.reconfigure(|c| c.model = name.clone());
                    self.announce(&format!("Model changed to {name}."));
                } else {
                    self.announce(&format!("Model not recognized. Available models: {}", ALLOWED_MODELS.join(", ")));
                }
            }
            Command::Color(name) => {
                self.history.push(&line);
                match RainColor::parse(&name) {
                    Some(color) => {
                        self.reconfigure(|c| c.rain_color = color);
                        self.announce(&format!("Matrix color changed to {}.", color.name()));
                    }
                    None => self.announce(&format!("Color not recognized. Available colors: {}", RainColor::names())),
                }
            }
            Command::System => {
                self.history.push(&line);
                let info = self.system_info();
                self.announce(&info);
            }
            Command::Prompt(text) => {
                self.history.push(&line);
                self.conversation.push_user(text.as_str());
                let client = AiClient::from_config(&self.config);
                let (tx, rx) = unbounded();
                client.send_async(self.conversation.to_request(), self.config.request_max_tokens(&text), tx);
                self.await_reply(rx);
            }
        }
        Outcome::Continue
    }

    /// Starts waiting on a request worker. The tick loop drains it through `poll_reply`.
    pub fn await_reply(&mut self, rx: Receiver<AiEvent>) {
        self.pending = Some(rx);
        self.progress = "Waiting for response...".into();
    }

    /// Drains worker events without blocking. Returns true when a reply or failure landed.
    pub fn poll_reply(&mut self) -> bool {
        let Some(rx) = self.pending.take() else { return false };
        loop {
            match rx.try_recv() {
                Ok(AiEvent::Retrying { attempt, max }) => {
                    self.progress = format!("Connection error. Retrying ({attempt}/{max})...");
                }
                Ok(AiEvent::Reply(text)) => {
                    self.conversation.push_assistant(text.as_str());
                    self.announce(&text);
                    return true;
                }
                Ok(AiEvent::Failed(msg)) => {
                    self.set_status("Error: request failed");
                    self.announce(&msg);
                    return true;
                }
                Err(TryRecvError::Empty) => {
                    self.pending = Some(rx);
                    return false;
                }
                Err(TryRecvError::Disconnected) => {
                    self.set_status("Error: request worker stopped");
                    return true;
                }
            }
        }
    }

    /// Advances the animation when a frame interval has passed. Returns true if it did.
    pub fn tick(&mut self, now: Instant) -> bool {
        if let Some((_, at)) = &self.status {
            if now.saturating_duration_since(*at) > STATUS_TTL { self.status = None; }
        }
        if now.saturating_duration_since(self.last_tick) < self.engine.config().frame_interval { return false; }
        self.last_tick = now;
        self.engine.tick();
        true
    }

    pub fn system_info(&self) -> String {
        format!(
            "Terminal: {}x{} characters\nCurrent model: {}\nMaximum tokens: {}\nHistory: {} messages\nAPI Key: {}",
            self.grid.width, self.grid.height, self.config.model, self.config.max_tokens,
            self.conversation.message_count(),
            if self.config.api_key().is_some() { "Configured" } else { "Not configured" },
        )
    }

    pub fn draw(&mut self, screen: &mut Screen) {
        self.engine.render(screen);
        self.draw_footer(screen);
        if self.help_open { draw_help(screen); }
    }

    fn draw_footer(&self, screen: &mut Screen) {
        let (w, h) = (screen.width(), screen.height());
        if h < FOOTER_ROWS { return; }
        let top = h - FOOTER_ROWS;
        screen.fill_rows(top, h);
        screen.draw_box(top, 0, w, FOOTER_ROWS, Paint::Plain);
        if let Some((status, _)) = &self.status {
            let room = w.saturating_sub(10);
            let clipped: String = status.chars().take(room).collect();
            screen.put_str(top, 5, &clipped, Paint::Status);
        }
        if self.is_waiting() {
            screen.put_str(top + 1, 2, &self.progress, Paint::Plain);
        } else {
            let end = screen.put_str(top + 1, 2, INPUT_PREFIX, Paint::Plain);
            screen.put_str(top + 1, end, &self.input, Paint::Heading);
        }
        if self.engine.phase() == Phase::Running && w > 12 {
            screen.put_str(top + 1, w - 12, "decoding", Paint::Status);
        }
    }
}

fn draw_help(screen: &mut Screen) {
    let (w, h) = (60.min(screen.width()), 16.min(screen.height()));
    let top = (screen.height() - h) / 2;
    let left = (screen.width() - w) / 2;
    for row in top..top + h {
        for col in left..left + w { screen.put_char(row, col, ' ', Paint::Plain); }
    }
    screen.draw_box(top, left, w, h, Paint::Border);
    screen.put_str(top + 1, left + w.saturating_sub(16) / 2, "MATRIX CHAT HELP", Paint::Heading);
    screen.put_str(top + 3, left + 2, "Available commands:", Paint::Plain);
    for (i, (cmd, desc)) in HELP_ENTRIES.iter().enumerate() {
        screen.put_str(top + 4 + i, left + 4, cmd, Paint::Text);
        screen.put_str(top + 4 + i, left + 18, desc, Paint::Plain);
    }
    screen.put_str(top + 12, left + 2, "Navigation keys:", Paint::Plain);
    screen.put_str(top + 13, left + 4, "Up/Down arrows", Paint::Text);
    screen.put_str(top + 13, left + 25, "Navigate through history", Paint::Plain);
    screen.put_str(top + h.saturating_sub(2), left + 4, "Press any key to continue...", Paint::Status);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rain::EngineConfig;
    use rand::SeedableRng;

    fn app_with(config: Config, path: Option<PathBuf>) -> App<StdRng> {
        let engine = RevealEngine::with_rng(EngineConfig::default(), StdRng::seed_from_u64(42));
        App::new(config, path, engine, Grid::new(80, 24))
    }

    fn app() -> App<StdRng> { app_with(Config::default(), None) }

    fn press(app: &mut App<StdRng>, code: KeyCode) -> Outcome {
        app.handle_key(KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_line(app: &mut App<StdRng>, line: &str) -> Outcome {
        for c in line.chars() { press(app, KeyCode::Char(c)); }
        press(app, KeyCode::Enter)
    }

    #[test]
    fn starts_with_the_welcome_animation() {
        let app = app();
        assert_eq!(app.engine().phase(), Phase::Running);
        assert_eq!(app.engine().source_text(), WELCOME);
    }

    #[test]
    fn quit_command_and_ctrl_c_exit() {
        let mut a = app();
        assert_eq!(type_line(&mut a, "/q"), Outcome::Quit);
        let mut b = app();
        assert_eq!(b.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)), Outcome::Quit);
    }

    #[test]
    fn unknown_model_is_explained() {
        let mut a = app();
        type_line(&mut a, "/model llama");
        assert!(a.engine().source_text().starts_with("Model not recognized."));
        assert_eq!(a.config().model, "gpt-3.5-turbo");
    }

    #[test]
    fn reconfiguration_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut a = app_with(Config::default(), Some(path.clone()));
        type_line(&mut a, "/model gpt-4");
        assert_eq!(a.engine().source_text(), "Model changed to gpt-4.");
        type_line(&mut a, "/color Magenta");
        assert_eq!(a.engine().source_text(), "Matrix color changed to magenta.");
        let saved = Config::load_from(&path);
        assert_eq!(saved.model, "gpt-4");
        assert_eq!(saved.rain_color, RainColor::Magenta);
    }

    #[test]
    fn unknown_color_lists_the_choices() {
        let mut a = app();
        type_line(&mut a, "/color plaid");
        assert_eq!(
            a.engine().source_text(),
            "Color not recognized. Available colors: green, red, blue, cyan, magenta, yellow, white"
        );
    }

    #[test]
    fn help_overlay_closes_on_any_key() {
        let mut a = app();
        type_line(&mut a, "/help");
        assert!(a.help_open());
        let mut screen = Screen::new(80, 24);
        a.draw(&mut screen);
        assert!((0..24).any(|r| screen.row_text(r).contains("MATRIX CHAT HELP")));
        press(&mut a, KeyCode::Char('x'));
        assert!(!a.help_open());
        assert_eq!(a.input(), "");
    }

    #[test]
    fn arrows_walk_the_input_history() {
        let mut a = app();
        type_line(&mut a, "/system");
        type_line(&mut a, "/clear");
        press(&mut a, KeyCode::Up);
        assert_eq!(a.input(), "/clear");
        press(&mut a, KeyCode::Up);
        assert_eq!(a.input(), "/system");
        press(&mut a, KeyCode::Down);
        press(&mut a, KeyCode::Down);
        assert_eq!(a.input(), "");
    }

    #[test]
    fn system_info_reports_state() {
        let mut a = app();
        type_line(&mut a, "/system");
        let text = a.engine().source_text().to_string();
        assert!(text.starts_with("Terminal: 80x24 characters\nCurrent model: gpt-3.5-turbo\nMaximum tokens: 150\nHistory: 0 messages"));
    }

    #[test]
    fn save_reports_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("chat.txt");
        let mut a = app_with(Config { history_file: file.clone(), ..Config::default() }, None);
        type_line(&mut a, "/save");
        assert_eq!(a.engine().source_text(), format!("Conversation saved to {}", file.display()));
        assert!(file.exists());
    }

    #[test]
    fn replies_are_handed_to_the_engine() {
        let mut a = app();
        let (tx, rx) = unbounded();
        a.await_reply(rx);
        assert!(a.is_waiting());
        press(&mut a, KeyCode::Char('z'));
        press(&mut a, KeyCode::Up);
        press(&mut a, KeyCode::Backspace);
        assert_eq!(a.input(), "");
        assert!(!a.poll_reply());

        tx.send(AiEvent::Retrying { attempt: 1, max: 2 }).unwrap();
        assert!(!a.poll_reply());
        let mut screen = Screen::new(80, 24);
        a.draw(&mut screen);
        assert!(screen.row_text(22).contains("Connection error. Retrying (1/2)..."));

        tx.send(AiEvent::Reply("Dodge this.".into())).unwrap();
        assert!(a.poll_reply());
        assert!(!a.is_waiting());
        assert_eq!(a.engine().source_text(), "Dodge this.");
        assert_eq!(a.engine().phase(), Phase::Running);
        assert_eq!(a.conversation().messages().last().unwrap().content, "Dodge this.");
    }

    #[test]
    fn failures_are_animated_like_replies() {
        let mut a = app();
        let (tx, rx) = unbounded();
        a.await_reply(rx);
        tx.send(AiEvent::Failed("Error connecting to the completion service: request timed out".into())).unwrap();
        assert!(a.poll_reply());
        assert_eq!(a.status(), Some("Error: request failed"));
        assert!(a.engine().source_text().ends_with("request timed out"));
    }

    #[test]
    fn the_input_line_is_frozen_while_waiting() {
        let mut a = app();
        type_line(&mut a, "/system");
        for c in "draft".chars() { press(&mut a, KeyCode::Char(c)); }
        let (tx, rx) = unbounded();
        a.await_reply(rx);
        press(&mut a, KeyCode::Backspace);
        press(&mut a, KeyCode::Up);
        press(&mut a, KeyCode::Down);
        assert_eq!(a.input(), "draft");

        tx.send(AiEvent::Reply("ok".into())).unwrap();
        a.poll_reply();
        press(&mut a, KeyCode::Backspace);
        assert_eq!(a.input(), "draf");
        press(&mut a, KeyCode::Up);
        assert_eq!(a.input(), "/system");
    }

    #[test]
    fn dropped_workers_release_the_input() {
        let mut a = app();
        let (tx, rx) = unbounded::<AiEvent>();
        a.await_reply(rx);
        drop(tx);
        assert!(a.poll_reply());
        assert!(!a.is_waiting());
    }

    #[test]
    fn ticks_follow_the_frame_interval_and_status_expires() {
        let mut a = app();
        let t0 = Instant::now() + Duration::from_millis(50);
        assert!(a.tick(t0));
        assert!(!a.tick(t0 + Duration::from_millis(10)));
        assert!(a.tick(t0 + Duration::from_millis(40)));
        assert_eq!(a.engine().ticks(), 2);

        a.set_status("hello");
        a.tick(Instant::now() + Duration::from_secs(4));
        assert_eq!(a.status(), None);
    }

    #[test]
    fn footer_shows_the_prompt_and_input() {
        let mut a = app();
        for c in "hi".chars() { press(&mut a, KeyCode::Char(c)); }
        let mut screen = Screen::new(80, 24);
        a.draw(&mut screen);
        assert!(screen.row_text(21).starts_with("┌"));
        assert!(screen.row_text(22).starts_with("│ Type your message: hi"));
        assert!(screen.row_text(23).starts_with("└"));
    }

    #[test]
    fn input_length_is_bounded_by_the_box() {
        let mut a = app();
        for _ in 0..200 { press(&mut a, KeyCode::Char('a')); }
        assert_eq!(a.input().len(), 80 - INPUT_PREFIX.len() - 5);
    }
}
