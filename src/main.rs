use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{Clear, ClearType};
use log::{info, warn};

use trinity::app::{App, Outcome};
use trinity::config::Config;
use trinity::rain::{Grid, RevealEngine};
use trinity::terminal::{restore_terminal, Palette, Screen, TerminalGuard};

const INPUT_POLL: Duration = Duration::from_millis(10);

fn log_path() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("trinity").join("trinity.log")
}

/// Logs go to a file; the terminal belongs to the animation.
fn init_logging() {
    let path = log_path();
    if let Some(dir) = path.parent() { let _ = std::fs::create_dir_all(dir); }
    let Ok(file) = OpenOptions::new().create(true).append(true).open(&path) else { return };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Pipe(Box::new(file)))
        .init();
}

fn run(app: &mut App, screen: &mut Screen) -> Result<()> {
    let mut out = io::stdout();
    let mut dirty = true;
    loop {
        while event::poll(INPUT_POLL)? {
            match event::read()? {
                Event::Key(key) => {
                    if app.handle_key(key) == Outcome::Quit { return Ok(()); }
                    dirty = true;
                }
                Event::Resize(w, h) => {
                    let (w, h) = (w as usize, h as usize);
                    screen.resize(w, h);
                    app.resize(w, h);
                    execute!(out, Clear(ClearType::All))?;
                    dirty = true;
                }
                _ => {}
            }
        }
        dirty |= app.poll_reply();
        dirty |= app.tick(Instant::now());
        if dirty {
            app.draw(screen);
            screen.flush(&mut out, &Palette::from_config(app.config())).context("drawing frame")?;
            dirty = false;
        }
    }
}

fn main() -> Result<()> {
    init_logging();

    let config = Config::load();
    if config.api_key().is_none() {
        warn!("no API key in ${}; prompts will fail until it is set", config.api_key_env);
    }

    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic| {
        restore_terminal();
        default_hook(panic);
    }));

    let guard = TerminalGuard::enter().context("entering raw mode")?;
    let (width, height) = TerminalGuard::size().context("reading terminal size")?;
    info!("starting on a {width}x{height} terminal, model {}", config.model);

    let mut app = App::new(config, Some(Config::path()), RevealEngine::default(), Grid::new(width, height));
    let mut screen = Screen::new(width, height);
    let result = run(&mut app, &mut screen);

    drop(guard);
    let _ = io::stdout().flush();
    info!("exiting");
    result
}
