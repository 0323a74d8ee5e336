use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::{
    fs::{self, File},
    io,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};
use tracing::{info, Level};

use livechat::app::App;
use livechat::config::Config;
use livechat::store::{MemoryStore, MessageStore};
use livechat::ui;

fn cli() -> Command {
    Command::new("livechat")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Terminal chat bound to a live-query message store")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Config file (default: <config dir>/livechat/config.toml)"),
        )
        .arg(
            Arg::new("nickname")
                .short('n')
                .long("nickname")
                .value_name("NAME")
                .help("Display name for sent messages"),
        )
        .arg(
            Arg::new("collection")
                .short('c')
                .long("collection")
                .value_name("NAME")
                .help("Message collection to join"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("File the message store is kept in"),
        )
        .arg(
            Arg::new("ephemeral")
                .long("ephemeral")
                .action(clap::ArgAction::SetTrue)
                .help("Keep messages in memory only"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("trace, debug, info, warn or error"),
        )
}

fn apply_overrides(config: &mut Config, matches: &ArgMatches) {
    if let Some(nickname) = matches.get_one::<String>("nickname") {
        config.nickname = Some(nickname.clone());
    }
    if let Some(collection) = matches.get_one::<String>("collection") {
        config.collection = collection.clone();
    }
    if let Some(store) = matches.get_one::<PathBuf>("store") {
        config.store_path = Some(store.clone());
    }
    if matches.get_flag("ephemeral") {
        config.ephemeral = true;
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log_level = level.clone();
    }
}

/// Log to a file; the terminal belongs to the UI.
fn init_logging(config: &Config) -> Result<()> {
    let level: Level = config
        .log_level
        .parse()
        .with_context(|| format!("invalid log level '{}'", config.log_level))?;

    let path = config.resolved_log_file();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = File::options()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

async fn open_store(config: &Config) -> Result<Arc<dyn MessageStore>> {
    if config.ephemeral {
        info!("using an in-memory store");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let path = config.resolved_store_path();
    let store = MemoryStore::open(&path)
        .await
        .with_context(|| format!("failed to open message store {}", path.display()))?;
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let mut config = Config::load(matches.get_one::<PathBuf>("config").map(PathBuf::as_path))?;
    apply_overrides(&mut config, &matches);
    init_logging(&config)?;

    let store = open_store(&config).await?;
    let mut app = App::new(&config, store).await?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let tick_rate = Duration::from_millis(config.tick_rate_ms);
    let res = run_app(&mut terminal, &mut app, tick_rate);

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        println!("Error: {:?}", err);
    }
    info!("shutting down");

    Ok(())
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    tick_rate: Duration,
) -> Result<()> {
    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|f| ui::draw(f, app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)? {
            let event = event::read()?;
            app.handle_input(event)?;
        }

        if last_tick.elapsed() >= tick_rate {
            app.on_tick()?;
            last_tick = Instant::now();
        }

        if app.should_quit {
            return Ok(());
        }
    }
}
