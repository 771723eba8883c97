//! markettop - A live terminal dashboard for stock quotes and market indices.

mod cli;
mod config;
mod controller;
mod editor;
mod filter;
mod input;
mod layout;
mod logging;
mod markup;
mod models;
mod numeric;
mod profile;
mod provider;
mod screen;
mod sorter;

use anyhow::{Context, Result};
use cli::Args;
use config::Config;
use controller::Controller;
use crossterm::{
    event::{DisableMouseCapture, EnableMouseCapture},
    execute,
    terminal::{self, EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use input::InputReader;
use markup::Markup;
use profile::{Profile, TomlProfileStore};
use provider::history::HistoryCache;
use provider::yahoo::YahooFinance;
use ratatui::{Terminal, backend::CrosstermBackend};
use screen::Screen;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse_args();

    if args.sample_config {
        print!("{}", config::sample_config());
        return Ok(());
    }

    // Load configuration
    let config = if let Some(ref path) = args.config {
        Config::load(path)?
    } else {
        Config::load_or_default()
    };

    let log_path = args
        .log_file
        .clone()
        .or_else(|| config.general.log_file.clone())
        .or_else(logging::default_log_path);
    if let Some(path) = &log_path {
        if let Err(e) = logging::init(path, args.verbose) {
            eprintln!("Warning: logging disabled: {e:#}");
        }
    }

    let profile_path = match &args.profile {
        Some(path) => path.clone(),
        None => TomlProfileStore::default_path().context("Could not determine config directory")?,
    };
    info!(profile = %profile_path.display(), "Loading profile");
    let mut profile = Profile::load(Box::new(TomlProfileStore::new(profile_path)))?;

    let tickers = args.tickers();
    if !tickers.is_empty() {
        profile.add_tickers(&tickers)?;
    }
    let (quotes_refresh, market_refresh) = config.general.refresh_intervals()?;
    profile.override_refresh(
        args.quotes_refresh.or(quotes_refresh),
        args.market_refresh.or(market_refresh),
    );

    let timeout = Duration::from_secs(args.timeout.unwrap_or(config.general.timeout));
    let source = Arc::new(YahooFinance::new(timeout)?);
    let markup = Markup::new(&config.colors()?)?;

    let history = if args.no_history || !config.history.enabled {
        None
    } else {
        HistoryCache::default_path().map(|path| Arc::new(HistoryCache::open(path)))
    };

    run_interactive(source, profile, markup, history, &config).await
}

/// Run the dashboard with the terminal in raw mode.
async fn run_interactive(
    source: Arc<YahooFinance>,
    profile: Profile,
    markup: Markup,
    history: Option<Arc<HistoryCache>>,
    config: &Config,
) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, source, profile, markup, history, config).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = &result {
        warn!(error = %e, "Exiting with error");
    }
    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    source: Arc<YahooFinance>,
    profile: Profile,
    markup: Markup,
    history: Option<Arc<HistoryCache>>,
    config: &Config,
) -> Result<()> {
    let (width, height) = terminal::size().context("Failed to read terminal size")?;
    let screen = Screen::new(width, height, markup)?;
    let (reader, events) = InputReader::spawn()?;

    let controller = Controller::new(
        source,
        profile,
        screen,
        history,
        config.history.warm_up_options(),
    );
    let result = controller.run(terminal, events).await;

    // Stop reading before the terminal leaves raw mode.
    drop(reader);
    result
}
