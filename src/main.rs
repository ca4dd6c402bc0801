//! Banquet TUI - terminal viewer for streamed SQLite query results.
//!
//! This is the main entry point. It reads configuration, sets up logging
//! and the async runtime, then either runs the interactive TUI or a single
//! headless query.

mod app;
mod state;
mod ui;

use std::fs::{self, File};
use std::io::{self, Write};
use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use banquet_tui::client::{error_chain, QueryClient};
use banquet_tui::config::Config;
use banquet_tui::models::{ColumnInfo, Row};
use banquet_tui::stream::{StreamOutcome, StreamSink};

use app::{Action, App};

/// Global flag to track if terminal is in raw mode (for panic cleanup)
static TERMINAL_RAW: AtomicBool = AtomicBool::new(false);

/// Target frame rate for UI rendering (60fps = ~16ms per frame)
const FRAME_DURATION: Duration = Duration::from_millis(16);

const LOG_FILE_NAME: &str = "banquet.log";

const USAGE: &str = "Usage: banquet [--headless] [--check] [BANQUET_URL]";

/// RAII guard for terminal state management.
/// Ensures terminal is restored to normal state when dropped, even on panic or early return.
struct TerminalGuard;

impl TerminalGuard {
    /// Initialize terminal for TUI mode (raw mode, alternate screen, mouse capture).
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        TERMINAL_RAW.store(true, Ordering::SeqCst);

        if let Err(e) = execute!(io::stdout(), EnterAlternateScreen, EnableMouseCapture) {
            // Rollback: disable raw mode before returning error
            let _ = disable_raw_mode();
            TERMINAL_RAW.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        Ok(Self)
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        TERMINAL_RAW.store(false, Ordering::SeqCst);
    }
}

/// Install a panic hook that restores terminal state before printing panic info.
fn install_panic_hook() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        if TERMINAL_RAW.load(Ordering::SeqCst) {
            // Best effort cleanup - ignore errors
            let _ = disable_raw_mode();
            let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
            let _ = io::stdout().flush();
        }
        default_hook(panic_info);
    }));
}

/// Parsed command line.
#[derive(Debug, Default, PartialEq)]
struct Args {
    headless: bool,
    check: bool,
    banquet_url: Option<String>,
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    for arg in args {
        match arg.as_str() {
            "--headless" => parsed.headless = true,
            "--check" => parsed.check = true,
            "-h" | "--help" => bail!("{}", USAGE),
            flag if flag.starts_with("--") => bail!("Unknown option {}\n{}", flag, USAGE),
            _ if parsed.banquet_url.is_some() => bail!("Only one Banquet URL allowed\n{}", USAGE),
            _ => parsed.banquet_url = Some(arg),
        }
    }
    Ok(parsed)
}

/// Initialize logging.
///
/// The TUI owns the terminal, so interactive sessions log to a file;
/// headless runs log to stderr.
fn init_logging(config: &Config, to_file: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "banquet=info".into()),
    );

    if to_file {
        fs::create_dir_all(&config.log_dir)
            .with_context(|| format!("Failed to create {}", config.log_dir.display()))?;
        let path = config.log_dir.join(LOG_FILE_NAME);
        let file = File::options()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;

        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(io::stderr),
            )
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    // Install panic hook FIRST for terminal safety
    install_panic_hook();

    let args = parse_args(std::env::args().skip(1))?;
    let config = Config::from_env()?;
    let interactive = !args.headless && !args.check;
    init_logging(&config, interactive)?;

    info!("Starting Banquet TUI v{}", env!("CARGO_PKG_VERSION"));
    info!("Query server: {}", config.server_url);

    let runtime = Runtime::new().context("Failed to start async runtime")?;
    let client = QueryClient::new(&config)?;

    if args.check {
        return runtime.block_on(check_server(&client));
    }

    if args.headless {
        let Some(banquet_url) = args.banquet_url else {
            bail!("--headless needs a Banquet URL\n{}", USAGE);
        };
        return runtime.block_on(run_headless(&client, &banquet_url));
    }

    run_tui(client, &runtime, args.banquet_url)
}

/// `--check`: report whether the server answers its health endpoint.
async fn check_server(client: &QueryClient) -> Result<()> {
    match client.health().await {
        Ok(()) => {
            println!("Server at {} is up", client.base_url());
            Ok(())
        }
        Err(e) => bail!("Server at {} is not reachable: {}", client.base_url(), error_chain(&e)),
    }
}

/// Writes streamed results to stdout as tab-separated lines.
struct TsvSink<W: Write> {
    out: W,
    errors: usize,
    /// Failed writes or flushes of `out`.
    write_errors: usize,
}

impl<W: Write> TsvSink<W> {
    fn new(out: W) -> Self {
        Self {
            out,
            errors: 0,
            write_errors: 0,
        }
    }

    fn write_line<T: ToString>(&mut self, fields: impl Iterator<Item = T>) {
        let line = fields
            .map(|f| f.to_string().replace(['\t', '\n'], " "))
            .collect::<Vec<_>>()
            .join("\t");
        if let Err(e) = writeln!(self.out, "{}", line) {
            error!("Failed to write output: {}", e);
            self.write_errors += 1;
        }
    }
}

impl<W: Write> StreamSink for TsvSink<W> {
    fn on_header(&mut self, columns: Vec<ColumnInfo>, total: u64) {
        info!("Header: {} columns, {} rows advertised", columns.len(), total);
        self.write_line(columns.iter().map(|c| c.name.as_str()));
    }

    fn on_rows(&mut self, rows: Vec<Row>) {
        for row in rows {
            self.write_line(row.iter());
        }
    }

    fn on_error(&mut self, message: String) {
        self.errors += 1;
        eprintln!("Error: {}", message);
    }

    fn on_complete(&mut self, total_rows: u64) {
        if let Err(e) = self.out.flush() {
            error!("Failed to flush output: {}", e);
            self.write_errors += 1;
        }
        eprintln!("Done! Loaded {} rows", total_rows);
    }
}

/// `--headless`: stream one query to stdout.
async fn run_headless(client: &QueryClient, banquet_url: &str) -> Result<()> {
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    let sink = TsvSink::new(io::stdout().lock());
    let consumer = client.stream_query(banquet_url, sink, &cancel).await;
    let outcome = consumer.outcome();
    info!(?outcome, stats = ?consumer.stats(), "Headless query finished");

    if consumer.sink().write_errors > 0 {
        bail!("Failed to write output ({} errors)", consumer.sink().write_errors);
    }
    match outcome {
        Some(StreamOutcome::Completed { .. }) if consumer.sink().errors == 0 => Ok(()),
        Some(StreamOutcome::Completed { .. }) => bail!("Query completed with errors"),
        Some(StreamOutcome::Cancelled) => bail!("Query cancelled"),
        _ => bail!("Query failed"),
    }
}

fn run_tui(client: QueryClient, runtime: &Runtime, initial_query: Option<String>) -> Result<()> {
    // Setup terminal with RAII guard - ensures cleanup on any exit path
    let terminal_guard = TerminalGuard::new()?;

    let backend = CrosstermBackend::new(io::stdout());
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(client, runtime.handle().clone());
    app.check_server();
    if let Some(banquet_url) = initial_query {
        app.set_query_text(&banquet_url);
        app.update(Action::QueryRun);
    }

    let result = run_app(&mut terminal, &mut app);

    terminal.show_cursor()?;

    if let Err(e) = result {
        // Cancel any running query before restoring the terminal
        drop(app);
        drop(terminal_guard);
        error!("Application error: {}", e);
        eprintln!("Error: {}", e);
        return Err(e);
    }

    info!("Banquet TUI exited cleanly");
    Ok(())
}

/// Main application loop.
fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        // Poll query task updates (non-blocking)
        app.poll_query_updates();
        app.poll_health();
        app.poll_schema();

        app.tick();
        app.maybe_clear_error();

        // Only redraw if state has changed (dirty-flag optimization)
        if app.take_needs_redraw() {
            terminal.draw(|f| ui::render(f, app))?;
        }

        // Poll for events with frame-rate limiting
        if event::poll(FRAME_DURATION)? {
            match event::read()? {
                Event::Key(key) => handle_key(app, key),
                Event::Resize(_, _) => app.mark_dirty(),
                _ => {}
            }
        }

        if app.should_quit {
            app.cancel_query();
            return Ok(());
        }
    }
}

/// Map a key press to an action, or pass it to the query bar.
fn handle_key(app: &mut App, key: KeyEvent) {
    if key.kind != event::KeyEventKind::Press {
        return;
    }

    let action = match (key.code, key.modifiers) {
        (KeyCode::Char('q'), KeyModifiers::CONTROL)
        | (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(Action::Quit),
        (KeyCode::Enter, _) => Some(Action::QueryRun),
        (KeyCode::Esc, _) if app.is_query_running() => Some(Action::QueryCancel),
        (KeyCode::Esc, _) => Some(Action::ErrorClear),
        (KeyCode::Up, _) | (KeyCode::Char('k'), KeyModifiers::CONTROL) => {
            Some(Action::ResultsScrollUp)
        }
        (KeyCode::Down, _) | (KeyCode::Char('j'), KeyModifiers::CONTROL) => {
            Some(Action::ResultsScrollDown)
        }
        (KeyCode::PageUp, _) => Some(Action::ResultsPageUp),
        (KeyCode::PageDown, _) => Some(Action::ResultsPageDown),
        (KeyCode::Home, KeyModifiers::CONTROL) => Some(Action::ResultsTop),
        (KeyCode::End, KeyModifiers::CONTROL) => Some(Action::ResultsBottom),
        _ => None,
    };

    match action {
        Some(action) => app.update(action),
        None => {
            // Everything else edits the query bar
            if app.query_input.input(key) {
                app.mark_dirty();
            }
        }
    }
}
