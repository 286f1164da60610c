//! glassdesk - terminal dashboard for JC Glasshouse.
//!
//! Starts the session manager (resuming a stored session when it is still
//! valid), then runs the shell: a login form for anonymous users and the
//! dashboard views behind the route guard, with the inactivity warning on
//! top.

mod app;
mod ui;

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use glassdesk_core::{
    ApiClient, Config, Credential, LogoutReason, SessionHandle, SessionManager, SessionStore,
    StorageKey,
};

use app::{App, AppState};
use ui::input::{activity_kind, handle_input};
use ui::render::render;

// ============================================================================
// Constants
// ============================================================================

/// Timeout for polling terminal events (in milliseconds)
const EVENT_POLL_TIMEOUT_MS: u64 = 100;

const LOG_FILE_PREFIX: &str = "glassdesk.log";

const USAGE: &str = "\
Usage: glassdesk [--status | --login | --logout | --help]

  (no flag)   Start the dashboard
  --status    Show the stored session
  --login     Log in from the terminal and store the session
  --logout    Clear the stored session";

/// Initialize the tracing subscriber.
///
/// The terminal belongs to the UI, so logs go to a daily file in the cache
/// directory. Use RUST_LOG to control the level (e.g. RUST_LOG=debug).
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load().context("Failed to load config")?;
    let _log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        None => {}
        Some("--status") => return print_status(&config),
        Some("--login") => return login_interactive(config).await,
        Some("--logout") => return logout(&config).await,
        Some("--help") | Some("-h") => {
            println!("{}", USAGE);
            return Ok(());
        }
        Some(other) => {
            eprintln!("Unknown argument: {}\n\n{}", other, USAGE);
            std::process::exit(2);
        }
    }

    info!("glassdesk starting");
    let session = start_session(&config)?;

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(config, session.clone());

    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    // Timers stop; a live session stays stored for the next start
    session.shutdown().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    info!("glassdesk shutting down");
    Ok(())
}

/// Build the auth client and store from config and start the manager.
fn start_session(config: &Config) -> Result<SessionHandle> {
    let base_url = config.api_base_url();
    info!(base_url = %base_url, storage = ?config.storage, "Starting session manager");
    let client = ApiClient::new(&base_url).context("Failed to create HTTP client")?;
    let store = config.open_store()?;
    Ok(SessionManager::spawn(client, store, config.session.clone()))
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    loop {
        app.sync_session();
        terminal.draw(|f| render(f, app))?;

        // Poll with a timeout so countdown updates are drawn
        if event::poll(Duration::from_millis(EVENT_POLL_TIMEOUT_MS))? {
            let event = event::read()?;

            if let Event::Key(key) = &event {
                if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
                    return Ok(());
                }
                if handle_input(app, *key).await? {
                    return Ok(());
                }
            }

            if let Some(kind) = activity_kind(&event) {
                app.record_activity(kind);
            }
        }

        if matches!(app.state, AppState::Quitting) {
            return Ok(());
        }
    }
}

// ============================================================================
// Command line
// ============================================================================

/// Print the stored session without modifying it.
fn print_status(config: &Config) -> Result<()> {
    let store = config.open_store()?;
    let Some(raw) = store.get(StorageKey::Token)? else {
        println!("Not logged in");
        return Ok(());
    };

    match Credential::decode(raw) {
        Ok(credential) => {
            let user = credential.identity();
            let now = chrono::Utc::now().timestamp();
            let expires = credential
                .expires_at_utc()
                .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| credential.expires_at().to_string());
            println!("User:      {} ({})", user.display_name(), user.username);
            println!(
                "Financial: {}",
                if user.can_view_financials { "yes" } else { "no" }
            );
            if credential.is_expired_at(now) {
                println!("Token:     expired at {}", expires);
            } else {
                println!(
                    "Token:     valid until {} ({} min left)",
                    expires,
                    credential.seconds_until_expiry(now) / 60
                );
            }
        }
        Err(e) => println!("Stored session is unreadable: {}", e),
    }
    Ok(())
}

async fn login_interactive(mut config: Config) -> Result<()> {
    use std::io::Write;

    let default_user = std::env::var(app::USERNAME_ENV)
        .ok()
        .or_else(|| config.last_username.clone());
    match &default_user {
        Some(user) => print!("Username [{}]: ", user),
        None => print!("Username: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let username = match (input.trim(), default_user) {
        ("", Some(user)) => user,
        (typed, _) => typed.to_string(),
    };

    let password = match std::env::var(app::PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password("Password: ")?,
    };

    println!("\nAuthenticating...");
    let session = start_session(&config)?;
    let result = session.authenticate(&username, &password).await;
    session.shutdown().await;

    match result {
        Ok(user) => {
            config.last_username = Some(username);
            config.save().context("Failed to save config")?;
            println!("Logged in as {}", user.display_name());
            Ok(())
        }
        Err(e) => anyhow::bail!(e.user_message()),
    }
}

async fn logout(config: &Config) -> Result<()> {
    let session = start_session(config)?;
    let ended = session.logout(LogoutReason::Manual).await;
    session.shutdown().await;
    let ended = ended.context("Session manager stopped before logout")?;
    if ended {
        println!("Logged out");
    } else {
        println!("No active session; stored data cleared");
    }
    Ok(())
}
