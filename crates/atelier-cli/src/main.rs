//! Atelier CLI - log in to the storefront API and keep the session fresh.
//!
//! Credentials live in the configured store (session file, OS keyring, or
//! memory). Every command that talks to the API goes through the same session
//! core the apps use, so refresh and expiry behave the same here.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use atelier_core::{ApiRequest, Config, Session, SessionEvent, SessionStatus, TokenInfo};

/// Name of the daily-rotated log file in the cache directory
const LOG_FILE_PREFIX: &str = "atelier.log";

#[derive(Parser)]
#[command(name = "atelier", version, about = "Atelier storefront session client")]
struct Cli {
    /// API base URL (overrides config file)
    #[arg(long, global = true, env = "ATELIER_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with email and password
    Login {
        /// Account email; defaults to the last one used
        #[arg(long)]
        email: Option<String>,
    },
    /// Revoke the refresh token and forget the stored session
    Logout,
    /// Show the stored user and access token state
    Status,
    /// Exchange the refresh token now
    Refresh,
    /// GET a path with the session's token and print the body
    Get {
        /// Path relative to the base URL, e.g. /api/orders
        path: String,
    },
    /// Keep the session fresh until Ctrl-C or expiry
    Watch,
}

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr and, when the cache directory is available, to a daily
/// log file. The returned guard must be held until exit to flush the file.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let mut config = Config::load()?;
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
        config.validate()?;
    }

    let _guard = init_tracing(&config);
    info!(base_url = %config.base_url, "Atelier CLI starting");

    let session = Session::from_config(config.clone())?;

    match cli.command {
        Command::Login { email } => login(&session, config, email).await,
        Command::Logout => {
            session.terminate().await?;
            println!("Logged out.");
            Ok(())
        }
        Command::Status => {
            status(&session);
            Ok(())
        }
        Command::Refresh => {
            session.force_refresh().await?;
            println!("Token refreshed.");
            print_token_info(&session.token_info());
            Ok(())
        }
        Command::Get { path } => get(&session, &path).await,
        Command::Watch => watch(&session).await,
    }
}

async fn login(session: &Session, mut config: Config, email: Option<String>) -> Result<()> {
    let email = match email.or_else(|| config.last_email.clone()) {
        Some(email) => email,
        None => prompt("Email: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", email))
        .context("Failed to read password")?;

    session.login(&email, &password).await?;
    // Login starts the scheduler; this process exits right away.
    if let Some(user) = session.user() {
        println!("Logged in as {} ({}).", user.display_name(), user.role_display());
        println!("Home: {}", session.home_route());
    }

    config.last_email = Some(email);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to remember email");
    }
    Ok(())
}

fn status(session: &Session) {
    match session.user() {
        Some(user) => {
            println!("User:   {}", user.display_name());
            println!("Email:  {}", user.email);
            let roles: Vec<&str> = user.roles.iter().map(|r| r.code()).collect();
            println!("Roles:  {} ({})", roles.join(", "), user.role_display());
        }
        None => println!("Not logged in."),
    }
    print_token_info(&session.token_info());
}

fn print_token_info(info: &TokenInfo) {
    match info {
        TokenInfo::Decoded {
            valid,
            subject,
            expires_at,
            minutes_remaining,
            ..
        } => {
            println!("Token:  {}", if *valid { "valid" } else { "expired" });
            println!("Sub:    {}", subject);
            println!(
                "Expiry: {} ({} min)",
                expires_at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                minutes_remaining
            );
        }
        TokenInfo::Missing => println!("Token:  none"),
        TokenInfo::Invalid { reason } => println!("Token:  invalid ({})", reason),
    }
}

async fn get(session: &Session, path: &str) -> Result<()> {
    if session.initialize().await? == SessionStatus::NotAuthenticated {
        bail!("Not logged in. Run `atelier login` first.");
    }

    let response = session.client().send(ApiRequest::get(path)).await?;
    let body = response.text();
    // Pretty-print JSON bodies; anything else goes out as-is.
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", body),
    }

    if !response.is_success() {
        bail!("Request failed with status {}", response.status);
    }
    Ok(())
}

async fn watch(session: &Session) -> Result<()> {
    let mut events = session.subscribe();
    if session.initialize().await? == SessionStatus::NotAuthenticated {
        bail!("Not logged in. Run `atelier login` first.");
    }
    println!("Watching session, Ctrl-C to stop.");
    print_token_info(&session.token_info());

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::Refreshed) => {
                    println!("[{}] Token refreshed.", chrono::Local::now().format("%H:%M:%S"));
                    print_token_info(&session.token_info());
                }
                Ok(SessionEvent::Expired) => {
                    println!("Session expired. Run `atelier login` again.");
                    break;
                }
                Ok(SessionEvent::LoggedOut) => break,
                Err(RecvError::Lagged(n)) => warn!(missed = n, "Missed session events"),
                Err(RecvError::Closed) => break,
            }
        }
    }

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No value entered");
    }
    Ok(value)
}
