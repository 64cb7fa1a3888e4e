//! Fieldbook CLI - a command-line host for the fieldbook session.
//!
//! Builds the session context once at startup, loads any persisted token,
//! and runs a single command against it (login, logout, status, or an
//! authenticated request to the booking backend).

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use fieldbook_core::api::UserProfile;
use fieldbook_core::auth::{HostTokenStore, SessionManager, SessionState};
use fieldbook_core::{ApiClient, ApiError, Config};
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Directory for an optional daily-rolling log file
const ENV_LOG_DIR: &str = "FIELDBOOK_LOG_DIR";

const ENV_PASSWORD: &str = "FIELDBOOK_PASSWORD";

const LOG_FILE_PREFIX: &str = "fieldbook.log";

/// Used for the file token store when the platform data directory is unknown
const FALLBACK_DATA_DIR: &str = "./data";

const USAGE: &str = "\
Usage: fieldbook <command>

Commands:
  status               Show the current session
  login [--token JWT]  Log in with email/password, or store the given token
  logout               Forget the session
  whoami               Ask the backend who the token belongs to
  get <path>           Authenticated GET, prints the JSON response
  help                 Show this message";

type Api = ApiClient<HostTokenStore>;

/// Initialize the tracing subscriber for logging.
///
/// Returns the file writer guard, which must live until exit so buffered
/// lines are flushed.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) if !dir.trim().is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        _ => (None, None),
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

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");
    if matches!(command, "help" | "--help" | "-h") {
        println!("{}", USAGE);
        return Ok(());
    }

    let mut config = Config::load()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to load config, using defaults");
            Config::default()
        })
        .with_env_overrides();
    debug!(api = %config.api_base_url, backend = %config.token_backend, "Config loaded");

    let data_dir = data_dir_or_fallback(config.data_dir());
    let store = HostTokenStore::open(config.token_backend, data_dir);
    let session = Arc::new(SessionManager::new(store));
    session.initialize().await;

    let api = ApiClient::new(&config.api_base_url, config.request_timeout(), Arc::clone(&session))?;

    match command {
        "status" => print_status(&session),
        "login" => login(&api, &mut config, &args[1..]).await?,
        "logout" => {
            session.logout().await;
            println!("Logged out.");
        }
        "whoami" => whoami(&api).await?,
        "get" => {
            let Some(path) = args.get(1) else {
                bail!("Usage: fieldbook get <path>");
            };
            get(&api, path).await?;
        }
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }

    Ok(())
}

fn data_dir_or_fallback(resolved: Result<PathBuf>) -> PathBuf {
    resolved.unwrap_or_else(|e| {
        tracing::warn!(error = %e, fallback = FALLBACK_DATA_DIR, "Failed to resolve data directory");
        PathBuf::from(FALLBACK_DATA_DIR)
    })
}

fn print_status(session: &SessionManager<HostTokenStore>) {
    match session.state() {
        SessionState::Uninitialized => println!("Session not loaded"),
        SessionState::Anonymous => println!("Not logged in"),
        SessionState::Authenticated { role } => {
            let role = role.map(|r| r.to_string()).unwrap_or_else(|| "no role".to_string());
            println!("Logged in ({})", role);
            if let Some(sub) = session.claims().and_then(|c| c.sub) {
                println!("  subject: {}", sub);
            }
            match session.expires_at() {
                Some(at) => println!("  expires: {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
                None => println!("  expires: never"),
            }
        }
    }
    println!("  storage: {}", session.store().backend());
}

async fn login(api: &Api, config: &mut Config, args: &[String]) -> Result<()> {
    let token = match args {
        [flag, token] if flag == "--token" => token.clone(),
        [flag] if flag == "--token" => bail!("--token needs a value"),
        [] => {
            let email = prompt_email(config.last_email.as_deref())?;
            let password = match std::env::var(ENV_PASSWORD) {
                Ok(password) if !password.is_empty() => password,
                _ => rpassword::prompt_password("Password: ")?,
            };

            println!("Authenticating...");
            let token = api.authenticate(&email, &password).await.map_err(|e| {
                if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized)) {
                    anyhow::anyhow!("Invalid email or password")
                } else {
                    e
                }
            })?;

            config.last_email = Some(email);
            if let Err(e) = config.save() {
                tracing::warn!(error = %e, "Failed to save config");
            }
            token
        }
        _ => bail!("Usage: fieldbook login [--token JWT]"),
    };

    let session = api.session();
    session.login(token).await.with_context(|| {
        format!(
            "Could not save the session to {} storage. Please try again.",
            session.store().backend()
        )
    })?;

    if session.is_authenticated() {
        info!(role = ?session.role(), "Login stored");
        println!("Login successful!");
    } else {
        println!("Token stored, but it is malformed or expired; you are not logged in.");
    }
    print_status(session);
    Ok(())
}

fn prompt_email(default: Option<&str>) -> Result<String> {
    match default {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    let input = input.trim();

    match (input.is_empty(), default) {
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => bail!("Email is required"),
        (false, _) => Ok(input.to_string()),
    }
}

async fn whoami(api: &Api) -> Result<()> {
    if !api.session().is_authenticated() {
        bail!("Not logged in. Run `fieldbook login` first.");
    }
    let profile: UserProfile = match api.current_user().await {
        Ok(profile) => profile,
        Err(e) => return Err(session_hint(e)),
    };
    println!("{}", profile.display_name());
    if let Some(role) = profile.role {
        println!("  role: {}", role);
    }
    Ok(())
}

async fn get(api: &Api, path: &str) -> Result<()> {
    let value: serde_json::Value = api.get(path).await.map_err(session_hint)?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Point the user at `login` when the backend dropped the session
fn session_hint(e: anyhow::Error) -> anyhow::Error {
    if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::Unauthorized)) {
        e.context("Session rejected by the server. Run `fieldbook login` again.")
    } else {
        e
    }
}
