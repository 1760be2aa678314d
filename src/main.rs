use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fellowship_auth::address::{self, MemoryAddressBar};
use fellowship_auth::config::AuthConfig;
use fellowship_auth::rest::{BackendClient, RestAuthProvider, RestProfileStore};
use fellowship_auth::store;
use fellowship_auth::{AuthError, AuthStatus, ControllerState, ErrorCode, OAuthProvider, Profile, SessionController};
use serde::Serialize;

/// How long to wait for a consumed callback to reach controller state.
const CALLBACK_APPLY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{code}: {source}")]
    Auth { code: &'static str, source: AuthError },
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("timed out waiting for callback session to apply")]
    Timeout,
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl From<AuthError> for CliError {
    fn from(source: AuthError) -> Self {
        Self::Auth { code: source.error_code(), source }
    }
}

#[derive(Parser, Debug)]
#[command(name = "fellowship-auth", about = "Drive the fellowship session controller from a terminal")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Boot the controller and print who is signed in.
    Status {
        /// Landing address, including any callback fragment.
        #[arg(long, env = "AUTH_ADDRESS")]
        address: Option<String>,
    },
    /// Email a passwordless sign-in link.
    SignInEmail {
        email: String,
        #[arg(long, default_value = "/")]
        redirect: String,
    },
    /// Print the provider authorize URL to open in a browser.
    SignInOauth {
        provider: String,
        #[arg(long, default_value = "/")]
        redirect: String,
    },
    SignOut,
    RefreshProfile,
}

/// What the CLI prints. Tokens stay out of terminal output.
#[derive(Serialize)]
struct StatusReport<'a> {
    status: AuthStatus,
    user_id: Option<&'a str>,
    is_admin: bool,
    is_core_member: bool,
    profile: Option<&'a Profile>,
}

impl<'a> StatusReport<'a> {
    fn new(state: &'a ControllerState) -> Self {
        Self {
            status: state.status(),
            user_id: state.user_id(),
            is_admin: state.is_admin(),
            is_core_member: state.is_core_member(),
            profile: state.profile.as_ref(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = AuthConfig::from_env()?;

    let backend = BackendClient::from_config(&config)?;
    let auth = Arc::new(RestAuthProvider::new(backend.clone(), config.session_file.clone()));
    let profiles = Arc::new(RestProfileStore::new(backend, config.profiles_table.clone()).with_auth(auth.clone()));

    let landing = match &cli.command {
        Command::Status { address: Some(address) } => address.clone(),
        _ => config.site_url.clone(),
    };
    let bar = Arc::new(MemoryAddressBar::new(landing.clone()));
    let controller = SessionController::start(auth.clone(), profiles, bar, &config.site_url, config.sync);

    let callback = address::has_auth_fragment(&landing).then(|| {
        let auth = auth.clone();
        tokio::spawn(async move { auth.consume_fragment(&landing).await })
    });

    let booted = controller.booted().await;
    tracing::debug!(status = ?booted.status(), "session controller booted");

    if let Some(handle) = callback {
        apply_callback(&controller, handle.await??).await?;
    }

    match cli.command {
        Command::Status { .. } => print_state(&controller.state()),
        Command::SignInEmail { email, redirect } => {
            controller.sign_in_with_email(&email, &redirect).await?;
            let sent_to = store::normalize_email(&email).unwrap_or(email);
            print_json(&serde_json::json!({ "link_sent_to": sent_to }))
        }
        Command::SignInOauth { provider, redirect } => {
            let provider: OAuthProvider = provider.parse()?;
            let url = controller.sign_in_with_oauth(provider, &redirect).await?;
            print_json(&serde_json::json!({ "provider": provider, "authorize_url": url }))
        }
        Command::SignOut => {
            controller.sign_out().await?;
            print_state(&controller.state())
        }
        Command::RefreshProfile => {
            controller.refresh_profile().await?;
            print_state(&controller.state())
        }
    }
}

/// Wait for the callback's `SignedIn` event to land, then load the profile.
async fn apply_callback(
    controller: &SessionController,
    session: Option<fellowship_auth::Session>,
) -> Result<(), CliError> {
    let Some(user_id) = session.as_ref().and_then(|s| s.user_id().map(str::to_owned)) else {
        return Ok(());
    };
    let mut rx = controller.subscribe();
    tokio::time::timeout(CALLBACK_APPLY_TIMEOUT, rx.wait_for(|s| s.user_id() == Some(user_id.as_str())))
        .await
        .map_err(|_| CliError::Timeout)?
        .map_err(|_| CliError::Timeout)?;
    controller.refresh_profile().await?;
    Ok(())
}

fn print_state(state: &ControllerState) -> Result<(), CliError> {
    print_json(&serde_json::to_value(StatusReport::new(state))?)
}

fn print_json(value: &serde_json::Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
