use std::path::PathBuf;

use capsule::error::ConfigError;
use capsule::session::guard::{validate_login, validate_registration};
use capsule::{AuthError, AuthPhase, CapsuleConfig, ErrorCode, RouteAccess, SessionManager};
use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Config(#[from] ConfigError),
    #[error("{}", .0.user_message())]
    Auth(#[from] AuthError),
    #[error("not signed in; run `capsule login` first")]
    NotSignedIn,
    #[error("invalid HTTP method: {0}")]
    InvalidMethod(String),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

#[derive(Parser, Debug)]
#[command(name = "capsule", about = "Time capsule account session CLI")]
struct Cli {
    /// Overrides `CAPSULE_API_URL`.
    #[arg(long)]
    api_url: Option<String>,

    /// Overrides `CAPSULE_TOKEN_FILE`.
    #[arg(long)]
    token_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the stored session and print who is signed in.
    Status,
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "CAPSULE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "CAPSULE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    Logout,
    /// Send an authenticated request, e.g. `capsule request GET /capsules`.
    Request {
        method: String,
        path: String,
        #[arg(long)]
        data: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    if let Err(e) = run(Cli::parse()).await {
        if let CliError::Auth(auth) = &e {
            tracing::debug!(code = auth.error_code(), error = %auth, "command failed");
        }
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = CapsuleConfig::from_env()?;
    if let Some(api_url) = cli.api_url {
        config.api_url = api_url;
    }
    if let Some(token_file) = cli.token_file {
        config.token_file = token_file;
    }

    let manager = SessionManager::from_config(&config)?;

    match cli.command {
        Command::Status => {
            let session = manager.initialize().await;
            let state = match manager.phase() {
                AuthPhase::Authenticated => "authenticated",
                AuthPhase::Anonymous => "anonymous",
                AuthPhase::Initializing => "initializing",
            };
            print_json(&serde_json::json!({ "state": state, "user": session.user }))
        }
        Command::Login { email, password } => {
            validate_login(&email, &password)?;
            manager.initialize().await;
            let user = manager.login(&email, &password).await?;
            print_json(&serde_json::json!({ "success": true, "user": user }))
        }
        Command::Register { name, email, password } => {
            validate_registration(&name, &email, &password)?;
            manager.initialize().await;
            let user = manager.register(&name, &email, &password).await?;
            print_json(&serde_json::json!({ "success": true, "user": user }))
        }
        Command::Logout => {
            manager.logout();
            println!("signed out");
            Ok(())
        }
        Command::Request { method, path, data } => {
            let method = reqwest::Method::from_bytes(method.to_ascii_uppercase().as_bytes())
                .map_err(|_| CliError::InvalidMethod(method))?;
            let body = data.as_deref().map(serde_json::from_str::<Value>).transpose()?;

            manager.initialize().await;
            if manager.route_access() != RouteAccess::Allow {
                return Err(CliError::NotSignedIn);
            }
            let json = manager.authorized_request(method, &path, body.as_ref()).await?;
            print_json(&json)
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
