//! Quelta CLI
//!
//! Forum-topic moderation bot for a Telegram supergroup. `start` runs the
//! dispatcher until the supervisor kills it; `session` mints the user
//! session string the bot needs for MTProto-only operations.

mod logging;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quelta_config::Config;
use quelta_core::Runtime;
use quelta_session::login::{connect_for_login, export_session_string, SignInError};
use quelta_session::{SessionConfig, UserSession};
use quelta_telegram::TelegramApi;
use std::path::Path;
use tracing::info;

#[derive(Parser)]
#[command(name = "quelta")]
#[command(about = "Forum-topic moderation bot for Telegram supergroups", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level for the file and stderr layers
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bot (long-polling, foreground, until terminated)
    Start,

    /// Sign in interactively and print a SESSION_STRING for the .env file
    Session,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Start => start(&cli.log_level).await,
        Commands::Session => mint_session().await,
    }
}

async fn start(log_level: &str) -> Result<()> {
    // Config first: a missing variable must abort startup before anything
    // else comes up.
    let config = Config::from_env()?;
    let _guard = logging::init_logging(Path::new(&config.log_dir), log_level)?;
    info!("starting quelta");

    let api = TelegramApi::new(&config.bot_token, config.poll_timeout_secs);
    let session = UserSession::connect(&SessionConfig {
        api_id: config.api_id,
        api_hash: config.api_hash.clone(),
        session_string: config.session_string.clone(),
    })
    .await?;

    let mut runtime = Runtime::new(&config, api, session);
    runtime.run().await
}

async fn mint_session() -> Result<()> {
    let api_id: i32 = std::env::var("API_ID")
        .context("API_ID not set")?
        .trim()
        .parse()
        .context("API_ID must be an integer")?;
    let api_hash = std::env::var("API_HASH").context("API_HASH not set")?;

    let client = connect_for_login(api_id, &api_hash).await?;

    let phone = prompt("Phone number (international format): ")?;
    let token = client.request_login_code(phone.trim()).await?;
    let code = prompt("Enter the code Telegram sent you: ")?;

    match client.sign_in(&token, code.trim()).await {
        Ok(_) => {}
        Err(SignInError::PasswordRequired(password_token)) => {
            let hint = password_token.hint().unwrap_or("no hint");
            let password = prompt(&format!("Enter your 2FA password (hint: {}): ", hint))?;
            client
                .check_password(password_token, password.trim())
                .await
                .context("2FA password check failed")?;
        }
        Err(SignInError::InvalidCode) => bail!("invalid code, try again"),
        Err(err) => bail!("sign-in failed: {}", err),
    }

    println!("\nSESSION_STRING={}", export_session_string(&client));
    println!("Store this in the environment of the bot process and keep it secret.");
    Ok(())
}

fn prompt(message: &str) -> Result<String> {
    use std::io::{BufRead, Write};
    print!("{}", message);
    std::io::stdout().flush()?;
    let line = std::io::stdin()
        .lock()
        .lines()
        .next()
        .context("stdin closed")??;
    Ok(line)
}
