//! Login helpers for minting a session string.
//!
//! The CLI drives the interactive part (phone, code, 2FA password); this
//! module only owns the grammers plumbing and the export format.

use anyhow::{Context as _, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use grammers_client::{Client, Config, InitParams};
use grammers_session::Session;

pub use grammers_client::SignInError;

/// Connects with a fresh, unauthorized session for the sign-in flow.
pub async fn connect_for_login(api_id: i32, api_hash: &str) -> Result<Client> {
    let client = Client::connect(Config {
        session: Session::new(),
        api_id,
        api_hash: api_hash.to_string(),
        params: InitParams::default(),
    })
    .await
    .context("failed to connect for login")?;
    Ok(client)
}

/// base64 of the saved session, the value of `SESSION_STRING`.
pub fn export_session_string(client: &Client) -> String {
    BASE64.encode(client.session().save())
}
