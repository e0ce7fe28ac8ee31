//! Quelta Configuration
//!
//! Environment-driven configuration. Startup fails immediately if a
//! required variable is absent or malformed; there is no config file.

use anyhow::{Context, Result};

pub const DEFAULT_ARCHIVE_GROUP_ID: i64 = -1002388831719;
pub const DEFAULT_POLL_TIMEOUT_SECS: u64 = 50;
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Clone)]
pub struct Config {
    /// Bot API token (primary messaging service identity).
    pub bot_token: String,
    /// MTProto application credentials for the user-session client.
    pub api_id: i32,
    pub api_hash: String,
    /// base64-encoded session, minted once with `quelta session`.
    pub session_string: String,
    /// Supergroup that receives archived copies of topics.
    pub archive_group_id: i64,
    /// Users allowed to talk to the bot in a private chat.
    pub dm_users: Vec<i64>,
    /// Users allowed to run /archive.
    pub archive_users: Vec<i64>,
    pub poll_timeout_secs: u64,
    pub log_dir: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Lookup is injected so tests never touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .with_context(|| format!("required environment variable {} is not set", key))
        };

        let bot_token = required("BOT_TOKEN")?;
        let api_id = required("API_ID")?
            .parse::<i32>()
            .context("API_ID must be an integer")?;
        let api_hash = required("API_HASH")?;
        let session_string = required("SESSION_STRING")?;

        let archive_group_id = match lookup("ARCHIVE_GROUP_ID") {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<i64>()
                .context("ARCHIVE_GROUP_ID must be a chat id")?,
            _ => DEFAULT_ARCHIVE_GROUP_ID,
        };

        let dm_users = parse_id_list(lookup("DM_USERS").as_deref().unwrap_or(""))
            .context("DM_USERS must be a comma-separated list of user ids")?;
        let archive_users = parse_id_list(lookup("ARCHIVE_USERS").as_deref().unwrap_or(""))
            .context("ARCHIVE_USERS must be a comma-separated list of user ids")?;

        let poll_timeout_secs = match lookup("POLL_TIMEOUT_SECS") {
            Some(raw) if !raw.trim().is_empty() => raw
                .trim()
                .parse::<u64>()
                .context("POLL_TIMEOUT_SECS must be a number of seconds")?,
            _ => DEFAULT_POLL_TIMEOUT_SECS,
        };

        let log_dir = lookup("LOG_DIR")
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());

        Ok(Self {
            bot_token,
            api_id,
            api_hash,
            session_string,
            archive_group_id,
            dm_users,
            archive_users,
            poll_timeout_secs,
            log_dir,
        })
    }
}

/// Parses a comma-separated id list, trimming entries and skipping empties.
pub fn parse_id_list(raw: &str) -> Result<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse::<i64>()
                .with_context(|| format!("'{}' is not a user id", entry))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base_env() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("BOT_TOKEN", "123456:TESTTOKEN"),
            ("API_ID", "12345"),
            ("API_HASH", "0123456789abcdef"),
            ("SESSION_STRING", "AQAA"),
        ])
    }

    fn load(env: &HashMap<&'static str, &'static str>) -> Result<Config> {
        Config::from_lookup(|key| env.get(key).map(|v| v.to_string()))
    }

    #[test]
    fn loads_with_defaults() {
        let config = load(&base_env()).expect("config");
        assert_eq!(config.bot_token, "123456:TESTTOKEN");
        assert_eq!(config.api_id, 12345);
        assert_eq!(config.archive_group_id, DEFAULT_ARCHIVE_GROUP_ID);
        assert_eq!(config.poll_timeout_secs, DEFAULT_POLL_TIMEOUT_SECS);
        assert!(config.dm_users.is_empty());
        assert!(config.archive_users.is_empty());
    }

    #[test]
    fn missing_required_variable_fails() {
        for key in ["BOT_TOKEN", "API_ID", "API_HASH", "SESSION_STRING"] {
            let mut env = base_env();
            env.remove(key);
            let err = load(&env).expect_err("must fail");
            assert!(err.to_string().contains(key), "error should name {}", key);
        }
    }

    #[test]
    fn blank_required_variable_fails() {
        let mut env = base_env();
        env.insert("BOT_TOKEN", "   ");
        assert!(load(&env).is_err());
    }

    #[test]
    fn parses_allow_lists() {
        let mut env = base_env();
        env.insert("DM_USERS", "111, 222 ,333");
        env.insert("ARCHIVE_USERS", "444");
        let config = load(&env).expect("config");
        assert_eq!(config.dm_users, vec![111, 222, 333]);
        assert_eq!(config.archive_users, vec![444]);
    }

    #[test]
    fn rejects_non_numeric_allow_list() {
        let mut env = base_env();
        env.insert("ARCHIVE_USERS", "444,bogus");
        assert!(load(&env).is_err());
    }

    #[test]
    fn non_numeric_api_id_fails() {
        let mut env = base_env();
        env.insert("API_ID", "not-a-number");
        assert!(load(&env).is_err());
    }

    #[test]
    fn archive_group_override() {
        let mut env = base_env();
        env.insert("ARCHIVE_GROUP_ID", "-1001234567890");
        let config = load(&env).expect("config");
        assert_eq!(config.archive_group_id, -1001234567890);
    }

    #[test]
    fn id_list_ignores_empty_entries() {
        assert_eq!(parse_id_list(",111,,222,").expect("parse"), vec![111, 222]);
        assert!(parse_id_list("").expect("parse").is_empty());
    }
}
