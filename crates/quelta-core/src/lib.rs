//! Quelta Core
//!
//! Command dispatcher for the moderation bot: parses inbound commands,
//! enforces the allow-lists, and drives the Bot API adapter and the
//! user-session client. One update is handled at a time; a failed command
//! is reported to the user and logged, never fatal.

pub mod commands;
mod runtime;

pub use runtime::Runtime;
