//! Quelta Session Client
//!
//! MTProto user-session wrapper for the operations the Bot API cannot
//! perform: reading forum-topic titles, enumerating topic history, and
//! renaming a topic with a custom status icon. The wire protocol itself
//! is entirely grammers' concern.

pub mod login;

use anyhow::{anyhow, bail, Context as _, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use grammers_client::{Client, Config, InitParams, InvocationError};
use grammers_session::{PackedChat, Session};
use grammers_tl_types as tl;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub api_id: i32,
    pub api_hash: String,
    /// base64 of a saved grammers session, minted with `quelta session`.
    pub session_string: String,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The rename changed nothing (TOPIC_NOT_MODIFIED).
    #[error("rename was a no-op (TOPIC_NOT_MODIFIED)")]
    NotModified,

    /// The session account cannot see the chat, so no access hash exists.
    #[error("chat {0} is not visible to the session account")]
    ChatNotFound(i64),

    #[error("telegram rpc call failed: {0}")]
    Rpc(#[from] InvocationError),
}

impl SessionError {
    pub fn is_not_modified(&self) -> bool {
        matches!(self, SessionError::NotModified)
    }
}

fn map_invocation(err: InvocationError) -> SessionError {
    if let InvocationError::Rpc(rpc) = &err {
        if rpc.name == "TOPIC_NOT_MODIFIED" {
            return SessionError::NotModified;
        }
    }
    SessionError::Rpc(err)
}

/// Supergroup ids arrive in Bot API form (`-100` prefixed); MTProto wants
/// the bare channel id.
pub fn bare_channel_id(chat_id: i64) -> i64 {
    if chat_id >= 0 {
        return chat_id;
    }
    let abs = -chat_id;
    if abs > 1_000_000_000_000 {
        abs - 1_000_000_000_000
    } else {
        abs
    }
}

fn input_channel(packed: &PackedChat) -> tl::enums::InputChannel {
    tl::types::InputChannel {
        channel_id: packed.id,
        access_hash: packed.access_hash.unwrap_or(0),
    }
    .into()
}

fn input_peer(packed: &PackedChat) -> tl::enums::InputPeer {
    tl::types::InputPeerChannel {
        channel_id: packed.id,
        access_hash: packed.access_hash.unwrap_or(0),
    }
    .into()
}

pub struct UserSession {
    client: Client,
    // Access hashes resolved from the dialog list, cached per Bot API chat id.
    peers: Mutex<HashMap<i64, PackedChat>>,
}

/// Decodes `SESSION_STRING` material into a grammers session.
fn load_session(session_string: &str) -> Result<Session> {
    let data = BASE64
        .decode(session_string.trim())
        .context("SESSION_STRING is not valid base64")?;
    Session::load(&data).map_err(|err| anyhow!("SESSION_STRING does not hold a session: {:?}", err))
}

impl UserSession {
    /// Decodes the session material, connects, and verifies authorization.
    pub async fn connect(config: &SessionConfig) -> Result<Self> {
        let session = load_session(&config.session_string)?;

        let client = Client::connect(Config {
            session,
            api_id: config.api_id,
            api_hash: config.api_hash.clone(),
            params: InitParams::default(),
        })
        .await
        .context("failed to connect the user session")?;

        if !client.is_authorized().await? {
            bail!("user session is not authorized; mint a new one with `quelta session`");
        }
        info!("user session connected");

        Ok(Self {
            client,
            peers: Mutex::new(HashMap::new()),
        })
    }

    async fn packed_chat(&self, chat_id: i64) -> Result<PackedChat, SessionError> {
        if let Some(packed) = self.peers.lock().await.get(&chat_id).cloned() {
            return Ok(packed);
        }

        let bare_id = bare_channel_id(chat_id);
        let mut dialogs = self.client.iter_dialogs();
        while let Some(dialog) = dialogs.next().await? {
            let chat = dialog.chat();
            if chat.id() == bare_id {
                let packed = chat.pack();
                debug!(chat_id, "resolved chat from dialog list");
                self.peers.lock().await.insert(chat_id, packed.clone());
                return Ok(packed);
            }
        }
        Err(SessionError::ChatNotFound(chat_id))
    }

    /// Current title of a forum topic, or `None` if the topic is gone.
    pub async fn topic_title(
        &self,
        chat_id: i64,
        topic_id: i64,
    ) -> Result<Option<String>, SessionError> {
        let packed = self.packed_chat(chat_id).await?;
        let request = tl::functions::channels::GetForumTopics {
            channel: input_channel(&packed),
            q: None,
            offset_date: 0,
            offset_id: 0,
            offset_topic: 0,
            limit: 100,
        };
        let tl::enums::messages::ForumTopics::Topics(parsed) = self
            .client
            .invoke(&request)
            .await
            .map_err(map_invocation)?;

        for topic in parsed.topics {
            if let tl::enums::ForumTopic::Topic(topic) = topic {
                if i64::from(topic.id) == topic_id {
                    return Ok(Some(topic.title));
                }
            }
        }
        Ok(None)
    }

    /// Text of the most recent messages in a topic, newest first.
    pub async fn recent_messages(
        &self,
        chat_id: i64,
        topic_id: i64,
        limit: i32,
    ) -> Result<Vec<String>, SessionError> {
        let packed = self.packed_chat(chat_id).await?;
        let request = tl::functions::messages::GetReplies {
            peer: input_peer(&packed),
            msg_id: topic_id as i32,
            offset_id: 0,
            offset_date: 0,
            add_offset: 0,
            limit,
            max_id: 0,
            min_id: 0,
            hash: 0,
        };
        let result = self
            .client
            .invoke(&request)
            .await
            .map_err(map_invocation)?;

        let messages = match result {
            tl::enums::messages::Messages::Messages(m) => m.messages,
            tl::enums::messages::Messages::Slice(m) => m.messages,
            tl::enums::messages::Messages::ChannelMessages(m) => m.messages,
            tl::enums::messages::Messages::NotModified(_) => Vec::new(),
        };

        Ok(messages
            .into_iter()
            .filter_map(|message| match message {
                tl::enums::Message::Message(m) if !m.message.is_empty() => Some(m.message),
                _ => None,
            })
            .collect())
    }

    /// Renames a topic, optionally setting a custom emoji status icon.
    /// A no-op rename surfaces as [`SessionError::NotModified`].
    pub async fn edit_topic(
        &self,
        chat_id: i64,
        topic_id: i64,
        title: &str,
        icon_emoji_id: Option<i64>,
    ) -> Result<(), SessionError> {
        let packed = self.packed_chat(chat_id).await?;
        let request = tl::functions::channels::EditForumTopic {
            channel: input_channel(&packed),
            topic_id: topic_id as i32,
            title: Some(title.to_string()),
            icon_emoji_id,
            closed: None,
            hidden: None,
        };
        self.client
            .invoke(&request)
            .await
            .map_err(map_invocation)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_id_strips_bot_api_prefix() {
        assert_eq!(bare_channel_id(-1002388831719), 2388831719);
        assert_eq!(bare_channel_id(-1001234567890), 1234567890);
    }

    #[test]
    fn bare_id_leaves_plain_ids_alone() {
        assert_eq!(bare_channel_id(2388831719), 2388831719);
        assert_eq!(bare_channel_id(-987654), 987654);
    }

    #[test]
    fn invalid_base64_session_is_rejected() {
        let err = load_session("not base64!!").err().unwrap();
        assert!(err.to_string().contains("base64"));
    }

    #[test]
    fn surrounding_whitespace_is_tolerated() {
        // Only asserts the base64 layer: a truncated payload must fail
        // before any network use, with the variable named in the error.
        assert!(load_session("  AQ==  ").is_err());
    }
}
