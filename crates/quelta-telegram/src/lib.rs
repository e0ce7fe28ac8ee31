//! Quelta Telegram Adapter
//!
//! Typed subset of the Telegram Bot API over reqwest: long-polling,
//! forum-topic CRUD, inline keyboards, and callback answers. Error bodies
//! are classified so the dispatcher can tell a no-op rename or a vanished
//! thread from a real transport failure.

use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

impl Chat {
    pub fn is_private(&self) -> bool {
        self.chat_type == "private"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Result of createForumTopic; only the thread id matters to callers.
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedTopic {
    pub message_thread_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn new(text: &str, callback_data: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: callback_data.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiReply<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    /// The rename changed nothing; the dispatcher folds this into the same
    /// user-facing message as an already-in-state transition.
    #[error("rename was a no-op (TOPIC_NOT_MODIFIED)")]
    NotModified,

    /// The referenced forum topic no longer exists.
    #[error("message thread not found")]
    ThreadNotFound,

    #[error("telegram {method} failed with {code}: {description}")]
    Api {
        method: String,
        code: i64,
        description: String,
    },

    #[error("telegram {method} request failed: {source}")]
    Http {
        method: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("telegram {method} decode failed: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

impl TelegramError {
    pub fn is_not_modified(&self) -> bool {
        matches!(self, TelegramError::NotModified)
    }

    pub fn is_thread_missing(&self) -> bool {
        matches!(self, TelegramError::ThreadNotFound)
    }

    fn classify(method: &str, code: Option<i64>, description: Option<String>) -> Self {
        let description = description.unwrap_or_default();
        if description.contains("TOPIC_NOT_MODIFIED") {
            return TelegramError::NotModified;
        }
        if description
            .to_ascii_lowercase()
            .contains("message thread not found")
        {
            return TelegramError::ThreadNotFound;
        }
        TelegramError::Api {
            method: method.to_string(),
            code: code.unwrap_or(0),
            description,
        }
    }
}

pub struct TelegramApi {
    client: Client,
    api_url: String,
    poll_timeout_secs: u64,
}

impl TelegramApi {
    pub fn new(bot_token: &str, poll_timeout_secs: u64) -> Self {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(600))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(poll_timeout_secs + 30))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            api_url: format!("https://api.telegram.org/bot{}", bot_token),
            poll_timeout_secs,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        payload: serde_json::Value,
    ) -> Result<T, TelegramError> {
        let url = format!("{}/{}", self.api_url, method);
        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|source| TelegramError::Http {
                method: method.to_string(),
                source,
            })?;

        // Bot API errors come back as JSON bodies on non-2xx statuses too,
        // so the body is parsed before the status is considered.
        let body = response
            .text()
            .await
            .map_err(|source| TelegramError::Http {
                method: method.to_string(),
                source,
            })?;
        let reply: ApiReply<T> =
            serde_json::from_str(&body).map_err(|source| TelegramError::Decode {
                method: method.to_string(),
                source,
            })?;

        if !reply.ok {
            return Err(TelegramError::classify(
                method,
                reply.error_code,
                reply.description,
            ));
        }
        reply.result.ok_or_else(|| TelegramError::Api {
            method: method.to_string(),
            code: 0,
            description: "ok reply without result".to_string(),
        })
    }

    pub async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<Update>, TelegramError> {
        let mut payload = serde_json::json!({
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(offset) = offset {
            payload["offset"] = serde_json::json!(offset);
        }
        self.call("getUpdates", payload).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        message_thread_id: Option<i64>,
        keyboard: Option<&[Vec<InlineButton>]>,
    ) -> Result<(), TelegramError> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(thread_id) = message_thread_id {
            payload["message_thread_id"] = serde_json::json!(thread_id);
        }
        if let Some(keyboard) = keyboard {
            payload["reply_markup"] = keyboard_markup(keyboard);
        }
        debug!(chat_id, "sendMessage");
        self.call::<serde_json::Value>("sendMessage", payload)
            .await?;
        Ok(())
    }

    pub async fn create_forum_topic(
        &self,
        chat_id: i64,
        name: &str,
        icon_color: u32,
    ) -> Result<CreatedTopic, TelegramError> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "name": name,
            "icon_color": icon_color,
        });
        self.call("createForumTopic", payload).await
    }

    pub async fn delete_forum_topic(
        &self,
        chat_id: i64,
        message_thread_id: i64,
    ) -> Result<(), TelegramError> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "message_thread_id": message_thread_id,
        });
        self.call::<serde_json::Value>("deleteForumTopic", payload)
            .await?;
        Ok(())
    }

    pub async fn delete_message(
        &self,
        chat_id: i64,
        message_id: i64,
    ) -> Result<(), TelegramError> {
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
        });
        self.call::<serde_json::Value>("deleteMessage", payload)
            .await?;
        Ok(())
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<(), TelegramError> {
        let mut payload = serde_json::json!({
            "callback_query_id": callback_query_id,
            "show_alert": show_alert,
        });
        if let Some(text) = text {
            payload["text"] = serde_json::json!(text);
        }
        self.call::<bool>("answerCallbackQuery", payload).await?;
        Ok(())
    }

    /// Publishes the command menu so clients offer completion for it.
    pub async fn sync_bot_commands(&self) -> Result<(), TelegramError> {
        let payload = serde_json::json!({
            "commands": [
                { "command": "start", "description": "About this bot" },
                { "command": "help", "description": "List commands" },
                { "command": "create", "description": "Create a topic: /create <name> - <creator>" },
                { "command": "delete", "description": "Delete the current topic" },
                { "command": "state", "description": "Set topic state (OPEN, CLOSED, PENDING REFUND, PENDING FIX)" },
                { "command": "archive", "description": "Copy this topic to the archive group" },
                { "command": "existingtopics", "description": "List topics created this session" },
            ],
        });
        self.call::<bool>("setMyCommands", payload).await?;
        Ok(())
    }
}

fn keyboard_markup(keyboard: &[Vec<InlineButton>]) -> serde_json::Value {
    serde_json::json!({
        "inline_keyboard": keyboard
            .iter()
            .map(|row| {
                row.iter()
                    .map(|button| {
                        serde_json::json!({
                            "text": button.text,
                            "callback_data": button.callback_data,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_topic_not_modified() {
        let err = TelegramError::classify(
            "editForumTopic",
            Some(400),
            Some("Bad Request: TOPIC_NOT_MODIFIED".to_string()),
        );
        assert!(err.is_not_modified());
    }

    #[test]
    fn classify_thread_not_found() {
        let err = TelegramError::classify(
            "sendMessage",
            Some(400),
            Some("Bad Request: message thread not found".to_string()),
        );
        assert!(err.is_thread_missing());
    }

    #[test]
    fn classify_other_errors_keep_detail() {
        let err = TelegramError::classify(
            "createForumTopic",
            Some(403),
            Some("Forbidden: not enough rights".to_string()),
        );
        match err {
            TelegramError::Api {
                method,
                code,
                description,
            } => {
                assert_eq!(method, "createForumTopic");
                assert_eq!(code, 403);
                assert!(description.contains("not enough rights"));
            }
            other => panic!("unexpected classification: {:?}", other),
        }
    }

    #[test]
    fn decode_update_with_command_message() {
        let json = r#"{
            "update_id": 10,
            "message": {
                "message_id": 77,
                "message_thread_id": 42,
                "text": "/state CLOSED",
                "chat": {"id": -1001234, "type": "supergroup"},
                "from": {"id": 555, "username": "mod"}
            }
        }"#;
        let update: Update = serde_json::from_str(json).expect("decode");
        let message = update.message.expect("message");
        assert_eq!(message.message_thread_id, Some(42));
        assert_eq!(message.text.as_deref(), Some("/state CLOSED"));
        assert!(!message.chat.is_private());
        assert_eq!(message.from.map(|u| u.id), Some(555));
    }

    #[test]
    fn decode_update_with_callback() {
        let json = r#"{
            "update_id": 11,
            "callback_query": {
                "id": "cb1",
                "from": {"id": 555},
                "message": {
                    "message_id": 78,
                    "message_thread_id": 42,
                    "chat": {"id": -1001234, "type": "supergroup"}
                },
                "data": "confirmDelete"
            }
        }"#;
        let update: Update = serde_json::from_str(json).expect("decode");
        let callback = update.callback_query.expect("callback");
        assert_eq!(callback.data.as_deref(), Some("confirmDelete"));
        assert_eq!(callback.message.and_then(|m| m.message_thread_id), Some(42));
    }

    #[test]
    fn decode_error_reply() {
        let json = r#"{"ok":false,"error_code":400,"description":"Bad Request: TOPIC_NOT_MODIFIED"}"#;
        let reply: ApiReply<serde_json::Value> = serde_json::from_str(json).expect("decode");
        assert!(!reply.ok);
        assert_eq!(reply.error_code, Some(400));
    }

    #[test]
    fn keyboard_markup_shape() {
        let keyboard = vec![vec![
            InlineButton::new("Yes", "confirmDelete"),
            InlineButton::new("No", "disregardDelete"),
        ]];
        let markup = keyboard_markup(&keyboard);
        assert_eq!(markup["inline_keyboard"][0][0]["text"], "Yes");
        assert_eq!(
            markup["inline_keyboard"][0][1]["callback_data"],
            "disregardDelete"
        );
    }
}
