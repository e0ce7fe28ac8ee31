//! Dispatcher runtime: long-poll loop and command handlers.

use anyhow::Result;
use quelta_config::Config;
use quelta_lifecycle::{decode, resolve_transition, Rejection, TopicDirectory, TopicRecord, TopicState};
use quelta_policy::{AccessPolicy, ANONYMOUS_USER_ID};
use quelta_session::{SessionError, UserSession};
use quelta_telegram::{CallbackQuery, InlineButton, Message, TelegramApi, Update};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::commands::{parse_create, Command};

// Icon constants carried over from the production group setup.
const TOPIC_ICON_COLOR: u32 = 7322096;
const CREATED_TOPIC_ICON: i64 = 5210952531676504517;
const CLOSED_TOPIC_ICON: i64 = 5206607081334906820;

const ARCHIVE_HISTORY_LIMIT: i32 = 100;
const ARCHIVE_REPLAY_PAUSE: Duration = Duration::from_secs(1);
const POLL_RETRY_PAUSE: Duration = Duration::from_secs(2);

const START_TEXT: &str =
    "This is Quelta, a mod bot. Use /help to explore some of its functionalities.";
const HELP_TEXT: &str = "Main functionalities for now are:\n\
/start\n\
/help\n\
/create (Which creates a topic)\n\
/delete\n\
/state (One of Open, close, pending refund, or pending fix)\n\
/archive";
const CREATE_USAGE: &str = "Topic name or creator's name is not found. Provide it in the following format:\n/create <topic name> - <creator's name>";
const CREATE_FAILED: &str = "Encountered an error while creating topic.";
const STATE_USAGE: &str =
    "Please indicate the state you want the topic in. (e.g. closed, open, etc..)\nIn the format: /state ...";
const STATE_NEEDS_TOPIC: &str = "Please use this command in a topic.";
const STATE_FAILED: &str = "Failed to update topic State. Please try again.";
const DELETE_CONFIRM: &str = "Are you sure you want to delete this topic?\nAll chats will be deleted.";
const DELETE_DONE: &str = "Topic deleted.";
const DELETE_FAILED: &str = "Couldn't delete topic. Contact Admin.";
const DELETE_CANCELLED: &str = "Topic deletion cancelled.";
const ARCHIVE_DENIED: &str = "You are not authorized to use this command";
const ARCHIVE_NEEDS_TOPIC: &str = "Please use this command inside a topic.";
const ARCHIVE_EMPTY: &str = "No messages found in this topic";
const ARCHIVE_FAILED: &str = "Failed to archive";
const DM_DENIED: &str = "You are not authorized to message this bot.";

/// User-facing reply for a rejected state transition.
fn rejection_reply(rejection: &Rejection) -> String {
    match rejection {
        Rejection::AlreadyInState(state) => format!("Topic already has that state: {}", state),
        Rejection::UnrecognizedTarget(_) => format!(
            "Invalid state. Please use one of: {}",
            TopicState::joined_labels()
        ),
    }
}

/// Pre-flight for /archive. Both checks are pure, so a denied caller
/// cannot cause any Bot API or session traffic.
fn archive_preflight(
    policy: &AccessPolicy,
    from: i64,
    thread_id: Option<i64>,
) -> Result<i64, &'static str> {
    if !policy.allows_archive(from) {
        return Err(ARCHIVE_DENIED);
    }
    thread_id.ok_or(ARCHIVE_NEEDS_TOPIC)
}

pub struct Runtime {
    api: TelegramApi,
    session: UserSession,
    policy: AccessPolicy,
    directory: TopicDirectory,
    archive_group_id: i64,
}

impl Runtime {
    pub fn new(config: &Config, api: TelegramApi, session: UserSession) -> Self {
        Self {
            api,
            session,
            policy: AccessPolicy::new(
                config.dm_users.iter().copied(),
                config.archive_users.iter().copied(),
            ),
            directory: TopicDirectory::new(),
            archive_group_id: config.archive_group_id,
        }
    }

    /// Long-poll loop; runs until the process is terminated. Updates are
    /// handled strictly one at a time, in delivery order.
    pub async fn run(&mut self) -> Result<()> {
        if let Err(err) = self.api.sync_bot_commands().await {
            warn!("failed to sync bot commands: {}", err);
        }

        info!("dispatcher started");
        let mut offset: Option<i64> = None;

        loop {
            let updates = match self.api.get_updates(offset).await {
                Ok(updates) => updates,
                Err(err) => {
                    warn!("polling error: {}", err);
                    tokio::time::sleep(POLL_RETRY_PAUSE).await;
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                if let Err(err) = self.handle_update(&update).await {
                    // Truly unexpected faults land here; the loop keeps serving.
                    error!("update {} failed: {:#}", update.update_id, err);
                }
            }
        }
    }

    async fn handle_update(&mut self, update: &Update) -> Result<()> {
        if let Some(message) = &update.message {
            self.handle_message(message).await?;
        }
        if let Some(callback) = &update.callback_query {
            self.handle_callback(callback).await?;
        }
        Ok(())
    }

    async fn handle_message(&mut self, message: &Message) -> Result<()> {
        let Some(text) = message.text.as_deref() else {
            return Ok(());
        };
        let from = message
            .from
            .as_ref()
            .map(|user| user.id)
            .unwrap_or(ANONYMOUS_USER_ID);

        if message.chat.is_private() && !self.policy.allows_dm(from) {
            debug!(user = from, "denied direct message");
            self.reply(message, DM_DENIED).await;
            return Ok(());
        }

        let Some(command) = Command::parse(text) else {
            return Ok(());
        };

        match command {
            Command::Start => self.reply(message, START_TEXT).await,
            Command::Help => self.reply(message, HELP_TEXT).await,
            Command::Create(args) => self.create_topic(message, &args).await,
            Command::Delete => self.confirm_delete(message).await,
            Command::State(label) => self.change_state(message, &label).await,
            Command::Archive => self.archive_topic(message, from).await,
            Command::ExistingTopics => self.list_topics(message).await,
        }
        Ok(())
    }

    async fn create_topic(&mut self, message: &Message, args: &str) {
        let Some(request) = parse_create(args) else {
            self.reply(message, CREATE_USAGE).await;
            return;
        };
        let chat_id = message.chat.id;

        let created = match self
            .api
            .create_forum_topic(chat_id, &request.topic_name, TOPIC_ICON_COLOR)
            .await
        {
            Ok(created) => created,
            Err(err) => {
                warn!("createForumTopic failed: {}", err);
                self.reply(message, CREATE_FAILED).await;
                return;
            }
        };
        let thread_id = created.message_thread_id;

        // The external creation succeeded, so the mirror goes in now; later
        // cosmetic steps must not roll it back.
        self.directory.put(TopicRecord {
            id: thread_id,
            display_name: request.topic_name.clone(),
            creator_name: request.creator_name.clone(),
        });

        // Custom status icon needs the user session; purely cosmetic.
        if let Err(err) = self
            .session
            .edit_topic(chat_id, thread_id, &request.topic_name, Some(CREATED_TOPIC_ICON))
            .await
        {
            if !err.is_not_modified() {
                warn!("setting topic icon failed: {}", err);
            }
        }

        if let Err(err) = self.api.delete_message(chat_id, message.message_id).await {
            debug!("could not delete the /create message: {}", err);
        }

        let announcement = format!("This topic was created by {}", request.creator_name);
        if let Err(err) = self
            .api
            .send_message(chat_id, &announcement, Some(thread_id), None)
            .await
        {
            warn!("announcing the new topic failed: {}", err);
            self.reply(message, CREATE_FAILED).await;
        }
    }

    async fn confirm_delete(&self, message: &Message) {
        let keyboard = vec![vec![
            InlineButton::new("Yes", "confirmDelete"),
            InlineButton::new("No", "disregardDelete"),
        ]];
        if let Err(err) = self
            .api
            .send_message(
                message.chat.id,
                DELETE_CONFIRM,
                message.message_thread_id,
                Some(&keyboard),
            )
            .await
        {
            warn!("failed to ask for delete confirmation: {}", err);
        }
    }

    async fn handle_callback(&mut self, callback: &CallbackQuery) -> Result<()> {
        match callback.data.as_deref() {
            Some("confirmDelete") => self.delete_confirmed(callback).await,
            Some("disregardDelete") => {
                self.answer(callback, DELETE_CANCELLED).await;
            }
            other => {
                debug!(data = ?other, "ignoring unknown callback");
                if let Err(err) = self.api.answer_callback_query(&callback.id, None, false).await {
                    debug!("failed to answer callback: {}", err);
                }
            }
        }
        Ok(())
    }

    async fn delete_confirmed(&mut self, callback: &CallbackQuery) {
        let target = callback
            .message
            .as_ref()
            .and_then(|m| m.message_thread_id.map(|thread| (m.chat.id, thread)));
        let Some((chat_id, thread_id)) = target else {
            self.answer(callback, DELETE_FAILED).await;
            return;
        };

        match self.api.delete_forum_topic(chat_id, thread_id).await {
            Ok(()) => {
                self.directory.remove(thread_id);
                self.answer(callback, DELETE_DONE).await;
            }
            Err(err) => {
                error!("deleting topic {} failed: {}", thread_id, err);
                self.answer(callback, DELETE_FAILED).await;
            }
        }
    }

    async fn change_state(&mut self, message: &Message, label: &str) {
        if label.trim().is_empty() {
            self.reply(message, STATE_USAGE).await;
            return;
        }
        let Some(thread_id) = message.message_thread_id else {
            self.reply(message, STATE_NEEDS_TOPIC).await;
            return;
        };
        let Some(requested) = TopicState::parse(label) else {
            let rejection = Rejection::UnrecognizedTarget(label.trim().to_string());
            self.reply(message, &rejection_reply(&rejection)).await;
            return;
        };
        let chat_id = message.chat.id;

        // The remote title is authoritative; the local directory is only a
        // fallback when the session read itself fails.
        let current_title = match self.session.topic_title(chat_id, thread_id).await {
            Ok(Some(title)) => title,
            Ok(None) => {
                warn!("topic {} not found while changing state", thread_id);
                self.reply(message, STATE_FAILED).await;
                return;
            }
            Err(err) => {
                warn!("live title read failed, using local directory: {}", err);
                match self.directory.get(thread_id) {
                    Some(record) => record.display_name.clone(),
                    None => {
                        self.reply(message, STATE_FAILED).await;
                        return;
                    }
                }
            }
        };

        let new_title = match resolve_transition(&current_title, requested) {
            Ok(new_title) => new_title,
            Err(rejection) => {
                self.reply(message, &rejection_reply(&rejection)).await;
                return;
            }
        };

        let icon = (requested == TopicState::Closed).then_some(CLOSED_TOPIC_ICON);
        match self.session.edit_topic(chat_id, thread_id, &new_title, icon).await {
            Ok(()) => {
                if let Some(record) = self.directory.get(thread_id).cloned() {
                    self.directory.put(TopicRecord {
                        display_name: new_title.clone(),
                        ..record
                    });
                }
                self.reply(message, &format!("Topic state updated to {}", requested))
                    .await;
            }
            Err(SessionError::NotModified) => {
                // The service saw no change; same user-facing no-op message.
                self.reply(message, &rejection_reply(&Rejection::AlreadyInState(requested)))
                    .await;
            }
            Err(err) => {
                error!("state change for topic {} failed: {}", thread_id, err);
                self.reply(message, STATE_FAILED).await;
            }
        }
    }

    async fn archive_topic(&mut self, message: &Message, from: i64) {
        let thread_id = match archive_preflight(&self.policy, from, message.message_thread_id) {
            Ok(thread_id) => thread_id,
            Err(denial) => {
                self.reply(message, denial).await;
                return;
            }
        };
        let chat_id = message.chat.id;

        let title = match self.session.topic_title(chat_id, thread_id).await {
            Ok(Some(title)) => title,
            Ok(None) => {
                warn!("topic {} not found while archiving", thread_id);
                self.reply(message, ARCHIVE_FAILED).await;
                return;
            }
            Err(err) => {
                error!("reading topic title for archive failed: {}", err);
                self.reply(message, ARCHIVE_FAILED).await;
                return;
            }
        };
        let (base_name, _) = decode(&title);

        let texts = match self
            .session
            .recent_messages(chat_id, thread_id, ARCHIVE_HISTORY_LIMIT)
            .await
        {
            Ok(texts) => texts,
            Err(err) => {
                error!("fetching topic history failed: {}", err);
                self.reply(message, ARCHIVE_FAILED).await;
                return;
            }
        };
        if texts.is_empty() {
            self.reply(message, ARCHIVE_EMPTY).await;
            return;
        }

        let archive_name = format!("{} (archived)", base_name);
        let created = match self
            .api
            .create_forum_topic(self.archive_group_id, &archive_name, TOPIC_ICON_COLOR)
            .await
        {
            Ok(created) => created,
            Err(err) => {
                error!("creating the archive topic failed: {}", err);
                self.reply(message, ARCHIVE_FAILED).await;
                return;
            }
        };

        // History arrives newest first; replay oldest first, slowly enough
        // to stay under the flood limits.
        for text in texts.iter().rev() {
            if let Err(err) = self
                .api
                .send_message(
                    self.archive_group_id,
                    text,
                    Some(created.message_thread_id),
                    None,
                )
                .await
            {
                warn!("replaying a message into the archive failed: {}", err);
            }
            tokio::time::sleep(ARCHIVE_REPLAY_PAUSE).await;
        }

        self.reply(
            message,
            &format!(
                "Topic archived successfully. New topic ID: {}",
                created.message_thread_id
            ),
        )
        .await;
    }

    async fn list_topics(&self, message: &Message) {
        let mut listing = String::from("Existing topics: \n");
        if self.directory.is_empty() {
            listing.push_str("None found.");
        } else {
            for record in self.directory.records() {
                listing.push_str(&format!(
                    "\n• {} (created by {})",
                    record.display_name, record.creator_name
                ));
            }
        }
        self.reply(message, &listing).await;
    }

    /// Best-effort reply into the thread the command came from. A reply
    /// into a topic deleted under us is dropped silently.
    async fn reply(&self, message: &Message, text: &str) {
        if let Err(err) = self
            .api
            .send_message(message.chat.id, text, message.message_thread_id, None)
            .await
        {
            if err.is_thread_missing() {
                debug!("reply target topic is gone, ignoring");
            } else {
                warn!("failed to send reply: {}", err);
            }
        }
    }

    async fn answer(&self, callback: &CallbackQuery, text: &str) {
        if let Err(err) = self
            .api
            .answer_callback_query(&callback.id, Some(text), true)
            .await
        {
            warn!("failed to answer callback query: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_gate_is_decided_before_any_client_call() {
        let policy = AccessPolicy::new([], [333]);
        assert_eq!(archive_preflight(&policy, 999, Some(42)), Err(ARCHIVE_DENIED));
        // The gate outranks the missing-thread check.
        assert_eq!(archive_preflight(&policy, 999, None), Err(ARCHIVE_DENIED));
        assert_eq!(
            archive_preflight(&policy, ANONYMOUS_USER_ID, Some(42)),
            Err(ARCHIVE_DENIED)
        );
    }

    #[test]
    fn archive_needs_a_topic_thread() {
        let policy = AccessPolicy::new([], [333]);
        assert_eq!(archive_preflight(&policy, 333, None), Err(ARCHIVE_NEEDS_TOPIC));
        assert_eq!(archive_preflight(&policy, 333, Some(42)), Ok(42));
    }

    #[test]
    fn rejection_replies_match_the_command_surface() {
        assert_eq!(
            rejection_reply(&Rejection::AlreadyInState(TopicState::Closed)),
            "Topic already has that state: CLOSED"
        );
        assert_eq!(
            rejection_reply(&Rejection::UnrecognizedTarget("FROZEN".to_string())),
            "Invalid state. Please use one of: OPEN, CLOSED, PENDING REFUND, PENDING FIX"
        );
    }
}
