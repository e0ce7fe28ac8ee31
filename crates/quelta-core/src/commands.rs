//! Command surface parsing.
//!
//! Pure string handling only; malformed input is reported back as a usage
//! message by the dispatcher without any external call being made.

/// One inbound slash command with its raw arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Create(String),
    Delete,
    State(String),
    Archive,
    ExistingTopics,
}

impl Command {
    /// Recognizes `/command`, `/command@BotName`, and trailing arguments.
    /// Unknown commands and plain chatter yield `None`.
    pub fn parse(text: &str) -> Option<Command> {
        let text = text.trim();
        if !text.starts_with('/') {
            return None;
        }
        let (head, args) = match text.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (text, ""),
        };
        let name = head.trim_start_matches('/');
        let name = name.split('@').next().unwrap_or(name);

        match name {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "create" => Some(Command::Create(args.to_string())),
            "delete" => Some(Command::Delete),
            "state" => Some(Command::State(args.to_string())),
            "archive" => Some(Command::Archive),
            "existingtopics" => Some(Command::ExistingTopics),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRequest {
    pub topic_name: String,
    pub creator_name: String,
}

/// Splits `<topic name> - <creator name>`. The creator is the last
/// ` - `-delimited part; the rest is the topic name, so names containing
/// ` - ` survive. `None` means the usage message should be shown.
pub fn parse_create(args: &str) -> Option<CreateRequest> {
    let parts: Vec<&str> = args.split(" - ").collect();
    if parts.len() < 2 {
        return None;
    }
    let creator_name = parts.last()?.trim().to_string();
    let topic_name = parts[..parts.len() - 1].join(" - ").trim().to_string();
    if topic_name.is_empty() || creator_name.is_empty() {
        return None;
    }
    Some(CreateRequest {
        topic_name,
        creator_name,
    })
}
