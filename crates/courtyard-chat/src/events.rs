//! Wire events exchanged over a chat connection.
//!
//! Every event is a JSON object tagged by `type`; outbound events carry a
//! `timestamp` in UTC ISO-8601. The registry itself only originates
//! `user_joined`, `user_left`, and the unicast `online_users`/`error`
//! replies — everything else is produced by the dispatcher after the store
//! write has succeeded, or by business callers outside this crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::OnlineUser;
use crate::store::StoredMessage;

/// Server-to-client events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    NewMessage {
        group_id: String,
        message: StoredMessage,
        timestamp: DateTime<Utc>,
    },
    MessageDeleted {
        group_id: String,
        message_id: String,
        user_email: String,
        timestamp: DateTime<Utc>,
    },
    MessageUpdated {
        group_id: String,
        message: StoredMessage,
        timestamp: DateTime<Utc>,
    },
    TypingStart {
        group_id: String,
        user_email: String,
        user_name: String,
        timestamp: DateTime<Utc>,
    },
    TypingStop {
        group_id: String,
        user_email: String,
        timestamp: DateTime<Utc>,
    },
    ReadReceipt {
        group_id: String,
        user_email: String,
        message_id: String,
        timestamp: DateTime<Utc>,
    },
    ReactionAdded {
        group_id: String,
        message_id: String,
        user_email: String,
        emoji: String,
        timestamp: DateTime<Utc>,
    },
    ReactionRemoved {
        group_id: String,
        message_id: String,
        user_email: String,
        emoji: String,
        timestamp: DateTime<Utc>,
    },
    UserJoined {
        group_id: String,
        user_email: String,
        user_name: String,
        timestamp: DateTime<Utc>,
    },
    UserLeft {
        group_id: String,
        user_email: String,
        timestamp: DateTime<Utc>,
    },
    OnlineUsers {
        group_id: String,
        users: Vec<OnlineUser>,
        timestamp: DateTime<Utc>,
    },
    Error {
        code: u16,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl ChatEvent {
    pub fn new_message(message: StoredMessage) -> Self {
        Self::NewMessage {
            group_id: message.group_id.clone(),
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn message_deleted(group_id: &str, message_id: &str, user_email: &str) -> Self {
        Self::MessageDeleted {
            group_id: group_id.to_string(),
            message_id: message_id.to_string(),
            user_email: user_email.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn message_updated(message: StoredMessage) -> Self {
        Self::MessageUpdated {
            group_id: message.group_id.clone(),
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn typing_start(group_id: &str, user_email: &str, user_name: &str) -> Self {
        Self::TypingStart {
            group_id: group_id.to_string(),
            user_email: user_email.to_string(),
            user_name: user_name.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn typing_stop(group_id: &str, user_email: &str) -> Self {
        Self::TypingStop {
            group_id: group_id.to_string(),
            user_email: user_email.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn read_receipt(group_id: &str, user_email: &str, message_id: &str) -> Self {
        Self::ReadReceipt {
            group_id: group_id.to_string(),
            user_email: user_email.to_string(),
            message_id: message_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn reaction_added(group_id: &str, message_id: &str, user_email: &str, emoji: &str) -> Self {
        Self::ReactionAdded {
            group_id: group_id.to_string(),
            message_id: message_id.to_string(),
            user_email: user_email.to_string(),
            emoji: emoji.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn reaction_removed(
        group_id: &str,
        message_id: &str,
        user_email: &str,
        emoji: &str,
    ) -> Self {
        Self::ReactionRemoved {
            group_id: group_id.to_string(),
            message_id: message_id.to_string(),
            user_email: user_email.to_string(),
            emoji: emoji.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn user_joined(group_id: &str, user: &OnlineUser) -> Self {
        Self::UserJoined {
            group_id: group_id.to_string(),
            user_email: user.email.clone(),
            user_name: user.name.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn user_left(group_id: &str, user_email: &str) -> Self {
        Self::UserLeft {
            group_id: group_id.to_string(),
            user_email: user_email.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn online_users(group_id: &str, users: Vec<OnlineUser>) -> Self {
        Self::OnlineUsers {
            group_id: group_id.to_string(),
            users,
            timestamp: Utc::now(),
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Client-to-server events. The group is implied by the connection the
/// event arrived on, so none of these carry a group id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    SendMessage { text: String },
    DeleteMessage { message_id: String },
    StartTyping,
    StopTyping,
    MarkRead { message_id: String },
    AddReaction { message_id: String, emoji: String },
    RemoveReaction { message_id: String, emoji: String },
    GetOnlineUsers,
}
