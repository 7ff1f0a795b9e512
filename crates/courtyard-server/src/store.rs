//! In-memory message store.
//!
//! Durable chat history belongs to the portal's document database, which is
//! an external collaborator; this implementation backs the chat runtime for
//! development and test deployments and keeps the business rules
//! (author-only delete, idempotent reactions) in one place.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use courtyard_chat::{MessageStore, OnlineUser, StoreError, StoredMessage};

struct MessageRecord {
    message: StoredMessage,
    /// emoji -> set of member emails that reacted with it
    reactions: HashMap<String, HashSet<String>>,
}

/// DashMap-backed [`MessageStore`].
#[derive(Default)]
pub struct MemoryMessageStore {
    /// group id -> message records in arrival order
    messages: DashMap<String, Vec<MessageRecord>>,
    /// (group id, member email) -> id of the last message they read
    read_cursors: DashMap<(String, String), String>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages currently held for a group.
    pub fn message_count(&self, group_id: &str) -> usize {
        self.messages
            .get(group_id)
            .map(|records| records.len())
            .unwrap_or(0)
    }

    /// The last message a member marked as read, if any.
    pub fn last_read(&self, group_id: &str, user_email: &str) -> Option<String> {
        self.read_cursors
            .get(&(group_id.to_string(), user_email.to_string()))
            .map(|id| id.value().clone())
    }

    /// Members that reacted to a message with the given emoji.
    pub fn reaction_users(&self, group_id: &str, message_id: &str, emoji: &str) -> Vec<String> {
        let Some(records) = self.messages.get(group_id) else {
            return Vec::new();
        };
        let mut users: Vec<String> = records
            .iter()
            .find(|record| record.message.id == message_id)
            .and_then(|record| record.reactions.get(emoji))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();
        users.sort();
        users
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append_message(
        &self,
        group_id: &str,
        author: &OnlineUser,
        text: &str,
    ) -> Result<StoredMessage, StoreError> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            group_id: group_id.to_string(),
            user_email: author.email.clone(),
            user_name: author.name.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
        };

        self.messages
            .entry(group_id.to_string())
            .or_default()
            .push(MessageRecord {
                message: message.clone(),
                reactions: HashMap::new(),
            });

        debug!(group = %group_id, message = %message.id, "Message stored");
        Ok(message)
    }

    async fn delete_message(
        &self,
        group_id: &str,
        user_email: &str,
        message_id: &str,
    ) -> Result<(), StoreError> {
        let mut records = self
            .messages
            .get_mut(group_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        let index = records
            .iter()
            .position(|record| record.message.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        if records[index].message.user_email != user_email {
            return Err(StoreError::NotAuthor {
                user: user_email.to_string(),
                message_id: message_id.to_string(),
            });
        }

        records.remove(index);
        debug!(group = %group_id, message = %message_id, "Message deleted");
        Ok(())
    }

    async fn update_message(
        &self,
        group_id: &str,
        user_email: &str,
        message_id: &str,
        text: &str,
    ) -> Result<StoredMessage, StoreError> {
        let mut records = self
            .messages
            .get_mut(group_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        let record = records
            .iter_mut()
            .find(|record| record.message.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        if record.message.user_email != user_email {
            return Err(StoreError::NotAuthor {
                user: user_email.to_string(),
                message_id: message_id.to_string(),
            });
        }

        record.message.text = text.to_string();
        debug!(group = %group_id, message = %message_id, "Message updated");
        Ok(record.message.clone())
    }

    async fn add_reaction(
        &self,
        group_id: &str,
        message_id: &str,
        user_email: &str,
        emoji: &str,
    ) -> Result<(), StoreError> {
        let mut records = self
            .messages
            .get_mut(group_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        let record = records
            .iter_mut()
            .find(|record| record.message.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        record
            .reactions
            .entry(emoji.to_string())
            .or_default()
            .insert(user_email.to_string());
        Ok(())
    }

    async fn remove_reaction(
        &self,
        group_id: &str,
        message_id: &str,
        user_email: &str,
        emoji: &str,
    ) -> Result<(), StoreError> {
        let mut records = self
            .messages
            .get_mut(group_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        let record = records
            .iter_mut()
            .find(|record| record.message.id == message_id)
            .ok_or_else(|| StoreError::MessageNotFound(message_id.to_string()))?;

        if let Some(users) = record.reactions.get_mut(emoji) {
            users.remove(user_email);
            if users.is_empty() {
                record.reactions.remove(emoji);
            }
        }
        Ok(())
    }

    async fn mark_read(
        &self,
        group_id: &str,
        user_email: &str,
        message_id: &str,
    ) -> Result<(), StoreError> {
        let known = self
            .messages
            .get(group_id)
            .map(|records| records.iter().any(|record| record.message.id == message_id))
            .unwrap_or(false);
        if !known {
            return Err(StoreError::MessageNotFound(message_id.to_string()));
        }

        self.read_cursors.insert(
            (group_id.to_string(), user_email.to_string()),
            message_id.to_string(),
        );
        Ok(())
    }
}
