//! Persistence seam for chat business logic.
//!
//! The chat runtime defines only the operations the inbound event taxonomy
//! needs; the server crate provides the implementation, the same way the
//! rest of the portal backend owns durable state. The registry never talks
//! to the store directly — the dispatcher performs the write first and only
//! then fans the result out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::registry::OnlineUser;

/// A chat message as stored and echoed on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub group_id: String,
    pub user_email: String,
    pub user_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Errors a store implementation can report.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("message {0} not found")]
    MessageNotFound(String),

    #[error("{user} is not the author of message {message_id}")]
    NotAuthor { user: String, message_id: String },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Operations the inbound event taxonomy needs from persistence.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a new message to a group's history and return it as stored.
    async fn append_message(
        &self,
        group_id: &str,
        author: &OnlineUser,
        text: &str,
    ) -> Result<StoredMessage, StoreError>;

    /// Delete a message. Only the author may delete their own message.
    async fn delete_message(
        &self,
        group_id: &str,
        user_email: &str,
        message_id: &str,
    ) -> Result<(), StoreError>;

    /// Replace a message's text and return the updated message. Only the
    /// author may edit their own message.
    async fn update_message(
        &self,
        group_id: &str,
        user_email: &str,
        message_id: &str,
        text: &str,
    ) -> Result<StoredMessage, StoreError>;

    /// Add `emoji` to a message's reactions on behalf of `user_email`.
    /// Adding the same reaction twice is a no-op.
    async fn add_reaction(
        &self,
        group_id: &str,
        message_id: &str,
        user_email: &str,
        emoji: &str,
    ) -> Result<(), StoreError>;

    /// Remove a previously added reaction. Removing a reaction that was
    /// never added is a no-op.
    async fn remove_reaction(
        &self,
        group_id: &str,
        message_id: &str,
        user_email: &str,
        emoji: &str,
    ) -> Result<(), StoreError>;

    /// Record that `user_email` has read the group up to `message_id`.
    async fn mark_read(
        &self,
        group_id: &str,
        user_email: &str,
        message_id: &str,
    ) -> Result<(), StoreError>;
}
