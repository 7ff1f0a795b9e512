//! Inbound event routing.
//!
//! One entry point per connection read loop: perform the store write first,
//! then fan the result out through the registry. Store failures are
//! unicast back to the requesting client as an `error` event and never
//! broadcast.

use tracing::debug;

use crate::events::{ChatEvent, ClientEvent};
use crate::registry::{ConnectionRegistry, OnlineUser};
use crate::store::{MessageStore, StoreError};

const CODE_BAD_REQUEST: u16 = 400;
const CODE_FORBIDDEN: u16 = 403;
const CODE_NOT_FOUND: u16 = 404;
const CODE_INTERNAL: u16 = 500;

/// Route one client event for `sender` on `group_id`.
///
/// Message, reaction, and read-receipt events are echoed to the whole group
/// including the author, so clients render from the server's copy. Typing
/// indicators exclude the sender.
pub async fn dispatch_client_event<S: MessageStore + ?Sized>(
    registry: &ConnectionRegistry,
    store: &S,
    group_id: &str,
    sender: &OnlineUser,
    event: ClientEvent,
) {
    match event {
        ClientEvent::SendMessage { text } => {
            if text.trim().is_empty() {
                report_error(
                    registry,
                    group_id,
                    sender,
                    CODE_BAD_REQUEST,
                    "message text must not be empty",
                )
                .await;
                return;
            }
            match store.append_message(group_id, sender, &text).await {
                Ok(message) => {
                    let event = ChatEvent::new_message(message);
                    registry.broadcast_to_group(group_id, &event, None).await;
                }
                Err(e) => report_store_error(registry, group_id, sender, e).await,
            }
        }
        ClientEvent::DeleteMessage { message_id } => {
            match store
                .delete_message(group_id, &sender.email, &message_id)
                .await
            {
                Ok(()) => {
                    let event = ChatEvent::message_deleted(group_id, &message_id, &sender.email);
                    registry.broadcast_to_group(group_id, &event, None).await;
                }
                Err(e) => report_store_error(registry, group_id, sender, e).await,
            }
        }
        ClientEvent::StartTyping => {
            let event = ChatEvent::typing_start(group_id, &sender.email, &sender.name);
            registry
                .broadcast_to_group(group_id, &event, Some(&sender.email))
                .await;
        }
        ClientEvent::StopTyping => {
            let event = ChatEvent::typing_stop(group_id, &sender.email);
            registry
                .broadcast_to_group(group_id, &event, Some(&sender.email))
                .await;
        }
        ClientEvent::MarkRead { message_id } => {
            match store.mark_read(group_id, &sender.email, &message_id).await {
                Ok(()) => {
                    let event = ChatEvent::read_receipt(group_id, &sender.email, &message_id);
                    registry
                        .broadcast_to_group(group_id, &event, Some(&sender.email))
                        .await;
                }
                Err(e) => report_store_error(registry, group_id, sender, e).await,
            }
        }
        ClientEvent::AddReaction { message_id, emoji } => {
            match store
                .add_reaction(group_id, &message_id, &sender.email, &emoji)
                .await
            {
                Ok(()) => {
                    let event =
                        ChatEvent::reaction_added(group_id, &message_id, &sender.email, &emoji);
                    registry.broadcast_to_group(group_id, &event, None).await;
                }
                Err(e) => report_store_error(registry, group_id, sender, e).await,
            }
        }
        ClientEvent::RemoveReaction { message_id, emoji } => {
            match store
                .remove_reaction(group_id, &message_id, &sender.email, &emoji)
                .await
            {
                Ok(()) => {
                    let event =
                        ChatEvent::reaction_removed(group_id, &message_id, &sender.email, &emoji);
                    registry.broadcast_to_group(group_id, &event, None).await;
                }
                Err(e) => report_store_error(registry, group_id, sender, e).await,
            }
        }
        ClientEvent::GetOnlineUsers => {
            let users = registry.get_online_users(group_id).await;
            let event = ChatEvent::online_users(group_id, users);
            registry.send_to_user(group_id, &sender.email, &event).await;
        }
    }
}

async fn report_store_error(
    registry: &ConnectionRegistry,
    group_id: &str,
    sender: &OnlineUser,
    err: StoreError,
) {
    let code = match &err {
        StoreError::MessageNotFound(_) => CODE_NOT_FOUND,
        StoreError::NotAuthor { .. } => CODE_FORBIDDEN,
        StoreError::Backend(_) => CODE_INTERNAL,
    };
    debug!(group = %group_id, user = %sender.email, error = %err, "Rejected client event");
    report_error(registry, group_id, sender, code, &err.to_string()).await;
}

async fn report_error(
    registry: &ConnectionRegistry,
    group_id: &str,
    sender: &OnlineUser,
    code: u16,
    message: &str,
) {
    let event = ChatEvent::error(code, message);
    registry.send_to_user(group_id, &sender.email, &event).await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::channel::testing::RecordingChannel;
    use crate::store::StoredMessage;

    /// Minimal store: appends succeed, everything addressing a message id
    /// fails with `MessageNotFound` unless the id was appended first.
    #[derive(Default)]
    struct ScriptedStore {
        messages: Mutex<Vec<StoredMessage>>,
    }

    #[async_trait]
    impl MessageStore for ScriptedStore {
        async fn append_message(
            &self,
            group_id: &str,
            author: &OnlineUser,
            text: &str,
        ) -> Result<StoredMessage, StoreError> {
            let message = StoredMessage {
                id: format!("m-{}", self.messages.lock().unwrap().len() + 1),
                group_id: group_id.to_string(),
                user_email: author.email.clone(),
                user_name: author.name.clone(),
                text: text.to_string(),
                created_at: Utc::now(),
            };
            self.messages.lock().unwrap().push(message.clone());
            Ok(message)
        }

        async fn delete_message(
            &self,
            _group_id: &str,
            user_email: &str,
            message_id: &str,
        ) -> Result<(), StoreError> {
            let mut messages = self.messages.lock().unwrap();
            let Some(index) = messages.iter().position(|m| m.id == message_id) else {
                return Err(StoreError::MessageNotFound(message_id.to_string()));
            };
            if messages[index].user_email != user_email {
                return Err(StoreError::NotAuthor {
                    user: user_email.to_string(),
                    message_id: message_id.to_string(),
                });
            }
            messages.remove(index);
            Ok(())
        }

        async fn update_message(
            &self,
            _group_id: &str,
            user_email: &str,
            message_id: &str,
            text: &str,
        ) -> Result<StoredMessage, StoreError> {
            let mut messages = self.messages.lock().unwrap();
            let Some(message) = messages.iter_mut().find(|m| m.id == message_id) else {
                return Err(StoreError::MessageNotFound(message_id.to_string()));
            };
            if message.user_email != user_email {
                return Err(StoreError::NotAuthor {
                    user: user_email.to_string(),
                    message_id: message_id.to_string(),
                });
            }
            message.text = text.to_string();
            Ok(message.clone())
        }

        async fn add_reaction(
            &self,
            _group_id: &str,
            message_id: &str,
            _user_email: &str,
            _emoji: &str,
        ) -> Result<(), StoreError> {
            self.require_message(message_id)
        }

        async fn remove_reaction(
            &self,
            _group_id: &str,
            message_id: &str,
            _user_email: &str,
            _emoji: &str,
        ) -> Result<(), StoreError> {
            self.require_message(message_id)
        }

        async fn mark_read(
            &self,
            _group_id: &str,
            _user_email: &str,
            message_id: &str,
        ) -> Result<(), StoreError> {
            self.require_message(message_id)
        }
    }

    impl ScriptedStore {
        fn require_message(&self, message_id: &str) -> Result<(), StoreError> {
            if self
                .messages
                .lock()
                .unwrap()
                .iter()
                .any(|m| m.id == message_id)
            {
                Ok(())
            } else {
                Err(StoreError::MessageNotFound(message_id.to_string()))
            }
        }
    }

    fn profile(email: &str, name: &str) -> OnlineUser {
        OnlineUser {
            email: email.to_string(),
            name: name.to_string(),
            avatar: None,
        }
    }

    async fn lobby_with_two_members(
        registry: &ConnectionRegistry,
    ) -> (Arc<RecordingChannel>, Arc<RecordingChannel>) {
        let ana = Arc::new(RecordingChannel::new());
        let bo = Arc::new(RecordingChannel::new());
        registry
            .connect("lobby", profile("ana@example.com", "Ana"), ana.clone())
            .await;
        registry
            .connect("lobby", profile("bo@example.com", "Bo"), bo.clone())
            .await;
        (ana, bo)
    }

    #[tokio::test]
    async fn test_send_message_is_stored_then_echoed_to_everyone() {
        let registry = ConnectionRegistry::new();
        let store = ScriptedStore::default();
        let (ana, bo) = lobby_with_two_members(&registry).await;

        dispatch_client_event(
            &registry,
            &store,
            "lobby",
            &profile("ana@example.com", "Ana"),
            ClientEvent::SendMessage {
                text: "pool is open".to_string(),
            },
        )
        .await;

        assert_eq!(store.messages.lock().unwrap().len(), 1);
        for channel in [&ana, &bo] {
            assert!(channel
                .sent()
                .iter()
                .any(|m| m.contains("\"new_message\"") && m.contains("pool is open")));
        }
    }

    #[tokio::test]
    async fn test_empty_message_is_rejected_to_sender_only() {
        let registry = ConnectionRegistry::new();
        let store = ScriptedStore::default();
        let (ana, bo) = lobby_with_two_members(&registry).await;

        dispatch_client_event(
            &registry,
            &store,
            "lobby",
            &profile("ana@example.com", "Ana"),
            ClientEvent::SendMessage {
                text: "   ".to_string(),
            },
        )
        .await;

        assert!(store.messages.lock().unwrap().is_empty());
        assert!(ana.sent().iter().any(|m| m.contains("\"error\"")));
        assert!(!bo.sent().iter().any(|m| m.contains("\"error\"")));
    }

    #[tokio::test]
    async fn test_delete_by_non_author_reports_forbidden() {
        let registry = ConnectionRegistry::new();
        let store = ScriptedStore::default();
        let (_ana, bo) = lobby_with_two_members(&registry).await;

        store
            .append_message("lobby", &profile("ana@example.com", "Ana"), "mine")
            .await
            .unwrap();

        dispatch_client_event(
            &registry,
            &store,
            "lobby",
            &profile("bo@example.com", "Bo"),
            ClientEvent::DeleteMessage {
                message_id: "m-1".to_string(),
            },
        )
        .await;

        assert_eq!(store.messages.lock().unwrap().len(), 1);
        assert!(bo
            .sent()
            .iter()
            .any(|m| m.contains("\"error\"") && m.contains("\"code\":403")));
    }

    #[tokio::test]
    async fn test_reaction_on_missing_message_reports_not_found() {
        let registry = ConnectionRegistry::new();
        let store = ScriptedStore::default();
        let (ana, bo) = lobby_with_two_members(&registry).await;

        dispatch_client_event(
            &registry,
            &store,
            "lobby",
            &profile("ana@example.com", "Ana"),
            ClientEvent::AddReaction {
                message_id: "m-404".to_string(),
                emoji: "🎉".to_string(),
            },
        )
        .await;

        assert!(ana
            .sent()
            .iter()
            .any(|m| m.contains("\"error\"") && m.contains("\"code\":404")));
        assert!(!bo.sent().iter().any(|m| m.contains("\"reaction_added\"")));
    }

    #[tokio::test]
    async fn test_typing_indicators_skip_the_sender() {
        let registry = ConnectionRegistry::new();
        let store = ScriptedStore::default();
        let (ana, bo) = lobby_with_two_members(&registry).await;

        dispatch_client_event(
            &registry,
            &store,
            "lobby",
            &profile("ana@example.com", "Ana"),
            ClientEvent::StartTyping,
        )
        .await;
        dispatch_client_event(
            &registry,
            &store,
            "lobby",
            &profile("ana@example.com", "Ana"),
            ClientEvent::StopTyping,
        )
        .await;

        let bo_received = bo.sent();
        assert!(bo_received.iter().any(|m| m.contains("\"typing_start\"")));
        assert!(bo_received.iter().any(|m| m.contains("\"typing_stop\"")));
        assert!(!ana.sent().iter().any(|m| m.contains("typing")));
    }

    #[tokio::test]
    async fn test_get_online_users_replies_to_requester_only() {
        let registry = ConnectionRegistry::new();
        let store = ScriptedStore::default();
        let (ana, bo) = lobby_with_two_members(&registry).await;

        dispatch_client_event(
            &registry,
            &store,
            "lobby",
            &profile("ana@example.com", "Ana"),
            ClientEvent::GetOnlineUsers,
        )
        .await;

        let reply = ana
            .sent()
            .iter()
            .find(|m| m.contains("\"online_users\""))
            .cloned()
            .expect("requester should receive the snapshot");
        assert!(reply.contains("ana@example.com"));
        assert!(reply.contains("bo@example.com"));
        assert!(!bo.sent().iter().any(|m| m.contains("\"online_users\"")));
    }

    #[tokio::test]
    async fn test_mark_read_broadcasts_receipt_to_others() {
        let registry = ConnectionRegistry::new();
        let store = ScriptedStore::default();
        let (ana, bo) = lobby_with_two_members(&registry).await;

        store
            .append_message("lobby", &profile("bo@example.com", "Bo"), "news")
            .await
            .unwrap();

        dispatch_client_event(
            &registry,
            &store,
            "lobby",
            &profile("ana@example.com", "Ana"),
            ClientEvent::MarkRead {
                message_id: "m-1".to_string(),
            },
        )
        .await;

        assert!(bo
            .sent()
            .iter()
            .any(|m| m.contains("\"read_receipt\"") && m.contains("ana@example.com")));
        assert!(!ana.sent().iter().any(|m| m.contains("\"read_receipt\"")));
    }
}
