//! Connection registry: live group membership and fan-out.
//!
//! Tracks which residents are connected to which group and routes events
//! among them. There is at most one entry per `(group, identity)`; a
//! reconnect replaces the previous entry and closes its channel. All table
//! mutations serialize through a single lock, channel sends happen outside
//! the critical section, and a member whose send fails is evicted as if it
//! had disconnected — stale entries self-heal on the next delivery attempt.
//!
//! The registry is an explicitly constructed object: build one in `main`,
//! wrap it in an `Arc`, and pass it through application state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::channel::ChatChannel;
use crate::events::ChatEvent;
use crate::metrics::ChatMetrics;

/// Presence entry reported for a connected member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    /// Stable identity key, unique per member within a group.
    pub email: String,
    /// Display name cached alongside the connection.
    pub name: String,
    /// Optional avatar reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Explicit group lifecycle: a group exists exactly while it has members.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupState {
    /// No live connections; the group holds no registry state at all.
    Absent,
    /// At least one member is connected.
    Active { members: usize },
}

struct MemberEntry {
    profile: OnlineUser,
    channel: Arc<dyn ChatChannel>,
}

#[derive(Default)]
struct GroupEntry {
    members: HashMap<String, MemberEntry>,
}

/// Shared registry of live connections, keyed by group then member identity.
pub struct ConnectionRegistry {
    groups: Mutex<HashMap<String, GroupEntry>>,
    metrics: ChatMetrics,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            groups: Mutex::new(HashMap::new()),
            metrics: ChatMetrics::new(),
        }
    }

    /// Metrics maintained by this registry, for the exporter endpoint.
    pub fn metrics(&self) -> &ChatMetrics {
        &self.metrics
    }

    /// Register a freshly accepted connection.
    ///
    /// The transport handshake must already be complete when the channel is
    /// handed over. If the same member is already connected to the group,
    /// the previous channel is closed (best-effort) before the replacement
    /// is installed, so the member never has two live entries. Remaining
    /// members are notified with a `user_joined` event after the tables are
    /// updated.
    pub async fn connect(
        &self,
        group_id: &str,
        profile: OnlineUser,
        channel: Arc<dyn ChatChannel>,
    ) {
        let replaced = {
            let mut groups = self.groups.lock().await;
            if !groups.contains_key(group_id) {
                self.metrics.record_group_created();
            }
            let group = groups.entry(group_id.to_string()).or_default();

            let previous = group.members.remove(&profile.email);
            if let Some(prev) = &previous {
                if let Err(e) = prev.channel.close().await {
                    debug!(
                        group = %group_id,
                        user = %profile.email,
                        error = %e,
                        "Failed to close replaced channel"
                    );
                }
            } else {
                self.metrics.record_member_connected();
            }

            group.members.insert(
                profile.email.clone(),
                MemberEntry {
                    profile: profile.clone(),
                    channel,
                },
            );
            previous.is_some()
        };

        debug!(
            group = %group_id,
            user = %profile.email,
            replaced = replaced,
            "Member connected"
        );

        let joined = ChatEvent::user_joined(group_id, &profile);
        self.broadcast_to_group(group_id, &joined, Some(&profile.email))
            .await;
    }

    /// Remove a member's connection and notify the remaining members.
    ///
    /// Idempotent: disconnecting an identity that has no entry in the group
    /// is a no-op. Removing the last member drops the group entirely.
    pub async fn disconnect(&self, group_id: &str, user_email: &str) {
        if !self.remove_member(group_id, user_email).await {
            return;
        }

        debug!(group = %group_id, user = %user_email, "Member disconnected");

        let left = ChatEvent::user_left(group_id, user_email);
        self.broadcast_to_group(group_id, &left, None).await;
    }

    /// Send one event to every member of a group, optionally excluding one.
    ///
    /// The event is serialized once. A failed send never aborts delivery to
    /// the remaining recipients; instead the failing member is evicted after
    /// all sends were attempted, and each eviction notifies the survivors
    /// with its own `user_left`. A member is evicted at most once per
    /// broadcast call. Unknown groups are a no-op.
    pub async fn broadcast_to_group(
        &self,
        group_id: &str,
        event: &ChatEvent,
        exclude_user: Option<&str>,
    ) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(group = %group_id, error = %e, "Failed to serialize event, dropping broadcast");
                return;
            }
        };

        let mut evicted: HashSet<String> = HashSet::new();
        let mut pending = self.deliver(group_id, &payload, exclude_user, &evicted).await;

        while let Some(user_email) = pending.pop() {
            if !evicted.insert(user_email.clone()) {
                continue;
            }
            if !self.remove_member(group_id, &user_email).await {
                continue;
            }
            warn!(group = %group_id, user = %user_email, "Evicting member after failed send");

            let left = ChatEvent::user_left(group_id, &user_email);
            match serde_json::to_string(&left) {
                Ok(left_payload) => {
                    let failed = self.deliver(group_id, &left_payload, None, &evicted).await;
                    pending.extend(failed);
                }
                Err(e) => {
                    warn!(group = %group_id, error = %e, "Failed to serialize eviction notice");
                }
            }
        }

        self.metrics.record_event_broadcast();
    }

    /// Deliver one event to a single member.
    ///
    /// Returns `true` only when the member had a live entry and the send
    /// succeeded. An unknown group or member returns `false` without an
    /// error; a failed send evicts the member before returning `false`.
    pub async fn send_to_user(&self, group_id: &str, user_email: &str, event: &ChatEvent) -> bool {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(group = %group_id, user = %user_email, error = %e, "Failed to serialize event");
                return false;
            }
        };

        let channel = {
            let groups = self.groups.lock().await;
            groups
                .get(group_id)
                .and_then(|group| group.members.get(user_email))
                .map(|member| Arc::clone(&member.channel))
        };
        let Some(channel) = channel else {
            return false;
        };

        match channel.send(&payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    group = %group_id,
                    user = %user_email,
                    error = %e,
                    "Send failed, treating member as disconnected"
                );
                self.metrics.record_send_failure();
                self.disconnect(group_id, user_email).await;
                false
            }
        }
    }

    /// Point-in-time presence snapshot for a group, ordered by identity.
    /// Unknown groups yield an empty list.
    pub async fn get_online_users(&self, group_id: &str) -> Vec<OnlineUser> {
        let groups = self.groups.lock().await;
        let mut users: Vec<OnlineUser> = groups
            .get(group_id)
            .map(|group| group.members.values().map(|m| m.profile.clone()).collect())
            .unwrap_or_default();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    /// Whether the member currently has a live entry in the group.
    pub async fn is_user_online(&self, group_id: &str, user_email: &str) -> bool {
        let groups = self.groups.lock().await;
        groups
            .get(group_id)
            .map(|group| group.members.contains_key(user_email))
            .unwrap_or(false)
    }

    /// Number of live connections in the group; 0 for an unknown group.
    pub async fn connection_count(&self, group_id: &str) -> usize {
        let groups = self.groups.lock().await;
        groups
            .get(group_id)
            .map(|group| group.members.len())
            .unwrap_or(0)
    }

    /// The group's lifecycle state at a single serialization point.
    pub async fn group_state(&self, group_id: &str) -> GroupState {
        let groups = self.groups.lock().await;
        match groups.get(group_id) {
            Some(group) => GroupState::Active {
                members: group.members.len(),
            },
            None => GroupState::Absent,
        }
    }

    /// Remove a member entry; drops the group when it becomes empty.
    /// Returns whether an entry was actually removed.
    async fn remove_member(&self, group_id: &str, user_email: &str) -> bool {
        let mut groups = self.groups.lock().await;
        let Some(group) = groups.get_mut(group_id) else {
            return false;
        };
        if group.members.remove(user_email).is_none() {
            return false;
        }
        self.metrics.record_member_disconnected();

        if group.members.is_empty() {
            groups.remove(group_id);
            self.metrics.record_group_dropped();
            debug!(group = %group_id, "Last member left, dropping group");
        }
        true
    }

    /// Snapshot the recipient channels under the lock, then send outside it.
    /// Returns the identities whose send failed.
    async fn deliver(
        &self,
        group_id: &str,
        payload: &str,
        exclude_user: Option<&str>,
        skip: &HashSet<String>,
    ) -> Vec<String> {
        let recipients: Vec<(String, Arc<dyn ChatChannel>)> = {
            let groups = self.groups.lock().await;
            let Some(group) = groups.get(group_id) else {
                return Vec::new();
            };
            group
                .members
                .iter()
                .filter(|(email, _)| {
                    exclude_user != Some(email.as_str()) && !skip.contains(email.as_str())
                })
                .map(|(email, member)| (email.clone(), Arc::clone(&member.channel)))
                .collect()
        };

        let mut failed = Vec::new();
        for (email, channel) in recipients {
            if let Err(e) = channel.send(payload).await {
                warn!(
                    group = %group_id,
                    user = %email,
                    error = %e,
                    "Send failed during broadcast"
                );
                self.metrics.record_send_failure();
                failed.push(email);
            }
        }
        failed
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
