//! Runtime metrics for the chat service.
//!
//! Tracks the small set of gauges and counters operational dashboards need
//! and renders them in Prometheus text format. The metrics live on the
//! registry instance rather than in process-wide statics, so two registries
//! in one process (tests, embedded use) never share counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters and gauges maintained by the connection registry.
#[derive(Debug, Default)]
pub struct ChatMetrics {
    connected_members: AtomicU64,
    active_groups: AtomicU64,
    events_broadcast: AtomicU64,
    send_failures: AtomicU64,
}

impl ChatMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_member_connected(&self) {
        self.connected_members.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_member_disconnected(&self) {
        let _ = self
            .connected_members
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(1))
            });
    }

    pub(crate) fn record_group_created(&self) {
        self.active_groups.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn record_group_dropped(&self) {
        let _ = self
            .active_groups
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(1))
            });
    }

    pub(crate) fn record_event_broadcast(&self) {
        self.events_broadcast.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_send_failure(&self) {
        self.send_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Currently connected members across all groups.
    pub fn connected_members(&self) -> u64 {
        self.connected_members.load(Ordering::Acquire)
    }

    /// Groups that currently have at least one member.
    pub fn active_groups(&self) -> u64 {
        self.active_groups.load(Ordering::Acquire)
    }

    /// Render all metric families in Prometheus text format.
    pub fn render(&self) -> String {
        let connected_members = self.connected_members.load(Ordering::Acquire);
        let active_groups = self.active_groups.load(Ordering::Acquire);
        let events_broadcast = self.events_broadcast.load(Ordering::Acquire);
        let send_failures = self.send_failures.load(Ordering::Acquire);

        format!(
            concat!(
                "# HELP courtyard_connected_members Currently connected members.\n",
                "# TYPE courtyard_connected_members gauge\n",
                "courtyard_connected_members {connected_members}\n",
                "# HELP courtyard_active_groups Groups with at least one connected member.\n",
                "# TYPE courtyard_active_groups gauge\n",
                "courtyard_active_groups {active_groups}\n",
                "# HELP courtyard_events_broadcast_total Total events broadcast to groups.\n",
                "# TYPE courtyard_events_broadcast_total counter\n",
                "courtyard_events_broadcast_total {events_broadcast}\n",
                "# HELP courtyard_send_failures_total Channel sends that failed and evicted a member.\n",
                "# TYPE courtyard_send_failures_total counter\n",
                "courtyard_send_failures_total {send_failures}\n"
            ),
            connected_members = connected_members,
            active_groups = active_groups,
            events_broadcast = events_broadcast,
            send_failures = send_failures
        )
    }
}
