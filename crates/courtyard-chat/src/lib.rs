//! Courtyard chat runtime.
//!
//! This crate implements the real-time core of the Courtyard community
//! portal: the [`registry::ConnectionRegistry`] tracking which residents are
//! live-connected to which group, the JSON wire events exchanged over a
//! connection, and the [`store::MessageStore`] seam the surrounding server
//! implements for persistence.
//!
//! The transport itself (WebSocket upgrade, socket reader/writer tasks)
//! lives in the server crate. It hands each accepted connection to the
//! registry as a [`channel::ChatChannel`] and from then on addresses peers
//! only by `(group, identity)` — the registry is the sole owner of every
//! channel handle.

pub mod channel;
pub mod dispatch;
pub mod events;
pub mod metrics;
pub mod registry;
pub mod store;

pub use channel::{ChannelError, ChatChannel};
pub use dispatch::dispatch_client_event;
pub use events::{ChatEvent, ClientEvent};
pub use metrics::ChatMetrics;
pub use registry::{ConnectionRegistry, GroupState, OnlineUser};
pub use store::{MessageStore, StoreError, StoredMessage};
