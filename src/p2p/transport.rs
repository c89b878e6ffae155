//! Member-to-member call transport
//!
//! The runtime's distribution layer is consumed through the [`Transport`]
//! trait: it reports topology changes, lists connected members and runs an
//! invocable on a named member.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::CallResult;
use crate::p2p::operations::Invocable;
use crate::types::{MemberId, Visibility};

/// Cluster topology change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyEvent {
    /// A member connected
    Join(MemberId, Visibility),
    /// A member disconnected
    Leave(MemberId),
}

impl TopologyEvent {
    /// Member the event is about
    pub fn member(&self) -> &MemberId {
        match self {
            TopologyEvent::Join(member, _) => member,
            TopologyEvent::Leave(member) => member,
        }
    }
}

/// Distribution layer used by the router and the membership monitor
#[async_trait]
pub trait Transport: Send + Sync {
    /// The member this process runs as
    fn local_member(&self) -> MemberId;

    /// Visible members currently connected, not counting the local member
    async fn visible_members(&self) -> Vec<MemberId>;

    /// Subscribe to join/leave notifications. Events for one member arrive
    /// in the order they happened.
    fn subscribe(&self) -> mpsc::UnboundedReceiver<TopologyEvent>;

    /// Run `invocable` on `member`. Implementations should give up after
    /// `timeout`; callers enforce it as well.
    async fn call(&self, member: &MemberId, invocable: Invocable, timeout: Duration) -> CallResult;
}
