//! In-process cluster
//!
//! [`LoopbackCluster`] hosts several members inside one process. Each member
//! gets its own [`LoopbackTransport`] view, calls run on spawned tasks and
//! joins/leaves are pushed to every other member's subscribers. Used by the
//! demo binary and by tests that need a cluster without a network.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

use crate::error::{CallResult, Fault, RpcError};
use crate::p2p::operations::{Invocable, OperationTable};
use crate::p2p::transport::{TopologyEvent, Transport};
use crate::types::{MemberId, Region, Visibility};

/// Description of a member to add to a [`LoopbackCluster`]
#[derive(Debug, Clone)]
pub struct MemberSpec {
    name: String,
    region: Option<Region>,
    visibility: Visibility,
    latency: Duration,
}

impl MemberSpec {
    /// Describe a legacy, visible member named `name` with no latency
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: None,
            visibility: Visibility::Visible,
            latency: Duration::ZERO,
        }
    }

    /// Member in `region` that answers region discovery
    pub fn region(mut self, region: impl Into<Region>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Member without the region operations, as on older code
    pub fn legacy(mut self) -> Self {
        self.region = None;
        self
    }

    /// Connect as a hidden member
    pub fn hidden(mut self) -> Self {
        self.visibility = Visibility::Hidden;
        self
    }

    /// Delay before each call starts executing on this member
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[derive(Debug)]
struct MemberState {
    visibility: Visibility,
    operations: Arc<OperationTable>,
    latency: Duration,
    reachable: bool,
    calls: Arc<AtomicUsize>,
}

#[derive(Debug, Default)]
struct Shared {
    members: RwLock<HashMap<MemberId, MemberState>>,
    subscribers: Mutex<Vec<(MemberId, mpsc::UnboundedSender<TopologyEvent>)>>,
}

impl Shared {
    /// Deliver `event` to every subscriber not owned by the member it is about
    fn broadcast(&self, event: TopologyEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|(owner, tx)| {
            if owner == event.member() {
                return true;
            }
            tx.send(event.clone()).is_ok()
        });
    }
}

/// A set of members living in this process
#[derive(Debug, Clone, Default)]
pub struct LoopbackCluster {
    shared: Arc<Shared>,
}

impl LoopbackCluster {
    /// Create an empty cluster
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a member and announce it to the others
    pub fn add(&self, spec: MemberSpec) -> MemberId {
        let id = MemberId::new(spec.name);
        let operations = match spec.region {
            Some(region) => OperationTable::for_region(region),
            None => OperationTable::new(),
        };

        self.shared.members.write().insert(
            id.clone(),
            MemberState {
                visibility: spec.visibility,
                operations: Arc::new(operations),
                latency: spec.latency,
                reachable: true,
                calls: Arc::new(AtomicUsize::new(0)),
            },
        );
        tracing::debug!(member = %id, visibility = ?spec.visibility, "loopback member joined");
        self.shared.broadcast(TopologyEvent::Join(id.clone(), spec.visibility));
        id
    }

    /// Visible member in `region`
    pub fn add_member(&self, name: &str, region: &str) -> MemberId {
        self.add(MemberSpec::new(name).region(region))
    }

    /// Remove a member and announce its departure. Its own subscriptions
    /// are closed.
    pub fn remove(&self, member: &MemberId) -> bool {
        let removed = self.shared.members.write().remove(member).is_some();
        if removed {
            self.shared
                .subscribers
                .lock()
                .retain(|(owner, _)| owner != member);
            tracing::debug!(%member, "loopback member left");
            self.shared.broadcast(TopologyEvent::Leave(member.clone()));
        }
        removed
    }

    /// Cut or restore connectivity to a member without a topology event
    pub fn set_reachable(&self, member: &MemberId, reachable: bool) {
        if let Some(state) = self.shared.members.write().get_mut(member) {
            state.reachable = reachable;
        }
    }

    /// Change the delay applied to calls on a member
    pub fn set_latency(&self, member: &MemberId, latency: Duration) {
        if let Some(state) = self.shared.members.write().get_mut(member) {
            state.latency = latency;
        }
    }

    /// Operations a member can execute
    pub fn operations(&self, member: &MemberId) -> Option<Arc<OperationTable>> {
        self.shared
            .members
            .read()
            .get(member)
            .map(|state| Arc::clone(&state.operations))
    }

    /// Calls a member has received so far
    pub fn calls_received(&self, member: &MemberId) -> usize {
        self.shared
            .members
            .read()
            .get(member)
            .map(|state| state.calls.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Transport as seen from `member`
    pub fn transport(&self, member: &MemberId) -> Arc<LoopbackTransport> {
        Arc::new(LoopbackTransport {
            shared: Arc::clone(&self.shared),
            local: member.clone(),
        })
    }
}

/// One member's view of a [`LoopbackCluster`]
#[derive(Debug)]
pub struct LoopbackTransport {
    shared: Arc<Shared>,
    local: MemberId,
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn local_member(&self) -> MemberId {
        self.local.clone()
    }

    async fn visible_members(&self) -> Vec<MemberId> {
        let mut members: Vec<MemberId> = self
            .shared
            .members
            .read()
            .iter()
            .filter(|(id, state)| **id != self.local && state.visibility == Visibility::Visible)
            .map(|(id, _)| id.clone())
            .collect();
        members.sort();
        members
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<TopologyEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.shared.subscribers.lock().push((self.local.clone(), tx));
        rx
    }

    async fn call(&self, member: &MemberId, invocable: Invocable, timeout: Duration) -> CallResult {
        let (operations, latency) = {
            let members = self.shared.members.read();
            match members.get(member) {
                Some(state) if state.reachable => {
                    state.calls.fetch_add(1, Ordering::SeqCst);
                    (Arc::clone(&state.operations), state.latency)
                }
                _ => return Ok(Err(RpcError::NoConnection(member.clone()))),
            }
        };

        // Dropping this future, including from an outer timeout, cancels the work
        let task = AbortOnDrop(tokio::spawn(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            operations.execute(invocable)
        }));

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(Ok(value))) => Ok(Ok(value)),
            Ok(Ok(Err(fault))) => Err(fault),
            Ok(Err(join_error)) if join_error.is_panic() => {
                Err(Fault::Exit(json!({ "panic": panic_message(join_error.into_panic()) })))
            }
            Ok(Err(join_error)) => Ok(Err(RpcError::Transport(join_error.to_string()))),
            Err(_) => Err(Fault::Timeout {
                member: member.clone(),
                timeout,
            }),
        }
    }
}

/// Join handle that aborts its task when dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
