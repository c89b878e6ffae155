//! Membership monitor
//!
//! A single task owns the member → region associations and is the only
//! writer of the [`MembershipRegistry`]. It discovers the region of every
//! member already connected, then follows join/leave notifications one at a
//! time in arrival order.
//!
//! Members that cannot answer region discovery (older code during a rolling
//! deploy, hidden tooling connections, probe failures) are skipped and never
//! re-probed; they are picked up again when they reconnect.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::config::RegionConfig;
use crate::p2p::cluster::registry::MembershipRegistry;
use crate::p2p::invoke::RemoteInvoker;
use crate::p2p::transport::TopologyEvent;
use crate::types::{MemberId, Region, Visibility};

const COMMAND_BUFFER: usize = 32;

/// Lifecycle of the monitor task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Discovering members that were connected before start
    Initializing,
    /// Following topology events
    Steady,
    /// Shut down
    Stopped,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorState::Initializing => write!(f, "Initializing"),
            MonitorState::Steady => write!(f, "Steady"),
            MonitorState::Stopped => write!(f, "Stopped"),
        }
    }
}

enum Command {
    Tracked(oneshot::Sender<BTreeMap<MemberId, Region>>),
    Shutdown,
}

/// Owner of the member → region associations
pub struct MembershipMonitor {
    /// Probe and region discovery calls
    invoker: RemoteInvoker,
    /// Registry this monitor is the only writer of
    registry: Arc<MembershipRegistry>,
    /// Region of every member in the registry
    tracked: HashMap<MemberId, Region>,
    /// Timeout for `region:own_region/0`
    discovery_timeout: Duration,
    /// Published lifecycle state
    state: watch::Sender<MonitorState>,
}

impl MembershipMonitor {
    /// Subscribe to topology events and start the monitor task.
    ///
    /// The subscription is taken before this returns, so no join or leave
    /// that happens afterwards is missed.
    pub fn spawn(
        invoker: RemoteInvoker,
        registry: Arc<MembershipRegistry>,
        config: &RegionConfig,
    ) -> MonitorHandle {
        let events = invoker.transport().subscribe();
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (state_tx, state_rx) = watch::channel(MonitorState::Initializing);

        let monitor = MembershipMonitor {
            invoker,
            registry,
            tracked: HashMap::new(),
            discovery_timeout: config.call_timeout,
            state: state_tx,
        };
        let task = tokio::spawn(monitor.run(events, command_rx));

        MonitorHandle {
            commands: command_tx,
            state: state_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<TopologyEvent>,
        mut commands: mpsc::Receiver<Command>,
    ) {
        self.initialize().await;
        let _ = self.state.send(MonitorState::Steady);
        tracing::info!(tracked = self.tracked.len(), "membership monitor steady");

        let mut events_open = true;
        let mut commands_open = true;

        while events_open || commands_open {
            tokio::select! {
                biased;

                event = events.recv(), if events_open => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        tracing::warn!("topology subscription closed");
                        events_open = false;
                    }
                },
                command = commands.recv(), if commands_open => match command {
                    Some(Command::Tracked(reply)) => {
                        let _ = reply.send(self.tracked_snapshot());
                    }
                    Some(Command::Shutdown) => break,
                    None => commands_open = false,
                },
            }
        }

        let _ = self.state.send(MonitorState::Stopped);
        tracing::debug!("membership monitor stopped");
    }

    async fn initialize(&mut self) {
        let members = self.invoker.transport().visible_members().await;
        tracing::debug!(count = members.len(), "discovering connected members");
        for member in members {
            self.on_join(member, Visibility::Visible).await;
        }
    }

    async fn handle_event(&mut self, event: TopologyEvent) {
        match event {
            TopologyEvent::Join(member, visibility) => self.on_join(member, visibility).await,
            TopologyEvent::Leave(member) => self.on_leave(&member),
        }
    }

    async fn on_join(&mut self, member: MemberId, visibility: Visibility) {
        if visibility == Visibility::Hidden {
            tracing::debug!(%member, "ignoring hidden member");
            return;
        }
        if self.tracked.contains_key(&member) {
            return;
        }
        if !self.invoker.is_remote_invocation_supported(&member).await {
            tracing::debug!(%member, "member does not support region discovery");
            return;
        }

        match self.invoker.fetch_region(&member, self.discovery_timeout).await {
            Ok(Ok(region)) => {
                tracing::info!(%member, %region, "member tracked");
                self.registry.insert(region.clone(), member.clone());
                self.tracked.insert(member, region);
            }
            Ok(Err(e)) => tracing::warn!(%member, error = %e, "region discovery failed"),
            Err(fault) => tracing::warn!(%member, %fault, "region discovery failed"),
        }
    }

    fn on_leave(&mut self, member: &MemberId) {
        match self.tracked.remove(member) {
            Some(region) => {
                self.registry.remove(&region, member);
                tracing::info!(%member, %region, "member untracked");
            }
            None => tracing::debug!(%member, "leave for untracked member"),
        }
    }

    fn tracked_snapshot(&self) -> BTreeMap<MemberId, Region> {
        self.tracked
            .iter()
            .map(|(member, region)| (member.clone(), region.clone()))
            .collect()
    }
}

/// Handle to a running [`MembershipMonitor`]
#[derive(Debug)]
pub struct MonitorHandle {
    /// Mailbox of the monitor task
    commands: mpsc::Sender<Command>,
    /// Lifecycle state
    state: watch::Receiver<MonitorState>,
    /// Monitor task
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Tracked(_) => f.write_str("Tracked"),
            Command::Shutdown => f.write_str("Shutdown"),
        }
    }
}

impl MonitorHandle {
    /// Current lifecycle state
    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Wait until initial discovery is done
    pub async fn wait_steady(&self) -> MonitorState {
        let mut state = self.state.clone();
        loop {
            let current = *state.borrow_and_update();
            if current != MonitorState::Initializing {
                return current;
            }
            if state.changed().await.is_err() {
                return *state.borrow();
            }
        }
    }

    /// The monitor's member → region associations. Empty once stopped.
    ///
    /// The request is queued behind pending topology events, so the answer
    /// reflects every event delivered before the call.
    pub async fn tracked(&self) -> BTreeMap<MemberId, Region> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Tracked(tx)).await.is_err() {
            return BTreeMap::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Stop the monitor task and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "membership monitor task failed");
        }
    }
}
