//! Region node
//!
//! Wires the registry, membership monitor and router of one process
//! together on top of a transport.

use std::sync::Arc;

use crate::config::RegionConfig;
use crate::p2p::cluster::{MembershipMonitor, MembershipRegistry, MonitorHandle, MonitorState};
use crate::p2p::invoke::RemoteInvoker;
use crate::p2p::operations::OperationTable;
use crate::p2p::router::RegionRouter;
use crate::p2p::transport::Transport;
use crate::types::MemberId;

/// Region routing for one process
#[derive(Debug)]
pub struct RegionNode {
    /// Local member
    member: MemberId,
    /// Router sharing the monitor's registry
    router: RegionRouter,
    /// Running membership monitor
    monitor: MonitorHandle,
}

impl RegionNode {
    /// Start membership tracking and return a ready router.
    ///
    /// `operations` is the table this process dispatches named operations
    /// from; the region operations for the configured region are added so
    /// peers can discover this member.
    pub fn start(
        transport: Arc<dyn Transport>,
        config: RegionConfig,
        operations: Arc<OperationTable>,
    ) -> Self {
        operations.register_region(config.region.clone());

        let member = transport.local_member();
        let registry = Arc::new(MembershipRegistry::new());
        let invoker = RemoteInvoker::with_config(transport, &config);
        let monitor = MembershipMonitor::spawn(invoker.clone(), Arc::clone(&registry), &config);
        let router = RegionRouter::new(config, registry, invoker, operations);

        tracing::info!(
            %member,
            region = %router.own_region(),
            primary = %router.primary_region(),
            "region node started"
        );

        Self {
            member,
            router,
            monitor,
        }
    }

    /// Member this node runs as
    pub fn member(&self) -> &MemberId {
        &self.member
    }

    /// Router for sending work to regions
    pub fn router(&self) -> &RegionRouter {
        &self.router
    }

    /// Region → members map maintained by the monitor
    pub fn registry(&self) -> &Arc<MembershipRegistry> {
        self.router.registry()
    }

    /// Handle to the membership monitor
    pub fn monitor(&self) -> &MonitorHandle {
        &self.monitor
    }

    /// Wait for initial member discovery to finish
    pub async fn ready(&self) -> MonitorState {
        self.monitor.wait_steady().await
    }

    /// Stop membership tracking
    pub async fn stop(self) {
        self.monitor.shutdown().await;
        tracing::info!(member = %self.member, "region node stopped");
    }
}
