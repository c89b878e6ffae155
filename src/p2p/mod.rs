//! Region-aware distribution
//!
//! Remote invocation over a pluggable transport, the region membership
//! cache that follows cluster topology, and the router that sends work to a
//! member of a chosen region.

pub mod cluster;
pub mod invoke;
pub mod loopback;
pub mod node;
pub mod operations;
pub mod router;
pub mod transport;

pub use cluster::{MembershipMonitor, MembershipRegistry, MonitorHandle, MonitorState};
pub use invoke::RemoteInvoker;
pub use loopback::{LoopbackCluster, LoopbackTransport, MemberSpec};
pub use node::RegionNode;
pub use operations::{Invocable, Operation, OperationTable};
pub use router::{CallOptions, RegionRouter};
pub use transport::{TopologyEvent, Transport};

use std::sync::Arc;

use crate::config::RegionConfig;

/// Start a region node with the process-wide configuration
pub fn start_region_node(
    transport: Arc<dyn Transport>,
    operations: Arc<OperationTable>,
) -> RegionNode {
    RegionNode::start(transport, RegionConfig::global().clone(), operations)
}
