//! Cluster membership by region
//!
//! The registry holds the region → members map every router reads; the
//! monitor keeps it in line with the connected members.

pub mod monitor;
pub mod registry;

pub use monitor::{MembershipMonitor, MonitorHandle, MonitorState};
pub use registry::MembershipRegistry;
