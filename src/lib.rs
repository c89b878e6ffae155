//! # REAM Region
//!
//! Region-aware call routing for REAM clusters.
//!
//! Every member runs in a named region. A [`RegionNode`] keeps a live map of
//! which members run in which region and routes work to a member of a chosen
//! region, or runs it in place when the target is the local region.
//!
//! ```rust,ignore
//! let node = RegionNode::start(transport, RegionConfig::from_env(), operations);
//! node.ready().await;
//!
//! let reply = node
//!     .router()
//!     .route_to_primary(
//!         Invocable::named("accounts", "balance", vec![json!(42)]),
//!         CallOptions::default(),
//!     )
//!     .await?;
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod p2p;
pub mod types;

pub use config::RegionConfig;
pub use error::{CallResult, ConfigError, Fault, RegionError, RpcError};
pub use p2p::{
    CallOptions, Invocable, LoopbackCluster, MembershipRegistry, Operation, OperationTable,
    RegionNode, RegionRouter, RemoteInvoker, TopologyEvent, Transport,
};
pub use types::{MemberId, Region, Target, Value, Visibility};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
