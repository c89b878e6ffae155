//! Error types for region routing
//!
//! Failures are split in two by severity. A [`Fault`] unwinds the caller:
//! timeouts, values thrown or raised by the remote operation, abnormal exits
//! and routing to a region with nobody in it. An [`RpcError`] is an ordinary
//! value returned to the caller when the call layer itself fails.

use std::time::Duration;

use thiserror::Error;

use crate::types::{MemberId, Region, Value};

/// Outcome of an invocation.
///
/// The outer `Err` is a [`Fault`] and is meant to be propagated with `?`;
/// the inner `Err` is a recoverable [`RpcError`].
pub type CallResult<T = Value> = Result<Result<T, RpcError>, Fault>;

/// Failures that unwind the calling context
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    /// The member did not answer within the timeout
    #[error("call to {member} timed out after {}ms", .timeout.as_millis())]
    Timeout { member: MemberId, timeout: Duration },

    /// The operation threw a value
    #[error("remote throw: {0}")]
    Throw(Value),

    /// The operation raised an error
    #[error("remote error: {0}")]
    Error(Value),

    /// The operation exited abnormally
    #[error("remote exit: {0}")]
    Exit(Value),

    /// No member is known for the region
    #[error("no node available for region {region}")]
    NoNodeAvailable { region: Region },
}

impl Fault {
    /// Whether this fault is a call timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Fault::Timeout { .. })
    }
}

/// Failures of the call layer, returned to the caller as values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RpcError {
    /// The member is not connected
    #[error("no connection to {0}")]
    NoConnection(MemberId),

    /// Arguments or result could not be carried across
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Any other transport failure
    #[error("transport failure: {0}")]
    Transport(String),

    /// The member answered with something we could not interpret
    #[error("unexpected reply: {0}")]
    BadReply(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Umbrella error for code embedding the router
#[derive(Error, Debug)]
pub enum RegionError {
    #[error("Fault: {0}")]
    Fault(#[from] Fault),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}
