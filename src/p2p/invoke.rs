//! Remote invocation
//!
//! Runs an invocable on another member and relays the outcome. A timeout,
//! a thrown value, a raised error or an abnormal exit come back as a
//! [`Fault`] that the caller propagates; failures of the call layer come
//! back as an [`RpcError`] value.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{RegionConfig, PROBE_TIMEOUT};
use crate::error::{CallResult, Fault, RpcError};
use crate::p2p::operations::{Invocable, Operation, OWN_REGION, REGION_MODULE};
use crate::p2p::transport::Transport;
use crate::types::{MemberId, Region, Value};

/// Sends invocables to members through a [`Transport`]
#[derive(Clone)]
pub struct RemoteInvoker {
    /// Distribution layer
    transport: Arc<dyn Transport>,
    /// Log every call at info level
    verbose: bool,
    /// Timeout of the capability probe
    probe_timeout: Duration,
}

impl std::fmt::Debug for RemoteInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInvoker")
            .field("local_member", &self.transport.local_member())
            .field("verbose", &self.verbose)
            .field("probe_timeout", &self.probe_timeout)
            .finish()
    }
}

impl RemoteInvoker {
    /// Create an invoker with quiet logging and the default probe timeout
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            verbose: false,
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    /// Invoker using the verbosity and probe timeout of `config`
    pub fn with_config(transport: Arc<dyn Transport>, config: &RegionConfig) -> Self {
        Self {
            transport,
            verbose: config.verbose,
            probe_timeout: config.probe_timeout,
        }
    }

    /// Enable or disable per-call logging
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Transport calls are sent through
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run `invocable` on `member`, waiting at most `timeout`.
    ///
    /// With verbose logging on, the request and its outcome are logged at
    /// info level.
    pub async fn call(
        &self,
        member: &MemberId,
        invocable: Invocable,
        timeout: Duration,
    ) -> CallResult {
        let label = invocable.label();
        if self.verbose {
            tracing::info!(
                %member,
                operation = %label,
                timeout_ms = timeout.as_millis() as u64,
                "sending remote call"
            );
        }

        let started = Instant::now();
        let outcome = match tokio::time::timeout(
            timeout,
            self.transport.call(member, invocable, timeout),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(Fault::Timeout {
                member: member.clone(),
                timeout,
            }),
        };

        if self.verbose {
            self.log_outcome(member, &label, started, &outcome);
        }

        outcome
    }

    fn log_outcome(&self, member: &MemberId, label: &str, started: Instant, outcome: &CallResult) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match outcome {
            Ok(Ok(_)) => {
                tracing::info!(%member, operation = %label, elapsed_ms, "remote call returned")
            }
            Ok(Err(e)) => tracing::info!(
                %member,
                operation = %label,
                elapsed_ms,
                error = %e,
                "remote call failed"
            ),
            Err(Fault::Timeout { .. }) => {
                tracing::info!(%member, operation = %label, elapsed_ms, "remote call timed out")
            }
            Err(fault) => tracing::info!(
                %member,
                operation = %label,
                elapsed_ms,
                %fault,
                "remote call raised"
            ),
        }
    }

    /// Whether `member` runs code that answers region discovery.
    ///
    /// Never fails: anything other than an explicit `true` reply counts as
    /// unsupported. Members still on older code during a rolling deploy
    /// land here.
    pub async fn is_remote_invocation_supported(&self, member: &MemberId) -> bool {
        let probe = Operation::function_exported(REGION_MODULE, OWN_REGION, 0);
        match self.call(member, probe.into(), self.probe_timeout).await {
            Ok(Ok(Value::Bool(supported))) => supported,
            Ok(Ok(other)) => {
                tracing::warn!(%member, reply = %other, "unexpected reply to capability probe");
                false
            }
            Ok(Err(e)) => {
                tracing::warn!(%member, error = %e, "capability probe failed");
                false
            }
            Err(fault) => {
                tracing::warn!(%member, %fault, "capability probe failed");
                false
            }
        }
    }

    /// Ask `member` which region it runs in
    pub async fn fetch_region(&self, member: &MemberId, timeout: Duration) -> CallResult<Region> {
        let reply = self.call(member, Operation::own_region().into(), timeout).await?;
        Ok(reply.and_then(|value| match value {
            Value::String(label) if !label.is_empty() => Ok(Region::new(label)),
            other => Err(RpcError::BadReply(format!("region reply {}", other))),
        }))
    }
}
