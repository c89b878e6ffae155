//! Region router
//!
//! Resolves a target region and runs work there: in place when the target
//! is this process's own region, otherwise on a member picked at random
//! from the registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::IteratorRandom;

use crate::config::RegionConfig;
use crate::error::{CallResult, Fault};
use crate::p2p::cluster::registry::MembershipRegistry;
use crate::p2p::invoke::RemoteInvoker;
use crate::p2p::operations::{Invocable, OperationTable};
use crate::types::{MemberId, Region, Target};

/// Per-call options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallOptions {
    /// Overrides the configured call timeout
    pub timeout: Option<Duration>,
}

impl CallOptions {
    /// Options overriding the call timeout
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Routes invocables to regions
#[derive(Debug, Clone)]
pub struct RegionRouter {
    /// Own and primary region, default timeout
    config: RegionConfig,
    /// Region → members map, read only
    registry: Arc<MembershipRegistry>,
    /// Remote call path
    invoker: RemoteInvoker,
    /// Operations run in place for own-region targets
    local_operations: Arc<OperationTable>,
}

impl RegionRouter {
    /// Create a router over a registry kept up to date by a monitor
    pub fn new(
        config: RegionConfig,
        registry: Arc<MembershipRegistry>,
        invoker: RemoteInvoker,
        local_operations: Arc<OperationTable>,
    ) -> Self {
        Self {
            config,
            registry,
            invoker,
            local_operations,
        }
    }

    /// Configuration this router was built with
    pub fn config(&self) -> &RegionConfig {
        &self.config
    }

    /// Registry the router picks members from
    pub fn registry(&self) -> &Arc<MembershipRegistry> {
        &self.registry
    }

    /// Region this process runs in
    pub fn own_region(&self) -> &Region {
        &self.config.region
    }

    /// Configured primary region
    pub fn primary_region(&self) -> &Region {
        &self.config.primary_region
    }

    /// Whether this process runs in the primary region
    pub fn is_own_region_primary(&self) -> bool {
        self.config.is_own_region_primary()
    }

    /// Members currently known in `region`
    pub fn lookup_members(&self, region: &Region) -> HashSet<MemberId> {
        self.registry.lookup(region)
    }

    /// Replace the primary sentinel with the configured primary region
    pub fn resolve(&self, target: &Target) -> Region {
        match target {
            Target::Primary => self.config.primary_region.clone(),
            Target::Region(region) => region.clone(),
        }
    }

    /// Run `invocable` in the `target` region.
    ///
    /// Own-region work runs in the calling context without touching the
    /// registry or the transport. Otherwise a random member of the region is
    /// called; an empty region fails at once with
    /// [`Fault::NoNodeAvailable`]. Failures of the remote call are returned
    /// as they are, never retried on another member.
    pub async fn route_to_region(
        &self,
        target: impl Into<Target>,
        invocable: Invocable,
        options: CallOptions,
    ) -> CallResult {
        let region = self.resolve(&target.into());

        if region == self.config.region {
            return self.local_operations.execute(invocable).map(Ok);
        }

        let member = self.pick_member(&region)?;
        let timeout = options.timeout.unwrap_or(self.config.call_timeout);
        self.invoker.call(&member, invocable, timeout).await
    }

    /// Run `invocable` in the primary region
    pub async fn route_to_primary(&self, invocable: Invocable, options: CallOptions) -> CallResult {
        self.route_to_region(Target::Primary, invocable, options).await
    }

    fn pick_member(&self, region: &Region) -> Result<MemberId, Fault> {
        let candidates = self.registry.lookup(region);
        candidates
            .into_iter()
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| Fault::NoNodeAvailable {
                region: region.clone(),
            })
    }
}
