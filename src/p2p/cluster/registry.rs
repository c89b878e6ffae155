//! Region membership registry
//!
//! Maps each region to the members known to run there. Readers never wait
//! on each other; writes come from the membership monitor only, so the
//! mutating methods are crate-private.
//!
//! ```compile_fail
//! use ream_region::{MemberId, MembershipRegistry, Region};
//!
//! let registry = MembershipRegistry::new();
//! registry.insert(Region::new("hkg"), MemberId::new("a"));
//! ```

use std::collections::{BTreeMap, HashSet};

use dashmap::DashMap;

use crate::types::{MemberId, Region};

/// Concurrent region → members map
#[derive(Debug, Default)]
pub struct MembershipRegistry {
    regions: DashMap<Region, HashSet<MemberId>>,
}

impl MembershipRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Members known in `region`; empty if the region is unknown
    pub fn lookup(&self, region: &Region) -> HashSet<MemberId> {
        self.regions
            .get(region)
            .map(|members| members.clone())
            .unwrap_or_default()
    }

    /// Whether `member` is known in `region`
    pub fn contains(&self, region: &Region, member: &MemberId) -> bool {
        self.regions
            .get(region)
            .map(|members| members.contains(member))
            .unwrap_or(false)
    }

    /// Add `member` under `region`. Adding it twice has no further effect.
    pub(crate) fn insert(&self, region: Region, member: MemberId) {
        self.regions.entry(region).or_default().insert(member);
    }

    /// Remove `member` from `region` if present
    pub(crate) fn remove(&self, region: &Region, member: &MemberId) {
        let emptied = match self.regions.get_mut(region) {
            Some(mut members) => {
                members.remove(member);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            // Re-checked under the shard lock
            self.regions.remove_if(region, |_, members| members.is_empty());
        }
    }

    /// Regions with at least one member, sorted
    pub fn regions(&self) -> Vec<Region> {
        let mut regions: Vec<Region> = self
            .regions
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        regions.sort();
        regions
    }

    /// Copy of the whole map
    pub fn snapshot(&self) -> BTreeMap<Region, HashSet<MemberId>> {
        self.regions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect()
    }

    /// Total number of tracked members
    pub fn member_count(&self) -> usize {
        self.regions.iter().map(|entry| entry.value().len()).sum()
    }

    /// Whether no member is known in any region
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
