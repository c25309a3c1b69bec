//! Canonical account directory snapshots
//!
//! The live host and the desired config are both reduced to a
//! [`Directory`], so they can be compared key by key.

pub mod normalize;
pub mod reader;
pub mod template;

pub use normalize::{DesiredState, normalize};
pub use reader::{HostLayout, QuotaSource, XfsQuota, read_directory};
pub use template::PathTemplate;

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use userdb::QuotaLimits;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Group {
    pub name: String,
    /// Immutable once created
    pub gid: u32,
    /// Supplementary members (never the users that have it as primary group)
    pub members: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub username: String,
    /// Immutable once created
    pub uid: u32,
    pub primary_group: String,
    /// Sorted, never contains `primary_group`
    pub additional_groups: BTreeSet<String>,
    pub shell: String,
    /// Always known for live users; only set in desired state when configured
    pub home_dir: Option<String>,
}

/// Per-path, per-uid quota limits
pub type QuotaTable = BTreeMap<PathBuf, BTreeMap<u32, QuotaLimits>>;

/// A complete snapshot of the account directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Directory {
    pub users: BTreeMap<String, User>,
    pub groups: BTreeMap<String, Group>,
    /// Opaque pre-hashed credentials by username
    pub passwords: BTreeMap<String, String>,
    /// Authorized keys by username, in file (or config) order
    pub ssh_keys: BTreeMap<String, Vec<String>>,
    /// Linger flag by username; `None` when the host has no linger support
    pub linger: Option<BTreeMap<String, bool>>,
    /// Managed directories by username: existing ones (live) or all
    /// wanted ones (desired)
    pub managed_dirs: BTreeMap<String, BTreeSet<PathBuf>>,
    pub quotas: QuotaTable,
}

impl Directory {
    /// Numeric id of a group by name
    pub fn gid_of(&self, group: &str) -> Option<u32> {
        self.groups.get(group).map(|g| g.gid)
    }
}

/// Inclusive id range inside which absence from the config means deletion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedRange {
    pub min: u32,
    pub max: u32,
}

impl ManagedRange {
    pub fn new(bounds: [u32; 2]) -> Self {
        Self {
            min: bounds[0],
            max: bounds[1],
        }
    }

    pub fn contains(&self, id: u32) -> bool {
        self.as_range().contains(&id)
    }

    pub fn as_range(&self) -> RangeInclusive<u32> {
        self.min..=self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_managed_range_is_inclusive() {
        let range = ManagedRange::new([1000, 2000]);
        assert!(range.contains(1000));
        assert!(range.contains(2000));
        assert!(!range.contains(999));
        assert!(!range.contains(2001));
        assert!(!range.contains(0));
    }
}
