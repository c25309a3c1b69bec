//! Record types for the host account sources.

use serde::{Deserialize, Serialize};

/// One record of the account database (`/etc/passwd`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswdEntry {
    /// Login name
    pub username: String,
    /// Numeric user id
    pub uid: u32,
    /// Numeric id of the primary group
    pub gid: u32,
    /// Free-form comment (GECOS) field
    pub gecos: String,
    /// Home directory
    pub home: String,
    /// Login shell
    pub shell: String,
}

/// One record of the shadow password database (`/etc/shadow`).
///
/// Only the credential field is retained; ageing fields are not reconciled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShadowEntry {
    /// Login name
    pub username: String,
    /// Pre-hashed credential, or a lock marker such as `!` or `*`
    pub credential: String,
}

impl ShadowEntry {
    /// An empty credential lets anyone log in as the user without a password.
    pub fn is_passwordless(&self) -> bool {
        self.credential.is_empty()
    }
}

/// One record of the group database (`/etc/group`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupEntry {
    /// Group name
    pub name: String,
    /// Numeric group id
    pub gid: u32,
    /// Supplementary members, in file order
    pub members: Vec<String>,
}

/// Limits for one id as reported by `xfs_quota`, normalised to bytes and
/// inode counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaLimits {
    /// Soft limit on bytes (0 = unlimited)
    pub bytes_soft: u64,
    /// Hard limit on bytes (0 = unlimited)
    pub bytes_hard: u64,
    /// Soft limit on inodes (0 = unlimited)
    pub inodes_soft: u64,
    /// Hard limit on inodes (0 = unlimited)
    pub inodes_hard: u64,
}

impl QuotaLimits {
    /// All-zero limits, which is how a removed quota looks on disk.
    pub const UNLIMITED: Self = Self {
        bytes_soft: 0,
        bytes_hard: 0,
        inodes_soft: 0,
        inodes_hard: 0,
    };

    /// Whether every limit is disabled.
    pub fn is_unlimited(&self) -> bool {
        *self == Self::UNLIMITED
    }
}

/// A single row of a quota report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaReportEntry {
    /// Numeric user id the row applies to
    pub uid: u32,
    /// Configured limits
    pub limits: QuotaLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passwordless_detection() {
        let locked = ShadowEntry {
            username: "svc".into(),
            credential: "!".into(),
        };
        let open = ShadowEntry {
            username: "guest".into(),
            credential: String::new(),
        };
        assert!(!locked.is_passwordless());
        assert!(open.is_passwordless());
    }

    #[test]
    fn test_unlimited_quota() {
        assert!(QuotaLimits::default().is_unlimited());
        let limited = QuotaLimits {
            inodes_hard: 10,
            ..QuotaLimits::UNLIMITED
        };
        assert!(!limited.is_unlimited());
    }
}
