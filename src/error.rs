//! Error taxonomy for provisioning runs
//!
//! Everything except [`ProvisionError::MutationFailure`] is raised before the
//! host is touched.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// A single problem found in the configuration document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    /// JSON pointer to the offending value ("" for the document root)
    pub path: String,
    pub message: String,
}

impl Violation {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "(root): {}", self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

/// An account database entity, as named in error messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Entity {
    User(String),
    Group(String),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(name) => write!(f, "user '{name}'"),
            Self::Group(name) => write!(f, "group '{name}'"),
        }
    }
}

/// Errors that abort a provisioning run
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The configuration document failed validation
    #[error("invalid configuration ({} problems):\n{}", violations.len(), list(violations))]
    ConfigValidation { violations: Vec<Violation> },

    /// Live account state is internally inconsistent
    #[error("account database is inconsistent: {message}")]
    DirectoryCorruption { message: String },

    /// The config asks for a different uid/gid than the live entity has
    #[error(
        "{entity} has {field} {live} on the system but {desired} in the config; \
         delete and re-create it to change the {field}"
    )]
    ImmutableFieldConflict {
        entity: Entity,
        field: &'static str,
        live: u32,
        desired: u32,
    },

    /// A primary group that is not declared in the config
    #[error("user '{username}' has primary group '{group}' which is not in the config")]
    DanglingGroupReference { username: String, group: String },

    /// A property differs but has no update rule
    #[error("{entity}: no update rule for property '{property}'")]
    UnsupportedPropertyUpdate { entity: Entity, property: String },

    /// The default quota and an explicit quota for uid 0 target the same path
    #[error(
        "quota for {} is set both by xfs_default_user_quota and by a user with uid 0",
        path.display()
    )]
    QuotaConflict { path: PathBuf },

    /// A host mutation failed; earlier phases stay applied
    #[error("{phase} failed for '{entity}': {message}")]
    MutationFailure {
        phase: String,
        entity: String,
        message: String,
    },

    /// A live account source could not be read
    #[error("failed to read {source_name}: {message}")]
    HostRead { source_name: String, message: String },
}

impl ProvisionError {
    pub fn host_read(source_name: impl Into<String>, err: impl fmt::Display) -> Self {
        Self::HostRead {
            source_name: source_name.into(),
            message: err.to_string(),
        }
    }
}

fn list(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("  - {v}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Result type for provisioning operations
pub type Result<T> = std::result::Result<T, ProvisionError>;
