//! Desired-state document: loading, typed model and semantic checks

use crate::error::{ProvisionError, Violation};
use crate::schema;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::path::{Path, PathBuf};
use userdb::QuotaLimits;

/// Where the config document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// JSON on stdin (`-`)
    Stdin,
    /// A JSON file, or TOML when the extension is `.toml`
    File(PathBuf),
}

impl ConfigSource {
    pub fn parse(arg: &str) -> Self {
        if arg == "-" {
            Self::Stdin
        } else {
            Self::File(PathBuf::from(arg))
        }
    }
}

/// Read a document into a JSON value tree, without validating it
pub fn read_document(source: &ConfigSource) -> Result<Value> {
    match source {
        ConfigSource::Stdin => {
            let mut content = String::new();
            std::io::stdin()
                .read_to_string(&mut content)
                .context("Could not read config from stdin")?;
            serde_json::from_str(&content).context("Invalid JSON on stdin")
        }
        ConfigSource::File(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Could not read {}", path.display()))?;
            parse_document(path, &content)
        }
    }
}

fn parse_document(path: &Path, content: &str) -> Result<Value> {
    if path.extension().is_some_and(|ext| ext == "toml") {
        let table: toml::Table = toml::from_str(content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        serde_json::to_value(table).context("Could not convert TOML config")
    } else {
        serde_json::from_str(content)
            .with_context(|| format!("Invalid JSON format in {}", path.display()))
    }
}

/// Read, validate and type a config document
pub fn load(source: &ConfigSource) -> Result<Config> {
    let document = read_document(source)?;
    Ok(Config::from_value(document)?)
}

// ============================================================================
// Typed model
// ============================================================================

/// Top-level desired-state document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub users: Vec<UserConfig>,
    pub groups: Vec<GroupConfig>,
    pub managed_uid_range: [u32; 2],
    pub managed_gid_range: [u32; 2],
    #[serde(default)]
    pub user_ssh_key_base_dir: Option<String>,
    #[serde(default)]
    pub ssh_authorized_keys_path: Option<String>,
    #[serde(default)]
    pub use_strict_ssh_key_dir_permissions: bool,
    #[serde(default)]
    pub managed_user_directories: Vec<String>,
    #[serde(default)]
    pub home_dir: Option<String>,
    #[serde(default)]
    pub xfs_default_user_quota: Vec<QuotaSpec>,
}

/// When the configured credential is written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePassword {
    /// Whenever it differs from the live credential
    Always,
    /// Only when the user is created
    OnCreate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    pub update_password: UpdatePassword,
    pub uid: u32,
    pub primary_group: String,
    #[serde(default)]
    pub additional_groups: Vec<String>,
    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default)]
    pub ssh_authorized_keys: Vec<String>,
    #[serde(default)]
    pub linger: bool,
    #[serde(default)]
    pub disk_quota: Vec<QuotaSpec>,
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupConfig {
    pub groupname: String,
    pub gid: u32,
}

/// Quota limits for one path, as written by humans
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaSpec {
    pub path: PathBuf,
    #[serde(default = "zero")]
    pub bytes_soft_limit: String,
    #[serde(default = "zero")]
    pub bytes_hard_limit: String,
    #[serde(default = "zero")]
    pub inodes_soft_limit: String,
    #[serde(default = "zero")]
    pub inodes_hard_limit: String,
}

fn zero() -> String {
    "0".to_string()
}

impl QuotaSpec {
    /// Normalise size strings: binary multiples for bytes, decimal for inodes
    pub fn limits(&self) -> userdb::Result<QuotaLimits> {
        Ok(QuotaLimits {
            bytes_soft: userdb::parse_iec_size(&self.bytes_soft_limit)?,
            bytes_hard: userdb::parse_iec_size(&self.bytes_hard_limit)?,
            inodes_soft: userdb::parse_si_size(&self.inodes_soft_limit)?,
            inodes_hard: userdb::parse_si_size(&self.inodes_hard_limit)?,
        })
    }
}

impl Config {
    /// Validate a document and convert it into the typed model
    ///
    /// Schema violations and semantic violations are reported together.
    pub fn from_value(document: Value) -> Result<Self, ProvisionError> {
        schema::validate(&document)?;

        let config: Self =
            serde_json::from_value(document).map_err(|e| ProvisionError::ConfigValidation {
                violations: vec![Violation::new("", e.to_string())],
            })?;

        let violations = config.semantic_violations();
        if violations.is_empty() {
            Ok(config)
        } else {
            Err(ProvisionError::ConfigValidation { violations })
        }
    }

    /// Checks the schema cannot express
    pub fn semantic_violations(&self) -> Vec<Violation> {
        let mut out = Vec::new();

        for (name, range) in [
            ("managed_uid_range", self.managed_uid_range),
            ("managed_gid_range", self.managed_gid_range),
        ] {
            if range[0] > range[1] {
                out.push(Violation::new(
                    format!("/{name}"),
                    format!("lower bound {} is above upper bound {}", range[0], range[1]),
                ));
            }
        }

        if self.user_ssh_key_base_dir.is_some() && self.ssh_authorized_keys_path.is_some() {
            out.push(Violation::new(
                "/ssh_authorized_keys_path",
                "cannot be combined with user_ssh_key_base_dir",
            ));
        }

        duplicates(
            &mut out,
            self.users.iter().map(|u| u.username.clone()),
            "/users",
            "username",
        );
        duplicates(&mut out, self.users.iter().map(|u| u.uid), "/users", "uid");
        duplicates(
            &mut out,
            self.groups.iter().map(|g| g.groupname.clone()),
            "/groups",
            "groupname",
        );
        duplicates(&mut out, self.groups.iter().map(|g| g.gid), "/groups", "gid");

        check_quotas(&mut out, &self.xfs_default_user_quota, "/xfs_default_user_quota");
        for (idx, user) in self.users.iter().enumerate() {
            check_quotas(&mut out, &user.disk_quota, &format!("/users/{idx}/disk_quota"));
        }

        out
    }
}

/// Report every repeated value after its first occurrence
fn duplicates<T, I>(out: &mut Vec<Violation>, values: I, base: &str, field: &str)
where
    T: Ord + std::fmt::Display,
    I: IntoIterator<Item = T>,
{
    let mut first_seen: BTreeMap<T, usize> = BTreeMap::new();
    for (idx, value) in values.into_iter().enumerate() {
        if let Some(first) = first_seen.get(&value) {
            out.push(Violation::new(
                format!("{base}/{idx}/{field}"),
                format!("duplicate {field} {value} (first used at {base}/{first})"),
            ));
        } else {
            first_seen.insert(value, idx);
        }
    }
}

fn check_quotas(out: &mut Vec<Violation>, specs: &[QuotaSpec], base: &str) {
    let mut paths = BTreeSet::new();
    for (idx, spec) in specs.iter().enumerate() {
        if !paths.insert(&spec.path) {
            out.push(Violation::new(
                format!("{base}/{idx}/path"),
                format!("duplicate quota path {}", spec.path.display()),
            ));
        }
        if let Err(e) = spec.limits() {
            out.push(Violation::new(format!("{base}/{idx}"), e.to_string()));
        }
    }
}
