//! Reshape a validated config into a desired [`Directory`]

use super::{Directory, Group, ManagedRange, PathTemplate, QuotaTable, User};
use crate::config::{Config, QuotaSpec, UpdatePassword};
use crate::error::{ProvisionError, Result, Violation};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Default directory holding each user's authorized_keys file
pub const DEFAULT_SSH_KEY_BASE_DIR: &str = "/home/%u/.ssh";

/// Host-wide settings that are not per-entity state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub managed_uids: ManagedRange,
    pub managed_gids: ManagedRange,
    /// Location of each user's authorized_keys file
    pub ssh_key_path: PathTemplate,
    /// Key directory to create and own; unset when an explicit key file
    /// path is configured
    pub ssh_key_dir: Option<PathTemplate>,
    pub strict_ssh_key_dir: bool,
    pub managed_dirs: Vec<PathTemplate>,
    pub home_dir: Option<PathTemplate>,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        let (ssh_key_path, ssh_key_dir) = match &config.ssh_authorized_keys_path {
            Some(path) => (PathTemplate::new(path.as_str()), None),
            None => {
                let dir = PathTemplate::new(
                    config
                        .user_ssh_key_base_dir
                        .as_deref()
                        .unwrap_or(DEFAULT_SSH_KEY_BASE_DIR),
                );
                (dir.join("authorized_keys"), Some(dir))
            }
        };

        Self {
            managed_uids: ManagedRange::new(config.managed_uid_range),
            managed_gids: ManagedRange::new(config.managed_gid_range),
            ssh_key_path,
            ssh_key_dir,
            strict_ssh_key_dir: config.use_strict_ssh_key_dir_permissions,
            managed_dirs: config
                .managed_user_directories
                .iter()
                .map(|t| PathTemplate::new(t.as_str()))
                .collect(),
            home_dir: config.home_dir.as_deref().map(PathTemplate::new),
        }
    }

    /// Every managed directory of one user
    pub fn managed_dirs_for(&self, username: &str, uid: u32) -> BTreeSet<PathBuf> {
        self.managed_dirs
            .iter()
            .map(|t| t.expand(username, uid))
            .collect()
    }
}

/// The normalised config: a desired directory plus what is needed to act
/// on it
#[derive(Debug, Clone)]
pub struct DesiredState {
    pub directory: Directory,
    pub settings: Settings,
    pub update_password: BTreeMap<String, UpdatePassword>,
}

impl DesiredState {
    /// Filesystems whose quota reports must be read
    pub fn quota_paths(&self) -> Vec<PathBuf> {
        self.directory.quotas.keys().cloned().collect()
    }
}

/// Build the desired state from a validated config
pub fn normalize(config: &Config) -> Result<DesiredState> {
    let settings = Settings::from_config(config);
    let mut directory = Directory {
        linger: Some(BTreeMap::new()),
        ..Directory::default()
    };

    for group in &config.groups {
        directory.groups.insert(
            group.groupname.clone(),
            Group {
                name: group.groupname.clone(),
                gid: group.gid,
                members: BTreeSet::new(),
            },
        );
    }

    let mut update_password = BTreeMap::new();

    for user in &config.users {
        if !directory.groups.contains_key(&user.primary_group) {
            return Err(ProvisionError::DanglingGroupReference {
                username: user.username.clone(),
                group: user.primary_group.clone(),
            });
        }

        let additional_groups: BTreeSet<String> = user
            .additional_groups
            .iter()
            .filter(|g| **g != user.primary_group)
            .cloned()
            .collect();

        // groups outside the config (e.g. sudo) are not tracked
        for name in &additional_groups {
            if let Some(group) = directory.groups.get_mut(name) {
                group.members.insert(user.username.clone());
            }
        }

        let name = user.username.clone();
        directory.users.insert(
            name.clone(),
            User {
                username: name.clone(),
                uid: user.uid,
                primary_group: user.primary_group.clone(),
                additional_groups,
                shell: user.shell.clone(),
                home_dir: settings
                    .home_dir
                    .as_ref()
                    .map(|t| t.render(&user.username, user.uid)),
            },
        );
        directory
            .passwords
            .insert(name.clone(), user.password.clone());
        directory
            .ssh_keys
            .insert(name.clone(), user.ssh_authorized_keys.clone());
        if let Some(linger) = directory.linger.as_mut() {
            linger.insert(name.clone(), user.linger);
        }
        directory
            .managed_dirs
            .insert(name.clone(), settings.managed_dirs_for(&name, user.uid));
        update_password.insert(name, user.update_password);
    }

    directory.quotas = quota_table(config)?;

    Ok(DesiredState {
        directory,
        settings,
        update_password,
    })
}

fn quota_table(config: &Config) -> Result<QuotaTable> {
    let mut table = QuotaTable::new();

    for (idx, spec) in config.xfs_default_user_quota.iter().enumerate() {
        let limits = limits(spec, &format!("/xfs_default_user_quota/{idx}"))?;
        table.entry(spec.path.clone()).or_default().insert(0, limits);
    }

    for (user_idx, user) in config.users.iter().enumerate() {
        for (idx, spec) in user.disk_quota.iter().enumerate() {
            let limits = limits(spec, &format!("/users/{user_idx}/disk_quota/{idx}"))?;
            let per_path = table.entry(spec.path.clone()).or_default();
            if per_path.insert(user.uid, limits).is_some() {
                return Err(ProvisionError::QuotaConflict {
                    path: spec.path.clone(),
                });
            }
        }
    }

    Ok(table)
}

fn limits(spec: &QuotaSpec, pointer: &str) -> Result<userdb::QuotaLimits> {
    spec.limits()
        .map_err(|e| ProvisionError::ConfigValidation {
            violations: vec![Violation::new(pointer, e.to_string())],
        })
}
