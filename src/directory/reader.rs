//! Directory snapshot reader - live account state from the host

use super::{DesiredState, Directory, Group, QuotaTable, User};
use crate::error::{ProvisionError, Result};
use crate::runner;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use userdb::{QuotaReportEntry, authorized_keys, linger, quota, records};

/// Locations of the host account sources
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    pub passwd: PathBuf,
    pub shadow: PathBuf,
    pub group: PathBuf,
    /// Marker directory of the linger registry; missing means unsupported
    pub linger_dir: PathBuf,
}

impl Default for HostLayout {
    fn default() -> Self {
        Self {
            passwd: PathBuf::from("/etc/passwd"),
            shadow: PathBuf::from("/etc/shadow"),
            group: PathBuf::from("/etc/group"),
            linger_dir: PathBuf::from(linger::DEFAULT_LINGER_DIR),
        }
    }
}

/// Source of per-path user quota reports
pub trait QuotaSource {
    fn report(&self, path: &Path) -> anyhow::Result<Vec<QuotaReportEntry>>;
}

/// Reads quotas with `xfs_quota -x -c "report ..."`
pub struct XfsQuota;

impl QuotaSource for XfsQuota {
    fn report(&self, path: &Path) -> anyhow::Result<Vec<QuotaReportEntry>> {
        if !runner::command_exists("xfs_quota") {
            anyhow::bail!("xfs_quota is not installed");
        }
        let output = runner::run_capture(
            "xfs_quota",
            &[
                OsStr::new("-x"),
                OsStr::new("-c"),
                OsStr::new(quota::REPORT_COMMAND),
                path.as_os_str(),
            ],
        )?;
        Ok(quota::parse_report(&output)?)
    }
}

/// Read the live directory
///
/// Key files, managed directories and quota paths are located with the
/// desired settings, since the host has no record of them.
pub fn read_directory(
    layout: &HostLayout,
    desired: &DesiredState,
    quotas: &dyn QuotaSource,
) -> Result<Directory> {
    let passwd = records::read_passwd(&layout.passwd)
        .map_err(|e| ProvisionError::host_read("passwd", e))?;
    let shadow = records::read_shadow(&layout.shadow)
        .map_err(|e| ProvisionError::host_read("shadow", e))?;
    let group_entries =
        records::read_group(&layout.group).map_err(|e| ProvisionError::host_read("group", e))?;

    check_unique("passwd", passwd.iter().map(|e| e.username.as_str()))?;
    check_unique("shadow", shadow.iter().map(|e| e.username.as_str()))?;
    check_unique("group", group_entries.iter().map(|e| e.name.as_str()))?;

    let mut groups = BTreeMap::new();
    let mut group_names = BTreeMap::new();
    for entry in group_entries {
        group_names.entry(entry.gid).or_insert_with(|| entry.name.clone());
        groups.insert(
            entry.name.clone(),
            Group {
                name: entry.name,
                gid: entry.gid,
                members: entry.members.into_iter().collect(),
            },
        );
    }

    let mut users = BTreeMap::new();
    for entry in passwd {
        let primary_group = group_names
            .get(&entry.gid)
            .cloned()
            .unwrap_or_else(|| entry.gid.to_string());
        let additional_groups = groups
            .values()
            .filter(|g| g.name != primary_group && g.members.contains(&entry.username))
            .map(|g| g.name.clone())
            .collect();

        users.insert(
            entry.username.clone(),
            User {
                username: entry.username,
                uid: entry.uid,
                primary_group,
                additional_groups,
                shell: entry.shell,
                home_dir: Some(entry.home),
            },
        );
    }

    let passwords: BTreeMap<String, String> = shadow
        .into_iter()
        .map(|e| (e.username, e.credential))
        .collect();
    check_passwords(&users, &passwords)?;

    let settings = &desired.settings;
    let mut ssh_keys = BTreeMap::new();
    let mut managed_dirs = BTreeMap::new();
    for user in users.values() {
        let key_path = settings.ssh_key_path.expand(&user.username, user.uid);
        let keys = authorized_keys::read_authorized_keys(&key_path)
            .map_err(|e| ProvisionError::host_read("authorized keys", e))?;
        ssh_keys.insert(user.username.clone(), keys);

        let existing: BTreeSet<PathBuf> = settings
            .managed_dirs_for(&user.username, user.uid)
            .into_iter()
            .filter(|p| p.exists())
            .collect();
        managed_dirs.insert(user.username.clone(), existing);
    }

    let linger: Option<BTreeMap<String, bool>> = linger::read_linger_dir(&layout.linger_dir)
        .map_err(|e| ProvisionError::host_read("linger registry", e))?
        .map(|lingering| {
            users
                .keys()
                .map(|name| (name.clone(), lingering.contains(name)))
                .collect()
        });
    if linger.is_none() {
        log::info!(
            "{} does not exist; linger is not supported on this host",
            layout.linger_dir.display()
        );
    }

    let mut quota_table = QuotaTable::new();
    for path in desired.quota_paths() {
        let entries = quotas.report(&path).map_err(|e| {
            ProvisionError::host_read(format!("quotas of {}", path.display()), format!("{e:#}"))
        })?;
        let limits: BTreeMap<u32, userdb::QuotaLimits> = entries
            .into_iter()
            .filter(|e| !e.limits.is_unlimited())
            .map(|e| (e.uid, e.limits))
            .collect();
        quota_table.insert(path, limits);
    }

    Ok(Directory {
        users,
        groups,
        passwords,
        ssh_keys,
        linger,
        managed_dirs,
        quotas: quota_table,
    })
}

/// A name may appear only once per database file
fn check_unique<'a>(source: &str, names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = BTreeSet::new();
    let repeated: BTreeSet<&str> = names.filter(|name| !seen.insert(*name)).collect();
    if repeated.is_empty() {
        return Ok(());
    }
    Err(ProvisionError::DirectoryCorruption {
        message: format!(
            "duplicate entries in {source}: [{}]",
            repeated.into_iter().collect::<Vec<_>>().join(", ")
        ),
    })
}

/// Every user needs exactly one shadow entry
fn check_passwords(
    users: &BTreeMap<String, User>,
    passwords: &BTreeMap<String, String>,
) -> Result<()> {
    let without_shadow: Vec<&str> = users
        .keys()
        .filter(|u| !passwords.contains_key(*u))
        .map(String::as_str)
        .collect();
    let without_passwd: Vec<&str> = passwords
        .keys()
        .filter(|u| !users.contains_key(*u))
        .map(String::as_str)
        .collect();

    if !without_shadow.is_empty() || !without_passwd.is_empty() {
        return Err(ProvisionError::DirectoryCorruption {
            message: format!(
                "{} users and {} shadow entries; missing from shadow: [{}]; missing from passwd: [{}]",
                users.len(),
                passwords.len(),
                without_shadow.join(", "),
                without_passwd.join(", ")
            ),
        });
    }

    let passwordless: Vec<&str> = passwords
        .iter()
        .filter(|(_, credential)| credential.is_empty())
        .map(|(user, _)| user.as_str())
        .collect();
    if !passwordless.is_empty() {
        log::warn!(
            "users without a password allow impersonation without sudo: {}",
            passwordless.join(", ")
        );
    }

    Ok(())
}
