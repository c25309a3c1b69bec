//! Plan orderer - turns a change set into ordered phases of host actions

use super::delta::{ChangeSet, UserUpdate};
use crate::directory::{DesiredState, Directory, User};
use crate::error::{ProvisionError, Result};
use declarative::{Action, CommandSpec, ExecutionPlan, Ownership, Step};
use std::collections::BTreeSet;
use std::fmt;

/// First line of every authorized_keys file written by the tool
pub const MANAGED_HEADER: &str =
    "# This file is managed by provisioner. Do not edit manually; changes will be overwritten.";

/// Permissions of a managed user directory
pub const MANAGED_DIR_MODE: u32 = 0o700;

/// The fixed order in which mutations are applied
///
/// Deletions come first so that creations can reuse a vacated name or id.
/// Key files and managed directories of a deleted user are removed while
/// the user (and therefore its uid) still exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PhaseKind {
    DeleteSshKeys,
    DeleteManagedDirs,
    DeleteUsers,
    DeleteGroups,
    CreateGroups,
    UpdateGroups,
    CreateUsers,
    UpdateUsers,
    UpdatePasswords,
    CreateManagedDirs,
    WriteSshKeys,
    UpdateLinger,
    UpdateQuotas,
}

impl PhaseKind {
    pub const ALL: [Self; 13] = [
        Self::DeleteSshKeys,
        Self::DeleteManagedDirs,
        Self::DeleteUsers,
        Self::DeleteGroups,
        Self::CreateGroups,
        Self::UpdateGroups,
        Self::CreateUsers,
        Self::UpdateUsers,
        Self::UpdatePasswords,
        Self::CreateManagedDirs,
        Self::WriteSshKeys,
        Self::UpdateLinger,
        Self::UpdateQuotas,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::DeleteSshKeys => "delete ssh keys",
            Self::DeleteManagedDirs => "delete managed directories",
            Self::DeleteUsers => "delete users",
            Self::DeleteGroups => "delete groups",
            Self::CreateGroups => "create groups",
            Self::UpdateGroups => "update groups",
            Self::CreateUsers => "create users",
            Self::UpdateUsers => "update users",
            Self::UpdatePasswords => "update passwords",
            Self::CreateManagedDirs => "create managed directories",
            Self::WriteSshKeys => "write ssh keys",
            Self::UpdateLinger => "update linger",
            Self::UpdateQuotas => "update quotas",
        }
    }
}

impl fmt::Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build the full ordered plan for a change set
///
/// `live` supplies uids of users about to be deleted; everything else comes
/// from the desired state. Every phase is present, possibly empty.
pub fn build_plan(
    changes: &ChangeSet,
    live: &Directory,
    desired: &DesiredState,
) -> Result<ExecutionPlan> {
    let mut plan = ExecutionPlan::new();

    for kind in PhaseKind::ALL {
        let steps = match kind {
            PhaseKind::DeleteSshKeys => delete_ssh_keys(changes, live, desired),
            PhaseKind::DeleteManagedDirs => delete_managed_dirs(changes, live, desired),
            PhaseKind::DeleteUsers => changes
                .users_to_delete
                .iter()
                .map(|name| run(name, CommandSpec::new("userdel").arg("--remove").arg(name)))
                .collect(),
            PhaseKind::DeleteGroups => changes
                .groups_to_delete
                .iter()
                .map(|name| run(name, CommandSpec::new("groupdel").arg(name)))
                .collect(),
            PhaseKind::CreateGroups => create_groups(changes, desired),
            PhaseKind::UpdateGroups => changes
                .group_updates
                .iter()
                .map(|(name, updates)| {
                    let actions = updates
                        .iter()
                        .map(|update| -> Action { match *update {} })
                        .collect();
                    Step::new(name, actions)
                })
                .collect(),
            PhaseKind::CreateUsers => create_users(changes, desired)?,
            PhaseKind::UpdateUsers => update_users(changes),
            PhaseKind::UpdatePasswords => update_passwords(changes, desired),
            PhaseKind::CreateManagedDirs => create_managed_dirs(changes, desired)?,
            PhaseKind::WriteSshKeys => write_ssh_keys(changes, desired)?,
            PhaseKind::UpdateLinger => update_linger(changes, live, desired),
            PhaseKind::UpdateQuotas => update_quotas(changes),
        };
        plan.push_phase(kind.name(), steps);
    }

    Ok(plan)
}

fn run(target: &str, command: CommandSpec) -> Step {
    Step::single(target, Action::Run(command))
}

fn delete_ssh_keys(changes: &ChangeSet, live: &Directory, desired: &DesiredState) -> Vec<Step> {
    deleted_users(changes, live)
        .map(|user| {
            let path = desired.settings.ssh_key_path.expand(&user.username, user.uid);
            Step::single(&user.username, Action::RemoveFile { path })
        })
        .collect()
}

fn delete_managed_dirs(changes: &ChangeSet, live: &Directory, desired: &DesiredState) -> Vec<Step> {
    deleted_users(changes, live)
        .filter_map(|user| {
            let actions: Vec<Action> = desired
                .settings
                .managed_dirs_for(&user.username, user.uid)
                .into_iter()
                .map(|path| Action::RemoveDir { path })
                .collect();
            (!actions.is_empty()).then(|| Step::new(&user.username, actions))
        })
        .collect()
}

fn deleted_users<'a>(changes: &'a ChangeSet, live: &'a Directory) -> impl Iterator<Item = &'a User> {
    changes
        .users_to_delete
        .iter()
        .filter_map(|name| live.users.get(name))
}

fn create_groups(changes: &ChangeSet, desired: &DesiredState) -> Vec<Step> {
    changes
        .groups_to_create
        .iter()
        .filter_map(|name| desired.directory.groups.get(name))
        .map(|group| {
            let mut cmd = CommandSpec::new("groupadd");
            // still present in /etc/group when the plan was built
            if changes.implicit_group_removals.contains(&group.name) {
                cmd = cmd.arg("--force");
            }
            run(
                &group.name,
                cmd.arg("--gid").arg(group.gid.to_string()).arg(&group.name),
            )
        })
        .collect()
}

/// Uid and primary gid of a desired user
fn ownership(desired: &DesiredState, user: &User) -> Result<Ownership> {
    let gid = desired
        .directory
        .gid_of(&user.primary_group)
        .ok_or_else(|| ProvisionError::DanglingGroupReference {
            username: user.username.clone(),
            group: user.primary_group.clone(),
        })?;
    Ok(Ownership::new(user.uid, gid))
}

fn desired_users<'a>(
    names: impl IntoIterator<Item = &'a String>,
    desired: &'a DesiredState,
) -> impl Iterator<Item = &'a User> {
    names
        .into_iter()
        .filter_map(|name| desired.directory.users.get(name))
}

fn join_groups(groups: &BTreeSet<String>) -> String {
    groups.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

fn create_users(changes: &ChangeSet, desired: &DesiredState) -> Result<Vec<Step>> {
    desired_users(&changes.users_to_create, desired)
        .map(|user| {
            let owner = ownership(desired, user)?;
            let mut cmd = CommandSpec::new("useradd")
                .arg("--create-home")
                .args(["--uid".to_string(), user.uid.to_string()])
                .args(["--gid".to_string(), owner.gid.to_string()]);
            if !user.additional_groups.is_empty() {
                cmd = cmd.arg("--groups").arg(join_groups(&user.additional_groups));
            }
            cmd = cmd.arg("--shell").arg(&user.shell);
            if let Some(home) = &user.home_dir {
                cmd = cmd.arg("--home-dir").arg(home);
            }
            Ok(run(&user.username, cmd.arg(&user.username)))
        })
        .collect()
}

fn update_users(changes: &ChangeSet) -> Vec<Step> {
    changes
        .user_updates
        .iter()
        .map(|(name, updates)| {
            let mut cmd = CommandSpec::new("usermod");
            for update in updates {
                cmd = match update {
                    UserUpdate::PrimaryGroup { gid, .. } => cmd.arg("--gid").arg(gid.to_string()),
                    UserUpdate::AdditionalGroups { groups } => {
                        cmd.arg("--groups").arg(join_groups(groups))
                    }
                    UserUpdate::Shell { shell } => cmd.arg("--shell").arg(shell),
                };
            }
            run(name, cmd.arg(name))
        })
        .collect()
}

/// All credentials go through one `chpasswd` process
fn update_passwords(changes: &ChangeSet, desired: &DesiredState) -> Vec<Step> {
    let lines: String = changes
        .password_updates
        .iter()
        .filter_map(|name| {
            let hash = desired.directory.passwords.get(name)?;
            Some(format!("{name}:{hash}\n"))
        })
        .collect();
    if lines.is_empty() {
        return Vec::new();
    }
    vec![run(
        "passwords",
        CommandSpec::new("chpasswd").arg("-e").stdin(lines),
    )]
}

fn create_managed_dirs(changes: &ChangeSet, desired: &DesiredState) -> Result<Vec<Step>> {
    desired_users(&changes.managed_directory_creates, desired)
        .map(|user| {
            let owner = ownership(desired, user)?;
            let actions = desired
                .directory
                .managed_dirs
                .get(&user.username)
                .into_iter()
                .flatten()
                .map(|path| Action::EnsureDir {
                    path: path.clone(),
                    owner,
                    mode: MANAGED_DIR_MODE,
                })
                .collect();
            Ok(Step::new(&user.username, actions))
        })
        .collect()
}

fn write_ssh_keys(changes: &ChangeSet, desired: &DesiredState) -> Result<Vec<Step>> {
    let settings = &desired.settings;
    desired_users(&changes.ssh_key_updates, desired)
        .map(|user| {
            let owner = ownership(desired, user)?;
            // strict mode: the user can read its keys but not replace them
            let (owner, dir_mode, file_mode) = if settings.strict_ssh_key_dir {
                (Ownership::new(0, owner.gid), 0o750, 0o640)
            } else {
                (owner, 0o700, 0o600)
            };

            let mut actions = Vec::new();
            if let Some(dir) = &settings.ssh_key_dir {
                actions.push(Action::EnsureDir {
                    path: dir.expand(&user.username, user.uid),
                    owner,
                    mode: dir_mode,
                });
            }
            let keys = desired
                .directory
                .ssh_keys
                .get(&user.username)
                .map(Vec::as_slice)
                .unwrap_or_default();
            actions.push(Action::WriteFile {
                path: settings.ssh_key_path.expand(&user.username, user.uid),
                contents: userdb::authorized_keys::render_authorized_keys(MANAGED_HEADER, keys),
                owner,
                mode: file_mode,
            });
            Ok(Step::new(&user.username, actions))
        })
        .collect()
}

fn update_linger(changes: &ChangeSet, live: &Directory, desired: &DesiredState) -> Vec<Step> {
    if live.linger.is_none() {
        let wanted = desired.directory.linger.iter().flatten().any(|(_, on)| *on);
        if wanted {
            log::warn!("Linger is not supported on this host, skipping linger updates");
        }
        return Vec::new();
    }
    changes
        .linger_updates
        .iter()
        .map(|(name, enable)| {
            let verb = if *enable {
                "enable-linger"
            } else {
                "disable-linger"
            };
            run(name, CommandSpec::new("loginctl").arg(verb).arg(name))
        })
        .collect()
}

/// One `xfs_quota` invocation per path
fn update_quotas(changes: &ChangeSet) -> Vec<Step> {
    changes
        .disk_quota_changes
        .iter()
        .map(|(path, quota)| {
            let mut cmd = CommandSpec::new("xfs_quota").arg("-x");
            for (uid, limits) in quota.limits_to_set() {
                cmd = cmd
                    .arg("-c")
                    .arg(userdb::quota::limit_command(uid, &limits));
            }
            let target = path.display().to_string();
            run(&target, cmd.arg(&target))
        })
        .collect()
}
