//! Change set display

use super::delta::{ChangeSet, QuotaChanges, UserUpdate};
use crate::directory::{DesiredState, Directory};
use colored::Colorize;
use std::fmt;
use userdb::QuotaLimits;

/// Number of entity-level changes, as shown in the summary line
pub fn change_count(changes: &ChangeSet) -> usize {
    changes.groups_to_create.len()
        + changes.groups_to_delete.len()
        + changes.group_updates.len()
        + changes.users_to_create.len()
        + changes.users_to_delete.len()
        + changes.user_updates.len()
        + changes.password_updates.len()
        + changes.ssh_key_updates.len()
        + changes.linger_updates.len()
        + changes.managed_directory_creates.len()
        + changes
            .disk_quota_changes
            .values()
            .map(|q| q.new_quotas.len() + q.update_quotas.len() + q.delete_quotas.len())
            .sum::<usize>()
}

/// Print the change set
pub fn display_change_set(
    changes: &ChangeSet,
    live: &Directory,
    desired: &DesiredState,
    show_key_diff: bool,
) {
    print!("{}", render_change_set(changes, live, desired, show_key_diff));
}

/// Render the change set, every category in key order
pub fn render_change_set(
    changes: &ChangeSet,
    live: &Directory,
    desired: &DesiredState,
    show_key_diff: bool,
) -> String {
    ChangeSetView {
        changes,
        live,
        desired,
        show_key_diff,
    }
    .to_string()
}

struct ChangeSetView<'a> {
    changes: &'a ChangeSet,
    live: &'a Directory,
    desired: &'a DesiredState,
    show_key_diff: bool,
}

impl fmt::Display for ChangeSetView<'_> {
    fn fmt(&self, out: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            changes,
            live,
            desired,
            show_key_diff,
        } = *self;

        if changes.is_empty() {
            writeln!(out)?;
            writeln!(out, "  {} No changes needed", "✓".green())?;
            return Ok(());
        }

        let want = &desired.directory;

        writeln!(out)?;
        writeln!(
            out,
            "┌─ {} ─────────────────────────────────────────┐",
            "Account Changes".bold()
        )?;
        writeln!(out, "│")?;

        let mut groups = Vec::new();
        for name in &changes.groups_to_create {
            let gid = want.gid_of(name).map(|g| g.to_string()).unwrap_or_default();
            let note = if changes.implicit_group_removals.contains(name) {
                " (recreated)"
            } else {
                ""
            };
            groups.push(added(name, &format!("gid {gid}{note}")));
        }
        for name in &changes.groups_to_delete {
            groups.push(removed(name, ""));
        }
        for name in &changes.implicit_group_removals {
            if !changes.groups_to_create.contains(name) {
                groups.push(removed(name, "(with its user)"));
            }
        }
        section(out, "Groups", groups)?;

        let mut users = Vec::new();
        for user in changes
            .users_to_create
            .iter()
            .filter_map(|name| want.users.get(name))
        {
            users.push(added(
                &user.username,
                &format!("uid {}, group {}", user.uid, user.primary_group),
            ));
        }
        for name in &changes.users_to_delete {
            let uid = live
                .users
                .get(name)
                .map(|u| format!("uid {}", u.uid))
                .unwrap_or_default();
            users.push(removed(name, &uid));
        }
        for (name, updates) in &changes.user_updates {
            let fields: Vec<String> = updates.iter().map(describe_update).collect();
            users.push(modified(name, &fields.join(", ")));
        }
        section(out, "Users", users)?;

        section(
            out,
            "Passwords",
            changes
                .password_updates
                .iter()
                .map(|name| modified(name, ""))
                .collect(),
        )?;

        let mut keys = Vec::new();
        for name in &changes.ssh_key_updates {
            let empty = Vec::new();
            let current = live.ssh_keys.get(name).unwrap_or(&empty);
            let wanted = want.ssh_keys.get(name).unwrap_or(&empty);
            let adds = wanted.iter().filter(|k| !current.contains(*k)).count();
            let drops = current.iter().filter(|k| !wanted.contains(*k)).count();
            keys.push(modified(name, &format!("+{adds} -{drops} keys")));
            if show_key_diff {
                keys.extend(key_diff(current, wanted));
            }
        }
        section(out, "SSH keys", keys)?;

        section(
            out,
            "Linger",
            changes
                .linger_updates
                .iter()
                .map(|(name, on)| modified(name, if *on { "enable" } else { "disable" }))
                .collect(),
        )?;

        let mut dirs = Vec::new();
        for name in &changes.managed_directory_creates {
            let existing = live.managed_dirs.get(name);
            for path in want.managed_dirs.get(name).into_iter().flatten() {
                if existing.is_some_and(|e| e.contains(path)) {
                    continue;
                }
                dirs.push(added(&path.display().to_string(), name));
            }
        }
        section(out, "Managed directories", dirs)?;

        for (path, quota) in &changes.disk_quota_changes {
            section(
                out,
                &format!("Quotas on {}", path.display()),
                quota_lines(quota),
            )?;
        }

        writeln!(out, "├─────────────────────────────────────────────────────┤")?;
        writeln!(
            out,
            "│ Summary: {} changes",
            change_count(changes).to_string().bold()
        )?;
        writeln!(out, "└─────────────────────────────────────────────────────┘")?;
        Ok(())
    }
}

fn section(out: &mut fmt::Formatter<'_>, title: &str, lines: Vec<String>) -> fmt::Result {
    if lines.is_empty() {
        return Ok(());
    }
    writeln!(out, "│ {}", title.bold())?;
    for line in lines {
        writeln!(out, "│   {line}")?;
    }
    writeln!(out, "│")
}

fn added(name: &str, detail: &str) -> String {
    format!("{} {:<24} {}", "+".green(), name, detail.dimmed())
}

fn removed(name: &str, detail: &str) -> String {
    format!("{} {:<24} {}", "-".red(), name, detail.dimmed())
}

fn modified(name: &str, detail: &str) -> String {
    format!("{} {:<24} {}", "~".yellow(), name, detail.dimmed())
}

fn describe_update(update: &UserUpdate) -> String {
    match update {
        UserUpdate::PrimaryGroup { group, gid } => format!("primary_group → {group} ({gid})"),
        UserUpdate::AdditionalGroups { groups } => {
            let names: Vec<&str> = groups.iter().map(String::as_str).collect();
            format!("additional_groups → [{}]", names.join(","))
        }
        UserUpdate::Shell { shell } => format!("shell → {shell}"),
    }
}

fn describe_limits(limits: &QuotaLimits) -> String {
    format!(
        "bsoft={} bhard={} isoft={} ihard={}",
        limits.bytes_soft, limits.bytes_hard, limits.inodes_soft, limits.inodes_hard
    )
}

fn uid_label(uid: u32) -> String {
    if uid == 0 {
        "default".to_string()
    } else {
        format!("uid {uid}")
    }
}

fn quota_lines(quota: &QuotaChanges) -> Vec<String> {
    let mut lines = Vec::new();
    for (uid, limits) in &quota.new_quotas {
        lines.push(added(&uid_label(*uid), &describe_limits(limits)));
    }
    for (uid, limits) in &quota.update_quotas {
        lines.push(modified(&uid_label(*uid), &describe_limits(limits)));
    }
    for uid in &quota.delete_quotas {
        lines.push(removed(&uid_label(*uid), ""));
    }
    lines
}

/// Line diff of the key lists, for `--debug`
fn key_diff(current: &[String], wanted: &[String]) -> Vec<String> {
    let before: String = current.iter().map(|k| format!("{k}\n")).collect();
    let after: String = wanted.iter().map(|k| format!("{k}\n")).collect();
    let diff = similar::TextDiff::from_lines(&before, &after);

    diff.iter_all_changes()
        .filter_map(|change| match change.tag() {
            similar::ChangeTag::Delete => {
                Some(format!("    {}", format!("- {}", change.value().trim_end()).red()))
            }
            similar::ChangeTag::Insert => {
                Some(format!("    {}", format!("+ {}", change.value().trim_end()).green()))
            }
            similar::ChangeTag::Equal => None,
        })
        .collect()
}
