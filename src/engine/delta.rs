//! Delta calculator - the change set between live and desired state
//!
//! Pure functions over two snapshots. Every category is keyed by name in
//! ordered collections, so the same inputs always render the same output.

use crate::directory::{DesiredState, Directory, Group, User};
use crate::config::UpdatePassword;
use crate::error::{Entity, ProvisionError, Result};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use userdb::QuotaLimits;

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupProperty {
    Gid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserProperty {
    Uid,
    PrimaryGroup,
    AdditionalGroups,
    Shell,
    HomeDir,
}

impl fmt::Display for GroupProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gid => f.write_str("gid"),
        }
    }
}

impl fmt::Display for UserProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uid => "uid",
            Self::PrimaryGroup => "primary_group",
            Self::AdditionalGroups => "additional_groups",
            Self::Shell => "shell",
            Self::HomeDir => "home_dir",
        })
    }
}

/// A comparable property value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Id(u32),
    Text(String),
    Names(BTreeSet<String>),
}

/// An entity described as a closed set of comparable properties
pub trait Properties {
    type Property: Copy + Ord + fmt::Display;

    fn properties(&self) -> BTreeMap<Self::Property, PropertyValue>;
}

impl Properties for Group {
    type Property = GroupProperty;

    /// Membership is derived from users and is not a group property
    fn properties(&self) -> BTreeMap<GroupProperty, PropertyValue> {
        BTreeMap::from([(GroupProperty::Gid, PropertyValue::Id(self.gid))])
    }
}

impl Properties for User {
    type Property = UserProperty;

    fn properties(&self) -> BTreeMap<UserProperty, PropertyValue> {
        let mut props = BTreeMap::from([
            (UserProperty::Uid, PropertyValue::Id(self.uid)),
            (
                UserProperty::PrimaryGroup,
                PropertyValue::Text(self.primary_group.clone()),
            ),
            (
                UserProperty::AdditionalGroups,
                PropertyValue::Names(self.additional_groups.clone()),
            ),
            (UserProperty::Shell, PropertyValue::Text(self.shell.clone())),
        ]);
        if let Some(home) = &self.home_dir {
            props.insert(UserProperty::HomeDir, PropertyValue::Text(home.clone()));
        }
        props
    }
}

/// Names of the properties whose values differ
///
/// Both sides must describe the same properties; a property present on only
/// one side cannot be updated and is reported as unsupported.
pub fn diff_properties<K: Copy + Ord + fmt::Display>(
    entity: &Entity,
    desired: &BTreeMap<K, PropertyValue>,
    live: &BTreeMap<K, PropertyValue>,
) -> Result<BTreeSet<K>> {
    if let Some(key) = desired
        .keys()
        .find(|k| !live.contains_key(*k))
        .or_else(|| live.keys().find(|k| !desired.contains_key(*k)))
    {
        return Err(ProvisionError::UnsupportedPropertyUpdate {
            entity: entity.clone(),
            property: key.to_string(),
        });
    }

    Ok(desired
        .iter()
        .filter(|(key, value)| live.get(*key) != Some(*value))
        .map(|(key, _)| *key)
        .collect())
}

// ============================================================================
// Update rules
// ============================================================================

/// A group mutation; groups have no updatable property
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum GroupUpdate {}

/// A user mutation with its new value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserUpdate {
    PrimaryGroup { group: String, gid: u32 },
    AdditionalGroups { groups: BTreeSet<String> },
    Shell { shell: String },
}

fn group_update(property: GroupProperty, desired: &Group, live: &Group) -> Result<GroupUpdate> {
    match property {
        GroupProperty::Gid => Err(ProvisionError::ImmutableFieldConflict {
            entity: Entity::Group(desired.name.clone()),
            field: "gid",
            live: live.gid,
            desired: desired.gid,
        }),
    }
}

fn user_update(
    property: UserProperty,
    desired: &User,
    live: &User,
    desired_dir: &Directory,
) -> Result<UserUpdate> {
    match property {
        UserProperty::Uid => Err(ProvisionError::ImmutableFieldConflict {
            entity: Entity::User(desired.username.clone()),
            field: "uid",
            live: live.uid,
            desired: desired.uid,
        }),
        UserProperty::PrimaryGroup => {
            let gid = desired_dir.gid_of(&desired.primary_group).ok_or_else(|| {
                ProvisionError::DanglingGroupReference {
                    username: desired.username.clone(),
                    group: desired.primary_group.clone(),
                }
            })?;
            Ok(UserUpdate::PrimaryGroup {
                group: desired.primary_group.clone(),
                gid,
            })
        }
        UserProperty::AdditionalGroups => Ok(UserUpdate::AdditionalGroups {
            groups: desired.additional_groups.clone(),
        }),
        UserProperty::Shell => Ok(UserUpdate::Shell {
            shell: desired.shell.clone(),
        }),
        UserProperty::HomeDir => Err(ProvisionError::UnsupportedPropertyUpdate {
            entity: Entity::User(desired.username.clone()),
            property: property.to_string(),
        }),
    }
}

// ============================================================================
// Change set
// ============================================================================

/// Quota changes on one path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuotaChanges {
    pub new_quotas: BTreeMap<u32, QuotaLimits>,
    pub update_quotas: BTreeMap<u32, QuotaLimits>,
    /// Removed by setting every limit to zero
    pub delete_quotas: BTreeSet<u32>,
}

impl QuotaChanges {
    pub fn is_empty(&self) -> bool {
        self.new_quotas.is_empty() && self.update_quotas.is_empty() && self.delete_quotas.is_empty()
    }

    /// Every `(uid, limits)` pair to write, deletions as zero limits
    pub fn limits_to_set(&self) -> BTreeMap<u32, QuotaLimits> {
        let mut all: BTreeMap<u32, QuotaLimits> = self
            .delete_quotas
            .iter()
            .map(|uid| (*uid, QuotaLimits::UNLIMITED))
            .collect();
        all.extend(&self.new_quotas);
        all.extend(&self.update_quotas);
        all
    }
}

/// Every mutation needed to converge the host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeSet {
    pub groups_to_create: BTreeSet<String>,
    pub groups_to_delete: BTreeSet<String>,
    /// Private groups that `userdel` removes together with their user
    pub implicit_group_removals: BTreeSet<String>,
    pub group_updates: BTreeMap<String, Vec<GroupUpdate>>,
    pub users_to_create: BTreeSet<String>,
    pub users_to_delete: BTreeSet<String>,
    pub user_updates: BTreeMap<String, Vec<UserUpdate>>,
    pub password_updates: BTreeSet<String>,
    pub ssh_key_updates: BTreeSet<String>,
    pub linger_updates: BTreeMap<String, bool>,
    pub managed_directory_creates: BTreeSet<String>,
    pub disk_quota_changes: BTreeMap<PathBuf, QuotaChanges>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.groups_to_create.is_empty()
            && self.groups_to_delete.is_empty()
            && self.implicit_group_removals.is_empty()
            && self.group_updates.is_empty()
            && self.users_to_create.is_empty()
            && self.users_to_delete.is_empty()
            && self.user_updates.is_empty()
            && self.password_updates.is_empty()
            && self.ssh_key_updates.is_empty()
            && self.linger_updates.is_empty()
            && self.managed_directory_creates.is_empty()
            && self.disk_quota_changes.is_empty()
    }
}

/// Compute the change set between the live and desired directories
///
/// Fails before anything is mutated when a diff touches an immutable id, a
/// property without an update rule, or an undeclared primary group.
pub fn compute_change_set(live: &Directory, desired: &DesiredState) -> Result<ChangeSet> {
    let want = &desired.directory;
    let settings = &desired.settings;
    let mut changes = ChangeSet::default();

    // users: create and delete
    changes.users_to_create = want
        .users
        .keys()
        .filter(|name| !live.users.contains_key(*name))
        .cloned()
        .collect();
    changes.users_to_delete = live
        .users
        .values()
        .filter(|u| !want.users.contains_key(&u.username) && settings.managed_uids.contains(u.uid))
        .map(|u| u.username.clone())
        .collect();
    changes.implicit_group_removals = changes
        .users_to_delete
        .iter()
        .filter_map(|name| implicitly_removed_group(live, name))
        .collect();

    // groups: create, delete, update
    changes.groups_to_create = want
        .groups
        .keys()
        .filter(|name| {
            !live.groups.contains_key(*name) || changes.implicit_group_removals.contains(*name)
        })
        .cloned()
        .collect();
    changes.groups_to_delete = live
        .groups
        .values()
        .filter(|g| {
            !want.groups.contains_key(&g.name)
                && settings.managed_gids.contains(g.gid)
                && !changes.implicit_group_removals.contains(&g.name)
        })
        .map(|g| g.name.clone())
        .collect();

    for (name, wanted) in &want.groups {
        let Some(current) = live.groups.get(name) else {
            continue;
        };
        if changes.implicit_group_removals.contains(name) {
            continue;
        }
        let entity = Entity::Group(name.clone());
        let diff = diff_properties(&entity, &wanted.properties(), &current.properties())?;
        let updates = diff
            .into_iter()
            .map(|p| group_update(p, wanted, current))
            .collect::<Result<Vec<_>>>()?;
        if !updates.is_empty() {
            changes.group_updates.insert(name.clone(), updates);
        }
    }

    // users: property updates
    for (name, wanted) in &want.users {
        let Some(current) = live.users.get(name) else {
            continue;
        };
        let entity = Entity::User(name.clone());
        let mut live_props = current.properties();
        if wanted.home_dir.is_none() {
            live_props.remove(&UserProperty::HomeDir);
        }
        let diff = diff_properties(&entity, &wanted.properties(), &live_props)?;
        let updates = diff
            .into_iter()
            .map(|p| user_update(p, wanted, current, want))
            .collect::<Result<Vec<_>>>()?;
        if !updates.is_empty() {
            changes.user_updates.insert(name.clone(), updates);
        }
    }

    // per-user attributes
    for name in want.users.keys() {
        let created = changes.users_to_create.contains(name);

        let wanted_password = want.passwords.get(name);
        let policy = desired
            .update_password
            .get(name)
            .copied()
            .unwrap_or(UpdatePassword::OnCreate);
        if wanted_password.is_some()
            && wanted_password != live.passwords.get(name)
            && (created || policy == UpdatePassword::Always)
        {
            changes.password_updates.insert(name.clone());
        }

        let wanted_keys: BTreeSet<&String> = want.ssh_keys.get(name).into_iter().flatten().collect();
        let live_keys: BTreeSet<&String> = live.ssh_keys.get(name).into_iter().flatten().collect();
        if created || wanted_keys != live_keys {
            changes.ssh_key_updates.insert(name.clone());
        }

        let empty = BTreeSet::new();
        let wanted_dirs = want.managed_dirs.get(name).unwrap_or(&empty);
        let live_dirs = live.managed_dirs.get(name).unwrap_or(&empty);
        if !wanted_dirs.is_subset(live_dirs) {
            changes.managed_directory_creates.insert(name.clone());
        }
    }

    // linger is skipped entirely on hosts without support
    if let (Some(live_linger), Some(want_linger)) = (&live.linger, &want.linger) {
        for (name, flag) in want_linger {
            let current = live_linger.get(name).copied().unwrap_or(false);
            if changes.users_to_create.contains(name) || current != *flag {
                changes.linger_updates.insert(name.clone(), *flag);
            }
        }
    }

    // quotas, per configured path
    let no_quotas = BTreeMap::new();
    for (path, wanted) in &want.quotas {
        let current = live.quotas.get(path).unwrap_or(&no_quotas);
        let mut quota = QuotaChanges::default();

        for (uid, limits) in wanted {
            match current.get(uid) {
                None if limits.is_unlimited() => {}
                None => {
                    quota.new_quotas.insert(*uid, *limits);
                }
                Some(existing) if existing != limits => {
                    quota.update_quotas.insert(*uid, *limits);
                }
                Some(_) => {}
            }
        }
        quota.delete_quotas = current
            .keys()
            .filter(|uid| !wanted.contains_key(*uid) && settings.managed_uids.contains(**uid))
            .copied()
            .collect();

        if !quota.is_empty() {
            changes.disk_quota_changes.insert(path.clone(), quota);
        }
    }

    Ok(changes)
}

/// The private group `userdel` removes along with `username`, if any
///
/// That is the group named after the user, used as its primary group by
/// nobody else and without other members.
fn implicitly_removed_group(live: &Directory, username: &str) -> Option<String> {
    let user = live.users.get(username)?;
    if user.primary_group != username {
        return None;
    }
    let group = live.groups.get(username)?;
    let shared = live
        .users
        .values()
        .any(|u| u.username != username && u.primary_group == group.name);
    let other_members = group.members.iter().any(|m| m != username);
    (!shared && !other_members).then(|| group.name.clone())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Config;
    use crate::directory::normalize;
    use serde_json::{Value, json};

    pub(crate) fn user(name: &str, uid: u32, primary: &str, extra: &[&str]) -> User {
        User {
            username: name.into(),
            uid,
            primary_group: primary.into(),
            additional_groups: extra.iter().map(|s| (*s).to_string()).collect(),
            shell: "/bin/bash".into(),
            home_dir: Some(format!("/home/{name}")),
        }
    }

    pub(crate) fn group(name: &str, gid: u32, members: &[&str]) -> Group {
        Group {
            name: name.into(),
            gid,
            members: members.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    /// A live directory with the given users and groups, each user with a
    /// password and no keys
    pub(crate) fn live_dir(users: Vec<User>, groups: Vec<Group>) -> Directory {
        let mut dir = Directory {
            linger: Some(BTreeMap::new()),
            ..Directory::default()
        };
        for u in users {
            dir.passwords.insert(u.username.clone(), format!("$6${}", u.username));
            dir.ssh_keys.insert(u.username.clone(), Vec::new());
            if let Some(l) = dir.linger.as_mut() {
                l.insert(u.username.clone(), false);
            }
            dir.users.insert(u.username.clone(), u);
        }
        for g in groups {
            dir.groups.insert(g.name.clone(), g);
        }
        dir
    }

    pub(crate) fn desired(doc: Value) -> DesiredState {
        normalize(&Config::from_value(doc).unwrap()).unwrap()
    }

    fn base_doc() -> Value {
        json!({
            "users": [{
                "username": "alice",
                "password": "$6$alice",
                "update_password": "always",
                "uid": 2001,
                "primary_group": "g1"
            }],
            "groups": [{ "groupname": "g1", "gid": 3001 }],
            "managed_uid_range": [1000, 2999],
            "managed_gid_range": [1000, 3999]
        })
    }

    fn converged_live() -> Directory {
        live_dir(
            vec![user("alice", 2001, "g1", &[])],
            vec![group("g1", 3001, &[])],
        )
    }

    #[test]
    fn test_diff_properties() {
        let entity = Entity::User("x".into());
        let a = BTreeMap::from([
            (UserProperty::Uid, PropertyValue::Id(1)),
            (UserProperty::Shell, PropertyValue::Text("/bin/sh".into())),
        ]);
        assert!(diff_properties(&entity, &a, &a.clone()).unwrap().is_empty());

        let b = BTreeMap::from([
            (UserProperty::Uid, PropertyValue::Id(2)),
            (UserProperty::Shell, PropertyValue::Text("/bin/sh".into())),
        ]);
        assert_eq!(
            diff_properties(&entity, &a, &b).unwrap(),
            BTreeSet::from([UserProperty::Uid])
        );

        let c = BTreeMap::from([(UserProperty::Uid, PropertyValue::Id(1))]);
        let err = diff_properties(&entity, &a, &c).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::UnsupportedPropertyUpdate { property, .. } if property == "shell"
        ));
    }

    #[test]
    fn test_converged_state_is_empty() {
        let mut live = converged_live();
        live.passwords.insert("alice".into(), "$6$alice".into());
        let changes = compute_change_set(&live, &desired(base_doc())).unwrap();
        assert!(changes.is_empty(), "{changes:?}");
    }

    #[test]
    fn test_deletion_gated_by_managed_range() {
        let mut live = converged_live();
        live.passwords.insert("alice".into(), "$6$alice".into());
        let extra = live_dir(
            vec![user("bob", 1500, "bob", &[]), user("svc", 999, "svc", &[])],
            vec![group("bob", 1500, &[]), group("svc", 999, &[])],
        );
        live.users.extend(extra.users);
        live.groups.extend(extra.groups);
        live.passwords.extend(extra.passwords);

        let changes = compute_change_set(&live, &desired(base_doc())).unwrap();
        assert_eq!(changes.users_to_delete, BTreeSet::from(["bob".to_string()]));
        assert!(changes.groups_to_delete.is_empty());
        assert_eq!(
            changes.implicit_group_removals,
            BTreeSet::from(["bob".to_string()])
        );
    }

    #[test]
    fn test_shared_private_group_is_deleted_explicitly() {
        let mut live = live_dir(
            vec![
                user("alice", 2001, "g1", &[]),
                user("bob", 1500, "bob", &[]),
                user("dave", 1600, "bob", &[]),
            ],
            vec![group("g1", 3001, &[]), group("bob", 1500, &[])],
        );
        live.passwords.insert("alice".into(), "$6$alice".into());

        let changes = compute_change_set(&live, &desired(base_doc())).unwrap();
        assert_eq!(changes.users_to_delete.len(), 2);
        assert!(changes.implicit_group_removals.is_empty());
        assert_eq!(changes.groups_to_delete, BTreeSet::from(["bob".to_string()]));
    }

    #[test]
    fn test_implicitly_removed_group_still_desired_is_recreated() {
        let mut doc = base_doc();
        doc["groups"] = json!([
            { "groupname": "g1", "gid": 3001 },
            { "groupname": "bob", "gid": 1500 }
        ]);
        let mut live = live_dir(
            vec![user("alice", 2001, "g1", &[]), user("bob", 1500, "bob", &[])],
            vec![group("g1", 3001, &[]), group("bob", 1500, &[])],
        );
        live.passwords.insert("alice".into(), "$6$alice".into());

        let changes = compute_change_set(&live, &desired(doc)).unwrap();
        assert_eq!(changes.groups_to_create, BTreeSet::from(["bob".to_string()]));
        assert!(changes.groups_to_delete.is_empty());
    }

    #[test]
    fn test_gid_change_is_fatal() {
        let mut live = converged_live();
        live.groups.insert("g1".into(), group("g1", 3005, &[]));

        let err = compute_change_set(&live, &desired(base_doc())).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::ImmutableFieldConflict { field: "gid", live: 3005, desired: 3001, .. }
        ));
    }

    #[test]
    fn test_uid_change_is_fatal() {
        let mut live = converged_live();
        live.users.get_mut("alice").unwrap().uid = 2500;
        let err = compute_change_set(&live, &desired(base_doc())).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::ImmutableFieldConflict { field: "uid", live: 2500, desired: 2001, .. }
        ));
    }

    #[test]
    fn test_user_property_updates() {
        let mut doc = base_doc();
        doc["groups"] = json!([
            { "groupname": "g1", "gid": 3001 },
            { "groupname": "g2", "gid": 3002 }
        ]);
        doc["users"][0]["primary_group"] = json!("g2");
        doc["users"][0]["additional_groups"] = json!(["g1", "sudo"]);
        doc["users"][0]["shell"] = json!("/bin/zsh");
        let mut live = converged_live();
        live.groups.insert("g2".into(), group("g2", 3002, &[]));

        let changes = compute_change_set(&live, &desired(doc)).unwrap();
        assert_eq!(
            changes.user_updates["alice"],
            vec![
                UserUpdate::PrimaryGroup {
                    group: "g2".into(),
                    gid: 3002
                },
                UserUpdate::AdditionalGroups {
                    groups: BTreeSet::from(["g1".to_string(), "sudo".to_string()])
                },
                UserUpdate::Shell {
                    shell: "/bin/zsh".into()
                },
            ]
        );
    }

    #[test]
    fn test_home_dir_compared_only_when_configured() {
        let live = converged_live();
        let changes = compute_change_set(&live, &desired(base_doc())).unwrap();
        assert!(changes.user_updates.is_empty());

        let mut doc = base_doc();
        doc["home_dir"] = json!("/srv/home/%u");
        let err = compute_change_set(&live, &desired(doc)).unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::UnsupportedPropertyUpdate { property, .. } if property == "home_dir"
        ));
    }

    #[test]
    fn test_password_policy() {
        let mut doc = base_doc();
        doc["users"][0]["update_password"] = json!("on_create");
        let mut live_other = converged_live();
        live_other.passwords.insert("alice".into(), "$6$old".into());

        let changes = compute_change_set(&live_other, &desired(doc.clone())).unwrap();
        assert!(changes.password_updates.is_empty());

        doc["users"][0]["update_password"] = json!("always");
        let changes = compute_change_set(&live_other, &desired(doc)).unwrap();
        assert_eq!(changes.password_updates, BTreeSet::from(["alice".to_string()]));
    }

    #[test]
    fn test_new_user_gets_every_attribute() {
        let mut doc = base_doc();
        doc["users"][0]["update_password"] = json!("on_create");
        doc["managed_user_directories"] = json!(["/scratch/%u"]);
        let live = live_dir(vec![], vec![group("g1", 3001, &[])]);

        let changes = compute_change_set(&live, &desired(doc)).unwrap();
        let alice = BTreeSet::from(["alice".to_string()]);
        assert_eq!(changes.users_to_create, alice);
        assert_eq!(changes.password_updates, alice);
        // written even though there are no keys, for the managed header
        assert_eq!(changes.ssh_key_updates, alice);
        assert_eq!(changes.managed_directory_creates, alice);
        assert_eq!(changes.linger_updates, BTreeMap::from([("alice".to_string(), false)]));
        assert!(changes.groups_to_create.is_empty());
    }

    #[test]
    fn test_ssh_keys_compared_as_sets() {
        let mut doc = base_doc();
        doc["users"][0]["ssh_authorized_keys"] = json!(["key-b", "key-a"]);
        let mut live = converged_live();
        live.passwords.insert("alice".into(), "$6$alice".into());
        live.ssh_keys
            .insert("alice".into(), vec!["key-a".into(), "key-b".into()]);
        let changes = compute_change_set(&live, &desired(doc.clone())).unwrap();
        assert!(changes.ssh_key_updates.is_empty());

        live.ssh_keys.insert("alice".into(), vec!["key-a".into()]);
        let changes = compute_change_set(&live, &desired(doc)).unwrap();
        assert_eq!(changes.ssh_key_updates.len(), 1);
    }

    #[test]
    fn test_linger_skipped_without_support() {
        let mut doc = base_doc();
        doc["users"][0]["linger"] = json!(true);
        let mut live = converged_live();
        live.passwords.insert("alice".into(), "$6$alice".into());

        let changes = compute_change_set(&live, &desired(doc.clone())).unwrap();
        assert_eq!(changes.linger_updates, BTreeMap::from([("alice".to_string(), true)]));

        live.linger = None;
        let changes = compute_change_set(&live, &desired(doc)).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_existing_managed_dirs_are_not_recreated() {
        let mut doc = base_doc();
        doc["managed_user_directories"] = json!(["/scratch/%u", "/data/%U"]);
        let mut live = converged_live();
        live.passwords.insert("alice".into(), "$6$alice".into());
        live.managed_dirs.insert(
            "alice".into(),
            BTreeSet::from([PathBuf::from("/scratch/alice")]),
        );
        let changes = compute_change_set(&live, &desired(doc.clone())).unwrap();
        assert_eq!(changes.managed_directory_creates.len(), 1);

        live.managed_dirs.insert(
            "alice".into(),
            BTreeSet::from([PathBuf::from("/scratch/alice"), PathBuf::from("/data/2001")]),
        );
        let changes = compute_change_set(&live, &desired(doc)).unwrap();
        assert!(changes.managed_directory_creates.is_empty());
    }

    #[test]
    fn test_quota_changes() {
        let mut doc = base_doc();
        doc["users"][0]["disk_quota"] = json!([{ "path": "/data", "bytes_soft_limit": "1Gi" }]);
        doc["xfs_default_user_quota"] = json!([{ "path": "/data", "inodes_hard_limit": "1m" }]);
        let mut live = converged_live();
        live.passwords.insert("alice".into(), "$6$alice".into());
        let stale = QuotaLimits {
            bytes_hard: 4096,
            ..QuotaLimits::default()
        };
        live.quotas.insert(
            PathBuf::from("/data"),
            BTreeMap::from([
                (0, QuotaLimits { inodes_hard: 5, ..QuotaLimits::default() }),
                (1500, stale),
                (60000, stale),
            ]),
        );

        let changes = compute_change_set(&live, &desired(doc)).unwrap();
        let data = &changes.disk_quota_changes[&PathBuf::from("/data")];
        assert_eq!(data.new_quotas.keys().collect::<Vec<_>>(), vec![&2001]);
        assert_eq!(data.update_quotas[&0].inodes_hard, 1_000_000);
        // 60000 is outside the managed range
        assert_eq!(data.delete_quotas, BTreeSet::from([1500]));
        assert_eq!(data.limits_to_set()[&1500], QuotaLimits::UNLIMITED);
    }

    #[test]
    fn test_deterministic() {
        let mut doc = base_doc();
        doc["users"][0]["additional_groups"] = json!(["z", "a", "m"]);
        let live = live_dir(
            vec![user("bob", 1500, "bob", &[]), user("carl", 1501, "carl", &[])],
            vec![group("bob", 1500, &[]), group("old", 1700, &[])],
        );
        let d = desired(doc);
        let first = compute_change_set(&live, &d).unwrap();
        let second = compute_change_set(&live, &d).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    /// Apply a change set to a snapshot the way the host would
    fn simulate(live: &Directory, changes: &ChangeSet, desired: &DesiredState) -> Directory {
        let want = &desired.directory;
        let mut next = live.clone();

        for name in &changes.users_to_delete {
            next.users.remove(name);
            next.passwords.remove(name);
            next.ssh_keys.remove(name);
            next.managed_dirs.remove(name);
            if let Some(l) = next.linger.as_mut() {
                l.remove(name);
            }
        }
        for name in changes.implicit_group_removals.iter().chain(&changes.groups_to_delete) {
            next.groups.remove(name);
        }
        for name in &changes.groups_to_create {
            next.groups.insert(name.clone(), want.groups[name].clone());
        }
        for name in &changes.users_to_create {
            let mut user = want.users[name].clone();
            user.home_dir.get_or_insert_with(|| format!("/home/{name}"));
            next.users.insert(name.clone(), user);
        }
        for (name, updates) in &changes.user_updates {
            let user = next.users.get_mut(name).unwrap();
            for update in updates {
                match update {
                    UserUpdate::PrimaryGroup { group, .. } => user.primary_group = group.clone(),
                    UserUpdate::AdditionalGroups { groups } => {
                        user.additional_groups = groups.clone();
                    }
                    UserUpdate::Shell { shell } => user.shell = shell.clone(),
                }
            }
        }
        for name in &changes.password_updates {
            next.passwords.insert(name.clone(), want.passwords[name].clone());
        }
        for name in &changes.ssh_key_updates {
            next.ssh_keys.insert(name.clone(), want.ssh_keys[name].clone());
        }
        for name in &changes.managed_directory_creates {
            next.managed_dirs.insert(name.clone(), want.managed_dirs[name].clone());
        }
        if let Some(l) = next.linger.as_mut() {
            for (name, flag) in &changes.linger_updates {
                l.insert(name.clone(), *flag);
            }
        }
        for (path, quota) in &changes.disk_quota_changes {
            let table = next.quotas.entry(path.clone()).or_default();
            for (uid, limits) in quota.limits_to_set() {
                if limits.is_unlimited() {
                    table.remove(&uid);
                } else {
                    table.insert(uid, limits);
                }
            }
        }
        next
    }

    #[test]
    fn test_applying_change_set_reaches_fixed_point() {
        let doc = json!({
            "users": [
                {
                    "username": "alice",
                    "password": "$6$new",
                    "update_password": "always",
                    "uid": 2001,
                    "primary_group": "g1",
                    "additional_groups": ["g2"],
                    "ssh_authorized_keys": ["key-a"],
                    "linger": true,
                    "disk_quota": [{ "path": "/data", "bytes_soft_limit": "1Gi" }]
                },
                {
                    "username": "erin",
                    "password": "$6$erin",
                    "update_password": "on_create",
                    "uid": 2005,
                    "primary_group": "erin",
                    "shell": "/bin/zsh"
                }
            ],
            "groups": [
                { "groupname": "g1", "gid": 3001 },
                { "groupname": "g2", "gid": 3002 },
                { "groupname": "erin", "gid": 3005 }
            ],
            "managed_uid_range": [1000, 2999],
            "managed_gid_range": [1000, 3999],
            "managed_user_directories": ["/scratch/%u"]
        });
        let d = desired(doc);
        let mut live = live_dir(
            vec![
                user("alice", 2001, "g1", &[]),
                user("bob", 1500, "bob", &[]),
                user("erin", 2005, "erin", &[]),
            ],
            vec![
                group("g1", 3001, &[]),
                group("bob", 1500, &[]),
                group("erin", 3005, &[]),
                group("stale", 1900, &[]),
            ],
        );
        live.quotas.insert(
            PathBuf::from("/data"),
            BTreeMap::from([(1500, QuotaLimits { bytes_hard: 1, ..QuotaLimits::default() })]),
        );

        let changes = compute_change_set(&live, &d).unwrap();
        assert!(!changes.is_empty());

        let next = simulate(&live, &changes, &d);
        let again = compute_change_set(&next, &d).unwrap();
        assert!(again.is_empty(), "{again:?}");
    }
}
