//! Convergence engine
//!
//! The engine orchestrates:
//! 1. Reading - Snapshot the live account directory
//! 2. Diffing - Compute the change set against the desired state
//! 3. Planning - Order the changes into barrier-separated phases
//! 4. Executing - Apply the phases with bounded parallelism

pub mod delta;
pub mod differ;
pub mod executor;
pub mod planner;

pub use delta::{ChangeSet, compute_change_set};
pub use executor::{HostExecutor, PhaseProgress, PromptConfirm, print_summary};
pub use planner::build_plan;

use crate::directory::{DesiredState, Directory, HostLayout, QuotaSource, read_directory};
use crate::error::Result;
use declarative::ExecutionPlan;

/// Live snapshot, desired state and the change set between them
#[derive(Debug)]
pub struct Convergence {
    pub live: Directory,
    pub desired: DesiredState,
    pub changes: ChangeSet,
}

impl Convergence {
    pub fn new(live: Directory, desired: DesiredState) -> Result<Self> {
        let changes = compute_change_set(&live, &desired)?;
        Ok(Self {
            live,
            desired,
            changes,
        })
    }

    /// Snapshot the host and diff it against `desired`
    pub fn read(
        layout: &HostLayout,
        desired: DesiredState,
        quotas: &dyn QuotaSource,
    ) -> Result<Self> {
        let live = read_directory(layout, &desired, quotas)?;
        log::debug!(
            "Live directory: {} users, {} groups",
            live.users.len(),
            live.groups.len()
        );
        Self::new(live, desired)
    }

    pub fn is_converged(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn plan(&self) -> Result<ExecutionPlan> {
        build_plan(&self.changes, &self.live, &self.desired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::directory::normalize;
    use crate::directory::reader::tests::FakeQuota;
    use declarative::{
        Action, ApplyResult, AutoConfirm, CommandSpec, ExecuteOptions, Executor, NoProgress,
        Ownership, RecordingExecutor,
    };
    use serde_json::{Value, json};
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Performs filesystem actions for real and records commands
    #[derive(Default)]
    struct FsExecutor {
        commands: RecordingExecutor,
    }

    impl Executor for FsExecutor {
        fn apply(&self, action: &Action) -> anyhow::Result<ApplyResult> {
            match action {
                Action::Run(_) => self.commands.apply(action),
                _ => HostExecutor.apply(action),
            }
        }
    }

    struct Host {
        root: TempDir,
        layout: HostLayout,
    }

    impl Host {
        fn new(passwd: &str, shadow: &str, group: &str) -> Self {
            let root = TempDir::new().unwrap();
            let layout = HostLayout {
                passwd: root.path().join("passwd"),
                shadow: root.path().join("shadow"),
                group: root.path().join("group"),
                linger_dir: root.path().join("linger"),
            };
            fs::write(&layout.passwd, passwd).unwrap();
            fs::write(&layout.shadow, shadow).unwrap();
            fs::write(&layout.group, group).unwrap();
            fs::create_dir(&layout.linger_dir).unwrap();
            Self { root, layout }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.root.path().join(rel)
        }

        /// Config with key and managed dir templates under the temp root
        fn config(&self, mut doc: Value) -> DesiredState {
            doc["user_ssh_key_base_dir"] = json!(format!("{}/keys/%u", self.root.path().display()));
            doc["managed_user_directories"] =
                json!([format!("{}/scratch/%u", self.root.path().display())]);
            normalize(&Config::from_value(doc).unwrap()).unwrap()
        }
    }

    fn opts() -> ExecuteOptions {
        ExecuteOptions {
            jobs: 2,
            confirm: false,
        }
    }

    fn run_commands(actions: &[Action]) -> Vec<CommandSpec> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Run(cmd) => Some(cmd.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_new_user_is_created_with_keys() {
        let host = Host::new(
            "root:x:0:0:root:/root:/bin/bash\n",
            "root:*:19000:0:99999:7:::\n",
            "root:x:0:\ng1:x:3001:\n",
        );
        let desired = host.config(json!({
            "users": [{
                "username": "alice",
                "password": "$6$alice",
                "update_password": "on_create",
                "uid": 2001,
                "primary_group": "g1",
                "ssh_authorized_keys": ["key-a"]
            }],
            "groups": [{ "groupname": "g1", "gid": 3001 }],
            "managed_uid_range": [1000, 2999],
            "managed_gid_range": [1000, 3999]
        }));

        let conv = Convergence::read(&host.layout, desired, &FakeQuota::default()).unwrap();
        assert!(conv.changes.groups_to_create.is_empty());
        assert!(conv.changes.group_updates.is_empty());

        let plan = conv.plan().unwrap();
        let executor = RecordingExecutor::new();
        let summary = declarative::execute(
            &plan,
            &opts(),
            &executor,
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();
        assert!(summary.is_success());

        let actions = executor.actions();
        let commands = run_commands(&actions);
        assert!(commands.iter().all(|c| c.program != "groupadd"));
        assert_eq!(
            commands[0].to_string(),
            "useradd --create-home --uid 2001 --gid 3001 --shell /bin/bash alice"
        );
        assert_eq!(commands[1].program, "chpasswd");
        assert_eq!(commands[1].stdin.as_deref(), Some("alice:$6$alice\n"));

        let key_file = host.path("keys/alice/authorized_keys");
        let written = actions.iter().find_map(|a| match a {
            Action::WriteFile {
                path,
                contents,
                owner,
                mode,
            } if *path == key_file => Some((contents.clone(), *owner, *mode)),
            _ => None,
        });
        let (contents, owner, mode) = written.unwrap();
        assert!(contents.ends_with("\nkey-a\n"));
        assert!(contents.starts_with(planner::MANAGED_HEADER));
        assert_eq!(owner, Ownership::new(2001, 3001));
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_absent_user_is_removed_even_if_partly_cleaned() {
        let host = Host::new(
            "root:x:0:0:root:/root:/bin/bash\nbob:x:1500:1500::/home/bob:/bin/bash\n",
            "root:*:19000:0:99999:7:::\nbob:$6$bob:19000:0:99999:7:::\n",
            "root:x:0:\nbob:x:1500:\n",
        );
        let desired = host.config(json!({
            "users": [],
            "groups": [],
            "managed_uid_range": [1000, 2999],
            "managed_gid_range": [1000, 3999]
        }));
        // the key file exists, the managed directory is already gone
        fs::create_dir_all(host.path("keys/bob")).unwrap();
        fs::write(host.path("keys/bob/authorized_keys"), "key-b\n").unwrap();

        let conv = Convergence::read(&host.layout, desired, &FakeQuota::default()).unwrap();
        assert_eq!(conv.changes.users_to_delete.len(), 1);
        assert!(conv.changes.groups_to_delete.is_empty());

        let plan = conv.plan().unwrap();
        let executor = FsExecutor::default();
        let summary = declarative::execute(
            &plan,
            &opts(),
            &executor,
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(!host.path("keys/bob/authorized_keys").exists());

        let commands = run_commands(&executor.commands.actions());
        assert_eq!(commands.len(), 1);
        assert_eq!(commands[0].to_string(), "userdel --remove bob");
    }

    #[test]
    fn test_equal_quota_in_blocks_is_not_updated() {
        let host = Host::new(
            "root:x:0:0:root:/root:/bin/bash\nsvc:x:42:42::/srv:/bin/bash\n",
            "root:*:19000:0:99999:7:::\nsvc:$6$svc:19000:0:99999:7:::\n",
            "root:x:0:\nsvc:x:42:\n",
        );
        let desired = host.config(json!({
            "users": [{
                "username": "svc",
                "password": "$6$svc",
                "update_password": "always",
                "uid": 42,
                "primary_group": "svc",
                "disk_quota": [{ "path": "/data", "bytes_soft_limit": "1Gi" }]
            }],
            "groups": [{ "groupname": "svc", "gid": 42 }],
            "managed_uid_range": [40, 100],
            "managed_gid_range": [1000, 3999]
        }));
        fs::create_dir_all(host.path("scratch/svc")).unwrap();

        // 1048576 one-KiB blocks
        let report =
            userdb::quota::parse_report("#42 0 1048576 0 00 [--------] 0 0 0 00 [--------]\n")
                .unwrap();
        let quotas = FakeQuota::default().with("/data", report);

        let conv = Convergence::read(&host.layout, desired, &quotas).unwrap();
        assert!(conv.changes.disk_quota_changes.is_empty());
        assert!(conv.is_converged(), "{:?}", conv.changes);
        assert_eq!(
            conv.live.quotas[Path::new("/data")][&42].bytes_soft,
            1_073_741_824
        );
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let host = Host::new(
            "root:x:0:0:root:/root:/bin/bash\n",
            "root:*:19000:0:99999:7:::\n",
            "root:x:0:\n",
        );
        let doc = json!({
            "users": [{
                "username": "alice",
                "password": "$6$alice",
                "update_password": "always",
                "uid": 2001,
                "primary_group": "g1",
                "ssh_authorized_keys": [
                    "from=\"10.0.0.1\" ssh-ed25519 AAAA alice@laptop",
                    "ssh-rsa BBBB  alice@desktop"
                ]
            }],
            "groups": [{ "groupname": "g1", "gid": 3001 }],
            "managed_uid_range": [1000, 2999],
            "managed_gid_range": [1000, 3999]
        });
        let first = Convergence::read(&host.layout, host.config(doc.clone()), &FakeQuota::default())
            .unwrap();
        assert!(!first.is_converged());
        let plan = first.plan().unwrap();
        let key_file = plan
            .phases
            .iter()
            .flat_map(|p| &p.steps)
            .flat_map(|s| &s.actions)
            .find_map(|a| match a {
                Action::WriteFile { contents, .. } => Some(contents.clone()),
                _ => None,
            })
            .unwrap();

        // what useradd, groupadd and chpasswd would have left behind
        fs::write(
            &host.layout.passwd,
            "root:x:0:0:root:/root:/bin/bash\nalice:x:2001:3001::/home/alice:/bin/bash\n",
        )
        .unwrap();
        fs::write(
            &host.layout.shadow,
            "root:*:19000:0:99999:7:::\nalice:$6$alice:19000:0:99999:7:::\n",
        )
        .unwrap();
        fs::write(&host.layout.group, "root:x:0:\ng1:x:3001:\n").unwrap();
        fs::create_dir_all(host.path("keys/alice")).unwrap();
        fs::write(host.path("keys/alice/authorized_keys"), key_file).unwrap();
        fs::create_dir_all(host.path("scratch/alice")).unwrap();

        let second =
            Convergence::read(&host.layout, host.config(doc), &FakeQuota::default()).unwrap();
        assert!(second.is_converged(), "{:?}", second.changes);
        assert!(second.plan().unwrap().is_empty());
    }
}
