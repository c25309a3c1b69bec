//! systemd linger registry.
//!
//! `loginctl enable-linger <user>` drops an empty marker file named after
//! the user into `/var/lib/systemd/linger/`. Hosts without systemd-logind
//! have no such directory at all.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Default location of the linger registry.
pub const DEFAULT_LINGER_DIR: &str = "/var/lib/systemd/linger";

/// List users with linger enabled.
///
/// Returns `Ok(None)` when the registry directory does not exist, meaning
/// the host does not support linger.
pub fn read_linger_dir(dir: &Path) -> Result<Option<BTreeSet<String>>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(dir, e)),
    };

    let mut users = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(dir, e))?;
        users.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(Some(users))
}
