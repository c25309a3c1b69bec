//! Effective user checks

use anyhow::{Result, bail};

/// Effective uid of this process
pub fn effective_uid() -> u32 {
    // geteuid never fails and touches no memory
    unsafe { libc::geteuid() }
}

/// Fail unless running as root
///
/// Reading the shadow database and every account mutation need it, so this
/// runs before anything is read from the host.
pub fn require_root() -> Result<()> {
    let euid = effective_uid();
    if euid != 0 {
        bail!("must be run as root (effective uid is {euid}); try again with sudo");
    }
    Ok(())
}
