//! Host executor - performs plan actions on the local system

use anyhow::{Context, Result, bail};
use colored::Colorize;
use declarative::{
    Action, ApplyResult, CommandSpec, ConfirmCallback, ExecuteSummary, Executor, Ownership,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::io::{ErrorKind, Write};
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::Path;
use std::process::{Command, Stdio};

/// Executes actions with real processes and filesystem calls
#[derive(Debug, Default)]
pub struct HostExecutor;

impl Executor for HostExecutor {
    fn apply(&self, action: &Action) -> Result<ApplyResult> {
        log::debug!("{}", action.describe());

        match action {
            Action::Run(cmd) => run_command(cmd),
            Action::WriteFile {
                path,
                contents,
                owner,
                mode,
            } => write_file(path, contents, *owner, *mode),
            Action::EnsureDir { path, owner, mode } => ensure_dir(path, *owner, *mode),
            Action::RemoveFile { path } => remove(path, fs::remove_file(path)),
            Action::RemoveDir { path } => remove(path, fs::remove_dir_all(path)),
        }
    }
}

fn run_command(cmd: &CommandSpec) -> Result<ApplyResult> {
    let mut command = Command::new(&cmd.program);
    command
        .args(&cmd.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(if cmd.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

    let mut child = command
        .spawn()
        .with_context(|| format!("Failed to execute: {}", cmd.program))?;

    if let Some(input) = &cmd.stdin
        && let Some(mut stdin) = child.stdin.take()
    {
        stdin
            .write_all(input.as_bytes())
            .with_context(|| format!("Failed to write to {} stdin", cmd.program))?;
    }

    let output = child
        .wait_with_output()
        .with_context(|| format!("Failed to wait for {}", cmd.program))?;

    if output.status.success() {
        Ok(ApplyResult::Modified)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(ApplyResult::Failed {
            error: format!("{} failed ({}): {}", cmd, output.status, stderr.trim()),
        })
    }
}

fn write_file(path: &Path, contents: &str, owner: Ownership, mode: u32) -> Result<ApplyResult> {
    let existed = match fs::symlink_metadata(path) {
        Ok(meta) => {
            if meta.file_type().is_symlink() {
                bail!("Refusing to write {}: it is a symlink", path.display());
            }
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };

    // truncation waits until the handle is known to be a private regular file
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .mode(mode)
        .custom_flags(libc::O_NOFOLLOW | libc::O_NONBLOCK)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let meta = file
        .metadata()
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    if !meta.is_file() || meta.nlink() > 1 {
        bail!(
            "Refusing to write {}: not a regular file with a single link",
            path.display()
        );
    }

    file.set_len(0)
        .with_context(|| format!("Failed to truncate {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;

    set_owner_and_mode(&file, path, owner, mode)?;

    Ok(if existed {
        ApplyResult::Modified
    } else {
        ApplyResult::Created
    })
}

fn ensure_dir(path: &Path, owner: Ownership, mode: u32) -> Result<ApplyResult> {
    let existed = match fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_symlink() => {
            bail!("Refusing to manage {}: it is a symlink", path.display())
        }
        Ok(meta) if !meta.is_dir() => {
            bail!("Refusing to manage {}: not a directory", path.display())
        }
        Ok(_) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => return Err(e).with_context(|| format!("Failed to stat {}", path.display())),
    };

    if !existed {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
    }

    let dir = fs::OpenOptions::new()
        .read(true)
        .custom_flags(libc::O_NOFOLLOW | libc::O_DIRECTORY)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    set_owner_and_mode(&dir, path, owner, mode)?;

    Ok(if existed {
        ApplyResult::NoChange
    } else {
        ApplyResult::Created
    })
}

/// Owner and mode go through the open handle, never the path
fn set_owner_and_mode(file: &fs::File, path: &Path, owner: Ownership, mode: u32) -> Result<()> {
    std::os::unix::fs::fchown(file, Some(owner.uid), Some(owner.gid)).with_context(|| {
        format!(
            "Failed to chown {} to {}:{}",
            path.display(),
            owner.uid,
            owner.gid
        )
    })?;
    file.set_permissions(fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to chmod {} to {:04o}", path.display(), mode))
}

/// Removal of something already gone is not an error
fn remove(path: &Path, outcome: std::io::Result<()>) -> Result<ApplyResult> {
    match outcome {
        Ok(()) => Ok(ApplyResult::Removed),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("{} is already absent", path.display());
            Ok(ApplyResult::Skipped {
                reason: format!("{} not found", path.display()),
            })
        }
        Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
    }
}

// ============================================================================
// Console callbacks
// ============================================================================

/// Asks on the terminal before applying
pub struct PromptConfirm;

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        use dialoguer::Confirm;

        let confirmed = Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;

        Ok(confirmed)
    }
}

/// One progress bar per phase
#[derive(Default)]
pub struct PhaseProgress {
    bar: Option<ProgressBar>,
    failures: Vec<String>,
}

impl ProgressCallback for PhaseProgress {
    fn on_phase_start(&mut self, name: &str, steps: usize) {
        let pb = ProgressBar::new(steps as u64);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("=>-"));
        }
        pb.set_message(name.to_string());
        self.bar = Some(pb);
    }

    fn on_step_complete(&mut self, target: &str, result: &ApplyResult) {
        let symbol = match result {
            ApplyResult::NoChange => "○",
            ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => "✓",
            ApplyResult::Failed { .. } => "✗",
            ApplyResult::Skipped { .. } => "⊘",
        };
        if let ApplyResult::Failed { error } = result {
            self.failures.push(format!("{target}: {error}"));
        }
        if let Some(pb) = &self.bar {
            pb.set_message(format!("{symbol} {target}"));
            pb.inc(1);
        }
    }

    fn on_phase_complete(&mut self, name: &str) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
        println!("  {} {}", "✓".green(), name);
        for failure in self.failures.drain(..) {
            println!("    {} {}", "✗".red(), failure);
        }
    }
}

/// Print final summary
pub fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() {
        println!("  {} Accounts converged successfully!", "✓".green().bold());
    } else {
        println!("  {} Convergence stopped with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {}", summary.failed, "failed".red());
    }
}
