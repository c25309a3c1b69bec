//! Core types for declarative convergence

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::process::Output;

/// An external process invocation, described as a value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to run (resolved through PATH)
    pub program: String,
    /// Arguments, passed verbatim without shell interpretation
    pub args: Vec<String>,
    /// Data written to the process' stdin, if any
    pub stdin: Option<String>,
}

impl CommandSpec {
    /// Create a command with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Feed data to stdin
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    /// Renders a shell-like command line. Stdin content is never shown
    /// since it may carry credentials.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{arg}'")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        if let Some(input) = &self.stdin {
            write!(f, " <<< ({} lines)", input.lines().count())?;
        }
        Ok(())
    }
}

/// Numeric owner of a file or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl Ownership {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }
}

/// A single side-effecting operation on the host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Run an external command; nonzero exit is a failure
    Run(CommandSpec),
    /// Write a whole file, then set owner and mode
    WriteFile {
        path: PathBuf,
        contents: String,
        owner: Ownership,
        mode: u32,
    },
    /// Create a directory (and missing parents) if needed, then set owner
    /// and mode on the leaf
    EnsureDir {
        path: PathBuf,
        owner: Ownership,
        mode: u32,
    },
    /// Remove a file; a missing file is a warning
    RemoveFile { path: PathBuf },
    /// Remove a directory tree; a missing directory is a warning
    RemoveDir { path: PathBuf },
}

impl Action {
    /// One-line human-readable description
    pub fn describe(&self) -> String {
        match self {
            Self::Run(cmd) => cmd.to_string(),
            Self::WriteFile {
                path, owner, mode, ..
            } => format!(
                "write {} ({}:{} {:04o})",
                path.display(),
                owner.uid,
                owner.gid,
                mode
            ),
            Self::EnsureDir { path, owner, mode } => format!(
                "mkdir -p {} ({}:{} {:04o})",
                path.display(),
                owner.uid,
                owner.gid,
                mode
            ),
            Self::RemoveFile { path } => format!("rm -f {}", path.display()),
            Self::RemoveDir { path } => format!("rm -rf {}", path.display()),
        }
    }
}

/// Result of applying an action or step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplyResult {
    /// No changes needed
    NoChange,
    /// Something was created
    Created,
    /// Something was modified
    Modified,
    /// Something was removed
    Removed,
    /// Apply failed
    Failed { error: String },
    /// Apply was skipped (e.g. the target was already gone)
    Skipped { reason: String },
}

impl ApplyResult {
    /// Check if the result represents success (no failure)
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    /// Check if the result represents a change
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Modified | Self::Removed)
    }
}

/// Summary of execution results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteSummary {
    pub created: usize,
    pub modified: usize,
    pub removed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub no_change: usize,
    /// Phases that ran to completion
    pub phases_completed: usize,
}

impl ExecuteSummary {
    /// Total number of actual changes made
    pub fn total_changes(&self) -> usize {
        self.created + self.modified + self.removed
    }

    /// Check if execution was fully successful (no failures)
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Total number of actions processed
    pub fn total(&self) -> usize {
        self.created + self.modified + self.removed + self.skipped + self.failed + self.no_change
    }

    /// Add a result to the summary
    pub fn add_result(&mut self, result: &ApplyResult) {
        match result {
            ApplyResult::NoChange => self.no_change += 1,
            ApplyResult::Created => self.created += 1,
            ApplyResult::Modified => self.modified += 1,
            ApplyResult::Removed => self.removed += 1,
            ApplyResult::Failed { .. } => self.failed += 1,
            ApplyResult::Skipped { .. } => self.skipped += 1,
        }
    }
}

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Number of parallel workers inside one phase
    pub jobs: usize,
    /// Ask for confirmation before the first phase
    pub confirm: bool,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 4,
            confirm: true,
        }
    }
}

/// Output from an external command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}
