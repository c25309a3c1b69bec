//! Executor and callback traits
//!
//! These traits allow the declarative crate to be used without
//! depending on specific implementations of process spawning, progress
//! rendering or user prompts.

use crate::types::{Action, ApplyResult};
use anyhow::Result;
use std::sync::Mutex;

/// Carries out actions on the host
///
/// Implement this trait to decide how an [`Action`] touches the system.
/// The plan itself never spawns processes, so tests can substitute a
/// recording implementation.
pub trait Executor: Send + Sync {
    /// Apply a single action
    ///
    /// Returning `Err` or `ApplyResult::Failed` marks the owning step as
    /// failed.
    fn apply(&self, action: &Action) -> Result<ApplyResult>;
}

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
pub trait ProgressCallback: Send {
    /// Called when a phase with at least one step starts
    fn on_phase_start(&mut self, name: &str, steps: usize);

    /// Called when a step finishes
    fn on_step_complete(&mut self, target: &str, result: &ApplyResult);

    /// Called when every step of a phase has finished
    fn on_phase_complete(&mut self, name: &str);
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_phase_start(&mut self, _name: &str, _steps: usize) {}
    fn on_step_complete(&mut self, _target: &str, _result: &ApplyResult) {}
    fn on_phase_complete(&mut self, _name: &str) {}
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

type FailurePredicate = Box<dyn Fn(&Action) -> bool + Send + Sync>;

/// Executor that records every action instead of performing it
///
/// Useful for tests and for tracing what a plan would do.
#[derive(Default)]
pub struct RecordingExecutor {
    actions: Mutex<Vec<Action>>,
    fail_when: Option<FailurePredicate>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record actions, but report failure for those matching `predicate`
    pub fn failing_on<F>(predicate: F) -> Self
    where
        F: Fn(&Action) -> bool + Send + Sync + 'static,
    {
        Self {
            actions: Mutex::new(Vec::new()),
            fail_when: Some(Box::new(predicate)),
        }
    }

    /// Actions recorded so far, in application order
    pub fn actions(&self) -> Vec<Action> {
        match self.actions.lock() {
            Ok(locked) => locked.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Executor for RecordingExecutor {
    fn apply(&self, action: &Action) -> Result<ApplyResult> {
        match self.actions.lock() {
            Ok(mut locked) => locked.push(action.clone()),
            Err(poisoned) => poisoned.into_inner().push(action.clone()),
        }

        if self.fail_when.as_ref().is_some_and(|f| f(action)) {
            return Ok(ApplyResult::Failed {
                error: format!("simulated failure: {}", action.describe()),
            });
        }

        Ok(match action {
            Action::Run(_) => ApplyResult::Modified,
            Action::WriteFile { .. } | Action::EnsureDir { .. } => ApplyResult::Created,
            Action::RemoveFile { .. } | Action::RemoveDir { .. } => ApplyResult::Removed,
        })
    }
}
