//! # Declarative
//!
//! Plumbing for converging a system by running planned mutations.
//!
//! Mutations are described as values ([`Action`]) and grouped into
//! [`Step`]s (one entity each) and [`Phase`]s (barriers). The
//! [`execute`] function runs phases in order; steps inside a phase run on
//! a bounded worker pool.
//!
//! ## Core Concepts
//!
//! - **Action**: a single side effect (run a command, write a file, ...)
//! - **Step**: the actions for one entity, run sequentially
//! - **Phase**: steps that do not depend on each other
//! - **Executor**: carries out actions on the host
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     execute, Action, AutoConfirm, CommandSpec, ExecuteOptions, ExecutionPlan,
//!     NoProgress, RecordingExecutor, Step,
//! };
//!
//! let mut plan = ExecutionPlan::new();
//! plan.push_phase(
//!     "create users",
//!     vec![Step::single(
//!         "alice",
//!         Action::Run(CommandSpec::new("useradd").arg("alice")),
//!     )],
//! );
//!
//! let executor = RecordingExecutor::new();
//! let summary = execute(
//!     &plan,
//!     &ExecuteOptions::default(),
//!     &executor,
//!     &mut NoProgress,
//!     &mut AutoConfirm,
//! )?;
//! assert_eq!(summary.total_changes(), 1);
//! # Ok::<(), declarative::ExecuteError>(())
//! ```
//!
//! ## Provider Traits
//!
//! - [`Executor`]: performs actions
//! - [`ProgressCallback`]: receives progress updates
//! - [`ConfirmCallback`]: handles user confirmations
//!
//! This keeps the crate free of process spawning and UI dependencies.

pub mod context;
pub mod error;
pub mod executor;
pub mod planner;
pub mod types;

// Re-export main types at crate root
pub use context::{
    AutoConfirm, AutoDecline, ConfirmCallback, Executor, NoProgress, ProgressCallback,
    RecordingExecutor,
};
pub use error::{ExecuteError, Result};
pub use executor::execute;
pub use planner::{ExecutionPlan, Phase, Step};
pub use types::{
    Action, ApplyResult, CommandOutput, CommandSpec, ExecuteOptions, ExecuteSummary, Ownership,
};
