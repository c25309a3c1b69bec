//! Execution engine - runs phases in order with bounded fan-out inside each

use crate::context::{ConfirmCallback, Executor, ProgressCallback};
use crate::error::{ExecuteError, Result};
use crate::planner::{ExecutionPlan, Phase, Step};
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::Context;
use rayon::prelude::*;

/// Outcome of one step: every action result, in order
#[derive(Debug, Clone)]
struct StepOutcome {
    target: String,
    results: Vec<ApplyResult>,
}

impl StepOutcome {
    fn failure(&self) -> Option<&str> {
        self.results.iter().find_map(|r| match r {
            ApplyResult::Failed { error } => Some(error.as_str()),
            _ => None,
        })
    }

    /// The most significant result, used for progress reporting
    fn headline(&self) -> ApplyResult {
        if let Some(error) = self.failure() {
            return ApplyResult::Failed {
                error: error.to_string(),
            };
        }
        self.results
            .iter()
            .find(|r| r.is_change())
            .or_else(|| self.results.first())
            .cloned()
            .unwrap_or(ApplyResult::NoChange)
    }
}

/// Execute a plan with the given options and callbacks
///
/// Phases run strictly in order. Steps inside a phase run on a pool of
/// `opts.jobs` workers. When any step of a phase fails, the phase still
/// finishes its remaining steps, then execution stops with
/// [`ExecuteError::MutationFailed`]; completed phases are not rolled back.
///
/// # Type Parameters
/// * `E` - Executor type
/// * `P` - Progress callback type
/// * `C` - Confirm callback type
pub fn execute<E, P, C>(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    executor: &E,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    E: Executor + ?Sized,
    P: ProgressCallback,
    C: ConfirmCallback,
{
    if plan.is_empty() {
        return Ok(ExecuteSummary::default());
    }

    if opts.confirm {
        let prompt = format!("Apply {} changes?", plan.total_steps());
        if !confirm.confirm(&prompt)? {
            return Err(ExecuteError::Declined);
        }
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(opts.jobs.max(1))
        .build()
        .context("Failed to create apply thread pool")?;

    let mut summary = ExecuteSummary::default();

    for phase in &plan.phases {
        if phase.is_empty() {
            summary.phases_completed += 1;
            continue;
        }

        progress.on_phase_start(&phase.name, phase.steps.len());
        let outcomes = run_phase(phase, opts.jobs, &pool, executor);

        let mut failures = Vec::new();
        for outcome in &outcomes {
            for result in &outcome.results {
                summary.add_result(result);
            }
            progress.on_step_complete(&outcome.target, &outcome.headline());
            if let Some(error) = outcome.failure() {
                failures.push((outcome.target.clone(), error.to_string()));
            }
        }
        progress.on_phase_complete(&phase.name);

        if let Some((target, message)) = failures.first().cloned() {
            return Err(ExecuteError::MutationFailed {
                phase: phase.name.clone(),
                target,
                message,
                failures: failures.len(),
                phases_completed: summary.phases_completed,
            });
        }
        summary.phases_completed += 1;
    }

    Ok(summary)
}

/// Run every step of a phase, in plan order when sequential
fn run_phase<E: Executor + ?Sized>(
    phase: &Phase,
    jobs: usize,
    pool: &rayon::ThreadPool,
    executor: &E,
) -> Vec<StepOutcome> {
    if jobs <= 1 || phase.steps.len() == 1 {
        return phase
            .steps
            .iter()
            .map(|step| run_step(step, executor))
            .collect();
    }

    // par_iter().map().collect() keeps plan order in the result vector
    pool.install(|| {
        phase
            .steps
            .par_iter()
            .map(|step| run_step(step, executor))
            .collect()
    })
}

/// Run the actions of one step, stopping at the first failure
fn run_step<E: Executor + ?Sized>(step: &Step, executor: &E) -> StepOutcome {
    let mut results = Vec::with_capacity(step.actions.len());

    for action in &step.actions {
        let result = match executor.apply(action) {
            Ok(result) => result,
            Err(e) => ApplyResult::Failed {
                error: format!("{e:#}"),
            },
        };
        let failed = !result.is_success();
        results.push(result);
        if failed {
            break;
        }
    }

    StepOutcome {
        target: step.target.clone(),
        results,
    }
}
