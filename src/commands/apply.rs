//! `provisioner --config ...` - converge the host to a desired-state document

use anyhow::{Context as AnyhowContext, Result};
use declarative::{ExecuteError, ExecuteOptions};
use std::process::ExitCode;

use crate::Context;
use crate::config::{self, ConfigSource};
use crate::directory::{self, HostLayout, XfsQuota};
use crate::engine::{self, Convergence, HostExecutor, PhaseProgress, PromptConfirm, differ};
use crate::error::ProvisionError;
use crate::privilege;
use crate::ui;

/// What the user asked for on the command line
#[derive(Debug, Clone)]
pub struct ApplyArgs {
    pub source: ConfigSource,
    pub dry_run: bool,
    pub no_confirm: bool,
    pub jobs: usize,
    pub json: bool,
}

pub fn run(ctx: &Context, args: &ApplyArgs) -> Result<ExitCode> {
    // validation errors surface before anything on the host is read
    let config = config::load(&args.source)?;
    let desired = directory::normalize(&config)?;
    log::debug!(
        "Desired directory: {} users, {} groups",
        desired.directory.users.len(),
        desired.directory.groups.len()
    );

    privilege::require_root()?;

    let conv = Convergence::read(&HostLayout::default(), desired, &XfsQuota)?;

    if args.json {
        let rendered = serde_json::to_string_pretty(&conv.changes)
            .context("Failed to serialize change set")?;
        println!("{rendered}");
        return Ok(ExitCode::SUCCESS);
    }

    ui::header("Converging Accounts");
    differ::display_change_set(&conv.changes, &conv.live, &conv.desired, ctx.debug);

    if conv.is_converged() {
        return Ok(ExitCode::SUCCESS);
    }
    if args.dry_run {
        println!();
        ui::info("Dry run - no changes made");
        return Ok(ExitCode::SUCCESS);
    }

    let plan = conv.plan()?;
    for phase in plan.phases.iter().filter(|p| !p.is_empty()) {
        log::debug!("Phase '{}': {} steps", phase.name, phase.steps.len());
    }

    let opts = ExecuteOptions {
        jobs: args.jobs,
        confirm: !args.no_confirm,
    };
    println!();
    let outcome = declarative::execute(
        &plan,
        &opts,
        &HostExecutor,
        &mut PhaseProgress::default(),
        &mut PromptConfirm,
    );

    match outcome {
        Ok(summary) => {
            engine::print_summary(&summary);
            Ok(ExitCode::SUCCESS)
        }
        Err(ExecuteError::Declined) => {
            println!();
            ui::warn("Aborted - no changes made");
            Ok(ExitCode::FAILURE)
        }
        Err(ExecuteError::MutationFailed {
            phase,
            target,
            message,
            failures,
            phases_completed,
        }) => {
            ui::dim(&format!(
                "{phases_completed} phases completed, {failures} failed steps in '{phase}'; \
                 re-run to resume"
            ));
            Err(ProvisionError::MutationFailure {
                phase,
                entity: target,
                message,
            }
            .into())
        }
        Err(ExecuteError::Other(e)) => Err(e),
    }
}
