//! Execution planner - ordered phases of independent steps

use crate::types::Action;
use serde::Serialize;

/// A unit of work on one entity
///
/// Actions inside a step run sequentially; a failing action stops the step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Step {
    /// Entity the step operates on (username, group name, path)
    pub target: String,
    pub actions: Vec<Action>,
}

impl Step {
    pub fn new(target: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            target: target.into(),
            actions,
        }
    }

    /// A step made of a single action
    pub fn single(target: impl Into<String>, action: Action) -> Self {
        Self::new(target, vec![action])
    }
}

/// A barrier-separated group of steps
///
/// Steps inside a phase must not depend on each other; they may run
/// concurrently. A phase only starts once the previous one has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    pub name: String,
    pub steps: Vec<Step>,
}

impl Phase {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// An execution plan: phases in the order they must run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub phases: Vec<Phase>,
}

impl ExecutionPlan {
    /// Create a new empty plan
    pub fn new() -> Self {
        Self { phases: Vec::new() }
    }

    /// Append a phase. Empty phases are kept so that the phase order stays
    /// visible when a plan is rendered.
    pub fn push_phase(&mut self, name: impl Into<String>, steps: Vec<Step>) {
        self.phases.push(Phase::new(name, steps));
    }

    /// Look up a phase by name
    pub fn phase(&self, name: &str) -> Option<&Phase> {
        self.phases.iter().find(|p| p.name == name)
    }

    /// Total number of steps in the plan
    pub fn total_steps(&self) -> usize {
        self.phases.iter().map(|p| p.steps.len()).sum()
    }

    /// Total number of actions in the plan
    pub fn total_actions(&self) -> usize {
        self.phases
            .iter()
            .flat_map(|p| &p.steps)
            .map(|s| s.actions.len())
            .sum()
    }

    /// Check if plan has nothing to do
    pub fn is_empty(&self) -> bool {
        self.phases.iter().all(Phase::is_empty)
    }
}
