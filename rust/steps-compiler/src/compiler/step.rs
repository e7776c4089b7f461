//! The workflow step tree (spec §3.2–§3.3): sub-workflows, steps, and the
//! program that owns them. Constructed during lowering, then immutably
//! consumed by the transform, naming and jump-resolution passes.

use crate::compiler::expr::{VariableRef, WorkflowExpr};
use serde::{Deserialize, Serialize};

/// The target of a `next` hint or a `Next` step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NextTarget {
    End,
    Break,
    Continue,
    Label(String),
}

impl NextTarget {
    pub fn label(name: impl Into<String>) -> Self {
        NextTarget::Label(name.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchBranch {
    pub condition: WorkflowExpr,
    pub steps: Vec<Step>,
    pub next: Option<NextTarget>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ForIterable {
    Expr(WorkflowExpr),
    Range {
        start: WorkflowExpr,
        end: WorkflowExpr,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForStep {
    pub loop_var: String,
    pub iterable: ForIterable,
    pub body: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ParallelOptions {
    pub shared: Vec<String>,
    pub concurrency_limit: Option<i64>,
    pub exception_policy: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelStep {
    pub branches: Vec<(String, Vec<Step>)>,
    pub options: ParallelOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParallelIterationStep {
    pub for_step: ForStep,
    pub options: ParallelOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backoff {
    pub initial_delay: WorkflowExpr,
    pub max_delay: WorkflowExpr,
    pub multiplier: WorkflowExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// A fully-qualified named policy, e.g. `http.default_retry`.
    Named(String),
    Custom {
        predicate: Option<String>,
        max_retries: Option<WorkflowExpr>,
        backoff: Backoff,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TryStep {
    pub try_body: Vec<Step>,
    pub catch_body: Option<Vec<Step>>,
    pub error_var: Option<String>,
    pub retry: Option<RetryPolicy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallStep {
    pub function: String,
    pub args: Vec<(String, WorkflowExpr)>,
    pub result: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepKind {
    Assign(Vec<(VariableRef, WorkflowExpr)>),
    Call(CallStep),
    Switch(Vec<SwitchBranch>),
    For(ForStep),
    Parallel(ParallelStep),
    ParallelIteration(ParallelIterationStep),
    Try(TryStep),
    Return(Option<WorkflowExpr>),
    Raise(WorkflowExpr),
    Next(NextTarget),
    /// Synthetic placeholder, erased by the jump resolver before naming is
    /// ever observed outside the compiler (see `jump_resolve`).
    JumpTarget,
}

/// A single named step. `label` is the name override (set by a labelled
/// surface statement or by a `JumpTarget`'s unique synthetic label) and,
/// once naming has run, the step's final name. `next` is an explicit jump
/// hint distinct from falling through to the following step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    pub label: Option<String>,
    pub next: Option<NextTarget>,
    pub kind: StepKind,
}

impl Step {
    pub fn new(kind: StepKind) -> Self {
        Self {
            label: None,
            next: None,
            kind,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_next(mut self, next: NextTarget) -> Self {
        self.next = Some(next);
        self
    }

    pub fn jump_target(label: impl Into<String>) -> Self {
        Step::new(StepKind::JumpTarget).with_label(label)
    }

    pub fn is_jump_target(&self) -> bool {
        matches!(self.kind, StepKind::JumpTarget)
    }

    /// Bodies nested directly under this step, in lexical (pre-)order. Used
    /// by naming and jump resolution to walk the whole tree.
    pub fn child_bodies(&self) -> Vec<&[Step]> {
        match &self.kind {
            StepKind::Switch(branches) => branches.iter().map(|b| b.steps.as_slice()).collect(),
            StepKind::For(f) => vec![f.body.as_slice()],
            StepKind::Parallel(p) => p.branches.iter().map(|(_, b)| b.as_slice()).collect(),
            StepKind::ParallelIteration(p) => vec![p.for_step.body.as_slice()],
            StepKind::Try(t) => {
                let mut v = vec![t.try_body.as_slice()];
                if let Some(catch) = &t.catch_body {
                    v.push(catch.as_slice());
                }
                v
            }
            _ => Vec::new(),
        }
    }

    pub fn child_bodies_mut(&mut self) -> Vec<&mut Vec<Step>> {
        match &mut self.kind {
            StepKind::Switch(branches) => branches.iter_mut().map(|b| &mut b.steps).collect(),
            StepKind::For(f) => vec![&mut f.body],
            StepKind::Parallel(p) => p.branches.iter_mut().map(|(_, b)| b).collect(),
            StepKind::ParallelIteration(p) => vec![&mut p.for_step.body],
            StepKind::Try(t) => {
                let mut v = vec![&mut t.try_body];
                if let Some(catch) = &mut t.catch_body {
                    v.push(catch);
                }
                v
            }
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubWorkflow {
    pub name: String,
    pub params: Vec<String>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Program {
    pub sub_workflows: Vec<SubWorkflow>,
}
