//! Deterministic step-name generator (spec §4.7): a kind prefix plus a
//! monotone counter starting at 1 per prefix, scoped to one sub-workflow. A
//! pre-existing `label` (labelled statements, `JumpTarget`s) always wins.

use crate::compiler::step::{Step, StepKind};
use std::collections::HashMap;

pub fn assign_names(steps: &mut [Step]) {
    let mut counters: HashMap<String, usize> = HashMap::new();
    assign_names_rec(steps, &mut counters);
}

fn assign_names_rec(steps: &mut [Step], counters: &mut HashMap<String, usize>) {
    for step in steps.iter_mut() {
        if step.label.is_none() {
            let prefix = prefix_for(&step.kind);
            let counter = counters.entry(prefix.clone()).or_insert(0);
            *counter += 1;
            step.label = Some(format!("{prefix}{counter}"));
        }
        for body in step.child_bodies_mut() {
            assign_names_rec(body, counters);
        }
    }
}

fn prefix_for(kind: &StepKind) -> String {
    match kind {
        StepKind::Assign(_) => "assign".to_string(),
        StepKind::Call(call) => format!("call_{}_", call.function.replace('.', "_")),
        StepKind::Switch(_) => "switch".to_string(),
        StepKind::For(_) => "for".to_string(),
        StepKind::Parallel(_) | StepKind::ParallelIteration(_) => "parallel".to_string(),
        StepKind::Try(_) => "try".to_string(),
        StepKind::Return(_) => "return".to_string(),
        StepKind::Raise(_) => "raise".to_string(),
        StepKind::Next(_) => "next".to_string(),
        StepKind::JumpTarget => unreachable!("JumpTarget steps are always pre-labelled at construction"),
    }
}
