//! The jump resolver (spec §4.7): resolves every synthetic `JumpTarget` to
//! its real target, rewrites every `next` attribute, erases the
//! `JumpTarget` steps, then validates the result (spec §8 invariants 1-2).
//!
//! Resolution is scope-aware: falling off the end of a `Switch` branch or a
//! `Try` body/catch bubbles to whatever follows the compound step itself,
//! but falling off the end of a `For`/`Parallel` body is a dead end (the
//! runtime's own loop/branch semantics take over) — a trailing `continue`
//! target inside a loop body must never bubble past the loop into the
//! step that follows it.

use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::span::Span;
use crate::compiler::step::{NextTarget, Step, StepKind};
use std::collections::{HashMap, HashSet};

/// `None` means "no `next` hint needed" — natural fallthrough, which at the
/// top of a sub-workflow means end of execution and inside a loop/parallel
/// body means proceed to the next iteration/branch join. `Some(name)` is a
/// concrete step to jump to.
type Mapping = HashMap<String, Option<String>>;

fn compute_mapping(steps: &[Step], fallback: Option<&str>, mapping: &mut Mapping) {
    let n = steps.len();
    let mut resolved_after: Vec<Option<String>> = vec![None; n];
    let mut next_real: Option<String> = fallback.map(str::to_string);
    for i in (0..n).rev() {
        resolved_after[i] = next_real.clone();
        if !steps[i].is_jump_target() {
            next_real = steps[i].label.clone();
        }
    }
    for (i, step) in steps.iter().enumerate() {
        if step.is_jump_target() {
            let label = step.label.clone().expect("JumpTarget steps are always labelled");
            mapping.insert(label, resolved_after[i].clone());
        }
        recurse_into_children(step, resolved_after[i].as_deref(), mapping);
    }
}

/// `bubble_fallback` is what a transparent child body (switch branch, try
/// body/catch) should use when it falls off its own end; loop/parallel
/// bodies always get `None` regardless, since they are scope boundaries.
fn recurse_into_children(step: &Step, bubble_fallback: Option<&str>, mapping: &mut Mapping) {
    match &step.kind {
        StepKind::Switch(branches) => {
            for branch in branches {
                compute_mapping(&branch.steps, bubble_fallback, mapping);
            }
        }
        StepKind::Try(try_step) => {
            compute_mapping(&try_step.try_body, bubble_fallback, mapping);
            if let Some(catch) = &try_step.catch_body {
                compute_mapping(catch, bubble_fallback, mapping);
            }
        }
        StepKind::For(for_step) => compute_mapping(&for_step.body, None, mapping),
        StepKind::ParallelIteration(iteration) => compute_mapping(&iteration.for_step.body, None, mapping),
        StepKind::Parallel(parallel) => {
            for (_, body) in &parallel.branches {
                compute_mapping(body, None, mapping);
            }
        }
        _ => {}
    }
}

fn remap(target: NextTarget, mapping: &Mapping) -> Option<NextTarget> {
    match target {
        NextTarget::Label(label) => match mapping.get(&label) {
            Some(None) => None,
            Some(Some(real)) => Some(NextTarget::Label(real.clone())),
            // Not a synthetic jump-target label (e.g. a user-labelled
            // statement target reached via an explicit break/continue
            // rewrite elsewhere) — pass through unchanged.
            None => Some(NextTarget::Label(label)),
        },
        other => Some(other),
    }
}

fn rewrite(steps: &mut [Step], mapping: &Mapping) {
    for step in steps.iter_mut() {
        if let Some(target) = step.next.take() {
            step.next = remap(target, mapping);
        }
        match &mut step.kind {
            StepKind::Switch(branches) => {
                for branch in branches.iter_mut() {
                    if let Some(target) = branch.next.take() {
                        branch.next = remap(target, mapping);
                    }
                }
            }
            StepKind::Next(target) => {
                // A standalone jump step always wants an explicit target;
                // if resolution says "no next needed" fall back to `end`
                // rather than silently dropping the step's only purpose.
                *target = remap(target.clone(), mapping).unwrap_or(NextTarget::End);
            }
            _ => {}
        }
        for body in step.child_bodies_mut() {
            rewrite(body, mapping);
        }
    }
}

fn erase_jump_targets(steps: Vec<Step>) -> Vec<Step> {
    steps
        .into_iter()
        .filter_map(|mut step| {
            if step.is_jump_target() {
                return None;
            }
            for body in step.child_bodies_mut() {
                let taken = std::mem::take(body);
                *body = erase_jump_targets(taken);
            }
            Some(step)
        })
        .collect()
}

fn collect_names(steps: &[Step], names: &mut HashSet<String>) {
    for step in steps {
        if let Some(label) = &step.label {
            names.insert(label.clone());
        }
        for body in step.child_bodies() {
            collect_names(body, names);
        }
    }
}

fn check_target(target: Option<&NextTarget>, names: &HashSet<String>) -> CompileResult<()> {
    match target {
        Some(NextTarget::Break) => Err(CompileError::control_flow(
            "unresolved 'break' target remains after jump resolution",
            Span::dummy(),
        )),
        Some(NextTarget::Continue) => Err(CompileError::control_flow(
            "unresolved 'continue' target remains after jump resolution",
            Span::dummy(),
        )),
        Some(NextTarget::Label(label)) if !names.contains(label) => Err(CompileError::internal(
            format!("jump target '{label}' does not name any step in this sub-workflow"),
            Span::dummy(),
        )),
        _ => Ok(()),
    }
}

fn validate(steps: &[Step], names: &HashSet<String>) -> CompileResult<()> {
    for step in steps {
        check_target(step.next.as_ref(), names)?;
        match &step.kind {
            StepKind::Switch(branches) => {
                for branch in branches {
                    check_target(branch.next.as_ref(), names)?;
                }
            }
            StepKind::Next(target) => check_target(Some(target), names)?,
            _ => {}
        }
        for body in step.child_bodies() {
            validate(body, names)?;
        }
    }
    Ok(())
}

pub fn resolve_jumps(mut steps: Vec<Step>) -> CompileResult<Vec<Step>> {
    let mut mapping = Mapping::new();
    compute_mapping(&steps, None, &mut mapping);
    rewrite(&mut steps, &mapping);
    let steps = erase_jump_targets(steps);

    let mut names = HashSet::new();
    collect_names(&steps, &mut names);
    validate(&steps, &names)?;

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::expr::WorkflowExpr;
    use crate::compiler::step::{ForIterable, ForStep, SwitchBranch};

    #[test]
    fn jump_target_resolves_to_following_step_and_is_erased() {
        let mut steps = vec![
            Step::new(StepKind::Assign(vec![])).with_label("assign1"),
            Step::jump_target("loopEnd"),
            Step::new(StepKind::Return(Some(WorkflowExpr::Null))).with_label("return1"),
        ];
        steps[0].next = Some(NextTarget::label("loopEnd"));
        let resolved = resolve_jumps(steps).unwrap();
        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].next, Some(NextTarget::Label("return1".to_string())));
    }

    #[test]
    fn trailing_top_level_jump_target_is_omitted_not_end() {
        let mut steps = vec![
            Step::new(StepKind::Assign(vec![])).with_label("assign1"),
            Step::jump_target("tail"),
        ];
        steps[0].next = Some(NextTarget::label("tail"));
        let resolved = resolve_jumps(steps).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].next, None);
    }

    #[test]
    fn continue_target_inside_a_loop_body_does_not_bubble_past_the_loop() {
        // for (x in xs) { if (cond) { next: continueLabel } ; trailing-stmt }
        // followed by a sibling after the for step, at the outer level.
        let inner_if_body = vec![Step::new(StepKind::Assign(vec![])).with_label("assign_inner").with_next(NextTarget::label("continueLabel"))];
        let for_body = vec![
            Step::new(StepKind::Switch(vec![SwitchBranch {
                condition: WorkflowExpr::Bool(true),
                steps: inner_if_body,
                next: None,
            }]))
            .with_label("switch1"),
            Step::new(StepKind::Assign(vec![])).with_label("assign_trailing"),
            Step::jump_target("continueLabel"),
        ];
        let for_step = Step::new(StepKind::For(ForStep {
            loop_var: "x".to_string(),
            iterable: ForIterable::Expr(WorkflowExpr::var("xs")),
            body: for_body,
        }))
        .with_label("for1");
        let after_loop = Step::new(StepKind::Assign(vec![])).with_label("after_loop");
        let resolved = resolve_jumps(vec![for_step, after_loop]).unwrap();

        let StepKind::For(resolved_for) = &resolved[0].kind else { panic!("expected For") };
        let StepKind::Switch(branches) = &resolved_for.body[0].kind else { panic!("expected Switch") };
        // The inner assign's `next` must resolve to nothing (fell through to
        // the loop's own iteration), never to "after_loop".
        assert_eq!(branches[0].steps[0].next, None);
    }

    #[test]
    fn unresolved_break_is_an_error() {
        let steps = vec![Step::new(StepKind::Assign(vec![])).with_label("assign1").with_next(NextTarget::Break)];
        let err = resolve_jumps(steps).unwrap_err();
        assert_eq!(err.kind, crate::compiler::error::SyntaxKind::ControlFlow);
    }
}
