//! Post-lowering AST transformations (spec §4.6): merge adjacent `Assign`
//! steps that have no intervening labelled step and no custom `next`.

use crate::compiler::step::{Step, StepKind};

pub fn merge_adjacent_assigns(steps: Vec<Step>) -> Vec<Step> {
    let steps: Vec<Step> = steps.into_iter().map(merge_within_children).collect();
    merge_siblings(steps)
}

fn merge_within_children(mut step: Step) -> Step {
    for body in step.child_bodies_mut() {
        let taken = std::mem::take(body);
        *body = merge_adjacent_assigns(taken);
    }
    step
}

fn merge_siblings(steps: Vec<Step>) -> Vec<Step> {
    let mut out: Vec<Step> = Vec::with_capacity(steps.len());
    for step in steps {
        if step.label.is_none() {
            if let Some(prev) = out.last_mut() {
                if prev.next.is_none() {
                    if let (StepKind::Assign(existing), StepKind::Assign(incoming)) = (&mut prev.kind, &step.kind) {
                        let mut merged = existing.clone();
                        merged.extend(incoming.iter().cloned());
                        *existing = merged;
                        prev.next = step.next.clone();
                        continue;
                    }
                }
            }
        }
        out.push(step);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::expr::{VariableRef, WorkflowExpr};

    fn assign(name: &str, value: i64) -> Step {
        Step::new(StepKind::Assign(vec![(VariableRef::simple(name), WorkflowExpr::Number(value as f64))]))
    }

    #[test]
    fn merges_adjacent_assigns() {
        let steps = vec![assign("a", 1), assign("b", 2)];
        let merged = merge_adjacent_assigns(steps);
        assert_eq!(merged.len(), 1);
        match &merged[0].kind {
            StepKind::Assign(pairs) => assert_eq!(pairs.len(), 2),
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn does_not_merge_across_a_label() {
        let mut labelled = assign("b", 2);
        labelled.label = Some("target".to_string());
        let steps = vec![assign("a", 1), labelled];
        let merged = merge_adjacent_assigns(steps);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn does_not_merge_across_an_explicit_next() {
        use crate::compiler::step::NextTarget;
        let mut first = assign("a", 1);
        first.next = Some(NextTarget::End);
        let steps = vec![first, assign("b", 2)];
        let merged = merge_adjacent_assigns(steps);
        assert_eq!(merged.len(), 2);
    }
}
