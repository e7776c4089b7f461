//! Serialisation to the external step-tree boundary contract (spec §6): a
//! sub-workflow is a keyed mapping with optional `params` and a `steps`
//! sequence, each step is `{stepName: {stepKind: payload}}`, and any
//! non-primitive expression is wrapped as a `${...}` interpolation.

use crate::compiler::expr::{BinaryOp, PathSegment, UnaryOp, VariableRef, WorkflowExpr};
use crate::compiler::step::{
    CallStep, ForIterable, ForStep, NextTarget, ParallelOptions, Program, RetryPolicy, Step, StepKind, SubWorkflow, SwitchBranch, TryStep,
};
use serde_yaml::{Mapping, Value};

/// A sink for a resolved, named step tree. `YamlSerializer` is the only
/// implementation; the trait exists so the CLI can swap in a different
/// encoding without the compiler depending on it.
pub trait Serializer {
    fn serialize(&self, program: &Program) -> String;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlSerializer;

impl Serializer for YamlSerializer {
    fn serialize(&self, program: &Program) -> String {
        let value = program_to_value(program);
        serde_yaml::to_string(&value).expect("step tree always serialises to valid YAML")
    }
}

fn program_to_value(program: &Program) -> Value {
    let mut root = Mapping::new();
    for sub in &program.sub_workflows {
        root.insert(Value::String(sub.name.clone()), sub_workflow_to_value(sub));
    }
    Value::Mapping(root)
}

fn sub_workflow_to_value(sub: &SubWorkflow) -> Value {
    let mut entry = Mapping::new();
    if !sub.params.is_empty() {
        entry.insert(
            Value::String("params".to_string()),
            Value::Sequence(sub.params.iter().map(|p| Value::String(p.clone())).collect()),
        );
    }
    entry.insert(Value::String("steps".to_string()), steps_to_value(&sub.steps));
    Value::Mapping(entry)
}

fn steps_to_value(steps: &[Step]) -> Value {
    Value::Sequence(steps.iter().map(step_to_value).collect())
}

fn step_to_value(step: &Step) -> Value {
    let name = step.label.clone().expect("steps are named before serialisation");
    let mut payload = step_kind_to_mapping(&step.kind);
    if let Some(next) = &step.next {
        payload.insert(Value::String("next".to_string()), next_target_to_value(next));
    }
    let mut outer = Mapping::new();
    outer.insert(Value::String(name), Value::Mapping(payload));
    Value::Mapping(outer)
}

fn next_target_to_value(target: &NextTarget) -> Value {
    match target {
        NextTarget::End => Value::String("end".to_string()),
        NextTarget::Break => Value::String("break".to_string()),
        NextTarget::Continue => Value::String("continue".to_string()),
        NextTarget::Label(label) => Value::String(label.clone()),
    }
}

fn step_kind_to_mapping(kind: &StepKind) -> Mapping {
    let mut out = Mapping::new();
    match kind {
        StepKind::Assign(pairs) => {
            let assignments = pairs
                .iter()
                .map(|(target, value)| {
                    let mut m = Mapping::new();
                    m.insert(Value::String(target.canonical()), expr_to_value(value));
                    Value::Mapping(m)
                })
                .collect();
            out.insert(Value::String("assign".to_string()), Value::Sequence(assignments));
        }
        StepKind::Call(call) => {
            out.insert(Value::String("call".to_string()), call_step_to_value(call));
        }
        StepKind::Switch(branches) => {
            let rendered = branches.iter().map(switch_branch_to_value).collect();
            out.insert(Value::String("switch".to_string()), Value::Sequence(rendered));
        }
        StepKind::For(for_step) => {
            out.insert(Value::String("for".to_string()), for_step_to_value(for_step));
        }
        StepKind::Parallel(parallel) => {
            let mut inner = Mapping::new();
            let mut branches = Mapping::new();
            for (name, body) in &parallel.branches {
                branches.insert(Value::String(name.clone()), Value::Mapping({
                    let mut m = Mapping::new();
                    m.insert(Value::String("steps".to_string()), steps_to_value(body));
                    m
                }));
            }
            inner.insert(Value::String("branches".to_string()), Value::Mapping(branches));
            merge_parallel_options(&mut inner, &parallel.options);
            out.insert(Value::String("parallel".to_string()), Value::Mapping(inner));
        }
        StepKind::ParallelIteration(iteration) => {
            let mut inner = Mapping::new();
            inner.insert(Value::String("for".to_string()), for_step_to_value(&iteration.for_step));
            merge_parallel_options(&mut inner, &iteration.options);
            out.insert(Value::String("parallel".to_string()), Value::Mapping(inner));
        }
        StepKind::Try(try_step) => {
            out.insert(Value::String("try".to_string()), try_step_to_value(try_step));
        }
        StepKind::Return(value) => {
            out.insert(
                Value::String("return".to_string()),
                value.as_ref().map(expr_to_value).unwrap_or(Value::Null),
            );
        }
        StepKind::Raise(value) => {
            out.insert(Value::String("raise".to_string()), expr_to_value(value));
        }
        StepKind::Next(target) => {
            out.insert(Value::String("next".to_string()), next_target_to_value(target));
        }
        StepKind::JumpTarget => unreachable!("JumpTarget steps are erased before serialisation"),
    }
    out
}

fn merge_parallel_options(inner: &mut Mapping, options: &ParallelOptions) {
    if !options.shared.is_empty() {
        inner.insert(
            Value::String("shared".to_string()),
            Value::Sequence(options.shared.iter().map(|s| Value::String(s.clone())).collect()),
        );
    }
    if let Some(limit) = options.concurrency_limit {
        inner.insert(Value::String("concurrency_limit".to_string()), Value::Number(limit.into()));
    }
    if let Some(policy) = &options.exception_policy {
        inner.insert(Value::String("exception_policy".to_string()), Value::String(policy.clone()));
    }
}

fn call_step_to_value(call: &CallStep) -> Value {
    let mut m = Mapping::new();
    m.insert(Value::String("call".to_string()), Value::String(call.function.clone()));
    if !call.args.is_empty() {
        let mut args = Mapping::new();
        for (name, value) in &call.args {
            args.insert(Value::String(name.clone()), expr_to_value(value));
        }
        m.insert(Value::String("args".to_string()), Value::Mapping(args));
    }
    if let Some(result) = &call.result {
        m.insert(Value::String("result".to_string()), Value::String(result.clone()));
    }
    Value::Mapping(m)
}

fn switch_branch_to_value(branch: &SwitchBranch) -> Value {
    let mut m = Mapping::new();
    m.insert(Value::String("condition".to_string()), expr_to_value(&branch.condition));
    if !branch.steps.is_empty() {
        m.insert(Value::String("steps".to_string()), steps_to_value(&branch.steps));
    }
    if let Some(next) = &branch.next {
        m.insert(Value::String("next".to_string()), next_target_to_value(next));
    }
    Value::Mapping(m)
}

fn for_step_to_value(for_step: &ForStep) -> Value {
    let mut m = Mapping::new();
    m.insert(Value::String("value".to_string()), Value::String(for_step.loop_var.clone()));
    match &for_step.iterable {
        ForIterable::Expr(expr) => {
            m.insert(Value::String("in".to_string()), expr_to_value(expr));
        }
        ForIterable::Range { start, end } => {
            m.insert(Value::String("range".to_string()), Value::Sequence(vec![expr_to_value(start), expr_to_value(end)]));
        }
    }
    m.insert(Value::String("steps".to_string()), steps_to_value(&for_step.body));
    Value::Mapping(m)
}

fn try_step_to_value(try_step: &TryStep) -> Value {
    let mut m = Mapping::new();
    m.insert(Value::String("steps".to_string()), steps_to_value(&try_step.try_body));
    if let Some(catch_body) = &try_step.catch_body {
        let mut catch = Mapping::new();
        if let Some(error_var) = &try_step.error_var {
            catch.insert(Value::String("as".to_string()), Value::String(error_var.clone()));
        }
        catch.insert(Value::String("steps".to_string()), steps_to_value(catch_body));
        m.insert(Value::String("except".to_string()), Value::Mapping(catch));
    }
    if let Some(retry) = &try_step.retry {
        m.insert(Value::String("retry".to_string()), retry_policy_to_value(retry));
    }
    Value::Mapping(m)
}

fn retry_policy_to_value(retry: &RetryPolicy) -> Value {
    match retry {
        RetryPolicy::Named(name) => Value::String(name.clone()),
        RetryPolicy::Custom {
            predicate,
            max_retries,
            backoff,
        } => {
            let mut m = Mapping::new();
            if let Some(predicate) = predicate {
                m.insert(Value::String("predicate".to_string()), Value::String(predicate.clone()));
            }
            if let Some(max_retries) = max_retries {
                m.insert(Value::String("max_retries".to_string()), expr_to_value(max_retries));
            }
            let mut backoff_m = Mapping::new();
            backoff_m.insert(Value::String("initial_delay".to_string()), expr_to_value(&backoff.initial_delay));
            backoff_m.insert(Value::String("max_delay".to_string()), expr_to_value(&backoff.max_delay));
            backoff_m.insert(Value::String("multiplier".to_string()), expr_to_value(&backoff.multiplier));
            m.insert(Value::String("backoff".to_string()), Value::Mapping(backoff_m));
            Value::Mapping(m)
        }
    }
}

/// Literal-shaped expressions serialise as native YAML values; anything
/// containing a reference or a call is wrapped as a `${...}` interpolation
/// string (spec §6).
fn expr_to_value(expr: &WorkflowExpr) -> Value {
    if expr.is_literal() {
        literal_to_value(expr)
    } else {
        Value::String(format!("${{{}}}", render_expr(expr)))
    }
}

fn literal_to_value(expr: &WorkflowExpr) -> Value {
    match expr {
        WorkflowExpr::Null => Value::Null,
        WorkflowExpr::Bool(b) => Value::Bool(*b),
        WorkflowExpr::Number(n) => number_to_value(*n),
        WorkflowExpr::Str(s) => Value::String(s.clone()),
        WorkflowExpr::Array(items) => Value::Sequence(items.iter().map(literal_to_value).collect()),
        WorkflowExpr::Map(entries) => {
            let mut m = Mapping::new();
            for (key, value) in entries {
                m.insert(Value::String(key.clone()), literal_to_value(value));
            }
            Value::Mapping(m)
        }
        other => unreachable!("literal_to_value called on non-literal expression {other:?}"),
    }
}

fn number_to_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number((n as i64).into())
    } else {
        Value::Number(n.into())
    }
}

fn render_expr(expr: &WorkflowExpr) -> String {
    match expr {
        WorkflowExpr::Null => "null".to_string(),
        WorkflowExpr::Bool(b) => b.to_string(),
        WorkflowExpr::Number(n) => render_number(*n),
        WorkflowExpr::Str(s) => format!("{s:?}"),
        WorkflowExpr::Array(items) => format!("[{}]", items.iter().map(render_expr).collect::<Vec<_>>().join(", ")),
        WorkflowExpr::Map(entries) => {
            let rendered = entries.iter().map(|(k, v)| format!("{k:?}: {}", render_expr(v))).collect::<Vec<_>>().join(", ");
            format!("{{{rendered}}}")
        }
        WorkflowExpr::VariableReference(vref) => render_var_ref(vref),
        WorkflowExpr::Unary(op, operand) => {
            let sym = match op {
                UnaryOp::Plus => "+",
                UnaryOp::Minus => "-",
                UnaryOp::Not => "not ",
            };
            format!("{sym}({})", render_expr(operand))
        }
        WorkflowExpr::Binary(left, op, right) => {
            format!("({} {} {})", render_expr(left), binary_op_symbol(*op), render_expr(right))
        }
        WorkflowExpr::Member { object, property, computed } => {
            if *computed {
                format!("{}[{}]", render_expr(object), render_expr(property))
            } else {
                match property.as_ref() {
                    WorkflowExpr::Str(name) => format!("{}.{name}", render_expr(object)),
                    other => format!("{}.{}", render_expr(object), render_expr(other)),
                }
            }
        }
        WorkflowExpr::Call(call) => {
            format!("{}({})", call.callee, call.args.iter().map(render_expr).collect::<Vec<_>>().join(", "))
        }
    }
}

fn render_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

fn render_var_ref(vref: &VariableRef) -> String {
    let mut out = vref.base.clone();
    for segment in &vref.segments {
        match segment {
            PathSegment::Field(name) => {
                out.push('.');
                out.push_str(name);
            }
            PathSegment::Index(idx) => {
                out.push('[');
                out.push_str(&render_expr(idx));
                out.push(']');
            }
        }
    }
    out
}

fn binary_op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::Mod => "%",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Gt => ">",
        BinaryOp::Gte => ">=",
        BinaryOp::Lt => "<",
        BinaryOp::Lte => "<=",
        BinaryOp::And => "and",
        BinaryOp::Or => "or",
        BinaryOp::In => "in",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::expr::VariableRef;

    fn simple_program() -> Program {
        Program {
            sub_workflows: vec![SubWorkflow {
                name: "main".to_string(),
                params: vec!["input".to_string()],
                steps: vec![
                    Step::new(StepKind::Assign(vec![(VariableRef::simple("x"), WorkflowExpr::Number(1.0))])).with_label("assign1"),
                    Step::new(StepKind::Return(Some(WorkflowExpr::var("x")))).with_label("return1"),
                ],
            }],
        }
    }

    #[test]
    fn renders_params_and_steps() {
        let yaml = YamlSerializer.serialize(&simple_program());
        assert!(yaml.contains("main:"));
        assert!(yaml.contains("params:"));
        assert!(yaml.contains("assign1:"));
        assert!(yaml.contains("return1:"));
    }

    #[test]
    fn variable_reference_is_interpolated() {
        let value = expr_to_value(&WorkflowExpr::var("x"));
        assert_eq!(value, Value::String("${x}".to_string()));
    }

    #[test]
    fn literal_array_is_not_interpolated() {
        let value = expr_to_value(&WorkflowExpr::Array(vec![WorkflowExpr::Number(1.0), WorkflowExpr::Str("a".to_string())]));
        assert!(matches!(value, Value::Sequence(_)));
    }
}
