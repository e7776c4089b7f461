//! Retry-policy parsing and the try/catch/finally scaffold (spec §4.5).
//!
//! This module never lowers statements itself — the try/catch/finally
//! bodies are lowered by `lower` (which pushes/pops the finalizer frame on
//! `ParsingContext` around them) and handed in here already as `Step`
//! sequences. `lower`'s `Return` handling is what actually redirects into
//! the delayed-return protocol this module assembles.

use crate::compiler::ast::{self, Expression};
use crate::compiler::config::INTRINSIC_RETRY_POLICY;
use crate::compiler::convert::convert_expression;
use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::expr::{BinaryOp, VariableRef, WorkflowExpr};
use crate::compiler::span::Span;
use crate::compiler::step::{Backoff, RetryPolicy, Step, StepKind, SwitchBranch, TryStep};

/// If `body`'s first statement is a bare `retry_policy(...)` call, parses and
/// removes it, returning the remaining statements (spec §4.2: "the call
/// itself is emitted as no step").
pub fn split_retry_policy(body: &[ast::Statement]) -> CompileResult<(Option<RetryPolicy>, &[ast::Statement])> {
    if let Some(ast::Statement::ExpressionStatement(
        Expression::Call {
            callee, arguments, span, ..
        },
        _,
    )) = body.first()
    {
        if let Expression::Identifier(name, _) = callee.as_ref() {
            if name == INTRINSIC_RETRY_POLICY {
                let retry = parse_retry_policy(*span, arguments)?;
                return Ok((Some(retry), &body[1..]));
            }
        }
    }
    Ok((None, body))
}

fn parse_retry_policy(call_span: Span, arguments: &[ast::CallArgument]) -> CompileResult<RetryPolicy> {
    let arg = match arguments.first() {
        Some(ast::CallArgument::Expression(e)) => e,
        Some(ast::CallArgument::Spread(_, span)) => {
            return Err(CompileError::invalid_retry_policy("retry_policy() does not accept a spread argument", *span))
        }
        None => return Err(CompileError::invalid_retry_policy("retry_policy() requires an argument", call_span)),
    };
    match arg {
        Expression::Object(props, span) => parse_custom_retry_policy(props, *span),
        other => {
            let converted = convert_expression(other)?;
            let name = converted
                .fully_qualified_name()
                .ok_or_else(|| CompileError::invalid_retry_policy("retry_policy() name must be a fully-qualified function name", other.span()))?;
            Ok(RetryPolicy::Named(name))
        }
    }
}

fn property_key_name(key: &ast::PropertyKey, span: Span) -> CompileResult<String> {
    match key {
        ast::PropertyKey::Identifier(n) | ast::PropertyKey::StringLiteral(n) => Ok(n.clone()),
        ast::PropertyKey::Other => Err(CompileError::invalid_retry_policy(
            "retry_policy object keys must be identifiers or string literals",
            span,
        )),
    }
}

fn parse_custom_retry_policy(props: &[ast::Property], span: Span) -> CompileResult<RetryPolicy> {
    let mut backoff = None;
    let mut predicate = None;
    let mut max_retries = None;
    for prop in props {
        match property_key_name(&prop.key, prop.span)?.as_str() {
            "backoff" => backoff = Some(parse_backoff(&prop.value)?),
            "predicate" => {
                let converted = convert_expression(&prop.value)?;
                let name = converted.fully_qualified_name().ok_or_else(|| {
                    CompileError::invalid_retry_policy("retry_policy 'predicate' must be a fully-qualified function name", prop.value.span())
                })?;
                predicate = Some(name);
            }
            "max_retries" => max_retries = Some(convert_expression(&prop.value)?),
            _ => {}
        }
    }
    let backoff = backoff.ok_or_else(|| CompileError::invalid_retry_policy("custom retry_policy requires a 'backoff' field", span))?;
    Ok(RetryPolicy::Custom {
        predicate,
        max_retries,
        backoff,
    })
}

fn parse_backoff(expr: &ast::Expression) -> CompileResult<Backoff> {
    let props = match expr {
        Expression::Object(props, _) => props,
        other => return Err(CompileError::invalid_retry_policy("'backoff' must be an object literal", other.span())),
    };
    let mut initial_delay = None;
    let mut max_delay = None;
    let mut multiplier = None;
    for prop in props {
        match property_key_name(&prop.key, prop.span)?.as_str() {
            "initial_delay" => initial_delay = Some(convert_expression(&prop.value)?),
            "max_delay" => max_delay = Some(convert_expression(&prop.value)?),
            "multiplier" => multiplier = Some(convert_expression(&prop.value)?),
            _ => {}
        }
    }
    Ok(Backoff {
        initial_delay: initial_delay.ok_or_else(|| CompileError::invalid_retry_policy("backoff requires 'initial_delay'", expr.span()))?,
        max_delay: max_delay.ok_or_else(|| CompileError::invalid_retry_policy("backoff requires 'max_delay'", expr.span()))?,
        multiplier: multiplier.ok_or_else(|| CompileError::invalid_retry_policy("backoff requires 'multiplier'", expr.span()))?,
    })
}

/// The two synthetic variable names for nesting depth `k` (empty suffix at
/// depth 1, per spec §4.5 scenario 5).
pub fn finalizer_var_names(depth: usize) -> (String, String) {
    let suffix = if depth <= 1 { String::new() } else { depth.to_string() };
    (format!("__t2w_finally_condition{suffix}"), format!("__t2w_finally_value{suffix}"))
}

fn assign_many(pairs: Vec<(VariableRef, WorkflowExpr)>) -> Step {
    Step::new(StepKind::Assign(pairs))
}

/// Assembles the two-nested-Try scaffold (spec §4.5 steps 1-5) from
/// already-lowered bodies.
#[allow(clippy::too_many_arguments)]
pub fn build_try_finally(
    depth: usize,
    finalizer_label: &str,
    try_steps: Vec<Step>,
    catch_error_var: Option<String>,
    catch_steps: Option<Vec<Step>>,
    finally_steps: Vec<Step>,
    retry: Option<RetryPolicy>,
) -> Vec<Step> {
    let (condition_var, value_var) = finalizer_var_names(depth);

    let mut out = vec![assign_many(vec![
        (VariableRef::simple(&condition_var), WorkflowExpr::Null),
        (VariableRef::simple(&value_var), WorkflowExpr::Null),
    ])];

    let inner_try = Step::new(StepKind::Try(TryStep {
        try_body: try_steps,
        catch_body: catch_steps,
        error_var: catch_error_var,
        retry,
    }));

    let exc_var = "__fin_exc".to_string();
    let outer_catch_body = vec![assign_many(vec![
        (VariableRef::simple(&condition_var), WorkflowExpr::Str("raise".to_string())),
        (VariableRef::simple(&value_var), WorkflowExpr::var(&exc_var)),
    ])];
    out.push(Step::new(StepKind::Try(TryStep {
        try_body: vec![inner_try],
        catch_body: Some(outer_catch_body),
        error_var: Some(exc_var),
        retry: None,
    })));

    out.push(Step::jump_target(finalizer_label));
    out.extend(finally_steps);

    out.push(Step::new(StepKind::Switch(vec![
        SwitchBranch {
            condition: WorkflowExpr::Binary(
                Box::new(WorkflowExpr::var(&condition_var)),
                BinaryOp::Eq,
                Box::new(WorkflowExpr::Str("return".to_string())),
            ),
            steps: vec![Step::new(StepKind::Return(Some(WorkflowExpr::var(&value_var))))],
            next: None,
        },
        SwitchBranch {
            condition: WorkflowExpr::Binary(
                Box::new(WorkflowExpr::var(&condition_var)),
                BinaryOp::Eq,
                Box::new(WorkflowExpr::Str("raise".to_string())),
            ),
            steps: vec![Step::new(StepKind::Raise(WorkflowExpr::var(&value_var)))],
            next: None,
        },
        SwitchBranch {
            condition: WorkflowExpr::Bool(true),
            steps: Vec::new(),
            next: None,
        },
    ])));

    out
}
