//! The destructuring expander (spec §4.3): array/object patterns lower to a
//! guarded cascade of assignments that is safe when the initializer is
//! shorter than the pattern or missing properties.

use crate::compiler::ast::{self, Pattern};
use crate::compiler::context::{ParsingContext, TempCounter};
use crate::compiler::convert::convert_expression;
use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::expr::{BinaryOp, VariableRef, WorkflowExpr};
use crate::compiler::step::{ForIterable, ForStep, Step, StepKind, SwitchBranch};

fn assign_one(target: VariableRef, value: WorkflowExpr) -> Step {
    Step::new(StepKind::Assign(vec![(target, value)]))
}

fn assign_many(pairs: Vec<(VariableRef, WorkflowExpr)>) -> Step {
    Step::new(StepKind::Assign(pairs))
}

fn index_into(base: &WorkflowExpr, i: usize) -> WorkflowExpr {
    base.clone().member(WorkflowExpr::Number(i as f64), true)
}

fn map_get(obj: &WorkflowExpr, key: &str) -> WorkflowExpr {
    WorkflowExpr::call("map.get", vec![obj.clone(), WorkflowExpr::Str(key.to_string())])
}

fn temp_len_name(ctx: &ParsingContext) -> String {
    if ctx.parallel_nesting_level == 0 {
        "__temp_len".to_string()
    } else {
        format!("__temp_parallel{}_len", ctx.parallel_nesting_level)
    }
}

/// Entry point used by statement lowering for a declarator / assignment whose
/// target is a destructuring pattern. `init` is the surface initializer
/// expression, still unconverted.
pub fn lower_destructuring(
    pattern: &Pattern,
    init: &ast::Expression,
    temps: &mut TempCounter,
    ctx: &ParsingContext,
) -> CompileResult<Vec<Step>> {
    let converted = convert_expression(init)?;
    lower_pattern_binding(pattern, converted, temps, ctx)
}

/// Binds `pattern` against an already-converted workflow expression. Used
/// both at the top level and recursively, with the computed member access of
/// the outer layer standing in for the surface initializer (spec §4.3,
/// "nested patterns recurse").
pub fn lower_pattern_binding(
    pattern: &Pattern,
    init: WorkflowExpr,
    temps: &mut TempCounter,
    ctx: &ParsingContext,
) -> CompileResult<Vec<Step>> {
    match pattern {
        Pattern::Identifier(name, _) => Ok(vec![assign_one(VariableRef::simple(name), init)]),
        Pattern::Array(array_pattern) => lower_array_pattern(array_pattern, init, temps, ctx),
        Pattern::Object(object_pattern) => lower_object_pattern(object_pattern, init, temps, ctx),
        Pattern::Assignment(_) | Pattern::Rest(_) => Err(CompileError::internal(
            "assignment/rest pattern reached lower_pattern_binding directly",
            pattern.span(),
        )),
    }
}

/// Ensures `init` is a `VariableReference` so it can be read more than once
/// without re-evaluating a side-effecting expression (spec §4.3 step 1).
fn materialize(init: WorkflowExpr, temps: &mut TempCounter, ctx: &ParsingContext, steps: &mut Vec<Step>) -> WorkflowExpr {
    if matches!(init, WorkflowExpr::VariableReference(_)) {
        init
    } else {
        let name = temps.next(ctx);
        steps.push(assign_one(VariableRef::simple(&name), init));
        WorkflowExpr::var(name)
    }
}

/// `Some` only for an `AssignmentPattern` whose target is a plain identifier;
/// a default value on any other target (e.g. `[a, b] = [1, 2]`) is rejected,
/// not silently recursed into.
fn default_for(pattern: &Pattern) -> CompileResult<Option<(&Pattern, &ast::Expression)>> {
    match pattern {
        Pattern::Assignment(a) => match a.left.as_ref() {
            Pattern::Identifier(_, _) => Ok(Some((&a.left, &a.right))),
            other => Err(CompileError::invalid_destructuring(
                "a default value may only be attached to a plain identifier target",
                other.span(),
            )),
        },
        _ => Ok(None),
    }
}

fn bind_present(target: &Pattern, value: WorkflowExpr, temps: &mut TempCounter, ctx: &ParsingContext, out: &mut Vec<Step>) -> CompileResult<()> {
    // A position that *is* covered by the branch still honours its own
    // AssignmentPattern wrapper only if the source value is itself absent;
    // here the source slot exists, so an AssignmentPattern's left pattern is
    // bound directly from `value`.
    let (pat, _) = default_for(target)?.unwrap_or((target, unreachable_expr()));
    out.extend(lower_pattern_binding(pat, value, temps, ctx)?);
    Ok(())
}

fn bind_absent(target: &Pattern, temps: &mut TempCounter, ctx: &ParsingContext, out: &mut Vec<Step>) -> CompileResult<()> {
    match default_for(target)? {
        Some((pat, default_expr)) => {
            let value = convert_expression(default_expr)?;
            out.extend(lower_pattern_binding(pat, value, temps, ctx)?);
        }
        None => out.extend(lower_pattern_binding(target, WorkflowExpr::Null, temps, ctx)?),
    }
    Ok(())
}

// A placeholder only reached through `default_for` returning `Some`, so the
// `_` branch's expression half is never actually read.
fn unreachable_expr() -> &'static ast::Expression {
    static NULL_LITERAL: std::sync::OnceLock<ast::Expression> = std::sync::OnceLock::new();
    NULL_LITERAL.get_or_init(|| ast::Expression::Literal(ast::Literal::Null, crate::compiler::span::Span::dummy()))
}

fn lower_array_pattern(
    pattern: &ast::ArrayPattern,
    init: WorkflowExpr,
    temps: &mut TempCounter,
    ctx: &ParsingContext,
) -> CompileResult<Vec<Step>> {
    if pattern.elements.is_empty() {
        return Ok(Vec::new());
    }

    let mut rest: Option<&ast::RestElement> = None;
    let mut positions: Vec<(usize, &Pattern)> = Vec::new();
    for (i, element) in pattern.elements.iter().enumerate() {
        match element {
            None => {} // hole: binds nothing at any branch.
            Some(Pattern::Rest(r)) => {
                if i != pattern.elements.len() - 1 {
                    return Err(CompileError::invalid_destructuring(
                        "rest element must be the last element of an array pattern",
                        r.span,
                    ));
                }
                match r.argument.as_ref() {
                    Pattern::Identifier(_, _) => rest = Some(r),
                    other => {
                        return Err(CompileError::invalid_destructuring(
                            "rest target must be a plain identifier",
                            other.span(),
                        ))
                    }
                }
            }
            Some(p) => positions.push((i, p)),
        }
    }

    let mut steps = Vec::new();
    let init = materialize(init, temps, ctx, &mut steps);
    let len_name = temp_len_name(ctx);
    steps.push(assign_one(
        VariableRef::simple(&len_name),
        WorkflowExpr::call("len", vec![init.clone()]),
    ));
    let len_ref = WorkflowExpr::var(&len_name);

    let rest_name = match rest {
        Some(r) => match r.argument.as_ref() {
            Pattern::Identifier(name, _) => Some(name.clone()),
            _ => unreachable!("validated above"),
        },
        None => None,
    };

    let mut branches = Vec::with_capacity(positions.len() + 1);
    // Decreasing threshold order: the branch for the largest `i` is tried
    // first and, when it matches, is also the one that drains the rest.
    for (branch_idx, &(i, _)) in positions.iter().enumerate().rev() {
        let mut body = Vec::new();
        for &(j, pat) in &positions[..=branch_idx] {
            bind_present(pat, index_into(&init, j), temps, ctx, &mut body)?;
        }
        for &(_, pat) in &positions[branch_idx + 1..] {
            bind_absent(pat, temps, ctx, &mut body)?;
        }
        if let Some(rest_name) = &rest_name {
            let is_fullest_branch = branch_idx == positions.len() - 1;
            if is_fullest_branch {
                body.extend(rest_via_loop(rest_name, &init, i + 1, &len_name, temps, ctx));
            } else {
                body.push(assign_one(VariableRef::simple(rest_name), WorkflowExpr::Array(Vec::new())));
            }
        }
        branches.push(SwitchBranch {
            condition: WorkflowExpr::Binary(Box::new(len_ref.clone()), BinaryOp::Gte, Box::new(WorkflowExpr::Number((i + 1) as f64))),
            steps: body,
            next: None,
        });
    }

    // Final catch-all: nothing present, everything defaults.
    let mut fallback = Vec::new();
    for &(_, pat) in &positions {
        bind_absent(pat, temps, ctx, &mut fallback)?;
    }
    if let Some(rest_name) = &rest_name {
        fallback.push(assign_one(VariableRef::simple(rest_name), WorkflowExpr::Array(Vec::new())));
    }
    branches.push(SwitchBranch {
        condition: WorkflowExpr::Bool(true),
        steps: fallback,
        next: None,
    });

    steps.push(Step::new(StepKind::Switch(branches)));
    Ok(steps)
}

fn rest_via_loop(
    rest_name: &str,
    init: &WorkflowExpr,
    start: usize,
    len_name: &str,
    temps: &mut TempCounter,
    ctx: &ParsingContext,
) -> Vec<Step> {
    let loop_var = temps.next(ctx);
    let element = init.clone().member(WorkflowExpr::var(&loop_var), true);
    let body = vec![assign_one(
        VariableRef::simple(rest_name),
        WorkflowExpr::call("list.concat", vec![WorkflowExpr::var(rest_name), WorkflowExpr::Array(vec![element])]),
    )];
    vec![
        assign_one(VariableRef::simple(rest_name), WorkflowExpr::Array(Vec::new())),
        Step::new(StepKind::For(ForStep {
            loop_var,
            iterable: ForIterable::Range {
                start: WorkflowExpr::Number(start as f64),
                end: WorkflowExpr::var(len_name),
            },
            body,
        })),
    ]
}

fn lower_object_pattern(
    pattern: &ast::ObjectPattern,
    init: WorkflowExpr,
    temps: &mut TempCounter,
    ctx: &ParsingContext,
) -> CompileResult<Vec<Step>> {
    if pattern.properties.is_empty() && pattern.rest.is_none() {
        return Ok(Vec::new());
    }

    let mut steps = Vec::new();
    let obj = materialize(init, temps, ctx, &mut steps);

    let mut keys = Vec::with_capacity(pattern.properties.len());
    for prop in &pattern.properties {
        let key = match &prop.key {
            ast::PropertyKey::Identifier(name) => name.clone(),
            ast::PropertyKey::StringLiteral(name) => name.clone(),
            ast::PropertyKey::Other => {
                return Err(CompileError::invalid_map_key(
                    "destructured object keys must be identifiers or string literals",
                    prop.span,
                ))
            }
        };
        keys.push(key.clone());

        match default_for(&prop.value)? {
            Some((target_pat, default_expr)) => {
                let present = {
                    let mut body = Vec::new();
                    body.extend(lower_pattern_binding(target_pat, map_get(&obj, &key), temps, ctx)?);
                    body
                };
                let absent = {
                    let mut body = Vec::new();
                    let value = convert_expression(default_expr)?;
                    body.extend(lower_pattern_binding(target_pat, value, temps, ctx)?);
                    body
                };
                steps.push(Step::new(StepKind::Switch(vec![
                    SwitchBranch {
                        condition: WorkflowExpr::Binary(Box::new(WorkflowExpr::Str(key.clone())), BinaryOp::In, Box::new(obj.clone())),
                        steps: present,
                        next: None,
                    },
                    SwitchBranch {
                        condition: WorkflowExpr::Bool(true),
                        steps: absent,
                        next: None,
                    },
                ])));
            }
            None => {
                steps.extend(lower_pattern_binding(&prop.value, map_get(&obj, &key), temps, ctx)?);
            }
        }
    }

    if let Some(rest) = &pattern.rest {
        let rest_name = match rest.argument.as_ref() {
            Pattern::Identifier(name, _) => name.clone(),
            other => {
                return Err(CompileError::invalid_destructuring(
                    "rest target must be a plain identifier",
                    other.span(),
                ))
            }
        };
        let mut pairs = vec![(VariableRef::simple(&rest_name), obj.clone())];
        for key in &keys {
            pairs.push((
                VariableRef::simple(&rest_name),
                WorkflowExpr::call("map.delete", vec![WorkflowExpr::var(&rest_name), WorkflowExpr::Str(key.clone())]),
            ));
        }
        steps.push(assign_many(pairs));
    }

    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::span::Span;

    fn ident_pattern(name: &str) -> Pattern {
        Pattern::Identifier(name.to_string(), Span::dummy())
    }

    fn num(n: f64) -> ast::Expression {
        ast::Expression::Literal(ast::Literal::Number(n), Span::dummy())
    }

    #[test]
    fn default_on_a_nested_array_pattern_target_is_rejected() {
        // [[a, b] = [1, 2]] — a default value attached to a non-identifier
        // target must fail rather than silently recurse into it.
        let inner = Pattern::Array(ast::ArrayPattern {
            elements: vec![Some(ident_pattern("a")), Some(ident_pattern("b"))],
            span: Span::dummy(),
        });
        let defaulted = Pattern::Assignment(ast::AssignmentPattern {
            left: Box::new(inner),
            right: Box::new(ast::Expression::Array(vec![Some(num(1.0)), Some(num(2.0))], Span::dummy())),
            span: Span::dummy(),
        });
        let pattern = ast::Pattern::Array(ast::ArrayPattern {
            elements: vec![Some(defaulted)],
            span: Span::dummy(),
        });
        let mut temps = TempCounter::new();
        let ctx = ParsingContext::new();
        let err = lower_pattern_binding(&pattern, WorkflowExpr::var("arr"), &mut temps, &ctx).unwrap_err();
        assert_eq!(err.kind, crate::compiler::error::SyntaxKind::InvalidDestructuring);
    }

    #[test]
    fn default_on_a_plain_identifier_target_still_compiles() {
        let defaulted = Pattern::Assignment(ast::AssignmentPattern {
            left: Box::new(ident_pattern("a")),
            right: Box::new(num(99.0)),
            span: Span::dummy(),
        });
        let pattern = ast::Pattern::Array(ast::ArrayPattern {
            elements: vec![Some(defaulted)],
            span: Span::dummy(),
        });
        let mut temps = TempCounter::new();
        let ctx = ParsingContext::new();
        assert!(lower_pattern_binding(&pattern, WorkflowExpr::var("arr"), &mut temps, &ctx).is_ok());
    }
}
