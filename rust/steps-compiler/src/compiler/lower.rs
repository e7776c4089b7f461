//! Statement lowering (spec §4.2) and `parallel()` lowering (spec §4.4):
//! surface statements in, an unresolved (pre-naming, pre-jump-resolution)
//! step tree out. `try_finally` assembles the try/catch/finally scaffold;
//! this module owns the recursive descent and the `finalizerTargets`
//! push/pop around it, and decides what a `return`/`throw` compiles to.

use crate::compiler::ast::{self, ArrowBody, Expression, ForHead, Pattern, Statement};
use crate::compiler::config::{BlockingFunctions, INTRINSIC_CALL_STEP, INTRINSIC_PARALLEL, INTRINSIC_RETRY_POLICY};
use crate::compiler::context::{ParsingContext, TempCounter};
use crate::compiler::convert::convert_expression;
use crate::compiler::destructure::lower_destructuring;
use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::expr::{BinaryOp, VariableRef, WorkflowExpr};
use crate::compiler::span::Span;
use crate::compiler::step::{
    CallStep, ForIterable, ForStep, NextTarget, ParallelIterationStep, ParallelOptions, ParallelStep, Program, Step, StepKind, SubWorkflow,
    SwitchBranch, TryStep,
};
use crate::compiler::try_finally::{self, finalizer_var_names};

pub fn lower_program(program: &ast::Program, blocking: &BlockingFunctions) -> CompileResult<Program> {
    let mut sub_workflows = Vec::with_capacity(program.body.len());
    for func in &program.body {
        sub_workflows.push(lower_function(func, blocking)?);
    }
    Ok(Program { sub_workflows })
}

pub fn lower_function(func: &ast::FunctionDeclaration, blocking: &BlockingFunctions) -> CompileResult<SubWorkflow> {
    let mut params = Vec::with_capacity(func.params.len());
    for p in &func.params {
        match p {
            Pattern::Identifier(name, _) => params.push(name.clone()),
            other => return Err(CompileError::unsupported("function parameters must be plain identifiers", other.span())),
        }
    }
    let mut temps = TempCounter::new();
    let ctx = ParsingContext::new();
    let steps = lower_statements(&func.body.body, &mut temps, &ctx, blocking)?;
    Ok(SubWorkflow {
        name: func.name.clone(),
        params,
        steps,
    })
}

pub fn lower_statements(statements: &[Statement], temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    let mut out = Vec::new();
    for stmt in statements {
        out.extend(lower_statement(stmt, temps, ctx, blocking)?);
    }
    Ok(out)
}

pub fn lower_statement(stmt: &Statement, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    match stmt {
        Statement::Block(b) => lower_statements(&b.body, temps, ctx, blocking),
        Statement::VariableDeclaration(decl) => lower_variable_declaration(decl, temps, ctx, blocking),
        Statement::ExpressionStatement(expr, _) => lower_expression_statement(expr, temps, ctx, blocking),
        Statement::If { test, consequent, alternate, .. } => lower_if(test, consequent, alternate.as_deref(), temps, ctx, blocking),
        Statement::Switch { discriminant, cases, .. } => lower_switch(discriminant, cases, temps, ctx, blocking),
        Statement::ForOf { left, right, body, span } => lower_for_of(left, right, body, *span, temps, ctx, blocking),
        Statement::ForIn { span, .. } => Err(CompileError::unsupported("'for...in' is not supported", *span)),
        Statement::While { test, body, .. } => lower_while(test, body, temps, ctx, blocking),
        Statement::DoWhile { body, test, .. } => lower_do_while(body, test, temps, ctx, blocking),
        Statement::Break { label, span } => lower_break(label.as_deref(), *span, ctx),
        Statement::Continue { label, span } => lower_continue(label.as_deref(), *span, ctx),
        Statement::Return { argument, .. } => lower_return(argument.as_ref(), ctx),
        Statement::Throw { argument, .. } => lower_throw(argument, ctx),
        Statement::Try { block, handler, finalizer, .. } => lower_try(block, handler.as_ref(), finalizer.as_ref(), temps, ctx, blocking),
        Statement::Labeled { label, body, .. } => lower_labeled(label, body, temps, ctx, blocking),
        Statement::Empty(_) => Ok(Vec::new()),
        Statement::FunctionDeclaration(f) => Err(CompileError::unsupported("nested function declarations are not supported", f.span)),
        Statement::TsTypeOnly(_) => Ok(Vec::new()),
    }
}

fn lower_labeled(label: &str, body: &Statement, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    let mut steps = lower_statement(body, temps, ctx, blocking)?;
    if let Some(first) = steps.first_mut() {
        if !first.is_jump_target() {
            first.label = Some(label.to_string());
        }
    }
    Ok(steps)
}

// ── Declarations and expression statements ──────────────────────────────

fn lower_variable_declaration(decl: &ast::VariableDeclaration, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    match decl.kind {
        ast::VariableKind::Let | ast::VariableKind::Const => {}
        ast::VariableKind::Var | ast::VariableKind::Using | ast::VariableKind::AwaitUsing => {
            return Err(CompileError::unsupported("only 'let'/'const' declarations are supported", decl.span))
        }
    }

    let mut steps = Vec::new();
    for declarator in &decl.declarations {
        match &declarator.id {
            Pattern::Identifier(name, _) => {
                let value = match &declarator.init {
                    Some(init) => lower_rhs_value(init, temps, ctx, blocking, &mut steps)?,
                    None => WorkflowExpr::Null,
                };
                steps.push(Step::new(StepKind::Assign(vec![(VariableRef::simple(name), value)])));
            }
            Pattern::Array(_) | Pattern::Object(_) => {
                let init = declarator
                    .init
                    .as_ref()
                    .ok_or_else(|| CompileError::invalid_destructuring("a destructuring declaration requires an initializer", declarator.span))?;
                steps.extend(lower_destructuring(&declarator.id, init, temps, ctx)?);
            }
            Pattern::Assignment(_) | Pattern::Rest(_) => {
                return Err(CompileError::internal("assignment/rest pattern used directly as a declarator", declarator.span))
            }
        }
    }
    Ok(steps)
}

fn lower_expression_statement(expr: &Expression, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    match peel(expr) {
        Expression::Assignment { operator, left, right, span } => lower_assignment_expr(operator, left, right, *span, temps, ctx, blocking),
        Expression::Call { .. } => lower_call_statement(expr, temps, ctx, blocking),
        other => {
            let value = convert_expression(other)?;
            let name = temps.next(ctx);
            Ok(vec![Step::new(StepKind::Assign(vec![(VariableRef::simple(&name), value)]))])
        }
    }
}

fn peel(expr: &Expression) -> &Expression {
    match expr {
        Expression::Chain(inner, _) => peel(inner),
        Expression::TsTransparent(inner, _) => peel(inner),
        Expression::Await(inner, _) => peel(inner),
        other => other,
    }
}

// ── Assignment: compound operators, destructuring, and LHS index hoisting ──

fn compound_binary_op(op: &ast::AssignmentOperator) -> Option<BinaryOp> {
    match op {
        ast::AssignmentOperator::Assign => None,
        ast::AssignmentOperator::AddAssign => Some(BinaryOp::Add),
        ast::AssignmentOperator::SubAssign => Some(BinaryOp::Sub),
        ast::AssignmentOperator::MulAssign => Some(BinaryOp::Mul),
        ast::AssignmentOperator::DivAssign => Some(BinaryOp::Div),
        ast::AssignmentOperator::ModAssign => Some(BinaryOp::Mod),
    }
}

fn is_cheap_index(expr: &Expression) -> bool {
    matches!(expr, Expression::Identifier(_, _) | Expression::Literal(_, _))
}

/// Hoists any side-effecting computed member index in `expr` into a
/// temp-assignment pushed to `pre`, so the rewritten LHS can be evaluated
/// twice (read for a compound op, then written) without re-running the
/// side effect (spec §4.2 scenario 2: `a[f()].x += 1`).
fn hoist_lhs_indices(expr: &Expression, temps: &mut TempCounter, ctx: &ParsingContext, pre: &mut Vec<Step>) -> CompileResult<Expression> {
    match expr {
        Expression::Member {
            object,
            property,
            computed,
            optional,
            span,
        } => {
            if *optional {
                return Err(CompileError::invalid_lvalue("an optional member access cannot be an assignment target", *span));
            }
            let object = hoist_lhs_indices(object, temps, ctx, pre)?;
            let property = if *computed && !is_cheap_index(property) {
                let converted = convert_expression(property)?;
                let name = temps.next(ctx);
                pre.push(Step::new(StepKind::Assign(vec![(VariableRef::simple(&name), converted)])));
                Expression::Identifier(name, property.span())
            } else {
                (**property).clone()
            };
            Ok(Expression::Member {
                object: Box::new(object),
                property: Box::new(property),
                computed: *computed,
                optional: false,
                span: *span,
            })
        }
        other => Ok(other.clone()),
    }
}

fn convert_lvalue(expr: &Expression) -> CompileResult<VariableRef> {
    match convert_expression(expr)? {
        WorkflowExpr::VariableReference(vref) => Ok(vref),
        _ => Err(CompileError::invalid_lvalue("assignment target must be a variable or member reference", expr.span())),
    }
}

fn lower_assignment_expr(
    operator: &ast::AssignmentOperator,
    left: &ast::AssignmentTarget,
    right: &Expression,
    span: Span,
    temps: &mut TempCounter,
    ctx: &ParsingContext,
    blocking: &BlockingFunctions,
) -> CompileResult<Vec<Step>> {
    match left {
        ast::AssignmentTarget::Pattern(pattern) => {
            if !matches!(operator, ast::AssignmentOperator::Assign) {
                return Err(CompileError::invalid_lvalue("compound assignment to a destructuring pattern is not supported", span));
            }
            lower_destructuring(pattern, right, temps, ctx)
        }
        ast::AssignmentTarget::Expression(lhs_expr) => {
            let mut steps = Vec::new();
            let hoisted_lhs = hoist_lhs_indices(lhs_expr, temps, ctx, &mut steps)?;
            let target_ref = convert_lvalue(&hoisted_lhs)?;
            let mut value = lower_rhs_value(right, temps, ctx, blocking, &mut steps)?;
            if let Some(op) = compound_binary_op(operator) {
                let current = convert_expression(&hoisted_lhs)?;
                value = WorkflowExpr::Binary(Box::new(current), op, Box::new(value));
            }
            steps.push(Step::new(StepKind::Assign(vec![(target_ref, value)])));
            Ok(steps)
        }
    }
}

/// Converts a value-producing RHS, routing `call_step(...)`/known
/// blocking-function calls through an explicit `Call` step writing a temp
/// (spec §4.2: "lower to a call step writing to a temp, then use the temp
/// as value"); everything else converts directly with no extra step.
fn lower_rhs_value(rhs: &Expression, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions, pre: &mut Vec<Step>) -> CompileResult<WorkflowExpr> {
    let rhs = peel(rhs);
    if let Expression::Call { callee, arguments, optional, span } = rhs {
        if *optional {
            return Err(CompileError::unsupported("an optional call cannot be used as a value", *span));
        }
        if let Expression::Identifier(name, _) = callee.as_ref() {
            if name == INTRINSIC_CALL_STEP {
                let temp = temps.next(ctx);
                let call_step = lower_call_step_args(arguments, *span, Some(temp.clone()))?;
                pre.push(Step::new(StepKind::Call(call_step)));
                return Ok(WorkflowExpr::var(temp));
            }
            if name == INTRINSIC_PARALLEL || name == INTRINSIC_RETRY_POLICY {
                return Err(CompileError::unsupported(format!("'{name}()' does not produce a value"), *span));
            }
        }
        let converted_callee = convert_expression(callee)?;
        if let Some(fq_name) = converted_callee.fully_qualified_name() {
            if blocking.is_blocking(&fq_name) {
                let temp = temps.next(ctx);
                let call_step = lower_blocking_call_args(&fq_name, arguments, *span, blocking, Some(temp.clone()))?;
                pre.push(Step::new(StepKind::Call(call_step)));
                return Ok(WorkflowExpr::var(temp));
            }
        }
    }
    convert_expression(rhs)
}

// ── Calls: call_step(), blocking functions, parallel(), and plain calls ──

fn lower_call_statement(expr: &Expression, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    let expr = peel(expr);
    let (callee, arguments, optional, span) = match expr {
        Expression::Call { callee, arguments, optional, span } => (callee.as_ref(), arguments.as_slice(), *optional, *span),
        _ => return Err(CompileError::internal("lower_call_statement called on a non-Call expression", expr.span())),
    };
    if optional {
        return Err(CompileError::unsupported("an optional call is not supported as a statement", span));
    }

    if let Expression::Identifier(name, _) = callee {
        match name.as_str() {
            INTRINSIC_PARALLEL => return lower_parallel_call(arguments, span, temps, ctx, blocking),
            INTRINSIC_RETRY_POLICY => return Ok(Vec::new()),
            INTRINSIC_CALL_STEP => {
                let call_step = lower_call_step_args(arguments, span, None)?;
                return Ok(vec![Step::new(StepKind::Call(call_step))]);
            }
            _ => {}
        }
    }

    let converted_callee = convert_expression(callee)?;
    if let Some(fq_name) = converted_callee.fully_qualified_name() {
        if blocking.is_blocking(&fq_name) {
            let call_step = lower_blocking_call_args(&fq_name, arguments, span, blocking, None)?;
            return Ok(vec![Step::new(StepKind::Call(call_step))]);
        }
    }

    let value = convert_expression(expr)?;
    let name = temps.next(ctx);
    Ok(vec![Step::new(StepKind::Assign(vec![(VariableRef::simple(&name), value)]))])
}

fn lower_call_step_args(arguments: &[ast::CallArgument], span: Span, result: Option<String>) -> CompileResult<CallStep> {
    let mut iter = arguments.iter();
    let fn_arg = match iter.next() {
        Some(ast::CallArgument::Expression(e)) => e,
        Some(ast::CallArgument::Spread(_, s)) => return Err(CompileError::unsupported("call_step() does not accept a spread function-name argument", *s)),
        None => return Err(CompileError::unsupported("call_step() requires a function-name argument", span)),
    };
    let converted = convert_expression(fn_arg)?;
    let function = match &converted {
        WorkflowExpr::Str(s) => s.clone(),
        _ => converted
            .fully_qualified_name()
            .ok_or_else(|| CompileError::unsupported("call_step()'s function name must be a string literal or a fully-qualified name", fn_arg.span()))?,
    };

    let mut args = Vec::new();
    if let Some(arg) = iter.next() {
        match arg {
            ast::CallArgument::Expression(Expression::Object(props, _)) => {
                for prop in props {
                    let key = match &prop.key {
                        ast::PropertyKey::Identifier(n) | ast::PropertyKey::StringLiteral(n) => n.clone(),
                        ast::PropertyKey::Other => return Err(CompileError::invalid_map_key("call_step() argument keys must be identifiers or string literals", prop.span)),
                    };
                    args.push((key, convert_expression(&prop.value)?));
                }
            }
            ast::CallArgument::Expression(other) => return Err(CompileError::unsupported("call_step()'s second argument must be an object literal", other.span())),
            ast::CallArgument::Spread(_, s) => return Err(CompileError::unsupported("call_step() does not accept a spread arguments object", *s)),
        }
    }
    Ok(CallStep { function, args, result })
}

fn lower_blocking_call_args(
    function_name: &str,
    arguments: &[ast::CallArgument],
    span: Span,
    blocking: &BlockingFunctions,
    result: Option<String>,
) -> CompileResult<CallStep> {
    let params = blocking.param_names(function_name).expect("caller already confirmed this is a blocking function");
    if arguments.len() != params.len() {
        return Err(CompileError::unsupported(
            format!("'{function_name}' expects {} argument(s), got {}", params.len(), arguments.len()),
            span,
        ));
    }
    let mut args = Vec::with_capacity(params.len());
    for (param, arg) in params.iter().zip(arguments) {
        let expr = match arg {
            ast::CallArgument::Expression(e) => e,
            ast::CallArgument::Spread(_, s) => return Err(CompileError::unsupported("blocking-function calls do not accept spread arguments", *s)),
        };
        args.push((param.clone(), convert_expression(expr)?));
    }
    Ok(CallStep {
        function: function_name.to_string(),
        args,
        result,
    })
}

// ── parallel() lowering (spec §4.4) ──────────────────────────────────────

fn parse_parallel_options(expr: &Expression) -> CompileResult<ParallelOptions> {
    let props = match expr {
        Expression::Object(props, _) => props,
        other => return Err(CompileError::invalid_parallel("parallel()'s options argument must be an object literal", other.span())),
    };
    let mut options = ParallelOptions::default();
    for prop in props {
        let key = match &prop.key {
            ast::PropertyKey::Identifier(n) | ast::PropertyKey::StringLiteral(n) => n.clone(),
            ast::PropertyKey::Other => return Err(CompileError::invalid_parallel("parallel() option keys must be identifiers or string literals", prop.span)),
        };
        match key.as_str() {
            "shared" => {
                let items = match &prop.value {
                    Expression::Array(items, _) => items,
                    other => return Err(CompileError::invalid_parallel("'shared' must be an array of variable names", other.span())),
                };
                let mut names = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Some(Expression::Literal(ast::Literal::Str(s), _)) => names.push(s.clone()),
                        Some(Expression::Identifier(name, _)) => names.push(name.clone()),
                        Some(other) => return Err(CompileError::invalid_parallel("'shared' entries must be variable names", other.span())),
                        None => return Err(CompileError::invalid_parallel("'shared' cannot contain a hole", prop.span)),
                    }
                }
                options.shared = names;
            }
            "concurrency_limit" => match &prop.value {
                Expression::Literal(ast::Literal::Number(n), _) => options.concurrency_limit = Some(*n as i64),
                other => return Err(CompileError::invalid_parallel("'concurrency_limit' must be a number literal", other.span())),
            },
            "exception_policy" => match &prop.value {
                Expression::Literal(ast::Literal::Str(s), _) => options.exception_policy = Some(s.clone()),
                other => return Err(CompileError::invalid_parallel("'exception_policy' must be a string literal", other.span())),
            },
            _ => {}
        }
    }
    Ok(options)
}

fn lower_parallel_branch_body(expr: &Expression, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    match expr {
        Expression::Arrow(arrow) => {
            if !arrow.params.is_empty() {
                return Err(CompileError::invalid_parallel("a parallel() branch function must take no parameters", arrow.span));
            }
            match arrow.body.as_ref() {
                ArrowBody::Block(block) => lower_statements(&block.body, temps, ctx, blocking),
                ArrowBody::Expression(e) => lower_expression_statement(e, temps, ctx, blocking),
            }
        }
        other => {
            let converted = convert_expression(other)?;
            let function = converted
                .fully_qualified_name()
                .ok_or_else(|| CompileError::invalid_parallel("a parallel() branch must be a function reference or a parameterless function", other.span()))?;
            Ok(vec![Step::new(StepKind::Call(CallStep {
                function,
                args: Vec::new(),
                result: None,
            }))])
        }
    }
}

fn lower_for_of_core(
    left: &ForHead,
    right: &Expression,
    body: &Statement,
    break_label: &str,
    continue_label: &str,
    temps: &mut TempCounter,
    ctx: &ParsingContext,
    blocking: &BlockingFunctions,
) -> CompileResult<ForStep> {
    let loop_var = match left {
        ForHead::Identifier(name, _) => name.clone(),
        ForHead::VariableDeclaration(_, Pattern::Identifier(name, _), _) => name.clone(),
        ForHead::VariableDeclaration(_, other, _) => return Err(CompileError::unsupported("a for...of loop variable must be a plain identifier", other.span())),
    };
    let iterable = convert_expression(right)?;
    let body_ctx = ctx.clear_loop_targets().with_loop_targets(break_label, continue_label);
    let mut body_steps = lower_statement(body, temps, &body_ctx, blocking)?;
    body_steps.push(Step::jump_target(continue_label));
    Ok(ForStep {
        loop_var,
        iterable: ForIterable::Expr(iterable),
        body: body_steps,
    })
}

fn lower_parallel_call(arguments: &[ast::CallArgument], span: Span, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    let first = match arguments.first() {
        Some(ast::CallArgument::Expression(e)) => e,
        Some(ast::CallArgument::Spread(_, s)) => return Err(CompileError::invalid_parallel("parallel() does not accept a spread first argument", *s)),
        None => return Err(CompileError::invalid_parallel("parallel() requires at least one argument", span)),
    };
    let options = match arguments.get(1) {
        Some(ast::CallArgument::Expression(e)) => parse_parallel_options(e)?,
        Some(ast::CallArgument::Spread(_, s)) => return Err(CompileError::invalid_parallel("parallel() does not accept a spread options argument", *s)),
        None => ParallelOptions::default(),
    };
    let branch_ctx = ctx.enter_parallel_branch().clear_loop_targets();

    match first {
        Expression::Array(elements, _) => {
            let mut branches = Vec::with_capacity(elements.len());
            for (i, element) in elements.iter().enumerate() {
                let element = element
                    .as_ref()
                    .ok_or_else(|| CompileError::invalid_parallel("parallel()'s branch array cannot contain a hole", span))?;
                let body = lower_parallel_branch_body(element, temps, &branch_ctx, blocking)?;
                branches.push((format!("branch{}", i + 1), body));
            }
            Ok(vec![Step::new(StepKind::Parallel(ParallelStep { branches, options }))])
        }
        Expression::Arrow(arrow) => {
            if !arrow.params.is_empty() {
                return Err(CompileError::invalid_parallel("parallel()'s iteration function must take no parameters", arrow.span));
            }
            let block = match arrow.body.as_ref() {
                ArrowBody::Block(b) => b,
                ArrowBody::Expression(e) => {
                    return Err(CompileError::invalid_parallel("parallel()'s iteration form requires a block body containing a single for...of statement", e.span()))
                }
            };
            if block.body.len() != 1 {
                return Err(CompileError::invalid_parallel("parallel()'s iteration form requires exactly one statement: a for...of loop", block.span));
            }
            let break_label = temps.next_jump_label();
            let continue_label = temps.next_jump_label();
            let for_step = match &block.body[0] {
                Statement::ForOf { left, right, body, .. } => lower_for_of_core(left, right, body, &break_label, &continue_label, temps, &branch_ctx, blocking)?,
                other => return Err(CompileError::invalid_parallel("parallel()'s iteration form requires a for...of statement", other.span())),
            };
            Ok(vec![
                Step::new(StepKind::ParallelIteration(ParallelIterationStep { for_step, options })),
                Step::jump_target(break_label),
            ])
        }
        other => Err(CompileError::invalid_parallel(
            "parallel()'s first argument must be an array of branches or a parameterless for...of arrow",
            other.span(),
        )),
    }
}

// ── Control flow: if, switch, for...of, while, do...while, break/continue ──

fn lower_if(test: &Expression, consequent: &Statement, alternate: Option<&Statement>, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    let condition = convert_expression(test)?;
    let mut branches = vec![SwitchBranch {
        condition,
        steps: lower_statement(consequent, temps, ctx, blocking)?,
        next: None,
    }];
    if let Some(alt) = alternate {
        branches.push(SwitchBranch {
            condition: WorkflowExpr::Bool(true),
            steps: lower_statement(alt, temps, ctx, blocking)?,
            next: None,
        });
    }
    Ok(vec![Step::new(StepKind::Switch(branches))])
}

fn lower_switch(discriminant: &Expression, cases: &[ast::SwitchCase], temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    if cases.is_empty() {
        return Ok(Vec::new());
    }
    let discriminant_expr = convert_expression(discriminant)?;
    let switch_end = temps.next_jump_label();

    let mut case_labels = Vec::with_capacity(cases.len());
    let mut branches = Vec::with_capacity(cases.len());
    for case in cases {
        let label = temps.next_jump_label();
        let condition = match &case.test {
            Some(test) => WorkflowExpr::Binary(Box::new(discriminant_expr.clone()), BinaryOp::Eq, Box::new(convert_expression(test)?)),
            None => WorkflowExpr::Bool(true),
        };
        branches.push(SwitchBranch {
            condition,
            steps: Vec::new(),
            next: Some(NextTarget::label(label.clone())),
        });
        case_labels.push(label);
    }

    // `break` inside a switch exits the switch; `continue` still refers to
    // whatever loop (if any) encloses the switch.
    let mut body_ctx = ctx.clone();
    body_ctx.break_target = Some(switch_end.clone());

    let mut out = vec![Step::new(StepKind::Switch(branches))];
    for (case, label) in cases.iter().zip(case_labels) {
        out.push(Step::jump_target(label));
        out.extend(lower_statements(&case.consequent, temps, &body_ctx, blocking)?);
    }
    out.push(Step::jump_target(switch_end));
    Ok(out)
}

fn lower_for_of(left: &ForHead, right: &Expression, body: &Statement, _span: Span, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    let break_label = temps.next_jump_label();
    let continue_label = temps.next_jump_label();
    let for_step = lower_for_of_core(left, right, body, &break_label, &continue_label, temps, ctx, blocking)?;
    Ok(vec![Step::new(StepKind::For(for_step)), Step::jump_target(break_label)])
}

fn lower_while(test: &Expression, body: &Statement, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    let start_label = temps.next_jump_label();
    let break_label = temps.next_jump_label();
    let continue_label = temps.next_jump_label();

    let condition = convert_expression(test)?;
    let body_ctx = ctx.clear_loop_targets().with_loop_targets(break_label.clone(), continue_label.clone());
    let mut body_steps = lower_statement(body, temps, &body_ctx, blocking)?;
    body_steps.push(Step::jump_target(continue_label));
    body_steps.push(Step::new(StepKind::Next(NextTarget::label(start_label.clone()))));

    let switch_step = Step::new(StepKind::Switch(vec![SwitchBranch {
        condition,
        steps: body_steps,
        next: None,
    }]));

    Ok(vec![Step::jump_target(start_label), switch_step, Step::jump_target(break_label)])
}

fn lower_do_while(body: &Statement, test: &Expression, temps: &mut TempCounter, ctx: &ParsingContext, blocking: &BlockingFunctions) -> CompileResult<Vec<Step>> {
    let start_label = temps.next_jump_label();
    let break_label = temps.next_jump_label();
    let continue_label = temps.next_jump_label();

    let body_ctx = ctx.clear_loop_targets().with_loop_targets(break_label.clone(), continue_label.clone());
    let mut body_steps = lower_statement(body, temps, &body_ctx, blocking)?;
    body_steps.push(Step::jump_target(continue_label));

    let condition = convert_expression(test)?;
    body_steps.push(Step::new(StepKind::Switch(vec![SwitchBranch {
        condition,
        steps: Vec::new(),
        next: Some(NextTarget::label(start_label.clone())),
    }])));

    let mut out = vec![Step::jump_target(start_label)];
    out.extend(body_steps);
    out.push(Step::jump_target(break_label));
    Ok(out)
}

fn lower_break(label: Option<&str>, span: Span, ctx: &ParsingContext) -> CompileResult<Vec<Step>> {
    if ctx.in_finalizer() {
        return Err(CompileError::control_flow(
            "'break' inside a 'finally' body cannot jump out of the finalizer scaffold",
            span,
        ));
    }
    let target = match label {
        Some(l) => NextTarget::Label(l.to_string()),
        None => ctx.break_target.clone().map(NextTarget::Label).unwrap_or(NextTarget::Break),
    };
    Ok(vec![Step::new(StepKind::Next(target))])
}

fn lower_continue(label: Option<&str>, span: Span, ctx: &ParsingContext) -> CompileResult<Vec<Step>> {
    if ctx.in_finalizer() {
        return Err(CompileError::control_flow(
            "'continue' inside a 'finally' body cannot jump out of the finalizer scaffold",
            span,
        ));
    }
    let target = match label {
        Some(l) => NextTarget::Label(l.to_string()),
        None => ctx.continue_target.clone().map(NextTarget::Label).unwrap_or(NextTarget::Continue),
    };
    Ok(vec![Step::new(StepKind::Next(target))])
}

// ── return / throw, with finalizer redirection (spec §4.5) ──────────────

fn lower_return(argument: Option<&Expression>, ctx: &ParsingContext) -> CompileResult<Vec<Step>> {
    let value = match argument {
        Some(e) => convert_expression(e)?,
        None => WorkflowExpr::Null,
    };
    if ctx.in_finalizer() {
        let label = ctx.finalizer_targets.top().expect("in_finalizer() just confirmed a frame exists").to_string();
        let (condition_var, value_var) = finalizer_var_names(ctx.finalizer_targets.depth());
        Ok(vec![Step::new(StepKind::Assign(vec![
            (VariableRef::simple(&condition_var), WorkflowExpr::Str("return".to_string())),
            (VariableRef::simple(&value_var), value),
        ]))
        .with_next(NextTarget::label(label))])
    } else {
        Ok(vec![Step::new(StepKind::Return(Some(value)))])
    }
}

fn lower_throw(argument: &Expression, ctx: &ParsingContext) -> CompileResult<Vec<Step>> {
    let value = convert_expression(argument)?;
    if ctx.in_finalizer() {
        let label = ctx.finalizer_targets.top().expect("in_finalizer() just confirmed a frame exists").to_string();
        let (condition_var, value_var) = finalizer_var_names(ctx.finalizer_targets.depth());
        Ok(vec![Step::new(StepKind::Assign(vec![
            (VariableRef::simple(&condition_var), WorkflowExpr::Str("raise".to_string())),
            (VariableRef::simple(&value_var), value),
        ]))
        .with_next(NextTarget::label(label))])
    } else {
        Ok(vec![Step::new(StepKind::Raise(value))])
    }
}

// ── try/catch/finally orchestration (spec §4.5) ──────────────────────────

fn lower_catch_param(param: Option<&Pattern>) -> CompileResult<Option<String>> {
    match param {
        None => Ok(None),
        Some(Pattern::Identifier(name, _)) => Ok(Some(name.clone())),
        Some(other) => Err(CompileError::unsupported("a catch parameter must be a plain identifier", other.span())),
    }
}

fn lower_try(
    block: &ast::BlockStatement,
    handler: Option<&ast::CatchClause>,
    finalizer: Option<&ast::BlockStatement>,
    temps: &mut TempCounter,
    ctx: &ParsingContext,
    blocking: &BlockingFunctions,
) -> CompileResult<Vec<Step>> {
    let Some(finalizer) = finalizer else {
        // No `finally`: a plain Try step, no delayed-return scaffold needed.
        let (retry, body_stmts) = try_finally::split_retry_policy(&block.body)?;
        let try_steps = lower_statements(body_stmts, temps, ctx, blocking)?;
        let (error_var, catch_steps) = match handler {
            Some(h) => (lower_catch_param(h.param.as_ref())?, Some(lower_statements(&h.body.body, temps, ctx, blocking)?)),
            None => (None, None),
        };
        return Ok(vec![Step::new(StepKind::Try(TryStep {
            try_body: try_steps,
            catch_body: catch_steps,
            error_var,
            retry,
        }))]);
    };

    let finalizer_label = temps.next_jump_label();
    let inner_ctx = ctx.push_finalizer(finalizer_label.clone());
    let depth = inner_ctx.finalizer_targets.depth();

    let (retry, body_stmts) = try_finally::split_retry_policy(&block.body)?;
    let try_steps = lower_statements(body_stmts, temps, &inner_ctx, blocking)?;
    let (error_var, catch_steps) = match handler {
        Some(h) => (lower_catch_param(h.param.as_ref())?, Some(lower_statements(&h.body.body, temps, &inner_ctx, blocking)?)),
        None => (None, None),
    };
    // The finally body itself runs outside the try/catch's own finalizer
    // frame (spec §4.5 step 2: popped before lowering the finally body).
    let finally_steps = lower_statements(&finalizer.body, temps, ctx, blocking)?;

    Ok(try_finally::build_try_finally(depth, &finalizer_label, try_steps, error_var, catch_steps, finally_steps, retry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::span::Span;

    fn ident(name: &str) -> Expression {
        Expression::Identifier(name.to_string(), Span::dummy())
    }

    fn num(n: f64) -> Expression {
        Expression::Literal(ast::Literal::Number(n), Span::dummy())
    }

    fn block(body: Vec<Statement>) -> ast::BlockStatement {
        ast::BlockStatement { body, span: Span::dummy() }
    }

    #[test]
    fn simple_const_declaration_lowers_to_one_assign() {
        let decl = ast::VariableDeclaration {
            kind: ast::VariableKind::Const,
            declarations: vec![ast::VariableDeclarator {
                id: Pattern::Identifier("a".to_string(), Span::dummy()),
                init: Some(num(1.0)),
                span: Span::dummy(),
            }],
            span: Span::dummy(),
        };
        let mut temps = TempCounter::new();
        let ctx = ParsingContext::new();
        let steps = lower_variable_declaration(&decl, &mut temps, &ctx, &BlockingFunctions::defaults()).unwrap();
        assert_eq!(steps.len(), 1);
        match &steps[0].kind {
            StepKind::Assign(pairs) => {
                assert_eq!(pairs.len(), 1);
                assert_eq!(pairs[0].0, VariableRef::simple("a"));
                assert_eq!(pairs[0].1, WorkflowExpr::Number(1.0));
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn compound_assignment_hoists_side_effecting_computed_index() {
        // a[f()].x += 1
        let index_call = Expression::Call {
            callee: Box::new(ident("f")),
            arguments: Vec::new(),
            optional: false,
            span: Span::dummy(),
        };
        let lhs = Expression::Member {
            object: Box::new(Expression::Member {
                object: Box::new(ident("a")),
                property: Box::new(index_call),
                computed: true,
                optional: false,
                span: Span::dummy(),
            }),
            property: Box::new(ident("x")),
            computed: false,
            optional: false,
            span: Span::dummy(),
        };
        let mut temps = TempCounter::new();
        let ctx = ParsingContext::new();
        let steps = lower_assignment_expr(
            &ast::AssignmentOperator::AddAssign,
            &ast::AssignmentTarget::Expression(lhs),
            &num(1.0),
            Span::dummy(),
            &mut temps,
            &ctx,
            &BlockingFunctions::defaults(),
        )
        .unwrap();

        assert_eq!(steps.len(), 2);
        match &steps[0].kind {
            StepKind::Assign(pairs) => assert_eq!(pairs[0].0, VariableRef::simple("__temp0")),
            other => panic!("expected hoist Assign, got {other:?}"),
        }
        match &steps[1].kind {
            StepKind::Assign(pairs) => {
                let target = &pairs[0].0;
                assert_eq!(target.base, "a");
                match &target.segments[0] {
                    crate::compiler::expr::PathSegment::Index(idx) => assert_eq!(**idx, WorkflowExpr::var("__temp0")),
                    other => panic!("expected computed index, got {other:?}"),
                }
            }
            other => panic!("expected Assign, got {other:?}"),
        }
    }

    #[test]
    fn if_without_else_has_a_single_branch() {
        let stmt = Statement::If {
            test: ident("cond"),
            consequent: Box::new(Statement::ExpressionStatement(ident("cond"), Span::dummy())),
            alternate: None,
            span: Span::dummy(),
        };
        let mut temps = TempCounter::new();
        let ctx = ParsingContext::new();
        let steps = lower_statement(&stmt, &mut temps, &ctx, &BlockingFunctions::defaults()).unwrap();
        assert_eq!(steps.len(), 1);
        match &steps[0].kind {
            StepKind::Switch(branches) => assert_eq!(branches.len(), 1),
            other => panic!("expected Switch, got {other:?}"),
        }
    }

    #[test]
    fn while_loop_wires_break_and_continue_labels() {
        let stmt = Statement::While {
            test: ident("cond"),
            body: Box::new(Statement::Break { label: None, span: Span::dummy() }),
            span: Span::dummy(),
        };
        let mut temps = TempCounter::new();
        let ctx = ParsingContext::new();
        let steps = lower_statement(&stmt, &mut temps, &ctx, &BlockingFunctions::defaults()).unwrap();
        // [JumpTarget(start), Switch{steps: [Next(break), JumpTarget(continue), Next(start)]}, JumpTarget(break)]
        assert_eq!(steps.len(), 3);
        assert!(steps[0].is_jump_target());
        assert!(steps[2].is_jump_target());
        let break_label = steps[2].label.clone().unwrap();
        match &steps[1].kind {
            StepKind::Switch(branches) => match &branches[0].steps[0].kind {
                StepKind::Next(NextTarget::Label(target)) => assert_eq!(target, &break_label),
                other => panic!("expected Next(break), got {other:?}"),
            },
            other => panic!("expected Switch, got {other:?}"),
        }
    }

    #[test]
    fn for_of_body_break_targets_the_trailing_jump_target() {
        let stmt = Statement::ForOf {
            left: ForHead::Identifier("x".to_string(), Span::dummy()),
            right: ident("xs"),
            body: Box::new(Statement::Break { label: None, span: Span::dummy() }),
            span: Span::dummy(),
        };
        let mut temps = TempCounter::new();
        let ctx = ParsingContext::new();
        let steps = lower_statement(&stmt, &mut temps, &ctx, &BlockingFunctions::defaults()).unwrap();
        assert_eq!(steps.len(), 2);
        let StepKind::For(for_step) = &steps[0].kind else { panic!("expected For") };
        let break_label = steps[1].label.clone().unwrap();
        match &for_step.body[0].kind {
            StepKind::Next(NextTarget::Label(target)) => assert_eq!(target, &break_label),
            other => panic!("expected Next(break), got {other:?}"),
        }
    }

    #[test]
    fn parallel_array_of_function_references_builds_named_branches() {
        let call_args = vec![ast::CallArgument::Expression(Expression::Array(
            vec![Some(ident("taskOne")), Some(ident("taskTwo"))],
            Span::dummy(),
        ))];
        let steps = lower_parallel_call(&call_args, Span::dummy(), &mut TempCounter::new(), &ParsingContext::new(), &BlockingFunctions::defaults()).unwrap();
        assert_eq!(steps.len(), 1);
        match &steps[0].kind {
            StepKind::Parallel(p) => {
                assert_eq!(p.branches.len(), 2);
                assert_eq!(p.branches[0].0, "branch1");
                assert_eq!(p.branches[1].0, "branch2");
            }
            other => panic!("expected Parallel, got {other:?}"),
        }
    }

    #[test]
    fn parallel_iteration_form_wraps_the_for_of_loop() {
        let arrow = Expression::Arrow(ast::ArrowFunctionExpression {
            params: Vec::new(),
            body: Box::new(ArrowBody::Block(block(vec![Statement::ForOf {
                left: ForHead::Identifier("item".to_string(), Span::dummy()),
                right: ident("items"),
                body: Box::new(Statement::ExpressionStatement(ident("item"), Span::dummy())),
                span: Span::dummy(),
            }]))),
            span: Span::dummy(),
        });
        let shared_opts = Expression::Object(
            vec![ast::Property {
                key: ast::PropertyKey::Identifier("shared".to_string()),
                value: Expression::Array(vec![Some(ident("total"))], Span::dummy()),
                span: Span::dummy(),
            }],
            Span::dummy(),
        );
        let call_args = vec![ast::CallArgument::Expression(arrow), ast::CallArgument::Expression(shared_opts)];
        let steps = lower_parallel_call(&call_args, Span::dummy(), &mut TempCounter::new(), &ParsingContext::new(), &BlockingFunctions::defaults()).unwrap();
        assert_eq!(steps.len(), 2);
        match &steps[0].kind {
            StepKind::ParallelIteration(p) => {
                assert_eq!(p.for_step.loop_var, "item");
                assert_eq!(p.options.shared, vec!["total".to_string()]);
            }
            other => panic!("expected ParallelIteration, got {other:?}"),
        }
    }

    #[test]
    fn try_finally_with_return_in_try_uses_the_delayed_return_protocol() {
        let try_block = block(vec![Statement::Return {
            argument: Some(num(1.0)),
            span: Span::dummy(),
        }]);
        let finally_block = block(vec![Statement::ExpressionStatement(ident("cleanup"), Span::dummy())]);
        let steps = lower_try(&try_block, None, Some(&finally_block), &mut TempCounter::new(), &ParsingContext::new(), &BlockingFunctions::defaults()).unwrap();
        // [init-vars Assign, outer Try, JumpTarget(finalizer), ...finally steps, footer Switch]
        assert!(steps.len() >= 4);
        match &steps[0].kind {
            StepKind::Assign(pairs) => {
                assert_eq!(pairs[0].0, VariableRef::simple("__t2w_finally_condition"));
                assert_eq!(pairs[1].0, VariableRef::simple("__t2w_finally_value"));
            }
            other => panic!("expected init Assign, got {other:?}"),
        }
        let StepKind::Try(outer) = &steps[1].kind else { panic!("expected outer Try") };
        let StepKind::Try(inner) = &outer.try_body[0].kind else { panic!("expected inner Try") };
        match &inner.try_body[0].kind {
            StepKind::Assign(pairs) => {
                assert_eq!(pairs[0].1, WorkflowExpr::Str("return".to_string()));
                assert_eq!(pairs[1].1, WorkflowExpr::Number(1.0));
            }
            other => panic!("expected delayed-return Assign, got {other:?}"),
        }
    }

    #[test]
    fn call_step_as_a_statement_builds_a_call_step() {
        let call_args = vec![ast::CallArgument::Expression(Expression::Literal(ast::Literal::Str("mySubWorkflow".to_string()), Span::dummy()))];
        let expr = Expression::Call {
            callee: Box::new(ident(INTRINSIC_CALL_STEP)),
            arguments: call_args,
            optional: false,
            span: Span::dummy(),
        };
        let steps = lower_expression_statement(&expr, &mut TempCounter::new(), &ParsingContext::new(), &BlockingFunctions::defaults()).unwrap();
        assert_eq!(steps.len(), 1);
        match &steps[0].kind {
            StepKind::Call(call) => {
                assert_eq!(call.function, "mySubWorkflow");
                assert_eq!(call.result, None);
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn known_blocking_function_call_becomes_a_call_step() {
        let expr = Expression::Call {
            callee: Box::new(Expression::Member {
                object: Box::new(ident("http")),
                property: Box::new(ident("get")),
                computed: false,
                optional: false,
                span: Span::dummy(),
            }),
            arguments: vec![ast::CallArgument::Expression(Expression::Literal(ast::Literal::Str("https://example.com".to_string()), Span::dummy()))],
            optional: false,
            span: Span::dummy(),
        };
        let steps = lower_expression_statement(&expr, &mut TempCounter::new(), &ParsingContext::new(), &BlockingFunctions::defaults()).unwrap();
        assert_eq!(steps.len(), 1);
        match &steps[0].kind {
            StepKind::Call(call) => {
                assert_eq!(call.function, "http.get");
                assert_eq!(call.args, vec![("url".to_string(), WorkflowExpr::Str("https://example.com".to_string()))]);
            }
            other => panic!("expected Call, got {other:?}"),
        }
    }

    #[test]
    fn break_inside_a_try_finally_body_is_a_control_flow_error() {
        let try_stmt = Statement::Try {
            block: block(vec![Statement::ForOf {
                left: ForHead::Identifier("x".to_string(), Span::dummy()),
                right: ident("xs"),
                body: Box::new(Statement::Break { label: None, span: Span::dummy() }),
                span: Span::dummy(),
            }]),
            handler: None,
            finalizer: Some(block(vec![])),
            span: Span::dummy(),
        };
        let err = lower_statement(&try_stmt, &mut TempCounter::new(), &ParsingContext::new(), &BlockingFunctions::defaults()).unwrap_err();
        assert_eq!(err.kind, crate::compiler::error::SyntaxKind::ControlFlow);
    }

    #[test]
    fn continue_inside_a_try_finally_body_is_a_control_flow_error() {
        let try_stmt = Statement::Try {
            block: block(vec![Statement::ForOf {
                left: ForHead::Identifier("x".to_string(), Span::dummy()),
                right: ident("xs"),
                body: Box::new(Statement::Continue { label: None, span: Span::dummy() }),
                span: Span::dummy(),
            }]),
            handler: None,
            finalizer: Some(block(vec![])),
            span: Span::dummy(),
        };
        let err = lower_statement(&try_stmt, &mut TempCounter::new(), &ParsingContext::new(), &BlockingFunctions::defaults()).unwrap_err();
        assert_eq!(err.kind, crate::compiler::error::SyntaxKind::ControlFlow);
    }
}
