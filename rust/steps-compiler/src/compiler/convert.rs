//! The expression converter (spec §4.1): surface AST expression → workflow
//! expression. Pure — it never emits steps; statement lowering is
//! responsible for hoisting side-effecting sub-expressions into temps where
//! the contract calls for it (e.g. a side-effecting computed LHS index,
//! spec §4.2 scenario 2).

use crate::compiler::ast::{self, Expression, Literal};
use crate::compiler::error::{CompileError, CompileResult};
use crate::compiler::expr::{BinaryOp, UnaryOp, WorkflowExpr};
use crate::compiler::span::Span;

pub fn convert_expression(expr: &Expression) -> CompileResult<WorkflowExpr> {
    match expr {
        Expression::Identifier(name, _) => Ok(convert_identifier(name)),
        Expression::Literal(lit, _) => Ok(convert_literal(lit)),
        Expression::TemplateLiteral(elements, _) => convert_template_literal(elements),
        Expression::Array(elements, _) => convert_array(elements),
        Expression::Object(props, span) => convert_object(props, *span),
        Expression::Member { .. } | Expression::Call { .. } => convert_chain(expr),
        Expression::Binary {
            left,
            operator,
            right,
            span,
        } => convert_binary(left, operator, right, *span),
        Expression::Logical {
            left,
            operator,
            right,
            span,
        } => convert_logical(left, operator, right, *span),
        Expression::Unary {
            operator,
            argument,
            span,
        } => convert_unary(operator, argument, *span),
        Expression::UpdateExpression { span } => Err(CompileError::unsupported(
            "increment/decrement operators are not supported",
            *span,
        )),
        Expression::Assignment { span, .. } => Err(CompileError::unsupported(
            "assignment is not a value-producing expression in this subset",
            *span,
        )),
        Expression::Conditional {
            test,
            consequent,
            alternate,
            ..
        } => Ok(WorkflowExpr::if_expr(
            convert_expression(test)?,
            convert_expression(consequent)?,
            convert_expression(alternate)?,
        )),
        Expression::Arrow(arrow) => Err(CompileError::unsupported(
            "function values are only supported as the direct argument of parallel()",
            arrow.span,
        )),
        Expression::Chain(inner, _) => convert_expression(inner),
        Expression::TsTransparent(inner, _) => convert_expression(inner),
        Expression::Await(inner, _) => convert_expression(inner),
    }
}

fn convert_identifier(name: &str) -> WorkflowExpr {
    match name {
        "null" | "undefined" => WorkflowExpr::Null,
        "True" | "TRUE" => WorkflowExpr::Bool(true),
        "False" | "FALSE" => WorkflowExpr::Bool(false),
        _ => WorkflowExpr::var(name),
    }
}

fn convert_literal(lit: &Literal) -> WorkflowExpr {
    match lit {
        Literal::Null => WorkflowExpr::Null,
        Literal::Bool(b) => WorkflowExpr::Bool(*b),
        Literal::Number(n) => WorkflowExpr::Number(*n),
        Literal::Str(s) => WorkflowExpr::Str(s.clone()),
    }
}

fn convert_array(elements: &[Option<Expression>]) -> CompileResult<WorkflowExpr> {
    let mut items = Vec::with_capacity(elements.len());
    for element in elements {
        items.push(match element {
            Some(e) => convert_expression(e)?,
            None => WorkflowExpr::Null,
        });
    }
    Ok(WorkflowExpr::Array(items))
}

fn convert_object(props: &[ast::Property], span: Span) -> CompileResult<WorkflowExpr> {
    let mut entries = Vec::with_capacity(props.len());
    for prop in props {
        let key = match &prop.key {
            ast::PropertyKey::Identifier(name) => name.clone(),
            ast::PropertyKey::StringLiteral(name) => name.clone(),
            ast::PropertyKey::Other => {
                return Err(CompileError::invalid_map_key(
                    "object-literal keys must be identifiers or string literals",
                    prop.span,
                ))
            }
        };
        entries.push((key, convert_expression(&prop.value)?));
    }
    let _ = span;
    Ok(WorkflowExpr::Map(entries))
}

fn convert_unary(operator: &ast::UnaryOperator, argument: &Expression, span: Span) -> CompileResult<WorkflowExpr> {
    match operator {
        ast::UnaryOperator::Plus => Ok(WorkflowExpr::Unary(UnaryOp::Plus, Box::new(convert_expression(argument)?))),
        ast::UnaryOperator::Minus => Ok(WorkflowExpr::Unary(UnaryOp::Minus, Box::new(convert_expression(argument)?))),
        ast::UnaryOperator::Not => Ok(WorkflowExpr::Unary(UnaryOp::Not, Box::new(convert_expression(argument)?))),
        // `void X` evaluates X and discards the result; the enclosing
        // statement (which wraps a bare expression statement in an Assign
        // to a never-read temp) is what actually discards it.
        ast::UnaryOperator::Void => convert_expression(argument),
        ast::UnaryOperator::BitNot => Err(CompileError::unsupported("'~' has no workflow equivalent", span)),
        ast::UnaryOperator::TypeOf => convert_typeof(argument),
    }
}

fn convert_typeof(argument: &Expression) -> CompileResult<WorkflowExpr> {
    let inner = WorkflowExpr::call("get_type", vec![convert_expression(argument)?]);
    let collapsed_containers = WorkflowExpr::call(
        "text.replace_all_regex",
        vec![inner, WorkflowExpr::Str("^(bytes|list|map|null)$".to_string()), WorkflowExpr::Str("object".to_string())],
    );
    Ok(WorkflowExpr::call(
        "text.replace_all_regex",
        vec![
            collapsed_containers,
            WorkflowExpr::Str("^(double|integer)$".to_string()),
            WorkflowExpr::Str("number".to_string()),
        ],
    ))
}

fn convert_binary(left: &Expression, operator: &ast::BinaryOperator, right: &Expression, span: Span) -> CompileResult<WorkflowExpr> {
    let op = match operator {
        ast::BinaryOperator::Add => BinaryOp::Add,
        ast::BinaryOperator::Sub => BinaryOp::Sub,
        ast::BinaryOperator::Mul => BinaryOp::Mul,
        ast::BinaryOperator::Div => BinaryOp::Div,
        ast::BinaryOperator::Mod => BinaryOp::Mod,
        ast::BinaryOperator::Eq | ast::BinaryOperator::StrictEq => BinaryOp::Eq,
        ast::BinaryOperator::NotEq | ast::BinaryOperator::StrictNotEq => BinaryOp::Ne,
        ast::BinaryOperator::Gt => BinaryOp::Gt,
        ast::BinaryOperator::Gte => BinaryOp::Gte,
        ast::BinaryOperator::Lt => BinaryOp::Lt,
        ast::BinaryOperator::Lte => BinaryOp::Lte,
        ast::BinaryOperator::In => BinaryOp::In,
        ast::BinaryOperator::UnsignedRightShift => {
            return Err(CompileError::unsupported("'>>>' has no workflow equivalent", span))
        }
    };
    Ok(WorkflowExpr::Binary(
        Box::new(convert_expression(left)?),
        op,
        Box::new(convert_expression(right)?),
    ))
}

fn convert_logical(left: &Expression, operator: &ast::LogicalOperator, right: &Expression, _span: Span) -> CompileResult<WorkflowExpr> {
    let l = convert_expression(left)?;
    let r = convert_expression(right)?;
    Ok(match operator {
        ast::LogicalOperator::And => WorkflowExpr::Binary(Box::new(l), BinaryOp::And, Box::new(r)),
        ast::LogicalOperator::Or => WorkflowExpr::Binary(Box::new(l), BinaryOp::Or, Box::new(r)),
        ast::LogicalOperator::NullishCoalescing => WorkflowExpr::default_of(l, r),
    })
}

fn convert_template_literal(elements: &[ast::TemplateElement]) -> CompileResult<WorkflowExpr> {
    if elements.is_empty() {
        return Ok(WorkflowExpr::Str(String::new()));
    }
    let mut fragments = Vec::with_capacity(elements.len());
    for element in elements {
        fragments.push(match element {
            ast::TemplateElement::Cooked(text) => WorkflowExpr::Str(text.clone()),
            ast::TemplateElement::Expr(expr) => {
                WorkflowExpr::default_of(convert_expression(expr)?, WorkflowExpr::Str("null".to_string()))
            }
        });
    }
    let mut iter = fragments.into_iter();
    let mut acc = iter.next().expect("non-empty checked above");
    for fragment in iter {
        acc = WorkflowExpr::Binary(Box::new(acc), BinaryOp::Add, Box::new(fragment));
    }
    Ok(acc)
}

// ── Member/call chain folding, including optional chaining (spec §4.1) ──

enum ChainLink<'a> {
    Access {
        property: &'a Expression,
        computed: bool,
        optional: bool,
    },
    Call {
        arguments: &'a [ast::CallArgument],
        optional: bool,
        span: Span,
    },
}

/// Walks down through nested `Member`/`Call`/`Chain` nodes to the innermost
/// non-chain base expression, returning the links in left-to-right order.
fn flatten_chain(expr: &Expression) -> (&Expression, Vec<ChainLink<'_>>) {
    match expr {
        Expression::Member {
            object,
            property,
            computed,
            optional,
            ..
        } => {
            let (base, mut links) = flatten_chain(object);
            links.push(ChainLink::Access {
                property,
                computed: *computed,
                optional: *optional,
            });
            (base, links)
        }
        Expression::Call {
            callee,
            arguments,
            optional,
            span,
        } => {
            let (base, mut links) = flatten_chain(callee);
            links.push(ChainLink::Call {
                arguments,
                optional: *optional,
                span: *span,
            });
            (base, links)
        }
        Expression::Chain(inner, _) => flatten_chain(inner),
        other => (other, Vec::new()),
    }
}

fn property_key_expr(property: &Expression, computed: bool) -> CompileResult<WorkflowExpr> {
    if computed {
        convert_expression(property)
    } else {
        match property {
            Expression::Identifier(name, _) => Ok(WorkflowExpr::Str(name.clone())),
            other => convert_expression(other),
        }
    }
}

fn convert_call_arguments(arguments: &[ast::CallArgument]) -> CompileResult<Vec<WorkflowExpr>> {
    let mut out = Vec::with_capacity(arguments.len());
    for arg in arguments {
        match arg {
            ast::CallArgument::Expression(e) => out.push(convert_expression(e)?),
            ast::CallArgument::Spread(_, span) => {
                return Err(CompileError::unsupported("spread arguments are not supported in calls", *span))
            }
        }
    }
    Ok(out)
}

fn convert_chain(expr: &Expression) -> CompileResult<WorkflowExpr> {
    let (base, links) = flatten_chain(expr);
    let mut result = convert_expression(base)?;
    let mut i = 0;
    while i < links.len() {
        match &links[i] {
            ChainLink::Call { arguments, optional, span } => {
                if *optional {
                    return Err(CompileError::unsupported("optional call invocation ('a?.()') is not supported", *span));
                }
                let callee = result.fully_qualified_name().ok_or_else(|| {
                    CompileError::unsupported("call target must be a fully-qualified name", *span)
                })?;
                let args = convert_call_arguments(arguments)?;
                result = WorkflowExpr::call(callee, args);
                i += 1;
            }
            ChainLink::Access {
                property,
                computed,
                optional,
            } => {
                if *optional {
                    // Group this optional access with every consecutive
                    // non-optional access that follows into one
                    // `map.get(object, [keys...])` call.
                    let mut keys = vec![property_key_expr(property, *computed)?];
                    i += 1;
                    while let Some(ChainLink::Access {
                        property,
                        computed,
                        optional: false,
                    }) = links.get(i)
                    {
                        keys.push(property_key_expr(property, *computed)?);
                        i += 1;
                    }
                    result = WorkflowExpr::call("map.get", vec![result, WorkflowExpr::Array(keys)]);
                } else {
                    let key = property_key_expr(property, *computed)?;
                    result = result.member(key, *computed);
                    i += 1;
                }
            }
        }
    }
    Ok(result)
}
