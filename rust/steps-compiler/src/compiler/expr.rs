//! The workflow expression model (spec §3.1): the tree the expression
//! converter folds surface expressions into, and that every step payload is
//! built from.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    And,
    Or,
    In,
}

/// One link in a `VariableReference`'s path: a constant field name, or a
/// computed subscript holding an arbitrary sub-expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathSegment {
    Field(String),
    Index(Box<WorkflowExpr>),
}

/// A dotted/bracketed name path, e.g. `a.b[expr].c`. Canonicalised to a
/// string for output by the serialiser adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableRef {
    pub base: String,
    pub segments: Vec<PathSegment>,
}

impl VariableRef {
    pub fn simple(name: impl Into<String>) -> Self {
        Self {
            base: name.into(),
            segments: Vec::new(),
        }
    }

    /// True iff every segment is a constant field access — the gate for
    /// appearing as an assignment target or as a `call_step` function name.
    pub fn is_fully_qualified(&self) -> bool {
        self.segments
            .iter()
            .all(|s| matches!(s, PathSegment::Field(_)))
    }

    /// The dotted name when fully qualified, e.g. `a.b.c`. Computed segments
    /// are rendered with their canonical form too, for diagnostics and for
    /// non-lvalue uses of a partially-computed reference.
    pub fn canonical(&self) -> String {
        let mut out = self.base.clone();
        for seg in &self.segments {
            match seg {
                PathSegment::Field(name) => {
                    out.push('.');
                    out.push_str(name);
                }
                PathSegment::Index(expr) => {
                    out.push('[');
                    out.push_str(&expr.canonical_hint());
                    out.push(']');
                }
            }
        }
        out
    }

    pub fn with_field(mut self, name: impl Into<String>) -> Self {
        self.segments.push(PathSegment::Field(name.into()));
        self
    }

    pub fn with_index(mut self, index: WorkflowExpr) -> Self {
        self.segments.push(PathSegment::Index(Box::new(index)));
        self
    }
}

/// `fn(args...)` where `fn` is a fully-qualified dotted name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionInvocation {
    pub callee: String,
    pub args: Vec<WorkflowExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorkflowExpr {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Vec<WorkflowExpr>),
    /// An ordered string-keyed mapping; order is preserved for deterministic
    /// output (this is not a `HashMap` on purpose).
    Map(Vec<(String, WorkflowExpr)>),
    VariableReference(VariableRef),
    Unary(UnaryOp, Box<WorkflowExpr>),
    Binary(Box<WorkflowExpr>, BinaryOp, Box<WorkflowExpr>),
    /// A member access that could not be folded into a `VariableReference`
    /// because its object is not itself a reference (e.g. `(a + b).x`).
    Member {
        object: Box<WorkflowExpr>,
        property: Box<WorkflowExpr>,
        computed: bool,
    },
    Call(FunctionInvocation),
}

impl WorkflowExpr {
    pub fn var(name: impl Into<String>) -> Self {
        WorkflowExpr::VariableReference(VariableRef::simple(name))
    }

    pub fn call(callee: impl Into<String>, args: Vec<WorkflowExpr>) -> Self {
        WorkflowExpr::Call(FunctionInvocation {
            callee: callee.into(),
            args,
        })
    }

    /// `default(value, fallback)`, used for `??`, template-literal
    /// interpolations, and default-valued destructuring positions.
    pub fn default_of(value: WorkflowExpr, fallback: WorkflowExpr) -> Self {
        WorkflowExpr::call("default", vec![value, fallback])
    }

    /// `if(test, consequent, alternate)`, used for the ternary rewrite.
    pub fn if_expr(test: WorkflowExpr, consequent: WorkflowExpr, alternate: WorkflowExpr) -> Self {
        WorkflowExpr::call("if", vec![test, consequent, alternate])
    }

    /// Appends a member access, folding into the existing `VariableReference`
    /// when possible, otherwise building an opaque `Member` node.
    pub fn member(self, property: WorkflowExpr, computed: bool) -> Self {
        match self {
            WorkflowExpr::VariableReference(vref) if !computed => {
                if let WorkflowExpr::Str(name) = property {
                    return WorkflowExpr::VariableReference(vref.with_field(name));
                }
                WorkflowExpr::Member {
                    object: Box::new(WorkflowExpr::VariableReference(vref)),
                    property: Box::new(property),
                    computed,
                }
            }
            WorkflowExpr::VariableReference(vref) if computed => {
                WorkflowExpr::VariableReference(vref.with_index(property))
            }
            other => WorkflowExpr::Member {
                object: Box::new(other),
                property: Box::new(property),
                computed,
            },
        }
    }

    /// A fully-qualified dotted name, if this expression is a
    /// `VariableReference` with no computed segments. Gates LHS-of-assignment
    /// and `call_step` callee positions.
    pub fn fully_qualified_name(&self) -> Option<String> {
        match self {
            WorkflowExpr::VariableReference(vref) if vref.is_fully_qualified() => {
                Some(vref.canonical())
            }
            _ => None,
        }
    }

    /// True for primitive scalars/containers whose elements are pure, and
    /// for variable references whose computed indices are themselves pure.
    /// Anything else (member chains with a non-reference base, calls,
    /// arithmetic) is *not* considered pure, matching spec §3.1 exactly.
    pub fn is_pure(&self) -> bool {
        match self {
            WorkflowExpr::Null | WorkflowExpr::Bool(_) | WorkflowExpr::Number(_) | WorkflowExpr::Str(_) => true,
            WorkflowExpr::Array(items) => items.iter().all(WorkflowExpr::is_pure),
            WorkflowExpr::Map(entries) => entries.iter().all(|(_, v)| v.is_pure()),
            WorkflowExpr::VariableReference(vref) => vref.segments.iter().all(|s| match s {
                PathSegment::Field(_) => true,
                PathSegment::Index(idx) => idx.is_pure(),
            }),
            _ => false,
        }
    }

    /// True iff the expression tree contains no identifiers (variable
    /// references) and no function invocations anywhere.
    pub fn is_literal(&self) -> bool {
        match self {
            WorkflowExpr::Null | WorkflowExpr::Bool(_) | WorkflowExpr::Number(_) | WorkflowExpr::Str(_) => true,
            WorkflowExpr::Array(items) => items.iter().all(WorkflowExpr::is_literal),
            WorkflowExpr::Map(entries) => entries.iter().all(|(_, v)| v.is_literal()),
            WorkflowExpr::VariableReference(_) => false,
            WorkflowExpr::Unary(_, operand) => operand.is_literal(),
            WorkflowExpr::Binary(l, _, r) => l.is_literal() && r.is_literal(),
            WorkflowExpr::Member {
                object, property, ..
            } => object.is_literal() && property.is_literal(),
            WorkflowExpr::Call(_) => false,
        }
    }

    /// A best-effort human-readable rendering, used only for diagnostics and
    /// for canonicalising computed segments inside another reference's path.
    pub fn canonical_hint(&self) -> String {
        match self {
            WorkflowExpr::Null => "null".to_string(),
            WorkflowExpr::Bool(b) => b.to_string(),
            WorkflowExpr::Number(n) => n.to_string(),
            WorkflowExpr::Str(s) => format!("\"{s}\""),
            WorkflowExpr::VariableReference(vref) => vref.canonical(),
            WorkflowExpr::Call(call) => format!("{}(...)", call.callee),
            _ => "<expr>".to_string(),
        }
    }
}
