//! The lowering pipeline's single error type (spec §7).

use crate::compiler::span::Span;
use std::fmt;
use thiserror::Error;

/// The error taxonomy from spec §7. Every lowering failure is tagged with
/// exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    /// AST node kind or operator not supported by this subset.
    Unsupported,
    /// Non-string, non-identifier object-literal key.
    InvalidMapKey,
    /// Assignment LHS is not a fully-qualified name or destructuring pattern.
    InvalidLValue,
    /// Malformed `parallel(...)` arguments.
    InvalidParallel,
    /// Malformed `retry_policy(...)` arguments.
    InvalidRetryPolicy,
    /// Malformed destructuring pattern.
    InvalidDestructuring,
    /// `break`/`continue` that cannot be routed (inside try/finally, or
    /// unresolved after jump resolution).
    ControlFlow,
    /// Invariant violation. Should never fire on well-typed input.
    Internal,
}

impl fmt::Display for SyntaxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyntaxKind::Unsupported => "unsupported construct",
            SyntaxKind::InvalidMapKey => "invalid map key",
            SyntaxKind::InvalidLValue => "invalid assignment target",
            SyntaxKind::InvalidParallel => "invalid parallel() call",
            SyntaxKind::InvalidRetryPolicy => "invalid retry_policy() call",
            SyntaxKind::InvalidDestructuring => "invalid destructuring pattern",
            SyntaxKind::ControlFlow => "invalid control flow",
            SyntaxKind::Internal => "internal compiler error",
        };
        f.write_str(s)
    }
}

/// A single lowering failure: one human-readable message plus a source
/// location. The core never recovers from one — the API returns the first.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{kind}: {message}")]
pub struct CompileError {
    pub kind: SyntaxKind,
    pub message: String,
    pub span: Span,
}

impl CompileError {
    pub fn new(kind: SyntaxKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }

    pub fn unsupported(message: impl Into<String>, span: Span) -> Self {
        Self::new(SyntaxKind::Unsupported, message, span)
    }

    pub fn invalid_map_key(message: impl Into<String>, span: Span) -> Self {
        Self::new(SyntaxKind::InvalidMapKey, message, span)
    }

    pub fn invalid_lvalue(message: impl Into<String>, span: Span) -> Self {
        Self::new(SyntaxKind::InvalidLValue, message, span)
    }

    pub fn invalid_parallel(message: impl Into<String>, span: Span) -> Self {
        Self::new(SyntaxKind::InvalidParallel, message, span)
    }

    pub fn invalid_retry_policy(message: impl Into<String>, span: Span) -> Self {
        Self::new(SyntaxKind::InvalidRetryPolicy, message, span)
    }

    pub fn invalid_destructuring(message: impl Into<String>, span: Span) -> Self {
        Self::new(SyntaxKind::InvalidDestructuring, message, span)
    }

    pub fn control_flow(message: impl Into<String>, span: Span) -> Self {
        Self::new(SyntaxKind::ControlFlow, message, span)
    }

    pub fn internal(message: impl Into<String>, span: Span) -> Self {
        Self::new(SyntaxKind::Internal, message, span)
    }
}

pub type CompileResult<T> = Result<T, CompileError>;
