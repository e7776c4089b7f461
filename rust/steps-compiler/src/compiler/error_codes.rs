//! Stable error codes for `CompileError`.
//!
//! This crate has no lexer, parser, typechecker or ownership pass — every
//! error originates in the lowering pipeline, so the whole `E05xx` range
//! (reserved for lowering errors in the sibling `lumen-compiler` lineage
//! this crate is descended from) is subdivided here by `SyntaxKind`:
//!
//!   E0500–E0519  Unsupported syntax
//!   E0520–E0529  Invalid lvalue / map key
//!   E0530–E0539  Destructuring errors
//!   E0540–E0549  Parallel lowering errors
//!   E0550–E0559  Retry policy errors
//!   E0560–E0569  Control flow errors
//!   E0590–E0599  Internal invariant violations

use crate::compiler::error::{CompileError, SyntaxKind};

pub fn code(error: &CompileError) -> &'static str {
    syntax_kind_code(error.kind)
}

pub fn syntax_kind_code(kind: SyntaxKind) -> &'static str {
    match kind {
        SyntaxKind::Unsupported => "E0500",
        SyntaxKind::InvalidMapKey => "E0520",
        SyntaxKind::InvalidLValue => "E0521",
        SyntaxKind::InvalidDestructuring => "E0530",
        SyntaxKind::InvalidParallel => "E0540",
        SyntaxKind::InvalidRetryPolicy => "E0550",
        SyntaxKind::ControlFlow => "E0560",
        SyntaxKind::Internal => "E0590",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique() {
        let kinds = [
            SyntaxKind::Unsupported,
            SyntaxKind::InvalidMapKey,
            SyntaxKind::InvalidLValue,
            SyntaxKind::InvalidDestructuring,
            SyntaxKind::InvalidParallel,
            SyntaxKind::InvalidRetryPolicy,
            SyntaxKind::ControlFlow,
            SyntaxKind::Internal,
        ];
        let mut codes: Vec<&str> = kinds.iter().map(|k| syntax_kind_code(*k)).collect();
        let before = codes.len();
        codes.sort();
        codes.dedup();
        assert_eq!(before, codes.len());
    }
}
