use serde::{Deserialize, Serialize};

/// Source location of an input AST node, `{line, column}` pairs per spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn dummy() -> Self {
        Self::default()
    }

    pub fn merge(self, other: Span) -> Span {
        let start = if (self.start.line, self.start.column) <= (other.start.line, other.start.column) {
            self.start
        } else {
            other.start
        };
        let end = if (self.end.line, self.end.column) >= (other.end.line, other.end.column) {
            self.end
        } else {
            other.end
        };
        Span { start, end }
    }
}
