//! Rich error diagnostics with source snippets and colors.

use crate::compiler::error::{CompileError, SyntaxKind};
use crate::compiler::error_codes;

/// Severity level for diagnostics. The core only ever emits `Error`, but the
/// type carries `Warning`/`Note` so the renderer can be reused for the
/// informational output the CLI prints around a successful compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// A rendered diagnostic with source context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: &'static str,
    pub message: String,
    pub line: usize,
    pub col: usize,
    pub source_line: Option<String>,
    pub underline: Option<String>,
}

impl Diagnostic {
    pub fn render_ansi(&self, filename: &str) -> String {
        let mut out = String::new();
        let category = match self.severity {
            Severity::Error => category_for(self.code),
            Severity::Warning => "WARNING",
            Severity::Note => "NOTE",
        };
        let location = format!(" {filename}:{}:{} ", self.line, self.col);
        let title_width = 80usize;
        let dashes = title_width.saturating_sub(category.len() + location.len() + 6);
        out.push_str(&cyan(&format!("── {category} {}", "─".repeat(dashes))));
        out.push_str(&cyan(&location));
        out.push_str(&cyan("──\n\n"));
        out.push_str(&format!("{} [{}]\n\n", self.message, self.code));

        if let (Some(line_text), Some(underline)) = (&self.source_line, &self.underline) {
            let line_str = self.line.to_string();
            out.push_str(&format!("  {} │ {}\n", gray(&line_str), line_text));
            out.push_str(&format!(
                "  {} │ {}\n",
                " ".repeat(line_str.len()),
                red(underline)
            ));
        }
        out.push('\n');
        out
    }
}

fn category_for(code: &str) -> &'static str {
    match code {
        "E0500" => "UNSUPPORTED SYNTAX",
        "E0520" => "INVALID MAP KEY",
        "E0521" => "INVALID LVALUE",
        "E0530" => "DESTRUCTURING ERROR",
        "E0540" => "PARALLEL ERROR",
        "E0550" => "RETRY POLICY ERROR",
        "E0560" => "CONTROL FLOW ERROR",
        _ => "LOWERING ERROR",
    }
}

/// Turn a `CompileError` into a renderable `Diagnostic` against the original
/// source text (used only for presentation — the core never re-parses).
pub fn format_compile_error(error: &CompileError, source: &str) -> Diagnostic {
    let line = error.span.start.line;
    let col = error.span.start.column;
    let source_line = get_source_line(source, line);
    let underline = source_line.as_ref().map(|_| make_underline(col, 1));
    Diagnostic {
        severity: Severity::Error,
        code: error_codes::code(error),
        message: explain(error),
        line,
        col,
        source_line,
        underline,
    }
}

fn explain(error: &CompileError) -> String {
    match error.kind {
        SyntaxKind::Unsupported => format!("unsupported construct: {}", error.message),
        SyntaxKind::InvalidMapKey => format!("invalid object-literal key: {}", error.message),
        SyntaxKind::InvalidLValue => format!("invalid assignment target: {}", error.message),
        SyntaxKind::InvalidParallel => format!("invalid parallel() call: {}", error.message),
        SyntaxKind::InvalidRetryPolicy => format!("invalid retry_policy() call: {}", error.message),
        SyntaxKind::InvalidDestructuring => format!("invalid destructuring pattern: {}", error.message),
        SyntaxKind::ControlFlow => format!("invalid control flow: {}", error.message),
        SyntaxKind::Internal => format!("internal compiler error: {}", error.message),
    }
}

fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}

fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

fn gray(s: &str) -> String {
    format!("\x1b[90m{s}\x1b[0m")
}

fn get_source_line(source: &str, line: usize) -> Option<String> {
    source.lines().nth(line.saturating_sub(1)).map(str::to_string)
}

fn make_underline(col: usize, len: usize) -> String {
    format!("{}{}", " ".repeat(col.saturating_sub(1)), "^".repeat(len.max(1)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::span::{Position, Span};

    #[test]
    fn renders_a_lowering_error() {
        let err = CompileError::unsupported(
            "var declarations",
            Span::new(Position { line: 2, column: 5 }, Position { line: 2, column: 8 }),
        );
        let rendered = format_compile_error(&err, "function main() {\n  var x = 1;\n}");
        assert_eq!(rendered.code, "E0500");
        assert_eq!(rendered.line, 2);
        assert!(rendered.render_ansi("main.js").contains("UNSUPPORTED SYNTAX"));
    }
}
