//! workflow-steps-compiler
//!
//! Lowers a statically-typed JavaScript-like surface AST into a step-graph
//! workflow program: `compile` runs the whole pipeline (statement lowering,
//! adjacent-assign merge, step naming, jump resolution) and hands back a
//! resolved `compiler::step::Program` ready for a `Serializer`.

pub mod compiler;
pub mod diagnostics;

use compiler::config::BlockingFunctions;
use compiler::error::CompileResult;
use compiler::step::Program;
use tracing::instrument;

/// Options controlling the compile pipeline (spec §6 ambient config).
///
/// `strict_fully_qualified` has no defined behavior beyond the default in
/// this subset of the pipeline; it is carried so callers can opt a future
/// strictness pass in without a breaking change to the public API.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Fully-qualified name → parameter-name table for blocking calls.
    /// Default: the curated table from spec §6 (`http.get`, `http.post`,
    /// `sys.log`, `sys.get_env`).
    pub blocking_functions: BlockingFunctions,
    /// Reserved for a future pass that rejects non-fully-qualified call
    /// targets outright instead of lowering them as plain expressions.
    pub strict_fully_qualified: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            blocking_functions: BlockingFunctions::defaults(),
            strict_fully_qualified: false,
        }
    }
}

/// Runs the full pipeline over a parsed surface AST: lowering, adjacent-assign
/// merge, naming, then jump resolution, per sub-workflow.
#[instrument(skip_all)]
pub fn compile(program: &compiler::ast::Program, options: &CompileOptions) -> CompileResult<Program> {
    let lowered = compiler::lower::lower_program(program, &options.blocking_functions)?;
    let mut sub_workflows = Vec::with_capacity(lowered.sub_workflows.len());
    for sub in lowered.sub_workflows {
        sub_workflows.push(compile_sub_workflow(sub)?);
    }
    Ok(Program { sub_workflows })
}

#[instrument(skip_all, fields(name = %sub.name))]
fn compile_sub_workflow(sub: compiler::step::SubWorkflow) -> CompileResult<compiler::step::SubWorkflow> {
    let steps = compiler::transform::merge_adjacent_assigns(sub.steps);
    let mut steps = steps;
    compiler::naming::assign_names(&mut steps);
    let steps = resolve_jumps(steps)?;
    Ok(compiler::step::SubWorkflow { steps, ..sub })
}

#[instrument(skip_all)]
fn resolve_jumps(steps: Vec<compiler::step::Step>) -> CompileResult<Vec<compiler::step::Step>> {
    compiler::jump_resolve::resolve_jumps(steps)
}

/// Render a `CompileError` with source context for terminal display, per
/// spec §7's "a location" requirement surfaced as a readable diagnostic.
pub fn format_error(error: &compiler::error::CompileError, source: &str, filename: &str) -> String {
    diagnostics::format_compile_error(error, source).render_ansi(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use compiler::ast::{BlockStatement, FunctionDeclaration, Literal, Pattern, Program as AstProgram, Statement};
    use compiler::span::Span;

    fn simple_program() -> AstProgram {
        AstProgram {
            body: vec![FunctionDeclaration {
                name: "main".to_string(),
                params: vec![Pattern::Identifier("input".to_string(), Span::dummy())],
                body: BlockStatement {
                    body: vec![Statement::Return {
                        argument: Some(compiler::ast::Expression::Literal(Literal::Number(1.0), Span::dummy())),
                        span: Span::dummy(),
                    }],
                    span: Span::dummy(),
                },
                span: Span::dummy(),
            }],
            span: Span::dummy(),
        }
    }

    #[test]
    fn compiles_a_trivial_function_to_one_named_sub_workflow() {
        let program = compile(&simple_program(), &CompileOptions::default()).unwrap();
        assert_eq!(program.sub_workflows.len(), 1);
        let sub = &program.sub_workflows[0];
        assert_eq!(sub.name, "main");
        assert_eq!(sub.params, vec!["input".to_string()]);
        assert_eq!(sub.steps.len(), 1);
        assert!(sub.steps[0].label.is_some());
    }

    #[test]
    fn yaml_serializer_renders_a_compiled_program() {
        let program = compile(&simple_program(), &CompileOptions::default()).unwrap();
        let yaml = compiler::serialize::YamlSerializer.serialize(&program);
        assert!(yaml.contains("main:"));
    }
}
