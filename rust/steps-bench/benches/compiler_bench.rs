//! Criterion benchmarks for the workflow-steps compiler pipeline.
//!
//! There is no parser front end in this crate (the input contract is an
//! already-parsed JSON AST), so the corpus is generated in-process instead
//! of loaded from source files: each size bucket is a synthetic function
//! body of a given statement count, built the same shape a real generated
//! workflow tends to have (a run of variable declarations ending in a
//! conditional and a return).

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use workflow_steps_compiler::compiler::ast::{
    BinaryOperator, BlockStatement, Expression, FunctionDeclaration, Literal, Pattern, Program, Statement, VariableDeclaration,
    VariableDeclarator, VariableKind,
};
use workflow_steps_compiler::compiler::span::Span;
use workflow_steps_compiler::{compile, CompileOptions};

fn ident(name: &str) -> Expression {
    Expression::Identifier(name.to_string(), Span::dummy())
}

fn num(n: f64) -> Expression {
    Expression::Literal(Literal::Number(n), Span::dummy())
}

fn let_decl(name: &str, value: Expression) -> Statement {
    Statement::VariableDeclaration(VariableDeclaration {
        kind: VariableKind::Let,
        declarations: vec![VariableDeclarator {
            id: Pattern::Identifier(name.to_string(), Span::dummy()),
            init: Some(value),
            span: Span::dummy(),
        }],
        span: Span::dummy(),
    })
}

/// A function body of `n` sequential declarations, an `if` over the last
/// one, and a `return`.
fn synthetic_function(name: &str, n: usize) -> FunctionDeclaration {
    let mut body = Vec::with_capacity(n + 2);
    for i in 0..n {
        let value = if i == 0 { num(i as f64) } else { ident(&format!("v{}", i - 1)) };
        body.push(let_decl(&format!("v{i}"), value));
    }
    let last = format!("v{}", n.saturating_sub(1));
    body.push(Statement::If {
        test: Expression::Binary {
            left: Box::new(ident(&last)),
            operator: BinaryOperator::Gt,
            right: Box::new(num(0.0)),
            span: Span::dummy(),
        },
        consequent: Box::new(Statement::Return {
            argument: Some(ident(&last)),
            span: Span::dummy(),
        }),
        alternate: None,
        span: Span::dummy(),
    });
    body.push(Statement::Return {
        argument: Some(num(0.0)),
        span: Span::dummy(),
    });

    FunctionDeclaration {
        name: name.to_string(),
        params: vec![],
        body: BlockStatement { body, span: Span::dummy() },
        span: Span::dummy(),
    }
}

fn synthetic_program(n: usize) -> Program {
    Program {
        body: vec![synthetic_function("bench", n)],
        span: Span::dummy(),
    }
}

/// Read peak RSS from /proc/self/status (Linux only).
#[cfg(target_os = "linux")]
fn peak_rss_kb() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    for line in status.lines() {
        if line.starts_with("VmHWM:") {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() >= 2 {
                return parts[1].parse::<u64>().ok();
            }
        }
    }
    None
}

#[cfg(not(target_os = "linux"))]
fn peak_rss_kb() -> Option<u64> {
    None
}

fn bench_compile(c: &mut Criterion) {
    let sizes = [("tiny", 5usize), ("small", 50), ("medium", 500), ("large", 5000)];

    let mut group = c.benchmark_group("compile");
    for (label, n) in &sizes {
        let program = synthetic_program(*n);
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::new("statements_per_sec", label), &program, |b, program| {
            b.iter(|| {
                let options = CompileOptions::default();
                let result = compile(black_box(program), &options);
                black_box(result).expect("synthetic program always compiles");
            });
        });
    }

    if let Some(rss) = peak_rss_kb() {
        eprintln!("[compile] Peak RSS after benchmarks: {} kB", rss);
    }

    group.finish();
}

fn bench_lower_only(c: &mut Criterion) {
    let sizes = [("tiny", 5usize), ("medium", 500)];

    let mut group = c.benchmark_group("lower");
    for (label, n) in &sizes {
        let program = synthetic_program(*n);
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::new("statements_per_sec", label), &program, |b, program| {
            b.iter(|| {
                let blocking = workflow_steps_compiler::compiler::config::BlockingFunctions::defaults();
                let result = workflow_steps_compiler::compiler::lower::lower_program(black_box(program), &blocking);
                black_box(result).expect("synthetic program always lowers");
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_compile, bench_lower_only);
criterion_main!(benches);
