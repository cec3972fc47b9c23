use anyhow::{Context, Result};
use indoc::indoc;

use kbc::compiler::{self, CompileError};
use kbc::interpreter::{Execution, Interpreter, Number, RuntimeError, Value};
use kbc::parser::ParseError;

fn run_program(source: &str, input_values: &[i64]) -> Result<Execution> {
    let compilation = compiler::compile(source).context("compiling program")?;
    let mut interpreter = Interpreter::new();
    interpreter.set_input_values(input_values.to_vec());
    interpreter
        .run(&compilation.rpn, &compilation.symbols)
        .context("running program")
}

fn run_err(source: &str, input_values: &[i64]) -> RuntimeError {
    let compilation = compiler::compile(source).expect("compile should succeed");
    let mut interpreter = Interpreter::new();
    interpreter.set_input_values(input_values.to_vec());
    interpreter
        .run(&compilation.rpn, &compilation.symbols)
        .expect_err("expected runtime failure")
}

fn scalar(value: i64) -> Value {
    Value::Scalar(Number::Int(value))
}

#[test]
fn evaluates_arithmetic_initialiser() -> Result<()> {
    let execution = run_program("int x = 2 + 3 * 4; output x;", &[])?;
    assert_eq!(execution.output, vec![Number::Int(14)]);
    assert_eq!(execution.symbols.get("x"), Some(&scalar(14)));
    Ok(())
}

#[test]
fn reads_scalar_from_input_supply() -> Result<()> {
    let execution = run_program("int a; input a; output a;", &[7])?;
    assert_eq!(execution.output, vec![Number::Int(7)]);
    assert_eq!(execution.symbols.get("a"), Some(&scalar(7)));
    Ok(())
}

#[test]
fn indexes_array_built_from_initialiser_list() -> Result<()> {
    let execution = run_program("int [] v = {10, 20, 30}; output v[1];", &[])?;
    assert_eq!(execution.output, vec![Number::Int(20)]);
    assert_eq!(
        execution.symbols.get("v"),
        Some(&Value::Array(vec![
            Number::Int(10),
            Number::Int(20),
            Number::Int(30)
        ]))
    );
    Ok(())
}

#[test]
fn sums_with_while_loop() -> Result<()> {
    let source = indoc! {"
        int n = 0;
        int i = 1;
        while (i < 4) {
            n = n + i;
            i = i + 1;
        }
        output n;
    "};
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(6)]);
    assert_eq!(execution.symbols.get("n"), Some(&scalar(6)));
    assert_eq!(execution.symbols.get("i"), Some(&scalar(4)));
    Ok(())
}

#[test]
fn takes_then_branch_on_equality() -> Result<()> {
    let source = "int x = 5; if (x ? 5) { output 1; } else { output 0; }";
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(1)]);
    Ok(())
}

#[test]
fn takes_else_branch_on_failed_equality() -> Result<()> {
    let source = "int x = 4; if (x ? 5) { output 1; } else { output 0; }";
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(0)]);
    Ok(())
}

#[test]
fn assigns_array_elements_through_indexing() -> Result<()> {
    let source = indoc! {"
        int [3] a;
        a[0] = 1;
        a[1] = 2;
        a[2] = a[0] + a[1];
        output a[2];
    "};
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(3)]);
    Ok(())
}

#[test]
fn empty_program_produces_empty_results() -> Result<()> {
    let execution = run_program("", &[])?;
    assert!(execution.output.is_empty());
    assert!(execution.symbols.is_empty());
    Ok(())
}

#[test]
fn while_with_false_condition_runs_zero_iterations() -> Result<()> {
    let source = "int x = 9; while (x < 0) { x = 0; } output x;";
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(9)]);
    assert_eq!(execution.symbols.get("x"), Some(&scalar(9)));
    Ok(())
}

#[test]
fn if_without_else_skips_block_on_false_condition() -> Result<()> {
    let source = "int x; if (x > 0) { output 1; } output 2;";
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(2)]);
    Ok(())
}

#[test]
fn nested_control_flow_resolves_all_jumps() -> Result<()> {
    let source = indoc! {"
        int i = 0;
        int odd = 0;
        int even = 0;
        while (i < 5) {
            if (i / 2 * 2 ? i) {
                even = even + 1;
            } else {
                odd = odd + 1;
            }
            i = i + 1;
        }
        output even;
        output odd;
    "};
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(3), Number::Int(2)]);
    Ok(())
}

#[test]
fn logical_operators_produce_flags() -> Result<()> {
    let source = "int x = 3; output x > 1 & x < 5; output x ! 3 | 0;";
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(1), Number::Int(0)]);
    Ok(())
}

#[test]
fn dynamic_array_size_comes_from_expression() -> Result<()> {
    let source = indoc! {"
        int n = 2;
        int [n + 1] a;
        a[2] = 5;
        output a[2];
        output a[0];
    "};
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(5), Number::Int(0)]);
    Ok(())
}

#[test]
fn fills_array_from_input_supply() -> Result<()> {
    let source = indoc! {"
        int [3] a;
        int i = 0;
        while (i < 3) {
            input a[i];
            i = i + 1;
        }
        output a[0] + a[1] + a[2];
    "};
    let execution = run_program(source, &[4, 5, 6])?;
    assert_eq!(execution.output, vec![Number::Int(15)]);
    Ok(())
}

#[test]
fn mixed_arithmetic_promotes_to_float() -> Result<()> {
    let source = "float f = 1.5; int x = 2; output f * x;";
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Float(3.0)]);
    Ok(())
}

#[test]
fn unary_minus_negates_operand() -> Result<()> {
    let source = "int x = ~3; output x; output ~x;";
    let execution = run_program(source, &[])?;
    assert_eq!(execution.output, vec![Number::Int(-3), Number::Int(3)]);
    Ok(())
}

#[test]
fn interpretation_is_idempotent() -> Result<()> {
    let source = indoc! {"
        int a;
        input a;
        int b = a * 2;
        output b;
    "};
    let compilation = compiler::compile(source)?;
    let mut interpreter = Interpreter::new();
    interpreter.set_input_values(vec![21]);
    let first = interpreter.run(&compilation.rpn, &compilation.symbols)?;
    let second = interpreter.run(&compilation.rpn, &compilation.symbols)?;
    assert_eq!(first, second);
    assert_eq!(first.output, vec![Number::Int(42)]);
    Ok(())
}

#[test]
fn compilation_is_deterministic() -> Result<()> {
    let source = "int x; while (x < 3) { x = x + 1; } output x;";
    let first = compiler::compile(source)?;
    let second = compiler::compile(source)?;
    assert_eq!(first.rpn, second.rpn);
    Ok(())
}

#[test]
fn lexical_error_reports_offending_character() {
    let err = compiler::compile("int x = #;").expect_err("expected compile failure");
    assert!(matches!(err, CompileError::Lex(_)));
    assert!(err.to_string().contains("Unknown character '#'"));
}

#[test]
fn syntax_error_reports_expected_set() {
    let err = compiler::compile("output ;").expect_err("expected compile failure");
    match err {
        CompileError::Parse(ParseError::UnexpectedToken { expected, .. }) => {
            assert!(expected.contains("identifier"));
        }
        other => panic!("expected UnexpectedToken, got {other:?}"),
    }
}

#[test]
fn redeclaration_is_a_compile_error() {
    let err = compiler::compile("int x; int [2] x;").expect_err("expected compile failure");
    assert!(matches!(
        err,
        CompileError::Parse(ParseError::Redeclaration { .. })
    ));
}

#[test]
fn out_of_bounds_index_fails_with_context() {
    let err = run_err("int [2] a; output a[2];", &[]);
    assert_eq!(
        err,
        RuntimeError::IndexOutOfBounds {
            name: "a".to_string(),
            index: 2,
            len: 2
        }
    );
}

#[test]
fn division_by_zero_fails_at_runtime() {
    let err = run_err("int x = 1; int y; output x / y;", &[]);
    assert_eq!(err, RuntimeError::DivisionByZero);
}

#[test]
fn undeclared_assignment_target_fails_at_runtime() {
    let err = run_err("int x; y = 1;", &[]);
    assert_eq!(
        err,
        RuntimeError::UndefinedVariable {
            name: "y".to_string()
        }
    );
}

#[test]
fn non_positive_dynamic_size_fails_at_runtime() {
    let err = run_err("int n; int [n] a;", &[]);
    assert_eq!(
        err,
        RuntimeError::ArraySizeNotPositive {
            size: Number::Int(0)
        }
    );
}
