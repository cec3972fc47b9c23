use std::fs;

use anyhow::{Context, Result, bail};
use kbc::compiler;
use kbc::interpreter::Interpreter;

fn main() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("Usage: kbc <source.kb> [input-value ...]");
    };
    let mut input_values = Vec::new();
    for arg in args {
        let value = arg
            .parse::<i64>()
            .with_context(|| format!("Input value '{arg}' is not an integer"))?;
        input_values.push(value);
    }

    let source = fs::read_to_string(&path).with_context(|| format!("Reading {path}"))?;
    let compilation = compiler::compile(&source)?;

    println!("--- Tokens ---");
    for token in &compilation.tokens {
        println!("{:>3} {token}", token.kind.code());
    }

    println!("--- RPN ---");
    for (index, item) in compilation.rpn.items().iter().enumerate() {
        println!("{index}: {item}");
    }

    let mut interpreter = Interpreter::new();
    interpreter.set_input_values(input_values);
    let execution = interpreter.run(&compilation.rpn, &compilation.symbols)?;

    println!("--- Output ---");
    for value in &execution.output {
        println!("{value}");
    }

    println!("--- Symbol table ---");
    for (name, value) in &execution.symbols {
        println!("{name}: {value}");
    }

    Ok(())
}
