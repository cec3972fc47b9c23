use thiserror::Error;

use crate::lexer::{self, LexError};
use crate::parser::{self, ParseError};
use crate::rpn::RpnProgram;
use crate::symbol_table::SymbolTable;
use crate::token::Token;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Staged artifacts of one compilation: the token stream, the instruction
/// stream, and the declaration-time symbol table.
#[derive(Debug, Clone)]
pub struct Compilation {
    pub tokens: Vec<Token>,
    pub rpn: RpnProgram,
    pub symbols: SymbolTable,
}

/// Runs the frontend: source text through the lexer and the predictive
/// parser. Fails fast on the first lexical or syntactic error.
pub fn compile(source: &str) -> Result<Compilation, CompileError> {
    let tokens = lexer::tokenize(source)?;
    let (rpn, symbols) = parser::parse(tokens.clone())?;
    Ok(Compilation {
        tokens,
        rpn,
        symbols,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surfaces_lexical_errors() {
        let err = compile("int x = @;").expect_err("expected compile failure");
        assert!(matches!(err, CompileError::Lex(_)));
    }

    #[test]
    fn surfaces_syntax_errors() {
        let err = compile("int = 5;").expect_err("expected compile failure");
        assert!(matches!(err, CompileError::Parse(_)));
    }

    #[test]
    fn keeps_staged_artifacts() {
        let compilation = compile("int x = 1;").expect("compile should succeed");
        assert_eq!(compilation.tokens.len(), 6);
        assert_eq!(compilation.rpn.len(), 3);
        assert!(compilation.symbols.contains("x"));
    }
}
