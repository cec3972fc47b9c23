use thiserror::Error;

use crate::token::{Token, TokenKind};

/// States of the scanning automaton. `Start` sits between tokens; the other
/// states accumulate a lexeme in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Ident,
    Integer,
    FractionDot,
    Fraction,
}

enum StepOutcome {
    /// Consume the current character and move on.
    Advance,
    /// Keep the current character and re-process it in the new state.
    Hold,
    /// End of input reached; the token list is complete.
    Halt,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("Unknown character '{character}' at line {line}, column {column}")]
    UnexpectedCharacter {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Invalid character '{character}' after identifier at line {line}, column {column}")]
    InvalidAfterIdentifier {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Invalid character '{character}' after integer at line {line}, column {column}")]
    InvalidAfterInteger {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Digit expected after decimal point at line {line}, column {column}")]
    DigitExpectedAfterPoint { line: usize, column: usize },
    #[error("Invalid character '{character}' after fraction at line {line}, column {column}")]
    InvalidAfterFraction {
        character: char,
        line: usize,
        column: usize,
    },
    #[error("Integer literal '{literal}' out of range at line {line}, column {column}")]
    IntegerOutOfRange {
        literal: String,
        line: usize,
        column: usize,
    },
}

pub type LexResult<T> = Result<T, LexError>;

fn keyword_kind(text: &str) -> Option<TokenKind> {
    let kind = match text {
        "int" => TokenKind::Int,
        "float" => TokenKind::Float,
        "if" => TokenKind::If,
        "else" => TokenKind::Else,
        "while" => TokenKind::While,
        "output" => TokenKind::Output,
        "input" => TokenKind::Input,
        _ => return None,
    };
    Some(kind)
}

fn punct_kind(c: char) -> Option<TokenKind> {
    let kind = match c {
        '(' => TokenKind::LParen,
        ')' => TokenKind::RParen,
        '[' => TokenKind::LSquare,
        ']' => TokenKind::RSquare,
        '{' => TokenKind::LCurly,
        '}' => TokenKind::RCurly,
        ';' => TokenKind::Semicolon,
        ',' => TokenKind::Comma,
        '.' => TokenKind::Dot,
        '+' => TokenKind::Plus,
        '-' => TokenKind::Minus,
        '*' => TokenKind::Multiply,
        '/' => TokenKind::Divide,
        '=' => TokenKind::Assign,
        '<' => TokenKind::Lt,
        '>' => TokenKind::Gt,
        '!' => TokenKind::Neq,
        '?' => TokenKind::Eq,
        '&' => TokenKind::And,
        '|' => TokenKind::Or,
        '~' => TokenKind::UnaryMinus,
        _ => return None,
    };
    Some(kind)
}

pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    state: State,
    buffer: String,
    start_line: usize,
    start_column: usize,
    tokens: Vec<Token>,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        // The sentinel lets every accepting state flush its token from a
        // plain transition instead of a separate end-of-input path.
        let mut chars: Vec<char> = input.chars().collect();
        chars.push('\0');
        Self {
            chars,
            pos: 0,
            line: 1,
            column: 1,
            state: State::Start,
            buffer: String::new(),
            start_line: 1,
            start_column: 1,
            tokens: Vec::new(),
        }
    }

    pub fn run(mut self) -> LexResult<Vec<Token>> {
        while self.pos < self.chars.len() {
            let c = self.chars[self.pos];
            let outcome = match self.state {
                State::Start => self.step_start(c)?,
                State::Ident => self.step_ident(c)?,
                State::Integer => self.step_integer(c)?,
                State::FractionDot => self.step_fraction_dot(c)?,
                State::Fraction => self.step_fraction(c)?,
            };
            match outcome {
                StepOutcome::Advance => {
                    if c == '\n' {
                        self.line += 1;
                        self.column = 1;
                    } else {
                        self.column += 1;
                    }
                    self.pos += 1;
                }
                StepOutcome::Hold => {}
                StepOutcome::Halt => break,
            }
        }
        Ok(self.tokens)
    }

    fn step_start(&mut self, c: char) -> LexResult<StepOutcome> {
        self.start_line = self.line;
        self.start_column = self.column;

        if c.is_alphabetic() {
            self.buffer.push(c);
            self.state = State::Ident;
            return Ok(StepOutcome::Advance);
        }
        if c.is_ascii_digit() {
            self.buffer.push(c);
            self.state = State::Integer;
            return Ok(StepOutcome::Advance);
        }
        if let Some(kind) = punct_kind(c) {
            self.emit(kind, c.to_string());
            return Ok(StepOutcome::Advance);
        }
        match c {
            ' ' | '\t' | '\n' | '\r' => Ok(StepOutcome::Advance),
            '\0' => {
                self.tokens.push(Token::eof(self.line, self.column));
                Ok(StepOutcome::Halt)
            }
            _ => Err(LexError::UnexpectedCharacter {
                character: c,
                line: self.line,
                column: self.column,
            }),
        }
    }

    fn step_ident(&mut self, c: char) -> LexResult<StepOutcome> {
        if c.is_alphanumeric() {
            self.buffer.push(c);
            return Ok(StepOutcome::Advance);
        }
        if c == '.' || c == '~' {
            return Err(LexError::InvalidAfterIdentifier {
                character: c,
                line: self.line,
                column: self.column,
            });
        }
        let text = std::mem::take(&mut self.buffer);
        let kind = keyword_kind(&text).unwrap_or(TokenKind::Identifier);
        self.emit(kind, text);
        self.state = State::Start;
        Ok(StepOutcome::Hold)
    }

    fn step_integer(&mut self, c: char) -> LexResult<StepOutcome> {
        if c.is_ascii_digit() {
            self.buffer.push(c);
            return Ok(StepOutcome::Advance);
        }
        if c == '.' {
            self.buffer.push(c);
            self.state = State::FractionDot;
            return Ok(StepOutcome::Advance);
        }
        if c.is_alphabetic() || c == '{' || c == '~' {
            return Err(LexError::InvalidAfterInteger {
                character: c,
                line: self.line,
                column: self.column,
            });
        }
        let text = std::mem::take(&mut self.buffer);
        if text.parse::<i64>().is_err() {
            return Err(LexError::IntegerOutOfRange {
                literal: text,
                line: self.start_line,
                column: self.start_column,
            });
        }
        self.emit(TokenKind::IntegerConst, text);
        self.state = State::Start;
        Ok(StepOutcome::Hold)
    }

    fn step_fraction_dot(&mut self, c: char) -> LexResult<StepOutcome> {
        if c.is_ascii_digit() {
            self.buffer.push(c);
            self.state = State::Fraction;
            return Ok(StepOutcome::Advance);
        }
        Err(LexError::DigitExpectedAfterPoint {
            line: self.line,
            column: self.column,
        })
    }

    fn step_fraction(&mut self, c: char) -> LexResult<StepOutcome> {
        if c.is_ascii_digit() {
            self.buffer.push(c);
            return Ok(StepOutcome::Advance);
        }
        if c == '.' || c == '{' || c == '~' || c.is_alphabetic() {
            return Err(LexError::InvalidAfterFraction {
                character: c,
                line: self.line,
                column: self.column,
            });
        }
        let text = std::mem::take(&mut self.buffer);
        self.emit(TokenKind::FloatConst, text);
        self.state = State::Start;
        Ok(StepOutcome::Hold)
    }

    fn emit(&mut self, kind: TokenKind, text: String) {
        self.tokens
            .push(Token::new(kind, text, self.start_line, self.start_column));
    }
}

/// Scans the whole input; the final token always has kind `Eof`.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    Lexer::new(input).run()
}
