use std::collections::HashMap;

use thiserror::Error;

use crate::rpn::{JumpSlot, OpCode, RpnBuilder, RpnProgram};
use crate::symbol_table::{BaseType, SymbolTable};
use crate::token::{Token, TokenKind};

/// Grammar names driven by the predictive table. Tail non-terminals carry
/// the left recursion of one precedence level each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NonTerminal {
    StatementList,
    Declaration,
    ArrayDeclaration,
    DeclaratorTail,
    AssignmentTail,
    InputTarget,
    InputTargetTail,
    Block,
    ElseTail,
    Initializers,
    InitializersTail,
    LogicalExpr,
    OrTail,
    AndTail,
    EqualityTail,
    CompareTail,
    Expr,
    AddTail,
    Term,
    MulTail,
    Factor,
    FactorTail,
}

/// Side effects interleaved with grammar symbols on the parse stack; each
/// fires when popped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    PushIntType,
    PushFloatType,
    SaveIdentifier,
    SaveFactor,
    DeclareVariable,
    DeclareDynamicArray,
    DeclareInitArray,
    BeginArrayInit,
    CountInitElement,
    EndArrayInit,
    EmitAssignTarget,
    EmitInputTarget,
    EmitFactorIfNotArray,
    EmitArrayName,
    EmitArrayAccess,
    EmitAssign,
    EmitArrayAssign,
    EmitOutput,
    EmitInput,
    EmitInputArray,
    EmitPlus,
    EmitMinus,
    EmitMultiply,
    EmitDivide,
    EmitUnaryMinus,
    EmitLt,
    EmitGt,
    EmitEquals,
    EmitNeq,
    EmitAnd,
    EmitOr,
    WhileStart,
    WhileCondition,
    WhileEnd,
    IfCondition,
    ElseStart,
    IfEnd,
}

/// Element of the push-down stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Symbol {
    Terminal(TokenKind),
    NonTerminal(NonTerminal),
    Action(Action),
}

fn t(kind: TokenKind) -> Symbol {
    Symbol::Terminal(kind)
}

fn n(nt: NonTerminal) -> Symbol {
    Symbol::NonTerminal(nt)
}

fn a(action: Action) -> Symbol {
    Symbol::Action(action)
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected {found} at line {line}, column {column}: expected {expected}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },
    #[error(
        "Redeclaration of '{name}' at line {line}, column {column}: first declared at line {first_line}, column {first_column}"
    )]
    Redeclaration {
        name: String,
        line: usize,
        column: usize,
        first_line: usize,
        first_column: usize,
    },
    #[error("Malformed {kind} literal '{text}' at line {line}, column {column}")]
    MalformedLiteral {
        kind: &'static str,
        text: String,
        line: usize,
        column: usize,
    },
    #[error("Parser invariant violated: {message}")]
    InvariantViolation { message: &'static str },
}

pub type ParseResult<T> = Result<T, ParseError>;

const STMT_FIRST: [TokenKind; 7] = [
    TokenKind::Int,
    TokenKind::Float,
    TokenKind::If,
    TokenKind::While,
    TokenKind::Identifier,
    TokenKind::Input,
    TokenKind::Output,
];

const EXPR_FIRST: [TokenKind; 5] = [
    TokenKind::UnaryMinus,
    TokenKind::Identifier,
    TokenKind::IntegerConst,
    TokenKind::FloatConst,
    TokenKind::LParen,
];

/// Tokens that may terminate any expression, regardless of nesting level.
const EXPR_END: [TokenKind; 7] = [
    TokenKind::RParen,
    TokenKind::Semicolon,
    TokenKind::RSquare,
    TokenKind::Comma,
    TokenKind::RCurly,
    TokenKind::LCurly,
    TokenKind::Eof,
];

/// `NonTerminal × TokenKind → right-hand side`, built once and immutable.
struct ParseTable {
    rules: HashMap<(NonTerminal, TokenKind), Vec<Symbol>>,
}

impl ParseTable {
    fn rule(&self, nt: NonTerminal, kind: TokenKind) -> Option<&[Symbol]> {
        self.rules.get(&(nt, kind)).map(Vec::as_slice)
    }

    /// Tokens with a table entry for `nt`, in code order, for diagnostics.
    fn expected(&self, nt: NonTerminal) -> Vec<TokenKind> {
        let mut kinds: Vec<TokenKind> = self
            .rules
            .keys()
            .filter(|(entry_nt, _)| *entry_nt == nt)
            .map(|&(_, kind)| kind)
            .collect();
        kinds.sort_by_key(|kind| kind.code());
        kinds
    }

    fn build() -> Self {
        use Action as Act;
        use NonTerminal as Nt;
        use TokenKind as Tk;

        let mut rules = HashMap::new();
        let mut add = |nt: Nt, kinds: &[Tk], rhs: &[Symbol]| {
            for &kind in kinds {
                rules.insert((nt, kind), rhs.to_vec());
            }
        };

        // Statements. Every statement rule recurses into the statement list;
        // the list is empty before `}` or end of input.
        add(
            Nt::StatementList,
            &[Tk::Int],
            &[
                a(Act::PushIntType),
                t(Tk::Int),
                n(Nt::Declaration),
                n(Nt::StatementList),
            ],
        );
        add(
            Nt::StatementList,
            &[Tk::Float],
            &[
                a(Act::PushFloatType),
                t(Tk::Float),
                n(Nt::Declaration),
                n(Nt::StatementList),
            ],
        );
        add(
            Nt::StatementList,
            &[Tk::If],
            &[
                t(Tk::If),
                t(Tk::LParen),
                n(Nt::LogicalExpr),
                t(Tk::RParen),
                a(Act::IfCondition),
                n(Nt::Block),
                n(Nt::ElseTail),
                n(Nt::StatementList),
            ],
        );
        add(
            Nt::StatementList,
            &[Tk::While],
            &[
                t(Tk::While),
                a(Act::WhileStart),
                t(Tk::LParen),
                n(Nt::LogicalExpr),
                t(Tk::RParen),
                a(Act::WhileCondition),
                n(Nt::Block),
                a(Act::WhileEnd),
                n(Nt::StatementList),
            ],
        );
        add(
            Nt::StatementList,
            &[Tk::Identifier],
            &[
                a(Act::SaveIdentifier),
                t(Tk::Identifier),
                n(Nt::AssignmentTail),
                t(Tk::Semicolon),
                n(Nt::StatementList),
            ],
        );
        add(
            Nt::StatementList,
            &[Tk::Input],
            &[t(Tk::Input), n(Nt::InputTarget), n(Nt::StatementList)],
        );
        add(
            Nt::StatementList,
            &[Tk::Output],
            &[
                t(Tk::Output),
                n(Nt::LogicalExpr),
                a(Act::EmitOutput),
                t(Tk::Semicolon),
                n(Nt::StatementList),
            ],
        );
        add(Nt::StatementList, &[Tk::RCurly, Tk::Eof], &[]);

        // Declarations after the type keyword: a scalar with an optional
        // initialiser, or one of the two array forms behind `[`.
        add(
            Nt::Declaration,
            &[Tk::Identifier],
            &[
                a(Act::SaveIdentifier),
                t(Tk::Identifier),
                a(Act::DeclareVariable),
                n(Nt::DeclaratorTail),
                t(Tk::Semicolon),
            ],
        );
        add(
            Nt::Declaration,
            &[Tk::LSquare],
            &[t(Tk::LSquare), n(Nt::ArrayDeclaration)],
        );

        add(
            Nt::DeclaratorTail,
            &[Tk::Assign],
            &[
                a(Act::EmitAssignTarget),
                t(Tk::Assign),
                n(Nt::Expr),
                a(Act::EmitAssign),
            ],
        );
        add(Nt::DeclaratorTail, &[Tk::Semicolon], &[]);

        // `[ Expr ] name ;` sizes the array at runtime; `[ ] name = { ... } ;`
        // takes its length from the initialiser list.
        add(
            Nt::ArrayDeclaration,
            &EXPR_FIRST,
            &[
                n(Nt::Expr),
                t(Tk::RSquare),
                a(Act::SaveIdentifier),
                t(Tk::Identifier),
                a(Act::DeclareDynamicArray),
                t(Tk::Semicolon),
            ],
        );
        add(
            Nt::ArrayDeclaration,
            &[Tk::RSquare],
            &[
                t(Tk::RSquare),
                a(Act::SaveIdentifier),
                t(Tk::Identifier),
                a(Act::DeclareInitArray),
                t(Tk::Assign),
                a(Act::BeginArrayInit),
                t(Tk::LCurly),
                n(Nt::Initializers),
                t(Tk::RCurly),
                a(Act::EndArrayInit),
                t(Tk::Semicolon),
            ],
        );

        add(
            Nt::Initializers,
            &EXPR_FIRST,
            &[
                n(Nt::Expr),
                a(Act::CountInitElement),
                n(Nt::InitializersTail),
            ],
        );
        add(Nt::Initializers, &[Tk::RCurly], &[]);
        add(
            Nt::InitializersTail,
            &[Tk::Comma],
            &[
                t(Tk::Comma),
                n(Nt::Expr),
                a(Act::CountInitElement),
                n(Nt::InitializersTail),
            ],
        );
        add(Nt::InitializersTail, &[Tk::RCurly], &[]);

        // Assignment statement tail: scalar store or indexed store.
        add(
            Nt::AssignmentTail,
            &[Tk::Assign],
            &[
                a(Act::EmitAssignTarget),
                t(Tk::Assign),
                n(Nt::Expr),
                a(Act::EmitAssign),
            ],
        );
        add(
            Nt::AssignmentTail,
            &[Tk::LSquare],
            &[
                a(Act::EmitAssignTarget),
                t(Tk::LSquare),
                n(Nt::LogicalExpr),
                t(Tk::RSquare),
                t(Tk::Assign),
                n(Nt::Expr),
                a(Act::EmitArrayAssign),
            ],
        );

        add(
            Nt::InputTarget,
            &[Tk::Identifier],
            &[
                a(Act::SaveIdentifier),
                t(Tk::Identifier),
                n(Nt::InputTargetTail),
                t(Tk::Semicolon),
            ],
        );
        add(
            Nt::InputTargetTail,
            &[Tk::LSquare],
            &[
                a(Act::EmitInputTarget),
                t(Tk::LSquare),
                n(Nt::LogicalExpr),
                t(Tk::RSquare),
                a(Act::EmitInputArray),
            ],
        );
        add(
            Nt::InputTargetTail,
            &[Tk::Semicolon],
            &[a(Act::EmitInputTarget), a(Act::EmitInput)],
        );

        add(
            Nt::Block,
            &[Tk::LCurly],
            &[t(Tk::LCurly), n(Nt::StatementList), t(Tk::RCurly)],
        );

        add(
            Nt::ElseTail,
            &[Tk::Else],
            &[t(Tk::Else), a(Act::ElseStart), n(Nt::Block), a(Act::IfEnd)],
        );
        let mut else_follow = STMT_FIRST.to_vec();
        else_follow.extend([Tk::RCurly, Tk::Eof]);
        add(Nt::ElseTail, &else_follow, &[a(Act::IfEnd)]);

        // Expression levels, lowest to highest precedence. A head expands the
        // whole tail chain down to its own level; each tail either consumes
        // its operator and recurses or is empty on its follow set.
        Self::expression_rules(
            &mut add,
            Nt::LogicalExpr,
            &[
                Nt::MulTail,
                Nt::AddTail,
                Nt::CompareTail,
                Nt::EqualityTail,
                Nt::AndTail,
                Nt::OrTail,
            ],
        );
        Self::expression_rules(&mut add, Nt::Expr, &[Nt::MulTail, Nt::AddTail]);
        Self::expression_rules(&mut add, Nt::Term, &[Nt::MulTail]);
        Self::expression_rules(&mut add, Nt::Factor, &[]);

        add(
            Nt::OrTail,
            &[Tk::Or],
            &[
                t(Tk::Or),
                n(Nt::Expr),
                n(Nt::CompareTail),
                n(Nt::EqualityTail),
                n(Nt::AndTail),
                a(Act::EmitOr),
                n(Nt::OrTail),
            ],
        );
        add(Nt::OrTail, &Self::tail_follow(&[]), &[]);

        add(
            Nt::AndTail,
            &[Tk::And],
            &[
                t(Tk::And),
                n(Nt::Expr),
                n(Nt::CompareTail),
                n(Nt::EqualityTail),
                a(Act::EmitAnd),
                n(Nt::AndTail),
            ],
        );
        add(Nt::AndTail, &Self::tail_follow(&[Tk::Or]), &[]);

        add(
            Nt::EqualityTail,
            &[Tk::Eq],
            &[
                t(Tk::Eq),
                n(Nt::Expr),
                n(Nt::CompareTail),
                a(Act::EmitEquals),
                n(Nt::EqualityTail),
            ],
        );
        add(
            Nt::EqualityTail,
            &[Tk::Neq],
            &[
                t(Tk::Neq),
                n(Nt::Expr),
                n(Nt::CompareTail),
                a(Act::EmitNeq),
                n(Nt::EqualityTail),
            ],
        );
        add(Nt::EqualityTail, &Self::tail_follow(&[Tk::Or, Tk::And]), &[]);

        add(
            Nt::CompareTail,
            &[Tk::Lt],
            &[t(Tk::Lt), n(Nt::Expr), a(Act::EmitLt), n(Nt::CompareTail)],
        );
        add(
            Nt::CompareTail,
            &[Tk::Gt],
            &[t(Tk::Gt), n(Nt::Expr), a(Act::EmitGt), n(Nt::CompareTail)],
        );
        add(
            Nt::CompareTail,
            &Self::tail_follow(&[Tk::Or, Tk::And, Tk::Eq, Tk::Neq]),
            &[],
        );

        add(
            Nt::AddTail,
            &[Tk::Plus],
            &[t(Tk::Plus), n(Nt::Term), a(Act::EmitPlus), n(Nt::AddTail)],
        );
        add(
            Nt::AddTail,
            &[Tk::Minus],
            &[t(Tk::Minus), n(Nt::Term), a(Act::EmitMinus), n(Nt::AddTail)],
        );
        add(
            Nt::AddTail,
            &Self::tail_follow(&[Tk::Or, Tk::And, Tk::Eq, Tk::Neq, Tk::Lt, Tk::Gt]),
            &[],
        );

        add(
            Nt::MulTail,
            &[Tk::Multiply],
            &[
                t(Tk::Multiply),
                n(Nt::Factor),
                a(Act::EmitMultiply),
                n(Nt::MulTail),
            ],
        );
        add(
            Nt::MulTail,
            &[Tk::Divide],
            &[
                t(Tk::Divide),
                n(Nt::Factor),
                a(Act::EmitDivide),
                n(Nt::MulTail),
            ],
        );
        add(
            Nt::MulTail,
            &Self::tail_follow(&[
                Tk::Or,
                Tk::And,
                Tk::Eq,
                Tk::Neq,
                Tk::Lt,
                Tk::Gt,
                Tk::Plus,
                Tk::Minus,
            ]),
            &[],
        );

        // An identifier factor is held back until the token after it decides
        // between a plain operand and an array access.
        add(
            Nt::FactorTail,
            &[Tk::LSquare],
            &[
                a(Act::EmitArrayName),
                t(Tk::LSquare),
                n(Nt::LogicalExpr),
                t(Tk::RSquare),
                a(Act::EmitArrayAccess),
            ],
        );
        add(
            Nt::FactorTail,
            &Self::tail_follow(&[
                Tk::Or,
                Tk::And,
                Tk::Eq,
                Tk::Neq,
                Tk::Lt,
                Tk::Gt,
                Tk::Plus,
                Tk::Minus,
                Tk::Multiply,
                Tk::Divide,
            ]),
            &[a(Act::EmitFactorIfNotArray)],
        );

        Self { rules }
    }

    /// Rows shared by every expression head; `tails` is the chain of levels
    /// below the head's own precedence.
    fn expression_rules(
        add: &mut impl FnMut(NonTerminal, &[TokenKind], &[Symbol]),
        nt: NonTerminal,
        tails: &[NonTerminal],
    ) {
        use Action as Act;
        use NonTerminal as Nt;
        use TokenKind as Tk;

        let with_tails = |mut prefix: Vec<Symbol>| -> Vec<Symbol> {
            prefix.extend(tails.iter().map(|&tail| n(tail)));
            prefix
        };

        add(
            nt,
            &[Tk::UnaryMinus],
            &with_tails(vec![
                t(Tk::UnaryMinus),
                n(Nt::Factor),
                a(Act::EmitUnaryMinus),
            ]),
        );
        add(
            nt,
            &[Tk::Identifier],
            &with_tails(vec![
                a(Act::SaveFactor),
                t(Tk::Identifier),
                n(Nt::FactorTail),
            ]),
        );
        add(
            nt,
            &[Tk::IntegerConst],
            &with_tails(vec![t(Tk::IntegerConst)]),
        );
        add(nt, &[Tk::FloatConst], &with_tails(vec![t(Tk::FloatConst)]));
        add(
            nt,
            &[Tk::LParen],
            &with_tails(vec![t(Tk::LParen), n(Nt::LogicalExpr), t(Tk::RParen)]),
        );
    }

    fn tail_follow(operators: &[TokenKind]) -> Vec<TokenKind> {
        EXPR_END.iter().chain(operators).copied().collect()
    }
}

#[derive(Debug)]
struct WhileFrame {
    start: usize,
    condition_exit: Option<JumpSlot>,
}

#[derive(Debug)]
struct IfFrame {
    false_jump: Option<JumpSlot>,
    end_jump: Option<JumpSlot>,
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    stack: Vec<Symbol>,
    table: ParseTable,
    rpn: RpnBuilder,
    symbols: SymbolTable,
    type_stack: Vec<BaseType>,
    saved_identifier: Option<Token>,
    saved_factor: Option<Token>,
    while_frames: Vec<WhileFrame>,
    if_frames: Vec<IfFrame>,
    init_counts: Vec<usize>,
}

/// One pass over the token stream: predictive expansion drives both
/// recognition and emission; there is no AST.
pub fn parse(tokens: Vec<Token>) -> ParseResult<(RpnProgram, SymbolTable)> {
    Parser::new(tokens).run()
}

impl Parser {
    pub fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.last().map(|token| token.kind) != Some(TokenKind::Eof) {
            let (line, column) = tokens
                .last()
                .map(|token| (token.line, token.column))
                .unwrap_or((1, 1));
            tokens.push(Token::eof(line, column));
        }
        Self {
            tokens,
            pos: 0,
            stack: vec![
                Symbol::Terminal(TokenKind::Eof),
                Symbol::NonTerminal(NonTerminal::StatementList),
            ],
            table: ParseTable::build(),
            rpn: RpnBuilder::new(),
            symbols: SymbolTable::new(),
            type_stack: Vec::new(),
            saved_identifier: None,
            saved_factor: None,
            while_frames: Vec::new(),
            if_frames: Vec::new(),
            init_counts: Vec::new(),
        }
    }

    pub fn run(mut self) -> ParseResult<(RpnProgram, SymbolTable)> {
        loop {
            let Some(&top) = self.stack.last() else {
                break;
            };
            if top == Symbol::Terminal(TokenKind::Eof) && self.current().kind == TokenKind::Eof {
                break;
            }
            match top {
                Symbol::Terminal(kind) => self.match_terminal(kind)?,
                Symbol::NonTerminal(nt) => self.expand(nt)?,
                Symbol::Action(action) => {
                    self.stack.pop();
                    self.execute(action)?;
                }
            }
        }
        let rpn = self.rpn.finish().map_err(|_| ParseError::InvariantViolation {
            message: "jump slot left unpatched after parse",
        })?;
        Ok((rpn, self.symbols))
    }

    fn current(&self) -> &Token {
        // `new` guarantees a trailing Eof token that is never consumed.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn match_terminal(&mut self, kind: TokenKind) -> ParseResult<()> {
        let token = self.current().clone();
        if token.kind != kind {
            return Err(ParseError::UnexpectedToken {
                expected: kind.to_string(),
                found: describe(&token),
                line: token.line,
                column: token.column,
            });
        }
        self.stack.pop();
        match kind {
            TokenKind::IntegerConst => {
                let value =
                    token
                        .text
                        .parse::<i64>()
                        .map_err(|_| ParseError::MalformedLiteral {
                            kind: "integer",
                            text: token.text.clone(),
                            line: token.line,
                            column: token.column,
                        })?;
                self.rpn.push_int(value);
            }
            TokenKind::FloatConst => {
                let value =
                    token
                        .text
                        .parse::<f64>()
                        .map_err(|_| ParseError::MalformedLiteral {
                            kind: "float",
                            text: token.text.clone(),
                            line: token.line,
                            column: token.column,
                        })?;
                self.rpn.push_float(value);
            }
            _ => {}
        }
        self.pos += 1;
        Ok(())
    }

    fn expand(&mut self, nt: NonTerminal) -> ParseResult<()> {
        let kind = self.current().kind;
        let rhs: Vec<Symbol> = match self.table.rule(nt, kind) {
            Some(rule) => rule.to_vec(),
            None => {
                let token = self.current();
                let expected = self
                    .table
                    .expected(nt)
                    .iter()
                    .map(|kind| kind.to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ParseError::UnexpectedToken {
                    expected: format!("one of {expected}"),
                    found: describe(token),
                    line: token.line,
                    column: token.column,
                });
            }
        };
        self.stack.pop();
        for &symbol in rhs.iter().rev() {
            self.stack.push(symbol);
        }
        Ok(())
    }

    fn execute(&mut self, action: Action) -> ParseResult<()> {
        match action {
            Action::PushIntType => self.type_stack.push(BaseType::Int),
            Action::PushFloatType => self.type_stack.push(BaseType::Float),
            Action::SaveIdentifier => self.saved_identifier = Some(self.current().clone()),
            Action::SaveFactor => self.saved_factor = Some(self.current().clone()),
            Action::DeclareVariable => {
                // Peek rather than take: an initialiser tail still needs the
                // token to emit the destination name.
                let token =
                    self.saved_identifier
                        .clone()
                        .ok_or(ParseError::InvariantViolation {
                            message: "no identifier saved for declaration",
                        })?;
                let base_type = self.pop_type()?;
                self.declare(&token, base_type, false)?;
            }
            Action::DeclareDynamicArray => {
                let token = self.take_saved_identifier()?;
                let base_type = self.pop_type()?;
                self.declare(&token, base_type, true)?;
                // The size expression is already in the stream; at runtime the
                // stack reads [size, name] when DECL_ARR executes.
                self.rpn.push_name(&token.text);
                self.rpn.push_op(OpCode::DeclArr);
            }
            Action::DeclareInitArray => {
                let token = self.take_saved_identifier()?;
                let base_type = self.pop_type()?;
                self.declare(&token, base_type, true)?;
                self.rpn.push_name(&token.text);
            }
            Action::BeginArrayInit => self.init_counts.push(0),
            Action::CountInitElement => {
                let count = self
                    .init_counts
                    .last_mut()
                    .ok_or(ParseError::InvariantViolation {
                        message: "initialiser count missing",
                    })?;
                *count += 1;
            }
            Action::EndArrayInit => {
                let count = self
                    .init_counts
                    .pop()
                    .ok_or(ParseError::InvariantViolation {
                        message: "initialiser count missing",
                    })?;
                self.rpn.push_op(OpCode::ArrayInit(count));
            }
            Action::EmitAssignTarget | Action::EmitInputTarget => {
                let token = self.take_saved_identifier()?;
                self.rpn.push_name(&token.text);
            }
            Action::EmitFactorIfNotArray => {
                // Empty when an array access already claimed the factor.
                if let Some(token) = self.saved_factor.take() {
                    self.rpn.push_name(&token.text);
                }
            }
            Action::EmitArrayName => {
                let token = self
                    .saved_factor
                    .take()
                    .ok_or(ParseError::InvariantViolation {
                        message: "no factor saved for array access",
                    })?;
                self.rpn.push_name(&token.text);
            }
            Action::EmitArrayAccess => self.rpn.push_op(OpCode::ArrayIndex),
            Action::EmitAssign => self.rpn.push_op(OpCode::Assign),
            Action::EmitArrayAssign => self.rpn.push_op(OpCode::ArrayAssign),
            Action::EmitOutput => self.rpn.push_op(OpCode::Output),
            Action::EmitInput => self.rpn.push_op(OpCode::Input),
            Action::EmitInputArray => self.rpn.push_op(OpCode::InputArray),
            Action::EmitPlus => self.rpn.push_op(OpCode::Plus),
            Action::EmitMinus => self.rpn.push_op(OpCode::Minus),
            Action::EmitMultiply => self.rpn.push_op(OpCode::Multiply),
            Action::EmitDivide => self.rpn.push_op(OpCode::Divide),
            Action::EmitUnaryMinus => self.rpn.push_op(OpCode::UnaryMinus),
            Action::EmitLt => self.rpn.push_op(OpCode::Lt),
            Action::EmitGt => self.rpn.push_op(OpCode::Gt),
            Action::EmitEquals => self.rpn.push_op(OpCode::Equals),
            Action::EmitNeq => self.rpn.push_op(OpCode::Neq),
            Action::EmitAnd => self.rpn.push_op(OpCode::And),
            Action::EmitOr => self.rpn.push_op(OpCode::Or),
            Action::WhileStart => self.while_frames.push(WhileFrame {
                start: self.rpn.len(),
                condition_exit: None,
            }),
            Action::WhileCondition => {
                let slot = self.rpn.emit_jump_if_false();
                let frame = self
                    .while_frames
                    .last_mut()
                    .ok_or(ParseError::InvariantViolation {
                        message: "while frame missing at condition",
                    })?;
                frame.condition_exit = Some(slot);
            }
            Action::WhileEnd => {
                let frame = self
                    .while_frames
                    .pop()
                    .ok_or(ParseError::InvariantViolation {
                        message: "while frame missing at loop end",
                    })?;
                let slot = frame
                    .condition_exit
                    .ok_or(ParseError::InvariantViolation {
                        message: "while condition jump missing",
                    })?;
                self.rpn.emit_jump_to(frame.start);
                let end = self.rpn.len();
                self.rpn.patch(slot, end);
            }
            Action::IfCondition => {
                let slot = self.rpn.emit_jump_if_false();
                self.if_frames.push(IfFrame {
                    false_jump: Some(slot),
                    end_jump: None,
                });
            }
            Action::ElseStart => {
                let end_jump = self.rpn.emit_jump();
                let else_start = self.rpn.len();
                let frame = self
                    .if_frames
                    .last_mut()
                    .ok_or(ParseError::InvariantViolation {
                        message: "if frame missing at else",
                    })?;
                let false_jump = frame
                    .false_jump
                    .take()
                    .ok_or(ParseError::InvariantViolation {
                        message: "if condition jump missing at else",
                    })?;
                frame.end_jump = Some(end_jump);
                self.rpn.patch(false_jump, else_start);
            }
            Action::IfEnd => {
                let frame = self.if_frames.pop().ok_or(ParseError::InvariantViolation {
                    message: "if frame missing at end",
                })?;
                let end = self.rpn.len();
                let slot = match frame.end_jump {
                    Some(slot) => slot,
                    None => frame
                        .false_jump
                        .ok_or(ParseError::InvariantViolation {
                            message: "if condition jump missing at end",
                        })?,
                };
                self.rpn.patch(slot, end);
            }
        }
        Ok(())
    }

    fn take_saved_identifier(&mut self) -> ParseResult<Token> {
        self.saved_identifier
            .take()
            .ok_or(ParseError::InvariantViolation {
                message: "no identifier saved",
            })
    }

    fn pop_type(&mut self) -> ParseResult<BaseType> {
        self.type_stack
            .pop()
            .ok_or(ParseError::InvariantViolation {
                message: "type stack empty at declaration",
            })
    }

    fn declare(&mut self, token: &Token, base_type: BaseType, is_array: bool) -> ParseResult<()> {
        self.symbols
            .declare(&token.text, base_type, is_array, token.line, token.column)
            .map_err(|err| ParseError::Redeclaration {
                name: token.text.clone(),
                line: token.line,
                column: token.column,
                first_line: err.line,
                first_column: err.column,
            })
    }
}

fn describe(token: &Token) -> String {
    match token.kind {
        TokenKind::Identifier | TokenKind::IntegerConst | TokenKind::FloatConst => {
            format!("{} '{}'", token.kind, token.text)
        }
        _ => token.kind.to_string(),
    }
}
