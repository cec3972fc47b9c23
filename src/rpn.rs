use std::fmt;

use thiserror::Error;

/// Operations of the postfix instruction stream.
///
/// `ArrayInit` carries the element count of a braced initialiser list;
/// `Jump`/`JumpFalse` are each followed by one `RpnItem::Address` element
/// holding an absolute index into the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    Plus,
    Minus,
    Multiply,
    Divide,
    UnaryMinus,
    Lt,
    Gt,
    Equals,
    Neq,
    And,
    Or,
    Assign,
    ArrayAssign,
    ArrayIndex,
    DeclArr,
    ArrayInit(usize),
    Input,
    Output,
    InputArray,
    Jump,
    JumpFalse,
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpCode::Plus => f.write_str("PLUS"),
            OpCode::Minus => f.write_str("MINUS"),
            OpCode::Multiply => f.write_str("MULTIPLY"),
            OpCode::Divide => f.write_str("DIVIDE"),
            OpCode::UnaryMinus => f.write_str("UNARY_MINUS"),
            OpCode::Lt => f.write_str("LT"),
            OpCode::Gt => f.write_str("GT"),
            OpCode::Equals => f.write_str("EQUALS"),
            OpCode::Neq => f.write_str("NEQ"),
            OpCode::And => f.write_str("AND"),
            OpCode::Or => f.write_str("OR"),
            OpCode::Assign => f.write_str("ASSIGN"),
            OpCode::ArrayAssign => f.write_str("ARRAY_ASSIGN"),
            OpCode::ArrayIndex => f.write_str("ARRAY_INDEX"),
            OpCode::DeclArr => f.write_str("DECL_ARR"),
            OpCode::ArrayInit(count) => write!(f, "ARRAY_INIT_{count}"),
            OpCode::Input => f.write_str("$r"),
            OpCode::Output => f.write_str("$w"),
            OpCode::InputArray => f.write_str("r_array"),
            OpCode::Jump => f.write_str("$J"),
            OpCode::JumpFalse => f.write_str("$JF"),
        }
    }
}

/// One element of the instruction stream: a literal to push, an identifier
/// name to push (resolved lazily by the interpreter), an operation, or the
/// address operand of a preceding jump.
#[derive(Debug, Clone, PartialEq)]
pub enum RpnItem {
    Int(i64),
    Float(f64),
    Name(String),
    Op(OpCode),
    Address(usize),
}

impl fmt::Display for RpnItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpnItem::Int(value) => write!(f, "{value}"),
            RpnItem::Float(value) => write!(f, "{value}"),
            RpnItem::Name(name) => f.write_str(name),
            RpnItem::Op(op) => write!(f, "{op}"),
            RpnItem::Address(address) => write!(f, "@{address}"),
        }
    }
}

/// Single-use handle to a reserved jump-address slot.
#[derive(Debug, PartialEq, Eq)]
pub struct JumpSlot(usize);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{count} reserved jump slot(s) left unpatched")]
pub struct UnpatchedJumpError {
    pub count: usize,
}

/// Append-only emitter for the instruction stream.
///
/// Jump targets that are unknown at emission time go through
/// `emit_jump`/`emit_jump_if_false`, which reserve an address slot and hand
/// back a `JumpSlot`; `patch` fills the slot once the target index is known.
/// `finish` refuses to produce a program while any slot is outstanding.
#[derive(Debug, Default)]
pub struct RpnBuilder {
    items: Vec<RpnItem>,
    unpatched: usize,
}

const UNPATCHED: usize = usize::MAX;

impl RpnBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push_int(&mut self, value: i64) {
        self.items.push(RpnItem::Int(value));
    }

    pub fn push_float(&mut self, value: f64) {
        self.items.push(RpnItem::Float(value));
    }

    pub fn push_name(&mut self, name: &str) {
        self.items.push(RpnItem::Name(name.to_string()));
    }

    pub fn push_op(&mut self, op: OpCode) {
        self.items.push(RpnItem::Op(op));
    }

    pub fn emit_jump_if_false(&mut self) -> JumpSlot {
        self.push_op(OpCode::JumpFalse);
        self.reserve_address()
    }

    pub fn emit_jump(&mut self) -> JumpSlot {
        self.push_op(OpCode::Jump);
        self.reserve_address()
    }

    pub fn emit_jump_to(&mut self, target: usize) {
        self.push_op(OpCode::Jump);
        self.items.push(RpnItem::Address(target));
    }

    pub fn patch(&mut self, slot: JumpSlot, target: usize) {
        self.items[slot.0] = RpnItem::Address(target);
        self.unpatched -= 1;
    }

    pub fn finish(self) -> Result<RpnProgram, UnpatchedJumpError> {
        if self.unpatched > 0 {
            return Err(UnpatchedJumpError {
                count: self.unpatched,
            });
        }
        Ok(RpnProgram { items: self.items })
    }

    fn reserve_address(&mut self) -> JumpSlot {
        let slot = JumpSlot(self.items.len());
        self.items.push(RpnItem::Address(UNPATCHED));
        self.unpatched += 1;
        slot
    }
}

/// Finished instruction stream; every jump address is resolved.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RpnProgram {
    items: Vec<RpnItem>,
}

impl RpnProgram {
    pub fn items(&self) -> &[RpnItem] {
        &self.items
    }

    pub fn get(&self, index: usize) -> Option<&RpnItem> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patches_reserved_slot() {
        let mut builder = RpnBuilder::new();
        builder.push_int(1);
        let slot = builder.emit_jump_if_false();
        builder.push_int(2);
        builder.push_op(OpCode::Output);
        let end = builder.len();
        builder.patch(slot, end);

        let program = builder.finish().expect("finish should succeed");
        assert_eq!(
            program.items(),
            &[
                RpnItem::Int(1),
                RpnItem::Op(OpCode::JumpFalse),
                RpnItem::Address(5),
                RpnItem::Int(2),
                RpnItem::Op(OpCode::Output),
            ]
        );
    }

    #[test]
    fn finish_rejects_unpatched_slot() {
        let mut builder = RpnBuilder::new();
        let _slot = builder.emit_jump();
        let err = builder.finish().expect_err("expected unpatched failure");
        assert_eq!(err, UnpatchedJumpError { count: 1 });
    }

    #[test]
    fn emit_jump_to_is_already_resolved() {
        let mut builder = RpnBuilder::new();
        builder.emit_jump_to(0);
        let program = builder.finish().expect("finish should succeed");
        assert_eq!(
            program.items(),
            &[RpnItem::Op(OpCode::Jump), RpnItem::Address(0)]
        );
    }

    #[test]
    fn renders_original_opcode_vocabulary() {
        let rendered: Vec<String> = [
            OpCode::Plus,
            OpCode::UnaryMinus,
            OpCode::Equals,
            OpCode::DeclArr,
            OpCode::ArrayInit(3),
            OpCode::Input,
            OpCode::Output,
            OpCode::InputArray,
            OpCode::Jump,
            OpCode::JumpFalse,
        ]
        .iter()
        .map(|op| op.to_string())
        .collect();
        assert_eq!(
            rendered,
            vec![
                "PLUS",
                "UNARY_MINUS",
                "EQUALS",
                "DECL_ARR",
                "ARRAY_INIT_3",
                "$r",
                "$w",
                "r_array",
                "$J",
                "$JF",
            ]
        );
    }
}
