use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};

use thiserror::Error;

use crate::rpn::{OpCode, RpnItem, RpnProgram};
use crate::symbol_table::{BaseType, SymbolTable};

/// Runtime scalar. Arithmetic promotes to `Float` when either side is a
/// float; comparisons and logical operators always produce `Int(0|1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    pub fn zero(base_type: BaseType) -> Self {
        match base_type {
            BaseType::Int => Number::Int(0),
            BaseType::Float => Number::Float(0.0),
        }
    }

    pub fn is_truthy(self) -> bool {
        match self {
            Number::Int(value) => value != 0,
            Number::Float(value) => value != 0.0,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(value) => value as f64,
            Number::Float(value) => value,
        }
    }

    fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a + b),
            (a, b) => Number::Float(a.as_f64() + b.as_f64()),
        }
    }

    fn sub(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a - b),
            (a, b) => Number::Float(a.as_f64() - b.as_f64()),
        }
    }

    fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Number::Int(a * b),
            (a, b) => Number::Float(a.as_f64() * b.as_f64()),
        }
    }

    /// Integer division truncates; any float operand switches to real
    /// division. A zero divisor of either type is an error.
    fn div(self, other: Number) -> Result<Number, RuntimeError> {
        if !other.is_truthy() {
            return Err(RuntimeError::DivisionByZero);
        }
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Ok(Number::Int(a / b)),
            (a, b) => Ok(Number::Float(a.as_f64() / b.as_f64())),
        }
    }

    fn neg(self) -> Number {
        match self {
            Number::Int(value) => Number::Int(-value),
            Number::Float(value) => Number::Float(-value),
        }
    }

    fn lt(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a < b,
            (a, b) => a.as_f64() < b.as_f64(),
        }
    }

    fn gt(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a > b,
            (a, b) => a.as_f64() > b.as_f64(),
        }
    }

    fn eq_num(self, other: Number) -> bool {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a == b,
            (a, b) => a.as_f64() == b.as_f64(),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(value) => write!(f, "{value}"),
            Number::Float(value) => write!(f, "{value}"),
        }
    }
}

fn flag(value: bool) -> Number {
    Number::Int(value as i64)
}

/// Runtime binding of one name.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Number),
    Array(Vec<Number>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(number) => write!(f, "{number}"),
            Value::Array(values) => {
                let rendered = values
                    .iter()
                    .map(Number::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{rendered}]")
            }
        }
    }
}

/// Operand-stack element: either a computed value or a still-unresolved
/// identifier name. Names resolve at use time against the runtime table.
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Value(Number),
    Name(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Stack underflow at instruction {ip}")]
    StackUnderflow { ip: usize },
    #[error("Undefined variable '{name}'")]
    UndefinedVariable { name: String },
    #[error("Undefined array '{name}'")]
    UndefinedArray { name: String },
    #[error("'{name}' is an array and cannot be used as a scalar")]
    ArrayUsedAsScalar { name: String },
    #[error("'{name}' is not an array")]
    NotAnArray { name: String },
    #[error("{op} expected a name on the stack at instruction {ip}")]
    ExpectedName { op: &'static str, ip: usize },
    #[error("Array size must be a positive integer, got {size}")]
    ArraySizeNotPositive { size: Number },
    #[error("Index into '{name}' must be an integer")]
    NonIntegerIndex { name: String },
    #[error("Index {index} out of bounds for array '{name}' of length {len}")]
    IndexOutOfBounds {
        name: String,
        index: i64,
        len: usize,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Malformed jump at instruction {ip}")]
    MalformedJump { ip: usize },
    #[error("Failed to read input value: {message}")]
    InputFailed { message: String },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Result of one interpretation run: the ordered output sequence and the
/// final runtime symbol table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Execution {
    pub output: Vec<Number>,
    pub symbols: BTreeMap<String, Value>,
}

/// Stack machine over a finished instruction stream.
///
/// All per-run state is reset on entry to `run`; the pre-supplied input
/// values are replayed from the start on every run. When the supply is
/// exhausted, input operations fall back to prompting on stdin.
pub struct Interpreter {
    stack: Vec<Operand>,
    table: BTreeMap<String, Value>,
    output: Vec<Number>,
    input_values: Vec<i64>,
    input_index: usize,
}

impl Interpreter {
    pub fn new() -> Self {
        Self {
            stack: Vec::new(),
            table: BTreeMap::new(),
            output: Vec::new(),
            input_values: Vec::new(),
            input_index: 0,
        }
    }

    pub fn set_input_values(&mut self, values: Vec<i64>) {
        self.input_values = values;
        self.input_index = 0;
    }

    pub fn run(
        &mut self,
        program: &RpnProgram,
        declarations: &SymbolTable,
    ) -> RuntimeResult<Execution> {
        self.stack.clear();
        self.table.clear();
        self.output.clear();
        self.input_index = 0;

        let mut ip = 0;
        while ip < program.len() {
            match &program.items()[ip] {
                RpnItem::Int(value) => {
                    self.stack.push(Operand::Value(Number::Int(*value)));
                    ip += 1;
                }
                RpnItem::Float(value) => {
                    self.stack.push(Operand::Value(Number::Float(*value)));
                    ip += 1;
                }
                RpnItem::Name(name) => {
                    self.stack.push(Operand::Name(name.clone()));
                    ip += 1;
                }
                RpnItem::Address(_) => return Err(RuntimeError::MalformedJump { ip }),
                RpnItem::Op(op) => ip = self.execute(*op, ip, program, declarations)?,
            }
        }

        Ok(Execution {
            output: std::mem::take(&mut self.output),
            symbols: std::mem::take(&mut self.table),
        })
    }

    /// Executes one operation and returns the next instruction pointer.
    fn execute(
        &mut self,
        op: OpCode,
        ip: usize,
        program: &RpnProgram,
        declarations: &SymbolTable,
    ) -> RuntimeResult<usize> {
        match op {
            OpCode::Plus => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack.push(Operand::Value(a.add(b)));
            }
            OpCode::Minus => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack.push(Operand::Value(a.sub(b)));
            }
            OpCode::Multiply => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack.push(Operand::Value(a.mul(b)));
            }
            OpCode::Divide => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack.push(Operand::Value(a.div(b)?));
            }
            OpCode::UnaryMinus => {
                let value = self.pop_value(ip, declarations)?;
                self.stack.push(Operand::Value(value.neg()));
            }
            OpCode::Lt => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack.push(Operand::Value(flag(a.lt(b))));
            }
            OpCode::Gt => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack.push(Operand::Value(flag(a.gt(b))));
            }
            OpCode::Equals => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack.push(Operand::Value(flag(a.eq_num(b))));
            }
            OpCode::Neq => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack.push(Operand::Value(flag(!a.eq_num(b))));
            }
            OpCode::And => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack
                    .push(Operand::Value(flag(a.is_truthy() && b.is_truthy())));
            }
            OpCode::Or => {
                let (a, b) = self.pop_pair(ip, declarations)?;
                self.stack
                    .push(Operand::Value(flag(a.is_truthy() || b.is_truthy())));
            }
            OpCode::Assign => {
                let value = self.pop_value(ip, declarations)?;
                let name = self.pop_name(ip, "ASSIGN")?;
                self.store_scalar(&name, value, declarations)?;
            }
            OpCode::ArrayInit(count) => {
                let mut values = Vec::with_capacity(count);
                for _ in 0..count {
                    values.push(self.pop_value(ip, declarations)?);
                }
                values.reverse();
                let name = self.pop_name(ip, "ARRAY_INIT")?;
                if !declarations.contains(&name) {
                    return Err(RuntimeError::UndefinedVariable { name });
                }
                self.table.insert(name, Value::Array(values));
            }
            OpCode::DeclArr => {
                let name = self.pop_name(ip, "DECL_ARR")?;
                let size = self.pop_value(ip, declarations)?;
                let len = match size {
                    Number::Int(value) if value > 0 => value as usize,
                    _ => return Err(RuntimeError::ArraySizeNotPositive { size }),
                };
                let info = declarations
                    .get(&name)
                    .ok_or_else(|| RuntimeError::UndefinedVariable { name: name.clone() })?;
                self.table
                    .insert(name, Value::Array(vec![Number::zero(info.base_type); len]));
            }
            OpCode::ArrayIndex => {
                let index = self.pop_value(ip, declarations)?;
                let name = self.pop_name(ip, "ARRAY_INDEX")?;
                let index = int_index(&name, index)?;
                let values = self.array(&name)?;
                let value = element(&name, values, index)?;
                self.stack.push(Operand::Value(value));
            }
            OpCode::ArrayAssign => {
                let value = self.pop_value(ip, declarations)?;
                let index = self.pop_value(ip, declarations)?;
                let name = self.pop_name(ip, "ARRAY_ASSIGN")?;
                let index = int_index(&name, index)?;
                let values = self.array_mut(&name)?;
                let slot = element_mut(&name, values, index)?;
                *slot = value;
            }
            OpCode::Output => {
                let value = self.pop_value(ip, declarations)?;
                self.output.push(value);
            }
            OpCode::Input => {
                let name = self.pop_name(ip, "$r")?;
                let value = self.read_input(&name)?;
                self.store_scalar(&name, Number::Int(value), declarations)?;
            }
            OpCode::InputArray => {
                let index = self.pop_value(ip, declarations)?;
                let name = self.pop_name(ip, "r_array")?;
                let index = int_index(&name, index)?;
                let value = self.read_input(&format!("{name}[{index}]"))?;
                let values = self.array_mut(&name)?;
                let slot = element_mut(&name, values, index)?;
                *slot = Number::Int(value);
            }
            OpCode::JumpFalse => {
                let target = jump_target(program, ip)?;
                let condition = self.pop_value(ip, declarations)?;
                return Ok(if condition.is_truthy() { ip + 2 } else { target });
            }
            OpCode::Jump => return jump_target(program, ip),
        }
        Ok(ip + 1)
    }

    fn pop(&mut self, ip: usize) -> RuntimeResult<Operand> {
        self.stack
            .pop()
            .ok_or(RuntimeError::StackUnderflow { ip })
    }

    fn pop_value(&mut self, ip: usize, declarations: &SymbolTable) -> RuntimeResult<Number> {
        match self.pop(ip)? {
            Operand::Value(value) => Ok(value),
            Operand::Name(name) => self.resolve(&name, declarations),
        }
    }

    /// Pops both operands of a binary operator in source order.
    fn pop_pair(
        &mut self,
        ip: usize,
        declarations: &SymbolTable,
    ) -> RuntimeResult<(Number, Number)> {
        let right = self.pop_value(ip, declarations)?;
        let left = self.pop_value(ip, declarations)?;
        Ok((left, right))
    }

    fn pop_name(&mut self, ip: usize, op: &'static str) -> RuntimeResult<String> {
        match self.pop(ip)? {
            Operand::Name(name) => Ok(name),
            Operand::Value(_) => Err(RuntimeError::ExpectedName { op, ip }),
        }
    }

    /// Resolves a name to its scalar value. Declared scalars materialise as
    /// their typed zero on first use; undeclared names are errors.
    fn resolve(&mut self, name: &str, declarations: &SymbolTable) -> RuntimeResult<Number> {
        if let Some(value) = self.table.get(name) {
            return match value {
                Value::Scalar(number) => Ok(*number),
                Value::Array(_) => Err(RuntimeError::ArrayUsedAsScalar {
                    name: name.to_string(),
                }),
            };
        }
        match declarations.get(name) {
            Some(info) if !info.is_array => {
                let zero = Number::zero(info.base_type);
                self.table.insert(name.to_string(), Value::Scalar(zero));
                Ok(zero)
            }
            Some(_) => Err(RuntimeError::ArrayUsedAsScalar {
                name: name.to_string(),
            }),
            None => Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
            }),
        }
    }

    fn store_scalar(
        &mut self,
        name: &str,
        value: Number,
        declarations: &SymbolTable,
    ) -> RuntimeResult<()> {
        if !self.table.contains_key(name) && !declarations.contains(name) {
            return Err(RuntimeError::UndefinedVariable {
                name: name.to_string(),
            });
        }
        self.table.insert(name.to_string(), Value::Scalar(value));
        Ok(())
    }

    fn array(&self, name: &str) -> RuntimeResult<&Vec<Number>> {
        match self.table.get(name) {
            Some(Value::Array(values)) => Ok(values),
            Some(Value::Scalar(_)) => Err(RuntimeError::NotAnArray {
                name: name.to_string(),
            }),
            None => Err(RuntimeError::UndefinedArray {
                name: name.to_string(),
            }),
        }
    }

    fn array_mut(&mut self, name: &str) -> RuntimeResult<&mut Vec<Number>> {
        match self.table.get_mut(name) {
            Some(Value::Array(values)) => Ok(values),
            Some(Value::Scalar(_)) => Err(RuntimeError::NotAnArray {
                name: name.to_string(),
            }),
            None => Err(RuntimeError::UndefinedArray {
                name: name.to_string(),
            }),
        }
    }

    fn read_input(&mut self, target: &str) -> RuntimeResult<i64> {
        if self.input_index < self.input_values.len() {
            let value = self.input_values[self.input_index];
            self.input_index += 1;
            return Ok(value);
        }

        print!("Enter value for {target}: ");
        io::stdout()
            .flush()
            .map_err(|err| RuntimeError::InputFailed {
                message: err.to_string(),
            })?;
        let mut line = String::new();
        let read = io::stdin()
            .read_line(&mut line)
            .map_err(|err| RuntimeError::InputFailed {
                message: err.to_string(),
            })?;
        if read == 0 {
            return Err(RuntimeError::InputFailed {
                message: "end of input".to_string(),
            });
        }
        line.trim()
            .parse::<i64>()
            .map_err(|_| RuntimeError::InputFailed {
                message: format!("'{}' is not an integer", line.trim()),
            })
    }
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

fn int_index(name: &str, index: Number) -> RuntimeResult<i64> {
    match index {
        Number::Int(value) => Ok(value),
        Number::Float(_) => Err(RuntimeError::NonIntegerIndex {
            name: name.to_string(),
        }),
    }
}

fn element(name: &str, values: &[Number], index: i64) -> RuntimeResult<Number> {
    usize::try_from(index)
        .ok()
        .and_then(|index| values.get(index))
        .copied()
        .ok_or_else(|| RuntimeError::IndexOutOfBounds {
            name: name.to_string(),
            index,
            len: values.len(),
        })
}

fn element_mut<'a>(
    name: &str,
    values: &'a mut Vec<Number>,
    index: i64,
) -> RuntimeResult<&'a mut Number> {
    let len = values.len();
    usize::try_from(index)
        .ok()
        .and_then(|index| values.get_mut(index))
        .ok_or_else(|| RuntimeError::IndexOutOfBounds {
            name: name.to_string(),
            index,
            len,
        })
}

/// Reads the address operand of a jump; the address may equal the stream
/// length, which falls through the end.
fn jump_target(program: &RpnProgram, ip: usize) -> RuntimeResult<usize> {
    match program.get(ip + 1) {
        Some(RpnItem::Address(address)) if *address <= program.len() => Ok(*address),
        _ => Err(RuntimeError::MalformedJump { ip }),
    }
}
