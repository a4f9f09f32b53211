use crate::error::{EvaluationError, ParseError};
use crate::traits::{Derivative, Scalar};
use log::debug;
use serde::Serialize;
use std::cell::RefCell;
use std::fmt;

/// Names of the free variables, in the order the VM receives their values.
pub const VARIABLES: [&str; 2] = ["x", "y"];

/// Most tokens an equation may contain.
pub const MAX_TOKENS: usize = 4096;

/// Most unary operators, exponents, parentheses and calls that may be nested
/// inside one another.
pub const MAX_NESTING: usize = 256;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a variable (by index into [`VARIABLES`]) onto the stack.
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b).
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    /// Pops top value (a), pushes -a.
    Neg,
    Sin,
    Cos,
    Tan,
    Exp,
    /// Natural logarithm.
    Log,
    Sqrt,
    Abs,
    Asin,
    Acos,
    Atan,
}

/// An entry of the function whitelist.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MathFunction {
    pub name: &'static str,
    pub description: &'static str,
    #[serde(skip)]
    pub op: OpCode,
}

/// The only function names an equation may call.
pub const ALLOWED_FUNCTIONS: &[MathFunction] = &[
    MathFunction { name: "sin", description: "Sine", op: OpCode::Sin },
    MathFunction { name: "cos", description: "Cosine", op: OpCode::Cos },
    MathFunction { name: "tan", description: "Tangent", op: OpCode::Tan },
    MathFunction { name: "exp", description: "Exponential", op: OpCode::Exp },
    MathFunction { name: "log", description: "Natural Logarithm", op: OpCode::Log },
    MathFunction { name: "sqrt", description: "Square Root", op: OpCode::Sqrt },
    MathFunction { name: "abs", description: "Absolute Value", op: OpCode::Abs },
    MathFunction { name: "asin", description: "Inverse Sine", op: OpCode::Asin },
    MathFunction { name: "acos", description: "Inverse Cosine", op: OpCode::Acos },
    MathFunction { name: "atan", description: "Inverse Tangent", op: OpCode::Atan },
];

pub fn lookup_function(name: &str) -> Option<&'static MathFunction> {
    ALLOWED_FUNCTIONS.iter().find(|f| f.name == name)
}

fn allowed_function_names() -> String {
    ALLOWED_FUNCTIONS
        .iter()
        .map(|f| f.name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based Virtual Machine for evaluating equations.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Variable values (read-only), indexed like [`VARIABLES`].
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Every operation is checked: undefined or non-finite results become an
/// [`EvaluationError`] instead of a NaN or infinity on the stack.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        stack: &mut Vec<T>,
    ) -> Result<T, EvaluationError> {
        stack.clear();

        for op in &bytecode.ops {
            let value = match *op {
                OpCode::LoadConst(val) => T::from_f64(val).ok_or(EvaluationError::NonFinite {
                    operation: "literal",
                })?,
                OpCode::LoadVar(idx) => *vars
                    .get(idx)
                    .ok_or(EvaluationError::MissingVariable(idx))?,
                OpCode::Add => {
                    let (a, b) = pop_pair(stack)?;
                    finite(a + b, "addition")?
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack)?;
                    finite(a - b, "subtraction")?
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack)?;
                    finite(a * b, "multiplication")?
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack)?;
                    if b.is_zero() {
                        return Err(EvaluationError::DivisionByZero);
                    }
                    finite(a / b, "division")?
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack)?;
                    if a.is_zero() && b < T::zero() {
                        return Err(EvaluationError::DivisionByZero);
                    }
                    if a < T::zero() && b.fract() != T::zero() {
                        return Err(domain("pow", a));
                    }
                    finite(a.powf(b), "exponentiation")?
                }
                OpCode::Neg => -pop(stack)?,
                OpCode::Sin => pop(stack)?.sin(),
                OpCode::Cos => pop(stack)?.cos(),
                OpCode::Tan => finite(pop(stack)?.tan(), "tan")?,
                OpCode::Exp => finite(pop(stack)?.exp(), "exp")?,
                OpCode::Log => {
                    let a = pop(stack)?;
                    if a <= T::zero() {
                        return Err(domain("log", a));
                    }
                    a.ln()
                }
                OpCode::Sqrt => {
                    let a = pop(stack)?;
                    if a < T::zero() {
                        return Err(domain("sqrt", a));
                    }
                    a.sqrt()
                }
                OpCode::Abs => pop(stack)?.abs(),
                OpCode::Asin => {
                    let a = pop(stack)?;
                    if a.abs() > T::one() {
                        return Err(domain("asin", a));
                    }
                    a.asin()
                }
                OpCode::Acos => {
                    let a = pop(stack)?;
                    if a.abs() > T::one() {
                        return Err(domain("acos", a));
                    }
                    a.acos()
                }
                OpCode::Atan => pop(stack)?.atan(),
            };
            stack.push(value);
        }

        pop(stack)
    }
}

fn pop<T>(stack: &mut Vec<T>) -> Result<T, EvaluationError> {
    stack.pop().ok_or(EvaluationError::StackUnderflow)
}

/// Pops (b, a) and returns them as (a, b).
fn pop_pair<T>(stack: &mut Vec<T>) -> Result<(T, T), EvaluationError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    Ok((a, b))
}

fn finite<T: Scalar>(value: T, operation: &'static str) -> Result<T, EvaluationError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EvaluationError::NonFinite { operation })
    }
}

fn domain<T: Scalar>(function: &'static str, argument: T) -> EvaluationError {
    EvaluationError::Domain {
        function,
        argument: argument.to_f64().unwrap_or(f64::NAN),
    }
}

// --- AST & Compiler ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    fn opcode(self) -> OpCode {
        match self {
            BinaryOp::Add => OpCode::Add,
            BinaryOp::Sub => OpCode::Sub,
            BinaryOp::Mul => OpCode::Mul,
            BinaryOp::Div => OpCode::Div,
            BinaryOp::Pow => OpCode::Pow,
        }
    }
}

/// Abstract Syntax Tree nodes for expressions.
///
/// Names are resolved while parsing, so every tree is valid by construction:
/// variables are indices into [`VARIABLES`] and calls carry the name and
/// opcode of an [`ALLOWED_FUNCTIONS`] entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(usize),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Negate(Box<Expr>),
    Call(&'static str, OpCode, Box<Expr>),
}

/// Compiles an AST (`Expr`) into postfix `Bytecode`.
pub struct Compiler;

impl Compiler {
    pub fn compile(expr: &Expr) -> Bytecode {
        let mut ops = Vec::new();
        Self::compile_recursive(expr, &mut ops);
        Bytecode { ops }
    }

    fn compile_recursive(expr: &Expr, ops: &mut Vec<OpCode>) {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(idx) => ops.push(OpCode::LoadVar(*idx)),
            Expr::Binary(left, op, right) => {
                Self::compile_recursive(left, ops);
                Self::compile_recursive(right, ops);
                ops.push(op.opcode());
            }
            Expr::Negate(operand) => {
                Self::compile_recursive(operand, ops);
                ops.push(OpCode::Neg);
            }
            Expr::Call(_, op, arg) => {
                Self::compile_recursive(arg, ops);
                ops.push(*op);
            }
        }
    }
}

// --- Parser ---

/// Parses an equation over `x` and `y` into an AST.
///
/// Grammar, lowest precedence first:
///
/// ```text
///   sum     := product (('+' | '-') product)*
///   product := unary (('*' | '/') unary)*
///   unary   := ('+' | '-') unary | power
///   power   := primary (('**' | '^') unary)?
///   primary := number | variable | function '(' sum ')' | '(' sum ')'
/// ```
///
/// Exponentiation is right-associative and binds tighter than negation, so
/// `-x**2` is `-(x**2)`.
pub fn parse(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::new("Empty expression", 0));
    }
    if let Some(token) = tokens.get(MAX_TOKENS) {
        return Err(ParseError::new(
            format!("Expression is too long (more than {MAX_TOKENS} tokens)"),
            token.position,
        ));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        end: input.len(),
        depth: 0,
    };
    let expr = parser.parse_sum()?;
    if let Some(token) = parser.consume() {
        return Err(ParseError::new(
            format!("Unexpected '{}'", token.kind),
            token.position,
        ));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Power,
    LParen,
    RParen,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{n}"),
            TokenKind::Identifier(name) => f.write_str(name),
            TokenKind::Plus => f.write_str("+"),
            TokenKind::Minus => f.write_str("-"),
            TokenKind::Star => f.write_str("*"),
            TokenKind::Slash => f.write_str("/"),
            TokenKind::Power => f.write_str("**"),
            TokenKind::LParen => f.write_str("("),
            TokenKind::RParen => f.write_str(")"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    /// Byte offset of the first character.
    position: usize,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let kind = match bytes[pos] {
            c if c.is_ascii_whitespace() => {
                pos += 1;
                continue;
            }
            c if c.is_ascii_digit() || c == b'.' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                    pos += 1;
                }
                // Only take the exponent when digits follow, so "2e" stays "2" then "e".
                if pos < bytes.len() && (bytes[pos] == b'e' || bytes[pos] == b'E') {
                    let mut exp = pos + 1;
                    if exp < bytes.len() && (bytes[exp] == b'+' || bytes[exp] == b'-') {
                        exp += 1;
                    }
                    if exp < bytes.len() && bytes[exp].is_ascii_digit() {
                        pos = exp;
                        while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                            pos += 1;
                        }
                    }
                }
                let text = &input[start..pos];
                let value: f64 = text
                    .parse()
                    .map_err(|_| ParseError::new(format!("Invalid number '{text}'"), start))?;
                if !value.is_finite() {
                    return Err(ParseError::new(
                        format!("Number '{text}' is out of range"),
                        start,
                    ));
                }
                TokenKind::Number(value)
            }
            c if c.is_ascii_alphabetic() || c == b'_' => {
                while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                TokenKind::Identifier(input[start..pos].to_string())
            }
            b'*' if bytes.get(pos + 1) == Some(&b'*') => {
                pos += 2;
                TokenKind::Power
            }
            c => {
                pos += 1;
                match c {
                    b'+' => TokenKind::Plus,
                    b'-' => TokenKind::Minus,
                    b'*' => TokenKind::Star,
                    b'/' => TokenKind::Slash,
                    b'^' => TokenKind::Power,
                    b'(' => TokenKind::LParen,
                    b')' => TokenKind::RParen,
                    _ => {
                        let ch = input[start..].chars().next().unwrap_or('?');
                        return Err(ParseError::new(
                            format!("Unexpected character '{ch}'"),
                            start,
                        ));
                    }
                }
            }
        };
        tokens.push(Token {
            kind,
            position: start,
        });
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Length of the input, reported as the position of errors at the end.
    end: usize,
    /// Current nesting of unary operators, exponents and parentheses.
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    /// Runs `parse` one nesting level deeper, failing past [`MAX_NESTING`].
    fn nested(
        &mut self,
        position: usize,
        parse: impl FnOnce(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::new("Expression is nested too deeply", position));
        }
        self.depth += 1;
        let expr = parse(self);
        self.depth -= 1;
        expr
    }

    fn parse_sum(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_product()?;

        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_product()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_product(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let negate = match self.peek() {
            Some(TokenKind::Minus) => true,
            Some(TokenKind::Plus) => false,
            _ => return self.parse_power(),
        };
        let position = self.consume().map_or(self.end, |t| t.position);
        let operand = self.nested(position, Self::parse_unary)?;
        if negate {
            Ok(Expr::Negate(Box::new(operand)))
        } else {
            Ok(operand)
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_primary()?;
        if let Some(TokenKind::Power) = self.peek() {
            let position = self.consume().map_or(self.end, |t| t.position);
            // Recursing through unary makes `a ** b ** c` right-associative
            // and allows `2 ** -1`.
            let exponent = self.nested(position, Self::parse_unary)?;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let Some(token) = self.consume() else {
            return Err(ParseError::new("Unexpected end of expression", self.end));
        };

        match token.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Identifier(name) => {
                if let Some(TokenKind::LParen) = self.peek() {
                    let function = lookup_function(&name).ok_or_else(|| {
                        ParseError::new(
                            format!(
                                "Unknown function '{name}'; allowed functions are {}",
                                allowed_function_names()
                            ),
                            token.position,
                        )
                    })?;
                    let open = self.consume().map_or(self.end, |t| t.position); // eat '('
                    let arg = self.nested(open, Self::parse_sum)?;
                    self.expect_closing(open)?;
                    Ok(Expr::Call(function.name, function.op, Box::new(arg)))
                } else if let Some(idx) = VARIABLES.iter().position(|v| *v == name) {
                    Ok(Expr::Variable(idx))
                } else if lookup_function(&name).is_some() {
                    Err(ParseError::new(
                        format!("Function '{name}' must be called with parentheses, e.g. {name}(x)"),
                        token.position,
                    ))
                } else {
                    Err(ParseError::new(
                        format!("Unknown identifier '{name}'; only x and y may be used as variables"),
                        token.position,
                    ))
                }
            }
            TokenKind::LParen => {
                let expr = self.nested(token.position, Self::parse_sum)?;
                self.expect_closing(token.position)?;
                Ok(expr)
            }
            other => Err(ParseError::new(
                format!("Unexpected '{other}'"),
                token.position,
            )),
        }
    }

    /// Consumes the `)` matching the `(` at byte offset `open`.
    fn expect_closing(&mut self, open: usize) -> Result<(), ParseError> {
        match self.consume() {
            Some(Token {
                kind: TokenKind::RParen,
                ..
            }) => Ok(()),
            Some(token) => Err(ParseError::new(
                format!("Expected ')' but found '{}'", token.kind),
                token.position,
            )),
            None => Err(ParseError::new(
                format!("Missing ')' to close '(' opened at position {open}"),
                self.end,
            )),
        }
    }
}

// --- CompiledEquation ---

/// A callable derivative `f(x, y)` compiled from equation text.
#[derive(Debug, Clone)]
pub struct CompiledEquation<T: Scalar = f64> {
    source: String,
    bytecode: Bytecode,
    // Interior mutability for VM stack to avoid allocation in evaluate.
    // Note: This makes the equation !Sync.
    stack: RefCell<Vec<T>>,
}

impl<T: Scalar> CompiledEquation<T> {
    pub fn new(source: &str) -> Result<Self, ParseError> {
        let expr = parse(source)?;
        let bytecode = Compiler::compile(&expr);
        debug!(
            "Compiled equation `{}` into {} ops",
            source.trim(),
            bytecode.ops.len()
        );
        Ok(Self {
            source: source.to_string(),
            bytecode,
            stack: RefCell::new(Vec::with_capacity(16)),
        })
    }

    /// The equation text this was compiled from.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn bytecode(&self) -> &Bytecode {
        &self.bytecode
    }

    pub fn evaluate(&self, x: T, y: T) -> Result<T, EvaluationError> {
        let mut stack = self.stack.borrow_mut();
        VM::execute(&self.bytecode, &[x, y], &mut stack)
    }
}

impl<T: Scalar> Derivative<T> for CompiledEquation<T> {
    fn slope(&self, x: T, y: T) -> Result<T, EvaluationError> {
        self.evaluate(x, y)
    }
}

/// Compiles `source` into an `f64` derivative.
pub fn compile(source: &str) -> Result<CompiledEquation, ParseError> {
    CompiledEquation::new(source)
}
