//! Vectorized expression engine for selections, weights and observables.
//!
//! Supports arithmetic (`+ - * / **`), comparisons (`== != < <= > >=`),
//! boolean operators (`&& || !` and the bitwise spellings `& | ~`), integer
//! subscripts on ragged branches (`hits[0]`, `hits[-1]`) and the built-in
//! functions `abs sqrt log exp sin cos pow min max`.
//!
//! Evaluation is column-wise over a whole [`Chunk`]. Per-event values
//! broadcast over ragged (per-hit) values of the same event.

use std::collections::HashMap;

use crate::chunk::Chunk;
use crate::column::{Array, Column, Jagged, Mask};
use crate::error::{NtupleError, Result};

// ── Values ─────────────────────────────────────────────────────

/// Result of evaluating an expression: a constant or a per-event array.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Constant (no branch referenced).
    Scalar(f64),
    /// One value, or one list of values, per event.
    Column(Column),
}

impl Value {
    /// The constant, if this is a scalar.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Column(_) => None,
        }
    }

    /// Apply `f` to every value.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(v) => Value::Scalar(f(*v)),
            Value::Column(c) => Value::Column(c.map(f)),
        }
    }

    /// Combine two values elementwise with broadcasting.
    pub fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        Ok(match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Value::Scalar(f(*a, *b)),
            (Value::Scalar(a), Value::Column(c)) => Value::Column(c.map(|b| f(*a, b))),
            (Value::Column(c), Value::Scalar(b)) => Value::Column(c.map(|a| f(a, *b))),
            (Value::Column(a), Value::Column(b)) => Value::Column(zip_columns(a, b, &f)?),
        })
    }

    /// Elementwise product.
    pub fn mul(&self, other: &Value) -> Result<Value> {
        self.zip_with(other, |a, b| a * b)
    }

    /// Interpret as a selection: values `> 0` pass. Scalars broadcast to `n_events`.
    pub fn to_mask(&self, n_events: usize) -> Mask {
        match self {
            Value::Scalar(v) => Mask::Flat(vec![*v > 0.0; n_events]),
            Value::Column(c) => c.map(|v| v > 0.0),
        }
    }

    /// Materialize as a column; scalars broadcast to `n_events` flat values.
    pub fn into_column(self, n_events: usize) -> Column {
        match self {
            Value::Scalar(v) => Column::Flat(vec![v; n_events]),
            Value::Column(c) => c,
        }
    }
}

fn zip_columns<F: Fn(f64, f64) -> f64>(a: &Column, b: &Column, f: &F) -> Result<Column> {
    match (a, b) {
        (Array::Flat(x), Array::Flat(y)) => {
            if x.len() != y.len() {
                return Err(NtupleError::Shape(format!(
                    "cannot combine arrays of {} and {} events",
                    x.len(),
                    y.len()
                )));
            }
            Ok(Array::Flat(x.iter().zip(y).map(|(p, q)| f(*p, *q)).collect()))
        }
        (Array::Flat(_), Array::Ragged(_)) => zip_columns(&a.broadcast_like(b)?, b, f),
        (Array::Ragged(_), Array::Flat(_)) => zip_columns(a, &b.broadcast_like(a)?, f),
        (Array::Ragged(x), Array::Ragged(y)) => {
            if !x.same_structure(y) {
                return Err(NtupleError::Shape(
                    "cannot combine ragged arrays with different row lengths".into(),
                ));
            }
            Ok(Array::Ragged(Jagged {
                values: x.values.iter().zip(&y.values).map(|(p, q)| f(*p, *q)).collect(),
                offsets: x.offsets.clone(),
            }))
        }
    }
}

// ── AST ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Expr {
    Number(f64),
    Var(usize), // index into required_branches
    Index(usize, i64),
    UnaryNeg(Box<Expr>),
    UnaryNot(Box<Expr>),
    BinOp(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
}

#[derive(Debug, Clone, Copy)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    fn apply(self, lhs: f64, rhs: f64) -> f64 {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        match self {
            BinOp::Add => lhs + rhs,
            BinOp::Sub => lhs - rhs,
            BinOp::Mul => lhs * rhs,
            BinOp::Div => lhs / rhs,
            BinOp::Pow => lhs.powf(rhs),
            BinOp::Eq => flag((lhs - rhs).abs() < f64::EPSILON),
            BinOp::Ne => flag((lhs - rhs).abs() >= f64::EPSILON),
            BinOp::Lt => flag(lhs < rhs),
            BinOp::Le => flag(lhs <= rhs),
            BinOp::Gt => flag(lhs > rhs),
            BinOp::Ge => flag(lhs >= rhs),
            BinOp::And => flag(lhs > 0.0 && rhs > 0.0),
            BinOp::Or => flag(lhs > 0.0 || rhs > 0.0),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Func {
    Abs,
    Sqrt,
    Log,
    Exp,
    Sin,
    Cos,
    Pow,
    Min,
    Max,
}

impl Func {
    fn lookup(name: &str) -> Option<Func> {
        Some(match name {
            "abs" => Func::Abs,
            "sqrt" => Func::Sqrt,
            "log" => Func::Log,
            "exp" => Func::Exp,
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "pow" => Func::Pow,
            "min" => Func::Min,
            "max" => Func::Max,
            _ => return None,
        })
    }

    fn arity(self) -> usize {
        match self {
            Func::Pow | Func::Min | Func::Max => 2,
            _ => 1,
        }
    }
}

// ── Compiled expression ────────────────────────────────────────

/// A compiled expression ready for evaluation.
///
/// Variable identifiers in the expression are mapped to branch names.
#[derive(Debug, Clone)]
pub struct CompiledExpr {
    ast: Expr,
    /// Branch names referenced by this expression (ordered by first occurrence).
    pub required_branches: Vec<String>,
}

impl CompiledExpr {
    /// Parse and compile an expression string.
    pub fn compile(input: &str) -> Result<Self> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err(NtupleError::Expression("empty expression".into()));
        }
        let mut parser = Parser::new(&tokens);
        let ast = parser.parse_or()?;
        if parser.pos < parser.tokens.len() {
            return Err(NtupleError::Expression(format!(
                "unexpected token after expression: {:?}",
                parser.tokens[parser.pos]
            )));
        }
        let branches = std::mem::take(&mut parser.branches);
        Ok(CompiledExpr { ast, required_branches: branches })
    }

    /// Whether the expression references no branch.
    pub fn is_constant(&self) -> bool {
        self.required_branches.is_empty()
    }

    /// Evaluate against explicit columns.
    ///
    /// `columns` must have the same length and order as `required_branches`.
    pub fn eval_columns(&self, columns: &[&Column]) -> Result<Value> {
        if columns.len() != self.required_branches.len() {
            return Err(NtupleError::InvalidArgument(format!(
                "expected {} columns, got {}",
                self.required_branches.len(),
                columns.len()
            )));
        }
        eval_expr(&self.ast, columns, &self.required_branches)
    }

    /// Evaluate against the columns of a chunk.
    pub fn eval_chunk(&self, chunk: &Chunk) -> Result<Value> {
        let cols: Vec<&Column> = self
            .required_branches
            .iter()
            .map(|name| chunk.column(name))
            .collect::<Result<_>>()?;
        eval_expr(&self.ast, &cols, &self.required_branches)
    }
}

// ── Evaluator collaborator ─────────────────────────────────────

/// Evaluates expression strings against chunks.
pub trait Evaluate {
    /// Evaluate `expr` over every event of `chunk`.
    fn evaluate(&mut self, expr: &str, chunk: &Chunk) -> Result<Value>;
}

/// [`Evaluate`] implementation that compiles each distinct expression once.
#[derive(Debug, Default)]
pub struct ExprCache {
    compiled: HashMap<String, CompiledExpr>,
}

impl ExprCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `expr` (or fetch it from the cache).
    pub fn compile(&mut self, expr: &str) -> Result<&CompiledExpr> {
        if !self.compiled.contains_key(expr) {
            let compiled = CompiledExpr::compile(expr)?;
            self.compiled.insert(expr.to_string(), compiled);
        }
        self.compiled
            .get(expr)
            .ok_or_else(|| NtupleError::Expression(format!("expression cache miss: '{expr}'")))
    }

    /// Number of distinct compiled expressions.
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    /// Whether nothing has been compiled yet.
    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }
}

impl Evaluate for ExprCache {
    fn evaluate(&mut self, expr: &str, chunk: &Chunk) -> Result<Value> {
        self.compile(expr)?.eval_chunk(chunk)
    }
}

// ── Evaluation ─────────────────────────────────────────────────

fn eval_expr(e: &Expr, cols: &[&Column], names: &[String]) -> Result<Value> {
    match e {
        Expr::Number(n) => Ok(Value::Scalar(*n)),
        Expr::Var(i) => Ok(Value::Column(cols[*i].clone())),
        Expr::Index(i, index) => subscript(cols[*i], &names[*i], *index).map(Value::Column),
        Expr::UnaryNeg(a) => Ok(eval_expr(a, cols, names)?.map(|v| -v)),
        Expr::UnaryNot(a) => {
            Ok(eval_expr(a, cols, names)?.map(|v| if v > 0.0 { 0.0 } else { 1.0 }))
        }
        Expr::BinOp(op, a, b) => {
            let lhs = eval_expr(a, cols, names)?;
            let rhs = eval_expr(b, cols, names)?;
            lhs.zip_with(&rhs, |l, r| op.apply(l, r))
        }
        Expr::Call(f, args) => {
            let a0 = eval_expr(&args[0], cols, names)?;
            match f {
                Func::Abs => Ok(a0.map(f64::abs)),
                Func::Sqrt => Ok(a0.map(f64::sqrt)),
                Func::Log => Ok(a0.map(f64::ln)),
                Func::Exp => Ok(a0.map(f64::exp)),
                Func::Sin => Ok(a0.map(f64::sin)),
                Func::Cos => Ok(a0.map(f64::cos)),
                Func::Pow => a0.zip_with(&eval_expr(&args[1], cols, names)?, f64::powf),
                Func::Min => a0.zip_with(&eval_expr(&args[1], cols, names)?, f64::min),
                Func::Max => a0.zip_with(&eval_expr(&args[1], cols, names)?, f64::max),
            }
        }
    }
}

/// `col[index]` for every event; negative indices count from the end of the row.
fn subscript(col: &Column, name: &str, index: i64) -> Result<Column> {
    let Array::Ragged(j) = col else {
        return Err(NtupleError::Shape(format!("cannot subscript per-event branch '{name}'")));
    };
    let mut out = Vec::with_capacity(j.n_rows());
    for (entry, row) in j.rows().enumerate() {
        let len = row.len();
        let pos = if index < 0 { len as i64 + index } else { index };
        if pos < 0 || pos as usize >= len {
            return Err(NtupleError::Index { branch: name.to_string(), entry, index, len });
        }
        out.push(row[pos as usize]);
    }
    Ok(Array::Flat(out))
}

// ── Tokenizer ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    StarStar,
    Slash,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        // Two-character operators
        if let Some(&next) = chars.get(i + 1) {
            let tok = match (c, next) {
                ('&', '&') => Some(Token::And),
                ('|', '|') => Some(Token::Or),
                ('=', '=') => Some(Token::Eq),
                ('!', '=') => Some(Token::Ne),
                ('<', '=') => Some(Token::Le),
                ('>', '=') => Some(Token::Ge),
                ('*', '*') => Some(Token::StarStar),
                _ => None,
            };
            if let Some(t) = tok {
                tokens.push(t);
                i += 2;
                continue;
            }
        }

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            '!' | '~' => Some(Token::Not),
            '&' => Some(Token::And),
            '|' => Some(Token::Or),
            _ => None,
        };
        if let Some(t) = single {
            tokens.push(t);
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len()
                && (chars[i].is_ascii_digit()
                    || chars[i] == '.'
                    || chars[i] == 'e'
                    || chars[i] == 'E'
                    || ((chars[i] == '+' || chars[i] == '-')
                        && i > start
                        && (chars[i - 1] == 'e' || chars[i - 1] == 'E')))
            {
                i += 1;
            }
            let s: String = chars[start..i].iter().collect();
            let n: f64 = s
                .parse()
                .map_err(|_| NtupleError::Expression(format!("invalid number: '{s}'")))?;
            tokens.push(Token::Num(n));
        } else if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Token::Ident(chars[start..i].iter().collect()));
        } else {
            return Err(NtupleError::Expression(format!("unexpected character: '{c}'")));
        }
    }

    Ok(tokens)
}

// ── Parser (recursive descent) ─────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    branches: Vec<String>,
}

impl<'a> Parser<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0, branches: Vec::new() }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<&Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        match self.advance() {
            Some(t) if t == expected => Ok(()),
            other => {
                Err(NtupleError::Expression(format!("expected {:?}, got {:?}", expected, other)))
            }
        }
    }

    fn resolve_var(&mut self, name: &str) -> usize {
        if let Some(i) = self.branches.iter().position(|b| b == name) {
            i
        } else {
            self.branches.push(name.to_string());
            self.branches.len() - 1
        }
    }

    // ── Grammar rules ──────────────────────────────────────────

    fn parse_or(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::BinOp(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_cmp()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let rhs = self.parse_cmp()?;
            lhs = Expr::BinOp(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> Result<Expr> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(Expr::BinOp(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_add(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::BinOp(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Expr::UnaryNeg(Box::new(e)))
            }
            Some(Token::Not) => {
                self.advance();
                let e = self.parse_unary()?;
                Ok(Expr::UnaryNot(Box::new(e)))
            }
            _ => self.parse_power(),
        }
    }

    // Right-associative; binds tighter than unary minus on its left.
    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_atom()?;
        if matches!(self.peek(), Some(Token::StarStar)) {
            self.advance();
            let exp = self.parse_unary()?;
            return Ok(Expr::BinOp(BinOp::Pow, Box::new(base), Box::new(exp)));
        }
        Ok(base)
    }

    fn parse_subscript(&mut self) -> Result<i64> {
        let negative = matches!(self.peek(), Some(Token::Minus));
        if negative {
            self.advance();
        }
        let n = match self.advance() {
            Some(Token::Num(n)) if n.fract() == 0.0 => *n as i64,
            other => {
                return Err(NtupleError::Expression(format!(
                    "expected integer subscript, got {:?}",
                    other
                )));
            }
        };
        self.expect(&Token::RBracket)?;
        Ok(if negative { -n } else { n })
    }

    fn parse_atom(&mut self) -> Result<Expr> {
        match self.advance().cloned() {
            Some(Token::Num(n)) => Ok(Expr::Number(n)),
            Some(Token::LParen) => {
                let e = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(e)
            }
            Some(Token::Ident(name)) => match self.peek() {
                Some(Token::LParen) => {
                    self.advance(); // consume '('
                    let func = Func::lookup(&name).ok_or_else(|| {
                        NtupleError::Expression(format!("unknown function: '{name}'"))
                    })?;
                    let mut args = vec![self.parse_or()?];
                    while matches!(self.peek(), Some(Token::Comma)) {
                        self.advance();
                        args.push(self.parse_or()?);
                    }
                    self.expect(&Token::RParen)?;
                    if args.len() != func.arity() {
                        return Err(NtupleError::Expression(format!(
                            "{name}() takes {} argument(s), got {}",
                            func.arity(),
                            args.len()
                        )));
                    }
                    Ok(Expr::Call(func, args))
                }
                Some(Token::LBracket) => {
                    self.advance(); // consume '['
                    let index = self.parse_subscript()?;
                    let idx = self.resolve_var(&name);
                    Ok(Expr::Index(idx, index))
                }
                _ => {
                    let idx = self.resolve_var(&name);
                    Ok(Expr::Var(idx))
                }
            },
            other => Err(NtupleError::Expression(format!(
                "expected number, identifier, or '(', got {:?}",
                other
            ))),
        }
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn scalar(src: &str) -> f64 {
        let e = CompiledExpr::compile(src).unwrap();
        assert!(e.is_constant());
        e.eval_columns(&[]).unwrap().as_scalar().unwrap()
    }

    fn flat(v: &[f64]) -> Column {
        Column::Flat(v.to_vec())
    }

    #[test]
    fn simple_arithmetic() {
        assert_relative_eq!(scalar("2 + 3 * 4"), 14.0);
        assert_relative_eq!(scalar("(1 + 2) * (3 + 4)"), 21.0);
        assert_relative_eq!(scalar("1.5e2 + 3.0E-1"), 150.3, epsilon = 1e-10);
    }

    #[test]
    fn power_binds_tighter_than_negation() {
        assert_relative_eq!(scalar("-2**2"), -4.0);
        assert_relative_eq!(scalar("2**3**2"), 512.0);
        assert_relative_eq!(scalar("2**-1"), 0.5);
    }

    #[test]
    fn variables_in_order_of_first_use() {
        let e = CompiledExpr::compile("pt * weight_mc + pt").unwrap();
        assert_eq!(e.required_branches, vec!["pt", "weight_mc"]);
        let out = e.eval_columns(&[&flat(&[100.0]), &flat(&[0.5])]).unwrap();
        assert_eq!(out, Value::Column(flat(&[150.0])));
    }

    #[test]
    fn comparison_and_boolean() {
        let e = CompiledExpr::compile("njet >= 4 && pt_lead > 25.0").unwrap();
        let out = e.eval_columns(&[&flat(&[4.0, 3.0, 4.0]), &flat(&[30.0, 30.0, 20.0])]).unwrap();
        assert_eq!(out, Value::Column(flat(&[1.0, 0.0, 0.0])));
    }

    #[test]
    fn single_ampersand_joins_selections() {
        let e = CompiledExpr::compile("(x > 0)&(y < 2) | ~(x > -5)").unwrap();
        let out = e.eval_columns(&[&flat(&[1.0, 1.0, -9.0]), &flat(&[1.0, 3.0, 9.0])]).unwrap();
        assert_eq!(out, Value::Column(flat(&[1.0, 0.0, 1.0])));
    }

    #[test]
    fn functions() {
        assert_relative_eq!(scalar("sqrt(9)"), 3.0);
        assert_relative_eq!(scalar("pow(3, 2)"), 9.0);
        assert_relative_eq!(scalar("max(3, 7) + min(3, 7)"), 10.0);
        assert_relative_eq!(scalar("cos(0) + sin(0)"), 1.0);
        assert!(CompiledExpr::compile("pow(3)").is_err());
        assert!(CompiledExpr::compile("frobnicate(3)").is_err());
    }

    #[test]
    fn logical_not() {
        assert_relative_eq!(scalar("!(2 > 3)"), 1.0);
        assert_relative_eq!(scalar("!(5 > 3)"), 0.0);
    }

    #[test]
    fn per_event_broadcasts_over_hits() {
        let e = CompiledExpr::compile("amp * gain").unwrap();
        let amp = Column::Ragged(Jagged::from_rows([vec![1.0, 2.0], vec![3.0]]));
        let out = e.eval_columns(&[&amp, &flat(&[10.0, 100.0])]).unwrap();
        let Value::Column(Column::Ragged(j)) = out else { panic!("expected ragged result") };
        assert_eq!(j.values, vec![10.0, 20.0, 300.0]);
        assert_eq!(j.offsets, vec![0, 2, 3]);
    }

    #[test]
    fn subscripts_pick_one_hit_per_event() {
        let e = CompiledExpr::compile("amp[0] + amp[-1]").unwrap();
        let amp = Column::Ragged(Jagged::from_rows([vec![1.0, 2.0], vec![3.0]]));
        let out = e.eval_columns(&[&amp]).unwrap();
        assert_eq!(out, Value::Column(flat(&[3.0, 6.0])));
    }

    #[test]
    fn subscript_past_row_end_is_index_error() {
        let e = CompiledExpr::compile("amp[1]").unwrap();
        let amp = Column::Ragged(Jagged::from_rows([vec![1.0, 2.0], vec![]]));
        let err = e.eval_columns(&[&amp]).unwrap_err();
        assert!(err.is_index_error());
        assert!(matches!(err, NtupleError::Index { entry: 1, len: 0, .. }));
    }

    #[test]
    fn subscript_on_flat_branch_is_shape_error() {
        let e = CompiledExpr::compile("x[0]").unwrap();
        assert!(matches!(e.eval_columns(&[&flat(&[1.0])]), Err(NtupleError::Shape(_))));
    }

    #[test]
    fn malformed_expressions_fail() {
        assert!(CompiledExpr::compile("").is_err());
        assert!(CompiledExpr::compile("x +").is_err());
        assert!(CompiledExpr::compile("x $ y").is_err());
        assert!(CompiledExpr::compile("hits[0.5]").is_err());
        assert!(CompiledExpr::compile("(x").is_err());
    }

    #[test]
    fn cache_compiles_once() {
        let chunk = Chunk::from_columns([("x", flat(&[1.0, 2.0]))]).unwrap();
        let mut cache = ExprCache::new();
        let a = cache.evaluate("x * 2", &chunk).unwrap();
        let b = cache.evaluate("x * 2", &chunk).unwrap();
        assert_eq!(a, b);
        assert_eq!(cache.len(), 1);
        assert!(matches!(
            cache.evaluate("y", &chunk),
            Err(NtupleError::MissingColumn(name)) if name == "y"
        ));
    }

    #[test]
    fn to_mask_uses_positive_truthiness() {
        let v = Value::Column(flat(&[-1.0, 0.0, 2.0]));
        assert_eq!(v.to_mask(3), Mask::Flat(vec![false, false, true]));
        assert_eq!(Value::Scalar(1.0).to_mask(2), Mask::Flat(vec![true, true]));
    }
}
