//! Sandboxed arithmetic expression compiler for reward formulas.
//!
//! Accepts numeric literals, the four metric names (`variance` aliases
//! `uniformity`), `+ - * /`, unary `+ -`, and calls to `abs`, `min`, `max`,
//! `clamp`. Everything else is rejected at compile time. Compiles once to
//! a tagged tree (`ExprNode`) and evaluates per call -- it never re-parses.

use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The three reward metrics a compiled formula can reference. `variance` is
/// a pure alias of `uniformity`, resolved at compile time.
#[derive(Clone, Copy, Debug, Default)]
pub struct RewardMetrics {
    pub coverage: f64,
    pub uniformity: f64,
    pub collisions: f64,
}

/// Bounds the final reward value, mirroring the prior document's
/// `clamp.max_speed`. Defaults to `[-1, 1]`, a reasonable envelope for the
/// small weighted-metric formulas this DSL is meant to express.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct RewardClamp {
    #[serde(default = "default_clamp_min")]
    pub min: f64,
    #[serde(default = "default_clamp_max")]
    pub max: f64,
}

fn default_clamp_min() -> f64 {
    -1.0
}

fn default_clamp_max() -> f64 {
    1.0
}

impl Default for RewardClamp {
    fn default() -> Self {
        RewardClamp { min: default_clamp_min(), max: default_clamp_max() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RewardDocument {
    pub formula: String,
    #[serde(default)]
    pub clamp: RewardClamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MetricName {
    Coverage,
    Uniformity,
    Collisions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Func {
    Abs,
    Min,
    Max,
    Clamp,
}

#[derive(Clone, Debug)]
enum ExprNode {
    Num(f64),
    Metric(MetricName),
    Neg(Box<ExprNode>),
    Bin(BinOp, Box<ExprNode>, Box<ExprNode>),
    Call(Func, Vec<ExprNode>),
}

impl ExprNode {
    fn eval(&self, m: &RewardMetrics) -> f64 {
        match self {
            ExprNode::Num(n) => *n,
            ExprNode::Metric(MetricName::Coverage) => m.coverage,
            ExprNode::Metric(MetricName::Uniformity) => m.uniformity,
            ExprNode::Metric(MetricName::Collisions) => m.collisions,
            ExprNode::Neg(e) => -e.eval(m),
            ExprNode::Bin(op, l, r) => {
                let (l, r) = (l.eval(m), r.eval(m));
                match op {
                    BinOp::Add => l + r,
                    BinOp::Sub => l - r,
                    BinOp::Mul => l * r,
                    BinOp::Div => l / r,
                }
            }
            ExprNode::Call(f, args) => {
                let v: Vec<f64> = args.iter().map(|a| a.eval(m)).collect();
                match f {
                    Func::Abs => v[0].abs(),
                    Func::Min => v[0].min(v[1]),
                    Func::Max => v[0].max(v[1]),
                    Func::Clamp => v[1].max(v[2].min(v[0])),
                }
            }
        }
    }
}

/// A compiled, deterministic `RewardMetrics -> f64` function.
#[derive(Clone)]
pub struct CompiledExpr {
    root: Arc<ExprNode>,
    clamp: RewardClamp,
}

impl CompiledExpr {
    /// Evaluates the compiled tree, then clamps to `[clamp.min, clamp.max]`.
    /// Any missing metric has already been defaulted to 0.0 by
    /// `RewardMetrics::default`; a NaN result (e.g. `0.0/0.0` inside the
    /// formula) is treated as a runtime evaluation failure and degrades to
    /// 0.0 before clamping.
    pub fn eval(&self, metrics: &RewardMetrics) -> f64 {
        let v = self.root.eval(metrics);
        let v = if v.is_finite() {
            v
        } else {
            tracing::warn!("reward expression produced a non-finite value; degrading to 0.0");
            0.0
        };
        v.clamp(self.clamp.min, self.clamp.max)
    }
}

/// Validates `doc.clamp` (`min <= max`) and compiles `doc.formula`.
pub fn compile_reward_expr(doc: &RewardDocument) -> Result<CompiledExpr, AppError> {
    if doc.clamp.min > doc.clamp.max {
        return Err(AppError::SchemaViolation(format!(
            "reward clamp.min {} exceeds clamp.max {}",
            doc.clamp.min, doc.clamp.max
        )));
    }
    let tokens = tokenize(&doc.formula)?;
    let mut parser = Parser { tokens, pos: 0 };
    let root = parser.parse_expr()?;
    parser.expect_end()?;
    Ok(CompiledExpr { root: Arc::new(root), clamp: doc.clamp })
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Comma,
}

fn tokenize(src: &str) -> Result<Vec<Token>, AppError> {
    let mut chars = src.chars().peekable();
    let mut out = Vec::new();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '+' => {
                chars.next();
                out.push(Token::Plus);
            }
            '-' => {
                chars.next();
                out.push(Token::Minus);
            }
            '*' => {
                chars.next();
                out.push(Token::Star);
            }
            '/' => {
                chars.next();
                out.push(Token::Slash);
            }
            '(' => {
                chars.next();
                out.push(Token::LParen);
            }
            ')' => {
                chars.next();
                out.push(Token::RParen);
            }
            ',' => {
                chars.next();
                out.push(Token::Comma);
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_digit() || c == '.' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = s
                    .parse()
                    .map_err(|_| AppError::ExprRejected(format!("invalid numeric literal '{s}'")))?;
                out.push(Token::Num(n));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        s.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push(Token::Ident(s));
            }
            other => {
                return Err(AppError::ExprRejected(format!("disallowed character '{other}'")));
            }
        }
    }
    Ok(out)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_end(&self) -> Result<(), AppError> {
        if self.pos == self.tokens.len() {
            Ok(())
        } else {
            Err(AppError::ExprRejected("trailing tokens after expression".to_string()))
        }
    }

    fn parse_expr(&mut self) -> Result<ExprNode, AppError> {
        let mut node = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    node = ExprNode::Bin(BinOp::Add, Box::new(node), Box::new(rhs));
                }
                Some(Token::Minus) => {
                    self.advance();
                    let rhs = self.parse_term()?;
                    node = ExprNode::Bin(BinOp::Sub, Box::new(node), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_term(&mut self) -> Result<ExprNode, AppError> {
        let mut node = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    node = ExprNode::Bin(BinOp::Mul, Box::new(node), Box::new(rhs));
                }
                Some(Token::Slash) => {
                    self.advance();
                    let rhs = self.parse_unary()?;
                    node = ExprNode::Bin(BinOp::Div, Box::new(node), Box::new(rhs));
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<ExprNode, AppError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.advance();
                Ok(ExprNode::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Plus) => {
                self.advance();
                self.parse_unary()
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<ExprNode, AppError> {
        match self.advance() {
            Some(Token::Num(n)) => Ok(ExprNode::Num(n)),
            Some(Token::LParen) => {
                let e = self.parse_expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(e),
                    _ => Err(AppError::ExprRejected("unclosed parenthesis".to_string())),
                }
            }
            Some(Token::Ident(name)) => self.parse_ident(&name),
            other => Err(AppError::ExprRejected(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_ident(&mut self, name: &str) -> Result<ExprNode, AppError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            let func = match name {
                "abs" => Func::Abs,
                "min" => Func::Min,
                "max" => Func::Max,
                "clamp" => Func::Clamp,
                other => return Err(AppError::ExprRejected(format!("call to unlisted function '{other}'"))),
            };
            self.advance(); // '('
            let mut args = Vec::new();
            if !matches!(self.peek(), Some(Token::RParen)) {
                args.push(self.parse_expr()?);
                while matches!(self.peek(), Some(Token::Comma)) {
                    self.advance();
                    args.push(self.parse_expr()?);
                }
            }
            match self.advance() {
                Some(Token::RParen) => {}
                _ => return Err(AppError::ExprRejected("unclosed call".to_string())),
            }
            let expected = match func {
                Func::Abs => 1,
                Func::Min | Func::Max => 2,
                Func::Clamp => 3,
            };
            if args.len() != expected {
                return Err(AppError::ExprRejected(format!(
                    "{name} expects {expected} argument(s), got {}",
                    args.len()
                )));
            }
            Ok(ExprNode::Call(func, args))
        } else {
            match name {
                "coverage" => Ok(ExprNode::Metric(MetricName::Coverage)),
                "uniformity" | "variance" => Ok(ExprNode::Metric(MetricName::Uniformity)),
                "collisions" => Ok(ExprNode::Metric(MetricName::Collisions)),
                other => Err(AppError::ExprRejected(format!("identifier '{other}' is not in the allowed set"))),
            }
        }
    }
}
