//! Arithmetic-only formula language.
//!
//! Grammar (whitespace ignored):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := factor (('*' | '/') factor)*
//! factor  := ('+' | '-') factor | number | '{' name '}' | '(' expr ')'
//! number  := digits ['.' digits] [('e' | 'E') ['+' | '-'] digits]
//! ```
//!
//! There are no identifiers, calls or attribute lookups. A placeholder is
//! resolved through a caller-supplied closure at evaluation time.

use std::fmt;
use thiserror::Error;

/// Nesting deeper than this is rejected at parse time
const MAX_DEPTH: usize = 64;

/// Binary operators allowed in one formula; bounds the depth of a flat chain
const MAX_OPERATORS: usize = 512;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedChar { ch: char, offset: usize },

    #[error("malformed number '{0}'")]
    BadNumber(String),

    #[error("unterminated placeholder starting at offset {0}")]
    UnterminatedPlaceholder(usize),

    #[error("empty placeholder at offset {0}")]
    EmptyPlaceholder(usize),

    #[error("unexpected end of formula")]
    UnexpectedEnd,

    #[error("unexpected {found} at offset {offset}")]
    UnexpectedToken { found: String, offset: usize },

    #[error("formula nests deeper than {MAX_DEPTH} levels")]
    TooDeep,

    #[error("formula has more than {MAX_OPERATORS} operators")]
    TooLong,

    #[error("placeholder '{0}' has no value")]
    Unresolved(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    const fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Sub => '-',
            Self::Mul => '*',
            Self::Div => '/',
        }
    }
}

/// Parsed formula tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Placeholder(String),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

impl Expr {
    /// Evaluate, resolving each placeholder through `resolve`.
    ///
    /// A `None` from the resolver stops evaluation with
    /// [`ExprError::Unresolved`]. Callers that want a default substitute it
    /// inside the closure.
    pub fn eval<F>(&self, resolve: &mut F) -> Result<f64, ExprError>
    where
        F: FnMut(&str) -> Option<f64>,
    {
        let value = match self {
            Self::Number(n) => *n,
            Self::Placeholder(name) => {
                resolve(name).ok_or_else(|| ExprError::Unresolved(name.clone()))?
            }
            Self::Neg(inner) => -inner.eval(resolve)?,
            Self::Binary { op, lhs, rhs } => {
                let l = lhs.eval(resolve)?;
                let r = rhs.eval(resolve)?;
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => {
                        if r == 0.0 {
                            return Err(ExprError::DivisionByZero);
                        }
                        l / r
                    }
                }
            }
        };
        if value.is_finite() {
            Ok(value)
        } else {
            Err(ExprError::NonFinite)
        }
    }

    fn collect_placeholders<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Number(_) => {}
            Self::Placeholder(name) => {
                if !out.contains(&name.as_str()) {
                    out.push(name);
                }
            }
            Self::Neg(inner) => inner.collect_placeholders(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_placeholders(out);
                rhs.collect_placeholders(out);
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Placeholder(name) => write!(f, "{{{name}}}"),
            Self::Neg(inner) => write!(f, "-({inner})"),
            Self::Binary { op, lhs, rhs } => write!(f, "({lhs} {} {rhs})", op.symbol()),
        }
    }
}

/// A formula as authored plus its parsed tree
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    expr: Expr,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            depth: 0,
            operators: 0,
        };
        let expr = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(ExprError::UnexpectedToken {
                found: token.kind.describe(),
                offset: token.offset,
            });
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub const fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Placeholder names in order of first appearance
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.expr.collect_placeholders(&mut out);
        out
    }

    pub fn eval<F>(&self, mut resolve: F) -> Result<f64, ExprError>
    where
        F: FnMut(&str) -> Option<f64>,
    {
        self.expr.eval(&mut resolve)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Placeholder(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            Self::Number(n) => format!("number {n}"),
            Self::Placeholder(name) => format!("placeholder {{{name}}}"),
            Self::Plus => "'+'".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Star => "'*'".to_string(),
            Self::Slash => "'/'".to_string(),
            Self::LParen => "'('".to_string(),
            Self::RParen => "')'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let offset = i;
        let kind = match b {
            b' ' | b'\t' | b'\n' | b'\r' => {
                i += 1;
                continue;
            }
            b'+' => TokenKind::Plus,
            b'-' => TokenKind::Minus,
            b'*' => TokenKind::Star,
            b'/' => TokenKind::Slash,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b'{' => {
                let close = source[i + 1..]
                    .find(&['{', '}'][..])
                    .map(|rel| i + 1 + rel)
                    .filter(|&end| bytes[end] == b'}')
                    .ok_or(ExprError::UnterminatedPlaceholder(offset))?;
                let name = source[i + 1..close].trim();
                if name.is_empty() {
                    return Err(ExprError::EmptyPlaceholder(offset));
                }
                tokens.push(Token {
                    kind: TokenKind::Placeholder(name.to_string()),
                    offset,
                });
                i = close + 1;
                continue;
            }
            b'0'..=b'9' | b'.' => {
                let end = scan_number(bytes, i);
                let text = &source[i..end];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| ExprError::BadNumber(text.to_string()))?;
                tokens.push(Token {
                    kind: TokenKind::Number(value),
                    offset,
                });
                i = end;
                continue;
            }
            _ => {
                let ch = source[i..].chars().next().unwrap_or('?');
                return Err(ExprError::UnexpectedChar { ch, offset });
            }
        };
        tokens.push(Token { kind, offset });
        i += 1;
    }

    Ok(tokens)
}

fn scan_number(bytes: &[u8], start: usize) -> usize {
    let mut end = start;
    while end < bytes.len() && (bytes[end].is_ascii_digit() || bytes[end] == b'.') {
        end += 1;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp = end + 1;
        if exp < bytes.len() && matches!(bytes[exp], b'+' | b'-') {
            exp += 1;
        }
        if exp < bytes.len() && bytes[exp].is_ascii_digit() {
            while exp < bytes.len() && bytes[exp].is_ascii_digit() {
                exp += 1;
            }
            end = exp;
        }
    }
    end
}

struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    depth: usize,
    operators: usize,
}

impl<'t> Parser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    fn descend(&mut self) -> Result<(), ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        Ok(())
    }

    fn binary(&mut self, op: BinaryOp, lhs: Expr, rhs: Expr) -> Result<Expr, ExprError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(ExprError::TooLong);
        }
        Ok(Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn expr(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.term()?;
        while let Some(op) = self.peek().and_then(|t| match t.kind {
            TokenKind::Plus => Some(BinaryOp::Add),
            TokenKind::Minus => Some(BinaryOp::Sub),
            _ => None,
        }) {
            self.pos += 1;
            let rhs = self.term()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.factor()?;
        while let Some(op) = self.peek().and_then(|t| match t.kind {
            TokenKind::Star => Some(BinaryOp::Mul),
            TokenKind::Slash => Some(BinaryOp::Div),
            _ => None,
        }) {
            self.pos += 1;
            let rhs = self.factor()?;
            lhs = self.binary(op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn factor(&mut self) -> Result<Expr, ExprError> {
        self.descend()?;
        let token = self.next().ok_or(ExprError::UnexpectedEnd)?;
        let expr = match &token.kind {
            TokenKind::Number(n) => Expr::Number(*n),
            TokenKind::Placeholder(name) => Expr::Placeholder(name.clone()),
            TokenKind::Plus => self.factor()?,
            TokenKind::Minus => Expr::Neg(Box::new(self.factor()?)),
            TokenKind::LParen => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => inner,
                    Some(other) => {
                        return Err(ExprError::UnexpectedToken {
                            found: other.kind.describe(),
                            offset: other.offset,
                        })
                    }
                    None => return Err(ExprError::UnexpectedEnd),
                }
            }
            other => {
                return Err(ExprError::UnexpectedToken {
                    found: other.describe(),
                    offset: token.offset,
                })
            }
        };
        self.depth -= 1;
        Ok(expr)
    }
}
