//! Sandboxed expression language used by evaluation tokens and raw conditions.
//!
//! Grammar (lowest precedence first):
//! ```text
//! expr     ::= or
//! or       ::= and ( '||' and )*
//! and      ::= equality ( '&&' equality )*
//! equality ::= compare ( ('==' | '===' | '!=' | '!==') compare )*
//! compare  ::= additive ( ('<' | '<=' | '>' | '>=') additive )*
//! additive ::= term ( ('+' | '-') term )*
//! term     ::= unary ( ('*' | '/' | '%') unary )*
//! unary    ::= ('!' | '-') unary | postfix
//! postfix  ::= primary ( '.' ident | '[' expr ']' )*
//! primary  ::= number | string | 'true' | 'false' | 'null' | ident | '(' expr ')'
//! ```
//!
//! Identifiers resolve against store bindings. There are no calls, no
//! assignment and no access to anything outside the bindings.

use std::collections::HashMap;

use salvo_types::value::{add, loose_number, number_value, strict_equals};
use salvo_types::SalvoError;
use serde_json::Value;

pub type Bindings = HashMap<String, Value>;

type Result<T> = std::result::Result<T, SalvoError>;

fn err(msg: impl Into<String>) -> SalvoError {
    SalvoError::Expression(msg.into())
}

// ---------------------------------------------------------------------------
// Tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Dot,
    LParen,
    RParen,
    LBracket,
    RBracket,
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let next2 = chars.get(i + 2).copied();
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    // A dot followed by a non-digit is member access, not a decimal point.
                    if chars[i] == '.' && !chars.get(i + 1).is_some_and(|d| d.is_ascii_digit()) {
                        break;
                    }
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| err(format!("invalid number '{}'", text)))?;
                tokens.push(Token::Number(n));
            }
            '"' | '\'' => {
                let quote = c;
                i += 1;
                let mut s = String::new();
                loop {
                    let Some(&ch) = chars.get(i) else {
                        return Err(err("unterminated string literal"));
                    };
                    i += 1;
                    match ch {
                        '\\' => {
                            let escaped = chars.get(i).copied().ok_or_else(|| err("dangling escape"))?;
                            i += 1;
                            s.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                'r' => '\r',
                                other => other,
                            });
                        }
                        ch if ch == quote => break,
                        ch => s.push(ch),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            '=' if next == Some('=') => {
                i += if next2 == Some('=') { 3 } else { 2 };
                tokens.push(Token::Eq);
            }
            '!' if next == Some('=') => {
                i += if next2 == Some('=') { 3 } else { 2 };
                tokens.push(Token::NotEq);
            }
            '<' if next == Some('=') => {
                i += 2;
                tokens.push(Token::Le);
            }
            '>' if next == Some('=') => {
                i += 2;
                tokens.push(Token::Ge);
            }
            '&' if next == Some('&') => {
                i += 2;
                tokens.push(Token::And);
            }
            '|' if next == Some('|') => {
                i += 2;
                tokens.push(Token::Or);
            }
            _ => {
                let token = match c {
                    '<' => Token::Lt,
                    '>' => Token::Gt,
                    '!' => Token::Not,
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '.' => Token::Dot,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    '[' => Token::LBracket,
                    ']' => Token::RBracket,
                    other => return Err(err(format!("unexpected character '{}'", other))),
                };
                i += 1;
                tokens.push(token);
            }
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// AST
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Var(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Bound on nesting and operator chains, so hostile input cannot exhaust the stack.
const MAX_DEPTH: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(err(format!("expression nests deeper than {} levels", MAX_DEPTH)));
        }
        Ok(())
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, wanted: Token) -> Result<()> {
        match self.advance() {
            Some(t) if t == wanted => Ok(()),
            Some(t) => Err(err(format!("expected {:?}, found {:?}", wanted, t))),
            None => Err(err(format!("expected {:?}, found end of input", wanted))),
        }
    }

    /// Parse a left-associative chain of binary operators.
    fn binary_chain(
        &mut self,
        ops: &[(Token, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr>,
    ) -> Result<Expr> {
        let mut left = next(self)?;
        let mut links = 0;
        while let Some(op) = self
            .peek()
            .and_then(|t| ops.iter().find(|(tok, _)| tok == t).map(|(_, op)| *op))
        {
            self.pos += 1;
            self.enter()?;
            links += 1;
            let right = next(self)?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        self.depth -= links;
        Ok(left)
    }

    fn or(&mut self) -> Result<Expr> {
        self.binary_chain(&[(Token::Or, BinaryOp::Or)], Self::and)
    }

    fn and(&mut self) -> Result<Expr> {
        self.binary_chain(&[(Token::And, BinaryOp::And)], Self::equality)
    }

    fn equality(&mut self) -> Result<Expr> {
        self.binary_chain(
            &[(Token::Eq, BinaryOp::Eq), (Token::NotEq, BinaryOp::NotEq)],
            Self::compare,
        )
    }

    fn compare(&mut self) -> Result<Expr> {
        self.binary_chain(
            &[
                (Token::Lt, BinaryOp::Lt),
                (Token::Le, BinaryOp::Le),
                (Token::Gt, BinaryOp::Gt),
                (Token::Ge, BinaryOp::Ge),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> Result<Expr> {
        self.binary_chain(
            &[(Token::Plus, BinaryOp::Add), (Token::Minus, BinaryOp::Sub)],
            Self::term,
        )
    }

    fn term(&mut self) -> Result<Expr> {
        self.binary_chain(
            &[
                (Token::Star, BinaryOp::Mul),
                (Token::Slash, BinaryOp::Div),
                (Token::Percent, BinaryOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.peek() {
            Some(Token::Not) => UnaryOp::Not,
            Some(Token::Minus) => UnaryOp::Neg,
            _ => return self.postfix(),
        };
        self.pos += 1;
        self.enter()?;
        let operand = self.unary()?;
        self.depth -= 1;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn postfix(&mut self) -> Result<Expr> {
        let mut expr = self.primary()?;
        let mut links = 0;
        loop {
            if matches!(self.peek(), Some(Token::Dot) | Some(Token::LBracket)) {
                self.enter()?;
                links += 1;
            }
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    match self.advance() {
                        Some(Token::Ident(name)) => expr = Expr::Member(Box::new(expr), name),
                        other => {
                            return Err(err(format!("expected member name, found {:?}", other)))
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    let index = self.or()?;
                    self.expect(Token::RBracket)?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => {
                    self.depth -= links;
                    return Ok(expr);
                }
            }
        }
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(err(format!("function calls are not allowed ('{}')", name)));
                }
                Ok(Expr::Var(name))
            }
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            Some(other) => Err(err(format!("unexpected token {:?}", other))),
            None => Err(err("unexpected end of expression")),
        }
    }
}

/// Parse an expression without evaluating it.
pub fn parse_expression(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(err("empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.or()?;
    if let Some(extra) = parser.peek() {
        return Err(err(format!("unexpected trailing token {:?}", extra)));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn as_bool(value: &Value, context: &str) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| err(format!("{} requires a boolean, found {}", context, value)))
}

fn arithmetic(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(err(format!(
            "arithmetic requires numbers, found {} and {}",
            left, right
        )));
    };
    let result = match op {
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::Rem if b == 0.0 => return Err(err("division by zero")),
        BinaryOp::Div => a / b,
        BinaryOp::Rem => a % b,
        _ => return Err(err("not an arithmetic operator")),
    };
    Ok(number_value(result))
}

fn ordering(op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
    let ord = match (left, right) {
        (Value::Number(_), Value::Number(_)) => {
            let (a, b) = (left.as_f64(), right.as_f64());
            a.partial_cmp(&b)
        }
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
    .ok_or_else(|| err(format!("cannot compare {} with {}", left, right)))?;
    let result = match op {
        BinaryOp::Lt => ord.is_lt(),
        BinaryOp::Le => ord.is_le(),
        BinaryOp::Gt => ord.is_gt(),
        BinaryOp::Ge => ord.is_ge(),
        _ => return Err(err("not a comparison operator")),
    };
    Ok(Value::Bool(result))
}

impl Expr {
    pub fn eval(&self, bindings: &Bindings) -> Result<Value> {
        match self {
            Expr::Literal(v) => Ok(v.clone()),
            Expr::Var(name) => bindings
                .get(name)
                .cloned()
                .ok_or_else(|| err(format!("unknown variable '{}'", name))),
            Expr::Member(target, name) => Ok(match target.eval(bindings)? {
                Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
                Value::Array(items) if name == "length" => Value::from(items.len()),
                Value::String(s) if name == "length" => Value::from(s.chars().count()),
                _ => Value::Null,
            }),
            Expr::Index(target, index) => {
                let target = target.eval(bindings)?;
                let index = index.eval(bindings)?;
                Ok(match (&target, &index) {
                    (Value::Array(items), _) => loose_number(&index)
                        .filter(|n| n.fract() == 0.0 && *n >= 0.0)
                        .and_then(|n| items.get(n as usize))
                        .cloned()
                        .unwrap_or(Value::Null),
                    (Value::Object(map), Value::String(key)) => {
                        map.get(key).cloned().unwrap_or(Value::Null)
                    }
                    (Value::Object(map), other) => {
                        map.get(&other.to_string()).cloned().unwrap_or(Value::Null)
                    }
                    _ => Value::Null,
                })
            }
            Expr::Unary(UnaryOp::Not, inner) => {
                Ok(Value::Bool(!as_bool(&inner.eval(bindings)?, "'!'")?))
            }
            Expr::Unary(UnaryOp::Neg, inner) => {
                let v = inner.eval(bindings)?;
                let n = v
                    .as_f64()
                    .ok_or_else(|| err(format!("cannot negate {}", v)))?;
                Ok(number_value(-n))
            }
            Expr::Binary(BinaryOp::And, l, r) => {
                if !as_bool(&l.eval(bindings)?, "'&&'")? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(as_bool(&r.eval(bindings)?, "'&&'")?))
            }
            Expr::Binary(BinaryOp::Or, l, r) => {
                if as_bool(&l.eval(bindings)?, "'||'")? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(as_bool(&r.eval(bindings)?, "'||'")?))
            }
            Expr::Binary(op, l, r) => {
                let left = l.eval(bindings)?;
                let right = r.eval(bindings)?;
                match op {
                    BinaryOp::Eq => Ok(Value::Bool(strict_equals(&left, &right))),
                    BinaryOp::NotEq => Ok(Value::Bool(!strict_equals(&left, &right))),
                    BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                        ordering(*op, &left, &right)
                    }
                    BinaryOp::Add => {
                        if left.is_string() || right.is_string() {
                            Ok(add(&left, &right))
                        } else {
                            match (left.as_f64(), right.as_f64()) {
                                (Some(_), Some(_)) => Ok(add(&left, &right)),
                                _ => Err(err(format!("cannot add {} and {}", left, right))),
                            }
                        }
                    }
                    _ => arithmetic(*op, &left, &right),
                }
            }
        }
    }
}

/// Parse and evaluate `src` against `bindings`.
pub fn evaluate(src: &str, bindings: &Bindings) -> Result<Value> {
    parse_expression(src)?.eval(bindings)
}
