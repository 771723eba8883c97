//! Boolean filter expressions over quote rows.
//!
//! An expression such as `changePercent > 1 && ticker =~ '^A'` is compiled
//! once and then evaluated against a projection of every quote. Numeric
//! fields are parsed out of their display strings first, so `"$3.6B"` is
//! compared as `3600000000`.
//!
//! Any failure while filtering a set (unknown variable, type mismatch, a
//! non-boolean result) clears the filter: the failing cycle renders nothing
//! and the next one renders the unfiltered set.

use crate::models::Quote;
use crate::numeric::parse_number;
use regex::Regex;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("unexpected character '{ch}' at position {position}")]
    UnexpectedChar { ch: char, position: usize },

    #[error("unterminated string starting at position {0}")]
    UnterminatedString(usize),

    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("unknown variable `{0}`")]
    UnknownVariable(String),

    #[error("cannot apply `{op}` to {left} and {right}")]
    TypeMismatch {
        op: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("expression should return a boolean, got {0}")]
    NotBoolean(&'static str),

    #[error("invalid regular expression: {0}")]
    Regex(#[from] regex::Error),
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Number(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Bool(_) => "boolean",
        }
    }
}

/// Variables visible to an expression for one quote.
pub fn project(quote: &Quote) -> HashMap<&'static str, Value> {
    let number = |text: &str| Value::Number(parse_number(text));
    HashMap::from([
        ("ticker", Value::Str(quote.ticker.clone())),
        ("last", number(&quote.last_trade)),
        ("change", number(&quote.change)),
        ("changePercent", number(&quote.change_percent)),
        ("open", number(&quote.open)),
        ("low", number(&quote.low)),
        ("high", number(&quote.high)),
        ("low52", number(&quote.low52)),
        ("high52", number(&quote.high52)),
        ("volume", number(&quote.volume)),
        ("avgVolume", number(&quote.avg_volume)),
        ("pe", number(&quote.pe_ratio)),
        ("dividend", number(&quote.dividend)),
        ("yield", number(&quote.dividend_yield)),
        ("mktCap", number(&quote.market_cap)),
        ("preOpen", number(&quote.pre_open)),
        ("afterHours", number(&quote.after_hours)),
        ("direction", Value::Number(quote.direction.signum() as f64)),
    ])
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    LParen,
    RParen,
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Match,
    NotMatch,
    Eof,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    position: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    source: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.char_indices().peekable(),
            source,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Token>, FilterError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_if(&mut self, expected: char) -> bool {
        self.chars.next_if(|&(_, c)| c == expected).is_some()
    }

    fn next_token(&mut self) -> Result<Token, FilterError> {
        while self.chars.next_if(|&(_, c)| c.is_whitespace()).is_some() {}

        let Some((position, ch)) = self.chars.next() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                position: self.source.len(),
            });
        };

        let kind = match ch {
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '=' if self.next_if('=') => TokenKind::EqEq,
            '=' if self.next_if('~') => TokenKind::Match,
            '!' if self.next_if('=') => TokenKind::NotEq,
            '!' if self.next_if('~') => TokenKind::NotMatch,
            '!' => TokenKind::Bang,
            '<' if self.next_if('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.next_if('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if self.next_if('&') => TokenKind::AndAnd,
            '|' if self.next_if('|') => TokenKind::OrOr,
            '\'' | '"' => self.string(position, ch)?,
            c if c.is_ascii_digit() || c == '.' => self.number(position)?,
            c if c.is_alphabetic() || c == '_' => self.identifier(position, c),
            c => return Err(FilterError::UnexpectedChar { ch: c, position }),
        };

        Ok(Token { kind, position })
    }

    fn string(&mut self, start: usize, quote: char) -> Result<TokenKind, FilterError> {
        let mut text = String::new();
        loop {
            match self.chars.next() {
                Some((_, c)) if c == quote => return Ok(TokenKind::Str(text)),
                Some((_, '\\')) => match self.chars.next() {
                    Some((_, c)) => text.push(c),
                    None => return Err(FilterError::UnterminatedString(start)),
                },
                Some((_, c)) => text.push(c),
                None => return Err(FilterError::UnterminatedString(start)),
            }
        }
    }

    fn number(&mut self, start: usize) -> Result<TokenKind, FilterError> {
        let mut end = start + 1;
        while let Some((i, c)) = self.chars.next_if(|&(_, c)| c.is_ascii_digit() || c == '.') {
            end = i + c.len_utf8();
        }
        let text = &self.source[start..end];
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| FilterError::Syntax(format!("invalid number `{text}` at position {start}")))
    }

    fn identifier(&mut self, start: usize, first: char) -> TokenKind {
        let mut end = start + first.len_utf8();
        while let Some(&(i, c)) = self.chars.peek() {
            if !(c.is_alphanumeric() || c == '_') {
                break;
            }
            end = i + c.len_utf8();
            self.chars.next();
        }
        match &self.source[start..end] {
            "true" => TokenKind::True,
            "false" => TokenKind::False,
            name => TokenKind::Ident(name.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// AST and parser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

/// Compiled expression tree.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Variable(String),
    Not(Box<Expr>),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Matches {
        subject: Box<Expr>,
        pattern: Regex,
        negated: bool,
    },
}

/// Deepest nesting of parentheses and prefix operators.
const MAX_DEPTH: usize = 64;
/// Longest expression accepted, so operator chains stay shallow too.
const MAX_TOKENS: usize = 512;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &TokenKind {
        self.tokens
            .get(self.pos)
            .map(|t| &t.kind)
            .unwrap_or(&TokenKind::Eof)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|t| t.position).unwrap_or(0)
    }

    fn advance(&mut self) -> TokenKind {
        let kind = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        kind
    }

    /// Run `parse` one nesting level deeper.
    fn nested(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<Expr, FilterError>,
    ) -> Result<Expr, FilterError> {
        if self.depth >= MAX_DEPTH {
            return Err(FilterError::Syntax("expression nested too deeply".into()));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse(mut self) -> Result<Expr, FilterError> {
        if self.tokens.len() > MAX_TOKENS {
            return Err(FilterError::Syntax("expression too long".into()));
        }
        let expr = self.or()?;
        match self.peek() {
            TokenKind::Eof => Ok(expr),
            other => Err(FilterError::Syntax(format!(
                "unexpected {other:?} at position {}",
                self.position()
            ))),
        }
    }

    fn or(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.and()?;
        while *self.peek() == TokenKind::OrOr {
            self.advance();
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.comparison()?;
        while *self.peek() == TokenKind::AndAnd {
            self.advance();
            let right = self.comparison()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, FilterError> {
        let left = self.additive()?;
        let op = match self.peek() {
            TokenKind::EqEq => BinaryOp::Eq,
            TokenKind::NotEq => BinaryOp::Ne,
            TokenKind::Lt => BinaryOp::Lt,
            TokenKind::Le => BinaryOp::Le,
            TokenKind::Gt => BinaryOp::Gt,
            TokenKind::Ge => BinaryOp::Ge,
            TokenKind::Match | TokenKind::NotMatch => return self.regex_match(left),
            _ => return Ok(left),
        };
        self.advance();
        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn regex_match(&mut self, subject: Expr) -> Result<Expr, FilterError> {
        let negated = self.advance() == TokenKind::NotMatch;
        let position = self.position();
        match self.advance() {
            TokenKind::Str(pattern) => Ok(Expr::Matches {
                subject: Box::new(subject),
                pattern: Regex::new(&pattern)?,
                negated,
            }),
            _ => Err(FilterError::Syntax(format!(
                "expected a quoted pattern at position {position}"
            ))),
        }
    }

    fn additive(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, FilterError> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, FilterError> {
        match self.peek() {
            TokenKind::Bang => {
                self.advance();
                self.nested(|p| Ok(Expr::Not(Box::new(p.unary()?))))
            }
            TokenKind::Minus => {
                self.advance();
                self.nested(|p| Ok(Expr::Negate(Box::new(p.unary()?))))
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<Expr, FilterError> {
        let position = self.position();
        match self.advance() {
            TokenKind::Number(n) => Ok(Expr::Literal(Value::Number(n))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            TokenKind::True => Ok(Expr::Literal(Value::Bool(true))),
            TokenKind::False => Ok(Expr::Literal(Value::Bool(false))),
            TokenKind::Ident(name) => Ok(Expr::Variable(name)),
            TokenKind::LParen => {
                let inner = self.nested(Self::or)?;
                match self.advance() {
                    TokenKind::RParen => Ok(inner),
                    _ => Err(FilterError::Syntax(format!(
                        "unclosed parenthesis at position {position}"
                    ))),
                }
            }
            TokenKind::Eof => Err(FilterError::Syntax("unexpected end of expression".into())),
            other => Err(FilterError::Syntax(format!(
                "unexpected {other:?} at position {position}"
            ))),
        }
    }
}

/// Compile an expression once so it can be evaluated per quote.
pub fn compile(source: &str) -> Result<Expr, FilterError> {
    let tokens = Lexer::new(source).tokenize()?;
    Parser {
        tokens,
        pos: 0,
        depth: 0,
    }
    .parse()
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

impl Expr {
    pub fn evaluate(&self, vars: &HashMap<&'static str, Value>) -> Result<Value, FilterError> {
        match self {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Variable(name) => vars
                .get(name.as_str())
                .cloned()
                .ok_or_else(|| FilterError::UnknownVariable(name.clone())),
            Expr::Not(inner) => match inner.evaluate(vars)? {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                other => Err(mismatch("!", &other, &other)),
            },
            Expr::Negate(inner) => match inner.evaluate(vars)? {
                Value::Number(n) => Ok(Value::Number(-n)),
                other => Err(mismatch("-", &other, &other)),
            },
            Expr::Matches {
                subject,
                pattern,
                negated,
            } => match subject.evaluate(vars)? {
                Value::Str(s) => Ok(Value::Bool(pattern.is_match(&s) != *negated)),
                other => Err(FilterError::TypeMismatch {
                    op: if *negated { "!~" } else { "=~" },
                    left: other.kind(),
                    right: "string",
                }),
            },
            Expr::Binary(BinaryOp::And, left, right) => {
                if !as_bool("&&", left.evaluate(vars)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(as_bool("&&", right.evaluate(vars)?)?))
            }
            Expr::Binary(BinaryOp::Or, left, right) => {
                if as_bool("||", left.evaluate(vars)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(as_bool("||", right.evaluate(vars)?)?))
            }
            Expr::Binary(op, left, right) => binary(*op, left.evaluate(vars)?, right.evaluate(vars)?),
        }
    }
}

fn as_bool(op: &'static str, value: Value) -> Result<bool, FilterError> {
    match value {
        Value::Bool(b) => Ok(b),
        other => Err(mismatch(op, &other, &Value::Bool(false))),
    }
}

fn mismatch(op: &'static str, left: &Value, right: &Value) -> FilterError {
    FilterError::TypeMismatch {
        op,
        left: left.kind(),
        right: right.kind(),
    }
}

fn binary(op: BinaryOp, left: Value, right: Value) -> Result<Value, FilterError> {
    use BinaryOp::*;

    let value = match (op, &left, &right) {
        (Add, Value::Number(a), Value::Number(b)) => Value::Number(a + b),
        (Add, Value::Str(a), Value::Str(b)) => Value::Str(format!("{a}{b}")),
        (Sub, Value::Number(a), Value::Number(b)) => Value::Number(a - b),
        (Mul, Value::Number(a), Value::Number(b)) => Value::Number(a * b),
        (Div, Value::Number(a), Value::Number(b)) => Value::Number(a / b),

        (Eq, a, b) if a.kind() == b.kind() => Value::Bool(a == b),
        (Ne, a, b) if a.kind() == b.kind() => Value::Bool(a != b),

        (Lt, Value::Number(a), Value::Number(b)) => Value::Bool(a < b),
        (Le, Value::Number(a), Value::Number(b)) => Value::Bool(a <= b),
        (Gt, Value::Number(a), Value::Number(b)) => Value::Bool(a > b),
        (Ge, Value::Number(a), Value::Number(b)) => Value::Bool(a >= b),

        (Lt, Value::Str(a), Value::Str(b)) => Value::Bool(a < b),
        (Le, Value::Str(a), Value::Str(b)) => Value::Bool(a <= b),
        (Gt, Value::Str(a), Value::Str(b)) => Value::Bool(a > b),
        (Ge, Value::Str(a), Value::Str(b)) => Value::Bool(a >= b),

        _ => return Err(mismatch(op.symbol(), &left, &right)),
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// The active filter: its source text and the compiled form.
#[derive(Clone, Default)]
pub struct Filter {
    source: String,
    compiled: Option<Expr>,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("source", &self.source)
            .field("compiled", &self.compiled.is_some())
            .finish()
    }
}

impl Filter {
    /// Keep the source even if it fails to compile; the first `apply` clears it.
    pub fn new(source: &str) -> Self {
        let source = source.trim().to_string();
        let compiled = if source.is_empty() {
            None
        } else {
            match compile(&source) {
                Ok(expr) => Some(expr),
                Err(e) => {
                    warn!(filter = %source, error = %e, "Filter expression does not compile");
                    None
                }
            }
        };
        Self { source, compiled }
    }

    /// Compile eagerly and refuse invalid input.
    pub fn try_new(source: &str) -> Result<Self, FilterError> {
        let source = source.trim().to_string();
        if source.is_empty() {
            return Ok(Self::default());
        }
        let compiled = compile(&source)?;
        Ok(Self {
            source,
            compiled: Some(compiled),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_active(&self) -> bool {
        !self.source.is_empty()
    }

    pub fn clear(&mut self) {
        self.source.clear();
        self.compiled = None;
    }

    /// Keep the quotes the expression accepts.
    ///
    /// An empty filter passes everything through. Any evaluation failure
    /// clears the filter and returns an empty set for this cycle.
    pub fn apply(&mut self, quotes: Vec<Quote>) -> Vec<Quote> {
        if !self.is_active() {
            return quotes;
        }
        let Some(expr) = &self.compiled else {
            warn!(filter = %self.source, "Clearing filter that failed to compile");
            self.clear();
            return Vec::new();
        };

        let mut kept = Vec::with_capacity(quotes.len());
        for quote in quotes {
            match expr.evaluate(&project(&quote)) {
                Ok(Value::Bool(true)) => kept.push(quote),
                Ok(Value::Bool(false)) => {}
                Ok(other) => {
                    let error = FilterError::NotBoolean(other.kind());
                    warn!(filter = %self.source, error = %error, "Clearing filter");
                    self.clear();
                    return Vec::new();
                }
                Err(error) => {
                    warn!(filter = %self.source, ticker = %quote.ticker, error = %error, "Clearing filter");
                    self.clear();
                    return Vec::new();
                }
            }
        }
        kept
    }
}
