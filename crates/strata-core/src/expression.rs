//! Inline expressions
//!
//! Templates such as `ds_${0..1}.t_order_${order_id % 4}` describe either a
//! set of names (actual data nodes) or a function from sharding values to a
//! name (inline sharding algorithms). Both `${...}` and `$->{...}` delimit an
//! expression.
//!
//! ```text
//! "ds_${0..1}.t_${[0, 2]}, ds_9.t_x"
//!        │
//!        ▼  split on top-level commas, parse once
//! [ [Lit "ds_", Expr 0..1, Lit ".t_", Expr [0,2]],  [Lit "ds_9.t_x"] ]
//!        │
//!        ▼  evaluate expression segments, cartesian product per part
//! ds_0.t_0, ds_0.t_2, ds_1.t_0, ds_1.t_2, ds_9.t_x
//! ```
//!
//! Supported expression syntax: integer and quoted string literals,
//! variables, `+ - * / %`, unary minus, parentheses, inclusive ranges `a..b`
//! and list literals `[a, b, c]`. Anything else is rejected at parse time.

use std::fmt;
use std::time::Instant;

use strata_types::Value;
use tracing::trace;

use crate::error::{AlgorithmError, ConfigError};

/// Default cap on the number of names one evaluation may produce
pub const DEFAULT_MAX_INLINE_EXPANSION: usize = 100_000;

/// Limits applied while evaluating an expression
#[derive(Debug, Clone, Copy)]
pub struct EvalLimits {
    /// Maximum names produced by a range or a cartesian product
    pub max_expansion: usize,
    /// Caller deadline, checked before every expansion
    pub deadline: Option<Instant>,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self { max_expansion: DEFAULT_MAX_INLINE_EXPANSION, deadline: None }
    }
}

impl EvalLimits {
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    fn check(&self, size: usize) -> Result<(), AlgorithmError> {
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(AlgorithmError::DeadlineExceeded);
        }
        if size > self.max_expansion {
            return Err(AlgorithmError::Evaluation(format!(
                "expansion of {} names exceeds the limit of {}",
                size, self.max_expansion
            )));
        }
        Ok(())
    }
}

/// A parsed inline expression template
#[derive(Debug, Clone, PartialEq)]
pub struct InlineExpression {
    source: String,
    /// Top-level comma separated parts, each a sequence of segments
    parts: Vec<Vec<Segment>>,
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Int(i64),
    Str(String),
    Var(String),
    List(Vec<Expr>),
    Range(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
enum Eval {
    Int(i64),
    Str(String),
    List(Vec<Eval>),
}

impl InlineExpression {
    /// Parse a template. Parsing happens once, at rule-build time.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let malformed = |reason: String| ConfigError::MalformedInlineExpression {
            expression: source.to_string(),
            reason,
        };

        let mut parts = Vec::new();
        for raw in split_top_level(source).map_err(malformed)? {
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            parts.push(parse_part(raw).map_err(malformed)?);
        }

        if parts.is_empty() {
            return Err(malformed("empty expression".to_string()));
        }

        Ok(Self { source: source.to_string(), parts })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of every variable referenced by the template
    pub fn variables(&self) -> Vec<&str> {
        fn collect<'a>(expr: &'a Expr, out: &mut Vec<&'a str>) {
            match expr {
                Expr::Var(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
                Expr::List(items) => items.iter().for_each(|e| collect(e, out)),
                Expr::Range(a, b) | Expr::Binary(_, a, b) => {
                    collect(a, out);
                    collect(b, out);
                }
                Expr::Neg(e) => collect(e, out),
                Expr::Int(_) | Expr::Str(_) => {}
            }
        }

        let mut out = Vec::new();
        for segment in self.parts.iter().flatten() {
            if let Segment::Expr(expr) = segment {
                collect(expr, &mut out);
            }
        }
        out
    }

    /// Expand a template that references no variables, e.g. a data-node list
    pub fn expand(&self, limits: &EvalLimits) -> Result<Vec<String>, AlgorithmError> {
        self.evaluate(&[], limits)
    }

    /// Evaluate the template with the given variable bindings
    pub fn evaluate(
        &self,
        bindings: &[(&str, &Value)],
        limits: &EvalLimits,
    ) -> Result<Vec<String>, AlgorithmError> {
        let env = Env { bindings, limits };
        let mut result = Vec::new();

        for part in &self.parts {
            let mut acc = vec![String::new()];
            for segment in part {
                let values = match segment {
                    Segment::Literal(text) => vec![text.clone()],
                    Segment::Expr(expr) => flatten(env.eval(expr)?),
                };
                limits.check(acc.len().saturating_mul(values.len()) + result.len())?;
                acc = acc
                    .iter()
                    .flat_map(|prefix| values.iter().map(move |v| format!("{prefix}{v}")))
                    .collect();
            }
            result.extend(acc);
        }

        trace!(expression = %self.source, produced = result.len(), "Inline expression evaluated");
        Ok(result)
    }
}

impl fmt::Display for InlineExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Env<'a> {
    bindings: &'a [(&'a str, &'a Value)],
    limits: &'a EvalLimits,
}

impl Env<'_> {
    fn lookup(&self, name: &str) -> Result<Eval, AlgorithmError> {
        let value = self
            .bindings
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| *v)
            .ok_or_else(|| AlgorithmError::Evaluation(format!("unknown variable `{name}`")))?;

        match value {
            Value::Int(v) => Ok(Eval::Int(*v)),
            Value::Float(v) => match value.as_i64() {
                Some(integral) => Ok(Eval::Int(integral)),
                None if v.fract() == 0.0 => Err(AlgorithmError::Evaluation(format!(
                    "variable `{name}` = {v} is outside the integer range"
                ))),
                None => Ok(Eval::Str(v.to_string())),
            },
            Value::Text(s) => Ok(Eval::Str(s.clone())),
            Value::Bool(b) => Ok(Eval::Str(b.to_string())),
            Value::Null => Err(AlgorithmError::Evaluation(format!("variable `{name}` is null"))),
            Value::Bytes(_) => Err(AlgorithmError::Evaluation(format!(
                "variable `{name}` is binary and cannot be evaluated"
            ))),
        }
    }

    fn eval(&self, expr: &Expr) -> Result<Eval, AlgorithmError> {
        match expr {
            Expr::Int(v) => Ok(Eval::Int(*v)),
            Expr::Str(s) => Ok(Eval::Str(s.clone())),
            Expr::Var(name) => self.lookup(name),
            Expr::List(items) => items.iter().map(|e| self.eval(e)).collect::<Result<_, _>>().map(Eval::List),
            Expr::Neg(inner) => {
                let v = as_int(self.eval(inner)?, "-")?;
                v.checked_neg().map(Eval::Int).ok_or_else(overflow)
            }
            Expr::Range(lower, upper) => {
                let lower = as_int(self.eval(lower)?, "..")?;
                let upper = as_int(self.eval(upper)?, "..")?;
                let size = lower.abs_diff(upper).saturating_add(1);
                self.limits.check(usize::try_from(size).unwrap_or(usize::MAX))?;
                let items = if lower <= upper {
                    (lower..=upper).map(Eval::Int).collect()
                } else {
                    (upper..=lower).rev().map(Eval::Int).collect()
                };
                Ok(Eval::List(items))
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, left, right)
            }
        }
    }
}

fn overflow() -> AlgorithmError {
    AlgorithmError::Evaluation("integer overflow".to_string())
}

fn as_int(value: Eval, op: &str) -> Result<i64, AlgorithmError> {
    match value {
        Eval::Int(v) => Ok(v),
        Eval::Str(s) => s.trim().parse().map_err(|_| {
            AlgorithmError::Evaluation(format!("cannot apply `{op}` to text `{s}`"))
        }),
        Eval::List(_) => Err(AlgorithmError::Evaluation(format!("cannot apply `{op}` to a list"))),
    }
}

fn binary(op: BinOp, left: Eval, right: Eval) -> Result<Eval, AlgorithmError> {
    if op == BinOp::Add {
        match (left, right) {
            (Eval::List(mut a), Eval::List(b)) => {
                a.extend(b);
                return Ok(Eval::List(a));
            }
            (Eval::List(mut a), scalar) => {
                a.push(scalar);
                return Ok(Eval::List(a));
            }
            (Eval::Int(a), Eval::Int(b)) => return a.checked_add(b).map(Eval::Int).ok_or_else(overflow),
            (a @ Eval::Str(_), b) | (a, b @ Eval::Str(_)) => {
                let mut out = flatten(a).concat();
                out.push_str(&flatten(b).concat());
                return Ok(Eval::Str(out));
            }
            (a, b) => {
                return Err(AlgorithmError::Evaluation(format!("cannot add {a:?} and {b:?}")));
            }
        }
    }

    let symbol = match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
        BinOp::Rem => "%",
    };
    let a = as_int(left, symbol)?;
    let b = as_int(right, symbol)?;

    let result = match op {
        BinOp::Sub => a.checked_sub(b),
        BinOp::Mul => a.checked_mul(b),
        BinOp::Div | BinOp::Rem if b == 0 => {
            return Err(AlgorithmError::Evaluation("division by zero".to_string()));
        }
        BinOp::Div => a.checked_div(b),
        BinOp::Rem => a.checked_rem(b),
        BinOp::Add => a.checked_add(b),
    };
    result.map(Eval::Int).ok_or_else(overflow)
}

fn flatten(value: Eval) -> Vec<String> {
    match value {
        Eval::Int(v) => vec![v.to_string()],
        Eval::Str(s) => vec![s],
        Eval::List(items) => items.into_iter().flat_map(flatten).collect(),
    }
}

// =============================================================================
// Template parsing
// =============================================================================

/// Split on commas outside `${...}` blocks and quotes
fn split_top_level(source: &str) -> Result<Vec<&str>, String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut last = 0;

    for (idx, ch) in source.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') if depth > 0 => quote = Some(ch),
            (None, '{') => depth += 1,
            (None, '}') => {
                depth = depth.checked_sub(1).ok_or_else(|| "unbalanced `}`".to_string())?;
            }
            (None, ',') if depth == 0 => {
                parts.push(&source[last..idx]);
                last = idx + 1;
            }
            _ => {}
        }
    }

    if depth != 0 || quote.is_some() {
        return Err("unterminated expression".to_string());
    }
    parts.push(&source[last..]);
    Ok(parts)
}

fn parse_part(part: &str) -> Result<Vec<Segment>, String> {
    let mut segments = Vec::new();
    let mut rest = part;

    while !rest.is_empty() {
        let open = match (rest.find("${"), rest.find("$->{")) {
            (Some(a), Some(b)) if b < a => Some((b, 4)),
            (Some(a), _) => Some((a, 2)),
            (None, Some(b)) => Some((b, 4)),
            (None, None) => None,
        };

        let Some((start, marker_len)) = open else {
            segments.push(Segment::Literal(rest.to_string()));
            break;
        };

        if start > 0 {
            segments.push(Segment::Literal(rest[..start].to_string()));
        }

        let body_start = start + marker_len;
        let body_len = closing_brace(&rest[body_start..])
            .ok_or_else(|| format!("missing `}}` after `{}`", &rest[start..]))?;
        let body = &rest[body_start..body_start + body_len];
        segments.push(Segment::Expr(Parser::new(body)?.parse()?));
        rest = &rest[body_start + body_len + 1..];
    }

    Ok(segments)
}

/// Byte offset of the `}` closing an expression body
fn closing_brace(body: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in body.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '{') => depth += 1,
            (None, '}') if depth == 0 => return Some(idx),
            (None, '}') => depth -= 1,
            _ => {}
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Int(i64),
    Str(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    DotDot,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text.parse().map_err(|_| format!("integer literal `{text}` out of range"))?;
                tokens.push(Token::Int(value));
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '\'' | '"' => {
                let start = i + 1;
                i += 1;
                while i < chars.len() && chars[i] != c {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err("unterminated string literal".to_string());
                }
                tokens.push(Token::Str(chars[start..i].iter().collect()));
                i += 1;
            }
            '.' if chars.get(i + 1) == Some(&'.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' => return Err("method calls and property access are not supported".to_string()),
            '+' => { tokens.push(Token::Plus); i += 1; }
            '-' => { tokens.push(Token::Minus); i += 1; }
            '*' => { tokens.push(Token::Star); i += 1; }
            '/' => { tokens.push(Token::Slash); i += 1; }
            '%' => { tokens.push(Token::Percent); i += 1; }
            '(' => { tokens.push(Token::LParen); i += 1; }
            ')' => { tokens.push(Token::RParen); i += 1; }
            '[' => { tokens.push(Token::LBracket); i += 1; }
            ']' => { tokens.push(Token::RBracket); i += 1; }
            ',' => { tokens.push(Token::Comma); i += 1; }
            other => return Err(format!("unexpected character `{other}`")),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self, String> {
        let tokens = tokenize(input)?;
        if tokens.is_empty() {
            return Err("empty `${}` block".to_string());
        }
        Ok(Self { tokens, pos: 0 })
    }

    fn parse(mut self) -> Result<Expr, String> {
        let expr = self.expr()?;
        match self.peek() {
            None => Ok(expr),
            Some(token) => Err(format!("unexpected token {token:?}")),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<(), String> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(format!("expected {token:?}, found {:?}", self.peek()))
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let lower = self.additive()?;
        if self.eat(&Token::DotDot) {
            let upper = self.additive()?;
            return Ok(Expr::Range(Box::new(lower), Box::new(upper)));
        }
        Ok(lower)
    }

    fn additive(&mut self) -> Result<Expr, String> {
        let mut left = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.term()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn term(&mut self) -> Result<Expr, String> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::Int(v)) => Ok(Expr::Int(v)),
            Some(Token::Str(s)) => Ok(Expr::Str(s)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(format!("function call `{name}(..)` is not supported"));
                }
                Ok(Expr::Var(name))
            }
            Some(Token::LParen) => {
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.expr()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
                Ok(Expr::List(items))
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn expand(source: &str) -> Vec<String> {
        InlineExpression::parse(source).unwrap().expand(&EvalLimits::default()).unwrap()
    }

    #[test]
    fn test_expand_cartesian_in_order() {
        assert_eq!(
            expand("ds_${0..1}.t_order_${0..1}"),
            vec!["ds_0.t_order_0", "ds_0.t_order_1", "ds_1.t_order_0", "ds_1.t_order_1"]
        );
    }

    #[test]
    fn test_expand_top_level_commas_and_lists() {
        assert_eq!(
            expand("ds_0.t_${[0, 2]}, ds_1.t_$->{5..4}"),
            vec!["ds_0.t_0", "ds_0.t_2", "ds_1.t_5", "ds_1.t_4"]
        );
        assert_eq!(expand("plain_table"), vec!["plain_table"]);
        assert_eq!(expand("t_${['a', \"b\"]}"), vec!["t_a", "t_b"]);
    }

    #[test]
    fn test_evaluate_with_binding() {
        let expr = InlineExpression::parse("t_order_$->{order_id % 4}").unwrap();
        let value = Value::Int(7);
        let result = expr.evaluate(&[("order_id", &value)], &EvalLimits::default()).unwrap();
        assert_eq!(result, vec!["t_order_3"]);

        let expr = InlineExpression::parse("t_${(user_id + 1) * 2 - 1}").unwrap();
        let value = Value::Int(3);
        let result = expr.evaluate(&[("USER_ID", &value)], &EvalLimits::default()).unwrap();
        assert_eq!(result, vec!["t_7"]);

        // text operands of arithmetic are read as integers
        let value = Value::Text("10".into());
        let expr = InlineExpression::parse("t_${id % 4}").unwrap();
        let result = expr.evaluate(&[("id", &value)], &EvalLimits::default()).unwrap();
        assert_eq!(result, vec!["t_2"]);
    }

    #[test]
    fn test_string_concatenation() {
        let expr = InlineExpression::parse("${'t_' + suffix}").unwrap();
        let value = Value::Text("eu".into());
        let result = expr.evaluate(&[("suffix", &value)], &EvalLimits::default()).unwrap();
        assert_eq!(result, vec!["t_eu"]);
    }

    #[test]
    fn test_variables() {
        let expr = InlineExpression::parse("t_${a % 2}_${b + a}").unwrap();
        assert_eq!(expr.variables(), vec!["a", "b"]);
    }

    #[test]
    fn test_malformed_expressions_fail_at_parse() {
        for source in ["t_${0..1", "t_${}", "t_${id.hashCode()}", "t_${abs(id)}", "t_${1 +}", "t_}"] {
            let result = InlineExpression::parse(source);
            assert!(
                matches!(result, Err(ConfigError::MalformedInlineExpression { .. })),
                "{source} should be rejected"
            );
        }
    }

    #[test]
    fn test_evaluation_errors() {
        let expr = InlineExpression::parse("t_${id % 0}").unwrap();
        let value = Value::Int(1);
        assert!(expr.evaluate(&[("id", &value)], &EvalLimits::default()).is_err());

        let expr = InlineExpression::parse("t_${missing}").unwrap();
        assert!(matches!(
            expr.evaluate(&[], &EvalLimits::default()),
            Err(AlgorithmError::Evaluation(_))
        ));
    }

    #[test]
    fn test_float_outside_integer_range_is_rejected() {
        let expr = InlineExpression::parse("t_${id % 4}").unwrap();
        let integral = Value::Float(6.0);
        assert_eq!(expr.evaluate(&[("id", &integral)], &EvalLimits::default()).unwrap(), vec!["t_2"]);

        let huge = Value::Float(1e19);
        assert!(matches!(
            expr.evaluate(&[("id", &huge)], &EvalLimits::default()),
            Err(AlgorithmError::Evaluation(_))
        ));
    }

    #[test]
    fn test_expansion_limit() {
        let expr = InlineExpression::parse("t_${0..1000}").unwrap();
        let limits = EvalLimits { max_expansion: 100, deadline: None };
        assert!(matches!(expr.expand(&limits), Err(AlgorithmError::Evaluation(_))));

        let expr = InlineExpression::parse("a_${0..9}.b_${0..9}.c_${0..9}").unwrap();
        assert!(expr.expand(&limits).is_err(), "cartesian product of 1000 names");
    }

    #[test]
    fn test_deadline_checked_before_expansion() {
        let expr = InlineExpression::parse("t_${0..10}").unwrap();
        let limits = EvalLimits::default().with_deadline(Some(Instant::now() - Duration::from_millis(1)));
        assert_eq!(expr.expand(&limits), Err(AlgorithmError::DeadlineExceeded));
    }
}
