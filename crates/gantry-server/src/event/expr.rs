// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! A small expression language over JSON values.
//!
//! Used for event binding selectors, parameter extraction and RBAC rules.
//! Supports `&&`, `||`, `!`, equality and ordering comparisons, `in`, `+`,
//! member access (`payload.message`), indexing (`metadata["x-tenant"]`) and
//! string, number, boolean, null and list literals. Missing members evaluate to
//! null rather than failing, so selectors can read optional payload fields.
//! `&&` and `||` short-circuit.

use std::collections::BTreeMap;

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ExprError(pub String);

/// Evaluate an expression to a JSON value.
pub fn eval(src: &str, env: &BTreeMap<String, Value>) -> Result<Value, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.or_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError(format!("unexpected trailing input in {src:?}")));
    }
    eval_expr(&expr, env)
}

/// Evaluate an expression that must produce a boolean.
pub fn eval_bool(src: &str, env: &BTreeMap<String, Value>) -> Result<bool, ExprError> {
    match eval(src, env)? {
        Value::Bool(b) => Ok(b),
        other => Err(ExprError(format!(
            "expression did not evaluate to a boolean (got {other})"
        ))),
    }
}

/// Evaluate an expression and render the result as a string. Scalars render
/// bare; arrays and objects render as JSON.
pub fn eval_string(src: &str, env: &BTreeMap<String, Value>) -> Result<String, ExprError> {
    Ok(stringify(&eval(src, env)?))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    True,
    False,
    Null,
    OpenParen,
    CloseParen,
    OpenBracket,
    CloseBracket,
    Dot,
    Not,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Plus,
    In,
    Comma,
}

fn tokenize(src: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let mut chars = src.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' | '\r' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::OpenParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::CloseParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::OpenBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::CloseBracket);
            }
            '.' => {
                chars.next();
                tokens.push(Token::Dot);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_none() {
                    return Err(ExprError("expected &&".into()));
                }
                tokens.push(Token::And);
            }
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_none() {
                    return Err(ExprError("expected ||".into()));
                }
                tokens.push(Token::Or);
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(ExprError("expected ==".into()));
                }
                tokens.push(Token::Eq);
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some('\\') => match chars.next() {
                            Some('n') => s.push('\n'),
                            Some('t') => s.push('\t'),
                            Some(esc) => s.push(esc),
                            None => return Err(ExprError("unterminated string".into())),
                        },
                        Some(ch) => s.push(ch),
                        None => return Err(ExprError("unterminated string".into())),
                    }
                }
                tokens.push(Token::Str(s));
            }
            c if c.is_ascii_digit() => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let n: f64 = s
                    .parse()
                    .map_err(|_| ExprError(format!("bad number {s:?}")))?;
                tokens.push(Token::Num(n));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_alphanumeric() || d == '_' || d == '-' {
                        s.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match s.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "in" => Token::In,
                    _ => Token::Ident(s),
                });
            }
            other => return Err(ExprError(format!("unexpected character {other:?}"))),
        }
    }
    Ok(tokens)
}

#[derive(Debug)]
enum Expr {
    Lit(Value),
    List(Vec<Expr>),
    Ident(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Equality { left: Box<Expr>, right: Box<Expr>, negate: bool },
    Compare(Box<Expr>, Box<Expr>, Token),
    Add(Box<Expr>, Box<Expr>),
    In(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: Token) -> Result<(), ExprError> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            other => Err(ExprError(format!("expected {token:?}, got {other:?}"))),
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.and_expr()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.equality()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn equality(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.comparison()?;
        loop {
            let negate = match self.peek() {
                Some(Token::Eq) => false,
                Some(Token::Ne) => true,
                _ => break,
            };
            self.next();
            let right = self.comparison()?;
            left = Expr::Equality {
                left: Box::new(left),
                right: Box::new(right),
                negate,
            };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => Token::Lt,
                Some(Token::Gt) => Token::Gt,
                Some(Token::Le) => Token::Le,
                Some(Token::Ge) => Token::Ge,
                Some(Token::In) => Token::In,
                _ => break,
            };
            self.next();
            let right = self.additive()?;
            left = if op == Token::In {
                Expr::In(Box::new(left), Box::new(right))
            } else {
                Expr::Compare(Box::new(left), Box::new(right), op)
            };
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::Plus) {
            self.next();
            let right = self.unary()?;
            left = Expr::Add(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.peek() == Some(&Token::Not) {
            self.next();
            let value = self.unary()?;
            return Ok(Expr::Not(Box::new(value)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExprError> {
        let mut value = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.next();
                    let Some(Token::Ident(field)) = self.next() else {
                        return Err(ExprError("expected field name after '.'".into()));
                    };
                    value = Expr::Member(Box::new(value), field);
                }
                Some(Token::OpenBracket) => {
                    self.next();
                    let index = self.or_expr()?;
                    self.expect(Token::CloseBracket)?;
                    value = Expr::Index(Box::new(value), Box::new(index));
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Expr::Lit(Value::String(s))),
            Some(Token::Num(n)) => Ok(Expr::Lit(serde_json::json!(n))),
            Some(Token::True) => Ok(Expr::Lit(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Lit(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Lit(Value::Null)),
            Some(Token::Ident(name)) => Ok(Expr::Ident(name)),
            Some(Token::OpenBracket) => {
                let mut items = Vec::new();
                if self.peek() == Some(&Token::CloseBracket) {
                    self.next();
                    return Ok(Expr::List(items));
                }
                loop {
                    items.push(self.or_expr()?);
                    match self.next() {
                        Some(Token::Comma) => continue,
                        Some(Token::CloseBracket) => break,
                        other => {
                            return Err(ExprError(format!(
                                "expected ',' or ']' in list, got {other:?}"
                            )));
                        }
                    }
                }
                Ok(Expr::List(items))
            }
            Some(Token::OpenParen) => {
                let value = self.or_expr()?;
                self.expect(Token::CloseParen)?;
                Ok(value)
            }
            other => Err(ExprError(format!("unexpected token {other:?}"))),
        }
    }
}

fn eval_expr(expr: &Expr, env: &BTreeMap<String, Value>) -> Result<Value, ExprError> {
    match expr {
        Expr::Lit(v) => Ok(v.clone()),
        Expr::List(items) => Ok(Value::Array(
            items.iter().map(|e| eval_expr(e, env)).collect::<Result<_, _>>()?,
        )),
        Expr::Ident(name) => Ok(env.get(name).cloned().unwrap_or(Value::Null)),
        Expr::Member(target, field) => Ok(member(&eval_expr(target, env)?, field)),
        Expr::Index(target, index) => {
            let target = eval_expr(target, env)?;
            let index = eval_expr(index, env)?;
            Ok(match (&target, &index) {
                (Value::Array(items), Value::Number(n)) => n
                    .as_u64()
                    .and_then(|i| items.get(i as usize))
                    .cloned()
                    .unwrap_or(Value::Null),
                (_, Value::String(key)) => member(&target, key),
                _ => Value::Null,
            })
        }
        Expr::Not(inner) => Ok(Value::Bool(!truthy(&eval_expr(inner, env)?)?)),
        // the right operand only runs when the left does not decide
        Expr::And(left, right) => {
            if !truthy(&eval_expr(left, env)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(truthy(&eval_expr(right, env)?)?))
        }
        Expr::Or(left, right) => {
            if truthy(&eval_expr(left, env)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(truthy(&eval_expr(right, env)?)?))
        }
        Expr::Equality { left, right, negate } => {
            let equal = values_equal(&eval_expr(left, env)?, &eval_expr(right, env)?);
            Ok(Value::Bool(equal != *negate))
        }
        Expr::Compare(left, right, op) => {
            Ok(Value::Bool(compare(&eval_expr(left, env)?, &eval_expr(right, env)?, op)?))
        }
        Expr::Add(left, right) => add(&eval_expr(left, env)?, &eval_expr(right, env)?),
        Expr::In(item, container) => {
            Ok(Value::Bool(contains(&eval_expr(item, env)?, &eval_expr(container, env)?)?))
        }
    }
}

fn contains(item: &Value, container: &Value) -> Result<bool, ExprError> {
    match container {
        Value::Array(items) => Ok(items.iter().any(|v| values_equal(item, v))),
        Value::Object(map) => match item {
            Value::String(key) => Ok(map.contains_key(key)),
            _ => Ok(false),
        },
        Value::String(s) => match item {
            Value::String(needle) => Ok(s.contains(needle.as_str())),
            other => Err(ExprError(format!("cannot search a string for {other}"))),
        },
        other => Err(ExprError(format!("cannot test membership in {other}"))),
    }
}

fn member(value: &Value, field: &str) -> Value {
    match value {
        Value::Object(map) => map.get(field).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn truthy(value: &Value) -> Result<bool, ExprError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(ExprError(format!("expected a boolean, got {other}"))),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare(left: &Value, right: &Value, op: &Token) -> Result<bool, ExprError> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a
                .partial_cmp(&b)
                .ok_or_else(|| ExprError("incomparable numbers".into()))?,
            _ => {
                return Err(ExprError(format!("cannot compare {left} and {right}")));
            }
        },
    };
    Ok(match op {
        Token::Lt => ordering.is_lt(),
        Token::Gt => ordering.is_gt(),
        Token::Le => ordering.is_le(),
        Token::Ge => ordering.is_ge(),
        _ => unreachable!(),
    })
}

fn add(left: &Value, right: &Value) -> Result<Value, ExprError> {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        return Ok(serde_json::json!(a + b));
    }
    match (left, right) {
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", stringify(left), stringify(right))))
        }
        _ => Err(ExprError(format!("cannot add {left} and {right}"))),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn env(payload: Value) -> BTreeMap<String, Value> {
        let mut env = BTreeMap::new();
        env.insert("payload".to_string(), payload);
        env.insert("discriminator".to_string(), json!("my-discriminator"));
        env.insert(
            "metadata".to_string(),
            json!({"x-tenant": ["acme"], "x-source": ["ci"]}),
        );
        env
    }

    #[test]
    fn selector_expressions() {
        let e = env(json!({"appName": "guestbook", "replicas": 3, "ok": true}));
        assert!(eval_bool(r#"payload.appName == "guestbook""#, &e).unwrap());
        assert!(eval_bool(r#"payload.replicas > 2 && payload.ok"#, &e).unwrap());
        assert!(eval_bool(r#"discriminator == "my-discriminator""#, &e).unwrap());
        assert!(eval_bool(r#"metadata["x-tenant"][0] == "acme""#, &e).unwrap());
        assert!(!eval_bool(r#"payload.appName != "guestbook""#, &e).unwrap());
        assert!(eval_bool(r#"!(payload.replicas >= 4)"#, &e).unwrap());
    }

    #[test]
    fn missing_members_are_null_not_errors() {
        let e = env(json!({}));
        assert!(!eval_bool(r#"payload.missing == "x""#, &e).unwrap());
        assert!(eval_bool(r#"payload.missing == null"#, &e).unwrap());
    }

    #[test]
    fn string_extraction_and_concat() {
        let e = env(json!({"message": "hello", "count": 2}));
        assert_eq!(eval_string("payload.message", &e).unwrap(), "hello");
        assert_eq!(
            eval_string(r#"payload.message + "-" + payload.count"#, &e).unwrap(),
            "hello-2"
        );
        assert_eq!(eval_string("payload.count", &e).unwrap(), "2");
        assert_eq!(eval_string("payload.missing", &e).unwrap(), "");
    }

    #[test]
    fn in_tests_membership() {
        let e = env(json!({"branch": "main", "labels": {"ci": "yes"}, "tags": ["v1", "v2"]}));
        assert!(eval_bool(r#""v2" in payload.tags"#, &e).unwrap());
        assert!(!eval_bool(r#""v3" in payload.tags"#, &e).unwrap());
        assert!(eval_bool(r#""ci" in payload.labels"#, &e).unwrap());
        assert!(eval_bool(r#""ai" in payload.branch"#, &e).unwrap());
        assert!(eval_bool(r#"payload.branch in ["main", "release"]"#, &e).unwrap());
        assert!(!eval_bool(r#"payload.branch in ["develop"]"#, &e).unwrap());

        let err = eval_bool(r#""x" in payload.missing"#, &e).unwrap_err();
        assert!(err.to_string().contains("membership"));
    }

    #[test]
    fn boolean_operators_short_circuit() {
        let e = env(json!({"ok": false}));
        // the right side would fail on its own: null is not comparable
        assert!(!eval_bool(r#"payload.ok && payload.missing.deep > 1"#, &e).unwrap());
        assert!(eval_bool(r#"discriminator == "my-discriminator" || payload.missing.deep > 1"#, &e)
            .unwrap());
        assert!(eval_bool(r#"true && payload.missing.deep > 1"#, &e).is_err());
    }

    #[test]
    fn non_boolean_results_are_reported() {
        let e = env(json!({"message": "hello"}));
        let err = eval_bool("payload.message", &e).unwrap_err();
        assert!(err.to_string().contains("boolean"));
    }

    #[test]
    fn rbac_rule_shapes() {
        let mut e = BTreeMap::new();
        e.insert("sub".to_string(), json!("alice"));
        e.insert("groups".to_string(), json!(["admins", "dev"]));
        e.insert("email_verified".to_string(), json!(true));
        assert!(eval_bool(r#"sub == "alice" && email_verified"#, &e).unwrap());
        assert!(eval_bool(r#"groups[0] == "admins" || sub == "bob""#, &e).unwrap());
    }
}
