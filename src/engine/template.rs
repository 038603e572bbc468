//! `{{expr}}` expansion for template questions.
//!
//! Expressions are restricted to arithmetic over numbers and bound uppercase
//! identifiers: `+ - * / ( )` with unary sign. Nothing in stored question
//! content can reach any other code path.

use thiserror::Error;

use crate::catalog::{Binding, Bindings};

const MAX_DEPTH: usize = 64;

#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("unexpected character {0:?}")]
    UnexpectedChar(char),
    #[error("invalid number literal {0:?}")]
    BadNumber(String),
    #[error("unbound variable {0}")]
    Unbound(String),
    #[error("variable {0} is not numeric")]
    NotNumeric(String),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected trailing input")]
    Trailing,
    #[error("expression nested too deeply")]
    TooDeep,
    #[error("result is not a finite number")]
    NonFinite,
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
}

fn tokenize(expr: &str) -> Result<Vec<Token>, ExprError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ExprError::BadNumber(literal.clone()))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_ascii_uppercase() => {
                let start = i;
                while i < chars.len() && chars[i].is_ascii_uppercase() {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(ExprError::UnexpectedChar(other)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    bindings: &'a Bindings,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    value /= self.unary()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ExprError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(ExprError::TooDeep);
        }
        let value = match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                -self.unary()?
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()?
            }
            _ => self.primary()?,
        };
        self.depth -= 1;
        Ok(value)
    }

    fn primary(&mut self) -> Result<f64, ExprError> {
        match self.bump() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::Ident(name)) => match self.bindings.get(&name) {
                Some(binding) => binding.as_number().ok_or(ExprError::NotNumeric(name)),
                None => Err(ExprError::Unbound(name)),
            },
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.bump() {
                    Some(Token::RParen) => Ok(value),
                    Some(_) => Err(ExprError::Trailing),
                    None => Err(ExprError::UnexpectedEnd),
                }
            }
            Some(_) => Err(ExprError::Trailing),
            None => Err(ExprError::UnexpectedEnd),
        }
    }
}

/// Evaluate an arithmetic expression against `bindings`.
pub fn evaluate(expr: &str, bindings: &Bindings) -> Result<f64, ExprError> {
    let mut parser = Parser {
        tokens: tokenize(expr)?,
        pos: 0,
        depth: 0,
        bindings,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::Trailing);
    }
    if !value.is_finite() {
        return Err(ExprError::NonFinite);
    }
    Ok(value)
}

/// Round half-up to 3 decimals.
pub fn round3(value: f64) -> f64 {
    let rounded = (value * 1000.0 + 0.5).floor() / 1000.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

pub fn format_number(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    format!("{value}")
}

fn expand_span(expr: &str, bindings: &Bindings) -> Option<String> {
    match evaluate(expr, bindings).map(round3) {
        Ok(value) if value.is_finite() => Some(format_number(value)),
        _ => bindings.get(expr.trim()).map(Binding::to_string),
    }
}

/// Replace every `{{expr}}` span in `template`. Spans that cannot be
/// evaluated keep their literal text, unless the span is exactly one bound
/// name, in which case the raw value is used.
pub fn expand(template: &str, bindings: &Bindings) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let close = after.find('}');
        match close {
            Some(end) if end > 0 && after[end..].starts_with("}}") => {
                let expr = &after[..end];
                match expand_span(expr, bindings) {
                    Some(value) => out.push_str(&value),
                    None => out.push_str(&rest[open..open + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            _ => {
                // Not a span here; emit one brace and rescan from the next one.
                out.push('{');
                rest = &rest[open + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, Binding)]) -> Bindings {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn arithmetic_with_bound_names() {
        let b = bindings(&[("R", Binding::Number(10.0)), ("I", Binding::Number(2.0))]);
        assert_eq!(expand("V = {{R * I}} V", &b), "V = 20 V");
        assert_eq!(expand("{{(R + I) / 4}}", &b), "3");
        assert_eq!(expand("{{-R + 1}}", &b), "-9");
    }

    #[test]
    fn rounds_to_three_decimals() {
        let b = bindings(&[("A", Binding::Number(1.0)), ("B", Binding::Number(3.0))]);
        assert_eq!(expand("{{A / B}}", &b), "0.333");
        assert_eq!(expand("{{1 / 16}}", &b), "0.063");
        assert_eq!(expand("{{-1 / 2}}", &b), "-0.5");
        assert_eq!(expand("{{0.1 + 0.2}}", &b), "0.3");
    }

    #[test]
    fn text_binding_falls_back_to_raw_value() {
        let b = bindings(&[("UNIT", Binding::Text("ohm".into()))]);
        assert_eq!(expand("in {{UNIT}}", &b), "in ohm");
        assert_eq!(expand("in {{ UNIT }}", &b), "in ohm");
    }

    #[test]
    fn numeric_text_binding_is_usable_in_arithmetic() {
        let b = bindings(&[("N", Binding::Text("4".into()))]);
        assert_eq!(expand("{{N * 2}}", &b), "8");
    }

    #[test]
    fn failures_keep_literal_span() {
        let b = bindings(&[("A", Binding::Number(1.0))]);
        assert_eq!(expand("{{A + Z}}", &b), "{{A + Z}}");
        assert_eq!(expand("{{alert(1)}}", &b), "{{alert(1)}}");
        assert_eq!(expand("{{A / 0}}", &b), "{{A / 0}}");
        assert_eq!(expand("{{A +}}", &b), "{{A +}}");
    }

    #[test]
    fn huge_results_that_overflow_when_rounded_keep_literal_span() {
        let b = bindings(&[("A", Binding::Number(1e306))]);
        assert_eq!(expand("x {{A * 1}}", &b), "x {{A * 1}}");
        assert!(!expand("{{A * 1}}", &b).contains("inf"));
    }

    #[test]
    fn unterminated_and_empty_spans_pass_through() {
        let b = Bindings::new();
        assert_eq!(expand("a {{ b", &b), "a {{ b");
        assert_eq!(expand("{{}}", &b), "{{}}");
        assert_eq!(expand("{x} {{1}}", &b), "{x} 1");
        assert_eq!(expand("{{{1}}", &b), "{{{1}}");
    }

    #[test]
    fn multibyte_text_around_spans() {
        let b = bindings(&[("V", Binding::Number(5.0))]);
        assert_eq!(expand("電圧は{{V}}Vです", &b), "電圧は5Vです");
    }

    #[test]
    fn expansion_is_deterministic_for_fixed_bindings() {
        let b = bindings(&[("X", Binding::Number(7.0))]);
        let t = "{{X * X}} and {{X / 2}}";
        assert_eq!(expand(t, &b), expand(t, &b));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let expr = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert_eq!(evaluate(&expr, &Bindings::new()), Err(ExprError::TooDeep));
        let minus = format!("{}1", "-".repeat(200));
        assert_eq!(evaluate(&minus, &Bindings::new()), Err(ExprError::TooDeep));
    }

    #[test]
    fn bad_tokens_are_errors() {
        let b = Bindings::new();
        assert_eq!(evaluate("1.2.3", &b), Err(ExprError::BadNumber("1.2.3".into())));
        assert_eq!(evaluate("2 % 3", &b), Err(ExprError::UnexpectedChar('%')));
        assert_eq!(evaluate("Q", &b), Err(ExprError::Unbound("Q".into())));
        assert_eq!(evaluate("(1", &b), Err(ExprError::UnexpectedEnd));
        assert_eq!(evaluate("1 2", &b), Err(ExprError::Trailing));
    }
}
