//! Expression evaluator for contract formulas
//!
//! Computed parameters and computed payment amounts are supplied as small
//! arithmetic formulas over named constants. The evaluator is a recursive
//! descent parser over `Decimal` with no ambient state: the same formula
//! and the same bindings produce the same value on every node.
//!
//! Grammar: decimal literals, identifiers, `+ - * /`, unary minus,
//! parentheses. Identifiers resolve against constants bound beforehand
//! (keys lower-cased), in the deterministic parameter order the contract
//! defines.

use rust_decimal::{Decimal, RoundingStrategy};
use std::collections::BTreeMap;
use thiserror::Error;

/// Formula evaluation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Malformed formula
    #[error("Parse error: {0}")]
    Parse(String),

    /// Identifier with no bound constant
    #[error("Unknown constant: {0}")]
    UnknownConstant(String),

    /// Division by zero
    #[error("Division by zero")]
    DivideByZero,

    /// Result exceeds the representable `Decimal` range
    #[error("Arithmetic overflow")]
    Overflow,
}

/// Round a formula result to an integral ledger quantity, half away
/// from zero
pub fn round_quantity(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

/// Formula evaluator with bound constants
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    constants: BTreeMap<String, Decimal>,
}

impl Evaluator {
    /// Create evaluator with no bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a named constant; keys are matched case-insensitively
    pub fn bind(&mut self, key: &str, value: Decimal) {
        self.constants.insert(key.to_lowercase(), value);
    }

    /// Bound value for a key, if any
    pub fn constant(&self, key: &str) -> Option<Decimal> {
        self.constants.get(&key.to_lowercase()).copied()
    }

    /// Evaluate a formula against the current bindings
    pub fn evaluate(&self, formula: &str) -> Result<Decimal, EvalError> {
        let tokens = tokenize(formula)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            constants: &self.constants,
        };
        let value = parser.expression()?;
        if parser.pos != parser.tokens.len() {
            return Err(EvalError::Parse(format!(
                "Unexpected trailing input in '{}'",
                formula
            )));
        }
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Number(Decimal),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<Decimal>()
                    .map_err(|_| EvalError::Parse(format!("Bad number '{}'", literal)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(EvalError::Parse(format!("Unexpected character '{}'", other)));
            }
        }
    }

    if tokens.is_empty() {
        return Err(EvalError::Parse("Empty formula".to_string()));
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    constants: &'a BTreeMap<String, Decimal>,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // Raw Decimal operators panic on overflow; formulas are
    // contract-supplied, so everything goes through the checked forms.
    fn expression(&mut self) -> Result<Decimal, EvalError> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Plus => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    value = value.checked_add(rhs).ok_or(EvalError::Overflow)?;
                }
                Token::Minus => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    value = value.checked_sub(rhs).ok_or(EvalError::Overflow)?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn term(&mut self) -> Result<Decimal, EvalError> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    value = value.checked_mul(rhs).ok_or(EvalError::Overflow)?;
                }
                Token::Slash => {
                    self.pos += 1;
                    let divisor = self.factor()?;
                    if divisor.is_zero() {
                        return Err(EvalError::DivideByZero);
                    }
                    value = value.checked_div(divisor).ok_or(EvalError::Overflow)?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn factor(&mut self) -> Result<Decimal, EvalError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(n),
            Some(Token::Ident(name)) => self
                .constants
                .get(&name.to_lowercase())
                .copied()
                .ok_or(EvalError::UnknownConstant(name)),
            Some(Token::Minus) => Ok(-self.factor()?),
            Some(Token::LParen) => {
                let value = self.expression()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err(EvalError::Parse("Missing ')'".to_string())),
                }
            }
            other => Err(EvalError::Parse(format!("Unexpected token {:?}", other))),
        }
    }
}
