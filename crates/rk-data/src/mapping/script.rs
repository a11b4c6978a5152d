//! Small arithmetic language for script mappings and script composites
//!
//! GRAMMAR:
//!   script         --> ["return"] expression [";"]
//!   expression     --> additive
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/" | "%") unary )*
//!   unary          --> "-" unary | power
//!   power          --> primary ( "^" unary )?
//!   primary        --> NUMBER | IDENT | IDENT "(" arguments? ")" | "(" expression ")"
//!
//! Identifiers may carry a `Math.` prefix, so `Math.log(value)` and
//! `log(value)` are the same call.

use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScriptError {
    #[error("unexpected character '{0}'")]
    IllegalCharacter(char),

    #[error("expected {expected}, found {found}")]
    Unexpected { expected: String, found: String },

    #[error("empty script")]
    Empty,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("function '{name}' takes {expected} arguments, got {got}")]
    Arity { name: String, expected: usize, got: usize },

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    LParen,
    RParen,
    Comma,
    Semicolon,
    Eof,
}

struct Lexer<'a> {
    input: Peekable<Chars<'a>>,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Lexer {
            input: input.chars().peekable(),
        }
    }

    fn next_token(&mut self) -> Result<Token, ScriptError> {
        while matches!(self.input.peek(), Some(c) if c.is_whitespace()) {
            self.input.next();
        }

        Ok(match self.input.next() {
            Some('+') => Token::Plus,
            Some('-') => Token::Minus,
            Some('*') => {
                if self.input.peek() == Some(&'*') {
                    self.input.next();
                    Token::Caret
                } else {
                    Token::Star
                }
            }
            Some('/') => Token::Slash,
            Some('%') => Token::Percent,
            Some('^') => Token::Caret,
            Some('(') => Token::LParen,
            Some(')') => Token::RParen,
            Some(',') => Token::Comma,
            Some(';') => Token::Semicolon,
            Some(ch) if ch.is_ascii_digit() || ch == '.' => self.read_number(ch),
            Some(ch) if ch.is_alphabetic() || ch == '_' => self.read_ident(ch),
            Some(ch) => return Err(ScriptError::IllegalCharacter(ch)),
            None => Token::Eof,
        })
    }

    fn read_number(&mut self, first: char) -> Token {
        let mut text = String::from(first);
        while let Some(&ch) = self.input.peek() {
            if ch.is_ascii_digit() || ch == '.' || ch == 'e' || ch == 'E' {
                text.push(ch);
                self.input.next();
                if (ch == 'e' || ch == 'E') && matches!(self.input.peek(), Some('-') | Some('+')) {
                    text.push(self.input.next().unwrap_or('+'));
                }
            } else {
                break;
            }
        }
        Token::Number(text.parse().unwrap_or(f64::NAN))
    }

    fn read_ident(&mut self, first: char) -> Token {
        let mut text = String::from(first);
        while let Some(&ch) = self.input.peek() {
            if ch.is_alphanumeric() || ch == '_' || ch == '.' {
                text.push(ch);
                self.input.next();
            } else {
                break;
            }
        }
        let name = text.strip_prefix("Math.").unwrap_or(&text);
        Token::Ident(name.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Pow,
}

/// Parsed script expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Negate(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

const FUNCTIONS: &[(&str, usize)] = &[
    ("abs", 1),
    ("sqrt", 1),
    ("log", 1),
    ("log10", 1),
    ("log2", 1),
    ("exp", 1),
    ("floor", 1),
    ("ceil", 1),
    ("round", 1),
    ("pow", 2),
    ("min", 2),
    ("max", 2),
    ("clamp", 3),
    ("linear", 3),
];

struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Result<Self, ScriptError> {
        let mut lexer = Lexer::new(input);
        let current = lexer.next_token()?;
        Ok(Parser { lexer, current })
    }

    fn advance(&mut self) -> Result<(), ScriptError> {
        self.current = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> Result<(), ScriptError> {
        if self.current == expected {
            self.advance()
        } else {
            Err(ScriptError::Unexpected {
                expected: format!("{:?}", expected),
                found: format!("{:?}", self.current),
            })
        }
    }

    fn parse(&mut self) -> Result<Expr, ScriptError> {
        if self.current == Token::Ident("return".to_string()) {
            self.advance()?;
        }
        if matches!(self.current, Token::Eof | Token::Semicolon) {
            return Err(ScriptError::Empty);
        }
        let expr = self.parse_additive()?;
        if self.current == Token::Semicolon {
            self.advance()?;
        }
        self.expect(Token::Eof)?;
        Ok(expr)
    }

    fn parse_additive(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, ScriptError> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Rem,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ScriptError> {
        if self.current == Token::Minus {
            self.advance()?;
            return Ok(Expr::Negate(Box::new(self.parse_unary()?)));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ScriptError> {
        let base = self.parse_primary()?;
        if self.current == Token::Caret {
            self.advance()?;
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ScriptError> {
        match self.current.clone() {
            Token::Number(n) => {
                self.advance()?;
                Ok(Expr::Number(n))
            }
            Token::Ident(name) => {
                self.advance()?;
                if self.current != Token::LParen {
                    return Ok(Expr::Variable(name));
                }
                self.advance()?;
                let mut args = Vec::new();
                if self.current != Token::RParen {
                    args.push(self.parse_additive()?);
                    while self.current == Token::Comma {
                        self.advance()?;
                        args.push(self.parse_additive()?);
                    }
                }
                self.expect(Token::RParen)?;
                let (_, arity) = FUNCTIONS
                    .iter()
                    .find(|(f, _)| *f == name)
                    .ok_or_else(|| ScriptError::UnknownFunction(name.clone()))?;
                if *arity != args.len() {
                    return Err(ScriptError::Arity {
                        name,
                        expected: *arity,
                        got: args.len(),
                    });
                }
                Ok(Expr::Call(name, args))
            }
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_additive()?;
                self.expect(Token::RParen)?;
                Ok(expr)
            }
            other => Err(ScriptError::Unexpected {
                expected: "expression".to_string(),
                found: format!("{:?}", other),
            }),
        }
    }
}

impl Expr {
    /// Parse a script
    pub fn parse(code: &str) -> Result<Expr, ScriptError> {
        Parser::new(code)?.parse()
    }

    /// Parse and check that every variable is one of `allowed`
    pub fn compile(code: &str, allowed: &[&str]) -> Result<Expr, ScriptError> {
        let expr = Self::parse(code)?;
        let mut variables = Vec::new();
        expr.collect_variables(&mut variables);
        for name in variables {
            if !allowed.contains(&name.as_str()) && constant(&name).is_none() {
                return Err(ScriptError::UnknownVariable(name));
            }
        }
        Ok(expr)
    }

    /// Variable names referenced by the expression, in order of appearance
    pub fn variables(&self) -> Vec<String> {
        let mut variables = Vec::new();
        self.collect_variables(&mut variables);
        variables
    }

    fn collect_variables(&self, out: &mut Vec<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => out.push(name.clone()),
            Expr::Negate(inner) => inner.collect_variables(out),
            Expr::Binary(_, l, r) => {
                l.collect_variables(out);
                r.collect_variables(out);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_variables(out)),
        }
    }

    /// Evaluate with a variable resolver; unknown variables evaluate to NaN
    pub fn eval(&self, vars: &dyn Fn(&str) -> Option<f64>) -> f64 {
        match self {
            Expr::Number(n) => *n,
            Expr::Variable(name) => vars(name).or_else(|| constant(name)).unwrap_or(f64::NAN),
            Expr::Negate(inner) => -inner.eval(vars),
            Expr::Binary(op, l, r) => {
                let (l, r) = (l.eval(vars), r.eval(vars));
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    BinaryOp::Rem => l % r,
                    BinaryOp::Pow => l.powf(r),
                }
            }
            Expr::Call(name, args) => {
                let a: Vec<f64> = args.iter().map(|a| a.eval(vars)).collect();
                match (name.as_str(), a.as_slice()) {
                    ("abs", [x]) => x.abs(),
                    ("sqrt", [x]) => x.sqrt(),
                    ("log", [x]) => x.ln(),
                    ("log10", [x]) => x.log10(),
                    ("log2", [x]) => x.log2(),
                    ("exp", [x]) => x.exp(),
                    ("floor", [x]) => x.floor(),
                    ("ceil", [x]) => x.ceil(),
                    ("round", [x]) => x.round(),
                    ("pow", [x, y]) => x.powf(*y),
                    ("min", [x, y]) => x.min(*y),
                    ("max", [x, y]) => x.max(*y),
                    ("clamp", [x, lo, hi]) => x.max(*lo).min(*hi),
                    ("linear", [x, lo, hi]) => (x - lo) / (hi - lo),
                    _ => f64::NAN,
                }
            }
        }
    }
}

fn constant(name: &str) -> Option<f64> {
    match name {
        "PI" => Some(std::f64::consts::PI),
        "E" => Some(std::f64::consts::E),
        _ => None,
    }
}
