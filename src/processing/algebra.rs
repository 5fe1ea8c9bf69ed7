// src/processing/algebra.rs
//! Per-pixel band arithmetic: a small formula language plus the
//! normalized difference shortcut.
//!
//! Formulas reference bands and constants through symbols bound at
//! evaluation time, e.g. `(NIR - RED) / (BLUE + GREEN + eps)`.

use std::collections::{BTreeSet, HashMap};

use ndarray::Array2;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{Band, BandData, Image};

/// What to do with a pixel whose denominator evaluates to zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DegeneratePolicy {
    /// Mark the pixel no-data and carry on
    #[default]
    Mask,
    /// Abort with `Error::DegenerateExpression`
    Fail,
}

/// What a formula symbol stands for
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    Band(String),
    Constant(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Symbol(String),
    Op(Op),
    LParen,
    RParen,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Symbol(String),
    Neg(Box<Node>),
    Binary(Op, Box<Node>, Box<Node>),
}

/// Node with symbols resolved to input slots
#[derive(Debug, Clone)]
enum Compiled {
    Constant(f64),
    Input(usize),
    Neg(Box<Compiled>),
    Binary(Op, Box<Compiled>, Box<Compiled>),
}

impl Compiled {
    /// `None` when a division by zero happens anywhere in the tree.
    fn eval(&self, inputs: &[f64]) -> Option<f64> {
        match self {
            Compiled::Constant(v) => Some(*v),
            Compiled::Input(slot) => Some(inputs[*slot]),
            Compiled::Neg(inner) => inner.eval(inputs).map(|v| -v),
            Compiled::Binary(op, left, right) => {
                let l = left.eval(inputs)?;
                let r = right.eval(inputs)?;
                match op {
                    Op::Add => Some(l + r),
                    Op::Sub => Some(l - r),
                    Op::Mul => Some(l * r),
                    Op::Div if r == 0.0 => None,
                    Op::Div => Some(l / r),
                }
            }
        }
    }
}

/// Parsed arithmetic formula
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Node,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self> {
        let fail = |reason: String| Error::Expression {
            expression: source.to_string(),
            reason,
        };

        let tokens = tokenize(source).map_err(fail)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expr().map_err(fail)?;
        if let Some(token) = parser.tokens.get(parser.pos) {
            return Err(fail(format!("unexpected trailing token {:?}", token)));
        }

        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every symbol the formula references
    pub fn symbols(&self) -> BTreeSet<&str> {
        fn walk<'a>(node: &'a Node, out: &mut BTreeSet<&'a str>) {
            match node {
                Node::Number(_) => {}
                Node::Symbol(name) => {
                    out.insert(name);
                }
                Node::Neg(inner) => walk(inner, out),
                Node::Binary(_, l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
            }
        }
        let mut out = BTreeSet::new();
        walk(&self.root, &mut out);
        out
    }

    /// Evaluate with plain numbers, mostly useful for checking a formula.
    pub fn eval_scalar(&self, values: &HashMap<String, f64>) -> Result<Option<f64>> {
        let mut slots = Vec::new();
        let compiled = self.compile(&mut |name: &str| {
            let value = values.get(name).copied().ok_or_else(|| {
                Error::Configuration(format!("unbound symbol '{}' in '{}'", name, self.source))
            })?;
            Ok(Slot::Constant(value))
        }, &mut slots)?;
        Ok(compiled.eval(&[]).filter(|v| v.is_finite()))
    }

    fn compile<F>(&self, resolve: &mut F, inputs: &mut Vec<String>) -> Result<Compiled>
    where
        F: FnMut(&str) -> Result<Slot>,
    {
        fn go<F>(node: &Node, resolve: &mut F, inputs: &mut Vec<String>) -> Result<Compiled>
        where
            F: FnMut(&str) -> Result<Slot>,
        {
            Ok(match node {
                Node::Number(v) => Compiled::Constant(*v),
                Node::Symbol(name) => match resolve(name.as_str())? {
                    Slot::Constant(v) => Compiled::Constant(v),
                    Slot::Band(band) => {
                        let slot = match inputs.iter().position(|b| *b == band) {
                            Some(slot) => slot,
                            None => {
                                inputs.push(band);
                                inputs.len() - 1
                            }
                        };
                        Compiled::Input(slot)
                    }
                },
                Node::Neg(inner) => Compiled::Neg(Box::new(go(inner, resolve, inputs)?)),
                Node::Binary(op, l, r) => Compiled::Binary(
                    *op,
                    Box::new(go(l, resolve, inputs)?),
                    Box::new(go(r, resolve, inputs)?),
                ),
            })
        }
        go(&self.root, resolve, inputs)
    }
}

enum Slot {
    Band(String),
    Constant(f64),
}

fn tokenize(source: &str) -> std::result::Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '+' | '-' | '*' | '/' => {
                chars.next();
                tokens.push(Token::Op(match c {
                    '+' => Op::Add,
                    '-' => Op::Sub,
                    '*' => Op::Mul,
                    _ => Op::Div,
                }));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_ascii_digit() || c == '.' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let text = &source[start..end];
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{}'", text))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut end = start;
                while let Some(&(i, d)) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        end = i + d.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Symbol(source[start..end].to_string()));
            }
            other => return Err(format!("unexpected character '{}'", other)),
        }
    }

    Ok(tokens)
}

/// Recursive descent over `expr := term (('+'|'-') term)*`,
/// `term := unary (('*'|'/') unary)*`, `unary := '-' unary | atom`.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> std::result::Result<Node, String> {
        let mut left = self.term()?;
        while let Some(Token::Op(op @ (Op::Add | Op::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.term()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn term(&mut self) -> std::result::Result<Node, String> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op @ (Op::Mul | Op::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.unary()?;
            left = Node::Binary(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> std::result::Result<Node, String> {
        match self.peek() {
            Some(Token::Op(Op::Sub)) => {
                self.pos += 1;
                Ok(Node::Neg(Box::new(self.unary()?)))
            }
            Some(Token::Op(Op::Add)) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> std::result::Result<Node, String> {
        match self.advance() {
            Some(Token::Number(v)) => Ok(Node::Number(v)),
            Some(Token::Symbol(name)) => Ok(Node::Symbol(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("missing closing parenthesis".to_string()),
                }
            }
            Some(token) => Err(format!("unexpected token {:?}", token)),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pixel {
    Valid(f32),
    NoData,
    Degenerate,
}

/// Run `f` over every pixel where all `inputs` are valid.
///
/// `f` returns `None` for a degenerate pixel; non-finite results count as
/// degenerate too.
fn map_pixels<F>(inputs: &[&BandData], shape: (usize, usize), f: F) -> Vec<Pixel>
where
    F: Fn(&[f64]) -> Option<f64> + Sync,
{
    let (rows, cols) = shape;
    let mut out = vec![Pixel::NoData; rows * cols];
    if out.is_empty() {
        return out;
    }

    out.par_chunks_mut(cols).enumerate().for_each(|(row, line)| {
        let mut values = vec![0.0f64; inputs.len()];
        for (col, pixel) in line.iter_mut().enumerate() {
            let mut complete = true;
            for (slot, band) in inputs.iter().enumerate() {
                match band.get_f64(row, col) {
                    Some(v) => values[slot] = v,
                    None => {
                        complete = false;
                        break;
                    }
                }
            }
            if !complete {
                continue;
            }

            *pixel = match f(&values) {
                Some(v) if (v as f32).is_finite() => Pixel::Valid(v as f32),
                _ => Pixel::Degenerate,
            };
        }
    });

    out
}

fn finish_band(
    name: &str,
    shape: (usize, usize),
    pixels: Vec<Pixel>,
    policy: DegeneratePolicy,
) -> Result<Band> {
    let degenerate = pixels.iter().filter(|p| **p == Pixel::Degenerate).count();
    if degenerate > 0 {
        match policy {
            DegeneratePolicy::Fail => {
                return Err(Error::DegenerateExpression {
                    band: name.to_string(),
                    pixels: degenerate,
                })
            }
            DegeneratePolicy::Mask => log::warn!(
                "{}: {} degenerate pixel(s) set to no-data",
                name,
                degenerate
            ),
        }
    }

    let values: Vec<Option<f32>> = pixels
        .into_iter()
        .map(|p| match p {
            Pixel::Valid(v) => Some(v),
            _ => None,
        })
        .collect();
    let data = Array2::from_shape_vec(shape, values).map_err(|e| Error::GridMismatch {
        expected: format!("{}x{} pixels", shape.1, shape.0),
        actual: e.to_string(),
    })?;

    Ok(Band::new(name, BandData::F32(data)))
}

/// `(A - B) / (A + B)` as a new band called `name`.
///
/// No-data where either input is masked; a zero sum is degenerate.
pub fn normalized_difference(
    image: &Image,
    first: &str,
    second: &str,
    name: &str,
    policy: DegeneratePolicy,
) -> Result<Band> {
    let a = image.band(first)?;
    let b = image.band(second)?;
    let shape = image.grid().shape();

    let pixels = map_pixels(&[a, b], shape, |v| {
        let sum = v[0] + v[1];
        if sum == 0.0 {
            None
        } else {
            Some((v[0] - v[1]) / sum)
        }
    });

    finish_band(name, shape, pixels, policy)
}

/// Evaluate `expression` over `image` into a new band called `name`.
///
/// Every symbol must be bound; band bindings must exist in the image.
pub fn evaluate(
    image: &Image,
    expression: &Expression,
    bindings: &HashMap<String, Binding>,
    name: &str,
    policy: DegeneratePolicy,
) -> Result<Band> {
    let mut band_names = Vec::new();
    let compiled = expression.compile(
        &mut |symbol: &str| match bindings.get(symbol) {
            Some(Binding::Band(band)) => Ok(Slot::Band(band.clone())),
            Some(Binding::Constant(v)) => Ok(Slot::Constant(*v)),
            None => Err(Error::Configuration(format!(
                "unbound symbol '{}' in '{}'",
                symbol,
                expression.source()
            ))),
        },
        &mut band_names,
    )?;

    let inputs = band_names
        .iter()
        .map(|band| image.band(band))
        .collect::<Result<Vec<_>>>()?;
    let shape = image.grid().shape();

    log::debug!(
        "{}: evaluating '{}' over {} input band(s) of {}",
        name,
        expression.source(),
        inputs.len(),
        image.id()
    );

    let pixels = map_pixels(&inputs, shape, |values| compiled.eval(values));
    finish_band(name, shape, pixels, policy)
}
