//! Arithmetic expressions for output dimensions
//!
//! Grammar:
//!
//! ```text
//! expr   := term (('+' | '-') term)*
//! term   := unary (('*' | '/') unary)*
//! unary  := '-' unary | '+' unary | atom
//! atom   := number | ident | ident '(' expr (',' expr)* ')' | '(' expr ')'
//! ```

use crate::error::{Error, Result};

/// Variables an expression may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Var {
    InW,
    InH,
    OutW,
    OutH,
    /// Input aspect ratio iw/ih
    A,
    Sar,
    /// Display aspect ratio a*sar
    Dar,
    Hsub,
    Vsub,
    Ohsub,
    Ovsub,
}

impl Var {
    fn from_name(name: &str) -> Option<Var> {
        Some(match name {
            "in_w" | "iw" => Var::InW,
            "in_h" | "ih" => Var::InH,
            "out_w" | "ow" => Var::OutW,
            "out_h" | "oh" => Var::OutH,
            "a" => Var::A,
            "sar" => Var::Sar,
            "dar" => Var::Dar,
            "hsub" => Var::Hsub,
            "vsub" => Var::Vsub,
            "ohsub" => Var::Ohsub,
            "ovsub" => Var::Ovsub,
            _ => return None,
        })
    }
}

/// Variable values for one evaluation
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vars {
    pub in_w: f64,
    pub in_h: f64,
    pub out_w: f64,
    pub out_h: f64,
    pub a: f64,
    pub sar: f64,
    pub dar: f64,
    pub hsub: f64,
    pub vsub: f64,
    pub ohsub: f64,
    pub ovsub: f64,
}

impl Vars {
    fn get(&self, var: Var) -> f64 {
        match var {
            Var::InW => self.in_w,
            Var::InH => self.in_h,
            Var::OutW => self.out_w,
            Var::OutH => self.out_h,
            Var::A => self.a,
            Var::Sar => self.sar,
            Var::Dar => self.dar,
            Var::Hsub => self.hsub,
            Var::Vsub => self.vsub,
            Var::Ohsub => self.ohsub,
            Var::Ovsub => self.ovsub,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Min,
    Max,
    Floor,
    Ceil,
    Round,
    Trunc,
}

impl Func {
    fn from_name(name: &str) -> Option<(Func, usize)> {
        Some(match name {
            "min" => (Func::Min, 2),
            "max" => (Func::Max, 2),
            "floor" => (Func::Floor, 1),
            "ceil" => (Func::Ceil, 1),
            "round" => (Func::Round, 1),
            "trunc" => (Func::Trunc, 1),
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Num(f64),
    Var(Var),
    Neg(Box<Node>),
    Add(Box<Node>, Box<Node>),
    Sub(Box<Node>, Box<Node>),
    Mul(Box<Node>, Box<Node>),
    Div(Box<Node>, Box<Node>),
    Call(Func, Vec<Node>),
}

impl Node {
    fn eval(&self, vars: &Vars) -> f64 {
        match self {
            Node::Num(v) => *v,
            Node::Var(var) => vars.get(*var),
            Node::Neg(n) => -n.eval(vars),
            Node::Add(a, b) => a.eval(vars) + b.eval(vars),
            Node::Sub(a, b) => a.eval(vars) - b.eval(vars),
            Node::Mul(a, b) => a.eval(vars) * b.eval(vars),
            Node::Div(a, b) => a.eval(vars) / b.eval(vars),
            Node::Call(func, args) => {
                let x = args[0].eval(vars);
                match func {
                    Func::Min => x.min(args[1].eval(vars)),
                    Func::Max => x.max(args[1].eval(vars)),
                    Func::Floor => x.floor(),
                    Func::Ceil => x.ceil(),
                    Func::Round => x.round(),
                    Func::Trunc => x.trunc(),
                }
            }
        }
    }
}

/// Parsed expression
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    source: String,
    root: Node,
}

impl Expr {
    pub fn parse(source: &str) -> Result<Expr> {
        let mut parser = Parser {
            src: source,
            bytes: source.as_bytes(),
            pos: 0,
        };
        let root = parser.expr()?;
        parser.skip_ws();
        if parser.pos != parser.bytes.len() {
            return Err(parser.error(format!("unexpected '{}'", parser.rest())));
        }
        Ok(Expr {
            source: source.to_string(),
            root,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn eval(&self, vars: &Vars) -> f64 {
        self.root.eval(vars)
    }

    /// Whether the expression references `var`
    pub fn uses(&self, var: Var) -> bool {
        fn walk(node: &Node, var: Var) -> bool {
            match node {
                Node::Num(_) => false,
                Node::Var(v) => *v == var,
                Node::Neg(n) => walk(n, var),
                Node::Add(a, b) | Node::Sub(a, b) | Node::Mul(a, b) | Node::Div(a, b) => {
                    walk(a, var) || walk(b, var)
                }
                Node::Call(_, args) => args.iter().any(|a| walk(a, var)),
            }
        }
        walk(&self.root, var)
    }
}

struct Parser<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: String) -> Error {
        Error::InvalidExpression {
            expr: self.src.to_string(),
            reason,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.bytes.get(self.pos).copied()
    }

    fn eat(&mut self, c: u8) -> bool {
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<Node> {
        let mut lhs = self.term()?;
        loop {
            if self.eat(b'+') {
                lhs = Node::Add(Box::new(lhs), Box::new(self.term()?));
            } else if self.eat(b'-') {
                lhs = Node::Sub(Box::new(lhs), Box::new(self.term()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn term(&mut self) -> Result<Node> {
        let mut lhs = self.unary()?;
        loop {
            if self.eat(b'*') {
                lhs = Node::Mul(Box::new(lhs), Box::new(self.unary()?));
            } else if self.eat(b'/') {
                lhs = Node::Div(Box::new(lhs), Box::new(self.unary()?));
            } else {
                return Ok(lhs);
            }
        }
    }

    fn unary(&mut self) -> Result<Node> {
        if self.eat(b'-') {
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        if self.eat(b'+') {
            return self.unary();
        }
        self.atom()
    }

    fn atom(&mut self) -> Result<Node> {
        match self.peek() {
            None => Err(self.error("unexpected end of expression".into())),
            Some(b'(') => {
                self.pos += 1;
                let inner = self.expr()?;
                if !self.eat(b')') {
                    return Err(self.error("missing ')'".into()));
                }
                Ok(inner)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.ident(),
            Some(c) => Err(self.error(format!("unexpected '{}'", c as char))),
        }
    }

    fn number(&mut self) -> Result<Node> {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_digit() || self.bytes[self.pos] == b'.')
        {
            self.pos += 1;
        }
        // exponent
        if self.pos < self.bytes.len() && matches!(self.bytes[self.pos], b'e' | b'E') {
            let mark = self.pos;
            self.pos += 1;
            if self.pos < self.bytes.len() && matches!(self.bytes[self.pos], b'+' | b'-') {
                self.pos += 1;
            }
            if self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_digit() {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }
        let text = &self.src[start..self.pos];
        text.parse::<f64>()
            .map(Node::Num)
            .map_err(|_| self.error(format!("invalid number '{}'", text)))
    }

    fn ident(&mut self) -> Result<Node> {
        let start = self.pos;
        while self.pos < self.bytes.len()
            && (self.bytes[self.pos].is_ascii_alphanumeric() || self.bytes[self.pos] == b'_')
        {
            self.pos += 1;
        }
        let name = &self.src[start..self.pos];

        if self.peek() == Some(b'(') {
            let (func, arity) = Func::from_name(name)
                .ok_or_else(|| self.error(format!("unknown function '{}'", name)))?;
            self.pos += 1;
            let mut args = vec![self.expr()?];
            while self.eat(b',') {
                args.push(self.expr()?);
            }
            if !self.eat(b')') {
                return Err(self.error("missing ')'".into()));
            }
            if args.len() != arity {
                return Err(self.error(format!(
                    "{}() takes {} argument(s), got {}",
                    name,
                    arity,
                    args.len()
                )));
            }
            return Ok(Node::Call(func, args));
        }

        Var::from_name(name)
            .map(Node::Var)
            .ok_or_else(|| self.error(format!("unknown variable '{}'", name)))
    }
}
