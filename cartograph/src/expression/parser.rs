use cartograph_types::GeometryType;

use super::{BinaryOp, Expr, ExpressionError, Function, Pattern, UnaryOp};
use crate::feature::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Integer(i64),
    Double(f64),
    Str(String),
    Attribute(String),
    Variable(String),
    Ident(String),
    Method(String),
    Op(&'static str),
    LParen,
    RParen,
    Comma,
}

struct Lexer<'a> {
    chars: Vec<char>,
    position: usize,
    source: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            position: 0,
            source,
        }
    }

    fn error(&self, position: usize, message: impl Into<String>) -> ExpressionError {
        ExpressionError::Parse {
            position,
            message: format!("{} (in '{}')", message.into(), self.source),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.position).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.position + offset).copied()
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>, ExpressionError> {
        let mut tokens = vec![];
        while let Some(c) = self.peek() {
            let start = self.position;
            if c.is_whitespace() {
                self.position += 1;
                continue;
            }

            let token = match c {
                '[' => Token::Attribute(self.delimited(']')?),
                '\'' | '"' => Token::Str(self.string(c)?),
                '@' => {
                    self.position += 1;
                    let name = self.identifier();
                    if name.is_empty() {
                        return Err(self.error(start, "expected variable name after '@'"));
                    }
                    Token::Variable(name)
                }
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_alphabetic()) => {
                    self.position += 1;
                    Token::Method(self.identifier())
                }
                c if c.is_ascii_digit() || c == '.' => self.number()?,
                c if c.is_alphabetic() || c == '_' => Token::Ident(self.identifier()),
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                ',' => self.single(Token::Comma),
                _ => self.operator()?,
            };

            tokens.push((start, token));
        }

        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.position += 1;
        token
    }

    fn operator(&mut self) -> Result<Token, ExpressionError> {
        const OPERATORS: [&str; 16] = [
            "&&", "||", "!=", "<>", "<=", ">=", "==", "+", "-", "*", "/", "%", "=", "<", ">", "!",
        ];

        let rest: String = self.chars[self.position..].iter().take(2).collect();
        for op in OPERATORS {
            if rest.starts_with(op) {
                self.position += op.chars().count();
                return Ok(Token::Op(op));
            }
        }

        Err(self.error(
            self.position,
            format!("unexpected character '{}'", rest.chars().next().unwrap_or(' ')),
        ))
    }

    fn identifier(&mut self) -> String {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == ':' {
                name.push(c);
                self.position += 1;
            } else {
                break;
            }
        }

        name
    }

    fn delimited(&mut self, end: char) -> Result<String, ExpressionError> {
        let start = self.position;
        self.position += 1;
        let mut content = String::new();
        while let Some(c) = self.peek() {
            self.position += 1;
            if c == end {
                return Ok(content);
            }
            content.push(c);
        }

        Err(self.error(start, format!("missing '{end}'")))
    }

    fn string(&mut self, quote: char) -> Result<String, ExpressionError> {
        let start = self.position;
        self.position += 1;
        let mut content = String::new();
        while let Some(c) = self.peek() {
            self.position += 1;
            match c {
                '\\' => match self.peek() {
                    Some(next) if next == quote || next == '\\' => {
                        content.push(next);
                        self.position += 1;
                    }
                    Some(next) => {
                        content.push('\\');
                        content.push(next);
                        self.position += 1;
                    }
                    None => break,
                },
                c if c == quote => return Ok(content),
                c => content.push(c),
            }
        }

        Err(self.error(start, "unterminated string"))
    }

    fn number(&mut self) -> Result<Token, ExpressionError> {
        let start = self.position;
        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            let accept = match c {
                '0'..='9' => true,
                '.' => {
                    is_float = true;
                    true
                }
                'e' | 'E' => {
                    is_float = true;
                    if matches!(self.peek_at(1), Some('+' | '-')) {
                        text.push(c);
                        self.position += 1;
                        text.push(self.peek().unwrap_or('+'));
                        self.position += 1;
                        continue;
                    }
                    true
                }
                _ => false,
            };
            if !accept {
                break;
            }
            text.push(c);
            self.position += 1;
        }

        let token = if is_float {
            text.parse().ok().map(Token::Double)
        } else {
            text.parse().ok().map(Token::Integer)
        };
        token.ok_or_else(|| self.error(start, format!("invalid number '{text}'")))
    }
}

struct Parser<'a> {
    tokens: Vec<(usize, Token)>,
    index: usize,
    source: &'a str,
}

impl Parser<'_> {
    fn error(&self, message: impl Into<String>) -> ExpressionError {
        let position = self
            .tokens
            .get(self.index)
            .map(|(p, _)| *p)
            .unwrap_or_else(|| self.source.chars().count());
        ExpressionError::Parse {
            position,
            message: format!("{} (in '{}')", message.into(), self.source),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.index).map(|(_, t)| t)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.index).map(|(_, t)| t.clone());
        self.index += 1;
        token
    }

    fn accept_op(&mut self, ops: &[&str]) -> Option<&'static str> {
        if let Some(Token::Op(op)) = self.peek() {
            if ops.contains(op) {
                let op = *op;
                self.index += 1;
                return Some(op);
            }
        }

        None
    }

    fn accept_keyword(&mut self, keywords: &[&str]) -> Option<String> {
        if let Some(Token::Ident(name)) = self.peek() {
            let lower = name.to_ascii_lowercase();
            if keywords.contains(&lower.as_str()) {
                self.index += 1;
                return Some(lower);
            }
        }

        None
    }

    fn expect(&mut self, token: Token) -> Result<(), ExpressionError> {
        if self.peek() == Some(&token) {
            self.index += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected {token:?}")))
        }
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and()?;
        while self.accept_op(&["||"]).is_some() || self.accept_keyword(&["or"]).is_some() {
            let right = self.and()?;
            left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.not()?;
        while self.accept_op(&["&&"]).is_some() || self.accept_keyword(&["and"]).is_some() {
            let right = self.not()?;
            left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn not(&mut self) -> Result<Expr, ExpressionError> {
        if self.accept_op(&["!"]).is_some() || self.accept_keyword(&["not"]).is_some() {
            return Ok(Expr::Unary(UnaryOp::Not, Box::new(self.not()?)));
        }

        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let left = self.additive()?;
        let op = if let Some(op) = self.accept_op(&["=", "==", "!=", "<>", "<", "<=", ">", ">="]) {
            match op {
                "=" | "==" => BinaryOp::Eq,
                "!=" | "<>" => BinaryOp::Neq,
                "<" => BinaryOp::Lt,
                "<=" => BinaryOp::Le,
                ">" => BinaryOp::Gt,
                _ => BinaryOp::Ge,
            }
        } else if let Some(keyword) = self.accept_keyword(&["eq", "neq", "lt", "le", "gt", "ge"]) {
            match keyword.as_str() {
                "eq" => BinaryOp::Eq,
                "neq" => BinaryOp::Neq,
                "lt" => BinaryOp::Lt,
                "le" => BinaryOp::Le,
                "gt" => BinaryOp::Gt,
                _ => BinaryOp::Ge,
            }
        } else {
            return Ok(left);
        };

        let right = self.additive()?;
        Ok(Expr::Binary(op, Box::new(left), Box::new(right)))
    }

    fn additive(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.multiplicative()?;
        while let Some(op) = self.accept_op(&["+", "-"]) {
            let op = if op == "+" { BinaryOp::Add } else { BinaryOp::Sub };
            let right = self.multiplicative()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        while let Some(op) = self.accept_op(&["*", "/", "%"]) {
            let op = match op {
                "*" => BinaryOp::Mul,
                "/" => BinaryOp::Div,
                _ => BinaryOp::Mod,
            };
            let right = self.unary()?;
            left = Expr::Binary(op, Box::new(left), Box::new(right));
        }

        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.accept_op(&["-"]).is_some() {
            return Ok(Expr::Unary(UnaryOp::Neg, Box::new(self.unary()?)));
        }

        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.primary()?;
        while let Some(Token::Method(name)) = self.peek() {
            let name = name.clone();
            self.index += 1;
            self.expect(Token::LParen)?;
            let pattern = Pattern::new(&self.string_argument()?)?;
            expr = match name.as_str() {
                "match" => {
                    self.expect(Token::RParen)?;
                    Expr::Match(Box::new(expr), pattern)
                }
                "replace" => {
                    self.expect(Token::Comma)?;
                    let replacement = self.string_argument()?;
                    self.expect(Token::RParen)?;
                    Expr::Replace(Box::new(expr), pattern, replacement)
                }
                _ => return Err(ExpressionError::UnknownFunction(name)),
            };
        }

        Ok(expr)
    }

    fn string_argument(&mut self) -> Result<String, ExpressionError> {
        match self.next() {
            Some(Token::Str(s)) => Ok(s),
            _ => {
                self.index -= 1;
                Err(self.error("expected string"))
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        let Some(token) = self.next() else {
            return Err(self.error("unexpected end of expression"));
        };

        let expr = match token {
            Token::Integer(v) => Expr::Literal(Value::Integer(v)),
            Token::Double(v) => Expr::Literal(Value::Double(v)),
            Token::Str(v) => Expr::Literal(Value::String(v)),
            Token::Attribute(name) if name == "mapnik::geometry_type" => Expr::GeometryType,
            Token::Attribute(name) => Expr::Attribute(name),
            Token::Variable(name) => Expr::Variable(name),
            Token::LParen => {
                let inner = self.or()?;
                self.expect(Token::RParen)?;
                inner
            }
            Token::Ident(name) => self.identifier(name)?,
            _ => {
                self.index -= 1;
                return Err(self.error("unexpected token"));
            }
        };

        Ok(expr)
    }

    fn identifier(&mut self, name: String) -> Result<Expr, ExpressionError> {
        let lower = name.to_ascii_lowercase();
        let literal = match lower.as_str() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            "null" => Some(Value::Null),
            "point" => Some(Value::Integer(GeometryType::Point as i64)),
            "linestring" => Some(Value::Integer(GeometryType::LineString as i64)),
            "polygon" => Some(Value::Integer(GeometryType::Polygon as i64)),
            "collection" => Some(Value::Integer(GeometryType::Collection as i64)),
            _ => None,
        };
        if let Some(value) = literal {
            return Ok(Expr::Literal(value));
        }

        let function =
            Function::by_name(&lower).ok_or_else(|| ExpressionError::UnknownFunction(name.clone()))?;
        self.expect(Token::LParen)?;
        let mut args = vec![];
        if self.peek() != Some(&Token::RParen) {
            loop {
                args.push(self.or()?);
                if self.peek() == Some(&Token::Comma) {
                    self.index += 1;
                } else {
                    break;
                }
            }
        }
        self.expect(Token::RParen)?;

        if args.len() != function.arity() {
            return Err(self.error(format!(
                "function '{}' takes {} argument(s), {} given",
                function.name(),
                function.arity(),
                args.len()
            )));
        }

        Ok(Expr::Call(function, args))
    }
}

pub(super) fn parse(source: &str) -> Result<Expr, ExpressionError> {
    let tokens = Lexer::new(source).tokenize()?;
    let mut parser = Parser {
        tokens,
        index: 0,
        source,
    };

    let expr = parser.or()?;
    if parser.index < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }

    Ok(expr)
}
