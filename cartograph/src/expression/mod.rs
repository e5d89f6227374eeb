//! Style expressions.
//!
//! Expressions are used as rule filters (`[type] = 'park' and [area] > 1000`) and as values of
//! symbolizer properties (`[width] * 2`, `[name].replace('Street', 'St.')`). They are evaluated against
//! a feature and a set of map variables and always produce a [`Value`]: lookups of attributes the
//! feature doesn't have, and operations on incompatible values give [`Value::Null`] instead of
//! failing.
//!
//! The textual syntax:
//!
//! * literals: `12`, `1.5e3`, `'text'`, `"text"`, `true`, `false`, `null`;
//! * feature attributes: `[name]`; the type of the feature geometry: `[mapnik::geometry_type]`,
//!   which can be compared with `point`, `linestring`, `polygon` and `collection`;
//! * map variables: `@name`;
//! * operators by precedence (low to high): `or` (`||`), `and` (`&&`), `not` (`!`), comparisons
//!   `= != <> < <= > >=` (also `eq neq lt le gt ge`), `+ -`, `* / %`, unary `-`;
//! * regular expressions: `[name].match('^A')`, `[name].replace('(\w+) St', '\1 Street')`;
//! * functions: `abs length sin cos tan atan exp log` (one argument), `pow min max` (two arguments).
//!
//! [`Expr`] implements `Display`, which produces text that parses back into the same expression.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use regex::Regex;
use thiserror::Error;

use crate::feature::{Feature, Value, Variables};

mod parser;

/// Error of expression parsing.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExpressionError {
    /// The text is not a valid expression.
    #[error("failed to parse expression at position {position}: {message}")]
    Parse {
        /// Position in the input (characters).
        position: usize,
        /// Description of the problem.
        message: String,
    },
    /// Invalid regular expression.
    #[error("invalid regular expression '{pattern}': {message}")]
    Regex {
        /// The pattern.
        pattern: String,
        /// Error description.
        message: String,
    },
    /// Unknown function name or wrong number of arguments.
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
}

/// Unary operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
}

/// Binary operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BinaryOp {
    /// `+`, also concatenates strings.
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Mod,
    /// `=`
    Eq,
    /// `!=`
    Neq,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `and`
    And,
    /// `or`
    Or,
}

impl BinaryOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::Neq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }
}

/// Built-in function.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Function {
    /// Absolute value.
    Abs,
    /// Length of a string, or absolute value of a number.
    Length,
    /// Sine (radians).
    Sin,
    /// Cosine (radians).
    Cos,
    /// Tangent (radians).
    Tan,
    /// Arctangent (radians).
    Atan,
    /// Exponent.
    Exp,
    /// Natural logarithm.
    Log,
    /// Power.
    Pow,
    /// Minimum of two values.
    Min,
    /// Maximum of two values.
    Max,
}

impl Function {
    const ALL: [Function; 11] = [
        Function::Abs,
        Function::Length,
        Function::Sin,
        Function::Cos,
        Function::Tan,
        Function::Atan,
        Function::Exp,
        Function::Log,
        Function::Pow,
        Function::Min,
        Function::Max,
    ];

    /// Name of the function in expression text.
    pub fn name(&self) -> &'static str {
        match self {
            Function::Abs => "abs",
            Function::Length => "length",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Atan => "atan",
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Pow => "pow",
            Function::Min => "min",
            Function::Max => "max",
        }
    }

    /// Number of arguments.
    pub fn arity(&self) -> usize {
        match self {
            Function::Pow | Function::Min | Function::Max => 2,
            _ => 1,
        }
    }

    fn by_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }

    fn apply(&self, args: &[Value]) -> Value {
        if let [Value::String(s)] = args {
            if *self == Function::Length {
                return Value::Integer(s.chars().count() as i64);
            }
        }

        let numbers: Option<Vec<f64>> = args.iter().map(Value::to_f64).collect();
        let Some(numbers) = numbers else {
            return Value::Null;
        };

        match (self, numbers.as_slice(), args) {
            (Function::Abs | Function::Length, _, [Value::Integer(v)]) => {
                v.checked_abs().map(Value::Integer).unwrap_or_default()
            }
            (Function::Abs | Function::Length, [v], _) => Value::Double(v.abs()),
            (Function::Sin, [v], _) => Value::Double(v.sin()),
            (Function::Cos, [v], _) => Value::Double(v.cos()),
            (Function::Tan, [v], _) => Value::Double(v.tan()),
            (Function::Atan, [v], _) => Value::Double(v.atan()),
            (Function::Exp, [v], _) => Value::Double(v.exp()),
            (Function::Log, [v], _) => Value::Double(v.ln()),
            (Function::Pow, [a, b], _) => Value::Double(a.powf(*b)),
            (Function::Min, _, [Value::Integer(a), Value::Integer(b)]) => Value::Integer(*a.min(b)),
            (Function::Max, _, [Value::Integer(a), Value::Integer(b)]) => Value::Integer(*a.max(b)),
            (Function::Min, [a, b], _) => Value::Double(a.min(*b)),
            (Function::Max, [a, b], _) => Value::Double(a.max(*b)),
            _ => Value::Null,
        }
    }
}

/// Compiled regular expression that can be compared by its pattern.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compiles a pattern.
    pub fn new(pattern: &str) -> Result<Self, ExpressionError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|err| ExpressionError::Regex {
                pattern: pattern.to_string(),
                message: err.to_string(),
            })
    }

    /// Source pattern.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value.
    Literal(Value),
    /// Feature attribute.
    Attribute(String),
    /// Map variable.
    Variable(String),
    /// Type of the feature geometry (see [`GeometryType`](cartograph_types::GeometryType)).
    GeometryType,
    /// Unary operation.
    Unary(UnaryOp, Box<Expr>),
    /// Binary operation.
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    /// Regular expression match, evaluates to boolean.
    Match(Box<Expr>, Pattern),
    /// Regular expression replacement. The replacement can reference groups as `\1` or `$1`.
    Replace(Box<Expr>, Pattern, String),
    /// Function call.
    Call(Function, Vec<Expr>),
}

impl Expr {
    /// Parses an expression.
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        parser::parse(text)
    }

    /// Literal expression.
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    /// Attribute lookup expression.
    pub fn attribute(name: impl Into<String>) -> Self {
        Expr::Attribute(name.into())
    }

    /// Evaluates the expression.
    pub fn evaluate(&self, feature: &Feature, variables: &Variables) -> Value {
        match self {
            Expr::Literal(v) => v.clone(),
            Expr::Attribute(name) => feature.get(name).clone(),
            Expr::Variable(name) => variables.get(name).cloned().unwrap_or_default(),
            Expr::GeometryType => feature
                .geometries()
                .first()
                .map(|g| Value::Integer(g.geometry_type() as i64))
                .unwrap_or_default(),
            Expr::Unary(op, operand) => {
                let value = operand.evaluate(feature, variables);
                match op {
                    UnaryOp::Not => Value::Bool(!value.to_bool()),
                    UnaryOp::Neg => match value {
                        Value::Integer(v) => v.checked_neg().map(Value::Integer).unwrap_or_default(),
                        Value::Double(v) => Value::Double(-v),
                        Value::Bool(v) => Value::Integer(-(v as i64)),
                        _ => Value::Null,
                    },
                }
            }
            Expr::Binary(BinaryOp::And, a, b) => {
                Value::Bool(a.evaluate(feature, variables).to_bool() && b.evaluate(feature, variables).to_bool())
            }
            Expr::Binary(BinaryOp::Or, a, b) => {
                Value::Bool(a.evaluate(feature, variables).to_bool() || b.evaluate(feature, variables).to_bool())
            }
            Expr::Binary(op, a, b) => binary(
                *op,
                &a.evaluate(feature, variables),
                &b.evaluate(feature, variables),
            ),
            Expr::Match(operand, pattern) => {
                Value::Bool(pattern.0.is_match(&operand.evaluate(feature, variables).to_string()))
            }
            Expr::Replace(operand, pattern, replacement) => {
                let value = operand.evaluate(feature, variables).to_string();
                let replacement = convert_group_references(replacement);
                Value::String(pattern.0.replace_all(&value, replacement.as_str()).into_owned())
            }
            Expr::Call(function, args) => {
                let args: Vec<Value> = args.iter().map(|a| a.evaluate(feature, variables)).collect();
                function.apply(&args)
            }
        }
    }

    /// Evaluates the expression as a rule filter.
    pub fn matches(&self, feature: &Feature, variables: &Variables) -> bool {
        self.evaluate(feature, variables).to_bool()
    }

    /// Adds names of all attributes the expression reads to the set.
    pub fn collect_attributes(&self, names: &mut BTreeSet<String>) {
        match self {
            Expr::Attribute(name) => {
                names.insert(name.clone());
            }
            Expr::Literal(_) | Expr::Variable(_) | Expr::GeometryType => {}
            Expr::Unary(_, e) | Expr::Match(e, _) | Expr::Replace(e, _, _) => {
                e.collect_attributes(names)
            }
            Expr::Binary(_, a, b) => {
                a.collect_attributes(names);
                b.collect_attributes(names);
            }
            Expr::Call(_, args) => args.iter().for_each(|a| a.collect_attributes(names)),
        }
    }
}

fn binary(op: BinaryOp, a: &Value, b: &Value) -> Value {
    use std::cmp::Ordering;

    let ordering = || a.compare(b);
    match op {
        BinaryOp::Eq => Value::Bool(a.equals(b)),
        BinaryOp::Neq => Value::Bool(!a.equals(b)),
        BinaryOp::Lt => Value::Bool(ordering() == Some(Ordering::Less)),
        BinaryOp::Le => Value::Bool(matches!(ordering(), Some(Ordering::Less | Ordering::Equal))),
        BinaryOp::Gt => Value::Bool(ordering() == Some(Ordering::Greater)),
        BinaryOp::Ge => Value::Bool(matches!(
            ordering(),
            Some(Ordering::Greater | Ordering::Equal)
        )),
        BinaryOp::Add => match (a, b) {
            (Value::String(_), _) | (_, Value::String(_)) => Value::String(format!("{a}{b}")),
            _ => arithmetic(op, a, b),
        },
        BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => arithmetic(op, a, b),
        BinaryOp::And => Value::Bool(a.to_bool() && b.to_bool()),
        BinaryOp::Or => Value::Bool(a.to_bool() || b.to_bool()),
    }
}

fn arithmetic(op: BinaryOp, a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) | (Value::String(_), _) | (_, Value::String(_)) => {
            Value::Null
        }
        (Value::Integer(x), Value::Integer(y)) => {
            let result = match op {
                BinaryOp::Add => x.checked_add(*y),
                BinaryOp::Sub => x.checked_sub(*y),
                BinaryOp::Mul => x.checked_mul(*y),
                BinaryOp::Div => x.checked_div(*y),
                BinaryOp::Mod => x.checked_rem(*y),
                _ => None,
            };
            result.map(Value::Integer).unwrap_or_default()
        }
        _ => {
            let (Some(x), Some(y)) = (a.to_f64(), b.to_f64()) else {
                return Value::Null;
            };
            let result = match op {
                BinaryOp::Add => x + y,
                BinaryOp::Sub => x - y,
                BinaryOp::Mul => x * y,
                BinaryOp::Div if y != 0.0 => x / y,
                BinaryOp::Mod if y != 0.0 => x % y,
                _ => return Value::Null,
            };
            Value::Double(result)
        }
    }
}

fn convert_group_references(replacement: &str) -> String {
    let mut result = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();
    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('\\', Some(d)) if d.is_ascii_digit() => {
                result.push_str(&format!("${{{d}}}"));
                chars.next();
            }
            _ => result.push(c),
        }
    }

    result
}

fn write_string(f: &mut Formatter<'_>, s: &str) -> std::fmt::Result {
    write!(f, "'")?;
    for c in s.chars() {
        match c {
            '\'' => write!(f, "\\'")?,
            '\\' => write!(f, "\\\\")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "'")
}

fn write_operand(f: &mut Formatter<'_>, e: &Expr) -> std::fmt::Result {
    match e {
        Expr::Unary(UnaryOp::Neg, _) => write!(f, "({e})"),
        _ => write!(f, "{e}"),
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Literal(Value::Null) => write!(f, "null"),
            Expr::Literal(Value::Bool(v)) => write!(f, "{v}"),
            Expr::Literal(Value::Integer(v)) => write!(f, "{v}"),
            Expr::Literal(Value::Double(v)) => {
                if v.is_finite() && v.fract() == 0.0 {
                    write!(f, "{v:.1}")
                } else {
                    write!(f, "{v}")
                }
            }
            Expr::Literal(Value::String(v)) => write_string(f, v),
            Expr::Attribute(name) => write!(f, "[{name}]"),
            Expr::Variable(name) => write!(f, "@{name}"),
            Expr::GeometryType => write!(f, "[mapnik::geometry_type]"),
            Expr::Unary(UnaryOp::Neg, e) => write!(f, "-{e}"),
            Expr::Unary(UnaryOp::Not, e) => write!(f, "(not {e})"),
            Expr::Binary(op, a, b) => write!(f, "({a} {} {b})", op.symbol()),
            Expr::Match(e, pattern) => {
                write_operand(f, e)?;
                write!(f, ".match(")?;
                write_string(f, pattern.as_str())?;
                write!(f, ")")
            }
            Expr::Replace(e, pattern, replacement) => {
                write_operand(f, e)?;
                write!(f, ".replace(")?;
                write_string(f, pattern.as_str())?;
                write!(f, ", ")?;
                write_string(f, replacement)?;
                write!(f, ")")
            }
            Expr::Call(function, args) => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

impl FromStr for Expr {
    type Err = ExpressionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Expr {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Expr {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Expr::parse(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cartograph_types::{Geometry, Point2d, Polygon};

    use super::*;
    use crate::feature::Context;

    fn feature() -> Feature {
        let context = Arc::new(Context::new(["name", "pop", "area", "kind"]));
        Feature::new(7, context)
            .with("name", "Main Street")
            .with("pop", 1500)
            .with("area", 12.5)
            .with("kind", "park")
            .with_geometry(Geometry::Polygon(Polygon::new(
                vec![
                    Point2d::new(0.0, 0.0),
                    Point2d::new(1.0, 0.0),
                    Point2d::new(1.0, 1.0),
                ],
                vec![],
            )))
    }

    fn eval(text: &str) -> Value {
        let mut variables = Variables::new();
        variables.insert("zoom".into(), Value::Integer(12));
        Expr::parse(text).unwrap().evaluate(&feature(), &variables)
    }

    #[test]
    fn filters() {
        assert_eq!(eval("[kind] = 'park' and [pop] > 1000"), Value::Bool(true));
        assert_eq!(eval("[kind] = 'park' and not [pop] > 1000"), Value::Bool(false));
        assert_eq!(eval("[kind] <> 'park' or [area] >= 12.5"), Value::Bool(true));
        assert_eq!(eval("[pop] eq 1500"), Value::Bool(true));
        assert_eq!(eval("@zoom >= 10 && @zoom < 14"), Value::Bool(true));
        assert_eq!(eval("[mapnik::geometry_type] = polygon"), Value::Bool(true));
    }

    #[test]
    fn unknown_attributes_are_null() {
        assert_eq!(eval("[missing]"), Value::Null);
        assert_eq!(eval("[missing] = null"), Value::Bool(true));
        assert_eq!(eval("[missing] > 1"), Value::Bool(false));
        assert_eq!(eval("[missing] + 1"), Value::Null);
        assert_eq!(eval("@missing"), Value::Null);
    }

    #[test]
    fn arithmetic() {
        assert_eq!(eval("[pop] / 100 + 1"), Value::Integer(16));
        assert_eq!(eval("[area] * 2"), Value::Double(25.0));
        assert_eq!(eval("-[pop] % 7"), Value::Integer(-1500 % 7));
        assert_eq!(eval("[pop] / 0"), Value::Null);
        assert_eq!(eval("[name] + ' ' + [pop]"), Value::from("Main Street 1500"));
        assert_eq!(eval("2 + 3 * 4"), Value::Integer(14));
        assert_eq!(eval("(2 + 3) * 4"), Value::Integer(20));
    }

    #[test]
    fn integer_overflow_is_null() {
        let context = Arc::new(Context::new(["a"]));
        let feature = Feature::new(1, context).with("a", Value::Integer(i64::MIN));
        let variables = Variables::new();
        let eval = |text: &str| Expr::parse(text).unwrap().evaluate(&feature, &variables);

        assert_eq!(eval("-[a]"), Value::Null);
        assert_eq!(eval("abs([a])"), Value::Null);
        assert_eq!(eval("[a] - 1"), Value::Null);
        assert_eq!(eval("-([a] + 1)"), Value::Integer(i64::MAX));
        assert_eq!(eval("abs([a] + 1)"), Value::Integer(i64::MAX));
    }

    #[test]
    fn regex_and_functions() {
        assert_eq!(eval("[name].match('^Main')"), Value::Bool(true));
        assert_eq!(
            eval("[name].replace('(\\w+) Street', '\\1 St.')"),
            Value::from("Main St.")
        );
        assert_eq!(eval("length([name])"), Value::Integer(11));
        assert_eq!(eval("max([pop], 2000)"), Value::Integer(2000));
        assert_eq!(eval("pow(2, 10)"), Value::Double(1024.0));
        assert_eq!(eval("abs(-3.5)"), Value::Double(3.5));
    }

    #[test]
    fn display_round_trip() {
        for text in [
            "[kind] = 'park' and [pop] > 1000",
            "not ([a] + 1.5) * -2 >= @scale",
            "[name].replace('a\\'b', 'c').match('x')",
            "min([a], 3) != null",
            "[mapnik::geometry_type] = 2",
        ] {
            let expr = Expr::parse(text).unwrap();
            let printed = expr.to_string();
            assert_eq!(Expr::parse(&printed).unwrap(), expr, "{printed}");
        }

        assert_eq!(
            Expr::parse("[a]=1 and [b]='x'").unwrap().to_string(),
            "(([a] = 1) and ([b] = 'x'))"
        );
    }

    #[test]
    fn collect_attributes() {
        let expr = Expr::parse("[a] + length([b]) > @c and [a].match('x')").unwrap();
        let mut names = BTreeSet::new();
        expr.collect_attributes(&mut names);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_as_string() {
        let expr = Expr::parse("[a] > 1").unwrap();
        let json = serde_json::to_string(&expr).unwrap();
        assert_eq!(json, "\"([a] > 1)\"");
        let back: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, expr);
        assert!(serde_json::from_str::<Expr>("\"[a] >\"").is_err());
    }
}
