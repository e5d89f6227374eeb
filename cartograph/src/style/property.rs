use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use nalgebra::Matrix3;

use super::key::{Key, KeyKind};
use super::symbolizer::SymbolizerKind;
use crate::error::CartographError;
use crate::expression::Expr;
use crate::feature::{Feature, Value, Variables};
use crate::Color;

/// Value of a symbolizer property.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    /// Constant value.
    Value(Value),
    /// Expression evaluated for every feature.
    Expression(Expr),
    /// Constant color.
    Color(Color),
    /// Affine transform.
    Transform(TransformList),
}

impl Property {
    /// Interprets a text as a value of the given key, the way style files define properties.
    ///
    /// Colors and transforms are parsed, texts that contain attribute or variable references are
    /// parsed as expressions, everything else is kept as a string value.
    pub fn from_text(key: Key, text: &str) -> Result<Self, CartographError> {
        let trimmed = text.trim();
        let looks_like_expression = trimmed.contains('[') || trimmed.contains('@');
        match key.kind() {
            KeyKind::Color if !looks_like_expression => Color::parse(trimmed)
                .map(Property::Color)
                .ok_or_else(|| CartographError::Config(format!("invalid color '{text}' for '{key}'"))),
            KeyKind::Transform => Ok(Property::Transform(trimmed.parse()?)),
            KeyKind::Expression => Ok(Property::Expression(Expr::parse(trimmed)?)),
            _ if looks_like_expression => Ok(Property::Expression(Expr::parse(trimmed)?)),
            _ => Ok(Property::Value(Value::String(text.to_string()))),
        }
    }

    fn from_value(key: Key, value: Value) -> Result<Self, CartographError> {
        match value {
            Value::String(text) => Self::from_text(key, &text),
            value => Ok(Property::Value(value)),
        }
    }

    fn to_value(&self) -> Value {
        match self {
            Property::Value(v) => v.clone(),
            Property::Expression(e) => Value::String(e.to_string()),
            Property::Color(c) => Value::String(c.to_string()),
            Property::Transform(t) => Value::String(t.to_string()),
        }
    }
}

impl From<Value> for Property {
    fn from(value: Value) -> Self {
        Property::Value(value)
    }
}

impl From<f64> for Property {
    fn from(value: f64) -> Self {
        Property::Value(Value::Double(value))
    }
}

impl From<i32> for Property {
    fn from(value: i32) -> Self {
        Property::Value(Value::Integer(value as i64))
    }
}

impl From<bool> for Property {
    fn from(value: bool) -> Self {
        Property::Value(Value::Bool(value))
    }
}

impl From<&str> for Property {
    fn from(value: &str) -> Self {
        Property::Value(Value::String(value.to_string()))
    }
}

impl From<Color> for Property {
    fn from(value: Color) -> Self {
        Property::Color(value)
    }
}

impl From<Expr> for Property {
    fn from(value: Expr) -> Self {
        Property::Expression(value)
    }
}

impl From<TransformList> for Property {
    fn from(value: TransformList) -> Self {
        Property::Transform(value)
    }
}

/// Set of symbolizer properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(BTreeMap<Key, Property>);

impl Properties {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Property value if it is set.
    pub fn get(&self, key: Key) -> Option<&Property> {
        self.0.get(&key)
    }

    /// Sets a property.
    pub fn set(&mut self, key: Key, value: impl Into<Property>) {
        self.0.insert(key, value.into());
    }

    /// Builder-style version of [`Properties::set`].
    pub fn with(mut self, key: Key, value: impl Into<Property>) -> Self {
        self.set(key, value);
        self
    }

    /// Removes a property.
    pub fn remove(&mut self, key: Key) -> Option<Property> {
        self.0.remove(&key)
    }

    /// Returns true if the key is set.
    pub fn contains(&self, key: Key) -> bool {
        self.0.contains_key(&key)
    }

    /// Iterates over set properties ordered by key.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Property)> {
        self.0.iter()
    }

    /// Number of set properties.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if no properties are set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Adds names of attributes read by expression properties to the set.
    pub fn collect_attributes(&self, names: &mut BTreeSet<String>) {
        for property in self.0.values() {
            if let Property::Expression(expr) = property {
                expr.collect_attributes(names);
            }
        }
    }
}

impl FromIterator<(Key, Property)> for Properties {
    fn from_iter<T: IntoIterator<Item = (Key, Property)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Properties {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;

        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, property) in &self.0 {
            map.serialize_entry(key, &property.to_value())?;
        }
        map.end()
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for Properties {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<Key, Value>::deserialize(deserializer)?;
        raw.into_iter()
            .map(|(key, value)| Ok((key, Property::from_value(key, value)?)))
            .collect::<Result<_, CartographError>>()
            .map_err(serde::de::Error::custom)
    }
}

/// Single operation of a [`TransformList`].
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum TransformOp {
    /// Full affine matrix `a b c d e f`.
    Matrix([f64; 6]),
    /// Translation.
    Translate(f64, f64),
    /// Scale.
    Scale(f64, f64),
    /// Rotation in degrees around a point.
    Rotate(f64, f64, f64),
    /// Skew along x axis (degrees).
    SkewX(f64),
    /// Skew along y axis (degrees).
    SkewY(f64),
}

impl TransformOp {
    fn matrix(&self) -> Matrix3<f64> {
        match *self {
            TransformOp::Matrix([a, b, c, d, e, f]) => {
                Matrix3::new(a, c, e, b, d, f, 0.0, 0.0, 1.0)
            }
            TransformOp::Translate(tx, ty) => Matrix3::new(1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0),
            TransformOp::Scale(sx, sy) => Matrix3::new(sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0),
            TransformOp::Rotate(angle, cx, cy) => {
                let (sin, cos) = angle.to_radians().sin_cos();
                let rotation = Matrix3::new(cos, -sin, 0.0, sin, cos, 0.0, 0.0, 0.0, 1.0);
                TransformOp::Translate(cx, cy).matrix()
                    * rotation
                    * TransformOp::Translate(-cx, -cy).matrix()
            }
            TransformOp::SkewX(angle) => {
                Matrix3::new(1.0, angle.to_radians().tan(), 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0)
            }
            TransformOp::SkewY(angle) => {
                Matrix3::new(1.0, 0.0, 0.0, angle.to_radians().tan(), 1.0, 0.0, 0.0, 0.0, 1.0)
            }
        }
    }
}

impl Display for TransformOp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformOp::Matrix([a, b, c, d, e, g]) => {
                write!(f, "matrix({a}, {b}, {c}, {d}, {e}, {g})")
            }
            TransformOp::Translate(x, y) => write!(f, "translate({x}, {y})"),
            TransformOp::Scale(x, y) => write!(f, "scale({x}, {y})"),
            TransformOp::Rotate(a, x, y) if *x == 0.0 && *y == 0.0 => write!(f, "rotate({a})"),
            TransformOp::Rotate(a, x, y) => write!(f, "rotate({a}, {x}, {y})"),
            TransformOp::SkewX(a) => write!(f, "skewX({a})"),
            TransformOp::SkewY(a) => write!(f, "skewY({a})"),
        }
    }
}

/// List of affine transform operations, e.g. `translate(10, 0) rotate(45)`.
///
/// As in SVG, the operations are applied to points from right to left.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformList(pub Vec<TransformOp>);

impl TransformList {
    /// Combined transform matrix. Translations are multiplied by `scale_factor`.
    pub fn to_matrix(&self, scale_factor: f64) -> Matrix3<f64> {
        self.0.iter().fold(Matrix3::identity(), |acc, op| {
            let op = match *op {
                TransformOp::Translate(x, y) => TransformOp::Translate(x * scale_factor, y * scale_factor),
                TransformOp::Matrix([a, b, c, d, e, f]) => {
                    TransformOp::Matrix([a, b, c, d, e * scale_factor, f * scale_factor])
                }
                op => op,
            };
            acc * op.matrix()
        })
    }

    /// Returns true if there are no operations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for TransformList {
    type Err = CartographError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = || CartographError::Config(format!("invalid transform '{s}'"));
        let mut ops = vec![];
        let mut rest = s.trim();
        while !rest.is_empty() {
            let open = rest.find('(').ok_or_else(error)?;
            let close = rest.find(')').ok_or_else(error)?;
            if close < open {
                return Err(error());
            }

            let name = rest[..open].trim().trim_start_matches(',').trim();
            let args = rest[open + 1..close]
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|a| !a.is_empty())
                .map(|a| a.parse::<f64>().map_err(|_| error()))
                .collect::<Result<Vec<f64>, _>>()?;

            let op = match (name, args.as_slice()) {
                ("matrix", [a, b, c, d, e, f]) => TransformOp::Matrix([*a, *b, *c, *d, *e, *f]),
                ("translate", [x]) => TransformOp::Translate(*x, 0.0),
                ("translate", [x, y]) => TransformOp::Translate(*x, *y),
                ("scale", [s]) => TransformOp::Scale(*s, *s),
                ("scale", [x, y]) => TransformOp::Scale(*x, *y),
                ("rotate", [a]) => TransformOp::Rotate(*a, 0.0, 0.0),
                ("rotate", [a, x, y]) => TransformOp::Rotate(*a, *x, *y),
                ("skewX", [a]) => TransformOp::SkewX(*a),
                ("skewY", [a]) => TransformOp::SkewY(*a),
                _ => return Err(error()),
            };
            ops.push(op);
            rest = rest[close + 1..].trim();
        }

        Ok(Self(ops))
    }
}

impl Display for TransformList {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, op) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{op}")?;
        }

        Ok(())
    }
}

/// Evaluates symbolizer properties for one feature.
///
/// A property is looked up in the symbolizer first, then in the style defaults, then the default
/// of the symbolizer class is used.
pub struct PropertyResolver<'a> {
    kind: SymbolizerKind,
    properties: &'a Properties,
    defaults: Option<&'a Properties>,
    feature: &'a Feature,
    variables: &'a Variables,
}

impl<'a> PropertyResolver<'a> {
    /// Creates a new resolver.
    pub fn new(
        kind: SymbolizerKind,
        properties: &'a Properties,
        defaults: Option<&'a Properties>,
        feature: &'a Feature,
        variables: &'a Variables,
    ) -> Self {
        Self {
            kind,
            properties,
            defaults,
            feature,
            variables,
        }
    }

    /// Feature the properties are evaluated for.
    pub fn feature(&self) -> &'a Feature {
        self.feature
    }

    /// Map variables.
    pub fn variables(&self) -> &'a Variables {
        self.variables
    }

    /// Property definition after the fallback chain.
    pub fn property(&self, key: Key) -> Cow<'a, Property> {
        if let Some(property) = self.properties.get(key) {
            return Cow::Borrowed(property);
        }
        if let Some(property) = self.defaults.and_then(|d| d.get(key)) {
            return Cow::Borrowed(property);
        }

        Cow::Owned(key.class_default(self.kind))
    }

    /// Returns true if the symbolizer or the style defaults set the property.
    pub fn is_set(&self, key: Key) -> bool {
        self.properties.contains(key) || self.defaults.is_some_and(|d| d.contains(key))
    }

    /// Evaluated value of the property.
    pub fn value(&self, key: Key) -> Value {
        match self.property(key).as_ref() {
            Property::Expression(expr) => expr.evaluate(self.feature, self.variables),
            property => property.to_value(),
        }
    }

    /// Numeric value of the property, `None` if the value is not a number.
    pub fn f64(&self, key: Key) -> Option<f64> {
        self.value(key).to_f64()
    }

    /// Numeric value of the property, or `default` if it's not set or not a number.
    pub fn f64_or(&self, key: Key, default: f64) -> f64 {
        self.f64(key).unwrap_or(default)
    }

    /// Boolean value of the property.
    pub fn bool(&self, key: Key) -> bool {
        self.value(key).to_bool()
    }

    /// String value of the property, `None` if the value is null.
    pub fn string(&self, key: Key) -> Option<String> {
        match self.value(key) {
            Value::Null => None,
            value => Some(value.to_string()),
        }
    }

    /// Color value of the property, `None` if it cannot be interpreted as a color.
    pub fn color(&self, key: Key) -> Option<Color> {
        match self.property(key).as_ref() {
            Property::Color(color) => Some(*color),
            _ => {
                let value = self.value(key);
                let color = Color::parse(&value.to_string());
                if color.is_none() && !value.is_null() {
                    log::debug!("Value '{value}' of '{key}' is not a color");
                }
                color
            }
        }
    }

    /// Parses an enumeration property. Invalid values are logged and `None` is returned.
    pub fn enumeration<T: FromStr>(&self, key: Key) -> Option<T> {
        let text = self.string(key)?;
        match text.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                log::warn!("Invalid value '{text}' of '{key}'");
                None
            }
        }
    }

    /// Transform matrix of the property, `None` if the transform is not set.
    pub fn transform(&self, key: Key, scale_factor: f64) -> Option<Matrix3<f64>> {
        match self.property(key).as_ref() {
            Property::Transform(list) if !list.is_empty() => Some(list.to_matrix(scale_factor)),
            Property::Transform(_) => None,
            _ => {
                let text = self.string(key)?;
                match text.parse::<TransformList>() {
                    Ok(list) if !list.is_empty() => Some(list.to_matrix(scale_factor)),
                    Ok(_) => None,
                    Err(err) => {
                        log::warn!("{err}");
                        None
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_abs_diff_eq;
    use cartograph_types::Point2d;

    use super::*;
    use crate::feature::Context;

    fn feature() -> Feature {
        Feature::new(1, Arc::new(Context::new(["width", "color"])))
            .with("width", 3)
            .with("color", "#ff0000")
    }

    #[test]
    fn fallback_chain() {
        let symbolizer = Properties::new()
            .with(Key::StrokeWidth, Expr::parse("[width] * 2").unwrap())
            .with(Key::Stroke, Expr::parse("[color]").unwrap());
        let defaults = Properties::new()
            .with(Key::StrokeOpacity, 0.5)
            .with(Key::StrokeWidth, 10.0);
        let feature = feature();
        let variables = Variables::new();
        let resolver = PropertyResolver::new(
            SymbolizerKind::Line,
            &symbolizer,
            Some(&defaults),
            &feature,
            &variables,
        );

        assert_eq!(resolver.f64(Key::StrokeWidth), Some(6.0));
        assert_eq!(resolver.color(Key::Stroke), Some(Color::RED));
        assert_eq!(resolver.f64(Key::StrokeOpacity), Some(0.5));
        assert_eq!(resolver.f64(Key::Offset), Some(0.0));
        assert_eq!(resolver.string(Key::StrokeDasharray), None);
        assert!(resolver.bool(Key::Clip));
    }

    #[test]
    fn text_interpretation() {
        assert_eq!(
            Property::from_text(Key::Fill, "#00ff00").unwrap(),
            Property::Color(Color::GREEN)
        );
        assert!(matches!(
            Property::from_text(Key::Fill, "[color]").unwrap(),
            Property::Expression(_)
        ));
        assert!(matches!(
            Property::from_text(Key::Name, "'text'").unwrap(),
            Property::Expression(_)
        ));
        assert_eq!(
            Property::from_text(Key::StrokeLinejoin, "round").unwrap(),
            Property::Value(Value::from("round"))
        );
        assert!(Property::from_text(Key::Fill, "not a color").is_err());
    }

    #[test]
    fn transform_list() {
        let list: TransformList = "translate(10, 5) rotate(90)".parse().unwrap();
        assert_eq!(list.to_string(), "translate(10, 5) rotate(90)");

        let matrix = list.to_matrix(1.0);
        let p = matrix.transform_point(&Point2d::new(1.0, 0.0));
        assert_abs_diff_eq!(p, Point2d::new(10.0, 6.0), epsilon = 1e-9);

        let scaled = list.to_matrix(2.0).transform_point(&Point2d::new(0.0, 0.0));
        assert_abs_diff_eq!(scaled, Point2d::new(20.0, 10.0), epsilon = 1e-9);

        assert!("translate(1, 2".parse::<TransformList>().is_err());
        assert!("spin(1)".parse::<TransformList>().is_err());
        assert!("".parse::<TransformList>().unwrap().is_empty());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serialization() {
        let json = r##"{"fill": "#0000ff", "stroke-width": 2.5, "name": "[name]", "transform": "scale(2)", "stroke-linecap": "round"}"##;
        let properties: Properties = serde_json::from_str(json).unwrap();
        assert_eq!(properties.get(Key::Fill), Some(&Property::Color(Color::BLUE)));
        assert_eq!(properties.get(Key::StrokeWidth), Some(&Property::from(2.5)));
        assert_matches::assert_matches!(properties.get(Key::Name), Some(Property::Expression(_)));
        assert_matches::assert_matches!(properties.get(Key::Transform), Some(Property::Transform(_)));

        let back: Properties =
            serde_json::from_str(&serde_json::to_string(&properties).unwrap()).unwrap();
        assert_eq!(back, properties);

        assert!(serde_json::from_str::<Properties>(r#"{"fill": "nope"}"#).is_err());
        assert!(serde_json::from_str::<Properties>(r#"{"unknown-key": 1}"#).is_err());
    }
}
