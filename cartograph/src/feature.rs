//! Features are the units of data a map is rendered from.
//!
//! A [`Feature`] has an identifier, a set of attributes, one or more geometries and an optional
//! raster payload. Attribute names are not stored in features: they are interned in a [`Context`]
//! shared by all features of one datasource query, and each feature keeps only the list of values
//! in the order of the context slots.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use ahash::HashMap;
use cartograph_types::{Box2d, Geometry};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::image::ImageRgba8;

/// Attribute value.
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Value {
    /// No value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Integer(i64),
    /// Floating point number.
    Double(f64),
    /// Unicode string.
    String(String),
}

impl Value {
    /// Returns true if the value is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Truthiness of the value: null, `false`, zero and empty string are false.
    pub fn to_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(v) => *v,
            Value::Integer(v) => *v != 0,
            Value::Double(v) => *v != 0.0,
            Value::String(v) => !v.is_empty(),
        }
    }

    /// Numeric value. Strings are parsed, values that cannot be interpreted as numbers give `None`.
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Null => None,
            Value::Bool(v) => Some(if *v { 1.0 } else { 0.0 }),
            Value::Integer(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::String(v) => v.trim().parse().ok(),
        }
    }

    /// Integer value. Doubles are truncated.
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Null => None,
            Value::Bool(v) => Some(*v as i64),
            Value::Integer(v) => Some(*v),
            Value::Double(v) => Some(*v as i64),
            Value::String(v) => v
                .trim()
                .parse::<i64>()
                .ok()
                .or_else(|| v.trim().parse::<f64>().ok().map(|d| d as i64)),
        }
    }

    /// Compares two values.
    ///
    /// Numbers are compared numerically (integers are promoted to doubles when compared with
    /// doubles), strings lexicographically, booleans as numbers. Values of incompatible kinds (a
    /// string and a number, or anything and null) are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::String(_), _) | (_, Value::String(_)) => None,
            (a, b) => a.to_f64()?.partial_cmp(&b.to_f64()?),
        }
    }

    /// Equality with numeric promotion. A string is never equal to a number.
    pub fn equals(&self, other: &Value) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

/// Named values available to style expressions as `@name` (map variables).
pub type Variables = BTreeMap<String, Value>;

/// Mapping of attribute names to value slots, shared by all features of one query.
#[derive(Debug, Default, Clone)]
pub struct Context {
    names: Vec<String>,
    slots: HashMap<String, usize>,
}

impl Context {
    /// Creates a context with the given attribute names. Repeated names are stored once.
    pub fn new<S: Into<String>>(names: impl IntoIterator<Item = S>) -> Self {
        let mut context = Self::default();
        for name in names {
            context.push(name.into());
        }

        context
    }

    /// Adds a new attribute name and returns its slot. If the name already exists its slot is returned.
    pub fn push(&mut self, name: String) -> usize {
        if let Some(slot) = self.slots.get(&name) {
            return *slot;
        }

        let slot = self.names.len();
        self.slots.insert(name.clone(), slot);
        self.names.push(name);
        slot
    }

    /// Slot of the attribute with the given name.
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.slots.get(name).copied()
    }

    /// Attribute names in slot order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if the context has no attributes.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Raster data attached to a feature (raster datasources).
#[derive(Debug, Clone)]
pub struct RasterPayload {
    /// Extent of the raster in the layer coordinates.
    pub extent: Box2d,
    /// Pixel data.
    pub data: RasterData,
    /// Value that marks pixels without data (single band rasters).
    pub nodata: Option<f64>,
}

/// Pixel data of a [`RasterPayload`].
#[derive(Debug, Clone)]
pub enum RasterData {
    /// Color image.
    Rgba(ImageRgba8),
    /// Single band data, to be colorized by a raster colorizer.
    Band {
        /// Width in pixels.
        width: u32,
        /// Height in pixels.
        height: u32,
        /// Row-major values.
        values: Vec<f32>,
    },
}

impl RasterData {
    /// Width of the raster in pixels.
    pub fn width(&self) -> u32 {
        match self {
            RasterData::Rgba(image) => image.width(),
            RasterData::Band { width, .. } => *width,
        }
    }

    /// Height of the raster in pixels.
    pub fn height(&self) -> u32 {
        match self {
            RasterData::Rgba(image) => image.height(),
            RasterData::Band { height, .. } => *height,
        }
    }
}

/// A unit of data to render.
#[derive(Debug, Clone)]
pub struct Feature {
    id: i64,
    context: Arc<Context>,
    values: Vec<Value>,
    geometries: Vec<Geometry>,
    raster: Option<Arc<RasterPayload>>,
}

impl Feature {
    /// Creates a feature without attribute values and geometries.
    pub fn new(id: i64, context: Arc<Context>) -> Self {
        let values = vec![Value::Null; context.len()];
        Self {
            id,
            context,
            values,
            geometries: vec![],
            raster: None,
        }
    }

    /// Sets the attribute value. Names unknown to the context are ignored with a warning.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        match self.context.slot(name) {
            Some(slot) => {
                if slot >= self.values.len() {
                    self.values.resize(slot + 1, Value::Null);
                }
                self.values[slot] = value.into();
            }
            None => log::warn!("Attribute '{name}' is not a part of the feature context"),
        }
    }

    /// Builder-style version of [`Feature::set`].
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Adds a geometry.
    pub fn with_geometry(mut self, geometry: impl Into<Geometry>) -> Self {
        self.geometries.push(geometry.into());
        self
    }

    /// Attaches a raster payload.
    pub fn with_raster(mut self, raster: RasterPayload) -> Self {
        self.raster = Some(Arc::new(raster));
        self
    }

    /// Feature identifier.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Value of an attribute. Unknown attributes are [`Value::Null`].
    pub fn get(&self, name: &str) -> &Value {
        const NULL: &Value = &Value::Null;
        self.context
            .slot(name)
            .and_then(|slot| self.values.get(slot))
            .unwrap_or(NULL)
    }

    /// Returns true if the attribute is known to the feature context.
    pub fn has_key(&self, name: &str) -> bool {
        self.context.slot(name).is_some()
    }

    /// Iterates over attribute names and values.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.context
            .names()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Context of the feature.
    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Geometries of the feature.
    pub fn geometries(&self) -> &[Geometry] {
        &self.geometries
    }

    /// Raster payload.
    pub fn raster(&self) -> Option<&RasterPayload> {
        self.raster.as_deref()
    }

    /// Bounding box of all geometries (or the raster extent).
    pub fn envelope(&self) -> Box2d {
        let mut bbox: Box2d = self.geometries.iter().map(|g| g.envelope()).collect();
        if let Some(raster) = &self.raster {
            bbox.expand_to_include(&raster.extent);
        }

        bbox
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cartograph_types::Point2d;

    #[test]
    fn attributes_by_slot() {
        let context = Arc::new(Context::new(["name", "pop", "name"]));
        assert_eq!(context.len(), 2);

        let feature = Feature::new(1, context.clone())
            .with("name", "Paris")
            .with("pop", 2_100_000)
            .with("unknown", 1)
            .with_geometry(Point2d::new(2.35, 48.85));

        assert_eq!(feature.get("name"), &Value::from("Paris"));
        assert_eq!(feature.get("pop").to_i64(), Some(2_100_000));
        assert!(feature.get("unknown").is_null());
        assert!(!feature.has_key("unknown"));
        assert_eq!(feature.attributes().count(), 2);
    }

    #[test]
    fn value_comparison() {
        assert!(Value::Integer(1).equals(&Value::Double(1.0)));
        assert_eq!(
            Value::Integer(2).compare(&Value::Double(2.5)),
            Some(Ordering::Less)
        );
        assert!(!Value::from("1").equals(&Value::Integer(1)));
        assert_eq!(Value::from("a").compare(&Value::Integer(1)), None);
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert!(Value::Null.equals(&Value::Null));
    }

    #[test]
    fn value_conversions() {
        assert!(!Value::from("").to_bool());
        assert!(Value::from("x").to_bool());
        assert_eq!(Value::from(" 12.5 ").to_f64(), Some(12.5));
        assert_eq!(Value::from("12.5").to_i64(), Some(12));
        assert_eq!(Value::Bool(true).to_f64(), Some(1.0));
        assert_eq!(Value::Null.to_string(), "");
    }
}
