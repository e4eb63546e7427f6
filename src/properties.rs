use crate::error::{MapError, Result};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// An RGB color with optional alpha, written `#rrggbb` or `#aarrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: Option<u8>,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: None }
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let hex = s.strip_prefix('#').unwrap_or(s);
        let bad = || MapError::InvalidArgument(format!("bad color: '{s}'"));
        let byte = |i: usize| {
            hex.get(i..i + 2)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(bad)
        };
        match hex.len() {
            6 => Ok(Self::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Self {
                a: Some(byte(0)?),
                ..Self::rgb(byte(2)?, byte(4)?, byte(6)?)
            }),
            _ => Err(bad()),
        }
    }

    pub fn to_hex(&self) -> String {
        match self.a {
            Some(a) => format!("#{a:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b),
            None => format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b),
        }
    }
}

impl FromStr for Color {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// A typed custom property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    I64(i64),
    F64(f64),
    String(String),
    Color(Color),
    /// Path to a file, relative to the document.
    File(String),
    /// Id of an object in the same map.
    Object(u32),
}

impl PropertyValue {
    /// Name of the type as written in Tiled documents.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::I64(_) => "int",
            PropertyValue::F64(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::Color(_) => "color",
            PropertyValue::File(_) => "file",
            PropertyValue::Object(_) => "object",
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        PropertyValue::String(s.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        PropertyValue::String(s)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::I64(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::F64(v)
    }
}

/// Custom properties of a map, layer, object, tileset or tile.
///
/// Kept sorted by name so that saved documents are reproducible.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(BTreeMap<String, PropertyValue>);

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        self.0.insert(name.into(), value.into())
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.0.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<PropertyValue> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        match self.get(name)? {
            PropertyValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        match self.get(name)? {
            PropertyValue::I64(v) => Some(*v),
            PropertyValue::Object(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn get_i32(&self, name: &str) -> Option<i32> {
        self.get_i64(name).and_then(|v| i32::try_from(v).ok())
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        match self.get(name)? {
            PropertyValue::F64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn get_f32(&self, name: &str) -> Option<f32> {
        self.get_f64(name).map(|v| v as f32)
    }

    /// String-like values: strings and file paths.
    pub fn get_string(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            PropertyValue::String(s) | PropertyValue::File(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_color(&self, name: &str) -> Option<Color> {
        match self.get(name)? {
            PropertyValue::Color(c) => Some(*c),
            _ => None,
        }
    }
}

impl<K: Into<String>, V: Into<PropertyValue>> FromIterator<(K, V)> for Properties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_keep_their_alpha_form() {
        let c: Color = "#ff8000".parse().unwrap();
        assert_eq!(c, Color::rgb(255, 128, 0));
        assert_eq!(c.to_hex(), "#ff8000");

        let c = Color::from_hex("80102030").unwrap();
        assert_eq!(c.a, Some(0x80));
        assert_eq!(c.to_hex(), "#80102030");

        assert!(Color::from_hex("#12345").is_err());
        assert!(Color::from_hex("#gg0000").is_err());
    }

    #[test]
    fn typed_getters() {
        let mut props = Properties::new();
        props.insert("solid", true);
        props.insert("big", 5_000_000_000i64);
        props.insert("speed", 2.5);
        props.insert("label", "door");
        props.insert("tint", PropertyValue::Color(Color::rgb(1, 2, 3)));

        assert_eq!(props.get_bool("solid"), Some(true));
        assert_eq!(props.get_i64("big"), Some(5_000_000_000));
        assert_eq!(props.get_i32("big"), None);
        assert_eq!(props.get_f32("speed"), Some(2.5));
        assert_eq!(props.get_string("label"), Some("door"));
        assert_eq!(props.get_color("tint"), Some(Color::rgb(1, 2, 3)));
        assert_eq!(props.get_bool("label"), None);
        assert_eq!(props.iter().next().map(|(k, _)| k), Some("big"));
    }
}
