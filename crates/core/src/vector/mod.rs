//! Vector layers: study boundary, ecoregion partition, fire perimeters
//!
//! Layers are read from JSON documents of the form
//! `{"features": [{"geometry": {...}, "properties": {...}}]}`, with
//! geometries in the serde encoding of `geo-types`.

use geo_types::Geometry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{Error, Result};

/// Attribute value as found in the source layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl AttributeValue {
    /// Integer view of the attribute.
    ///
    /// Fire perimeter layers store years as integers, floats or strings
    /// depending on the source; all three are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AttributeValue::Int(v) => Some(*v),
            AttributeValue::Float(v) if v.is_finite() && v.fract() == 0.0 => Some(*v as i64),
            AttributeValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// One polygon of a layer and its attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Feature {
    /// `None` for features whose geometry was empty in the source
    pub geometry: Option<Geometry<f64>>,
    #[serde(default)]
    pub properties: HashMap<String, AttributeValue>,
}

impl Feature {
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }

    /// Integer attribute (ecoregion code, fire year); `None` if absent or
    /// not an integer
    pub fn integer(&self, key: &str) -> Option<i64> {
        self.get_property(key).and_then(AttributeValue::as_i64)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read a layer document; parse errors name the file
    pub fn read_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| Error::Other(format!("{}: {}", path.display(), e)))
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}
