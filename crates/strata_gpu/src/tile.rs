//! Decoded tile input
//!
//! Tiles arrive already decoded from their wire format: an ordered list of
//! features, each with typed geometry in tile coordinates and a flat map of
//! scalar properties.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use strata_core::Value;

/// Tile address in a z/x/y pyramid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileId {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileId {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }
}

impl fmt::Display for TileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Feature geometry. Every variant may hold several parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Vec<[f64; 2]>),
    /// One coordinate sequence per line string
    Line(Vec<Vec<[f64; 2]>>),
    /// Rings of one polygon; holes are resolved with the even-odd rule
    Polygon(Vec<Vec<[f64; 2]>>),
}

impl Geometry {
    pub fn kind(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "point",
            Geometry::Line(_) => "line",
            Geometry::Polygon(_) => "polygon",
        }
    }

    /// True when no part of the geometry would produce a triangle
    pub fn is_degenerate(&self) -> bool {
        match self {
            Geometry::Point(points) => !points.iter().any(|p| is_finite(*p)),
            Geometry::Line(lines) => !lines.iter().any(|line| has_segment(line)),
            Geometry::Polygon(rings) => !rings.iter().any(|ring| ring_area(ring).abs() > f64::EPSILON),
        }
    }
}

fn is_finite(p: [f64; 2]) -> bool {
    p[0].is_finite() && p[1].is_finite()
}

fn has_segment(line: &[[f64; 2]]) -> bool {
    line.windows(2)
        .any(|w| is_finite(w[0]) && is_finite(w[1]) && w[0] != w[1])
}

/// Signed shoelace area; NaN for non-finite rings
pub(crate) fn ring_area(ring: &[[f64; 2]]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for (i, a) in ring.iter().enumerate() {
        let b = ring[(i + 1) % ring.len()];
        twice += a[0] * b[1] - b[0] * a[1];
    }
    twice * 0.5
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct Feature {
    #[serde(default)]
    pub id: Option<u64>,
    pub geometry: Geometry,
    #[serde(default, deserialize_with = "non_null_properties")]
    pub properties: BTreeMap<String, Value>,
}

/// Null-valued properties are treated as absent
fn non_null_properties<'de, D>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Option<Value>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| v.map(|v| (k, v)))
        .collect())
}

impl Feature {
    pub fn new(geometry: Geometry) -> Self {
        Self {
            id: None,
            geometry,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct DecodedTile {
    pub id: TileId,
    /// Data version assigned by the decoder, copied into built buffers
    #[serde(default)]
    pub generation: u64,
    pub features: Vec<Feature>,
}

impl DecodedTile {
    pub fn new(id: TileId, features: Vec<Feature>) -> Self {
        Self {
            id,
            generation: 0,
            features,
        }
    }

    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    pub fn from_json_str(input: &str) -> serde_json::Result<Self> {
        serde_json::from_str(input)
    }
}
