use serde::de::Error as _;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

// ── Data Model ──────────────────────────────────────────────────────────────

/// A traced vertex in the raster's world coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Snap a clicked position to whole world units (half-way cases go to even).
    pub fn captured(x: f64, y: f64) -> Self {
        Self {
            x: x.round_ties_even(),
            y: y.round_ties_even(),
        }
    }
}

/// One continuous polyline, in drawing order.
pub type Segment = Vec<Point>;

/// Whole numbers are written as JSON integers so traced files stay `[10, 20]`.
struct Coordinate(f64);

const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

impl Serialize for Coordinate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.0.fract() == 0.0 && self.0.abs() <= MAX_EXACT_INT {
            serializer.serialize_i64(self.0 as i64)
        } else {
            serializer.serialize_f64(self.0)
        }
    }
}

impl Serialize for Point {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut position = serializer.serialize_tuple(2)?;
        position.serialize_element(&Coordinate(self.x))?;
        position.serialize_element(&Coordinate(self.y))?;
        position.end()
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // positions may carry an elevation, which is dropped
        let position = Vec::<f64>::deserialize(deserializer)?;
        match position.as_slice() {
            [x, y, ..] => Ok(Point::new(*x, *y)),
            _ => Err(D::Error::custom(format!(
                "position needs at least 2 members, got {}",
                position.len()
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "MultiLineString")]
pub struct MultiLineString {
    pub coordinates: Vec<Segment>,
}

/// The persisted document: a single feature around a `MultiLineString`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename = "Feature")]
pub struct TraceFeature {
    pub geometry: MultiLineString,
    pub properties: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid GeoJSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl TraceFeature {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            geometry: MultiLineString {
                coordinates: segments,
            },
            properties: Map::new(),
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.geometry.coordinates
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.geometry.coordinates
    }

    /// Compact JSON with every object's keys in sorted order.
    pub fn to_json(&self) -> Result<String, GeometryError> {
        let value = sort_keys(serde_json::to_value(self)?);
        Ok(serde_json::to_string(&value)?)
    }
}

fn sort_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> =
                map.into_iter().map(|(k, v)| (k, sort_keys(v))).collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sort_keys).collect()),
        other => other,
    }
}

// ── Files ───────────────────────────────────────────────────────────────────

/// `roads.tif` -> `roads.geojson`
pub fn output_path(raster_path: &Path) -> PathBuf {
    raster_path.with_extension("geojson")
}

/// Parse a saved trace. `Ok(None)` means the file is valid JSON but holds
/// something other than a `MultiLineString` feature.
pub fn read_segments(path: &Path) -> Result<Option<Vec<Segment>>, GeometryError> {
    let data = std::fs::read_to_string(path).map_err(|source| GeometryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let document: Value = serde_json::from_str(&data)?;
    let Some(geometry) = document.get("geometry") else {
        return Ok(None);
    };
    if geometry.get("type").and_then(Value::as_str) != Some("MultiLineString") {
        return Ok(None);
    }
    let lines: MultiLineString = serde_json::from_value(geometry.clone())?;
    Ok(Some(lines.coordinates))
}

/// Segments from a previous run, or nothing. Never fails: a bad file only
/// costs the user their earlier context, not the session.
pub fn load_prior_segments(path: &Path) -> Vec<Segment> {
    if !path.exists() {
        return Vec::new();
    }
    match read_segments(path) {
        Ok(Some(segments)) => {
            log::info!(
                "Loaded {} existing segments from {}",
                segments.len(),
                path.display()
            );
            segments
        }
        Ok(None) => {
            log::warn!(
                "{} does not contain a MultiLineString feature, starting empty",
                path.display()
            );
            Vec::new()
        }
        Err(err) => {
            log::warn!("Could not load existing GeoJSON: {err}");
            Vec::new()
        }
    }
}

/// Earlier segments first, then this session's, both in their original order.
pub fn merge(prior: Vec<Segment>, new: Vec<Segment>) -> TraceFeature {
    let mut all = prior;
    all.extend(new);
    TraceFeature::new(all)
}

/// Replace `path` with `json` in one rename so a crash never leaves half a file.
pub fn persist(path: &Path, json: &str) -> Result<(), GeometryError> {
    let tmp = path.with_extension("geojson.tmp");
    let io_err = |source| GeometryError::Io {
        path: path.to_path_buf(),
        source,
    };
    std::fs::write(&tmp, json).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}
