//! GeoJSON submission model and the point validator.
//!
//! Vendors submit either a single `Feature` or a `FeatureCollection`. Both are
//! modelled as [`Submission`] and dispatched on the top-level `"type"` member.
//! Unknown members are carried through untouched so that the accepted
//! representation echoes back exactly what the vendor sent.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

pub const MIN_LATITUDE: f64 = -90.0;
pub const MAX_LATITUDE: f64 = 90.0;
pub const MIN_LONGITUDE: f64 = -180.0;
/// Exclusive upper bound, so the antimeridian has a single encoding (-180).
pub const MAX_LONGITUDE: f64 = 180.0;

/// Reasons a submission is rejected before it is queued.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("Error parsing GeoJSON: {0}")]
    MalformedPayload(String),

    #[error("{0}")]
    UnsupportedGeometry(String),

    #[error("{0}")]
    OutOfRange(String),
}

impl ValidationError {
    fn in_feature(self, index: usize) -> Self {
        match self {
            Self::MalformedPayload(msg) => Self::MalformedPayload(format!("feature {index}: {msg}")),
            Self::UnsupportedGeometry(msg) => {
                Self::UnsupportedGeometry(format!("feature {index}: {msg}"))
            }
            Self::OutOfRange(msg) => Self::OutOfRange(format!("feature {index}: {msg}")),
        }
    }
}

/// A GeoJSON position: longitude, latitude and an optional altitude.
///
/// Kept as JSON numbers so an integer coordinate is echoed as an integer.
pub type Position = Vec<Number>;

/// The `type`-tagged part of a geometry object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GeometryValue {
    Point {
        coordinates: Position,
    },
    MultiPoint {
        coordinates: Vec<Position>,
    },
    LineString {
        coordinates: Vec<Position>,
    },
    MultiLineString {
        coordinates: Vec<Vec<Position>>,
    },
    Polygon {
        coordinates: Vec<Vec<Position>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Position>>>,
    },
    GeometryCollection {
        geometries: Vec<Geometry>,
    },
}

/// A geometry object together with its optional `bbox` and foreign members.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Geometry {
    #[serde(flatten)]
    pub value: GeometryValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<Number>>,
    #[serde(flatten)]
    pub foreign_members: Map<String, Value>,
}

impl Geometry {
    /// `None` when either value is not a finite number.
    pub fn point(longitude: f64, latitude: f64) -> Option<Self> {
        Some(Self::from(GeometryValue::Point {
            coordinates: vec![Number::from_f64(longitude)?, Number::from_f64(latitude)?],
        }))
    }

    pub fn type_name(&self) -> &'static str {
        match self.value {
            GeometryValue::Point { .. } => "Point",
            GeometryValue::MultiPoint { .. } => "MultiPoint",
            GeometryValue::LineString { .. } => "LineString",
            GeometryValue::MultiLineString { .. } => "MultiLineString",
            GeometryValue::Polygon { .. } => "Polygon",
            GeometryValue::MultiPolygon { .. } => "MultiPolygon",
            GeometryValue::GeometryCollection { .. } => "GeometryCollection",
        }
    }
}

impl From<GeometryValue> for Geometry {
    fn from(value: GeometryValue) -> Self {
        Self {
            value,
            bbox: None,
            foreign_members: Map::new(),
        }
    }
}

// The tagged part only claims `type` plus `coordinates` or `geometries`;
// every other member stays with the object.
impl TryFrom<Map<String, Value>> for Geometry {
    type Error = String;

    fn try_from(mut members: Map<String, Value>) -> Result<Self, Self::Error> {
        let bbox = members
            .remove("bbox")
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| format!("invalid geometry bbox: {e}"))?;

        let payload_key = match members.get("type").and_then(Value::as_str) {
            Some("GeometryCollection") => "geometries",
            Some(_) => "coordinates",
            None => return Err("geometry `type` must be a string".to_string()),
        };

        let mut tagged = Map::new();
        for key in ["type", payload_key] {
            if let Some(member) = members.remove(key) {
                tagged.insert(key.to_string(), member);
            }
        }
        let value = serde_json::from_value(Value::Object(tagged)).map_err(|e| e.to_string())?;

        Ok(Self {
            value,
            bbox,
            foreign_members: members,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureKind {
    Feature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeatureCollectionKind {
    FeatureCollection,
}

/// A single GeoJSON feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    #[serde(rename = "type")]
    pub kind: FeatureKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<Number>>,
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub properties: Option<Map<String, Value>>,
    #[serde(flatten)]
    pub foreign_members: Map<String, Value>,
}

impl Feature {
    pub fn new(geometry: Geometry, properties: Map<String, Value>) -> Self {
        Self {
            kind: FeatureKind::Feature,
            id: None,
            bbox: None,
            geometry: Some(geometry),
            properties: Some(properties),
            foreign_members: Map::new(),
        }
    }
}

/// An ordered set of features submitted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection {
    #[serde(rename = "type")]
    pub kind: FeatureCollectionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<Vec<Number>>,
    pub features: Vec<Feature>,
    #[serde(flatten)]
    pub foreign_members: Map<String, Value>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self {
            kind: FeatureCollectionKind::FeatureCollection,
            bbox: None,
            features,
            foreign_members: Map::new(),
        }
    }
}

/// What a vendor may POST: one feature, or a collection of them.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Submission {
    Feature(Feature),
    FeatureCollection(FeatureCollection),
}

impl Submission {
    /// Number of features carried by this submission.
    pub fn feature_count(&self) -> usize {
        match self {
            Submission::Feature(_) => 1,
            Submission::FeatureCollection(fc) => fc.features.len(),
        }
    }

    pub fn features(&self) -> Box<dyn Iterator<Item = &Feature> + '_> {
        match self {
            Submission::Feature(feature) => Box::new(std::iter::once(feature)),
            Submission::FeatureCollection(fc) => Box::new(fc.features.iter()),
        }
    }
}

impl<'de> Deserialize<'de> for Submission {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        let kind = match value.get("type") {
            Some(Value::String(kind)) => kind.clone(),
            Some(_) => return Err(de::Error::custom("`type` must be a string")),
            None => return Err(de::Error::missing_field("type")),
        };

        match kind.as_str() {
            "Feature" => serde_json::from_value(value)
                .map(Submission::Feature)
                .map_err(de::Error::custom),
            "FeatureCollection" => serde_json::from_value(value)
                .map(Submission::FeatureCollection)
                .map_err(de::Error::custom),
            other => Err(de::Error::custom(format!(
                "unsupported GeoJSON type `{other}`, expected `Feature` or `FeatureCollection`"
            ))),
        }
    }
}

/// Parse untrusted bytes as a submission and check every feature is an
/// in-range point.
pub fn validate_submission(data: &[u8]) -> Result<Submission, ValidationError> {
    let submission: Submission = serde_json::from_slice(data)
        .map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;

    match &submission {
        Submission::Feature(feature) => validate_feature(feature)?,
        Submission::FeatureCollection(fc) => {
            for (index, feature) in fc.features.iter().enumerate() {
                validate_feature(feature).map_err(|e| e.in_feature(index))?;
            }
        }
    }

    Ok(submission)
}

pub fn validate_feature(feature: &Feature) -> Result<(), ValidationError> {
    match &feature.geometry {
        Some(Geometry {
            value: GeometryValue::Point { coordinates },
            ..
        }) => validate_position(coordinates),
        _ => Err(ValidationError::UnsupportedGeometry(
            "geometry is not a point".to_string(),
        )),
    }
}

fn validate_position(position: &[Number]) -> Result<(), ValidationError> {
    let (lon, lat) = match position {
        [lon, lat] | [lon, lat, _] => (
            lon.as_f64().unwrap_or(f64::NAN),
            lat.as_f64().unwrap_or(f64::NAN),
        ),
        _ => {
            return Err(ValidationError::MalformedPayload(format!(
                "point position must have 2 or 3 elements, got {}",
                position.len()
            )))
        }
    };

    // Range checks written so that NaN fails both.
    if !(MIN_LATITUDE..=MAX_LATITUDE).contains(&lat) {
        return Err(ValidationError::OutOfRange(
            "latitude value should be in range [-90.0, 90.0]".to_string(),
        ));
    }

    if !(MIN_LONGITUDE..MAX_LONGITUDE).contains(&lon) {
        return Err(ValidationError::OutOfRange(
            "longitude value should be in range [-180.0, 180.0)".to_string(),
        ));
    }

    Ok(())
}
