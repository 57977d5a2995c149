//! Core data types for plot observations, classification requests, and results.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One dated set of remote-sensing index values for a plot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub plot_id: String,
    pub date: NaiveDate,
    #[serde(with = "index_value")]
    pub ndvi: f64,
    #[serde(with = "index_value")]
    pub ndbi: f64,
    #[serde(with = "index_value")]
    pub ndwi: f64,
}

/// A request to classify the change on one plot between two dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub request_id: String,
    pub plot_id: String,
    pub baseline_date: NaiveDate,
    pub target_date: NaiveDate,
    #[serde(default)]
    pub land_type: Option<String>,
}

/// Rule strings for one land type, one per classification axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub land_type: String,
    pub vegetation_rule: String,
    pub construction_rule: String,
    pub flooding_rule: String,
}

/// Per-index change, baseline minus target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct IndexDelta {
    #[serde(with = "index_value")]
    pub ndvi: f64,
    #[serde(with = "index_value")]
    pub ndbi: f64,
    #[serde(with = "index_value")]
    pub ndwi: f64,
}

impl IndexDelta {
    /// The delta an axis is classified on.
    pub fn for_axis(&self, axis: Axis) -> f64 {
        match axis {
            Axis::Vegetation => self.ndvi,
            Axis::Construction => self.ndbi,
            Axis::Flooding => self.ndwi,
        }
    }
}

/// The three independent classification axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    Vegetation,
    Construction,
    Flooding,
}

impl Axis {
    pub const ALL: [Axis; 3] = [Axis::Vegetation, Axis::Construction, Axis::Flooding];

    pub fn as_str(&self) -> &'static str {
        match self {
            Axis::Vegetation => "vegetation",
            Axis::Construction => "construction",
            Axis::Flooding => "flooding",
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a single axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisOutcome {
    /// Human-readable inference, e.g. "Deep Change - Increased" or "No Change".
    pub inference: String,
    /// Whether the land type's rule for this axis evaluated to true.
    pub rule_matched: bool,
}

/// A fully classified request. Only produced when both dates matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeResult {
    pub request_id: String,
    pub plot_id: String,
    pub matched_baseline_date: NaiveDate,
    pub matched_target_date: NaiveDate,
    pub baseline: Observation,
    pub target: Observation,
    pub delta: IndexDelta,
    /// Land type whose rules were applied (after any fallback).
    pub rules_used: String,
    pub vegetation: AxisOutcome,
    pub construction: AxisOutcome,
    pub flooding: AxisOutcome,
}

impl ChangeResult {
    pub fn outcome(&self, axis: Axis) -> &AxisOutcome {
        match axis {
            Axis::Vegetation => &self.vegetation,
            Axis::Construction => &self.construction,
            Axis::Flooding => &self.flooding,
        }
    }

    pub fn vegetation_inference(&self) -> &str {
        &self.vegetation.inference
    }

    pub fn construction_inference(&self) -> &str {
        &self.construction.inference
    }

    pub fn flood_inference(&self) -> &str {
        &self.flooding.inference
    }
}

/// Errors that can occur in the plotwatch library.
#[derive(thiserror::Error, Debug)]
pub enum PlotwatchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Threshold catalog is empty")]
    MissingCatalog,

    #[error("Default land type '{0}' has no threshold rule")]
    UnknownDefaultLandType(String),

    #[error("Duplicate observation for plot '{plot_id}' on {date}")]
    DuplicateObservation { plot_id: String, date: NaiveDate },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Run cancelled")]
    Cancelled,
}

/// Convenience result type.
pub type PlotwatchResult<T> = Result<T, PlotwatchError>;

/// Serde adapter for index values, which may be NaN or infinite (masked or
/// saturated pixels). JSON has no such numbers, so they are written as the
/// strings `"NaN"`, `"inf"` and `"-inf"`.
pub(crate) mod index_value {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("NaN")
        } else if *value > 0.0 {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(v) => Ok(v),
            Repr::Text(s) => match s.as_str() {
                "NaN" => Ok(f64::NAN),
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                other => Err(de::Error::custom(format!("invalid index value '{other}'"))),
            },
        }
    }
}
