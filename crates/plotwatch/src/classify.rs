//! Magnitude/direction classification of index deltas.

use serde::{Deserialize, Serialize};

use crate::catalog::CompiledRuleSet;
use crate::rules::Bindings;
use crate::types::{Axis, AxisOutcome, IndexDelta};

/// |delta| at or above this is a deep change.
pub const DEEP_THRESHOLD: f64 = 0.30;
/// |delta| at or above this is a moderate change.
pub const MODERATE_THRESHOLD: f64 = 0.15;
/// |delta| at or above this is a slight change.
pub const SLIGHT_THRESHOLD: f64 = 0.05;
/// delta must exceed this (in either direction) to have a direction.
pub const DIRECTION_THRESHOLD: f64 = 0.01;

/// Slack for binary representation error at the bounds, so that
/// `0.30 - 0.25` lands on the 0.05 tier.
const BOUND_EPSILON: f64 = 1e-9;

/// Inference emitted when there is no tier or no direction.
pub const NO_CHANGE: &str = "No Change";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Intensity {
    Deep,
    Moderate,
    Slight,
}

impl Intensity {
    pub fn from_delta(delta: f64) -> Option<Self> {
        let magnitude = delta.abs() + BOUND_EPSILON;
        if magnitude >= DEEP_THRESHOLD {
            Some(Intensity::Deep)
        } else if magnitude >= MODERATE_THRESHOLD {
            Some(Intensity::Moderate)
        } else if magnitude >= SLIGHT_THRESHOLD {
            Some(Intensity::Slight)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Intensity::Deep => "Deep Change",
            Intensity::Moderate => "Moderate Change",
            Intensity::Slight => "Slight Change",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Increased,
    Decreased,
}

impl Direction {
    pub fn from_delta(delta: f64) -> Option<Self> {
        if delta > DIRECTION_THRESHOLD + BOUND_EPSILON {
            Some(Direction::Increased)
        } else if delta < -(DIRECTION_THRESHOLD + BOUND_EPSILON) {
            Some(Direction::Decreased)
        } else {
            None
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Direction::Increased => "Increased",
            Direction::Decreased => "Decreased",
        }
    }
}

/// Whether a land type's rule decides the emitted inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleGating {
    /// The rule result is recorded but the inference comes from the delta alone.
    #[default]
    Advisory,
    /// A false rule forces "No Change" on that axis.
    Gate,
}

/// Inference string for one delta.
pub fn classify(delta: f64) -> String {
    match (Intensity::from_delta(delta), Direction::from_delta(delta)) {
        (Some(tier), Some(dir)) => format!("{} - {}", tier.label(), dir.label()),
        _ => NO_CHANGE.to_string(),
    }
}

/// Classify one axis and record its rule result.
pub fn classify_axis(
    axis: Axis,
    delta: &IndexDelta,
    rules: &CompiledRuleSet,
    gating: RuleGating,
) -> AxisOutcome {
    let rule_matched = rules.rule(axis).evaluate(&Bindings::from(delta));
    let inference = match gating {
        RuleGating::Gate if !rule_matched => NO_CHANGE.to_string(),
        _ => classify(delta.for_axis(axis)),
    };
    AxisOutcome {
        inference,
        rule_matched,
    }
}
