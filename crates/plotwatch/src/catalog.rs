//! Land type → rule set lookup with a default fallback.

use std::collections::HashMap;

use crate::rules::{Bindings, Rule, RuleError};
use crate::types::{Axis, PlotwatchError, PlotwatchResult, ThresholdRule};

/// Land type used when a request names none or an unknown one.
pub const DEFAULT_LAND_TYPE: &str = "Grassland";

/// A rule string compiled once at catalog load.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    source: String,
    parsed: Result<Rule, RuleError>,
}

impl CompiledRule {
    pub fn compile(source: &str) -> Self {
        Self {
            source: source.to_string(),
            parsed: Rule::parse(source),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn error(&self) -> Option<&RuleError> {
        self.parsed.as_ref().err()
    }

    /// Evaluate the rule. A rule that failed to compile is always false.
    pub fn evaluate(&self, bindings: &Bindings) -> bool {
        match &self.parsed {
            Ok(rule) => rule.evaluate(bindings),
            Err(_) => false,
        }
    }
}

/// The three compiled rules of one land type.
#[derive(Debug, Clone)]
pub struct CompiledRuleSet {
    pub land_type: String,
    pub vegetation: CompiledRule,
    pub construction: CompiledRule,
    pub flooding: CompiledRule,
}

impl CompiledRuleSet {
    fn compile(rule: &ThresholdRule) -> Self {
        Self {
            land_type: rule.land_type.trim().to_string(),
            vegetation: CompiledRule::compile(&rule.vegetation_rule),
            construction: CompiledRule::compile(&rule.construction_rule),
            flooding: CompiledRule::compile(&rule.flooding_rule),
        }
    }

    pub fn rule(&self, axis: Axis) -> &CompiledRule {
        match axis {
            Axis::Vegetation => &self.vegetation,
            Axis::Construction => &self.construction,
            Axis::Flooding => &self.flooding,
        }
    }
}

/// A rule string that failed to compile.
#[derive(Debug, Clone)]
pub struct RuleDiagnostic {
    pub land_type: String,
    pub axis: Axis,
    pub rule: String,
    pub error: RuleError,
}

/// Threshold rules for every known land type. Read-only once built.
#[derive(Debug, Clone)]
pub struct ThresholdCatalog {
    entries: Vec<CompiledRuleSet>,
    index: HashMap<String, usize>,
    default_idx: usize,
}

fn normalize(land_type: &str) -> String {
    land_type.trim().to_lowercase()
}

impl ThresholdCatalog {
    /// Build a catalog with [`DEFAULT_LAND_TYPE`] as the fallback.
    pub fn new(rules: Vec<ThresholdRule>) -> PlotwatchResult<Self> {
        Self::with_default(rules, DEFAULT_LAND_TYPE)
    }

    /// Build a catalog with an explicit fallback land type.
    ///
    /// Later rows for an already-seen land type replace earlier ones.
    pub fn with_default(rules: Vec<ThresholdRule>, default_land_type: &str) -> PlotwatchResult<Self> {
        if rules.is_empty() {
            return Err(PlotwatchError::MissingCatalog);
        }

        let mut entries: Vec<CompiledRuleSet> = Vec::with_capacity(rules.len());
        let mut index = HashMap::new();
        for rule in &rules {
            let compiled = CompiledRuleSet::compile(rule);
            for axis in Axis::ALL {
                if let Some(e) = compiled.rule(axis).error() {
                    tracing::warn!(
                        land_type = %compiled.land_type,
                        %axis,
                        rule = compiled.rule(axis).source(),
                        error = %e,
                        "Rule failed to compile; it will always evaluate to false"
                    );
                }
            }
            let key = normalize(&compiled.land_type);
            match index.get(&key) {
                Some(&idx) => {
                    tracing::warn!(land_type = %compiled.land_type, "Duplicate land type; keeping the later row");
                    entries[idx] = compiled;
                }
                None => {
                    index.insert(key, entries.len());
                    entries.push(compiled);
                }
            }
        }

        let default_idx = *index
            .get(&normalize(default_land_type))
            .ok_or_else(|| PlotwatchError::UnknownDefaultLandType(default_land_type.to_string()))?;

        tracing::debug!(
            land_types = entries.len(),
            default = %entries[default_idx].land_type,
            "Threshold catalog loaded"
        );

        Ok(Self {
            entries,
            index,
            default_idx,
        })
    }

    /// Number of land types.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn default_rule_set(&self) -> &CompiledRuleSet {
        &self.entries[self.default_idx]
    }

    pub fn land_types(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.land_type.as_str())
    }

    /// Exact lookup, without fallback.
    pub fn get(&self, land_type: &str) -> Option<&CompiledRuleSet> {
        self.index.get(&normalize(land_type)).map(|&i| &self.entries[i])
    }

    /// Resolve a land type, falling back to the default rule set.
    ///
    /// A missing or blank land type falls back silently; an unknown one
    /// logs a warning.
    pub fn resolve(&self, land_type: Option<&str>) -> &CompiledRuleSet {
        let requested = match land_type.map(str::trim) {
            Some(lt) if !lt.is_empty() => lt,
            _ => return self.default_rule_set(),
        };

        match self.get(requested) {
            Some(set) => set,
            None => {
                let fallback = self.default_rule_set();
                tracing::warn!(
                    land_type = requested,
                    fallback = %fallback.land_type,
                    "Unknown land type; using default rules"
                );
                fallback
            }
        }
    }

    /// Every rule string that failed to compile.
    pub fn diagnostics(&self) -> Vec<RuleDiagnostic> {
        let mut out = Vec::new();
        for set in &self.entries {
            for axis in Axis::ALL {
                let rule = set.rule(axis);
                if let Some(e) = rule.error() {
                    out.push(RuleDiagnostic {
                        land_type: set.land_type.clone(),
                        axis,
                        rule: rule.source().to_string(),
                        error: e.clone(),
                    });
                }
            }
        }
        out
    }
}
