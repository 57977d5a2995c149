//! Boolean rule expressions over index deltas.
//!
//! Rules are parsed into a typed AST and interpreted directly; there is no
//! path from rule text to anything but comparisons and `AND`/`OR`.
//! Rejected or malformed rules evaluate to `false`.

pub mod lexer;
pub mod parser;

use serde::{Deserialize, Serialize};

use crate::types::IndexDelta;

pub use lexer::{CompareOp, Variable};
pub use parser::{Operand, RuleExpr, MAX_DEPTH, MAX_RULE_LEN};

/// Why a rule string was rejected.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("empty rule")]
    Empty,

    #[error("rule is {len} characters, limit is {max}")]
    TooLong { len: usize, max: usize },

    #[error("parentheses nested deeper than {0}")]
    TooDeep(usize),

    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedCharacter { ch: char, pos: usize },

    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("unexpected token {0}")]
    UnexpectedToken(String),

    #[error("unexpected end of rule, expected {0}")]
    UnexpectedEnd(&'static str),
}

/// Variable values a rule is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bindings {
    pub dvi: f64,
    pub dbi: f64,
    pub dwi: f64,
}

impl Bindings {
    pub fn get(&self, var: Variable) -> f64 {
        match var {
            Variable::Dvi => self.dvi,
            Variable::Dbi => self.dbi,
            Variable::Dwi => self.dwi,
        }
    }
}

impl From<&IndexDelta> for Bindings {
    fn from(delta: &IndexDelta) -> Self {
        Self {
            dvi: delta.ndvi,
            dbi: delta.ndbi,
            dwi: delta.ndwi,
        }
    }
}

/// A parsed rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    source: String,
    expr: RuleExpr,
}

impl Rule {
    pub fn parse(source: &str) -> Result<Self, RuleError> {
        Ok(Self {
            source: source.to_string(),
            expr: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn expr(&self) -> &RuleExpr {
        &self.expr
    }

    pub fn evaluate(&self, bindings: &Bindings) -> bool {
        self.expr.eval(bindings)
    }
}

/// Parse and evaluate a rule in one step, failing closed.
pub fn evaluate(rule: &str, bindings: &Bindings) -> bool {
    match Rule::parse(rule) {
        Ok(rule) => rule.evaluate(bindings),
        Err(e) => {
            tracing::warn!(rule, error = %e, "Rejected rule expression; treating as false");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind(dvi: f64, dbi: f64, dwi: f64) -> Bindings {
        Bindings { dvi, dbi, dwi }
    }

    #[test]
    fn test_and_rule() {
        assert!(evaluate("dvi > 0.3 AND dbi < -0.1", &bind(0.35, -0.2, 0.0)));
        assert!(!evaluate("dvi > 0.3 AND dbi < -0.1", &bind(0.35, 0.0, 0.0)));
    }

    #[test]
    fn test_or_rule() {
        assert!(evaluate("dvi > 0.3 OR dwi > 0.5", &bind(0.1, 0.0, 0.6)));
        assert!(!evaluate("dvi > 0.3 OR dwi > 0.5", &bind(0.1, 0.0, 0.4)));
    }

    #[test]
    fn test_grouping_changes_result() {
        let b = bind(0.0, 0.0, 1.0);
        assert!(evaluate("dvi > 1 AND dbi > 1 OR dwi > 0.5", &b));
        assert!(!evaluate("dvi > 1 AND (dbi > 1 OR dwi > 0.5)", &b));
    }

    #[test]
    fn test_all_operators() {
        let b = bind(0.5, 0.5, 0.5);
        assert!(evaluate("dvi == 0.5", &b));
        assert!(evaluate("dvi >= 0.5", &b));
        assert!(evaluate("dvi <= 0.5", &b));
        assert!(!evaluate("dvi < 0.5", &b));
        assert!(!evaluate("dvi > 0.5", &b));
        assert!(evaluate("dvi == dbi", &b));
    }

    #[test]
    fn test_disallowed_tokens_fail_closed() {
        let b = bind(1.0, 1.0, 1.0);
        for bad in [
            "__import__('os').system('rm -rf /')",
            "dvi > 0 or open('x')",
            "dvi > 0; dbi > 0",
            "lambda: 1",
            "dvi > 0 and True",
            "[dvi > 0]",
            "dvi.real > 0",
        ] {
            assert!(!evaluate(bad, &b), "expected false for {bad}");
        }
    }

    #[test]
    fn test_malformed_fail_closed() {
        let b = bind(1.0, 1.0, 1.0);
        assert!(!evaluate("", &b));
        assert!(!evaluate("dvi >", &b));
        assert!(!evaluate("(dvi > 0", &b));
    }

    #[test]
    fn test_nan_never_matches() {
        let b = bind(f64::NAN, 0.0, 0.0);
        assert!(!evaluate("dvi > 0", &b));
        assert!(!evaluate("dvi <= 0", &b));
        assert!(!evaluate("dvi == dvi", &b));
    }

    #[test]
    fn test_bindings_from_delta() {
        let delta = IndexDelta {
            ndvi: 0.1,
            ndbi: 0.2,
            ndwi: 0.3,
        };
        let b = Bindings::from(&delta);
        assert_eq!(b.get(Variable::Dvi), 0.1);
        assert_eq!(b.get(Variable::Dbi), 0.2);
        assert_eq!(b.get(Variable::Dwi), 0.3);
    }

    #[test]
    fn test_rule_keeps_source() {
        let rule = Rule::parse("dwi > 0.2").unwrap();
        assert_eq!(rule.source(), "dwi > 0.2");
        assert!(rule.evaluate(&bind(0.0, 0.0, 0.25)));
    }
}
