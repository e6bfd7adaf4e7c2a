//! Declarative evidence combination
//!
//! How normalized criteria fuse into evidence surfaces is data, not
//! code: an ordered list of named steps, each a `product` or `max` over
//! criterion names or earlier step names. The last step is the total
//! evidence surface. The default expression reproduces the standard
//! valley-bottom scheme:
//!
//! ```text
//! topo_evidence    = product(Slope, HAND)
//! channel_evidence = max(Channel, Flow Areas)
//! total_evidence   = max(topo_evidence, channel_evidence)
//! ```

use ndarray::Array2;
use riparia_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Combination operator for one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CombineOp {
    /// All operands must indicate suitability
    Product,
    /// Any operand is sufficient
    Max,
}

/// One named combination step over criteria or earlier steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineStep {
    pub name: String,
    pub op: CombineOp,
    pub inputs: Vec<String>,
}

/// An ordered combination expression; the last step is the total
/// evidence surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinationExpression {
    pub steps: Vec<CombineStep>,
}

impl Default for CombinationExpression {
    fn default() -> Self {
        let step = |name: &str, op, inputs: &[&str]| CombineStep {
            name: name.to_string(),
            op,
            inputs: inputs.iter().map(|s| s.to_string()).collect(),
        };
        Self {
            steps: vec![
                step("topo_evidence", CombineOp::Product, &["Slope", "HAND"]),
                step(
                    "channel_evidence",
                    CombineOp::Max,
                    &["Channel", "Flow Areas"],
                ),
                step(
                    "total_evidence",
                    CombineOp::Max,
                    &["topo_evidence", "channel_evidence"],
                ),
            ],
        }
    }
}

impl CombinationExpression {
    /// Load an expression from a JSON step array
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("combination expression: {}", e)))
    }

    /// Load an expression from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Name of the total evidence surface (the last step)
    pub fn total_name(&self) -> Option<&str> {
        self.steps.last().map(|s| s.name.as_str())
    }

    /// Check the expression against the available criterion names:
    /// steps must be non-empty, step names unique and distinct from
    /// criterion names, every input must resolve to a criterion or an
    /// earlier step, and every step needs at least two operands.
    pub fn validate<'a, I: IntoIterator<Item = &'a str>>(&self, criteria: I) -> Result<()> {
        if self.steps.is_empty() {
            return Err(Error::Configuration(
                "combination expression has no steps".to_string(),
            ));
        }

        let criteria: HashSet<&str> = criteria.into_iter().collect();
        let mut defined: HashSet<&str> = HashSet::new();

        for step in &self.steps {
            if criteria.contains(step.name.as_str()) || !defined.insert(step.name.as_str()) {
                return Err(Error::Configuration(format!(
                    "combination step '{}' redefines an existing name",
                    step.name
                )));
            }
            if step.inputs.len() < 2 {
                return Err(Error::Configuration(format!(
                    "combination step '{}' needs at least two operands",
                    step.name
                )));
            }
            for input in &step.inputs {
                let known = criteria.contains(input.as_str())
                    || (defined.contains(input.as_str()) && input != &step.name);
                if !known {
                    return Err(Error::Configuration(format!(
                        "combination step '{}' references unknown input '{}'",
                        step.name, input
                    )));
                }
            }
        }

        Ok(())
    }
}

impl CombineOp {
    /// Fold two operand tiles cell by cell. A masked (NaN) cell in
    /// either operand masks the result for both operators; IEEE max
    /// would otherwise ignore NaN.
    pub fn combine(self, acc: &mut Array2<f64>, operand: &Array2<f64>) {
        acc.zip_mut_with(operand, |a, &b| {
            if a.is_nan() || b.is_nan() {
                *a = f64::NAN;
            } else {
                *a = match self {
                    CombineOp::Product => *a * b,
                    CombineOp::Max => a.max(b),
                };
            }
        });
    }
}
