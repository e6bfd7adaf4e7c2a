//! Configuration store loader
//!
//! The relational transform configuration travels as a JSON document of
//! typed tables mirroring the store schema: scenarios, inputs, the
//! scenario_inputs join table, per-input drainage-area zones, transforms
//! with their type, and ordered inflection (control) points. The loader
//! performs the joins in memory for one scenario and produces the typed
//! [`Configuration`] the compositor consumes.
//!
//! All referential breaks are configuration errors naming the offending
//! key; nothing is guessed or defaulted.

use super::criterion::{Configuration, Criterion, CriterionTransforms};
use super::function::{TransformFunction, TransformKind};
use riparia_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioRow {
    pub scenario_id: i64,
    /// Stable selector used by callers (e.g. "EVIDENCE_02")
    pub machine_code: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRow {
    pub input_id: i64,
    /// Criterion name ("Slope", "HAND", "Channel", "Flow Areas")
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioInputRow {
    pub scenario_input_id: i64,
    pub scenario_id: i64,
    pub input_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputZoneRow {
    pub scenario_input_id: i64,
    pub transform_id: i64,
    #[serde(default)]
    pub min_da: Option<f64>,
    /// Upper drainage-area bound; `None` means unbounded (last zone)
    #[serde(default)]
    pub max_da: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRow {
    pub transform_id: i64,
    pub type_id: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformTypeRow {
    pub type_id: i64,
    /// Interpolation kind name ("linear", "cubic", "nearest", "polynomial")
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InflectionRow {
    pub transform_id: i64,
    pub input_value: f64,
    pub output_value: f64,
}

/// The full relational configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransformStore {
    pub scenarios: Vec<ScenarioRow>,
    pub inputs: Vec<InputRow>,
    pub scenario_inputs: Vec<ScenarioInputRow>,
    pub input_zones: Vec<InputZoneRow>,
    pub transforms: Vec<TransformRow>,
    pub transform_types: Vec<TransformTypeRow>,
    pub inflections: Vec<InflectionRow>,
}

impl TransformStore {
    /// Read a store document from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Parse a store document from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Error::Configuration(format!("transform store parse error: {}", e)))
    }
}

/// Load the configuration for one scenario.
///
/// Joins the store tables for the scenario named by `machine_code` and
/// builds one [`Criterion`] per active input. A criterion with a single
/// zone gets a global transform; with several, ordered zone boundaries
/// checked to be strictly increasing plus one transform per zone.
pub fn load_configuration(machine_code: &str, store: &TransformStore) -> Result<Configuration> {
    let scenario = store
        .scenarios
        .iter()
        .find(|s| s.machine_code == machine_code)
        .ok_or_else(|| {
            Error::Configuration(format!("no scenario with machine code '{}'", machine_code))
        })?;

    let mut criteria = Vec::new();
    for si in store
        .scenario_inputs
        .iter()
        .filter(|si| si.scenario_id == scenario.scenario_id)
    {
        let input = store
            .inputs
            .iter()
            .find(|i| i.input_id == si.input_id)
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "scenario input {} references unknown input id {}",
                    si.scenario_input_id, si.input_id
                ))
            })?;

        let mut zones: Vec<&InputZoneRow> = store
            .input_zones
            .iter()
            .filter(|z| z.scenario_input_id == si.scenario_input_id)
            .collect();
        if zones.is_empty() {
            return Err(Error::Configuration(format!(
                "criterion '{}' has no zones defined for scenario '{}'",
                input.name, machine_code
            )));
        }
        zones.sort_by(|a, b| {
            let ka = a.max_da.unwrap_or(f64::INFINITY);
            let kb = b.max_da.unwrap_or(f64::INFINITY);
            ka.partial_cmp(&kb).unwrap_or(std::cmp::Ordering::Equal)
        });

        let transforms = zones
            .iter()
            .map(|z| build_transform(store, z.transform_id, &input.name))
            .collect::<Result<Vec<_>>>()?;

        let mut transforms = transforms;
        let transforms = if zones.len() == 1 {
            let single = transforms.pop().ok_or_else(|| {
                Error::Configuration(format!("criterion '{}' has no transform", input.name))
            })?;
            CriterionTransforms::Global(single)
        } else {
            let boundaries: Vec<f64> =
                zones.iter().map(|z| z.max_da.unwrap_or(f64::INFINITY)).collect();
            for pair in boundaries.windows(2) {
                if pair[1] <= pair[0] {
                    return Err(Error::Configuration(format!(
                        "zone boundaries for criterion '{}' must be strictly increasing \
                         ({} then {})",
                        input.name, pair[0], pair[1]
                    )));
                }
            }
            CriterionTransforms::Zoned {
                boundaries,
                transforms,
            }
        };

        criteria.push(Criterion::new(input.name.clone(), transforms));
    }

    if criteria.is_empty() {
        return Err(Error::Configuration(format!(
            "scenario '{}' has no inputs",
            machine_code
        )));
    }

    Ok(Configuration {
        scenario: machine_code.to_string(),
        criteria,
    })
}

fn build_transform(
    store: &TransformStore,
    transform_id: i64,
    criterion: &str,
) -> Result<TransformFunction> {
    let transform = store
        .transforms
        .iter()
        .find(|t| t.transform_id == transform_id)
        .ok_or_else(|| {
            Error::Configuration(format!(
                "criterion '{}' references unknown transform id {}",
                criterion, transform_id
            ))
        })?;

    let type_name = store
        .transform_types
        .iter()
        .find(|tt| tt.type_id == transform.type_id)
        .map(|tt| tt.name.as_str())
        .ok_or_else(|| {
            Error::Configuration(format!(
                "transform {} references unknown type id {}",
                transform_id, transform.type_id
            ))
        })?;

    let kind = TransformKind::from_name(type_name).ok_or_else(|| {
        Error::Configuration(format!(
            "transform {} has unknown interpolation kind '{}'",
            transform_id, type_name
        ))
    })?;

    let mut points: Vec<(f64, f64)> = store
        .inflections
        .iter()
        .filter(|r| r.transform_id == transform_id)
        .map(|r| (r.input_value, r.output_value))
        .collect();
    if points.is_empty() {
        return Err(Error::Configuration(format!(
            "transform {} for criterion '{}' has no control points",
            transform_id, criterion
        )));
    }
    points.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

    TransformFunction::with_fill(kind, &points, 0.0).map_err(|e| match e {
        Error::Configuration(msg) => Error::Configuration(format!(
            "transform {} for criterion '{}': {}",
            transform_id, criterion, msg
        )),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two criteria: zoned Slope (2 zones) and global HAND
    fn fixture() -> TransformStore {
        TransformStore {
            scenarios: vec![ScenarioRow {
                scenario_id: 1,
                machine_code: "EVIDENCE".to_string(),
                name: None,
            }],
            inputs: vec![
                InputRow { input_id: 1, name: "Slope".to_string() },
                InputRow { input_id: 2, name: "HAND".to_string() },
            ],
            scenario_inputs: vec![
                ScenarioInputRow { scenario_input_id: 10, scenario_id: 1, input_id: 1 },
                ScenarioInputRow { scenario_input_id: 11, scenario_id: 1, input_id: 2 },
            ],
            input_zones: vec![
                InputZoneRow {
                    scenario_input_id: 10,
                    transform_id: 100,
                    min_da: Some(0.0),
                    max_da: Some(25.0),
                },
                InputZoneRow {
                    scenario_input_id: 10,
                    transform_id: 101,
                    min_da: Some(25.0),
                    max_da: None,
                },
                InputZoneRow {
                    scenario_input_id: 11,
                    transform_id: 102,
                    min_da: None,
                    max_da: None,
                },
            ],
            transforms: vec![
                TransformRow { transform_id: 100, type_id: 1 },
                TransformRow { transform_id: 101, type_id: 1 },
                TransformRow { transform_id: 102, type_id: 1 },
            ],
            transform_types: vec![
                TransformTypeRow { type_id: 1, name: "linear".to_string() },
                TransformTypeRow { type_id: 2, name: "polynomial".to_string() },
            ],
            inflections: vec![
                InflectionRow { transform_id: 100, input_value: 0.0, output_value: 1.0 },
                InflectionRow { transform_id: 100, input_value: 12.0, output_value: 0.0 },
                InflectionRow { transform_id: 101, input_value: 0.0, output_value: 1.0 },
                InflectionRow { transform_id: 101, input_value: 22.0, output_value: 0.0 },
                InflectionRow { transform_id: 102, input_value: 0.0, output_value: 1.0 },
                InflectionRow { transform_id: 102, input_value: 50.0, output_value: 0.0 },
            ],
        }
    }

    #[test]
    fn test_load_configuration_joins_tables() {
        let config = load_configuration("EVIDENCE", &fixture()).unwrap();
        assert_eq!(config.criteria.len(), 2);

        let slope = config.criterion("Slope").unwrap();
        assert!(slope.is_zoned());
        match &slope.transforms {
            CriterionTransforms::Zoned { boundaries, transforms } => {
                assert_eq!(boundaries, &[25.0, f64::INFINITY]);
                assert_eq!(transforms.len(), 2);
                assert_eq!(transforms[0].evaluate(0.0), 1.0);
            }
            _ => panic!("Slope should be zoned"),
        }

        let hand = config.criterion("HAND").unwrap();
        assert!(!hand.is_zoned());
    }

    #[test]
    fn test_unknown_scenario_is_configuration_error() {
        let err = load_configuration("NOPE", &fixture()).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)), "got {:?}", err);
        assert!(err.to_string().contains("NOPE"));
    }

    #[test]
    fn test_zero_zone_input_is_rejected() {
        let mut store = fixture();
        store.input_zones.retain(|z| z.scenario_input_id != 11);
        let err = load_configuration("EVIDENCE", &store).unwrap_err();
        assert!(err.to_string().contains("HAND"), "got: {}", err);
    }

    #[test]
    fn test_transform_without_control_points_is_rejected() {
        let mut store = fixture();
        store.inflections.retain(|r| r.transform_id != 102);
        let err = load_configuration("EVIDENCE", &store).unwrap_err();
        assert!(err.to_string().contains("no control points"), "got: {}", err);
    }

    #[test]
    fn test_polynomial_kind_is_rejected_at_load() {
        let mut store = fixture();
        store.transforms[2].type_id = 2; // HAND transform becomes polynomial
        let err = load_configuration("EVIDENCE", &store).unwrap_err();
        assert!(err.to_string().contains("Polynomial"), "got: {}", err);
    }

    #[test]
    fn test_non_increasing_boundaries_are_rejected() {
        let mut store = fixture();
        // Both slope zones claim the same upper bound
        store.input_zones[1].max_da = Some(25.0);
        let err = load_configuration("EVIDENCE", &store).unwrap_err();
        assert!(
            err.to_string().contains("strictly increasing"),
            "got: {}",
            err
        );
    }

    #[test]
    fn test_store_json_roundtrip() {
        let store = fixture();
        let text = serde_json::to_string(&store).unwrap();
        let back = TransformStore::from_json(&text).unwrap();
        assert_eq!(back.scenarios[0].machine_code, "EVIDENCE");
        assert_eq!(back.inflections.len(), 6);
    }
}
