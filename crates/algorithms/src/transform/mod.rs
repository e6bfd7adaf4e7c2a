//! Transform configuration: piecewise functions, criteria and the
//! relational store loader.

mod criterion;
mod function;
mod store;

pub use criterion::{Configuration, Criterion, CriterionTransforms};
pub use function::{TransformFunction, TransformKind};
pub use store::{
    load_configuration, InflectionRow, InputRow, InputZoneRow, ScenarioInputRow, ScenarioRow,
    TransformRow, TransformStore, TransformTypeRow,
};
