//! Criteria: named inputs with their per-zone transforms

use super::function::TransformFunction;

/// The transforms attached to one criterion.
///
/// A single-zone criterion carries one global transform and needs no
/// zone raster; a multi-zone criterion carries ordered zone upper
/// bounds with one transform per zone. The compositor dispatches on
/// this tag instead of inspecting list lengths.
#[derive(Debug, Clone)]
pub enum CriterionTransforms {
    /// One transform applied everywhere
    Global(TransformFunction),
    /// One transform per drainage-area zone
    Zoned {
        /// Upper bound of each zone's drainage-area interval, strictly
        /// increasing; the last entry may be infinite
        boundaries: Vec<f64>,
        /// One transform per zone, same order as `boundaries`
        transforms: Vec<TransformFunction>,
    },
}

impl CriterionTransforms {
    /// Number of zones (1 for a global transform)
    pub fn zone_count(&self) -> usize {
        match self {
            CriterionTransforms::Global(_) => 1,
            CriterionTransforms::Zoned { transforms, .. } => transforms.len(),
        }
    }

    /// Zone id for a drainage-area magnitude: the smallest zone whose
    /// upper bound is >= the value; values above every bound land in
    /// the last zone.
    pub fn zone_for(&self, drainage_area: f64) -> usize {
        match self {
            CriterionTransforms::Global(_) => 0,
            CriterionTransforms::Zoned { boundaries, .. } => boundaries
                .iter()
                .position(|&upper| drainage_area <= upper)
                .unwrap_or(boundaries.len() - 1),
        }
    }

    /// Clip a raw zone id (e.g. read back from a zone raster) into the
    /// valid zone range. Out-of-range ids take the nearest valid zone;
    /// negative or non-finite ids take zone 0.
    pub fn clip_zone(&self, raw: f64) -> usize {
        let max = self.zone_count() - 1;
        if !raw.is_finite() || raw < 0.0 {
            return 0;
        }
        (raw as usize).min(max)
    }
}

/// A named evidence criterion with its transforms
#[derive(Debug, Clone)]
pub struct Criterion {
    pub name: String,
    pub transforms: CriterionTransforms,
}

impl Criterion {
    pub fn new(name: impl Into<String>, transforms: CriterionTransforms) -> Self {
        Self {
            name: name.into(),
            transforms,
        }
    }

    /// Whether this criterion needs a zone raster
    pub fn is_zoned(&self) -> bool {
        matches!(self.transforms, CriterionTransforms::Zoned { .. })
    }
}

/// A loaded scenario: the criteria in configuration order
#[derive(Debug, Clone)]
pub struct Configuration {
    pub scenario: String,
    pub criteria: Vec<Criterion>,
}

impl Configuration {
    /// Look up a criterion by name
    pub fn criterion(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.name == name)
    }

    /// Names of all criteria, in configuration order
    pub fn criterion_names(&self) -> impl Iterator<Item = &str> {
        self.criteria.iter().map(|c| c.name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{TransformFunction, TransformKind};

    fn ramp() -> TransformFunction {
        TransformFunction::new(TransformKind::Linear, &[(0.0, 0.0), (10.0, 1.0)]).unwrap()
    }

    fn two_zones() -> CriterionTransforms {
        CriterionTransforms::Zoned {
            boundaries: vec![25.0, f64::INFINITY],
            transforms: vec![ramp(), ramp()],
        }
    }

    #[test]
    fn test_zone_lookup_uses_smallest_matching_bound() {
        let z = two_zones();
        assert_eq!(z.zone_for(10.0), 0);
        assert_eq!(z.zone_for(25.0), 0);
        assert_eq!(z.zone_for(25.1), 1);
        assert_eq!(z.zone_for(1e9), 1);
    }

    #[test]
    fn test_clip_zone_handles_out_of_range_ids() {
        let z = two_zones();
        assert_eq!(z.clip_zone(0.0), 0);
        assert_eq!(z.clip_zone(1.0), 1);
        assert_eq!(z.clip_zone(7.0), 1);
        assert_eq!(z.clip_zone(-3.0), 0);
        assert_eq!(z.clip_zone(f64::NAN), 0);
    }

    #[test]
    fn test_global_criterion_has_one_zone() {
        let c = Criterion::new("Slope", CriterionTransforms::Global(ramp()));
        assert!(!c.is_zoned());
        assert_eq!(c.transforms.zone_count(), 1);
        assert_eq!(c.transforms.zone_for(1e6), 0);
    }
}
