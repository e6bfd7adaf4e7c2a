//! Streaming evidence compositor
//!
//! Fuses N criterion rasters into evidence surfaces one row strip at a
//! time. Memory stays bounded by strip size times band count; no full
//! raster is ever resident. Per strip:
//!
//! 1. read the strip of every criterion raster (and zone raster where
//!    the criterion is zoned),
//! 2. normalize each criterion through its (zone-selected) transform,
//! 3. evaluate the combination expression steps in order,
//! 4. append the strip of every normalized and combined surface to its
//!    output file.
//!
//! Missing inputs and grid disagreements surface before the strip loop
//! begins, never mid-stream.

use crate::evidence::CombinationExpression;
use crate::transform::{Configuration, CriterionTransforms, TransformFunction};
use ndarray::Array2;
use riparia_core::io::{BandReader, BandSink, GeoTiffWriter, DEFAULT_STRIP_ROWS};
use riparia_core::raster::{strip_windows, GridSpec};
use riparia_core::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Nodata sentinel for evidence output files
pub const EVIDENCE_NODATA: f64 = -9999.0;

/// Criterion rasters keyed by criterion name, plus zone rasters for the
/// zoned criteria.
#[derive(Debug, Clone, Default)]
pub struct ComposeInputs {
    pub rasters: BTreeMap<String, PathBuf>,
    pub zones: BTreeMap<String, PathBuf>,
}

impl ComposeInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raster(mut self, criterion: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.rasters.insert(criterion.into(), path.into());
        self
    }

    pub fn zone_raster(mut self, criterion: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.zones.insert(criterion.into(), path.into());
        self
    }
}

/// Output paths for every surface the compositor writes
#[derive(Debug, Clone)]
pub struct ComposeOutputs {
    /// Normalized raster per criterion name
    pub normalized: BTreeMap<String, PathBuf>,
    /// Combined raster per expression step name
    pub combined: BTreeMap<String, PathBuf>,
}

impl ComposeOutputs {
    /// Conventional layout inside one directory: `normalized_<slug>.tif`
    /// per criterion and `<slug>.tif` per combination step.
    pub fn in_directory(
        dir: &Path,
        configuration: &Configuration,
        expression: &CombinationExpression,
    ) -> Self {
        let normalized = configuration
            .criterion_names()
            .map(|name| {
                (
                    name.to_string(),
                    dir.join(format!("normalized_{}.tif", slug(name))),
                )
            })
            .collect();
        let combined = expression
            .steps
            .iter()
            .map(|step| {
                (
                    step.name.clone(),
                    dir.join(format!("{}.tif", slug(&step.name))),
                )
            })
            .collect();
        Self {
            normalized,
            combined,
        }
    }

    /// Path of the total evidence surface
    pub fn total_path(&self, expression: &CombinationExpression) -> Option<&Path> {
        expression
            .total_name()
            .and_then(|name| self.combined.get(name))
            .map(PathBuf::as_path)
    }
}

/// File-name slug for a criterion or step name
fn slug(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Transform dispatch for one open criterion band
enum BandTransforms<'a> {
    Global(&'a TransformFunction),
    Zoned {
        all: &'a CriterionTransforms,
        transforms: &'a [TransformFunction],
        zone_reader: BandReader,
    },
}

struct CriterionBand<'a> {
    name: &'a str,
    reader: BandReader,
    transforms: BandTransforms<'a>,
}

impl CriterionBand<'_> {
    /// Read and normalize the next strip
    fn normalize_window(&mut self, window: riparia_core::Window) -> Result<Array2<f64>> {
        let raw = self.reader.read_window(window)?;
        match &mut self.transforms {
            BandTransforms::Global(function) => Ok(function.evaluate_array(&raw)),
            BandTransforms::Zoned {
                all,
                transforms,
                zone_reader,
            } => {
                let zone_ids = zone_reader.read_window(window)?;
                let evaluated: Vec<Array2<f64>> =
                    transforms.iter().map(|t| t.evaluate_array(&raw)).collect();
                Ok(Array2::from_shape_fn(raw.dim(), |idx| {
                    let zone = all.clip_zone(zone_ids[idx]);
                    evaluated[zone][idx]
                }))
            }
        }
    }
}

/// Stream the configured criteria into normalized and combined evidence
/// rasters.
///
/// `observer` receives `(strips done, strip count)` after each strip;
/// pass a closure driving a progress bar, or `|_, _| {}`.
pub fn compose<F>(
    configuration: &Configuration,
    expression: &CombinationExpression,
    inputs: &ComposeInputs,
    outputs: &ComposeOutputs,
    mut observer: F,
) -> Result<()>
where
    F: FnMut(usize, usize),
{
    expression.validate(configuration.criterion_names())?;

    // Open every reader and check alignment before any output exists
    let mut bands: Vec<CriterionBand<'_>> = Vec::with_capacity(configuration.criteria.len());
    let mut reference: Option<GridSpec> = None;

    for criterion in &configuration.criteria {
        let path = inputs
            .rasters
            .get(&criterion.name)
            .ok_or_else(|| Error::MissingInput {
                criterion: criterion.name.clone(),
            })?;
        let reader = BandReader::open(path)?;
        check_grid(&mut reference, &criterion.name, reader.grid())?;

        let transforms = match &criterion.transforms {
            CriterionTransforms::Global(function) => BandTransforms::Global(function),
            zoned @ CriterionTransforms::Zoned { transforms, .. } => {
                let zone_path =
                    inputs
                        .zones
                        .get(&criterion.name)
                        .ok_or_else(|| Error::MissingInput {
                            criterion: format!("{} zones", criterion.name),
                        })?;
                let zone_reader = BandReader::open(zone_path)?;
                check_grid(
                    &mut reference,
                    &format!("{} zones", criterion.name),
                    zone_reader.grid(),
                )?;
                BandTransforms::Zoned {
                    all: zoned,
                    transforms,
                    zone_reader,
                }
            }
        };

        bands.push(CriterionBand {
            name: &criterion.name,
            reader,
            transforms,
        });
    }

    let grid = reference.ok_or_else(|| {
        Error::Configuration("scenario has no criteria to compose".to_string())
    })?;

    info!(
        scenario = %configuration.scenario,
        criteria = bands.len(),
        rows = grid.rows,
        cols = grid.cols,
        "composing evidence"
    );

    // Output writers, then one sink per writer; sink order is the
    // normalized bands in configuration order followed by the steps.
    let mut sink_paths: Vec<(&str, &Path)> = Vec::new();
    for band in &bands {
        let path = outputs.normalized.get(band.name).ok_or_else(|| {
            Error::Configuration(format!("no output path for normalized '{}'", band.name))
        })?;
        sink_paths.push((band.name, path));
    }
    for step in &expression.steps {
        let path = outputs.combined.get(&step.name).ok_or_else(|| {
            Error::Configuration(format!("no output path for combined '{}'", step.name))
        })?;
        sink_paths.push((&step.name, path));
    }

    let mut writers: Vec<GeoTiffWriter> = sink_paths
        .iter()
        .map(|(_, path)| {
            GeoTiffWriter::create(path, grid, Some(EVIDENCE_NODATA), DEFAULT_STRIP_ROWS)
        })
        .collect::<Result<_>>()?;
    let mut sinks: Vec<BandSink<'_, f32>> = writers
        .iter_mut()
        .map(|writer| writer.band::<f32>())
        .collect::<Result<_>>()?;

    let windows = strip_windows(grid.rows, grid.cols, DEFAULT_STRIP_ROWS);
    let strip_count = windows.len();

    for (strip_index, window) in windows.into_iter().enumerate() {
        let mut normalized: Vec<Array2<f64>> = Vec::with_capacity(bands.len());
        for band in &mut bands {
            normalized.push(band.normalize_window(window)?);
        }

        let mut combined: Vec<(&str, Array2<f64>)> = Vec::with_capacity(expression.steps.len());
        for step in &expression.steps {
            let tile = {
                let resolve = |name: &str| -> Result<&Array2<f64>> {
                    if let Some(pos) = bands.iter().position(|b| b.name == name) {
                        return Ok(&normalized[pos]);
                    }
                    combined
                        .iter()
                        .find(|(n, _)| *n == name)
                        .map(|(_, tile)| tile)
                        .ok_or_else(|| {
                            Error::Configuration(format!(
                                "combination step input '{}' not available",
                                name
                            ))
                        })
                };
                let mut acc = resolve(&step.inputs[0])?.clone();
                for input in &step.inputs[1..] {
                    step.op.combine(&mut acc, resolve(input)?);
                }
                acc
            };
            combined.push((&step.name, tile));
        }

        for (sink, tile) in sinks
            .iter_mut()
            .zip(normalized.iter().chain(combined.iter().map(|(_, t)| t)))
        {
            sink.write_rows(tile.view())?;
        }

        debug!(strip = strip_index, of = strip_count, "strip composed");
        observer(strip_index + 1, strip_count);
    }

    for sink in sinks {
        sink.finish()?;
    }

    Ok(())
}

fn check_grid(reference: &mut Option<GridSpec>, name: &str, grid: GridSpec) -> Result<()> {
    match reference {
        None => {
            *reference = Some(grid);
            Ok(())
        }
        Some(expected) if expected.matches(&grid) => Ok(()),
        Some(expected) => Err(Error::GridMismatch {
            criterion: name.to_string(),
            detail: expected.mismatch_detail(&grid),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::{CombinationExpression, CombineOp, CombineStep};
    use crate::transform::{Configuration, Criterion, TransformKind};
    use approx::assert_relative_eq;
    use riparia_core::io::read_geotiff;
    use riparia_core::raster::{GeoTransform, Raster, RasterElement};

    fn ramp() -> TransformFunction {
        TransformFunction::new(TransformKind::Linear, &[(0.0, 0.0), (10.0, 1.0)]).unwrap()
    }

    fn halved_ramp() -> TransformFunction {
        TransformFunction::new(TransformKind::Linear, &[(0.0, 0.0), (10.0, 0.5)]).unwrap()
    }

    fn grid_transform() -> GeoTransform {
        GeoTransform::new(0.0, 4.0, 1.0, -1.0)
    }

    fn write_criterion(dir: &Path, name: &str, values: &[f64]) -> PathBuf {
        let mut raster = Raster::from_vec(values.to_vec(), 4, 4).unwrap();
        raster.set_transform(grid_transform());
        raster.set_nodata(Some(EVIDENCE_NODATA));
        let path = dir.join(format!("{}.tif", slug(name)));
        riparia_core::io::write_geotiff(&raster, &path).unwrap();
        path
    }

    fn write_zone_raster(dir: &Path, name: &str, zones: &[i32]) -> PathBuf {
        let mut raster = Raster::from_vec(zones.to_vec(), 4, 4).unwrap();
        raster.set_transform(grid_transform());
        raster.set_nodata(Some(i32::default_nodata()));
        let path = dir.join(format!("{}_zones.tif", slug(name)));
        riparia_core::io::write_geotiff(&raster, &path).unwrap();
        path
    }

    /// Two criteria, both zoned with the boundary splitting the grid at
    /// column 2; zone 0 uses the full ramp, zone 1 the halved ramp.
    fn two_zone_setup(dir: &Path) -> (Configuration, CombinationExpression, ComposeInputs) {
        let zoned = || CriterionTransforms::Zoned {
            boundaries: vec![25.0, f64::INFINITY],
            transforms: vec![ramp(), halved_ramp()],
        };
        let configuration = Configuration {
            scenario: "test".to_string(),
            criteria: vec![
                Criterion::new("Slope", zoned()),
                Criterion::new("HAND", zoned()),
            ],
        };
        let expression = CombinationExpression {
            steps: vec![CombineStep {
                name: "total_evidence".to_string(),
                op: CombineOp::Product,
                inputs: vec!["Slope".to_string(), "HAND".to_string()],
            }],
        };

        let mut slope = vec![5.0; 16];
        slope[3] = f64::NAN; // masked input cell (row 0, col 3)
        slope[4] = 10.0; // transform boundary value (row 1, col 0)
        let hand = vec![10.0; 16];
        let zones: Vec<i32> = (0..16).map(|i| if i % 4 < 2 { 0 } else { 1 }).collect();

        let inputs = ComposeInputs::new()
            .raster("Slope", write_criterion(dir, "Slope", &slope))
            .raster("HAND", write_criterion(dir, "HAND", &hand))
            .zone_raster("Slope", write_zone_raster(dir, "Slope", &zones))
            .zone_raster("HAND", write_zone_raster(dir, "HAND", &zones));

        (configuration, expression, inputs)
    }

    #[test]
    fn test_zone_selection_and_combination() {
        let dir = tempfile::tempdir().unwrap();
        let (configuration, expression, inputs) = two_zone_setup(dir.path());
        let outputs = ComposeOutputs::in_directory(dir.path(), &configuration, &expression);

        let mut ticks = Vec::new();
        compose(&configuration, &expression, &inputs, &outputs, |i, n| {
            ticks.push((i, n))
        })
        .unwrap();
        assert_eq!(ticks, vec![(1, 1)]);

        let total: Raster<f64> =
            read_geotiff(outputs.total_path(&expression).unwrap()).unwrap();

        // All-valid zone-0 cell: slope 5 -> 0.5, hand 10 -> 1.0
        assert_relative_eq!(total.get(0, 0).unwrap(), 0.5, epsilon = 1e-6);
        // Zone-1 cell uses the halved ramp on both criteria
        assert_relative_eq!(total.get(0, 2).unwrap(), 0.25 * 0.5, epsilon = 1e-6);
        // Masked slope cell masks the product
        assert!(total.is_nodata(total.get(0, 3).unwrap()));
        // Boundary value 10 evaluates exactly at the last control point
        assert_relative_eq!(total.get(1, 0).unwrap(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_normalized_surfaces_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let (configuration, expression, inputs) = two_zone_setup(dir.path());
        let outputs = ComposeOutputs::in_directory(dir.path(), &configuration, &expression);

        compose(&configuration, &expression, &inputs, &outputs, |_, _| {}).unwrap();

        let slope_norm: Raster<f64> = read_geotiff(&outputs.normalized["Slope"]).unwrap();
        assert_relative_eq!(slope_norm.get(0, 0).unwrap(), 0.5, epsilon = 1e-6);
        assert_relative_eq!(slope_norm.get(0, 2).unwrap(), 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_missing_criterion_fails_before_composing() {
        let dir = tempfile::tempdir().unwrap();
        let (configuration, expression, mut inputs) = two_zone_setup(dir.path());
        inputs.rasters.remove("HAND");
        let outputs = ComposeOutputs::in_directory(dir.path(), &configuration, &expression);

        let err = compose(&configuration, &expression, &inputs, &outputs, |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::MissingInput { criterion } if criterion == "HAND"));
    }

    #[test]
    fn test_missing_zone_raster_is_a_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let (configuration, expression, mut inputs) = two_zone_setup(dir.path());
        inputs.zones.remove("Slope");
        let outputs = ComposeOutputs::in_directory(dir.path(), &configuration, &expression);

        assert!(
            compose(&configuration, &expression, &inputs, &outputs, |_, _| {}).is_err()
        );
    }

    #[test]
    fn test_grid_mismatch_detected_up_front() {
        let dir = tempfile::tempdir().unwrap();
        let (configuration, expression, mut inputs) = two_zone_setup(dir.path());

        let mut odd = Raster::<f64>::filled(3, 3, 1.0);
        odd.set_transform(grid_transform());
        let odd_path = dir.path().join("odd.tif");
        riparia_core::io::write_geotiff(&odd, &odd_path).unwrap();
        inputs.rasters.insert("HAND".to_string(), odd_path);

        let outputs = ComposeOutputs::in_directory(dir.path(), &configuration, &expression);
        let err = compose(&configuration, &expression, &inputs, &outputs, |_, _| {})
            .unwrap_err();
        assert!(matches!(err, Error::GridMismatch { criterion, .. } if criterion == "HAND"));
    }

    #[test]
    fn test_out_of_range_zone_id_clips() {
        let dir = tempfile::tempdir().unwrap();
        let (configuration, expression, mut inputs) = two_zone_setup(dir.path());

        // Zone ids beyond the valid range and the uncovered sentinel
        let mut zones = vec![0i32; 16];
        zones[0] = 99;
        zones[1] = i32::default_nodata();
        inputs.zones.insert(
            "Slope".to_string(),
            write_zone_raster(dir.path(), "odd_slope", &zones),
        );

        let outputs = ComposeOutputs::in_directory(dir.path(), &configuration, &expression);
        compose(&configuration, &expression, &inputs, &outputs, |_, _| {}).unwrap();

        let slope_norm: Raster<f64> = read_geotiff(&outputs.normalized["Slope"]).unwrap();
        // 99 clips to the last zone (halved ramp)
        assert_relative_eq!(slope_norm.get(0, 0).unwrap(), 0.25, epsilon = 1e-6);
        // Sentinel reads back masked and clips to zone 0
        assert_relative_eq!(slope_norm.get(0, 1).unwrap(), 0.5, epsilon = 1e-6);
    }
}
