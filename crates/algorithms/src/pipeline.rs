//! End-to-end valley-bottom pipeline
//!
//! Wires the stages together for one run: prepare the criterion rasters
//! (network buffering, rasterization, proximity, the HAND chain), load
//! the scenario configuration, classify drainage-area zones, compose the
//! evidence surfaces, then run every configured threshold through
//! threshold, clean, polygonize and sanitize into per-threshold GeoJSON
//! layers.
//!
//! All paths for one run come from an explicit [`OutputLayout`] so
//! concurrent runs never share state through module globals.

use crate::buffer::buffer_by_field;
use crate::clean::{clean, CleanParams};
use crate::evidence::{compose, CombinationExpression, ComposeInputs, ComposeOutputs};
use crate::hydrology::{fill_sinks, flow_direction, hand, FillSinksParams};
use crate::polygonize::polygonize;
use crate::proximity::proximity;
use crate::rasterize::{rasterize, BurnSource, RasterizeParams};
use crate::sanitize::sanitize;
use crate::threshold::threshold_file;
use crate::transform::{load_configuration, Configuration, TransformStore};
use crate::zones::classify_zones;
use riparia_core::io::{read_geotiff, write_geotiff};
use riparia_core::raster::{GridSpec, Raster};
use riparia_core::vector::{read_geojson, write_geojson, FeatureCollection};
use riparia_core::{Error, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Nodata sentinel for float criterion rasters
const CRITERION_NODATA: f64 = -9999.0;

/// Per-run file layout: everything a run writes lives under one root.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for criterion, zone and evidence rasters
    pub fn intermediates(&self) -> PathBuf {
        self.root.join("intermediates")
    }

    pub fn criterion_raster(&self, name: &str) -> PathBuf {
        self.intermediates().join(format!("{}.tif", file_slug(name)))
    }

    pub fn zone_raster(&self, name: &str) -> PathBuf {
        self.intermediates()
            .join(format!("{}_zones.tif", file_slug(name)))
    }

    pub fn threshold_mask(&self, label: &str) -> PathBuf {
        self.intermediates()
            .join(format!("threshold_{}.tif", file_slug(label)))
    }

    /// Final polygon layer for one threshold label
    pub fn threshold_layer(&self, label: &str) -> PathBuf {
        self.root.join(format!("valley_bottom_{}.geojson", file_slug(label)))
    }
}

fn file_slug(name: &str) -> String {
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

/// Source files for one run
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    /// Elevation raster (GeoTIFF)
    pub dem: PathBuf,
    /// Slope raster aligned to the DEM grid (GeoTIFF)
    pub slope: PathBuf,
    /// Channel network lines with width and drainage-area attributes
    /// (GeoJSON)
    pub network: PathBuf,
    /// Flow-area polygons (GeoJSON)
    pub flow_areas: PathBuf,
    /// Transform store document (JSON)
    pub transform_store: PathBuf,
}

/// Tunable run parameters
#[derive(Debug, Clone)]
pub struct PipelineParams {
    /// Scenario machine code in the transform store
    pub scenario: String,
    /// Threshold label -> evidence cutoff
    pub thresholds: BTreeMap<String, f64>,
    /// Cleanup radius in pixels
    pub buffer_pixels: usize,
    /// Bankfull width attribute on network features
    pub bankfull_field: String,
    /// Drainage-area attribute on network features
    pub drainage_area_field: String,
    /// Evidence combination; defaults to the standard scheme
    pub expression: CombinationExpression,
    /// Sanitize buffer in map units; `None` uses one cell size
    pub sanitize_buffer: Option<f64>,
}

impl PipelineParams {
    pub fn new(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            thresholds: default_thresholds(),
            buffer_pixels: 1,
            bankfull_field: "BFwidth".to_string(),
            drainage_area_field: "TotDASqKm".to_string(),
            expression: CombinationExpression::default(),
            sanitize_buffer: None,
        }
    }
}

/// The standard threshold set
pub fn default_thresholds() -> BTreeMap<String, f64> {
    [
        ("50", 0.5),
        ("60", 0.6),
        ("70", 0.7),
        ("80", 0.8),
        ("90", 0.9),
        ("100", 1.0),
    ]
    .into_iter()
    .map(|(label, cutoff)| (label.to_string(), cutoff))
    .collect()
}

/// What a finished run produced
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Total evidence raster
    pub evidence: PathBuf,
    /// Final polygon layer per threshold label
    pub layers: BTreeMap<String, PathBuf>,
}

/// Run the full pipeline. `observer` receives compositor strip progress.
pub fn run_pipeline<F>(
    inputs: &PipelineInputs,
    params: &PipelineParams,
    layout: &OutputLayout,
    observer: F,
) -> Result<PipelineReport>
where
    F: FnMut(usize, usize),
{
    fs::create_dir_all(layout.intermediates())?;

    let store = TransformStore::from_file(&inputs.transform_store)?;
    let configuration = load_configuration(&params.scenario, &store)?;

    let dem: Raster<f64> = read_geotiff(&inputs.dem)?;
    let grid = dem.grid_spec();
    let network = read_geojson(&inputs.network)?;
    let flow_areas = read_geojson(&inputs.flow_areas)?;

    info!(
        scenario = %params.scenario,
        rows = grid.rows,
        cols = grid.cols,
        "pipeline started"
    );

    let buffered_network =
        buffer_by_field(&network, &params.bankfull_field, grid.cell_size() / 2.0)?;
    let compose_inputs = prepare_criteria(
        &dem,
        &grid,
        &inputs.slope,
        &buffered_network,
        &flow_areas,
        &configuration,
        params,
        layout,
    )?;

    let compose_outputs = ComposeOutputs::in_directory(
        &layout.intermediates(),
        &configuration,
        &params.expression,
    );
    compose(
        &configuration,
        &params.expression,
        &compose_inputs,
        &compose_outputs,
        observer,
    )?;
    let evidence = compose_outputs
        .total_path(&params.expression)
        .ok_or_else(|| {
            Error::Configuration("combination expression has no total surface".to_string())
        })?
        .to_path_buf();

    // Threshold runs are independent of one another
    let sanitize_buffer = params.sanitize_buffer.unwrap_or_else(|| grid.cell_size());
    let mut layers = BTreeMap::new();
    for (label, &cutoff) in &params.thresholds {
        let mask_path = layout.threshold_mask(label);
        threshold_file(&evidence, cutoff, &mask_path)?;

        let mask: Raster<u8> = read_geotiff(&mask_path)?;
        let cleaned = clean(
            &mask,
            &CleanParams {
                buffer_pixels: params.buffer_pixels,
            },
        )?;
        let raw_polygons = polygonize(&cleaned)?;
        let layer = sanitize(label, &raw_polygons, sanitize_buffer, &network)?;

        let layer_path = layout.threshold_layer(label);
        write_geojson(&layer, &layer_path)?;
        layers.insert(label.clone(), layer_path);
    }

    info!(layers = layers.len(), "pipeline finished");
    Ok(PipelineReport { evidence, layers })
}

/// Build every criterion raster the configuration asks for, plus zone
/// rasters for the zoned criteria.
#[allow(clippy::too_many_arguments)]
fn prepare_criteria(
    dem: &Raster<f64>,
    grid: &GridSpec,
    slope_path: &Path,
    buffered_network: &FeatureCollection,
    flow_areas: &FeatureCollection,
    configuration: &Configuration,
    params: &PipelineParams,
    layout: &OutputLayout,
) -> Result<ComposeInputs> {
    let burn = RasterizeParams {
        burn: BurnSource::Constant(1.0),
        background: 0.0,
    };

    let mut compose_inputs = ComposeInputs::new();
    for criterion in &configuration.criteria {
        let path = match criterion.name.as_str() {
            "Slope" => slope_path.to_path_buf(),
            "HAND" => {
                let channel_mask = rasterize(buffered_network, grid, &burn)?;
                let filled = fill_sinks(dem, FillSinksParams::default())?;
                let directions = flow_direction(&filled)?;
                let mut raster = hand(&filled, &directions, &channel_mask)?;
                raster.set_nodata(Some(CRITERION_NODATA));
                write_criterion(&raster, layout, &criterion.name)?
            }
            "Channel" => {
                let channel_mask = rasterize(buffered_network, grid, &burn)?;
                let mut raster = proximity(&channel_mask)?;
                raster.set_nodata(Some(CRITERION_NODATA));
                write_criterion(&raster, layout, &criterion.name)?
            }
            "Flow Areas" => {
                let flow_mask = rasterize(flow_areas, grid, &burn)?;
                let mut raster = proximity(&flow_mask)?;
                raster.set_nodata(Some(CRITERION_NODATA));
                write_criterion(&raster, layout, &criterion.name)?
            }
            other => {
                return Err(Error::MissingInput {
                    criterion: other.to_string(),
                })
            }
        };
        compose_inputs.rasters.insert(criterion.name.clone(), path);

        if let crate::transform::CriterionTransforms::Zoned { boundaries, .. } =
            &criterion.transforms
        {
            let zones = classify_zones(
                buffered_network,
                &params.drainage_area_field,
                boundaries,
                grid,
            )?;
            let zone_path = layout.zone_raster(&criterion.name);
            write_geotiff(&zones, &zone_path)?;
            compose_inputs.zones.insert(criterion.name.clone(), zone_path);
        }
    }

    Ok(compose_inputs)
}

fn write_criterion(
    raster: &Raster<f64>,
    layout: &OutputLayout,
    name: &str,
) -> Result<PathBuf> {
    let path = layout.criterion_raster(name);
    write_geotiff(raster, &path)?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_thresholds_cover_the_standard_labels() {
        let thresholds = default_thresholds();
        assert_eq!(thresholds.len(), 6);
        assert_eq!(thresholds["50"], 0.5);
        assert_eq!(thresholds["100"], 1.0);
    }

    #[test]
    fn test_layout_paths_are_rooted_and_slugged() {
        let layout = OutputLayout::new("/tmp/run");
        assert_eq!(
            layout.criterion_raster("Flow Areas"),
            PathBuf::from("/tmp/run/intermediates/flow_areas.tif")
        );
        assert_eq!(
            layout.threshold_layer("50"),
            PathBuf::from("/tmp/run/valley_bottom_50.geojson")
        );
        assert_eq!(
            layout.zone_raster("Slope"),
            PathBuf::from("/tmp/run/intermediates/slope_zones.tif")
        );
    }
}
