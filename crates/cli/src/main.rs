//! Riparia CLI - valley-bottom evidence pipeline
//!
//! Command-line interface exposing the pipeline end to end as well as
//! its individual stages for inspection and scripting.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use riparia_algorithms::buffer::buffer_by_field;
use riparia_algorithms::clean::{clean, CleanParams};
use riparia_algorithms::evidence::{
    compose, CombinationExpression, ComposeInputs, ComposeOutputs,
};
use riparia_algorithms::hydrology::{
    drainage_mask_from_accumulation, fill_sinks, flow_accumulation, flow_direction, hand,
    FillSinksParams,
};
use riparia_algorithms::pipeline::{
    default_thresholds, run_pipeline, OutputLayout, PipelineInputs, PipelineParams,
};
use riparia_algorithms::polygonize::polygonize;
use riparia_algorithms::proximity::proximity;
use riparia_algorithms::rasterize::{rasterize, BurnSource, RasterizeParams};
use riparia_algorithms::sanitize::sanitize;
use riparia_algorithms::threshold::threshold_file;
use riparia_algorithms::transform::{load_configuration, TransformStore};
use riparia_core::io::{read_geotiff, write_geotiff};
use riparia_core::vector::{read_geojson, write_geojson};
use riparia_core::{Raster, RasterElement};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "riparia")]
#[command(author, version, about = "Valley-bottom evidence pipeline", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Run the full pipeline: criteria, evidence, thresholds, polygons
    Pipeline {
        /// Input DEM (GeoTIFF)
        #[arg(long)]
        dem: PathBuf,
        /// Slope raster aligned to the DEM (GeoTIFF)
        #[arg(long)]
        slope: PathBuf,
        /// Channel network lines (GeoJSON)
        #[arg(long)]
        network: PathBuf,
        /// Flow-area polygons (GeoJSON)
        #[arg(long)]
        flow_areas: PathBuf,
        /// Transform store document (JSON)
        #[arg(long)]
        store: PathBuf,
        /// Scenario machine code
        #[arg(long, default_value = "EVIDENCE_02")]
        scenario: String,
        /// Output directory
        #[arg(short, long)]
        output: PathBuf,
        /// Thresholds as "label=cutoff,label=cutoff"; default 50..100
        #[arg(long)]
        thresholds: Option<String>,
        /// Cleanup radius in pixels
        #[arg(long, default_value = "1")]
        buffer_pixels: usize,
        /// Bankfull width attribute on network features
        #[arg(long, default_value = "BFwidth")]
        bankfull_field: String,
        /// Drainage-area attribute on network features
        #[arg(long, default_value = "TotDASqKm")]
        drainage_area_field: String,
        /// Combination expression (JSON); omit for the standard scheme
        #[arg(long)]
        expression: Option<PathBuf>,
        /// Buffer distance for polygon sanitization; defaults to the cell size
        #[arg(long)]
        sanitize_buffer: Option<f64>,
    },
    /// Compose evidence from prepared criterion rasters
    Compose {
        /// Transform store document (JSON)
        #[arg(long)]
        store: PathBuf,
        /// Scenario machine code
        #[arg(long, default_value = "EVIDENCE_02")]
        scenario: String,
        /// Criterion raster as "Name=path" (repeatable)
        #[arg(long = "input", value_name = "NAME=PATH")]
        inputs: Vec<String>,
        /// Zone raster as "Name=path" (repeatable, zoned criteria only)
        #[arg(long = "zone", value_name = "NAME=PATH")]
        zones: Vec<String>,
        /// Output directory for normalized and combined rasters
        #[arg(short, long)]
        output: PathBuf,
        /// Combination expression (JSON); omit for the standard scheme
        #[arg(long)]
        expression: Option<PathBuf>,
    },
    /// Binarize an evidence raster at a cutoff
    Threshold {
        /// Input evidence raster
        input: PathBuf,
        /// Output binary mask
        output: PathBuf,
        /// Evidence cutoff; cells at or above it become foreground
        #[arg(short, long)]
        cutoff: f64,
    },
    /// Clean a binary mask (closing then opening)
    Clean {
        /// Input binary mask
        input: PathBuf,
        /// Output cleaned mask
        output: PathBuf,
        /// Structuring element radius in pixels
        #[arg(long, default_value = "1")]
        buffer_pixels: usize,
    },
    /// Convert a cleaned mask to polygons
    Polygonize {
        /// Input binary mask
        input: PathBuf,
        /// Output polygon layer (GeoJSON)
        output: PathBuf,
    },
    /// Buffer, merge and trim raw polygons against the network
    Sanitize {
        /// Raw polygon layer (GeoJSON)
        input: PathBuf,
        /// Output polygon layer (GeoJSON)
        output: PathBuf,
        /// Stream network lines (GeoJSON)
        #[arg(long)]
        network: PathBuf,
        /// Threshold label attribute for surviving features
        #[arg(long)]
        label: String,
        /// Buffer distance in map units
        #[arg(long)]
        buffer: f64,
    },
    /// Height above nearest drainage from a DEM
    Hand {
        /// Input DEM
        dem: PathBuf,
        /// Output HAND raster
        output: PathBuf,
        /// Drainage mask raster; omit to seed from flow accumulation
        #[arg(long)]
        drainage: Option<PathBuf>,
        /// Accumulation threshold (cells) when seeding without a mask
        #[arg(long, default_value = "100")]
        seed_threshold: f64,
        /// Minimum slope enforced while filling sinks
        #[arg(long, default_value = "0.01")]
        min_slope: f64,
    },
    /// Euclidean distance to the burned cells of a mask
    Proximity {
        /// Input mask raster
        input: PathBuf,
        /// Output distance raster (map units)
        output: PathBuf,
    },
    /// Burn a vector layer onto a reference grid
    Rasterize {
        /// Input vector layer (GeoJSON)
        input: PathBuf,
        /// Raster defining the output grid
        #[arg(long)]
        grid: PathBuf,
        /// Output raster
        output: PathBuf,
        /// Burn this attribute instead of the constant 1
        #[arg(long)]
        field: Option<String>,
        /// Value for cells covered by no feature
        #[arg(long, default_value = "0")]
        background: f64,
    },
    /// Buffer network lines by half a width attribute
    Buffer {
        /// Input network lines (GeoJSON)
        input: PathBuf,
        /// Output polygon layer (GeoJSON)
        output: PathBuf,
        /// Width attribute; features are buffered by half its value
        #[arg(long, default_value = "BFwidth")]
        field: String,
        /// Minimum buffer radius in map units
        #[arg(long)]
        min_radius: f64,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        Level::DEBUG
    } else if quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_string()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Progress callback fed by the strip observer of [`compose`]
fn strip_progress(msg: &str) -> impl FnMut(usize, usize) {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap(),
    );
    pb.set_message(msg.to_string());
    move |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
        if done == total {
            pb.finish_and_clear();
        }
    }
}

fn read_f64(path: &PathBuf) -> Result<Raster<f64>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<f64> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

fn read_u8(path: &PathBuf) -> Result<Raster<u8>> {
    let pb = spinner("Reading raster...");
    let raster: Raster<u8> = read_geotiff(path)
        .with_context(|| format!("Failed to read raster {}", path.display()))?;
    pb.finish_and_clear();
    Ok(raster)
}

fn write_result<T: RasterElement>(raster: &Raster<T>, path: &PathBuf) -> Result<()> {
    let pb = spinner("Writing output...");
    write_geotiff(raster, path).context("Failed to write output")?;
    pb.finish_and_clear();
    Ok(())
}

fn done(name: &str, path: &PathBuf, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

fn parse_thresholds(s: &str) -> Result<BTreeMap<String, f64>> {
    s.split(',')
        .map(|pair| {
            let (label, cutoff) = pair
                .trim()
                .split_once('=')
                .with_context(|| format!("Threshold must be 'label=cutoff', got: {}", pair))?;
            let cutoff: f64 = cutoff.trim().parse().context("Invalid cutoff")?;
            Ok((label.trim().to_string(), cutoff))
        })
        .collect()
}

fn parse_named_paths(pairs: &[String]) -> Result<BTreeMap<String, PathBuf>> {
    pairs
        .iter()
        .map(|pair| {
            let (name, path) = pair
                .split_once('=')
                .with_context(|| format!("Expected 'Name=path', got: {}", pair))?;
            Ok((name.trim().to_string(), PathBuf::from(path.trim())))
        })
        .collect()
}

fn load_expression(path: &Option<PathBuf>) -> Result<CombinationExpression> {
    match path {
        Some(path) => CombinationExpression::from_file(path)
            .with_context(|| format!("Failed to load expression {}", path.display())),
        None => Ok(CombinationExpression::default()),
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_f64(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {:.4}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {:.4}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            println!(
                "  Valid cells: {} ({:.1}%)",
                stats.valid_count,
                100.0 * stats.valid_count as f64 / raster.len() as f64
            );
        }

        // ── Pipeline ─────────────────────────────────────────────────
        Commands::Pipeline {
            dem,
            slope,
            network,
            flow_areas,
            store,
            scenario,
            output,
            thresholds,
            buffer_pixels,
            bankfull_field,
            drainage_area_field,
            expression,
            sanitize_buffer,
        } => {
            let inputs = PipelineInputs {
                dem,
                slope,
                network,
                flow_areas,
                transform_store: store,
            };
            let mut params = PipelineParams::new(scenario);
            params.thresholds = match &thresholds {
                Some(list) => parse_thresholds(list)?,
                None => default_thresholds(),
            };
            params.buffer_pixels = buffer_pixels;
            params.bankfull_field = bankfull_field;
            params.drainage_area_field = drainage_area_field;
            params.expression = load_expression(&expression)?;
            params.sanitize_buffer = sanitize_buffer;

            let layout = OutputLayout::new(&output);
            let start = Instant::now();
            let report = run_pipeline(&inputs, &params, &layout, strip_progress("Composing"))
                .context("Pipeline failed")?;
            let elapsed = start.elapsed();

            println!("Evidence raster: {}", report.evidence.display());
            for (label, path) in &report.layers {
                println!("  Threshold {}: {}", label, path.display());
            }
            println!("  Processing time: {:.2?}", elapsed);
        }

        // ── Compose ──────────────────────────────────────────────────
        Commands::Compose {
            store,
            scenario,
            inputs,
            zones,
            output,
            expression,
        } => {
            let store = TransformStore::from_file(&store).context("Failed to load store")?;
            let configuration =
                load_configuration(&scenario, &store).context("Failed to load scenario")?;
            let expression = load_expression(&expression)?;

            let compose_inputs = ComposeInputs {
                rasters: parse_named_paths(&inputs)?,
                zones: parse_named_paths(&zones)?,
            };
            std::fs::create_dir_all(&output)?;
            let outputs = ComposeOutputs::in_directory(&output, &configuration, &expression);

            let start = Instant::now();
            compose(
                &configuration,
                &expression,
                &compose_inputs,
                &outputs,
                strip_progress("Composing"),
            )
            .context("Failed to compose evidence")?;
            let elapsed = start.elapsed();

            if let Some(total) = outputs.total_path(&expression) {
                done("Evidence", &total.to_path_buf(), elapsed);
            }
        }

        // ── Threshold ────────────────────────────────────────────────
        Commands::Threshold {
            input,
            output,
            cutoff,
        } => {
            let start = Instant::now();
            threshold_file(&input, cutoff, &output).context("Failed to threshold")?;
            done("Threshold mask", &output, start.elapsed());
        }

        // ── Clean ────────────────────────────────────────────────────
        Commands::Clean {
            input,
            output,
            buffer_pixels,
        } => {
            let mask = read_u8(&input)?;
            let start = Instant::now();
            let cleaned =
                clean(&mask, &CleanParams { buffer_pixels }).context("Failed to clean")?;
            let elapsed = start.elapsed();
            write_result(&cleaned, &output)?;
            done("Cleaned mask", &output, elapsed);
        }

        // ── Polygonize ───────────────────────────────────────────────
        Commands::Polygonize { input, output } => {
            let mask = read_u8(&input)?;
            let start = Instant::now();
            let features = polygonize(&mask).context("Failed to polygonize")?;
            let elapsed = start.elapsed();
            write_geojson(&features, &output).context("Failed to write layer")?;
            println!("{} polygons", features.len());
            done("Polygon layer", &output, elapsed);
        }

        // ── Sanitize ─────────────────────────────────────────────────
        Commands::Sanitize {
            input,
            output,
            network,
            label,
            buffer,
        } => {
            let raw = read_geojson(&input).context("Failed to read raw polygons")?;
            let network = read_geojson(&network).context("Failed to read network")?;
            let start = Instant::now();
            let layer =
                sanitize(&label, &raw, buffer, &network).context("Failed to sanitize")?;
            let elapsed = start.elapsed();
            write_geojson(&layer, &output).context("Failed to write layer")?;
            println!("{} polygons kept", layer.len());
            done("Sanitized layer", &output, elapsed);
        }

        // ── Hand ─────────────────────────────────────────────────────
        Commands::Hand {
            dem,
            output,
            drainage,
            seed_threshold,
            min_slope,
        } => {
            let dem = read_f64(&dem)?;
            let start = Instant::now();
            let filled = fill_sinks(&dem, FillSinksParams { min_slope })
                .context("Failed to fill sinks")?;
            let directions =
                flow_direction(&filled).context("Failed to compute flow direction")?;
            let drainage = match drainage {
                Some(path) => read_f64(&path)?,
                None => {
                    let accumulation = flow_accumulation(&filled, &directions)
                        .context("Failed to accumulate flow")?;
                    drainage_mask_from_accumulation(&accumulation, seed_threshold)
                }
            };
            let result =
                hand(&filled, &directions, &drainage).context("Failed to compute HAND")?;
            let elapsed = start.elapsed();
            write_result(&result, &output)?;
            done("HAND", &output, elapsed);
        }

        // ── Proximity ────────────────────────────────────────────────
        Commands::Proximity { input, output } => {
            let mask = read_f64(&input)?;
            let start = Instant::now();
            let distance = proximity(&mask).context("Failed to compute distances")?;
            let elapsed = start.elapsed();
            write_result(&distance, &output)?;
            done("Proximity", &output, elapsed);
        }

        // ── Rasterize ────────────────────────────────────────────────
        Commands::Rasterize {
            input,
            grid,
            output,
            field,
            background,
        } => {
            let features = read_geojson(&input).context("Failed to read vector layer")?;
            let reference = read_f64(&grid)?;
            let params = RasterizeParams {
                burn: match field {
                    Some(name) => BurnSource::Field(name),
                    None => BurnSource::Constant(1.0),
                },
                background,
            };
            let start = Instant::now();
            let burned = rasterize(&features, &reference.grid_spec(), &params)
                .context("Failed to rasterize")?;
            let elapsed = start.elapsed();
            write_result(&burned, &output)?;
            done("Rasterized", &output, elapsed);
        }

        // ── Buffer ───────────────────────────────────────────────────
        Commands::Buffer {
            input,
            output,
            field,
            min_radius,
        } => {
            let features = read_geojson(&input).context("Failed to read network")?;
            let start = Instant::now();
            let buffered = buffer_by_field(&features, &field, min_radius)
                .context("Failed to buffer network")?;
            let elapsed = start.elapsed();
            write_geojson(&buffered, &output).context("Failed to write layer")?;
            done("Buffered network", &output, elapsed);
        }
    }

    Ok(())
}
