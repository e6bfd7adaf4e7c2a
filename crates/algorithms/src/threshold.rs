//! Evidence thresholding
//!
//! Binarizes an evidence surface at a confidence cutoff: cell = 1 where
//! evidence >= cutoff, 0 below, nodata stays nodata. The file-to-file
//! form streams strip by strip like the compositor; the in-memory form
//! serves the cleanup stage, which needs the whole binary raster
//! anyway.

use riparia_core::io::{BandReader, GeoTiffWriter};
use riparia_core::raster::{strip_windows, Raster};
use riparia_core::Result;
use std::path::Path;
use tracing::debug;

/// Nodata sentinel for binary mask files
pub const MASK_NODATA: u8 = 255;

/// Threshold an evidence raster held in memory.
pub fn threshold_raster(evidence: &Raster<f64>, cutoff: f64) -> Raster<u8> {
    let (rows, cols) = evidence.shape();
    let mut mask = evidence.with_same_meta::<u8>(rows, cols);
    mask.set_nodata(Some(MASK_NODATA));
    *mask.data_mut() = evidence.view().mapv(|v| {
        if v.is_nan() || evidence.is_nodata(v) {
            MASK_NODATA
        } else if v >= cutoff {
            1
        } else {
            0
        }
    });
    mask
}

/// Threshold an evidence file into a binary mask file, strip by strip.
pub fn threshold_file<P: AsRef<Path>, Q: AsRef<Path>>(
    evidence: P,
    cutoff: f64,
    output: Q,
) -> Result<()> {
    let mut reader = BandReader::open(evidence)?;
    let grid = reader.grid();
    let strip_rows = reader.strip_rows();

    let mut writer =
        GeoTiffWriter::create(output, grid, Some(f64::from(MASK_NODATA)), strip_rows)?;
    let mut sink = writer.band::<u8>()?;

    for window in strip_windows(grid.rows, grid.cols, strip_rows) {
        let tile = reader.read_window(window)?;
        let mask = tile.mapv(|v| {
            if v.is_nan() {
                f64::NAN
            } else if v >= cutoff {
                1.0
            } else {
                0.0
            }
        });
        sink.write_rows(mask.view())?;
    }
    sink.finish()?;

    debug!(cutoff, rows = grid.rows, cols = grid.cols, "threshold written");
    Ok(())
}
