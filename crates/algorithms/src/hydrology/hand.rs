//! Height above nearest drainage
//!
//! Walks each cell's D8 path downstream until it lands on a drainage
//! cell and reports the elevation difference. Drainage is whatever the
//! caller burned into the mask (a rasterized channel network, or a
//! thresholded accumulation raster via
//! [`drainage_mask_from_accumulation`]).

use super::flow_accumulation::downstream;
use super::is_nodata;
use riparia_core::raster::Raster;
use riparia_core::{Error, Result};

/// Path trace outcome, cached per cell
#[derive(Clone, Copy, PartialEq)]
enum Trace {
    Unknown,
    // Drainage elevation the cell's path reaches
    Drains(f64),
    Lost,
}

/// Compute height above nearest drainage along D8 paths.
///
/// Drainage cells are the finite non-zero cells of `drainage`; they get
/// HAND 0. Cells whose path exits the grid or dead-ends before reaching
/// drainage are NaN. Negative differences (drainage sitting above a
/// tributary cell after filling artifacts) clamp to 0.
pub fn hand(
    dem: &Raster<f64>,
    flow_dir: &Raster<u8>,
    drainage: &Raster<f64>,
) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    for (name, shape) in [("flow_dir", flow_dir.shape()), ("drainage", drainage.shape())] {
        if shape != (rows, cols) {
            return Err(Error::GridMismatch {
                criterion: name.to_string(),
                detail: format!(
                    "expected {}x{}, got {}x{}",
                    rows, cols, shape.0, shape.1
                ),
            });
        }
    }

    let nodata = dem.nodata();
    let is_drainage = |row: usize, col: usize| {
        let v = unsafe { drainage.get_unchecked(row, col) };
        v.is_finite() && v != 0.0
    };

    let mut cache = vec![Trace::Unknown; rows * cols];
    let mut output = dem.like(f64::NAN);
    output.set_nodata(Some(f64::NAN));

    let mut path: Vec<usize> = Vec::new();
    for row in 0..rows {
        for col in 0..cols {
            let elev = unsafe { dem.get_unchecked(row, col) };
            if is_nodata(elev, nodata) {
                continue;
            }

            // Walk downstream until drainage, a cached result, or a dead end
            path.clear();
            let (mut r, mut c) = (row, col);
            let result = loop {
                let idx = r * cols + c;
                match cache[idx] {
                    Trace::Drains(z) => break Trace::Drains(z),
                    Trace::Lost => break Trace::Lost,
                    Trace::Unknown => {}
                }
                if is_drainage(r, c) {
                    break Trace::Drains(unsafe { dem.get_unchecked(r, c) });
                }
                path.push(idx);
                match downstream(flow_dir, r, c, rows, cols) {
                    Some((nr, nc)) => {
                        let nv = unsafe { dem.get_unchecked(nr, nc) };
                        if is_nodata(nv, nodata) {
                            break Trace::Lost;
                        }
                        // Revisiting the current walk means a cycle
                        if path.contains(&(nr * cols + nc)) {
                            break Trace::Lost;
                        }
                        r = nr;
                        c = nc;
                    }
                    None => break Trace::Lost,
                }
            };

            for &idx in &path {
                cache[idx] = result;
            }

            if let Trace::Drains(drain_elev) = result {
                let h = (elev - drain_elev).max(0.0);
                unsafe { output.set_unchecked(row, col, h) };
            }
        }
    }

    Ok(output)
}

/// Derive a drainage mask from a flow accumulation raster: cells at or
/// above the threshold become 1.0, the rest 0.0.
pub fn drainage_mask_from_accumulation(accumulation: &Raster<f64>, threshold: f64) -> Raster<f64> {
    let (rows, cols) = accumulation.shape();
    let mut mask = accumulation.with_same_meta::<f64>(rows, cols);
    mask.set_nodata(Some(f64::NAN));
    *mask.data_mut() = accumulation
        .view()
        .mapv(|v| if v.is_finite() && v >= threshold { 1.0 } else { 0.0 });
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::{fill_sinks, flow_accumulation, flow_direction, FillSinksParams};
    use riparia_core::raster::GeoTransform;

    /// Tilted plane draining east, channel along the east column
    fn setup() -> (Raster<f64>, Raster<u8>, Raster<f64>) {
        let mut dem = Raster::new(5, 5);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        for row in 0..5 {
            for col in 0..5 {
                dem.set(row, col, (4 - col) as f64 * 2.0).unwrap();
            }
        }
        let dirs = flow_direction(&dem).unwrap();
        let mut drainage = Raster::filled(5, 5, 0.0);
        drainage.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        for row in 0..5 {
            drainage.set(row, 4, 1.0).unwrap();
        }
        (dem, dirs, drainage)
    }

    #[test]
    fn test_drainage_cells_are_zero() {
        let (dem, dirs, drainage) = setup();
        let h = hand(&dem, &dirs, &drainage).unwrap();
        for row in 0..5 {
            assert_eq!(h.get(row, 4).unwrap(), 0.0);
        }
    }

    #[test]
    fn test_height_is_elevation_above_channel() {
        let (dem, dirs, drainage) = setup();
        let h = hand(&dem, &dirs, &drainage).unwrap();
        assert_eq!(h.get(2, 0).unwrap(), 8.0);
        assert_eq!(h.get(2, 3).unwrap(), 2.0);
    }

    #[test]
    fn test_lost_paths_are_nan() {
        let (dem, dirs, _) = setup();
        let mut empty = Raster::filled(5, 5, 0.0);
        empty.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        let h = hand(&dem, &dirs, &empty).unwrap();
        assert!(h.get(2, 2).unwrap().is_nan());
    }

    #[test]
    fn test_accumulation_threshold_seeds_drainage() {
        let (dem, dirs, _) = setup();
        let filled = fill_sinks(&dem, FillSinksParams::default()).unwrap();
        let dirs2 = flow_direction(&filled).unwrap();
        let acc = flow_accumulation(&filled, &dirs2).unwrap();
        let mask = drainage_mask_from_accumulation(&acc, 5.0);
        assert_eq!(mask.get(2, 4).unwrap(), 1.0);
        assert_eq!(mask.get(2, 0).unwrap(), 0.0);
        let h = hand(&dem, &dirs, &mask).unwrap();
        assert_eq!(h.get(2, 4).unwrap(), 0.0);
    }

    #[test]
    fn test_grid_mismatch_rejected() {
        let (dem, dirs, _) = setup();
        let wrong = Raster::filled(4, 5, 0.0);
        assert!(hand(&dem, &dirs, &wrong).is_err());
    }
}
