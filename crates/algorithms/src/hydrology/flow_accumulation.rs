//! D8 flow accumulation
//!
//! Counts, for every cell, how many cells drain through it (itself
//! included). Used to seed a drainage mask when no mapped network is
//! available.

use super::{is_nodata, D8_OFFSETS};
use riparia_core::raster::Raster;
use riparia_core::{Algorithm, Error, Result};

/// Flow accumulation algorithm
#[derive(Debug, Clone, Default)]
pub struct FlowAccumulation;

impl Algorithm for FlowAccumulation {
    type Input = (Raster<f64>, Raster<u8>);
    type Output = Raster<f64>;
    type Params = ();
    type Error = Error;

    fn name(&self) -> &'static str {
        "Flow Accumulation"
    }

    fn description(&self) -> &'static str {
        "Upstream cell counts along D8 flow directions"
    }

    fn execute(&self, input: Self::Input, _params: Self::Params) -> Result<Self::Output> {
        flow_accumulation(&input.0, &input.1)
    }
}

/// Accumulate upstream cell counts along D8 directions.
///
/// Topological: cells are released once all their contributors have
/// resolved, so each cell is visited exactly once. Cells inside a
/// direction cycle (possible only on an unfilled DEM) stay at their
/// own count of 1.
pub fn flow_accumulation(dem: &Raster<f64>, flow_dir: &Raster<u8>) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let (dir_rows, dir_cols) = flow_dir.shape();
    if (rows, cols) != (dir_rows, dir_cols) {
        return Err(Error::SizeMismatch {
            er: rows,
            ec: cols,
            ar: dir_rows,
            ac: dir_cols,
        });
    }

    let nodata = dem.nodata();
    let mut accum = vec![1.0f64; rows * cols];
    let mut in_degree = vec![0u8; rows * cols];
    let mut valid = vec![false; rows * cols];

    for row in 0..rows {
        for col in 0..cols {
            let v = unsafe { dem.get_unchecked(row, col) };
            valid[row * cols + col] = !is_nodata(v, nodata);
        }
    }

    // In-degree: how many valid neighbors point at each cell
    for row in 0..rows {
        for col in 0..cols {
            if !valid[row * cols + col] {
                continue;
            }
            if let Some((tr, tc)) = downstream(flow_dir, row, col, rows, cols) {
                if valid[tr * cols + tc] {
                    in_degree[tr * cols + tc] += 1;
                }
            }
        }
    }

    let mut queue: std::collections::VecDeque<(usize, usize)> = (0..rows)
        .flat_map(|r| (0..cols).map(move |c| (r, c)))
        .filter(|&(r, c)| valid[r * cols + c] && in_degree[r * cols + c] == 0)
        .collect();

    while let Some((row, col)) = queue.pop_front() {
        if let Some((tr, tc)) = downstream(flow_dir, row, col, rows, cols) {
            if valid[tr * cols + tc] {
                accum[tr * cols + tc] += accum[row * cols + col];
                in_degree[tr * cols + tc] -= 1;
                if in_degree[tr * cols + tc] == 0 {
                    queue.push_back((tr, tc));
                }
            }
        }
    }

    let mut output = dem.like(f64::NAN);
    output.set_nodata(Some(f64::NAN));
    for row in 0..rows {
        for col in 0..cols {
            if valid[row * cols + col] {
                unsafe { output.set_unchecked(row, col, accum[row * cols + col]) };
            }
        }
    }

    Ok(output)
}

/// The cell this one drains into, if its direction code points in bounds
pub(crate) fn downstream(
    flow_dir: &Raster<u8>,
    row: usize,
    col: usize,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize)> {
    let code = unsafe { flow_dir.get_unchecked(row, col) };
    if code == 0 || code > 8 {
        return None;
    }
    let (dr, dc) = D8_OFFSETS[(code - 1) as usize];
    let nr = row as isize + dr;
    let nc = col as isize + dc;
    if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
        return None;
    }
    Some((nr as usize, nc as usize))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hydrology::flow_direction;
    use riparia_core::raster::GeoTransform;

    fn east_slope(rows: usize, cols: usize) -> Raster<f64> {
        let mut dem = Raster::new(rows, cols);
        dem.set_transform(GeoTransform::new(0.0, rows as f64, 1.0, -1.0));
        for row in 0..rows {
            for col in 0..cols {
                dem.set(row, col, (cols - col) as f64 * 10.0).unwrap();
            }
        }
        dem
    }

    #[test]
    fn test_accumulation_grows_downslope() {
        let dem = east_slope(1, 5);
        let dirs = flow_direction(&dem).unwrap();
        let acc = flow_accumulation(&dem, &dirs).unwrap();
        for col in 0..5 {
            assert_eq!(acc.get(0, col).unwrap(), (col + 1) as f64);
        }
    }

    #[test]
    fn test_ridge_cells_count_themselves_only() {
        let dem = east_slope(3, 5);
        let dirs = flow_direction(&dem).unwrap();
        let acc = flow_accumulation(&dem, &dirs).unwrap();
        assert_eq!(acc.get(1, 0).unwrap(), 1.0);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let dem = east_slope(3, 5);
        let dirs = Raster::<u8>::new(4, 5);
        assert!(flow_accumulation(&dem, &dirs).is_err());
    }
}
