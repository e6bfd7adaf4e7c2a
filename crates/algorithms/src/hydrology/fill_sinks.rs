//! Depression filling
//!
//! Planchon-Darboux (2001) iterative filling: start from a surface that
//! is the DEM on the border and +inf inside, then lower every interior
//! cell toward the DEM as long as a neighbor allows drainage with at
//! least the configured epsilon gradient. The result is a DEM on which
//! every cell has a monotone path to the edge, which the D8 steps
//! downstream require.

use super::{is_nodata, D8_DIST, D8_OFFSETS};
use ndarray::Array2;
use riparia_core::raster::Raster;
use riparia_core::{Algorithm, Error, Result};

/// Parameters for sink filling
#[derive(Debug, Clone)]
pub struct FillSinksParams {
    /// Minimum slope enforced between filled cells; 0.0 allows flats
    pub min_slope: f64,
}

impl Default for FillSinksParams {
    fn default() -> Self {
        Self { min_slope: 0.01 }
    }
}

/// Fill sinks algorithm
#[derive(Debug, Clone, Default)]
pub struct FillSinks;

impl Algorithm for FillSinks {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = FillSinksParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Fill Sinks"
    }

    fn description(&self) -> &'static str {
        "Fill DEM depressions (Planchon-Darboux 2001) ahead of D8 routing"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        fill_sinks(&input, params)
    }
}

/// Fill depressions so every cell has a downslope path to the DEM edge.
pub fn fill_sinks(dem: &Raster<f64>, params: FillSinksParams) -> Result<Raster<f64>> {
    let (rows, cols) = dem.shape();
    let nodata = dem.nodata();
    let epsilon = params.min_slope * dem.cell_size();
    let big_value = f64::MAX / 2.0;

    // Water surface: DEM at the border and at nodata, +inf-ish inside
    let mut w = Array2::from_elem((rows, cols), big_value);
    for row in 0..rows {
        for col in 0..cols {
            let val = unsafe { dem.get_unchecked(row, col) };
            if is_nodata(val, nodata)
                || row == 0
                || row == rows - 1
                || col == 0
                || col == cols - 1
            {
                w[(row, col)] = val;
            }
        }
    }

    // Alternate forward/backward raster scans until no cell can drop.
    // Each pass tries to lower W toward the DEM wherever a neighbor's
    // surface plus the (distance-scaled) epsilon still drains.
    let mut changed = true;
    while changed {
        changed = false;
        changed |= relax_pass(dem, &mut w, nodata, epsilon, big_value, false);
        changed |= relax_pass(dem, &mut w, nodata, epsilon, big_value, true);
    }

    let mut output = dem.like(0.0);
    *output.data_mut() = w;
    Ok(output)
}

fn relax_pass(
    dem: &Raster<f64>,
    w: &mut Array2<f64>,
    nodata: Option<f64>,
    epsilon: f64,
    big_value: f64,
    reverse: bool,
) -> bool {
    let (rows, cols) = dem.shape();
    let mut changed = false;

    let row_order: Vec<usize> = if reverse {
        (1..rows - 1).rev().collect()
    } else {
        (1..rows - 1).collect()
    };
    let col_order: Vec<usize> = if reverse {
        (1..cols - 1).rev().collect()
    } else {
        (1..cols - 1).collect()
    };

    for &row in &row_order {
        for &col in &col_order {
            let dem_val = unsafe { dem.get_unchecked(row, col) };
            if is_nodata(dem_val, nodata) || w[(row, col)] <= dem_val {
                continue;
            }

            for (idx, &(dr, dc)) in D8_OFFSETS.iter().enumerate() {
                let nr = (row as isize + dr) as usize;
                let nc = (col as isize + dc) as usize;
                let wn = w[(nr, nc)];
                if wn.is_nan() || wn >= big_value {
                    continue;
                }

                let drained = wn + epsilon * D8_DIST[idx];
                if dem_val >= drained {
                    w[(row, col)] = dem_val;
                    changed = true;
                    break;
                }
                if w[(row, col)] > drained {
                    w[(row, col)] = drained;
                    changed = true;
                }
            }
        }
    }

    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use riparia_core::raster::GeoTransform;

    /// 7x7 bowl with a depression at the center
    fn dem_with_sink() -> Raster<f64> {
        let values = vec![
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 3.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 7.0, 7.0, 7.0, 8.0, 9.0,
            9.0, 8.0, 8.0, 8.0, 8.0, 8.0, 9.0,
            9.0, 9.0, 9.0, 9.0, 9.0, 9.0, 9.0,
        ];
        let mut dem = Raster::from_vec(values, 7, 7).unwrap();
        dem.set_transform(GeoTransform::new(0.0, 7.0, 1.0, -1.0));
        dem
    }

    #[test]
    fn test_depression_is_raised() {
        let filled = fill_sinks(&dem_with_sink(), FillSinksParams { min_slope: 0.0 }).unwrap();
        let center = filled.get(3, 3).unwrap();
        assert!(center >= 7.0, "sink should fill to its pour level, got {}", center);
    }

    #[test]
    fn test_border_is_untouched() {
        let filled = fill_sinks(&dem_with_sink(), FillSinksParams { min_slope: 0.0 }).unwrap();
        assert_eq!(filled.get(0, 0).unwrap(), 9.0);
        assert_eq!(filled.get(6, 3).unwrap(), 9.0);
    }

    #[test]
    fn test_clean_slope_is_preserved() {
        let mut dem = Raster::new(10, 10);
        dem.set_transform(GeoTransform::new(0.0, 10.0, 1.0, -1.0));
        for row in 0..10 {
            for col in 0..10 {
                dem.set(row, col, (row + col) as f64).unwrap();
            }
        }

        let filled = fill_sinks(&dem, FillSinksParams::default()).unwrap();
        for row in 0..10 {
            for col in 0..10 {
                assert!(filled.get(row, col).unwrap() >= dem.get(row, col).unwrap());
            }
        }
        // No sink anywhere, so nothing should move appreciably
        assert!((filled.get(5, 5).unwrap() - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_fill_respects_outlet_level() {
        // Bowl with a low outlet on the border: fill stops at the outlet
        let mut dem = Raster::filled(5, 5, 5.0);
        dem.set_transform(GeoTransform::new(0.0, 5.0, 1.0, -1.0));
        for i in 0..5 {
            dem.set(0, i, 10.0).unwrap();
            dem.set(4, i, 10.0).unwrap();
            dem.set(i, 0, 10.0).unwrap();
            dem.set(i, 4, 10.0).unwrap();
        }
        dem.set(2, 2, 1.0).unwrap();
        dem.set(4, 2, 2.0).unwrap();

        let filled = fill_sinks(&dem, FillSinksParams { min_slope: 0.0 }).unwrap();
        let center = filled.get(2, 2).unwrap();
        assert!(center >= 1.0 && center <= 5.0, "got {}", center);
        assert_eq!(filled.get(1, 1).unwrap(), 5.0);
    }
}
