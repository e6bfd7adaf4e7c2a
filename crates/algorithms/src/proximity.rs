//! Euclidean distance to burned cells
//!
//! Exact two-pass distance transform (Felzenszwalb & Huttenlocher 2012)
//! over squared distances: a column pass seeds per-cell vertical
//! distances, a row pass computes the lower envelope of parabolas.
//! Output distances are in map units (cell size scaled).
//!
//! Source cells are the burned cells of a mask raster: finite and
//! non-zero. Everything else measures its distance to the nearest
//! source; a raster with no sources yields all-NaN.

use ndarray::Array2;
use riparia_core::raster::Raster;
use riparia_core::Result;

/// Compute the Euclidean distance raster from the burned cells of a mask.
///
/// Source cells get distance 0. Output is `f64` in map units, NaN only
/// when the mask has no source cells at all (the mask's own nodata cells
/// still receive a distance, matching the "distance to channel" use
/// where the channel mask is sparse by construction).
pub fn proximity(mask: &Raster<f64>) -> Result<Raster<f64>> {
    let (rows, cols) = mask.shape();
    let inf = f64::INFINITY;

    // Column pass: squared distance to the nearest source in each column
    let mut dist2 = Array2::from_elem((rows, cols), inf);
    for col in 0..cols {
        let mut column: Vec<f64> = (0..rows)
            .map(|row| {
                let v = unsafe { mask.get_unchecked(row, col) };
                if v.is_finite() && v != 0.0 {
                    0.0
                } else {
                    inf
                }
            })
            .collect();
        distance_transform_1d(&mut column);
        for (row, &d) in column.iter().enumerate() {
            dist2[(row, col)] = d;
        }
    }

    // Row pass over the column results
    let mut row_buf = vec![0.0; cols];
    for row in 0..rows {
        for col in 0..cols {
            row_buf[col] = dist2[(row, col)];
        }
        distance_transform_1d(&mut row_buf);
        for col in 0..cols {
            dist2[(row, col)] = row_buf[col];
        }
    }

    let cell = mask.cell_size();
    let mut output = mask.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() = dist2.mapv(|d2| {
        if d2.is_finite() {
            d2.sqrt() * cell
        } else {
            f64::NAN
        }
    });

    Ok(output)
}

/// One-dimensional squared-distance transform, in place.
///
/// Input holds 0.0 at sources and +inf elsewhere (or a prior pass's
/// squared distances); output is the lower envelope of the parabolas
/// rooted at each finite input.
fn distance_transform_1d(f: &mut [f64]) {
    let n = f.len();
    if n == 0 {
        return;
    }

    // Parabola roots (v) and envelope breakpoints (z)
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0usize;
    let mut started = false;

    for q in 0..n {
        if !f[q].is_finite() {
            continue;
        }
        if !started {
            v[0] = q;
            z[0] = f64::NEG_INFINITY;
            z[1] = f64::INFINITY;
            started = true;
            continue;
        }
        loop {
            let p = v[k];
            let s = ((f[q] + (q * q) as f64) - (f[p] + (p * p) as f64))
                / (2.0 * q as f64 - 2.0 * p as f64);
            if s <= z[k] {
                k -= 1;
            } else {
                k += 1;
                v[k] = q;
                z[k] = s;
                z[k + 1] = f64::INFINITY;
                break;
            }
        }
    }

    if !started {
        return; // No finite parabola, leave all-inf
    }

    let snapshot: Vec<f64> = f.to_vec();
    let mut k = 0usize;
    for (q, out) in f.iter_mut().enumerate() {
        while z[k + 1] < q as f64 {
            k += 1;
        }
        let p = v[k];
        let d = q as f64 - p as f64;
        *out = d * d + snapshot[p];
    }
}
