//! Raster to polygon conversion
//!
//! Emits one polygon per 4-connected region of equal foreground cells,
//! tagged with the region's raster value. Rings run along cell corners
//! in map coordinates, exterior rings counter-clockwise and holes
//! clockwise.
//!
//! Boundary tracing works on directed cell-edge segments that keep the
//! region interior on the right in grid space. Where two corners of the
//! same region touch diagonally, the walk takes the sharpest right turn
//! so the pinch point splits into separate simple rings instead of a
//! self-crossing one.

use geo_types::{Coord, Geometry, LineString, Polygon};
use riparia_core::raster::Raster;
use riparia_core::vector::{AttributeValue, Feature, FeatureCollection};
use riparia_core::Result;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Vectorize the foreground regions of a raster.
///
/// Foreground is any cell that is neither zero nor nodata; touching
/// cells belong to the same region only when their values are equal.
/// Each output feature carries the region value in the `value`
/// attribute.
pub fn polygonize(raster: &Raster<u8>) -> Result<FeatureCollection> {
    let (rows, cols) = raster.shape();
    let mut labels: Vec<i32> = vec![-1; rows * cols];
    let mut regions: Vec<u8> = Vec::new();

    let foreground = |value: u8| value != 0 && !raster.is_nodata(value);

    // 4-connected labeling of equal-valued foreground runs
    for row in 0..rows {
        for col in 0..cols {
            let value = unsafe { raster.get_unchecked(row, col) };
            if !foreground(value) || labels[row * cols + col] >= 0 {
                continue;
            }

            let label = regions.len() as i32;
            regions.push(value);
            let mut queue = VecDeque::from([(row, col)]);
            labels[row * cols + col] = label;

            while let Some((r, c)) = queue.pop_front() {
                let neighbors = [
                    (r.wrapping_sub(1), c),
                    (r + 1, c),
                    (r, c.wrapping_sub(1)),
                    (r, c + 1),
                ];
                for (nr, nc) in neighbors {
                    if nr >= rows || nc >= cols {
                        continue;
                    }
                    let idx = nr * cols + nc;
                    if labels[idx] < 0 && unsafe { raster.get_unchecked(nr, nc) } == value {
                        labels[idx] = label;
                        queue.push_back((nr, nc));
                    }
                }
            }
        }
    }

    // Directed boundary edges per region, keyed by start corner
    let mut edges: Vec<HashMap<(usize, usize), Vec<(usize, usize)>>> =
        vec![HashMap::new(); regions.len()];
    let label_at = |r: isize, c: isize| -> i32 {
        if r < 0 || c < 0 || r >= rows as isize || c >= cols as isize {
            -1
        } else {
            labels[r as usize * cols + c as usize]
        }
    };

    for row in 0..rows {
        for col in 0..cols {
            let label = labels[row * cols + col];
            if label < 0 {
                continue;
            }
            let (r, c) = (row as isize, col as isize);
            let map = &mut edges[label as usize];
            // Corner coordinates are (col, row)
            if label_at(r - 1, c) != label {
                map.entry((col, row)).or_default().push((col + 1, row));
            }
            if label_at(r, c + 1) != label {
                map.entry((col + 1, row)).or_default().push((col + 1, row + 1));
            }
            if label_at(r + 1, c) != label {
                map.entry((col + 1, row + 1)).or_default().push((col, row + 1));
            }
            if label_at(r, c - 1) != label {
                map.entry((col, row + 1)).or_default().push((col, row));
            }
        }
    }

    let transform = *raster.transform();
    let to_map = |(col, row): (usize, usize)| -> Coord<f64> {
        let (x, y) = transform.pixel_to_geo_corner(col, row);
        Coord { x, y }
    };

    let mut collection = FeatureCollection::new();
    for (label, map) in edges.iter_mut().enumerate() {
        let rings = trace_rings(map);

        let mut exterior: Option<LineString<f64>> = None;
        let mut holes: Vec<LineString<f64>> = Vec::new();
        for ring in rings {
            let outer = grid_area(&ring) > 0.0;
            let line = LineString::from(ring.into_iter().map(to_map).collect::<Vec<_>>());
            if outer {
                exterior = Some(line);
            } else {
                holes.push(line);
            }
        }

        if let Some(exterior) = exterior {
            let mut feature = Feature::new(Geometry::Polygon(Polygon::new(exterior, holes)));
            feature.set_property("value", AttributeValue::Int(i64::from(regions[label])));
            collection.push(feature);
        }
    }

    debug!(regions = regions.len(), "raster polygonized");
    Ok(collection)
}

/// Chain directed edges into closed corner rings, resolving pinch
/// corners by the sharpest right turn.
fn trace_rings(
    edges: &mut HashMap<(usize, usize), Vec<(usize, usize)>>,
) -> Vec<Vec<(usize, usize)>> {
    let mut rings = Vec::new();

    loop {
        let Some((&start, _)) = edges.iter().find(|(_, outs)| !outs.is_empty()) else {
            break;
        };

        let mut ring = vec![start];
        let mut current = start;
        let mut incoming: Option<(isize, isize)> = None;

        loop {
            let next = {
                let Some(outs) = edges.get_mut(&current) else {
                    break;
                };
                let Some(pos) = pick_turn(current, outs, incoming) else {
                    break;
                };
                outs.swap_remove(pos)
            };
            incoming = Some((
                next.0 as isize - current.0 as isize,
                next.1 as isize - current.1 as isize,
            ));
            ring.push(next);
            current = next;
            if current == start {
                break;
            }
        }

        if ring.len() > 3 && ring.first() == ring.last() {
            rings.push(ring);
        }
    }

    rings
}

/// Among outgoing edges pick the sharpest right turn relative to the
/// incoming direction (right, straight, then left).
fn pick_turn(
    from: (usize, usize),
    outs: &[(usize, usize)],
    incoming: Option<(isize, isize)>,
) -> Option<usize> {
    if outs.is_empty() {
        return None;
    }
    if outs.len() == 1 || incoming.is_none() {
        return Some(0);
    }

    let dir_code = |d: (isize, isize)| -> isize {
        match d {
            (1, 0) => 0,  // east
            (0, 1) => 1,  // south (grid rows grow downward)
            (-1, 0) => 2, // west
            _ => 3,       // north
        }
    };
    let inc = incoming.map(dir_code)?;

    outs.iter()
        .enumerate()
        .min_by_key(|(_, &(x, y))| {
            let out = dir_code((x as isize - from.0 as isize, y as isize - from.1 as isize));
            // 0 = right turn, 1 = straight, 2 = left, 3 = u-turn
            (out - inc - 1).rem_euclid(4)
        })
        .map(|(pos, _)| pos)
}

/// Signed shoelace area of a corner ring in grid space; positive for
/// the exterior traversal order, negative for holes.
fn grid_area(ring: &[(usize, usize)]) -> f64 {
    let mut sum = 0.0;
    for pair in ring.windows(2) {
        let (x0, y0) = (pair[0].0 as f64, pair[0].1 as f64);
        let (x1, y1) = (pair[1].0 as f64, pair[1].1 as f64);
        sum += x0 * y1 - x1 * y0;
    }
    sum / 2.0
}
