//! Vector-to-raster burning
//!
//! Burns a feature collection onto a reference grid: polygons by even-odd
//! scanline fill against cell centers, lines by cell traversal, points by
//! containing cell. Later features overwrite earlier ones where they
//! overlap. Cells no feature covers keep the background value.

use geo_types::{Geometry, LineString, Polygon};
use riparia_core::raster::{GridSpec, Raster};
use riparia_core::vector::FeatureCollection;
use riparia_core::{Error, Result};

/// Where the burn value for each feature comes from
#[derive(Debug, Clone)]
pub enum BurnSource {
    /// Burn the same value for every feature
    Constant(f64),
    /// Burn each feature's numeric attribute
    Field(String),
}

/// Parameters for rasterization
#[derive(Debug, Clone)]
pub struct RasterizeParams {
    pub burn: BurnSource,
    /// Value for cells covered by no feature
    pub background: f64,
}

impl Default for RasterizeParams {
    fn default() -> Self {
        Self {
            burn: BurnSource::Constant(1.0),
            background: f64::NAN,
        }
    }
}

/// Burn a feature collection onto the reference grid.
///
/// Features with no geometry are skipped; a `Field` burn source fails
/// for a feature lacking the attribute, since a silently skipped feature
/// would leave a hole in a mask that looks like valid background.
pub fn rasterize(
    features: &FeatureCollection,
    grid: &GridSpec,
    params: &RasterizeParams,
) -> Result<Raster<f64>> {
    let mut raster = Raster::filled(grid.rows, grid.cols, params.background);
    raster.set_transform(grid.transform);
    raster.set_nodata(Some(f64::NAN));

    for (idx, feature) in features.iter().enumerate() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let value = match &params.burn {
            BurnSource::Constant(v) => *v,
            BurnSource::Field(name) => feature.number(name).ok_or_else(|| {
                Error::InvalidParameter {
                    name: "burn_field",
                    value: name.clone(),
                    reason: format!("feature {} has no numeric attribute '{}'", idx, name),
                }
            })?,
        };
        burn_geometry(&mut raster, geometry, value);
    }

    Ok(raster)
}

/// Burn one geometry onto a raster with the given value
pub fn burn_geometry(raster: &mut Raster<f64>, geometry: &Geometry<f64>, value: f64) {
    match geometry {
        Geometry::Point(p) => burn_point(raster, p.x(), p.y(), value),
        Geometry::MultiPoint(mp) => {
            for p in &mp.0 {
                burn_point(raster, p.x(), p.y(), value);
            }
        }
        Geometry::Line(l) => burn_segment(raster, (l.start.x, l.start.y), (l.end.x, l.end.y), value),
        Geometry::LineString(ls) => burn_line_string(raster, ls, value),
        Geometry::MultiLineString(mls) => {
            for ls in &mls.0 {
                burn_line_string(raster, ls, value);
            }
        }
        Geometry::Polygon(p) => burn_polygon(raster, p, value),
        Geometry::MultiPolygon(mp) => {
            for p in &mp.0 {
                burn_polygon(raster, p, value);
            }
        }
        Geometry::GeometryCollection(gc) => {
            for g in &gc.0 {
                burn_geometry(raster, g, value);
            }
        }
        Geometry::Rect(r) => burn_polygon(raster, &r.to_polygon(), value),
        Geometry::Triangle(t) => burn_polygon(raster, &t.to_polygon(), value),
    }
}

fn burn_point(raster: &mut Raster<f64>, x: f64, y: f64, value: f64) {
    let (col, row) = raster.geo_to_pixel(x, y);
    if col.is_nan() || row.is_nan() {
        return;
    }
    let (col, row) = (col.floor(), row.floor());
    if row >= 0.0 && col >= 0.0 && (row as usize) < raster.rows() && (col as usize) < raster.cols()
    {
        // In-bounds by the checks above
        unsafe { raster.set_unchecked(row as usize, col as usize, value) };
    }
}

/// Mark every cell a segment passes through by sampling at half-cell steps
fn burn_segment(raster: &mut Raster<f64>, a: (f64, f64), b: (f64, f64), value: f64) {
    let cell = raster.cell_size();
    if cell <= 0.0 {
        return;
    }
    let length = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
    let steps = ((length / (cell * 0.5)).ceil() as usize).max(1);
    for i in 0..=steps {
        let t = i as f64 / steps as f64;
        burn_point(
            raster,
            a.0 + t * (b.0 - a.0),
            a.1 + t * (b.1 - a.1),
            value,
        );
    }
}

fn burn_line_string(raster: &mut Raster<f64>, ls: &LineString<f64>, value: f64) {
    for seg in ls.lines() {
        burn_segment(raster, (seg.start.x, seg.start.y), (seg.end.x, seg.end.y), value);
    }
}

/// Even-odd scanline fill against cell centers
fn burn_polygon(raster: &mut Raster<f64>, polygon: &Polygon<f64>, value: f64) {
    let rows = raster.rows();
    let cols = raster.cols();
    let gt = *raster.transform();

    let rings: Vec<&LineString<f64>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors().iter())
        .collect();

    // Row range covered by the polygon's vertical extent
    let (min_y, max_y) = rings
        .iter()
        .flat_map(|r| r.0.iter())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
            (lo.min(c.y), hi.max(c.y))
        });
    if !min_y.is_finite() {
        return;
    }

    let mut crossings: Vec<f64> = Vec::new();
    for row in 0..rows {
        let (_, y) = gt.pixel_to_geo(0, row);
        if y < min_y || y > max_y {
            continue;
        }

        crossings.clear();
        for ring in &rings {
            for seg in ring.lines() {
                let (y1, y2) = (seg.start.y, seg.end.y);
                if (y1 <= y && y < y2) || (y2 <= y && y < y1) {
                    let t = (y - y1) / (y2 - y1);
                    crossings.push(seg.start.x + t * (seg.end.x - seg.start.x));
                }
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        for span in crossings.chunks_exact(2) {
            let (xa, xb) = (span[0], span[1]);
            // Cells whose center x lies inside [xa, xb)
            let (ca, _) = gt.geo_to_pixel(xa, y);
            let (cb, _) = gt.geo_to_pixel(xb, y);
            let start = (ca - 0.5).ceil().max(0.0) as usize;
            let end = (cb - 0.5).floor().min(cols as f64 - 1.0);
            if end < 0.0 {
                continue;
            }
            for col in start..=(end as usize) {
                unsafe { raster.set_unchecked(row, col, value) };
            }
        }
    }
}
