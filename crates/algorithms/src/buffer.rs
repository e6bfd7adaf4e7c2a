//! Geometry buffering
//!
//! Planar buffers built from primitive shapes: a disc per vertex and a
//! rectangle per segment, unioned into one polygon set. Lines grow into
//! corridors, polygons expand outward by the radius, points become
//! discs.
//!
//! `buffer_by_field` is the network use: each channel line is buffered
//! by half its bankfull-width attribute, floored at a minimum radius so
//! narrow channels still rasterize.

use geo::BooleanOps;
use geo_types::{Coord, Geometry, LineString, MultiPolygon, Polygon};
use riparia_core::vector::{Feature, FeatureCollection};
use riparia_core::{Error, Result};
use std::f64::consts::PI;
use tracing::warn;

/// Segments used to approximate a quarter circle arc
const DISC_SEGMENTS: usize = 16;

/// Circular buffer polygon around one vertex
fn disc(center: Coord<f64>, radius: f64) -> Polygon<f64> {
    let mut coords = Vec::with_capacity(DISC_SEGMENTS + 1);
    for i in 0..DISC_SEGMENTS {
        let angle = 2.0 * PI * i as f64 / DISC_SEGMENTS as f64;
        coords.push((
            center.x + radius * angle.cos(),
            center.y + radius * angle.sin(),
        ));
    }
    coords.push(coords[0]);
    Polygon::new(LineString::from(coords), vec![])
}

/// Rectangle covering one segment offset by the radius on both sides
fn segment_rectangle(a: Coord<f64>, b: Coord<f64>, radius: f64) -> Option<Polygon<f64>> {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return None;
    }
    // Unit normal
    let nx = -dy / len * radius;
    let ny = dx / len * radius;
    Some(Polygon::new(
        LineString::from(vec![
            (a.x + nx, a.y + ny),
            (b.x + nx, b.y + ny),
            (b.x - nx, b.y - ny),
            (a.x - nx, a.y - ny),
            (a.x + nx, a.y + ny),
        ]),
        vec![],
    ))
}

fn union_into(acc: MultiPolygon<f64>, polygon: Polygon<f64>) -> MultiPolygon<f64> {
    let addition = MultiPolygon::new(vec![polygon]);
    if acc.0.is_empty() {
        addition
    } else {
        acc.union(&addition)
    }
}

/// Buffer one line string into a corridor polygon set
fn buffer_line(line: &LineString<f64>, radius: f64) -> MultiPolygon<f64> {
    let mut acc = MultiPolygon::new(Vec::new());
    for segment in line.lines() {
        if let Some(rect) = segment_rectangle(segment.start, segment.end, radius) {
            acc = union_into(acc, rect);
        }
    }
    for &coord in &line.0 {
        acc = union_into(acc, disc(coord, radius));
    }
    acc
}

/// Expand a polygon outward by the radius
fn buffer_polygon(polygon: &Polygon<f64>, radius: f64) -> MultiPolygon<f64> {
    let mut acc = MultiPolygon::new(vec![polygon.clone()]);
    let rim = buffer_line(polygon.exterior(), radius);
    acc = acc.union(&rim);
    for interior in polygon.interiors() {
        acc = acc.union(&buffer_line(interior, radius));
    }
    acc
}

/// Buffer any supported geometry by `radius` map units.
///
/// A non-positive radius returns polygonal geometry unchanged and
/// collapses points and lines to nothing.
pub fn buffer_geometry(geometry: &Geometry<f64>, radius: f64) -> MultiPolygon<f64> {
    if radius <= 0.0 {
        return match geometry {
            Geometry::Polygon(p) => MultiPolygon::new(vec![p.clone()]),
            Geometry::MultiPolygon(mp) => mp.clone(),
            _ => MultiPolygon::new(Vec::new()),
        };
    }

    match geometry {
        Geometry::Point(p) => MultiPolygon::new(vec![disc(p.0, radius)]),
        Geometry::MultiPoint(points) => points
            .iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, p| {
                union_into(acc, disc(p.0, radius))
            }),
        Geometry::Line(line) => {
            buffer_line(&LineString::from(vec![line.start, line.end]), radius)
        }
        Geometry::LineString(line) => buffer_line(line, radius),
        Geometry::MultiLineString(lines) => lines
            .iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, line| {
                let buffered = buffer_line(line, radius);
                if acc.0.is_empty() {
                    buffered
                } else {
                    acc.union(&buffered)
                }
            }),
        Geometry::Polygon(polygon) => buffer_polygon(polygon, radius),
        Geometry::MultiPolygon(polygons) => polygons
            .iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, polygon| {
                let buffered = buffer_polygon(polygon, radius);
                if acc.0.is_empty() {
                    buffered
                } else {
                    acc.union(&buffered)
                }
            }),
        Geometry::GeometryCollection(collection) => collection
            .iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, geometry| {
                let buffered = buffer_geometry(geometry, radius);
                if acc.0.is_empty() {
                    buffered
                } else {
                    acc.union(&buffered)
                }
            }),
        Geometry::Rect(rect) => buffer_polygon(&rect.to_polygon(), radius),
        Geometry::Triangle(triangle) => buffer_polygon(&triangle.to_polygon(), radius),
    }
}

/// Buffer each network feature by half its numeric width attribute.
///
/// Features missing the attribute fall back to the minimum radius.
/// Output features keep their source properties, with the geometry
/// replaced by the buffered polygon set.
pub fn buffer_by_field(
    features: &FeatureCollection,
    field: &str,
    min_radius: f64,
) -> Result<FeatureCollection> {
    if !(min_radius > 0.0) {
        return Err(Error::InvalidParameter {
            name: "min_radius",
            value: min_radius.to_string(),
            reason: "minimum buffer radius must be positive".to_string(),
        });
    }

    let mut output = FeatureCollection::new();
    for (index, feature) in features.iter().enumerate() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };

        let radius = match feature.number(field) {
            Some(width) if width.is_finite() && width > 0.0 => (width / 2.0).max(min_radius),
            _ => {
                warn!(feature = index, field, "missing width attribute, using minimum buffer");
                min_radius
            }
        };

        let buffered = buffer_geometry(geometry, radius);
        if buffered.0.is_empty() {
            continue;
        }

        let mut out = feature.clone();
        out.geometry = Some(Geometry::MultiPolygon(buffered));
        output.push(out);
    }

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{Area, Contains, Point};
    use riparia_core::vector::AttributeValue;

    #[test]
    fn test_point_buffer_is_a_disc() {
        let buffered = buffer_geometry(&Geometry::Point(Point::new(0.0, 0.0)), 10.0);
        let area = buffered.unsigned_area();
        let expected = PI * 100.0;
        assert!((area - expected).abs() / expected < 0.05, "area {}", area);
    }

    #[test]
    fn test_line_buffer_covers_the_corridor() {
        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (10.0, 0.0)]));
        let buffered = buffer_geometry(&line, 2.0);
        assert!(buffered.contains(&Point::new(5.0, 1.5)));
        assert!(buffered.contains(&Point::new(-1.0, 0.0)));
        assert!(!buffered.contains(&Point::new(5.0, 3.0)));
    }

    #[test]
    fn test_polygon_buffer_expands_outward() {
        let square = Geometry::Polygon(Polygon::new(
            LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]),
            vec![],
        ));
        let buffered = buffer_geometry(&square, 1.0);
        assert!(buffered.contains(&Point::new(2.0, 2.0)));
        assert!(buffered.contains(&Point::new(4.5, 2.0)));
        assert!(!buffered.contains(&Point::new(6.0, 2.0)));
    }

    #[test]
    fn test_zero_radius_keeps_polygons_and_drops_lines() {
        let square = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 0.0)]),
            vec![],
        );
        let kept = buffer_geometry(&Geometry::Polygon(square), 0.0);
        assert_eq!(kept.0.len(), 1);

        let line = Geometry::LineString(LineString::from(vec![(0.0, 0.0), (1.0, 0.0)]));
        assert!(buffer_geometry(&line, 0.0).0.is_empty());
    }

    #[test]
    fn test_buffer_by_field_uses_half_width_with_floor() {
        let mut fc = FeatureCollection::new();
        let mut wide = Feature::new(Geometry::LineString(LineString::from(vec![
            (0.0, 0.0),
            (100.0, 0.0),
        ])));
        wide.set_property("BFwidth", AttributeValue::Float(20.0));
        fc.push(wide);
        let mut narrow = Feature::new(Geometry::LineString(LineString::from(vec![
            (0.0, 50.0),
            (100.0, 50.0),
        ])));
        narrow.set_property("BFwidth", AttributeValue::Float(0.5));
        fc.push(narrow);

        let buffered = buffer_by_field(&fc, "BFwidth", 2.0).unwrap();
        assert_eq!(buffered.len(), 2);

        let corridor = |f: &Feature| match f.geometry.as_ref().unwrap() {
            Geometry::MultiPolygon(mp) => mp.clone(),
            other => panic!("expected multipolygon, got {:?}", other),
        };
        // Half of 20 is a 10 m radius
        assert!(corridor(&buffered.features[0]).contains(&Point::new(50.0, 9.0)));
        // Half of 0.5 floors to the 2 m minimum
        assert!(corridor(&buffered.features[1]).contains(&Point::new(50.0, 51.5)));
        assert!(!corridor(&buffered.features[1]).contains(&Point::new(50.0, 53.0)));
    }

    #[test]
    fn test_buffer_by_field_missing_attribute_falls_back() {
        let mut fc = FeatureCollection::new();
        fc.push(Feature::new(Geometry::LineString(LineString::from(vec![
            (0.0, 0.0),
            (10.0, 0.0),
        ]))));
        let buffered = buffer_by_field(&fc, "BFwidth", 1.0).unwrap();
        assert_eq!(buffered.len(), 1);
    }

    #[test]
    fn test_non_positive_minimum_rejected() {
        let fc = FeatureCollection::new();
        assert!(buffer_by_field(&fc, "BFwidth", 0.0).is_err());
    }
}
