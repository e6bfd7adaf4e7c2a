//! Polygon sanitization against the stream network
//!
//! The raw polygonizer output is noisy: slivers along the raster grid,
//! near-touching fragments, and detached patches with no channel
//! through them. Sanitization buffers every raw polygon, unions the
//! overlapping results into merged candidates, keeps only candidates
//! that intersect the stream network, and tags survivors with their
//! threshold label. Each threshold label is sanitized independently, so
//! threshold runs can execute in any order.

use crate::buffer::buffer_geometry;
use geo::{BooleanOps, Intersects};
use geo_types::{Geometry, MultiPolygon};
use riparia_core::vector::{AttributeValue, Feature, FeatureCollection};
use riparia_core::Result;
use tracing::{debug, info};

/// Attribute carrying the threshold label on sanitized features
pub const THRESHOLD_ATTRIBUTE: &str = "threshold";

/// Buffer, merge and trim raw threshold polygons against the network.
pub fn sanitize(
    threshold_label: &str,
    raw: &FeatureCollection,
    buffer_distance: f64,
    network: &FeatureCollection,
) -> Result<FeatureCollection> {
    let mut merged = MultiPolygon::new(Vec::new());
    for feature in raw.iter() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let buffered = buffer_geometry(geometry, buffer_distance);
        if buffered.0.is_empty() {
            continue;
        }
        merged = if merged.0.is_empty() {
            buffered
        } else {
            merged.union(&buffered)
        };
    }
    debug!(
        label = threshold_label,
        raw = raw.len(),
        merged = merged.0.len(),
        "polygons buffered and merged"
    );

    let touches_network = |polygon: &geo_types::Polygon<f64>| {
        network.iter().any(|feature| {
            feature
                .geometry
                .as_ref()
                .is_some_and(|geometry| geometry.intersects(polygon))
        })
    };

    let mut output = FeatureCollection::new();
    for polygon in merged {
        if !touches_network(&polygon) {
            continue;
        }
        let mut feature = Feature::new(Geometry::Polygon(polygon));
        feature.set_property(
            THRESHOLD_ATTRIBUTE,
            AttributeValue::String(threshold_label.to_string()),
        );
        output.push(feature);
    }

    info!(
        label = threshold_label,
        kept = output.len(),
        "threshold layer sanitized"
    );
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, LineString};

    fn square(x: f64, y: f64, size: f64) -> Feature {
        Feature::new(Geometry::Polygon(polygon![
            (x: x, y: y),
            (x: x + size, y: y),
            (x: x + size, y: y + size),
            (x: x, y: y + size),
            (x: x, y: y),
        ]))
    }

    fn channel(points: Vec<(f64, f64)>) -> FeatureCollection {
        let mut fc = FeatureCollection::new();
        fc.push(Feature::new(Geometry::LineString(LineString::from(points))));
        fc
    }

    #[test]
    fn test_detached_polygon_is_dropped() {
        let mut raw = FeatureCollection::new();
        raw.push(square(0.0, 0.0, 10.0)); // On the channel
        raw.push(square(100.0, 100.0, 10.0)); // Far away

        let network = channel(vec![(0.0, 5.0), (20.0, 5.0)]);
        let out = sanitize("50", &raw, 1.0, &network).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_near_fragments_merge_into_one() {
        let mut raw = FeatureCollection::new();
        raw.push(square(0.0, 0.0, 10.0));
        raw.push(square(11.0, 0.0, 10.0)); // 1 unit gap, closed by the buffer

        let network = channel(vec![(0.0, 5.0), (25.0, 5.0)]);
        let out = sanitize("50", &raw, 1.0, &network).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_survivors_carry_the_threshold_label() {
        let mut raw = FeatureCollection::new();
        raw.push(square(0.0, 0.0, 10.0));

        let network = channel(vec![(0.0, 5.0), (20.0, 5.0)]);
        let out = sanitize("80", &raw, 0.5, &network).unwrap();
        assert_eq!(out.len(), 1);
        match out.features[0].get_property(THRESHOLD_ATTRIBUTE) {
            Some(AttributeValue::String(label)) => assert_eq!(label, "80"),
            other => panic!("expected threshold label, got {:?}", other),
        }
    }

    #[test]
    fn test_labels_are_independent() {
        let mut raw = FeatureCollection::new();
        raw.push(square(0.0, 0.0, 10.0));
        let network = channel(vec![(0.0, 5.0), (20.0, 5.0)]);

        let a = sanitize("50", &raw, 1.0, &network).unwrap();
        let b = sanitize("90", &raw, 1.0, &network).unwrap();
        assert_eq!(a.len(), b.len());
    }

    #[test]
    fn test_empty_input_yields_empty_layer() {
        let raw = FeatureCollection::new();
        let network = channel(vec![(0.0, 0.0), (1.0, 0.0)]);
        let out = sanitize("50", &raw, 1.0, &network).unwrap();
        assert!(out.is_empty());
    }
}
