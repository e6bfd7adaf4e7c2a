//! Drainage-area zone classification
//!
//! Burns each feature's zone id onto the reference grid, where the zone
//! id is derived from the feature's drainage-area attribute against the
//! criterion's ordered zone boundaries. Cells covered by no feature get
//! the i32 nodata sentinel; the compositor's choose-by-zone step clips
//! those to zone 0.

use crate::rasterize::burn_geometry;
use riparia_core::raster::{GridSpec, Raster, RasterElement};
use riparia_core::vector::FeatureCollection;
use riparia_core::{Error, Result};

/// Classify features into drainage-area zones and burn the zone ids
/// onto the reference grid.
///
/// Zone rule: a feature with attribute value v gets the smallest zone i
/// with `v <= boundaries[i]`; values above every boundary land in the
/// last zone. Features missing the attribute are an error, not a guess.
pub fn classify_zones(
    features: &FeatureCollection,
    zone_field: &str,
    boundaries: &[f64],
    grid: &GridSpec,
) -> Result<Raster<i32>> {
    if boundaries.is_empty() {
        return Err(Error::Configuration(
            "zone classification needs at least one boundary".to_string(),
        ));
    }
    for pair in boundaries.windows(2) {
        if pair[1] <= pair[0] {
            return Err(Error::Configuration(format!(
                "zone boundaries must be strictly increasing ({} then {})",
                pair[0], pair[1]
            )));
        }
    }

    let mut burned = Raster::filled(grid.rows, grid.cols, f64::NAN);
    burned.set_transform(grid.transform);

    for (idx, feature) in features.iter().enumerate() {
        let Some(geometry) = &feature.geometry else {
            continue;
        };
        let value = feature.number(zone_field).ok_or_else(|| Error::InvalidParameter {
            name: "zone_field",
            value: zone_field.to_string(),
            reason: format!("feature {} has no numeric attribute '{}'", idx, zone_field),
        })?;
        let zone = zone_index(value, boundaries);
        burn_geometry(&mut burned, geometry, zone as f64);
    }

    let mut zones = Raster::filled(grid.rows, grid.cols, i32::default_nodata());
    zones.set_transform(grid.transform);
    zones.set_nodata(Some(i32::default_nodata()));
    for row in 0..grid.rows {
        for col in 0..grid.cols {
            let v = unsafe { burned.get_unchecked(row, col) };
            if !v.is_nan() {
                unsafe { zones.set_unchecked(row, col, v as i32) };
            }
        }
    }

    Ok(zones)
}

/// Smallest zone whose upper bound admits the value
pub fn zone_index(value: f64, boundaries: &[f64]) -> usize {
    boundaries
        .iter()
        .position(|&upper| value <= upper)
        .unwrap_or(boundaries.len() - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, Geometry};
    use riparia_core::raster::GeoTransform;
    use riparia_core::vector::{AttributeValue, Feature};

    fn grid_4x4() -> GridSpec {
        GridSpec::new(4, 4, GeoTransform::new(0.0, 4.0, 1.0, -1.0))
    }

    fn area_feature(poly: geo_types::Polygon<f64>, drain_area: f64) -> Feature {
        let mut f = Feature::new(Geometry::Polygon(poly));
        f.set_property("DrainArea", AttributeValue::Float(drain_area));
        f
    }

    #[test]
    fn test_zone_index_rule() {
        let bounds = [25.0, 250.0, f64::INFINITY];
        assert_eq!(zone_index(1.0, &bounds), 0);
        assert_eq!(zone_index(25.0, &bounds), 0);
        assert_eq!(zone_index(26.0, &bounds), 1);
        assert_eq!(zone_index(1e6, &bounds), 2);
    }

    #[test]
    fn test_last_zone_catches_values_above_all_bounds() {
        // Finite last bound: overflow still lands in the last zone
        assert_eq!(zone_index(500.0, &[25.0, 250.0]), 1);
    }

    #[test]
    fn test_classify_burns_zone_ids_and_sentinel() {
        // Left half small drainage (zone 0), right half large (zone 1),
        // bottom row uncovered
        let left = area_feature(
            polygon![(x: 0.0, y: 1.0), (x: 2.0, y: 1.0), (x: 2.0, y: 4.0), (x: 0.0, y: 4.0)],
            10.0,
        );
        let right = area_feature(
            polygon![(x: 2.0, y: 1.0), (x: 4.0, y: 1.0), (x: 4.0, y: 4.0), (x: 2.0, y: 4.0)],
            400.0,
        );
        let mut fc = FeatureCollection::new();
        fc.push(left);
        fc.push(right);

        let zones =
            classify_zones(&fc, "DrainArea", &[25.0, f64::INFINITY], &grid_4x4()).unwrap();

        assert_eq!(zones.get(0, 0).unwrap(), 0);
        assert_eq!(zones.get(0, 1).unwrap(), 0);
        assert_eq!(zones.get(0, 2).unwrap(), 1);
        assert_eq!(zones.get(0, 3).unwrap(), 1);
        // Bottom row (map y 0..1) uncovered → sentinel
        let sentinel = zones.get(3, 0).unwrap();
        assert!(zones.is_nodata(sentinel));
    }

    #[test]
    fn test_missing_attribute_is_an_error() {
        let mut fc = FeatureCollection::new();
        fc.push(Feature::new(Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0)
        ])));
        assert!(classify_zones(&fc, "DrainArea", &[25.0], &grid_4x4()).is_err());
    }

    #[test]
    fn test_bad_boundaries_rejected() {
        let fc = FeatureCollection::new();
        assert!(classify_zones(&fc, "DrainArea", &[], &grid_4x4()).is_err());
        assert!(classify_zones(&fc, "DrainArea", &[10.0, 5.0], &grid_4x4()).is_err());
    }
}
