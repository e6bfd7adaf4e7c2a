//! GeoJSON reading/writing for feature collections
//!
//! Covers the simple-feature subset the pipeline exchanges: Point,
//! LineString, Polygon and their Multi* counterparts, with scalar
//! properties. Coordinates are written as [x, y].

use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geo_types::{
    Coord, Geometry, LineString, MultiLineString, MultiPoint, MultiPolygon, Point, Polygon,
};
use serde_json::{json, Map, Value};
use std::fs;
use std::path::Path;

/// Read a GeoJSON FeatureCollection from a file
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let text = fs::read_to_string(path.as_ref())?;
    parse_collection(&text)
}

/// Write a FeatureCollection to a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let value = collection_value(collection)?;
    let text = serde_json::to_string_pretty(&value)
        .map_err(|e| Error::Other(format!("GeoJSON encode error: {}", e)))?;
    fs::write(path.as_ref(), text)?;
    Ok(())
}

fn parse_collection(text: &str) -> Result<FeatureCollection> {
    let root: Value = serde_json::from_str(text)
        .map_err(|e| Error::Other(format!("GeoJSON parse error: {}", e)))?;

    if root.get("type").and_then(Value::as_str) != Some("FeatureCollection") {
        return Err(Error::Other(
            "GeoJSON root must be a FeatureCollection".to_string(),
        ));
    }

    let features = root
        .get("features")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Other("FeatureCollection has no features array".to_string()))?;

    let mut collection = FeatureCollection::new();
    for value in features {
        collection.push(parse_feature(value)?);
    }
    Ok(collection)
}

fn parse_feature(value: &Value) -> Result<Feature> {
    let geometry = match value.get("geometry") {
        None | Some(Value::Null) => None,
        Some(geom) => Some(parse_geometry(geom)?),
    };

    let mut feature = match geometry {
        Some(g) => Feature::new(g),
        None => Feature::empty(),
    };

    if let Some(props) = value.get("properties").and_then(Value::as_object) {
        for (key, val) in props {
            feature.set_property(key.clone(), json_to_attribute(val));
        }
    }

    feature.id = match value.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    Ok(feature)
}

fn parse_geometry(value: &Value) -> Result<Geometry<f64>> {
    let geom_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Other("geometry has no type".to_string()))?;
    let coords = value
        .get("coordinates")
        .ok_or_else(|| Error::Other(format!("{} has no coordinates", geom_type)))?;

    match geom_type {
        "Point" => Ok(Geometry::Point(Point::from(parse_coord(coords)?))),
        "MultiPoint" => {
            let points = parse_coord_array(coords)?
                .into_iter()
                .map(Point::from)
                .collect::<Vec<_>>();
            Ok(Geometry::MultiPoint(MultiPoint::new(points)))
        }
        "LineString" => Ok(Geometry::LineString(LineString::new(parse_coord_array(
            coords,
        )?))),
        "MultiLineString" => {
            let lines = as_array(coords)?
                .iter()
                .map(|ls| Ok(LineString::new(parse_coord_array(ls)?)))
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        "Polygon" => Ok(Geometry::Polygon(parse_polygon(coords)?)),
        "MultiPolygon" => {
            let polys = as_array(coords)?
                .iter()
                .map(parse_polygon)
                .collect::<Result<Vec<_>>>()?;
            Ok(Geometry::MultiPolygon(MultiPolygon::new(polys)))
        }
        other => Err(Error::UnsupportedDataType(format!(
            "GeoJSON geometry type '{}'",
            other
        ))),
    }
}

fn parse_polygon(value: &Value) -> Result<Polygon<f64>> {
    let rings = as_array(value)?;
    if rings.is_empty() {
        return Err(Error::Other("polygon has no rings".to_string()));
    }
    let exterior = LineString::new(parse_coord_array(&rings[0])?);
    let interiors = rings[1..]
        .iter()
        .map(|r| Ok(LineString::new(parse_coord_array(r)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_coord(value: &Value) -> Result<Coord<f64>> {
    let parts = as_array(value)?;
    if parts.len() < 2 {
        return Err(Error::Other("coordinate needs at least [x, y]".to_string()));
    }
    let x = parts[0]
        .as_f64()
        .ok_or_else(|| Error::Other("non-numeric coordinate".to_string()))?;
    let y = parts[1]
        .as_f64()
        .ok_or_else(|| Error::Other("non-numeric coordinate".to_string()))?;
    Ok(Coord { x, y })
}

fn parse_coord_array(value: &Value) -> Result<Vec<Coord<f64>>> {
    as_array(value)?.iter().map(parse_coord).collect()
}

fn as_array(value: &Value) -> Result<&Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::Other("expected JSON array".to_string()))
}

fn json_to_attribute(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null,
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                AttributeValue::Int(i)
            } else {
                AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

fn attribute_to_json(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Null => Value::Null,
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Int(i) => json!(i),
        AttributeValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        AttributeValue::String(s) => Value::String(s.clone()),
    }
}

fn collection_value(collection: &FeatureCollection) -> Result<Value> {
    let features = collection
        .iter()
        .map(feature_value)
        .collect::<Result<Vec<_>>>()?;
    Ok(json!({
        "type": "FeatureCollection",
        "features": features,
    }))
}

fn feature_value(feature: &Feature) -> Result<Value> {
    let geometry = match &feature.geometry {
        Some(g) => geometry_value(g)?,
        None => Value::Null,
    };

    let mut properties = Map::new();
    let mut keys: Vec<&String> = feature.properties.keys().collect();
    keys.sort();
    for key in keys {
        properties.insert(key.clone(), attribute_to_json(&feature.properties[key]));
    }

    let mut obj = Map::new();
    obj.insert("type".to_string(), json!("Feature"));
    obj.insert("geometry".to_string(), geometry);
    obj.insert("properties".to_string(), Value::Object(properties));
    if let Some(id) = &feature.id {
        obj.insert("id".to_string(), json!(id));
    }
    Ok(Value::Object(obj))
}

fn geometry_value(geometry: &Geometry<f64>) -> Result<Value> {
    match geometry {
        Geometry::Point(p) => Ok(json!({
            "type": "Point",
            "coordinates": coord_value(p.0),
        })),
        Geometry::MultiPoint(mp) => Ok(json!({
            "type": "MultiPoint",
            "coordinates": mp.0.iter().map(|p| coord_value(p.0)).collect::<Vec<_>>(),
        })),
        Geometry::LineString(ls) => Ok(json!({
            "type": "LineString",
            "coordinates": line_value(ls),
        })),
        Geometry::MultiLineString(mls) => Ok(json!({
            "type": "MultiLineString",
            "coordinates": mls.0.iter().map(line_value).collect::<Vec<_>>(),
        })),
        Geometry::Polygon(p) => Ok(json!({
            "type": "Polygon",
            "coordinates": polygon_value(p),
        })),
        Geometry::MultiPolygon(mp) => Ok(json!({
            "type": "MultiPolygon",
            "coordinates": mp.0.iter().map(polygon_value).collect::<Vec<_>>(),
        })),
        other => Err(Error::UnsupportedDataType(format!(
            "cannot encode geometry {:?} as GeoJSON",
            other
        ))),
    }
}

fn coord_value(c: Coord<f64>) -> Value {
    json!([c.x, c.y])
}

fn line_value(ls: &LineString<f64>) -> Value {
    Value::Array(ls.coords().map(|c| coord_value(*c)).collect())
}

fn polygon_value(p: &Polygon<f64>) -> Value {
    let mut rings = vec![line_value(p.exterior())];
    rings.extend(p.interiors().iter().map(line_value));
    Value::Array(rings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    #[test]
    fn test_roundtrip_polygon_with_properties() {
        let mut feature = Feature::new(Geometry::Polygon(polygon![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ]));
        feature.set_property("ThresholdValue", AttributeValue::Float(0.8));
        feature.set_property("label", AttributeValue::String("80".into()));

        let mut collection = FeatureCollection::new();
        collection.push(feature);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.geojson");
        write_geojson(&collection, &path).unwrap();
        let back = read_geojson(&path).unwrap();

        assert_eq!(back.len(), 1);
        let f = &back.features[0];
        assert_eq!(f.number("ThresholdValue"), Some(0.8));
        assert_eq!(
            f.get_property("label"),
            Some(&AttributeValue::String("80".into()))
        );
        match &f.geometry {
            Some(Geometry::Polygon(p)) => {
                assert_eq!(p.exterior().coords().count(), 5);
            }
            other => panic!("expected polygon, got {:?}", other),
        }
    }

    #[test]
    fn test_line_network_parse() {
        let text = r#"{
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[0, 0], [5, 5], [9, 5]]},
                "properties": {"DrainArea": 42, "BFwidth": 3.5}
            }]
        }"#;
        let collection = parse_collection(text).unwrap();
        let f = &collection.features[0];
        assert_eq!(f.number("DrainArea"), Some(42.0));
        assert_eq!(f.number("BFwidth"), Some(3.5));
        assert!(matches!(f.geometry, Some(Geometry::LineString(_))));
    }

    #[test]
    fn test_rejects_non_collection_root() {
        assert!(parse_collection(r#"{"type": "Feature"}"#).is_err());
    }
}
