/*
This file is part of the Connectivity Preprocessing Toolkit
Copyright (C) 2025 the Connectivity Preprocessing Toolkit authors

The Connectivity Preprocessing Toolkit is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/

//! Normalizes the GeoJSON that comes back from osmtogeojson: keeps only the
//! geometry types a theme should contain, drops features above ground level
//! and lower-cases the property keys.

use serde_json::{Map, Value};

fn geometry_type(feature: &Value) -> &str {
    feature.get("geometry")
        .and_then(|g| g.get("type"))
        .and_then(|t| t.as_str())
        .unwrap_or("")
}

/// Ground level means no level property at all, an explicit null, or 0
fn is_ground_level(feature: &Value) -> bool {
    match feature.get("properties").and_then(|p| p.get("level")) {
        None | Some(Value::Null) => true,
        Some(level) => level.as_i64() == Some(0),
    }
}

fn keep_feature(theme: &str, feature: &Value) -> bool {
    match theme {
        //linear infrastructure: lines only, at ground level
        "roads" | "railways" | "waterways" => {
            let geometry_type = geometry_type(feature);
            let is_line = geometry_type == "LineString" || geometry_type == "MultiLineString";
            is_line && is_ground_level(feature)
        }
        //water surfaces: polygons only
        "waterbodies" => {
            let geometry_type = geometry_type(feature);
            geometry_type == "Polygon" || geometry_type == "MultiPolygon"
        }
        //anything else passes through untouched
        _ => true,
    }
}

fn lowercase_property_keys(feature: &mut Value) {
    let properties = match feature.get_mut("properties").and_then(|p| p.as_object_mut()) {
        Some(p) => p,
        None => return,
    };

    let lowered: Map<String, Value> = properties.iter()
        .map(|(key, value)| (key.to_lowercase(), value.clone()))
        .collect();

    *properties = lowered;
}

/// Filters a FeatureCollection in place.  Returns (feature count before,
/// feature count after).
pub fn filter_theme(theme: &str, geojson: &mut Value) -> (usize, usize) {
    let features = match geojson.get_mut("features").and_then(|f| f.as_array_mut()) {
        Some(f) => f,
        None => return (0, 0),
    };

    let before = features.len();

    features.retain(|feature| keep_feature(theme, feature));

    for feature in features.iter_mut() {
        lowercase_property_keys(feature);
    }

    let after = features.len();

    (before, after)
}

#[cfg(test)]
mod geojson_filter_tests {
    use super::*;
    use serde_json::json;

    fn collection(features: Vec<Value>) -> Value {
        json!({
            "type": "FeatureCollection",
            "features": features,
        })
    }

    fn feature(geometry_type: &str, properties: Value) -> Value {
        json!({
            "type": "Feature",
            "geometry": { "type": geometry_type, "coordinates": [] },
            "properties": properties,
        })
    }

    #[test]
    fn test_roads_keep_ground_level_lines() {
        let mut geojson = collection(vec![
            feature("LineString", json!({"highway": "primary"})),
            feature("MultiLineString", json!({"highway": "trunk", "level": null})),
            feature("LineString", json!({"highway": "primary", "level": 0})),
            //bridges and tunnels are not barriers at ground level
            feature("LineString", json!({"highway": "primary", "level": 1})),
            //nodes come along with the ways in the Overpass response
            feature("Point", json!({"highway": "crossing"})),
        ]);

        let (before, after) = filter_theme("roads", &mut geojson);

        assert_eq!(before, 5);
        assert_eq!(after, 3);
    }

    #[test]
    fn test_waterbodies_keep_polygons() {
        let mut geojson = collection(vec![
            feature("Polygon", json!({"natural": "water"})),
            feature("MultiPolygon", json!({"natural": "water"})),
            feature("LineString", json!({"waterway": "river"})),
        ]);

        let (before, after) = filter_theme("waterbodies", &mut geojson);

        assert_eq!(before, 3);
        assert_eq!(after, 2);
    }

    #[test]
    fn test_unknown_theme_keeps_everything() {
        let mut geojson = collection(vec![
            feature("Point", json!({})),
            feature("LineString", json!({})),
        ]);

        let (before, after) = filter_theme("landmarks", &mut geojson);

        assert_eq!(before, 2);
        assert_eq!(after, 2);
    }

    #[test]
    fn test_property_keys_are_lowercased() {
        let mut geojson = collection(vec![
            feature("LineString", json!({"HIGHWAY": "primary", "Width": "7.5"})),
        ]);

        filter_theme("roads", &mut geojson);

        let properties = &geojson["features"][0]["properties"];
        assert_eq!(properties["highway"], "primary");
        assert_eq!(properties["width"], "7.5");
        assert!(properties.get("HIGHWAY").is_none());
    }

    #[test]
    fn test_missing_features_array() {
        let mut geojson = json!({"type": "FeatureCollection"});
        assert_eq!(filter_theme("roads", &mut geojson), (0, 0));
    }
}
