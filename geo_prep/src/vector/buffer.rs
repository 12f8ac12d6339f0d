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

//! Buffers linear road/rail features into polygons, delegating the buffer
//! itself to ogr2ogr as an SQLite dialect expression.

use std::fs::remove_file;
use std::path::Path;

use anyhow::Result;
use log::info;

use crate::ext::ExternalCommand;

/// Full widths in meters, halved for buffering.  Applied when the feature
/// carries no usable `width` attribute.
pub const MOTORWAY_WIDTH: f64 = 30.0;
pub const PRIMARY_WIDTH: f64 = 20.0;
pub const DEFAULT_WIDTH: f64 = 10.0;

/// Half width for a linear feature: its own width when present, otherwise a
/// highway class default.
pub fn half_width_for_highway(highway: Option<&str>, width: Option<f64>) -> f64 {
    if let Some(width) = width {
        return width / 2.0;
    }

    match highway {
        Some("motorway") | Some("motorway_link") | Some("trunk") | Some("trunk_link") =>
            MOTORWAY_WIDTH / 2.0,
        Some("primary") | Some("primary_link") | Some("secondary") | Some("secondary_link") =>
            PRIMARY_WIDTH / 2.0,
        _ => DEFAULT_WIDTH / 2.0,
    }
}

/// The SQL mirror of half_width_for_highway, evaluated per feature by the
/// SQLite dialect.
pub fn buffer_width_expression() -> String {
    format!(r#"
            CASE
                WHEN "width" IS NULL OR CAST("width" AS REAL) IS NULL THEN
                    CASE
                        WHEN highway IN ('motorway', 'motorway_link', 'trunk', 'trunk_link') THEN {}/2
                        WHEN highway IN ('primary', 'primary_link', 'secondary', 'secondary_link') THEN {}/2
                        ELSE {}/2
                    END
                ELSE CAST("width" AS REAL)/2
            END
        "#, MOTORWAY_WIDTH as i64, PRIMARY_WIDTH as i64, DEFAULT_WIDTH as i64)
}

/// The buffered-geometry select list.  A geographic source CRS takes a round
/// trip through a metric CRS so the buffer distance stays in meters.
pub fn buffer_geometry_expression(source_epsg: i32, is_cartesian: bool, metric_epsg: i32) -> String {
    let subquery = buffer_width_expression();

    if !is_cartesian {
        format!(r#"
                ST_Transform(
                    ST_Buffer(
                        ST_Transform(geom, {metric_epsg}),
                        {subquery}
                    ),
                    {source_epsg}
                ) AS geometry,
                *
            "#)
    } else {
        format!(" ST_Buffer(geom, {subquery}) AS geometry, * ")
    }
}

/// Buffers one layer of the input dataset into a polygon GeoPackage layer of
/// the same name.
pub fn buffer_features(input: &Path, output: &Path, layer: &str,
                       source_epsg: i32, is_cartesian: bool, metric_epsg: i32) -> Result<()> {
    if output.exists() {
        remove_file(output)?;
    }

    let query = buffer_geometry_expression(source_epsg, is_cartesian, metric_epsg);

    info!("Buffering {} layer...", layer);

    ExternalCommand::new("ogr2ogr")
        .args(["-f", "GPKG"])
        .arg_path(output)
        .arg_path(input)
        .args(["-dialect", "SQLite"])
        .args(["-sql", &format!("SELECT {} FROM {};", query, layer)])
        // define layer in the output file
        .args(["-nln", layer])
        // ensure the output is a polygon
        .args(["-nlt", "POLYGON"])
        .run()?;

    info!("Successfully buffered {} layer and saved to {:?}.", layer, output);

    Ok(())
}

#[cfg(test)]
mod buffer_tests {
    use super::*;

    #[test]
    fn test_half_width_fallbacks() {
        assert_eq!(half_width_for_highway(Some("motorway"), None), 15.0);
        assert_eq!(half_width_for_highway(Some("trunk_link"), None), 15.0);
        assert_eq!(half_width_for_highway(Some("primary"), None), 10.0);
        assert_eq!(half_width_for_highway(Some("secondary_link"), None), 10.0);
        assert_eq!(half_width_for_highway(Some("tertiary"), None), 5.0);
        assert_eq!(half_width_for_highway(None, None), 5.0);
    }

    #[test]
    fn test_explicit_width_wins() {
        assert_eq!(half_width_for_highway(Some("motorway"), Some(8.0)), 4.0);
        assert_eq!(half_width_for_highway(None, Some(7.0)), 3.5);
    }

    #[test]
    fn test_width_expression_contains_fallbacks() {
        let sql = buffer_width_expression();

        assert!(sql.contains("THEN 30/2"));
        assert!(sql.contains("THEN 20/2"));
        assert!(sql.contains("ELSE 10/2"));
        assert!(sql.contains(r#"CAST("width" AS REAL)/2"#));
    }

    #[test]
    fn test_geographic_source_round_trips() {
        let sql = buffer_geometry_expression(4326, false, 27700);

        assert!(sql.contains("ST_Transform(geom, 27700)"));
        assert!(sql.contains("4326"));

        //a cartesian source buffers in place
        let sql = buffer_geometry_expression(3035, true, 27700);
        assert!(sql.contains("ST_Buffer(geom,"));
        assert!(!sql.contains("ST_Transform"));
    }
}
