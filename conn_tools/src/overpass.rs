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

//! Overpass QL query construction and the blocking Overpass client.

use std::time::Duration;

use anyhow::{bail, Result};
use gdal::spatial_ref::{AxisMappingStrategy, CoordTransform, SpatialRef};

use geo_prep::raster::RasterStats;

//1 GB response cap and the server side timeout embedded in every query
const OVERPASS_MAX_SIZE: u64 = 1073741824;
const OVERPASS_TIMEOUT_SECS: u64 = 9000;

/// Theme order also fixes the merge order of the per-theme GeoPackages
pub const OSM_THEMES: [&str; 4] = ["roads", "railways", "waterways", "waterbodies"];

fn query_header(year: i32, bbox: &str) -> String {
    format!("[out:json]\n[maxsize:{}]\n[timeout:{}]\n[date:\"{}-12-31T23:59:59Z\"]\n[bbox:{}];",
            OVERPASS_MAX_SIZE, OVERPASS_TIMEOUT_SECS, year, bbox)
}

/// One Overpass QL query per stressor theme, point-in-time at the end of the
/// requested year.
pub fn build_queries(year: i32, bbox: &str) -> Vec<(String, String)> {
    let header = query_header(year, bbox);

    // 'residential' roads are skipped, those areas are already urban in the
    // LULC data.  The regex also catches 'motorway_link', 'trunk_link' etc.
    let query_roads = format!(r#"{header}
way["highway"~"(motorway|trunk|primary|secondary|tertiary)"];
(._;>;);
out body;
"#);

    // 'preserved' is included, some railways are tagged preserved at older
    // timestamps and rail at newer ones
    let query_railways = format!(r#"{header}
way["railway"~"(rail|light_rail|narrow_gauge|tram|preserved)"];
(._;>;);
out;
"#);

    // ^ and $ exclude 'riverbank' and 'derelict_canal'; the second line
    // catches older features missing the waterway tag
    let query_waterways = format!(r#"{header}
(
way["waterway"~"^(river|canal|flowline|tidal_channel)$"];
way["water"~"^(river|canal)$"];
);
(._;>;);
out;
"#);

    // nwr fetches nodes, ways and relations together so complete polygon
    // features come back; the extra filters catch deprecated tagging at older
    // timestamps
    let query_waterbodies = format!(r#"{header}
(
nwr["natural"="water"];
nwr["water"~"^(cenote|lagoon|lake|oxbow|rapids|river|stream|stream_pool|canal|harbour|pond|reservoir|wastewater|tidal|natural)$"];
nwr["landuse"="reservoir"];
nwr["waterway"="riverbank"];
);
(._;>;);
out;
"#);

    OSM_THEMES.iter()
        .map(|&theme| theme.to_string())
        .zip([query_roads, query_railways, query_waterways, query_waterbodies])
        .collect()
}

/// Overpass only accepts geographic coordinates, so the raster extent is
/// reprojected to WGS 84 and formatted south,west,north,east.
pub fn raster_bbox_wgs84(stats: &RasterStats) -> Result<String> {
    let mut source = stats.spatial_ref()?;
    source.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    let mut target = SpatialRef::from_epsg(4326)?;
    target.set_axis_mapping_strategy(AxisMappingStrategy::TraditionalGisOrder);

    let (xmin, xmax, ymin, ymax) = stats.extent();

    let mut xs = [xmin, xmax];
    let mut ys = [ymin, ymax];
    let mut zs = [0.0, 0.0];

    let transform = CoordTransform::new(&source, &target)?;
    transform.transform_coords(&mut xs, &mut ys, &mut zs)?;

    Ok(format!("{},{},{},{}", ys[0], xs[0], ys[1], xs[1]))
}

pub struct OverpassClient {
    url: String,
    client: reqwest::blocking::Client,
}

impl OverpassClient {
    pub fn new(url: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(OVERPASS_TIMEOUT_SECS))
            .build()?;

        Ok(OverpassClient {
            url: url.to_string(),
            client,
        })
    }

    pub fn fetch(&self, query: &str) -> Result<serde_json::Value> {
        let response = self.client.get(&self.url)
            .query(&[("data", query)])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            bail!("Overpass returned {}: {}", status,
                  response.text().unwrap_or_default());
        }

        Ok(response.json()?)
    }
}

#[cfg(test)]
mod overpass_tests {
    use super::*;
    use gdal::spatial_ref::SpatialRef;

    #[test]
    fn test_query_embeds_date_and_bbox() {
        let queries = build_queries(2018, "46.1,5.9,46.3,6.2");

        assert_eq!(queries.len(), OSM_THEMES.len());

        for ((theme, query), expected_theme) in queries.iter().zip(OSM_THEMES.iter()) {
            assert_eq!(theme, expected_theme);
            assert!(query.contains("[date:\"2018-12-31T23:59:59Z\"]"));
            assert!(query.contains("[bbox:46.1,5.9,46.3,6.2];"));
            assert!(query.contains("[maxsize:1073741824]"));
            assert!(query.contains("[timeout:9000]"));
        }
    }

    #[test]
    fn test_theme_filters() {
        let queries = build_queries(2020, "0,0,1,1");

        assert!(queries[0].1.contains(r#"way["highway"~"(motorway|trunk|primary|secondary|tertiary)"];"#));
        assert!(queries[1].1.contains(r#"way["railway"~"(rail|light_rail|narrow_gauge|tram|preserved)"];"#));
        assert!(queries[2].1.contains(r#"way["waterway"~"^(river|canal|flowline|tidal_channel)$"];"#));
        assert!(queries[3].1.contains(r#"nwr["natural"="water"];"#));
    }

    #[test]
    fn test_bbox_from_wgs84_raster_is_identity() {
        let srs = SpatialRef::from_epsg(4326).unwrap();

        let stats = RasterStats {
            origin_x: 5.9,
            origin_y: 46.3,
            pixel_width: 0.1,
            pixel_height: -0.1,
            num_rows: 2,
            num_cols: 3,
            no_data_value: -9999.0,
            projection: srs.to_wkt().unwrap(),
        };

        //south,west,north,east
        let bbox = raster_bbox_wgs84(&stats).unwrap();
        let parts: Vec<f64> = bbox.split(',').map(|p| p.parse().unwrap()).collect();

        assert!((parts[0] - 46.1).abs() < 1e-9);
        assert!((parts[1] - 5.9).abs() < 1e-9);
        assert!((parts[2] - 46.3).abs() < 1e-9);
        assert!((parts[3] - 6.2).abs() < 1e-9);
    }
}
