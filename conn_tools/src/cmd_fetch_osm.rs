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

//! Fetches the per-theme OSM extracts for the run year and merges them into
//! one GeoPackage under vector_dir: Overpass JSON -> osmtogeojson -> filtered
//! GeoJSON -> per-theme GeoPackage -> merged, geometry-repaired GeoPackage.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{error, info, warn};
use structopt::StructOpt;

use geo_prep::config::{expand_year, PipelineConfig};
use geo_prep::ext::ExternalCommand;
use geo_prep::raster::Raster;
use geo_prep::vector::{copy_to_gpkg_layer, fix_geometries, reproject_to_gpkg};

use crate::overpass::{build_queries, raster_bbox_wgs84, OverpassClient};
use crate::geojson_filter::filter_theme;

const OSM_TARGET_EPSG: i32 = 4326;

#[derive(StructOpt)]
pub struct FetchOsmArgs {

    #[structopt(long, default_value = "config.yaml", parse(from_os_str))]
    config: PathBuf,

    #[structopt(long, default_value = "https://overpass-api.de/api/interpreter")]
    overpass_url: String,

    #[structopt(long, help = "Reuse previously saved Overpass responses")]
    skip_fetch: bool,

    #[structopt(long, help = "Keep the intermediate GeoJSON/GeoPackage files")]
    keep_intermediate: bool,
}

pub fn fetch_osm(args: &FetchOsmArgs) -> Result<()> {
    let config = PipelineConfig::load(&args.config)?;
    let year = config.first_year()?;

    let osm_dir = PathBuf::from(config.osm_dir.as_deref()
        .context("`osm_dir` missing from config.yaml")?);
    let vector_dir = PathBuf::from(config.vector_dir.as_deref()
        .context("`vector_dir` missing from config.yaml")?);
    fs::create_dir_all(&osm_dir)?;
    fs::create_dir_all(&vector_dir)?;

    let lulc_dir = config.lulc_dir.as_deref()
        .context("`lulc_dir` missing from config.yaml")?;
    let lulc_template = config.lulc.as_deref()
        .context("`lulc` template missing from config.yaml")?;
    let lulc_path = Path::new(lulc_dir).join(expand_year(lulc_template, year));

    info!("Input raster to be used for processing is {:?}, {}.", lulc_path, year);

    let lulc = Raster::open(&lulc_path)?;
    let bbox = raster_bbox_wgs84(&lulc.stats)?;
    info!("Bounding box of the input raster (south,west,north,east): {}", bbox);

    let queries = build_queries(year, &bbox);

    fetch_themes(args, &queries, &osm_dir, year)?;
    convert_themes_to_geojson(&queries, &osm_dir, year);
    let filtered = filter_theme_geojsons(&queries, &osm_dir, year);

    let merged = merge_themes_to_gpkg(&filtered, &osm_dir, year)?;

    //final destination next to the other vector inputs
    let final_path = vector_dir.join(format!("osm_merged_{}.gpkg", year));
    if final_path.exists() {
        fs::remove_file(&final_path)?;
    }
    fs::copy(&merged, &final_path)?;

    let reports = fix_geometries(&final_path)?;
    for report in &reports {
        if report.needed_fix > 0 {
            info!("Layer '{}': {} fixed, {} unfixable",
                  report.layer_name, report.fixed, report.unfixable);
        }
    }

    if !args.keep_intermediate {
        delete_temp_files(&osm_dir, year)?;
    }

    info!("Merged OSM data written to {:?}", final_path);

    Ok(())
}

fn theme_json_path(osm_dir: &Path, theme: &str, year: i32) -> PathBuf {
    osm_dir.join(format!("{}_{}.json", theme, year))
}

fn theme_geojson_path(osm_dir: &Path, theme: &str, year: i32) -> PathBuf {
    osm_dir.join(format!("{}_{}.geojson", theme, year))
}

fn fetch_themes(args: &FetchOsmArgs, queries: &[(String, String)],
                osm_dir: &Path, year: i32) -> Result<()> {
    let client = OverpassClient::new(&args.overpass_url)?;

    for (theme, query) in queries {
        let json_path = theme_json_path(osm_dir, theme, year);

        if args.skip_fetch && json_path.exists() {
            info!("Reusing saved response {:?}", json_path);
            continue;
        }

        match client.fetch(query) {
            Ok(data) => {
                let elements = data.get("elements")
                    .and_then(|e| e.as_array())
                    .map(|e| e.len())
                    .unwrap_or(0);
                info!("Query to fetch OSM data for {} in the {} year has been successful.", theme, year);
                info!("Number of elements in {} in the {} year: {}", theme, year, elements);

                fs::write(&json_path, serde_json::to_string_pretty(&data)?)?;
                info!("Data has been saved to {:?}", json_path);
            }
            Err(e) => {
                //a failed theme does not abort the others
                error!("Query for {} in the {} year failed: {}", theme, year, e);
            }
        }
    }

    Ok(())
}

fn convert_themes_to_geojson(queries: &[(String, String)], osm_dir: &Path, year: i32) {
    for (theme, _) in queries {
        let json_path = theme_json_path(osm_dir, theme, year);
        if !json_path.exists() {
            continue;
        }

        let geojson_path = theme_geojson_path(osm_dir, theme, year);

        let result = ExternalCommand::new("osmtogeojson")
            .arg_path(&json_path)
            .run()
            .and_then(|output| Ok(fs::write(&geojson_path, output.stdout)?));

        if let Err(e) = result {
            error!("osmtogeojson failed for {}: {}", theme, e);
        }
    }
}

fn filter_theme_geojsons(queries: &[(String, String)], osm_dir: &Path, year: i32)
                         -> Vec<(String, PathBuf)> {
    let mut filtered = Vec::new();

    for (theme, _) in queries {
        let geojson_path = theme_geojson_path(osm_dir, theme, year);

        let non_empty = fs::metadata(&geojson_path).map(|m| m.len() > 0).unwrap_or(false);
        if !non_empty {
            warn!("Conversion to GeoJSON for {} in the {} year failed.", theme, year);
            continue;
        }

        let result = (|| -> Result<(usize, usize)> {
            let mut geojson: serde_json::Value =
                serde_json::from_str(&fs::read_to_string(&geojson_path)?)?;
            let counts = filter_theme(theme, &mut geojson);
            fs::write(&geojson_path, serde_json::to_string_pretty(&geojson)?)?;
            Ok(counts)
        })();

        match result {
            Ok((before, after)) => {
                info!("Total features in {}: {}, after filtering: {}", theme, before, after);
                filtered.push((theme.clone(), geojson_path));
            }
            Err(e) => {
                error!("Filtering {} failed: {}", theme, e);
            }
        }
    }

    filtered
}

fn merge_themes_to_gpkg(filtered: &[(String, PathBuf)], osm_dir: &Path, year: i32)
                        -> Result<PathBuf> {
    anyhow::ensure!(!filtered.is_empty(), "No OSM theme produced any data, nothing to merge");

    let gpkg_dir = osm_dir.join("gpkg_temp");
    fs::create_dir_all(&gpkg_dir)?;

    //per-theme GeoPackages first
    let mut theme_gpkgs = Vec::new();
    for (theme, geojson_path) in filtered {
        let gpkg_path = gpkg_dir.join(format!("{}_{}.gpkg", theme, year));
        if gpkg_path.exists() {
            fs::remove_file(&gpkg_path)?;
        }

        match reproject_to_gpkg(geojson_path, &gpkg_path, OSM_TARGET_EPSG) {
            Ok(()) => {
                info!("Converted and modified to GeoPackage: {:?}", gpkg_path);
                theme_gpkgs.push((theme.clone(), gpkg_path));
            }
            Err(e) => error!("Error processing {}: {}", theme, e),
        }
    }

    anyhow::ensure!(!theme_gpkgs.is_empty(), "No theme GeoPackage could be created");

    //then append everything into one file, a layer per theme
    let merged = gpkg_dir.join(format!("osm_merged_{}.gpkg", year));
    if merged.exists() {
        fs::remove_file(&merged)?;
    }

    for (index, (theme, gpkg_path)) in theme_gpkgs.iter().enumerate() {
        if let Err(e) = copy_to_gpkg_layer(gpkg_path, &merged, OSM_TARGET_EPSG, theme, index > 0) {
            error!("Error adding {}: {}", theme, e);
        }
    }

    Ok(merged)
}

fn delete_temp_files(osm_dir: &Path, year: i32) -> Result<()> {
    for entry in fs::read_dir(osm_dir)? {
        let path = entry?.path();
        let extension = path.extension().and_then(|e| e.to_str());
        if matches!(extension, Some("json") | Some("geojson")) {
            fs::remove_file(&path)?;
        }
    }

    let gpkg_dir = osm_dir.join("gpkg_temp");
    if gpkg_dir.exists() {
        fs::remove_dir_all(&gpkg_dir)?;
    }

    info!("Deleted all intermediate GeoJSON files for {}.", year);

    Ok(())
}
