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

//! The protected-areas pipeline: fetch per-country GeoJSON, merge into one
//! GeoPackage, slice by establishment year per LULC year stamp, rasterize the
//! slices onto the LULC grid and sum them with the LULC rasters.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use itertools::Itertools;
use log::{error, info};
use structopt::StructOpt;

use geo_prep::config::{expand_year, PipelineConfig};
use geo_prep::ext::ExternalCommand;
use geo_prep::raster::{combine_rasters, rasterize_onto_grid, Raster};
use geo_prep::vector::{copy_to_gpkg_layer, reproject_to_gpkg};

use crate::pa_api::{flag_is_true, PaApiClient};

const MERGED_PA_LAYER: &str = "merged_pa";
const PA_BURN_VALUE: i64 = 100;
const PA_SOURCE_EPSG: i32 = 4326;

#[derive(StructOpt)]
pub struct ProtectedAreasArgs {

    #[structopt(long, default_value = "config.yaml", parse(from_os_str))]
    config: PathBuf,

    #[structopt(long, default_value = "wdpa_data", parse(from_os_str),
                help = "Directory holding the per-country API responses")]
    response_dir: PathBuf,

    #[structopt(long, help = "Reuse previously saved API responses")]
    skip_fetch: bool,

    #[structopt(long, help = "Keep the per-year GeoPackage slices")]
    keep_intermediate_gpkg: bool,
}

pub fn protected_areas(args: &ProtectedAreasArgs) -> Result<()> {
    let config = PipelineConfig::load(&args.config)?;

    let years = config.years();
    anyhow::ensure!(!years.is_empty(), "No year configured in config.yaml");

    let output_dir = PathBuf::from(config.output_dir.as_deref()
        .context("`output_dir` missing from config.yaml")?);
    fs::create_dir_all(&output_dir)?;

    let geojson_files = fetch_country_geojsons(args, &config)?;
    anyhow::ensure!(!geojson_files.is_empty(),
                    "No protected area responses available in {:?}", args.response_dir);

    let merged = merge_to_geopackage(&geojson_files, &output_dir)?;

    let lulc_dir = config.lulc_dir.as_deref()
        .context("`lulc_dir` missing from config.yaml")?;
    let lulc_template = config.lulc.as_deref()
        .context("`lulc` template missing from config.yaml")?;

    //the PA data arrives in WGS 84; move it onto the LULC CRS before slicing
    let first_lulc = Raster::open(&Path::new(lulc_dir)
        .join(expand_year(lulc_template, years[0])))?;
    let lulc_epsg = first_lulc.stats.epsg_code()
        .context("LULC raster has no EPSG authority code")?;

    let merged = if lulc_epsg != PA_SOURCE_EPSG {
        let reprojected = output_dir.join("merged_pa_reprojected.gpkg");
        if reprojected.exists() {
            fs::remove_file(&reprojected)?;
        }
        reproject_to_gpkg(&merged, &reprojected, lulc_epsg)?;
        reprojected
    } else {
        merged
    };

    let pa_dir = output_dir.join("pas_timeseries");
    fs::create_dir_all(&pa_dir)?;

    for &year in &years {
        let lulc_path = Path::new(lulc_dir).join(expand_year(lulc_template, year));
        let lulc = Raster::open(&lulc_path)?;

        let pa_raster = match rasterize_year_slice(&merged, &pa_dir, year, &lulc,
                                                   args.keep_intermediate_gpkg) {
            Ok(path) => path,
            Err(e) => {
                //one bad year slice does not abort the others
                error!("Error rasterizing protected areas for {}: {}", year, e);
                continue;
            }
        };

        sum_lulc_and_pa(&lulc, &pa_raster, &output_dir, year)?;
    }

    Ok(())
}

fn fetch_country_geojsons(args: &ProtectedAreasArgs, config: &PipelineConfig)
                          -> Result<Vec<PathBuf>> {
    fs::create_dir_all(&args.response_dir)?;

    if !args.skip_fetch {
        let api_url = config.api_url.as_deref()
            .context("`api_url` missing from config.yaml")?;
        let token = config.token.as_deref()
            .context("`token` missing from config.yaml")?;
        let marine = flag_is_true(config.marine.as_deref());

        let country_codes = config.country_codes.as_ref()
            .context("`country_codes` missing from config.yaml")?;

        let client = PaApiClient::new(api_url, token, marine)?;

        for code in country_codes {
            info!("Fetching protected areas for {}", code);
            match client.fetch_country(code) {
                Ok(data) => {
                    let path = args.response_dir.join(format!("{}.geojson", code));
                    fs::write(&path, serde_json::to_string(&data)?)?;
                }
                Err(e) => {
                    error!("Fetching {} failed: {}", code, e);
                }
            }
        }
    }

    let files: Vec<PathBuf> = fs::read_dir(&args.response_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("geojson"))
        .sorted()
        .collect_vec();

    Ok(files)
}

fn merge_to_geopackage(geojson_files: &[PathBuf], output_dir: &Path) -> Result<PathBuf> {
    let merged = output_dir.join("merged_pa.gpkg");
    if merged.exists() {
        fs::remove_file(&merged)?;
    }

    for (index, file) in geojson_files.iter().enumerate() {
        if let Err(e) = copy_to_gpkg_layer(file, &merged, PA_SOURCE_EPSG,
                                           MERGED_PA_LAYER, index > 0) {
            error!("Error merging {:?}: {}", file, e);
        }
    }

    anyhow::ensure!(merged.exists(), "No country GeoJSON could be merged");

    info!("Merged protected areas written to {:?}", merged);

    Ok(merged)
}

/// Selects the PAs established up to the year stamp and burns them onto the
/// LULC grid.
fn rasterize_year_slice(merged: &Path, pa_dir: &Path, year: i32, lulc: &Raster,
                        keep_intermediate_gpkg: bool) -> Result<PathBuf> {
    let slice_gpkg = pa_dir.join(format!("pas_{}.gpkg", year));
    let slice_raster = pa_dir.join(format!("pas_{}.tif", year));

    if slice_gpkg.exists() {
        fs::remove_file(&slice_gpkg)?;
    }

    info!("Protected areas are filtered according to establishment year: {}", year);

    ExternalCommand::new("ogr2ogr")
        .args(["-f", "GPKG"])
        .arg_path(&slice_gpkg)
        .arg_path(merged)
        .args(["-where", &format!("year <= {}", year)])
        .args(["-nln", MERGED_PA_LAYER])
        .run()?;

    info!("Rasterizing protected areas for {}", year);

    let result = rasterize_onto_grid(&slice_gpkg, &slice_raster, None,
                                     PA_BURN_VALUE, &lulc.stats);

    if !keep_intermediate_gpkg {
        let _ = fs::remove_file(&slice_gpkg);
        info!("Intermediate GeoPackage pas_{}.gpkg has been removed.", year);
    }

    result?;

    Ok(slice_raster)
}

/// Cell-wise sum honoring nodata: a cell that is nodata on one side takes the
/// other side's value, nodata on both sides stays nodata.
fn sum_lulc_and_pa(lulc: &Raster, pa_raster: &Path, output_dir: &Path, year: i32) -> Result<()> {
    let lulc_pa_dir = output_dir.join("lulc_pa");
    let output = lulc_pa_dir.join(format!("lulc_pa_{}.tif", year));

    let nodata = lulc.stats.no_data_value;

    combine_rasters::<i32, _>(&lulc.path, pa_raster, &output, nodata,
                              |lulc_value, lulc_nodata, pa_value, pa_nodata| {
        Ok(match (lulc_nodata, pa_nodata) {
            (true, true) => nodata,
            (true, false) => pa_value,
            (false, true) => lulc_value,
            (false, false) => lulc_value + pa_value,
        })
    })?;

    info!("Combined LULC and protected areas written to {:?}", output);

    Ok(())
}
