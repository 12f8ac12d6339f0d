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

//! Enriches the LULC raster with the vector stressors: reprojects and repairs
//! the input vectors, buffers the linear road/rail layers, rasterizes every
//! mapped layer onto the LULC grid and emits the stressors.yaml registry for
//! the impedance stage.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{error, info, warn};
use structopt::StructOpt;

use geo_prep::config::{expand_year, save_yaml, PipelineConfig};
use geo_prep::raster::{burn_into_existing, extract_class_raster, rasterize_onto_grid,
                       translate_compress, Raster};
use geo_prep::vector::{buffer_features, dataset_epsg, extract_layer_names, fix_geometries,
                       reproject_to_gpkg};

//layers buffered from lines into polygons before rasterization
const BUFFERED_LAYERS: [&str; 2] = ["roads", "railways"];

#[derive(StructOpt)]
pub struct EnrichLulcArgs {

    #[structopt(long, default_value = "config.yaml", parse(from_os_str))]
    config: PathBuf,

    #[structopt(long, default_value = "27700",
                help = "Metric CRS used for buffering geographic data")]
    metric_epsg: i32,

    #[structopt(long, default_value = "stressors.yaml", parse(from_os_str))]
    stressors_file: PathBuf,
}

pub fn enrich_lulc(args: &EnrichLulcArgs) -> Result<()> {
    let config = PipelineConfig::load(&args.config)?;
    let year = config.first_year()?;

    let vector_dir = PathBuf::from(config.vector_dir.as_deref()
        .context("`vector_dir` missing from config.yaml")?);
    let lulc_dir = PathBuf::from(config.lulc_dir.as_deref()
        .context("`lulc_dir` missing from config.yaml")?);
    let output_dir = PathBuf::from(config.output_dir.as_deref()
        .context("`output_dir` missing from config.yaml")?);
    fs::create_dir_all(&output_dir)?;

    let vector_path = resolve_vector_source(&config, &vector_dir, year)?;
    info!("Path to the input vector dataset: {:?}", vector_path);

    let lulc_template = config.lulc.as_deref()
        .context("`lulc` template missing from config.yaml")?;
    let lulc_path = lulc_dir.join(expand_year(lulc_template, year));
    info!("Path to the input raster dataset: {:?}", lulc_path);

    let lulc_raster = Raster::open(&lulc_path)?;
    info!("{}", lulc_raster.stats);

    let lulc_epsg = lulc_raster.stats.epsg_code()
        .context("LULC raster has no EPSG authority code")?;
    let is_cartesian = lulc_raster.stats.is_cartesian()?;
    if is_cartesian {
        info!("Projected coordinate system of the input raster is EPSG:{}", lulc_epsg);
    } else {
        info!("Input raster does not have a projected coordinate system (EPSG:{}).", lulc_epsg);
    }

    let layer_names = extract_layer_names(&vector_path)?;
    info!("Layers found in the input vector file: {}", layer_names.join(", "));

    prepare_vector_data(&vector_path, lulc_epsg)?;

    //buffer the linear layers; one failing layer does not stop the others
    let mut buffered_sources: BTreeMap<String, PathBuf> = BTreeMap::new();
    for layer in BUFFERED_LAYERS {
        if !layer_names.iter().any(|name| name == layer) {
            continue;
        }

        let buffered = vector_dir.join(format!("{}_{}_buffered.gpkg", layer, year));
        match buffer_features(&vector_path, &buffered, layer,
                              lulc_epsg, is_cartesian, args.metric_epsg) {
            Ok(()) => {
                buffered_sources.insert(layer.to_string(), buffered);
            }
            Err(e) => {
                error!("Error buffering {}: {}", layer, e);
            }
        }
    }

    let lulc_codes = lulc_mapping(&config)?;
    info!("LULC dictionary: {:?}", lulc_codes);

    //working copy of the LULC raster that the stressor classes get burned into
    let enriched_path = output_dir.join(format!("lulc_enriched_{}.tif", year));
    translate_compress(&lulc_path, &enriched_path, None, None)?;

    let mut stressors: Vec<(String, PathBuf)> = Vec::new();

    for (alias, &code) in &lulc_codes {
        let source = match buffered_sources.get(alias) {
            Some(buffered) => buffered.clone(),
            None if layer_names.iter().any(|name| name == alias) => vector_path.clone(),
            None => {
                warn!("No vector layer found for '{}', skipping", alias);
                continue;
            }
        };

        let stressor_tif = output_dir.join(format!("{}_{}.tif", alias, year));

        match rasterize_onto_grid(&source, &stressor_tif, Some(alias.as_str()), code,
                                  &lulc_raster.stats) {
            Ok(()) => {
                if let Err(e) = burn_into_existing(&source, alias, code, &enriched_path) {
                    error!("Error burning {} into the enriched raster: {}", alias, e);
                }
                stressors.push((alias.clone(), stressor_tif));
            }
            Err(e) => {
                error!("Error rasterizing {}: {}", alias, e);
            }
        }
    }

    //per-class stressor rasters cut out of the enriched LULC
    let enriched_raster = Raster::open(&enriched_path)?;
    for (alias, &code) in &lulc_codes {
        let class_tif = output_dir.join(format!("lulc_{}_{}.tif", alias, year));
        extract_class_raster(&enriched_raster, &class_tif, code)?;
    }

    write_stressors_file(&args.stressors_file, &stressors)?;
    info!("OSM stressor registry written to {:?}", args.stressors_file);

    Ok(())
}

/// The OSM extract is preferred; a user-supplied vector dataset is the
/// fallback.  Neither configured is a hard error.
fn resolve_vector_source(config: &PipelineConfig, vector_dir: &Path, year: i32) -> Result<PathBuf> {
    let file_name = match &config.osm_data {
        Some(template) => {
            info!("Input raster dataset will be enriched with OSM data.");
            expand_year(template, year)
        }
        None => {
            warn!("OSM data not found in the configuration file.");
            match &config.user_vector {
                Some(template) => {
                    info!("Input raster dataset will be enriched with user-specified data.");
                    expand_year(template, year)
                }
                None => bail!("No valid input vector data found. Neither OSM data nor user \
                               specified data found in the configuration file."),
            }
        }
    };

    info!("Using vector file to refine raster data: {}", file_name);

    Ok(vector_dir.join(file_name))
}

/// Reprojects the vector dataset onto the LULC CRS when needed, repairing
/// geometries afterwards.  Replaces the dataset in place.
fn prepare_vector_data(vector_path: &Path, lulc_epsg: i32) -> Result<()> {
    if dataset_epsg(vector_path)? == Some(lulc_epsg) {
        return Ok(());
    }

    let reprojected = vector_path.with_extension("reproj.gpkg");
    if reprojected.exists() {
        fs::remove_file(&reprojected)?;
    }

    reproject_to_gpkg(vector_path, &reprojected, lulc_epsg)?;
    fix_geometries(&reprojected)?;

    fs::rename(&reprojected, vector_path)?;

    Ok(())
}

/// Mapping from stressor alias to the LULC class code burned for it
fn lulc_mapping(config: &PipelineConfig) -> Result<BTreeMap<String, i64>> {
    match config.user_matching.as_deref() {
        Some(flag) if flag.eq_ignore_ascii_case("true") => {
            info!("User-specified mapping of LULC codes and OSM features is used.");
            config.lulc_codes.clone()
                .context("`user_matching` is true but `lulc_codes` is missing from config.yaml")
        }
        Some(flag) if flag.eq_ignore_ascii_case("false") => {
            bail!("Automatic matching of LULC codes is not available; set user_matching: \
                   'true' and provide lulc_codes")
        }
        _ => bail!("User did not specify mapping between OSM features and LULC types."),
    }
}

fn write_stressors_file(path: &Path, stressors: &[(String, PathBuf)]) -> Result<()> {
    //a Mapping keeps the registration order
    let mut mapping = serde_yaml::Mapping::new();
    for (alias, raster_path) in stressors {
        mapping.insert(serde_yaml::Value::String(alias.clone()),
                       serde_yaml::Value::String(raster_path.to_string_lossy().into_owned()));
    }

    save_yaml(path, &serde_yaml::Value::Mapping(mapping))
}

#[cfg(test)]
mod enrich_lulc_tests {
    use super::*;

    fn config_from(yaml: &str) -> PipelineConfig {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_resolve_vector_source_prefers_osm() {
        let config = config_from("osm_data: osm_merged_{year}.gpkg\nuser_vector: own_{year}.gpkg");

        let path = resolve_vector_source(&config, Path::new("vector"), 2018).unwrap();
        assert_eq!(path, Path::new("vector").join("osm_merged_2018.gpkg"));
    }

    #[test]
    fn test_resolve_vector_source_falls_back_to_user_vector() {
        let config = config_from("user_vector: own_{year}.gpkg");

        let path = resolve_vector_source(&config, Path::new("vector"), 2018).unwrap();
        assert_eq!(path, Path::new("vector").join("own_2018.gpkg"));
    }

    #[test]
    fn test_resolve_vector_source_fails_without_input() {
        let config = config_from("output_dir: out");

        assert!(resolve_vector_source(&config, Path::new("vector"), 2018).is_err());
    }

    #[test]
    fn test_lulc_mapping_requires_user_matching() {
        let config = config_from("user_matching: 'true'\nlulc_codes:\n  roads: 7\n");
        let mapping = lulc_mapping(&config).unwrap();
        assert_eq!(mapping["roads"], 7);

        let config = config_from("lulc_codes:\n  roads: 7\n");
        assert!(lulc_mapping(&config).is_err());

        let config = config_from("user_matching: 'false'\n");
        assert!(lulc_mapping(&config).is_err());
    }

    #[test]
    fn test_write_stressors_file_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stressors.yaml");

        write_stressors_file(&path, &[
            ("roads".to_string(), PathBuf::from("out/roads_2018.tif")),
            ("railways".to_string(), PathBuf::from("out/railways_2018.tif")),
        ]).unwrap();

        let value: serde_yaml::Value = geo_prep::config::load_yaml(&path).unwrap();
        let mapping = value.as_mapping().unwrap();

        let keys: Vec<&str> = mapping.iter().map(|(k, _)| k.as_str().unwrap()).collect();
        assert_eq!(keys, vec!["roads", "railways"]);
        assert_eq!(mapping.get(&serde_yaml::Value::from("roads")).unwrap().as_str().unwrap(),
                   "out/roads_2018.tif");
    }
}
