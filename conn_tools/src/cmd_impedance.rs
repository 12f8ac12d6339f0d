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

//! The impedance stage: builds the stressor registry and the per-stressor
//! decay configuration, validates it after optional hand-editing, then
//! accumulates the decayed edge effects of all stressors into the impedance
//! raster.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::{info, warn};
use ndarray::Array2;
use structopt::StructOpt;

use geo_prep::config::impedance::{parse_stressor_params, validate_impedance_config,
                                  StressorParams};
use geo_prep::config::{expand_year, load_yaml, save_yaml, PipelineConfig};
use geo_prep::raster::{accumulate_max, apply_decay, band_max, combine_rasters,
                       compute_proximity, create_empty_raster, normalize_nodata, Raster};
use gdal::raster::Buffer;

use crate::stressors::{ImpedanceConfigProcessor, LulcStressorDiscovery, OsmStressorDiscovery,
                       StressorRegistry};

const EDGE_EFFECT_NODATA: f64 = -9999.0;

#[derive(StructOpt)]
pub struct ImpedanceArgs {

    #[structopt(long, default_value = "config.yaml", parse(from_os_str))]
    config: PathBuf,

    #[structopt(long, default_value = "config_impedance.yaml", parse(from_os_str))]
    config_impedance: PathBuf,

    #[structopt(long, default_value = "stressors.yaml", parse(from_os_str))]
    stressors_file: PathBuf,

    #[structopt(long, help = "Stop after writing config_impedance.yaml for hand-editing")]
    prepare_only: bool,

    #[structopt(long, help = "Keep the per-stressor proximity rasters and stressors.yaml")]
    keep_intermediate: bool,
}

pub fn run_impedance(args: &ImpedanceArgs) -> Result<()> {
    let config = PipelineConfig::load(&args.config)?;
    let year = config.first_year()?;

    let output_dir = PathBuf::from(config.output_dir.as_deref()
        .context("`output_dir` missing from config.yaml")?);
    let impedance_dir = PathBuf::from(config.impedance_dir.as_deref()
        .context("`impedance_dir` missing from config.yaml")?);

    if !args.stressors_file.exists() {
        bail!("The stressors file {:?} is not found. Run the enrich-lulc stage first.",
              args.stressors_file);
    }

    let template = StressorParams::default();

    //discover stressors and enrich the impedance configuration
    let existing_config = if args.config_impedance.exists() {
        load_yaml(&args.config_impedance)?
    } else {
        serde_yaml::Value::Null
    };

    let lulc_codes = config.lulc_codes.clone().unwrap_or_default();
    if lulc_codes.is_empty() {
        warn!("`lulc_codes` is empty, no LULC stressors will be registered");
    }

    let lulc_discovery = LulcStressorDiscovery {
        year,
        output_dir: output_dir.clone(),
        lulc_codes,
        template: template.clone(),
    };
    let osm_discovery = OsmStressorDiscovery {
        stressors_file: args.stressors_file.clone(),
        template: template.clone(),
    };

    let processor = ImpedanceConfigProcessor {
        discoveries: vec![&lulc_discovery, &osm_discovery],
    };
    let setup = processor.process(existing_config)?;

    save_yaml(&args.config_impedance, &setup.config_impedance)?;
    info!("Impedance configuration written to {:?}", args.config_impedance);

    if args.prepare_only {
        info!("Please update the configuration file for the impedance dataset, then re-run \
               without --prepare-only.");
        return Ok(());
    }

    //the file may have been hand-edited between runs, reload and validate it
    let config_impedance: serde_yaml::Value = load_yaml(&args.config_impedance)?;
    validate_impedance_config(&config_impedance, &setup.registry.aliases(), &template)?;

    //base impedance raster and its global maximum
    let impedance_template = config.impedance_tif.as_deref()
        .context("`impedance_tif` template missing from config.yaml")?;
    let impedance_path = impedance_dir.join(expand_year(impedance_template, year));

    let impedance_raster = Raster::open(&impedance_path)
        .with_context(|| format!("Impedance raster GeoTIFF dataset {:?} is not found! \
                                  Please check the configuration file.", impedance_path))?;
    info!("Impedance raster GeoTIFF dataset used is {:?}", impedance_path);

    let impedance_max = band_max(&impedance_raster)?
        .context("Impedance raster contains no data cells")?;
    info!("Maximum value of impedance dataset: {}", impedance_max);

    calculate_impedance(&setup.registry, &config_impedance, &impedance_raster,
                        impedance_max, &output_dir, year, args.keep_intermediate)?;

    if !args.keep_intermediate {
        let _ = fs::remove_file(&args.stressors_file);
        info!("Stressors temp file has been deleted");
    }

    Ok(())
}

/// Accumulates every stressor's decayed edge effect into one raster, then
/// merges it with the base impedance raster.
fn calculate_impedance(registry: &StressorRegistry,
                       config_impedance: &serde_yaml::Value,
                       impedance_raster: &Raster,
                       impedance_max: f64,
                       output_dir: &Path,
                       year: i32,
                       keep_intermediate: bool) -> Result<()> {
    if registry.is_empty() {
        bail!("No stressors registered, nothing to accumulate");
    }

    let grid = impedance_raster.stats.clone();
    let num_cols = grid.num_cols as usize;
    let num_rows = grid.num_rows as usize;

    let mut max_result: Option<Array2<f64>> = None;
    let mut intermediates: Vec<PathBuf> = Vec::new();

    for (alias, stressor_path) in registry.iter() {
        info!("Processing: {:?}", stressor_path);
        info!("Corresponding key in YAML configuration: {}", alias);

        //a missing or corrupt stressor raster is skipped, not fatal
        let stressor = match Raster::open(stressor_path) {
            Ok(raster) => raster,
            Err(e) => {
                warn!("Failed to open {:?}, skipping... ({})", stressor_path, e);
                continue;
            }
        };

        let params = parse_stressor_params(config_impedance, alias)?;

        let normalized_path = output_dir.join(format!("{}_{}_nodata.tif", alias, year));
        normalize_nodata(&stressor, &normalized_path)?;

        let proximity_path = output_dir.join(format!("{}_{}_proximity.tif", alias, year));
        compute_proximity(&normalized_path, &proximity_path, EDGE_EFFECT_NODATA)?;

        intermediates.push(normalized_path);
        intermediates.push(proximity_path.clone());

        let proximity = Raster::open(&proximity_path)?;
        if !proximity.stats.same_grid(&grid) {
            bail!("Proximity raster {:?} is not on the impedance grid", proximity_path);
        }

        let buffer = proximity.band()?
            .read_as::<f64>((0, 0), (num_cols, num_rows), (num_cols, num_rows), None)?;
        let proximity_data = Array2::from_shape_vec((num_rows, num_cols), buffer.into_shape_and_vec().1)?;

        let effect = apply_decay(&proximity_data, proximity.stats.no_data_value,
                                 &params, impedance_max);

        max_result = Some(accumulate_max(max_result, &effect, EDGE_EFFECT_NODATA)?);
    }

    let max_result = match max_result {
        Some(result) => result,
        None => bail!("None of the registered stressor rasters could be opened"),
    };

    //persist the accumulated edge effect
    let mut edge_stats = grid.clone();
    edge_stats.no_data_value = EDGE_EFFECT_NODATA;

    let edge_path = output_dir.join(format!("edge_effect_{}.tif", year));
    if edge_path.exists() {
        fs::remove_file(&edge_path)?;
    }
    create_empty_raster::<f32>(&edge_path, &edge_stats, false)?;

    {
        let edge_raster = Raster::open_for_update(&edge_path)?;
        let mut edge_band = edge_raster.band()?;
        edge_band.write((0, 0), (num_cols, num_rows),
                        &mut Buffer::new((num_cols, num_rows), max_result.into_raw_vec()))?;
    }
    info!("Edge effect raster written to {:?}", edge_path);

    //decay-adjusted impedance: cell-wise max of base impedance and edge effect
    let decayed_path = output_dir.join(format!("impedance_decay_{}.tif", year));
    let nodata = grid.no_data_value;

    combine_rasters::<f32, _>(&impedance_raster.path, &edge_path, &decayed_path, nodata,
                              |impedance, impedance_nodata, effect, effect_nodata| {
        Ok(if impedance_nodata {
            nodata
        } else if effect_nodata {
            impedance
        } else {
            impedance.max(effect)
        })
    })?;

    info!("Decay adjusted impedance written to {:?}", decayed_path);

    if !keep_intermediate {
        for path in intermediates {
            let _ = fs::remove_file(&path);
        }
    }

    Ok(())
}
