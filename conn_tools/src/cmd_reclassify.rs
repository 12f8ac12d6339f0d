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

//! Reclassifies every LULC(+PA) raster in a directory into impedance values
//! using the CSV reclassification table, then compresses the results.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;
use structopt::StructOpt;

use geo_prep::config::PipelineConfig;
use geo_prep::raster::{reclassify_raster, translate_compress, ReclassTable, RECLASS_NO_DATA};

#[derive(StructOpt)]
pub struct ReclassifyArgs {

    #[structopt(long, default_value = "config.yaml", parse(from_os_str))]
    config: PathBuf,

    #[structopt(long, default_value = "lulc_pa", parse(from_os_str))]
    input_dir: PathBuf,

    #[structopt(long, default_value = "impedance_pa", parse(from_os_str))]
    output_dir: PathBuf,
}

pub fn reclassify(args: &ReclassifyArgs) -> Result<()> {
    let config = PipelineConfig::load(&args.config)?;

    let impedance_dir = config.impedance_dir.as_deref()
        .context("`impedance_dir` missing from config.yaml")?;
    let table_name = config.impedance.as_deref()
        .context("`impedance` reclassification table missing from config.yaml")?;

    let table_path = PathBuf::from(impedance_dir).join(table_name);
    let table = ReclassTable::from_csv(&table_path)?;

    if table.has_decimal() {
        info!("LULC impedance is characterized by decimal values.");
    } else {
        info!("LULC impedance is characterized by integer values only.");
    }

    fs::create_dir_all(&args.output_dir)?;

    let tiff_files: Vec<PathBuf> = fs::read_dir(&args.input_dir)
        .with_context(|| format!("Failed to read input directory {:?}", args.input_dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().and_then(|e| e.to_str()) == Some("tif"))
        .sorted()
        .collect_vec();

    anyhow::ensure!(!tiff_files.is_empty(),
                    "No GeoTIFFs found in input directory {:?}", args.input_dir);

    for input_path in &tiff_files {
        let file_name = input_path.file_name().unwrap().to_string_lossy();
        let output_path = args.output_dir.join(format!("impedance_{}", file_name));

        info!("Reclassifying {:?}", input_path);
        reclassify_raster(input_path, &output_path, &table)?;

        //gdal_translate cannot rewrite in place, so compress into a sibling
        //file and move it over the uncompressed one
        let compressed_path = args.output_dir.join(format!("impedance_{}_compr.tif",
            input_path.file_stem().unwrap().to_string_lossy()));

        translate_compress(&output_path, &compressed_path,
                           Some(RECLASS_NO_DATA), Some(table.gdal_output_type()))?;

        fs::remove_file(&output_path)?;
        fs::rename(&compressed_path, &output_path)?;

        info!("Reclassification complete for: {:?}", input_path);
    }

    Ok(())
}
