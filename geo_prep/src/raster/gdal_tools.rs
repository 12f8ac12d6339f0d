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

//! Raster operations delegated to the GDAL command line tools
//! (gdal_rasterize, gdal_translate, gdal_proximity.py).

use std::fs::remove_file;
use std::path::Path;

use anyhow::Result;

use crate::ext::ExternalCommand;
use crate::raster::RasterStats;

//do not assign 0 as nodata, it would mask burned-over-zero cells out of the
//raster calculations downstream
pub const RASTERIZE_NO_DATA: i64 = -2147483647;

/// gdal_rasterize onto a fresh raster snapped to the reference grid
pub fn rasterize_command(input: &Path, output: &Path, layer: Option<&str>,
                         burn_value: i64, grid: &RasterStats) -> ExternalCommand {
    let (xmin, xmax, ymin, ymax) = grid.extent();

    let mut command = ExternalCommand::new("gdal_rasterize");

    if let Some(layer) = layer {
        command = command.args(["-l", layer]);
    }

    command
        .args(["-burn", &burn_value.to_string()])
        .args(["-init", "0"])
        .args(["-tr", &grid.pixel_width.to_string(), &grid.pixel_height.abs().to_string()])
        .args(["-a_nodata", &RASTERIZE_NO_DATA.to_string()])
        .args(["-te", &xmin.to_string(), &ymin.to_string(),
               &xmax.to_string(), &ymax.to_string()])
        .args(["-ot", "Int32"])
        .args(["-of", "GTiff"])
        .args(["-co", "COMPRESS=LZW"])
        .arg_path(input)
        .arg_path(output)
}

pub fn rasterize_onto_grid(input: &Path, output: &Path, layer: Option<&str>,
                           burn_value: i64, grid: &RasterStats) -> Result<()> {
    if output.exists() {
        remove_file(output)?;
    }

    rasterize_command(input, output, layer, burn_value, grid).run()?;

    Ok(())
}

/// gdal_rasterize into an existing raster, burning features over its cells
pub fn burn_into_existing(input: &Path, layer: &str, burn_value: i64,
                          target: &Path) -> Result<()> {
    ExternalCommand::new("gdal_rasterize")
        .args(["-l", layer])
        .args(["-burn", &burn_value.to_string()])
        .arg_path(input)
        .arg_path(target)
        .run()?;

    Ok(())
}

/// gdal_translate copy with LZW compression, optionally rewriting the nodata
/// value and output type
pub fn translate_compress(input: &Path, output: &Path,
                          nodata: Option<f64>, output_type: Option<&str>) -> Result<()> {
    if output.exists() {
        remove_file(output)?;
    }

    let mut command = ExternalCommand::new("gdal_translate")
        .arg_path(input)
        .arg_path(output);

    if let Some(nodata) = nodata {
        command = command.args(["-a_nodata", &nodata.to_string()]);
    }
    if let Some(output_type) = output_type {
        command = command.args(["-ot", output_type]);
    }

    command.args(["-co", "COMPRESS=LZW"]).run()?;

    Ok(())
}

/// gdal_proximity.py distance-to-feature raster in georeferenced units.
/// Every non-zero cell of the input is a target.
pub fn compute_proximity(input: &Path, output: &Path, nodata: f64) -> Result<()> {
    if output.exists() {
        remove_file(output)?;
    }

    ExternalCommand::new("gdal_proximity.py")
        .arg_path(input)
        .arg_path(output)
        .args(["-distunits", "GEO"])
        .args(["-ot", "Float32"])
        .args(["-nodata", &nodata.to_string()])
        .run()?;

    Ok(())
}

#[cfg(test)]
mod gdal_tools_tests {
    use super::*;

    #[test]
    fn test_rasterize_command_arguments() {
        let grid = RasterStats {
            origin_x: 10.0,
            origin_y: 20.0,
            pixel_width: 0.5,
            pixel_height: -0.5,
            num_rows: 10,
            num_cols: 20,
            no_data_value: -9999.0,
            projection: "".to_string(),
        };

        let command = rasterize_command(Path::new("pas_2018.gpkg"),
                                        Path::new("pas_2018.tif"),
                                        None, 100, &grid);
        let line = command.command_line();

        assert!(line.starts_with("gdal_rasterize"));
        assert!(line.contains("-burn 100"));
        assert!(line.contains("-init 0"));
        assert!(line.contains("-tr 0.5 0.5"));
        assert!(line.contains("-a_nodata -2147483647"));
        //xmin ymin xmax ymax
        assert!(line.contains("-te 10 15 20 20"));
        assert!(line.contains("-ot Int32"));
        assert!(line.contains("-co COMPRESS=LZW"));
        assert!(line.ends_with("pas_2018.gpkg pas_2018.tif"));
    }

    #[test]
    fn test_rasterize_command_with_layer() {
        let grid = RasterStats {
            origin_x: 0.0,
            origin_y: 1.0,
            pixel_width: 1.0,
            pixel_height: -1.0,
            num_rows: 1,
            num_cols: 1,
            no_data_value: 0.0,
            projection: "".to_string(),
        };

        let line = rasterize_command(Path::new("in.gpkg"), Path::new("out.tif"),
                                     Some("roads"), 7, &grid).command_line();

        assert!(line.contains("-l roads"));
        assert!(line.contains("-burn 7"));
    }
}
