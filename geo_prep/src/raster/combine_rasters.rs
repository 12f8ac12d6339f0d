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
use std::fs::remove_file;
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Result};
use gdal::raster::{Buffer, GdalType};
use log::debug;

use crate::raster::{create_empty_raster, Raster};
use crate::util::{format_duration, print_remaining_time, RasterChunkIterator};

/// Combines 2 rasters on the same grid, cell by cell.  The closure sees each
/// pair of values with their nodata flags and returns the output value.
pub fn combine_rasters<T, F>(raster_lhs: &Path, raster_rhs: &Path,
                             raster_output: &Path,
                             nodata_output: f64,
                             mut combine_func: F) -> Result<()>
where T: Copy + GdalType,
      F: FnMut(f64, bool, f64, bool) -> Result<f64>
{
    let now = Instant::now();
    let mut last_output = Instant::now();

    let raster_lhs = Raster::open(raster_lhs)?;
    let raster_rhs = Raster::open(raster_rhs)?;

    debug!("Combining {:?} and {:?}", &raster_lhs.path, &raster_rhs.path);
    debug!("No data left: {} Right: {}", raster_lhs.stats.no_data_value,
           raster_rhs.stats.no_data_value);

    if !raster_lhs.stats.same_grid(&raster_rhs.stats) {
        bail!("Rasters {:?} and {:?} are not on the same grid",
              &raster_lhs.path, &raster_rhs.path);
    }

    if raster_output.exists() {
        remove_file(raster_output)?;
    }

    let mut new_stats = raster_rhs.stats.clone();
    new_stats.no_data_value = nodata_output;

    create_empty_raster::<T>(raster_output, &new_stats, false)?;

    let output_raster = Raster::open_for_update(raster_output)?;
    let mut output_band = output_raster.band()?;

    let lhs_band = raster_lhs.band()?;
    let rhs_band = raster_rhs.band()?;

    for raster_window in RasterChunkIterator::new(output_raster.stats.num_rows as usize,
                                                  output_raster.stats.num_cols as usize, 10)
    {
        let left_data = lhs_band.read_as::<f64>(
            raster_window.window_offset, raster_window.window_size,
            raster_window.window_size, None)?;

        let right_data = rhs_band.read_as::<f64>(
            raster_window.window_offset, raster_window.window_size,
            raster_window.window_size, None)?;

        assert_eq!(left_data.data().len(), right_data.data().len());
        assert!(!left_data.data().is_empty());

        let mut output_data = Vec::with_capacity(left_data.data().len());

        for idx in 0..left_data.data().len() {
            let v1 = left_data.data()[idx];
            let v2 = right_data.data()[idx];

            let result = combine_func(v1, raster_lhs.stats.is_nodata(v1),
                                      v2, raster_rhs.stats.is_nodata(v2));

            match result {
                Ok(result_value) => output_data.push(result_value),
                Err(e) => {
                    let idx = idx as isize;
                    let offset_x = idx % raster_window.window_size.0 as isize;
                    let offset_y = idx / raster_window.window_size.0 as isize;
                    let raster_x = raster_window.window_offset.0 + offset_x;
                    let raster_y = raster_window.window_offset.1 + offset_y;
                    let coord_x = raster_lhs.stats.calc_x_coord(raster_x as i32);
                    let coord_y = raster_lhs.stats.calc_y_coord(raster_y as i32);

                    bail!("Combine Raster Problem at {},{} coords {},{}.  {}",
                          raster_x, raster_y, coord_x, coord_y, e);
                }
            }
        }

        assert_eq!(output_data.len(), left_data.data().len());

        output_band.write(
            raster_window.window_offset,
            raster_window.window_size,
            &mut Buffer::new(raster_window.window_size, output_data))?;

        if last_output.elapsed().as_secs() >= 3 {
            last_output = Instant::now();

            print_remaining_time(&now, raster_window.current_step as u32,
                                 raster_window.num_steps as u32);
        }
    }

    debug!("Finished in {}", format_duration(now.elapsed()));

    Ok(())
}

#[cfg(test)]
mod raster_combine_test {
    use super::*;
    use crate::raster::{create_test_raster, get_temp_filename, RasterStats};
    use gdal::spatial_ref::SpatialRef;
    use itertools::Itertools;

    #[test]
    fn test_simple_add() {
        let srs = SpatialRef::from_epsg(4326).unwrap();

        let origin_y = 46.242485;
        let origin_x = 6.021557;

        let lhs_stats = RasterStats {
            origin_y,
            origin_x,
            pixel_height: -0.005,
            pixel_width: 0.004,
            num_rows: 3,
            num_cols: 3,
            no_data_value: -1000.0,
            projection: srs.to_wkt().unwrap(),
        };

        let mut rhs_stats = lhs_stats.clone();
        rhs_stats.no_data_value = 10000.0;

        let mut lhs_data: Vec<f64> = (1..=9).map(|v| -v as f64).collect_vec();
        lhs_data[8] = -50.0;
        lhs_data[7] = lhs_stats.no_data_value;
        lhs_data[5] = lhs_stats.no_data_value;
        let lhs_path = create_test_raster("lhs.tif", &lhs_stats, &lhs_data).unwrap();

        let mut rhs_data: Vec<f64> = (10..19).map(|v| v as f64).collect_vec();
        rhs_data[8] = 200.0;
        rhs_data[7] = rhs_stats.no_data_value;
        rhs_data[6] = rhs_stats.no_data_value;
        let rhs_path = create_test_raster("rhs.tif", &rhs_stats, &rhs_data).unwrap();

        let output = get_temp_filename("add_result.tif");

        assert!(!output.exists());

        let nodata_output = -999999.0;
        combine_rasters::<f64, _>(&lhs_path, &rhs_path, &output, nodata_output,
                                  |v1, is_nodata1, v2, is_nodata2| {
            if is_nodata1 && is_nodata2 {
                return Ok(nodata_output);
            }

            if is_nodata1 {
                return Ok(v2);
            }

            if is_nodata2 {
                return Ok(v1);
            }

            Ok(v1 + v2)
        }).unwrap();

        assert!(output.exists());

        let output_raster = Raster::open(&output).unwrap();

        let data = output_raster.dataset.rasterband(1).unwrap()
            .read_as::<f64>((0, 0), (3, 3), (3, 3), None).unwrap();

        assert_eq!(data.data()[0], 9.0);
        //nodata on left
        assert_eq!(data.data()[5], rhs_data[5]);
        //nodata on right
        assert_eq!(data.data()[6], lhs_data[6]);
        //nodata both sides
        assert_eq!(data.data()[7], nodata_output);
        assert_eq!(data.data()[8], 150.0);
    }

    #[test]
    fn test_grid_mismatch_fails() {
        let srs = SpatialRef::from_epsg(4326).unwrap();

        let lhs_stats = RasterStats {
            origin_y: 10.0,
            origin_x: 0.0,
            pixel_height: -0.5,
            pixel_width: 0.5,
            num_rows: 2,
            num_cols: 2,
            no_data_value: -1.0,
            projection: srs.to_wkt().unwrap(),
        };

        let mut rhs_stats = lhs_stats.clone();
        rhs_stats.num_cols = 3;

        let lhs_path = create_test_raster("mismatch_lhs.tif", &lhs_stats,
                                          &vec![0.0f64; 4]).unwrap();
        let rhs_path = create_test_raster("mismatch_rhs.tif", &rhs_stats,
                                          &vec![0.0f64; 6]).unwrap();

        let output = get_temp_filename("mismatch_out.tif");

        let result = combine_rasters::<f64, _>(&lhs_path, &rhs_path, &output, -1.0,
                                               |v1, _, _, _| Ok(v1));

        assert!(result.is_err());
    }
}
