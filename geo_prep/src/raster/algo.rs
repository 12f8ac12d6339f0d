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
use std::fs::create_dir_all;
use std::path::Path;

use anyhow::Result;
use gdal::raster::{Buffer, GdalType};
use gdal::DriverManager;
use log::debug;

use crate::raster::{Raster, RasterStats};
use crate::util::RasterChunkIterator;

pub const GTIFF_DRIVER: &str = "GTiff";

const NUMBER_OF_CHUNKS: usize = 10;

pub fn create_empty_raster<T: GdalType + Copy>(raster_path: &Path,
                                               snap_stats: &RasterStats,
                                               fill_with_nodata: bool,
) -> Result<()>
{
    if let Some(a) = raster_path.parent() {
        if !a.exists() {
            create_dir_all(a)?;
        }
    }

    let drv = DriverManager::get_driver_by_name(GTIFF_DRIVER)?;

    //just want to create it and close it
    let mut ds = drv.create_with_band_type::<T, _>(
        raster_path,
        snap_stats.num_cols as usize,
        snap_stats.num_rows as usize,
        1,
    )?;

    debug!("Created output tif {:?}", &raster_path);

    let left = snap_stats.origin_x;
    let top = snap_stats.origin_y;
    let raster_tile_size_x = snap_stats.pixel_width;
    let raster_tile_size_y = snap_stats.pixel_height;

    //because y is the top not the bottom
    assert!(raster_tile_size_y < 0.0);

    ds.set_geo_transform(&[left, raster_tile_size_x, 0.0, top, 0.0, raster_tile_size_y])?;

    ds.set_projection(&snap_stats.projection)?;

    let mut output_raster_band = ds.rasterband(1)?;

    output_raster_band.set_no_data_value(Some(snap_stats.no_data_value))?;
    if fill_with_nodata {
        output_raster_band.fill(snap_stats.no_data_value, None)?;
    }

    Ok(())
}

/// Maximum cell value of the first band, nodata excluded.  None when every
/// cell is nodata.
pub fn band_max(raster: &Raster) -> Result<Option<f64>> {
    let band = raster.band()?;
    let stats = &raster.stats;

    let mut max_value: Option<f64> = None;

    for window in RasterChunkIterator::new(stats.num_rows as usize,
                                           stats.num_cols as usize, NUMBER_OF_CHUNKS) {
        let data = band.read_as::<f64>(window.window_offset,
                                       window.window_size,
                                       window.window_size,
                                       None)?;

        for &v in data.data().iter() {
            if stats.is_nodata(v) {
                continue;
            }
            max_value = Some(match max_value {
                Some(m) if m >= v => m,
                _ => v,
            });
        }
    }

    Ok(max_value)
}

/// Rewrites a stressor raster so the nodata sentinel becomes 0 (background),
/// leaving feature cells untouched.  The proximity computation treats every
/// non-zero cell as a target.
pub fn normalize_nodata(input: &Raster, output_path: &Path) -> Result<()> {
    let mut out_stats = input.stats.clone();
    out_stats.no_data_value = 0.0;

    create_empty_raster::<f32>(output_path, &out_stats, false)?;

    let output = Raster::open_for_update(output_path)?;
    let mut output_band = output.band()?;
    let input_band = input.band()?;

    for window in RasterChunkIterator::new(input.stats.num_rows as usize,
                                           input.stats.num_cols as usize, NUMBER_OF_CHUNKS) {
        let data = input_band.read_as::<f64>(window.window_offset,
                                             window.window_size,
                                             window.window_size,
                                             None)?;

        let normalized: Vec<f64> = data.data().iter()
            .map(|&v| if input.stats.is_nodata(v) { 0.0 } else { v })
            .collect();

        output_band.write(window.window_offset,
                          window.window_size,
                          &mut Buffer::new(window.window_size, normalized))?;
    }

    Ok(())
}

/// Extracts one LULC class into its own raster: cells equal to class_code keep
/// the code, everything else (nodata included) becomes 0.
pub fn extract_class_raster(input: &Raster, output_path: &Path, class_code: i64) -> Result<()> {
    let mut out_stats = input.stats.clone();
    out_stats.no_data_value = 0.0;

    create_empty_raster::<i32>(output_path, &out_stats, false)?;

    let output = Raster::open_for_update(output_path)?;
    let mut output_band = output.band()?;
    let input_band = input.band()?;

    for window in RasterChunkIterator::new(input.stats.num_rows as usize,
                                           input.stats.num_cols as usize, NUMBER_OF_CHUNKS) {
        let data = input_band.read_as::<f64>(window.window_offset,
                                             window.window_size,
                                             window.window_size,
                                             None)?;

        let extracted: Vec<i32> = data.data().iter()
            .map(|&v| {
                if !input.stats.is_nodata(v) && v.round() as i64 == class_code {
                    class_code as i32
                } else {
                    0
                }
            })
            .collect();

        output_band.write(window.window_offset,
                          window.window_size,
                          &mut Buffer::new(window.window_size, extracted))?;
    }

    Ok(())
}

#[cfg(test)]
mod algo_tests {
    use super::*;
    use crate::raster::{create_test_raster, get_temp_filename};
    use gdal::spatial_ref::SpatialRef;

    fn wgs84_stats(no_data_value: f64) -> RasterStats {
        let srs = SpatialRef::from_epsg(4326).unwrap();

        RasterStats {
            origin_y: 46.242485,
            origin_x: 6.021557,
            pixel_height: -0.005,
            pixel_width: 0.004,
            num_rows: 3,
            num_cols: 3,
            no_data_value,
            projection: srs.to_wkt().unwrap(),
        }
    }

    #[test]
    fn test_band_max_skips_nodata() {
        let stats = wgs84_stats(-9999.0);

        let data: Vec<f64> = vec![1.0, 2.0, 7.0,
                                  -9999.0, 3.0, 4.0,
                                  5.0, 6.0, -9999.0];
        let path = create_test_raster("band_max.tif", &stats, &data).unwrap();

        let raster = Raster::open(&path).unwrap();
        let max = band_max(&raster).unwrap();

        assert_eq!(max, Some(7.0));
    }

    #[test]
    fn test_normalize_nodata() {
        let stats = wgs84_stats(-9999.0);

        let data: Vec<f64> = vec![100.0, -9999.0, 100.0,
                                  -9999.0, -9999.0, -9999.0,
                                  100.0, -9999.0, 100.0];
        let path = create_test_raster("normalize_in.tif", &stats, &data).unwrap();

        let output_path = get_temp_filename("normalize_out.tif");
        let input = Raster::open(&path).unwrap();
        normalize_nodata(&input, &output_path).unwrap();

        let output = Raster::open(&output_path).unwrap();
        let band = output.band().unwrap();
        let result = band.read_as::<f64>((0, 0), (3, 3), (3, 3), None).unwrap();

        assert_eq!(result.data(), vec![100.0, 0.0, 100.0,
                                     0.0, 0.0, 0.0,
                                     100.0, 0.0, 100.0]);
    }

    #[test]
    fn test_extract_class_raster() {
        let stats = wgs84_stats(-9999.0);

        let data: Vec<f64> = vec![1.0, 2.0, 2.0,
                                  -9999.0, 2.0, 1.0,
                                  3.0, 1.0, 2.0];
        let path = create_test_raster("extract_in.tif", &stats, &data).unwrap();

        let output_path = get_temp_filename("extract_out.tif");
        let input = Raster::open(&path).unwrap();
        extract_class_raster(&input, &output_path, 2).unwrap();

        let output = Raster::open(&output_path).unwrap();
        let band = output.band().unwrap();
        let result = band.read_as::<f64>((0, 0), (3, 3), (3, 3), None).unwrap();

        assert_eq!(result.data(), vec![0.0, 2.0, 2.0,
                                     0.0, 2.0, 0.0,
                                     0.0, 0.0, 2.0]);
    }
}
