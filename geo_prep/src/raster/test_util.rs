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
use std::path::{Path, PathBuf};

use anyhow::Result;
use gdal::raster::{Buffer, GdalType};
use uuid::Uuid;

use crate::raster::{create_empty_raster, Raster, RasterStats};

pub fn get_temp_filename(file_name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(Uuid::new_v4().to_string())
        .join(file_name)
}

pub fn create_test_raster<T: Copy + GdalType>(in_file_name: &str,
                                              input_raster_stats: &RasterStats,
                                              input_raster_data: &[T]) -> Result<PathBuf> {
    create_test_raster_with_path(
        &get_temp_filename(in_file_name),
        input_raster_stats, input_raster_data)
}

pub fn create_test_raster_with_path<T: Copy + GdalType>(input_path: &Path,
                                                        input_raster_stats: &RasterStats,
                                                        input_raster_data: &[T]) -> Result<PathBuf> {
    assert!(!input_path.exists());

    create_empty_raster::<T>(input_path, input_raster_stats, false)?;

    assert!(input_path.exists());

    {
        let input_raster = Raster::open_for_update(input_path)?;

        let mut input_raster_band = input_raster.dataset.rasterband(1)?;

        let num_rows = input_raster_stats.num_rows as usize;
        let num_cols = input_raster_stats.num_cols as usize;

        input_raster_band.write((0, 0), (num_cols, num_rows),
                                &mut Buffer::new((num_cols, num_rows), input_raster_data.to_vec()))?;
    }

    Ok(input_path.to_path_buf())
}
