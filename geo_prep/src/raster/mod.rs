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
use gdal::raster::RasterBand;
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};

mod algo;
mod combine_rasters;
mod edge_effect;
mod gdal_tools;
mod raster_stats;
mod reclassify;
mod test_util;

pub use algo::*;
pub use combine_rasters::*;
pub use edge_effect::*;
pub use gdal_tools::*;
pub use raster_stats::*;
pub use reclassify::*;
pub use test_util::*;

pub struct Raster {
    pub path: PathBuf,
    pub stats: RasterStats,
    pub dataset: Dataset,
}

impl Raster {
    pub fn open(path: &Path) -> Result<Raster> {
        let dataset = Dataset::open(path)?;

        let stats = RasterStats::new(&dataset)?;

        Ok(Raster {
            path: path.to_path_buf(),
            stats,
            dataset,
        })
    }

    pub fn open_for_update(path: &Path) -> Result<Raster> {
        let dataset = Dataset::open_ex(path, DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
            ..Default::default()
        })?;

        let stats = RasterStats::new(&dataset)?;

        Ok(Raster {
            path: path.to_path_buf(),
            stats,
            dataset,
        })
    }

    pub fn band(&self) -> Result<RasterBand> {
        Ok(self.dataset.rasterband(1)?)
    }
}
