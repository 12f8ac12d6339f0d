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
use core::fmt;

use anyhow::Result;
use float_cmp::{ApproxEq, F64Margin};
use gdal::spatial_ref::SpatialRef;
use gdal::Dataset;
use serde::Deserialize;

pub const MEDIUM_EPSILON: f64 = 1e-10;

// In lat/lon this is less than a meter
pub const LARGE_EPSILON: f64 = 1e-6;

pub fn assert_float_within_eps(a: f64, b: f64, eps: f64, msg: &str) {
    let diff = (a - b).abs();
    if diff > eps {
        let message = format!("{} Val 1: {} Val 2: {} Abs. Difference: {}  Eps: {}", msg,
                              a, b, diff, eps);
        panic!("{}", message);
    }
}

/// Shortcut when dealing with f64 values & nodata.  Handles the f32 case where
/// the sentinel read back from the band is a rounded copy of the f64 one.
pub fn is_nodata_value(value: f64, no_data_value: f64) -> bool {
    value == no_data_value || value as f32 == no_data_value as f32
}

/// Helper struct to hold stats of a raster
#[derive(Debug, Deserialize, Clone, Default)]
pub struct RasterStats {
    pub origin_y: f64,
    pub origin_x: f64,
    pub pixel_height: f64,
    pub pixel_width: f64,
    pub num_rows: u32,
    pub num_cols: u32,
    pub no_data_value: f64,

    //WKT projection string
    pub projection: String,
}

impl fmt::Display for RasterStats {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Origin X,Y: {}, {}\nRight/Bottom: {},{}\nPixel Width/Height: {},{}\nRows: {} Cols: {}\nNo data value: {}\nProjection: {}",
               self.origin_x,
               self.origin_y,
               self.right_x_coord(),
               self.bottom_y_coord(),
               self.pixel_width,
               self.pixel_height,
               self.num_rows,
               self.num_cols,
               self.no_data_value,
               &self.projection
        )
    }
}

impl RasterStats {
    pub fn new(dataset: &Dataset) -> Result<Self> {
        let geotransform = dataset.geo_transform()?;

        let pixel_width = geotransform[1];
        let pixel_height = geotransform[5];
        let origin_x = geotransform[0];
        let origin_y = geotransform[3];

        let (num_cols, num_rows) = dataset.raster_size();

        let band = dataset.rasterband(1)?;
        let no_data_value = band.no_data_value().unwrap_or(f64::MIN);

        let projection = dataset.projection();

        Ok(RasterStats {
            origin_y,
            origin_x,
            pixel_width,
            pixel_height,
            num_cols: num_cols as u32,
            num_rows: num_rows as u32,
            no_data_value,
            projection,
        })
    }

    /// Calculates projected x coordinate (left side) from raster_x
    pub fn calc_x_coord(&self, raster_x: i32) -> f64 {
        self.origin_x + self.pixel_width * raster_x as f64
    }

    pub fn right_x_coord(&self) -> f64 {
        self.calc_x_coord(self.num_cols as i32)
    }

    /// Calculates the top side.  Note pixel height is negative
    pub fn calc_y_coord(&self, raster_y: i32) -> f64 {
        self.origin_y + self.pixel_height * raster_y as f64
    }

    pub fn bottom_y_coord(&self) -> f64 {
        self.calc_y_coord(self.num_rows as i32)
    }

    //Converts projected coordinate to raster_x
    pub fn calc_x(&self, x_coord: f64) -> i32 {
        ((x_coord - self.origin_x) / self.pixel_width).floor() as _
    }

    pub fn calc_y(&self, y_coord: f64) -> i32 {
        ((y_coord - self.origin_y) / self.pixel_height).floor() as _
    }

    /// xmin, xmax, ymin, ymax
    pub fn extent(&self) -> (f64, f64, f64, f64) {
        (self.origin_x,
         self.right_x_coord(),
         self.bottom_y_coord(),
         self.origin_y)
    }

    /// Pixel size, assuming square pixels
    pub fn cell_size(&self) -> f64 {
        self.pixel_width
    }

    pub fn spatial_ref(&self) -> Result<SpatialRef> {
        Ok(SpatialRef::from_wkt(&self.projection)?)
    }

    /// Whether the raster CRS is projected (cartesian) rather than geographic
    pub fn is_cartesian(&self) -> Result<bool> {
        Ok(self.spatial_ref()?.is_projected())
    }

    /// EPSG code of the raster CRS, when the authority is known
    pub fn epsg_code(&self) -> Option<i32> {
        let srs = self.spatial_ref().ok()?;
        match srs.auth_name() {
            Ok(name) if name == "EPSG" => srs.auth_code().ok(),
            _ => None,
        }
    }

    pub fn is_nodata(&self, in_value: f64) -> bool {
        is_nodata_value(in_value, self.no_data_value)
    }

    pub fn assert_equals_except_no_data(&self, rhs: &Self) {
        assert_eq!(self.num_cols, rhs.num_cols);
        assert_eq!(self.num_rows, rhs.num_rows);
        assert_float_within_eps(self.origin_x, rhs.origin_x, LARGE_EPSILON, "Origin X");
        assert_float_within_eps(self.origin_y, rhs.origin_y, LARGE_EPSILON, "Origin Y");

        assert_float_within_eps(self.pixel_height, rhs.pixel_height, MEDIUM_EPSILON, "pixel height");
        assert_float_within_eps(self.pixel_width, rhs.pixel_width, MEDIUM_EPSILON, "pixel width");
    }

    /// Same grid: dimensions, origin and pixel size all match within epsilon
    pub fn same_grid(&self, rhs: &Self) -> bool {
        self.num_cols == rhs.num_cols
            && self.num_rows == rhs.num_rows
            && self.origin_x.approx_eq(rhs.origin_x, F64Margin { epsilon: LARGE_EPSILON, ulps: 0 })
            && self.origin_y.approx_eq(rhs.origin_y, F64Margin { epsilon: LARGE_EPSILON, ulps: 0 })
            && self.pixel_width.approx_eq(rhs.pixel_width, F64Margin { epsilon: MEDIUM_EPSILON, ulps: 0 })
            && self.pixel_height.approx_eq(rhs.pixel_height, F64Margin { epsilon: MEDIUM_EPSILON, ulps: 0 })
    }
}
