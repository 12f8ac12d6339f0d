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

//! LULC code to impedance value reclassification, driven by a CSV table with
//! `lulc` and `impedance` columns.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use gdal::raster::Buffer;
use log::info;

use crate::raster::{create_empty_raster, Raster};
use crate::util::RasterChunkIterator;

/// The connectivity model downstream needs a positive nodata value
pub const RECLASS_NO_DATA: f64 = 9999.0;

#[derive(Debug, Clone)]
pub struct ReclassTable {
    mapping: BTreeMap<i64, f64>,
    has_decimal: bool,
}

impl ReclassTable {
    pub fn from_csv(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("Failed to open reclassification table {:?}", path))?;

        let headers = reader.headers()?.clone();
        let lulc_idx = headers.iter()
            .position(|h| h.trim_start_matches('\u{feff}') == "lulc")
            .context("Reclassification table has no 'lulc' column")?;
        let impedance_idx = headers.iter()
            .position(|h| h == "impedance")
            .context("Reclassification table has no 'impedance' column")?;

        let mut mapping = BTreeMap::new();
        let mut has_decimal = false;

        for record in reader.records() {
            let record = record?;

            let lulc: f64 = record.get(lulc_idx)
                .context("Short record in reclassification table")?
                .parse()
                .with_context(|| format!("Non numeric lulc value in {:?}", path))?;
            let impedance: f64 = record.get(impedance_idx)
                .context("Short record in reclassification table")?
                .parse()
                .with_context(|| format!("Non numeric impedance value in {:?}", path))?;

            if impedance.fract() != 0.0 {
                has_decimal = true;
            }

            mapping.insert(lulc.round() as i64, impedance);
        }

        if mapping.is_empty() {
            bail!("Reclassification table {:?} is empty", path);
        }

        //align the usual nodata sentinels (int16/int32 minimums and 0) on the
        //positive nodata value
        for sentinel in [-2147483647, -32768, 0] {
            mapping.insert(sentinel, RECLASS_NO_DATA);
        }

        Ok(ReclassTable { mapping, has_decimal })
    }

    pub fn lookup(&self, value: f64) -> Option<f64> {
        self.mapping.get(&(value.round() as i64)).copied()
    }

    pub fn has_decimal(&self) -> bool {
        self.has_decimal
    }

    /// GDAL type name used for the reclassified rasters
    pub fn gdal_output_type(&self) -> &'static str {
        if self.has_decimal { "Float32" } else { "Int32" }
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}

/// Rewrites every cell of the input through the reclassification table.  An
/// unmapped cell value is a data error and aborts.
pub fn reclassify_raster(input_path: &Path, output_path: &Path,
                         table: &ReclassTable) -> Result<()> {
    let input = Raster::open(input_path)?;

    let mut out_stats = input.stats.clone();
    out_stats.no_data_value = RECLASS_NO_DATA;

    if table.has_decimal() {
        create_empty_raster::<f32>(output_path, &out_stats, false)?;
    } else {
        create_empty_raster::<i32>(output_path, &out_stats, false)?;
    }

    let output = Raster::open_for_update(output_path)?;
    let mut output_band = output.band()?;
    let input_band = input.band()?;

    for window in RasterChunkIterator::new(input.stats.num_rows as usize,
                                           input.stats.num_cols as usize, 10) {
        let data = input_band.read_as::<f64>(window.window_offset,
                                             window.window_size,
                                             window.window_size,
                                             None)?;

        let mut reclassified = Vec::with_capacity(data.data().len());
        for &v in data.data().iter() {
            match table.lookup(v) {
                Some(impedance) => reclassified.push(impedance),
                None => bail!("Value {} of {:?} is not present in the reclassification table",
                              v, input_path),
            }
        }

        output_band.write(window.window_offset,
                          window.window_size,
                          &mut Buffer::new(window.window_size, reclassified))?;
    }

    info!("Reclassification complete for {:?}", input_path);

    Ok(())
}

#[cfg(test)]
mod reclassify_tests {
    use super::*;
    use std::io::Write;

    fn write_table(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_integer_table() {
        let file = write_table("lulc,impedance\n1,10\n2,50\n3,100\n");
        let table = ReclassTable::from_csv(file.path()).unwrap();

        assert!(!table.has_decimal());
        assert_eq!(table.gdal_output_type(), "Int32");
        assert_eq!(table.lookup(2.0), Some(50.0));

        //nodata alignment entries
        assert_eq!(table.lookup(0.0), Some(RECLASS_NO_DATA));
        assert_eq!(table.lookup(-32768.0), Some(RECLASS_NO_DATA));
        assert_eq!(table.lookup(-2147483647.0), Some(RECLASS_NO_DATA));

        assert_eq!(table.lookup(42.0), None);
    }

    #[test]
    fn test_decimal_table() {
        let file = write_table("lulc,impedance\n1,10.5\n2,50\n");
        let table = ReclassTable::from_csv(file.path()).unwrap();

        assert!(table.has_decimal());
        assert_eq!(table.gdal_output_type(), "Float32");
        assert_eq!(table.lookup(1.0), Some(10.5));
    }

    #[test]
    fn test_bom_header() {
        let file = write_table("\u{feff}lulc,impedance\n1,10\n");
        let table = ReclassTable::from_csv(file.path()).unwrap();

        assert_eq!(table.lookup(1.0), Some(10.0));
    }

    #[test]
    fn test_empty_table_fails() {
        let file = write_table("lulc,impedance\n");
        assert!(ReclassTable::from_csv(file.path()).is_err());
    }

    #[test]
    fn test_reclassify_raster() {
        use crate::raster::{create_test_raster, get_temp_filename, RasterStats};
        use gdal::spatial_ref::SpatialRef;

        let file = write_table("lulc,impedance\n1,10\n2,50\n");
        let table = ReclassTable::from_csv(file.path()).unwrap();

        let srs = SpatialRef::from_epsg(4326).unwrap();
        let stats = RasterStats {
            origin_y: 46.0,
            origin_x: 6.0,
            pixel_height: -0.005,
            pixel_width: 0.004,
            num_rows: 2,
            num_cols: 2,
            no_data_value: 0.0,
            projection: srs.to_wkt().unwrap(),
        };

        let data: Vec<f64> = vec![1.0, 2.0, 0.0, 2.0];
        let input_path = create_test_raster("reclass_in.tif", &stats, &data).unwrap();

        let output_path = get_temp_filename("reclass_out.tif");
        reclassify_raster(&input_path, &output_path, &table).unwrap();

        let output = Raster::open(&output_path).unwrap();
        let result = output.band().unwrap()
            .read_as::<f64>((0, 0), (2, 2), (2, 2), None).unwrap();

        assert_eq!(result.data(), vec![10.0, 50.0, RECLASS_NO_DATA, 50.0]);
        assert_eq!(output.stats.no_data_value, RECLASS_NO_DATA);
    }

    #[test]
    fn test_reclassify_unmapped_value_fails() {
        use crate::raster::{create_test_raster, get_temp_filename, RasterStats};
        use gdal::spatial_ref::SpatialRef;

        let file = write_table("lulc,impedance\n1,10\n");
        let table = ReclassTable::from_csv(file.path()).unwrap();

        let srs = SpatialRef::from_epsg(4326).unwrap();
        let stats = RasterStats {
            origin_y: 46.0,
            origin_x: 6.0,
            pixel_height: -0.005,
            pixel_width: 0.004,
            num_rows: 1,
            num_cols: 2,
            no_data_value: 0.0,
            projection: srs.to_wkt().unwrap(),
        };

        let input_path = create_test_raster("reclass_bad.tif", &stats,
                                            &vec![1.0f64, 99.0]).unwrap();

        let output_path = get_temp_filename("reclass_bad_out.tif");
        assert!(reclassify_raster(&input_path, &output_path, &table).is_err());
    }
}
