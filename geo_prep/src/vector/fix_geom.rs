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
use std::path::Path;

use anyhow::{Context, Result};
use gdal::cpl::CslStringList;
use gdal::vector::{Geometry, LayerAccess};
use gdal::{Dataset, DatasetOptions, GdalOpenFlags};
use log::{debug, info, warn};

/// Per-layer outcome of a validity repair pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixGeomReport {
    pub layer_name: String,
    pub needed_fix: usize,
    pub fixed: usize,
    pub unfixable: usize,
}

/// Scans every layer of a vector dataset and repairs invalid geometries in
/// place.  Features whose geometry cannot be made valid are left untouched
/// and counted.
pub fn fix_geometries(dataset_path: &Path) -> Result<Vec<FixGeomReport>> {
    let dataset = Dataset::open_ex(dataset_path, DatasetOptions {
        open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_VECTOR,
        ..Default::default()
    })?;

    let mut reports = Vec::new();

    for layer_index in 0..dataset.layer_count() {
        let mut layer = dataset.layer(layer_index)?;
        let layer_name = layer.name();

        //first pass: find the invalid geometries and repair them off line
        let mut repaired: Vec<(u64, Geometry)> = Vec::new();
        let mut needed_fix = 0;
        let mut unfixable = 0;

        for feature in layer.features() {
            let geometry = match feature.geometry() {
                Some(g) => g,
                None => continue,
            };

            if geometry.is_valid() {
                continue;
            }

            needed_fix += 1;

            let fid = match feature.fid() {
                Some(fid) => fid,
                None => {
                    warn!("Invalid geometry without fid in layer '{}'", layer_name);
                    unfixable += 1;
                    continue;
                }
            };

            match geometry.make_valid(&CslStringList::new()) {
                Ok(fixed) if fixed.is_valid() => {
                    debug!("Fixed invalid geometry in layer '{}', feature ID: {}", layer_name, fid);
                    repaired.push((fid, fixed));
                }
                _ => {
                    warn!("Could not fix geometry in layer '{}', feature ID: {}", layer_name, fid);
                    unfixable += 1;
                }
            }
        }

        //second pass: write the repaired geometries back
        let mut fixed = 0;
        for (fid, geometry) in repaired {
            let mut feature = layer.feature(fid)
                .with_context(|| format!("Feature {} vanished from layer '{}'", fid, layer_name))?;
            feature.set_geometry(geometry)?;
            layer.set_feature(feature)?;
            fixed += 1;
        }

        if needed_fix == 0 {
            info!("All geometries of features in the layer '{}' are valid.", layer_name);
        } else {
            info!("Layer '{}': {} geometries fixed.", layer_name, fixed);
            info!("Layer '{}': {} geometries could not be fixed.", layer_name, unfixable);
        }

        reports.push(FixGeomReport {
            layer_name,
            needed_fix,
            fixed,
            unfixable,
        });
    }

    Ok(reports)
}

#[cfg(test)]
mod fix_geom_tests {
    use super::*;
    use gdal::spatial_ref::SpatialRef;
    use gdal::vector::{LayerOptions, OGRwkbGeometryType};
    use gdal::DriverManager;

    fn create_test_gpkg(path: &Path, wkts: &[&str]) {
        let driver = DriverManager::get_driver_by_name("GPKG").unwrap();
        let mut dataset = driver.create_vector_only(path).unwrap();

        let srs = SpatialRef::from_epsg(4326).unwrap();
        let mut layer = dataset.create_layer(LayerOptions {
            name: "test_layer",
            srs: Some(&srs),
            ty: OGRwkbGeometryType::wkbPolygon,
            options: None,
        }).unwrap();

        for wkt in wkts {
            let geometry = Geometry::from_wkt(wkt).unwrap();
            layer.create_feature(geometry).unwrap();
        }
    }

    #[test]
    fn test_fix_geometries_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fix_geom.gpkg");

        //a bowtie (self intersection, invalid) and a plain square (valid)
        create_test_gpkg(&path, &[
            "POLYGON((0 0,1 1,1 0,0 1,0 0))",
            "POLYGON((2 2,3 2,3 3,2 3,2 2))",
        ]);

        let reports = fix_geometries(&path).unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].layer_name, "test_layer");
        assert_eq!(reports[0].needed_fix, 1);
        assert_eq!(reports[0].fixed, 1);
        assert_eq!(reports[0].unfixable, 0);

        //a second pass finds nothing left to repair
        let reports = fix_geometries(&path).unwrap();
        assert_eq!(reports[0].needed_fix, 0);
        assert_eq!(reports[0].fixed, 0);
    }

    #[test]
    fn test_fix_geometries_all_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all_valid.gpkg");

        create_test_gpkg(&path, &[
            "POLYGON((0 0,1 0,1 1,0 1,0 0))",
            "POLYGON((2 2,3 2,3 3,2 3,2 2))",
        ]);

        let reports = fix_geometries(&path).unwrap();

        assert_eq!(reports[0].needed_fix, 0);
        assert_eq!(reports[0].fixed, 0);
        assert_eq!(reports[0].unfixable, 0);
    }
}
