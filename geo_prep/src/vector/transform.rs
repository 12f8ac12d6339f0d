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

//! Vector reprojection and format shuffling, delegated to ogr2ogr.

use std::path::Path;

use anyhow::Result;
use gdal::vector::LayerAccess;
use gdal::Dataset;
use log::info;

use crate::ext::ExternalCommand;

pub fn extract_layer_names(dataset_path: &Path) -> Result<Vec<String>> {
    let dataset = Dataset::open(dataset_path)?;

    let mut names = Vec::new();
    for layer_index in 0..dataset.layer_count() {
        names.push(dataset.layer(layer_index)?.name());
    }

    Ok(names)
}

/// EPSG code of the first layer's CRS, when the authority is known
pub fn dataset_epsg(dataset_path: &Path) -> Result<Option<i32>> {
    let dataset = Dataset::open(dataset_path)?;

    if dataset.layer_count() == 0 {
        return Ok(None);
    }

    let layer = dataset.layer(0)?;
    let srs = match layer.spatial_ref() {
        Some(srs) => srs,
        None => return Ok(None),
    };

    match srs.auth_name() {
        Ok(name) if name == "EPSG" => Ok(srs.auth_code().ok()),
        _ => Ok(None),
    }
}

/// Reprojects a whole dataset into a GeoPackage in the target CRS
pub fn reproject_to_gpkg(input: &Path, output: &Path, target_epsg: i32) -> Result<()> {
    info!("Reprojecting {:?} to EPSG:{}", input, target_epsg);

    ExternalCommand::new("ogr2ogr")
        .args(["-f", "GPKG"])
        .args(["-t_srs", &format!("EPSG:{}", target_epsg)])
        .arg_path(output)
        .arg_path(input)
        .run()?;

    Ok(())
}

/// Copies one dataset into a GeoPackage as a named layer.  With update set
/// the layer is appended to an existing GeoPackage, which is how the per
/// theme/per country files get merged into one.
pub fn copy_to_gpkg_layer(input: &Path, output: &Path, epsg: i32,
                          layer_name: &str, update: bool) -> Result<()> {
    let mut command = ExternalCommand::new("ogr2ogr")
        .args(["-f", "GPKG"])
        .arg_path(output)
        .arg_path(input)
        .args(["-s_srs", &format!("EPSG:{}", epsg)])
        .args(["-t_srs", &format!("EPSG:{}", epsg)])
        .args(["-nln", layer_name]);

    if update {
        command = command.args(["-update", "-append"]);
    }

    command.run()?;

    info!("Added layer {} from {:?} to {:?}", layer_name, input, output);

    Ok(())
}

#[cfg(test)]
mod transform_tests {
    use super::*;
    use gdal::spatial_ref::SpatialRef;
    use gdal::vector::{LayerOptions, OGRwkbGeometryType};
    use gdal::DriverManager;

    #[test]
    fn test_extract_layer_names_and_epsg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("layers.gpkg");

        {
            let driver = DriverManager::get_driver_by_name("GPKG").unwrap();
            let mut dataset = driver.create_vector_only(&path).unwrap();
            let srs = SpatialRef::from_epsg(4326).unwrap();

            for name in ["roads", "railways"] {
                dataset.create_layer(LayerOptions {
                    name,
                    srs: Some(&srs),
                    ty: OGRwkbGeometryType::wkbLineString,
                    options: None,
                }).unwrap();
            }
        }

        let names = extract_layer_names(&path).unwrap();
        assert_eq!(names, vec!["roads".to_string(), "railways".to_string()]);

        assert_eq!(dataset_epsg(&path).unwrap(), Some(4326));
    }
}
