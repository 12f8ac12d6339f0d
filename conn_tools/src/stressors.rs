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

//! The stressor registry and the discovery stages that populate it together
//! with the impedance configuration.  Each stage takes the setup by value and
//! returns the updated one, so nothing is shared-and-mutated between
//! collaborators.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use serde_yaml::Value;

use geo_prep::config::impedance::{ensure_initial_lulc, ensure_stressor_block, StressorParams};
use geo_prep::config::load_yaml;

/// Ordered alias -> stressor raster path mapping.  Aliases are unique; a
/// duplicate registration keeps the first entry.
#[derive(Debug, Default, Clone)]
pub struct StressorRegistry {
    entries: Vec<(String, PathBuf)>,
}

impl StressorRegistry {
    pub fn register(&mut self, alias: &str, path: PathBuf) -> bool {
        if self.entries.iter().any(|(existing, _)| existing == alias) {
            warn!("Stressor '{}' is already registered, keeping the first registration", alias);
            return false;
        }

        self.entries.push((alias.to_string(), path));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.entries.iter().map(|(alias, path)| (alias.as_str(), path.as_path()))
    }

    pub fn aliases(&self) -> Vec<String> {
        self.entries.iter().map(|(alias, _)| alias.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The value threaded through the discovery stages
#[derive(Debug)]
pub struct ImpedanceSetup {
    pub config_impedance: Value,
    pub registry: StressorRegistry,
}

pub trait StressorDiscovery {
    fn name(&self) -> &'static str;

    fn discover(&self, setup: ImpedanceSetup) -> Result<ImpedanceSetup>;
}

/// Stressor classes of the (enriched) LULC raster itself, one per configured
/// lulc_codes alias.
pub struct LulcStressorDiscovery {
    pub year: i32,
    pub output_dir: PathBuf,
    pub lulc_codes: BTreeMap<String, i64>,
    pub template: StressorParams,
}

impl StressorDiscovery for LulcStressorDiscovery {
    fn name(&self) -> &'static str {
        "lulc stressors"
    }

    fn discover(&self, mut setup: ImpedanceSetup) -> Result<ImpedanceSetup> {
        for alias in self.lulc_codes.keys() {
            let stressor_alias = format!("lulc_{}", alias);
            let raster_path = self.output_dir
                .join(format!("lulc_{}_{}.tif", alias, self.year));

            if setup.registry.register(&stressor_alias, raster_path) {
                ensure_stressor_block(&mut setup.config_impedance, &stressor_alias,
                                      &self.template)?;
            }
        }

        Ok(setup)
    }
}

/// Stressors rasterized from the OSM vectors, listed in the stressors.yaml
/// file written by the enrichment stage.
pub struct OsmStressorDiscovery {
    pub stressors_file: PathBuf,
    pub template: StressorParams,
}

impl StressorDiscovery for OsmStressorDiscovery {
    fn name(&self) -> &'static str {
        "osm stressors"
    }

    fn discover(&self, mut setup: ImpedanceSetup) -> Result<ImpedanceSetup> {
        let stressors: Value = load_yaml(&self.stressors_file)?;
        let mapping = stressors.as_mapping()
            .with_context(|| format!("{:?} is not a mapping", self.stressors_file))?;

        for (key, value) in mapping.iter() {
            let alias = key.as_str()
                .with_context(|| format!("Non-string stressor alias in {:?}", self.stressors_file))?;
            let path = value.as_str()
                .with_context(|| format!("Stressor '{}' has a non-string raster path", alias))?;

            if setup.registry.register(alias, PathBuf::from(path)) {
                ensure_stressor_block(&mut setup.config_impedance, alias, &self.template)?;
            }
        }

        Ok(setup)
    }
}

/// Sequences the discovery stages and returns the final registry plus the
/// enriched impedance configuration.
pub struct ImpedanceConfigProcessor<'a> {
    pub discoveries: Vec<&'a dyn StressorDiscovery>,
}

impl ImpedanceConfigProcessor<'_> {
    pub fn process(&self, config_impedance: Value) -> Result<ImpedanceSetup> {
        let mut setup = ImpedanceSetup {
            config_impedance,
            registry: StressorRegistry::default(),
        };

        ensure_initial_lulc(&mut setup.config_impedance);

        for discovery in &self.discoveries {
            info!("Discovering {}", discovery.name());
            setup = discovery.discover(setup)?;
        }

        info!("{} stressor(s) registered", setup.registry.len());

        Ok(setup)
    }
}

#[cfg(test)]
mod stressor_tests {
    use super::*;
    use geo_prep::config::impedance::find_stressor_params;
    use std::io::Write;

    #[test]
    fn test_registry_first_registration_wins() {
        let mut registry = StressorRegistry::default();

        assert!(registry.register("roads", PathBuf::from("first.tif")));
        assert!(!registry.register("roads", PathBuf::from("second.tif")));

        assert_eq!(registry.len(), 1);
        let (_, path) = registry.iter().next().unwrap();
        assert_eq!(path, Path::new("first.tif"));
    }

    #[test]
    fn test_registry_keeps_insertion_order() {
        let mut registry = StressorRegistry::default();
        registry.register("rail", PathBuf::from("rail.tif"));
        registry.register("roads_primary", PathBuf::from("roads.tif"));

        assert_eq!(registry.aliases(), vec!["rail".to_string(), "roads_primary".to_string()]);
    }

    #[test]
    fn test_lulc_discovery_registers_and_enriches() {
        let mut lulc_codes = BTreeMap::new();
        lulc_codes.insert("roads".to_string(), 7);
        lulc_codes.insert("waterbodies".to_string(), 4);

        let discovery = LulcStressorDiscovery {
            year: 2018,
            output_dir: PathBuf::from("out"),
            lulc_codes,
            template: StressorParams::default(),
        };

        let setup = ImpedanceSetup {
            config_impedance: Value::Null,
            registry: StressorRegistry::default(),
        };

        let setup = discovery.discover(setup).unwrap();

        assert_eq!(setup.registry.aliases(),
                   vec!["lulc_roads".to_string(), "lulc_waterbodies".to_string()]);

        let (_, path) = setup.registry.iter().next().unwrap();
        assert_eq!(path, Path::new("out/lulc_roads_2018.tif"));

        assert!(find_stressor_params(&setup.config_impedance, "lulc_roads").is_some());
        assert!(find_stressor_params(&setup.config_impedance, "lulc_waterbodies").is_some());
    }

    #[test]
    fn test_osm_discovery_reads_stressors_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"roads: out/roads_2018.tif\nrailways: out/railways_2018.tif\n").unwrap();
        file.flush().unwrap();

        let discovery = OsmStressorDiscovery {
            stressors_file: file.path().to_path_buf(),
            template: StressorParams::default(),
        };

        let setup = ImpedanceSetup {
            config_impedance: Value::Null,
            registry: StressorRegistry::default(),
        };

        let setup = discovery.discover(setup).unwrap();

        assert_eq!(setup.registry.aliases(),
                   vec!["roads".to_string(), "railways".to_string()]);
        assert!(find_stressor_params(&setup.config_impedance, "railways").is_some());
    }

    #[test]
    fn test_processor_sequences_lulc_then_osm() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"roads: out/roads_2018.tif\n").unwrap();
        file.flush().unwrap();

        let mut lulc_codes = BTreeMap::new();
        lulc_codes.insert("forest".to_string(), 3);

        let template = StressorParams::default();

        let lulc_discovery = LulcStressorDiscovery {
            year: 2018,
            output_dir: PathBuf::from("out"),
            lulc_codes,
            template: template.clone(),
        };
        let osm_discovery = OsmStressorDiscovery {
            stressors_file: file.path().to_path_buf(),
            template,
        };

        let processor = ImpedanceConfigProcessor {
            discoveries: vec![&lulc_discovery, &osm_discovery],
        };
        let setup = processor.process(Value::Null).unwrap();

        //LULC stressors first, then OSM stressors
        assert_eq!(setup.registry.aliases(),
                   vec!["lulc_forest".to_string(), "roads".to_string()]);

        //initial_lulc got set up alongside
        assert_eq!(setup.config_impedance.get("initial_lulc").and_then(|v| v.get("enabled")),
                   Some(&Value::from("false")));
    }
}
