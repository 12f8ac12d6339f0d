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
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub mod impedance;

pub fn load_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open {:?}", path))?;
    Ok(serde_yaml::from_reader(file)
        .with_context(|| format!("Failed to parse {:?}", path))?)
}

pub fn save_yaml<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create {:?}", path))?;
    Ok(serde_yaml::to_writer(file, value)?)
}

/// Substitutes the {year} placeholder used by the file name templates
pub fn expand_year(template: &str, year: i32) -> String {
    template.replace("{year}", &year.to_string())
}

/// `year` accepts a single integer or a list of integers
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum YearConfig {
    One(i32),
    Many(Vec<i32>),
}

/// The main pipeline configuration (config.yaml).  Everything is optional at
/// parse time; stages fail on the keys they actually need.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PipelineConfig {
    pub year: Option<YearConfig>,

    pub input_dir: Option<String>,
    pub output_dir: Option<String>,
    pub lulc_dir: Option<String>,
    pub vector_dir: Option<String>,
    pub impedance_dir: Option<String>,
    pub osm_dir: Option<String>,

    //file name templates, {year} is substituted
    pub lulc: Option<String>,
    pub osm_data: Option<String>,
    pub user_vector: Option<String>,
    pub impedance_tif: Option<String>,

    //LULC to impedance reclassification table
    pub impedance: Option<String>,

    pub user_matching: Option<String>,
    pub lulc_codes: Option<BTreeMap<String, i64>>,

    //protected areas API
    pub api_url: Option<String>,
    pub token: Option<String>,
    pub marine: Option<String>,
    pub country_codes: Option<Vec<String>>,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        load_yaml(path)
    }

    /// Normalized year list.  Null or missing year warns and yields an empty
    /// list so stages that need one can fail with their own message.
    pub fn years(&self) -> Vec<i32> {
        match &self.year {
            None => {
                warn!("Year variable is null or not found in the configuration file.");
                Vec::new()
            }
            Some(YearConfig::One(year)) => vec![*year],
            Some(YearConfig::Many(years)) => years.clone(),
        }
    }

    /// The year a run processes.  Only the first configured year is used even
    /// when several are present; the rest are reported and skipped.
    pub fn first_year(&self) -> Result<i32> {
        let years = self.years();

        let first = *years.first()
            .context("No year configured in config.yaml")?;

        if years.len() > 1 {
            warn!("{} years configured, only the first ({}) is processed", years.len(), first);
        }

        Ok(first)
    }
}
