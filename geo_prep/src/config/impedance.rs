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

//! The per-stressor decay configuration stored in config_impedance.yaml.
//!
//! The file is generated with default parameter blocks, may be hand-edited,
//! and is validated against the declared schema before the accumulation step
//! consumes it.

use anyhow::{bail, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::decay;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclineType {
    #[serde(rename = "exp_decline")]
    ExpDecline,
    #[serde(rename = "prop_decline")]
    PropDecline,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpDeclineParams {
    pub lambda_decay: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropDeclineParams {
    pub k_value: f64,
}

/// One stressor's parameter block.  Both decay blocks are always present so a
/// user can switch decline_type without re-generating the file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressorParams {
    pub types: Option<String>,
    pub decline_type: DeclineType,
    pub exp_decline: ExpDeclineParams,
    pub prop_decline: PropDeclineParams,
}

impl Default for StressorParams {
    fn default() -> Self {
        StressorParams {
            types: None,
            decline_type: DeclineType::ExpDecline,
            exp_decline: ExpDeclineParams { lambda_decay: 500.0 },
            prop_decline: PropDeclineParams { k_value: 500.0 },
        }
    }
}

impl StressorParams {
    pub fn effect(&self, distance: f64, impedance_max: f64) -> f64 {
        match self.decline_type {
            DeclineType::ExpDecline =>
                decay::exp_decline(distance, self.exp_decline.lambda_decay, impedance_max),
            DeclineType::PropDecline =>
                decay::prop_decline(distance, self.prop_decline.k_value, impedance_max),
        }
    }
}

/// Ensures the initial_lulc block exists with an enabled flag, covering the
/// half-present case where the block is there but enabled is not.
pub fn ensure_initial_lulc(config: &mut Value) {
    if config.is_null() {
        *config = Value::Mapping(Mapping::new());
    }

    let mapping = match config.as_mapping_mut() {
        Some(m) => m,
        None => return,
    };

    let key = Value::from("initial_lulc");
    let enabled_key = Value::from("enabled");

    match mapping.get_mut(&key).and_then(|v| v.as_mapping_mut()) {
        Some(initial_lulc) => {
            let enabled = initial_lulc.get(&enabled_key);
            if enabled.is_none() || enabled == Some(&Value::Null) {
                initial_lulc.insert(enabled_key, Value::from("false"));
            }
        }
        None => {
            let mut initial_lulc = Mapping::new();
            initial_lulc.insert(enabled_key, Value::from("false"));
            mapping.insert(key, Value::Mapping(initial_lulc));
        }
    }
}

/// Finds a stressor's parameter block, either top level or nested under
/// another stressor's `types` mapping.
pub fn find_stressor_params<'a>(config: &'a Value, alias: &str) -> Option<&'a Value> {
    let mapping = config.as_mapping()?;
    let alias_key = Value::from(alias);

    if let Some(params) = mapping.get(&alias_key) {
        return Some(params);
    }

    for (_, value) in mapping.iter() {
        if let Some(types) = value.get("types").and_then(|t| t.as_mapping()) {
            if let Some(params) = types.get(&alias_key) {
                return Some(params);
            }
        }
    }

    None
}

/// Inserts a default parameter block for the alias when none exists yet.
/// An existing (possibly user-edited) block is left alone.
pub fn ensure_stressor_block(config: &mut Value, alias: &str, template: &StressorParams) -> Result<bool> {
    if config.is_null() {
        *config = Value::Mapping(Mapping::new());
    }

    if find_stressor_params(config, alias).is_some() {
        return Ok(false);
    }

    let mapping = match config.as_mapping_mut() {
        Some(m) => m,
        None => bail!("impedance configuration is not a mapping"),
    };

    mapping.insert(Value::from(alias), serde_yaml::to_value(template)?);

    Ok(true)
}

/// Parses a stressor's validated block into the typed form.
pub fn parse_stressor_params(config: &Value, alias: &str) -> Result<StressorParams> {
    let block = match find_stressor_params(config, alias) {
        Some(b) => b,
        None => bail!("stressor '{}' has no parameter block in the impedance configuration", alias),
    };

    Ok(serde_yaml::from_value(block.clone())?)
}

fn yaml_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

fn types_compatible(expected: &Value, actual: &Value) -> bool {
    match expected {
        //`types` is declared as an optional string
        Value::Null => matches!(actual, Value::Null | Value::String(_)),
        Value::Bool(_) => actual.is_bool(),
        Value::Number(_) => actual.is_number(),
        Value::String(_) => actual.is_string(),
        Value::Sequence(_) => actual.is_sequence(),
        Value::Mapping(_) => actual.is_mapping(),
        Value::Tagged(_) => false,
    }
}

fn collect_block_violations(path: &str, block: &Mapping, template: &Mapping,
                            violations: &mut Vec<String>) {
    for (key, value) in block.iter() {
        let key_name = key.as_str().unwrap_or("?");

        let expected = match template.get(key) {
            None => {
                violations.push(format!("{}: unexpected parameter '{}'", path, key_name));
                continue;
            }
            Some(e) => e,
        };

        if !types_compatible(expected, value) {
            violations.push(format!("{}: parameter '{}' expected {} but got {}",
                                    path, key_name,
                                    yaml_type_name(expected), yaml_type_name(value)));
            continue;
        }

        if let (Some(expected_map), Some(value_map)) = (expected.as_mapping(), value.as_mapping()) {
            let nested_path = format!("{}.{}", path, key_name);
            collect_block_violations(&nested_path, value_map, expected_map, violations);
        }
    }

    for (key, _) in template.iter() {
        if !block.contains_key(key) {
            violations.push(format!("{}: parameter '{}' is missing",
                                    path, key.as_str().unwrap_or("?")));
        }
    }
}

/// Collects every violation of one stressor's block against the template.
pub fn validate_stressor_block(alias: &str, block: &Value, template: &StressorParams) -> Vec<String> {
    let mut violations = Vec::new();

    let template_value = serde_yaml::to_value(template)
        .expect("template serializes to a mapping");
    let template_map = template_value.as_mapping()
        .expect("template serializes to a mapping");

    match block.as_mapping() {
        Some(block_map) => {
            collect_block_violations(alias, block_map, template_map, &mut violations);
        }
        None => {
            violations.push(format!("{}: parameter block is not a mapping", alias));
        }
    }

    violations
}

/// Validates every registered stressor against the parameter template.  Each
/// violation is warned individually so the user sees all of them in one run,
/// then a single error aborts.
pub fn validate_impedance_config(config: &Value, aliases: &[String],
                                 template: &StressorParams) -> Result<()> {
    let mut violations = Vec::new();

    for alias in aliases {
        match find_stressor_params(config, alias) {
            Some(block) => {
                violations.extend(validate_stressor_block(alias, block, template));
            }
            None => {
                violations.push(format!("{}: no parameter block found", alias));
            }
        }
    }

    for violation in &violations {
        warn!("{}", violation);
    }

    if !violations.is_empty() {
        bail!("Validation of the impedance configuration failed with {} problem(s). \
               Please update the configuration file.", violations.len());
    }

    Ok(())
}
