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

//! Token-authenticated client for the protected-areas API, queried per ISO3
//! country code.

use std::time::Duration;

use anyhow::{bail, Result};

pub struct PaApiClient {
    api_url: String,
    token: String,
    marine: bool,
    client: reqwest::blocking::Client,
}

/// The config stores flags as 'true'/'false' strings
pub fn flag_is_true(value: Option<&str>) -> bool {
    matches!(value, Some(v) if v.eq_ignore_ascii_case("true"))
}

impl PaApiClient {
    pub fn new(api_url: &str, token: &str, marine: bool) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()?;

        Ok(PaApiClient {
            api_url: api_url.to_string(),
            token: token.to_string(),
            marine,
            client,
        })
    }

    /// GeoJSON of the country's protected areas, most up to date state
    pub fn fetch_country(&self, country_code: &str) -> Result<serde_json::Value> {
        let response = self.client.get(&self.api_url)
            .query(&[
                ("token", self.token.as_str()),
                ("country", country_code),
                ("marine", if self.marine { "true" } else { "false" }),
            ])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            bail!("Protected areas API returned {} for {}: {}",
                  status, country_code, response.text().unwrap_or_default());
        }

        Ok(response.json()?)
    }
}

#[cfg(test)]
mod pa_api_tests {
    use super::*;

    #[test]
    fn test_flag_is_true() {
        assert!(flag_is_true(Some("true")));
        assert!(flag_is_true(Some("True")));
        assert!(!flag_is_true(Some("false")));
        assert!(!flag_is_true(Some("yes")));
        assert!(!flag_is_true(None));
    }
}
