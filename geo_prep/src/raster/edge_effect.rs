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

//! Cell math for the edge-effect accumulator: decayed stressor effects and
//! the running cell-wise maximum across stressors.

use anyhow::Result;
use ndarray::Array2;

use crate::config::impedance::StressorParams;
use crate::raster::is_nodata_value;

/// Turns a proximity (distance to feature) array into a decayed effect array.
/// Nodata cells stay nodata.
pub fn apply_decay(proximity: &Array2<f64>, no_data_value: f64,
                   params: &StressorParams, impedance_max: f64) -> Array2<f64> {
    proximity.map(|&distance| {
        if is_nodata_value(distance, no_data_value) {
            no_data_value
        } else {
            params.effect(distance, impedance_max)
        }
    })
}

/// Merges one stressor's effect into the running maximum.  The first stressor
/// initializes the accumulator.
pub fn accumulate_max(accumulator: Option<Array2<f64>>, effect: &Array2<f64>,
                      no_data_value: f64) -> Result<Array2<f64>> {
    let mut acc = match accumulator {
        None => return Ok(effect.clone()),
        Some(acc) => acc,
    };

    anyhow::ensure!(acc.dim() == effect.dim(),
                    "Accumulator is {:?} but effect raster is {:?}",
                    acc.dim(), effect.dim());

    acc.zip_mut_with(effect, |a, &e| {
        if is_nodata_value(*a, no_data_value) {
            *a = e;
        } else if !is_nodata_value(e, no_data_value) && e > *a {
            *a = e;
        }
    });

    Ok(acc)
}

#[cfg(test)]
mod edge_effect_tests {
    use super::*;
    use ndarray::array;

    const NODATA: f64 = -9999.0;

    fn exp_params(lambda_decay: f64) -> StressorParams {
        let mut params = StressorParams::default();
        params.exp_decline.lambda_decay = lambda_decay;
        params
    }

    #[test]
    fn test_apply_decay_keeps_nodata() {
        let proximity = array![[0.0, 500.0], [NODATA, 1000.0]];
        let effect = apply_decay(&proximity, NODATA, &exp_params(500.0), 100.0);

        assert_eq!(effect[[0, 0]], 100.0);
        assert_eq!(effect[[1, 0]], NODATA);
        assert!(effect[[0, 1]] > effect[[1, 1]]);
    }

    #[test]
    fn test_accumulate_first_stressor_initializes() {
        let effect = array![[1.0, 2.0], [3.0, NODATA]];
        let acc = accumulate_max(None, &effect, NODATA).unwrap();

        assert_eq!(acc, effect);
    }

    #[test]
    fn test_accumulate_is_cellwise_max() {
        let first = array![[1.0, 5.0], [NODATA, 2.0]];
        let second = array![[3.0, 4.0], [7.0, NODATA]];

        let acc = accumulate_max(None, &first, NODATA).unwrap();
        let acc = accumulate_max(Some(acc), &second, NODATA).unwrap();

        assert_eq!(acc, array![[3.0, 5.0], [7.0, 2.0]]);
    }

    #[test]
    fn test_accumulate_idempotent() {
        let effect = array![[1.0, 5.0], [NODATA, 2.0]];

        let once = accumulate_max(None, &effect, NODATA).unwrap();
        let twice = accumulate_max(Some(once.clone()), &effect, NODATA).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn test_accumulate_dimension_mismatch() {
        let first = array![[1.0, 2.0]];
        let second = array![[1.0], [2.0]];

        let acc = accumulate_max(None, &first, NODATA).unwrap();
        assert!(accumulate_max(Some(acc), &second, NODATA).is_err());
    }

    /// Two stressors with known effects: the accumulator ends up with the
    /// cell-wise maximum of the two effect rasters.
    #[test]
    fn test_two_stressor_scenario() {
        let impedance_max = 100.0;

        let roads_proximity = array![[0.0, 250.0], [500.0, 1000.0]];
        let rail_proximity = array![[1000.0, 0.0], [250.0, 500.0]];

        let params = exp_params(500.0);

        let roads_effect = apply_decay(&roads_proximity, NODATA, &params, impedance_max);
        let rail_effect = apply_decay(&rail_proximity, NODATA, &params, impedance_max);

        let acc = accumulate_max(None, &roads_effect, NODATA).unwrap();
        let acc = accumulate_max(Some(acc), &rail_effect, NODATA).unwrap();

        for row in 0..2 {
            for col in 0..2 {
                let expected = roads_effect[[row, col]].max(rail_effect[[row, col]]);
                assert_eq!(acc[[row, col]], expected);
            }
        }

        //the closer stressor wins each cell
        assert_eq!(acc[[0, 0]], impedance_max);
        assert_eq!(acc[[0, 1]], impedance_max);
    }
}
