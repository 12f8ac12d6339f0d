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

//! Distance-decay models for stressor edge effects.
//!
//! Both forms are monotonically decreasing in distance and equal
//! impedance_max at distance 0.

/// effect = impedance_max * exp(-distance / lambda_decay)
pub fn exp_decline(distance: f64, lambda_decay: f64, impedance_max: f64) -> f64 {
    impedance_max * (-distance / lambda_decay).exp()
}

/// effect = impedance_max * k_value / (k_value + distance)
pub fn prop_decline(distance: f64, k_value: f64, impedance_max: f64) -> f64 {
    impedance_max * k_value / (k_value + distance)
}

#[cfg(test)]
mod decay_tests {
    use super::*;
    use float_cmp::approx_eq;

    #[test]
    fn test_exp_decline_at_zero() {
        assert!(approx_eq!(f64, exp_decline(0.0, 500.0, 100.0), 100.0));
    }

    #[test]
    fn test_prop_decline_at_zero() {
        assert!(approx_eq!(f64, prop_decline(0.0, 500.0, 100.0), 100.0));
    }

    #[test]
    fn test_exp_decline_bounds_and_monotonic() {
        let impedance_max = 100.0;
        let lambda_decay = 500.0;

        let mut prev = f64::INFINITY;
        for step in 0..1000 {
            let distance = step as f64 * 25.0;
            let effect = exp_decline(distance, lambda_decay, impedance_max);

            assert!(effect > 0.0);
            assert!(effect <= impedance_max);
            assert!(effect < prev);

            prev = effect;
        }
    }

    #[test]
    fn test_prop_decline_bounds_and_monotonic() {
        let impedance_max = 100.0;
        let k_value = 500.0;

        let mut prev = f64::INFINITY;
        for step in 0..1000 {
            let distance = step as f64 * 25.0;
            let effect = prop_decline(distance, k_value, impedance_max);

            assert!(effect > 0.0);
            assert!(effect <= impedance_max);
            assert!(effect < prev);

            prev = effect;
        }
    }

    #[test]
    fn test_known_values() {
        // one lambda away decays to 1/e
        assert!(approx_eq!(f64, exp_decline(500.0, 500.0, 1.0), (-1.0f64).exp()));
        // one k away halves
        assert!(approx_eq!(f64, prop_decline(500.0, 500.0, 100.0), 50.0));
    }
}
