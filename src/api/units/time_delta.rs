/*
 *  Copyright (c) 2018 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::fmt;

// TimeDelta represents the difference between two timestamps. Commonly this can
// be a duration. However since two Timestamps are not guaranteed to have the
// same epoch (they might come from different computers, making exact
// synchronisation infeasible), the duration covered by a TimeDelta can be
// undefined.
super::relative_unit!(TimeDelta);

impl TimeDelta {
    const ONE_SIDED: bool = false;

    pub const fn from_seconds(value: i64) -> Self {
        Self::from_fraction(1_000_000, value)
    }

    pub fn from_seconds_float(value: f64) -> Self {
        Self::from_fraction_float(1_000_000.0, value)
    }

    pub const fn from_millis(value: i64) -> Self {
        Self::from_fraction(1_000, value)
    }

    pub fn from_millis_float(value: f64) -> Self {
        Self::from_fraction_float(1_000.0, value)
    }

    pub const fn from_micros(value: i64) -> Self {
        Self::from_value(value)
    }

    pub const fn seconds(&self) -> i64 {
        self.to_fraction(1_000_000)
    }

    pub fn seconds_float(&self) -> f64 {
        self.to_fraction_float(1_000_000.0)
    }

    pub const fn ms(&self) -> i64 {
        self.to_fraction(1_000)
    }

    pub fn ms_float(&self) -> f64 {
        self.to_fraction_float(1_000.0)
    }

    pub const fn us(&self) -> i64 {
        self.to_value()
    }

    pub fn us_float(&self) -> f64 {
        self.to_value_float()
    }

    pub const fn ms_or(&self, fallback_value: i64) -> i64 {
        self.to_fraction_or(1_000, fallback_value)
    }

    pub const fn abs(&self) -> Self {
        if self.us() < 0 {
            Self::from_micros(-self.us())
        } else {
            *self
        }
    }
}

impl fmt::Debug for TimeDelta {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_plus_infinity() {
            write!(f, "+inf ms")
        } else if self.is_minus_infinity() {
            write!(f, "-inf ms")
        } else if self.us() == 0 || (self.us() % 1000) != 0 {
            write!(f, "{} us", self.us())
        } else if self.ms() % 1000 != 0 {
            write!(f, "{} ms", self.ms())
        } else {
            write!(f, "{} s", self.seconds())
        }
    }
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn get_different_prefix() {
        const VALUE: i64 = 3000000;
        assert_eq!(TimeDelta::from_micros(VALUE).seconds(), VALUE / 1000000);
        assert_eq!(TimeDelta::from_millis(VALUE).seconds(), VALUE / 1000);
        assert_eq!(TimeDelta::from_micros(VALUE).ms(), VALUE / 1000);
        assert_eq!(TimeDelta::from_seconds(VALUE).us(), VALUE * 1000000);
    }

    #[test]
    fn ratio_of_deltas() {
        let window = TimeDelta::from_seconds(60);
        let elapsed = TimeDelta::from_seconds(15);
        assert_relative_eq!(elapsed / window, 0.25);
        assert_eq!(elapsed.clamped(TimeDelta::zero(), window), elapsed);
        assert_eq!(TimeDelta::from_millis(-5).clamped(TimeDelta::zero(), window), TimeDelta::zero());
    }

    #[test]
    fn converts_to_and_from_double() {
        const MICROS: i64 = 17017;
        const MILLIS_DOUBLE: f64 = MICROS as f64 * 1e-3;
        const SECONDS_DOUBLE: f64 = MILLIS_DOUBLE * 1e-3;

        assert_eq!(TimeDelta::from_micros(MICROS).seconds_float(), SECONDS_DOUBLE);
        assert_eq!(TimeDelta::from_seconds_float(SECONDS_DOUBLE).us(), MICROS);
        assert_eq!(TimeDelta::from_micros(MICROS).ms_float(), MILLIS_DOUBLE);
        assert_eq!(TimeDelta::from_millis_float(MILLIS_DOUBLE).us(), MICROS);

        assert_eq!(TimeDelta::plus_infinity().ms_float(), f64::INFINITY);
        assert_eq!(TimeDelta::minus_infinity().us_float(), f64::NEG_INFINITY);
        assert_eq!(TimeDelta::plus_infinity().ms_or(-1), -1);
    }

    #[test]
    fn math_operations() {
        const VALUE_A: i64 = 267;
        const VALUE_B: i64 = 450;
        let delta_a = TimeDelta::from_millis(VALUE_A);
        let delta_b = TimeDelta::from_millis(VALUE_B);
        assert_eq!((delta_a + delta_b).ms(), VALUE_A + VALUE_B);
        assert_eq!((delta_a - delta_b).ms(), VALUE_A - VALUE_B);
        assert_eq!(TimeDelta::from_micros(-VALUE_A).abs().us(), VALUE_A);
        assert_eq!((delta_b * 2.0).ms(), VALUE_B * 2);
    }
}
