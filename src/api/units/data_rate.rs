/*
 *  Copyright (c) 2018 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

//! DataRate represents a given data rate. This can be used to represent
//! bandwidth, encoding bitrate, etc. The internal storage is bits per second (bps).

use std::fmt;
use std::ops::{Div, Mul};

use super::{DataSize, TimeDelta};

super::relative_unit!(DataRate);

impl DataRate {
    const ONE_SIDED: bool = true;

    pub const fn from_bits_per_sec(value: i64) -> Self {
        Self::from_value(value)
    }

    pub fn from_bits_per_sec_float(value: f64) -> Self {
        Self::from_value_float(value)
    }

    pub const fn from_bytes_per_sec(value: i64) -> Self {
        Self::from_fraction(8, value)
    }

    pub const fn from_kilobits_per_sec(value: i64) -> Self {
        Self::from_fraction(1000, value)
    }

    pub fn from_kilobits_per_sec_float(value: f64) -> Self {
        Self::from_fraction_float(1000.0, value)
    }

    pub const fn infinity() -> Self {
        Self::plus_infinity()
    }

    pub const fn bps(&self) -> i64 {
        self.to_value()
    }

    pub fn bps_float(&self) -> f64 {
        self.to_value_float()
    }

    pub const fn kbps(&self) -> i64 {
        self.to_fraction(1000)
    }

    pub fn kbps_float(&self) -> f64 {
        self.to_fraction_float(1000.0)
    }

    pub const fn bps_or(&self, fallback_value: i64) -> i64 {
        self.to_value_or(fallback_value)
    }

    pub const fn kbps_or(&self, fallback_value: i64) -> i64 {
        self.to_fraction_or(1000, fallback_value)
    }
}

impl Div<TimeDelta> for DataSize {
    type Output = DataRate;

    fn div(self, duration: TimeDelta) -> Self::Output {
        DataRate::from_bits_per_sec(self.microbits() / duration.us())
    }
}

impl Div<DataRate> for DataSize {
    type Output = TimeDelta;

    fn div(self, rate: DataRate) -> Self::Output {
        TimeDelta::from_micros(self.microbits() / rate.bps())
    }
}

impl Mul<TimeDelta> for DataRate {
    type Output = DataSize;

    fn mul(self, duration: TimeDelta) -> Self::Output {
        let microbits: i64 = self.bps() * duration.us();
        DataSize::from_bytes((microbits + 4000000) / 8000000)
    }
}

impl Mul<DataRate> for TimeDelta {
    type Output = DataSize;

    fn mul(self, rate: DataRate) -> Self::Output {
        rate * self
    }
}

impl fmt::Debug for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_plus_infinity() {
            write!(f, "+inf bps")
        } else if self.is_minus_infinity() {
            write!(f, "-inf bps")
        } else if self.bps() == 0 || self.bps() % 1000 != 0 {
            write!(f, "{} bps", self.bps())
        } else {
            write!(f, "{} kbps", self.kbps())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn const_expr() {
        const VALUE: i64 = 12345;
        const DATA_RATE_ZERO: DataRate = DataRate::zero();
        const DATA_RATE_INF: DataRate = DataRate::infinity();
        assert_eq!(DataRate::default(), DATA_RATE_ZERO);
        assert!(DATA_RATE_ZERO.is_zero());
        assert!(DATA_RATE_INF.is_infinite());
        assert_eq!(DATA_RATE_INF.bps_or(-1), -1);
        assert!(DATA_RATE_INF > DATA_RATE_ZERO);

        const DATA_RATE_BPS: DataRate = DataRate::from_bits_per_sec(VALUE);
        const DATA_RATE_KBPS: DataRate = DataRate::from_kilobits_per_sec(VALUE);
        assert_eq!(DATA_RATE_BPS.bps(), VALUE);
        assert_eq!(DATA_RATE_KBPS.kbps_or(0), VALUE);
    }

    #[test]
    fn converts_to_and_from_double() {
        const VALUE: i64 = 128;
        assert_eq!(DataRate::from_bits_per_sec(VALUE).bps_float(), VALUE as f64);
        assert_eq!(DataRate::from_bits_per_sec(VALUE).kbps_float(), VALUE as f64 * 1e-3);
        assert_eq!(DataRate::from_kilobits_per_sec_float(VALUE as f64 * 1e-3).bps(), VALUE);

        assert_eq!(DataRate::infinity().bps_float(), f64::INFINITY);
        assert!(DataRate::from_kilobits_per_sec_float(f64::INFINITY).is_infinite());
    }

    #[test]
    fn scaling_by_float_rounds_to_nearest_bit() {
        let rate = DataRate::from_bits_per_sec(450);
        assert_eq!((rate * 1.5).bps(), 675);
        assert_eq!((0.5 * rate).bps(), 225);
        assert!((DataRate::infinity() * 0.5).is_plus_infinity());
        assert!((rate / 0.5).bps() - 900 <= 1);
    }

    #[test]
    fn clamping() {
        let upper = DataRate::from_kilobits_per_sec(800);
        let lower = DataRate::from_kilobits_per_sec(100);
        assert_eq!(DataRate::from_kilobits_per_sec(1000).clamped(lower, upper), upper);
        assert_eq!(DataRate::zero().clamped(lower, upper), lower);
        assert_eq!(DataRate::infinity().clamped(lower, upper), upper);
    }

    #[test]
    fn data_rate_and_data_size_and_time_delta() {
        const SECONDS: i64 = 5;
        const BITS_PER_SECOND: i64 = 440;
        const BYTES: i64 = 44000;
        let delta_a = TimeDelta::from_seconds(SECONDS);
        let rate_b = DataRate::from_bits_per_sec(BITS_PER_SECOND);
        let size_c = DataSize::from_bytes(BYTES);
        assert_eq!((delta_a * rate_b).bytes(), SECONDS * BITS_PER_SECOND / 8);
        assert_eq!((rate_b * delta_a).bytes(), SECONDS * BITS_PER_SECOND / 8);
        assert_eq!((size_c / delta_a).bps(), BYTES * 8 / SECONDS);
        assert_eq!((size_c / rate_b).seconds(), BYTES * 8 / BITS_PER_SECOND);
    }
}
