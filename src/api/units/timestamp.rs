/*
 *  Copyright (c) 2018 The WebRTC project authors. All Rights Reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

//! Timestamp represents the time that has passed since some unspecified epoch.
//! The epoch is assumed to be before any represented timestamps, this means that
//! negative values are not valid. The most notable feature is that the
//! difference of two Timestamps results in a TimeDelta.
super::unit_base!(Timestamp);

use std::fmt;
use std::ops::*;

use super::TimeDelta;

impl Timestamp {
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

    pub fn from_micros_float(value: f64) -> Self {
        Self::from_value_float(value)
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

    pub const fn seconds_or(&self, fallback_value: i64) -> i64 {
        self.to_fraction_or(1_000_000, fallback_value)
    }

    pub const fn ms_or(&self, fallback_value: i64) -> i64 {
        self.to_fraction_or(1_000, fallback_value)
    }

    pub const fn us_or(&self, fallback_value: i64) -> i64 {
        self.to_value_or(fallback_value)
    }
}

impl Add<TimeDelta> for Timestamp {
    type Output = Self;

    fn add(self, delta: TimeDelta) -> Self {
        if self.is_plus_infinity() || delta.is_plus_infinity() {
            assert!(!self.is_minus_infinity());
            assert!(!delta.is_minus_infinity());
            return Self::plus_infinity();
        } else if self.is_minus_infinity() || delta.is_minus_infinity() {
            assert!(!self.is_plus_infinity());
            assert!(!delta.is_plus_infinity());
            return Self::minus_infinity();
        }
        Timestamp::from_micros(self.us() + delta.us())
    }
}

impl Sub<TimeDelta> for Timestamp {
    type Output = Self;

    fn sub(self, delta: TimeDelta) -> Self {
        if self.is_plus_infinity() || delta.is_minus_infinity() {
            assert!(!self.is_minus_infinity());
            assert!(!delta.is_plus_infinity());
            return Self::plus_infinity();
        } else if self.is_minus_infinity() || delta.is_plus_infinity() {
            assert!(!self.is_plus_infinity());
            assert!(!delta.is_minus_infinity());
            return Self::minus_infinity();
        }
        Timestamp::from_micros(self.us() - delta.us())
    }
}

impl Sub for Timestamp {
    type Output = TimeDelta;

    fn sub(self, other: Self) -> TimeDelta {
        if self.is_plus_infinity() || other.is_minus_infinity() {
            assert!(!self.is_minus_infinity());
            assert!(!other.is_plus_infinity());
            return TimeDelta::plus_infinity();
        } else if self.is_minus_infinity() || other.is_plus_infinity() {
            assert!(!self.is_plus_infinity());
            assert!(!other.is_minus_infinity());
            return TimeDelta::minus_infinity();
        }
        TimeDelta::from_micros(self.us() - other.us())
    }
}

impl AddAssign<TimeDelta> for Timestamp {
    fn add_assign(&mut self, delta: TimeDelta) {
        *self = *self + delta;
    }
}

impl SubAssign<TimeDelta> for Timestamp {
    fn sub_assign(&mut self, delta: TimeDelta) {
        *self = *self - delta;
    }
}

impl fmt::Debug for Timestamp {
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
