/*
 *  Copyright 2021 The WebRTC project authors. All rights reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crate::api::units::{DataRate, TimeDelta, Timestamp};

use super::LossBasedBweV2;

const MAX_FINITE_BPS: f64 = i64::MAX as f64;

/// The instant upper bound only changes when a new observation is closed, so
/// it is computed once per observation and cached.
#[derive(Clone, Copy, Debug)]
pub(crate) struct InstantUpperBound {
    value: DataRate,
    stale: bool,
}

impl Default for InstantUpperBound {
    fn default() -> Self {
        Self {
            value: DataRate::plus_infinity(),
            stale: true,
        }
    }
}

impl InstantUpperBound {
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn set(&mut self, value: DataRate) {
        self.value = value;
        self.stale = false;
    }

    pub fn get(&self) -> DataRate {
        self.value
    }
}

/// A probe measurement together with the send time of the observation that was
/// closed when it arrived.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct ProbeResult {
    pub bitrate: DataRate,
    pub timestamp: Timestamp,
}

impl LossBasedBweV2 {
    /// Recomputes the cached loss ratio and instant upper bound after a new
    /// observation has been closed.
    pub(super) fn refresh_instant_upper_bound(&mut self) {
        if !self.instant_upper_bound.is_stale() {
            return;
        }

        self.average_reported_loss_ratio = self.calculate_average_reported_loss_ratio();
        let instant_upper_bound = self.calculate_instant_upper_bound();
        self.instant_upper_bound.set(instant_upper_bound);
    }

    pub(super) fn calculate_average_reported_loss_ratio(&self) -> f64 {
        if self.observations.num_observations() < self.config.min_num_observations {
            return 0.0;
        }
        self.observations
            .loss_ratio(&self.instant_upper_bound_temporal_weights)
    }

    pub(super) fn calculate_instant_upper_bound(&self) -> DataRate {
        let mut instant_limit = self.max_bitrate;
        let average_reported_loss_ratio = self.average_reported_loss_ratio;

        if average_reported_loss_ratio > self.config.instant_upper_bound_loss_offset {
            // Just above the offset the quotient leaves the range of a finite rate.
            let balance_limit_bps = self.config.instant_upper_bound_bandwidth_balance.bps_float()
                / (average_reported_loss_ratio - self.config.instant_upper_bound_loss_offset);
            if balance_limit_bps < self.max_bitrate.bps_float().min(MAX_FINITE_BPS) {
                instant_limit = DataRate::from_bits_per_sec_float(balance_limit_bps.round());
            }

            if average_reported_loss_ratio > self.config.high_loss_rate_threshold {
                let high_loss_limit_kbps = self.min_bitrate.kbps_float().max(
                    self.config.bandwidth_cap_at_high_loss_rate.kbps_float()
                        - self.config.slope_of_bwe_high_loss_func * average_reported_loss_ratio,
                );
                instant_limit =
                    instant_limit.min(DataRate::from_kilobits_per_sec_float(high_loss_limit_kbps));
            }
        }

        if self.current_state.is_loss_limited()
            && self.config.bound_by_upper_link_capacity_when_loss_limited
            && self.upper_link_capacity.is_finite()
        {
            instant_limit = instant_limit.min(self.upper_link_capacity);
        }

        instant_limit
    }

    /// Ceiling for every candidate bandwidth of the next optimization pass.
    pub(super) fn candidate_bandwidth_upper_bound(&self) -> DataRate {
        let mut candidate_bandwidth_upper_bound = self.max_bitrate;
        if self.current_state.is_loss_limited()
            && self.bandwidth_limit_in_current_window.is_finite()
        {
            candidate_bandwidth_upper_bound = self.bandwidth_limit_in_current_window;
        }

        if self.config.trendline_integration_enabled {
            candidate_bandwidth_upper_bound =
                candidate_bandwidth_upper_bound.min(self.instant_upper_bound.get());
            if self.delay_based_estimate.is_finite() {
                candidate_bandwidth_upper_bound =
                    candidate_bandwidth_upper_bound.min(self.delay_based_estimate);
            }
        }

        let Some(acknowledged_bitrate) = self.acknowledged_bitrate else {
            return candidate_bandwidth_upper_bound;
        };

        if self.config.rampup_acceleration_max_factor > 0.0 {
            let maxout_time = self.config.rampup_acceleration_maxout_time;
            let time_since_bandwidth_reduced = (self.last_send_time_most_recent_observation
                - self.last_time_estimate_reduced)
                .clamped(TimeDelta::zero(), maxout_time);
            let rampup_acceleration = self.config.rampup_acceleration_max_factor
                * (time_since_bandwidth_reduced / maxout_time);

            candidate_bandwidth_upper_bound += acknowledged_bitrate * rampup_acceleration;
        }

        candidate_bandwidth_upper_bound
    }

    /// Records a probe result. While a probe is still fresh only a lower one
    /// replaces it.
    pub(super) fn set_probe_bitrate(&mut self, probe_bitrate: Option<DataRate>) {
        if !self.config.probe_integration_enabled {
            return;
        }

        let Some(bitrate) = probe_bitrate.filter(|bitrate| bitrate.is_finite()) else {
            return;
        };
        if self.fresh_probe().is_some_and(|pending| pending <= bitrate) {
            return;
        }

        self.probe = Some(ProbeResult {
            bitrate,
            timestamp: self.last_send_time_most_recent_observation,
        });
    }

    /// The last probe result, unless it has expired.
    pub(super) fn fresh_probe(&self) -> Option<DataRate> {
        self.probe
            .filter(|probe| {
                probe.timestamp + self.config.probe_expiration
                    >= self.last_send_time_most_recent_observation
            })
            .map(|probe| probe.bitrate)
    }

    /// Limit for an increasing estimate while loss limited and no fresh probe
    /// is available.
    pub(super) fn acknowledged_rampup_upper_bound(&self) -> Option<DataRate> {
        self.acknowledged_bitrate
            .map(|acknowledged_bitrate| {
                acknowledged_bitrate * self.config.bandwidth_rampup_upper_bound_factor
            })
    }
}
