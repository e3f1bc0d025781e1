/*
 *  Copyright 2021 The WebRTC project authors. All rights reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

mod bounds;
mod config;
mod observations;
mod optimizer;
mod state;
mod trendline_gate;


pub use config::*;
pub use optimizer::ChannelParameters;
pub use state::*;

use bounds::{InstantUpperBound, ProbeResult};
use observations::{temporal_weights, ObservationWindow, PacketResultsSummary, PartialObservation};
use optimizer::Optimizer;
use trendline_gate::DelayDetectorHistory;

use crate::{
    api::{
        transport::{BandwidthUsage, PacketResult},
        units::{DataRate, TimeDelta, Timestamp},
    },
    remote_bitrate_estimator::CONGESTION_CONTROLLER_MIN_BITRATE,
};

/// Loss based bandwidth estimator.
///
/// Every feedback batch is folded into a window of observations. Each update
/// then scales the current estimate by a few candidate factors, fits the
/// inherent loss of every candidate to the window and keeps the candidate that
/// explains the observed loss best, subject to a number of bounds.
pub struct LossBasedBweV2 {
    config: LossBasedBweV2Config,
    enabled: bool,
    acknowledged_bitrate: Option<DataRate>,
    current_estimate: ChannelParameters,
    current_state: LossBasedState,
    observations: ObservationWindow,
    partial_observation: PartialObservation,
    last_send_time_most_recent_observation: Timestamp,
    last_time_estimate_reduced: Timestamp,
    instant_upper_bound: InstantUpperBound,
    average_reported_loss_ratio: f64,
    temporal_weights: Vec<f64>,
    instant_upper_bound_temporal_weights: Vec<f64>,
    delay_detector_states: DelayDetectorHistory,
    recovering_after_loss_timestamp: Timestamp,
    bandwidth_limit_in_current_window: DataRate,
    min_bitrate: DataRate,
    max_bitrate: DataRate,
    delay_based_estimate: DataRate,
    upper_link_capacity: DataRate,
    probe: Option<ProbeResult>,
}

impl Default for LossBasedBweV2 {
    fn default() -> Self {
        Self::new(LossBasedBweV2Config::default())
    }
}

impl LossBasedBweV2 {
    /// Creates an estimator. An invalid or disabled configuration produces an
    /// estimator that stays disabled for its whole lifetime.
    pub fn new(config: LossBasedBweV2Config) -> Self {
        let enabled = if !config.enabled {
            tracing::info!(
                "The configuration does not specify that the estimator should be enabled, disabling it."
            );
            false
        } else if let Err(errors) = config.validate() {
            for error in &errors {
                tracing::warn!("Invalid loss based BWE configuration: {}", error);
            }
            tracing::warn!("The configuration is not valid, disabling the estimator.");
            false
        } else {
            tracing::info!("Loss based BWE v2 is enabled.");
            true
        };

        Self {
            enabled,
            acknowledged_bitrate: None,
            current_estimate: ChannelParameters {
                inherent_loss: config.initial_inherent_loss_estimate,
                loss_limited_bandwidth: DataRate::minus_infinity(),
            },
            current_state: LossBasedState::DelayBasedEstimate,
            observations: ObservationWindow::new(config.observation_window_size),
            partial_observation: PartialObservation::default(),
            last_send_time_most_recent_observation: Timestamp::plus_infinity(),
            last_time_estimate_reduced: Timestamp::minus_infinity(),
            instant_upper_bound: InstantUpperBound::default(),
            average_reported_loss_ratio: 0.0,
            temporal_weights: temporal_weights(
                config.temporal_weight_factor,
                config.observation_window_size,
            ),
            instant_upper_bound_temporal_weights: temporal_weights(
                config.instant_upper_bound_temporal_weight_factor,
                config.observation_window_size,
            ),
            delay_detector_states: DelayDetectorHistory::new(
                config.trendline_observations_window_size,
            ),
            recovering_after_loss_timestamp: Timestamp::minus_infinity(),
            bandwidth_limit_in_current_window: DataRate::plus_infinity(),
            min_bitrate: DataRate::from_kilobits_per_sec(1),
            max_bitrate: DataRate::plus_infinity(),
            delay_based_estimate: DataRate::plus_infinity(),
            upper_link_capacity: DataRate::plus_infinity(),
            probe: None,
            config,
        }
    }

    pub fn config(&self) -> &LossBasedBweV2Config {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns true iff a BWE can be calculated, i.e., the estimator has been
    /// initialized with a BWE and then has received enough `PacketResult`s.
    pub fn is_ready(&self) -> bool {
        self.is_enabled()
            && self.current_estimate.loss_limited_bandwidth.is_finite()
            && self.observations.num_observations() >= self.config.min_num_observations
    }

    /// Returns the delay based estimate, or `DataRate::plus_infinity()` when
    /// there is none, until the estimator is ready.
    pub fn loss_based_result(&self) -> LossBasedBweResult {
        if !self.is_ready() {
            return LossBasedBweResult {
                bandwidth_estimate: if self.delay_based_estimate.is_finite() {
                    self.delay_based_estimate
                } else {
                    DataRate::plus_infinity()
                },
                state: LossBasedState::DelayBasedEstimate,
            };
        }

        let mut bandwidth_estimate = self
            .current_estimate
            .loss_limited_bandwidth
            .min(self.instant_upper_bound.get());
        if self.delay_based_estimate.is_finite() {
            bandwidth_estimate = bandwidth_estimate.min(self.delay_based_estimate);
        }
        if bandwidth_estimate.is_finite() {
            bandwidth_estimate = bandwidth_estimate.clamped(self.min_bitrate, self.max_bitrate);
        }

        LossBasedBweResult {
            bandwidth_estimate,
            state: self.current_state,
        }
    }

    /// True while the estimate is increasing in a loss limited network and probe
    /// integration is enabled.
    pub fn is_requesting_probe(&self) -> bool {
        self.config.probe_integration_enabled && self.current_state == LossBasedState::Increasing
    }

    /// Temporally weighted loss ratio of the observation window, 0 until enough
    /// observations have been made.
    pub fn average_reported_loss_ratio(&self) -> f64 {
        self.average_reported_loss_ratio
    }

    pub fn set_acknowledged_bitrate(&mut self, acknowledged_bitrate: DataRate) {
        if acknowledged_bitrate.is_finite() {
            self.acknowledged_bitrate = Some(acknowledged_bitrate);
        } else {
            tracing::warn!(
                "The acknowledged bitrate must be finite: {:?}",
                acknowledged_bitrate
            );
        }
    }

    pub fn set_bandwidth_estimate(&mut self, bandwidth_estimate: DataRate) {
        if bandwidth_estimate.is_finite() {
            self.current_estimate.loss_limited_bandwidth = bandwidth_estimate;
        } else {
            tracing::warn!(
                "The bandwidth estimate must be finite: {:?}",
                bandwidth_estimate
            );
        }
    }

    pub fn set_min_max_bitrate(&mut self, min_bitrate: DataRate, max_bitrate: DataRate) {
        if min_bitrate.is_finite() {
            self.min_bitrate = min_bitrate;
        } else {
            tracing::warn!("The min bitrate must be finite: {:?}", min_bitrate);
        }

        if max_bitrate.is_finite() {
            self.max_bitrate = max_bitrate;
        } else {
            tracing::warn!("The max bitrate must be finite: {:?}", max_bitrate);
        }
    }

    /// Folds a feedback batch into the observation window and, once ready,
    /// moves the estimate to the best scoring candidate.
    pub fn update_bandwidth_estimate(
        &mut self,
        packet_results: &[PacketResult],
        delay_based_estimate: DataRate,
        delay_detector_state: BandwidthUsage,
        probe_bitrate: Option<DataRate>,
        upper_link_capacity: DataRate,
        in_alr: bool,
    ) {
        self.delay_based_estimate = delay_based_estimate;
        self.upper_link_capacity = upper_link_capacity;
        if !self.is_enabled() {
            tracing::warn!(
                "The estimator must be enabled before it can be used to update the estimate."
            );
            return;
        }

        self.update_delay_detector(delay_detector_state);
        if packet_results.is_empty() {
            tracing::warn!("The estimate cannot be updated without any loss statistics.");
            return;
        }

        if !self.push_back_observation(packet_results) {
            return;
        }
        self.set_probe_bitrate(probe_bitrate);
        self.refresh_instant_upper_bound();

        if !self.current_estimate.loss_limited_bandwidth.is_finite() {
            if !delay_based_estimate.is_finite() {
                tracing::warn!("The delay based estimate must be finite: {:?}", delay_based_estimate);
                return;
            }
            self.current_estimate.loss_limited_bandwidth = delay_based_estimate;
        }

        if !self.is_ready() {
            return;
        }

        let increase_allowed = self.allow_bitrate_increase();
        let forced_backoff = self.forced_backoff();
        let now = self.last_send_time_most_recent_observation;
        let previous_estimate = self.current_estimate.loss_limited_bandwidth;

        let mut best_candidate = self.current_estimate;
        let mut objective_max = f64::NEG_INFINITY;
        let optimizer = self.optimizer();
        for mut candidate in self.candidates(in_alr, increase_allowed, forced_backoff) {
            optimizer.newtons_method_update(&mut candidate);

            let candidate_objective = optimizer.objective(&candidate);
            if candidate_objective > objective_max {
                objective_max = candidate_objective;
                best_candidate = candidate;
            }
        }

        if best_candidate.loss_limited_bandwidth < previous_estimate {
            self.last_time_estimate_reduced = now;
        }

        // Do not increase the estimate if the average loss is greater than the
        // inherent loss the candidate explains.
        if self.config.not_increase_if_inherent_loss_less_than_average_loss
            && self.average_reported_loss_ratio > best_candidate.inherent_loss
            && previous_estimate < best_candidate.loss_limited_bandwidth
        {
            best_candidate.loss_limited_bandwidth = previous_estimate;
        }

        if !increase_allowed {
            best_candidate.loss_limited_bandwidth =
                best_candidate.loss_limited_bandwidth.min(previous_estimate);
        }

        if self.current_state.is_loss_limited() {
            // Bound the increase while the current delayed increase window is open.
            if self.recovering_after_loss_timestamp.is_finite()
                && self.recovering_after_loss_timestamp + self.config.delayed_increase_window > now
                && best_candidate.loss_limited_bandwidth > self.bandwidth_limit_in_current_window
            {
                best_candidate.loss_limited_bandwidth = self.bandwidth_limit_in_current_window;
            }

            if self.is_estimate_increasing_when_loss_limited(
                previous_estimate,
                best_candidate.loss_limited_bandwidth,
            ) {
                match self.fresh_probe() {
                    // A fresh probe sets the increase, up or down, but never
                    // below the previous estimate.
                    Some(probe_bitrate)
                        if increase_allowed
                            && previous_estimate < best_candidate.loss_limited_bandwidth =>
                    {
                        best_candidate.loss_limited_bandwidth =
                            probe_bitrate.min(self.max_bitrate).max(previous_estimate);
                    }
                    _ => {
                        if let Some(rampup_upper_bound) = self.acknowledged_rampup_upper_bound() {
                            best_candidate.loss_limited_bandwidth = best_candidate
                                .loss_limited_bandwidth
                                .min(rampup_upper_bound.max(previous_estimate));
                        }
                    }
                }
            }
        }

        let next_state = self.current_state.next(&StateInputs {
            previous_estimate,
            accepted_estimate: best_candidate.loss_limited_bandwidth,
            delay_based_estimate: self.delay_based_estimate,
            increase_allowed,
            forced_backoff,
            high_loss: self.average_reported_loss_ratio > self.config.high_loss_rate_threshold,
        });
        if next_state != self.current_state {
            tracing::debug!(
                "Loss based state changed from {:?} to {:?}, estimate {:?}",
                self.current_state,
                next_state,
                best_candidate.loss_limited_bandwidth
            );
        }

        self.current_state = next_state;
        self.current_estimate = best_candidate;

        if self.current_state.is_loss_limited()
            && (self.recovering_after_loss_timestamp.is_infinite()
                || self.recovering_after_loss_timestamp + self.config.delayed_increase_window < now)
        {
            self.bandwidth_limit_in_current_window = CONGESTION_CONTROLLER_MIN_BITRATE.max(
                self.current_estimate.loss_limited_bandwidth * self.config.max_increase_factor,
            );
            self.recovering_after_loss_timestamp = now;
        }
    }

    fn optimizer(&self) -> Optimizer<'_> {
        Optimizer {
            config: &self.config,
            observations: &self.observations,
            temporal_weights: &self.temporal_weights,
            average_reported_loss_ratio: self.average_reported_loss_ratio,
        }
    }

    fn candidates(
        &self,
        in_alr: bool,
        increase_allowed: bool,
        forced_backoff: bool,
    ) -> Vec<ChannelParameters> {
        let current = self.current_estimate.loss_limited_bandwidth;

        let mut bandwidths: Vec<DataRate> = self
            .config
            .candidate_factors
            .iter()
            .filter(|&&candidate_factor| increase_allowed || candidate_factor <= 1.0)
            .map(|&candidate_factor| current * candidate_factor)
            .collect();

        if let Some(acknowledged_bitrate) = self.acknowledged_bitrate {
            if self.config.append_acknowledged_rate_candidate
                && self.allow_acknowledged_rate_candidate()
                && !(self.config.not_use_acked_rate_in_alr && in_alr)
            {
                bandwidths
                    .push(acknowledged_bitrate * self.config.bandwidth_backoff_lower_bound_factor);
            }
        }

        if self.delay_based_estimate.is_finite()
            && self.config.append_delay_based_estimate_candidate
            && increase_allowed
            && self.delay_based_estimate > current
        {
            bandwidths.push(self.delay_based_estimate);
        }

        if forced_backoff && bandwidths.iter().any(|&bandwidth| bandwidth < current) {
            bandwidths.retain(|&bandwidth| bandwidth < current);
        }

        let candidate_bandwidth_upper_bound = self.candidate_bandwidth_upper_bound();
        let optimizer = self.optimizer();

        bandwidths
            .into_iter()
            .map(|bandwidth| {
                let mut candidate = self.current_estimate;
                candidate.loss_limited_bandwidth = if self.config.trendline_integration_enabled {
                    bandwidth.min(candidate_bandwidth_upper_bound)
                } else {
                    bandwidth.min(current.max(candidate_bandwidth_upper_bound))
                };
                candidate.inherent_loss = optimizer.feasible_inherent_loss(&candidate);
                candidate
            })
            .collect()
    }

    fn is_estimate_increasing_when_loss_limited(
        &self,
        old_estimate: DataRate,
        new_estimate: DataRate,
    ) -> bool {
        (old_estimate < new_estimate
            || (old_estimate == new_estimate
                && self.current_state == LossBasedState::Increasing))
            && self.current_state.is_loss_limited()
    }

    fn update_delay_detector(&mut self, delay_detector_state: BandwidthUsage) {
        self.delay_detector_states.update(delay_detector_state);
    }

    fn allow_bitrate_increase(&self) -> bool {
        !self.config.trendline_integration_enabled
            || self.delay_detector_states.allow_bitrate_increase()
    }

    fn forced_backoff(&self) -> bool {
        self.config.trendline_integration_enabled
            && self.delay_detector_states.allow_emergency_backoff()
    }

    fn allow_acknowledged_rate_candidate(&self) -> bool {
        !self.config.trendline_integration_enabled
            || !self.config.use_acked_bitrate_only_when_overusing
            || self.delay_detector_states.allow_emergency_backoff()
    }

    /// Returns false if no observation was created.
    fn push_back_observation(&mut self, packet_results: &[PacketResult]) -> bool {
        if packet_results.is_empty() {
            return false;
        }

        let summary = PacketResultsSummary::new(packet_results);
        self.partial_observation.add(&summary);

        // This is the first packet report we have received.
        if !self.last_send_time_most_recent_observation.is_finite() {
            self.last_send_time_most_recent_observation = summary.first_send_time;
        }

        let observation_duration = summary.last_send_time - self.last_send_time_most_recent_observation;
        // Too small to be meaningful.
        if observation_duration <= TimeDelta::zero()
            || (observation_duration < self.config.observation_duration_lower_bound
                && (self.delay_detector_states.latest() != Some(BandwidthUsage::Overusing)
                    || !self.config.trendline_integration_enabled))
        {
            return false;
        }

        self.last_send_time_most_recent_observation = summary.last_send_time;

        let partial_observation = std::mem::take(&mut self.partial_observation);
        let sending_rate = self.sending_rate(partial_observation.size / observation_duration);
        self.observations.push(
            partial_observation.num_packets,
            partial_observation.num_lost_packets,
            sending_rate,
        );
        self.instant_upper_bound.invalidate();

        true
    }

    /// Smooths the instantaneous sending rate against the previous observation.
    fn sending_rate(&self, instantaneous_sending_rate: DataRate) -> DataRate {
        let Some(most_recent_observation) = self.observations.most_recent() else {
            return instantaneous_sending_rate;
        };

        let smoothing_factor = self.config.sending_rate_smoothing_factor;
        most_recent_observation.sending_rate * smoothing_factor
            + instantaneous_sending_rate * (1.0 - smoothing_factor)
    }
}
