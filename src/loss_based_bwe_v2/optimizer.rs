/*
 *  Copyright 2021 The WebRTC project authors. All rights reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crate::api::units::DataRate;

use super::{LossBasedBweV2Config, ObservationWindow};

// Second derivatives closer to zero than this make the Newton step meaningless.
const MIN_SECOND_DERIVATIVE_MAGNITUDE: f64 = 1.0e-6;

/// A candidate model of the channel: packets are lost with probability
/// `inherent_loss` regardless of the sending rate, and in addition every bit
/// sent above `loss_limited_bandwidth` is lost.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChannelParameters {
    pub inherent_loss: f64,
    pub loss_limited_bandwidth: DataRate,
}

impl Default for ChannelParameters {
    fn default() -> Self {
        Self {
            inherent_loss: 0.0,
            loss_limited_bandwidth: DataRate::minus_infinity(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct Derivatives {
    pub first: f64,
    pub second: f64,
}

/// Scores channel parameters against the observation window.
pub(crate) struct Optimizer<'a> {
    pub config: &'a LossBasedBweV2Config,
    pub observations: &'a ObservationWindow,
    pub temporal_weights: &'a [f64],
    pub average_reported_loss_ratio: f64,
}

impl Optimizer<'_> {
    /// Log-likelihood of the windowed observations under `channel_parameters`,
    /// plus a bias towards higher bandwidths while the loss is low.
    pub fn objective(&self, channel_parameters: &ChannelParameters) -> f64 {
        let high_bandwidth_bias = self.high_bandwidth_bias(channel_parameters.loss_limited_bandwidth);

        let mut objective = 0.0;
        for (age, observation) in self.observations.iter() {
            let loss_probability = loss_probability(
                channel_parameters.inherent_loss,
                channel_parameters.loss_limited_bandwidth,
                observation.sending_rate,
            );
            let temporal_weight = self.temporal_weights[age];

            objective += temporal_weight
                * (observation.num_lost_packets as f64 * loss_probability.ln()
                    + observation.num_received_packets as f64 * (1.0 - loss_probability).ln());
            objective += temporal_weight * high_bandwidth_bias * observation.num_packets as f64;
        }
        objective
    }

    /// Derivatives of the likelihood with respect to the inherent loss.
    pub fn derivatives(&self, channel_parameters: &ChannelParameters) -> Derivatives {
        let mut derivatives = Derivatives::default();
        for (age, observation) in self.observations.iter() {
            let loss_probability = loss_probability(
                channel_parameters.inherent_loss,
                channel_parameters.loss_limited_bandwidth,
                observation.sending_rate,
            );
            let temporal_weight = self.temporal_weights[age];
            let lost = observation.num_lost_packets as f64;
            let received = observation.num_received_packets as f64;

            derivatives.first +=
                temporal_weight * (lost / loss_probability - received / (1.0 - loss_probability));
            derivatives.second -= temporal_weight
                * (lost / loss_probability.powi(2) + received / (1.0 - loss_probability).powi(2));
        }
        derivatives
    }

    /// Moves `inherent_loss` towards the maximum likelihood estimate for the
    /// candidate's bandwidth. The result always lies in the feasible range.
    pub fn newtons_method_update(&self, channel_parameters: &mut ChannelParameters) {
        if self.observations.num_observations() == 0 {
            return;
        }

        for _ in 0..self.config.newton_iterations {
            let derivatives = self.derivatives(channel_parameters);
            if !(derivatives.second < -MIN_SECOND_DERIVATIVE_MAGNITUDE) {
                tracing::error!(
                    "The second derivative is mathematically guaranteed to be negative but is {}.",
                    derivatives.second
                );
                break;
            }

            let step = self.config.newton_step_size * derivatives.first / derivatives.second;
            if !step.is_finite() {
                tracing::warn!("Newton step is not finite, keeping the inherent loss estimate.");
                break;
            }

            channel_parameters.inherent_loss -= step;
            channel_parameters.inherent_loss = self.feasible_inherent_loss(channel_parameters);
        }
    }

    pub fn feasible_inherent_loss(&self, channel_parameters: &ChannelParameters) -> f64 {
        channel_parameters
            .inherent_loss
            .max(self.config.inherent_loss_lower_bound)
            .min(self.inherent_loss_upper_bound(channel_parameters.loss_limited_bandwidth))
    }

    /// Higher bandwidths can only be explained by a smaller inherent loss.
    pub fn inherent_loss_upper_bound(&self, bandwidth: DataRate) -> f64 {
        if bandwidth.is_zero() {
            return 1.0;
        }

        let inherent_loss_upper_bound = self.config.inherent_loss_upper_bound_offset
            + self.config.inherent_loss_upper_bound_bandwidth_balance / bandwidth;
        inherent_loss_upper_bound.min(1.0)
    }

    /// Positive while the loss rate is below the high bandwidth preference
    /// threshold, negative above it.
    pub fn adjust_bias_factor(&self, loss_rate: f64, bias_factor: f64) -> f64 {
        let threshold = self.config.loss_threshold_of_high_bandwidth_preference;
        bias_factor * (threshold - loss_rate)
            / (self.config.bandwidth_preference_smoothing_factor + (threshold - loss_rate).abs())
    }

    pub fn high_bandwidth_bias(&self, bandwidth: DataRate) -> f64 {
        if !bandwidth.is_finite() {
            return 0.0;
        }

        let loss_rate = self.average_reported_loss_ratio;
        let kbps = bandwidth.kbps_float();
        self.adjust_bias_factor(loss_rate, self.config.higher_bandwidth_bias_factor) * kbps
            + self.adjust_bias_factor(loss_rate, self.config.higher_log_bandwidth_bias_factor)
                * (1.0 + kbps).ln()
    }
}

/// Probability that a packet sent at `sending_rate` is lost under the given
/// channel parameters, kept away from 0 and 1 so its logarithm stays finite.
pub(crate) fn loss_probability(
    inherent_loss: f64,
    loss_limited_bandwidth: DataRate,
    sending_rate: DataRate,
) -> f64 {
    let inherent_loss = inherent_loss.clamp(0.0, 1.0);

    let mut loss_probability = inherent_loss;
    if sending_rate.is_finite()
        && loss_limited_bandwidth.is_finite()
        && sending_rate > loss_limited_bandwidth
    {
        loss_probability +=
            (1.0 - inherent_loss) * ((sending_rate - loss_limited_bandwidth) / sending_rate);
    }
    loss_probability.clamp(1.0e-6, 1.0 - 1.0e-6)
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;
    use crate::loss_based_bwe_v2::observations::temporal_weights;

    fn window(observations: &[(usize, usize)], sending_rate: DataRate) -> ObservationWindow {
        let mut window = ObservationWindow::new(20);
        for &(num_packets, num_lost_packets) in observations {
            window.push(num_packets, num_lost_packets, sending_rate);
        }
        window
    }

    fn optimizer<'a>(
        config: &'a LossBasedBweV2Config,
        observations: &'a ObservationWindow,
        weights: &'a [f64],
    ) -> Optimizer<'a> {
        Optimizer {
            config,
            observations,
            temporal_weights: weights,
            average_reported_loss_ratio: observations.loss_ratio(weights),
        }
    }

    #[test]
    fn loss_probability_grows_when_sending_above_bandwidth() {
        let bandwidth = DataRate::from_kilobits_per_sec(500);

        assert_relative_eq!(
            loss_probability(0.1, bandwidth, DataRate::from_kilobits_per_sec(400)),
            0.1
        );
        // Half of what is sent above the bandwidth is lost on top of the inherent loss.
        assert_relative_eq!(
            loss_probability(0.1, bandwidth, DataRate::from_kilobits_per_sec(1000)),
            0.1 + 0.9 * 0.5
        );
        assert_relative_eq!(loss_probability(0.0, bandwidth, bandwidth), 1.0e-6);
        assert_relative_eq!(
            loss_probability(1.5, bandwidth, DataRate::from_kilobits_per_sec(1000)),
            1.0 - 1.0e-6
        );
        assert_relative_eq!(
            loss_probability(0.2, DataRate::plus_infinity(), bandwidth),
            0.2
        );
    }

    #[test]
    fn inherent_loss_upper_bound_shrinks_with_bandwidth() {
        let config = LossBasedBweV2Config::default();
        let observations = ObservationWindow::new(20);
        let weights = temporal_weights(0.9, 20);
        let optimizer = optimizer(&config, &observations, &weights);

        assert_eq!(optimizer.inherent_loss_upper_bound(DataRate::zero()), 1.0);
        assert_eq!(
            optimizer.inherent_loss_upper_bound(DataRate::from_kilobits_per_sec(50)),
            1.0
        );
        assert_relative_eq!(
            optimizer.inherent_loss_upper_bound(DataRate::from_kilobits_per_sec(750)),
            0.05 + 0.1
        );

        let infeasible = ChannelParameters {
            inherent_loss: 0.5,
            loss_limited_bandwidth: DataRate::from_kilobits_per_sec(750),
        };
        assert_relative_eq!(optimizer.feasible_inherent_loss(&infeasible), 0.15);
        let too_small = ChannelParameters {
            inherent_loss: 0.0,
            ..infeasible
        };
        assert_relative_eq!(optimizer.feasible_inherent_loss(&too_small), 1.0e-3);
    }

    #[test]
    fn bias_changes_sign_at_loss_threshold() {
        let config = LossBasedBweV2Config::default();
        let observations = ObservationWindow::new(20);
        let weights = temporal_weights(0.9, 20);
        let optimizer = optimizer(&config, &observations, &weights);

        assert!(optimizer.adjust_bias_factor(0.0, 1.0) > 0.0);
        assert_eq!(optimizer.adjust_bias_factor(0.15, 1.0), 0.0);
        assert!(optimizer.adjust_bias_factor(0.3, 1.0) < 0.0);
        // Far from the threshold the smoothing term barely matters.
        assert_relative_eq!(
            optimizer.adjust_bias_factor(0.65, 2.0),
            -2.0 * 0.5 / 0.502,
            epsilon = 1.0e-12
        );
        assert_eq!(optimizer.high_bandwidth_bias(DataRate::plus_infinity()), 0.0);
    }

    #[test]
    fn newton_moves_towards_observed_loss() {
        let config = LossBasedBweV2Config {
            newton_iterations: 10,
            newton_step_size: 1.0,
            ..Default::default()
        };
        let sending_rate = DataRate::from_kilobits_per_sec(1000);
        let observations = window(&[(100, 5), (100, 5), (100, 5)], sending_rate);
        let weights = temporal_weights(0.9, 20);
        let optimizer = optimizer(&config, &observations, &weights);

        let mut channel_parameters = ChannelParameters {
            inherent_loss: 0.01,
            loss_limited_bandwidth: DataRate::from_kilobits_per_sec(2000),
        };
        let before = optimizer.objective(&channel_parameters);
        optimizer.newtons_method_update(&mut channel_parameters);

        assert_relative_eq!(channel_parameters.inherent_loss, 0.05, epsilon = 1.0e-3);
        assert!(optimizer.objective(&channel_parameters) > before);
    }

    #[test]
    fn newton_keeps_estimate_without_curvature() {
        let config = LossBasedBweV2Config::default();
        let observations = window(&[(0, 0)], DataRate::from_kilobits_per_sec(1000));
        let weights = temporal_weights(0.9, 20);
        let optimizer = optimizer(&config, &observations, &weights);

        let mut channel_parameters = ChannelParameters {
            inherent_loss: 0.02,
            loss_limited_bandwidth: DataRate::from_kilobits_per_sec(1000),
        };
        assert_eq!(optimizer.derivatives(&channel_parameters), Derivatives::default());
        optimizer.newtons_method_update(&mut channel_parameters);
        assert_eq!(channel_parameters.inherent_loss, 0.02);
    }

    #[test]
    fn newton_result_stays_feasible() {
        let config = LossBasedBweV2Config {
            newton_iterations: 5,
            ..Default::default()
        };
        let bandwidth = DataRate::from_kilobits_per_sec(3000);
        // Nearly everything is lost, the unconstrained optimum is far above the bound.
        let observations = window(&[(100, 95), (100, 95)], bandwidth);
        let weights = temporal_weights(0.9, 20);
        let optimizer = optimizer(&config, &observations, &weights);

        let mut channel_parameters = ChannelParameters {
            inherent_loss: 0.01,
            loss_limited_bandwidth: bandwidth,
        };
        optimizer.newtons_method_update(&mut channel_parameters);

        assert!(channel_parameters.inherent_loss.is_finite());
        assert_relative_eq!(channel_parameters.inherent_loss, 0.075);
    }

    #[test]
    fn objective_prefers_bandwidth_matching_the_loss() {
        let config = LossBasedBweV2Config::default();
        let sending_rate = DataRate::from_kilobits_per_sec(1000);
        let lossless = window(&[(100, 0), (100, 0), (100, 0)], sending_rate);
        let lossy = window(&[(100, 40), (100, 40), (100, 40)], sending_rate);
        let weights = temporal_weights(0.9, 20);

        let high = ChannelParameters {
            inherent_loss: 0.01,
            loss_limited_bandwidth: DataRate::from_kilobits_per_sec(1100),
        };
        let low = ChannelParameters {
            inherent_loss: 0.01,
            loss_limited_bandwidth: DataRate::from_kilobits_per_sec(600),
        };

        let optimizer = optimizer(&config, &lossless, &weights);
        assert!(optimizer.objective(&high) > optimizer.objective(&low));

        let optimizer = self::optimizer(&config, &lossy, &weights);
        assert!(optimizer.objective(&low) > optimizer.objective(&high));
    }
}
