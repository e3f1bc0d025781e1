/*
 *  Copyright 2021 The WebRTC project authors. All rights reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crate::api::units::{DataRate, TimeDelta};

/// Tunables for [LossBasedBweV2](super::LossBasedBweV2).
///
/// The comments name the matching `WebRTC-Bwe-LossBasedBweV2` field trial key.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct LossBasedBweV2Config {
    pub enabled: bool,                                        // Enabled
    pub bandwidth_rampup_upper_bound_factor: f64,             // BwRampupUpperBoundFactor
    pub rampup_acceleration_max_factor: f64,                  // BwRampupAccelMaxFactor
    pub rampup_acceleration_maxout_time: TimeDelta,           // BwRampupAccelMaxoutTime
    pub candidate_factors: Vec<f64>,                          // CandidateFactors
    pub higher_bandwidth_bias_factor: f64,                    // HigherBwBiasFactor
    pub higher_log_bandwidth_bias_factor: f64,                // HigherLogBwBiasFactor
    pub inherent_loss_lower_bound: f64,                       // InherentLossLowerBound
    pub loss_threshold_of_high_bandwidth_preference: f64,     // LossThresholdOfHighBandwidthPreference
    pub bandwidth_preference_smoothing_factor: f64,           // BandwidthPreferenceSmoothingFactor
    pub inherent_loss_upper_bound_bandwidth_balance: DataRate, // InherentLossUpperBoundBwBalance
    pub inherent_loss_upper_bound_offset: f64,                // InherentLossUpperBoundOffset
    pub initial_inherent_loss_estimate: f64,                  // InitialInherentLossEstimate
    pub newton_iterations: i32,                               // NewtonIterations
    pub newton_step_size: f64,                                // NewtonStepSize
    pub append_acknowledged_rate_candidate: bool,             // AckedRateCandidate
    pub append_delay_based_estimate_candidate: bool,          // DelayBasedCandidate
    pub observation_duration_lower_bound: TimeDelta,          // ObservationDurationLowerBound
    pub observation_window_size: usize,                       // ObservationWindowSize
    pub sending_rate_smoothing_factor: f64,                   // SendingRateSmoothingFactor
    pub instant_upper_bound_temporal_weight_factor: f64,      // InstantUpperBoundTemporalWeightFactor
    pub instant_upper_bound_bandwidth_balance: DataRate,      // InstantUpperBoundBwBalance
    pub instant_upper_bound_loss_offset: f64,                 // InstantUpperBoundLossOffset
    pub temporal_weight_factor: f64,                          // TemporalWeightFactor
    pub bandwidth_backoff_lower_bound_factor: f64,            // BwBackoffLowerBoundFactor
    pub trendline_integration_enabled: bool,                  // TrendlineIntegrationEnabled
    pub trendline_observations_window_size: usize,            // TrendlineObservationsWindowSize
    pub max_increase_factor: f64,                             // MaxIncreaseFactor
    pub delayed_increase_window: TimeDelta,                   // DelayedIncreaseWindow
    pub use_acked_bitrate_only_when_overusing: bool,          // UseAckedBitrateOnlyWhenOverusing
    pub not_increase_if_inherent_loss_less_than_average_loss: bool, // NotIncreaseIfInherentLossLessThanAverageLoss
    pub high_loss_rate_threshold: f64,                        // HighLossRateThreshold
    pub bandwidth_cap_at_high_loss_rate: DataRate,            // BandwidthCapAtHighLossRate
    pub slope_of_bwe_high_loss_func: f64,                     // SlopeOfBweHighLossFunc
    pub probe_integration_enabled: bool,                      // ProbeIntegrationEnabled
    pub probe_expiration: TimeDelta,                          // ProbeExpiration
    pub bound_by_upper_link_capacity_when_loss_limited: bool, // BoundByUpperLinkCapacityWhenLossLimited
    pub not_use_acked_rate_in_alr: bool,                      // NotUseAckedRateInAlr
    pub min_num_observations: usize,                          // MinNumObservations
}

impl Default for LossBasedBweV2Config {
    fn default() -> Self {
        Self {
            enabled: true,
            bandwidth_rampup_upper_bound_factor: 1_000_000.0,
            rampup_acceleration_max_factor: 0.0,
            rampup_acceleration_maxout_time: TimeDelta::from_seconds(60),
            candidate_factors: vec![1.02, 1.0, 0.95],
            higher_bandwidth_bias_factor: 0.0002,
            higher_log_bandwidth_bias_factor: 0.02,
            inherent_loss_lower_bound: 1.0e-3,
            loss_threshold_of_high_bandwidth_preference: 0.15,
            bandwidth_preference_smoothing_factor: 0.002,
            inherent_loss_upper_bound_bandwidth_balance: DataRate::from_kilobits_per_sec(75),
            inherent_loss_upper_bound_offset: 0.05,
            initial_inherent_loss_estimate: 0.01,
            newton_iterations: 1,
            newton_step_size: 0.75,
            append_acknowledged_rate_candidate: true,
            append_delay_based_estimate_candidate: true,
            observation_duration_lower_bound: TimeDelta::from_millis(250),
            observation_window_size: 20,
            sending_rate_smoothing_factor: 0.0,
            instant_upper_bound_temporal_weight_factor: 0.9,
            instant_upper_bound_bandwidth_balance: DataRate::from_kilobits_per_sec(75),
            instant_upper_bound_loss_offset: 0.05,
            temporal_weight_factor: 0.9,
            bandwidth_backoff_lower_bound_factor: 1.0,
            trendline_integration_enabled: false,
            trendline_observations_window_size: 20,
            max_increase_factor: 1.3,
            delayed_increase_window: TimeDelta::from_millis(300),
            use_acked_bitrate_only_when_overusing: false,
            not_increase_if_inherent_loss_less_than_average_loss: true,
            high_loss_rate_threshold: 1.0,
            bandwidth_cap_at_high_loss_rate: DataRate::from_kilobits_per_sec(500),
            slope_of_bwe_high_loss_func: 1000.0,
            probe_integration_enabled: false,
            probe_expiration: TimeDelta::from_seconds(10),
            bound_by_upper_link_capacity_when_loss_limited: true,
            not_use_acked_rate_in_alr: false,
            min_num_observations: 3,
        }
    }
}

/// A single rule violated by a [LossBasedBweV2Config].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("the bandwidth rampup upper bound factor must be finite and greater than 1: {0}")]
    RampupUpperBoundFactor(f64),
    #[error("the rampup acceleration max factor must be non-negative: {0}")]
    RampupAccelerationMaxFactor(f64),
    #[error("the rampup acceleration maxout time must be above zero: {0:?}")]
    RampupAccelerationMaxoutTime(TimeDelta),
    #[error("the candidate factor list must not be empty")]
    NoCandidateFactors,
    #[error("all candidate factors must be finite and greater than zero: {0}")]
    CandidateFactor(f64),
    #[error("the configuration does not allow generating candidates other than the current estimate")]
    NoNonIdentityCandidate,
    #[error("the higher bandwidth bias factor must be non-negative: {0}")]
    HigherBandwidthBiasFactor(f64),
    #[error("the higher log bandwidth bias factor must be non-negative: {0}")]
    HigherLogBandwidthBiasFactor(f64),
    #[error("the inherent loss lower bound must be in [0, 1): {0}")]
    InherentLossLowerBound(f64),
    #[error("the loss threshold of high bandwidth preference must be in (0, 1): {0}")]
    LossThresholdOfHighBandwidthPreference(f64),
    #[error("the bandwidth preference smoothing factor must be in (0, 1]: {0}")]
    BandwidthPreferenceSmoothingFactor(f64),
    #[error("the inherent loss upper bound bandwidth balance must be positive: {0:?}")]
    InherentLossUpperBoundBandwidthBalance(DataRate),
    #[error("the inherent loss upper bound offset must be in [inherent loss lower bound, 1): {0}")]
    InherentLossUpperBoundOffset(f64),
    #[error("the initial inherent loss estimate must be in [0, 1): {0}")]
    InitialInherentLossEstimate(f64),
    #[error("the number of Newton iterations must be positive: {0}")]
    NewtonIterations(i32),
    #[error("the Newton step size must be positive: {0}")]
    NewtonStepSize(f64),
    #[error("the observation duration lower bound must be positive: {0:?}")]
    ObservationDurationLowerBound(TimeDelta),
    #[error("the observation window size must be at least 2: {0}")]
    ObservationWindowSize(usize),
    #[error("the sending rate smoothing factor must be in [0, 1): {0}")]
    SendingRateSmoothingFactor(f64),
    #[error("the instant upper bound temporal weight factor must be in (0, 1]: {0}")]
    InstantUpperBoundTemporalWeightFactor(f64),
    #[error("the instant upper bound bandwidth balance must be positive: {0:?}")]
    InstantUpperBoundBandwidthBalance(DataRate),
    #[error("the instant upper bound loss offset must be in [0, 1): {0}")]
    InstantUpperBoundLossOffset(f64),
    #[error("the temporal weight factor must be in (0, 1]: {0}")]
    TemporalWeightFactor(f64),
    #[error("the bandwidth backoff lower bound factor must be in [0, 1]: {0}")]
    BandwidthBackoffLowerBoundFactor(f64),
    #[error("the trendline observations window size must be at least 1: {0}")]
    TrendlineObservationsWindowSize(usize),
    #[error("the maximum increase factor must be positive: {0}")]
    MaxIncreaseFactor(f64),
    #[error("the delayed increase window must be positive: {0:?}")]
    DelayedIncreaseWindow(TimeDelta),
    #[error("the high loss rate threshold must be in (0, 1]: {0}")]
    HighLossRateThreshold(f64),
    #[error("the bandwidth cap at high loss rate must be finite: {0:?}")]
    BandwidthCapAtHighLossRate(DataRate),
    #[error("the slope of the high loss function must be non-negative: {0}")]
    SlopeOfBweHighLossFunc(f64),
    #[error("the probe expiration must be positive: {0:?}")]
    ProbeExpiration(TimeDelta),
    #[error("the minimum number of observations must be in [1, observation window size]: {0}")]
    MinNumObservations(usize),
}

impl LossBasedBweV2Config {
    /// Returns every rule the configuration violates. Every comparison is
    /// written so that NaN fails it.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if !(self.bandwidth_rampup_upper_bound_factor.is_finite()
            && self.bandwidth_rampup_upper_bound_factor > 1.0)
        {
            errors.push(ConfigError::RampupUpperBoundFactor(
                self.bandwidth_rampup_upper_bound_factor,
            ));
        }
        if !is_non_negative(self.rampup_acceleration_max_factor) {
            errors.push(ConfigError::RampupAccelerationMaxFactor(
                self.rampup_acceleration_max_factor,
            ));
        }
        if !is_positive_duration(self.rampup_acceleration_maxout_time) {
            errors.push(ConfigError::RampupAccelerationMaxoutTime(
                self.rampup_acceleration_maxout_time,
            ));
        }

        if self.candidate_factors.is_empty() {
            errors.push(ConfigError::NoCandidateFactors);
        }
        for &candidate_factor in &self.candidate_factors {
            if !is_positive_factor(candidate_factor) {
                errors.push(ConfigError::CandidateFactor(candidate_factor));
            }
        }

        // Ensure that the configuration allows generation of at least one candidate
        // other than the current estimate.
        if !self.append_acknowledged_rate_candidate
            && !self.append_delay_based_estimate_candidate
            && !self.candidate_factors.iter().any(|&factor| factor != 1.0)
        {
            errors.push(ConfigError::NoNonIdentityCandidate);
        }

        if !is_non_negative(self.higher_bandwidth_bias_factor) {
            errors.push(ConfigError::HigherBandwidthBiasFactor(
                self.higher_bandwidth_bias_factor,
            ));
        }
        if !is_non_negative(self.higher_log_bandwidth_bias_factor) {
            errors.push(ConfigError::HigherLogBandwidthBiasFactor(
                self.higher_log_bandwidth_bias_factor,
            ));
        }
        if !(0.0..1.0).contains(&self.inherent_loss_lower_bound) {
            errors.push(ConfigError::InherentLossLowerBound(
                self.inherent_loss_lower_bound,
            ));
        }
        if !(self.loss_threshold_of_high_bandwidth_preference > 0.0
            && self.loss_threshold_of_high_bandwidth_preference < 1.0)
        {
            errors.push(ConfigError::LossThresholdOfHighBandwidthPreference(
                self.loss_threshold_of_high_bandwidth_preference,
            ));
        }
        if !is_unit_weight(self.bandwidth_preference_smoothing_factor) {
            errors.push(ConfigError::BandwidthPreferenceSmoothingFactor(
                self.bandwidth_preference_smoothing_factor,
            ));
        }
        if !is_positive(self.inherent_loss_upper_bound_bandwidth_balance) {
            errors.push(ConfigError::InherentLossUpperBoundBandwidthBalance(
                self.inherent_loss_upper_bound_bandwidth_balance,
            ));
        }
        if !(self.inherent_loss_upper_bound_offset >= self.inherent_loss_lower_bound
            && self.inherent_loss_upper_bound_offset < 1.0)
        {
            errors.push(ConfigError::InherentLossUpperBoundOffset(
                self.inherent_loss_upper_bound_offset,
            ));
        }
        if !(0.0..1.0).contains(&self.initial_inherent_loss_estimate) {
            errors.push(ConfigError::InitialInherentLossEstimate(
                self.initial_inherent_loss_estimate,
            ));
        }
        if self.newton_iterations <= 0 {
            errors.push(ConfigError::NewtonIterations(self.newton_iterations));
        }
        if !is_positive_factor(self.newton_step_size) {
            errors.push(ConfigError::NewtonStepSize(self.newton_step_size));
        }
        if !is_positive_duration(self.observation_duration_lower_bound) {
            errors.push(ConfigError::ObservationDurationLowerBound(
                self.observation_duration_lower_bound,
            ));
        }
        if self.observation_window_size < 2 {
            errors.push(ConfigError::ObservationWindowSize(
                self.observation_window_size,
            ));
        }
        if !(0.0..1.0).contains(&self.sending_rate_smoothing_factor) {
            errors.push(ConfigError::SendingRateSmoothingFactor(
                self.sending_rate_smoothing_factor,
            ));
        }
        if !is_unit_weight(self.instant_upper_bound_temporal_weight_factor) {
            errors.push(ConfigError::InstantUpperBoundTemporalWeightFactor(
                self.instant_upper_bound_temporal_weight_factor,
            ));
        }
        if !is_positive(self.instant_upper_bound_bandwidth_balance) {
            errors.push(ConfigError::InstantUpperBoundBandwidthBalance(
                self.instant_upper_bound_bandwidth_balance,
            ));
        }
        if !(0.0..1.0).contains(&self.instant_upper_bound_loss_offset) {
            errors.push(ConfigError::InstantUpperBoundLossOffset(
                self.instant_upper_bound_loss_offset,
            ));
        }
        if !is_unit_weight(self.temporal_weight_factor) {
            errors.push(ConfigError::TemporalWeightFactor(
                self.temporal_weight_factor,
            ));
        }
        if !(0.0..=1.0).contains(&self.bandwidth_backoff_lower_bound_factor) {
            errors.push(ConfigError::BandwidthBackoffLowerBoundFactor(
                self.bandwidth_backoff_lower_bound_factor,
            ));
        }
        if self.trendline_observations_window_size < 1 {
            errors.push(ConfigError::TrendlineObservationsWindowSize(
                self.trendline_observations_window_size,
            ));
        }
        if !is_positive_factor(self.max_increase_factor) {
            errors.push(ConfigError::MaxIncreaseFactor(self.max_increase_factor));
        }
        if !is_positive_duration(self.delayed_increase_window) {
            errors.push(ConfigError::DelayedIncreaseWindow(
                self.delayed_increase_window,
            ));
        }
        if !is_unit_weight(self.high_loss_rate_threshold) {
            errors.push(ConfigError::HighLossRateThreshold(
                self.high_loss_rate_threshold,
            ));
        }
        if !self.bandwidth_cap_at_high_loss_rate.is_finite() {
            errors.push(ConfigError::BandwidthCapAtHighLossRate(
                self.bandwidth_cap_at_high_loss_rate,
            ));
        }
        if !is_non_negative(self.slope_of_bwe_high_loss_func) {
            errors.push(ConfigError::SlopeOfBweHighLossFunc(
                self.slope_of_bwe_high_loss_func,
            ));
        }
        if !is_positive_duration(self.probe_expiration) {
            errors.push(ConfigError::ProbeExpiration(self.probe_expiration));
        }
        if self.min_num_observations == 0
            || self.min_num_observations > self.observation_window_size
        {
            errors.push(ConfigError::MinNumObservations(self.min_num_observations));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn is_positive(rate: DataRate) -> bool {
    rate.is_finite() && rate > DataRate::zero()
}

fn is_positive_duration(duration: TimeDelta) -> bool {
    duration.is_finite() && duration > TimeDelta::zero()
}

fn is_positive_factor(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

// In (0, 1].
fn is_unit_weight(value: f64) -> bool {
    value > 0.0 && value <= 1.0
}
