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

/// State of the loss based estimate, which can be either increasing/decreasing
/// when network is loss limited, or equal to the delay based estimate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum LossBasedState {
    Increasing,
    Decreasing,
    #[default]
    DelayBasedEstimate,
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LossBasedBweResult {
    /// `DataRate::plus_infinity()` when no estimate is available.
    pub bandwidth_estimate: DataRate,
    // Used by the controller, which requests probes while the state is
    // Increasing.
    pub state: LossBasedState,
}

impl Default for LossBasedBweResult {
    fn default() -> Self {
        Self {
            bandwidth_estimate: DataRate::plus_infinity(),
            state: LossBasedState::DelayBasedEstimate,
        }
    }
}

/// Everything an update knows when it decides the next state.
#[derive(Clone, Copy, Debug)]
pub(crate) struct StateInputs {
    pub previous_estimate: DataRate,
    pub accepted_estimate: DataRate,
    pub delay_based_estimate: DataRate,
    pub increase_allowed: bool,
    pub forced_backoff: bool,
    pub high_loss: bool,
}

impl LossBasedState {
    pub fn is_loss_limited(self) -> bool {
        self != LossBasedState::DelayBasedEstimate
    }

    /// The state after accepting a new loss based estimate.
    pub(crate) fn next(self, inputs: &StateInputs) -> LossBasedState {
        let delay_based_valid = inputs.delay_based_estimate.is_finite();

        if delay_based_valid && inputs.accepted_estimate >= inputs.delay_based_estimate {
            return LossBasedState::DelayBasedEstimate;
        }

        if inputs.forced_backoff
            || inputs.high_loss
            || inputs.accepted_estimate < inputs.previous_estimate
        {
            return LossBasedState::Decreasing;
        }

        if inputs.increase_allowed && inputs.accepted_estimate > inputs.previous_estimate {
            return LossBasedState::Increasing;
        }

        // Held estimate.
        match self {
            LossBasedState::DelayBasedEstimate if delay_based_valid => LossBasedState::Decreasing,
            state => state,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn inputs(previous_kbps: i64, accepted_kbps: i64, delay_based_kbps: i64) -> StateInputs {
        StateInputs {
            previous_estimate: DataRate::from_kilobits_per_sec(previous_kbps),
            accepted_estimate: DataRate::from_kilobits_per_sec(accepted_kbps),
            delay_based_estimate: DataRate::from_kilobits_per_sec(delay_based_kbps),
            increase_allowed: true,
            forced_backoff: false,
            high_loss: false,
        }
    }

    #[test]
    fn follows_estimate_direction_below_delay_based_estimate() {
        use LossBasedState::*;

        for state in [Increasing, Decreasing, DelayBasedEstimate] {
            assert_eq!(state.next(&inputs(500, 600, 1000)), Increasing);
            assert_eq!(state.next(&inputs(500, 400, 1000)), Decreasing);
            assert_eq!(state.next(&inputs(500, 1000, 1000)), DelayBasedEstimate);
        }
    }

    #[test]
    fn held_estimate_keeps_loss_limited_state() {
        use LossBasedState::*;

        assert_eq!(Increasing.next(&inputs(500, 500, 1000)), Increasing);
        assert_eq!(Decreasing.next(&inputs(500, 500, 1000)), Decreasing);
        assert_eq!(DelayBasedEstimate.next(&inputs(500, 500, 1000)), Decreasing);

        let unbounded = StateInputs {
            delay_based_estimate: DataRate::plus_infinity(),
            ..inputs(500, 500, 0)
        };
        assert_eq!(DelayBasedEstimate.next(&unbounded), DelayBasedEstimate);
        assert!(!DelayBasedEstimate.is_loss_limited());
        assert!(Decreasing.is_loss_limited());
    }

    #[test]
    fn gate_overrides_increase() {
        use LossBasedState::*;

        let blocked = StateInputs {
            increase_allowed: false,
            ..inputs(500, 600, 1000)
        };
        assert_eq!(Decreasing.next(&blocked), Decreasing);

        let forced = StateInputs {
            forced_backoff: true,
            ..inputs(500, 600, 1000)
        };
        assert_eq!(Increasing.next(&forced), Decreasing);

        let high_loss = StateInputs {
            high_loss: true,
            ..inputs(500, 500, 1000)
        };
        assert_eq!(Increasing.next(&high_loss), Decreasing);
    }
}
