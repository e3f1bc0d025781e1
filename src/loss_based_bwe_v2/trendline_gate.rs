/*
 *  Copyright 2021 The WebRTC project authors. All rights reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use std::collections::VecDeque;

use crate::api::transport::BandwidthUsage;

/// Most recent classifications of the delay based overuse detector, newest
/// first.
#[derive(Debug)]
pub(crate) struct DelayDetectorHistory {
    states: VecDeque<BandwidthUsage>,
    capacity: usize,
}

impl DelayDetectorHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            states: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn update(&mut self, delay_detector_state: BandwidthUsage) {
        if self.states.len() >= self.capacity {
            self.states.pop_back();
        }
        self.states.push_front(delay_detector_state);
    }

    pub fn latest(&self) -> Option<BandwidthUsage> {
        self.states.front().copied()
    }

    /// False while the delay based detector saw anything but normal usage within
    /// the window.
    pub fn allow_bitrate_increase(&self) -> bool {
        self.states
            .iter()
            .all(|&state| state == BandwidthUsage::Normal)
    }

    /// True if the delay based detector saw overuse within the window.
    pub fn allow_emergency_backoff(&self) -> bool {
        self.states
            .iter()
            .any(|&state| state == BandwidthUsage::Overusing)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_history_is_quiescent() {
        let history = DelayDetectorHistory::new(3);
        assert_eq!(history.latest(), None);
        assert!(history.allow_bitrate_increase());
        assert!(!history.allow_emergency_backoff());
    }

    #[test]
    fn underuse_blocks_increase_without_backoff() {
        let mut history = DelayDetectorHistory::new(3);
        history.update(BandwidthUsage::Normal);
        history.update(BandwidthUsage::Underusing);

        assert_eq!(history.latest(), Some(BandwidthUsage::Underusing));
        assert!(!history.allow_bitrate_increase());
        assert!(!history.allow_emergency_backoff());
    }

    #[test]
    fn overuse_ages_out_of_the_window() {
        let mut history = DelayDetectorHistory::new(3);
        history.update(BandwidthUsage::Overusing);
        assert!(history.allow_emergency_backoff());
        assert!(!history.allow_bitrate_increase());

        history.update(BandwidthUsage::Normal);
        history.update(BandwidthUsage::Normal);
        assert!(history.allow_emergency_backoff());

        history.update(BandwidthUsage::Normal);
        assert!(!history.allow_emergency_backoff());
        assert!(history.allow_bitrate_increase());
    }
}
