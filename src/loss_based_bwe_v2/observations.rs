/*
 *  Copyright 2021 The WebRTC project authors. All rights reserved.
 *
 *  Use of this source code is governed by a BSD-style license
 *  that can be found in the LICENSE file in the root of the source
 *  tree. An additional intellectual property rights grant can be found
 *  in the file PATENTS.  All contributing project authors may
 *  be found in the AUTHORS file in the root of the source tree.
 */

use crate::api::{
    transport::PacketResult,
    units::{DataRate, DataSize, Timestamp},
};

/// Packet and loss counts of one closed observation interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Observation {
    pub num_packets: usize,
    pub num_lost_packets: usize,
    pub num_received_packets: usize,
    pub sending_rate: DataRate,
    pub id: usize,
}

/// Feedback accumulated since the last observation was closed.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct PartialObservation {
    pub num_packets: usize,
    pub num_lost_packets: usize,
    pub size: DataSize,
}

impl PartialObservation {
    pub fn add(&mut self, summary: &PacketResultsSummary) {
        self.num_packets += summary.num_packets;
        self.num_lost_packets += summary.num_lost_packets;
        self.size += summary.total_size;
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct PacketResultsSummary {
    pub num_packets: usize,
    pub num_lost_packets: usize,
    pub total_size: DataSize,
    pub first_send_time: Timestamp,
    pub last_send_time: Timestamp,
}

impl PacketResultsSummary {
    pub fn new(packet_results: &[PacketResult]) -> Self {
        let mut summary = Self {
            num_packets: packet_results.len(),
            num_lost_packets: 0,
            total_size: DataSize::zero(),
            first_send_time: Timestamp::plus_infinity(),
            last_send_time: Timestamp::minus_infinity(),
        };

        for packet in packet_results {
            if !packet.is_received() {
                summary.num_lost_packets += 1;
            }
            summary.total_size += packet.sent_packet.size;
            summary.first_send_time = summary.first_send_time.min(packet.sent_packet.send_time);
            summary.last_send_time = summary.last_send_time.max(packet.sent_packet.send_time);
        }

        summary
    }
}

/// Fixed capacity ring of the most recent observations.
///
/// Observation `id`s increase by one per push and the observation with id `n`
/// lives in slot `n % capacity`, so the oldest one is overwritten once the
/// window is full.
#[derive(Debug)]
pub(crate) struct ObservationWindow {
    slots: Vec<Option<Observation>>,
    num_observations: usize,
}

impl ObservationWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            num_observations: 0,
        }
    }

    /// Total number of observations ever pushed, including evicted ones.
    pub fn num_observations(&self) -> usize {
        self.num_observations
    }

    /// Stores a new observation, assigning it the next id.
    pub fn push(
        &mut self,
        num_packets: usize,
        num_lost_packets: usize,
        sending_rate: DataRate,
    ) -> &Observation {
        let id = self.num_observations;
        self.num_observations += 1;

        let slot = id % self.slots.len();
        self.slots[slot].insert(Observation {
            num_packets,
            num_lost_packets,
            num_received_packets: num_packets - num_lost_packets,
            sending_rate,
            id,
        })
    }

    pub fn most_recent(&self) -> Option<&Observation> {
        let id = self.num_observations.checked_sub(1)?;
        self.slots[id % self.slots.len()].as_ref()
    }

    /// Iterates the stored observations together with their age, where the most
    /// recent observation has age 0.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Observation)> + '_ {
        self.slots
            .iter()
            .flatten()
            .map(|observation| (self.num_observations - 1 - observation.id, observation))
    }

    /// Weighted ratio of lost to sent packets, where `weights[age]` is applied to
    /// the observation of the given age.
    pub fn loss_ratio(&self, weights: &[f64]) -> f64 {
        let mut num_packets = 0.0;
        let mut num_lost_packets = 0.0;
        for (age, observation) in self.iter() {
            let weight = weights[age];
            num_packets += weight * observation.num_packets as f64;
            num_lost_packets += weight * observation.num_lost_packets as f64;
        }

        if num_packets <= 0.0 {
            return 0.0;
        }
        num_lost_packets / num_packets
    }
}

/// `factor^age` for every age that fits in the window.
pub(crate) fn temporal_weights(factor: f64, window_size: usize) -> Vec<f64> {
    (0..window_size).map(|age| factor.powi(age as i32)).collect()
}

#[cfg(test)]
mod test {
    use approx::assert_relative_eq;

    use super::*;
    use crate::api::{transport::SentPacket, units::TimeDelta};

    fn packet(send_ms: i64, received: bool) -> PacketResult {
        let send_time = Timestamp::from_millis(send_ms);
        PacketResult {
            sent_packet: SentPacket {
                send_time,
                size: DataSize::from_bytes(1000),
                sequence_number: send_ms,
            },
            receive_time: if received {
                send_time + TimeDelta::from_millis(20)
            } else {
                Timestamp::plus_infinity()
            },
        }
    }

    #[test]
    fn summarizes_packet_results() {
        let packets = [packet(120, true), packet(100, false), packet(110, true)];
        let summary = PacketResultsSummary::new(&packets);

        assert_eq!(summary.num_packets, 3);
        assert_eq!(summary.num_lost_packets, 1);
        assert_eq!(summary.total_size, DataSize::from_bytes(3000));
        assert_eq!(summary.first_send_time, Timestamp::from_millis(100));
        assert_eq!(summary.last_send_time, Timestamp::from_millis(120));

        let mut partial = PartialObservation::default();
        partial.add(&summary);
        partial.add(&summary);
        assert_eq!(partial.num_packets, 6);
        assert_eq!(partial.num_lost_packets, 2);
        assert_eq!(partial.size, DataSize::from_bytes(6000));
    }

    #[test]
    fn evicts_oldest_observation() {
        let mut window = ObservationWindow::new(2);
        assert!(window.most_recent().is_none());
        assert_eq!(window.iter().count(), 0);

        let rate = DataRate::from_kilobits_per_sec(300);
        window.push(10, 1, rate);
        window.push(20, 2, rate);
        let newest = *window.push(30, 3, rate);

        assert_eq!(newest.id, 2);
        assert_eq!(newest.num_received_packets, 27);
        assert_eq!(window.num_observations(), 3);
        assert_eq!(window.most_recent(), Some(&newest));

        let mut ages: Vec<(usize, usize)> = window
            .iter()
            .map(|(age, observation)| (age, observation.num_packets))
            .collect();
        ages.sort();
        assert_eq!(ages, vec![(0, 30), (1, 20)]);
    }

    #[test]
    fn loss_ratio_favours_recent_observations() {
        let rate = DataRate::from_kilobits_per_sec(300);
        let weights = temporal_weights(0.5, 4);
        assert_eq!(weights, vec![1.0, 0.5, 0.25, 0.125]);

        let mut window = ObservationWindow::new(4);
        assert_eq!(window.loss_ratio(&weights), 0.0);

        window.push(10, 0, rate);
        window.push(10, 10, rate);
        // (0.5 * 0 + 1.0 * 10) / (0.5 * 10 + 1.0 * 10)
        assert_relative_eq!(window.loss_ratio(&weights), 10.0 / 15.0);

        let uniform = temporal_weights(1.0, 4);
        assert_relative_eq!(window.loss_ratio(&uniform), 0.5);
    }
}
