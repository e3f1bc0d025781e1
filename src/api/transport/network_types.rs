use std::cmp::Ordering;

use crate::api::units::{DataSize, Timestamp};

/// Classification produced by a delay-based overuse detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BandwidthUsage {
    #[default]
    Normal,
    Underusing,
    Overusing,
}

#[derive(Debug, Clone, Copy)]
pub struct SentPacket {
    pub send_time: Timestamp,
    /// Size of packet with overhead up to IP layer.
    pub size: DataSize,
    /// Transport independent sequence number, any tracked packet should have a
    /// sequence number that is unique over the whole call and increasing by 1 for
    /// each packet.
    pub sequence_number: i64,
}

impl Default for SentPacket {
    fn default() -> Self {
        Self {
            send_time: Timestamp::plus_infinity(),
            size: DataSize::zero(),
            sequence_number: 0,
        }
    }
}

/// Transport feedback for a single packet. A packet that was never acknowledged
/// keeps a `receive_time` of plus infinity.
#[derive(Debug, Clone, Copy)]
pub struct PacketResult {
    pub sent_packet: SentPacket,
    pub receive_time: Timestamp,
}

impl PacketResult {
    pub const fn is_received(&self) -> bool {
        !self.receive_time.is_plus_infinity()
    }
}

impl Default for PacketResult {
    fn default() -> Self {
        Self {
            sent_packet: SentPacket::default(),
            receive_time: Timestamp::plus_infinity(),
        }
    }
}

impl PartialOrd for PacketResult {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.receive_time != other.receive_time {
            return Some(self.receive_time.cmp(&other.receive_time));
        }

        if self.sent_packet.send_time != other.sent_packet.send_time {
            return Some(self.sent_packet.send_time.cmp(&other.sent_packet.send_time));
        }

        Some(
            self.sent_packet
                .sequence_number
                .cmp(&other.sent_packet.sequence_number),
        )
    }
}

impl PartialEq for PacketResult {
    fn eq(&self, other: &Self) -> bool {
        self.receive_time == other.receive_time
            && self.sent_packet.send_time == other.sent_packet.send_time
            && self.sent_packet.sequence_number == other.sent_packet.sequence_number
    }
}
