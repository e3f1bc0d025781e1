//! A Rust port of the loss-based bandwidth estimator used by WebRTC's Google
//! Congestion Control, `LossBasedBweV2`.
//!
//! The estimator consumes per-packet transport feedback and fits a simple
//! channel model (an inherent loss rate plus a loss-limited bandwidth) to a
//! rolling window of observations. See [LossBasedBweV2] for the entry point.

pub mod api;
mod loss_based_bwe_v2;
mod remote_bitrate_estimator;

pub use loss_based_bwe_v2::*;
