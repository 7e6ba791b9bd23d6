// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The per-path view shared between the host transport and the
//! congestion controller.
//!
//! The transport owns one `Path` per network path and keeps the input
//! fields current before delivering a notification; the controller
//! writes its decisions (`cwin`, `pacing_rate`, `pacing_quantum`) back
//! before the notification handler returns.

/// Largest datagram the host will ever produce, in bytes
pub const MAX_PACKET_SIZE: u64 = 1536;

/// Initial congestion window granted to a new path
pub const CWIN_INITIAL: u64 = 10 * MAX_PACKET_SIZE;

/// Floor under which the congestion window is never reduced
pub const CWIN_MINIMUM: u64 = 2 * MAX_PACKET_SIZE;

/// Smoothed RTT assumed before the first measurement, in microseconds
pub const INITIAL_RTT: u64 = 250_000;

/// Mutable per-path state exchanged with the transport
///
/// All durations are in microseconds, all rates in bytes per second,
/// all sizes in bytes.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Path {
    /// The congestion window, written by the controller
    pub cwin: u64,
    /// The pacing rate, written by the controller
    pub pacing_rate: u64,
    /// The pacing burst size, written by the controller
    pub pacing_quantum: u64,
    /// Size of the largest datagram currently sent on this path
    pub send_mtu: u64,
    /// The transport's smoothed RTT estimate
    pub smoothed_rtt: u64,
    /// The most recent RTT sample
    pub rtt_sample: u64,
    /// Peak bandwidth estimate maintained by the transport
    pub peak_bandwidth_estimate: u64,
    /// Highest sequence number acknowledged so far, `None` until the
    /// first acknowledgement is processed
    pub highest_acked_sequence: Option<u64>,
    /// Sequence number the transport will assign to the next packet
    pub next_sequence_number: u64,
    /// Send time of the latest data packet covered by an acknowledgement
    pub last_time_acked_data_frame_sent: u64,
    /// Last time the sender ran out of data before filling the window
    pub last_sender_limited_time: u64,
    /// Set by the controller once a congestion event established a
    /// slow start threshold
    pub is_ssthresh_initialized: bool,
    /// Set on every notification so the transport can refresh telemetry
    pub is_cc_data_updated: bool,
    /// Set at init: this algorithm wants `LostFeedback` notifications
    pub requires_lost_feedback: bool,
}

impl Path {
    /// Constructs a path view for the given datagram size
    pub fn new(send_mtu: u64) -> Self {
        Self {
            cwin: CWIN_INITIAL,
            pacing_rate: 0,
            pacing_quantum: 0,
            send_mtu,
            smoothed_rtt: INITIAL_RTT,
            rtt_sample: 0,
            peak_bandwidth_estimate: 0,
            highest_acked_sequence: None,
            next_sequence_number: 0,
            last_time_acked_data_frame_sent: 0,
            last_sender_limited_time: 0,
            is_ssthresh_initialized: false,
            is_cc_data_updated: false,
            requires_lost_feedback: false,
        }
    }

    /// True if the application, not the congestion controller, was the
    /// sending rate limiter in the period covered by the latest
    /// acknowledgement
    #[inline]
    pub fn is_application_limited(&self) -> bool {
        self.last_time_acked_data_frame_sent <= self.last_sender_limited_time
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::new(MAX_PACKET_SIZE)
    }
}
