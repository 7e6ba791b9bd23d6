// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The contract between the host transport and a congestion control
//! algorithm.
//!
//! The transport serializes all notifications for one path and delivers
//! them through a single entry point; the controller's decisions are
//! effective on the [`Path`] as soon as the handler returns.

use crate::{c4::State, path::Path};
#[cfg(feature = "alloc")]
use alloc::boxed::Box;
use core::fmt::Debug;

/// A congestion event delivered by the host transport
///
/// Each variant carries the acknowledgement state fields it consumes.
/// Unknown or irrelevant events map to the variants the controller
/// ignores (`Timeout`, `LostFeedback`, `CwinBlocked`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Notification {
    /// One or more packets were newly acknowledged
    Acknowledgement {
        /// Bytes newly acknowledged by this event
        bytes_acknowledged: u64,
        /// Bytes delivered between the send time of the newest acked
        /// packet and its acknowledgement
        bytes_delivered_since_packet_sent: u64,
        /// RTT measured on the newest acknowledged packet, 0 if none
        rtt_measurement: u64,
    },
    /// The ECN-CE counter increased
    EcnCongestionExperienced,
    /// A packet was declared lost through duplicate acknowledgements
    Repeat {
        /// Sequence number of the lost packet
        lost_packet_number: u64,
    },
    /// A probe timeout fired; loss accounting stays with the transport
    Timeout,
    /// A previously reported loss turned out to be spurious
    SpuriousRepeat,
    /// A new RTT sample is available
    RttMeasurement {
        /// The sample, in microseconds
        rtt_measurement: u64,
    },
    /// The peer stopped sending acknowledgements for a while
    LostFeedback,
    /// The sender was blocked by the congestion window
    CwinBlocked,
    /// The transport requests a full reinitialization of the controller
    Reset,
    /// One-shot window hint from a resumed session
    SeedCwin {
        /// In-flight bytes the path previously supported
        bytes_in_flight: u64,
    },
}

/// Sink for the structured events a congestion controller emits
pub trait Publisher {
    /// Invoked on every state transition
    fn on_state_changed(&mut self, state: State);
    /// Invoked when competition mode (the "pig war") is entered or left
    fn on_competition_mode_changed(&mut self, active: bool);
    /// Invoked when new pacing parameters are published to the path
    fn on_pacing_rate_updated(&mut self, pacing_rate: u64, burst_size: u64);
}

/// An algorithm for controlling congestion on one path
///
/// Deallocation on path teardown is `Drop`; there is no separate
/// delete entry point.
pub trait CongestionController: 'static + Debug {
    /// Applies one notification in the order the transport delivered it
    fn notify(
        &mut self,
        path: &mut Path,
        notification: Notification,
        publisher: &mut dyn Publisher,
        now: u64,
    );

    /// Returns `(state_code, rtt_min)` for telemetry
    fn observe(&self) -> (u64, u64);
}

/// Registration descriptor for a congestion control algorithm
///
/// One virtual call per notification is inconsequential, so controllers
/// built through this trait are boxed rather than monomorphized.
#[cfg(feature = "alloc")]
pub trait Algorithm: Sync {
    /// Identifier used to select and deduplicate algorithms
    fn id(&self) -> &'static str;

    /// Numeric code reported in telemetry
    fn code(&self) -> u64;

    /// Allocates and initializes per-path controller state
    fn new_controller(
        &self,
        path: &mut Path,
        option_string: Option<&str>,
        now: u64,
    ) -> Box<dyn CongestionController>;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing {
    use super::*;

    /// A publisher recording every event it receives
    #[derive(Debug, Default)]
    pub struct Publisher {
        pub state_changes: Vec<State>,
        pub competition_changes: Vec<bool>,
        pub pacing_rate: u64,
        pub burst_size: u64,
        pub nb_pacing_updates: usize,
    }

    impl super::Publisher for Publisher {
        fn on_state_changed(&mut self, state: State) {
            self.state_changes.push(state);
        }

        fn on_competition_mode_changed(&mut self, active: bool) {
            self.competition_changes.push(active);
        }

        fn on_pacing_rate_updated(&mut self, pacing_rate: u64, burst_size: u64) {
            self.pacing_rate = pacing_rate;
            self.burst_size = burst_size;
            self.nb_pacing_updates += 1;
        }
    }
}
