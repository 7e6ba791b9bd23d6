// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Smoothed packet-loss rate test.
//!
//! Repeat notifications only count as congestion when losses are both
//! frequent enough and recent enough; isolated losses on a clean path
//! are absorbed without reducing the window.

use num_rational::Ratio;

/// Loss reports required before the filter may signal congestion
pub(crate) const REPEAT_THRESHOLD: u64 = 4;

/// Loss rate above which repeats are treated as congestion
const LOSS_RATE_THRESHOLD: Ratio<u64> = Ratio::new_raw(3, 20);

/// Observation span, in packets, beyond which old losses are aged out
const AGING_SPAN: u64 = 1024;

/// Packet-number-gap estimator of the recent loss rate
#[derive(Clone, Debug, Default)]
pub(crate) struct RateFilter {
    last_lost_packet: Option<u64>,
    nb_lost: u64,
    nb_span: u64,
}

impl RateFilter {
    /// Records a repeat notification for `lost_packet_number` and
    /// returns true if the loss rate is high enough to treat the loss
    /// as congestion.
    ///
    /// Out-of-order or duplicate reports do not advance the filter.
    pub fn on_repeat(&mut self, lost_packet_number: u64) -> bool {
        match self.last_lost_packet {
            None => {
                self.nb_span += 1;
                self.nb_lost += 1;
                self.last_lost_packet = Some(lost_packet_number);
            }
            Some(last) if lost_packet_number > last => {
                self.nb_span += lost_packet_number - last;
                self.nb_lost += 1;
                self.last_lost_packet = Some(lost_packet_number);
            }
            Some(_) => {}
        }

        if self.nb_span > AGING_SPAN {
            self.nb_span /= 2;
            self.nb_lost /= 2;
        }

        self.nb_lost >= REPEAT_THRESHOLD
            && Ratio::new(self.nb_lost, self.nb_span.max(1)) > LOSS_RATE_THRESHOLD
    }
}
