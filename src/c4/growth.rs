// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Era growth verdicts.
//!
//! When an era that carried a push completes, the evaluator decides
//! whether the probe actually increased the delivery rate, and keeps
//! the streak counters the state machine transitions on.

use super::{math::mul1024, ALPHA_PUSH_LOW_1024};

#[derive(Clone, Debug, Default)]
pub(crate) struct Evaluator {
    /// Consecutive measurable eras without a rate increase
    pub nb_eras_no_increase: u32,
    /// Consecutive successful pushes without congestion
    pub nb_push_no_congestion: u32,
    /// Consecutive eras ended by a delay-based decrease
    pub nb_eras_delay_based_decrease: u32,
    /// Nominal rate captured when the era was framed
    pub push_rate_old: u64,
    /// Alpha the era was expected to probe at
    pub push_alpha: u64,
    /// True if the era carried enough data to measure growth
    pub push_was_not_limited: bool,
    /// A congestion signal of any kind was raised during the era
    pub congestion_notified: bool,
    /// A delay-typed congestion signal was raised during the era
    pub congestion_delay_notified: bool,
}

impl Evaluator {
    /// Settles the verdict for the era that just completed
    pub fn evaluate(&mut self, nominal_rate: u64) {
        let is_growing = if self.push_alpha > ALPHA_PUSH_LOW_1024 {
            // A full push was tried: growth means the rate moved at
            // least 1/4 of the way to the probed level.
            let target_rate =
                (3 * self.push_rate_old + mul1024(self.push_alpha, self.push_rate_old)) / 4;
            nominal_rate > target_rate
        } else {
            // The probe was too small to measure; fall back on the
            // congestion signals.
            nominal_rate > self.push_rate_old && !self.congestion_notified
        };

        if is_growing {
            self.nb_push_no_congestion += 1;
            self.nb_eras_no_increase = 0;
            self.nb_eras_delay_based_decrease = self.nb_eras_delay_based_decrease.saturating_sub(1);
        } else if self.push_was_not_limited {
            self.nb_push_no_congestion = 0;
            self.nb_eras_no_increase += 1;
            if self.congestion_delay_notified {
                self.nb_eras_delay_based_decrease += 1;
            }
        }
    }

    /// Arms the evaluator for the era that is starting
    pub fn reset(&mut self, nominal_rate: u64, alpha_1024_current: u64) {
        self.congestion_notified = false;
        self.congestion_delay_notified = false;
        self.push_was_not_limited = false;
        self.push_rate_old = nominal_rate;
        // entering push will overwrite this with the probe alpha
        self.push_alpha = alpha_1024_current;
    }
}
