// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Minimum RTT tracking and the excess-delay detector.
//!
//! RTT samples first pass through a short min-max low-pass filter so a
//! single jitter spike cannot move the minimum. The tracker then
//! maintains the path minimum, the running minimum since the last
//! discovery, and the pending excess-delay measurement that the state
//! machine turns into delay congestion signals.

use super::era;

/// Number of samples in the low-pass window
pub(crate) const MIN_MAX_RTT_SCOPE: usize = 4;

/// Largest tolerated queueing delay before congestion is declared
pub(crate) const DELAY_THRESHOLD_MAX: u64 = 25_000;

/// Delay threshold for declaring congestion: `min(rtt_min / 8, 25ms)`
#[inline]
pub(crate) fn delay_threshold(rtt_min: u64) -> u64 {
    (rtt_min / 8).min(DELAY_THRESHOLD_MAX)
}

/// Rolling min-max filter over the last few RTT samples
#[derive(Clone, Debug, Default)]
pub(crate) struct MinMaxFilter {
    samples: [u64; MIN_MAX_RTT_SCOPE],
    index: usize,
    /// Smallest sample in the current window
    pub sample_min: u64,
    /// Largest sample in the current window
    pub sample_max: u64,
    /// Low-pass floor: never raised by the filter itself
    pub filtered_min: u64,
    /// True once the window has been filled
    pub is_init: bool,
}

impl MinMaxFilter {
    pub fn update(&mut self, rtt: u64) {
        self.samples[self.index] = rtt;
        self.index += 1;
        if self.index >= MIN_MAX_RTT_SCOPE {
            self.index = 0;
            self.is_init = true;
        }

        let window = if self.is_init {
            &self.samples[..]
        } else {
            &self.samples[..self.index]
        };
        self.sample_min = *window.iter().min().expect("window is never empty");
        self.sample_max = *window.iter().max().expect("window is never empty");
    }
}

/// Path RTT state shared by every subsystem of the controller
#[derive(Clone, Debug)]
pub(crate) struct Tracker {
    pub filter: MinMaxFilter,
    /// Smallest filtered RTT seen since the last discovery
    pub rtt_min: u64,
    /// When `rtt_min` was last validated
    pub rtt_min_stamp: u64,
    /// Minimum observed since the last call to `reset_min`
    pub running_rtt_min: u64,
    pub rtt_min_is_trusted: bool,
    /// `min(rtt_min / 8, 25ms)`, refreshed with `rtt_min`
    pub delay_threshold: u64,
    /// Pending delay above the tolerated jitter, 0 if none
    pub recent_delay_excess: u64,
    /// Samples processed since the last era or discovery boundary
    pub nb_updates_since_discovery: u64,
}

impl Tracker {
    pub fn new() -> Self {
        Self {
            filter: MinMaxFilter::default(),
            rtt_min: u64::MAX,
            rtt_min_stamp: 0,
            running_rtt_min: 0,
            rtt_min_is_trusted: false,
            delay_threshold: 0,
            recent_delay_excess: 0,
            nb_updates_since_discovery: 0,
        }
    }

    /// Installs a new path minimum and refreshes everything derived
    /// from it
    pub fn reset_min(&mut self, new_rtt_min: u64, last_rtt: u64, now: u64) {
        self.rtt_min = new_rtt_min;
        self.running_rtt_min = last_rtt;
        self.rtt_min_stamp = now;
        self.delay_threshold = delay_threshold(self.rtt_min);
        self.rtt_min_is_trusted = true;
    }

    /// Re-seeds the low-pass filter with the current `rtt_min`.
    ///
    /// The filter window otherwise keeps memory of samples that predate
    /// a discovery and would delay detection.
    pub fn reset_filter(&mut self) {
        for _ in 0..MIN_MAX_RTT_SCOPE {
            self.filter.update(self.rtt_min);
        }
        self.filter.filtered_min = self.rtt_min;
    }

    /// Feeds one RTT sample.
    ///
    /// `nominal_max_rtt` is the jitter baseline maintained by the state
    /// machine; the pending excess is measured against it plus the
    /// delay threshold. The era frame records the largest raw sample.
    pub fn update(
        &mut self,
        rtt_measurement: u64,
        now: u64,
        era: &mut era::Frame,
        nominal_max_rtt: u64,
    ) {
        self.filter.update(rtt_measurement);
        self.nb_updates_since_discovery += 1;

        if self.filter.filtered_min == 0 || self.filter.filtered_min > self.filter.sample_max {
            self.filter.filtered_min = self.filter.sample_max;
        }

        if !self.filter.is_init {
            return;
        }

        // Use the max of the window as the candidate minimum to filter
        // out jitter, unless the samples themselves are chaotic.
        let mut samples_min = self.filter.sample_max;
        if 2 * self.filter.sample_min < self.filter.sample_max {
            samples_min = (self.filter.sample_min + self.filter.sample_max) / 2;
        }
        if samples_min < self.rtt_min {
            self.reset_min(samples_min, rtt_measurement, now);
        }
        if samples_min < self.running_rtt_min {
            self.running_rtt_min = samples_min;
        }

        if self.filter.sample_min > self.filter.filtered_min
            && self.nb_updates_since_discovery > MIN_MAX_RTT_SCOPE as u64
        {
            let target_rtt = nominal_max_rtt + self.delay_threshold;
            if self.filter.sample_min > target_rtt {
                self.recent_delay_excess = self.filter.sample_min - target_rtt;
            }
        } else {
            self.recent_delay_excess = 0;
        }

        if rtt_measurement > era.max_rtt {
            era.max_rtt = rtt_measurement;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_threshold_formula() {
        assert_eq!(1_250, delay_threshold(10_000));
        assert_eq!(6_250, delay_threshold(50_000));
        // capped at 25ms
        assert_eq!(25_000, delay_threshold(200_001));
        assert_eq!(25_000, delay_threshold(u64::MAX));
    }

    #[test]
    fn filter_initializes_after_full_window() {
        let mut filter = MinMaxFilter::default();

        filter.update(30_000);
        assert!(!filter.is_init);
        assert_eq!(30_000, filter.sample_min);
        assert_eq!(30_000, filter.sample_max);

        filter.update(20_000);
        filter.update(40_000);
        assert!(!filter.is_init);

        filter.update(25_000);
        assert!(filter.is_init);
        assert_eq!(20_000, filter.sample_min);
        assert_eq!(40_000, filter.sample_max);

        // the 30_000 sample rolls out of the window
        filter.update(35_000);
        assert_eq!(20_000, filter.sample_min);
        assert_eq!(40_000, filter.sample_max);
        filter.update(36_000);
        assert_eq!(25_000, filter.sample_min);
    }

    fn tracker_with_min(rtt_min: u64, now: u64) -> (Tracker, era::Frame) {
        let mut tracker = Tracker::new();
        let mut era = era::Frame::default();
        for _ in 0..=MIN_MAX_RTT_SCOPE {
            tracker.update(rtt_min, now, &mut era, 0);
        }
        (tracker, era)
    }

    #[test]
    fn min_discovery_sets_derived_state() {
        let (tracker, _) = tracker_with_min(50_000, 100);

        assert_eq!(50_000, tracker.rtt_min);
        assert_eq!(100, tracker.rtt_min_stamp);
        assert!(tracker.rtt_min_is_trusted);
        assert_eq!(6_250, tracker.delay_threshold);
    }

    #[test]
    fn lower_sample_window_lowers_min() {
        let (mut tracker, mut era) = tracker_with_min(50_000, 100);

        // one low sample is not enough: the window max is the candidate
        tracker.update(30_000, 200, &mut era, 0);
        assert_eq!(50_000, tracker.rtt_min);

        for _ in 0..MIN_MAX_RTT_SCOPE {
            tracker.update(30_000, 300, &mut era, 0);
        }
        assert_eq!(30_000, tracker.rtt_min);
        assert_eq!(300, tracker.rtt_min_stamp);
        assert_eq!(3_750, tracker.delay_threshold);
    }

    #[test]
    fn chaotic_window_uses_mid_point() {
        let (mut tracker, mut era) = tracker_with_min(50_000, 100);

        // min far below max: candidate is the mid point, not the max
        tracker.update(10_000, 200, &mut era, 0);
        tracker.update(10_000, 200, &mut era, 0);
        tracker.update(10_000, 200, &mut era, 0);
        // window is [10_000, 10_000, 10_000, 50_000]
        assert_eq!(30_000, tracker.rtt_min);
    }

    #[test]
    fn excess_fires_after_scope_updates() {
        let (mut tracker, mut era) = tracker_with_min(50_000, 0);
        let nominal_max_rtt = 52_000;

        // rising delay: excess over nominal_max + threshold (58_250)
        for _ in 0..MIN_MAX_RTT_SCOPE {
            tracker.update(80_000, 10, &mut era, nominal_max_rtt);
        }
        assert_eq!(80_000 - 58_250, tracker.recent_delay_excess);
        assert_eq!(80_000, era.max_rtt);
    }

    #[test]
    fn excess_cleared_when_delay_recedes() {
        let (mut tracker, mut era) = tracker_with_min(50_000, 0);

        for _ in 0..MIN_MAX_RTT_SCOPE {
            tracker.update(80_000, 10, &mut era, 0);
        }
        assert!(tracker.recent_delay_excess > 0);

        for _ in 0..MIN_MAX_RTT_SCOPE {
            tracker.update(50_000, 20, &mut era, 0);
        }
        assert_eq!(0, tracker.recent_delay_excess);
    }

    #[test]
    fn reset_filter_forgets_history() {
        let (mut tracker, mut era) = tracker_with_min(50_000, 0);
        for _ in 0..MIN_MAX_RTT_SCOPE {
            tracker.update(90_000, 10, &mut era, 0);
        }
        assert_eq!(90_000, tracker.filter.sample_max);

        tracker.reset_filter();
        assert_eq!(50_000, tracker.filter.sample_min);
        assert_eq!(50_000, tracker.filter.sample_max);
        assert_eq!(50_000, tracker.filter.filtered_min);
    }
}
