// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The C4 congestion controller.
//!
//! C4 drives two nominal control variables, a window and a rate, and
//! emits them scaled by a per-state multiplier `alpha` (in units of
//! 1/1024). Measurements are framed in eras: one era is the round trip
//! of the previous configuration, so every verdict is taken on data
//! that the configuration under test actually produced.
//!
//! ```text
//!            initial ----------------+
//!               ^  |                 v
//!               |  +-----------> recovery <---------+
//!               |                   |               |
//!               |                   v               |
//!               +--- checking <- cruising -> pushing
//!                        ^          |
//!                        |          v
//!                        +----- slowdown
//! ```
//!
//! Delay signals shrink the window multiplicatively, but a streak of
//! delay-based cuts while the window sits far below its past maximum
//! means a competing loss-based flow is filling the bottleneck queue.
//! C4 then enters the "pig war" mode: delay signals are suppressed and
//! the emitted window is enlarged until the competitor goes away.

use crate::{
    congestion_controller::{CongestionController, Notification, Publisher},
    path::{Path, CWIN_INITIAL, CWIN_MINIMUM},
};
#[cfg(feature = "alloc")]
use alloc::boxed::Box;

mod era;
mod growth;
mod loss;
mod math;
mod rtt;

#[cfg(test)]
mod fuzz_target;

use math::mul1024;

/// Identifier under which the algorithm registers
pub const ALGORITHM_ID: &str = "c4";

/// Numeric code reported in telemetry
pub const ALGORITHM_CODE: u64 = 8;

const ALPHA_RECOVER_1024: u64 = 960; // 93.75%
const ALPHA_CRUISE_1024: u64 = 1024;
const ALPHA_PUSH_1024: u64 = 1280; // 125%
const ALPHA_PUSH_LOW_1024: u64 = 1088; // 106.25%
const ALPHA_INITIAL_1024: u64 = 2048; // 200%
const ALPHA_SLOWDOWN_1024: u64 = 512; // 50%
const ALPHA_CHECKING_1024: u64 = 1024;
/// Eras run at or below this alpha measure the natural jitter
const ALPHA_PREVIOUS_LOW_1024: u64 = 960;

const BETA_LOSS_1024: u64 = 256; // 1/4
const BETA_INITIAL_1024: u64 = 512; // 1/2
/// Reductions larger than this would underflow the control variables
const BETA_MAX_1024: u64 = 768;

/// Startup packets tolerated before a loss ends the initial state
const NB_PACKETS_BEFORE_LOSS: u64 = 20;
/// Successful pushes before bandwidth discovery restarts
const NB_PUSH_BEFORE_RESET: u32 = 4;
/// Cruise eras between pushes
const NB_CRUISE_BEFORE_PUSH: u64 = 4;
/// Delay-based decreases before competition is suspected
const MAX_DELAY_ERA_CONGESTIONS: u32 = 4;
/// Target time between validations of the path minimum RTT
const SLOWDOWN_DELAY: u64 = 5_000_000;
/// The slowdown interval is at least this many round trips
const SLOWDOWN_RTT_COUNT: u64 = 10;
/// Ack-compression tolerance on delivery intervals, 5% in 1/1024 units
const RTT_MARGIN_1024: u64 = 51;

/// Scales a byte count observed over `interval` microseconds to a rate
/// in bytes per second
#[inline]
fn bytes_per_second(bytes: u64, interval: u64) -> u64 {
    let rate = bytes as u128 * 1_000_000 / interval.max(1) as u128;
    rate.min(u64::MAX as u128) as u64
}

/// Bytes a flow at `rate` bytes per second covers in `interval`
/// microseconds
#[inline]
fn bytes_over_interval(rate: u64, interval: u64) -> u64 {
    let bytes = rate as u128 * interval as u128 / 1_000_000;
    bytes.min(u64::MAX as u128) as u64
}

/// The control states of C4
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    /// Exponential bandwidth discovery
    Initial = 0,
    /// Parameters frozen for one era after an event, to observe
    /// whether the previous push paid off
    Recovery = 1,
    /// Holding the level, counting eras until the next probe
    Cruising = 2,
    /// Probing above the nominal level for one era
    Pushing = 3,
    /// Deliberate 50% rate reduction to re-expose the path minimum RTT
    Slowdown = 4,
    /// Post-slowdown era verifying the minimum before resuming
    Checking = 5,
}

/// Option switches recognized in the configuration string
///
/// `K`/`k` enables/disables the cascade (skipping the cruise wait
/// after a successful push); `O`/`o` enables/disables the slow first
/// push. The first unrecognized character ends parsing. Both switches
/// default to enabled.
#[derive(Clone, Copy, Debug)]
struct Options {
    do_cascade: bool,
    do_slow_push: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            do_cascade: true,
            do_slow_push: true,
        }
    }
}

impl Options {
    fn parse(option_string: Option<&str>) -> Self {
        let mut options = Self::default();
        for c in option_string.unwrap_or("").chars() {
            match c {
                'K' => options.do_cascade = true,
                'k' => options.do_cascade = false,
                'O' => options.do_slow_push = true,
                'o' => options.do_slow_push = false,
                _ => return options,
            }
        }
        options
    }
}

/// Per-path state of the C4 congestion controller
#[derive(Clone, Debug)]
pub struct C4CongestionController {
    state: State,
    /// Base congestion window, in bytes
    nominal_cwin: u64,
    /// Base pacing rate, in bytes per second
    nominal_rate: u64,
    /// Multiplier applied to both nominal values for the current state
    alpha_1024_current: u64,
    /// Smoothed maximum RTT of low-pressure eras, the jitter baseline
    nominal_max_rtt: u64,
    nb_packets_in_startup: u64,
    nb_cruise_left_before_push: u64,
    /// Window hint from a previous session, live while `use_seed_cwin`
    seed_cwin: u64,
    use_seed_cwin: bool,
    /// Largest nominal window since bandwidth discovery started
    max_cwin: u64,
    /// Largest delivery sample seen while the rate was not decreasing
    max_bytes_ack: u64,
    /// Running minimum at the end of the previous slowdown, 0 before
    /// the first one
    last_slowdown_rtt_min: u64,
    /// The freeze in progress was caused by loss or ECN, not delay
    last_freeze_was_not_delay: bool,
    /// Competition mode: delay signals are suppressed
    pig_war: bool,
    era: era::Frame,
    growth: growth::Evaluator,
    rtt: rtt::Tracker,
    loss_filter: loss::RateFilter,
    options: Options,
}

impl C4CongestionController {
    /// Initializes controller state for one path.
    ///
    /// The connection is marked as requiring lost-feedback
    /// notifications, like every delay-sensitive algorithm.
    pub fn new(path: &mut Path, option_string: Option<&str>, _now: u64) -> Self {
        path.requires_lost_feedback = true;

        let mut controller = Self::initial_state(Options::parse(option_string));
        controller.era.reset(path, controller.alpha_1024_current);
        controller
    }

    fn initial_state(options: Options) -> Self {
        let mut growth = growth::Evaluator::default();
        growth.reset(0, ALPHA_INITIAL_1024);

        Self {
            state: State::Initial,
            nominal_cwin: CWIN_INITIAL / 2,
            nominal_rate: 0,
            alpha_1024_current: ALPHA_INITIAL_1024,
            nominal_max_rtt: 0,
            nb_packets_in_startup: 0,
            nb_cruise_left_before_push: 0,
            seed_cwin: 0,
            use_seed_cwin: false,
            max_cwin: 0,
            max_bytes_ack: 0,
            last_slowdown_rtt_min: 0,
            last_freeze_was_not_delay: false,
            pig_war: false,
            era: era::Frame::default(),
            growth,
            rtt: rtt::Tracker::new(),
            loss_filter: loss::RateFilter::default(),
            options,
        }
    }

    /// Reinitializes everything but the parsed options
    fn reinitialize(&mut self, path: &mut Path) {
        let options = self.options;
        *self = Self::initial_state(options);
        self.era.reset(path, self.alpha_1024_current);
    }

    /// Arms the one-shot startup seed; only honored in `initial`
    pub fn seed_cwin(&mut self, bytes_in_flight: u64) {
        if self.state == State::Initial {
            self.use_seed_cwin = true;
            self.seed_cwin = bytes_in_flight;
        }
    }

    /// The current control state
    pub fn state(&self) -> State {
        self.state
    }

    /// The current path minimum RTT estimate, `u64::MAX` before the
    /// first sample
    pub fn rtt_min(&self) -> u64 {
        self.rtt.rtt_min
    }

    /// True while competition mode suppresses delay signals
    pub fn is_competing(&self) -> bool {
        self.pig_war
    }

    fn transition_to(&mut self, state: State, publisher: &mut dyn Publisher) {
        self.state = state;
        publisher.on_state_changed(state);
    }

    /// Publishes the emitted window, pacing rate and quantum derived
    /// from the current state to the path.
    ///
    /// This is the single place where control decisions become
    /// observable.
    fn apply_rate_and_cwin(&mut self, path: &mut Path, publisher: &mut dyn Publisher) {
        let mut target_cwin = mul1024(self.alpha_1024_current, self.nominal_cwin);
        let mut pacing_rate = mul1024(self.alpha_1024_current, self.nominal_rate);

        if self.state == State::Initial {
            if self.nb_packets_in_startup > 0 {
                // trust the transport's peak bandwidth estimate for
                // half a bandwidth-delay product
                let min_win =
                    bytes_over_interval(path.peak_bandwidth_estimate, path.smoothed_rtt) / 2;
                if min_win > target_cwin {
                    target_cwin = min_win;
                }
                if path.peak_bandwidth_estimate > pacing_rate.saturating_mul(2) {
                    pacing_rate = path.peak_bandwidth_estimate / 2;
                }
            }
            if self.use_seed_cwin && self.seed_cwin > target_cwin {
                // march half the distance to the seed until validated
                target_cwin = ((self.seed_cwin as u128 + target_cwin as u128) / 2) as u64;
                let target_rate = bytes_per_second(self.seed_cwin, path.smoothed_rtt);
                if target_rate > pacing_rate {
                    pacing_rate = target_rate;
                }
            }
            // allow for bunching of packets during discovery
            pacing_rate = mul1024(1024 + 256, pacing_rate);
        }

        if self.pig_war || self.nominal_cwin < self.nominal_max_rtt {
            // keep sending through jitter events: the window must cover
            // the jitter baseline at the current pacing rate
            let jitter_cwin = bytes_over_interval(pacing_rate, self.nominal_max_rtt);
            if jitter_cwin > target_cwin {
                target_cwin = jitter_cwin;
            }
        }

        if self.state == State::Pushing {
            // the probe must exceed the nominal window by at least one
            // packet to be measurable
            let push_floor = self.nominal_cwin.saturating_add(path.send_mtu);
            if target_cwin < push_floor {
                target_cwin = push_floor;
            }
        }

        if target_cwin < CWIN_MINIMUM {
            target_cwin = CWIN_MINIMUM;
        }

        path.cwin = target_cwin;
        let mut quantum = target_cwin / 4;
        if quantum > 0x10000 {
            quantum = 0x10000;
        } else if quantum < 2 * path.send_mtu {
            quantum = 2 * path.send_mtu;
        }
        path.pacing_rate = pacing_rate;
        path.pacing_quantum = quantum;
        publisher.on_pacing_rate_updated(pacing_rate, quantum);
    }

    /// Scales down delivery samples measured over a stretched interval.
    ///
    /// Ack compression can report a full window of delivered bytes over
    /// an interval much longer than one round trip, which would inflate
    /// the window if taken at face value.
    fn corrected_delivered_bytes(&self, nb_bytes_delivered: u64, rtt_measurement: u64) -> u64 {
        let duration_max = mul1024(1024 + RTT_MARGIN_1024, self.rtt.rtt_min);

        if rtt_measurement > duration_max {
            let ratio_1024 = duration_max.saturating_mul(1024) / rtt_measurement;
            mul1024(ratio_1024, nb_bytes_delivered)
        } else {
            nb_bytes_delivered
        }
    }

    fn enter_initial(&mut self, path: &Path, publisher: &mut dyn Publisher) {
        self.transition_to(State::Initial, publisher);
        self.growth.nb_push_no_congestion = 0;
        self.alpha_1024_current = ALPHA_INITIAL_1024;
        self.nb_packets_in_startup = 0;
        self.rtt.nb_updates_since_discovery = 0;
        self.era.reset(path, self.alpha_1024_current);
        self.growth.nb_eras_no_increase = 0;
        self.growth.nb_eras_delay_based_decrease = 0;
        self.max_cwin = 0;
        self.growth.reset(self.nominal_rate, self.alpha_1024_current);
    }

    fn exit_initial(&mut self, path: &Path, publisher: &mut dyn Publisher) {
        self.growth.nb_eras_no_increase = 0;
        self.growth.nb_push_no_congestion = 0;
        self.growth.nb_eras_delay_based_decrease = 0;
        self.enter_recovery(path, false, false, publisher);
    }

    /// Freezes the parameters for one era
    fn enter_recovery(
        &mut self,
        path: &Path,
        is_congested: bool,
        is_delay: bool,
        publisher: &mut dyn Publisher,
    ) {
        if !is_congested {
            self.last_freeze_was_not_delay = false;
        } else {
            self.growth.nb_push_no_congestion = 0;
            self.last_freeze_was_not_delay = !is_delay;
        }
        self.alpha_1024_current = ALPHA_RECOVER_1024;

        if self.state == State::Initial {
            self.growth.reset(self.nominal_rate, self.alpha_1024_current);
        }
        self.transition_to(State::Recovery, publisher);
        self.era.reset(path, self.alpha_1024_current);
    }

    /// Settles the frozen era and picks the next state.
    ///
    /// This is also where competition is detected: a streak of
    /// delay-based decreases that left the window far below its past
    /// maximum means somebody else is filling the queue.
    fn exit_recovery(&mut self, path: &Path, now: u64, publisher: &mut dyn Publisher) {
        self.growth.evaluate(self.nominal_rate);
        self.growth.reset(self.nominal_rate, self.alpha_1024_current);
        if self.nominal_cwin > self.max_cwin {
            self.max_cwin = self.nominal_cwin;
        }
        self.rtt.recent_delay_excess = 0;
        self.rtt.nb_updates_since_discovery = 0;

        let decreases = self.growth.nb_eras_delay_based_decrease;
        if !self.pig_war
            && ((decreases >= MAX_DELAY_ERA_CONGESTIONS
                && self.nominal_cwin.saturating_mul(2) < self.max_cwin)
                || (decreases > MAX_DELAY_ERA_CONGESTIONS
                    && self.nominal_cwin.saturating_mul(5) < self.max_cwin.saturating_mul(4)))
        {
            self.start_pig_war(path, now, publisher);
        } else if self.growth.nb_push_no_congestion >= NB_PUSH_BEFORE_RESET {
            if self.pig_war {
                // bandwidth has grown again: the competitor is gone
                self.stop_pig_war(path, publisher);
            } else {
                self.enter_initial(path, publisher);
            }
        } else if self.pig_war && self.growth.nb_push_no_congestion > 0 {
            self.stop_pig_war(path, publisher);
        } else {
            self.enter_cruise(path, publisher);
        }
    }

    /// Enters competition mode.
    ///
    /// The minimum RTT is rebased on the current sample, since the
    /// previous minimum predates the standing queue, and discovery
    /// restarts from `initial`.
    fn start_pig_war(&mut self, path: &Path, now: u64, publisher: &mut dyn Publisher) {
        self.pig_war = true;
        self.growth.nb_eras_delay_based_decrease = 0;
        self.rtt.rtt_min = path.rtt_sample;
        self.rtt.rtt_min_stamp = now;
        self.rtt.delay_threshold = rtt::delay_threshold(self.rtt.rtt_min);
        self.rtt.reset_filter();
        self.rtt.filter.filtered_min = path.rtt_sample;
        publisher.on_competition_mode_changed(true);
        self.enter_initial(path, publisher);
    }

    fn stop_pig_war(&mut self, path: &Path, publisher: &mut dyn Publisher) {
        self.pig_war = false;
        self.growth.nb_push_no_congestion = 0;
        publisher.on_competition_mode_changed(false);
        self.enter_cruise(path, publisher);
    }

    fn enter_cruise(&mut self, path: &Path, publisher: &mut dyn Publisher) {
        self.era.reset(path, self.alpha_1024_current);
        self.use_seed_cwin = false;

        if self.growth.nb_push_no_congestion > 0 && self.options.do_cascade {
            // the last push paid off, probe again without waiting
            self.nb_cruise_left_before_push = 0;
        } else {
            self.nb_cruise_left_before_push = NB_CRUISE_BEFORE_PUSH;
        }
        self.alpha_1024_current = ALPHA_CRUISE_1024;
        self.transition_to(State::Cruising, publisher);
    }

    fn enter_push(&mut self, path: &Path, publisher: &mut dyn Publisher) {
        if self.growth.nb_push_no_congestion == 0 && !self.pig_war && self.options.do_slow_push {
            // the previous push failed: probe 6.25% up instead of 25%
            self.alpha_1024_current = ALPHA_PUSH_LOW_1024;
        } else {
            self.alpha_1024_current = ALPHA_PUSH_1024;
        }
        self.growth.push_alpha = self.alpha_1024_current;
        self.era.reset(path, self.alpha_1024_current);
        self.transition_to(State::Pushing, publisher);
    }

    /// Decides whether the minimum RTT is due for re-validation.
    ///
    /// Returns `(slowdown_needed, is_natural)`. The slowdown is
    /// "natural" when the application is already sending less than half
    /// the target window, so no deliberate rate cut is required.
    fn is_slowdown_needed(&self, now: u64, bytes_in_past_flight: u64) -> (bool, bool) {
        if matches!(self.state, State::Slowdown | State::Checking) {
            return (false, false);
        }

        let mut slowdown_delay = SLOWDOWN_DELAY;
        let mut cwnd_target = self.nominal_cwin;
        let mut is_urgent = false;

        let min_interval = self.rtt.rtt_min.saturating_mul(SLOWDOWN_RTT_COUNT);
        if slowdown_delay < min_interval {
            slowdown_delay = min_interval;
        }

        if self.rtt.filter.sample_min > self.rtt.rtt_min {
            // delay is already building: check sooner, and compare the
            // in-flight bytes against a window scaled by the inflation
            let alpha_delay = self.rtt.rtt_min.saturating_mul(1024) / self.rtt.filter.sample_min;
            let alpha_cwnd =
                self.rtt.filter.sample_min.saturating_mul(1024) / self.rtt.rtt_min.max(1);
            cwnd_target = mul1024(alpha_cwnd, self.nominal_cwin);
            slowdown_delay = mul1024(alpha_delay, slowdown_delay);
            is_urgent = true;
        }

        let is_natural = bytes_in_past_flight.saturating_mul(2) < cwnd_target;
        let needed = (is_natural && is_urgent)
            || self.rtt.rtt_min_stamp.saturating_add(slowdown_delay) < now;
        (needed, is_natural)
    }

    /// Halves the sending rate for one era to drain the queue.
    ///
    /// The running minimum restarts from the worst recent sample so the
    /// verification era measures only what the drained path produces.
    fn enter_slowdown(&mut self, path: &Path, now: u64, publisher: &mut dyn Publisher) {
        let current_rtt = self.rtt.filter.sample_max;
        self.alpha_1024_current = ALPHA_SLOWDOWN_1024;
        self.rtt.reset_min(self.rtt.rtt_min, current_rtt, now);
        self.transition_to(State::Slowdown, publisher);
        self.era.reset(path, self.alpha_1024_current);
    }

    fn enter_checking(&mut self, path: &Path, publisher: &mut dyn Publisher) {
        self.alpha_1024_current = ALPHA_CHECKING_1024;
        self.transition_to(State::Checking, publisher);
        self.era.reset(path, self.alpha_1024_current);
    }

    /// Verdict of the post-slowdown verification era.
    ///
    /// Two consecutive clean observations above the recorded minimum
    /// mean the path RTT genuinely changed: either a competitor is
    /// keeping the queue full (enter the pig war) or the route moved
    /// (rebase the minimum and rediscover). A single observation is
    /// not trusted and the controller simply resumes cruising.
    fn end_checking_era(&mut self, path: &Path, now: u64, publisher: &mut dyn Publisher) {
        let last_slowdown_rtt_min = self.last_slowdown_rtt_min;
        if path.rtt_sample < self.rtt.running_rtt_min {
            // the ack ending the era may be processed before its RTT
            // sample; account for the sample directly
            self.rtt.running_rtt_min = path.rtt_sample;
        }
        self.last_slowdown_rtt_min = self.rtt.running_rtt_min;

        if self.rtt.running_rtt_min > self.rtt.rtt_min && last_slowdown_rtt_min > self.rtt.rtt_min {
            if !self.pig_war && path.rtt_sample > self.rtt.rtt_min.saturating_mul(2) {
                self.start_pig_war(path, now, publisher);
            } else {
                // do not fall into a pig war right after changing RTT
                self.growth.nb_eras_delay_based_decrease = 0;
                self.rtt.reset_min(self.rtt.running_rtt_min, path.rtt_sample, now);
                self.rtt.reset_filter();
                self.enter_initial(path, publisher);
            }
        } else {
            // keep rtt_min, restart its validation clock
            self.rtt.reset_min(self.rtt.rtt_min, path.rtt_sample, now);
            self.enter_cruise(path, publisher);
        }
    }

    /// Feeds one acknowledgement into the control variables, then runs
    /// the era-end state transitions if this acknowledgement completed
    /// the era.
    fn on_acknowledgement(
        &mut self,
        path: &mut Path,
        bytes_delivered: u64,
        rtt_measurement: u64,
        now: u64,
        publisher: &mut dyn Publisher,
    ) {
        let previous_rate = self.nominal_rate;
        let mut rate_measurement = 0;
        let corrected_delivered = self.corrected_delivered_bytes(bytes_delivered, rtt_measurement);

        if rtt_measurement > 0 {
            let mut corrected_rtt = rtt_measurement;
            if corrected_rtt < self.rtt.rtt_min && self.rtt.rtt_min != u64::MAX {
                corrected_rtt = self.rtt.rtt_min;
            }
            rate_measurement = bytes_per_second(bytes_delivered, corrected_rtt);

            if self.state != State::Initial {
                // ack compression produces implausible spikes; outside
                // of discovery the sender never exceeds the push rate
                let max_rate = mul1024(ALPHA_PUSH_1024, self.nominal_rate);
                if rate_measurement > max_rate {
                    rate_measurement = max_rate;
                }
            }

            if rate_measurement > self.nominal_rate {
                self.nominal_rate = rate_measurement;
                self.growth.push_was_not_limited = true;
            }
        }

        if corrected_delivered > self.nominal_cwin
            && (!self.use_seed_cwin || self.state == State::Initial)
        {
            self.nominal_cwin = corrected_delivered;
            self.growth.push_was_not_limited = true;
        } else if bytes_delivered > self.nominal_cwin {
            self.growth.push_was_not_limited = true;
        }

        if rate_measurement >= previous_rate && bytes_delivered > self.max_bytes_ack {
            self.max_bytes_ack = bytes_delivered;
        }

        if self.state == State::Initial {
            self.initial_on_ack(path, publisher);
        } else if self.era.is_complete(path) {
            // The max RTT baseline is only updated when the era ends
            // naturally; an era cut short by congestion would fold the
            // congestion delay into the jitter estimate.
            self.era.observe_rtt(path.rtt_sample);
            if self.nominal_max_rtt == 0 {
                self.nominal_max_rtt = self.era.max_rtt;
            } else if self.era.alpha_1024_previous <= ALPHA_PREVIOUS_LOW_1024 {
                if self.era.max_rtt >= self.nominal_max_rtt {
                    self.nominal_max_rtt = self.era.max_rtt;
                } else {
                    let smoothed =
                        (7 * self.nominal_max_rtt as u128 + self.era.max_rtt as u128) / 8;
                    self.nominal_max_rtt = smoothed as u64;
                }
            }

            let (slowdown_needed, is_natural) = self.is_slowdown_needed(now, bytes_delivered);
            if slowdown_needed {
                if is_natural {
                    // traffic is light: the verification era is enough
                    self.enter_checking(path, publisher);
                } else {
                    self.enter_slowdown(path, now, publisher);
                }
            } else {
                match self.state {
                    State::Recovery => self.exit_recovery(path, now, publisher),
                    State::Cruising => {
                        if self.nb_cruise_left_before_push > 0 {
                            self.nb_cruise_left_before_push -= 1;
                        }
                        self.era.reset(path, self.alpha_1024_current);
                        if self.nb_cruise_left_before_push == 0 && !path.is_application_limited() {
                            self.enter_push(path, publisher);
                        }
                    }
                    State::Pushing => self.enter_recovery(path, false, false, publisher),
                    State::Slowdown => self.enter_checking(path, publisher),
                    State::Checking => self.end_checking_era(path, now, publisher),
                    State::Initial => self.era.reset(path, self.alpha_1024_current),
                }
            }
        }
    }

    fn initial_on_ack(&mut self, path: &Path, publisher: &mut dyn Publisher) {
        self.nb_packets_in_startup += 1;
        if self.use_seed_cwin && self.nominal_cwin >= self.seed_cwin {
            // discovery caught up with the seed: the seed is validated
            self.use_seed_cwin = false;
        }
        if self.era.is_complete(path) {
            // An app-limited era should arguably not count against
            // growth, but skipping the check keeps connections that
            // trickle data for several round trips from staying in
            // discovery forever; the not-limited flag already requires
            // that some data was seen.
            self.growth.evaluate(self.nominal_rate);
            self.era.reset(path, self.alpha_1024_current);
            if self.growth.nb_eras_no_increase >= 3 {
                self.exit_initial(path, publisher);
            } else {
                self.growth.reset(self.nominal_rate, self.alpha_1024_current);
            }
        }
    }

    fn initial_on_loss(&mut self, path: &Path, publisher: &mut dyn Publisher) {
        self.nb_packets_in_startup += 1;
        if self.nb_packets_in_startup > NB_PACKETS_BEFORE_LOSS {
            self.exit_initial(path, publisher);
        }
    }

    /// Delay-increase test while in discovery, in the HyStart spirit
    fn initial_on_rtt(&mut self, path: &Path, publisher: &mut dyn Publisher) {
        if self.rtt.filter.is_init
            && self.rtt.recent_delay_excess > 0
            && self.growth.nb_eras_no_increase > 1
        {
            self.exit_initial(path, publisher);
        }
    }

    /// Delay-congestion test outside of discovery
    fn on_rtt(&mut self, path: &mut Path, now: u64, publisher: &mut dyn Publisher) {
        if self.rtt.rtt_min_is_trusted && self.rtt.recent_delay_excess > 0 && !self.pig_war {
            self.notify_congestion(path, true, now, publisher);
        }
    }

    /// Reaction to ECN marks, sustained losses or excess delay.
    ///
    /// The reduction is multiplicative on both nominal variables; a
    /// push era absorbs the signal without a cut since the probe, not
    /// the nominal level, caused it.
    fn notify_congestion(
        &mut self,
        path: &mut Path,
        is_delay: bool,
        _now: u64,
        publisher: &mut dyn Publisher,
    ) {
        self.growth.congestion_notified = true;
        self.growth.congestion_delay_notified |= is_delay;

        if self.state == State::Recovery && (!is_delay || !self.last_freeze_was_not_delay) {
            // one cut per freeze and per cause
            return;
        }

        let mut beta = BETA_LOSS_1024;
        if is_delay {
            beta = (self.rtt.recent_delay_excess.saturating_mul(1024)
                / self.rtt.delay_threshold.max(1))
            .min(BETA_LOSS_1024);
            if self.state == State::Initial && beta < BETA_INITIAL_1024 {
                beta = BETA_INITIAL_1024;
            }
        } else {
            // loss and ECN reset the spurious-delay filter
            self.rtt.recent_delay_excess = 0;
        }
        beta = beta.min(BETA_MAX_1024);

        if self.state == State::Pushing {
            self.growth.nb_push_no_congestion = 0;
        } else {
            self.nominal_cwin -= mul1024(beta, self.nominal_cwin);
            self.nominal_rate -= mul1024(beta, self.nominal_rate);
            self.max_bytes_ack -= mul1024(beta, self.max_bytes_ack);

            if self.nominal_cwin < CWIN_MINIMUM {
                self.nominal_cwin = CWIN_MINIMUM;
            }
        }

        self.enter_recovery(path, true, is_delay, publisher);
        self.apply_rate_and_cwin(path, publisher);
        path.is_ssthresh_initialized = true;
    }
}

impl CongestionController for C4CongestionController {
    fn notify(
        &mut self,
        path: &mut Path,
        notification: Notification,
        publisher: &mut dyn Publisher,
        now: u64,
    ) {
        path.is_cc_data_updated = true;

        match notification {
            Notification::Acknowledgement {
                bytes_delivered_since_packet_sent,
                rtt_measurement,
                ..
            } => {
                self.on_acknowledgement(
                    path,
                    bytes_delivered_since_packet_sent,
                    rtt_measurement,
                    now,
                    publisher,
                );
                self.apply_rate_and_cwin(path, publisher);
            }
            Notification::EcnCongestionExperienced => {
                if self.state == State::Initial {
                    self.initial_on_loss(path, publisher);
                } else {
                    self.notify_congestion(path, false, now, publisher);
                }
            }
            Notification::Repeat { lost_packet_number } => {
                if self.state == State::Recovery && lost_packet_number < self.era.sequence {
                    // losses of packets sent before the freeze are stale
                    return;
                }
                if self.loss_filter.on_repeat(lost_packet_number) {
                    if self.state == State::Initial {
                        self.initial_on_loss(path, publisher);
                    } else {
                        self.notify_congestion(path, false, now, publisher);
                    }
                }
            }
            // a probe timeout is not a congestion signal at this layer
            Notification::Timeout => {}
            Notification::SpuriousRepeat => {
                // best-effort attenuation of delay false positives
                self.rtt.recent_delay_excess = 0;
            }
            Notification::RttMeasurement { rtt_measurement } => {
                self.rtt
                    .update(rtt_measurement, now, &mut self.era, self.nominal_max_rtt);
                if self.state == State::Initial {
                    self.initial_on_rtt(path, publisher);
                    self.apply_rate_and_cwin(path, publisher);
                } else {
                    self.on_rtt(path, now, publisher);
                }
            }
            Notification::LostFeedback | Notification::CwinBlocked => {}
            Notification::Reset => self.reinitialize(path),
            Notification::SeedCwin { bytes_in_flight } => self.seed_cwin(bytes_in_flight),
        }
    }

    fn observe(&self) -> (u64, u64) {
        (self.state as u64, self.rtt.rtt_min)
    }
}

/// Registration descriptor for C4
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct Endpoint {}

/// The process-wide descriptor instance, ready to register
pub static ALGORITHM: Endpoint = Endpoint {};

#[cfg(feature = "alloc")]
impl crate::congestion_controller::Algorithm for Endpoint {
    fn id(&self) -> &'static str {
        ALGORITHM_ID
    }

    fn code(&self) -> u64 {
        ALGORITHM_CODE
    }

    fn new_controller(
        &self,
        path: &mut Path,
        option_string: Option<&str>,
        now: u64,
    ) -> Box<dyn CongestionController> {
        Box::new(C4CongestionController::new(path, option_string, now))
    }
}
