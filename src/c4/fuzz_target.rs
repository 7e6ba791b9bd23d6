// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::congestion_controller::testing::Publisher as Recorder;
use crate::path::CWIN_MINIMUM;
use bolero::{check, generator::*};

#[derive(Debug, TypeGenerator)]
enum Operation {
    AdvanceTime {
        #[generator(1..=1_000)]
        millis: u16,
    },
    Send {
        #[generator(1..=32)]
        packets: u8,
    },
    Ack {
        #[generator(0..=1_000_000)]
        bytes_delivered: u32,
        #[generator(0..=400_000)]
        rtt: u32,
    },
    RttSample {
        #[generator(100..=400_000)]
        rtt: u32,
    },
    PeakBandwidth {
        #[generator(0..=100_000_000)]
        rate: u32,
    },
    Repeat,
    ExplicitCongestion,
    Timeout,
    SpuriousRepeat,
    Seed {
        #[generator(0..=10_000_000)]
        bytes: u32,
    },
    Reset,
}

/// Controller state captured before an operation is applied
struct Snapshot {
    state: State,
    nominal_cwin: u64,
    pig_war: bool,
    rtt_min: u64,
    rtt_min_stamp: u64,
}

struct Model {
    subject: C4CongestionController,
    path: Path,
    publisher: Recorder,
    /// A monotonically increasing clock, in microseconds
    now: u64,
    /// Next packet number to report lost, kept monotone
    next_lost_packet: u64,
    /// Pacing updates already accounted for, to detect that the last
    /// notification republished the window
    nb_pacing_updates: usize,
    /// Window cuts recorded in the current freeze, by cause
    /// (index 0: loss or ECN, index 1: delay)
    freeze_cuts: [u32; 2],
}

impl Model {
    fn new() -> Self {
        let mut path = Path::new(1_440);
        let subject = C4CongestionController::new(&mut path, None, 0);
        Self {
            subject,
            path,
            publisher: Recorder::default(),
            now: 0,
            next_lost_packet: 0,
            nb_pacing_updates: 0,
            freeze_cuts: [0, 0],
        }
    }

    fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.subject.state(),
            nominal_cwin: self.subject.nominal_cwin,
            pig_war: self.subject.pig_war,
            rtt_min: self.subject.rtt.rtt_min,
            rtt_min_stamp: self.subject.rtt.rtt_min_stamp,
        }
    }

    fn apply(&mut self, operation: &Operation) {
        match operation {
            Operation::AdvanceTime { millis } => {
                self.now += *millis as u64 * 1_000;
            }
            Operation::Send { packets } => {
                self.path.next_sequence_number += *packets as u64;
            }
            Operation::Ack {
                bytes_delivered,
                rtt,
            } => {
                if self.path.next_sequence_number > 0 {
                    self.path.highest_acked_sequence = Some(self.path.next_sequence_number - 1);
                }
                self.path.rtt_sample = *rtt as u64;
                self.subject.notify(
                    &mut self.path,
                    Notification::Acknowledgement {
                        bytes_acknowledged: *bytes_delivered as u64,
                        bytes_delivered_since_packet_sent: *bytes_delivered as u64,
                        rtt_measurement: *rtt as u64,
                    },
                    &mut self.publisher,
                    self.now,
                );
            }
            Operation::RttSample { rtt } => {
                self.path.rtt_sample = *rtt as u64;
                self.subject.notify(
                    &mut self.path,
                    Notification::RttMeasurement {
                        rtt_measurement: *rtt as u64,
                    },
                    &mut self.publisher,
                    self.now,
                );
            }
            Operation::PeakBandwidth { rate } => {
                self.path.peak_bandwidth_estimate = *rate as u64;
            }
            Operation::Repeat => {
                let lost_packet_number = self.next_lost_packet;
                self.next_lost_packet += 1;
                self.subject.notify(
                    &mut self.path,
                    Notification::Repeat { lost_packet_number },
                    &mut self.publisher,
                    self.now,
                );
            }
            Operation::ExplicitCongestion => {
                self.subject.notify(
                    &mut self.path,
                    Notification::EcnCongestionExperienced,
                    &mut self.publisher,
                    self.now,
                );
            }
            Operation::Timeout => {
                self.subject.notify(
                    &mut self.path,
                    Notification::Timeout,
                    &mut self.publisher,
                    self.now,
                );
            }
            Operation::SpuriousRepeat => {
                self.subject.notify(
                    &mut self.path,
                    Notification::SpuriousRepeat,
                    &mut self.publisher,
                    self.now,
                );
            }
            Operation::Seed { bytes } => {
                self.subject.notify(
                    &mut self.path,
                    Notification::SeedCwin {
                        bytes_in_flight: *bytes as u64,
                    },
                    &mut self.publisher,
                    self.now,
                );
            }
            Operation::Reset => {
                self.subject.notify(
                    &mut self.path,
                    Notification::Reset,
                    &mut self.publisher,
                    self.now,
                );
            }
        }
    }

    /// Invariants that must hold after every notification
    fn check(&mut self, operation: &Operation, before: &Snapshot) {
        let subject = &self.subject;
        let state = subject.state();

        // the nominal window never leaves its floor
        assert!(subject.nominal_cwin >= CWIN_MINIMUM);
        // neither does the emitted window
        assert!(self.path.cwin >= CWIN_MINIMUM);

        // every state imposes its alpha
        match state {
            State::Initial => assert_eq!(ALPHA_INITIAL_1024, subject.alpha_1024_current),
            State::Recovery => assert_eq!(ALPHA_RECOVER_1024, subject.alpha_1024_current),
            State::Cruising => assert_eq!(ALPHA_CRUISE_1024, subject.alpha_1024_current),
            State::Pushing => assert!(matches!(
                subject.alpha_1024_current,
                ALPHA_PUSH_LOW_1024 | ALPHA_PUSH_1024
            )),
            State::Slowdown => assert_eq!(ALPHA_SLOWDOWN_1024, subject.alpha_1024_current),
            State::Checking => assert_eq!(ALPHA_CHECKING_1024, subject.alpha_1024_current),
        }

        // the delay threshold tracks the minimum RTT
        if subject.rtt.rtt_min != u64::MAX {
            assert_eq!(
                (subject.rtt.rtt_min / 8).min(rtt::DELAY_THRESHOLD_MAX),
                subject.rtt.delay_threshold
            );
        }

        // the era is always framed on an assigned sequence number, and
        // an acknowledged era is re-framed past the ack that ended it,
        // so each era runs its end branch exactly once
        assert!(subject.era.sequence <= self.path.next_sequence_number);
        if matches!(operation, Operation::Ack { .. }) {
            if let Some(acked) = self.path.highest_acked_sequence {
                assert!(subject.era.sequence > acked);
            }
        }

        // recovery is the only state that freezes after congestion
        if subject.last_freeze_was_not_delay {
            assert!(self.path.is_ssthresh_initialized);
        }

        // competition mode is only ever entered together with a restart
        // of bandwidth discovery
        if subject.pig_war && !before.pig_war {
            assert_eq!(State::Initial, state);
        }

        // a window reduction is a congestion reaction: it freezes at the
        // recovery alpha, and fires at most once per freeze and cause
        if !matches!(operation, Operation::Reset) && subject.nominal_cwin < before.nominal_cwin {
            assert_eq!(State::Recovery, state);
            assert_eq!(ALPHA_RECOVER_1024, subject.alpha_1024_current);

            let cause = matches!(operation, Operation::RttSample { .. }) as usize;
            assert_eq!(0, self.freeze_cuts[cause]);
            self.freeze_cuts[cause] += 1;
        }
        if state != State::Recovery {
            self.freeze_cuts = [0, 0];
        }

        // a deliberate slowdown requires a stale minimum-RTT validation,
        // under the adaptive interval in force at the decision
        if state == State::Slowdown && before.state != State::Slowdown {
            let mut slowdown_delay =
                SLOWDOWN_DELAY.max(before.rtt_min.saturating_mul(SLOWDOWN_RTT_COUNT));
            if subject.rtt.filter.sample_min > before.rtt_min {
                let alpha_delay =
                    before.rtt_min.saturating_mul(1024) / subject.rtt.filter.sample_min;
                slowdown_delay = mul1024(alpha_delay, slowdown_delay);
            }
            assert!(before.rtt_min_stamp.saturating_add(slowdown_delay) < self.now);
        }

        // whenever the window was just republished, it is bracketed by
        // the nominal value unless an enlargement path is armed
        if self.publisher.nb_pacing_updates > self.nb_pacing_updates {
            self.nb_pacing_updates = self.publisher.nb_pacing_updates;

            let window_inflated = subject.use_seed_cwin
                || subject.pig_war
                || subject.nominal_cwin < subject.nominal_max_rtt
                || (state == State::Initial && self.path.peak_bandwidth_estimate > 0);
            if !window_inflated {
                let bound = subject
                    .nominal_cwin
                    .saturating_mul(2)
                    .saturating_add(self.path.send_mtu);
                assert!(self.path.cwin <= bound);
            }
        }
    }
}

#[cfg_attr(miri, ignore)]
#[test]
fn c4_fuzz() {
    check!()
        .with_generator(gen::<Vec<Operation>>())
        .for_each(|operations| {
            let mut model = Model::new();

            for operation in operations.iter() {
                let before = model.snapshot();
                model.apply(operation);
                model.check(operation, &before);
            }
        });
}
