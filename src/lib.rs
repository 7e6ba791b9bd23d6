// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! C4 is a delay-sensitive congestion controller for QUIC paths.
//!
//! The controller regulates the allowed in-flight bytes (the congestion
//! window) and the pacing rate of a single path in response to the
//! notifications delivered by the host transport: acknowledgements,
//! losses, ECN marks, RTT measurements and feedback-loss events. It aims
//! for high throughput on large bandwidth-delay-product paths while
//! backing off quickly on genuine congestion, and it detects competition
//! with loss-based flows (Cubic and friends) that do not yield to delay
//! signals.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod c4;
pub mod congestion_controller;
pub mod path;
#[cfg(feature = "alloc")]
pub mod registry;

pub use crate::c4::{C4CongestionController, State};
#[cfg(feature = "alloc")]
pub use crate::congestion_controller::Algorithm;
pub use crate::congestion_controller::{CongestionController, Notification, Publisher};
pub use crate::path::Path;
