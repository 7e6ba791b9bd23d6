// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Process-wide table of the congestion control algorithms a host may
//! select from.
//!
//! The table is built during program setup and read-only afterwards;
//! it is deliberately a fixed-capacity value rather than a mutable
//! singleton.

use crate::congestion_controller::Algorithm;
use core::fmt;

/// Capacity of the algorithm table
pub const MAX_ALGORITHMS: usize = 16;

/// Returned when registering into a full table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RegistryFull;

impl fmt::Display for RegistryFull {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "congestion algorithm registry is full")
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RegistryFull {}

/// Fixed-capacity registry of congestion control algorithms
#[derive(Clone, Copy, Default)]
pub struct Registry {
    algorithms: [Option<&'static dyn Algorithm>; MAX_ALGORITHMS],
    len: usize,
}

impl Registry {
    /// Constructs an empty registry
    pub const fn new() -> Self {
        Self {
            algorithms: [None; MAX_ALGORITHMS],
            len: 0,
        }
    }

    /// Adds an algorithm to the registry.
    ///
    /// The new algorithm is placed first and any previously registered
    /// algorithm with the same id is replaced. Fails only when the
    /// table would overflow.
    pub fn register(&mut self, algorithm: &'static dyn Algorithm) -> Result<(), RegistryFull> {
        let mut next: [Option<&'static dyn Algorithm>; MAX_ALGORITHMS] = [None; MAX_ALGORITHMS];
        let mut nb_copied = 1;

        next[0] = Some(algorithm);
        for existing in self.algorithms.iter().flatten() {
            if existing.id() != algorithm.id() {
                if nb_copied >= MAX_ALGORITHMS {
                    return Err(RegistryFull);
                }
                next[nb_copied] = Some(*existing);
                nb_copied += 1;
            }
        }

        self.algorithms = next;
        self.len = nb_copied;
        Ok(())
    }

    /// Finds a registered algorithm by id
    pub fn lookup(&self, id: &str) -> Option<&'static dyn Algorithm> {
        self.algorithms
            .iter()
            .flatten()
            .copied()
            .find(|algorithm| algorithm.id() == id)
    }

    /// Number of registered algorithms
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no algorithm has been registered
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over the registered algorithms, newest first
    pub fn iter(&self) -> impl Iterator<Item = &'static dyn Algorithm> + '_ {
        self.algorithms.iter().flatten().copied()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.iter().map(|a| a.id())).finish()
    }
}
