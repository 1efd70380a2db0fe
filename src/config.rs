// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

//! # System configuration
//!
//! Tuning knobs owned by the actor system: the local system address,
//! the mailbox throughput per turn, the dead-letter throttle, and the
//! root supervisor for top-level failures.
//!

use crate::supervision::SupervisorStrategy;

use std::sync::Arc;
use std::time::Duration;

/// Configuration for one actor system.
#[derive(Clone)]
pub struct SystemConfig {
    /// The local system address pids are minted under.
    pub address: String,
    /// User messages dispatched per mailbox turn before yielding.
    pub throughput: usize,
    /// Dead-letter events admitted per throttle window.
    pub dead_letter_throttle_count: u64,
    /// Length of the dead-letter throttle window.
    pub dead_letter_throttle_interval: Duration,
    /// Strategy the root guardian applies to top-level failures; the
    /// default one-for-one strategy when absent.
    pub root_supervisor: Option<Arc<dyn SupervisorStrategy>>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            address: "local".to_owned(),
            throughput: 300,
            dead_letter_throttle_count: 10,
            dead_letter_throttle_interval: Duration::from_secs(1),
            root_supervisor: None,
        }
    }
}

impl SystemConfig {
    /// Overrides the system address.
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Overrides the per-turn throughput.
    pub fn with_throughput(mut self, throughput: usize) -> Self {
        self.throughput = throughput.max(1);
        self
    }

    /// Overrides the dead-letter throttle.
    pub fn with_dead_letter_throttle(
        mut self,
        count: u64,
        interval: Duration,
    ) -> Self {
        self.dead_letter_throttle_count = count;
        self.dead_letter_throttle_interval = interval;
        self
    }

    /// Replaces the root guardian's supervisor strategy.
    pub fn with_root_supervisor(
        mut self,
        strategy: Arc<dyn SupervisorStrategy>,
    ) -> Self {
        self.root_supervisor = Some(strategy);
        self
    }
}
