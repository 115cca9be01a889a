// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Scheduler configuration and the process-wide fault policy.
//!
//! [`SchedulerConfig`] is plain data passed to
//! [`Scheduler::new`](crate::scheduler::Scheduler::new). The one setting that
//! is process-wide rather than per-instance is the [`FaultPolicy`], stored in
//! an atomic and read through [`global_policy`] whenever a scheduler has no
//! override of its own.

use core::sync::atomic::{AtomicU8, Ordering};

/// Default drift ceiling: residual elapsed time above this is discarded.
pub const DEFAULT_DRIFT_CEILING_SECS: f32 = 0.03;

/// Default minimal positive interval used by "next tick" registrations.
pub const DEFAULT_MIN_INTERVAL_SECS: f32 = 0.0001;

/// What happens when a callback reports a fault.
///
/// A fault is an `Err` returned from a callback or, with the `std` feature,
/// a panic unwinding out of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultPolicy {
    /// The faulting entry is cancelled, a warning is logged, and the pass
    /// continues with the remaining entries.
    Contain,
    /// The fault leaves the advance call; entries not yet visited in that
    /// pass are skipped.
    Propagate,
}

impl FaultPolicy {
    const fn to_u8(self) -> u8 {
        match self {
            Self::Contain => 0,
            Self::Propagate => 1,
        }
    }

    const fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Contain,
            _ => Self::Propagate,
        }
    }
}

static GLOBAL_POLICY: AtomicU8 = AtomicU8::new(FaultPolicy::Contain.to_u8());

/// Returns the process-wide fault policy.
///
/// Defaults to [`FaultPolicy::Contain`].
#[must_use]
pub fn global_policy() -> FaultPolicy {
    FaultPolicy::from_u8(GLOBAL_POLICY.load(Ordering::Relaxed))
}

/// Sets the process-wide fault policy.
///
/// Schedulers whose [`SchedulerConfig::fault_policy`] is `None` observe the
/// new value from their next fault onward.
pub fn set_global_policy(policy: FaultPolicy) {
    GLOBAL_POLICY.store(policy.to_u8(), Ordering::Relaxed);
}

/// Held by tests that change the process-wide policy.
#[cfg(test)]
pub(crate) static GLOBAL_POLICY_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Configuration for the [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Upper bound, in seconds, on the residual elapsed time carried past a
    /// firing. Larger residuals (frame spikes) are reset to zero.
    pub drift_ceiling_secs: f32,
    /// Interval used by
    /// [`schedule_once`](crate::scheduler::Scheduler::schedule_once) and
    /// [`schedule_every_tick`](crate::scheduler::Scheduler::schedule_every_tick).
    pub min_interval_secs: f32,
    /// Per-scheduler fault policy. `None` defers to [`global_policy`].
    pub fault_policy: Option<FaultPolicy>,
    /// Number of entry records to reserve up front.
    pub initial_capacity: usize,
}

impl SchedulerConfig {
    /// The stock configuration: 30 ms drift ceiling, global fault policy.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            drift_ceiling_secs: DEFAULT_DRIFT_CEILING_SECS,
            min_interval_secs: DEFAULT_MIN_INTERVAL_SECS,
            fault_policy: None,
            initial_capacity: 0,
        }
    }

    /// Returns this configuration with a fixed fault policy.
    #[must_use]
    pub const fn with_fault_policy(mut self, policy: FaultPolicy) -> Self {
        self.fault_policy = Some(policy);
        self
    }

    /// Returns this configuration with `capacity` entry records reserved.
    #[must_use]
    pub const fn with_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Resolves the policy in effect, consulting the global flag if needed.
    #[must_use]
    pub fn effective_fault_policy(&self) -> FaultPolicy {
        self.fault_policy.unwrap_or_else(global_policy)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new()
    }
}
