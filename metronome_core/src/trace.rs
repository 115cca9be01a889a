// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Tracing and diagnostics for the advance pass.
//!
//! This module provides a [`TraceSink`] trait with per-event methods that the
//! [`Scheduler`](crate::scheduler::Scheduler) calls at each stage of a pass.
//! All method bodies default to no-ops, so implementing only the events you
//! care about is fine.
//!
//! [`Tracer`] wraps an optional `&mut dyn TraceSink`. When the `trace` feature
//! is **off**, every `Tracer` method compiles to nothing (zero overhead). When
//! **on**, each method performs a single `Option` branch before dispatching.
//!
//! Free-form diagnostics (invalid registrations, contained faults) go through
//! the `tracing` facade instead; the sink only sees structured pass events.
//!
//! # Crate features
//!
//! - `trace`: enables the `Tracer` method bodies (one branch per call).

use crate::config::FaultPolicy;
use crate::handle::TimerHandle;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Why an entry left the active registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RetireReason {
    /// Cancelled by key or handle.
    Cancelled,
    /// Its repeat count reached zero.
    Exhausted,
    /// Its callback faulted under [`FaultPolicy::Contain`].
    Faulted,
}

// ---------------------------------------------------------------------------
// Event structs
// ---------------------------------------------------------------------------

/// Emitted at the start of a pass, after pending registrations are promoted.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassBeginEvent {
    /// Monotonic pass counter (the first pass is 1).
    pub pass_index: u64,
    /// Frame delta supplied by the tick source, in seconds.
    pub dt_secs: f32,
    /// Sum of all deltas seen so far, including this one.
    pub clock_secs: f64,
    /// Entries in the active registry for this pass.
    pub active: usize,
}

/// Emitted just before a due callback is invoked.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimerFiredEvent {
    /// Pass in which the timer fired.
    pub pass_index: u64,
    /// The entry that fired.
    pub handle: TimerHandle,
    /// Remaining repeat count after this firing (`0` for unbounded timers
    /// and for the final firing of bounded ones).
    pub remaining: u32,
    /// Residual elapsed time carried into the next interval.
    pub residual_secs: f32,
}

/// Emitted when a callback faults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerFaultEvent {
    /// Pass in which the fault occurred.
    pub pass_index: u64,
    /// The faulting entry.
    pub handle: TimerHandle,
    /// Policy applied to the fault.
    pub policy: FaultPolicy,
    /// Whether the fault was a panic rather than an `Err` result.
    pub panicked: bool,
}

/// Emitted when an entry is detached from the active registry and pooled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimerRetiredEvent {
    /// Pass at whose boundary the entry was retired.
    pub pass_index: u64,
    /// The retired entry (stale from this point on).
    pub handle: TimerHandle,
    /// Why it was retired.
    pub reason: RetireReason,
}

/// Per-pass summary emitted at the end of a completed pass.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PassSummary {
    /// Pass counter.
    pub pass_index: u64,
    /// Frame delta for this pass, in seconds.
    pub dt_secs: f32,
    /// Accumulated delta time after this pass.
    pub clock_secs: f64,
    /// Callbacks invoked.
    pub fired: u32,
    /// Callbacks that faulted.
    pub faulted: u32,
    /// Entries detached and returned to the pool.
    pub retired: u32,
    /// Pending entries promoted into the active registry.
    pub promoted: u32,
    /// Active entries after the pass.
    pub active: usize,
    /// Pooled records after the pass.
    pub pooled: usize,
}

// ---------------------------------------------------------------------------
// TraceSink trait
// ---------------------------------------------------------------------------

/// Receives trace events from the advance pass.
///
/// All methods have default no-op implementations, so you only need to
/// override the events you care about.
pub trait TraceSink {
    /// Called when a pass begins.
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        _ = e;
    }

    /// Called before a due callback runs.
    fn on_timer_fired(&mut self, e: &TimerFiredEvent) {
        _ = e;
    }

    /// Called when a callback faults.
    fn on_timer_fault(&mut self, e: &TimerFaultEvent) {
        _ = e;
    }

    /// Called when an entry is retired to the pool.
    fn on_timer_retired(&mut self, e: &TimerRetiredEvent) {
        _ = e;
    }

    /// Called with the summary of a completed pass.
    fn on_pass_summary(&mut self, s: &PassSummary) {
        _ = s;
    }
}

// ---------------------------------------------------------------------------
// NoopSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that discards all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl TraceSink for NoopSink {}

// ---------------------------------------------------------------------------
// Tracer wrapper
// ---------------------------------------------------------------------------

/// Thin wrapper around an optional [`TraceSink`].
///
/// When the `trace` feature is **off**, every method compiles to nothing. When
/// **on**, each method checks the inner `Option` (one branch) before
/// dispatching to the sink.
pub struct Tracer<'a> {
    #[cfg(feature = "trace")]
    sink: Option<&'a mut dyn TraceSink>,
    #[cfg(not(feature = "trace"))]
    _marker: core::marker::PhantomData<&'a mut dyn TraceSink>,
}

impl core::fmt::Debug for Tracer<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Tracer").finish_non_exhaustive()
    }
}

impl<'a> Tracer<'a> {
    /// Creates a tracer that dispatches to the given sink.
    #[inline]
    #[must_use]
    pub fn new(sink: &'a mut dyn TraceSink) -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: Some(sink) }
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = sink;
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Creates a tracer that discards all events.
    #[inline]
    #[must_use]
    pub fn none() -> Self {
        #[cfg(feature = "trace")]
        {
            Self { sink: None }
        }
        #[cfg(not(feature = "trace"))]
        {
            Self {
                _marker: core::marker::PhantomData,
            }
        }
    }

    /// Emits a [`PassBeginEvent`].
    #[inline]
    pub fn pass_begin(&mut self, e: &PassBeginEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_pass_begin(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`TimerFiredEvent`].
    #[inline]
    pub fn timer_fired(&mut self, e: &TimerFiredEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_timer_fired(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`TimerFaultEvent`].
    #[inline]
    pub fn timer_fault(&mut self, e: &TimerFaultEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_timer_fault(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`TimerRetiredEvent`].
    #[inline]
    pub fn timer_retired(&mut self, e: &TimerRetiredEvent) {
        #[cfg(feature = "trace")]
        if let Some(s) = &mut self.sink {
            s.on_timer_retired(e);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = e;
        }
    }

    /// Emits a [`PassSummary`].
    #[inline]
    pub fn pass_summary(&mut self, s: &PassSummary) {
        #[cfg(feature = "trace")]
        if let Some(sink) = &mut self.sink {
            sink.on_pass_summary(s);
        }
        #[cfg(not(feature = "trace"))]
        {
            _ = s;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
