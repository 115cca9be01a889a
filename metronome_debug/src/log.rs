// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Forwarding pass events to `tracing`.
//!
//! [`LogSink`] turns each trace event into a `tracing` event under the
//! `metronome::pass` target, so an application that already installs a
//! subscriber gets scheduler activity alongside its own logs. Faults are
//! logged at `WARN`, pass summaries at `DEBUG`, everything else at `TRACE`.

use metronome_core::trace::{
    PassBeginEvent, PassSummary, TimerFaultEvent, TimerFiredEvent, TimerRetiredEvent, TraceSink,
};
use tracing::{debug, trace, warn};

/// A [`TraceSink`] that emits `tracing` events.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl TraceSink for LogSink {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        trace!(
            target: "metronome::pass",
            pass = e.pass_index,
            dt_secs = e.dt_secs,
            active = e.active,
            "pass begin"
        );
    }

    fn on_timer_fired(&mut self, e: &TimerFiredEvent) {
        trace!(
            target: "metronome::pass",
            pass = e.pass_index,
            timer = %e.handle,
            remaining = e.remaining,
            "timer fired"
        );
    }

    fn on_timer_fault(&mut self, e: &TimerFaultEvent) {
        warn!(
            target: "metronome::pass",
            pass = e.pass_index,
            timer = %e.handle,
            policy = ?e.policy,
            panicked = e.panicked,
            "timer faulted"
        );
    }

    fn on_timer_retired(&mut self, e: &TimerRetiredEvent) {
        trace!(
            target: "metronome::pass",
            pass = e.pass_index,
            timer = %e.handle,
            reason = ?e.reason,
            "timer retired"
        );
    }

    fn on_pass_summary(&mut self, s: &PassSummary) {
        debug!(
            target: "metronome::pass",
            pass = s.pass_index,
            fired = s.fired,
            faulted = s.faulted,
            retired = s.retired,
            active = s.active,
            pooled = s.pooled,
            "pass summary"
        );
    }
}
