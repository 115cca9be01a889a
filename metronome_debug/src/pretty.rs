// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Human-readable trace output.
//!
//! [`PrettyPrintSink`] implements [`TraceSink`] and writes one line per event
//! to a [`Write`](std::io::Write) destination (default: stderr). Times are
//! printed in milliseconds.

use std::io::Write;

use metronome_core::trace::{
    PassBeginEvent, PassSummary, RetireReason, TimerFaultEvent, TimerFiredEvent,
    TimerRetiredEvent, TraceSink,
};

/// Writes human-readable trace lines to a [`Write`](std::io::Write) destination.
pub struct PrettyPrintSink<W: Write = Box<dyn Write>> {
    writer: W,
    /// Skip per-timer lines and print only pass begin/summary.
    summary_only: bool,
}

impl<W: Write> std::fmt::Debug for PrettyPrintSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrettyPrintSink")
            .field("summary_only", &self.summary_only)
            .finish_non_exhaustive()
    }
}

impl PrettyPrintSink {
    /// Creates a sink that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::with_writer(Box::new(std::io::stderr()))
    }
}

impl<W: Write> PrettyPrintSink<W> {
    /// Creates a sink that writes to the given destination.
    #[must_use]
    pub fn with_writer(writer: W) -> Self {
        Self {
            writer,
            summary_only: false,
        }
    }

    /// Only print pass-level lines, dropping per-timer events.
    #[must_use]
    pub fn summary_only(mut self, summary_only: bool) -> Self {
        self.summary_only = summary_only;
        self
    }

    /// Consumes the sink and returns its writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

fn secs_to_ms(secs: f32) -> f64 {
    f64::from(secs) * 1000.0
}

fn reason_name(reason: RetireReason) -> &'static str {
    match reason {
        RetireReason::Cancelled => "cancelled",
        RetireReason::Exhausted => "exhausted",
        RetireReason::Faulted => "faulted",
    }
}

impl<W: Write> TraceSink for PrettyPrintSink<W> {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        let _ = writeln!(
            self.writer,
            "[pass] #{} dt={:.3}ms clock={:.3}s active={}",
            e.pass_index,
            secs_to_ms(e.dt_secs),
            e.clock_secs,
            e.active,
        );
    }

    fn on_timer_fired(&mut self, e: &TimerFiredEvent) {
        if self.summary_only {
            return;
        }
        let remaining = if e.remaining == 0 {
            "-".to_owned()
        } else {
            e.remaining.to_string()
        };
        let _ = writeln!(
            self.writer,
            "[fire] pass={} timer={} remaining={remaining} carry={:.3}ms",
            e.pass_index,
            e.handle,
            secs_to_ms(e.residual_secs),
        );
    }

    fn on_timer_fault(&mut self, e: &TimerFaultEvent) {
        let kind = if e.panicked { "panic" } else { "error" };
        let _ = writeln!(
            self.writer,
            "[FAULT] pass={} timer={} {kind} policy={:?}",
            e.pass_index, e.handle, e.policy,
        );
    }

    fn on_timer_retired(&mut self, e: &TimerRetiredEvent) {
        if self.summary_only {
            return;
        }
        let _ = writeln!(
            self.writer,
            "[retire] pass={} timer={} {}",
            e.pass_index,
            e.handle,
            reason_name(e.reason),
        );
    }

    fn on_pass_summary(&mut self, s: &PassSummary) {
        let _ = writeln!(
            self.writer,
            "[summary] #{} fired={} faulted={} retired={} promoted={} active={} pooled={}",
            s.pass_index, s.fired, s.faulted, s.retired, s.promoted, s.active, s.pooled,
        );
    }
}

#[cfg(test)]
mod tests {
    use metronome_core::handle::TimerHandle;

    use super::*;

    fn fired() -> TimerFiredEvent {
        TimerFiredEvent {
            pass_index: 2,
            handle: TimerHandle::from_raw(5, 1),
            remaining: 0,
            residual_secs: 0.004,
        }
    }

    #[test]
    fn pretty_print_fire() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new());
        sink.on_timer_fired(&fired());
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert!(output.starts_with("[fire]"), "got: {output}");
        assert!(output.contains("timer=#5@1"), "got: {output}");
        assert!(output.contains("remaining=-"), "got: {output}");
    }

    #[test]
    fn summary_only_drops_timer_lines() {
        let mut sink = PrettyPrintSink::with_writer(Vec::<u8>::new()).summary_only(true);
        sink.on_timer_fired(&fired());
        sink.on_pass_summary(&PassSummary {
            pass_index: 2,
            fired: 1,
            ..PassSummary::default()
        });
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 1, "got: {output}");
        assert!(output.contains("fired=1"), "got: {output}");
    }
}
