// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Chrome Trace Event Format exporter.
//!
//! [`export`] reads recorded bytes from a [`RecorderSink`](super::recorder::RecorderSink)
//! and writes [Chrome Trace Event Format][spec] JSON to the given writer.
//!
//! [spec]: https://docs.google.com/document/d/1CvAClvFfyA5R-PhYUmn5OOQtYMH4h6I0nSsKchNAySU

use std::io::{self, Write};

use serde_json::{Value, json};

use crate::recorder::{RecordedEvent, decode};

/// Exports recorded events as Chrome Trace Event Format JSON.
///
/// The output is a complete JSON array of trace event objects, suitable for
/// loading into `chrome://tracing` or [Perfetto](https://ui.perfetto.dev/).
///
/// Timestamps come from the scheduler's accumulated clock, so the timeline
/// shows simulated time rather than wall time. Each pass becomes a complete
/// (`"X"`) slice spanning its delta, which ends at the pass's clock value;
/// timer events are instants inside it, one track per timer slot.
pub fn export(bytes: &[u8], writer: &mut dyn Write) -> io::Result<()> {
    let mut events: Vec<Value> = Vec::new();
    // Timer events carry only the pass index; stamp them with that pass's end.
    let mut pass_end_us = 0.0;

    for recorded in decode(bytes) {
        match recorded {
            RecordedEvent::PassBegin(e) => {
                pass_end_us = secs_to_us(e.clock_secs);
                let dur_us = f64::from(e.dt_secs) * 1e6;
                events.push(json!({
                    "ph": "X",
                    "name": "Pass",
                    "cat": "Scheduler",
                    "ts": pass_end_us - dur_us,
                    "dur": dur_us,
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "pass_index": e.pass_index,
                        "active": e.active,
                    }
                }));
            }
            RecordedEvent::TimerFired(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Fire",
                    "cat": "Timer",
                    "ts": pass_end_us,
                    "pid": 0,
                    "tid": e.handle.index() + 1,
                    "s": "t",
                    "args": {
                        "pass_index": e.pass_index,
                        "handle": e.handle.to_string(),
                        "remaining": e.remaining,
                        "residual_secs": e.residual_secs,
                    }
                }));
            }
            RecordedEvent::TimerFault(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": if e.panicked { "Panic" } else { "Fault" },
                    "cat": "Timer",
                    "ts": pass_end_us,
                    "pid": 0,
                    "tid": e.handle.index() + 1,
                    "s": "p",
                    "args": {
                        "pass_index": e.pass_index,
                        "handle": e.handle.to_string(),
                        "policy": format!("{:?}", e.policy),
                    }
                }));
            }
            RecordedEvent::TimerRetired(e) => {
                events.push(json!({
                    "ph": "i",
                    "name": "Retire",
                    "cat": "Timer",
                    "ts": pass_end_us,
                    "pid": 0,
                    "tid": e.handle.index() + 1,
                    "s": "t",
                    "args": {
                        "pass_index": e.pass_index,
                        "handle": e.handle.to_string(),
                        "reason": format!("{:?}", e.reason),
                    }
                }));
            }
            RecordedEvent::PassSummary(s) => {
                events.push(json!({
                    "ph": "C",
                    "name": "Registry",
                    "cat": "Summary",
                    "ts": secs_to_us(s.clock_secs),
                    "pid": 0,
                    "tid": 0,
                    "args": {
                        "active": s.active,
                        "pooled": s.pooled,
                        "fired": s.fired,
                    }
                }));
            }
        }
    }

    serde_json::to_writer_pretty(writer, &events)?;
    Ok(())
}

fn secs_to_us(secs: f64) -> f64 {
    secs * 1e6
}
