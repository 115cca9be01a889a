// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Recording, pretty-printing, log forwarding, and Chrome trace export for
//! metronome diagnostics.
//!
//! This crate provides [`TraceSink`](metronome_core::trace::TraceSink)
//! implementations for development and post-mortem analysis:
//!
//! - [`pretty::PrettyPrintSink`]: human-readable one-line-per-event output.
//! - [`recorder::RecorderSink`]: compact binary recording with
//!   [`recorder::decode`] for playback.
//! - [`log::LogSink`]: forwards pass events to the `tracing` facade.
//! - [`chrome::export`]: writes Chrome Trace Event Format JSON from recorded
//!   bytes.

pub mod chrome;
pub mod log;
pub mod pretty;
pub mod recorder;
