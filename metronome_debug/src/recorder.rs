// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compact binary event recording and decoding.
//!
//! [`RecorderSink`] implements [`TraceSink`] and encodes events into a
//! `Vec<u8>` as fixed-size little-endian records, each prefixed with a one
//! byte tag. [`decode`] reads them back as an iterator of [`RecordedEvent`].
//!
//! Registry sizes are stored as `u32`, saturating at `u32::MAX`.

use metronome_core::config::FaultPolicy;
use metronome_core::handle::TimerHandle;
use metronome_core::trace::{
    PassBeginEvent, PassSummary, RetireReason, TimerFaultEvent, TimerFiredEvent,
    TimerRetiredEvent, TraceSink,
};

// ---------------------------------------------------------------------------
// Event type discriminants
// ---------------------------------------------------------------------------

const TAG_PASS_BEGIN: u8 = 1;
const TAG_TIMER_FIRED: u8 = 2;
const TAG_TIMER_FAULT: u8 = 3;
const TAG_TIMER_RETIRED: u8 = 4;
const TAG_PASS_SUMMARY: u8 = 5;

// ---------------------------------------------------------------------------
// RecorderSink
// ---------------------------------------------------------------------------

/// A [`TraceSink`] that encodes events into a compact binary buffer.
#[derive(Debug, Default)]
pub struct RecorderSink {
    buf: Vec<u8>,
}

impl RecorderSink {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a view of the recorded bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the recorder and returns the recorded bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    // -- encoding helpers --------------------------------------------------

    fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_len(&mut self, v: usize) {
        self.write_u32(u32::try_from(v).unwrap_or(u32::MAX));
    }

    fn write_handle(&mut self, h: TimerHandle) {
        self.write_u32(h.index());
        self.write_u32(h.generation());
    }

    fn write_policy(&mut self, p: FaultPolicy) {
        self.write_u8(match p {
            FaultPolicy::Contain => 0,
            FaultPolicy::Propagate => 1,
        });
    }

    fn write_reason(&mut self, r: RetireReason) {
        self.write_u8(match r {
            RetireReason::Cancelled => 0,
            RetireReason::Exhausted => 1,
            RetireReason::Faulted => 2,
        });
    }
}

impl TraceSink for RecorderSink {
    fn on_pass_begin(&mut self, e: &PassBeginEvent) {
        self.write_u8(TAG_PASS_BEGIN);
        self.write_u64(e.pass_index);
        self.write_f32(e.dt_secs);
        self.write_f64(e.clock_secs);
        self.write_len(e.active);
    }

    fn on_timer_fired(&mut self, e: &TimerFiredEvent) {
        self.write_u8(TAG_TIMER_FIRED);
        self.write_u64(e.pass_index);
        self.write_handle(e.handle);
        self.write_u32(e.remaining);
        self.write_f32(e.residual_secs);
    }

    fn on_timer_fault(&mut self, e: &TimerFaultEvent) {
        self.write_u8(TAG_TIMER_FAULT);
        self.write_u64(e.pass_index);
        self.write_handle(e.handle);
        self.write_policy(e.policy);
        self.write_u8(u8::from(e.panicked));
    }

    fn on_timer_retired(&mut self, e: &TimerRetiredEvent) {
        self.write_u8(TAG_TIMER_RETIRED);
        self.write_u64(e.pass_index);
        self.write_handle(e.handle);
        self.write_reason(e.reason);
    }

    fn on_pass_summary(&mut self, s: &PassSummary) {
        self.write_u8(TAG_PASS_SUMMARY);
        self.write_u64(s.pass_index);
        self.write_f32(s.dt_secs);
        self.write_f64(s.clock_secs);
        self.write_u32(s.fired);
        self.write_u32(s.faulted);
        self.write_u32(s.retired);
        self.write_u32(s.promoted);
        self.write_len(s.active);
        self.write_len(s.pooled);
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

/// A decoded event from a binary recording.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordedEvent {
    /// A [`PassBeginEvent`].
    PassBegin(PassBeginEvent),
    /// A [`TimerFiredEvent`].
    TimerFired(TimerFiredEvent),
    /// A [`TimerFaultEvent`].
    TimerFault(TimerFaultEvent),
    /// A [`TimerRetiredEvent`].
    TimerRetired(TimerRetiredEvent),
    /// A [`PassSummary`].
    PassSummary(PassSummary),
}

/// Decodes a byte slice produced by [`RecorderSink`] into an iterator of
/// [`RecordedEvent`].
///
/// Iteration stops at the first unknown tag or truncated record.
pub fn decode(bytes: &[u8]) -> DecodeIter<'_> {
    DecodeIter {
        data: bytes,
        pos: 0,
    }
}

/// Iterator over decoded events.
#[derive(Debug)]
pub struct DecodeIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl DecodeIter<'_> {
    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes = self.data.get(self.pos..self.pos + N)?;
        self.pos += N;
        bytes.try_into().ok()
    }

    fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|[v]| v)
    }

    fn read_u32(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    fn read_u64(&mut self) -> Option<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    fn read_f32(&mut self) -> Option<f32> {
        self.read_array().map(f32::from_le_bytes)
    }

    fn read_f64(&mut self) -> Option<f64> {
        self.read_array().map(f64::from_le_bytes)
    }

    fn read_len(&mut self) -> Option<usize> {
        usize::try_from(self.read_u32()?).ok()
    }

    fn read_handle(&mut self) -> Option<TimerHandle> {
        let index = self.read_u32()?;
        let generation = self.read_u32()?;
        Some(TimerHandle::from_raw(index, generation))
    }

    fn read_policy(&mut self) -> Option<FaultPolicy> {
        Some(match self.read_u8()? {
            0 => FaultPolicy::Contain,
            _ => FaultPolicy::Propagate,
        })
    }

    fn read_reason(&mut self) -> Option<RetireReason> {
        Some(match self.read_u8()? {
            0 => RetireReason::Cancelled,
            1 => RetireReason::Exhausted,
            _ => RetireReason::Faulted,
        })
    }

    fn decode_pass_begin(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PassBegin(PassBeginEvent {
            pass_index: self.read_u64()?,
            dt_secs: self.read_f32()?,
            clock_secs: self.read_f64()?,
            active: self.read_len()?,
        }))
    }

    fn decode_timer_fired(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TimerFired(TimerFiredEvent {
            pass_index: self.read_u64()?,
            handle: self.read_handle()?,
            remaining: self.read_u32()?,
            residual_secs: self.read_f32()?,
        }))
    }

    fn decode_timer_fault(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TimerFault(TimerFaultEvent {
            pass_index: self.read_u64()?,
            handle: self.read_handle()?,
            policy: self.read_policy()?,
            panicked: self.read_u8()? != 0,
        }))
    }

    fn decode_timer_retired(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::TimerRetired(TimerRetiredEvent {
            pass_index: self.read_u64()?,
            handle: self.read_handle()?,
            reason: self.read_reason()?,
        }))
    }

    fn decode_pass_summary(&mut self) -> Option<RecordedEvent> {
        Some(RecordedEvent::PassSummary(PassSummary {
            pass_index: self.read_u64()?,
            dt_secs: self.read_f32()?,
            clock_secs: self.read_f64()?,
            fired: self.read_u32()?,
            faulted: self.read_u32()?,
            retired: self.read_u32()?,
            promoted: self.read_u32()?,
            active: self.read_len()?,
            pooled: self.read_len()?,
        }))
    }
}

impl Iterator for DecodeIter<'_> {
    type Item = RecordedEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let tag = self.read_u8()?;
        match tag {
            TAG_PASS_BEGIN => self.decode_pass_begin(),
            TAG_TIMER_FIRED => self.decode_timer_fired(),
            TAG_TIMER_FAULT => self.decode_timer_fault(),
            TAG_TIMER_RETIRED => self.decode_timer_retired(),
            TAG_PASS_SUMMARY => self.decode_pass_summary(),
            _ => None, // unknown tag → stop iteration
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
