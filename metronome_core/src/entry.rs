// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Struct-of-arrays entry storage with a pooled free list.
//!
//! Every timer entry occupies a slot in parallel arrays. Retired entries go
//! back on the free list with their callback, parameter and key dropped, and
//! the slot's generation counter is bumped so outstanding [`TimerHandle`]s
//! stop validating.

use alloc::vec::Vec;

use crate::callback::BoxedCallback;
use crate::handle::TimerHandle;
use crate::trace::RetireReason;

/// Lifecycle position of a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum SlotState {
    /// Registered, waiting for the next pass boundary.
    Pending,
    /// Member of the active registry (possibly tombstoned).
    Active,
    /// On the free list.
    Pooled,
}

/// The callback and its parameter, moved out of the slot while it runs.
pub(crate) struct Payload<K, P> {
    pub(crate) callback: BoxedCallback<K, P>,
    pub(crate) param: P,
}

/// Parallel-array storage for all timer entries.
pub(crate) struct EntryStore<K, P> {
    // -- Identity --
    pub(crate) key: Vec<Option<K>>,

    // -- Timing --
    pub(crate) interval: Vec<f32>,
    pub(crate) repeat: Vec<u32>,
    pub(crate) elapsed: Vec<f32>,

    // -- Lifecycle --
    /// `Some` once the entry is marked deleted.
    pub(crate) tombstone: Vec<Option<RetireReason>>,
    pub(crate) state: Vec<SlotState>,
    pub(crate) payload: Vec<Option<Payload<K, P>>>,

    // -- Allocation --
    pub(crate) generation: Vec<u32>,
    pub(crate) free_list: Vec<u32>,
    pub(crate) len: u32,
}

impl<K, P> EntryStore<K, P> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            key: Vec::with_capacity(capacity),
            interval: Vec::with_capacity(capacity),
            repeat: Vec::with_capacity(capacity),
            elapsed: Vec::with_capacity(capacity),
            tombstone: Vec::with_capacity(capacity),
            state: Vec::with_capacity(capacity),
            payload: Vec::with_capacity(capacity),
            generation: Vec::with_capacity(capacity),
            free_list: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    /// Takes a record from the pool (or grows the arrays) and fills it in as
    /// a pending entry.
    pub(crate) fn allocate(
        &mut self,
        key: K,
        interval: f32,
        repeat: u32,
        payload: Payload<K, P>,
    ) -> TimerHandle {
        let idx = if let Some(idx) = self.free_list.pop() {
            // Reuse a pooled slot.
            let i = idx as usize;
            self.key[i] = Some(key);
            self.interval[i] = interval;
            self.repeat[i] = repeat;
            self.elapsed[i] = 0.0;
            self.tombstone[i] = None;
            self.state[i] = SlotState::Pending;
            self.payload[i] = Some(payload);
            idx
        } else {
            // Allocate a new slot.
            let idx = self.len;
            self.len += 1;
            self.key.push(Some(key));
            self.interval.push(interval);
            self.repeat.push(repeat);
            self.elapsed.push(0.0);
            self.tombstone.push(None);
            self.state.push(SlotState::Pending);
            self.payload.push(Some(payload));
            self.generation.push(0);
            idx
        };

        self.handle(idx)
    }

    /// Returns a slot to the pool, dropping its key, callback and parameter.
    pub(crate) fn release(&mut self, idx: u32) {
        let i = idx as usize;
        debug_assert!(
            self.state[i] != SlotState::Pooled,
            "slot {idx} released twice"
        );
        self.key[i] = None;
        self.payload[i] = None;
        self.tombstone[i] = None;
        self.elapsed[i] = 0.0;
        self.state[i] = SlotState::Pooled;

        // Bump generation so old handles immediately fail validation.
        self.generation[i] = self.generation[i].wrapping_add(1);

        self.free_list.push(idx);
    }

    /// Returns the current handle for a slot.
    #[inline]
    pub(crate) fn handle(&self, idx: u32) -> TimerHandle {
        TimerHandle {
            idx,
            generation: self.generation[idx as usize],
        }
    }

    /// Returns whether the handle refers to a live (pending or active) entry.
    pub(crate) fn is_live(&self, handle: TimerHandle) -> bool {
        handle.idx < self.len
            && self.generation[handle.idx as usize] == handle.generation
            && self.state[handle.idx as usize] != SlotState::Pooled
    }

    /// Number of records sitting on the free list.
    #[inline]
    pub(crate) fn pooled(&self) -> usize {
        self.free_list.len()
    }
}
