// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Timer entry identity.

use core::fmt;

/// A handle to a timer entry record in a [`Scheduler`](crate::scheduler::Scheduler).
///
/// Contains both a slot index and a generation counter so that stale handles
/// can be detected after an entry is retired to the pool and the slot is
/// reused for an unrelated registration.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle {
    /// Slot index into the entry store's arrays.
    pub(crate) idx: u32,
    /// Generation counter; must match the store's generation for this slot.
    pub(crate) generation: u32,
}

impl TimerHandle {
    /// Rebuilds a handle from its raw parts, e.g. when decoding a recording.
    ///
    /// A handle built this way only validates against a scheduler whose slot
    /// `index` currently has the same `generation`.
    #[inline]
    #[must_use]
    pub const fn from_raw(index: u32, generation: u32) -> Self {
        Self {
            idx: index,
            generation,
        }
    }

    /// Returns the raw slot index (for diagnostics only).
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.idx
    }

    /// Returns the generation counter.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimerHandle({}@gen{})", self.idx, self.generation)
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}@{}", self.idx, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;

    use super::*;

    #[test]
    fn debug_and_display_formats() {
        let h = TimerHandle {
            idx: 3,
            generation: 7,
        };
        assert_eq!(format!("{h:?}"), "TimerHandle(3@gen7)");
        assert_eq!(format!("{h}"), "#3@7");
        assert_eq!(h.index(), 3);
        assert_eq!(h.generation(), 7);
    }
}
