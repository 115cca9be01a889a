// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-driven timer scheduling with deferred registry mutation.
//!
//! The [`Scheduler`] keeps a registry of keyed, possibly repeating callbacks
//! and advances them once per host frame. See the [`Scheduler`] struct docs
//! for the pass algorithm and the reentrancy rules.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;
use core::fmt;
use core::mem;

use tracing::{debug, trace, warn};

use crate::callback::{self, CallbackError, CallbackOutcome};
use crate::config::{FaultPolicy, SchedulerConfig};
use crate::entry::{EntryStore, Payload, SlotState};
use crate::error::SchedulerError;
use crate::handle::TimerHandle;
use crate::trace::{
    PassBeginEvent, PassSummary, RetireReason, TimerFaultEvent, TimerFiredEvent,
    TimerRetiredEvent, Tracer,
};

/// Where a live entry currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TimerState {
    /// Registered; joins the active registry at the next pass boundary.
    Pending,
    /// In the active registry and eligible to fire.
    Active,
    /// In the active registry but marked deleted; it will not fire again and
    /// is pooled at an upcoming pass boundary.
    Retiring(RetireReason),
}

/// Snapshot of a live entry's timing state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimerInfo {
    /// Period between firings, in seconds.
    pub interval_secs: f32,
    /// Remaining firings (`0` = unbounded, or exhausted if retiring).
    pub repeat_remaining: u32,
    /// Time accumulated toward the next firing, in seconds.
    pub elapsed_secs: f32,
    /// Lifecycle position.
    pub state: TimerState,
}

/// Counters for one advance pass.
pub type PassStats = PassSummary;

/// A fault that stops a pass before it reaches its closing boundary.
enum Abort {
    Error(SchedulerError),
    #[cfg(feature = "std")]
    Panic(alloc::boxed::Box<dyn core::any::Any + Send>),
}

/// Clears the in-pass flag when dropped, so a callback unwinding out of
/// `advance` does not leave the scheduler locked.
struct PassGuard(Rc<Cell<bool>>);

impl PassGuard {
    fn enter(flag: &Rc<Cell<bool>>) -> Self {
        flag.set(true);
        Self(Rc::clone(flag))
    }
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// A failed invocation.
enum Fault {
    Error(CallbackError),
    #[cfg(feature = "std")]
    Panic(alloc::boxed::Box<dyn core::any::Any + Send>),
}

/// Registry of frame-driven timers keyed by `K`, each carrying a parameter
/// of type `P`.
///
/// # Registries
///
/// Entries live in one of two keyed registries. *Pending* holds everything
/// registered since the last pass boundary; *active* is what a pass visits.
/// A key has at most one entry across both. Entries only join or leave the
/// active registry at pass boundaries, so callbacks can freely
/// [`schedule`](Self::schedule) and [`cancel`](Self::cancel) timers
/// (including their own) while a pass iterates.
///
/// # Advance pass
///
/// [`advance`](Self::advance) runs once per host frame:
///
/// 1. Pending entries are promoted into the active registry.
/// 2. Each active entry is visited once. Deleted entries are queued for
///    removal; the rest accumulate `dt` and, when their interval is reached,
///    fire exactly once. The leftover time is carried into the next interval
///    unless it exceeds the drift ceiling, in which case it is dropped.
/// 3. Queued entries that are still deleted are detached and pooled.
/// 4. Entries registered during the pass are promoted.
///
/// Bounded timers are marked deleted before their final invocation, so a
/// callback observing [`last_fired_remaining`](Self::last_fired_remaining)
/// of `0` knows it is running for the last time.
///
/// # Threading
///
/// Callbacks are stored as non-`Send` boxed closures, which confines a
/// scheduler to the thread that owns it.
///
/// # Usage
///
/// ```rust
/// use metronome_core::config::SchedulerConfig;
/// use metronome_core::scheduler::Scheduler;
///
/// let mut scheduler = Scheduler::new(SchedulerConfig::default());
/// scheduler.schedule("blink", 0.5, 0, 0_u32, |_, _, count: &mut u32| *count += 1);
///
/// for _ in 0..4 {
///     scheduler.advance(0.25).unwrap();
/// }
/// assert!(scheduler.is_scheduled("blink"));
/// ```
pub struct Scheduler<K, P = ()> {
    config: SchedulerConfig,
    entries: EntryStore<K, P>,
    active: BTreeMap<K, u32>,
    pending_added: BTreeMap<K, u32>,
    pending_removed: Vec<TimerHandle>,
    /// Reused snapshot of the active registry for the pass in progress.
    visit: Vec<u32>,
    /// Shared with the [`PassGuard`] of the pass in progress.
    in_pass: Rc<Cell<bool>>,
    pass_index: u64,
    clock_secs: f64,
    last_fired_remaining: u32,
}

impl<K, P> fmt::Debug for Scheduler<K, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .field("active", &self.active.len())
            .field("pending", &self.pending_added.len())
            .field("pooled", &self.entries.pooled())
            .field("pass_index", &self.pass_index)
            .field("in_pass", &self.in_pass.get())
            .finish_non_exhaustive()
    }
}

impl<K: Ord + Clone, P> Default for Scheduler<K, P> {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl<K: Ord + Clone, P> Scheduler<K, P> {
    /// Creates an empty scheduler with the given configuration.
    #[must_use]
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            entries: EntryStore::with_capacity(config.initial_capacity),
            active: BTreeMap::new(),
            pending_added: BTreeMap::new(),
            pending_removed: Vec::with_capacity(config.initial_capacity),
            visit: Vec::with_capacity(config.initial_capacity),
            in_pass: Rc::new(Cell::new(false)),
            pass_index: 0,
            clock_secs: 0.0,
            last_fired_remaining: 0,
            config,
        }
    }

    // -- Registration API --

    /// Registers a timer, or updates the one already registered under `key`.
    ///
    /// `repeat` is the number of firings before the timer retires itself;
    /// `0` repeats forever. An `interval_secs` of zero or less fires on every
    /// pass.
    ///
    /// If `key` is already active, its interval, repeat count, parameter and
    /// callback are replaced in place, its elapsed time restarts from zero and
    /// any pending cancellation is lifted. If `key` is still pending, the
    /// pending entry is updated in place. Otherwise a record is taken from the
    /// pool and registered as pending.
    pub fn schedule<F, R>(
        &mut self,
        key: K,
        interval_secs: f32,
        repeat: u32,
        param: P,
        callback: F,
    ) -> TimerHandle
    where
        F: FnMut(&mut Self, &K, &mut P) -> R + 'static,
        R: CallbackOutcome,
    {
        if interval_secs.is_nan() || interval_secs <= 0.0 {
            debug!(interval_secs, "degenerate interval, timer fires every pass");
        }
        let payload = Payload {
            callback: callback::boxed(callback),
            param,
        };

        if let Some(&idx) = self.active.get(&key) {
            let i = idx as usize;
            self.entries.interval[i] = interval_secs;
            self.entries.repeat[i] = repeat;
            self.entries.elapsed[i] = 0.0;
            self.entries.tombstone[i] = None;
            self.entries.payload[i] = Some(payload);
            return self.entries.handle(idx);
        }

        if let Some(&idx) = self.pending_added.get(&key) {
            let i = idx as usize;
            self.entries.interval[i] = interval_secs;
            self.entries.repeat[i] = repeat;
            self.entries.payload[i] = Some(payload);
            return self.entries.handle(idx);
        }

        let handle = self
            .entries
            .allocate(key.clone(), interval_secs, repeat, payload);
        self.pending_added.insert(key, handle.idx);
        handle
    }

    /// Registers a one-shot timer that fires on the next pass.
    pub fn schedule_once<F, R>(&mut self, key: K, param: P, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Self, &K, &mut P) -> R + 'static,
        R: CallbackOutcome,
    {
        let interval = self.config.min_interval_secs;
        self.schedule(key, interval, 1, param, callback)
    }

    /// Registers a timer that fires on every pass until cancelled.
    pub fn schedule_every_tick<F, R>(&mut self, key: K, param: P, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Self, &K, &mut P) -> R + 'static,
        R: CallbackOutcome,
    {
        let interval = self.config.min_interval_secs;
        self.schedule(key, interval, 0, param, callback)
    }

    /// Changes the timing of the entry behind `handle`, keeping its callback
    /// and parameter.
    ///
    /// Follows the same rules as [`schedule`](Self::schedule): an active
    /// entry restarts its interval and is revived if cancelled. Returns
    /// `false` (and logs a warning) if the handle is stale.
    pub fn reschedule(&mut self, handle: TimerHandle, interval_secs: f32, repeat: u32) -> bool {
        if !self.entries.is_live(handle) {
            warn!(%handle, "reschedule ignored: stale timer handle");
            return false;
        }
        let i = handle.idx as usize;
        self.entries.interval[i] = interval_secs;
        self.entries.repeat[i] = repeat;
        if self.entries.state[i] == SlotState::Active {
            self.entries.elapsed[i] = 0.0;
            self.entries.tombstone[i] = None;
        }
        true
    }

    /// Cancels the timer registered under `key`.
    ///
    /// A pending entry is returned to the pool immediately and never fires.
    /// An active entry is marked deleted: it will not fire again and is
    /// pooled at an upcoming pass boundary. Returns whether a scheduled timer
    /// was cancelled.
    pub fn cancel<Q>(&mut self, key: &Q) -> bool
    where
        K: core::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if let Some(idx) = self.pending_added.remove(key) {
            self.entries.release(idx);
            return true;
        }
        match self.active.get(key) {
            Some(&idx) => self.mark_deleted(idx, RetireReason::Cancelled),
            None => false,
        }
    }

    /// Cancels the entry behind `handle`.
    ///
    /// Same semantics as [`cancel`](Self::cancel). A stale handle is a no-op
    /// that logs a warning.
    pub fn cancel_handle(&mut self, handle: TimerHandle) -> bool {
        if !self.entries.is_live(handle) {
            warn!(%handle, "cancel ignored: stale timer handle");
            return false;
        }
        let idx = handle.idx;
        match self.entries.state[idx as usize] {
            SlotState::Pending => {
                if let Some(key) = self.entries.key[idx as usize].as_ref() {
                    self.pending_added.remove(key);
                }
                self.entries.release(idx);
                true
            }
            SlotState::Active => self.mark_deleted(idx, RetireReason::Cancelled),
            SlotState::Pooled => false,
        }
    }

    /// Returns whether a timer is registered under `key` and not cancelled.
    ///
    /// Reflects cancellations immediately, before the entry is physically
    /// detached.
    #[must_use]
    pub fn is_scheduled<Q>(&self, key: &Q) -> bool
    where
        K: core::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.pending_added.contains_key(key)
            || self
                .active
                .get(key)
                .is_some_and(|&idx| self.entries.tombstone[idx as usize].is_none())
    }

    /// Returns the handle of the timer scheduled under `key`, if any.
    #[must_use]
    pub fn handle_of<Q>(&self, key: &Q) -> Option<TimerHandle>
    where
        K: core::borrow::Borrow<Q>,
        Q: Ord + ?Sized,
    {
        if let Some(&idx) = self.pending_added.get(key) {
            return Some(self.entries.handle(idx));
        }
        self.active
            .get(key)
            .filter(|&&idx| self.entries.tombstone[idx as usize].is_none())
            .map(|&idx| self.entries.handle(idx))
    }

    /// Returns the timing state of the entry behind `handle`, or `None` if the
    /// handle is stale.
    #[must_use]
    pub fn timer_info(&self, handle: TimerHandle) -> Option<TimerInfo> {
        if !self.entries.is_live(handle) {
            return None;
        }
        let i = handle.idx as usize;
        let state = match (self.entries.state[i], self.entries.tombstone[i]) {
            (SlotState::Pending, _) => TimerState::Pending,
            (_, Some(reason)) => TimerState::Retiring(reason),
            _ => TimerState::Active,
        };
        Some(TimerInfo {
            interval_secs: self.entries.interval[i],
            repeat_remaining: self.entries.repeat[i],
            elapsed_secs: self.entries.elapsed[i],
            state,
        })
    }

    // -- Advance --

    /// Advances all timers by `dt_secs` of wall-clock time.
    ///
    /// Must be called once per host frame, never from inside a callback.
    ///
    /// # Errors
    ///
    /// - [`SchedulerError::Reentrant`] if a pass is already running; nothing
    ///   is changed.
    /// - [`SchedulerError::Callback`] if a callback faults under
    ///   [`FaultPolicy::Propagate`]. Entries not yet visited are skipped for
    ///   this pass; queued removals and registrations are settled by the next
    ///   completed pass.
    ///
    /// # Panics
    ///
    /// With the `std` feature and [`FaultPolicy::Propagate`], a panicking
    /// callback is resumed after the scheduler leaves the pass.
    pub fn advance(&mut self, dt_secs: f32) -> Result<PassStats, SchedulerError> {
        self.advance_traced(dt_secs, &mut Tracer::none())
    }

    /// Like [`advance`](Self::advance), reporting pass events to `tracer`.
    ///
    /// # Errors
    ///
    /// See [`advance`](Self::advance).
    pub fn advance_traced(
        &mut self,
        dt_secs: f32,
        tracer: &mut Tracer<'_>,
    ) -> Result<PassStats, SchedulerError> {
        if self.in_pass.get() {
            return Err(SchedulerError::Reentrant {
                pass_index: self.pass_index,
            });
        }
        let guard = PassGuard::enter(&self.in_pass);
        self.pass_index += 1;
        self.clock_secs += f64::from(dt_secs);

        let mut stats = PassStats {
            pass_index: self.pass_index,
            dt_secs,
            clock_secs: self.clock_secs,
            ..PassStats::default()
        };
        stats.promoted += self.promote_pending();

        tracer.pass_begin(&PassBeginEvent {
            pass_index: self.pass_index,
            dt_secs,
            clock_secs: self.clock_secs,
            active: self.active.len(),
        });

        let policy = self.config.effective_fault_policy();
        let mut visit = mem::take(&mut self.visit);
        visit.clear();
        visit.extend(self.active.values().copied());

        let mut aborted = None;
        for &idx in &visit {
            if let Err(abort) = self.visit_entry(idx, dt_secs, policy, tracer, &mut stats) {
                aborted = Some(abort);
                break;
            }
        }
        self.visit = visit;

        if let Some(abort) = aborted {
            drop(guard);
            match abort {
                Abort::Error(err) => return Err(err),
                #[cfg(feature = "std")]
                Abort::Panic(payload) => std::panic::resume_unwind(payload),
            }
        }

        stats.retired += self.drain_removed(tracer);
        stats.promoted += self.promote_pending();
        drop(guard);

        stats.active = self.active.len();
        stats.pooled = self.entries.pooled();
        trace!(
            pass = stats.pass_index,
            fired = stats.fired,
            retired = stats.retired,
            promoted = stats.promoted,
            "pass complete"
        );
        tracer.pass_summary(&stats);
        Ok(stats)
    }

    /// Visits one active entry: queues it if deleted, otherwise accumulates
    /// time and fires it when due.
    fn visit_entry(
        &mut self,
        idx: u32,
        dt_secs: f32,
        policy: FaultPolicy,
        tracer: &mut Tracer<'_>,
        stats: &mut PassStats,
    ) -> Result<(), Abort> {
        let i = idx as usize;
        debug_assert_eq!(
            self.entries.state[i],
            SlotState::Active,
            "pass snapshot holds a non-active slot"
        );
        let handle = self.entries.handle(idx);

        if self.entries.tombstone[i].is_some() {
            self.pending_removed.push(handle);
            return Ok(());
        }

        // The callback was dropped while unwinding out of an earlier pass.
        if self.entries.payload[i].is_none() {
            warn!(%handle, pass = self.pass_index, "timer lost its callback to an unwind; cancelling");
            self.entries.tombstone[i] = Some(RetireReason::Faulted);
            self.pending_removed.push(handle);
            return Ok(());
        }

        let elapsed = self.entries.elapsed[i] + dt_secs;
        let interval = self.entries.interval[i];
        if elapsed < interval {
            self.entries.elapsed[i] = elapsed;
            return Ok(());
        }

        // One firing per pass; residuals past the ceiling (or NaN) are dropped.
        let residual = elapsed - interval;
        self.entries.elapsed[i] = if (0.0..=self.config.drift_ceiling_secs).contains(&residual) {
            residual
        } else {
            0.0
        };

        let mut remaining = self.entries.repeat[i];
        if remaining > 0 {
            remaining -= 1;
            self.entries.repeat[i] = remaining;
            if remaining == 0 {
                self.entries.tombstone[i] = Some(RetireReason::Exhausted);
                self.pending_removed.push(handle);
            }
        }
        self.last_fired_remaining = remaining;
        stats.fired += 1;
        tracer.timer_fired(&TimerFiredEvent {
            pass_index: self.pass_index,
            handle,
            remaining,
            residual_secs: self.entries.elapsed[i],
        });

        // The key stays in the slot so the entry can still be detached if
        // the callback unwinds.
        let (Some(key), Some(mut payload)) =
            (self.entries.key[i].clone(), self.entries.payload[i].take())
        else {
            return Ok(());
        };
        let result = self.invoke(&mut payload, &key);

        // Put the payload back unless the callback replaced it.
        if self.entries.payload[i].is_none() {
            self.entries.payload[i] = Some(payload);
        }

        match result {
            Ok(()) => Ok(()),
            Err(fault) => self.handle_fault(handle, fault, policy, tracer, stats),
        }
    }

    #[cfg(feature = "std")]
    fn invoke(&mut self, payload: &mut Payload<K, P>, key: &K) -> Result<(), Fault> {
        let Payload { callback, param } = payload;
        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            callback(self, key, param)
        })) {
            Ok(result) => result.map_err(Fault::Error),
            Err(panic) => Err(Fault::Panic(panic)),
        }
    }

    #[cfg(not(feature = "std"))]
    fn invoke(&mut self, payload: &mut Payload<K, P>, key: &K) -> Result<(), Fault> {
        let Payload { callback, param } = payload;
        callback(self, key, param).map_err(Fault::Error)
    }

    fn handle_fault(
        &mut self,
        handle: TimerHandle,
        fault: Fault,
        policy: FaultPolicy,
        tracer: &mut Tracer<'_>,
        stats: &mut PassStats,
    ) -> Result<(), Abort> {
        stats.faulted += 1;
        let panicked = match &fault {
            Fault::Error(_) => false,
            #[cfg(feature = "std")]
            Fault::Panic(_) => true,
        };
        tracer.timer_fault(&TimerFaultEvent {
            pass_index: self.pass_index,
            handle,
            policy,
            panicked,
        });

        match policy {
            FaultPolicy::Contain => {
                match &fault {
                    Fault::Error(err) => {
                        warn!(%handle, pass = self.pass_index, error = %err, "timer callback failed; cancelling");
                    }
                    #[cfg(feature = "std")]
                    Fault::Panic(panic) => {
                        warn!(%handle, pass = self.pass_index, panic = panic_message(panic.as_ref()), "timer callback panicked; cancelling");
                    }
                }
                // Exhausted entries are already queued; keep that reason.
                let tombstone = &mut self.entries.tombstone[handle.idx as usize];
                if tombstone.is_none() {
                    *tombstone = Some(RetireReason::Faulted);
                }
                Ok(())
            }
            FaultPolicy::Propagate => match fault {
                Fault::Error(source) => Err(Abort::Error(SchedulerError::Callback {
                    handle,
                    pass_index: self.pass_index,
                    source,
                })),
                #[cfg(feature = "std")]
                Fault::Panic(panic) => Err(Abort::Panic(panic)),
            },
        }
    }

    /// Detaches queued entries that are still deleted and pools them.
    fn drain_removed(&mut self, tracer: &mut Tracer<'_>) -> u32 {
        let mut retired = 0;
        let mut removed = mem::take(&mut self.pending_removed);
        for handle in removed.drain(..) {
            // Duplicates from an aborted pass, or entries revived by a
            // re-registration, are skipped.
            if !self.entries.is_live(handle)
                || self.entries.state[handle.idx as usize] != SlotState::Active
            {
                continue;
            }
            let Some(reason) = self.entries.tombstone[handle.idx as usize] else {
                continue;
            };
            if let Some(key) = self.entries.key[handle.idx as usize].as_ref() {
                self.active.remove(key);
            }
            self.entries.release(handle.idx);
            retired += 1;
            tracer.timer_retired(&TimerRetiredEvent {
                pass_index: self.pass_index,
                handle,
                reason,
            });
        }
        self.pending_removed = removed;
        retired
    }

    /// Moves every pending entry into the active registry.
    fn promote_pending(&mut self) -> u32 {
        let mut promoted = 0;
        for &idx in self.pending_added.values() {
            self.entries.state[idx as usize] = SlotState::Active;
            promoted += 1;
        }
        debug_assert!(
            self.pending_added
                .keys()
                .all(|key| !self.active.contains_key(key)),
            "key registered in both pending and active registries"
        );
        self.active.append(&mut self.pending_added);
        promoted
    }

    /// Marks an active entry deleted. Returns `false` if it already was.
    fn mark_deleted(&mut self, idx: u32, reason: RetireReason) -> bool {
        let tombstone = &mut self.entries.tombstone[idx as usize];
        if tombstone.is_some() {
            return false;
        }
        *tombstone = Some(reason);
        true
    }

    // -- Lifecycle --

    /// Retires every entry into the pool and drops all callbacks and
    /// parameters. Returns how many entries were retired.
    ///
    /// Pooled records are kept, so the scheduler can be reused afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Reentrant`] when called from inside a
    /// callback.
    pub fn shutdown(&mut self) -> Result<usize, SchedulerError> {
        if self.in_pass.get() {
            return Err(SchedulerError::Reentrant {
                pass_index: self.pass_index,
            });
        }
        let mut retired = 0;
        for (_, idx) in mem::take(&mut self.pending_added) {
            self.entries.release(idx);
            retired += 1;
        }
        for (_, idx) in mem::take(&mut self.active) {
            self.entries.release(idx);
            retired += 1;
        }
        self.pending_removed.clear();
        self.last_fired_remaining = 0;
        debug!(retired, pooled = self.entries.pooled(), "scheduler shut down");
        Ok(retired)
    }

    // -- Introspection --

    /// Remaining repeat count of the entry that fired most recently.
    ///
    /// Inside a callback this is the callback's own remaining count: `0`
    /// means either an unbounded timer or the final firing of a bounded one.
    #[must_use]
    pub fn last_fired_remaining(&self) -> u32 {
        self.last_fired_remaining
    }

    /// Entries in the active registry, including ones awaiting removal.
    #[must_use]
    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    /// Entries waiting for the next pass boundary.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending_added.len()
    }

    /// Retired records available for reuse.
    #[must_use]
    pub fn pooled_len(&self) -> usize {
        self.entries.pooled()
    }

    /// Number of passes started so far.
    #[must_use]
    pub fn pass_index(&self) -> u64 {
        self.pass_index
    }

    /// Sum of all deltas passed to [`advance`](Self::advance).
    #[must_use]
    pub fn clock_secs(&self) -> f64 {
        self.clock_secs
    }

    /// Whether a pass is running (i.e. this is called from a callback).
    #[must_use]
    pub fn is_advancing(&self) -> bool {
        self.in_pass.get()
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }
}

#[cfg(feature = "std")]
fn panic_message(panic: &(dyn core::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        *s
    } else if let Some(s) = panic.downcast_ref::<alloc::string::String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::{Cell, RefCell};

    use super::*;

    type Sched = Scheduler<&'static str, u32>;

    fn contain() -> Sched {
        Scheduler::new(SchedulerConfig::new().with_fault_policy(FaultPolicy::Contain))
    }

    fn propagate() -> Sched {
        Scheduler::new(SchedulerConfig::new().with_fault_policy(FaultPolicy::Propagate))
    }

    fn counter() -> Rc<Cell<u32>> {
        Rc::new(Cell::new(0))
    }

    /// Schedules a timer that bumps `hits` each time it fires.
    fn schedule_counting(
        sched: &mut Sched,
        key: &'static str,
        interval: f32,
        repeat: u32,
        hits: &Rc<Cell<u32>>,
    ) -> TimerHandle {
        let hits = Rc::clone(hits);
        sched.schedule(key, interval, repeat, 0, move |_, _, _| {
            hits.set(hits.get() + 1);
        })
    }

    #[test]
    fn bounded_timer_fires_exactly_n_times() {
        let mut sched = contain();
        let hits = counter();
        schedule_counting(&mut sched, "cb", 0.1, 3, &hits);

        let mut fired_on = Vec::new();
        for tick in 1..=3 {
            let before = hits.get();
            sched.advance(0.1).unwrap();
            if hits.get() > before {
                fired_on.push(tick);
            }
        }
        assert_eq!(fired_on, vec![1, 2, 3]);
        assert!(!sched.is_scheduled("cb"), "exhausted timer still scheduled");
        assert_eq!(sched.pooled_len(), 1, "exhausted record should be pooled");
        assert_eq!(sched.active_len(), 0);

        sched.advance(0.1).unwrap();
        assert_eq!(hits.get(), 3, "no firing after exhaustion");
    }

    #[test]
    fn pooled_record_is_reused_without_stale_param() {
        let mut sched = contain();
        let old = sched.schedule("first", 0.5, 1, 111, |_, _, _| {});
        sched.advance(0.5).unwrap();
        assert_eq!(sched.pooled_len(), 1);
        assert!(sched.timer_info(old).is_none(), "old handle must be stale");

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let new = sched.schedule("second", 0.5, 1, 222, move |_, _, param| {
            log.borrow_mut().push(*param);
        });
        assert_eq!(new.index(), old.index(), "record should come from the pool");
        assert_ne!(new.generation(), old.generation());
        assert_eq!(sched.pooled_len(), 0);

        sched.advance(0.5).unwrap();
        assert_eq!(*seen.borrow(), vec![222]);
    }

    #[test]
    fn unbounded_timer_fires_every_tick_until_cancelled() {
        let mut sched = contain();
        let hits = counter();
        let h = Rc::clone(&hits);
        sched.schedule_every_tick("tick", 0, move |_, _, _| h.set(h.get() + 1));

        for _ in 0..5 {
            sched.advance(0.016).unwrap();
        }
        assert_eq!(hits.get(), 5);
        assert!(sched.is_scheduled("tick"));

        assert!(sched.cancel("tick"));
        assert!(!sched.is_scheduled("tick"), "cancel must be visible at once");
        for _ in 0..3 {
            sched.advance(0.016).unwrap();
        }
        assert_eq!(hits.get(), 5, "cancelled timer fired");
        assert_eq!(sched.pooled_len(), 1);
    }

    #[test]
    fn cancelling_a_due_timer_suppresses_the_firing() {
        let mut sched = contain();
        let hits = counter();
        schedule_counting(&mut sched, "late", 0.5, 0, &hits);
        sched.advance(0.25).unwrap();
        sched.cancel("late");
        sched.advance(1.0).unwrap();
        assert_eq!(hits.get(), 0);
    }

    #[test]
    fn rescheduling_resets_due_time() {
        let mut sched = contain();
        let hits = counter();
        schedule_counting(&mut sched, "t", 0.5, 0, &hits);
        sched.advance(0.375).unwrap();
        assert_eq!(hits.get(), 0);

        // Refresh: the 0.375 already accumulated is discarded.
        schedule_counting(&mut sched, "t", 0.5, 0, &hits);
        assert_eq!(sched.active_len(), 1, "refresh must not duplicate");
        sched.advance(0.25).unwrap();
        assert_eq!(hits.get(), 0, "old due time leaked through the refresh");
        sched.advance(0.25).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn pending_registration_updates_in_place() {
        let mut sched = contain();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let a = Rc::clone(&seen);
        let first = sched.schedule("p", 0.5, 1, 1, move |_, _, param| a.borrow_mut().push(*param));
        let b = Rc::clone(&seen);
        let second = sched.schedule("p", 0.25, 1, 2, move |_, _, param| {
            b.borrow_mut().push(*param * 10);
        });
        assert_eq!(first, second);
        assert_eq!(sched.pending_len(), 1);

        sched.advance(0.25).unwrap();
        assert_eq!(*seen.borrow(), vec![20], "latest registration should win");
    }

    #[test]
    fn self_cancel_stops_further_firings() {
        let mut sched = contain();
        let a_hits = counter();
        let b_hits = counter();

        let a = Rc::clone(&a_hits);
        sched.schedule_every_tick("a", 0, move |s: &mut Sched, key, _| {
            a.set(a.get() + 1);
            assert!(s.cancel(key));
        });
        let b = Rc::clone(&b_hits);
        sched.schedule_every_tick("b", 0, move |_, _, _| b.set(b.get() + 1));

        sched.advance(0.016).unwrap();
        assert_eq!(a_hits.get(), 1);
        assert_eq!(b_hits.get(), 1, "later entries in the pass are unaffected");
        assert!(!sched.is_scheduled("a"));

        sched.advance(0.016).unwrap();
        assert_eq!(a_hits.get(), 1, "self-cancelled timer fired again");
        assert_eq!(b_hits.get(), 2);
        assert_eq!(sched.pooled_len(), 1, "self-cancelled record should be pooled");
        assert_eq!(sched.active_len(), 1);
    }

    #[test]
    fn cancelling_a_later_entry_mid_pass_prevents_its_firing() {
        let mut sched = contain();
        let b_hits = counter();
        sched.schedule_every_tick("a", 0, |s: &mut Sched, _, _| {
            s.cancel("b");
        });
        schedule_counting(&mut sched, "b", 0.0001, 0, &b_hits);

        sched.advance(0.016).unwrap();
        assert_eq!(b_hits.get(), 0, "entry fired after being cancelled");
    }

    #[test]
    fn timer_registered_in_callback_waits_for_next_pass() {
        let mut sched = contain();
        let child_hits = counter();
        let c = Rc::clone(&child_hits);
        sched.schedule_once("parent", 0, move |s: &mut Sched, _, _| {
            let c = Rc::clone(&c);
            s.schedule_once("child", 0, move |_, _, _| c.set(c.get() + 1));
            assert!(s.is_scheduled("child"));
            assert_eq!(s.active_len(), 1, "registration leaked into the active set");
        });

        let stats = sched.advance(0.016).unwrap();
        assert_eq!(child_hits.get(), 0, "child fired in the pass that created it");
        assert_eq!(stats.fired, 1);
        assert!(sched.is_scheduled("child"));
        assert_eq!(sched.pending_len(), 0, "child should be promoted at pass end");

        sched.advance(0.016).unwrap();
        assert_eq!(child_hits.get(), 1);
    }

    #[test]
    fn large_delta_fires_once_and_drops_residual() {
        let mut sched = contain();
        let hits = counter();
        let handle = schedule_counting(&mut sched, "spike", 0.1, 0, &hits);
        sched.advance(0.5).unwrap();
        assert_eq!(hits.get(), 1, "catch-up burst after a spike");
        assert_eq!(sched.timer_info(handle).unwrap().elapsed_secs, 0.0);

        let mut sched = contain();
        let hits = counter();
        let handle = schedule_counting(&mut sched, "cb", 0.05, 0, &hits);
        sched.advance(0.2).unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(sched.timer_info(handle).unwrap().elapsed_secs, 0.0);
    }

    #[test]
    fn small_residual_is_carried() {
        let mut sched = contain();
        let hits = counter();
        let handle = schedule_counting(&mut sched, "t", 0.5, 0, &hits);
        sched.advance(0.515_625).unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(sched.timer_info(handle).unwrap().elapsed_secs, 0.015_625);
    }

    #[test]
    fn zero_interval_fires_every_pass() {
        let mut sched = contain();
        let hits = counter();
        schedule_counting(&mut sched, "z", 0.0, 0, &hits);
        for _ in 0..4 {
            sched.advance(0.0).unwrap();
        }
        assert_eq!(hits.get(), 4);
    }

    #[test]
    fn remaining_count_is_observable_from_callback() {
        let mut sched = contain();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        sched.schedule("r", 0.25, 3, 0, move |s: &mut Sched, _, _| {
            log.borrow_mut().push(s.last_fired_remaining());
        });
        for _ in 0..4 {
            sched.advance(0.25).unwrap();
        }
        assert_eq!(*seen.borrow(), vec![2, 1, 0]);
    }

    #[test]
    fn callback_can_replace_itself() {
        let mut sched = contain();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        sched.schedule_every_tick("swap", 1, move |s: &mut Sched, key, param| {
            log.borrow_mut().push(*param);
            let log = Rc::clone(&log);
            s.schedule_every_tick(*key, *param + 1, move |_, _, p| log.borrow_mut().push(*p * 100));
        });

        sched.advance(0.016).unwrap();
        sched.advance(0.016).unwrap();
        sched.advance(0.016).unwrap();
        assert_eq!(*seen.borrow(), vec![1, 200, 200]);
        assert_eq!(sched.active_len(), 1);
    }

    #[test]
    fn exhausted_timer_can_rearm_itself() {
        let mut sched = contain();
        let hits = counter();
        let h = Rc::clone(&hits);
        let handle = sched.schedule("again", 0.25, 1, 0, move |s: &mut Sched, _, _| {
            h.set(h.get() + 1);
            if h.get() < 3 {
                let me = s.handle_of("again");
                assert!(me.is_none(), "final firing should already be deleted");
            }
        });
        sched.advance(0.25).unwrap();
        assert_eq!(hits.get(), 1);
        assert!(sched.timer_info(handle).is_none());

        // Re-arming from inside the final firing keeps the same record alive.
        let mut sched = contain();
        let hits = counter();
        let h = Rc::clone(&hits);
        let handle = sched.schedule("loop", 0.25, 1, 0, move |s: &mut Sched, key, _| {
            h.set(h.get() + 1);
            let h = Rc::clone(&h);
            s.schedule(*key, 0.25, 1, 0, move |_, _, _| h.set(h.get() + 1));
        });
        sched.advance(0.25).unwrap();
        assert!(sched.is_scheduled("loop"), "re-armed timer was retired");
        assert_eq!(sched.handle_of("loop"), Some(handle));
        sched.advance(0.25).unwrap();
        assert_eq!(hits.get(), 2);
        assert!(!sched.is_scheduled("loop"));
    }

    #[test]
    fn cancelling_pending_entry_pools_it_immediately() {
        let mut sched = contain();
        let hits = counter();
        let handle = schedule_counting(&mut sched, "never", 0.1, 0, &hits);
        assert!(sched.cancel("never"));
        assert_eq!(sched.pooled_len(), 1);
        assert!(sched.timer_info(handle).is_none());
        sched.advance(1.0).unwrap();
        assert_eq!(hits.get(), 0);
        assert!(!sched.cancel("never"), "second cancel should be a no-op");
    }

    #[test]
    fn stale_handles_are_ignored() {
        let mut sched = contain();
        let handle = sched.schedule("gone", 0.1, 0, 0, |_, _, _| {});
        assert!(sched.cancel_handle(handle));
        assert!(!sched.cancel_handle(handle), "stale cancel should be a no-op");
        assert!(!sched.reschedule(handle, 1.0, 1), "stale reschedule should be a no-op");

        let fresh = sched.schedule("other", 0.1, 0, 0, |_, _, _| {});
        assert_eq!(fresh.index(), handle.index());
        assert!(!sched.cancel_handle(handle), "stale handle hit a recycled slot");
        assert!(sched.is_scheduled("other"));
    }

    #[test]
    fn reschedule_by_handle_keeps_callback() {
        let mut sched = contain();
        let hits = counter();
        let handle = schedule_counting(&mut sched, "h", 0.25, 0, &hits);
        sched.advance(0.25).unwrap();
        assert_eq!(hits.get(), 1);

        assert!(sched.cancel_handle(handle));
        assert!(sched.reschedule(handle, 0.5, 2), "reschedule revives a cancelled entry");
        let info = sched.timer_info(handle).unwrap();
        assert_eq!(info.state, TimerState::Active);
        assert_eq!(info.repeat_remaining, 2);

        sched.advance(0.25).unwrap();
        assert_eq!(hits.get(), 1);
        sched.advance(0.25).unwrap();
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn timer_info_reports_lifecycle() {
        let mut sched = contain();
        let handle = sched.schedule("i", 0.5, 0, 0, |_, _, _| {});
        assert_eq!(sched.timer_info(handle).unwrap().state, TimerState::Pending);
        sched.advance(0.25).unwrap();
        let info = sched.timer_info(handle).unwrap();
        assert_eq!(info.state, TimerState::Active);
        assert_eq!(info.elapsed_secs, 0.25);
        sched.cancel("i");
        assert_eq!(
            sched.timer_info(handle).unwrap().state,
            TimerState::Retiring(RetireReason::Cancelled)
        );
    }

    #[test]
    fn contained_fault_cancels_only_the_faulting_entry() {
        let mut sched = contain();
        let b_hits = counter();
        sched.schedule_every_tick("a", 0, |_, _, _| -> Result<(), CallbackError> {
            Err(CallbackError::new("bad state"))
        });
        schedule_counting(&mut sched, "b", 0.0001, 0, &b_hits);

        let stats = sched.advance(0.016).unwrap();
        assert_eq!(stats.faulted, 1);
        assert_eq!(stats.fired, 2);
        assert_eq!(b_hits.get(), 1);
        assert!(!sched.is_scheduled("a"), "faulting timer should be cancelled");

        let stats = sched.advance(0.016).unwrap();
        assert_eq!(stats.faulted, 0);
        assert_eq!(stats.retired, 1);
        assert_eq!(b_hits.get(), 2);
    }

    #[test]
    fn propagated_fault_aborts_the_pass() {
        let mut sched = propagate();
        let b_hits = counter();
        let failures = counter();
        let f = Rc::clone(&failures);
        let a = sched.schedule_every_tick("a", 0, move |_, _, _| {
            if f.get() == 0 {
                f.set(1);
                return Err(CallbackError::new("first run fails"));
            }
            Ok(())
        });
        schedule_counting(&mut sched, "b", 0.0001, 0, &b_hits);

        let err = sched.advance(0.016).unwrap_err();
        assert_eq!(
            err,
            SchedulerError::Callback {
                handle: a,
                pass_index: 1,
                source: CallbackError::new("first run fails"),
            }
        );
        assert_eq!(b_hits.get(), 0, "entries after the fault must not run");
        assert!(!sched.is_advancing());
        assert!(sched.is_scheduled("a"), "propagated fault does not cancel");

        let stats = sched.advance(0.016).unwrap();
        assert_eq!(stats.fired, 2);
        assert_eq!(b_hits.get(), 1);
    }

    #[test]
    fn aborted_pass_removals_are_settled_later() {
        let mut sched = propagate();
        sched.schedule("done", 0.25, 1, 0, |_, _, _| {});
        sched.schedule("fail", 0.25, 0, 0, |_, _, _| -> Result<(), CallbackError> {
            Err("always".into())
        });

        // "done" exhausts and is queued, then "fail" aborts the pass.
        assert!(sched.advance(0.25).is_err());
        assert!(!sched.is_scheduled("done"));
        assert_eq!(sched.active_len(), 2, "removal must wait for a completed pass");

        sched.cancel("fail");
        let stats = sched.advance(0.25).unwrap();
        assert_eq!(stats.retired, 2);
        assert_eq!(sched.active_len(), 0);
        assert_eq!(sched.pooled_len(), 2);
    }

    #[test]
    fn recursive_advance_is_rejected() {
        let mut sched = contain();
        let outcome = Rc::new(RefCell::new(None));
        let o = Rc::clone(&outcome);
        sched.schedule_once("nested", 0, move |s: &mut Sched, _, _| {
            assert!(s.is_advancing());
            *o.borrow_mut() = Some(s.advance(0.1));
            assert_eq!(s.shutdown(), Err(SchedulerError::Reentrant { pass_index: 1 }));
        });
        sched.advance(0.1).unwrap();
        assert_eq!(
            *outcome.borrow(),
            Some(Err(SchedulerError::Reentrant { pass_index: 1 }))
        );
        assert_eq!(sched.pass_index(), 1, "rejected pass must not count");
    }

    #[test]
    fn shutdown_retires_everything() {
        let mut sched = contain();
        sched.schedule("a", 0.5, 0, 0, |_, _, _| {});
        sched.schedule("b", 0.5, 0, 0, |_, _, _| {});
        sched.advance(0.25).unwrap();
        sched.schedule("c", 0.5, 0, 0, |_, _, _| {});

        assert_eq!(sched.shutdown(), Ok(3));
        assert_eq!(sched.active_len(), 0);
        assert_eq!(sched.pending_len(), 0);
        assert_eq!(sched.pooled_len(), 3);
        assert!(!sched.is_scheduled("a"));

        // Still usable, drawing from the pool.
        sched.schedule("d", 0.5, 0, 0, |_, _, _| {});
        assert_eq!(sched.pooled_len(), 2);
    }

    #[test]
    fn pass_stats_and_clock() {
        let mut sched = contain();
        sched.schedule("a", 0.25, 2, 0, |_, _, _| {});
        let stats = sched.advance(0.25).unwrap();
        assert_eq!(stats.pass_index, 1);
        assert_eq!(stats.promoted, 1);
        assert_eq!(stats.fired, 1);
        assert_eq!(stats.retired, 0);
        assert_eq!(stats.active, 1);

        let stats = sched.advance(0.25).unwrap();
        assert_eq!(stats.retired, 1);
        assert_eq!(stats.pooled, 1);
        assert_eq!(sched.clock_secs(), 0.5);
    }

    #[test]
    fn borrowed_key_lookup() {
        let mut sched: Scheduler<alloc::string::String> = Scheduler::default();
        sched.schedule("owned".into(), 0.5, 0, (), |_, _, _| {});
        assert!(sched.is_scheduled("owned"));
        assert!(sched.handle_of("owned").is_some());
        assert!(sched.cancel("owned"));
    }

    #[cfg(feature = "std")]
    #[test]
    fn contained_panic_cancels_entry() {
        let mut sched = contain();
        sched.schedule_every_tick("p", 0, |_, _, _| -> Result<(), CallbackError> {
            panic!("callback blew up")
        });
        let stats = sched.advance(0.016).unwrap();
        assert_eq!(stats.faulted, 1);
        assert!(!sched.is_scheduled("p"));
        assert!(!sched.is_advancing());
    }

    #[cfg(feature = "std")]
    #[test]
    fn propagated_panic_leaves_scheduler_usable() {
        let mut sched = propagate();
        let hits = counter();
        sched.schedule_once("p", 0, |_, _, _| -> Result<(), CallbackError> {
            panic!("callback blew up")
        });
        schedule_counting(&mut sched, "q", 0.0001, 0, &hits);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sched.advance(0.016)
        }));
        assert!(result.is_err(), "panic should propagate");
        assert!(!sched.is_advancing());
        assert_eq!(hits.get(), 0);

        sched.advance(0.016).unwrap();
        assert_eq!(hits.get(), 1);
    }

    #[cfg(not(feature = "std"))]
    #[test]
    fn unwinding_callback_leaves_scheduler_usable() {
        let mut sched = propagate();
        let hits = counter();
        sched.schedule_every_tick("p", 0, |_, _, _| -> Result<(), CallbackError> {
            panic!("callback blew up")
        });
        schedule_counting(&mut sched, "q", 0.0001, 0, &hits);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            sched.advance(0.016)
        }));
        assert!(result.is_err(), "panic should reach the host");
        assert!(!sched.is_advancing(), "pass flag left set after unwind");
        assert_eq!(hits.get(), 0);

        // The entry lost its callback; the next pass retires it and runs the rest.
        let stats = sched.advance(0.016).unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(stats.fired, 1);
        assert_eq!(stats.retired, 1);
        assert!(!sched.is_scheduled("p"));
        assert_eq!(sched.active_len(), 1);
        assert_eq!(sched.pooled_len(), 1);
    }

    #[test]
    fn unpinned_scheduler_follows_global_policy() {
        use crate::config::{GLOBAL_POLICY_TEST_LOCK, set_global_policy};

        let _lock = GLOBAL_POLICY_TEST_LOCK
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut sched: Sched = Scheduler::new(SchedulerConfig::new());
        sched.schedule_every_tick("bad", 0, |_, _, _| -> Result<(), CallbackError> {
            Err("always".into())
        });

        set_global_policy(FaultPolicy::Propagate);
        let propagated = sched.advance(0.016);
        set_global_policy(FaultPolicy::Contain);
        assert!(
            matches!(propagated, Err(SchedulerError::Callback { .. })),
            "got {propagated:?}"
        );
        assert!(sched.is_scheduled("bad"), "propagated fault must not cancel");

        // The flag is read per pass, so the change applies immediately.
        let stats = sched.advance(0.016).unwrap();
        assert_eq!(stats.faulted, 1);
        assert!(!sched.is_scheduled("bad"), "contained fault should cancel");
    }

    #[test]
    fn debug_output_is_compact() {
        let sched = contain();
        let text = alloc::format!("{sched:?}");
        assert!(text.starts_with("Scheduler {"), "{text}");
        assert!(text.contains("pooled: 0"), "{text}");
    }
}
