// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Frame-driven timer and callback scheduling.
//!
//! `metronome_core` keeps a keyed registry of deferred and repeating
//! callbacks and advances them once per host frame. It is `no_std`
//! compatible (with `alloc`) and stores entries in struct-of-arrays form with
//! generational handles, recycling retired records through a free list.
//!
//! # Architecture
//!
//! ```text
//!   host frame loop
//!       │ dt
//!       ▼
//!   Scheduler::advance()
//!       │
//!       ├── promote pending ──► active registry
//!       │                            │
//!       │                 visit each entry once
//!       │                            │
//!       │              due? ──► callback(&mut Scheduler, &key, &mut param)
//!       │                            │   (may schedule / cancel anything)
//!       │                            ▼
//!       ├── drain removals ──► EntryStore free list
//!       └── promote pending
//! ```
//!
//! **[`scheduler`]**: The [`Scheduler`](scheduler::Scheduler) itself, with
//! the registration API and the advance pass.
//!
//! **[`callback`]**: The callback contract and [`CallbackError`](callback::CallbackError).
//!
//! **[`config`]**: Tunables ([`SchedulerConfig`](config::SchedulerConfig))
//! and the process-wide default [`FaultPolicy`](config::FaultPolicy).
//!
//! **[`handle`]**: Generational [`TimerHandle`](handle::TimerHandle)s.
//!
//! **[`error`]**: Errors returned by `advance`.
//!
//! **[`trace`]**: [`TraceSink`](trace::TraceSink) trait and event types for
//! pass instrumentation, with a zero-overhead [`Tracer`](trace::Tracer)
//! wrapper.
//!
//! # Crate features
//!
//! - `std` (disabled by default): Enables `std` support in dependencies and
//!   catches panicking callbacks so the fault policy applies to them.
//! - `trace` (disabled by default): Enables `Tracer` method bodies (one branch
//!   per call site).

#![no_std]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate alloc;
#[cfg(any(feature = "std", test))]
extern crate std;

pub mod callback;
pub mod config;
mod entry;
pub mod error;
pub mod handle;
pub mod scheduler;
pub mod trace;
