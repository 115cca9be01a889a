// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Errors returned by the advance pass.

use crate::callback::CallbackError;
use crate::handle::TimerHandle;

/// An error that aborted or rejected an advance pass.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// `advance` was called from inside a callback of a pass in progress.
    #[error("advance called re-entrantly during pass {pass_index}")]
    Reentrant {
        /// Index of the pass that was already running.
        pass_index: u64,
    },

    /// A callback faulted under [`FaultPolicy::Propagate`](crate::config::FaultPolicy::Propagate).
    #[error("timer {handle} failed during pass {pass_index}: {source}")]
    Callback {
        /// The entry whose callback faulted.
        handle: TimerHandle,
        /// Index of the aborted pass.
        pass_index: u64,
        /// The fault reported by the callback.
        #[source]
        source: CallbackError,
    },
}
