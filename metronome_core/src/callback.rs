// Copyright 2026 the Metronome Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Callback contract.
//!
//! A timer callback receives the [`Scheduler`] it is registered with, its own
//! key, and a mutable reference to its parameter. Through the scheduler it
//! may register, refresh, or cancel any timer, including itself; those calls
//! only ever touch the pending registry or the tombstone flag, so the pass in
//! progress is never disturbed.
//!
//! Callbacks return anything implementing [`CallbackOutcome`]: plain `()` for
//! infallible work, or `Result<(), CallbackError>` to report a fault that the
//! scheduler handles according to its [`FaultPolicy`](crate::config::FaultPolicy).

use alloc::borrow::Cow;
use alloc::boxed::Box;

use crate::scheduler::Scheduler;

/// A fault reported by a timer callback.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct CallbackError {
    message: Cow<'static, str>,
}

impl CallbackError {
    /// Creates a fault with the given message.
    #[must_use]
    pub fn new(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the fault message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&'static str> for CallbackError {
    fn from(message: &'static str) -> Self {
        Self::new(message)
    }
}

/// Conversion from a callback's return value into a fault report.
pub trait CallbackOutcome {
    /// Returns `Err` if the callback faulted.
    fn into_result(self) -> Result<(), CallbackError>;
}

impl CallbackOutcome for () {
    #[inline]
    fn into_result(self) -> Result<(), CallbackError> {
        Ok(())
    }
}

impl CallbackOutcome for Result<(), CallbackError> {
    #[inline]
    fn into_result(self) -> Self {
        self
    }
}

/// Type-erased callback as stored in the entry arena.
pub(crate) type BoxedCallback<K, P> =
    Box<dyn FnMut(&mut Scheduler<K, P>, &K, &mut P) -> Result<(), CallbackError>>;

/// Boxes a user callback, normalizing its outcome.
pub(crate) fn boxed<K, P, F, R>(mut f: F) -> BoxedCallback<K, P>
where
    F: FnMut(&mut Scheduler<K, P>, &K, &mut P) -> R + 'static,
    R: CallbackOutcome,
{
    Box::new(move |scheduler, key, param| f(scheduler, key, param).into_result())
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn error_displays_message() {
        let err = CallbackError::new("disk on fire");
        assert_eq!(err.to_string(), "disk on fire");
        assert_eq!(err.message(), "disk on fire");
        let owned = CallbackError::new(alloc::format!("code {}", 7));
        assert_eq!(owned.message(), "code 7");
    }

    #[test]
    fn outcomes_normalize() {
        assert_eq!(().into_result(), Ok(()));
        let failed: Result<(), CallbackError> = Err("nope".into());
        assert_eq!(failed.into_result(), Err(CallbackError::new("nope")));
    }
}
