// Licensed under the Apache-2.0 license

//! [`Completion`] implementations.

use crate::i2c::traits::{Completion, WaitOutcome};
use core::sync::atomic::{AtomicBool, Ordering};
use fugit::MillisDurationU32;

/// Busy-waiting completion for bare-metal targets.
///
/// The deadline is measured in spin iterations, calibrated by the board.
pub struct SpinCompletion {
    done: AtomicBool,
    spins_per_ms: u32,
}

impl SpinCompletion {
    #[must_use]
    pub const fn new(spins_per_ms: u32) -> Self {
        Self {
            done: AtomicBool::new(false),
            spins_per_ms,
        }
    }
}

impl Completion for SpinCompletion {
    fn reinit(&self) {
        self.done.store(false, Ordering::Release);
    }

    fn complete(&self) {
        self.done.store(true, Ordering::Release);
    }

    fn wait_for(&self, timeout: MillisDurationU32) -> WaitOutcome {
        let budget = u64::from(timeout.ticks()) * u64::from(self.spins_per_ms);
        for _ in 0..budget {
            if self.done.load(Ordering::Acquire) {
                return WaitOutcome::Completed;
            }
            core::hint::spin_loop();
        }
        if self.done.load(Ordering::Acquire) {
            WaitOutcome::Completed
        } else {
            WaitOutcome::TimedOut
        }
    }
}

#[cfg(any(test, feature = "std"))]
pub use hosted::{CondvarCompletion, StdDelay};

#[cfg(any(test, feature = "std"))]
mod hosted {
    use super::{Completion, MillisDurationU32, WaitOutcome};
    use std::sync::{Condvar, Mutex, PoisonError};
    use std::time::Duration;

    /// Completion backed by a condition variable, for hosted builds.
    #[derive(Default)]
    pub struct CondvarCompletion {
        done: Mutex<bool>,
        wake: Condvar,
    }

    impl CondvarCompletion {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Completion for CondvarCompletion {
        fn reinit(&self) {
            *self.done.lock().unwrap_or_else(PoisonError::into_inner) = false;
        }

        fn complete(&self) {
            *self.done.lock().unwrap_or_else(PoisonError::into_inner) = true;
            self.wake.notify_all();
        }

        fn wait_for(&self, timeout: MillisDurationU32) -> WaitOutcome {
            let guard = self.done.lock().unwrap_or_else(PoisonError::into_inner);
            let (guard, _) = self
                .wake
                .wait_timeout_while(guard, Duration::from_millis(u64::from(timeout.ticks())), |done| {
                    !*done
                })
                .unwrap_or_else(PoisonError::into_inner);
            if *guard {
                WaitOutcome::Completed
            } else {
                WaitOutcome::TimedOut
            }
        }
    }

    /// `DelayNs` that sleeps the calling thread.
    #[derive(Copy, Clone, Debug, Default)]
    pub struct StdDelay;

    impl embedded_hal::delay::DelayNs for StdDelay {
        fn delay_ns(&mut self, ns: u32) {
            std::thread::sleep(Duration::from_nanos(u64::from(ns)));
        }
    }
}
