// Licensed under the Apache-2.0 license

//! Crate-wide helpers shared by the driver modules.

use core::fmt;

/// Sink for driver diagnostics.
///
/// Methods take `&self` because the same logger is reached from the blocking
/// transfer path and from the interrupt handler. Implementations that need
/// mutable state must provide their own interior locking.
pub trait Logger {
    fn debug(&self, args: fmt::Arguments<'_>);
    fn warn(&self, args: fmt::Arguments<'_>);
    fn error(&self, args: fmt::Arguments<'_>);
}

/// Logger that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    fn debug(&self, _args: fmt::Arguments<'_>) {}
    fn warn(&self, _args: fmt::Arguments<'_>) {}
    fn error(&self, _args: fmt::Arguments<'_>) {}
}

/// Logger writing to standard error, for hosted builds.
#[cfg(any(test, feature = "std"))]
#[derive(Clone, Copy, Debug, Default)]
pub struct StdLogger;

#[cfg(any(test, feature = "std"))]
impl Logger for StdLogger {
    fn debug(&self, args: fmt::Arguments<'_>) {
        std::eprintln!("[debug] {args}");
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        std::eprintln!("[warn] {args}");
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        std::eprintln!("[error] {args}");
    }
}

impl<L: Logger + ?Sized> Logger for &L {
    fn debug(&self, args: fmt::Arguments<'_>) {
        (**self).debug(args);
    }

    fn warn(&self, args: fmt::Arguments<'_>) {
        (**self).warn(args);
    }

    fn error(&self, args: fmt::Arguments<'_>) {
        (**self).error(args);
    }
}
