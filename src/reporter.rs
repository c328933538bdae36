//! The optional diagnostic sink. Never load-bearing for decoding
//! correctness: passing `None` wherever a `&mut dyn Reporter` is
//! accepted is always legal.

/// Severity of a [`Reporter::report`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Debug,
    Error,
}

/// Diagnostic sink threaded explicitly through [`crate::Decoder::pump`].
/// The decoder never consults a `Reporter` for control flow; it exists
/// purely so malformed-byte and unrecognized-pattern conditions (§7 of
/// the design) are observable without the crate depending on a logging
/// backend itself.
pub trait Reporter {
    fn report(&mut self, level: Verbosity, message: std::fmt::Arguments<'_>);
}

/// Forwards reports to the `log` crate. Lets a consumer get diagnostics
/// for free by initializing any `log`-compatible backend, without this
/// crate depending on one.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn report(&mut self, level: Verbosity, message: std::fmt::Arguments<'_>) {
        match level {
            Verbosity::Debug => log::debug!("{}", message),
            Verbosity::Error => log::error!("{}", message),
        }
    }
}

/// Reports a byte-level diagnostic through an optional reporter, and
/// bumps the decoder's `reported_errors` counter. Kept as a free
/// function so call sites read as a single statement.
macro_rules! report {
    ($self:expr, $reporter:expr, $level:expr, $($arg:tt)*) => {{
        $self.stats.reported_errors += 1;
        if let Some(r) = $reporter {
            r.report($level, format_args!($($arg)*));
        }
    }};
}

pub(crate) use report;
