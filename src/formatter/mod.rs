//! Output rendering seam.
//!
//! The engine never prints anything itself. At command start, per output line
//! and at command completion it calls into a [`Formatter`], which decides how
//! (and whether) the event is shown. The formatter travels with an
//! [`ExecContext`](crate::session::ExecContext) instead of living in global
//! state.

use std::time::Duration;

use log::{error, info};

use crate::error::RemoteError;

pub use recording::{FormatterEvent, FormatterRecord, RecordingFormatter};

mod recording;

/// Receives the events of a command run.
pub trait Formatter: Send + Sync {
    /// Called once before the command starts.
    fn header(&self, command: &str);

    /// Called for every line the command writes to stdout.
    fn normal_line(&self, prefix: &str, line: &str);

    /// Called for every line the command writes to stderr, and for reader
    /// errors that cannot be returned to the caller.
    fn error_line(&self, prefix: &str, line: &str);

    /// Called once after the command finished, successfully or not.
    fn footer(&self, duration: Duration, error: Option<&RemoteError>);
}

/// Renders events through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicFormatter;

impl Formatter for BasicFormatter {
    fn header(&self, command: &str) {
        info!("===== Executing Command: '{command}' =====");
    }

    fn normal_line(&self, prefix: &str, line: &str) {
        info!("{prefix} {line}");
    }

    fn error_line(&self, prefix: &str, line: &str) {
        error!("{prefix} {line}");
    }

    fn footer(&self, duration: Duration, error: Option<&RemoteError>) {
        match error {
            Some(err) => {
                error!("===== Error: {err} =====");
                error!("===== Ended (Total: {duration:?}) (X) =====");
            }
            None => info!("===== Ended (Total: {duration:?}) (\u{2713}) ====="),
        }
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopFormatter;

impl Formatter for NoopFormatter {
    fn header(&self, _command: &str) {}

    fn normal_line(&self, _prefix: &str, _line: &str) {}

    fn error_line(&self, _prefix: &str, _line: &str) {}

    fn footer(&self, _duration: Duration, _error: Option<&RemoteError>) {}
}
