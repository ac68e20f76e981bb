//! Thin facade over `slog` so the rest of the workspace imports one module.

pub use slog::{crit, debug, error, info, o, trace, warn, Discard, Drain, Logger};
pub use sloggers::types::Severity;

use sloggers::terminal::{Destination, TerminalLoggerBuilder};
use sloggers::Build;

/// Builds the root terminal logger used by the binaries. Output goes to
/// stderr so stdout stays free for collaborators consuming it.
pub fn term_root(level: Severity) -> Logger {
    let mut builder = TerminalLoggerBuilder::new();
    builder.level(level);
    builder.destination(Destination::Stderr);
    builder.build().expect("Failed building the terminal logger")
}

/// Parses a severity name as accepted on the command line.
pub fn severity(name: &str) -> Option<Severity> {
    match name {
        "trace" => Some(Severity::Trace),
        "debug" => Some(Severity::Debug),
        "info" => Some(Severity::Info),
        "warning" => Some(Severity::Warning),
        "error" => Some(Severity::Error),
        "critical" => Some(Severity::Critical),
        _ => None,
    }
}

/// Root logger for tests. Swallows everything.
pub fn test_root() -> Logger {
    Logger::root(Discard, o!())
}
