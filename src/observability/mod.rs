//! Observability and telemetry.
//!
//! Logging goes to stderr via `tracing-subscriber` so command output on
//! stdout stays clean for piping. Counters and histograms are emitted
//! through the `metrics` facade; without an installed recorder they are
//! no-ops. Analysis lifecycle events flow through the in-process
//! [`EventBus`].

mod event_bus;

pub use event_bus::{EventBus, FilteredReceiver, global_event_bus};

use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set; otherwise `verbose`
/// selects between a debug-level and an info-level default for this
/// crate. Setting `UNDERTONE_LOG_FORMAT=json` switches output from the
/// human-readable format to newline-delimited JSON.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if a global subscriber has
/// already been installed.
pub fn init_logging(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("undertone=debug,info")
        } else {
            EnvFilter::new("undertone=info,warn")
        }
    });

    let json_format = std::env::var("UNDERTONE_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let result = if json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| Error::OperationFailed {
        operation: "init_logging".to_string(),
        cause: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_reports_failure() {
        // Whichever call grabs the global subscriber, a later one must
        // fail with a descriptive error rather than panic.
        let _ = init_logging(false);
        match init_logging(true) {
            Err(Error::OperationFailed { operation, .. }) => {
                assert_eq!(operation, "init_logging");
            },
            Err(other) => panic!("unexpected error: {other}"),
            Ok(()) => panic!("second init should fail"),
        }
    }
}
