//! Error and debug reporting for the repeater core.

use tracing::{debug, warn};

use super::error::RepeaterError;

/// Reporting sink for errors the repeater swallows.
///
/// Delivery failures never propagate out of the dispatchers; they end up here
/// and are only logged when debug output was requested in the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct Diagnostics {
    debug: bool,
}

impl Diagnostics {
    /// Create a sink. With `debug` off every report is discarded.
    #[must_use]
    pub const fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// Whether reports are logged.
    #[inline]
    #[must_use]
    pub const fn is_debug(&self) -> bool {
        self.debug
    }

    /// Report a swallowed error.
    pub fn report(&self, error: &RepeaterError) {
        if self.debug {
            warn!(error = %error, "Repeater error");
        }
    }

    /// Trace a line that matched a destination's rules.
    pub fn line_matched(&self, destination: &str, line: &[u8]) {
        if self.debug {
            debug!(
                destination,
                line = %String::from_utf8_lossy(line).trim_end_matches('\n'),
                "Line matched"
            );
        }
    }
}
