//! Configuration for the [`Resolver`](crate::resolver::Resolver).
//!
//! Defaults suit a live chat page. Tests and the CLI usually drop the settle
//! delay to zero:
//!
//! ```ignore
//! let config = ResolverConfig::default()
//!     .with_settle_delay(Duration::ZERO)
//!     .with_mount_timeout(None)
//!     .with_missing_template(MissingTemplate::Empty);
//! ```

use crate::surface::ChatSelectors;
use std::time::Duration;

/// Default pause after every successful action, giving the surface time to
/// re-render before the next portal runs.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Default upper bound on a single conduit fetch.
pub const DEFAULT_MOUNT_TIMEOUT: Duration = Duration::from_secs(30);

/// What a data portal does when its template id is unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MissingTemplate {
    /// Record a soft error for the id and empty the span.
    #[default]
    Error,
    /// Log a warning and expand to the empty string.
    Empty,
}

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Passed to every scrape and conduit fetch.
    pub selectors: ChatSelectors,
    /// Pause after each successful action. Default: 500 ms.
    pub settle_delay: Duration,
    /// Bound on each conduit mount; `None` waits indefinitely. Default: 30 s.
    pub mount_timeout: Option<Duration>,
    pub missing_template: MissingTemplate,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            selectors: ChatSelectors::default(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            mount_timeout: Some(DEFAULT_MOUNT_TIMEOUT),
            missing_template: MissingTemplate::default(),
        }
    }
}

impl ResolverConfig {
    pub fn with_selectors(mut self, selectors: ChatSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn with_mount_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.mount_timeout = timeout;
        self
    }

    pub fn with_missing_template(mut self, policy: MissingTemplate) -> Self {
        self.missing_template = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ResolverConfig::default();
        assert_eq!(c.settle_delay, Duration::from_millis(500));
        assert_eq!(c.mount_timeout, Some(Duration::from_secs(30)));
        assert_eq!(c.missing_template, MissingTemplate::Error);
    }

    #[test]
    fn builders_override_fields() {
        let c = ResolverConfig::default()
            .with_settle_delay(Duration::ZERO)
            .with_mount_timeout(None)
            .with_missing_template(MissingTemplate::Empty);
        assert_eq!(c.settle_delay, Duration::ZERO);
        assert_eq!(c.mount_timeout, None);
        assert_eq!(c.missing_template, MissingTemplate::Empty);
    }
}
