//! Where user-facing success and failure messages go.

use tracing::{info, warn};

/// Log target of every notification, so front-ends can let them through
/// a quieter default filter.
pub const NOTIFY_TARGET: &str = "tourdesk::notify";

/// Sink for short notifications. Calls must not block.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Writes notifications to the log under `NOTIFY_TARGET`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn success(&self, message: &str) {
        info!(target: NOTIFY_TARGET, notification = message, "Success");
    }

    fn error(&self, message: &str) {
        warn!(target: NOTIFY_TARGET, notification = message, "Error");
    }
}
