//! Notifier that records outbound messages in the log.
//!
//! Bodies can carry tokens and codes, so only the envelope is logged.

use ecms_core::notify::{Notifier, NotifyError};
use tracing::info;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        info!(recipient = %to, subject = %subject, body_len = body.len(), "Notification queued");
        Ok(())
    }
}
