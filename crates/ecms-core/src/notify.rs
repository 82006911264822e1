//! Outbound notification seam.
//!
//! Message delivery (email, SMS) is owned by an external collaborator.
//! Callers dispatch only after their storage writes have committed, and a
//! failed delivery never undoes that work.

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
#[error("notification delivery failed: {0}")]
pub struct NotifyError(pub String);

pub trait Notifier: Send + Sync {
    fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> impl Future<Output = Result<(), NotifyError>> + Send;
}

/// Sends and logs a failure at `warn` instead of returning it.
pub async fn send_best_effort<N: Notifier>(notifier: &N, to: &str, subject: &str, body: &str) {
    if let Err(e) = notifier.send(to, subject, body).await {
        warn!(recipient = %to, subject = %subject, error = %e, "Notification not delivered");
    }
}
