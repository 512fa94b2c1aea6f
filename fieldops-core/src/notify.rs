use async_trait::async_trait;
use fieldops_shared::DomainEvent;

/// Outbound notification collaborator (email, push, ...). Delivery failures
/// are the sender's problem; workflows never fail because of them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &DomainEvent);
}

/// Default sender: writes every event to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &DomainEvent) {
        match serde_json::to_string(event) {
            Ok(body) => tracing::info!(kind = event.name(), "Notification: {}", body),
            Err(e) => tracing::error!(kind = event.name(), "Failed to encode notification: {}", e),
        }
    }
}
