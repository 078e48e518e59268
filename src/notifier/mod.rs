//! OperatorNotifier - outbound operator-channel dispatch
//!
//! ## Responsibilities
//!
//! - Bounded queue between the hot paths (frame loop, door cycle) and the
//!   operator channel
//! - Fire-and-forget delivery through an injected transport
//!
//! Senders never block: a full queue drops the message with a warning, a
//! failed delivery is logged and not retried.

use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Outbound operator message.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    Text(String),
    Photo { jpeg: Vec<u8>, caption: String },
}

/// Injected delivery transport. The shipped default logs messages; a real
/// chat transport is supplied by the embedder.
#[async_trait]
pub trait OperatorTransport: Send + Sync {
    async fn deliver(&self, notification: Notification) -> Result<()>;
}

/// Transport that writes notifications to the log.
pub struct LogTransport;

#[async_trait]
impl OperatorTransport for LogTransport {
    async fn deliver(&self, notification: Notification) -> Result<()> {
        match notification {
            Notification::Text(text) => {
                tracing::info!(message = %text, "Operator notification");
            }
            Notification::Photo { jpeg, caption } => {
                tracing::info!(caption = %caption, bytes = jpeg.len(), "Operator photo notification");
            }
        }
        Ok(())
    }
}

/// Queue depth between producers and the dispatch worker.
const QUEUE_CAPACITY: usize = 16;

/// OperatorNotifier instance: cheap to clone, shared by the pipeline and
/// the actuator.
#[derive(Clone)]
pub struct OperatorNotifier {
    tx: mpsc::Sender<Notification>,
}

impl OperatorNotifier {
    /// Start the dispatch worker and return the sender handle.
    pub fn start(transport: Arc<dyn OperatorTransport>) -> Self {
        let (tx, mut rx) = mpsc::channel::<Notification>(QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                if let Err(e) = transport.deliver(notification).await {
                    tracing::error!(error = %e, "Operator notification failed");
                }
            }
            tracing::debug!("Notification dispatch worker stopped");
        });

        Self { tx }
    }

    /// Queue a text message. Never blocks.
    pub fn notify_text(&self, text: impl Into<String>) {
        self.enqueue(Notification::Text(text.into()));
    }

    /// Queue a still image with caption. Never blocks.
    pub fn notify_photo(&self, jpeg: Vec<u8>, caption: impl Into<String>) {
        self.enqueue(Notification::Photo {
            jpeg,
            caption: caption.into(),
        });
    }

    fn enqueue(&self, notification: Notification) {
        if self.tx.try_send(notification).is_err() {
            tracing::warn!("Notification queue full, dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;

    struct RecordingTransport {
        tx: mpsc::UnboundedSender<Notification>,
    }

    #[async_trait]
    impl OperatorTransport for RecordingTransport {
        async fn deliver(&self, notification: Notification) -> Result<()> {
            self.tx.send(notification).ok();
            Ok(())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl OperatorTransport for FailingTransport {
        async fn deliver(&self, _notification: Notification) -> Result<()> {
            Err(Error::Internal("transport down".to_string()))
        }
    }

    #[tokio::test]
    async fn delivers_queued_messages_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let notifier = OperatorNotifier::start(Arc::new(RecordingTransport { tx }));

        notifier.notify_text("first");
        notifier.notify_photo(vec![1, 2, 3], "unknown person");

        assert_eq!(
            rx.recv().await,
            Some(Notification::Text("first".to_string()))
        );
        assert_eq!(
            rx.recv().await,
            Some(Notification::Photo {
                jpeg: vec![1, 2, 3],
                caption: "unknown person".to_string()
            })
        );
    }

    #[tokio::test]
    async fn delivery_failure_does_not_stop_the_worker() {
        let notifier = OperatorNotifier::start(Arc::new(FailingTransport));

        notifier.notify_text("lost");
        tokio::time::sleep(Duration::from_millis(10)).await;

        // worker is still alive and accepting messages
        notifier.notify_text("also lost");
    }
}
