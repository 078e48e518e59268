//! FrameHub - Annotated Frame Distribution
//!
//! ## Responsibilities
//!
//! - Hold the latest annotated JPEG from the pipeline
//! - Hand out latest-value subscriptions for the MJPEG surface
//!
//! Only the most recent frame is retained; slow viewers skip frames
//! instead of applying backpressure to the pipeline.

use std::sync::Arc;
use tokio::sync::watch;

/// FrameHub instance
pub struct FrameHub {
    tx: watch::Sender<Option<Arc<Vec<u8>>>>,
}

impl FrameHub {
    /// Create new FrameHub
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish the latest encoded frame
    pub fn publish(&self, jpeg: Vec<u8>) {
        // send_replace never fails even with zero subscribers
        self.tx.send_replace(Some(Arc::new(jpeg)));
    }

    /// Subscribe to frame updates
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Vec<u8>>>> {
        self.tx.subscribe()
    }

    /// Number of connected viewers
    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FrameHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_sees_latest_frame_only() {
        let hub = FrameHub::new();
        let mut rx = hub.subscribe();

        hub.publish(vec![1]);
        hub.publish(vec![2]);

        rx.changed().await.unwrap();
        let latest = rx.borrow_and_update().clone().unwrap();
        assert_eq!(*latest, vec![2]);
    }

    #[tokio::test]
    async fn late_subscriber_gets_current_frame() {
        let hub = FrameHub::new();
        hub.publish(vec![7]);

        let rx = hub.subscribe();
        let current = rx.borrow().clone().unwrap();
        assert_eq!(*current, vec![7]);
    }
}
