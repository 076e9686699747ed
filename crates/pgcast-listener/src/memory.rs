//! In-process notification source.
//!
//! Delivers every published event whatever its channel, the way a shared
//! database connection carrying several `LISTEN`s would. Channel filtering
//! is left to the consumer.

use async_trait::async_trait;
use futures::StreamExt;
use pgcast_core::NotificationEvent;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;

use crate::{check_channel, NotificationSource, NotificationStream, UpstreamError};

/// Publishing half of a [`MemorySource`].
#[derive(Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<Result<NotificationEvent, UpstreamError>>,
}

impl MemoryPublisher {
    /// Publish a notification. Returns `false` once the source is gone.
    pub fn publish(&self, channel: &str, payload: &str) -> bool {
        self.tx
            .send(Ok(NotificationEvent::new(channel, payload)))
            .is_ok()
    }

    /// Inject an upstream failure; the subscriber's stream ends with it.
    pub fn fail(&self, error: UpstreamError) -> bool {
        self.tx.send(Err(error)).is_ok()
    }
}

/// Receiving half, implementing [`NotificationSource`].
pub struct MemorySource {
    rx: Option<mpsc::UnboundedReceiver<Result<NotificationEvent, UpstreamError>>>,
    shutdown: CancellationToken,
}

impl MemorySource {
    pub fn new() -> (Self, MemoryPublisher) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                rx: Some(rx),
                shutdown: CancellationToken::new(),
            },
            MemoryPublisher { tx },
        )
    }
}

#[async_trait]
impl NotificationSource for MemorySource {
    async fn subscribe(&mut self, channel: &str) -> Result<NotificationStream, UpstreamError> {
        check_channel(channel)?;
        if self.shutdown.is_cancelled() {
            return Err(UpstreamError::Closed);
        }
        let rx = self.rx.take().ok_or(UpstreamError::AlreadySubscribed)?;
        tracing::debug!(channel, "memory source subscribed");

        let shutdown = self.shutdown.clone();
        let stream = UnboundedReceiverStream::new(rx)
            .take_until(async move { shutdown.cancelled().await });
        Ok(Box::pin(stream))
    }

    async fn close(&mut self) -> Result<(), UpstreamError> {
        self.shutdown.cancel();
        let _ = self.rx.take();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let (mut source, publisher) = MemorySource::new();
        let mut stream = source.subscribe("http_response_inserted").await.unwrap();

        assert!(publisher.publish("http_response_inserted", "a"));
        assert!(publisher.publish("other_channel", "b"));
        assert!(publisher.publish("http_response_inserted", "c"));

        let mut got = Vec::new();
        for _ in 0..3 {
            let ev = stream.next().await.unwrap().unwrap();
            got.push((ev.channel.clone(), ev.payload.to_string()));
        }
        assert_eq!(
            got,
            vec![
                ("http_response_inserted".to_string(), "a".to_string()),
                ("other_channel".to_string(), "b".to_string()),
                ("http_response_inserted".to_string(), "c".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn second_subscribe_is_rejected() {
        let (mut source, _publisher) = MemorySource::new();
        let _stream = source.subscribe("x").await.unwrap();
        let err = source.subscribe("x").await.err().unwrap();
        assert_eq!(err, UpstreamError::AlreadySubscribed);
    }

    #[tokio::test]
    async fn close_ends_stream() {
        let (mut source, publisher) = MemorySource::new();
        let mut stream = source.subscribe("x").await.unwrap();
        source.close().await.unwrap();
        assert!(stream.next().await.is_none());
        // Publishing after close is harmless.
        let _ = publisher.publish("x", "late");
    }

    #[tokio::test]
    async fn dropping_publisher_ends_stream() {
        let (mut source, publisher) = MemorySource::new();
        let mut stream = source.subscribe("x").await.unwrap();
        drop(publisher);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn injected_failure_is_delivered() {
        let (mut source, publisher) = MemorySource::new();
        let mut stream = source.subscribe("x").await.unwrap();
        assert!(publisher.fail(UpstreamError::ConnectionLost("reset".into())));
        let item = stream.next().await.unwrap();
        assert_eq!(item, Err(UpstreamError::ConnectionLost("reset".into())));
    }

    #[tokio::test]
    async fn subscribe_after_close_fails() {
        let (mut source, _publisher) = MemorySource::new();
        source.close().await.unwrap();
        let err = source.subscribe("x").await.err().unwrap();
        assert_eq!(err, UpstreamError::Closed);
    }
}
