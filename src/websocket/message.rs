use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Outcome of waiting for the next inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame from the peer
    Message(String),
    /// The peer closed the connection
    PeerClosed,
    /// The transport failed or timed out
    TransportError(String),
}

/// Source of inbound frames for one connection
#[async_trait]
pub trait FrameSource: Send {
    /// Wait for the next inbound frame
    async fn recv(&mut self) -> Inbound;
}

/// Channel-fed frames; a closed channel reads as a peer close
#[async_trait]
impl FrameSource for mpsc::Receiver<Inbound> {
    async fn recv(&mut self) -> Inbound {
        mpsc::Receiver::recv(self).await.unwrap_or(Inbound::PeerClosed)
    }
}

/// Await `fut`, giving up after `idle` if one is set.
///
/// Returns `None` when the timeout elapsed first.
pub async fn next_within<F: Future>(idle: Option<Duration>, fut: F) -> Option<F::Output> {
    match idle {
        Some(idle) => tokio::time::timeout(idle, fut).await.ok(),
        None => Some(fut.await),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_closed_channel_reads_as_peer_closed() {
        let (tx, mut rx) = mpsc::channel(4);
        tx.send(Inbound::Message("hi".into())).await.unwrap();
        drop(tx);

        assert_eq!(FrameSource::recv(&mut rx).await, Inbound::Message("hi".into()));
        assert_eq!(FrameSource::recv(&mut rx).await, Inbound::PeerClosed);
    }

    #[tokio::test]
    async fn test_next_within_times_out() {
        let pending = std::future::pending::<()>();
        assert_eq!(next_within(Some(Duration::from_millis(20)), pending).await, None);

        let ready = async { 5 };
        assert_eq!(next_within(Some(Duration::from_secs(1)), ready).await, Some(5));
        assert_eq!(next_within(None, async { 6 }).await, Some(6));
    }
}
