//! Rendezvous hand-off between two pipeline stages
//!
//! A send completes only once the receiving stage has taken the item, so
//! nothing is ever queued between stages. A stalled consumer stalls its
//! producer immediately.

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// The receiving side went away before taking the item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("hand-off receiver is gone")]
pub struct ReceiverGone;

/// Sending half of a hand-off
#[derive(Debug)]
pub struct HandoffSender<T> {
    inner: mpsc::Sender<(T, oneshot::Sender<()>)>,
}

/// Receiving half of a hand-off
#[derive(Debug)]
pub struct HandoffReceiver<T> {
    inner: mpsc::Receiver<(T, oneshot::Sender<()>)>,
}

/// Create a connected sender/receiver pair
pub fn handoff<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { inner: tx }, HandoffReceiver { inner: rx })
}

impl<T> HandoffSender<T> {
    /// Pass `value` to the receiver, waiting until it has been taken
    ///
    /// Dropping the returned future before it completes may still let the
    /// receiver take the value.
    pub async fn send(&self, value: T) -> Result<(), ReceiverGone> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.inner
            .send((value, ack_tx))
            .await
            .map_err(|_| ReceiverGone)?;
        ack_rx.await.map_err(|_| ReceiverGone)
    }
}

impl<T> HandoffReceiver<T> {
    /// Take the next value, releasing its sender
    ///
    /// Returns `None` once the sender is dropped. Cancel safe.
    pub async fn recv(&mut self) -> Option<T> {
        let (value, ack) = self.inner.recv().await?;
        // The sender may have stopped waiting; the value is still delivered
        let _ = ack.send(());
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::{sleep, timeout};

    #[tokio::test]
    async fn test_send_waits_for_receiver() {
        let (sender, mut receiver) = handoff::<u32>();

        let send = tokio::spawn(async move { sender.send(7).await });
        sleep(Duration::from_millis(50)).await;
        assert!(!send.is_finished());

        assert_eq!(receiver.recv().await, Some(7));
        timeout(Duration::from_secs(5), send).await.unwrap().unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_values_arrive_in_order() {
        let (sender, mut receiver) = handoff();
        tokio::spawn(async move {
            for i in 0..5u32 {
                sender.send(i).await.unwrap();
            }
        });

        let mut seen = Vec::new();
        while let Some(v) = receiver.recv().await {
            seen.push(v);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_send_fails_when_receiver_dropped() {
        let (sender, receiver) = handoff::<u32>();
        drop(receiver);
        assert_eq!(sender.send(1).await, Err(ReceiverGone));
    }

    #[tokio::test]
    async fn test_pending_send_fails_when_receiver_dropped() {
        let (sender, receiver) = handoff::<u32>();
        let send = tokio::spawn(async move { sender.send(1).await });
        sleep(Duration::from_millis(50)).await;

        drop(receiver);
        let result = timeout(Duration::from_secs(5), send).await.unwrap().unwrap();
        assert_eq!(result, Err(ReceiverGone));
    }
}
