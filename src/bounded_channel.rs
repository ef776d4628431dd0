// SPDX-License-Identifier: Apache-2.0

//! Bounded queues shared by the discovery loop and the per-file tailers.
//!
//! Producers on dedicated OS threads use the blocking half, consumers on the
//! tokio runtime use the async half of the same flume channel.

use flume::{Receiver, Sender};
use std::fmt;

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    Disconnected,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "channel disconnected"),
        }
    }
}

impl std::error::Error for SendError {}

impl<T> BoundedSender<T> {
    pub async fn send(&self, item: T) -> Result<(), SendError> {
        match self.tx.send_async(item).await {
            Ok(()) => Ok(()),
            Err(_e) => Err(SendError::Disconnected), // receiver closed
        }
    }

    /// Blocking send - blocks until there is capacity in the channel.
    /// Use this from non-async contexts (e.g., dedicated OS threads).
    pub fn send_blocking(&self, item: T) -> Result<(), SendError> {
        match self.tx.send(item) {
            Ok(()) => Ok(()),
            Err(_e) => Err(SendError::Disconnected), // receiver closed
        }
    }

    /// True once every receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_disconnected()
    }
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    pub async fn next(&mut self) -> Option<T> {
        match self.rx.recv_async().await {
            Ok(item) => Some(item),
            Err(_e) => None, // disconnected
        }
    }

    /// Non-blocking receive - returns immediately.
    /// Returns None if no item is available or channel is disconnected.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);

    (BoundedSender { tx }, BoundedReceiver { rx })
}

#[cfg(test)]
mod tests {
    use super::{SendError, bounded};
    use tokio_test::{assert_ok, assert_pending, assert_ready, task::spawn};

    #[tokio::test]
    async fn receiver_sees_end_after_sender_drop() {
        let (tx, mut rx) = bounded(3);

        let mut recv1 = spawn(async { rx.next().await });
        assert_pending!(recv1.poll());

        tx.send_blocking(10).unwrap();
        assert!(recv1.is_woken());
        assert_eq!(Some(10), assert_ready!(recv1.poll()));
        drop(recv1);

        let mut recv2 = spawn(async { rx.next().await });
        drop(tx);
        assert_eq!(None, assert_ready!(recv2.poll()));
    }

    #[tokio::test]
    async fn sender_blocks_on_full() {
        let (tx, mut rx) = bounded(1);

        let mut send1 = spawn(async { tx.send(1).await });
        assert_ok!(assert_ready!(send1.poll()));
        drop(send1);

        let mut send2 = spawn(async { tx.send(2).await });
        assert_pending!(send2.poll());

        assert_eq!(Some(1), rx.next().await);
        assert_ok!(assert_ready!(send2.poll()));
    }

    #[test]
    fn sender_reports_closed_receiver() {
        let (tx, rx) = bounded::<u32>(1);
        assert!(!tx.is_closed());

        drop(rx);
        assert!(tx.is_closed());
        assert_eq!(Err(SendError::Disconnected), tx.send_blocking(1));
    }
}
