//! # Interpreter Events
//!
//! Broadcast-based notification of what the engine is doing. Every
//! subscriber sees every event; slow subscribers are lagged rather than
//! blocking the worker.

use strum_macros::AsRefStr;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::error::{Error, TansyResult};

/// What the engine reports while it runs.
#[derive(Debug, Clone, PartialEq, AsRefStr)]
pub enum InterpreterEvent {
    /// The worker picked a statement up (`busy: true`) or finished with
    /// it (`busy: false`).
    StateChanged { busy: bool },
    /// A statement completed. `output` carries the result's REPL form
    /// for expressions that produced a value, and is empty otherwise.
    Evaluated { statement: String, output: String },
    /// A statement failed. `message` is the full rendered diagnostic,
    /// traceback included when one was captured.
    Error { statement: String, message: String },
    /// The worker exited and the runtime it hosted was torn down.
    Terminated,
}

pub struct EventBus {
    event_sender: broadcast::Sender<InterpreterEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_sender, _) = broadcast::channel(capacity);
        Self { event_sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.event_sender.subscribe())
    }

    /// Publishes to every live subscriber. With no subscriber at all the
    /// broadcast channel refuses the event and this returns `SendFailed`.
    pub fn publish(&self, event: InterpreterEvent) -> TansyResult<()> {
        self.event_sender.send(event).map_err(|e| {
            Error::Event(EventError::SendFailed {
                message: e.to_string(),
            })
        })?;
        Ok(())
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<InterpreterEvent>,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<InterpreterEvent>) -> Self {
        Self { receiver }
    }

    /// イベントを受信する。Laggedエラーが発生した場合はresubscribeを試みて、エラーを返す。
    /// 利用側で、Laggedなどが発生しないようできるだけすぐに次のrecvを呼ぶようにする。
    pub async fn recv(&mut self) -> TansyResult<InterpreterEvent> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                // n個のメッセージをスキップ
                self.receiver = self.receiver.resubscribe();
                Err(Error::Event(EventError::Lagged { count: n }))
            }
            Err(e) => Err(Error::Event(EventError::ReceiveFailed {
                message: e.to_string(),
            })),
        }
    }

    /// Blocking variant of [`recv`](Self::recv) for callers that have no
    /// async runtime of their own. Must not be called from inside one.
    pub fn recv_blocking(&mut self) -> TansyResult<InterpreterEvent> {
        match self.receiver.blocking_recv() {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.receiver = self.receiver.resubscribe();
                Err(Error::Event(EventError::Lagged { count: n }))
            }
            Err(e) => Err(Error::Event(EventError::ReceiveFailed {
                message: e.to_string(),
            })),
        }
    }
}

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event Send failed: {message}")]
    SendFailed { message: String },

    #[error("Event Receive failed: {message}")]
    ReceiveFailed { message: String },

    #[error("Event lagged: {count}")]
    Lagged { count: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_basic_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(InterpreterEvent::StateChanged { busy: true })
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, InterpreterEvent::StateChanged { busy: true });
        assert_eq!(received.as_ref(), "StateChanged");
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_every_event() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        let event = InterpreterEvent::Evaluated {
            statement: "2 + 2".to_string(),
            output: "4".to_string(),
        };
        bus.publish(event.clone()).unwrap();

        assert_eq!(rx1.recv().await.unwrap(), event);
        assert_eq!(rx2.recv().await.unwrap(), event);
    }

    #[test]
    fn test_publish_without_subscribers_fails() {
        let bus = EventBus::new(16);
        let result = bus.publish(InterpreterEvent::Terminated);
        assert!(matches!(
            result,
            Err(Error::Event(EventError::SendFailed { .. }))
        ));
    }

    #[tokio::test]
    async fn test_lagged_receiver_resubscribes_and_recovers() {
        // 容量1で2件送ると古い方が落ちる
        let bus = EventBus::new(1);
        let mut rx = bus.subscribe();
        bus.publish(InterpreterEvent::StateChanged { busy: true })
            .unwrap();
        bus.publish(InterpreterEvent::StateChanged { busy: false })
            .unwrap();

        let result = rx.recv().await;
        assert!(matches!(
            result,
            Err(Error::Event(EventError::Lagged { count: 1 }))
        ));

        // resubscribe済みなので、以後のイベントは受信できる
        bus.publish(InterpreterEvent::Terminated).unwrap();
        assert_eq!(rx.recv().await.unwrap(), InterpreterEvent::Terminated);
    }

    #[test]
    fn test_recv_blocking_outside_a_runtime() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(InterpreterEvent::Terminated).unwrap();
        assert_eq!(rx.recv_blocking().unwrap(), InterpreterEvent::Terminated);
    }
}
