//! Substream capability wrappers.
//!
//! All three share one core holding the sender into the actor and, for
//! substreams that can receive, a private receiver the actor feeds.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use super::commands::SubstreamParts;
use super::events::{EventToUser, SubstreamId};
use super::StreamError;

struct SubstreamCore {
    id: SubstreamId,
    to_stream: mpsc::Sender<EventToUser>,
    from_stream: Option<mpsc::Receiver<Value>>,
    closed: bool,
}

impl SubstreamCore {
    fn new(parts: SubstreamParts) -> Self {
        Self {
            id: parts.id,
            to_stream: parts.to_stream,
            from_stream: parts.from_stream,
            closed: false,
        }
    }

    async fn send(&self, message: Value) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.to_stream
            .send(EventToUser::message(self.id, message))
            .await
            .map_err(|_| StreamError::Closed)
    }

    async fn receive(&mut self) -> Result<Value, StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        let rx = self.from_stream.as_mut().ok_or(StreamError::Closed)?;
        rx.recv().await.ok_or(StreamError::Closed)
    }

    /// Announce the close to the actor while draining anything it is
    /// trying to deliver to us.
    async fn close(&mut self) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        self.closed = true;

        let notice = self.to_stream.send(EventToUser::close(self.id));
        tokio::pin!(notice);
        let mut from_stream = self.from_stream.take();
        loop {
            match from_stream.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        _ = &mut notice => break,
                        drained = rx.recv() => {
                            if drained.is_none() {
                                from_stream = None;
                            }
                        }
                    }
                }
                None => {
                    let _ = (&mut notice).await;
                    break;
                }
            }
        }
        Ok(())
    }
}

impl Drop for SubstreamCore {
    fn drop(&mut self) {
        if !self.closed {
            // Best effort; the actor also deregisters when our receiver drops.
            let _ = self.to_stream.try_send(EventToUser::close(self.id));
        }
    }
}

/// Can only send to the user.
pub struct SendOnlySubstream(SubstreamCore);

impl SendOnlySubstream {
    pub(crate) fn new(parts: SubstreamParts) -> Self {
        Self(SubstreamCore::new(parts))
    }

    pub fn id(&self) -> SubstreamId {
        self.0.id
    }

    pub async fn send(&self, message: Value) -> Result<(), StreamError> {
        self.0.send(message).await
    }

    /// Serialize and send. Nothing is sent if serialization fails.
    pub async fn send_json<T: Serialize>(&self, message: &T) -> Result<(), StreamError> {
        let value =
            serde_json::to_value(message).map_err(|e| StreamError::Encode(e.to_string()))?;
        self.0.send(value).await
    }

    /// Errors if already closed.
    pub async fn close(&mut self) -> Result<(), StreamError> {
        self.0.close().await
    }
}

/// Can only receive from the user.
pub struct ReceiveOnlySubstream(SubstreamCore);

impl ReceiveOnlySubstream {
    pub(crate) fn new(parts: SubstreamParts) -> Self {
        Self(SubstreamCore::new(parts))
    }

    pub fn id(&self) -> SubstreamId {
        self.0.id
    }

    /// Next message from the user; `Closed` once either side has closed.
    pub async fn receive(&mut self) -> Result<Value, StreamError> {
        self.0.receive().await
    }

    pub async fn close(&mut self) -> Result<(), StreamError> {
        self.0.close().await
    }
}

/// Cloneable sending half of a bidirectional substream.
#[derive(Clone)]
pub struct SubstreamSender {
    id: SubstreamId,
    to_stream: mpsc::Sender<EventToUser>,
}

impl SubstreamSender {
    pub async fn send(&self, message: Value) -> Result<(), StreamError> {
        self.to_stream
            .send(EventToUser::message(self.id, message))
            .await
            .map_err(|_| StreamError::Closed)
    }
}

/// Sends and receives.
pub struct Substream(SubstreamCore);

impl Substream {
    pub(crate) fn new(parts: SubstreamParts) -> Self {
        Self(SubstreamCore::new(parts))
    }

    pub fn id(&self) -> SubstreamId {
        self.0.id
    }

    pub async fn send(&self, message: Value) -> Result<(), StreamError> {
        self.0.send(message).await
    }

    pub async fn receive(&mut self) -> Result<Value, StreamError> {
        self.0.receive().await
    }

    /// Direct channel access for use inside a caller's `select!`.
    pub fn raw_chans(
        &mut self,
    ) -> Result<(SubstreamSender, &mut mpsc::Receiver<Value>), StreamError> {
        if self.0.closed {
            return Err(StreamError::Closed);
        }
        let sender = SubstreamSender {
            id: self.0.id,
            to_stream: self.0.to_stream.clone(),
        };
        let receiver = self.0.from_stream.as_mut().ok_or(StreamError::Closed)?;
        Ok((sender, receiver))
    }

    pub async fn close(&mut self) -> Result<(), StreamError> {
        self.0.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parts(
        capacity: usize,
        can_receive: bool,
    ) -> (
        SubstreamParts,
        mpsc::Receiver<EventToUser>,
        Option<mpsc::Sender<Value>>,
    ) {
        let (to_stream, actor_rx) = mpsc::channel(capacity);
        let (tx, rx) = if can_receive {
            let (tx, rx) = mpsc::channel(1);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let parts = SubstreamParts {
            id: 4,
            to_stream,
            from_stream: rx,
        };
        (parts, actor_rx, tx)
    }

    #[tokio::test]
    async fn test_second_close_errors() {
        let (p, mut actor_rx, _tx) = parts(4, false);
        let mut sub = SendOnlySubstream::new(p);
        sub.send(json!("hi")).await.unwrap();
        assert_eq!(sub.close().await, Ok(()));
        assert_eq!(sub.close().await, Err(StreamError::Closed));
        assert_eq!(sub.send(json!("late")).await, Err(StreamError::Closed));

        assert_eq!(actor_rx.recv().await.unwrap(), EventToUser::message(4, json!("hi")));
        assert_eq!(actor_rx.recv().await.unwrap(), EventToUser::close(4));
    }

    #[tokio::test]
    async fn test_unencodable_json_is_not_sent() {
        use std::collections::HashMap;

        let (p, mut actor_rx, _tx) = parts(4, false);
        let sub = SendOnlySubstream::new(p);
        let tuple_keys: HashMap<(u8, u8), u8> = HashMap::from([((1, 2), 3)]);

        assert!(matches!(sub.send_json(&tuple_keys).await, Err(StreamError::Encode(_))));
        sub.send_json(&json!({"ok": true})).await.unwrap();
        assert_eq!(
            actor_rx.recv().await.unwrap(),
            EventToUser::message(4, json!({"ok": true}))
        );
    }

    #[tokio::test]
    async fn test_close_drains_blocked_delivery() {
        // Fan-in channel already full, and the "actor" is blocked delivering
        // to this substream: close must still complete.
        let (p, mut actor_rx, tx) = parts(1, true);
        let mut sub = ReceiveOnlySubstream::new(p);
        let tx = tx.unwrap();
        p_fill(&sub, 1).await;
        tx.send(json!(1)).await.unwrap();

        let actor = tokio::spawn(async move {
            // Blocks until the substream drains the first message.
            tx.send(json!(2)).await.ok();
            let mut seen = Vec::new();
            while let Some(e) = actor_rx.recv().await {
                seen.push(e);
                if seen.len() == 2 {
                    break;
                }
            }
            seen
        });

        sub.close().await.unwrap();
        let seen = actor.await.unwrap();
        assert_eq!(seen[1], EventToUser::close(4));
        assert_eq!(sub.receive().await, Err(StreamError::Closed));
    }

    async fn p_fill(sub: &ReceiveOnlySubstream, n: usize) {
        for _ in 0..n {
            sub.0
                .to_stream
                .send(EventToUser::message(sub.id(), json!("filler")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_close_after_stream_gone() {
        let (p, actor_rx, tx) = parts(1, true);
        drop(actor_rx);
        drop(tx);
        let mut sub = Substream::new(p);
        assert_eq!(sub.send(json!(0)).await, Err(StreamError::Closed));
        assert_eq!(sub.receive().await, Err(StreamError::Closed));
        assert_eq!(sub.close().await, Ok(()));
        assert!(sub.raw_chans().is_err());
    }

    #[tokio::test]
    async fn test_raw_chans() {
        let (p, mut actor_rx, tx) = parts(4, true);
        let mut sub = Substream::new(p);
        let tx = tx.unwrap();
        tx.send(json!("in")).await.unwrap();

        let (sender, receiver) = sub.raw_chans().unwrap();
        tokio::select! {
            Some(m) = receiver.recv() => sender.send(m).await.unwrap(),
        }
        assert_eq!(actor_rx.recv().await.unwrap(), EventToUser::message(4, json!("in")));
    }
}
