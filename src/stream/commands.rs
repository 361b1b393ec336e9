//! Commands sent from `Stream` handles to the actor.

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use super::events::{EventFromUser, EventToUser, SubstreamId};
use super::stream::AttachmentId;
use super::StreamError;

/// Channel ends for a freshly registered substream.
pub(crate) struct SubstreamParts {
    pub id: SubstreamId,
    pub to_stream: mpsc::Sender<EventToUser>,
    pub from_stream: Option<mpsc::Receiver<Value>>,
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, StreamError>>;

pub(crate) enum Command {
    GetSubstream {
        can_receive: bool,
        reply: Reply<SubstreamParts>,
    },
    Attach {
        to_user: mpsc::Sender<EventToUser>,
        from_user: mpsc::Receiver<EventFromUser>,
        reply: Reply<AttachmentId>,
    },
    Detach {
        attachment: AttachmentId,
        reply: Reply<()>,
    },
    Stop,
    /// Fault injection: panic inside the actor.
    Panic(String),
}

impl Command {
    /// Answer a command the actor will never execute.
    pub(crate) fn reject(self) {
        match self {
            Command::GetSubstream { reply, .. } => {
                let _ = reply.send(Err(StreamError::Closed));
            }
            Command::Attach { reply, .. } => {
                let _ = reply.send(Err(StreamError::Closed));
            }
            Command::Detach { reply, .. } => {
                let _ = reply.send(Err(StreamError::Closed));
            }
            Command::Stop | Command::Panic(_) => {}
        }
    }
}
