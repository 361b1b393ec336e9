//! The Stream handle and its actor task.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::ControlFlow;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::Instrument;

use super::commands::{Command, SubstreamParts};
use super::events::{EventFromUser, EventToUser, SubstreamId};
use super::substream::{ReceiveOnlySubstream, SendOnlySubstream, Substream};
use super::StreamError;
use crate::observability::metrics;

static ATTACHMENT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies one attached transport, so a stale detach is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentId(u64);

impl AttachmentId {
    fn next() -> Self {
        Self(ATTACHMENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Tuning for a stream.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    /// Capacity of each substream's inbound channel.
    pub substream_buffer: usize,
    /// Capacity of the shared channel from substreams to the actor.
    pub fan_in_buffer: usize,
    /// Emit per-message debug events.
    pub trace: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            substream_buffer: 16,
            fan_in_buffer: 64,
            trace: false,
        }
    }
}

struct StreamShared {
    id: String,
    commands: mpsc::UnboundedSender<Command>,
    stopping: AtomicBool,
    closed: Arc<AtomicBool>,
    finished: watch::Receiver<bool>,
}

/// Handle to a running stream. Cheap to clone.
#[derive(Clone)]
pub struct Stream {
    shared: Arc<StreamShared>,
}

impl fmt::Debug for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Stream {
    /// Create a stream and spawn its actor on the current runtime.
    pub fn new(id: impl Into<String>, options: &StreamOptions) -> Self {
        let (stream, actor) = Self::unstarted(id.into(), options);
        tokio::spawn(actor.run());
        stream
    }

    /// A handle plus the actor that has not been started yet.
    pub(crate) fn unstarted(id: String, options: &StreamOptions) -> (Self, StreamActor) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (fan_in_tx, fan_in_rx) = mpsc::channel(options.fan_in_buffer.max(1));
        let (finished_tx, finished_rx) = watch::channel(false);
        let closed = Arc::new(AtomicBool::new(false));

        let stream = Self {
            shared: Arc::new(StreamShared {
                id: id.clone(),
                commands: commands_tx,
                stopping: AtomicBool::new(false),
                closed: closed.clone(),
                finished: finished_rx,
            }),
        };
        let actor = StreamActor {
            id,
            commands: commands_rx,
            from_substreams: fan_in_rx,
            fan_in: fan_in_tx,
            substreams: HashMap::new(),
            next_id: 1,
            pending: VecDeque::new(),
            to_user: None,
            from_user: None,
            closed,
            finished: finished_tx,
            options: options.clone(),
        };
        (stream, actor)
    }

    pub fn id(&self) -> &str {
        &self.shared.id
    }

    /// True once teardown has started; commands fail fast from then on.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Wait until the actor has finished tearing down.
    pub async fn closed(&self) {
        let mut finished = self.shared.finished.clone();
        let _ = finished.wait_for(|done| *done).await;
    }

    fn send_command(&self, command: Command) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }
        self.shared
            .commands
            .send(command)
            .map_err(|_| StreamError::Closed)
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, StreamError>>) -> Command,
    ) -> Result<T, StreamError> {
        let (reply, response) = oneshot::channel();
        self.send_command(build(reply))?;
        response.await.map_err(|_| StreamError::Closed)?
    }

    async fn get_substream(&self, can_receive: bool) -> Result<SubstreamParts, StreamError> {
        self.request(|reply| Command::GetSubstream { can_receive, reply })
            .await
    }

    /// A substream that only sends to the user.
    pub async fn substream_to_user(&self) -> Result<SendOnlySubstream, StreamError> {
        Ok(SendOnlySubstream::new(self.get_substream(false).await?))
    }

    /// A substream that only receives from the user.
    pub async fn substream_from_user(&self) -> Result<ReceiveOnlySubstream, StreamError> {
        Ok(ReceiveOnlySubstream::new(self.get_substream(true).await?))
    }

    pub async fn substream(&self) -> Result<Substream, StreamError> {
        Ok(Substream::new(self.get_substream(true).await?))
    }

    /// Attach a transport, replacing any previous one.
    ///
    /// The stream stops when `from_user` ends. `to_user` is dropped when
    /// the stream closes or another transport replaces this one.
    pub async fn attach(
        &self,
        to_user: mpsc::Sender<EventToUser>,
        from_user: mpsc::Receiver<EventFromUser>,
    ) -> Result<AttachmentId, StreamError> {
        self.request(|reply| Command::Attach {
            to_user,
            from_user,
            reply,
        })
        .await
    }

    /// Detach the given transport. A no-op if another one replaced it.
    pub async fn detach(&self, attachment: AttachmentId) -> Result<(), StreamError> {
        self.request(|reply| Command::Detach { attachment, reply })
            .await
    }

    /// Ask the stream to stop. Returns once the request is queued;
    /// teardown happens on the actor. Errors if already closing.
    pub fn close(&self) -> Result<(), StreamError> {
        if self.shared.stopping.swap(true, Ordering::SeqCst) {
            return Err(StreamError::Closed);
        }
        self.send_command(Command::Stop)
    }

    /// Make the actor panic. For fault testing.
    pub fn inject_panic(&self, message: impl Into<String>) -> Result<(), StreamError> {
        self.send_command(Command::Panic(message.into()))
    }
}

/// Owns every piece of mutable stream state.
pub(crate) struct StreamActor {
    id: String,
    commands: mpsc::UnboundedReceiver<Command>,
    from_substreams: mpsc::Receiver<EventToUser>,
    fan_in: mpsc::Sender<EventToUser>,
    /// `None` marks a send-only substream.
    substreams: HashMap<SubstreamId, Option<mpsc::Sender<Value>>>,
    next_id: SubstreamId,
    pending: VecDeque<EventToUser>,
    to_user: Option<(AttachmentId, mpsc::Sender<EventToUser>)>,
    from_user: Option<mpsc::Receiver<EventFromUser>>,
    closed: Arc<AtomicBool>,
    finished: watch::Sender<bool>,
    options: StreamOptions,
}

impl StreamActor {
    pub(crate) async fn run(mut self) {
        let span = tracing::debug_span!("stream", stream_id = %self.id);
        metrics::stream_opened();

        let served = AssertUnwindSafe(self.serve().instrument(span.clone()))
            .catch_unwind()
            .await;
        if let Err(panic) = served {
            let reason = panic
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| panic.downcast_ref::<&str>().copied())
                .unwrap_or("unknown panic");
            span.in_scope(|| tracing::error!(reason, "Stream actor panicked"));
            metrics::stream_panicked();
        }

        span.in_scope(|| self.cleanup());
        metrics::stream_closed();
    }

    async fn serve(&mut self) {
        loop {
            if matches!(&self.to_user, Some((_, tx)) if tx.is_closed()) {
                tracing::debug!("Transport stopped accepting events; detaching");
                self.to_user = None;
            }
            let outbound_ready = !self.pending.is_empty() && self.to_user.is_some();
            // A permit must not hold a borrow of `self` into the other arms.
            let to_user_tx = self.to_user.clone();

            tokio::select! {
                biased;

                command = self.commands.recv() => {
                    let Some(command) = command else { return };
                    if self.handle_command(command).is_break() {
                        return;
                    }
                }

                Ok(permit) = reserve(to_user_tx.as_ref()), if outbound_ready => {
                    if let Some(event) = self.pending.pop_front() {
                        permit.send(event);
                    }
                }

                event = self.from_substreams.recv() => {
                    if let Some(event) = event {
                        self.relay_to_user(event);
                    }
                }

                incoming = recv_from_user(&mut self.from_user) => {
                    match incoming {
                        Some(event) => self.deliver_from_user(event).await,
                        None => {
                            tracing::debug!("Transport closed its inbound side; stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    fn handle_command(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::GetSubstream { can_receive, reply } => {
                let id = self.next_id;
                self.next_id += 1;

                let from_stream = if can_receive {
                    let (tx, rx) = mpsc::channel(self.options.substream_buffer.max(1));
                    self.substreams.insert(id, Some(tx));
                    Some(rx)
                } else {
                    self.substreams.insert(id, None);
                    None
                };
                let parts = SubstreamParts {
                    id,
                    to_stream: self.fan_in.clone(),
                    from_stream,
                };
                if reply.send(Ok(parts)).is_err() {
                    self.substreams.remove(&id);
                } else {
                    metrics::substream_opened(if can_receive { "receive" } else { "send_only" });
                    if self.options.trace {
                        tracing::debug!(substream = id, can_receive, "Substream opened");
                    }
                }
            }
            Command::Attach {
                to_user,
                from_user,
                reply,
            } => {
                let attachment = AttachmentId::next();
                self.to_user = Some((attachment, to_user));
                self.from_user = Some(from_user);
                let _ = reply.send(Ok(attachment));
                tracing::debug!(attachment = attachment.0, "Transport attached");
            }
            Command::Detach { attachment, reply } => {
                if matches!(self.to_user, Some((current, _)) if current == attachment) {
                    self.to_user = None;
                    self.from_user = None;
                    tracing::debug!(attachment = attachment.0, "Transport detached");
                }
                let _ = reply.send(Ok(()));
            }
            Command::Stop => return ControlFlow::Break(()),
            Command::Panic(message) => panic!("{}", message),
        }
        ControlFlow::Continue(())
    }

    fn relay_to_user(&mut self, event: EventToUser) {
        if event.close {
            // Dropping the sender closes the substream's inbound channel.
            if self.substreams.remove(&event.source).is_none() {
                return;
            }
        }
        if self.options.trace {
            tracing::debug!(substream = event.source, close = event.close, "Queued event to user");
        }
        self.pending.push_back(event);
    }

    async fn deliver_from_user(&mut self, event: EventFromUser) {
        let dest = event.dest;
        let Some(entry) = self.substreams.get(&dest) else {
            // Tell the peer this substream does not exist.
            if !event.close {
                self.pending.push_back(EventToUser::close(dest));
            }
            return;
        };

        if event.close {
            self.substreams.remove(&dest);
            return;
        }

        match (entry, event.message) {
            (None, _) => {
                // TODO: no NAK exists for sends to a send-only substream;
                // add one if the wire protocol grows an error frame.
                tracing::trace!(substream = dest, "Dropping message for send-only substream");
            }
            (Some(tx), Some(message)) => {
                let tx = tx.clone();
                if tx.send(message).await.is_err() {
                    self.substreams.remove(&dest);
                }
            }
            (Some(_), None) => {}
        }
    }

    fn cleanup(&mut self) {
        self.closed.store(true, Ordering::SeqCst);

        self.commands.close();
        while let Ok(command) = self.commands.try_recv() {
            command.reject();
        }

        self.substreams.clear();
        self.from_substreams.close();
        self.from_user = None;
        self.to_user = None;
        self.finished.send_replace(true);
        tracing::debug!(pending = self.pending.len(), "Stream closed");
    }
}

async fn reserve(
    to_user: Option<&(AttachmentId, mpsc::Sender<EventToUser>)>,
) -> Result<mpsc::Permit<'_, EventToUser>, SendError<()>> {
    match to_user {
        Some((_, tx)) => tx.reserve().await,
        None => std::future::pending().await,
    }
}

async fn recv_from_user(from_user: &mut Option<mpsc::Receiver<EventFromUser>>) -> Option<EventFromUser> {
    match from_user {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
