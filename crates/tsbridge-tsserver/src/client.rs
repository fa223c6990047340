//! The per-process server actor and its handle
//!
//! One task owns everything mutable about a tsserver process: the framed
//! transport, the request queue, the callback map and the cancelled-seq
//! set. Callers talk to it through a cheap clonable [`ServerHandle`] over
//! an operations channel, so no lock ever guards protocol state.
//!
//! Dispatch rule: while no synchronous response is outstanding and the
//! queue head is admissible, pop and send. Async requests (`geterr*`) do
//! not hold the outstanding gate; they complete on `requestCompleted`.

use std::collections::HashSet;
use std::pin::Pin;
use std::time::{Duration, Instant};

use futures::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tsbridge_protocol::command;
use tsbridge_protocol::message::{Event, Message, Request, Response, Seq};
use tsbridge_protocol::types::RequestCompletedEventBody;
use tsbridge_protocol::ProtocolError;

use crate::cancellation::PipeCanceller;
use crate::outcome::ResponseOutcome;
use crate::process::{self, ServerKind, SpawnedServer};
use crate::queue::{CallbackMap, InflightEntry, QueuedRequest, QueueingClass, RequestQueue};

pub type MessageSink = Pin<Box<dyn Sink<Message, Error = ProtocolError> + Send>>;
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<Message, ProtocolError>> + Send>>;

/// Why the actor stopped.
#[derive(Debug)]
pub enum ExitReason {
    /// The transport ended: the process died or closed its pipe.
    ProcessExited,
    /// The inbound byte stream stopped making sense.
    Protocol(ProtocolError),
    /// A `non_recoverable` request failed; the process must be recycled.
    FatalError(String),
    /// Orderly dispose.
    Shutdown,
}

/// Per-request execution options.
#[derive(Debug, Default, Clone)]
pub struct RequestOptions {
    pub low_priority: bool,
    /// Escalate a server error on this request to a process restart.
    pub non_recoverable: bool,
    /// Cancel automatically when this document is about to mutate or close.
    pub cancel_on_resource_change: Option<String>,
    pub token: Option<CancellationToken>,
}

pub(crate) enum Op {
    Enqueue {
        command: String,
        arguments: Option<Value>,
        expects_response: bool,
        completer: Option<oneshot::Sender<ResponseOutcome<Value>>>,
        options: RequestOptions,
    },
    CancelSeq {
        seq: Seq,
    },
    CancelForResource {
        path: String,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// Handle to a running server actor. Cloning is cheap; every clone feeds
/// the same queue.
#[derive(Clone)]
pub struct ServerHandle {
    kind: ServerKind,
    ops: mpsc::UnboundedSender<Op>,
}

impl ServerHandle {
    pub fn kind(&self) -> ServerKind {
        self.kind
    }

    /// Queue a request expecting a completion signal. Resolves `NoServer`
    /// immediately if the actor is gone.
    pub async fn request(
        &self,
        command: &str,
        arguments: Option<Value>,
        options: RequestOptions,
    ) -> ResponseOutcome<Value> {
        let (completer, receiver) = oneshot::channel();
        let op = Op::Enqueue {
            command: command.to_string(),
            arguments,
            expects_response: true,
            completer: Some(completer),
            options,
        };
        if self.ops.send(op).is_err() {
            return ResponseOutcome::NoServer;
        }
        match receiver.await {
            Ok(outcome) => outcome,
            // Actor dropped the completer while tearing down.
            Err(_) => ResponseOutcome::Cancelled("server disposed".into()),
        }
    }

    /// Fire-and-forget; used for fence commands with no reply.
    pub fn notify(&self, command: &str, arguments: Option<Value>) -> bool {
        self.ops
            .send(Op::Enqueue {
                command: command.to_string(),
                arguments,
                expects_response: false,
                completer: None,
                options: RequestOptions::default(),
            })
            .is_ok()
    }

    /// Cancel every inflight or queued request scoped to `path`.
    pub fn cancel_for_resource(&self, path: &str) {
        let _ = self.ops.send(Op::CancelForResource {
            path: path.to_string(),
        });
    }

    /// Dispose the actor: cancel everything pending, terminate the child.
    pub async fn shutdown(&self) {
        let (done, wait) = oneshot::channel();
        if self.ops.send(Op::Shutdown { done }).is_ok() {
            let _ = wait.await;
        }
    }

    pub fn is_alive(&self) -> bool {
        !self.ops.is_closed()
    }
}

/// Spawn the actor for a freshly forked server. Events (diagnostics pushes,
/// project-loading notices) are forwarded to `events` in arrival order.
pub fn spawn_actor(
    server: SpawnedServer,
    events: mpsc::UnboundedSender<ServerEvent>,
) -> (ServerHandle, tokio::task::JoinHandle<ExitReason>) {
    let (ops_tx, ops_rx) = mpsc::unbounded_channel();
    let handle = ServerHandle {
        kind: server.kind,
        ops: ops_tx.clone(),
    };
    let actor = ServerActor {
        kind: server.kind,
        child: Some(server.child),
        sink: server.sink,
        stream: server.stream,
        ops_rx,
        ops_tx,
        queue: RequestQueue::default(),
        callbacks: CallbackMap::default(),
        outstanding: None,
        next_seq: 0,
        canceller: Some(server.canceller),
        cancelled: HashSet::new(),
        events,
    };
    (handle, tokio::spawn(actor.run()))
}

/// An event as pushed by one of the server processes.
#[derive(Debug, Clone)]
pub struct ServerEvent {
    pub server: ServerKind,
    pub event: Event,
}

pub(crate) struct ServerActor {
    kind: ServerKind,
    child: Option<Child>,
    sink: MessageSink,
    stream: MessageStream,
    ops_rx: mpsc::UnboundedReceiver<Op>,
    ops_tx: mpsc::UnboundedSender<Op>,
    queue: RequestQueue,
    callbacks: CallbackMap,
    /// The sync request whose response gates further dispatch.
    outstanding: Option<Seq>,
    next_seq: Seq,
    canceller: Option<PipeCanceller>,
    cancelled: HashSet<Seq>,
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl ServerActor {
    async fn run(mut self) -> ExitReason {
        let reason = self.event_loop().await;
        match &reason {
            ExitReason::Shutdown => {}
            ExitReason::ProcessExited => {
                info!(server = self.kind.label(), "tsserver transport closed")
            }
            ExitReason::Protocol(err) => {
                error!(server = self.kind.label(), %err, "tsserver protocol failure")
            }
            ExitReason::FatalError(message) => {
                error!(server = self.kind.label(), %message, "fatal tsserver error")
            }
        }
        self.flush_pending("server exited");
        if let Some(child) = self.child.take() {
            process::terminate(child).await;
        }
        reason
    }

    async fn event_loop(&mut self) -> ExitReason {
        loop {
            if let Err(reason) = self.pump().await {
                return reason;
            }
            tokio::select! {
                op = self.ops_rx.recv() => {
                    match op {
                        Some(Op::Enqueue { command, arguments, expects_response, completer, options }) => {
                            self.enqueue(command, arguments, expects_response, completer, options);
                        }
                        Some(Op::CancelSeq { seq }) => self.cancel_seq(seq),
                        Some(Op::CancelForResource { path }) => self.cancel_for_resource(&path),
                        Some(Op::Shutdown { done }) => {
                            self.drain_for_shutdown().await;
                            let _ = done.send(());
                            return ExitReason::Shutdown;
                        }
                        // Every handle dropped; dispose.
                        None => return ExitReason::Shutdown,
                    }
                }
                frame = self.stream.next() => {
                    match frame {
                        Some(Ok(message)) => {
                            if let Some(reason) = self.handle_inbound(message) {
                                return reason;
                            }
                        }
                        Some(Err(err)) => return ExitReason::Protocol(err),
                        None => return ExitReason::ProcessExited,
                    }
                }
            }
        }
    }

    fn enqueue(
        &mut self,
        command: String,
        arguments: Option<Value>,
        expects_response: bool,
        completer: Option<oneshot::Sender<ResponseOutcome<Value>>>,
        options: RequestOptions,
    ) {
        self.next_seq += 1;
        let seq = self.next_seq;
        let class = if command::is_fence(&command) {
            QueueingClass::Fence
        } else if options.low_priority {
            QueueingClass::LowPriority
        } else {
            QueueingClass::Normal
        };
        let is_async = command::is_async(&command);

        let settled = options.token.as_ref().map(|token| {
            let token = token.clone();
            let ops = self.ops_tx.clone();
            let (settled_tx, mut settled_rx) = oneshot::channel::<()>();
            tokio::spawn(async move {
                tokio::select! {
                    _ = token.cancelled() => {
                        let _ = ops.send(Op::CancelSeq { seq });
                    }
                    // The request settled; the sender side was dropped.
                    _ = &mut settled_rx => {}
                }
            });
            settled_tx
        });

        self.queue.push(QueuedRequest {
            request: Request::new(seq, command, arguments),
            class,
            expects_response,
            is_async,
            enqueue_time: Instant::now(),
            completer,
            cancel_on_resource: options.cancel_on_resource_change,
            non_recoverable: options.non_recoverable,
            settled,
        });
    }

    /// Dispatch while the gate is open and something is admissible.
    async fn pump(&mut self) -> Result<(), ExitReason> {
        while self.outstanding.is_none() {
            let Some(item) = self.queue.pop() else { break };
            let seq = item.request.seq;
            debug!(
                server = self.kind.label(),
                seq,
                command = %item.request.command,
                "dispatching"
            );
            if item.expects_response {
                let entry = InflightEntry {
                    command: item.request.command.clone(),
                    enqueue_time: item.enqueue_time,
                    completer: item
                        .completer
                        .expect("request expecting a response carries a completer"),
                    cancel_on_resource: item.cancel_on_resource,
                    non_recoverable: item.non_recoverable,
                    settled: item.settled,
                };
                if item.is_async {
                    self.callbacks.insert(seq, entry, true);
                } else {
                    self.callbacks.insert(seq, entry, false);
                    self.outstanding = Some(seq);
                }
            }
            if let Err(err) = self.sink.send(Message::Request(item.request)).await {
                return Err(ExitReason::Protocol(err));
            }
        }
        Ok(())
    }

    fn handle_inbound(&mut self, message: Message) -> Option<ExitReason> {
        match message {
            Message::Response(response) => self.handle_response(response),
            Message::Event(event) => self.handle_event(event),
            Message::Request(request) => {
                debug!(command = %request.command, "ignoring server-initiated request");
                None
            }
        }
    }

    fn handle_response(&mut self, response: Response) -> Option<ExitReason> {
        let seq = response.request_seq;
        if self.outstanding == Some(seq) {
            self.outstanding = None;
        }
        let Some(entry) = self.callbacks.take_sync(seq) else {
            if self.cancelled.remove(&seq) {
                return None;
            }
            // Advisory response for an async request; the events carry the
            // real payload.
            debug_assert!(
                response.command == "geterr"
                    || response.command == "geterrForProject"
                    || !response.success,
                "response for unknown seq {seq} ({})",
                response.command
            );
            debug!(seq, command = %response.command, "dropping uncorrelated response");
            return None;
        };

        let was_cancelled = self.cancelled.remove(&seq);
        let outcome = if was_cancelled {
            ResponseOutcome::Cancelled("request cancelled".into())
        } else if response.success {
            match response.body {
                Some(body) => ResponseOutcome::Response(body),
                None => ResponseOutcome::NoContent,
            }
        } else {
            let message = response
                .message
                .unwrap_or_else(|| "tsserver reported an unspecified failure".into());
            if entry.non_recoverable {
                entry.complete(ResponseOutcome::ServerError(message.clone()));
                return Some(ExitReason::FatalError(message));
            }
            ResponseOutcome::ServerError(message)
        };
        entry.complete(outcome);
        None
    }

    fn handle_event(&mut self, event: Event) -> Option<ExitReason> {
        if event.event == tsbridge_protocol::message::event_names::REQUEST_COMPLETED {
            let completed = event
                .body
                .clone()
                .and_then(|body| serde_json::from_value::<RequestCompletedEventBody>(body).ok());
            if let Some(completed) = completed {
                self.cancelled.remove(&completed.request_seq);
                if let Some(entry) = self.callbacks.take_async(completed.request_seq) {
                    entry.complete(ResponseOutcome::NoContent);
                }
            }
            return None;
        }
        // Forward in arrival order; the session interprets what it knows
        // and drops the rest.
        let _ = self.events.send(ServerEvent {
            server: self.kind,
            event,
        });
        None
    }

    fn cancel_seq(&mut self, seq: Seq) {
        // Still queued: complete locally, nothing was sent.
        if let Some(item) = self.queue.remove_seq(seq) {
            if let Some(completer) = item.completer {
                let _ = completer.send(ResponseOutcome::Cancelled("request cancelled".into()));
            }
            return;
        }
        // Async inflight: complete now; a late requestCompleted is ignored.
        if let Some(entry) = self.callbacks.take_async(seq) {
            self.write_cancellation(seq);
            self.cancelled.insert(seq);
            entry.complete(ResponseOutcome::Cancelled("request cancelled".into()));
            return;
        }
        // Sync inflight: ask the server; the eventual response (error or
        // tolerated success) converts to Cancelled in handle_response.
        if self.callbacks.contains_sync(seq) {
            self.write_cancellation(seq);
            self.cancelled.insert(seq);
        }
    }

    fn cancel_for_resource(&mut self, path: &str) {
        for item in self.queue.remove_for_resource(path) {
            if let Some(completer) = item.completer {
                let _ = completer.send(ResponseOutcome::Cancelled(format!(
                    "{path} changed before the request ran"
                )));
            }
        }
        for seq in self.callbacks.seqs_for_resource(path) {
            self.write_cancellation(seq);
            self.cancelled.insert(seq);
            if let Some(entry) = self.callbacks.take_async(seq) {
                entry.complete(ResponseOutcome::Cancelled(format!("{path} changed")));
            }
        }
    }

    fn write_cancellation(&self, seq: Seq) {
        if let Some(canceller) = &self.canceller {
            if let Err(err) = canceller.request_cancellation(seq) {
                warn!(seq, %err, "failed to write cancellation pipe");
            }
        }
    }

    /// Give the outstanding sync response a brief chance to land, then
    /// cancel the rest.
    async fn drain_for_shutdown(&mut self) {
        let deadline = Duration::from_millis(200);
        while self.outstanding.is_some() {
            match tokio::time::timeout(deadline, self.stream.next()).await {
                Ok(Some(Ok(message))) => {
                    if self.handle_inbound(message).is_some() {
                        break;
                    }
                }
                _ => break,
            }
        }
        self.flush_pending("server disposed");
    }

    fn flush_pending(&mut self, reason: &str) {
        for item in self.queue.drain() {
            if let Some(completer) = item.completer {
                let _ = completer.send(ResponseOutcome::Cancelled(reason.to_string()));
            }
        }
        self.callbacks.cancel_all(reason);
        self.outstanding = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;
    use tokio_util::codec::{FramedRead, FramedWrite};
    use tsbridge_protocol::StdioCodec;

    /// A scripted fake tsserver on an in-memory duplex pipe.
    struct FakeServer {
        reader: tokio::io::ReadHalf<tokio::io::DuplexStream>,
        writer: tokio::io::WriteHalf<tokio::io::DuplexStream>,
        decode_buf: BytesMut,
        next_seq: Seq,
    }

    impl FakeServer {
        fn start() -> (ServerHandle, FakeServer, mpsc::UnboundedReceiver<ServerEvent>) {
            let (ours, theirs) = tokio::io::duplex(64 * 1024);
            let (our_read, our_write) = tokio::io::split(ours);
            let (their_read, their_write) = tokio::io::split(theirs);

            let sink: MessageSink = Box::pin(FramedWrite::new(their_write, StdioCodec::new()));
            let stream: MessageStream = Box::pin(FramedRead::new(their_read, StdioCodec::new()));
            let (events_tx, events_rx) = mpsc::unbounded_channel();

            let (ops_tx, ops_rx) = mpsc::unbounded_channel();
            let handle = ServerHandle {
                kind: ServerKind::Semantic,
                ops: ops_tx.clone(),
            };
            let actor = ServerActor {
                kind: ServerKind::Semantic,
                child: None,
                sink,
                stream,
                ops_rx,
                ops_tx,
                queue: RequestQueue::default(),
                callbacks: CallbackMap::default(),
                outstanding: None,
                next_seq: 0,
                canceller: None,
                cancelled: HashSet::new(),
                events: events_tx,
            };
            tokio::spawn(actor.run());

            (
                handle,
                FakeServer {
                    reader: our_read,
                    writer: our_write,
                    decode_buf: BytesMut::new(),
                    next_seq: 1000,
                },
                events_rx,
            )
        }

        /// Read the next request the adapter wrote. The adapter writes
        /// newline-delimited JSON.
        async fn recv_request(&mut self) -> Request {
            use tokio::io::AsyncReadExt;
            loop {
                if let Some(pos) = self.decode_buf.iter().position(|&b| b == b'\n') {
                    let line = self.decode_buf.split_to(pos + 1);
                    let trimmed: &[u8] = &line[..line.len() - 2]; // \r\n
                    let message: Message = serde_json::from_slice(trimmed).unwrap();
                    match message {
                        Message::Request(request) => return request,
                        other => panic!("expected request, got {other:?}"),
                    }
                }
                let mut chunk = [0u8; 1024];
                let n = self.reader.read(&mut chunk).await.unwrap();
                assert!(n > 0, "adapter closed its write side");
                self.decode_buf.extend_from_slice(&chunk[..n]);
            }
        }

        /// Write a framed message the way tsserver emits them.
        async fn send(&mut self, message: Message) {
            use tokio::io::AsyncWriteExt;
            let body = serde_json::to_string(&message).unwrap();
            let frame = format!("Content-Length: {}\r\n\r\n{}", body.len(), body);
            self.writer.write_all(frame.as_bytes()).await.unwrap();
        }

        async fn respond(&mut self, request: &Request, body: Option<Value>) {
            self.next_seq += 1;
            self.send(Message::Response(Response {
                seq: self.next_seq,
                request_seq: request.seq,
                command: request.command.clone(),
                success: true,
                body,
                message: None,
            }))
            .await;
        }

        async fn respond_error(&mut self, request: &Request, message: &str) {
            self.next_seq += 1;
            self.send(Message::Response(Response {
                seq: self.next_seq,
                request_seq: request.seq,
                command: request.command.clone(),
                success: false,
                body: None,
                message: Some(message.to_string()),
            }))
            .await;
        }

        async fn complete_async(&mut self, request_seq: Seq) {
            self.send(Message::Event(Event {
                event: "requestCompleted".into(),
                body: Some(serde_json::json!({ "request_seq": request_seq })),
            }))
            .await;
        }
    }

    #[tokio::test]
    async fn test_request_response_round_trip() {
        let (handle, mut fake, _events) = FakeServer::start();

        let pending = tokio::spawn({
            let handle = handle.clone();
            async move {
                handle
                    .request("quickinfo", Some(serde_json::json!({"file": "/p/a.ts"})), RequestOptions::default())
                    .await
            }
        });

        let request = fake.recv_request().await;
        assert_eq!(request.command, "quickinfo");
        fake.respond(&request, Some(serde_json::json!({"kind": "const"})))
            .await;

        let outcome = pending.await.unwrap();
        assert_eq!(
            outcome,
            ResponseOutcome::Response(serde_json::json!({"kind": "const"}))
        );
    }

    #[tokio::test]
    async fn test_success_without_body_is_no_content() {
        let (handle, mut fake, _events) = FakeServer::start();
        let pending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.request("configure", None, RequestOptions::default()).await }
        });
        let request = fake.recv_request().await;
        fake.respond(&request, None).await;
        assert_eq!(pending.await.unwrap(), ResponseOutcome::NoContent);
    }

    #[tokio::test]
    async fn test_server_error_surfaces_message() {
        let (handle, mut fake, _events) = FakeServer::start();
        let pending = tokio::spawn({
            let handle = handle.clone();
            async move { handle.request("rename", None, RequestOptions::default()).await }
        });
        let request = fake.recv_request().await;
        fake.respond_error(&request, "Could not find source file").await;
        assert_eq!(
            pending.await.unwrap(),
            ResponseOutcome::ServerError("Could not find source file".into())
        );
    }

    #[tokio::test]
    async fn test_one_sync_response_outstanding_at_a_time() {
        let (handle, mut fake, _events) = FakeServer::start();

        let first = tokio::spawn({
            let handle = handle.clone();
            async move { handle.request("references", None, RequestOptions::default()).await }
        });
        let second = tokio::spawn({
            let handle = handle.clone();
            async move { handle.request("quickinfo", None, RequestOptions::default()).await }
        });

        let request_a = fake.recv_request().await;
        // The second request must not have been written yet.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(fake.decode_buf.iter().all(|&b| b != b'\n'));

        fake.respond(&request_a, Some(serde_json::json!([]))).await;
        let request_b = fake.recv_request().await;
        fake.respond(&request_b, Some(serde_json::json!({}))).await;

        assert!(matches!(first.await.unwrap(), ResponseOutcome::Response(_)));
        assert!(matches!(second.await.unwrap(), ResponseOutcome::Response(_)));
    }

    #[tokio::test]
    async fn test_notifications_do_not_gate_dispatch() {
        let (handle, mut fake, _events) = FakeServer::start();
        assert!(handle.notify("open", Some(serde_json::json!({"file": "/p/a.ts"}))));
        assert!(handle.notify("change", Some(serde_json::json!({"file": "/p/a.ts"}))));

        let first = fake.recv_request().await;
        let second = fake.recv_request().await;
        assert_eq!(first.command, "open");
        assert_eq!(second.command, "change");
        assert!(first.seq < second.seq);
    }

    #[tokio::test]
    async fn test_async_request_completes_on_request_completed() {
        let (handle, mut fake, _events) = FakeServer::start();

        let geterr = tokio::spawn({
            let handle = handle.clone();
            async move {
                handle
                    .request(
                        "geterr",
                        Some(serde_json::json!({"files": ["/p/a.ts"], "delay": 0})),
                        RequestOptions::default(),
                    )
                    .await
            }
        });
        let request = fake.recv_request().await;
        assert_eq!(request.command, "geterr");

        // The gate is open while geterr runs: a sync request goes through.
        let hover = tokio::spawn({
            let handle = handle.clone();
            async move { handle.request("quickinfo", None, RequestOptions::default()).await }
        });
        let hover_request = fake.recv_request().await;
        fake.respond(&hover_request, Some(serde_json::json!({}))).await;
        assert!(matches!(hover.await.unwrap(), ResponseOutcome::Response(_)));

        fake.complete_async(request.seq).await;
        assert_eq!(geterr.await.unwrap(), ResponseOutcome::NoContent);
    }

    #[tokio::test]
    async fn test_token_cancels_queued_request_locally() {
        let (handle, mut fake, _events) = FakeServer::start();

        // Occupy the gate.
        let blocker = tokio::spawn({
            let handle = handle.clone();
            async move { handle.request("references", None, RequestOptions::default()).await }
        });
        let blocker_request = fake.recv_request().await;

        let token = CancellationToken::new();
        let queued = tokio::spawn({
            let handle = handle.clone();
            let options = RequestOptions {
                token: Some(token.clone()),
                ..Default::default()
            };
            async move { handle.request("quickinfo", None, options).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();

        let outcome = queued.await.unwrap();
        assert!(outcome.is_cancelled());

        fake.respond(&blocker_request, Some(serde_json::json!([]))).await;
        assert!(matches!(blocker.await.unwrap(), ResponseOutcome::Response(_)));
    }

    #[tokio::test]
    async fn test_resource_scoped_cancellation() {
        let (handle, mut fake, _events) = FakeServer::start();

        let scoped = tokio::spawn({
            let handle = handle.clone();
            let options = RequestOptions {
                cancel_on_resource_change: Some("/p/a.ts".into()),
                ..Default::default()
            };
            async move { handle.request("geterr", None, options).await }
        });
        let request = fake.recv_request().await;
        assert_eq!(request.command, "geterr");

        handle.cancel_for_resource("/p/a.ts");
        let outcome = scoped.await.unwrap();
        assert!(outcome.is_cancelled());
    }

    #[tokio::test]
    async fn test_shutdown_flushes_every_pending_request() {
        let (handle, mut fake, _events) = FakeServer::start();

        let inflight = tokio::spawn({
            let handle = handle.clone();
            async move { handle.request("references", None, RequestOptions::default()).await }
        });
        let _request = fake.recv_request().await;

        let queued = tokio::spawn({
            let handle = handle.clone();
            async move { handle.request("quickinfo", None, RequestOptions::default()).await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        handle.shutdown().await;

        assert!(inflight.await.unwrap().is_cancelled());
        assert!(queued.await.unwrap().is_cancelled());
        assert!(!handle.is_alive() || handle.request("quickinfo", None, RequestOptions::default()).await == ResponseOutcome::NoServer);
    }

    #[tokio::test]
    async fn test_diagnostic_events_forwarded_in_order() {
        let (_handle, mut fake, mut events) = FakeServer::start();

        for name in ["syntaxDiag", "semanticDiag", "suggestionDiag"] {
            fake.send(Message::Event(Event {
                event: name.into(),
                body: Some(serde_json::json!({"file": "/p/a.ts", "diagnostics": []})),
            }))
            .await;
        }

        for name in ["syntaxDiag", "semanticDiag", "suggestionDiag"] {
            let event = events.recv().await.unwrap();
            assert_eq!(event.event.event, name);
        }
    }
}
