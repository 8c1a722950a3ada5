//! Caller-side proxy: FIFO single-flight request queue and busy/idle
//! state machine.
//!
//! All mutable state lives in a task owned by the proxy; the [`Proxy`]
//! handle submits commands over a channel and resolves callers through
//! oneshot replies. Exactly one request envelope is ever outstanding:
//! the next queued item is dispatched only after the current response
//! is consumed. This trades throughput for correctness — the wrapped
//! service is not assumed reentrant.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};

use crate::cancellation::CancellationToken;
use crate::events::{EventBus, ListenerId};
use qlink_types::{
    CallError, ClientMessage, CommonEvent, ErrorCodecs, MethodKind, Outcome, RequestEnvelope,
    RequestId, ServiceDescriptor, ServiceEvent, WorkerMessage,
};

/// Whether the channel is serving a long-running request.
///
/// `Busy` is entered when a `RequestWithProgress` item is dequeued and
/// sent; it persists until the queue fully drains, even across plain
/// requests queued behind the long-running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Idle,
    Busy,
}

/// Transport half handed to [`Proxy::connect`].
///
/// The proxy assumes nothing about delivery except in-order,
/// exactly-once per channel.
pub struct ProxyChannel {
    pub to_worker: mpsc::UnboundedSender<ClientMessage>,
    pub from_worker: mpsc::UnboundedReceiver<WorkerMessage>,
    /// Channel-specific teardown (kill worker, close channel). Invoked
    /// exactly once, on termination.
    pub teardown: Box<dyn FnOnce() + Send>,
}

type CallReply = oneshot::Sender<Result<Value, CallError>>;

/// Queue entry: created on façade call, destroyed exactly once by a
/// matching response, cancellation while still queued, or termination.
struct PendingRequest {
    method: String,
    args: Vec<Value>,
    kind: MethodKind,
    sink: Option<Arc<EventBus<ServiceEvent>>>,
    token: Option<CancellationToken>,
    reply: CallReply,
}

struct InFlight {
    id: RequestId,
    method: String,
    sink: Option<Arc<EventBus<ServiceEvent>>>,
    reply: CallReply,
}

enum Command {
    Call(PendingRequest),
    Terminate { ack: oneshot::Sender<()> },
}

/// A submitted call. Resolves when the matching response is consumed,
/// or with [`CallError`] on cancellation/termination.
pub struct PendingCall {
    rx: oneshot::Receiver<Result<Value, CallError>>,
}

impl Future for PendingCall {
    type Output = Result<Value, CallError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The proxy task dropped the reply without resolving it;
            // only termination does that.
            Poll::Ready(Err(_)) => Poll::Ready(Err(CallError::Terminated)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Strongly-typed façade handle. Cheap to clone; all clones share one
/// queue and one channel.
#[derive(Clone)]
pub struct Proxy {
    descriptor: ServiceDescriptor,
    cmd_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<ServiceState>,
    state_listeners: Arc<EventBus<ServiceState>>,
    events: Arc<EventBus<ServiceEvent>>,
    common_events: Arc<EventBus<CommonEvent>>,
}

impl Proxy {
    /// Connect a proxy over an established channel and spawn its task.
    ///
    /// `descriptor` and `codecs` must match the dispatcher's — this is
    /// a cross-process contract, not checked at runtime.
    #[must_use]
    pub fn connect(
        descriptor: ServiceDescriptor,
        codecs: ErrorCodecs,
        channel: ProxyChannel,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ServiceState::Idle);
        let state_listeners = Arc::new(EventBus::new());
        let events = Arc::new(EventBus::new());
        let common_events = Arc::new(EventBus::new());

        let task = ProxyTask {
            codecs,
            queue: VecDeque::new(),
            current: None,
            next_id: 0,
            to_worker: channel.to_worker,
            from_worker: channel.from_worker,
            teardown: Some(channel.teardown),
            cmd_rx,
            state_tx,
            state_listeners: state_listeners.clone(),
            events: events.clone(),
            common_events: common_events.clone(),
        };
        tokio::spawn(task.run());

        Self {
            descriptor,
            cmd_tx,
            state_rx,
            state_listeners,
            events,
            common_events,
        }
    }

    /// Submit a plain request.
    ///
    /// Submission is eager: the request is queued before this returns,
    /// so back-to-back calls keep their issue order even if the
    /// returned futures are awaited later (or never).
    pub fn request(&self, method: &str, args: Vec<Value>) -> PendingCall {
        self.submit(method, args, None, None)
    }

    /// Submit a plain request carrying a cancellation token.
    ///
    /// The token is only consulted while the request is still queued;
    /// once the envelope is sent there is no cancel-in-flight.
    pub fn request_with_token(
        &self,
        method: &str,
        args: Vec<Value>,
        token: CancellationToken,
    ) -> PendingCall {
        self.submit(method, args, None, Some(token))
    }

    /// Submit a long-running request with a per-call progress sink.
    ///
    /// The sink never crosses the channel; while this request is in
    /// flight, incoming events are forwarded to it in addition to the
    /// global listener set.
    pub fn request_with_progress(
        &self,
        method: &str,
        args: Vec<Value>,
        sink: Arc<EventBus<ServiceEvent>>,
        token: Option<CancellationToken>,
    ) -> PendingCall {
        self.submit(method, args, Some(sink), token)
    }

    fn submit(
        &self,
        method: &str,
        args: Vec<Value>,
        sink: Option<Arc<EventBus<ServiceEvent>>>,
        token: Option<CancellationToken>,
    ) -> PendingCall {
        let (reply, rx) = oneshot::channel();
        match self.descriptor.kind(method) {
            None => {
                let _ = reply.send(Err(CallError::Protocol(format!(
                    "method '{method}' is not in the service descriptor"
                ))));
            }
            Some(kind) if !kind.crosses_channel() => {
                let _ = reply.send(Err(CallError::Protocol(format!(
                    "method '{method}' is a listener registration, not a request"
                ))));
            }
            Some(kind) => {
                let pending = PendingRequest {
                    method: method.to_string(),
                    args,
                    kind,
                    sink,
                    token,
                    reply,
                };
                if let Err(mpsc::error::SendError(command)) =
                    self.cmd_tx.send(Command::Call(pending))
                {
                    // Task gone: the proxy was terminated.
                    if let Command::Call(pending) = command {
                        let _ = pending.reply.send(Err(CallError::Terminated));
                    }
                }
            }
        }
        PendingCall { rx }
    }

    /// Current state. `Idle` unless a long-running request started and
    /// the queue has not drained since.
    #[must_use]
    pub fn state(&self) -> ServiceState {
        *self.state_rx.borrow()
    }

    /// Listen for state transitions. Fired once per change, never for
    /// repeats of the same state.
    pub fn on_state_change(
        &self,
        listener: impl Fn(&ServiceState) + Send + Sync + 'static,
    ) -> ListenerId {
        self.state_listeners.add_listener(listener)
    }

    pub fn remove_state_listener(&self, id: ListenerId) -> bool {
        self.state_listeners.remove_listener(id)
    }

    /// Register a global listener for declared service events. Local
    /// only — never crosses the channel as a request.
    pub fn add_event_listener(
        &self,
        listener: impl Fn(&ServiceEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.events.add_listener(listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    /// Register a listener for ambient log/telemetry events.
    pub fn add_common_event_listener(
        &self,
        listener: impl Fn(&CommonEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.common_events.add_listener(listener)
    }

    pub fn remove_common_event_listener(&self, id: ListenerId) -> bool {
        self.common_events.remove_listener(id)
    }

    /// Shut down: rejects the in-flight request, then every queued
    /// request in FIFO order, all with `Terminated`, then runs the
    /// channel teardown. Requests submitted afterwards reject with
    /// `Terminated`.
    pub async fn terminate(&self) {
        let (ack, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Terminate { ack }).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Task-owned state. Single-threaded cooperative; no locks anywhere —
/// the queue discipline alone enforces single-flight.
struct ProxyTask {
    codecs: ErrorCodecs,
    queue: VecDeque<PendingRequest>,
    current: Option<InFlight>,
    next_id: RequestId,
    to_worker: mpsc::UnboundedSender<ClientMessage>,
    from_worker: mpsc::UnboundedReceiver<WorkerMessage>,
    teardown: Option<Box<dyn FnOnce() + Send>>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ServiceState>,
    state_listeners: Arc<EventBus<ServiceState>>,
    events: Arc<EventBus<ServiceEvent>>,
    common_events: Arc<EventBus<CommonEvent>>,
}

impl ProxyTask {
    async fn run(mut self) {
        let ack = loop {
            tokio::select! {
                command = self.cmd_rx.recv() => match command {
                    Some(Command::Call(pending)) => {
                        self.queue.push_back(pending);
                        if self.current.is_none() {
                            self.do_next_request();
                        }
                    }
                    Some(Command::Terminate { ack }) => break Some(ack),
                    // Every handle dropped: nothing can submit or
                    // observe anymore, shut the channel down.
                    None => break None,
                },
                message = self.from_worker.recv() => match message {
                    Some(message) => self.on_worker_message(message),
                    None => {
                        tracing::warn!("worker channel closed; terminating proxy");
                        break None;
                    }
                },
            }
        };
        self.shutdown();
        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }

    /// The only place that pops the queue. Called when a new request
    /// makes the queue non-empty and after each response is consumed.
    fn do_next_request(&mut self) {
        while let Some(pending) = self.queue.pop_front() {
            if pending
                .token
                .as_ref()
                .is_some_and(CancellationToken::is_cancellation_requested)
            {
                // Never sent; reject this one and keep draining.
                let _ = pending.reply.send(Err(CallError::Cancelled));
                continue;
            }

            self.next_id += 1;
            let id = self.next_id;
            if pending.kind == MethodKind::RequestWithProgress {
                self.set_state(ServiceState::Busy);
            }
            let envelope = RequestEnvelope {
                id,
                method: pending.method.clone(),
                args: pending.args,
            };
            self.current = Some(InFlight {
                id,
                method: pending.method,
                sink: pending.sink,
                reply: pending.reply,
            });
            if self
                .to_worker
                .send(ClientMessage::Request(envelope))
                .is_err()
            {
                // Worker gone; the closed from_worker half will drive
                // shutdown, which rejects this in-flight entry.
                tracing::warn!("worker channel closed while sending request");
            }
            return;
        }
        // State is recomputed at each drain attempt: idle only when
        // nothing remains.
        self.set_state(ServiceState::Idle);
    }

    fn on_worker_message(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Response(response) => {
                let Some(current) = self.current.take() else {
                    tracing::error!(
                        method = %response.method,
                        "response received with no request in flight; dropping"
                    );
                    return;
                };
                if response.id != current.id {
                    tracing::error!(
                        expected = current.id,
                        received = response.id,
                        method = %current.method,
                        "response id mismatch; dropping message"
                    );
                    self.current = Some(current);
                    return;
                }
                let result = match response.outcome {
                    Outcome::Success(value) => Ok(value),
                    Outcome::Failure(error) => {
                        Err(CallError::Service(self.codecs.decode(&error)))
                    }
                };
                let _ = current.reply.send(result);
                self.do_next_request();
            }
            WorkerMessage::Event(event) => {
                self.events.fire(&event);
                if let Some(current) = &self.current
                    && let Some(sink) = &current.sink
                {
                    sink.fire(&event);
                }
            }
            WorkerMessage::CommonEvent(event) => {
                if let CommonEvent::Log(record) = &event {
                    match record.level {
                        1 => tracing::error!(source = %record.target, "{}", record.message),
                        2 => tracing::warn!(source = %record.target, "{}", record.message),
                        3 => tracing::info!(source = %record.target, "{}", record.message),
                        4 => tracing::debug!(source = %record.target, "{}", record.message),
                        _ => tracing::trace!(source = %record.target, "{}", record.message),
                    }
                }
                self.common_events.fire(&event);
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(current) = self.current.take() {
            let _ = current.reply.send(Err(CallError::Terminated));
        }
        while let Some(pending) = self.queue.pop_front() {
            let _ = pending.reply.send(Err(CallError::Terminated));
        }
        self.set_state(ServiceState::Idle);
        if let Some(teardown) = self.teardown.take() {
            teardown();
        }
    }

    fn set_state(&self, state: ServiceState) {
        let changed = self.state_tx.send_if_modified(|slot| {
            if *slot == state {
                false
            } else {
                *slot = state;
                true
            }
        });
        if changed {
            self.state_listeners.fire(&state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationTokenSource;
    use qlink_types::{Diagnostic, LogRecord, ResponseEnvelope, ServiceError, Severity};
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::task::yield_now;

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new([
            ("check_code", MethodKind::Request),
            ("get_hir", MethodKind::Request),
            ("run", MethodKind::RequestWithProgress),
            ("add_event_listener", MethodKind::AddEventListener),
        ])
    }

    struct TestChannel {
        proxy: Proxy,
        to_worker: mpsc::UnboundedReceiver<ClientMessage>,
        from_worker: mpsc::UnboundedSender<WorkerMessage>,
        teardowns: Arc<AtomicUsize>,
    }

    fn connect() -> TestChannel {
        let (to_worker_tx, to_worker_rx) = mpsc::unbounded_channel();
        let (from_worker_tx, from_worker_rx) = mpsc::unbounded_channel();
        let teardowns = Arc::new(AtomicUsize::new(0));
        let counter = teardowns.clone();
        let proxy = Proxy::connect(
            descriptor(),
            ErrorCodecs::standard(),
            ProxyChannel {
                to_worker: to_worker_tx,
                from_worker: from_worker_rx,
                teardown: Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            },
        );
        TestChannel {
            proxy,
            to_worker: to_worker_rx,
            from_worker: from_worker_tx,
            teardowns,
        }
    }

    /// Let the proxy task drain everything already submitted.
    async fn settle() {
        for _ in 0..20 {
            yield_now().await;
        }
    }

    fn expect_request(message: ClientMessage) -> RequestEnvelope {
        match message {
            ClientMessage::Request(envelope) => envelope,
            ClientMessage::Init { .. } => panic!("unexpected init message"),
        }
    }

    fn respond_ok(channel: &TestChannel, envelope: &RequestEnvelope, value: serde_json::Value) {
        channel
            .from_worker
            .send(WorkerMessage::Response(ResponseEnvelope {
                id: envelope.id,
                method: envelope.method.clone(),
                outcome: Outcome::Success(value),
            }))
            .unwrap();
    }

    #[tokio::test]
    async fn test_request_round_trip() {
        let mut channel = connect();
        let call = channel.proxy.request("check_code", vec![json!("code")]);

        let envelope = expect_request(channel.to_worker.recv().await.unwrap());
        assert_eq!(envelope.method, "check_code");
        assert_eq!(envelope.args, vec![json!("code")]);

        respond_ok(&channel, &envelope, json!([]));
        assert_eq!(call.await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn test_fifo_single_flight() {
        let mut channel = connect();
        let first = channel.proxy.request("check_code", vec![json!("a")]);
        let second = channel.proxy.request("get_hir", vec![json!("b")]);

        let envelope_a = expect_request(channel.to_worker.recv().await.unwrap());
        assert_eq!(envelope_a.method, "check_code");

        // Only one envelope may be outstanding until its response is
        // consumed.
        settle().await;
        assert!(channel.to_worker.try_recv().is_err());

        respond_ok(&channel, &envelope_a, json!("first"));
        let envelope_b = expect_request(channel.to_worker.recv().await.unwrap());
        assert_eq!(envelope_b.method, "get_hir");
        assert!(envelope_b.id > envelope_a.id);

        respond_ok(&channel, &envelope_b, json!("second"));
        assert_eq!(first.await.unwrap(), json!("first"));
        assert_eq!(second.await.unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn test_run_transitions_busy_then_idle() {
        let mut channel = connect();
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let recorder = transitions.clone();
        channel.proxy.on_state_change(move |state| {
            recorder.lock().unwrap().push(*state);
        });

        let call = channel
            .proxy
            .request_with_progress("run", vec![json!({})], Arc::new(EventBus::new()), None);

        let envelope = expect_request(channel.to_worker.recv().await.unwrap());
        // Busy was entered before the envelope was sent.
        assert_eq!(channel.proxy.state(), ServiceState::Busy);

        respond_ok(&channel, &envelope, json!(null));
        call.await.unwrap();

        assert_eq!(
            *transitions.lock().unwrap(),
            vec![ServiceState::Busy, ServiceState::Idle]
        );
        assert_eq!(channel.proxy.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn test_plain_request_stays_idle() {
        let mut channel = connect();
        let transitions = Arc::new(Mutex::new(Vec::new()));
        let recorder = transitions.clone();
        channel.proxy.on_state_change(move |state| {
            recorder.lock().unwrap().push(*state);
        });

        let call = channel.proxy.request("check_code", vec![json!("bad code")]);
        let envelope = expect_request(channel.to_worker.recv().await.unwrap());
        respond_ok(&channel, &envelope, json!([]));
        call.await.unwrap();

        assert!(transitions.lock().unwrap().is_empty());
        assert_eq!(channel.proxy.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn test_queued_request_keeps_state_busy_until_drained() {
        let mut channel = connect();
        let run = channel
            .proxy
            .request_with_progress("run", vec![json!({})], Arc::new(EventBus::new()), None);
        let quick = channel.proxy.request("check_code", vec![json!("c")]);

        let run_envelope = expect_request(channel.to_worker.recv().await.unwrap());
        respond_ok(&channel, &run_envelope, json!(null));
        run.await.unwrap();

        // The long-running call finished, but the queue is not empty.
        assert_eq!(channel.proxy.state(), ServiceState::Busy);

        let quick_envelope = expect_request(channel.to_worker.recv().await.unwrap());
        respond_ok(&channel, &quick_envelope, json!([]));
        quick.await.unwrap();
        assert_eq!(channel.proxy.state(), ServiceState::Idle);
    }

    #[tokio::test]
    async fn test_cancelled_queued_request_is_never_sent() {
        let mut channel = connect();
        let source = CancellationTokenSource::new();
        source.cancel();

        let first = channel.proxy.request("check_code", vec![json!("a")]);
        let second = channel
            .proxy
            .request_with_token("get_hir", vec![json!("b")], source.token());
        let third = channel.proxy.request("check_code", vec![json!("c")]);

        let envelope_a = expect_request(channel.to_worker.recv().await.unwrap());
        respond_ok(&channel, &envelope_a, json!("a"));

        // The drain skips the cancelled entry and sends the third call.
        let envelope_c = expect_request(channel.to_worker.recv().await.unwrap());
        assert_eq!(envelope_c.args, vec![json!("c")]);

        assert_eq!(second.await.unwrap_err(), CallError::Cancelled);
        respond_ok(&channel, &envelope_c, json!("c"));
        first.await.unwrap();
        third.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_has_no_effect_once_sent() {
        let mut channel = connect();
        let source = CancellationTokenSource::new();
        let call =
            channel
                .proxy
                .request_with_token("check_code", vec![json!("a")], source.token());

        let envelope = expect_request(channel.to_worker.recv().await.unwrap());
        source.cancel();
        settle().await;

        respond_ok(&channel, &envelope, json!("done"));
        assert_eq!(call.await.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn test_terminate_drains_everything() {
        let mut channel = connect();
        let in_flight = channel.proxy.request("check_code", vec![json!("a")]);
        let queued_a = channel
            .proxy
            .request_with_progress("run", vec![json!({})], Arc::new(EventBus::new()), None);
        let queued_b = channel.proxy.request("get_hir", vec![json!("b")]);

        // First envelope goes out; the rest stay queued.
        expect_request(channel.to_worker.recv().await.unwrap());

        channel.proxy.terminate().await;
        assert_eq!(in_flight.await.unwrap_err(), CallError::Terminated);
        assert_eq!(queued_a.await.unwrap_err(), CallError::Terminated);
        assert_eq!(queued_b.await.unwrap_err(), CallError::Terminated);
        assert_eq!(channel.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_terminate_is_effectively_idempotent() {
        let channel = connect();
        channel.proxy.terminate().await;
        channel.proxy.terminate().await;
        assert_eq!(channel.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_request_after_terminate_rejects() {
        let channel = connect();
        channel.proxy.terminate().await;

        let call = channel.proxy.request("check_code", vec![json!("late")]);
        assert_eq!(call.await.unwrap_err(), CallError::Terminated);
    }

    #[tokio::test]
    async fn test_worker_channel_close_terminates() {
        let mut channel = connect();
        let call = channel.proxy.request("check_code", vec![json!("a")]);
        expect_request(channel.to_worker.recv().await.unwrap());

        drop(channel.from_worker);
        assert_eq!(call.await.unwrap_err(), CallError::Terminated);
        settle().await;
        assert_eq!(channel.teardowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_events_reach_per_call_sink_only_while_in_flight() {
        let mut channel = connect();
        let sink = Arc::new(EventBus::new());
        let (_, mut sink_rx) = sink.subscribe();
        let global_seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = global_seen.clone();
        channel.proxy.add_event_listener(move |event: &ServiceEvent| {
            recorder.lock().unwrap().push(event.clone());
        });

        let call = channel
            .proxy
            .request_with_progress("run", vec![json!({})], sink.clone(), None);
        let envelope = expect_request(channel.to_worker.recv().await.unwrap());

        channel
            .from_worker
            .send(WorkerMessage::Event(ServiceEvent::Message(
                "during run".to_string(),
            )))
            .unwrap();
        respond_ok(&channel, &envelope, json!(null));
        call.await.unwrap();

        // Ambient event after the run completed: global listeners only.
        channel
            .from_worker
            .send(WorkerMessage::Event(ServiceEvent::Message(
                "ambient".to_string(),
            )))
            .unwrap();
        settle().await;

        assert_eq!(
            sink_rx.try_recv().unwrap(),
            ServiceEvent::Message("during run".to_string())
        );
        assert!(sink_rx.try_recv().is_err(), "stale sink must not see ambient events");
        assert_eq!(
            *global_seen.lock().unwrap(),
            vec![
                ServiceEvent::Message("during run".to_string()),
                ServiceEvent::Message("ambient".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_structured_error_decoded_for_caller() {
        let mut channel = connect();
        let call = channel.proxy.request("check_code", vec![json!("bad code")]);
        let envelope = expect_request(channel.to_worker.recv().await.unwrap());

        let error = ServiceError::Compile {
            diagnostics: vec![Diagnostic {
                severity: Severity::Error,
                message: "syntax error".to_string(),
                start: 0,
                end: 3,
                code: None,
            }],
        };
        channel
            .from_worker
            .send(WorkerMessage::Response(ResponseEnvelope {
                id: envelope.id,
                method: envelope.method,
                outcome: Outcome::Failure(ErrorCodecs::standard().encode(&error)),
            }))
            .unwrap();

        match call.await.unwrap_err() {
            CallError::Service(ServiceError::Compile { diagnostics }) => {
                assert_eq!(diagnostics[0].message, "syntax error");
            }
            other => panic!("expected compile error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mismatched_response_id_is_dropped() {
        let mut channel = connect();
        let call = channel.proxy.request("check_code", vec![json!("a")]);
        let envelope = expect_request(channel.to_worker.recv().await.unwrap());

        channel
            .from_worker
            .send(WorkerMessage::Response(ResponseEnvelope {
                id: envelope.id + 99,
                method: envelope.method.clone(),
                outcome: Outcome::Success(json!("wrong")),
            }))
            .unwrap();
        settle().await;

        // The real response still resolves the call.
        respond_ok(&channel, &envelope, json!("right"));
        assert_eq!(call.await.unwrap(), json!("right"));
    }

    #[tokio::test]
    async fn test_response_with_no_request_in_flight_is_dropped() {
        let mut channel = connect();
        channel
            .from_worker
            .send(WorkerMessage::Response(ResponseEnvelope {
                id: 1,
                method: "check_code".to_string(),
                outcome: Outcome::Success(json!(null)),
            }))
            .unwrap();
        settle().await;

        // The channel still works afterwards.
        let call = channel.proxy.request("check_code", vec![json!("a")]);
        let envelope = expect_request(channel.to_worker.recv().await.unwrap());
        respond_ok(&channel, &envelope, json!("ok"));
        assert_eq!(call.await.unwrap(), json!("ok"));
    }

    #[tokio::test]
    async fn test_undeclared_method_rejects_without_sending() {
        let mut channel = connect();
        let call = channel.proxy.request("no_such_method", vec![]);
        match call.await.unwrap_err() {
            CallError::Protocol(message) => assert!(message.contains("no_such_method")),
            other => panic!("expected protocol error, got {other:?}"),
        }
        settle().await;
        assert!(channel.to_worker.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_listener_kind_method_rejects_as_request() {
        let channel = connect();
        let call = channel.proxy.request("add_event_listener", vec![]);
        match call.await.unwrap_err() {
            CallError::Protocol(message) => assert!(message.contains("listener")),
            other => panic!("expected protocol error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_common_events_bypass_request_correlation() {
        let mut channel = connect();
        let (_, mut common_rx) = channel.proxy.common_events.subscribe();

        channel
            .from_worker
            .send(WorkerMessage::CommonEvent(CommonEvent::Log(LogRecord {
                level: 2,
                target: "simulator".to_string(),
                message: "deallocating".to_string(),
            })))
            .unwrap();
        settle().await;

        match common_rx.try_recv().unwrap() {
            CommonEvent::Log(record) => assert_eq!(record.message, "deallocating"),
            CommonEvent::TelemetryEvent(_) => panic!("expected log record"),
        }
    }

    #[tokio::test]
    async fn test_remove_event_listener_stops_delivery() {
        let mut channel = connect();
        let seen = Arc::new(Mutex::new(0_usize));
        let counter = seen.clone();
        let id = channel.proxy.add_event_listener(move |_event| {
            *counter.lock().unwrap() += 1;
        });

        channel
            .from_worker
            .send(WorkerMessage::Event(ServiceEvent::Message("one".into())))
            .unwrap();
        settle().await;
        assert!(channel.proxy.remove_event_listener(id));

        channel
            .from_worker
            .send(WorkerMessage::Event(ServiceEvent::Message("two".into())))
            .unwrap();
        settle().await;
        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
