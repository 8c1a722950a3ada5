//! Worker-side dispatcher: owns the one real service instance and
//! mediates between raw request envelopes and its async methods.
//!
//! Exactly one response envelope is posted per request envelope,
//! regardless of how many events preceded it. Progress events and
//! ambient log/telemetry are forwarded the moment they fire — never
//! batched, never deduplicated.

use tokio::sync::mpsc;

use crate::service::{Service, WorkerContext};
use qlink_types::{
    ClientMessage, ErrorCodecs, MethodKind, Outcome, RequestEnvelope, RequestId, ResponseEnvelope,
    ServiceDescriptor, ServiceError, ServiceEvent, WorkerMessage,
};

pub struct Dispatcher<S: Service> {
    service: S,
    descriptor: ServiceDescriptor,
    codecs: ErrorCodecs,
    /// The context the service was constructed with. Its `events` bus
    /// doubles as the trailing progress sink for `RequestWithProgress`
    /// methods and as the ambient event target.
    context: WorkerContext,
    to_client: mpsc::UnboundedSender<WorkerMessage>,
    ready: bool,
}

impl<S: Service> Dispatcher<S> {
    /// Wrap an already-instantiated service.
    ///
    /// Service construction policy is the channel adapter's concern;
    /// the dispatcher only requires that the service was built from
    /// `context`, so its ambient log/telemetry and service events flow
    /// through the context's buses. Forwarders for both event channels
    /// are subscribed here, once.
    #[must_use]
    pub fn new(
        service: S,
        descriptor: ServiceDescriptor,
        codecs: ErrorCodecs,
        context: WorkerContext,
        to_client: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        let forward = to_client.clone();
        context.events.add_listener(move |event: &ServiceEvent| {
            let _ = forward.send(WorkerMessage::Event(event.clone()));
        });
        let forward = to_client.clone();
        context.log.bus().add_listener(move |event| {
            let _ = forward.send(WorkerMessage::CommonEvent(event.clone()));
        });

        Self {
            service,
            descriptor,
            codecs,
            context,
            to_client,
            ready: false,
        }
    }

    /// Serve incoming messages until the channel closes.
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ClientMessage>) {
        while let Some(message) = rx.recv().await {
            match message {
                ClientMessage::Init { log_level } => {
                    self.context.log.set_level(log_level);
                    self.ready = true;
                    tracing::debug!(log_level, "worker initialized");
                }
                ClientMessage::Request(envelope) => {
                    if self.ready {
                        self.invoke_method(envelope).await;
                    } else {
                        tracing::error!(
                            method = %envelope.method,
                            "request received before init; rejecting"
                        );
                        self.respond(
                            envelope.id,
                            envelope.method,
                            Err(ServiceError::Message(
                                "request received before init".to_string(),
                            )),
                        );
                    }
                }
            }
        }
    }

    /// One envelope in, exactly one response out.
    pub async fn invoke_method(&mut self, envelope: RequestEnvelope) {
        let RequestEnvelope { id, method, args } = envelope;
        let result = match self.descriptor.kind(&method) {
            Some(MethodKind::Request) => self.service.invoke(&method, args, None).await,
            Some(MethodKind::RequestWithProgress) => {
                self.service
                    .invoke(&method, args, Some(self.context.events.clone()))
                    .await
            }
            Some(MethodKind::AddEventListener | MethodKind::RemoveEventListener) | None => {
                Err(ServiceError::Message(format!(
                    "method '{method}' cannot be invoked over the channel"
                )))
            }
        };
        self.respond(id, method, result);
    }

    fn respond(
        &self,
        id: RequestId,
        method: String,
        result: Result<serde_json::Value, ServiceError>,
    ) {
        let outcome = match result {
            Ok(value) => Outcome::Success(value),
            Err(error) => Outcome::Failure(self.codecs.encode(&error)),
        };
        let _ = self
            .to_client
            .send(WorkerMessage::Response(ResponseEnvelope {
                id,
                method,
                outcome,
            }));
    }
}
