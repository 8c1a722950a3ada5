//! The service seam: one dyn-capable trait covering every method the
//! descriptor declares, instead of a hand-written proxy per service.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::events::EventBus;
use crate::logging::LogContext;
use qlink_types::{CommonEvent, ServiceError, ServiceEvent};

/// Boxed future returned by [`Service::invoke`].
pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The object whose async methods the proxy/dispatcher pair relocates
/// across a channel.
///
/// `invoke` receives the method name and positional arguments exactly
/// as they crossed the wire. `progress` is `Some` only when the shared
/// descriptor marks the method `RequestWithProgress`; events fired on
/// it are forwarded to the controlling context immediately.
///
/// Methods take `&mut self`: the dispatcher never runs two invocations
/// concurrently because the proxy never has two requests in flight.
pub trait Service: Send + 'static {
    fn invoke<'a>(
        &'a mut self,
        method: &'a str,
        args: Vec<Value>,
        progress: Option<Arc<EventBus<ServiceEvent>>>,
    ) -> ServiceFuture<'a, Result<Value, ServiceError>>;
}

/// Ambient handles a service is constructed with.
///
/// `log` publishes log/telemetry records; `events` is the worker-side
/// service event target. Events fired on it outside any request reach
/// the proxy's global listeners (diagnostics pushes after a document
/// update, for example) — the same bus is handed to
/// `RequestWithProgress` methods as their progress sink.
#[derive(Clone)]
pub struct WorkerContext {
    pub log: LogContext,
    pub events: Arc<EventBus<ServiceEvent>>,
}

impl WorkerContext {
    #[must_use]
    pub fn new() -> Self {
        Self {
            log: LogContext::new(Arc::new(EventBus::<CommonEvent>::new())),
            events: Arc::new(EventBus::new()),
        }
    }
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self::new()
    }
}
