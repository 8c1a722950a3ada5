//! Same-runtime adapter: dispatcher runs as a task next to the proxy.
//!
//! Typed messages cross plain tokio channels with no serialization.
//! Useful for tests and for embedding the service in-process while
//! keeping the exact protocol a remote worker would see.

use tokio::sync::mpsc;

use crate::config::WorkerConfig;
use qlink_core::{Dispatcher, Proxy, ProxyChannel, Service, WorkerContext};
use qlink_types::{ClientMessage, ErrorCodecs, ServiceDescriptor};

/// Spawn a dispatcher task for the service and connect a proxy to it.
///
/// `make_service` receives the worker's [`WorkerContext`] so the
/// service can publish ambient log/telemetry and service events. The
/// init handshake is the first message on the channel, carrying
/// `config.log_level`. Must be called from within a tokio runtime.
///
/// Terminating the proxy aborts the dispatcher task.
pub fn connect_local<S, F>(
    make_service: F,
    descriptor: ServiceDescriptor,
    codecs: ErrorCodecs,
    config: &WorkerConfig,
) -> Proxy
where
    S: Service,
    F: FnOnce(WorkerContext) -> S,
{
    let (to_worker_tx, to_worker_rx) = mpsc::unbounded_channel();
    let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();

    let context = WorkerContext::new();
    let service = make_service(context.clone());
    let dispatcher = Dispatcher::new(
        service,
        descriptor.clone(),
        codecs.clone(),
        context,
        to_client_tx,
    );
    let worker = tokio::spawn(dispatcher.run(to_worker_rx));

    // Queued ahead of any request the proxy will send.
    let _ = to_worker_tx.send(ClientMessage::Init {
        log_level: config.log_level,
    });

    Proxy::connect(
        descriptor,
        codecs,
        ProxyChannel {
            to_worker: to_worker_tx,
            from_worker: to_client_rx,
            teardown: Box::new(move || worker.abort()),
        },
    )
}
