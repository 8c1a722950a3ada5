//! Dedicated-thread adapter: the service runs on its own OS thread
//! with a single-threaded runtime, behind a serialized string wire.
//!
//! Every message is a JSON frame (see [`crate::wire`]), so the
//! boundary behaves like a real process boundary: only data crosses,
//! and a malformed frame is dropped with an error rather than taking
//! the channel down.

use std::thread;

use anyhow::Context as _;
use tokio::runtime;
use tokio::sync::mpsc;

use crate::config::WorkerConfig;
use crate::wire;
use qlink_core::{Dispatcher, Proxy, ProxyChannel, Service, WorkerContext};
use qlink_types::{ClientMessage, ErrorCodecs, ServiceDescriptor, WorkerMessage};

/// Spawn a worker thread running the service and connect a proxy over
/// a string wire.
///
/// `make_service` is invoked on the worker thread; the service never
/// exists on the caller's side. The init handshake is the first frame
/// on the wire. Must be called from within a tokio runtime.
///
/// Terminating the proxy closes the wire, which winds the worker
/// thread down once its current invocation finishes.
pub fn spawn_worker<S, F>(
    make_service: F,
    descriptor: ServiceDescriptor,
    codecs: ErrorCodecs,
    config: &WorkerConfig,
) -> anyhow::Result<Proxy>
where
    S: Service,
    F: FnOnce(WorkerContext) -> S + Send + 'static,
{
    // proxy -> worker and worker -> proxy, both as JSON frames.
    let (client_wire_tx, client_wire_rx) = mpsc::unbounded_channel::<String>();
    let (worker_wire_tx, worker_wire_rx) = mpsc::unbounded_channel::<String>();

    let worker_descriptor = descriptor.clone();
    let worker_codecs = codecs.clone();
    thread::Builder::new()
        .name(config.thread_name.clone())
        .spawn(move || {
            if let Err(error) =
                worker_main(make_service, worker_descriptor, worker_codecs, client_wire_rx, worker_wire_tx)
            {
                tracing::error!("worker thread failed: {error:#}");
            }
        })
        .context("failed to spawn worker thread")?;

    let init = wire::encode(&ClientMessage::Init {
        log_level: config.log_level,
    })
    .context("failed to encode init handshake")?;
    let _ = client_wire_tx.send(init);

    // Caller-side pumps between typed messages and wire frames.
    let (to_worker_tx, mut to_worker_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let (from_worker_tx, from_worker_rx) = mpsc::unbounded_channel::<WorkerMessage>();

    let wire_tx = client_wire_tx.clone();
    let outbound = tokio::spawn(async move {
        while let Some(message) = to_worker_rx.recv().await {
            match wire::encode(&message) {
                Ok(frame) => {
                    if wire_tx.send(frame).is_err() {
                        break;
                    }
                }
                Err(error) => tracing::error!("dropping unencodable message: {error}"),
            }
        }
    });
    let mut wire_rx = worker_wire_rx;
    let inbound = tokio::spawn(async move {
        while let Some(frame) = wire_rx.recv().await {
            match wire::decode::<WorkerMessage>(&frame) {
                Ok(message) => {
                    if from_worker_tx.send(message).is_err() {
                        break;
                    }
                }
                Err(error) => tracing::error!("dropping malformed frame from worker: {error}"),
            }
        }
    });

    Ok(Proxy::connect(
        descriptor,
        codecs,
        ProxyChannel {
            to_worker: to_worker_tx,
            from_worker: from_worker_rx,
            teardown: Box::new(move || {
                outbound.abort();
                inbound.abort();
                // Dropping the last wire sender closes the worker's
                // inbound channel and lets the thread exit.
                drop(client_wire_tx);
            }),
        },
    ))
}

/// Worker-thread entry point: build a current-thread runtime, decode
/// inbound frames into dispatcher messages, encode everything the
/// dispatcher emits back onto the wire.
fn worker_main<S, F>(
    make_service: F,
    descriptor: ServiceDescriptor,
    codecs: ErrorCodecs,
    mut inbound: mpsc::UnboundedReceiver<String>,
    outbound: mpsc::UnboundedSender<String>,
) -> anyhow::Result<()>
where
    S: Service,
    F: FnOnce(WorkerContext) -> S,
{
    let runtime = runtime::Builder::new_current_thread()
        .build()
        .context("failed to build worker runtime")?;

    runtime.block_on(async move {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<WorkerMessage>();

        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                match wire::decode::<ClientMessage>(&frame) {
                    Ok(message) => {
                        if request_tx.send(message).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::error!("dropping malformed frame from client: {error}");
                    }
                }
            }
        });
        tokio::spawn(async move {
            while let Some(message) = reply_rx.recv().await {
                match wire::encode(&message) {
                    Ok(frame) => {
                        if outbound.send(frame).is_err() {
                            break;
                        }
                    }
                    Err(error) => tracing::error!("dropping unencodable reply: {error}"),
                }
            }
        });

        let context = WorkerContext::new();
        let service = make_service(context.clone());
        Dispatcher::new(service, descriptor, codecs, context, reply_tx)
            .run(request_rx)
            .await;
    });
    Ok(())
}
