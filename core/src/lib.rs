//! Worker-proxy machinery for relocating an async service behind a
//! message channel.
//!
//! The two halves are symmetric: a [`Proxy`] lives in the controlling
//! context and serializes calls into a strict single-flight FIFO queue;
//! a [`Dispatcher`] lives in the worker context, owns the one real
//! [`Service`] instance, and relays progress events. The transport
//! between them is just a sender/receiver pair — see `qlink-channel`
//! for concrete adapters.

mod cancellation;
mod dispatcher;
mod events;
mod logging;
mod proxy;
mod service;

pub use cancellation::{CancellationToken, CancellationTokenSource};
pub use dispatcher::Dispatcher;
pub use events::{EventBus, ListenerId};
pub use logging::LogContext;
pub use proxy::{PendingCall, Proxy, ProxyChannel, ServiceState};
pub use service::{Service, ServiceFuture, WorkerContext};
