//! Transport adapters binding a [`Proxy`](qlink_core::Proxy) to its
//! worker-side [`Dispatcher`](qlink_core::Dispatcher).
//!
//! Two adapters ship here: [`connect_local`] runs the dispatcher as a
//! task on the caller's runtime, [`spawn_worker`] moves it onto a
//! dedicated thread behind a serialized JSON wire. Both perform the
//! same init handshake and are interchangeable from the proxy's point
//! of view.

mod config;
mod local;
mod thread;
pub mod wire;

pub use config::WorkerConfig;
pub use local::connect_local;
pub use thread::spawn_worker;
