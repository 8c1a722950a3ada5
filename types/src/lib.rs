//! Wire-level types shared by the proxy and dispatcher halves of qlink.
//!
//! This crate contains pure data with no IO and no async: the envelopes
//! that cross the channel, the method descriptor both halves are
//! constructed against, the structured service errors with their
//! transport codec registry, and the event unions. Everything here can
//! be used from any layer.

mod descriptor;
mod envelope;
mod error;
mod event;

pub use descriptor::{MethodKind, ServiceDescriptor};
pub use envelope::{
    ClientMessage, Outcome, RequestEnvelope, RequestId, ResponseEnvelope, WorkerMessage,
};
pub use error::{CallError, Diagnostic, ErrorCodec, ErrorCodecs, ServiceError, Severity};
pub use event::{CommonEvent, LogRecord, ServiceEvent, TelemetryEvent};
