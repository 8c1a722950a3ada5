//! Message envelopes exchanged over a proxy/dispatcher channel.
//!
//! Every request carries a monotonic id which its response echoes.
//! The protocol only ever has one request in flight, but the explicit
//! id lets the proxy detect a desynced channel instead of silently
//! mis-attributing a response.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{CommonEvent, ServiceEvent};

/// Monotonic per-channel request identifier.
pub type RequestId = u64;

/// A method invocation, created by the proxy and consumed exactly once
/// by the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub id: RequestId,
    pub method: String,
    pub args: Vec<Value>,
}

/// The termination signal for a request. Exactly one is produced per
/// [`RequestEnvelope`], even when the service fails internally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub id: RequestId,
    pub method: String,
    pub outcome: Outcome,
}

/// Success-or-failure payload of a response.
///
/// Failure values are produced by [`crate::ErrorCodecs::encode`] so
/// that structured errors survive transports that only pass plain data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "kebab-case")]
pub enum Outcome {
    Success(Value),
    Failure(Value),
}

/// Messages flowing proxy → dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Handshake control message. Must arrive before any request.
    Init { log_level: u8 },
    Request(RequestEnvelope),
}

/// Messages flowing dispatcher → proxy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "kebab-case")]
pub enum WorkerMessage {
    Response(ResponseEnvelope),
    Event(ServiceEvent),
    CommonEvent(CommonEvent),
}
