//! Typed compiler client: one method per descriptor entry, argument
//! packing and result decoding in one place.

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::types::{CompletionList, ProgramConfig};
use qlink_core::{
    CancellationToken, EventBus, ListenerId, PendingCall, Proxy, ServiceState,
};
use qlink_types::{CallError, CommonEvent, Diagnostic, MethodKind, ServiceDescriptor, ServiceEvent};

/// The compiler's shared method surface. Both ends of a channel must
/// be built from this descriptor.
#[must_use]
pub fn compiler_descriptor() -> ServiceDescriptor {
    ServiceDescriptor::new([
        ("check_code", MethodKind::Request),
        ("get_completions", MethodKind::Request),
        ("get_hir", MethodKind::Request),
        ("get_qir", MethodKind::Request),
        ("update_document", MethodKind::Request),
        ("close_document", MethodKind::Request),
        ("run", MethodKind::RequestWithProgress),
        ("add_event_listener", MethodKind::AddEventListener),
        ("remove_event_listener", MethodKind::RemoveEventListener),
    ])
}

/// Typed façade over a proxy connected with [`compiler_descriptor`].
#[derive(Clone)]
pub struct CompilerClient {
    proxy: Proxy,
}

impl CompilerClient {
    #[must_use]
    pub fn new(proxy: Proxy) -> Self {
        Self { proxy }
    }

    /// The underlying proxy, for protocol-level access.
    #[must_use]
    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    /// Check a standalone snippet, returning its diagnostics.
    pub async fn check_code(&self, code: &str) -> Result<Vec<Diagnostic>, CallError> {
        let value = self.proxy.request("check_code", vec![json!(code)]).await?;
        decode("check_code", value)
    }

    /// Completions at a byte offset in an open document.
    pub async fn get_completions(
        &self,
        uri: &str,
        offset: u32,
    ) -> Result<CompletionList, CallError> {
        let value = self
            .proxy
            .request("get_completions", vec![json!(uri), json!(offset)])
            .await?;
        decode("get_completions", value)
    }

    /// Render the high-level IR for a snippet.
    pub async fn get_hir(&self, code: &str) -> Result<String, CallError> {
        let value = self.proxy.request("get_hir", vec![json!(code)]).await?;
        decode("get_hir", value)
    }

    /// Lower a program to QIR text.
    pub async fn get_qir(&self, program: &ProgramConfig) -> Result<String, CallError> {
        let value = self
            .proxy
            .request("get_qir", vec![pack("get_qir", program)?])
            .await?;
        decode("get_qir", value)
    }

    /// Publish a new version of a document's text.
    pub async fn update_document(
        &self,
        uri: &str,
        version: u32,
        text: &str,
    ) -> Result<(), CallError> {
        self.proxy
            .request(
                "update_document",
                vec![json!(uri), json!(version), json!(text)],
            )
            .await?;
        Ok(())
    }

    pub async fn close_document(&self, uri: &str) -> Result<(), CallError> {
        self.proxy.request("close_document", vec![json!(uri)]).await?;
        Ok(())
    }

    /// Simulate a program. Submission is eager; the returned call
    /// resolves with the result value once every shot has finished.
    ///
    /// `sink` receives this run's progress events (shot results, state
    /// dumps, messages) as they arrive. `token` cancels the run only
    /// while it is still queued.
    pub fn run(
        &self,
        program: &ProgramConfig,
        shots: u32,
        sink: Arc<EventBus<ServiceEvent>>,
        token: Option<CancellationToken>,
    ) -> Result<PendingCall, CallError> {
        let args = vec![pack("run", program)?, json!(shots)];
        Ok(self.proxy.request_with_progress("run", args, sink, token))
    }

    #[must_use]
    pub fn state(&self) -> ServiceState {
        self.proxy.state()
    }

    pub fn on_state_change(
        &self,
        listener: impl Fn(&ServiceState) + Send + Sync + 'static,
    ) -> ListenerId {
        self.proxy.on_state_change(listener)
    }

    pub fn add_event_listener(
        &self,
        listener: impl Fn(&ServiceEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.proxy.add_event_listener(listener)
    }

    pub fn remove_event_listener(&self, id: ListenerId) -> bool {
        self.proxy.remove_event_listener(id)
    }

    pub fn add_common_event_listener(
        &self,
        listener: impl Fn(&CommonEvent) + Send + Sync + 'static,
    ) -> ListenerId {
        self.proxy.add_common_event_listener(listener)
    }

    pub async fn terminate(&self) {
        self.proxy.terminate().await;
    }
}

pub(crate) fn pack<T: Serialize>(method: &str, value: &T) -> Result<Value, CallError> {
    serde_json::to_value(value)
        .map_err(|error| CallError::Protocol(format!("malformed {method} argument: {error}")))
}

pub(crate) fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T, CallError> {
    serde_json::from_value(value)
        .map_err(|error| CallError::Protocol(format!("malformed {method} result: {error}")))
}
