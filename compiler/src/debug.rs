//! Typed debugger client: program loading, stepping, and inspection of
//! the paused program, relocated over the same proxy machinery as the
//! compiler client.

use std::sync::Arc;

use serde_json::json;

use crate::client::{decode, pack};
use crate::types::{BreakpointSpan, ProgramConfig, StackFrame, StepResult, Variable};
use qlink_core::{EventBus, ListenerId, Proxy, ServiceState};
use qlink_types::{CallError, MethodKind, ServiceDescriptor, ServiceEvent};

/// The debugger's shared method surface. Both ends of a channel must
/// be built from this descriptor.
///
/// Stepping calls are long-running: the program emits output events
/// while it executes to the next stop, so they carry a progress sink
/// and flip the service state to `Busy`.
#[must_use]
pub fn debug_descriptor() -> ServiceDescriptor {
    ServiceDescriptor::new([
        ("load_program", MethodKind::Request),
        ("get_stack_frames", MethodKind::Request),
        ("get_breakpoints", MethodKind::Request),
        ("get_locals", MethodKind::Request),
        ("eval_next", MethodKind::RequestWithProgress),
        ("eval_continue", MethodKind::RequestWithProgress),
        ("step_in", MethodKind::RequestWithProgress),
        ("step_out", MethodKind::RequestWithProgress),
        ("add_event_listener", MethodKind::AddEventListener),
        ("remove_event_listener", MethodKind::RemoveEventListener),
    ])
}

/// Typed façade over a proxy connected with [`debug_descriptor`].
///
/// The debugger is stateful: `load_program` must succeed before any
/// stepping or inspection call. The single-flight queue means at most
/// one stepping call executes at a time.
#[derive(Clone)]
pub struct DebugClient {
    proxy: Proxy,
}

impl DebugClient {
    #[must_use]
    pub fn new(proxy: Proxy) -> Self {
        Self { proxy }
    }

    /// The underlying proxy, for protocol-level access.
    #[must_use]
    pub fn proxy(&self) -> &Proxy {
        &self.proxy
    }

    /// Compile and load a program for debugging, optionally overriding
    /// the entry expression. Compile failures reject with the usual
    /// structured diagnostics.
    pub async fn load_program(
        &self,
        program: &ProgramConfig,
        entry: Option<&str>,
    ) -> Result<(), CallError> {
        self.proxy
            .request(
                "load_program",
                vec![pack("load_program", program)?, json!(entry)],
            )
            .await?;
        Ok(())
    }

    /// Step over the current statement.
    pub async fn eval_next(
        &self,
        breakpoints: &[u32],
        sink: Arc<EventBus<ServiceEvent>>,
    ) -> Result<StepResult, CallError> {
        self.eval("eval_next", breakpoints, sink).await
    }

    /// Run until a breakpoint is hit or the program returns.
    pub async fn eval_continue(
        &self,
        breakpoints: &[u32],
        sink: Arc<EventBus<ServiceEvent>>,
    ) -> Result<StepResult, CallError> {
        self.eval("eval_continue", breakpoints, sink).await
    }

    /// Step into the current call.
    pub async fn step_in(
        &self,
        breakpoints: &[u32],
        sink: Arc<EventBus<ServiceEvent>>,
    ) -> Result<StepResult, CallError> {
        self.eval("step_in", breakpoints, sink).await
    }

    /// Step out of the current frame.
    pub async fn step_out(
        &self,
        breakpoints: &[u32],
        sink: Arc<EventBus<ServiceEvent>>,
    ) -> Result<StepResult, CallError> {
        self.eval("step_out", breakpoints, sink).await
    }

    async fn eval(
        &self,
        method: &str,
        breakpoints: &[u32],
        sink: Arc<EventBus<ServiceEvent>>,
    ) -> Result<StepResult, CallError> {
        let value = self
            .proxy
            .request_with_progress(method, vec![json!(breakpoints)], sink, None)
            .await?;
        decode(method, value)
    }

    /// The call stack of the paused program, innermost frame first.
    pub async fn get_stack_frames(&self) -> Result<Vec<StackFrame>, CallError> {
        let value = self.proxy.request("get_stack_frames", vec![]).await?;
        decode("get_stack_frames", value)
    }

    /// The statements in `path` a breakpoint can be set on.
    pub async fn get_breakpoints(&self, path: &str) -> Result<Vec<BreakpointSpan>, CallError> {
        let value = self
            .proxy
            .request("get_breakpoints", vec![json!(path)])
            .await?;
        decode("get_breakpoints", value)
    }

    /// The local variables of one paused stack frame.
    pub async fn get_locals(&self, frame_id: u32) -> Result<Vec<Variable>, CallError> {
        let value = self
            .proxy
            .request("get_locals", vec![json!(frame_id)])
            .await?;
        decode("get_locals", value)
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

    pub async fn terminate(&self) {
        self.proxy.terminate().await;
    }
}
