//! Debug-client tests against a fake debugger service running behind
//! the in-process adapter.

use std::sync::Arc;

use serde_json::{Value, json};

use qlink_channel::{WorkerConfig, connect_local};
use qlink_compiler::{DebugClient, ProgramConfig, StepResult, debug_descriptor};
use qlink_core::{EventBus, Service, ServiceFuture, WorkerContext};
use qlink_types::{
    CallError, Diagnostic, ErrorCodecs, ServiceError, ServiceEvent, Severity,
};

struct FakeDebugger {
    loaded: bool,
}

impl FakeDebugger {
    fn step(&self, method: &str, args: &[Value]) -> Result<Value, ServiceError> {
        if !self.loaded {
            return Err(ServiceError::Message("no program loaded".to_string()));
        }
        let breakpoints = args[0].as_array().map(Vec::len).unwrap_or_default();
        match method {
            "eval_continue" if breakpoints > 0 => {
                Ok(json!({ "step": "breakpoint-hit", "detail": 2 }))
            }
            "eval_continue" | "step_out" => Ok(json!({ "step": "return", "detail": "Zero" })),
            "eval_next" => Ok(json!({ "step": "next" })),
            "step_in" => Ok(json!({ "step": "step-in" })),
            other => Err(ServiceError::Message(format!("unknown step '{other}'"))),
        }
    }
}

impl Service for FakeDebugger {
    fn invoke<'a>(
        &'a mut self,
        method: &'a str,
        args: Vec<Value>,
        progress: Option<Arc<EventBus<ServiceEvent>>>,
    ) -> ServiceFuture<'a, Result<Value, ServiceError>> {
        Box::pin(async move {
            match method {
                "load_program" => {
                    let program: ProgramConfig = serde_json::from_value(args[0].clone()).unwrap();
                    if program.sources.is_empty() {
                        return Err(ServiceError::Compile {
                            diagnostics: vec![Diagnostic {
                                severity: Severity::Error,
                                message: "program has no sources".to_string(),
                                start: 0,
                                end: 0,
                                code: None,
                            }],
                        });
                    }
                    self.loaded = true;
                    Ok(json!(null))
                }
                "get_stack_frames" => Ok(json!([
                    { "name": "Main", "uri": "file:///main.qs", "start": 10, "end": 24 },
                ])),
                "get_breakpoints" => Ok(json!([
                    { "id": 1, "start": 10, "end": 24 },
                    { "id": 2, "start": 30, "end": 41 },
                ])),
                "get_locals" => Ok(json!([
                    { "name": "q", "value": "Qubit0", "var_type": "Qubit" },
                ])),
                "eval_next" | "eval_continue" | "step_in" | "step_out" => {
                    let sink = progress.expect("stepping is declared with progress");
                    sink.fire(&ServiceEvent::Message("resuming".to_string()));
                    self.step(method, &args)
                }
                other => Err(ServiceError::Message(format!("unknown method '{other}'"))),
            }
        })
    }
}

fn client() -> DebugClient {
    let proxy = connect_local(
        |_context: WorkerContext| FakeDebugger { loaded: false },
        debug_descriptor(),
        ErrorCodecs::standard(),
        &WorkerConfig::default(),
    );
    DebugClient::new(proxy)
}

fn program() -> ProgramConfig {
    ProgramConfig::from_source("main.qs", "operation Main() : Result { ... }")
}

#[tokio::test]
async fn test_continue_hits_breakpoint_and_streams_output() {
    let client = client();
    client.load_program(&program(), None).await.unwrap();

    let sink = Arc::new(EventBus::new());
    let (_, mut events) = sink.subscribe();
    let result = client.eval_continue(&[1, 2], sink).await.unwrap();

    assert_eq!(result, StepResult::BreakpointHit(2));
    assert_eq!(
        events.try_recv().unwrap(),
        ServiceEvent::Message("resuming".to_string())
    );
}

#[tokio::test]
async fn test_continue_without_breakpoints_runs_to_return() {
    let client = client();
    client.load_program(&program(), None).await.unwrap();

    let result = client
        .eval_continue(&[], Arc::new(EventBus::new()))
        .await
        .unwrap();
    assert_eq!(result, StepResult::Return(json!("Zero")));
}

#[tokio::test]
async fn test_step_variants_decode() {
    let client = client();
    client.load_program(&program(), Some("Main()")).await.unwrap();

    let sink = Arc::new(EventBus::new());
    assert_eq!(
        client.eval_next(&[], sink.clone()).await.unwrap(),
        StepResult::Next
    );
    assert_eq!(
        client.step_in(&[], sink.clone()).await.unwrap(),
        StepResult::StepIn
    );
    assert_eq!(
        client.step_out(&[], sink).await.unwrap(),
        StepResult::Return(json!("Zero"))
    );
}

#[tokio::test]
async fn test_step_before_load_rejects() {
    let client = client();
    let error = client
        .eval_next(&[], Arc::new(EventBus::new()))
        .await
        .unwrap_err();
    assert_eq!(
        error,
        CallError::Service(ServiceError::Message("no program loaded".to_string()))
    );
}

#[tokio::test]
async fn test_load_failure_carries_diagnostics() {
    let client = client();
    let empty = ProgramConfig {
        sources: Vec::new(),
        language_features: Vec::new(),
        profile: "unrestricted".to_string(),
    };
    let error = client.load_program(&empty, None).await.unwrap_err();
    match error {
        CallError::Service(ServiceError::Compile { diagnostics }) => {
            assert_eq!(diagnostics[0].message, "program has no sources");
        }
        other => panic!("expected compile error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_paused_program_inspection() {
    let client = client();
    client.load_program(&program(), None).await.unwrap();

    let frames = client.get_stack_frames().await.unwrap();
    assert_eq!(frames[0].name, "Main");
    assert_eq!(frames[0].uri, "file:///main.qs");

    let spans = client.get_breakpoints("main.qs").await.unwrap();
    assert_eq!(spans.len(), 2);
    assert_eq!(spans[1].id, 2);

    let locals = client.get_locals(0).await.unwrap();
    assert_eq!(locals[0].name, "q");
    assert_eq!(locals[0].var_type, "Qubit");
}
