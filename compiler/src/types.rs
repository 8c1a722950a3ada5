//! Argument and result shapes for the compiler and debugger method
//! surfaces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_profile() -> String {
    "unrestricted".to_string()
}

/// One named source in a program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub contents: String,
}

/// A full program: sources plus compilation settings. Passed by value
/// to `get_qir` and `run`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramConfig {
    pub sources: Vec<SourceFile>,
    #[serde(default)]
    pub language_features: Vec<String>,
    /// Target capability profile; limits which programs lower to QIR.
    #[serde(default = "default_profile")]
    pub profile: String,
}

impl ProgramConfig {
    /// Single-source program with default settings.
    #[must_use]
    pub fn from_source(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            sources: vec![SourceFile {
                name: name.into(),
                contents: contents.into(),
            }],
            language_features: Vec::new(),
            profile: default_profile(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionItem {
    pub label: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionList {
    pub items: Vec<CompletionItem>,
}

/// Outcome of one debugger step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", content = "detail", rename_all = "kebab-case")]
pub enum StepResult {
    /// Execution stopped at the breakpoint with this id.
    BreakpointHit(u32),
    Next,
    StepIn,
    StepOut,
    /// The program returned this value; the session is over.
    Return(Value),
}

/// One frame of the paused program's call stack, innermost first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    pub name: String,
    pub uri: String,
    pub start: u32,
    pub end: u32,
}

/// A statement a breakpoint can be set on, with its source span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointSpan {
    pub id: u32,
    pub start: u32,
    pub end: u32,
}

/// A local variable in a paused stack frame, rendered for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
    pub var_type: String,
}
