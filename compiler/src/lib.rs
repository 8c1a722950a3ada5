//! Typed façades for the quantum compiler and debugger services.
//!
//! The generic machinery (proxy, dispatcher, channels) knows nothing
//! about compilers; this crate pins down the method surfaces with
//! [`compiler_descriptor`] / [`debug_descriptor`] and wraps connected
//! proxies in [`CompilerClient`] / [`DebugClient`], whose methods take
//! and return real types instead of JSON values.

mod client;
mod debug;
mod types;

pub use client::{CompilerClient, compiler_descriptor};
pub use debug::{DebugClient, debug_descriptor};
pub use types::{
    BreakpointSpan, CompletionItem, CompletionList, ProgramConfig, SourceFile, StackFrame,
    StepResult, Variable,
};
