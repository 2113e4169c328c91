//! Interpreter boundary.
//!
//! The debug server depends on exactly three interpreter capabilities: a
//! call-stack walk with per-frame source positions, evaluation of a source
//! string with output capture, and (installed by the host, not modeled here)
//! a per-instruction callback that routes into
//! [`DebugServer::on_instruction`](crate::server::DebugServer::on_instruction).
//! Everything else about the interpreter is out of scope.
//!
//! Methods take `&self`: embedded interpreters exposed to a host manage
//! their own interior mutability, and evaluation may re-enter the debugger
//! through callbacks.

use crate::value::ScriptValue;

/// One frame of the interpreter call stack, innermost-first in
/// [`ScriptEngine::call_stack`] output.
///
/// A frame with no resolvable source position still appears; missing
/// file/line are reported best-effort downstream.
#[derive(Debug, Clone)]
pub struct FrameInfo {
    /// Method or block name.
    pub name: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

/// An exception raised by the interpreter during evaluation.
#[derive(Debug, Clone)]
pub struct ScriptException {
    pub class: String,
    pub message: String,
    /// First source location of the failure, when known.
    pub file: Option<String>,
    pub line: Option<u32>,
    pub backtrace: Vec<String>,
}

/// Print-family output collected between `begin_output_capture` and
/// `end_output_capture`.
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

/// The interpreter capabilities consumed by the debug server.
pub trait ScriptEngine {
    /// Current call stack, innermost frame first. Recomputed fresh on every
    /// call; the debugger never caches it.
    fn call_stack(&self) -> Vec<FrameInfo>;

    /// Number of active call frames.
    fn call_depth(&self) -> usize {
        self.call_stack().len()
    }

    /// Named locals of the given frame (0 = innermost). Frames with no
    /// debug metadata return an empty list, not an error.
    fn locals(&self, frame_index: usize) -> Vec<(String, ScriptValue)>;

    /// Evaluate `code` in the context of the given frame. Must never panic;
    /// interpreter-level failures come back as `Err`.
    fn eval(&self, code: &str, frame_index: usize) -> Result<ScriptValue, ScriptException>;

    /// Redirect the interpreter's print-family output into a buffer.
    fn begin_output_capture(&self);

    /// Stop capturing and hand back whatever was collected. Always called,
    /// even when evaluation raised.
    fn end_output_capture(&self) -> CapturedOutput;
}
