//! scriptdbg - an in-process debug server for embedded scripting interpreters
//!
//! Lets an external IDE attach to a running host application over loopback
//! TCP (newline-delimited JSON), set breakpoints in the embedded scripting
//! language, step through execution, pause on exceptions, inspect stack
//! frames and locals, and evaluate REPL snippets, while the host keeps
//! running its normal frame loop.
//!
//! The host wires in three calls:
//!
//! - install [`DebugServer::on_instruction`] as the interpreter's
//!   per-instruction callback,
//! - call [`DebugServer::poll`] once per frame,
//! - route uncaught interpreter exceptions into
//!   [`DebugServer::pause_on_exception`].
//!
//! Everything the server needs from the interpreter is behind the
//! [`ScriptEngine`] trait.

pub mod breakpoints;
pub mod engine;
pub mod inspect;
pub mod protocol;
pub mod repl;
pub mod server;
pub mod session;
pub mod value;

pub use breakpoints::BreakpointRegistry;
pub use engine::{CapturedOutput, FrameInfo, ScriptEngine, ScriptException};
pub use repl::{ReplEvalResult, ReplEvaluator, ReplStatus};
pub use server::{DebugServer, DEFAULT_PORT};
pub use session::{DebugSessionState, ExecState, PauseReason, StepMode};
pub use value::ScriptValue;
