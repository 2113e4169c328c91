//! Wire protocol: newline-delimited JSON, one object per line.
//!
//! Inbound commands decode once per line into a tagged enum; unknown types
//! and malformed lines yield `None` and are silently ignored. Missing
//! payload fields default to empty/zero; extra fields are tolerated.
//! Outbound events are complete, self-contained JSON objects carrying a
//! `"type"` discriminator; serde_json handles string escaping (quotes,
//! backslashes, `\uXXXX` for control characters).

use serde::Deserialize;
use serde_json::{json, Value};

use crate::repl::{ReplCommand, ReplEvalResult};

/// One inbound client command. Transient: decoded, dispatched, discarded.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DebugCommand {
    SetBreakpoint {
        #[serde(default)]
        file: String,
        #[serde(default)]
        line: u32,
    },
    ClearBreakpoint {
        #[serde(default)]
        file: String,
        #[serde(default)]
        line: u32,
    },
    Continue,
    StepOver,
    StepInto,
    StepOut,
    Pause,
    Evaluate {
        #[serde(default)]
        expression: String,
        #[serde(default)]
        frame_id: usize,
    },
    ReplEval {
        #[serde(default)]
        code: String,
        #[serde(default)]
        id: u64,
    },
    ReplCheckComplete {
        #[serde(default)]
        code: String,
        #[serde(default)]
        id: u64,
    },
    ReplClearBuffer {
        #[serde(default)]
        id: u64,
    },
    ReplListCommands {
        #[serde(default)]
        id: u64,
    },
}

/// Decode one inbound line. Malformed or unrecognized input is a no-op.
pub fn decode_command(line: &str) -> Option<DebugCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    serde_json::from_str(line).ok()
}

/// Encode one outbound event as a single line, exactly one trailing newline.
pub fn encode_line(event: &Value) -> String {
    let mut text = event.to_string();
    text.push('\n');
    text
}

pub fn paused_event(reason: &str, file: &str, line: u32, stack: Value, locals: Value) -> Value {
    json!({
        "type": "paused",
        "reason": reason,
        "file": file,
        "line": line,
        "stack": stack,
        "locals": locals,
    })
}

pub fn exception_event(class: &str, message: &str, file: &str, line: u32, stack: Value) -> Value {
    json!({
        "type": "exception",
        "exception_class": class,
        "message": message,
        "file": file,
        "line": line,
        "stack": stack,
    })
}

pub fn continued_event() -> Value {
    json!({ "type": "continued" })
}

pub fn evaluate_response(success: bool, result: Value) -> Value {
    json!({
        "type": "evaluate_response",
        "success": success,
        "result": result,
    })
}

pub fn repl_result_event(id: u64, res: &ReplEvalResult) -> Value {
    let mut event = json!({
        "type": "repl_result",
        "id": id,
        "status": res.status.as_str(),
        "result": res.result.as_deref(),
        "stdout": res.stdout_capture.as_str(),
        "stderr": res.stderr_capture.as_str(),
        "execution_time_ms": res.execution_time_ms,
    });
    if let Some(ex) = &res.exception {
        event["exception"] = json!({
            "class": ex.class.as_str(),
            "message": ex.message.as_str(),
            "file": ex.file.as_deref(),
            "line": ex.line,
            "backtrace": &ex.backtrace,
        });
    }
    event
}

pub fn repl_complete_check_event(id: u64, complete: bool) -> Value {
    json!({
        "type": "repl_complete_check",
        "id": id,
        "complete": complete,
    })
}

pub fn repl_commands_event(id: u64, commands: &[ReplCommand]) -> Value {
    let listing: Vec<Value> = commands
        .iter()
        .map(|c| json!({ "name": c.name, "description": c.description }))
        .collect();
    json!({
        "type": "repl_commands",
        "id": id,
        "commands": listing,
    })
}
