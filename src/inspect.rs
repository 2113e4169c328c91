//! Value serialization and stack inspection.
//!
//! Converts arbitrary interpreter values into a bounded JSON representation:
//! depth-limited, cycle-guarded, and collection-truncated, so no value graph
//! can produce unbounded recursion or a runaway payload. Stack walking is
//! best-effort and never fails; a frame with no resolvable position still
//! appears with placeholder file/line.

use std::collections::HashSet;

use serde_json::{json, Value};

use crate::engine::ScriptEngine;
use crate::value::ScriptValue;

/// Default recursion limit for serialized values.
pub const MAX_SERIALIZE_DEPTH: usize = 4;

/// Collections serialize at most this many elements/entries, then append a
/// "+N more" sentinel.
pub const MAX_COLLECTION_ELEMENTS: usize = 10;

/// Placeholder file name for frames with no resolvable source position.
pub const UNKNOWN_FILE: &str = "?";

/// Per-call serialization context: recursion depth plus the identity set of
/// heap values already visited in this call. Never outlives the call.
#[derive(Debug)]
pub struct SerializeCtx {
    depth: usize,
    max_depth: usize,
    visited: HashSet<usize>,
}

impl Default for SerializeCtx {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializeCtx {
    pub fn new() -> Self {
        Self::with_max_depth(MAX_SERIALIZE_DEPTH)
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self {
            depth: 0,
            max_depth,
            visited: HashSet::new(),
        }
    }
}

/// Serialize one interpreter value into the `{type, value, elements?}` JSON
/// shape. Terminates on any input, including self-referential graphs.
pub fn serialize_value(value: &ScriptValue, ctx: &mut SerializeCtx) -> Value {
    if ctx.depth > ctx.max_depth {
        return json!({ "type": "max_depth", "value": "..." });
    }

    if let Some(id) = value.identity() {
        if !ctx.visited.insert(id) {
            return json!({ "type": "circular", "value": "<circular>" });
        }
    }

    match value {
        ScriptValue::Nil => json!({ "type": "nil", "value": "nil" }),
        ScriptValue::Bool(b) => json!({ "type": "boolean", "value": b.to_string() }),
        ScriptValue::Int(n) => json!({ "type": "integer", "value": n.to_string() }),
        ScriptValue::Float(x) => json!({ "type": "float", "value": x.to_string() }),
        ScriptValue::Str(s) => json!({ "type": "string", "value": s }),
        ScriptValue::Symbol(s) => json!({ "type": "symbol", "value": format!(":{}", s) }),
        ScriptValue::Array(rc) => {
            let items = rc.borrow();
            let mut elements = Vec::with_capacity(items.len().min(MAX_COLLECTION_ELEMENTS + 1));
            ctx.depth += 1;
            for item in items.iter().take(MAX_COLLECTION_ELEMENTS) {
                elements.push(serialize_value(item, ctx));
            }
            ctx.depth -= 1;
            if items.len() > MAX_COLLECTION_ELEMENTS {
                let more = items.len() - MAX_COLLECTION_ELEMENTS;
                elements.push(json!({ "type": "truncated", "value": format!("+{} more", more) }));
            }
            json!({
                "type": "array",
                "value": format!("Array({})", items.len()),
                "elements": elements,
            })
        }
        ScriptValue::Map(rc) => {
            let entries = rc.borrow();
            let mut elements = Vec::with_capacity(entries.len().min(MAX_COLLECTION_ELEMENTS + 1));
            ctx.depth += 1;
            for (key, val) in entries.iter().take(MAX_COLLECTION_ELEMENTS) {
                elements.push(json!({
                    "type": "entry",
                    "value": inspect(key),
                    "elements": [serialize_value(val, ctx)],
                }));
            }
            ctx.depth -= 1;
            if entries.len() > MAX_COLLECTION_ELEMENTS {
                let more = entries.len() - MAX_COLLECTION_ELEMENTS;
                elements.push(json!({ "type": "truncated", "value": format!("+{} more", more) }));
            }
            json!({
                "type": "map",
                "value": format!("Map({} entries)", entries.len()),
                "elements": elements,
            })
        }
        ScriptValue::Object(rc) => json!({
            "type": "object",
            "value": format!("{}#{:#x}", rc.class_name, value.identity().unwrap_or(0)),
        }),
        ScriptValue::Callable(name) => json!({ "type": "callable", "value": name }),
        ScriptValue::Native(ty) => json!({ "type": "native", "value": ty }),
    }
}

/// Walk the interpreter call stack into an innermost-first JSON array of
/// `{id, name, file, line}` frame summaries. Recomputed fresh on every call.
pub fn stack_trace_json(engine: &dyn ScriptEngine) -> Value {
    let frames: Vec<Value> = engine
        .call_stack()
        .iter()
        .enumerate()
        .map(|(id, frame)| {
            json!({
                "id": id,
                "name": frame.name.as_str(),
                "file": frame.file.as_deref().unwrap_or(UNKNOWN_FILE),
                "line": frame.line.unwrap_or(0),
            })
        })
        .collect();
    Value::Array(frames)
}

/// Serialize the named locals of one frame into a JSON object. The frame
/// index is clamped to the base of the stack; frames with no debug metadata
/// yield an empty object.
pub fn locals_json(engine: &dyn ScriptEngine, frame_index: usize) -> Value {
    let depth = engine.call_depth();
    let index = if depth == 0 {
        0
    } else {
        frame_index.min(depth - 1)
    };

    let mut obj = serde_json::Map::new();
    for (name, value) in engine.locals(index) {
        let mut ctx = SerializeCtx::new();
        obj.insert(name, serialize_value(&value, &mut ctx));
    }
    Value::Object(obj)
}

/// Human-readable single-line rendering used for REPL results, bounded by
/// the same depth and truncation caps as [`serialize_value`].
pub fn inspect(value: &ScriptValue) -> String {
    let mut visited = HashSet::new();
    inspect_bounded(value, 0, &mut visited)
}

fn inspect_bounded(value: &ScriptValue, depth: usize, visited: &mut HashSet<usize>) -> String {
    if depth > MAX_SERIALIZE_DEPTH {
        return "...".to_string();
    }
    if let Some(id) = value.identity() {
        if !visited.insert(id) {
            return "<circular>".to_string();
        }
    }

    match value {
        ScriptValue::Nil => "nil".to_string(),
        ScriptValue::Bool(b) => b.to_string(),
        ScriptValue::Int(n) => n.to_string(),
        ScriptValue::Float(x) => x.to_string(),
        ScriptValue::Str(s) => format!("{:?}", s),
        ScriptValue::Symbol(s) => format!(":{}", s),
        ScriptValue::Array(rc) => {
            let items = rc.borrow();
            let mut parts: Vec<String> = items
                .iter()
                .take(MAX_COLLECTION_ELEMENTS)
                .map(|item| inspect_bounded(item, depth + 1, visited))
                .collect();
            if items.len() > MAX_COLLECTION_ELEMENTS {
                parts.push(format!("+{} more", items.len() - MAX_COLLECTION_ELEMENTS));
            }
            format!("[{}]", parts.join(", "))
        }
        ScriptValue::Map(rc) => {
            let entries = rc.borrow();
            let mut parts: Vec<String> = entries
                .iter()
                .take(MAX_COLLECTION_ELEMENTS)
                .map(|(k, v)| {
                    format!(
                        "{} => {}",
                        inspect_bounded(k, depth + 1, visited),
                        inspect_bounded(v, depth + 1, visited)
                    )
                })
                .collect();
            if entries.len() > MAX_COLLECTION_ELEMENTS {
                parts.push(format!("+{} more", entries.len() - MAX_COLLECTION_ELEMENTS));
            }
            format!("{{{}}}", parts.join(", "))
        }
        ScriptValue::Object(rc) => {
            format!("{}#{:#x}", rc.class_name, value.identity().unwrap_or(0))
        }
        ScriptValue::Callable(name) => format!("#<callable {}>", name),
        ScriptValue::Native(ty) => format!("#<native {}>", ty),
    }
}
