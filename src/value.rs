//! Interpreter value model.
//!
//! `ScriptValue` is the debugger's view of a value living in the embedded
//! interpreter. Heap-backed variants (`Array`, `Map`, `Object`) are shared
//! via `Rc` so that a value graph can contain cycles, exactly as the
//! interpreter's own heap can; `identity()` exposes the allocation address
//! used for cycle detection during serialization.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Payload of an object value: class name plus whatever identity the `Rc`
/// allocation itself provides.
#[derive(Debug)]
pub struct ObjectData {
    pub class_name: String,
}

/// A value reported by the embedded interpreter.
#[derive(Clone)]
pub enum ScriptValue {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// Symbol-like atom (`:name`).
    Symbol(String),
    Array(Rc<RefCell<Vec<ScriptValue>>>),
    /// Ordered key/value entries; insertion order is preserved.
    Map(Rc<RefCell<Vec<(ScriptValue, ScriptValue)>>>),
    Object(Rc<ObjectData>),
    /// Method/proc/lambda; carries a display name only.
    Callable(String),
    /// Opaque native/foreign value; carries its type name.
    Native(String),
}

impl ScriptValue {
    /// Convenience constructor for an array value.
    pub fn array(items: Vec<ScriptValue>) -> Self {
        ScriptValue::Array(Rc::new(RefCell::new(items)))
    }

    /// Convenience constructor for a map value.
    pub fn map(entries: Vec<(ScriptValue, ScriptValue)>) -> Self {
        ScriptValue::Map(Rc::new(RefCell::new(entries)))
    }

    /// Convenience constructor for an object value.
    pub fn object(class_name: &str) -> Self {
        ScriptValue::Object(Rc::new(ObjectData {
            class_name: class_name.to_string(),
        }))
    }

    /// Short type tag used in serialized output.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Int(_) => "integer",
            ScriptValue::Float(_) => "float",
            ScriptValue::Str(_) => "string",
            ScriptValue::Symbol(_) => "symbol",
            ScriptValue::Array(_) => "array",
            ScriptValue::Map(_) => "map",
            ScriptValue::Object(_) => "object",
            ScriptValue::Callable(_) => "callable",
            ScriptValue::Native(_) => "native",
        }
    }

    /// Heap identity for cycle detection. `None` for immediate values.
    pub fn identity(&self) -> Option<usize> {
        match self {
            ScriptValue::Array(rc) => Some(Rc::as_ptr(rc) as usize),
            ScriptValue::Map(rc) => Some(Rc::as_ptr(rc) as usize),
            ScriptValue::Object(rc) => Some(Rc::as_ptr(rc) as usize),
            _ => None,
        }
    }
}

// Manual impl: deriving Debug would recurse forever on cyclic values.
impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptValue::Nil => write!(f, "Nil"),
            ScriptValue::Bool(b) => write!(f, "Bool({})", b),
            ScriptValue::Int(n) => write!(f, "Int({})", n),
            ScriptValue::Float(x) => write!(f, "Float({})", x),
            ScriptValue::Str(s) => write!(f, "Str({:?})", s),
            ScriptValue::Symbol(s) => write!(f, "Symbol(:{})", s),
            ScriptValue::Array(rc) => write!(f, "Array(len={})", rc.borrow().len()),
            ScriptValue::Map(rc) => write!(f, "Map(len={})", rc.borrow().len()),
            ScriptValue::Object(rc) => write!(f, "Object({})", rc.class_name),
            ScriptValue::Callable(name) => write!(f, "Callable({})", name),
            ScriptValue::Native(ty) => write!(f, "Native({})", ty),
        }
    }
}
