//! Registry of value types.
//!
//! Every atomic value that can appear as an attribute result or as a key is
//! described by a [`ValueType`] registered under a small integer
//! [`TypeCode`]. Code `0` is reserved for "untyped" (no key).

use crate::error::{Error, ErrorCode, Result};
use crate::value::Value;
use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeCode(u32);

impl TypeCode {
    pub const NONE: TypeCode = TypeCode(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Arithmetic class of an atomic type, used by operation lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ArithmeticClass {
    #[default]
    None,
    Bool,
    Int,
    Float,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AtomicTypeFeatures {
    pub read_only: bool,
    pub arithmetic: ArithmeticClass,
}

/// Behaviour of one registered value type.
///
/// `copy` and `destroy` are the hooks key trees use for their typed leaves;
/// the defaults clone and drop.
pub trait ValueType: Send + Sync {
    fn name(&self) -> &str;
    /// Nominal storage size in bytes, reported to presentation adapters.
    fn size(&self) -> usize;
    fn features(&self) -> AtomicTypeFeatures {
        AtomicTypeFeatures::default()
    }
    fn init(&self) -> Value;
    fn copy(&self, value: &Value) -> Value {
        value.clone()
    }
    fn destroy(&self, value: Value) {
        drop(value);
    }

    fn as_bool(&self, value: &Value) -> Option<bool>;
    fn as_int(&self, value: &Value) -> Option<i64>;
    fn as_float(&self, value: &Value) -> Option<f64>;
    fn as_string(&self, value: &Value) -> Option<String>;

    fn from_bool(&self, _value: bool) -> Option<Value> {
        None
    }
    fn from_int(&self, _value: i64) -> Option<Value> {
        None
    }
    fn from_float(&self, _value: f64) -> Option<Value> {
        None
    }
    fn from_string(&self, _value: &str) -> Option<Value> {
        None
    }
}

impl fmt::Debug for dyn ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueType").field("name", &self.name()).field("size", &self.size()).finish()
    }
}

/// The four built-in scalar types: `bool`, `int`, `float` and `string`.
#[derive(Debug, Clone, Copy)]
pub struct BuiltinType {
    class: ArithmeticClass,
}

impl BuiltinType {
    pub const BOOL: BuiltinType = BuiltinType { class: ArithmeticClass::Bool };
    pub const INT: BuiltinType = BuiltinType { class: ArithmeticClass::Int };
    pub const FLOAT: BuiltinType = BuiltinType { class: ArithmeticClass::Float };
    pub const STRING: BuiltinType = BuiltinType { class: ArithmeticClass::String };
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
impl ValueType for BuiltinType {
    fn name(&self) -> &str {
        match self.class {
            ArithmeticClass::Bool => "bool",
            ArithmeticClass::Int => "int",
            ArithmeticClass::Float => "float",
            ArithmeticClass::String | ArithmeticClass::None => "string",
        }
    }

    fn size(&self) -> usize {
        match self.class {
            ArithmeticClass::Bool => size_of::<bool>(),
            ArithmeticClass::Int => size_of::<i64>(),
            ArithmeticClass::Float => size_of::<f64>(),
            ArithmeticClass::String | ArithmeticClass::None => size_of::<Arc<str>>(),
        }
    }

    fn features(&self) -> AtomicTypeFeatures {
        AtomicTypeFeatures { read_only: false, arithmetic: self.class }
    }

    fn init(&self) -> Value {
        match self.class {
            ArithmeticClass::Bool => Value::Bool(false),
            ArithmeticClass::Int => Value::Int(0),
            ArithmeticClass::Float => Value::Float(0.0),
            ArithmeticClass::String | ArithmeticClass::None => Value::from(""),
        }
    }

    fn as_bool(&self, value: &Value) -> Option<bool> {
        match value {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Str(s) => match s.as_ref() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            Value::Instance(_) => None,
        }
    }

    fn as_int(&self, value: &Value) -> Option<i64> {
        match value {
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn as_float(&self, value: &Value) -> Option<f64> {
        match value {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(s) => s.trim().parse().ok(),
            Value::Instance(_) => None,
        }
    }

    fn as_string(&self, value: &Value) -> Option<String> {
        match value {
            Value::Instance(_) => None,
            other => Some(other.to_string()),
        }
    }

    fn from_bool(&self, value: bool) -> Option<Value> {
        match self.class {
            ArithmeticClass::Bool => Some(Value::Bool(value)),
            ArithmeticClass::Int => Some(Value::Int(i64::from(value))),
            ArithmeticClass::Float => Some(Value::Float(if value { 1.0 } else { 0.0 })),
            ArithmeticClass::String | ArithmeticClass::None => Some(Value::from(value.to_string())),
        }
    }

    fn from_int(&self, value: i64) -> Option<Value> {
        match self.class {
            ArithmeticClass::Bool => Some(Value::Bool(value != 0)),
            ArithmeticClass::Int => Some(Value::Int(value)),
            ArithmeticClass::Float => Some(Value::Float(value as f64)),
            ArithmeticClass::String | ArithmeticClass::None => Some(Value::from(value.to_string())),
        }
    }

    fn from_float(&self, value: f64) -> Option<Value> {
        match self.class {
            ArithmeticClass::Bool => Some(Value::Bool(value != 0.0)),
            ArithmeticClass::Int => value.is_finite().then(|| Value::Int(value.trunc() as i64)),
            ArithmeticClass::Float => Some(Value::Float(value)),
            ArithmeticClass::String | ArithmeticClass::None => Some(Value::from(value.to_string())),
        }
    }

    fn from_string(&self, value: &str) -> Option<Value> {
        match self.class {
            ArithmeticClass::Bool => self.as_bool(&Value::from(value)).map(Value::Bool),
            ArithmeticClass::Int => value.trim().parse().ok().map(Value::Int),
            ArithmeticClass::Float => value.trim().parse().ok().map(Value::Float),
            ArithmeticClass::String | ArithmeticClass::None => Some(Value::from(value)),
        }
    }
}

/// Type registry of one context scope.
///
/// Codes are dense and start after `offset`, so a descendant scope can keep
/// numbering where its parent stopped.
pub struct TypeRegistry {
    offset: u32,
    entries: Vec<Arc<dyn ValueType>>,
    by_name: HashMap<String, TypeCode>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::starting_after(0)
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_after(offset: u32) -> Self {
        Self { offset, entries: Vec::new(), by_name: HashMap::new() }
    }

    /// Registry preloaded with `bool`, `int`, `float` and `string` (codes 1 to 4).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for ty in [BuiltinType::BOOL, BuiltinType::INT, BuiltinType::FLOAT, BuiltinType::STRING] {
            // Names are distinct, registration cannot collide.
            let _ = registry.register(Arc::new(ty));
        }
        registry
    }

    pub fn register(&mut self, ty: Arc<dyn ValueType>) -> Result<TypeCode> {
        let name = ty.name().to_string();
        if name.is_empty() {
            return Err(Error::new(ErrorCode::EmptyName, "value type without a name"));
        }
        if self.by_name.contains_key(&name) {
            return Err(Error::new(ErrorCode::NameCollision, format!("value type '{name}' already registered")));
        }
        let raw = u32::try_from(self.entries.len())
            .ok()
            .and_then(|len| self.offset.checked_add(len + 1))
            .ok_or_else(|| Error::new(ErrorCode::Memory, "type code space exhausted"))?;
        let code = TypeCode::new(raw);
        self.entries.push(ty);
        self.by_name.insert(name, code);
        Ok(code)
    }

    /// Code registered under `name` in this scope, [`TypeCode::NONE`] if unknown.
    pub fn code_of(&self, name: &str) -> TypeCode {
        self.by_name.get(name).copied().unwrap_or(TypeCode::NONE)
    }

    pub fn get(&self, code: TypeCode) -> Option<Arc<dyn ValueType>> {
        let index = code.raw().checked_sub(self.offset + 1)?;
        self.entries.get(usize::try_from(index).ok()?).cloned()
    }

    /// One past the highest code handed out by this scope.
    pub fn next_offset(&self) -> u32 {
        self.offset + u32::try_from(self.entries.len()).unwrap_or(u32::MAX - self.offset)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
