//! Operation and converter registries.
//!
//! Both are pluggable collaborators: the engine only looks implementations up,
//! the host (or a standard library crate) registers them.

use crate::error::Result;
use crate::types::TypeCode;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub type BinaryOp = Arc<dyn Fn(&Value, &Value) -> Result<Value> + Send + Sync>;
pub type Converter = Arc<dyn Fn(&Value) -> Result<Value> + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OperationKey {
    symbol: String,
    lhs: TypeCode,
    rhs: TypeCode,
}

/// Binary operations keyed by symbol and operand type codes.
///
/// [`TypeCode::NONE`] on either side registers a wildcard that matches any
/// operand type; exact registrations take precedence.
#[derive(Default)]
pub struct OperationRegistry {
    ops: HashMap<OperationKey, BinaryOp>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, symbol: impl Into<String>, lhs: TypeCode, rhs: TypeCode, f: F)
    where
        F: 'static + Send + Sync + Fn(&Value, &Value) -> Result<Value>,
    {
        self.ops.insert(OperationKey { symbol: symbol.into(), lhs, rhs }, Arc::new(f));
    }

    pub fn resolve(&self, symbol: &str, lhs: TypeCode, rhs: TypeCode) -> Option<BinaryOp> {
        let candidates = [(lhs, rhs), (lhs, TypeCode::NONE), (TypeCode::NONE, rhs), (TypeCode::NONE, TypeCode::NONE)];
        candidates.into_iter().find_map(|(lhs, rhs)| {
            self.ops.get(&OperationKey { symbol: symbol.to_string(), lhs, rhs }).map(Arc::clone)
        })
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Value converters keyed by (from, to) type codes.
#[derive(Default)]
pub struct ConverterRegistry {
    converters: HashMap<(TypeCode, TypeCode), Converter>,
}

impl ConverterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, from: TypeCode, to: TypeCode, f: F)
    where
        F: 'static + Send + Sync + Fn(&Value) -> Result<Value>,
    {
        self.converters.insert((from, to), Arc::new(f));
    }

    pub fn resolve(&self, from: TypeCode, to: TypeCode) -> Option<Converter> {
        self.converters.get(&(from, to)).map(Arc::clone)
    }
}
