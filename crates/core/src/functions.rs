use crate::error::Result;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;

pub type Arity = usize;

pub type FunctionImpl = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// Error type returned by function resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No function with the name exists.
    Unknown(String),
    /// Function exists, but not for the requested arity. Provides known minimum arities.
    WrongArity { name: String, available: Vec<Arity> },
}

struct Overload {
    min: Arity,
    max: Option<Arity>,
    func: FunctionImpl,
}

impl Overload {
    fn accepts(&self, argc: Arity) -> bool {
        argc >= self.min && self.max.is_none_or(|max| argc <= max)
    }
}

/// Named functions with arity ranges.
///
/// A call matches when `argc >= min` and (`max` is `None` or `argc <= max`).
/// Overlapping ranges are allowed; resolution picks the most specific
/// (highest min, then smallest max).
#[derive(Default)]
pub struct FunctionRegistry {
    fns: HashMap<String, Vec<Overload>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, arity: Arity, func: FunctionImpl) {
        self.register_range(name, arity, Some(arity), func);
    }

    /// Convenience: register a plain closure with an exact arity.
    pub fn register_fn<F>(&mut self, name: impl Into<String>, arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&[Value]) -> Result<Value>,
    {
        self.register(name, arity, Arc::new(f));
    }

    /// Register a variadic closure selected for any call with `argc >= min_arity`.
    pub fn register_variadic<F>(&mut self, name: impl Into<String>, min_arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&[Value]) -> Result<Value>,
    {
        self.register_range(name, min_arity, None, Arc::new(f));
    }

    pub fn register_range(&mut self, name: impl Into<String>, min: Arity, max: Option<Arity>, func: FunctionImpl) {
        let overloads = self.fns.entry(name.into()).or_default();
        overloads.push(Overload { min, max, func });
        // Keep deterministic order so the most specific wins if overlapping:
        // higher min first, then smaller max (None treated as infinity).
        overloads.sort_by(|a, b| b.min.cmp(&a.min).then_with(|| match (a.max, b.max) {
            (Some(amax), Some(bmax)) => amax.cmp(&bmax),
            (Some(_), None) => core::cmp::Ordering::Less,
            (None, Some(_)) => core::cmp::Ordering::Greater,
            (None, None) => core::cmp::Ordering::Equal,
        }));
    }

    pub fn resolve(&self, name: &str, argc: Arity) -> Result<FunctionImpl, ResolveError> {
        let overloads = self.fns.get(name).ok_or_else(|| ResolveError::Unknown(name.to_string()))?;
        overloads.iter().find(|o| o.accepts(argc)).map(|o| Arc::clone(&o.func)).ok_or_else(|| {
            ResolveError::WrongArity { name: name.to_string(), available: overloads.iter().map(|o| o.min).collect() }
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fns.contains_key(name)
    }
}
