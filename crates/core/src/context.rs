//! Evaluation context.
//!
//! A [`Context`] owns the registries queries consult (value types, operations,
//! functions, converters) and the error queue runtime failures are pushed to.
//! Descendant contexts borrow their parent, so they cannot outlive it; lookups
//! that miss locally fall through to the parent chain.

use crate::error::{Error, ErrorCode, Result};
use crate::functions::{Arity, FunctionImpl, FunctionRegistry, ResolveError};
use crate::operations::{BinaryOp, Converter, ConverterRegistry, OperationRegistry};
use crate::types::{TypeCode, TypeRegistry, ValueType};
use std::sync::{Arc, Mutex, PoisonError};

pub struct Context<'parent> {
    parent: Option<&'parent Context<'parent>>,
    depth: usize,
    types: TypeRegistry,
    operations: OperationRegistry,
    functions: FunctionRegistry,
    converters: ConverterRegistry,
    errors: Mutex<Vec<Error>>,
}

impl Context<'static> {
    /// Root context with the built-in value types registered.
    pub fn root() -> Self {
        Self::with_types(TypeRegistry::with_builtins())
    }

    /// Root context with an empty type registry.
    pub fn bare() -> Self {
        Self::with_types(TypeRegistry::new())
    }

    fn with_types(types: TypeRegistry) -> Self {
        Self {
            parent: None,
            depth: 0,
            types,
            operations: OperationRegistry::new(),
            functions: FunctionRegistry::new(),
            converters: ConverterRegistry::new(),
            errors: Mutex::new(Vec::new()),
        }
    }
}

impl Default for Context<'static> {
    fn default() -> Self {
        Self::root()
    }
}

impl<'parent> Context<'parent> {
    /// Creates a short-lived scope whose registrations stay local and whose
    /// lookups fall back to `self`.
    pub fn descendant(&self) -> Context<'_> {
        Context {
            parent: Some(self),
            depth: self.depth + 1,
            types: TypeRegistry::starting_after(self.next_type_offset()),
            operations: OperationRegistry::new(),
            functions: FunctionRegistry::new(),
            converters: ConverterRegistry::new(),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn parent(&self) -> Option<&Context<'parent>> {
        self.parent
    }

    /// Nesting level; the root context is at depth 0.
    pub fn depth(&self) -> usize {
        self.depth
    }

    fn next_type_offset(&self) -> u32 {
        self.types.next_offset()
    }

    fn ancestors(&self) -> impl Iterator<Item = &Context<'_>> {
        let mut current: Option<&Context<'_>> = Some(self);
        core::iter::from_fn(move || {
            let ctx = current?;
            current = ctx.parent;
            Some(ctx)
        })
    }

    pub fn register_type(&mut self, ty: Arc<dyn ValueType>) -> Result<TypeCode> {
        if !self.type_code(ty.name()).is_none() {
            return Err(Error::new(ErrorCode::NameCollision, format!("value type '{}' already registered", ty.name())));
        }
        self.types.register(ty)
    }

    /// Code of the type registered under `name` in this scope or an ancestor,
    /// [`TypeCode::NONE`] if unknown.
    pub fn type_code(&self, name: &str) -> TypeCode {
        self.ancestors().map(|ctx| ctx.types.code_of(name)).find(|code| !code.is_none()).unwrap_or(TypeCode::NONE)
    }

    pub fn value_type(&self, code: TypeCode) -> Option<Arc<dyn ValueType>> {
        if code.is_none() {
            return None;
        }
        self.ancestors().find_map(|ctx| ctx.types.get(code))
    }

    /// Like [`Context::value_type`], failing with `ContextIncomplete`.
    pub fn require_type(&self, code: TypeCode) -> Result<Arc<dyn ValueType>> {
        self.value_type(code)
            .ok_or_else(|| Error::new(ErrorCode::ContextIncomplete, format!("no value type registered for {code}")))
    }

    pub fn operations_mut(&mut self) -> &mut OperationRegistry {
        &mut self.operations
    }

    pub fn resolve_operation(&self, symbol: &str, lhs: TypeCode, rhs: TypeCode) -> Option<BinaryOp> {
        self.ancestors().find_map(|ctx| ctx.operations.resolve(symbol, lhs, rhs))
    }

    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    /// Resolves a function in this scope, then in the ancestors. A name known
    /// in a nearer scope but with the wrong arity shadows farther scopes.
    pub fn resolve_function(&self, name: &str, argc: Arity) -> Result<FunctionImpl, ResolveError> {
        for ctx in self.ancestors() {
            if ctx.functions.contains(name) {
                return ctx.functions.resolve(name, argc);
            }
        }
        Err(ResolveError::Unknown(name.to_string()))
    }

    pub fn converters_mut(&mut self) -> &mut ConverterRegistry {
        &mut self.converters
    }

    pub fn resolve_converter(&self, from: TypeCode, to: TypeCode) -> Option<Converter> {
        self.ancestors().find_map(|ctx| ctx.converters.resolve(from, to))
    }

    /// Queues a runtime failure. Evaluation continues; the caller sees "no value".
    pub fn push_error(&self, error: Error) {
        tracing::warn!(code = %error.code, depth = self.depth, "{}", error.message);
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).push(error);
    }

    pub fn take_errors(&self) -> Vec<Error> {
        core::mem::take(&mut *self.errors.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

impl core::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Context")
            .field("depth", &self.depth)
            .field("types", &self.types.len())
            .field("errors", &self.error_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BuiltinType;
    use crate::value::Value;
    use rstest::rstest;

    #[rstest]
    fn descendant_sees_parent_registrations() {
        let mut root = Context::root();
        root.functions_mut().register_fn("one", 0, |_| Ok(Value::Int(1)));
        let child = root.descendant();
        assert_eq!(child.depth(), 1);
        assert_eq!(child.type_code("int"), root.type_code("int"));
        assert!(child.resolve_function("one", 0).is_ok());
    }

    #[rstest]
    fn descendant_registrations_stay_local() {
        let root = Context::root();
        let mut child = root.descendant();
        child.functions_mut().register_fn("local", 0, |_| Ok(Value::Bool(true)));
        assert!(child.resolve_function("local", 0).is_ok());
        assert_eq!(root.resolve_function("local", 0).err(), Some(ResolveError::Unknown("local".into())));
    }

    #[rstest]
    fn descendant_cannot_shadow_type_names() {
        let root = Context::root();
        let mut child = root.descendant();
        let err = child.register_type(Arc::new(BuiltinType::FLOAT)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NameCollision);
    }

    #[rstest]
    fn error_queue_is_drained_by_take() {
        let ctx = Context::root();
        ctx.push_error(Error::interface("iterator missing"));
        ctx.push_error(Error::arithmetic("division by zero"));
        assert_eq!(ctx.error_count(), 2);
        let errors = ctx.take_errors();
        assert_eq!(errors[1].code(), ErrorCode::ArithmeticError);
        assert!(!ctx.has_errors());
    }

    #[rstest]
    fn missing_type_is_context_incomplete() {
        let ctx = Context::bare();
        assert_eq!(ctx.require_type(TypeCode::new(1)).unwrap_err().code(), ErrorCode::ContextIncomplete);
    }
}
