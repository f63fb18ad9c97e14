//! Derived attributes.
//!
//! A derived attribute applies a function or binary operation to every
//! combination of its operand queries, all rooted at the owner. It behaves as
//! an atomic collection whose key is the list of the operands' key arrays.
//! Combinations the collaborator rejects are reported to the context and
//! skipped.

use crate::attribute::{AttributeDefinition, CollectionOptions, KeyReserver};
use crate::collection::{CollectionAccess, ElementIterator, Selection};
use crate::keys::{CollectionKey, KeyArray, KeyNode};
use crate::plan::QueryPlan;
use crate::product::QueryProduct;
use keypath_core::{Context, Error, ErrorCode, FunctionImpl, ResolveError, Result, TypeCode, Value};
use std::sync::Arc;

enum Callable {
    Function(Arc<str>),
    Operation(Arc<str>),
}

struct DerivedAccess {
    callable: Callable,
    operands: Vec<QueryPlan>,
}

/// Attribute computing `name(operand, ...)` for every operand combination.
pub fn function(name: &str, result_type: TypeCode, operands: Vec<QueryPlan>) -> Result<AttributeDefinition> {
    derive(Callable::Function(Arc::from(name)), result_type, operands)
}

/// Attribute computing `lhs <symbol> rhs` for every operand combination.
pub fn operation(symbol: &str, result_type: TypeCode, lhs: QueryPlan, rhs: QueryPlan) -> Result<AttributeDefinition> {
    derive(Callable::Operation(Arc::from(symbol)), result_type, vec![lhs, rhs])
}

fn derive(callable: Callable, result_type: TypeCode, operands: Vec<QueryPlan>) -> Result<AttributeDefinition> {
    if operands.is_empty() || operands.iter().any(QueryPlan::is_empty) {
        return Err(Error::bad_argument("a derived attribute needs non-empty operand paths"));
    }
    let shapes = operands.clone();
    let reserver: KeyReserver = Arc::new(move |ctx: &Context| -> Result<KeyArray> {
        let keys = shapes.iter().map(|plan| KeyArray::reserve(plan, ctx).map(CollectionKey::List));
        Ok(KeyArray::from_keys(keys.collect::<Result<Vec<_>>>()?))
    });
    let access = Arc::new(DerivedAccess { callable, operands });
    Ok(AttributeDefinition::atomic_collection(result_type, access, CollectionOptions::new().reserve_keys(reserver))?
        .into_derived())
}

impl DerivedAccess {
    fn resolve(&self, ctx: &Context) -> Result<FunctionImpl> {
        match &self.callable {
            Callable::Function(name) => ctx.resolve_function(name, self.operands.len()).map_err(|err| {
                let detail = match err {
                    ResolveError::Unknown(name) => format!("unknown function '{name}'"),
                    ResolveError::WrongArity { name, available } => {
                        format!("function '{name}' takes {available:?} arguments, not {}", self.operands.len())
                    }
                };
                Error::new(ErrorCode::ContextIncomplete, detail)
            }),
            Callable::Operation(symbol) => {
                let lhs = leaf_type(&self.operands[0]);
                let rhs = leaf_type(&self.operands[1]);
                let op = ctx.resolve_operation(symbol, lhs, rhs).ok_or_else(|| {
                    Error::new(ErrorCode::ContextIncomplete, format!("no operation '{symbol}' for {lhs} and {rhs}"))
                })?;
                let apply: FunctionImpl = Arc::new(move |args: &[Value]| match args {
                    [lhs, rhs] => op(lhs, rhs),
                    _ => Err(Error::bad_argument(format!("binary operation applied to {} operands", args.len()))),
                });
                Ok(apply)
            }
        }
    }
}

fn leaf_type(plan: &QueryPlan) -> TypeCode {
    plan.leaf().map_or(TypeCode::NONE, |step| step.attribute().value_type())
}

impl CollectionAccess for DerivedAccess {
    fn create(&self, owner: &Value, selection: Option<&Selection>, ctx: &Context) -> Result<Box<dyn ElementIterator>> {
        let apply = self.resolve(ctx)?;
        let product = QueryProduct::new(self.operands.iter().cloned()).with_keys(ctx)?;
        let mut iterator = DerivedIterator { apply, product, current: None };
        iterator.reset(owner, selection, ctx)?;
        Ok(Box::new(iterator))
    }

    fn has_key(&self) -> bool {
        true
    }
}

struct DerivedIterator {
    apply: FunctionImpl,
    product: QueryProduct,
    // result for the product's current combination
    current: Option<Value>,
}

impl DerivedIterator {
    /// Evaluates the current combination, skipping forward past rejected ones.
    fn compute(&mut self, ctx: &Context) {
        self.current = None;
        while self.product.is_positioned() {
            match (self.apply)(&self.product.values()) {
                Ok(value) => {
                    self.current = Some(value);
                    return;
                }
                Err(error) => {
                    ctx.push_error(error);
                    self.product.advance(ctx);
                }
            }
        }
    }
}

impl ElementIterator for DerivedIterator {
    fn dereference(&mut self, _ctx: &Context) -> Result<Option<Value>> {
        Ok(self.current.clone())
    }

    fn advance(&mut self, ctx: &Context) -> Result<()> {
        self.product.advance(ctx);
        self.compute(ctx);
        Ok(())
    }

    fn reset(&mut self, owner: &Value, _selection: Option<&Selection>, ctx: &Context) -> Result<()> {
        match self.product.reset(owner, ctx) {
            Ok(()) => {}
            Err(error) if error.code() == ErrorCode::EmptySet => {}
            Err(error) => return Err(error),
        }
        self.compute(ctx);
        Ok(())
    }

    fn write_key_list(&self, keys: &mut KeyArray, _ctx: &Context) -> Result<()> {
        for index in 0..self.product.len() {
            if let (Some(list), Some(src)) =
                (keys.get_mut(index).and_then(KeyNode::as_list_mut), self.product.keys(index))
            {
                list.copy_from(src)?;
            }
        }
        Ok(())
    }
}
