//! Cartesian product of independent queries.
//!
//! Combinations are enumerated lexicographically with the last factor varying
//! fastest, like the hops of a single query, but every factor is rooted at the
//! same value instead of at its predecessor.

use crate::keys::KeyArray;
use crate::plan::QueryPlan;
use crate::query::Query;
use keypath_core::{Context, Error, ErrorCode, Result, Value};
use tracing::trace;

#[derive(Debug)]
struct Factor {
    query: Query,
    keys: Option<KeyArray>,
    value: Option<Value>,
}

impl Factor {
    fn first(&mut self, root: &Value, ctx: &Context) -> bool {
        self.value = None;
        self.query.reset(root, ctx) && self.fetch(ctx)
    }

    fn fetch(&mut self, ctx: &Context) -> bool {
        self.value = self.query.get(self.keys.as_mut(), ctx);
        self.value.is_some()
    }
}

#[derive(Debug)]
pub struct QueryProduct {
    factors: Vec<Factor>,
    root: Option<Value>,
    positioned: bool,
}

impl QueryProduct {
    pub fn new(plans: impl IntoIterator<Item = QueryPlan>) -> Self {
        Self::from_queries(plans.into_iter().map(Query::new))
    }

    pub fn from_queries(queries: impl IntoIterator<Item = Query>) -> Self {
        let factors = queries.into_iter().map(|query| Factor { query, keys: None, value: None }).collect();
        Self { factors, root: None, positioned: false }
    }

    /// Reserves a key array per factor so that [`QueryProduct::keys`] is filled.
    pub fn with_keys(mut self, ctx: &Context) -> Result<Self> {
        for factor in &mut self.factors {
            factor.keys = Some(factor.query.reserve_keys(ctx)?);
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.factors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Positions every factor at its first value, in order. Fails with
    /// `EmptySet` at the first factor without values; later factors are not
    /// touched. A product of zero factors is empty too.
    pub fn reset(&mut self, root: &Value, ctx: &Context) -> Result<()> {
        self.positioned = false;
        self.root = Some(root.clone());
        if self.factors.is_empty() {
            return Err(Error::new(ErrorCode::EmptySet, "product of zero factors"));
        }
        for (index, factor) in self.factors.iter_mut().enumerate() {
            if !factor.first(root, ctx) {
                trace!(factor = index, "empty factor");
                return Err(Error::new(ErrorCode::EmptySet, format!("factor {index} has no values")));
            }
        }
        self.positioned = true;
        Ok(())
    }

    /// Moves to the next combination; `false` once all are enumerated.
    pub fn advance(&mut self, ctx: &Context) -> bool {
        if !self.positioned {
            return false;
        }
        let Some(root) = self.root.clone() else {
            return false;
        };
        let Some(index) = self.factors.iter_mut().rposition(|factor| factor.query.advance(ctx) && factor.fetch(ctx))
        else {
            trace!("product exhausted");
            self.positioned = false;
            return false;
        };
        trace!(factor = index, "product advanced");
        for factor in &mut self.factors[index + 1..] {
            if !factor.first(&root, ctx) {
                self.positioned = false;
                return false;
            }
        }
        true
    }

    pub fn is_positioned(&self) -> bool {
        self.positioned
    }

    /// Current value of factor `index`.
    pub fn value(&self, index: usize) -> Option<&Value> {
        self.factors.get(index).and_then(|factor| factor.value.as_ref())
    }

    /// Current combination, one value per factor.
    pub fn values(&self) -> Vec<Value> {
        self.factors.iter().filter_map(|factor| factor.value.clone()).collect()
    }

    /// Keys of factor `index`'s current value, if keys were reserved.
    pub fn keys(&self, index: usize) -> Option<&KeyArray> {
        self.factors.get(index).and_then(|factor| factor.keys.as_ref())
    }
}
