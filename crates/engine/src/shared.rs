//! Queries shared between forwarding attributes and their hops.

use crate::keys::KeyArray;
use crate::plan::QueryPlan;
use crate::query::Query;
use keypath_core::{Context, Error, ErrorCode, Result, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct QueryCell {
    plan: QueryPlan,
    bound: AtomicBool,
    query: Mutex<Query>,
}

/// A query that admits one active [`QueryBinding`] at a time.
#[derive(Clone)]
pub struct SharedQuery(Arc<QueryCell>);

impl SharedQuery {
    pub fn new(plan: QueryPlan) -> Self {
        let query = Query::new(plan.clone());
        Self(Arc::new(QueryCell { plan, bound: AtomicBool::new(false), query: Mutex::new(query) }))
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.0.plan
    }

    pub fn is_bound(&self) -> bool {
        self.0.bound.load(Ordering::Acquire)
    }

    /// Claims the query. Fails with `AlreadyBound` while another binding lives.
    pub fn bind(&self) -> Result<QueryBinding> {
        self.0.bound.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire).map_err(|_| {
            Error::new(ErrorCode::AlreadyBound, format!("query '{}' is already bound", self.0.plan.path()))
        })?;
        Ok(QueryBinding { cell: Arc::clone(&self.0) })
    }
}

impl core::fmt::Debug for SharedQuery {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedQuery").field("path", &self.0.plan.path()).field("bound", &self.is_bound()).finish()
    }
}

/// Exclusive use of a [`SharedQuery`]. Dropping it releases the query's
/// iterators and frees the binding.
pub struct QueryBinding {
    cell: Arc<QueryCell>,
}

impl QueryBinding {
    fn query(&self) -> MutexGuard<'_, Query> {
        self.cell.query.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.cell.plan
    }

    pub fn reset(&self, root: &Value, ctx: &Context) -> bool {
        self.query().reset(root, ctx)
    }

    pub fn get(&self, keys: Option<&mut KeyArray>, ctx: &Context) -> Option<Value> {
        self.query().get(keys, ctx)
    }

    pub fn advance(&self, ctx: &Context) -> bool {
        self.query().advance(ctx)
    }
}

impl Drop for QueryBinding {
    fn drop(&mut self) {
        self.query().release();
        self.cell.bound.store(false, Ordering::Release);
    }
}
