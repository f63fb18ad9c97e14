//! Query chains.
//!
//! A [`Query`] walks a [`QueryPlan`] from a root value, one [`Hop`] per step.
//! Positions are enumerated depth first with the last hop varying fastest: when
//! a hop runs out, its predecessor advances and every following hop is reset
//! with the new owner. "No value" is the only termination signal; failures go
//! to the context's error queue.

use crate::hop::{Hop, HopEvent, HopState};
use crate::keys::KeyArray;
use crate::plan::QueryPlan;
use keypath_core::{Context, Error, ErrorCode, Result, Value};
use tracing::{debug, debug_span};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Fresh,
    Positioned,
    Exhausted,
}

#[derive(Debug)]
pub struct Query {
    plan: QueryPlan,
    hops: Vec<Hop>,
    root: Option<Value>,
    status: Status,
}

impl Query {
    pub fn new(plan: QueryPlan) -> Self {
        let hops = plan.steps().iter().cloned().map(Hop::new).collect();
        Self { plan, hops, root: None, status: Status::Fresh }
    }

    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    pub fn depth(&self) -> usize {
        self.hops.len()
    }

    /// State of hop `index`, mostly useful for diagnostics.
    pub fn hop_state(&self, index: usize) -> Option<&HopState> {
        self.hops.get(index).map(Hop::state)
    }

    /// Allocates a key array shaped for this query.
    pub fn reserve_keys(&self, ctx: &Context) -> Result<KeyArray> {
        KeyArray::reserve(&self.plan, ctx)
    }

    /// Positions the query at the first complete result under `root`.
    /// Returns whether a value is available.
    pub fn reset(&mut self, root: &Value, ctx: &Context) -> bool {
        let _span = debug_span!("query.reset", path = %self.plan.path()).entered();
        self.root = Some(root.clone());
        let found = !self.hops.is_empty() && self.settle(0, true, ctx);
        self.status = if found { Status::Positioned } else { Status::Exhausted };
        debug!(found, "query reset");
        found
    }

    /// Moves to the next complete result. A query that was never reset is
    /// reset from its last root instead.
    pub fn advance(&mut self, ctx: &Context) -> bool {
        match self.status {
            Status::Fresh => self.restart(ctx),
            Status::Exhausted => false,
            Status::Positioned => {
                let found = self.settle(self.hops.len() - 1, false, ctx);
                if !found {
                    self.status = Status::Exhausted;
                }
                found
            }
        }
    }

    /// Value at the current position, filling `keys` if given. `None` once
    /// the query is exhausted or when the keys cannot be written.
    pub fn get(&mut self, keys: Option<&mut KeyArray>, ctx: &Context) -> Option<Value> {
        if self.status == Status::Fresh && !self.restart(ctx) {
            return None;
        }
        if self.status != Status::Positioned {
            return None;
        }
        if let Some(keys) = keys
            && let Err(error) = self.write_keys(keys, ctx)
        {
            ctx.push_error(error);
            return None;
        }
        self.hops.last().and_then(Hop::value).cloned()
    }

    fn restart(&mut self, ctx: &Context) -> bool {
        match self.root.clone() {
            Some(root) => self.reset(&root, ctx),
            None => {
                ctx.push_error(Error::new(
                    ErrorCode::ContextIncomplete,
                    format!("query '{}' used before reset", self.plan.path()),
                ));
                false
            }
        }
    }

    fn write_keys(&self, keys: &mut KeyArray, ctx: &Context) -> Result<()> {
        if keys.len() != self.hops.len() {
            return Err(Error::new(
                ErrorCode::ShapeMismatch,
                format!("key array has {} nodes, query has {} hops", keys.len(), self.hops.len()),
            ));
        }
        for (index, hop) in self.hops.iter().enumerate() {
            if let Some(node) = keys.get_mut(index) {
                hop.write_key(node, ctx)?;
            }
        }
        Ok(())
    }

    /// Runs the hop chain from `level` until every hop is positioned or the
    /// top hop runs out. `entering` resets hop `level` with its owner,
    /// otherwise the hop is advanced.
    fn settle(&mut self, mut level: usize, mut entering: bool, ctx: &Context) -> bool {
        loop {
            let state = if entering {
                let owner = match level {
                    0 => self.root.clone(),
                    _ => self.hops[level - 1].value().cloned(),
                };
                let Some(owner) = owner else {
                    return false;
                };
                self.hops[level].apply(HopEvent::Reset(&owner), ctx)
            } else {
                self.hops[level].apply(HopEvent::Advance, ctx)
            };
            if matches!(state, HopState::Positioned(_)) {
                if level + 1 == self.hops.len() {
                    return true;
                }
                level += 1;
                entering = true;
            } else {
                if level == 0 {
                    return false;
                }
                level -= 1;
                entering = false;
            }
        }
    }

    /// Releases every hop's iterator or handle. The query can be reset again.
    pub fn release(&mut self) {
        for hop in &mut self.hops {
            hop.release();
        }
        self.status = Status::Fresh;
    }

    /// Tears the query down. Equivalent to dropping it.
    pub fn destroy(self) {
        drop(self);
    }

    /// One reset/advance cycle as an iterator of rows.
    pub fn results<'q>(&'q mut self, root: &Value, ctx: &'q Context<'q>) -> Results<'q> {
        let template = match self.reserve_keys(ctx) {
            Ok(keys) => Some(keys),
            Err(error) => {
                ctx.push_error(error);
                None
            }
        };
        Results { query: self, ctx, root: root.clone(), template, started: false }
    }
}

/// One result: the value and the keys of the collection elements it came from.
#[derive(Debug, Clone)]
pub struct QueryRow {
    pub keys: KeyArray,
    pub value: Value,
}

pub struct Results<'q> {
    query: &'q mut Query,
    ctx: &'q Context<'q>,
    root: Value,
    // `None` when the keys could not be reserved; the iterator is then empty.
    template: Option<KeyArray>,
    started: bool,
}

impl Iterator for Results<'_> {
    type Item = QueryRow;

    fn next(&mut self) -> Option<QueryRow> {
        let template = self.template.as_ref()?;
        let available = if self.started {
            self.query.advance(self.ctx)
        } else {
            self.started = true;
            self.query.reset(&self.root, self.ctx)
        };
        if !available {
            return None;
        }
        let mut keys = template.clone();
        let value = self.query.get(Some(&mut keys), self.ctx)?;
        Some(QueryRow { keys, value })
    }
}
