//! Per-hop state machine of a query chain.
//!
//! Every hop follows one attribute of the plan. Its state moves between
//! `Uninitialized`, `Positioned(value)` and `Exhausted` under two events:
//!
//! | state \ event  | `Reset(owner)`                  | `Advance`                     |
//! |----------------|---------------------------------|-------------------------------|
//! | Uninitialized  | first value of owner, or Exhausted | Exhausted                  |
//! | Positioned     | first value of owner, or Exhausted | next value, or Exhausted   |
//! | Exhausted      | first value of owner, or Exhausted | Exhausted                  |
//!
//! Scalar and static hops yield at most one value per reset, so `Advance`
//! always exhausts them. Failures reported by accessors are pushed to the
//! context and exhaust the hop.

use crate::attribute::{AttributeKind, ScalarAccess, ScalarHandle};
use crate::collection::{CollectionAccess, ElementIterator};
use crate::keys::{CollectionKey, KeyNode};
use crate::plan::Step;
use crate::shared::{QueryBinding, SharedQuery};
use keypath_core::{Context, Result, Value};
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, PartialEq)]
pub enum HopState {
    Uninitialized,
    Positioned(Value),
    Exhausted,
}

impl HopState {
    pub fn value(&self) -> Option<&Value> {
        match self {
            HopState::Positioned(value) => Some(value),
            _ => None,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            HopState::Uninitialized => "uninitialized",
            HopState::Positioned(_) => "positioned",
            HopState::Exhausted => "exhausted",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum HopEvent<'a> {
    Reset(&'a Value),
    Advance,
}

/// Live resource a hop holds between events.
enum Cursor {
    None,
    Scalar(Box<dyn ScalarHandle>),
    Iterator(Box<dyn ElementIterator>),
    Forwarding(QueryBinding),
}

pub struct Hop {
    step: Step,
    cursor: Cursor,
    state: HopState,
}

impl Hop {
    pub fn new(step: Step) -> Self {
        Self { step, cursor: Cursor::None, state: HopState::Uninitialized }
    }

    pub fn step(&self) -> &Step {
        &self.step
    }

    pub fn state(&self) -> &HopState {
        &self.state
    }

    pub fn value(&self) -> Option<&Value> {
        self.state.value()
    }

    /// Drives the hop with one event and returns the resulting state.
    pub fn apply(&mut self, event: HopEvent<'_>, ctx: &Context) -> &HopState {
        let before = self.state.label();
        let outcome = match event {
            HopEvent::Reset(owner) => self.enter(owner, ctx),
            HopEvent::Advance => self.next(ctx),
        };
        self.state = match outcome {
            Ok(Some(value)) => HopState::Positioned(value),
            Ok(None) => HopState::Exhausted,
            Err(error) => {
                ctx.push_error(error);
                HopState::Exhausted
            }
        };
        trace!(hop = self.step.name(), from = before, to = self.state.label(), "hop transition");
        &self.state
    }

    fn enter(&mut self, owner: &Value, ctx: &Context) -> Result<Option<Value>> {
        match self.step.attribute().kind() {
            AttributeKind::AtomicScalar { access, .. } | AttributeKind::CompoundScalar { access, .. } => {
                let access = Arc::clone(access);
                self.enter_scalar(access.as_ref(), owner, ctx)
            }
            AttributeKind::AtomicCollection { collection, .. } | AttributeKind::CompoundCollection { collection, .. } => {
                let access = Arc::clone(collection.access());
                self.enter_collection(access.as_ref(), owner, ctx)
            }
            AttributeKind::Forwarding(query) => {
                let query = query.clone();
                self.enter_forwarding(&query, owner, ctx)
            }
            AttributeKind::Static { value, .. } => Ok(Some(value.clone())),
        }
    }

    fn enter_scalar(&mut self, access: &dyn ScalarAccess, owner: &Value, ctx: &Context) -> Result<Option<Value>> {
        let reused = match &mut self.cursor {
            Cursor::Scalar(handle) => handle.reset(owner, ctx)?,
            _ => false,
        };
        if !reused {
            self.cursor = Cursor::Scalar(access.instantiate(owner, ctx)?);
        }
        match &mut self.cursor {
            Cursor::Scalar(handle) => handle.dereference(owner, ctx),
            _ => Ok(None),
        }
    }

    fn enter_collection(&mut self, access: &dyn CollectionAccess, owner: &Value, ctx: &Context) -> Result<Option<Value>> {
        let selection = self.step.selection();
        match &mut self.cursor {
            Cursor::Iterator(it) => it.reset(owner, selection, ctx)?,
            // a fresh iterator starts at the owner's first element
            cursor => *cursor = Cursor::Iterator(access.create(owner, selection, ctx)?),
        }
        match &mut self.cursor {
            Cursor::Iterator(it) => it.dereference(ctx),
            _ => Ok(None),
        }
    }

    fn enter_forwarding(&mut self, query: &SharedQuery, owner: &Value, ctx: &Context) -> Result<Option<Value>> {
        if !matches!(self.cursor, Cursor::Forwarding(_)) {
            self.cursor = Cursor::Forwarding(query.bind()?);
        }
        match &self.cursor {
            Cursor::Forwarding(binding) => Ok(if binding.reset(owner, ctx) { binding.get(None, ctx) } else { None }),
            _ => Ok(None),
        }
    }

    fn next(&mut self, ctx: &Context) -> Result<Option<Value>> {
        if !matches!(self.state, HopState::Positioned(_)) {
            return Ok(None);
        }
        match &mut self.cursor {
            Cursor::Iterator(it) => {
                it.advance(ctx)?;
                it.dereference(ctx)
            }
            Cursor::Forwarding(binding) => Ok(if binding.advance(ctx) { binding.get(None, ctx) } else { None }),
            // scalars and statics are visited once per reset
            Cursor::Scalar(_) | Cursor::None => Ok(None),
        }
    }

    /// Writes the key of the current element into `node`. A typed leaf whose
    /// element has no key falls back to the key type's initial value. Nodes
    /// without a key concept are left untouched.
    pub fn write_key(&self, node: &mut KeyNode, ctx: &Context) -> Result<()> {
        if !matches!(self.state, HopState::Positioned(_)) {
            return Ok(());
        }
        match (node.key_mut(), &self.cursor) {
            (CollectionKey::Typed(typed), Cursor::Iterator(it)) => {
                let key = it.key(ctx)?.unwrap_or_else(|| typed.value_type().init());
                typed.set(key);
            }
            (CollectionKey::List(list), Cursor::Iterator(it)) => it.write_key_list(list, ctx)?,
            (CollectionKey::List(list), Cursor::Forwarding(binding)) => {
                binding.get(Some(list), ctx);
            }
            _ => {}
        }
        Ok(())
    }

    /// Drops the hop's iterator or handle and forgets its position.
    pub fn release(&mut self) {
        self.cursor = Cursor::None;
        self.state = HopState::Uninitialized;
    }
}

impl core::fmt::Debug for Hop {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hop").field("step", &self.step.name()).field("state", &self.state).finish_non_exhaustive()
    }
}
