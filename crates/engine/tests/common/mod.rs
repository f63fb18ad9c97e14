//! Shared fixtures: a small event/hit model and counting collections.
#![allow(dead_code)]

use keypath_core::{Context, Result, TypeCode, Value};
use keypath_engine::{
    AttributeDefinition, CollectionAccess, CollectionInterface, CollectionOptions, Compound, QueryPlan, scalar_fn,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const INT: TypeCode = TypeCode::new(2);
pub const FLOAT: TypeCode = TypeCode::new(3);

#[derive(Debug)]
pub struct Hit {
    pub id: i64,
    pub x: f64,
}

#[derive(Debug)]
pub struct Event {
    pub hits: Vec<Arc<Hit>>,
}

impl Event {
    pub fn with_hits(hits: &[(i64, f64)]) -> Value {
        Value::instance(Event { hits: hits.iter().map(|&(id, x)| Arc::new(Hit { id, x })).collect() })
    }
}

/// Lifecycle counters of one collection attribute.
#[derive(Debug, Default)]
pub struct Counters {
    created: AtomicUsize,
    resets: AtomicUsize,
    destroyed: AtomicUsize,
}

impl Counters {
    pub fn new() -> Arc<Self> {
        Arc::default()
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }
}

pub struct ListState {
    items: Vec<Value>,
    pos: usize,
}

type Items = Arc<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

/// Collection over the list `items` derives from the owner. When `key_of` is
/// given the collection exposes keys computed from the current element.
pub fn list_collection(
    items: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    key_of: Option<fn(&Value) -> Value>,
    counters: &Arc<Counters>,
) -> Arc<dyn CollectionAccess> {
    let items: Items = Arc::new(items);
    let create = {
        let items = Arc::clone(&items);
        let counters = Arc::clone(counters);
        move |owner: &Value, _: Option<&()>, _: &Context| -> Result<ListState> {
            counters.created.fetch_add(1, Ordering::SeqCst);
            Ok(ListState { items: items(owner), pos: 0 })
        }
    };
    let reset = {
        let counters = Arc::clone(counters);
        move |state: &mut ListState, owner: &Value, _: Option<&()>, _: &Context| -> Result<()> {
            counters.resets.fetch_add(1, Ordering::SeqCst);
            state.items = items(owner);
            state.pos = 0;
            Ok(())
        }
    };
    let destroy = {
        let counters = Arc::clone(counters);
        move |_: ListState| {
            counters.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    };
    let mut interface = CollectionInterface::<ListState>::new()
        .create(create)
        .dereference(|state| state.items.get(state.pos).cloned())
        .advance(|state| state.pos += 1)
        .reset(reset)
        .destroy(destroy);
    if let Some(key_of) = key_of {
        interface = interface.get_key(move |state| state.items.get(state.pos).map(key_of));
    }
    interface.build().expect("complete interface")
}

/// Atomic integer collection yielding `owner * 10 + i` for `i` in `0..width`,
/// keyed by the element itself.
pub fn digits(width: i64, counters: &Arc<Counters>) -> Arc<AttributeDefinition> {
    let access = list_collection(
        move |owner| {
            let base = owner.as_int().unwrap_or(0) * 10;
            (0..width).map(|i| Value::Int(base + i)).collect()
        },
        Some(Value::clone),
        counters,
    );
    Arc::new(AttributeDefinition::atomic_collection(INT, access, CollectionOptions::keyed_by(INT)).unwrap())
}

pub struct EventSchema {
    pub event: Arc<Compound>,
    pub hit: Arc<Compound>,
    pub hits: Arc<Counters>,
}

/// `Event { hits: [Hit] keyed by id, run: static 7 }`, `Hit { id, x }`.
pub fn event_schema() -> EventSchema {
    let hit = Compound::new("Hit");
    let id = scalar_fn(|h| h.downcast_ref::<Arc<Hit>>().map(|h| Value::Int(h.id)));
    let x = scalar_fn(|h| h.downcast_ref::<Arc<Hit>>().map(|h| Value::Float(h.x)));
    hit.add("id", AttributeDefinition::atomic_scalar(INT, id)).unwrap();
    hit.add("x", AttributeDefinition::atomic_scalar(FLOAT, x)).unwrap();

    let counters = Counters::new();
    let hits = list_collection(
        |event| {
            event
                .downcast_ref::<Event>()
                .map(|e| e.hits.iter().map(|h| Value::instance(Arc::clone(h))).collect())
                .unwrap_or_default()
        },
        Some(|hit: &Value| Value::Int(hit.downcast_ref::<Arc<Hit>>().map_or(0, |h| h.id))),
        &counters,
    );
    let event = Compound::new("Event");
    event
        .add("hits", AttributeDefinition::compound_collection(&hit, hits, CollectionOptions::keyed_by(INT)).unwrap())
        .unwrap();
    event.add("run", AttributeDefinition::static_value(INT, Value::Int(7))).unwrap();
    EventSchema { event, hit, hits: counters }
}

pub fn plan(compound: &Arc<Compound>, path: &str, ctx: &Context) -> QueryPlan {
    compound.resolve_path(path, ctx).unwrap()
}
