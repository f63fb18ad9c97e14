//! Built-in sample data the CLI queries: a run of events, each with a few hits.
//!
//! ```text
//! Run    { label, source: static, events: [Event] keyed by number, xs -> events.hits.x }
//! Event  { number, first_hit: Hit, hits: [Hit] keyed by id, scaled, slope }
//! Hit    { id, x, y }
//! ```
//!
//! `scaled` and `slope` are derived attributes living on a virtual compound
//! layered over `Event`; `hits` accepts a `[>= N]` selection on `x`.

use keypath_core::{Context, Error, Instance, Result, Value};
use keypath_engine::{
    AttributeDefinition, CollectionInterface, CollectionOptions, Compound, SharedQuery, derived, scalar_fn,
};
use std::any::Any;
use std::sync::Arc;

#[derive(Debug)]
pub struct Hit {
    pub id: i64,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug)]
pub struct Event {
    pub number: i64,
    pub hits: Vec<Arc<Hit>>,
}

#[derive(Debug)]
pub struct Run {
    pub label: String,
    pub events: Vec<Arc<Event>>,
}

/// Context, schema and root object of the sample data set.
pub struct Demo {
    pub ctx: Context<'static>,
    pub run: Arc<Compound>,
    /// Every compound of the schema, outermost first. Attributes only hold
    /// weak references to their target compounds, so this keeps them alive.
    pub compounds: Vec<Arc<Compound>>,
    pub root: Value,
}

impl Demo {
    pub fn build() -> Result<Self> {
        let mut ctx = Context::root();
        register_collaborators(&mut ctx);
        let (int, float, string) = (ctx.type_code("int"), ctx.type_code("float"), ctx.type_code("string"));

        let hit = Compound::new("Hit");
        hit.add_indexed("id", 0, AttributeDefinition::atomic_scalar(int, scalar_fn(|h| field(h, |h: &Hit| h.id))))?;
        hit.add_indexed("x", 1, AttributeDefinition::atomic_scalar(float, scalar_fn(|h| field(h, |h: &Hit| h.x))))?;
        hit.add_indexed("y", 2, AttributeDefinition::atomic_scalar(float, scalar_fn(|h| field(h, |h: &Hit| h.y))))?;

        let event = Compound::new("Event");
        event.add("number", AttributeDefinition::atomic_scalar(int, scalar_fn(|e| field(e, |e: &Event| e.number))))?;
        let first_hit =
            scalar_fn(|e| e.downcast_ref::<Event>().and_then(|e| e.hits.first()).map(|h| shared(Arc::clone(h))));
        event.add("first_hit", AttributeDefinition::compound_scalar(&hit, first_hit))?;
        let hits = elements::<f64>(hits_of, key_of::<Hit>(|h| h.id)).compile_selection(parse_threshold).build()?;
        event.add("hits", AttributeDefinition::compound_collection(&hit, hits, CollectionOptions::keyed_by(int))?)?;

        let view = Compound::virtual_of(&event);
        let xs = event.resolve_path("hits.x", &ctx)?;
        let ys = event.resolve_path("hits.y", &ctx)?;
        view.add("scaled", derived::function("scale", float, vec![xs.clone()])?)?;
        view.add("slope", derived::operation("/", float, ys, xs)?)?;

        let run = Compound::new("Run");
        let label = scalar_fn(|r| field(r, |r: &Run| r.label.clone()));
        run.add("label", AttributeDefinition::atomic_scalar(string, label))?;
        run.add("source", AttributeDefinition::static_value(string, Value::from("built-in sample")))?;
        let events = elements::<()>(events_of, key_of::<Event>(|e| e.number)).build()?;
        run.add("events", AttributeDefinition::compound_collection(&view, events, CollectionOptions::keyed_by(int))?)?;
        let all_xs = SharedQuery::new(run.resolve_path("events.hits.x", &ctx)?);
        run.add("xs", AttributeDefinition::forwarding(all_xs))?;

        let root = shared(Arc::new(sample()));
        Ok(Self { ctx, run: Arc::clone(&run), compounds: vec![run, view, event, hit], root })
    }
}

fn sample() -> Run {
    let event = |number, hits: &[(i64, f64, f64)]| {
        Arc::new(Event { number, hits: hits.iter().map(|&(id, x, y)| Arc::new(Hit { id, x, y })).collect() })
    };
    Run {
        label: "demo run".to_owned(),
        events: vec![
            event(1, &[(101, 1.5, 0.5), (102, 3.0, 2.0)]),
            event(2, &[(201, -0.5, 1.0), (202, 0.0, 1.0)]),
            event(3, &[]),
        ],
    }
}

fn register_collaborators(ctx: &mut Context) {
    let float = ctx.type_code("float");
    ctx.functions_mut().register_fn("scale", 1, |args| {
        args[0].as_float().map(|x| Value::Float(x * 10.0)).ok_or_else(|| Error::bad_argument("scale expects a number"))
    });
    ctx.operations_mut().register("/", float, float, |lhs, rhs| match (lhs.as_float(), rhs.as_float()) {
        (Some(_), Some(divisor)) if divisor == 0.0 => Err(Error::arithmetic("division by zero")),
        (Some(dividend), Some(divisor)) => Ok(Value::Float(dividend / divisor)),
        _ => Err(Error::bad_argument("'/' expects two numbers")),
    });
}

fn shared<T: Any + Send + Sync>(object: Arc<T>) -> Value {
    Value::Instance(Instance::from_arc(object))
}

fn field<T: Any, V: Into<Value>>(owner: &Value, get: impl Fn(&T) -> V) -> Option<Value> {
    owner.downcast_ref::<T>().map(|object| get(object).into())
}

fn key_of<T: Any>(id: fn(&T) -> i64) -> impl Fn(&Value) -> Option<Value> + Send + Sync + 'static {
    move |element| element.downcast_ref::<T>().map(|object| Value::Int(id(object)))
}

fn hits_of(event: &Value, min_x: Option<&f64>) -> Vec<Value> {
    event
        .downcast_ref::<Event>()
        .map(|event| {
            let kept = event.hits.iter().filter(|hit| min_x.is_none_or(|min| hit.x >= *min));
            kept.map(|hit| shared(Arc::clone(hit))).collect()
        })
        .unwrap_or_default()
}

fn events_of(run: &Value, _: Option<&()>) -> Vec<Value> {
    run.downcast_ref::<Run>().map(|run| run.events.iter().map(|e| shared(Arc::clone(e))).collect()).unwrap_or_default()
}

/// `>= N` keeps the hits whose `x` is at least `N`.
fn parse_threshold(text: &str) -> Result<f64> {
    let bound = text.strip_prefix(">=").ok_or_else(|| Error::bad_argument(format!("expected '>= N', got '{text}'")))?;
    bound.trim().parse().map_err(|err| Error::bad_argument(format!("bad threshold '{}': {err}", bound.trim())))
}

struct Cursor {
    items: Vec<Value>,
    pos: usize,
}

/// Collection over a vector the owner hands out, keyed by `key`.
fn elements<F: Any + Send + Sync>(
    items: fn(&Value, Option<&F>) -> Vec<Value>,
    key: impl Fn(&Value) -> Option<Value> + Send + Sync + 'static,
) -> CollectionInterface<Cursor, F> {
    CollectionInterface::new()
        .create(move |owner, filter, _| Ok(Cursor { items: items(owner, filter), pos: 0 }))
        .dereference(|cursor| cursor.items.get(cursor.pos).cloned())
        .advance(|cursor| cursor.pos += 1)
        .reset(move |cursor, owner, filter, _| {
            cursor.items = items(owner, filter);
            cursor.pos = 0;
            Ok(())
        })
        .destroy(drop)
        .get_key(move |cursor| cursor.items.get(cursor.pos).and_then(&key))
}
