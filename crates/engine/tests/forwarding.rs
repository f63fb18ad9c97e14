//! Forwarding attributes iterate the results of a wrapped query.

mod common;

use common::{Counters, Event, FLOAT, event_schema, list_collection, plan};
use keypath_core::{Context, ErrorCode, Value};
use keypath_engine::{
    AttributeDefinition, AttributeTraits, CollectionOptions, Compound, KeyNode, Query, QueryPlan, SharedQuery,
};
use rstest::rstest;
use std::sync::Arc;

fn three_hits() -> Value {
    Event::with_hits(&[(101, 1.0), (102, 2.0), (103, 3.0)])
}

#[rstest]
fn forwarding_yields_the_wrapped_results() {
    let ctx = Context::root();
    let schema = event_schema();
    let xs = SharedQuery::new(plan(&schema.event, "hits.x", &ctx));
    let attribute = schema.event.add("xs", AttributeDefinition::forwarding(xs)).unwrap();
    assert!(attribute.traits().contains(AttributeTraits::FORWARDING | AttributeTraits::COLLECTION));
    assert_eq!(attribute.value_type(), FLOAT);

    let mut query = Query::new(plan(&schema.event, "xs", &ctx));
    let rows: Vec<(String, Value)> =
        query.results(&three_hits(), &ctx).map(|row| (row.keys.to_string(), row.value)).collect();
    assert_eq!(
        rows,
        [
            ("((101))".to_string(), Value::Float(1.0)),
            ("((102))".to_string(), Value::Float(2.0)),
            ("((103))".to_string(), Value::Float(3.0)),
        ]
    );
}

#[rstest]
fn forwarded_keys_are_a_subtree() {
    let ctx = Context::root();
    let schema = event_schema();
    let xs = SharedQuery::new(plan(&schema.event, "hits.x", &ctx));
    schema.event.add("xs", AttributeDefinition::forwarding(xs)).unwrap();

    let run = Compound::new("Run");
    let events = list_collection(
        |run| run.downcast_ref::<Vec<Value>>().cloned().unwrap_or_default(),
        None,
        &Counters::new(),
    );
    run.add("events", AttributeDefinition::compound_collection(&schema.event, events, CollectionOptions::new()).unwrap())
        .unwrap();

    let root = Value::instance(vec![three_hits(), Event::with_hits(&[(201, 9.5)])]);
    let mut query = Query::new(plan(&run, "events.xs", &ctx));
    let mut keys = query.reserve_keys(&ctx).unwrap();
    let mut seen = Vec::new();
    if query.reset(&root, &ctx) {
        loop {
            let value = query.get(Some(&mut keys), &ctx).unwrap();
            seen.push((keys.to_string(), value));
            if !query.advance(&ctx) {
                break;
            }
        }
    }
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[3], ("((201))".to_string(), Value::Float(9.5)));
    let inner = keys.get(1).and_then(KeyNode::as_list).unwrap();
    assert_eq!(inner.len(), 2);
    assert!(inner.get(1).unwrap().is_terminal());
    assert!(keys.get(0).unwrap().is_empty());
    assert!(!ctx.has_errors());
}

#[rstest]
fn a_shared_query_admits_one_binding() {
    let ctx = Context::root();
    let schema = event_schema();
    let shared = SharedQuery::new(plan(&schema.event, "hits.x", &ctx));
    let binding = shared.bind().unwrap();
    assert!(shared.is_bound());
    assert_eq!(shared.bind().err().map(|e| e.code()), Some(ErrorCode::AlreadyBound));
    assert!(binding.reset(&three_hits(), &ctx));
    assert_eq!(binding.get(None, &ctx), Some(Value::Float(1.0)));
    drop(binding);
    assert!(!shared.is_bound());
    assert_eq!(schema.hits.destroyed(), 1, "unbinding releases the wrapped iterators");
    assert!(shared.bind().is_ok());
}

#[rstest]
fn concurrent_use_of_a_forwarding_attribute_is_reported() {
    let ctx = Context::root();
    let schema = event_schema();
    let xs = Arc::new(AttributeDefinition::forwarding(SharedQuery::new(plan(&schema.event, "hits.x", &ctx))));
    let mut first = Query::new(QueryPlan::default().step("xs", &xs));
    let mut second = Query::new(QueryPlan::default().step("xs", &xs));
    assert!(first.reset(&three_hits(), &ctx));
    assert!(!second.reset(&three_hits(), &ctx));
    assert_eq!(ctx.take_errors()[0].code(), ErrorCode::AlreadyBound);

    first.release();
    assert!(second.reset(&three_hits(), &ctx));
    assert_eq!(second.get(None, &ctx), Some(Value::Float(1.0)));
}
