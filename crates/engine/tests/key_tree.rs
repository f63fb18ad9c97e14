//! Key arrays reserved for and filled by queries.

mod common;

use common::{Counters, INT, digits, list_collection};
use keypath_core::{Context, ErrorCode, TypeCode, Value, ValueType};
use keypath_engine::{AttributeDefinition, CollectionKey, CollectionOptions, KeyArray, Query, QueryPlan};
use rstest::rstest;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Default)]
struct Tally {
    init: AtomicUsize,
    copy: AtomicUsize,
    destroy: AtomicUsize,
}

/// Integer-like key type that records its lifecycle.
struct TallyType(Arc<Tally>);

impl ValueType for TallyType {
    fn name(&self) -> &str {
        "tally"
    }
    fn size(&self) -> usize {
        8
    }
    fn init(&self) -> Value {
        self.0.init.fetch_add(1, Ordering::SeqCst);
        Value::Int(0)
    }
    fn copy(&self, value: &Value) -> Value {
        self.0.copy.fetch_add(1, Ordering::SeqCst);
        value.clone()
    }
    fn destroy(&self, _value: Value) {
        self.0.destroy.fetch_add(1, Ordering::SeqCst);
    }
    fn as_bool(&self, _value: &Value) -> Option<bool> {
        None
    }
    fn as_int(&self, value: &Value) -> Option<i64> {
        value.as_int()
    }
    fn as_float(&self, value: &Value) -> Option<f64> {
        value.as_float()
    }
    fn as_string(&self, value: &Value) -> Option<String> {
        value.as_int().map(|v| format!("#{v}"))
    }
}

fn tallied(ctx: &mut Context, tally: &Arc<Tally>) -> (TypeCode, Arc<AttributeDefinition>) {
    let code = ctx.register_type(Arc::new(TallyType(Arc::clone(tally)))).unwrap();
    let access = list_collection(
        |owner| (0..3).map(|i| Value::Int(owner.as_int().unwrap_or(0) + i)).collect(),
        Some(Value::clone),
        &Counters::new(),
    );
    let attribute = AttributeDefinition::atomic_collection(INT, access, CollectionOptions::keyed_by(code)).unwrap();
    (code, Arc::new(attribute))
}

#[rstest]
fn reserve_follows_key_declarations() {
    let mut ctx = Context::root();
    let tally = Arc::default();
    let (code, keyed) = tallied(&mut ctx, &tally);
    let constant = Arc::new(AttributeDefinition::static_value(INT, Value::Int(1)));
    let plan = QueryPlan::default().step("keyed", &keyed).step("constant", &constant);
    let keys = KeyArray::reserve(&plan, &ctx).unwrap();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys.get(0).unwrap().type_code(), code);
    assert_eq!(keys.get(0).unwrap().value(), Some(&Value::Int(0)), "leaves start from the type's init");
    assert!(keys.get(1).unwrap().is_empty());
    assert_eq!(tally.init.load(Ordering::SeqCst), 1);
}

#[rstest]
fn reserve_fails_for_unregistered_key_types() {
    let ctx = Context::root();
    let access = list_collection(|_| Vec::new(), Some(Value::clone), &Counters::new());
    let unknown = TypeCode::new(99);
    let attribute = AttributeDefinition::atomic_collection(INT, access, CollectionOptions::keyed_by(unknown)).unwrap();
    let plan = QueryPlan::default().step("a", &Arc::new(attribute));
    assert_eq!(KeyArray::reserve(&plan, &ctx).unwrap_err().code(), ErrorCode::ContextIncomplete);
}

#[rstest]
fn key_values_are_destroyed_exactly_once() {
    let mut ctx = Context::root();
    let tally = Arc::default();
    let (_, keyed) = tallied(&mut ctx, &tally);
    let mut query = Query::new(QueryPlan::default().step("keyed", &keyed));
    let mut keys = query.reserve_keys(&ctx).unwrap();
    let mut seen = Vec::new();
    if query.reset(&Value::Int(40), &ctx) {
        loop {
            query.get(Some(&mut keys), &ctx);
            seen.push(keys.to_string());
            if !query.advance(&ctx) {
                break;
            }
        }
    }
    assert_eq!(seen, ["(#40)", "(#41)", "(#42)"]);
    // the initial value and the first two keys were overwritten
    assert_eq!(tally.destroy.load(Ordering::SeqCst), 3);
    keys.destroy();
    assert_eq!(tally.destroy.load(Ordering::SeqCst), 4);
    assert_eq!(tally.init.load(Ordering::SeqCst), 1);
}

#[rstest]
fn clones_copy_through_the_type() {
    let mut ctx = Context::root();
    let tally = Arc::default();
    let (_, keyed) = tallied(&mut ctx, &tally);
    let plan = QueryPlan::default().step("keyed", &keyed);
    let keys = KeyArray::reserve(&plan, &ctx).unwrap();
    let copy = keys.clone();
    assert_eq!(tally.copy.load(Ordering::SeqCst), 1);
    let mut target = KeyArray::reserve(&plan, &ctx).unwrap();
    target.copy_from(&copy).unwrap();
    assert_eq!(tally.copy.load(Ordering::SeqCst), 2);
    drop((keys, copy, target));
    let created = tally.init.load(Ordering::SeqCst) + tally.copy.load(Ordering::SeqCst);
    assert_eq!(tally.destroy.load(Ordering::SeqCst), created);
}

#[rstest]
fn copy_between_different_plans_is_a_shape_mismatch() {
    let ctx = Context::root();
    let counters = Counters::new();
    let one = QueryPlan::default().step("a", &digits(2, &counters));
    let two = one.clone().step("b", &digits(2, &counters));
    let mut short = KeyArray::reserve(&one, &ctx).unwrap();
    let long = KeyArray::reserve(&two, &ctx).unwrap();
    assert_eq!(short.copy_from(&long).unwrap_err().code(), ErrorCode::ShapeMismatch);
}

#[rstest]
fn traversal_and_flat_view_agree() {
    let ctx = Context::root();
    let counters = Counters::new();
    let plan = QueryPlan::default().step("a", &digits(2, &counters)).step("b", &digits(3, &counters));
    let mut query = Query::new(plan);
    let mut keys = query.reserve_keys(&ctx).unwrap();
    assert!(query.reset(&Value::Int(0), &ctx));
    assert!(query.advance(&ctx));
    assert_eq!(query.get(Some(&mut keys), &ctx), Some(Value::Int(1)));

    let mut walked = Vec::new();
    let flow = keys.for_each(|node, level, index| {
        walked.push((level, index, node.value().cloned()));
        ControlFlow::<()>::Continue(())
    });
    assert!(flow.is_continue());
    assert_eq!(walked, [(0, 0, Some(Value::Int(0))), (0, 1, Some(Value::Int(1)))]);

    let flat: Vec<Option<String>> = keys.flat_view().iter().map(|key| key.as_string()).collect();
    assert_eq!(flat, [Some("0".to_string()), Some("1".to_string())]);
}

#[rstest]
fn nested_lists_are_built_by_hand() {
    let keys = KeyArray::from_keys([CollectionKey::Empty, CollectionKey::List(KeyArray::default())]);
    assert!(keys.get(1).and_then(|node| node.as_list()).is_some_and(KeyArray::is_empty));
    assert_eq!(keys.to_string(), "(())");
}
