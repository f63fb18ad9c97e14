mod common;

use common::{Counters, INT, list_collection};
use keypath_core::{Context, ErrorCode, Value};
use keypath_engine::{AttributeDefinition, CollectionOptions, QueryPlan, QueryProduct};
use rstest::rstest;
use std::sync::Arc;

/// Plan over a single collection that yields `values` regardless of the owner.
fn constant_list(values: &[i64], counters: &Arc<Counters>) -> QueryPlan {
    let values: Vec<Value> = values.iter().copied().map(Value::Int).collect();
    let access = list_collection(move |_| values.clone(), Some(Value::clone), counters);
    let attribute = AttributeDefinition::atomic_collection(INT, access, CollectionOptions::keyed_by(INT)).unwrap();
    QueryPlan::default().step("list", &Arc::new(attribute))
}

fn combinations(product: &mut QueryProduct, ctx: &Context) -> Vec<Vec<Value>> {
    let mut out = Vec::new();
    if product.reset(&Value::Int(0), ctx).is_ok() {
        loop {
            out.push(product.values());
            if !product.advance(ctx) {
                break;
            }
        }
    }
    out
}

#[rstest]
fn enumerates_lexicographically_with_last_factor_fastest() {
    let ctx = Context::root();
    let counters = Counters::new();
    let mut product = QueryProduct::new([
        constant_list(&[1, 2], &counters),
        constant_list(&[10], &counters),
        constant_list(&[100, 200, 300], &counters),
    ]);
    assert_eq!(product.len(), 3);
    let got = combinations(&mut product, &ctx);
    assert_eq!(got.len(), 6);
    let flat: Vec<Vec<i64>> = got.iter().map(|c| c.iter().filter_map(Value::as_int).collect()).collect();
    assert_eq!(
        flat,
        [[1, 10, 100], [1, 10, 200], [1, 10, 300], [2, 10, 100], [2, 10, 200], [2, 10, 300]]
    );
    assert!(!product.advance(&ctx));
}

#[rstest]
fn empty_factor_stops_the_reset() {
    let ctx = Context::root();
    let (first, empty, last) = (Counters::new(), Counters::new(), Counters::new());
    let mut product = QueryProduct::new([
        constant_list(&[1, 2], &first),
        constant_list(&[], &empty),
        constant_list(&[3], &last),
    ]);
    let err = product.reset(&Value::Int(0), &ctx).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EmptySet);
    assert_eq!(empty.created(), 1);
    assert_eq!(last.created(), 0, "factors after the empty one are not touched");
    assert!(!product.advance(&ctx));
    assert!(!ctx.has_errors());
}

#[rstest]
fn zero_factors_make_an_empty_product() {
    let ctx = Context::root();
    let mut product = QueryProduct::new(Vec::new());
    assert!(product.is_empty());
    assert_eq!(product.reset(&Value::Int(0), &ctx).unwrap_err().code(), ErrorCode::EmptySet);
}

#[rstest]
fn keys_track_each_factor() {
    let ctx = Context::root();
    let counters = Counters::new();
    let plans = [constant_list(&[1, 2], &counters), constant_list(&[5, 6], &counters)];
    let mut product = QueryProduct::new(plans).with_keys(&ctx).unwrap();
    product.reset(&Value::Int(0), &ctx).unwrap();
    assert!(product.advance(&ctx));
    assert_eq!(product.value(1), Some(&Value::Int(6)));
    assert_eq!(product.keys(0).map(ToString::to_string), Some("(1)".to_string()));
    assert_eq!(product.keys(1).map(ToString::to_string), Some("(6)".to_string()));
    assert!(product.advance(&ctx));
    assert_eq!(product.keys(0).map(ToString::to_string), Some("(2)".to_string()));
    assert_eq!(product.keys(1).map(ToString::to_string), Some("(5)".to_string()));
}

#[rstest]
fn reset_restarts_the_enumeration() {
    let ctx = Context::root();
    let counters = Counters::new();
    let mut product = QueryProduct::new([constant_list(&[1, 2], &counters), constant_list(&[3, 4], &counters)]);
    let first = combinations(&mut product, &ctx);
    let second = combinations(&mut product, &ctx);
    assert_eq!(first, second);
    assert_eq!(first.len(), 4);
}
