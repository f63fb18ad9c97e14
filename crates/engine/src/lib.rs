//! Key-path query execution over compound schemas.
//!
//! Hosts describe their objects as [`Compound`]s of [`AttributeDefinition`]s,
//! compile dotted paths into [`QueryPlan`]s and walk them lazily with a
//! [`Query`]. Every result comes with a [`KeyArray`] identifying the collection
//! elements it was reached through.

pub mod attribute;
pub mod collection;
pub mod compound;
pub mod derived;
pub mod hop;
pub mod keys;
pub mod plan;
pub mod product;
pub mod query;
pub mod shared;

pub use attribute::{
    AttributeBuilder, AttributeDefinition, AttributeKind, AttributeTraits, Collection, CollectionOptions,
    KeyDeclaration, KeyReserver, ScalarAccess, ScalarHandle, scalar_fn,
};
pub use collection::{CollectionAccess, CollectionInterface, ElementIterator, Selection};
pub use compound::Compound;
pub use hop::{Hop, HopEvent, HopState};
pub use keys::{CollectionKey, FlatKey, FlatKeys, KeyArray, KeyNode, TypedKey};
pub use plan::{QueryPlan, Step};
pub use product::QueryProduct;
pub use query::{Query, QueryRow, Results};
pub use shared::{QueryBinding, SharedQuery};
