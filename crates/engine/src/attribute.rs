//! Attribute definitions.
//!
//! An [`AttributeDefinition`] describes one accessor on a compound. The legal
//! combinations of scalar/collection, atomic/compound, static and forwarding
//! are the variants of [`AttributeKind`]; everything else is rejected when the
//! definition is built.

use crate::collection::{CollectionAccess, Selection};
use crate::compound::Compound;
use crate::keys::{CollectionKey, KeyArray, TypedKey};
use crate::shared::SharedQuery;
use bitflags::bitflags;
use keypath_core::{Context, Error, ErrorCode, Result, TypeCode, Value};
use std::sync::{Arc, Weak};

bitflags! {
    /// Introspection flags of an attribute.
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct AttributeTraits: u8 {
        const COLLECTION = 1;
        const COMPOUND = 1 << 1;
        const STATIC = 1 << 2;
        const FORWARDING = 1 << 3;
        const KEYED = 1 << 4;
        const DERIVED = 1 << 5;
    }
}

/// Accessor of a scalar attribute.
pub trait ScalarAccess: Send + Sync {
    fn instantiate(&self, owner: &Value, ctx: &Context) -> Result<Box<dyn ScalarHandle>>;
}

/// Per-hop state of a scalar accessor. Dropping the handle releases it.
pub trait ScalarHandle: Send {
    fn dereference(&mut self, owner: &Value, ctx: &Context) -> Result<Option<Value>>;

    /// Re-targets the handle at a new owner. `false` means the handle cannot
    /// be reused and the hop instantiates a fresh one.
    fn reset(&mut self, _owner: &Value, _ctx: &Context) -> Result<bool> {
        Ok(false)
    }
}

struct FnScalar<G>(Arc<G>);

struct FnScalarHandle<G>(Arc<G>);

impl<G> ScalarAccess for FnScalar<G>
where
    G: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    fn instantiate(&self, _owner: &Value, _ctx: &Context) -> Result<Box<dyn ScalarHandle>> {
        Ok(Box::new(FnScalarHandle(Arc::clone(&self.0))))
    }
}

impl<G> ScalarHandle for FnScalarHandle<G>
where
    G: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    fn dereference(&mut self, owner: &Value, _ctx: &Context) -> Result<Option<Value>> {
        Ok((self.0)(owner))
    }

    fn reset(&mut self, _owner: &Value, _ctx: &Context) -> Result<bool> {
        Ok(true)
    }
}

/// Scalar accessor from a plain getter.
pub fn scalar_fn<G>(getter: G) -> Arc<dyn ScalarAccess>
where
    G: Fn(&Value) -> Option<Value> + Send + Sync + 'static,
{
    Arc::new(FnScalar(Arc::new(getter)))
}

/// Allocates the key tree of a hop whose key shape is only known at runtime.
pub type KeyReserver = Arc<dyn Fn(&Context) -> Result<KeyArray> + Send + Sync>;

#[derive(Clone, Default)]
pub enum KeyDeclaration {
    #[default]
    None,
    Typed(TypeCode),
    Reserved(KeyReserver),
}

impl core::fmt::Debug for KeyDeclaration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            KeyDeclaration::None => f.write_str("None"),
            KeyDeclaration::Typed(code) => f.debug_tuple("Typed").field(code).finish(),
            KeyDeclaration::Reserved(_) => f.write_str("Reserved"),
        }
    }
}

/// Key options of a collection attribute, validated against its interface.
#[derive(Clone, Default)]
pub struct CollectionOptions {
    key_type: Option<TypeCode>,
    reserve_keys: Option<KeyReserver>,
}

impl CollectionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyed_by(code: TypeCode) -> Self {
        Self::new().key_type(code)
    }

    #[must_use]
    pub fn key_type(mut self, code: TypeCode) -> Self {
        self.key_type = Some(code);
        self
    }

    #[must_use]
    pub fn reserve_keys(mut self, reserver: KeyReserver) -> Self {
        self.reserve_keys = Some(reserver);
        self
    }
}

#[derive(Clone)]
pub struct Collection {
    access: Arc<dyn CollectionAccess>,
    keys: KeyDeclaration,
}

impl Collection {
    fn new(access: Arc<dyn CollectionAccess>, options: CollectionOptions) -> Result<Self> {
        let inconsistent = |detail: &str| Err(Error::new(ErrorCode::InconsistentKeys, detail.to_string()));
        let keys = match (options.key_type, options.reserve_keys, access.has_key()) {
            (Some(_), Some(_), _) => return inconsistent("both a key type and a key reservation are declared"),
            (Some(code), None, true) if code.is_none() => return inconsistent("key type code 0 is reserved"),
            (Some(code), None, true) => KeyDeclaration::Typed(code),
            (None, Some(reserver), true) => KeyDeclaration::Reserved(reserver),
            (None, None, false) => KeyDeclaration::None,
            (None, None, true) => return inconsistent("key retrieval without a key type or key reservation"),
            (_, _, false) => return inconsistent("key declaration without key retrieval"),
        };
        Ok(Self { access, keys })
    }

    pub fn access(&self) -> &Arc<dyn CollectionAccess> {
        &self.access
    }

    pub fn keys(&self) -> &KeyDeclaration {
        &self.keys
    }
}

#[derive(Clone)]
pub enum AttributeKind {
    AtomicScalar { value_type: TypeCode, access: Arc<dyn ScalarAccess> },
    AtomicCollection { value_type: TypeCode, collection: Collection },
    CompoundScalar { compound: Weak<Compound>, access: Arc<dyn ScalarAccess> },
    CompoundCollection { compound: Weak<Compound>, collection: Collection },
    /// Always a collection: iterates the results of a wrapped query.
    Forwarding(SharedQuery),
    /// Ignores the owner and yields its stored datum once.
    Static { value_type: TypeCode, value: Value },
}

#[derive(Clone)]
pub struct AttributeDefinition {
    kind: AttributeKind,
    derived: bool,
}

impl AttributeDefinition {
    pub fn atomic_scalar(value_type: TypeCode, access: Arc<dyn ScalarAccess>) -> Self {
        Self { kind: AttributeKind::AtomicScalar { value_type, access }, derived: false }
    }

    pub fn atomic_collection(
        value_type: TypeCode,
        access: Arc<dyn CollectionAccess>,
        options: CollectionOptions,
    ) -> Result<Self> {
        let collection = Collection::new(access, options)?;
        Ok(Self { kind: AttributeKind::AtomicCollection { value_type, collection }, derived: false })
    }

    pub fn compound_scalar(compound: &Arc<Compound>, access: Arc<dyn ScalarAccess>) -> Self {
        Self { kind: AttributeKind::CompoundScalar { compound: Arc::downgrade(compound), access }, derived: false }
    }

    pub fn compound_collection(
        compound: &Arc<Compound>,
        access: Arc<dyn CollectionAccess>,
        options: CollectionOptions,
    ) -> Result<Self> {
        let collection = Collection::new(access, options)?;
        Ok(Self {
            kind: AttributeKind::CompoundCollection { compound: Arc::downgrade(compound), collection },
            derived: false,
        })
    }

    pub fn forwarding(query: SharedQuery) -> Self {
        Self { kind: AttributeKind::Forwarding(query), derived: false }
    }

    pub fn static_value(value_type: TypeCode, value: Value) -> Self {
        Self { kind: AttributeKind::Static { value_type, value }, derived: false }
    }

    #[must_use]
    pub(crate) fn into_derived(mut self) -> Self {
        self.derived = true;
        self
    }

    pub fn kind(&self) -> &AttributeKind {
        &self.kind
    }

    pub fn traits(&self) -> AttributeTraits {
        let mut traits = match &self.kind {
            AttributeKind::AtomicScalar { .. } => AttributeTraits::empty(),
            AttributeKind::AtomicCollection { .. } => AttributeTraits::COLLECTION,
            AttributeKind::CompoundScalar { .. } => AttributeTraits::COMPOUND,
            AttributeKind::CompoundCollection { .. } => AttributeTraits::COMPOUND | AttributeTraits::COLLECTION,
            AttributeKind::Forwarding(_) => AttributeTraits::FORWARDING | AttributeTraits::COLLECTION,
            AttributeKind::Static { .. } => AttributeTraits::STATIC,
        };
        if !matches!(self.key_declaration(), KeyDeclaration::None) {
            traits |= AttributeTraits::KEYED;
        }
        if self.derived {
            traits |= AttributeTraits::DERIVED;
        }
        traits
    }

    pub fn is_collection(&self) -> bool {
        self.traits().contains(AttributeTraits::COLLECTION)
    }

    /// Type code of atomic results; [`TypeCode::NONE`] for compound results.
    pub fn value_type(&self) -> TypeCode {
        match &self.kind {
            AttributeKind::AtomicScalar { value_type, .. }
            | AttributeKind::AtomicCollection { value_type, .. }
            | AttributeKind::Static { value_type, .. } => *value_type,
            AttributeKind::CompoundScalar { .. } | AttributeKind::CompoundCollection { .. } => TypeCode::NONE,
            AttributeKind::Forwarding(query) => {
                query.plan().leaf().map_or(TypeCode::NONE, |step| step.attribute().value_type())
            }
        }
    }

    /// Compound describing the results of compound-valued attributes.
    pub fn compound(&self) -> Option<Arc<Compound>> {
        match &self.kind {
            AttributeKind::CompoundScalar { compound, .. } | AttributeKind::CompoundCollection { compound, .. } => {
                compound.upgrade()
            }
            AttributeKind::Forwarding(query) => query.plan().leaf().and_then(|step| step.attribute().compound()),
            _ => None,
        }
    }

    pub fn collection(&self) -> Option<&Collection> {
        match &self.kind {
            AttributeKind::AtomicCollection { collection, .. } | AttributeKind::CompoundCollection { collection, .. } => {
                Some(collection)
            }
            _ => None,
        }
    }

    /// How the key node of a hop over this attribute is shaped. Forwarding
    /// attributes report `None` here; their key tree is the wrapped query's.
    pub fn key_declaration(&self) -> &KeyDeclaration {
        const NONE: &KeyDeclaration = &KeyDeclaration::None;
        self.collection().map_or(NONE, Collection::keys)
    }

    /// Key type of typed-key collections, [`TypeCode::NONE`] otherwise.
    pub fn key_type(&self) -> TypeCode {
        match self.key_declaration() {
            KeyDeclaration::Typed(code) => *code,
            _ => TypeCode::NONE,
        }
    }

    pub(crate) fn reserve_key(&self, ctx: &Context) -> Result<CollectionKey> {
        if let AttributeKind::Forwarding(query) = &self.kind {
            return Ok(CollectionKey::List(KeyArray::reserve(query.plan(), ctx)?));
        }
        match self.key_declaration() {
            KeyDeclaration::None => Ok(CollectionKey::Empty),
            KeyDeclaration::Typed(code) => Ok(CollectionKey::Typed(TypedKey::new(*code, ctx.require_type(*code)?))),
            KeyDeclaration::Reserved(reserver) => Ok(CollectionKey::List(reserver(ctx)?)),
        }
    }

    pub fn compile_selection(&self, text: &str, ctx: &Context) -> Result<Selection> {
        match self.collection() {
            Some(collection) => collection.access.compile_selection(text, ctx),
            None => Err(Error::bad_argument(format!("selection '{text}' on a non-collection attribute"))),
        }
    }
}

impl core::fmt::Debug for AttributeDefinition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AttributeDefinition")
            .field("traits", &self.traits())
            .field("value_type", &self.value_type())
            .field("keys", self.key_declaration())
            .finish()
    }
}

/// Flag-driven construction for front ends that assemble attributes from
/// parsed declarations. Computed flags (`KEYED`, `DERIVED`) may not be requested.
#[derive(Default)]
pub struct AttributeBuilder {
    traits: AttributeTraits,
    value_type: TypeCode,
    compound: Option<Arc<Compound>>,
    scalar: Option<Arc<dyn ScalarAccess>>,
    collection: Option<(Arc<dyn CollectionAccess>, CollectionOptions)>,
    forward: Option<SharedQuery>,
    value: Option<Value>,
}

impl AttributeBuilder {
    pub fn new(traits: AttributeTraits) -> Self {
        Self { traits, ..Self::default() }
    }

    #[must_use]
    pub fn value_type(mut self, code: TypeCode) -> Self {
        self.value_type = code;
        self
    }

    #[must_use]
    pub fn compound(mut self, compound: &Arc<Compound>) -> Self {
        self.compound = Some(Arc::clone(compound));
        self
    }

    #[must_use]
    pub fn scalar(mut self, access: Arc<dyn ScalarAccess>) -> Self {
        self.scalar = Some(access);
        self
    }

    #[must_use]
    pub fn collection(mut self, access: Arc<dyn CollectionAccess>, options: CollectionOptions) -> Self {
        self.collection = Some((access, options));
        self
    }

    #[must_use]
    pub fn forwarding(mut self, query: SharedQuery) -> Self {
        self.forward = Some(query);
        self
    }

    #[must_use]
    pub fn value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn build(self) -> Result<AttributeDefinition> {
        let t = self.traits;
        let bad = |msg: &str| Err(Error::bad_argument(msg.to_string()));
        if t.intersects(AttributeTraits::KEYED | AttributeTraits::DERIVED) {
            return bad("KEYED and DERIVED are computed, not declared");
        }
        if t.contains(AttributeTraits::FORWARDING) {
            if !t.contains(AttributeTraits::COLLECTION) {
                return bad("a forwarding attribute must be a collection");
            }
            if t.intersects(AttributeTraits::STATIC | AttributeTraits::COMPOUND) {
                return bad("a forwarding attribute cannot be static or compound");
            }
            return match self.forward {
                Some(query) => Ok(AttributeDefinition::forwarding(query)),
                None => bad("forwarding attribute without a query"),
            };
        }
        if t.contains(AttributeTraits::STATIC) {
            if t.intersects(AttributeTraits::COLLECTION | AttributeTraits::COMPOUND) {
                return bad("a static value is an atomic scalar");
            }
            return match self.value {
                Some(value) => Ok(AttributeDefinition::static_value(self.value_type, value)),
                None => bad("static attribute without a value"),
            };
        }
        let incomplete = |what: &str| Err(Error::new(ErrorCode::IncompleteInterface, format!("missing {what}")));
        match (t.contains(AttributeTraits::COMPOUND), t.contains(AttributeTraits::COLLECTION)) {
            (false, false) => match self.scalar {
                Some(access) => Ok(AttributeDefinition::atomic_scalar(self.value_type, access)),
                None => incomplete("scalar accessor"),
            },
            (false, true) => match self.collection {
                Some((access, options)) => AttributeDefinition::atomic_collection(self.value_type, access, options),
                None => incomplete("collection interface"),
            },
            (true, collection) => {
                let Some(compound) = self.compound else {
                    return bad("compound attribute without a target compound");
                };
                if collection {
                    match self.collection {
                        Some((access, options)) => AttributeDefinition::compound_collection(&compound, access, options),
                        None => incomplete("collection interface"),
                    }
                } else {
                    match self.scalar {
                        Some(access) => Ok(AttributeDefinition::compound_scalar(&compound, access)),
                        None => incomplete("scalar accessor"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::CollectionInterface;
    use rstest::rstest;

    const INT: TypeCode = TypeCode::new(2);

    fn numbers(with_key: bool) -> Arc<dyn CollectionAccess> {
        let interface = CollectionInterface::<usize>::new()
            .create(|_, _, _| Ok(0))
            .dereference(|pos| (*pos < 2).then(|| Value::Int(i64::try_from(*pos).unwrap_or_default())))
            .advance(|pos| *pos += 1)
            .reset(|pos, _, _, _| {
                *pos = 0;
                Ok(())
            })
            .destroy(|_| {});
        let interface = if with_key { interface.get_key(|_| Some(Value::Int(100))) } else { interface };
        interface.build().unwrap()
    }

    fn reserver() -> KeyReserver {
        Arc::new(|_ctx: &Context| -> Result<KeyArray> { Ok(KeyArray::default()) })
    }

    #[rstest]
    #[case(false, CollectionOptions::new(), None)]
    #[case(true, CollectionOptions::keyed_by(INT), None)]
    #[case(true, CollectionOptions::new().reserve_keys(reserver()), None)]
    #[case(true, CollectionOptions::keyed_by(INT).reserve_keys(reserver()), Some(ErrorCode::InconsistentKeys))]
    #[case(true, CollectionOptions::new(), Some(ErrorCode::InconsistentKeys))]
    #[case(false, CollectionOptions::keyed_by(INT), Some(ErrorCode::InconsistentKeys))]
    #[case(true, CollectionOptions::keyed_by(TypeCode::NONE), Some(ErrorCode::InconsistentKeys))]
    fn key_declarations_are_validated(
        #[case] with_key: bool,
        #[case] options: CollectionOptions,
        #[case] expected: Option<ErrorCode>,
    ) {
        let result = AttributeDefinition::atomic_collection(INT, numbers(with_key), options);
        assert_eq!(result.err().map(|e| e.code()), expected);
    }

    #[rstest]
    fn traits_reflect_kind() {
        let keyed = AttributeDefinition::atomic_collection(INT, numbers(true), CollectionOptions::keyed_by(INT)).unwrap();
        assert_eq!(keyed.traits(), AttributeTraits::COLLECTION | AttributeTraits::KEYED);
        assert_eq!(keyed.key_type(), INT);
        let constant = AttributeDefinition::static_value(INT, Value::Int(3));
        assert_eq!(constant.traits(), AttributeTraits::STATIC);
        assert!(!constant.is_collection());
        assert_eq!(constant.key_type(), TypeCode::NONE);
    }

    #[rstest]
    #[case(AttributeTraits::FORWARDING)]
    #[case(AttributeTraits::FORWARDING | AttributeTraits::COLLECTION | AttributeTraits::STATIC)]
    #[case(AttributeTraits::STATIC | AttributeTraits::COLLECTION)]
    #[case(AttributeTraits::STATIC | AttributeTraits::COMPOUND)]
    #[case(AttributeTraits::KEYED)]
    #[case(AttributeTraits::COMPOUND)]
    fn builder_rejects_invalid_combinations(#[case] traits: AttributeTraits) {
        let err = AttributeBuilder::new(traits).value(Value::Int(1)).build().unwrap_err();
        assert_eq!(err.code(), ErrorCode::BadArgument);
    }

    #[rstest]
    fn builder_reports_missing_accessors() {
        let err = AttributeBuilder::new(AttributeTraits::COLLECTION).value_type(INT).build().unwrap_err();
        assert_eq!(err.code(), ErrorCode::IncompleteInterface);
        let ok = AttributeBuilder::new(AttributeTraits::empty())
            .value_type(INT)
            .scalar(scalar_fn(|owner| Some(owner.clone())))
            .build()
            .unwrap();
        assert_eq!(ok.value_type(), INT);
    }

    #[rstest]
    fn default_builder_makes_an_atomic_scalar() {
        assert_eq!(AttributeTraits::default(), AttributeTraits::empty());
        let err = AttributeBuilder::default().value_type(INT).build().unwrap_err();
        assert_eq!(err.code(), ErrorCode::IncompleteInterface);
        let scalar =
            AttributeBuilder::default().value_type(INT).scalar(scalar_fn(|owner| Some(owner.clone()))).build().unwrap();
        assert!(matches!(scalar.kind(), AttributeKind::AtomicScalar { .. }));
        assert_eq!(scalar.traits(), AttributeTraits::empty());
    }

    #[rstest]
    fn selections_need_a_collection() {
        let ctx = Context::root();
        let scalar = AttributeDefinition::atomic_scalar(INT, scalar_fn(|_| None));
        assert_eq!(scalar.compile_selection("x", &ctx).unwrap_err().code(), ErrorCode::BadArgument);
    }
}
