//! Collection attribute interface.
//!
//! Hosts describe how to iterate a collection-valued attribute with a
//! [`CollectionInterface`]: a set of callbacks over a typed iterator state `S`
//! and a typed compiled selection `F`. Building the interface checks that every
//! mandatory callback is present and yields an [`CollectionAccess`] whose
//! iterators are handed to query hops as boxed [`ElementIterator`]s.

use crate::keys::KeyArray;
use keypath_core::{Context, Error, ErrorCode, Result, Value};
use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

/// Compiled, immutable selection (filter) argument of one collection hop.
#[derive(Clone)]
pub struct Selection {
    text: Option<Arc<str>>,
    compiled: Arc<dyn Any + Send + Sync>,
}

impl Selection {
    pub fn new<F: Any + Send + Sync>(filter: F) -> Self {
        Self { text: None, compiled: Arc::new(filter) }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(Arc::from(text));
        self
    }

    /// Source text the selection was compiled from, if any.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn downcast_ref<F: Any>(&self) -> Option<&F> {
        self.compiled.downcast_ref::<F>()
    }
}

impl core::fmt::Debug for Selection {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Selection").field("text", &self.text).finish_non_exhaustive()
    }
}

/// Live iterator over the elements of one owner's collection.
///
/// Dropping the iterator releases it.
pub trait ElementIterator: Send {
    /// Current element, `None` once the collection is exhausted.
    fn dereference(&mut self, ctx: &Context) -> Result<Option<Value>>;
    fn advance(&mut self, ctx: &Context) -> Result<()>;
    /// Re-targets the iterator at the first element of `owner`'s collection.
    fn reset(&mut self, owner: &Value, selection: Option<&Selection>, ctx: &Context) -> Result<()>;
    /// Native key of the current element.
    fn key(&self, _ctx: &Context) -> Result<Option<Value>> {
        Ok(None)
    }
    /// Writes the key tree of the current element (attributes with key reservation).
    fn write_key_list(&self, _keys: &mut KeyArray, _ctx: &Context) -> Result<()> {
        Ok(())
    }
}

pub trait CollectionAccess: Send + Sync {
    fn create(&self, owner: &Value, selection: Option<&Selection>, ctx: &Context) -> Result<Box<dyn ElementIterator>>;

    fn compile_selection(&self, text: &str, _ctx: &Context) -> Result<Selection> {
        Err(Error::bad_argument(format!("collection does not accept selections: '{text}'")))
    }

    /// Whether iterators expose key retrieval.
    fn has_key(&self) -> bool {
        false
    }
}

type CreateFn<S, F> = Box<dyn Fn(&Value, Option<&F>, &Context) -> Result<S> + Send + Sync>;
type DerefFn<S> = Box<dyn Fn(&mut S) -> Option<Value> + Send + Sync>;
type AdvanceFn<S> = Box<dyn Fn(&mut S) + Send + Sync>;
type ResetFn<S, F> = Box<dyn Fn(&mut S, &Value, Option<&F>, &Context) -> Result<()> + Send + Sync>;
type DestroyFn<S> = Box<dyn Fn(S) + Send + Sync>;
type KeyFn<S> = Box<dyn Fn(&S) -> Option<Value> + Send + Sync>;
type CompileFn<F> = Box<dyn Fn(&str) -> Result<F> + Send + Sync>;

/// Callback-based collection interface under construction.
///
/// `create`, `dereference`, `advance`, `reset` and `destroy` are mandatory;
/// `get_key` and `compile_selection` are optional.
pub struct CollectionInterface<S, F = ()> {
    create: Option<CreateFn<S, F>>,
    dereference: Option<DerefFn<S>>,
    advance: Option<AdvanceFn<S>>,
    reset: Option<ResetFn<S, F>>,
    destroy: Option<DestroyFn<S>>,
    get_key: Option<KeyFn<S>>,
    compile_selection: Option<CompileFn<F>>,
}

impl<S, F> Default for CollectionInterface<S, F> {
    fn default() -> Self {
        Self {
            create: None,
            dereference: None,
            advance: None,
            reset: None,
            destroy: None,
            get_key: None,
            compile_selection: None,
        }
    }
}

impl<S, F> CollectionInterface<S, F>
where
    S: Send + 'static,
    F: Any + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn create(mut self, f: impl Fn(&Value, Option<&F>, &Context) -> Result<S> + Send + Sync + 'static) -> Self {
        self.create = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn dereference(mut self, f: impl Fn(&mut S) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.dereference = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn advance(mut self, f: impl Fn(&mut S) + Send + Sync + 'static) -> Self {
        self.advance = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn reset(
        mut self,
        f: impl Fn(&mut S, &Value, Option<&F>, &Context) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        self.reset = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn destroy(mut self, f: impl Fn(S) + Send + Sync + 'static) -> Self {
        self.destroy = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn get_key(mut self, f: impl Fn(&S) -> Option<Value> + Send + Sync + 'static) -> Self {
        self.get_key = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn compile_selection(mut self, f: impl Fn(&str) -> Result<F> + Send + Sync + 'static) -> Self {
        self.compile_selection = Some(Box::new(f));
        self
    }

    /// Validates completeness and freezes the interface.
    pub fn build(self) -> Result<Arc<dyn CollectionAccess>> {
        let missing: Vec<&str> = [
            ("create", self.create.is_none()),
            ("dereference", self.dereference.is_none()),
            ("advance", self.advance.is_none()),
            ("reset", self.reset.is_none()),
            ("destroy", self.destroy.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        let (Some(create), Some(dereference), Some(advance), Some(reset), Some(destroy)) =
            (self.create, self.dereference, self.advance, self.reset, self.destroy)
        else {
            return Err(Error::new(
                ErrorCode::IncompleteInterface,
                format!("collection interface lacks: {}", missing.join(", ")),
            ));
        };
        let callbacks = Callbacks {
            create,
            dereference,
            advance,
            reset,
            destroy,
            get_key: self.get_key,
            compile_selection: self.compile_selection,
        };
        Ok(Arc::new(InterfaceAccess { callbacks: Arc::new(callbacks), _marker: PhantomData }))
    }
}

struct Callbacks<S, F> {
    create: CreateFn<S, F>,
    dereference: DerefFn<S>,
    advance: AdvanceFn<S>,
    reset: ResetFn<S, F>,
    destroy: DestroyFn<S>,
    get_key: Option<KeyFn<S>>,
    compile_selection: Option<CompileFn<F>>,
}

struct InterfaceAccess<S, F> {
    callbacks: Arc<Callbacks<S, F>>,
    _marker: PhantomData<fn() -> (S, F)>,
}

fn typed_selection<'a, F: Any>(selection: Option<&'a Selection>) -> Result<Option<&'a F>> {
    match selection {
        None => Ok(None),
        Some(sel) => sel
            .downcast_ref::<F>()
            .map(Some)
            .ok_or_else(|| Error::interface("selection was compiled for a different collection")),
    }
}

impl<S, F> CollectionAccess for InterfaceAccess<S, F>
where
    S: Send + 'static,
    F: Any + Send + Sync,
{
    fn create(&self, owner: &Value, selection: Option<&Selection>, ctx: &Context) -> Result<Box<dyn ElementIterator>> {
        let state = (self.callbacks.create)(owner, typed_selection::<F>(selection)?, ctx)?;
        Ok(Box::new(InterfaceIterator { state: Some(state), callbacks: Arc::clone(&self.callbacks) }))
    }

    fn compile_selection(&self, text: &str, _ctx: &Context) -> Result<Selection> {
        let compile = self
            .callbacks
            .compile_selection
            .as_ref()
            .ok_or_else(|| Error::bad_argument(format!("collection does not accept selections: '{text}'")))?;
        Ok(Selection::new(compile(text)?).with_text(text))
    }

    fn has_key(&self) -> bool {
        self.callbacks.get_key.is_some()
    }
}

struct InterfaceIterator<S, F> {
    // `None` only while being destroyed.
    state: Option<S>,
    callbacks: Arc<Callbacks<S, F>>,
}

impl<S, F> InterfaceIterator<S, F> {
    fn state_mut(&mut self) -> Result<&mut S> {
        self.state.as_mut().ok_or_else(|| Error::interface("iterator used after destroy"))
    }
}

impl<S, F> ElementIterator for InterfaceIterator<S, F>
where
    S: Send + 'static,
    F: Any + Send + Sync,
{
    fn dereference(&mut self, _ctx: &Context) -> Result<Option<Value>> {
        let callbacks = Arc::clone(&self.callbacks);
        Ok((callbacks.dereference)(self.state_mut()?))
    }

    fn advance(&mut self, _ctx: &Context) -> Result<()> {
        let callbacks = Arc::clone(&self.callbacks);
        (callbacks.advance)(self.state_mut()?);
        Ok(())
    }

    fn reset(&mut self, owner: &Value, selection: Option<&Selection>, ctx: &Context) -> Result<()> {
        let callbacks = Arc::clone(&self.callbacks);
        (callbacks.reset)(self.state_mut()?, owner, typed_selection::<F>(selection)?, ctx)
    }

    fn key(&self, _ctx: &Context) -> Result<Option<Value>> {
        match (&self.callbacks.get_key, &self.state) {
            (Some(get_key), Some(state)) => Ok(get_key(state)),
            _ => Ok(None),
        }
    }
}

impl<S, F> Drop for InterfaceIterator<S, F> {
    fn drop(&mut self) {
        if let Some(state) = self.state.take() {
            (self.callbacks.destroy)(state);
        }
    }
}
