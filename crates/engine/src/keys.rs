//! Key trees.
//!
//! A [`KeyArray`] mirrors the shape of a compiled query: one [`KeyNode`] per
//! hop, the last one flagged terminal. A node is either empty (the hop has no
//! key concept), a typed leaf holding one value of a registered type, or a
//! nested key array for hops whose key shape is only known at runtime
//! (forwarding queries, derived attributes).
//!
//! Typed leaves are released through their [`ValueType::destroy`] exactly once,
//! when the node is dropped or overwritten.

use crate::plan::QueryPlan;
use core::fmt;
use core::ops::ControlFlow;
use keypath_core::{Context, Error, ErrorCode, Result, TypeCode, Value, ValueType};
use smallvec::SmallVec;
use std::sync::Arc;

pub struct TypedKey {
    code: TypeCode,
    value_type: Arc<dyn ValueType>,
    // Only `None` while the node is being dropped.
    value: Option<Value>,
}

impl TypedKey {
    pub fn new(code: TypeCode, value_type: Arc<dyn ValueType>) -> Self {
        let value = value_type.init();
        Self { code, value_type, value: Some(value) }
    }

    pub fn code(&self) -> TypeCode {
        self.code
    }

    pub fn value_type(&self) -> &Arc<dyn ValueType> {
        &self.value_type
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Stores `value`, releasing the previous one through the type.
    pub fn set(&mut self, value: Value) {
        if let Some(old) = self.value.replace(value) {
            self.value_type.destroy(old);
        }
    }
}

impl Drop for TypedKey {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.value_type.destroy(value);
        }
    }
}

impl Clone for TypedKey {
    fn clone(&self) -> Self {
        Self {
            code: self.code,
            value_type: Arc::clone(&self.value_type),
            value: self.value.as_ref().map(|v| self.value_type.copy(v)),
        }
    }
}

impl fmt::Debug for TypedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypedKey").field("code", &self.code).field("value", &self.value).finish()
    }
}

#[derive(Clone, Debug)]
pub enum CollectionKey {
    Empty,
    Typed(TypedKey),
    List(KeyArray),
}

#[derive(Clone, Debug)]
pub struct KeyNode {
    key: CollectionKey,
    terminal: bool,
}

impl KeyNode {
    pub fn key(&self) -> &CollectionKey {
        &self.key
    }

    pub fn key_mut(&mut self) -> &mut CollectionKey {
        &mut self.key
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.key, CollectionKey::Empty)
    }

    /// Type code of a typed leaf, [`TypeCode::NONE`] for empty and list nodes.
    pub fn type_code(&self) -> TypeCode {
        match &self.key {
            CollectionKey::Typed(typed) => typed.code(),
            _ => TypeCode::NONE,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        match &self.key {
            CollectionKey::Typed(typed) => typed.value(),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&KeyArray> {
        match &self.key {
            CollectionKey::List(list) => Some(list),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut KeyArray> {
        match &mut self.key {
            CollectionKey::List(list) => Some(list),
            _ => None,
        }
    }
}

/// A typed key leaf as seen by consumers that do not care about tree shape.
#[derive(Clone, Copy)]
pub struct FlatKey<'a> {
    pub code: TypeCode,
    pub value: &'a Value,
    pub value_type: &'a Arc<dyn ValueType>,
}

impl FlatKey<'_> {
    pub fn as_string(&self) -> Option<String> {
        self.value_type.as_string(self.value)
    }
}

impl fmt::Debug for FlatKey<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlatKey").field("code", &self.code).field("value", self.value).finish()
    }
}

pub type FlatKeys<'a> = SmallVec<[FlatKey<'a>; 8]>;

#[derive(Clone, Debug, Default)]
pub struct KeyArray {
    nodes: Vec<KeyNode>,
}

impl KeyArray {
    /// Builds an array from nodes, flagging the last one terminal.
    pub fn from_keys(keys: impl IntoIterator<Item = CollectionKey>) -> Self {
        let mut nodes: Vec<KeyNode> = keys.into_iter().map(|key| KeyNode { key, terminal: false }).collect();
        if let Some(last) = nodes.last_mut() {
            last.terminal = true;
        }
        Self { nodes }
    }

    /// Reserves one node per hop of `plan`, shaped by each attribute's key declaration.
    pub fn reserve(plan: &QueryPlan, ctx: &Context) -> Result<Self> {
        let keys = plan.steps().iter().map(|step| step.attribute().reserve_key(ctx)).collect::<Result<Vec<_>>>()?;
        Ok(Self::from_keys(keys))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&KeyNode> {
        self.nodes.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut KeyNode> {
        self.nodes.get_mut(index)
    }

    pub fn nodes(&self) -> &[KeyNode] {
        &self.nodes
    }

    /// Copies `src` node by node into `self`; both must have the same reserved shape.
    pub fn copy_from(&mut self, src: &KeyArray) -> Result<()> {
        if self.nodes.len() != src.nodes.len() {
            return Err(shape_mismatch(format!("{} nodes vs {}", self.nodes.len(), src.nodes.len())));
        }
        for (index, (dest, src)) in self.nodes.iter_mut().zip(&src.nodes).enumerate() {
            match (&mut dest.key, &src.key) {
                (CollectionKey::Empty, CollectionKey::Empty) => {}
                (CollectionKey::Typed(dest), CollectionKey::Typed(src)) => {
                    if dest.code != src.code {
                        return Err(shape_mismatch(format!("node {index}: {} vs {}", dest.code, src.code)));
                    }
                    if let Some(value) = src.value() {
                        dest.set(src.value_type.copy(value));
                    }
                }
                (CollectionKey::List(dest), CollectionKey::List(src)) => dest.copy_from(src)?,
                _ => return Err(shape_mismatch(format!("node {index} has a different kind"))),
            }
        }
        Ok(())
    }

    /// Depth-first traversal yielding (node, nesting level, index within level).
    /// Stops at the first `Break` and returns it.
    pub fn for_each<B>(&self, mut visit: impl FnMut(&KeyNode, usize, usize) -> ControlFlow<B>) -> ControlFlow<B> {
        self.walk(0, &mut visit)
    }

    fn walk<B>(&self, level: usize, visit: &mut impl FnMut(&KeyNode, usize, usize) -> ControlFlow<B>) -> ControlFlow<B> {
        for (index, node) in self.nodes.iter().enumerate() {
            visit(node, level, index)?;
            if let CollectionKey::List(list) = &node.key {
                list.walk(level + 1, visit)?;
            }
        }
        ControlFlow::Continue(())
    }

    /// Every typed leaf in depth-first order, with its type behaviour attached.
    pub fn flat_view(&self) -> FlatKeys<'_> {
        let mut flat = FlatKeys::new();
        self.collect_flat(&mut flat);
        flat
    }

    fn collect_flat<'a>(&'a self, out: &mut FlatKeys<'a>) {
        for node in &self.nodes {
            match &node.key {
                CollectionKey::Typed(typed) => {
                    if let Some(value) = typed.value() {
                        out.push(FlatKey { code: typed.code, value, value_type: &typed.value_type });
                    }
                }
                CollectionKey::List(list) => list.collect_flat(out),
                CollectionKey::Empty => {}
            }
        }
    }

    /// Releases the array. Equivalent to dropping it.
    pub fn destroy(self) {
        drop(self);
    }
}

fn shape_mismatch(detail: String) -> Error {
    Error::new(ErrorCode::ShapeMismatch, format!("key shapes differ: {detail}"))
}

impl fmt::Display for KeyArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        let mut first = true;
        for node in &self.nodes {
            let rendered = match &node.key {
                CollectionKey::Empty => continue,
                CollectionKey::Typed(typed) => {
                    typed.value().and_then(|v| typed.value_type.as_string(v)).unwrap_or_default()
                }
                CollectionKey::List(list) => list.to_string(),
            };
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            f.write_str(&rendered)?;
        }
        f.write_str(")")
    }
}
