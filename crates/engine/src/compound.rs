//! Compounds: named attribute maps describing host objects.
//!
//! A virtual compound layers synthetic (usually derived) attributes over a
//! parent compound and falls back to the parent on lookup misses.

use crate::attribute::{AttributeBuilder, AttributeDefinition};
use crate::plan::{QueryPlan, Step};
use keypath_core::{Context, Error, ErrorCode, Result};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Default)]
struct Members {
    order: Vec<(Arc<str>, Arc<AttributeDefinition>)>,
    by_name: HashMap<Arc<str>, usize>,
    by_index: HashMap<i64, usize>,
}

pub struct Compound {
    name: Option<Arc<str>>,
    parent: Option<Arc<Compound>>,
    members: RwLock<Members>,
}

impl Compound {
    pub fn new(name: &str) -> Arc<Self> {
        Arc::new(Self { name: Some(Arc::from(name)), parent: None, members: RwLock::default() })
    }

    /// Anonymous compound extending `parent`.
    pub fn virtual_of(parent: &Arc<Compound>) -> Arc<Self> {
        Arc::new(Self { name: None, parent: Some(Arc::clone(parent)), members: RwLock::default() })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn parent(&self) -> Option<&Arc<Compound>> {
        self.parent.as_ref()
    }

    pub fn is_virtual(&self) -> bool {
        self.parent.is_some()
    }

    fn read(&self) -> RwLockReadGuard<'_, Members> {
        self.members.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Members> {
        self.members.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, name: &str, attribute: AttributeDefinition) -> Result<Arc<AttributeDefinition>> {
        self.insert(name, None, attribute)
    }

    pub fn add_indexed(&self, name: &str, index: i64, attribute: AttributeDefinition) -> Result<Arc<AttributeDefinition>> {
        self.insert(name, Some(index), attribute)
    }

    /// Builds an attribute from flags and adds it.
    pub fn define(&self, name: &str, builder: AttributeBuilder) -> Result<Arc<AttributeDefinition>> {
        self.add(name, builder.build()?)
    }

    fn insert(&self, name: &str, index: Option<i64>, attribute: AttributeDefinition) -> Result<Arc<AttributeDefinition>> {
        if name.is_empty() {
            return Err(Error::new(ErrorCode::EmptyName, "attribute name must not be empty"));
        }
        let mut members = self.write();
        if members.by_name.contains_key(name) {
            let owner = self.name().unwrap_or("virtual compound");
            return Err(Error::new(ErrorCode::NameCollision, format!("attribute '{name}' already defined on {owner}")));
        }
        if let Some(index) = index
            && members.by_index.contains_key(&index)
        {
            return Err(Error::new(ErrorCode::IndexCollision, format!("attribute index {index} already taken")));
        }
        let name: Arc<str> = Arc::from(name);
        let attribute = Arc::new(attribute);
        let slot = members.order.len();
        members.order.push((Arc::clone(&name), Arc::clone(&attribute)));
        members.by_name.insert(name, slot);
        if let Some(index) = index {
            members.by_index.insert(index, slot);
        }
        Ok(attribute)
    }

    /// Looks `name` up here, then along the parent chain.
    pub fn get(&self, name: &str) -> Option<Arc<AttributeDefinition>> {
        let local = {
            let members = self.read();
            members.by_name.get(name).map(|&slot| Arc::clone(&members.order[slot].1))
        };
        local.or_else(|| self.parent.as_ref().and_then(|parent| parent.get(name)))
    }

    pub fn get_by_index(&self, index: i64) -> Option<(Arc<str>, Arc<AttributeDefinition>)> {
        let members = self.read();
        members.by_index.get(&index).map(|&slot| {
            let (name, attr) = &members.order[slot];
            (Arc::clone(name), Arc::clone(attr))
        })
    }

    /// Own attributes in insertion order; inherited ones are not listed.
    pub fn attributes(&self) -> Vec<(Arc<str>, Arc<AttributeDefinition>)> {
        self.read().order.iter().map(|(name, attr)| (Arc::clone(name), Arc::clone(attr))).collect()
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Track` for named compounds, `{pt,eta}->Track` for a virtual one.
    pub fn full_name(&self) -> String {
        match (&self.name, &self.parent) {
            (Some(name), _) => name.to_string(),
            (None, Some(parent)) => {
                let own: Vec<String> = self.read().order.iter().map(|(name, _)| name.to_string()).collect();
                format!("{{{}}}->{}", own.join(","), parent.full_name())
            }
            (None, None) => "{}".to_string(),
        }
    }

    /// Compiles a dotted path such as `tracks[pt>10].hits.x` into a plan
    /// rooted at this compound. Bracketed text is handed to the collection's
    /// selection compiler.
    pub fn resolve_path(self: &Arc<Self>, path: &str, ctx: &Context) -> Result<QueryPlan> {
        let mut plan = QueryPlan::default();
        let mut current = Some(Arc::clone(self));
        for segment in split_path(path)? {
            let (name, selection) = parse_segment(segment)?;
            let Some(compound) = current.take() else {
                return Err(Error::bad_argument(format!("'{name}': cannot descend through an atomic attribute")));
            };
            let attribute = compound.get(name).ok_or_else(|| {
                Error::not_found(&format!("attribute '{name}' on {}", compound.full_name()))
            })?;
            let mut step = Step::new(name, Arc::clone(&attribute));
            if let Some(text) = selection {
                step = step.with_selection(attribute.compile_selection(text, ctx)?);
            }
            current = attribute.compound();
            plan.push(step);
        }
        if plan.is_empty() {
            return Err(Error::bad_argument("empty path"));
        }
        Ok(plan)
    }
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let mut segments = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in path.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1).ok_or_else(|| Error::bad_argument(format!("unbalanced ']' in '{path}'")))?;
            }
            '.' if depth == 0 => {
                segments.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::bad_argument(format!("unclosed '[' in '{path}'")));
    }
    if !path.is_empty() {
        segments.push(&path[start..]);
    }
    Ok(segments)
}

fn parse_segment(segment: &str) -> Result<(&str, Option<&str>)> {
    let segment = segment.trim();
    let (name, selection) = match segment.split_once('[') {
        Some((name, rest)) => match rest.strip_suffix(']') {
            Some(sel) => (name.trim(), Some(sel.trim())),
            None => return Err(Error::bad_argument(format!("trailing text after selection in '{segment}'"))),
        },
        None => (segment, None),
    };
    if name.is_empty() {
        return Err(Error::bad_argument(format!("empty attribute name in '{segment}'")));
    }
    Ok((name, selection))
}

impl core::fmt::Debug for Compound {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Compound").field("name", &self.full_name()).field("attributes", &self.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::scalar_fn;
    use keypath_core::{TypeCode, Value};
    use rstest::rstest;

    const INT: TypeCode = TypeCode::new(2);

    fn scalar() -> AttributeDefinition {
        AttributeDefinition::atomic_scalar(INT, scalar_fn(|_| Some(Value::Int(1))))
    }

    #[rstest]
    #[case("a.b.c", vec!["a", "b", "c"])]
    #[case("hits[x > 1.5].x", vec!["hits[x > 1.5]", "x"])]
    #[case("a[b.c]", vec!["a[b.c]"])]
    fn paths_split_outside_brackets(#[case] path: &str, #[case] expected: Vec<&str>) {
        assert_eq!(split_path(path).unwrap(), expected);
    }

    #[rstest]
    #[case("a[b")]
    #[case("a]b")]
    fn unbalanced_brackets_are_rejected(#[case] path: &str) {
        assert_eq!(split_path(path).unwrap_err().code(), ErrorCode::BadArgument);
    }

    #[rstest]
    fn segments_separate_selection_text() {
        assert_eq!(parse_segment("hits[ x>1 ]").unwrap(), ("hits", Some("x>1")));
        assert_eq!(parse_segment("x").unwrap(), ("x", None));
        assert!(parse_segment("[x]").is_err());
        assert!(parse_segment("a[x]y").is_err());
    }

    #[rstest]
    fn attributes_keep_insertion_order() {
        let c = Compound::new("Point");
        c.add("y", scalar()).unwrap();
        c.add("x", scalar()).unwrap();
        let names: Vec<_> = c.attributes().into_iter().map(|(n, _)| n.to_string()).collect();
        assert_eq!(names, ["y", "x"]);
    }

    #[rstest]
    fn indexed_lookup() {
        let c = Compound::new("Point");
        c.add_indexed("x", 7, scalar()).unwrap();
        let (name, _) = c.get_by_index(7).unwrap();
        assert_eq!(&*name, "x");
        assert!(c.get_by_index(0).is_none());
    }
}
