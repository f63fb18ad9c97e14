//! Compiled query plans.

use crate::attribute::AttributeDefinition;
use crate::collection::Selection;
use std::sync::Arc;

/// One hop of a plan: the attribute to follow and its optional selection.
#[derive(Clone, Debug)]
pub struct Step {
    name: Arc<str>,
    attribute: Arc<AttributeDefinition>,
    selection: Option<Selection>,
}

impl Step {
    pub fn new(name: impl Into<Arc<str>>, attribute: Arc<AttributeDefinition>) -> Self {
        Self { name: name.into(), attribute, selection: None }
    }

    #[must_use]
    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attribute(&self) -> &Arc<AttributeDefinition> {
        &self.attribute
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }
}

/// Ordered attribute chain a [`Query`](crate::Query) walks, top hop first.
#[derive(Clone, Debug, Default)]
pub struct QueryPlan {
    steps: Vec<Step>,
}

impl QueryPlan {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    #[must_use]
    pub fn step(mut self, name: &str, attribute: &Arc<AttributeDefinition>) -> Self {
        self.push(Step::new(name, Arc::clone(attribute)));
        self
    }

    #[must_use]
    pub fn step_with(mut self, name: &str, attribute: &Arc<AttributeDefinition>, selection: Selection) -> Self {
        self.push(Step::new(name, Arc::clone(attribute)).with_selection(selection));
        self
    }

    pub fn depth(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn top(&self) -> Option<&Step> {
        self.steps.first()
    }

    pub fn leaf(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// Dotted rendering of the attribute chain, e.g. `hits[x>1].x`.
    pub fn path(&self) -> String {
        let mut out = String::new();
        for (i, step) in self.steps.iter().enumerate() {
            if i > 0 {
                out.push('.');
            }
            out.push_str(step.name());
            if let Some(text) = step.selection().and_then(Selection::text) {
                out.push('[');
                out.push_str(text);
                out.push(']');
            }
        }
        out
    }
}
