use keypath_core::{Context, Value};
use keypath_engine::{AttributeDefinition, AttributeTraits, Compound, KeyDeclaration};
use serde::Serialize;
use std::fmt;

pub type CliResult<T> = anyhow::Result<T>;

/// JSON-friendly rendering of a query value. Host objects are shown by the
/// compound describing them.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum ValueSummary {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Object { compound: String },
}

impl ValueSummary {
    pub fn new(value: &Value, compound: Option<&Compound>) -> Self {
        match value {
            Value::Bool(b) => ValueSummary::Bool(*b),
            Value::Int(i) => ValueSummary::Int(*i),
            Value::Float(x) => ValueSummary::Float(*x),
            Value::Str(s) => ValueSummary::Text(s.to_string()),
            Value::Instance(_) => {
                ValueSummary::Object { compound: compound.map_or_else(|| "object".to_owned(), Compound::full_name) }
            }
        }
    }
}

impl fmt::Display for ValueSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueSummary::Bool(b) => write!(f, "{b}"),
            ValueSummary::Int(i) => write!(f, "{i}"),
            ValueSummary::Float(x) => write!(f, "{x}"),
            ValueSummary::Text(text) => write!(f, "{text:?}"),
            ValueSummary::Object { compound } => write!(f, "<{compound}>"),
        }
    }
}

/// Result type of an attribute: the target compound or the atomic type name.
pub fn type_label(ctx: &Context, attribute: &AttributeDefinition) -> String {
    if let Some(compound) = attribute.compound() {
        return compound.full_name();
    }
    type_name(ctx, attribute.value_type())
}

/// Shape of the key an attribute contributes: a type name, or `list` for
/// nested key trees.
pub fn key_label(ctx: &Context, attribute: &AttributeDefinition) -> Option<String> {
    if attribute.traits().contains(AttributeTraits::FORWARDING) {
        return Some("list".to_owned());
    }
    match attribute.key_declaration() {
        KeyDeclaration::None => None,
        KeyDeclaration::Typed(code) => Some(type_name(ctx, *code)),
        KeyDeclaration::Reserved(_) => Some("list".to_owned()),
    }
}

fn type_name(ctx: &Context, code: keypath_core::TypeCode) -> String {
    ctx.value_type(code).map_or_else(|| format!("type#{code}"), |ty| ty.name().to_owned())
}

pub fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
