use crate::OutputFormat;
use crate::demo::Demo;
use crate::util::{CliResult, key_label, type_label, yes_no};
use clap::Args;
use keypath_core::Context;
use keypath_engine::{AttributeTraits, Compound};
use serde::Serialize;
use std::fmt::Write;

#[derive(Args, Debug, Clone)]
pub struct SchemaArgs {
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub(crate) struct AttributeSummary {
    name: String,
    result: String,
    traits: Vec<String>,
    key: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub(crate) struct CompoundSummary {
    name: String,
    #[serde(rename = "virtual")]
    is_virtual: bool,
    attributes: Vec<AttributeSummary>,
}

pub fn run(demo: &Demo, args: &SchemaArgs) -> CliResult<String> {
    let summaries: Vec<CompoundSummary> =
        demo.compounds.iter().map(|compound| summarize_compound(compound, &demo.ctx)).collect();
    let output = match args.format {
        OutputFormat::Text => render_schema_text(&summaries),
        OutputFormat::Json => serde_json::to_string_pretty(&summaries)?,
    };
    Ok(output)
}

pub(crate) fn summarize_compound(compound: &Compound, ctx: &Context) -> CompoundSummary {
    let attributes = compound
        .attributes()
        .into_iter()
        .map(|(name, attribute)| AttributeSummary {
            name: name.to_string(),
            result: type_label(ctx, &attribute),
            traits: trait_names(attribute.traits()),
            key: key_label(ctx, &attribute),
        })
        .collect();
    CompoundSummary { name: compound.full_name(), is_virtual: compound.is_virtual(), attributes }
}

fn trait_names(traits: AttributeTraits) -> Vec<String> {
    traits.iter_names().map(|(name, _)| name.to_ascii_lowercase()).collect()
}

fn render_schema_text(compounds: &[CompoundSummary]) -> String {
    let mut output = String::new();
    for compound in compounds {
        let _ = writeln!(&mut output, "{} (virtual: {})", compound.name, yes_no(compound.is_virtual));
        let width = compound.attributes.iter().map(|attribute| attribute.name.len()).max().unwrap_or(0);
        for attribute in &compound.attributes {
            let _ = write!(&mut output, "  {:<width$}  {}", attribute.name, attribute.result);
            if !attribute.traits.is_empty() {
                let _ = write!(&mut output, " [{}]", attribute.traits.join(", "));
            }
            if let Some(key) = &attribute.key {
                let _ = write!(&mut output, " key: {key}");
            }
            output.push('\n');
        }
    }
    output.trim_end().to_owned()
}
