use crate::OutputFormat;
use crate::demo::Demo;
use crate::util::{CliResult, ValueSummary};
use anyhow::Context as _;
use clap::Args;
use keypath_core::Error;
use keypath_engine::{Compound, Query, QueryRow};
use serde::Serialize;
use std::fmt::Write;

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    /// Dotted attribute path from the run, e.g. `events.hits[>= 1].x`.
    #[arg(value_name = "PATH")]
    pub path: String,
    /// Stop after this many results.
    #[arg(long = "limit")]
    pub limit: Option<usize>,
    #[arg(long = "format", value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub(crate) struct RowSummary {
    keys: String,
    key_values: Vec<String>,
    value: ValueSummary,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub(crate) struct ErrorSummary {
    code: &'static str,
    message: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub(crate) struct QuerySummary {
    path: String,
    rows: Vec<RowSummary>,
    errors: Vec<ErrorSummary>,
}

pub fn run(demo: &Demo, args: &QueryArgs) -> CliResult<String> {
    let summary = evaluate(demo, &args.path, args.limit)?;
    let output = match args.format {
        OutputFormat::Text => render_query_text(&summary),
        OutputFormat::Json => serde_json::to_string_pretty(&summary)?,
    };
    Ok(output)
}

pub(crate) fn evaluate(demo: &Demo, path: &str, limit: Option<usize>) -> CliResult<QuerySummary> {
    let plan = demo.run.resolve_path(path, &demo.ctx).with_context(|| format!("cannot resolve path '{path}'"))?;
    let leaf_compound = plan.leaf().and_then(|step| step.attribute().compound());
    let mut query = Query::new(plan);
    let rows = query
        .results(&demo.root, &demo.ctx)
        .take(limit.unwrap_or(usize::MAX))
        .map(|row| summarize_row(&row, leaf_compound.as_deref()))
        .collect();
    query.destroy();
    let errors = demo.ctx.take_errors().iter().map(ErrorSummary::from_error).collect();
    Ok(QuerySummary { path: path.to_owned(), rows, errors })
}

fn summarize_row(row: &QueryRow, compound: Option<&Compound>) -> RowSummary {
    RowSummary {
        keys: row.keys.to_string(),
        key_values: row.keys.flat_view().iter().filter_map(|key| key.as_string()).collect(),
        value: ValueSummary::new(&row.value, compound),
    }
}

impl ErrorSummary {
    fn from_error(error: &Error) -> Self {
        Self { code: error.code().as_str(), message: error.message.clone() }
    }
}

fn render_query_text(summary: &QuerySummary) -> String {
    let mut output = String::new();
    let width = summary.rows.iter().map(|row| row.keys.len()).max().unwrap_or(0);
    for row in &summary.rows {
        let _ = writeln!(&mut output, "{:<width$}  {}", row.keys, row.value);
    }
    let plural = if summary.rows.len() == 1 { "" } else { "s" };
    let _ = writeln!(&mut output, "{} result{plural} for {}", summary.rows.len(), summary.path);
    for error in &summary.errors {
        let _ = writeln!(&mut output, "warning: {}: {}", error.code, error.message);
    }
    output.trim_end().to_owned()
}
