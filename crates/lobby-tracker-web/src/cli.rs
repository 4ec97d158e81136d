//! Command-line subcommands that do not start the server.

use anyhow::{bail, Context};
use lobby_tracker::registry::{self, JurisdictionId};
use lobby_tracker::{write_workbook, Aggregator, JurisdictionStatus, SearchResult};
use std::io::Write;
use std::path::PathBuf;

/// Output options for `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchOutput {
    /// Print the full result as JSON instead of a summary.
    pub json: bool,
    /// Write the XLSX workbook here.
    pub export: Option<PathBuf>,
}

/// Run one aggregation and report it on `out`.
pub async fn run_search(
    aggregator: &Aggregator,
    term: &str,
    ids: &[JurisdictionId],
    output: &SearchOutput,
    out: &mut impl Write,
) -> anyhow::Result<SearchResult> {
    if term.trim().is_empty() {
        bail!("search term must not be empty");
    }
    if ids.is_empty() {
        bail!("select at least one jurisdiction");
    }

    let result = aggregator.search(term, ids).await;
    if output.json {
        serde_json::to_writer_pretty(&mut *out, &result)?;
        writeln!(out)?;
    } else {
        print_summary(&result, out)?;
    }

    if let Some(path) = &output.export {
        let bytes = write_workbook(&result)?;
        std::fs::write(path, bytes)
            .with_context(|| format!("writing workbook to {}", path.display()))?;
        tracing::info!(path = %path.display(), "workbook written");
    }
    Ok(result)
}

/// One line per jurisdiction: status, record count, cache use.
pub fn print_summary(result: &SearchResult, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(
        out,
        "Search \"{}\": {} records from {} jurisdictions",
        result.term,
        result.total_records(),
        result.jurisdictions.len()
    )?;
    for outcome in &result.outcomes {
        let info = outcome.jurisdiction.info();
        let detail = match &outcome.status {
            JurisdictionStatus::Ok => format!("{} records", outcome.records.len()),
            JurisdictionStatus::Empty => "no matches".to_string(),
            JurisdictionStatus::Error { reason } => format!("failed: {reason}"),
        };
        let cached = if outcome.from_cache { " (cached)" } else { "" };
        writeln!(out, "  {} {:<32} {detail}{cached}", info.flag, info.name)?;
        for record in &outcome.records {
            match &record.financial_range {
                Some(range) => writeln!(out, "      - {} [{range}]", record.entity_name)?,
                None => writeln!(out, "      - {}", record.entity_name)?,
            }
        }
    }
    Ok(())
}

/// The registry table, marking the jurisdictions searched by default.
pub fn print_jurisdictions(defaults: &[JurisdictionId], out: &mut impl Write) -> std::io::Result<()> {
    for j in registry::all() {
        let mark = if defaults.contains(&j.id) { "*" } else { " " };
        let money = if j.has_financial_data { "financial" } else { "" };
        writeln!(
            out,
            "{mark} {:<13} {} {:<32} {:<8} {:<9} {}",
            j.id.as_str(),
            j.flag,
            j.name,
            j.coverage,
            money,
            j.note.unwrap_or("")
        )?;
    }
    writeln!(out, "\n* searched by default")?;
    Ok(())
}
