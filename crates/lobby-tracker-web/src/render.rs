//! HTML rendering for the search form and result tables.
//!
//! Pages are Handlebars templates compiled into the binary; values are
//! HTML-escaped by the template engine.

use handlebars::{Handlebars, RenderError, TemplateError};
use lobby_tracker::registry::{self, JurisdictionId};
use lobby_tracker::{JurisdictionOutcome, JurisdictionStatus, Record, SearchResult};
use serde::Serialize;

/// Activity lines shown per record before the rest is summarized.
const MAX_ACTIVITIES: usize = 5;

const TABLE_COLUMNS: [&str; 6] = [
    "Entity",
    "Type",
    "Financial range",
    "Meetings",
    "Activities",
    "Details",
];

#[derive(Debug, Serialize)]
pub struct PageView {
    pub term: String,
    pub message: Option<String>,
    pub jurisdictions: Vec<JurisdictionOption>,
    pub result: Option<ResultView>,
}

#[derive(Debug, Serialize)]
pub struct JurisdictionOption {
    pub id: JurisdictionId,
    pub name: &'static str,
    pub flag: &'static str,
    pub note: Option<&'static str>,
    pub coverage: &'static str,
    pub has_financial_data: bool,
    pub checked: bool,
}

#[derive(Debug, Serialize)]
pub struct ResultView {
    pub term: String,
    pub searched_at: String,
    pub total_records: usize,
    pub export_href: String,
    pub sections: Vec<SectionView>,
}

#[derive(Debug, Serialize)]
pub struct SectionView {
    pub id: JurisdictionId,
    pub name: &'static str,
    pub flag: &'static str,
    /// CSS class of the status badge.
    pub status: &'static str,
    pub status_label: String,
    pub reason: Option<String>,
    pub from_cache: bool,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

impl PageView {
    /// The search form with `checked` jurisdictions ticked.
    pub fn form(term: &str, checked: &[JurisdictionId]) -> Self {
        Self {
            term: term.to_string(),
            message: None,
            jurisdictions: registry::all()
                .iter()
                .map(|j| JurisdictionOption {
                    id: j.id,
                    name: j.name,
                    flag: j.flag,
                    note: j.note,
                    coverage: j.coverage,
                    has_financial_data: j.has_financial_data,
                    checked: checked.contains(&j.id),
                })
                .collect(),
            result: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_result(mut self, result: &SearchResult) -> Self {
        self.result = Some(ResultView::from_result(result));
        self
    }
}

/// `/export` link reproducing a search.
pub fn export_href(term: &str, ids: &[JurisdictionId]) -> String {
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("q", term);
    for id in ids {
        query.append_pair("j", id.as_str());
    }
    format!("/export?{}", query.finish())
}

impl ResultView {
    fn from_result(result: &SearchResult) -> Self {
        Self {
            term: result.term.clone(),
            searched_at: result.searched_at.format("%Y-%m-%d %H:%M UTC").to_string(),
            total_records: result.total_records(),
            export_href: export_href(&result.term, &result.jurisdictions),
            sections: result.outcomes.iter().map(section).collect(),
        }
    }
}

fn section(outcome: &JurisdictionOutcome) -> SectionView {
    let info = outcome.jurisdiction.info();
    let (status, status_label, reason) = match &outcome.status {
        JurisdictionStatus::Ok => (
            "ok",
            format!("{} records", outcome.records.len()),
            None,
        ),
        JurisdictionStatus::Empty => ("empty", "no matches".to_string(), None),
        JurisdictionStatus::Error { reason } => ("error", "failed".to_string(), Some(reason.clone())),
    };
    SectionView {
        id: info.id,
        name: info.name,
        flag: info.flag,
        status,
        status_label,
        reason,
        from_cache: outcome.from_cache,
        columns: TABLE_COLUMNS.to_vec(),
        rows: outcome.records.iter().map(row).collect(),
    }
}

fn row(record: &Record) -> Vec<String> {
    let mut activities: Vec<String> = record
        .activities
        .iter()
        .take(MAX_ACTIVITIES)
        .cloned()
        .collect();
    if record.activities.len() > MAX_ACTIVITIES {
        activities.push(format!("… {} more", record.activities.len() - MAX_ACTIVITIES));
    }
    let details = record
        .raw
        .iter()
        .map(|(k, v)| format!("{k}: {v}"))
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        record.entity_name.clone(),
        record.entity_type.map(|t| t.to_string()).unwrap_or_default(),
        record.financial_range.clone().unwrap_or_default(),
        record.meeting_count.map(|n| n.to_string()).unwrap_or_default(),
        activities.join("\n"),
        details,
    ]
}

/// Compiled page templates.
pub struct Pages {
    registry: Handlebars<'static>,
}

impl Pages {
    pub fn new() -> Result<Self, TemplateError> {
        let mut registry = Handlebars::new();
        registry.register_partial("style", include_str!("../assets/style.css"))?;
        registry.register_template_string("page", include_str!("../assets/page.hbs"))?;
        Ok(Self { registry })
    }

    pub fn render(&self, view: &PageView) -> Result<String, RenderError> {
        self.registry.render("page", view)
    }
}
