//! Jurisdiction connectors.
//!
//! Each connector fetches one transparency register and normalizes its
//! entries into [`Record`]s. Connectors are independent of each other and of
//! the aggregator; adding a jurisdiction means adding a module here and a
//! line in [`ConnectorSet::live`].

pub mod austria;
pub mod catalonia;
pub mod eu;
pub mod finland;
pub mod france;
pub mod germany;
pub mod slovenia;
pub mod uk;

use crate::config::TrackerConfig;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http_client::HttpClient;
use crate::query::SearchQuery;
use crate::registry::JurisdictionId;
use crate::types::Record;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Fetch-and-normalize routine for one jurisdiction.
#[async_trait]
pub trait Connector: Send + Sync {
    /// The jurisdiction this connector serves.
    fn jurisdiction(&self) -> JurisdictionId;

    /// Search the source. No matches is `Ok(vec![])`, never an error.
    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>>;
}

/// Connectors keyed by jurisdiction.
#[derive(Clone, Default)]
pub struct ConnectorSet {
    connectors: HashMap<JurisdictionId, Arc<dyn Connector>>,
}

impl ConnectorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connector under its own jurisdiction, replacing any
    /// previous one.
    pub fn with(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connectors.insert(connector.jurisdiction(), connector);
        self
    }

    /// All nine live connectors sharing one HTTP client.
    pub fn live(config: &TrackerConfig) -> ConnectorResult<Self> {
        let http = HttpClient::new(&config.http)?;
        let ttl = config.cache_ttl;
        let ep = &config.endpoints;

        Ok(Self::new()
            .with(Arc::new(eu::EuConnector::new(http.clone(), ep, ttl)))
            .with(Arc::new(france::FranceConnector::new(http.clone(), ep, ttl)))
            .with(Arc::new(germany::GermanyConnector::new(http.clone(), ep)))
            .with(Arc::new(uk::UkMeetingsConnector::new(
                uk::MeetingSource::Ministers,
                http.clone(),
                ep,
                &config.uk,
                ttl,
            )))
            .with(Arc::new(uk::UkMeetingsConnector::new(
                uk::MeetingSource::SeniorOfficials,
                http.clone(),
                ep,
                &config.uk,
                ttl,
            )))
            .with(Arc::new(austria::AustriaConnector::new(http.clone(), ep, ttl)))
            .with(Arc::new(catalonia::CataloniaConnector::new(http.clone(), ep)))
            .with(Arc::new(finland::FinlandConnector::new(http.clone(), ep, ttl)))
            .with(Arc::new(slovenia::SloveniaConnector::new(http, ep, ttl))))
    }

    pub fn get(&self, id: JurisdictionId) -> Option<Arc<dyn Connector>> {
        self.connectors.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

// ── Helpers ──

/// Parse CSV text into header-keyed rows.
///
/// Leading byte-order marks are stripped and headers trimmed. Short rows
/// are tolerated.
pub(crate) fn read_csv_rows(text: &str, delimiter: u8) -> ConnectorResult<Vec<BTreeMap<String, String>>> {
    let text = text.trim_start_matches('\u{feff}');
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.trim().to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Field lookup returning `""` for missing keys.
pub(crate) fn field<'a>(row: &'a BTreeMap<String, String>, key: &str) -> &'a str {
    row.get(key).map(String::as_str).unwrap_or("")
}

/// Pick the best of several name matches: an exact (case-insensitive) name
/// first, otherwise the first candidate in source order.
pub(crate) fn best_match<'a, T>(
    candidates: &'a [T],
    query: &SearchQuery,
    names: impl Fn(&T) -> Vec<&str>,
) -> Option<&'a T> {
    let wanted = query.normalized();
    candidates
        .iter()
        .find(|c| names(c).iter().any(|n| n.trim().to_lowercase() == wanted))
        .or_else(|| candidates.first())
}

/// Format whole euros with thousands separators: `€1,234,567`.
pub(crate) fn format_eur(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    format!("\u{20AC}{out}")
}

/// `€min - €max`, or `None` when neither bound is disclosed.
pub(crate) fn eur_range(min: Option<u64>, max: Option<u64>) -> Option<String> {
    match (min.filter(|v| *v > 0), max.filter(|v| *v > 0)) {
        (None, None) => None,
        (min, max) => Some(format!(
            "{} - {}",
            format_eur(min.unwrap_or(0)),
            format_eur(max.unwrap_or(0))
        )),
    }
}

/// Parse a number that may carry decimals or separators ("1 234,5", "50000.0").
pub(crate) fn parse_amount(text: &str) -> Option<u64> {
    let cleaned: String = text
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{20AC}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value.round() as u64)
    } else {
        None
    }
}

/// Truncate to `max` characters, appending an ellipsis when cut.
pub(crate) fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('\u{2026}');
    out
}

/// Tag a record with the alternative that produced it when a query fans
/// out into several lookups.
pub(crate) fn tag_matched_term(record: &mut Record, alternative: &SearchQuery, fanned_out: bool) {
    if fanned_out {
        record.set_raw("matched_term", alternative.raw());
    }
}

/// Text at a JSON pointer. Numbers and booleans are rendered; anything
/// else (including a missing path) is `""`.
pub(crate) fn json_text(value: &serde_json::Value, pointer: &str) -> String {
    match value.pointer(pointer) {
        Some(serde_json::Value::String(s)) => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

pub(crate) fn missing(what: &str) -> ConnectorError {
    ConnectorError::parse(format!("missing {what}"))
}
