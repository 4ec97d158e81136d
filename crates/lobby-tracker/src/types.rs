//! Core data types: normalized records and search results.

use crate::registry::JurisdictionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of entity a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// An organisation lobbying on its own behalf.
    Company,
    /// An individual registered lobbyist.
    Lobbyist,
    /// A consultancy or law firm lobbying for clients.
    Firm,
}

impl EntityType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityType::Company => "company",
            EntityType::Lobbyist => "lobbyist",
            EntityType::Firm => "firm",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One normalized lobbying entry from a jurisdiction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub jurisdiction: JurisdictionId,
    pub entity_name: String,
    pub entity_type: Option<EntityType>,
    pub financial_range: Option<String>,
    pub activities: Vec<String>,
    pub meeting_count: Option<u32>,
    /// Source fields kept verbatim, keyed by a stable snake_case name.
    pub raw: BTreeMap<String, String>,
}

impl Record {
    pub fn new(jurisdiction: JurisdictionId, entity_name: impl Into<String>) -> Self {
        Self {
            jurisdiction,
            entity_name: entity_name.into(),
            entity_type: None,
            financial_range: None,
            activities: Vec::new(),
            meeting_count: None,
            raw: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, entity_type: EntityType) -> Self {
        self.entity_type = Some(entity_type);
        self
    }

    /// Store a raw field, skipping empty values.
    pub fn set_raw(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if !value.is_empty() {
            self.raw.insert(key.to_string(), value.to_string());
        }
    }
}

/// Outcome status of one jurisdiction in a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JurisdictionStatus {
    Ok,
    Empty,
    Error { reason: String },
}

impl JurisdictionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            JurisdictionStatus::Ok => "ok",
            JurisdictionStatus::Empty => "no matches",
            JurisdictionStatus::Error { .. } => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, JurisdictionStatus::Error { .. })
    }
}

/// Records and status produced by one jurisdiction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JurisdictionOutcome {
    pub jurisdiction: JurisdictionId,
    pub status: JurisdictionStatus,
    pub records: Vec<Record>,
    /// Whether the records were served from the result cache.
    pub from_cache: bool,
    pub elapsed_ms: u64,
}

impl JurisdictionOutcome {
    pub fn from_records(jurisdiction: JurisdictionId, records: Vec<Record>) -> Self {
        let status = if records.is_empty() {
            JurisdictionStatus::Empty
        } else {
            JurisdictionStatus::Ok
        };
        Self {
            jurisdiction,
            status,
            records,
            from_cache: false,
            elapsed_ms: 0,
        }
    }

    pub fn failed(jurisdiction: JurisdictionId, reason: impl Into<String>) -> Self {
        Self {
            jurisdiction,
            status: JurisdictionStatus::Error {
                reason: reason.into(),
            },
            records: Vec::new(),
            from_cache: false,
            elapsed_ms: 0,
        }
    }
}

/// Aggregated result of one search across the selected jurisdictions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub searched_at: DateTime<Utc>,
    pub term: String,
    /// Jurisdictions queried, in registry order.
    pub jurisdictions: Vec<JurisdictionId>,
    /// One outcome per queried jurisdiction, in registry order.
    pub outcomes: Vec<JurisdictionOutcome>,
}

impl SearchResult {
    pub fn empty(term: impl Into<String>) -> Self {
        Self {
            searched_at: Utc::now(),
            term: term.into(),
            jurisdictions: Vec::new(),
            outcomes: Vec::new(),
        }
    }

    pub fn total_records(&self) -> usize {
        self.outcomes.iter().map(|o| o.records.len()).sum()
    }

    /// All records, in registry order.
    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.outcomes.iter().flat_map(|o| o.records.iter())
    }

    /// Per-jurisdiction fetch errors.
    pub fn errors(&self) -> impl Iterator<Item = (JurisdictionId, &str)> {
        self.outcomes.iter().filter_map(|o| match &o.status {
            JurisdictionStatus::Error { reason } => Some((o.jurisdiction, reason.as_str())),
            _ => None,
        })
    }

    pub fn outcome(&self, id: JurisdictionId) -> Option<&JurisdictionOutcome> {
        self.outcomes.iter().find(|o| o.jurisdiction == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_raw_skips_blank() {
        let mut r = Record::new(JurisdictionId::Eu, "Acme");
        r.set_raw("city", "  ");
        r.set_raw("country", " Belgium ");
        assert_eq!(r.raw.len(), 1);
        assert_eq!(r.raw["country"], "Belgium");
    }

    #[test]
    fn test_outcome_status_from_records() {
        let empty = JurisdictionOutcome::from_records(JurisdictionId::France, vec![]);
        assert_eq!(empty.status, JurisdictionStatus::Empty);

        let ok = JurisdictionOutcome::from_records(
            JurisdictionId::France,
            vec![Record::new(JurisdictionId::France, "Acme")],
        );
        assert_eq!(ok.status, JurisdictionStatus::Ok);
    }

    #[test]
    fn test_errors_listing() {
        let mut result = SearchResult::empty("acme");
        result
            .outcomes
            .push(JurisdictionOutcome::failed(JurisdictionId::Germany, "HTTP 500"));
        result
            .outcomes
            .push(JurisdictionOutcome::from_records(JurisdictionId::Eu, vec![]));
        let errors: Vec<_> = result.errors().collect();
        assert_eq!(errors, vec![(JurisdictionId::Germany, "HTTP 500")]);
    }

    #[test]
    fn test_status_serializes_with_tag() {
        let status = JurisdictionStatus::Error {
            reason: "rate limited".into(),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "error");
        assert_eq!(json["reason"], "rate limited");
    }
}
