//! Jurisdiction registry: the fixed set of transparency registers the
//! tracker knows about, with their display metadata.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a supported jurisdiction.
///
/// The declaration order is the registry order used for result listings,
/// export sheets and the search form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JurisdictionId {
    Eu,
    France,
    Germany,
    Uk,
    UkOfficials,
    Austria,
    Catalonia,
    Finland,
    Slovenia,
}

impl JurisdictionId {
    /// All jurisdictions in registry order.
    pub const ALL: [JurisdictionId; 9] = [
        JurisdictionId::Eu,
        JurisdictionId::France,
        JurisdictionId::Germany,
        JurisdictionId::Uk,
        JurisdictionId::UkOfficials,
        JurisdictionId::Austria,
        JurisdictionId::Catalonia,
        JurisdictionId::Finland,
        JurisdictionId::Slovenia,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            JurisdictionId::Eu => "eu",
            JurisdictionId::France => "france",
            JurisdictionId::Germany => "germany",
            JurisdictionId::Uk => "uk",
            JurisdictionId::UkOfficials => "uk_officials",
            JurisdictionId::Austria => "austria",
            JurisdictionId::Catalonia => "catalonia",
            JurisdictionId::Finland => "finland",
            JurisdictionId::Slovenia => "slovenia",
        }
    }

    /// Static metadata for this jurisdiction.
    pub fn info(self) -> &'static Jurisdiction {
        // REGISTRY is declared in the same order as the enum.
        &REGISTRY[self as usize]
    }
}

impl fmt::Display for JurisdictionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown jurisdiction id.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown jurisdiction: {0}")]
pub struct UnknownJurisdiction(pub String);

impl FromStr for JurisdictionId {
    type Err = UnknownJurisdiction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        JurisdictionId::ALL
            .into_iter()
            .find(|id| id.as_str() == key)
            .ok_or_else(|| UnknownJurisdiction(s.to_string()))
    }
}

/// Display metadata for one jurisdiction.
#[derive(Debug, Clone, Serialize)]
pub struct Jurisdiction {
    pub id: JurisdictionId,
    pub name: &'static str,
    pub flag: &'static str,
    /// Whether the source publishes lobbying expenditure.
    pub has_financial_data: bool,
    pub note: Option<&'static str>,
    /// Period covered by the published data.
    pub coverage: &'static str,
    /// Whether the jurisdiction is selected by default in the search form.
    pub default_enabled: bool,
}

static REGISTRY: [Jurisdiction; 9] = [
    Jurisdiction {
        id: JurisdictionId::Eu,
        name: "EU (European Commission)",
        flag: "\u{1F1EA}\u{1F1FA}",
        has_financial_data: true,
        note: Some("Via LobbyFacts.eu, includes Commission meetings"),
        coverage: "2012-present",
        default_enabled: true,
    },
    Jurisdiction {
        id: JurisdictionId::France,
        name: "France",
        flag: "\u{1F1EB}\u{1F1F7}",
        has_financial_data: true,
        note: Some("Via HATVP, detailed activity disclosures"),
        coverage: "2017-present",
        default_enabled: true,
    },
    Jurisdiction {
        id: JurisdictionId::Germany,
        name: "Germany",
        flag: "\u{1F1E9}\u{1F1EA}",
        has_financial_data: true,
        note: Some("Via Bundestag Lobbyregister, cost ranges"),
        coverage: "2022-present",
        default_enabled: true,
    },
    Jurisdiction {
        id: JurisdictionId::Uk,
        name: "UK (Ministerial meetings)",
        flag: "\u{1F1EC}\u{1F1E7}",
        has_financial_data: false,
        note: Some("Meetings only, no expenditure. Discovery across departments can be slow"),
        coverage: "2010-present",
        default_enabled: false,
    },
    Jurisdiction {
        id: JurisdictionId::UkOfficials,
        name: "UK (Senior officials meetings)",
        flag: "\u{1F1EC}\u{1F1E7}",
        has_financial_data: false,
        note: Some("Permanent secretaries and director generals, meetings only"),
        coverage: "2010-present",
        default_enabled: false,
    },
    Jurisdiction {
        id: JurisdictionId::Austria,
        name: "Austria",
        flag: "\u{1F1E6}\u{1F1F9}",
        has_financial_data: false,
        note: Some("Financial data only disclosed above \u{20AC}100,000"),
        coverage: "2013-present",
        default_enabled: true,
    },
    Jurisdiction {
        id: JurisdictionId::Catalonia,
        name: "Catalonia",
        flag: "\u{1F3F4}\u{E0065}\u{E0073}\u{E0063}\u{E0074}\u{E007F}",
        has_financial_data: true,
        note: Some("Regional register, annual business volume"),
        coverage: "2016-present",
        default_enabled: true,
    },
    Jurisdiction {
        id: JurisdictionId::Finland,
        name: "Finland",
        flag: "\u{1F1EB}\u{1F1EE}",
        has_financial_data: false,
        note: Some("Financial data published from July 2026"),
        coverage: "2024-present",
        default_enabled: true,
    },
    Jurisdiction {
        id: JurisdictionId::Slovenia,
        name: "Slovenia",
        flag: "\u{1F1F8}\u{1F1EE}",
        has_financial_data: false,
        note: Some("Lists individual lobbyists, not companies"),
        coverage: "2011-present",
        default_enabled: true,
    },
];

/// All registry entries in registry order.
pub fn all() -> &'static [Jurisdiction] {
    &REGISTRY
}

/// Ids selected by default in the search form.
pub fn default_selection() -> Vec<JurisdictionId> {
    REGISTRY
        .iter()
        .filter(|j| j.default_enabled)
        .map(|j| j.id)
        .collect()
}

/// Parse a list of ids, rejecting unknown ones.
pub fn parse_ids<I, S>(values: I) -> Result<Vec<JurisdictionId>, UnknownJurisdiction>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values.into_iter().map(|v| v.as_ref().parse()).collect()
}
