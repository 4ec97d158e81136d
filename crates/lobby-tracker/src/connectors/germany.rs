//! Germany: Bundestag Lobbyregister.
//!
//! A relevance-sorted search picks the register entry, then the entry's
//! detail document supplies finances, staff and regulatory projects.

use super::{eur_range, json_text, tag_matched_term, Connector};
use crate::config::Endpoints;
use crate::error::ConnectorResult;
use crate::http_client::HttpClient;
use crate::query::SearchQuery;
use crate::registry::JurisdictionId;
use crate::types::{EntityType, Record};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchPage {
    results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchHit {
    pub register_number: String,
    pub lobbyist_identity: Identity,
    pub register_entry_details: EntryDetails,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntryDetails {
    pub register_entry_id: Option<Value>,
}

impl SearchHit {
    fn entry_id(&self) -> String {
        match &self.register_entry_details.register_entry_id {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }
}

/// Choose the hit whose name satisfies the query. Relevance order can
/// surface unrelated entries, so the top hit is only trusted for plain
/// terms.
pub fn choose_hit<'a>(hits: &'a [SearchHit], query: &SearchQuery) -> Option<&'a SearchHit> {
    hits.iter()
        .find(|h| query.matches(&h.lobbyist_identity.name))
        .or_else(|| hits.first().filter(|_| query.is_simple()))
}

pub struct GermanyConnector {
    http: HttpClient,
    base: String,
}

impl GermanyConnector {
    pub fn new(http: HttpClient, endpoints: &Endpoints) -> Self {
        Self {
            http,
            base: endpoints.bundestag.trim_end_matches('/').to_string(),
        }
    }

    async fn find(&self, query: &SearchQuery) -> ConnectorResult<Option<SearchHit>> {
        let url = format!("{}/sucheDetailJson", self.base);
        let params = [
            ("q", query.search_text()),
            ("sort", "RELEVANCE_DESC".to_string()),
        ];
        let page: SearchPage = self.http.get_json(&url, &params).await?;
        tracing::debug!(hits = page.results.len(), "Lobbyregister search returned");
        Ok(choose_hit(&page.results, query).cloned())
    }

    async fn detail(&self, hit: &SearchHit) -> ConnectorResult<Value> {
        let url = format!(
            "{}/sucheJson/{}/{}",
            self.base,
            hit.register_number,
            hit.entry_id()
        );
        self.http.get_json(&url, &[]).await
    }
}

#[async_trait]
impl Connector for GermanyConnector {
    fn jurisdiction(&self) -> JurisdictionId {
        JurisdictionId::Germany
    }

    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        let alternatives = query.alternatives();
        let fanned_out = alternatives.len() > 1;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for alt in &alternatives {
            let Some(hit) = self.find(alt).await? else {
                continue;
            };
            if hit.register_number.is_empty() || !seen.insert(hit.register_number.clone()) {
                continue;
            }
            let detail = self.detail(&hit).await?;
            let mut record = to_record(&hit, &detail);
            tag_matched_term(&mut record, alt, fanned_out);
            records.push(record);
        }
        Ok(records)
    }
}

/// German label with an English fallback.
fn localized(value: &Value) -> String {
    let de = json_text(value, "/de");
    if de.is_empty() {
        json_text(value, "/en")
    } else {
        de
    }
}

fn amount(value: &Value, pointer: &str) -> Option<u64> {
    value.pointer(pointer).and_then(Value::as_f64).map(|v| v.max(0.0).round() as u64)
}

pub fn to_record(hit: &SearchHit, detail: &Value) -> Record {
    let name = match json_text(detail, "/lobbyistIdentity/name") {
        n if n.is_empty() => hit.lobbyist_identity.name.clone(),
        n => n,
    };
    let mut record = Record::new(JurisdictionId::Germany, name).with_type(EntityType::Company);

    record.financial_range = eur_range(
        amount(detail, "/financialExpenses/financialExpensesEuro/from"),
        amount(detail, "/financialExpenses/financialExpensesEuro/to"),
    );

    let empty = Vec::new();
    let fields = detail
        .pointer("/activitiesAndInterests/fieldsOfInterest")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    record.activities = fields
        .iter()
        .map(localized)
        .filter(|f| !f.is_empty())
        .collect();

    let projects = detail
        .pointer("/regulatoryProjects/regulatoryProjects")
        .and_then(Value::as_array)
        .unwrap_or(&empty);
    record.activities.extend(
        projects
            .iter()
            .map(|p| json_text(p, "/title"))
            .filter(|t| !t.is_empty())
            .map(|t| format!("Regulatory project: {t}")),
    );

    let identity = detail.pointer("/lobbyistIdentity").unwrap_or(&Value::Null);
    let berlin = match identity.get("capitalCityRepresentationPresent") {
        Some(Value::Bool(true)) => "yes",
        Some(Value::Bool(false)) => "no",
        _ => "",
    };
    let fiscal_year = match (
        json_text(detail, "/financialExpenses/relatedFiscalYearStart"),
        json_text(detail, "/financialExpenses/relatedFiscalYearEnd"),
    ) {
        (start, end) if start.is_empty() || end.is_empty() => format!("{start}{end}"),
        (start, end) => format!("{start} to {end}"),
    };
    let versions = detail
        .pointer("/accountDetails/registerEntryVersions")
        .and_then(Value::as_array)
        .map(Vec::len);

    record.set_raw("register_number", hit.register_number.as_str());
    record.set_raw(
        "legal_form",
        identity.get("legalForm").map(localized).unwrap_or_default(),
    );
    record.set_raw("city", json_text(identity, "/address/city"));
    record.set_raw(
        "country",
        identity
            .pointer("/address/country")
            .map(localized)
            .unwrap_or_default(),
    );
    record.set_raw("berlin_office", berlin);
    record.set_raw(
        "employee_fte",
        json_text(detail, "/employeesInvolvedInLobbying/employeeFTE"),
    );
    record.set_raw(
        "activity_type",
        detail
            .pointer("/activitiesAndInterests/activity")
            .map(localized)
            .unwrap_or_default(),
    );
    record.set_raw(
        "regulatory_projects_count",
        json_text(detail, "/regulatoryProjects/regulatoryProjectsCount"),
    );
    record.set_raw("fiscal_year", fiscal_year);
    record.set_raw(
        "first_publication",
        json_text(detail, "/accountDetails/firstPublicationDate"),
    );
    record.set_raw("last_update", json_text(detail, "/accountDetails/lastUpdateDate"));
    if let Some(count) = versions {
        record.set_raw("version_count", count.to_string());
    }
    record.set_raw(
        "contact_email",
        json_text(identity, "/contactDetails/emails/0/email"),
    );
    record.set_raw("data_coverage", JurisdictionId::Germany.info().coverage);
    record
}
