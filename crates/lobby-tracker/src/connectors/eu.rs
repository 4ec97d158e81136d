//! EU Transparency Register, enriched with LobbyFacts.eu history.
//!
//! The register XML (about 100 MB) is downloaded once per cache window and
//! reduced to a name/id/acronym index. Each matching organisation is then
//! looked up on LobbyFacts for its registration snapshots and Commission
//! meetings.

use super::{best_match, eur_range, field, parse_amount, read_csv_rows, tag_matched_term, Connector};
use crate::cache::ResponseCache;
use crate::config::Endpoints;
use crate::error::ConnectorResult;
use crate::http_client::HttpClient;
use crate::query::SearchQuery;
use crate::registry::JurisdictionId;
use crate::types::{EntityType, Record};
use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// One organisation from the register index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EuRegistrant {
    pub name: String,
    pub id: String,
    pub acronym: String,
}

pub struct EuConnector {
    http: HttpClient,
    register_url: String,
    lobbyfacts: String,
    index: ResponseCache<(), Arc<Vec<EuRegistrant>>>,
}

impl EuConnector {
    pub fn new(http: HttpClient, endpoints: &Endpoints, ttl: Duration) -> Self {
        Self {
            http,
            register_url: endpoints.eu_register_xml.clone(),
            lobbyfacts: endpoints.lobbyfacts.trim_end_matches('/').to_string(),
            index: ResponseCache::new(ttl),
        }
    }

    async fn index(&self) -> ConnectorResult<Arc<Vec<EuRegistrant>>> {
        let lookup = self
            .index
            .get_or_try_fetch((), || async {
                let bytes = self.http.get_bytes(&self.register_url).await?;
                let parsed = tokio::task::spawn_blocking(move || parse_register(&bytes)).await??;
                tracing::info!(organisations = parsed.len(), "EU register index loaded");
                Ok::<_, crate::error::ConnectorError>(Arc::new(parsed))
            })
            .await?;
        Ok(lookup.value)
    }

    async fn enrich(&self, registrant: &EuRegistrant) -> ConnectorResult<Record> {
        let id = &registrant.id;
        let registrations = self
            .http
            .get_text(&format!("{}/csv_export/{id}", self.lobbyfacts), &[])
            .await?;
        let meetings = self
            .http
            .get_text(&format!("{}/csv_export_meetings/{id}", self.lobbyfacts), &[])
            .await?;

        let snapshots = read_csv_rows(&registrations, b',')?;
        let meetings = read_csv_rows(&meetings, b',')?;
        tracing::debug!(
            id = %id,
            snapshots = snapshots.len(),
            meetings = meetings.len(),
            "LobbyFacts data fetched"
        );

        // Snapshots are exported oldest first.
        let latest = snapshots.last();
        let name = latest
            .map(|s| field(s, "original_name"))
            .filter(|n| !n.is_empty())
            .unwrap_or(registrant.name.as_str());

        let mut record = Record::new(JurisdictionId::Eu, name).with_type(EntityType::Company);
        record.meeting_count = Some(meetings.len() as u32);
        record.activities = meetings
            .iter()
            .map(|m| {
                let date = field(m, "Date");
                let subject = field(m, "Subject");
                match field(m, "DG name/Portfolio") {
                    "" => format!("{date}: {subject}"),
                    dg => format!("{date}: {subject} ({dg})"),
                }
            })
            .collect();

        record.set_raw("eu_register_id", id.as_str());
        record.set_raw("acronym", registrant.acronym.as_str());
        record.set_raw("snapshots", snapshots.len().to_string());
        record.set_raw("data_coverage", JurisdictionId::Eu.info().coverage);
        if let Some(latest) = latest {
            record.financial_range = eur_range(
                parse_amount(field(latest, "min")),
                parse_amount(field(latest, "max")),
            );
            record.set_raw("head_country", field(latest, "head_country"));
            record.set_raw("members", field(latest, "members"));
            record.set_raw("members_fte", field(latest, "members_fte"));
            record.set_raw("last_snapshot", field(latest, "state_date"));
        }
        Ok(record)
    }
}

#[async_trait]
impl Connector for EuConnector {
    fn jurisdiction(&self) -> JurisdictionId {
        JurisdictionId::Eu
    }

    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        let index = self.index().await?;
        let alternatives = query.alternatives();
        let fanned_out = alternatives.len() > 1;

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for alt in &alternatives {
            let candidates: Vec<&EuRegistrant> = index
                .iter()
                .filter(|r| alt.matches_any(&[&r.name, &r.acronym]))
                .collect();
            let best = best_match(&candidates, alt, |r| {
                vec![r.name.as_str(), r.acronym.as_str()]
            });
            let Some(best) = best else {
                continue;
            };
            if !seen.insert(best.id.clone()) {
                continue;
            }
            let mut record = self.enrich(best).await?;
            tag_matched_term(&mut record, alt, fanned_out);
            records.push(record);
        }
        Ok(records)
    }
}

/// Extract `interestRepresentative` entries from the register XML.
pub fn parse_register(xml: &[u8]) -> ConnectorResult<Vec<EuRegistrant>> {
    let mut reader = Reader::from_reader(xml);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<EuRegistrant> = None;
    let mut out = Vec::new();

    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "interestRepresentative" {
                    current = Some(EuRegistrant::default());
                }
                path.push(name);
            }
            Event::End(_) => {
                if path.last().map(String::as_str) == Some("interestRepresentative") {
                    if let Some(done) = current.take() {
                        out.push(done);
                    }
                }
                path.pop();
            }
            Event::Text(t) => {
                if let Some(cur) = current.as_mut() {
                    let text = t.unescape()?.into_owned();
                    let tail: Vec<&str> = path.iter().rev().take(2).map(String::as_str).collect();
                    match tail.as_slice() {
                        ["originalName", "name", ..] => cur.name = text,
                        ["identificationCode", "interestRepresentative", ..] => cur.id = text,
                        ["acronym", "interestRepresentative", ..] => cur.acronym = text,
                        _ => {}
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}
