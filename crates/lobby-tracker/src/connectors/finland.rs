//! Finland: Avoimuusrekisteri, the national transparency register.
//!
//! The open-data API has no search endpoint, so the full registration list
//! is cached and filtered locally. Activity disclosures are fetched per
//! matching company.

use super::{truncate_chars, Connector};
use crate::cache::ResponseCache;
use crate::config::Endpoints;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http_client::HttpClient;
use crate::query::SearchQuery;
use crate::registry::JurisdictionId;
use crate::types::{EntityType, Record};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

const MAX_TOPICS: usize = 10;
const TOPIC_CHARS: usize = 100;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Registration {
    pub company_name: String,
    pub supplementary_company_names: Vec<Titled>,
    pub company_id: Option<serde_json::Value>,
    pub diary_number: Option<String>,
    pub registration_date: Option<String>,
    pub main_industry: Option<String>,
    pub description: Option<String>,
    pub memberships: Vec<Titled>,
    pub commit_to_ethical_lobbying: Option<bool>,
    pub exited: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Titled {
    pub title: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ActivityNotification {
    topics: Vec<Topic>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Topic {
    contact_topic_other: Option<String>,
    contact_topic_project: Option<String>,
}

impl Registration {
    /// Company id as text; the API serves it as a string or a number.
    pub fn id(&self) -> String {
        match &self.company_id {
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        }
    }

    fn names(&self) -> Vec<&str> {
        std::iter::once(self.company_name.as_str())
            .chain(self.supplementary_company_names.iter().map(|s| s.title.as_str()))
            .collect()
    }
}

pub struct FinlandConnector {
    http: HttpClient,
    base: String,
    registrations: ResponseCache<(), Arc<Vec<Registration>>>,
}

impl FinlandConnector {
    pub fn new(http: HttpClient, endpoints: &Endpoints, ttl: Duration) -> Self {
        Self {
            http,
            base: endpoints.finland.trim_end_matches('/').to_string(),
            registrations: ResponseCache::new(ttl),
        }
    }

    async fn registrations(&self) -> ConnectorResult<Arc<Vec<Registration>>> {
        let lookup = self
            .registrations
            .get_or_try_fetch((), || async {
                let url = format!("{}/open-data-register-notification", self.base);
                let list: Vec<Registration> = self.http.get_json(&url, &[]).await?;
                tracing::info!(registrations = list.len(), "Finnish register loaded");
                Ok::<_, ConnectorError>(Arc::new(list))
            })
            .await?;
        Ok(lookup.value)
    }

    /// Contact topics for one company. A failed fetch yields no topics.
    async fn topics(&self, company_id: &str) -> (usize, Vec<String>) {
        if company_id.is_empty() {
            return (0, Vec::new());
        }
        let url = format!("{}/open-data-activity-notification/company/{company_id}", self.base);
        match self.http.get_json::<Vec<ActivityNotification>>(&url, &[]).await {
            Ok(notifications) => (notifications.len(), distinct_topics(&notifications)),
            Err(e) => {
                tracing::warn!(company_id, error = %e, "Finnish activity fetch failed");
                (0, Vec::new())
            }
        }
    }
}

fn distinct_topics(notifications: &[ActivityNotification]) -> Vec<String> {
    let mut seen = HashSet::new();
    notifications
        .iter()
        .flat_map(|n| n.topics.iter())
        .filter_map(|t| {
            t.contact_topic_other
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .or(t.contact_topic_project.as_deref())
        })
        .map(|s| truncate_chars(s.trim(), TOPIC_CHARS))
        .filter(|s| !s.is_empty() && seen.insert(s.clone()))
        .take(MAX_TOPICS)
        .collect()
}

#[async_trait]
impl Connector for FinlandConnector {
    fn jurisdiction(&self) -> JurisdictionId {
        JurisdictionId::Finland
    }

    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        let registrations = self.registrations().await?;
        let matches: Vec<Registration> = registrations
            .iter()
            .filter(|r| r.names().iter().any(|n| query.matches(n)))
            .cloned()
            .collect();

        let concurrency = self.http.concurrency();
        let records: Vec<Record> = stream::iter(matches)
            .map(|reg| async move {
                let (activity_count, topics) = self.topics(&reg.id()).await;
                to_record(&reg, activity_count, topics)
            })
            .buffered(concurrency)
            .collect()
            .await;
        Ok(records)
    }
}

pub fn to_record(reg: &Registration, activity_count: usize, topics: Vec<String>) -> Record {
    let mut record = Record::new(JurisdictionId::Finland, reg.company_name.as_str())
        .with_type(EntityType::Company);
    record.activities = topics;

    let text = |v: &Option<String>| v.clone().unwrap_or_default();
    let yes_no = |v: Option<bool>| match v {
        Some(true) => "yes",
        Some(false) => "no",
        None => "",
    };

    record.set_raw("company_id", reg.id());
    record.set_raw("diary_number", text(&reg.diary_number));
    record.set_raw("registration_date", text(&reg.registration_date));
    record.set_raw("main_industry", text(&reg.main_industry));
    record.set_raw("description", text(&reg.description));
    record.set_raw(
        "memberships",
        reg.memberships
            .iter()
            .map(|m| m.title.as_str())
            .collect::<Vec<_>>()
            .join("; "),
    );
    record.set_raw(
        "supplementary_names",
        reg.supplementary_company_names
            .iter()
            .map(|m| m.title.as_str())
            .collect::<Vec<_>>()
            .join("; "),
    );
    record.set_raw("activity_notifications", activity_count.to_string());
    record.set_raw("ethical_commitment", yes_no(reg.commit_to_ethical_lobbying));
    record.set_raw("exited", yes_no(reg.exited));
    record.set_raw("data_coverage", JurisdictionId::Finland.info().coverage);
    record
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registration_deserializes_loosely() {
        let json = r#"[{"companyName":"Nokia Oyj","companyId":123,
            "supplementaryCompanyNames":[{"title":"Nokia Technologies"}],
            "memberships":[{"title":"EK"}],"commitToEthicalLobbying":true,"unknown":1}]"#;
        let regs: Vec<Registration> = serde_json::from_str(json).unwrap();
        assert_eq!(regs[0].id(), "123");
        assert_eq!(regs[0].names(), vec!["Nokia Oyj", "Nokia Technologies"]);

        let r = to_record(&regs[0], 2, vec!["5G".into()]);
        assert_eq!(r.raw["memberships"], "EK");
        assert_eq!(r.raw["ethical_commitment"], "yes");
        assert!(!r.raw.contains_key("exited"));
        assert_eq!(r.activities, vec!["5G"]);
    }

    #[test]
    fn test_distinct_topics_limits_and_truncates() {
        let long = "x".repeat(150);
        let mut topics: Vec<Topic> = (0..15)
            .map(|i| Topic {
                contact_topic_other: Some(format!("topic {i}")),
                contact_topic_project: None,
            })
            .collect();
        topics.insert(
            0,
            Topic {
                contact_topic_other: None,
                contact_topic_project: Some(long),
            },
        );
        topics.insert(
            1,
            Topic {
                contact_topic_other: Some("topic 0".into()),
                contact_topic_project: None,
            },
        );
        let out = distinct_topics(&[ActivityNotification { topics }]);
        assert_eq!(out.len(), MAX_TOPICS);
        assert_eq!(out[0].chars().count(), TOPIC_CHARS + 1);
        assert_eq!(out[1], "topic 0");
        assert_eq!(out[2], "topic 1");
    }
}
