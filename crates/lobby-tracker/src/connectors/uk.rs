//! UK: ministerial and senior officials meetings from GOV.UK.
//!
//! There is no central UK register. Every department publishes quarterly
//! transparency CSVs, so the connector discovers them at runtime:
//!
//! 1. page through the GOV.UK search API for transparency publications,
//! 2. read each publication's content item for CSV attachments,
//! 3. download the meeting CSVs and filter rows by organisation or purpose.
//!
//! The publication list is cached as a whole, independent of the search
//! term, so later searches skip discovery. Attachment lists and CSV bodies
//! are cached per URL.

use super::{field, read_csv_rows, Connector};
use crate::cache::ResponseCache;
use crate::config::{Endpoints, UkSettings};
use crate::error::{ConnectorError, ConnectorResult};
use crate::http_client::HttpClient;
use crate::query::SearchQuery;
use crate::registry::JurisdictionId;
use crate::types::Record;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Which GOV.UK meeting series a connector reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeetingSource {
    /// Ministers' meetings with external organisations.
    Ministers,
    /// Permanent secretaries, directors general and other SCS2+ officials.
    SeniorOfficials,
}

impl MeetingSource {
    pub fn jurisdiction(self) -> JurisdictionId {
        match self {
            MeetingSource::Ministers => JurisdictionId::Uk,
            MeetingSource::SeniorOfficials => JurisdictionId::UkOfficials,
        }
    }

    fn search_phrase(self) -> &'static str {
        match self {
            MeetingSource::Ministers => "ministerial meetings transparency",
            MeetingSource::SeniorOfficials => "senior officials meetings transparency",
        }
    }

    fn keeps_publication(self, title: &str) -> bool {
        let title = title.to_lowercase();
        if !title.contains("meeting") {
            return false;
        }
        match self {
            MeetingSource::Ministers => !title.contains("senior official"),
            MeetingSource::SeniorOfficials => title.contains("senior official"),
        }
    }

    fn keeps_csv(self, url: &str) -> bool {
        let url = url.to_lowercase();
        if !url.contains("meeting") {
            return false;
        }
        match self {
            MeetingSource::Ministers => !url.contains("travel"),
            MeetingSource::SeniorOfficials => {
                !url.contains("expense") && !url.contains("hospitality")
            }
        }
    }
}

/// A discovered transparency publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub title: String,
    /// Path on GOV.UK, e.g. `/government/publications/...`.
    pub link: String,
    pub organisation: String,
    pub published: String,
}

/// A meetings CSV attached to a publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvAttachment {
    pub department: String,
    pub url: String,
}

/// One matching meeting row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meeting {
    pub official: String,
    pub date: String,
    pub organisation: String,
    pub purpose: String,
    pub department: String,
}

#[derive(Debug, Deserialize)]
struct SearchPage {
    #[serde(default)]
    results: Vec<SearchHit>,
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    #[serde(default)]
    public_timestamp: Option<String>,
    #[serde(default)]
    organisations: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentItem {
    #[serde(default)]
    links: ContentLinks,
    #[serde(default)]
    details: ContentDetails,
}

#[derive(Debug, Default, Deserialize)]
struct ContentLinks {
    #[serde(default)]
    organisations: Vec<Titled>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentDetails {
    #[serde(default)]
    documents: Vec<String>,
    #[serde(default)]
    attachments: Vec<AttachmentRef>,
}

#[derive(Debug, Default, Deserialize)]
struct Titled {
    #[serde(default)]
    title: String,
}

#[derive(Debug, Default, Deserialize)]
struct AttachmentRef {
    #[serde(default)]
    url: String,
}

pub struct UkMeetingsConnector {
    source: MeetingSource,
    http: HttpClient,
    base: String,
    settings: UkSettings,
    publications: ResponseCache<(), Arc<Vec<Publication>>>,
    attachments: ResponseCache<String, Arc<Vec<CsvAttachment>>>,
    csvs: ResponseCache<String, Arc<String>>,
}

impl UkMeetingsConnector {
    pub fn new(
        source: MeetingSource,
        http: HttpClient,
        endpoints: &Endpoints,
        settings: &UkSettings,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            http,
            base: endpoints.gov_uk.trim_end_matches('/').to_string(),
            settings: settings.clone(),
            publications: ResponseCache::new(ttl),
            attachments: ResponseCache::new(ttl),
            csvs: ResponseCache::new(ttl),
        }
    }

    /// All meeting publications since the configured start date.
    pub async fn discover(&self) -> ConnectorResult<Arc<Vec<Publication>>> {
        let lookup = self
            .publications
            .get_or_try_fetch((), || async {
                let found = self.discover_uncached().await?;
                tracing::info!(
                    source = ?self.source,
                    publications = found.len(),
                    "GOV.UK publications discovered"
                );
                Ok::<_, ConnectorError>(Arc::new(found))
            })
            .await?;
        Ok(lookup.value)
    }

    async fn discover_uncached(&self) -> ConnectorResult<Vec<Publication>> {
        let url = format!("{}/api/search.json", self.base);
        let since = self.settings.since;
        let page_size = self.settings.page_size.max(1);
        let mut publications = Vec::new();
        let mut start: u64 = 0;

        for page_no in 0..self.settings.max_pages {
            let params = [
                ("q", self.source.search_phrase().to_string()),
                ("filter_format", "transparency".to_string()),
                ("filter_public_timestamp", format!("from:{since}")),
                ("fields", "title,link,organisations,public_timestamp".to_string()),
                ("count", page_size.to_string()),
                ("start", start.to_string()),
            ];
            let page: SearchPage = self.http.get_json(&url, &params).await?;
            let returned = page.results.len() as u64;
            tracing::debug!(page = page_no, returned, "GOV.UK search page");

            publications.extend(
                page.results
                    .into_iter()
                    .filter(|hit| self.source.keeps_publication(&hit.title))
                    .filter(|hit| published_since(hit.public_timestamp.as_deref(), since))
                    .map(|hit| Publication {
                        organisation: first_org_title(&hit.organisations),
                        published: hit.public_timestamp.unwrap_or_default(),
                        title: hit.title,
                        link: hit.link,
                    }),
            );

            start += u64::from(page_size);
            if returned < u64::from(page_size) {
                break;
            }
            if page.total.is_some_and(|total| start >= total) {
                break;
            }
        }
        Ok(publications)
    }

    /// CSV attachments of one publication, cached per publication path.
    async fn attachments_of(&self, publication: &Publication) -> ConnectorResult<Arc<Vec<CsvAttachment>>> {
        let lookup = self
            .attachments
            .get_or_try_fetch(publication.link.clone(), || async {
                let url = format!("{}/api/content{}", self.base, publication.link);
                let item: ContentItem = self.http.get_json(&url, &[]).await?;
                Ok::<_, ConnectorError>(Arc::new(self.csv_attachments(item, &publication.organisation)))
            })
            .await?;
        Ok(lookup.value)
    }

    fn csv_attachments(&self, item: ContentItem, fallback_org: &str) -> Vec<CsvAttachment> {
        let department = item
            .links
            .organisations
            .first()
            .map(|o| o.title.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| fallback_org.to_string());

        let mut urls: Vec<String> = item
            .details
            .documents
            .iter()
            .flat_map(|html| csv_hrefs(html))
            .collect();
        urls.extend(
            item.details
                .attachments
                .into_iter()
                .map(|a| a.url)
                .filter(|u| u.to_lowercase().ends_with(".csv")),
        );

        let mut seen = HashSet::new();
        urls.into_iter()
            .filter_map(|u| absolutize(&self.base, &u))
            .filter(|u| self.source.keeps_csv(u))
            .filter(|u| seen.insert(u.clone()))
            .map(|url| CsvAttachment {
                department: department.clone(),
                url,
            })
            .collect()
    }

    async fn csv_body(&self, url: &str) -> ConnectorResult<Arc<String>> {
        let lookup = self
            .csvs
            .get_or_try_fetch(url.to_string(), || async {
                let text = self.http.get_text(url, &[]).await?;
                Ok::<_, ConnectorError>(Arc::new(text))
            })
            .await?;
        Ok(lookup.value)
    }
}

#[async_trait]
impl Connector for UkMeetingsConnector {
    fn jurisdiction(&self) -> JurisdictionId {
        self.source.jurisdiction()
    }

    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        let publications = self.discover().await?;
        let concurrency = self.http.concurrency();

        let attachment_lists: Vec<Arc<Vec<CsvAttachment>>> = stream::iter(publications.to_vec())
            .map(|p| async move {
                match self.attachments_of(&p).await {
                    Ok(list) => Some(list),
                    Err(e) => {
                        tracing::warn!(link = %p.link, error = %e, "skipping publication");
                        None
                    }
                }
            })
            .buffer_unordered(concurrency)
            .filter_map(|x| async move { x })
            .collect()
            .await;

        let mut seen = HashSet::new();
        let attachments: Vec<CsvAttachment> = attachment_lists
            .iter()
            .flat_map(|list| list.iter().cloned())
            .filter(|a| seen.insert(a.url.clone()))
            .collect();

        let per_file: Vec<Option<Vec<Meeting>>> = stream::iter(attachments)
            .map(|a| async move {
                let body = match self.csv_body(&a.url).await {
                    Ok(body) => body,
                    Err(e) => {
                        tracing::warn!(url = %a.url, error = %e, "skipping meetings CSV");
                        return None;
                    }
                };
                match matching_meetings(&body, query, &a.department) {
                    Ok(found) => Some(found),
                    Err(e) => {
                        tracing::warn!(url = %a.url, error = %e, "unreadable meetings CSV");
                        None
                    }
                }
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        let files_searched = per_file.iter().filter(|f| f.is_some()).count();
        let meetings: Vec<Meeting> = per_file.into_iter().flatten().flatten().collect();
        tracing::debug!(
            source = ?self.source,
            files = files_searched,
            matches = meetings.len(),
            "UK meetings searched"
        );

        let mut records = group_by_organisation(self.source.jurisdiction(), meetings);
        for r in &mut records {
            r.set_raw("csv_files_searched", files_searched.to_string());
            r.set_raw("data_coverage", format!("{} onwards", self.settings.since));
        }
        Ok(records)
    }
}

// ── CSV parsing ──

const ORGANISATION_COLUMNS: &[&str] = &[
    "name of individual or organisation",
    "name of organisation or individual",
    "organisation",
    "name of organisation",
];
const PURPOSE_COLUMNS: &[&str] = &["purpose of meeting", "purpose"];
const OFFICIAL_COLUMNS: &[&str] = &["minister", "senior official's name", "senior official", "name"];

fn first_non_empty<'a>(row: &'a BTreeMap<String, String>, columns: &[&str]) -> &'a str {
    columns
        .iter()
        .map(|c| field(row, c))
        .find(|v| !v.is_empty())
        .unwrap_or("")
}

/// Rows of one meetings CSV whose organisation or purpose matches.
pub fn matching_meetings(
    csv_text: &str,
    query: &SearchQuery,
    department: &str,
) -> ConnectorResult<Vec<Meeting>> {
    let rows = read_csv_rows(csv_text, b',')?;
    let mut out = Vec::new();
    for row in rows {
        // Header spelling varies by department; compare case-insensitively.
        let row: BTreeMap<String, String> = row
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        let organisation = first_non_empty(&row, ORGANISATION_COLUMNS);
        let purpose = first_non_empty(&row, PURPOSE_COLUMNS);
        if organisation.is_empty() && purpose.is_empty() {
            continue;
        }
        if !query.matches(organisation) && !query.matches(purpose) {
            continue;
        }
        out.push(Meeting {
            official: first_non_empty(&row, OFFICIAL_COLUMNS).to_string(),
            date: field(&row, "date").to_string(),
            organisation: organisation.to_string(),
            purpose: purpose.to_string(),
            department: department.to_string(),
        });
    }
    Ok(out)
}

/// Parse the date formats seen in departmental CSVs.
pub fn parse_meeting_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Some(day) = text.get(..10) {
        if let Ok(d) = NaiveDate::parse_from_str(day, "%Y-%m-%d") {
            return Some(d);
        }
    }
    ["%d/%m/%Y", "%d/%m/%y", "%d %B %Y", "%d %b %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

/// De-duplicate meetings, sort newest first and fold them into one record
/// per organisation.
pub fn group_by_organisation(jurisdiction: JurisdictionId, meetings: Vec<Meeting>) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Meeting> = meetings
        .into_iter()
        .filter(|m| {
            seen.insert((
                m.official.to_lowercase(),
                m.date.clone(),
                m.organisation.to_lowercase(),
            ))
        })
        .collect();
    unique.sort_by(|a, b| {
        parse_meeting_date(&b.date)
            .cmp(&parse_meeting_date(&a.date))
            .then_with(|| a.organisation.cmp(&b.organisation))
            .then_with(|| a.official.cmp(&b.official))
    });

    let mut groups: Vec<(String, Vec<Meeting>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for m in unique {
        let key = crate::query::normalize(&m.organisation);
        match index.get(&key) {
            Some(&i) => groups[i].1.push(m),
            None => {
                index.insert(key, groups.len());
                groups.push((m.organisation.clone(), vec![m]));
            }
        }
    }
    groups.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(&b.0)));

    groups
        .into_iter()
        .map(|(name, meetings)| {
            let name = if name.is_empty() { "(unnamed)".to_string() } else { name };
            let mut record = Record::new(jurisdiction, name);
            record.meeting_count = Some(meetings.len() as u32);
            record.activities = meetings
                .iter()
                .map(|m| {
                    let who = match m.department.as_str() {
                        "" => m.official.clone(),
                        dept => format!("{} ({dept})", m.official),
                    };
                    format!("{}: {who}: {}", m.date, m.purpose)
                })
                .collect();

            let departments: BTreeSet<&str> = meetings
                .iter()
                .map(|m| m.department.as_str())
                .filter(|d| !d.is_empty())
                .collect();
            let mut officials: BTreeMap<&str, usize> = BTreeMap::new();
            for m in &meetings {
                if !m.official.is_empty() {
                    *officials.entry(m.official.as_str()).or_default() += 1;
                }
            }
            let mut officials: Vec<(&str, usize)> = officials.into_iter().collect();
            officials.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

            record.set_raw("departments", departments.into_iter().collect::<Vec<_>>().join("; "));
            record.set_raw(
                "officials",
                officials
                    .iter()
                    .map(|(o, n)| format!("{o} ({n})"))
                    .collect::<Vec<_>>()
                    .join("; "),
            );
            if let Some(latest) = meetings.first() {
                record.set_raw("latest_meeting", latest.date.as_str());
            }
            if let Some(earliest) = meetings.last() {
                record.set_raw("earliest_meeting", earliest.date.as_str());
            }
            record
        })
        .collect()
}

// ── Helpers ──

fn csv_href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)href="([^"]+?\.csv)""#).expect("valid regex"))
}

fn csv_hrefs(html: &str) -> Vec<String> {
    csv_href_re()
        .captures_iter(html)
        .map(|c| c[1].to_string())
        .collect()
}

fn absolutize(base: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base = url::Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

fn first_org_title(orgs: &[serde_json::Value]) -> String {
    orgs.first()
        .and_then(|o| o.get("title"))
        .and_then(|t| t.as_str())
        .unwrap_or_default()
        .to_string()
}

fn published_since(timestamp: Option<&str>, since: NaiveDate) -> bool {
    match timestamp.and_then(|t| t.get(..10)) {
        Some(day) => NaiveDate::parse_from_str(day, "%Y-%m-%d").map_or(true, |d| d >= since),
        None => true,
    }
}
