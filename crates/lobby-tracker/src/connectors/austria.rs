//! Austria: Lobbying- und Interessenvertretungs-Register.
//!
//! The register runs on a Domino server with no API. The alphabetical list
//! page carries every entry, so it is scraped once per cache window.

use super::Connector;
use crate::cache::ResponseCache;
use crate::config::Endpoints;
use crate::error::{ConnectorError, ConnectorResult};
use crate::http_client::HttpClient;
use crate::query::SearchQuery;
use crate::registry::JurisdictionId;
use crate::types::{EntityType, Record};
use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// One row of the register list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AustriaEntry {
    pub name: String,
    pub register_number: String,
    pub doc_id: String,
    pub category: String,
    pub lobbyists: Vec<String>,
    pub last_update: String,
}

/// Register section letters and their meaning.
pub fn category_description(category: &str) -> &str {
    match category {
        "A1" => "Lobbying company",
        "A2" => "Client info (not public)",
        "B" => "Company with in-house lobbyists",
        "C" => "Self-governing body",
        "D" => "Interest group/association",
        other => other,
    }
}

pub struct AustriaConnector {
    http: HttpClient,
    list_url: String,
    detail_base: String,
    list: ResponseCache<(), Arc<Vec<AustriaEntry>>>,
}

impl AustriaConnector {
    pub fn new(http: HttpClient, endpoints: &Endpoints, ttl: Duration) -> Self {
        Self {
            http,
            list_url: endpoints.austria_list.clone(),
            detail_base: endpoints.austria_detail.trim_end_matches('/').to_string(),
            list: ResponseCache::new(ttl),
        }
    }

    async fn entries(&self) -> ConnectorResult<Arc<Vec<AustriaEntry>>> {
        let lookup = self
            .list
            .get_or_try_fetch((), || async {
                let html = self.http.get_text(&self.list_url, &[]).await?;
                let entries = tokio::task::spawn_blocking(move || parse_list(&html)).await?;
                tracing::info!(entries = entries.len(), "Austrian register list loaded");
                Ok::<_, ConnectorError>(Arc::new(entries))
            })
            .await?;
        Ok(lookup.value)
    }

    fn to_record(&self, entry: &AustriaEntry) -> Record {
        let entity_type = if entry.category == "A1" {
            EntityType::Firm
        } else {
            EntityType::Company
        };
        let mut record = Record::new(JurisdictionId::Austria, entry.name.as_str()).with_type(entity_type);
        record
            .activities
            .push(category_description(&entry.category).to_string());

        record.set_raw("register_number", entry.register_number.as_str());
        record.set_raw("category", entry.category.as_str());
        record.set_raw("lobbyists", entry.lobbyists.join(", "));
        record.set_raw("last_update", entry.last_update.as_str());
        if !entry.doc_id.is_empty() {
            record.set_raw(
                "detail_url",
                format!("{}/{}!OpenDocument", self.detail_base, entry.doc_id),
            );
        }
        record.set_raw("data_coverage", JurisdictionId::Austria.info().coverage);
        record
    }
}

#[async_trait]
impl Connector for AustriaConnector {
    fn jurisdiction(&self) -> JurisdictionId {
        JurisdictionId::Austria
    }

    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        let entries = self.entries().await?;
        Ok(entries
            .iter()
            .filter(|e| query.matches(&e.name))
            .map(|e| self.to_record(e))
            .collect())
    }
}

fn doc_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"alldoc/([a-fA-F0-9]+)!").expect("doc id regex is valid"))
}

fn cell_text(cell: &ElementRef<'_>) -> String {
    cell.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse the alphabetical list page.
///
/// Each data row holds name, register number link, category, line-broken
/// lobbyist names and last-update date. Counter cells rendered by script
/// are skipped.
pub fn parse_list(html: &str) -> Vec<AustriaEntry> {
    let doc = Html::parse_document(html);
    let (Ok(tr), Ok(td), Ok(a)) = (
        Selector::parse("tr"),
        Selector::parse("td"),
        Selector::parse("a"),
    ) else {
        return Vec::new();
    };

    let mut entries = Vec::new();
    for row in doc.select(&tr) {
        let cells: Vec<ElementRef<'_>> = row
            .select(&td)
            .filter(|c| !c.inner_html().contains("count()"))
            .collect();
        if cells.len() < 5 {
            continue;
        }

        let reg_link = cells[1].select(&a).next();
        let register_number = reg_link.map(|l| cell_text(&l)).unwrap_or_else(|| cell_text(&cells[1]));
        if !register_number.starts_with("LIVR") {
            continue;
        }
        let doc_id = reg_link
            .and_then(|l| l.value().attr("href"))
            .and_then(|href| doc_id_re().captures(href))
            .map(|c| c[1].to_string())
            .unwrap_or_default();

        let lobbyists = cells[3]
            .text()
            .map(str::trim)
            .map(|s| s.trim_end_matches(',').trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        entries.push(AustriaEntry {
            name: cell_text(&cells[0]),
            register_number,
            doc_id,
            category: cell_text(&cells[2]),
            lobbyists,
            last_update: cell_text(&cells[4]),
        });
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body><table>
<tr><th>Name</th><th>Nr</th><th>Abt.</th><th>Lobbyisten</th><th>Datum</th></tr>
<tr><td><script>count()</script></td><td>Alpha Public Affairs GmbH</td>
<td><a href="/edikte/ir/iredi18.nsf/alldoc/0a1b2c3d!OpenDocument">LIVR-00012</a></td>
<td>A1</td><td>Maria Muster<br>Hans Beispiel<br></td><td>01.02.2024</td></tr>
<tr><td>Beta Energie AG</td>
<td><a href="/edikte/ir/iredi18.nsf/alldoc/ffee99!OpenDocument">LIVR-00345</a></td>
<td>B</td><td>Karl Test</td><td>15.03.2023</td></tr>
</table></body></html>"#;

    #[test]
    fn test_parse_list() {
        let entries = parse_list(PAGE);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "Alpha Public Affairs GmbH");
        assert_eq!(entries[0].register_number, "LIVR-00012");
        assert_eq!(entries[0].doc_id, "0a1b2c3d");
        assert_eq!(entries[0].category, "A1");
        assert_eq!(entries[0].lobbyists, vec!["Maria Muster", "Hans Beispiel"]);
        assert_eq!(entries[1].last_update, "15.03.2023");
    }

    #[test]
    fn test_category_description() {
        assert_eq!(category_description("D"), "Interest group/association");
        assert_eq!(category_description("X"), "X");
    }

    #[test]
    fn test_header_rows_are_skipped() {
        assert!(parse_list("<table><tr><td>a</td><td>b</td></tr></table>").is_empty());
    }
}
