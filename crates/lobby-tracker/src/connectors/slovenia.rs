//! Slovenia: KPK register of lobbyists.
//!
//! The register lists individual lobbyists rather than organisations. The
//! single register page is scraped and cached; searches match a
//! lobbyist's name, employer or fields of interest.

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
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Words that mark a `<strong>` as page chrome rather than a person.
const NON_NAME_WORDS: &[&str] = &["lobist", "register", "sankcij", "komisija"];
const COMPANY_MARKERS: &[&str] = &["D.O.O", "D. O. O.", "S.P"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Lobbyist {
    pub name: String,
    pub company: String,
    pub fields_of_interest: Vec<String>,
    pub address: String,
    pub city: String,
    pub email: String,
}

pub struct SloveniaConnector {
    http: HttpClient,
    url: String,
    register: ResponseCache<(), Arc<Vec<Lobbyist>>>,
}

impl SloveniaConnector {
    pub fn new(http: HttpClient, endpoints: &Endpoints, ttl: Duration) -> Self {
        Self {
            http,
            url: endpoints.slovenia.clone(),
            register: ResponseCache::new(ttl),
        }
    }

    async fn lobbyists(&self) -> ConnectorResult<Arc<Vec<Lobbyist>>> {
        let lookup = self
            .register
            .get_or_try_fetch((), || async {
                let html = self.http.get_text(&self.url, &[]).await?;
                let parsed = tokio::task::spawn_blocking(move || parse_register(&html)).await?;
                tracing::info!(lobbyists = parsed.len(), "Slovenian register loaded");
                Ok::<_, ConnectorError>(Arc::new(parsed))
            })
            .await?;
        Ok(lookup.value)
    }
}

#[async_trait]
impl Connector for SloveniaConnector {
    fn jurisdiction(&self) -> JurisdictionId {
        JurisdictionId::Slovenia
    }

    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        let lobbyists = self.lobbyists().await?;
        let total = lobbyists.len();
        Ok(lobbyists
            .iter()
            .filter(|l| {
                query.matches(&l.name)
                    || query.matches(&l.company)
                    || l.fields_of_interest.iter().any(|f| query.matches(f))
            })
            .map(|l| to_record(l, total))
            .collect())
    }
}

pub fn to_record(lobbyist: &Lobbyist, total_registered: usize) -> Record {
    let mut record = Record::new(JurisdictionId::Slovenia, lobbyist.name.as_str())
        .with_type(EntityType::Lobbyist);
    record.activities = lobbyist.fields_of_interest.clone();
    record.set_raw("company", lobbyist.company.as_str());
    record.set_raw("address", lobbyist.address.as_str());
    record.set_raw("city", lobbyist.city.as_str());
    record.set_raw("email", lobbyist.email.as_str());
    record.set_raw("total_registered", total_registered.to_string());
    record.set_raw("data_coverage", JurisdictionId::Slovenia.info().coverage);
    record
}

fn postal_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}\s").expect("postal code regex is valid"))
}

fn squash(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Closest ancestor `div` whose class list mentions `flex`.
fn entry_container<'a>(strong: ElementRef<'a>) -> Option<ElementRef<'a>> {
    strong
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| {
            el.value().name() == "div"
                && el.value().attr("class").is_some_and(|c| c.contains("flex"))
        })
        .or_else(|| strong.parent().and_then(ElementRef::wrap))
}

/// Extract lobbyists from the register page, de-duplicated by name.
pub fn parse_register(html: &str) -> Vec<Lobbyist> {
    let doc = Html::parse_document(html);
    let (Ok(strong_sel), Ok(fields_sel), Ok(li_sel)) = (
        Selector::parse("strong"),
        Selector::parse("p.m-0"),
        Selector::parse("ul li"),
    ) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for strong in doc.select(&strong_sel) {
        let name = squash(&strong.text().collect::<String>());
        if !name.contains(',') {
            continue;
        }
        let lower = name.to_lowercase();
        if NON_NAME_WORDS.iter().any(|w| lower.contains(w)) {
            continue;
        }
        if !seen.insert(name.clone()) {
            continue;
        }

        let mut entry = Lobbyist {
            name,
            ..Lobbyist::default()
        };
        if let Some(container) = entry_container(strong) {
            if let Some(p) = container.select(&fields_sel).next() {
                entry.fields_of_interest = p
                    .text()
                    .collect::<String>()
                    .split('\u{00B7}')
                    .map(squash)
                    .filter(|f| !f.is_empty())
                    .collect();
            }
            for li in container.select(&li_sel) {
                classify_contact(&mut entry, &squash(&li.text().collect::<String>()));
            }
        }
        out.push(entry);
    }
    out
}

fn classify_contact(entry: &mut Lobbyist, line: &str) {
    if line.is_empty() {
        return;
    }
    let upper = line.to_uppercase();
    if line.contains('@') {
        entry.email = line.to_string();
    } else if COMPANY_MARKERS.iter().any(|m| upper.contains(m)) {
        entry.company = line.to_string();
    } else if postal_code_re().is_match(line) {
        entry.city = line.to_string();
    } else if entry.address.is_empty() && line.chars().any(|c| c.is_ascii_digit()) {
        entry.address = line.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><body>
<h2><strong>Register lobistov, stanje</strong></h2>
<div class="flex flex-column gap-3">
  <strong>Novak, Janez</strong>
  <p class="m-0">Energetika · Okolje · Promet</p>
  <ul>
    <li>Svetovanje Novak d.o.o.</li>
    <li>Slovenska cesta 1</li>
    <li>1000 Ljubljana</li>
    <li>janez@example.si</li>
  </ul>
</div>
<div class="flex flex-column gap-3">
  <strong>Kovač, Ana</strong>
  <p class="m-0">Zdravstvo</p>
</div>
<div class="flex"><strong>Novak, Janez</strong></div>
</body></html>"#;

    #[test]
    fn test_parse_register() {
        let lobbyists = parse_register(PAGE);
        assert_eq!(lobbyists.len(), 2);

        let janez = &lobbyists[0];
        assert_eq!(janez.name, "Novak, Janez");
        assert_eq!(janez.fields_of_interest, vec!["Energetika", "Okolje", "Promet"]);
        assert_eq!(janez.company, "Svetovanje Novak d.o.o.");
        assert_eq!(janez.address, "Slovenska cesta 1");
        assert_eq!(janez.city, "1000 Ljubljana");
        assert_eq!(janez.email, "janez@example.si");

        assert_eq!(lobbyists[1].fields_of_interest, vec!["Zdravstvo"]);
        assert_eq!(lobbyists[1].company, "");
    }

    #[test]
    fn test_to_record_is_lobbyist() {
        let lobbyists = parse_register(PAGE);
        let r = to_record(&lobbyists[0], lobbyists.len());
        assert_eq!(r.entity_type, Some(EntityType::Lobbyist));
        assert_eq!(r.financial_range, None);
        assert_eq!(r.raw["total_registered"], "2");
        assert_eq!(r.activities.len(), 3);
    }
}
