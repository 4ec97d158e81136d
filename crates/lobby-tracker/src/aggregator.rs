//! Multi-jurisdiction search.
//!
//! Selected connectors run concurrently, each on its own task and under its
//! own deadline, so one slow or failing register never affects another.
//! Successful results are cached for 24 hours per (jurisdiction, normalized
//! term); failures are reported in the outcome and never cached.

use crate::cache::ResponseCache;
use crate::config::TrackerConfig;
use crate::connectors::ConnectorSet;
use crate::error::{ConnectorError, ConnectorResult};
use crate::query::SearchQuery;
use crate::registry::JurisdictionId;
use crate::types::{JurisdictionOutcome, Record, SearchResult};
use chrono::Utc;
use futures::stream::{FuturesUnordered, Stream};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

type ResultKey = (JurisdictionId, String);

pub struct Aggregator {
    connectors: ConnectorSet,
    results: Arc<ResponseCache<ResultKey, Arc<Vec<Record>>>>,
    connector_timeout: Duration,
}

impl Aggregator {
    pub fn new(connectors: ConnectorSet, cache_ttl: Duration, connector_timeout: Duration) -> Self {
        Self {
            connectors,
            results: Arc::new(ResponseCache::new(cache_ttl)),
            connector_timeout,
        }
    }

    /// Aggregator over the live connectors.
    pub fn live(config: &TrackerConfig) -> ConnectorResult<Self> {
        Ok(Self::new(
            ConnectorSet::live(config)?,
            config.cache_ttl,
            config.connector_timeout,
        ))
    }

    /// Drop expired cached results.
    pub fn cleanup_cache(&self) -> usize {
        self.results.cleanup_expired()
    }

    /// Search every selected jurisdiction and wait for all of them.
    ///
    /// Outcomes come back in registry order whatever order the connectors
    /// finish in. An empty selection or a blank term yields a result with
    /// no outcomes.
    pub async fn search(&self, term: &str, selected: &[JurisdictionId]) -> SearchResult {
        let query = SearchQuery::parse(term);
        let ids = selection(&query, selected);
        let mut result = SearchResult::empty(query.raw());
        if ids.is_empty() {
            return result;
        }

        let started = Instant::now();
        let outcomes =
            futures::future::join_all(ids.iter().map(|&id| self.run(id, query.clone()))).await;

        result.searched_at = Utc::now();
        result.jurisdictions = ids;
        result.outcomes = outcomes;
        info!(
            term = %query,
            jurisdictions = result.jurisdictions.len(),
            records = result.total_records(),
            errors = result.errors().count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        result
    }

    /// Like [`Self::search`], but yields each outcome as soon as its
    /// connector finishes.
    pub fn search_each(
        &self,
        term: &str,
        selected: &[JurisdictionId],
    ) -> impl Stream<Item = JurisdictionOutcome> + '_ {
        let query = SearchQuery::parse(term);
        selection(&query, selected)
            .into_iter()
            .map(|id| self.run(id, query.clone()))
            .collect::<FuturesUnordered<_>>()
    }

    async fn run(&self, id: JurisdictionId, query: SearchQuery) -> JurisdictionOutcome {
        let started = Instant::now();
        let Some(connector) = self.connectors.get(id) else {
            warn!(jurisdiction = %id, "no connector configured");
            return JurisdictionOutcome::failed(id, ConnectorError::NotConfigured.to_string());
        };

        let key = (id, query.normalized());
        let deadline = self.connector_timeout;
        let lookup = self
            .results
            .get_or_try_fetch(key, || async move {
                // A panicking connector surfaces as a join error instead of
                // tearing down the whole search.
                let mut task = tokio::spawn(async move { connector.search(&query).await });
                let records = match tokio::time::timeout(deadline, &mut task).await {
                    Ok(joined) => joined??,
                    Err(_) => {
                        task.abort();
                        return Err(ConnectorError::Timeout(deadline));
                    }
                };
                Ok(Arc::new(records))
            })
            .await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match lookup {
            Ok(lookup) => {
                let records = lookup
                    .value
                    .iter()
                    .cloned()
                    .map(|mut r| {
                        r.jurisdiction = id;
                        r
                    })
                    .collect();
                let mut outcome = JurisdictionOutcome::from_records(id, records);
                outcome.from_cache = lookup.hit;
                outcome.elapsed_ms = elapsed_ms;
                info!(
                    jurisdiction = %id,
                    records = outcome.records.len(),
                    cached = lookup.hit,
                    elapsed_ms,
                    "jurisdiction searched"
                );
                outcome
            }
            Err(e) => {
                warn!(jurisdiction = %id, error = %e, elapsed_ms, "jurisdiction failed");
                let mut outcome = JurisdictionOutcome::failed(id, e.to_string());
                outcome.elapsed_ms = elapsed_ms;
                outcome
            }
        }
    }
}

/// Distinct selected ids in registry order. Nothing is searched for a blank
/// term.
fn selection(query: &SearchQuery, selected: &[JurisdictionId]) -> Vec<JurisdictionId> {
    if query.is_blank() {
        return Vec::new();
    }
    let mut ids = selected.to_vec();
    ids.sort();
    ids.dedup();
    ids
}
