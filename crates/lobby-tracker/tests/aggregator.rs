//! Aggregator behaviour with in-process connectors.

use async_trait::async_trait;
use futures::StreamExt;
use lobby_tracker::{
    Aggregator, Connector, ConnectorError, ConnectorResult, ConnectorSet, JurisdictionId,
    JurisdictionStatus, Record, SearchQuery,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DAY: Duration = Duration::from_secs(86_400);

enum Behaviour {
    Records(Vec<&'static str>),
    Fail,
    Sleep(Duration),
    Panic,
}

struct FakeConnector {
    id: JurisdictionId,
    behaviour: Behaviour,
    calls: AtomicUsize,
}

impl FakeConnector {
    fn new(id: JurisdictionId, behaviour: Behaviour) -> Arc<Self> {
        Arc::new(Self {
            id,
            behaviour,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    fn jurisdiction(&self) -> JurisdictionId {
        self.id
    }

    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            Behaviour::Records(names) => Ok(names
                .iter()
                .filter(|n| query.matches(n))
                // Deliberately mislabelled: the aggregator must retag.
                .map(|n| Record::new(JurisdictionId::Slovenia, *n))
                .collect()),
            Behaviour::Fail => Err(ConnectorError::Status {
                url: "https://register.example/search".into(),
                status: 502,
            }),
            Behaviour::Sleep(d) => {
                tokio::time::sleep(*d).await;
                Ok(vec![Record::new(self.id, "Slow Ltd")])
            }
            Behaviour::Panic => panic!("parser blew up"),
        }
    }
}

fn aggregator(connectors: &[Arc<FakeConnector>], timeout: Duration) -> Aggregator {
    let set = connectors
        .iter()
        .fold(ConnectorSet::new(), |set, c| set.with(c.clone()));
    Aggregator::new(set, DAY, timeout)
}

#[tokio::test]
async fn test_records_tagged_and_outcomes_in_registry_order() {
    let fi = FakeConnector::new(JurisdictionId::Finland, Behaviour::Records(vec!["Shell Oy"]));
    let eu = FakeConnector::new(
        JurisdictionId::Eu,
        Behaviour::Records(vec!["Shell plc", "Shell Foundation", "BP"]),
    );
    let agg = aggregator(&[fi.clone(), eu.clone()], Duration::from_secs(5));

    let result = agg
        .search("shell", &[JurisdictionId::Finland, JurisdictionId::Eu])
        .await;
    assert_eq!(result.jurisdictions, vec![JurisdictionId::Eu, JurisdictionId::Finland]);
    assert_eq!(result.outcomes[0].jurisdiction, JurisdictionId::Eu);
    assert_eq!(result.outcomes[0].records.len(), 2);
    assert_eq!(result.total_records(), 3);
    assert!(result
        .outcome(JurisdictionId::Finland)
        .unwrap()
        .records
        .iter()
        .all(|r| r.jurisdiction == JurisdictionId::Finland));
    assert!(result.records().all(|r| r.jurisdiction != JurisdictionId::Slovenia));
}

#[tokio::test]
async fn test_no_matches_is_empty_not_error() {
    let eu = FakeConnector::new(JurisdictionId::Eu, Behaviour::Records(vec!["BP"]));
    let agg = aggregator(&[eu], Duration::from_secs(5));
    let result = agg.search("shell", &[JurisdictionId::Eu]).await;
    assert_eq!(result.outcomes[0].status, JurisdictionStatus::Empty);
    assert_eq!(result.errors().count(), 0);
}

#[tokio::test]
async fn test_phrase_and_boolean_queries_cached_separately() {
    let eu = FakeConnector::new(
        JurisdictionId::Eu,
        Behaviour::Records(vec!["Shell plc", "BP", "Shell or BP Joint Venture"]),
    );
    let agg = aggregator(&[eu.clone()], Duration::from_secs(5));

    let phrase = agg.search("shell or bp", &[JurisdictionId::Eu]).await;
    let names: Vec<_> = phrase.records().map(|r| r.entity_name.as_str()).collect();
    assert_eq!(names, vec!["Shell or BP Joint Venture"]);

    let boolean = agg.search("Shell OR BP", &[JurisdictionId::Eu]).await;
    assert!(!boolean.outcomes[0].from_cache);
    assert_eq!(boolean.total_records(), 3);
    assert_eq!(eu.calls(), 2);

    // Same Boolean query with different case and spacing is a cache hit.
    let again = agg.search("shell  OR  bp", &[JurisdictionId::Eu]).await;
    assert!(again.outcomes[0].from_cache);
    assert_eq!(eu.calls(), 2);
}

#[tokio::test]
async fn test_empty_selection_returns_empty_result() {
    let eu = FakeConnector::new(JurisdictionId::Eu, Behaviour::Records(vec!["Shell"]));
    let agg = aggregator(&[eu.clone()], Duration::from_secs(5));
    let result = agg.search("shell", &[]).await;
    assert!(result.outcomes.is_empty());
    assert!(result.jurisdictions.is_empty());
    assert_eq!(eu.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_within_ttl_and_refetch_after() {
    let eu = FakeConnector::new(JurisdictionId::Eu, Behaviour::Records(vec!["Shell plc"]));
    let agg = aggregator(&[eu.clone()], Duration::from_secs(5));

    let first = agg.search("Shell", &[JurisdictionId::Eu]).await;
    assert!(!first.outcomes[0].from_cache);

    // Same normalized term, exactly at the TTL boundary.
    tokio::time::advance(DAY).await;
    let second = agg.search("  shell ", &[JurisdictionId::Eu]).await;
    assert!(second.outcomes[0].from_cache);
    assert_eq!(second.outcomes[0].records, first.outcomes[0].records);
    assert_eq!(eu.calls(), 1);

    tokio::time::advance(Duration::from_secs(1)).await;
    let third = agg.search("shell", &[JurisdictionId::Eu]).await;
    assert!(!third.outcomes[0].from_cache);
    assert_eq!(eu.calls(), 2);
}

#[tokio::test]
async fn test_failure_is_isolated_and_not_cached() {
    let eu = FakeConnector::new(JurisdictionId::Eu, Behaviour::Records(vec!["Shell plc"]));
    let de = FakeConnector::new(JurisdictionId::Germany, Behaviour::Fail);
    let agg = aggregator(&[eu.clone(), de.clone()], Duration::from_secs(5));

    let result = agg
        .search("shell", &[JurisdictionId::Eu, JurisdictionId::Germany])
        .await;
    assert_eq!(result.outcomes[0].status, JurisdictionStatus::Ok);
    let errors: Vec<_> = result.errors().collect();
    assert_eq!(
        errors,
        vec![(JurisdictionId::Germany, "HTTP 502 from https://register.example/search")]
    );

    agg.search("shell", &[JurisdictionId::Eu, JurisdictionId::Germany])
        .await;
    assert_eq!(de.calls(), 2);
    assert_eq!(eu.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_slow_connector_times_out() {
    let slow = FakeConnector::new(JurisdictionId::Uk, Behaviour::Sleep(Duration::from_secs(600)));
    let fast = FakeConnector::new(JurisdictionId::Austria, Behaviour::Records(vec!["Shell Austria"]));
    let agg = aggregator(&[slow, fast], Duration::from_secs(120));

    let result = agg
        .search("shell", &[JurisdictionId::Uk, JurisdictionId::Austria])
        .await;
    let uk = result.outcome(JurisdictionId::Uk).unwrap();
    assert_eq!(
        uk.status,
        JurisdictionStatus::Error {
            reason: "timed out after 120s".into()
        }
    );
    assert_eq!(result.outcome(JurisdictionId::Austria).unwrap().records.len(), 1);
}

#[tokio::test]
async fn test_panicking_connector_becomes_error() {
    let broken = FakeConnector::new(JurisdictionId::Slovenia, Behaviour::Panic);
    let agg = aggregator(&[broken], Duration::from_secs(5));
    let result = agg.search("shell", &[JurisdictionId::Slovenia]).await;
    assert!(result.outcomes[0].status.is_error());
}

#[tokio::test(start_paused = true)]
async fn test_search_each_yields_in_completion_order() {
    let slow = FakeConnector::new(JurisdictionId::Eu, Behaviour::Sleep(Duration::from_secs(30)));
    let fast = FakeConnector::new(JurisdictionId::Slovenia, Behaviour::Records(vec!["Shell"]));
    let agg = aggregator(&[slow, fast], Duration::from_secs(120));

    let order: Vec<JurisdictionId> = agg
        .search_each("shell", &[JurisdictionId::Eu, JurisdictionId::Slovenia])
        .map(|o| o.jurisdiction)
        .collect()
        .await;
    assert_eq!(order, vec![JurisdictionId::Slovenia, JurisdictionId::Eu]);
}
