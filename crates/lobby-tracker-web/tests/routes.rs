//! Router tests driven through `tower::ServiceExt::oneshot`.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use lobby_tracker::{
    Aggregator, Connector, ConnectorError, ConnectorResult, ConnectorSet, JurisdictionId, Record,
    SearchQuery,
};
use lobby_tracker_web::render::Pages;
use lobby_tracker_web::{router, AppState};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Listed {
    id: JurisdictionId,
    names: Vec<&'static str>,
}

#[async_trait]
impl Connector for Listed {
    fn jurisdiction(&self) -> JurisdictionId {
        self.id
    }

    async fn search(&self, query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        Ok(self
            .names
            .iter()
            .filter(|n| query.matches(n))
            .map(|n| Record::new(self.id, *n))
            .collect())
    }
}

struct Down;

#[async_trait]
impl Connector for Down {
    fn jurisdiction(&self) -> JurisdictionId {
        JurisdictionId::Germany
    }

    async fn search(&self, _query: &SearchQuery) -> ConnectorResult<Vec<Record>> {
        Err(ConnectorError::RateLimited {
            url: "https://www.lobbyregister.bundestag.de/sucheDetailJson".into(),
        })
    }
}

fn app() -> axum::Router {
    let connectors = ConnectorSet::new()
        .with(Arc::new(Listed {
            id: JurisdictionId::Eu,
            names: vec!["Shell plc", "Shell <Foundation>", "BP"],
        }))
        .with(Arc::new(Listed {
            id: JurisdictionId::Finland,
            names: vec!["Shell Oy"],
        }))
        .with(Arc::new(Down));
    let state = AppState {
        aggregator: Aggregator::new(connectors, Duration::from_secs(3600), Duration::from_secs(5)),
        defaults: vec![JurisdictionId::Eu, JurisdictionId::Finland],
        pages: Pages::new().unwrap(),
    };
    router(Arc::new(state))
}

async fn get(uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = app()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, headers, body.to_vec())
}

fn text(body: &[u8]) -> String {
    String::from_utf8_lossy(body).into_owned()
}

#[tokio::test]
async fn test_health() {
    let (status, _, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_index_ticks_defaults() {
    let (status, _, body) = get("/").await;
    assert_eq!(status, StatusCode::OK);
    let html = text(&body);
    assert!(html.contains(r#"value="eu" checked"#));
    assert!(html.contains(r#"value="finland" checked"#));
    assert!(html.contains(r#"value="uk""#));
    assert!(!html.contains(r#"value="uk" checked"#));
}

#[tokio::test]
async fn test_search_page_renders_each_jurisdiction() {
    let (status, _, body) = get("/search?q=shell&j=eu&j=germany").await;
    assert_eq!(status, StatusCode::OK);
    let html = text(&body);
    assert!(html.contains("Shell plc"));
    assert!(html.contains("Shell &lt;Foundation&gt;"));
    assert!(html.contains("rate limited by"));
    assert!(!html.contains("Shell Oy"));
    assert!(html.contains("Download Excel workbook"));
}

#[tokio::test]
async fn test_search_page_without_jurisdictions() {
    let (status, _, body) = get("/search?q=shell").await;
    assert_eq!(status, StatusCode::OK);
    let html = text(&body);
    assert!(html.contains("Select at least one jurisdiction."));
    assert!(!html.contains("Download Excel workbook"));
}

#[tokio::test]
async fn test_search_page_blank_term() {
    let (status, _, body) = get("/search?q=+++&j=eu").await;
    assert_eq!(status, StatusCode::OK);
    assert!(text(&body).contains("Enter an organisation name to search."));
}

#[tokio::test]
async fn test_unknown_jurisdiction_is_bad_request() {
    let (status, _, body) = get("/api/v1/search?q=shell&j=atlantis").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "unknown jurisdiction: atlantis");

    let (status, _, _) = get("/search?q=shell&j=atlantis").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_api_search_uses_defaults_without_j() {
    let (status, _, body) = get("/api/v1/search?q=Shell").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["jurisdictions"], serde_json::json!(["eu", "finland"]));
    assert_eq!(json["outcomes"][0]["status"]["state"], "ok");
    assert_eq!(json["outcomes"][0]["records"].as_array().unwrap().len(), 2);
    assert_eq!(json["outcomes"][1]["records"][0]["jurisdiction"], "finland");
}

#[tokio::test]
async fn test_api_search_requires_term() {
    let (status, _, _) = get("/api/v1/search?j=eu").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_jurisdictions_endpoint() {
    let (status, _, body) = get("/api/v1/jurisdictions").await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let list = json["jurisdictions"].as_array().unwrap();
    assert_eq!(list.len(), 9);
    assert_eq!(list[0]["id"], "eu");
    assert_eq!(list[0]["default_enabled"], true);
    assert_eq!(list[2]["default_enabled"], false);
}

#[tokio::test]
async fn test_export_downloads_workbook() {
    let (status, headers, body) = get("/export?q=Shell+plc&j=eu&j=germany").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"shell_plc_lobbying.xlsx\""
    );
    // XLSX is a zip archive.
    assert_eq!(&body[..2], b"PK");
}

#[tokio::test]
async fn test_export_requires_jurisdictions() {
    let (status, _, _) = get("/export?q=shell").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_stream_emits_outcomes_then_done() {
    let (status, headers, body) = get("/api/v1/search/stream?q=shell&j=eu&j=germany").await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));
    let body = text(&body);
    assert_eq!(body.matches("event: outcome").count(), 2);
    let done = body.find("event: done").unwrap();
    assert!(body.rfind("event: outcome").unwrap() < done);
    assert!(body.contains(r#""total_records":2"#));
}
