//! HTTP server: search form, result pages, workbook download and JSON API.
//!
//! Every route reads the same [`AppState`]; searches go through the shared
//! [`Aggregator`], so the HTML pages, the JSON API and the event stream all
//! benefit from the same result cache.

use crate::error::{WebError, WebResult};
use crate::render::{PageView, Pages};
use axum::extract::{RawQuery, State};
use axum::http::header;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::StreamExt;
use lobby_tracker::registry::{self, JurisdictionId};
use lobby_tracker::{export_filename, write_workbook, Aggregator};
use serde_json::Value;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

/// Interval between sweeps of expired cache entries.
const CACHE_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Shared state behind every route.
pub struct AppState {
    pub aggregator: Aggregator,
    /// Jurisdictions ticked on a fresh form.
    pub defaults: Vec<JurisdictionId>,
    pub pages: Pages,
}

/// Build the axum Router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(index))
        .route("/search", get(search_page))
        .route("/export", get(export))
        .route("/health", get(health))
        .route("/api/v1/jurisdictions", get(list_jurisdictions))
        .route("/api/v1/search", get(search_json))
        .route("/api/v1/search/stream", get(search_stream))
        .layer(cors)
        .with_state(state)
}

/// Serve until the process is stopped.
pub async fn serve(host: &str, port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let sweeper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(CACHE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = sweeper.aggregator.cleanup_cache();
            if removed > 0 {
                tracing::debug!(removed, "expired search results dropped");
            }
        }
    });

    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    tracing::info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ── Helpers ──

/// Search parameters from a query string: `q` once, `j` repeated.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SearchParams {
    pub term: String,
    pub jurisdictions: Vec<JurisdictionId>,
    /// True when the query string carried at least one `j`.
    pub selected_any: bool,
}

impl SearchParams {
    pub fn parse(raw: Option<&str>) -> WebResult<Self> {
        let mut term = String::new();
        let mut ids = Vec::new();
        for (key, value) in url::form_urlencoded::parse(raw.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "q" => term = value.trim().to_string(),
                "j" => ids.push(value.into_owned()),
                _ => {}
            }
        }
        let selected_any = !ids.is_empty();
        Ok(Self {
            term,
            jurisdictions: registry::parse_ids(ids)?,
            selected_any,
        })
    }

    /// Selected ids, or `fallback` when none were given.
    fn ids_or(&self, fallback: &[JurisdictionId]) -> Vec<JurisdictionId> {
        if self.selected_any {
            self.jurisdictions.clone()
        } else {
            fallback.to_vec()
        }
    }
}

fn render(state: &AppState, view: &PageView) -> WebResult<Html<String>> {
    Ok(Html(state.pages.render(view)?))
}

// ── Handlers ──

async fn index(State(state): State<Arc<AppState>>) -> WebResult<Html<String>> {
    render(&state, &PageView::form("", &state.defaults))
}

async fn search_page(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> WebResult<Html<String>> {
    let params = SearchParams::parse(raw.as_deref())?;
    if params.term.is_empty() {
        let ticked = params.ids_or(&state.defaults);
        return render(
            &state,
            &PageView::form("", &ticked).with_message("Enter an organisation name to search."),
        );
    }
    if params.jurisdictions.is_empty() {
        return render(
            &state,
            &PageView::form(&params.term, &[]).with_message("Select at least one jurisdiction."),
        );
    }

    let result = state
        .aggregator
        .search(&params.term, &params.jurisdictions)
        .await;
    render(
        &state,
        &PageView::form(&params.term, &params.jurisdictions).with_result(&result),
    )
}

async fn export(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> WebResult<Response> {
    let params = SearchParams::parse(raw.as_deref())?;
    if params.term.is_empty() {
        return Err(WebError::BadRequest("missing search term".into()));
    }
    if params.jurisdictions.is_empty() {
        return Err(WebError::BadRequest("select at least one jurisdiction".into()));
    }

    let result = state
        .aggregator
        .search(&params.term, &params.jurisdictions)
        .await;
    let bytes = write_workbook(&result)?;
    let disposition = format!("attachment; filename=\"{}\"", export_filename(&result.term));
    Ok((
        [
            (
                header::CONTENT_TYPE,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet".to_string(),
            ),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_jurisdictions(State(state): State<Arc<AppState>>) -> Json<Value> {
    let list: Vec<Value> = registry::all()
        .iter()
        .map(|j| {
            serde_json::json!({
                "id": j.id,
                "name": j.name,
                "flag": j.flag,
                "has_financial_data": j.has_financial_data,
                "note": j.note,
                "coverage": j.coverage,
                "default_enabled": state.defaults.contains(&j.id),
            })
        })
        .collect();
    Json(serde_json::json!({ "jurisdictions": list }))
}

/// JSON search. Without `j`, the configured defaults are searched.
async fn search_json(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> WebResult<Response> {
    let params = SearchParams::parse(raw.as_deref())?;
    if params.term.is_empty() {
        return Err(WebError::BadRequest("missing search term".into()));
    }
    let ids = params.ids_or(&state.defaults);
    let result = state.aggregator.search(&params.term, &ids).await;
    Ok(Json(result).into_response())
}

/// Server-Sent Events: one `outcome` event per jurisdiction as it finishes,
/// then a `done` event.
async fn search_stream(
    State(state): State<Arc<AppState>>,
    RawQuery(raw): RawQuery,
) -> WebResult<Sse<impl futures::Stream<Item = Result<Event, Infallible>>>> {
    let params = SearchParams::parse(raw.as_deref())?;
    if params.term.is_empty() {
        return Err(WebError::BadRequest("missing search term".into()));
    }
    let ids = params.ids_or(&state.defaults);
    let term = params.term;

    let stream = async_stream::stream! {
        let outcomes = state.aggregator.search_each(&term, &ids);
        futures::pin_mut!(outcomes);
        let mut total = 0;
        while let Some(outcome) = outcomes.next().await {
            total += outcome.records.len();
            if let Ok(json) = serde_json::to_string(&outcome) {
                yield Ok(Event::default().event("outcome").data(json));
            }
        }
        let done = serde_json::json!({ "term": term, "total_records": total });
        yield Ok(Event::default().event("done").data(done.to_string()));
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_params_repeated_j() {
        let p = SearchParams::parse(Some("q=Shell+plc&j=germany&j=eu&x=1")).unwrap();
        assert_eq!(p.term, "Shell plc");
        assert_eq!(p.jurisdictions, vec![JurisdictionId::Germany, JurisdictionId::Eu]);
        assert!(p.selected_any);
    }

    #[test]
    fn test_search_params_empty() {
        let p = SearchParams::parse(None).unwrap();
        assert_eq!(p, SearchParams::default());
        assert_eq!(p.ids_or(&[JurisdictionId::Eu]), vec![JurisdictionId::Eu]);
    }

    #[test]
    fn test_search_params_unknown_id() {
        let err = SearchParams::parse(Some("q=x&j=narnia")).unwrap_err();
        assert!(matches!(err, WebError::UnknownJurisdiction(_)));
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
