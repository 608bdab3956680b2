//! ==============================================================================
//! server.rs - http transport over the query facade
//! ==============================================================================
//!
//! purpose:
//!     thin axum layer that turns requests into facade calls. every store
//!     query waits at most the arbiter budget and then degrades, so no
//!     request hangs on a busy store.
//!
//! routes:
//!     GET /          last recorded reading as text (or busy message)
//!     GET /last      last recorded reading as json (cache on timeout)
//!     GET /count     number of recorded readings as text
//!     GET /list      downsampled history as json (?tam=100&ini=<ms>&end=<ms>)
//!     GET /live      html page with the cached reading, refreshes every 30s
//!     GET /:id       recorded reading `id` as json (cache when unknown)
//!
//! relationships:
//!     - uses: facade.rs (QueryFacade)
//!     - started by: main.rs
//!
//! ==============================================================================

use crate::domain::Reading;
use crate::error::StoreError;
use crate::facade::QueryFacade;
use crate::store::{DEFAULT_RANGE_END_MS, DEFAULT_RANGE_LIMIT, DEFAULT_RANGE_START_MS};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use chrono::Local;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// store failures surface as 500 with the error text
#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("[HTTP] store error: {}", self.0);
        (StatusCode::INTERNAL_SERVER_ERROR, self.0.to_string()).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

pub fn router(facade: QueryFacade) -> Router {
    Router::new()
        .route("/", get(text_handler))
        .route("/last", get(last_handler))
        .route("/count", get(count_handler))
        .route("/list", get(list_handler))
        .route("/live", get(live_handler))
        .route("/:id", get(item_handler))
        .layer(CorsLayer::permissive())
        .with_state(facade)
}

pub async fn run_server(bind: &str, facade: QueryFacade) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("[HTTP] listening on http://{}", bind);
    axum::serve(listener, router(facade)).await?;
    Ok(())
}

async fn text_handler(State(facade): State<QueryFacade>) -> ApiResult<String> {
    Ok(facade.latest_text().await?)
}

async fn last_handler(State(facade): State<QueryFacade>) -> ApiResult<Json<Reading>> {
    Ok(Json(facade.latest_or_cached().await?))
}

async fn item_handler(
    State(facade): State<QueryFacade>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Reading>> {
    Ok(Json(facade.reading_or_cached(id).await?))
}

async fn count_handler(State(facade): State<QueryFacade>) -> ApiResult<String> {
    Ok(facade.count_or_busy().await?)
}

/// list query params, named as existing clients send them
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// maximum number of points
    tam: Option<usize>,
    /// window start, epoch ms
    ini: Option<i64>,
    /// window end, epoch ms
    end: Option<i64>,
}

async fn list_handler(
    State(facade): State<QueryFacade>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Vec<Reading>>> {
    let rows = facade
        .list_or_empty(
            params.tam.unwrap_or(DEFAULT_RANGE_LIMIT),
            params.ini.unwrap_or(DEFAULT_RANGE_START_MS),
            params.end.unwrap_or(DEFAULT_RANGE_END_MS),
        )
        .await?;
    Ok(Json(rows))
}

/// cache only, never touches the store
async fn live_handler(State(facade): State<QueryFacade>) -> Html<String> {
    Html(render_live(&facade.cache_read()))
}

fn render_live(reading: &Reading) -> String {
    let when = reading.timestamp.with_timezone(&Local).format("%a %b %d %H:%M:%S %Y").to_string();
    format!(
        r#"<!doctype html>
<html>
<head><title>HT Logger</title><meta http-equiv="refresh" content="30"></head>
<body style="font-family: system-ui; padding: 2rem;">
    <p><b>Embedded Server in Raspberry Pi</b></p>
    <p>Reading data from remote sensor...</p>
    <p>Temperature: {}ºC</p>
    <p>Relative Humidity: {}%</p>
    <p>Date: {}</p>
</body>
</html>"#,
        reading.temperature,
        reading.humidity,
        html_escape(&when)
    )
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
     .replace('<', "&lt;")
     .replace('>', "&gt;")
     .replace('"', "&quot;")
}
