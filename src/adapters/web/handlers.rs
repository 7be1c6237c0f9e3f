//! HTTP request handlers.

use askama::Template;
use axum::{
    extract::State,
    response::{Html, IntoResponse},
};
use std::sync::Arc;

use super::AppState;
use super::error::WebError;
use super::templates::TradesTemplate;

pub async fn trades_page(State(state): State<Arc<AppState>>) -> Result<Html<String>, WebError> {
    let records = state.ledger.list_trades()?;
    let template = TradesTemplate::new(&state.instrument, &records);
    let html = template
        .render()
        .map_err(|e| WebError::internal(format!("template error: {}", e)))?;
    Ok(Html(html))
}

pub async fn health() -> &'static str {
    "ok"
}

pub async fn not_found() -> impl IntoResponse {
    WebError::not_found("page not found")
}
