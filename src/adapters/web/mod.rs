//! Read-only web view of the trade ledger.
//!
//! Serves the recorded trades and the ledger expectancy as an HTML page.

mod error;
mod handlers;
mod templates;

pub use error::WebError;
pub use handlers::*;
pub use templates::*;

use axum::{Router, routing::get};
use std::sync::Arc;

use crate::ports::ledger_port::LedgerPort;

pub struct AppState {
    pub ledger: Arc<dyn LedgerPort + Send + Sync>,
    pub instrument: String,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::trades_page))
        .route("/health", get(handlers::health))
        .fallback(handlers::not_found)
        .with_state(Arc::new(state))
}
