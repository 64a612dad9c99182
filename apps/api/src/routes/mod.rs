pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::matching::handlers as matching;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // ── Matching API ───────────────────────────────────────────────────
        // Note: specific routes before the :matching_id param route (Axum priority)
        .route("/matching/search-jobs", post(matching::handle_search_jobs))
        .route(
            "/matching/sentence-matches/:matching_id",
            get(matching::handle_sentence_matches),
        )
        .route("/matching/compare/:job_id", get(matching::handle_compare))
        .route("/matching/:matching_id", get(matching::handle_matching_detail))
        .route(
            "/matching/:matching_id/feedback",
            get(matching::handle_matching_feedback),
        )
        .with_state(state)
}
