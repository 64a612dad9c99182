use std::sync::Arc;

use crate::matching::service::Matcher;

/// Shared application state injected into all route handlers via Axum
/// extractors. The matcher owns the pool, embedding client, and config.
#[derive(Clone)]
pub struct AppState {
    pub matcher: Arc<Matcher>,
}
