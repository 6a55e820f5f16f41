mod health;
mod requests;

use axum::Router;
use health::health_router;
use requests::requests_router;

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(health_router())
        .merge(requests_router())
        .with_state(state)
}
