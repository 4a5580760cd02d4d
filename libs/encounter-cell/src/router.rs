// libs/encounter-cell/src/router.rs
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use shared_database::AppState;
use shared_utils::extractor::auth_middleware;

use crate::handlers;

pub fn encounter_routes(state: Arc<AppState>) -> Router {
    let protected_routes = Router::new()
        .route(
            "/{appointment_id}/complete-visit",
            post(handlers::complete_visit),
        )
        .route("/{appointment_id}", get(handlers::appointment_detail))
        .route("/history/{patient_id}", get(handlers::patient_history))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(protected_routes)
        .with_state(state)
}
