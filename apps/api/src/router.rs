use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use directory_cell::router::{patient_routes, provider_routes};
use encounter_cell::router::encounter_routes;
use shared_database::AppState;
use slot_cell::router::slot_routes;

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic API is running!" }))
        .nest("/providers", provider_routes(state.clone()))
        .nest("/patients", patient_routes(state.clone()))
        .nest("/slots", slot_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/visits", encounter_routes(state.clone()))
}
