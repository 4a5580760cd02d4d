// libs/directory-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::AppState;
use shared_models::auth::{Actor, ActorRole};
use shared_models::error::AppError;

use crate::models::{CreatePatientRequest, CreateProviderRequest, DirectoryError};
use crate::services::directory::DirectoryService;

fn map_directory_error(e: DirectoryError) -> AppError {
    match e {
        DirectoryError::NotFound => AppError::NotFound("Record not found".to_string()),
        DirectoryError::Validation(msg) => AppError::ValidationError(msg),
        DirectoryError::Database(e) => AppError::Database(e.to_string()),
    }
}

#[axum::debug_handler]
pub async fn create_provider(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateProviderRequest>,
) -> Result<Json<Value>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "Only admins may register providers".to_string(),
        ));
    }

    let service = DirectoryService::new(state.db.clone());
    let provider = service
        .create_provider(request)
        .map_err(map_directory_error)?;

    Ok(Json(json!({
        "success": true,
        "provider": provider
    })))
}

#[axum::debug_handler]
pub async fn get_provider(
    State(state): State<Arc<AppState>>,
    Path(provider_id): Path<Uuid>,
    Extension(_actor): Extension<Actor>,
) -> Result<Json<Value>, AppError> {
    let service = DirectoryService::new(state.db.clone());
    let provider = service
        .get_provider(provider_id)
        .map_err(map_directory_error)?;

    Ok(Json(json!({ "provider": provider })))
}

#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreatePatientRequest>,
) -> Result<Json<Value>, AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden(
            "Only admins may register patients".to_string(),
        ));
    }

    let service = DirectoryService::new(state.db.clone());
    let patient = service
        .create_patient(request)
        .map_err(map_directory_error)?;

    Ok(Json(json!({
        "success": true,
        "patient": patient
    })))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Value>, AppError> {
    // Patients see themselves; clinical staff may look up any patient.
    if !actor.can_act_for_patient(patient_id) && actor.role != ActorRole::Provider {
        return Err(AppError::Forbidden(
            "Not authorized to view this patient".to_string(),
        ));
    }

    let service = DirectoryService::new(state.db.clone());
    let patient = service
        .get_patient(patient_id)
        .map_err(map_directory_error)?;

    Ok(Json(json!({ "patient": patient })))
}
