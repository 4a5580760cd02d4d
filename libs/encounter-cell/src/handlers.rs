// libs/encounter-cell/src/handlers.rs
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

use crate::models::{CompleteVisitRequest, EncounterError};
use crate::services::encounter::EncounterService;
use crate::services::history::HistoryService;

fn map_encounter_error(e: EncounterError) -> AppError {
    match e {
        EncounterError::AppointmentNotFound => {
            AppError::NotFound("Appointment not found".to_string())
        }
        EncounterError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        EncounterError::IllegalTransition { from } => {
            AppError::BadRequest(format!("Cannot complete a visit from status {}", from))
        }
        EncounterError::Forbidden => {
            AppError::Forbidden("Not authorized to record this encounter".to_string())
        }
        EncounterError::Validation(msg) => AppError::ValidationError(msg),
        EncounterError::Database(e) => AppError::Database(e.to_string()),
    }
}

#[axum::debug_handler]
pub async fn complete_visit(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CompleteVisitRequest>,
) -> Result<Json<Value>, AppError> {
    let service = EncounterService::new(state.db.clone());
    let outcome = service
        .complete_visit(appointment_id, &actor, request)
        .map_err(map_encounter_error)?;

    Ok(Json(json!({
        "success": true,
        "outcome": outcome
    })))
}

#[axum::debug_handler]
pub async fn appointment_detail(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Value>, AppError> {
    let service = HistoryService::new(state.db.clone());
    let detail = service
        .appointment_detail(appointment_id)
        .map_err(map_encounter_error)?;

    if !actor.can_act_for_patient(detail.appointment.patient_id)
        && !actor.can_act_for_provider(detail.appointment.provider_id)
    {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!({ "detail": detail })))
}

#[axum::debug_handler]
pub async fn patient_history(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Value>, AppError> {
    // Clinical staff see any chart; patients only their own.
    if !actor.can_act_for_patient(patient_id) && actor.role != ActorRole::Provider {
        return Err(AppError::Forbidden(
            "Not authorized to view this patient's history".to_string(),
        ));
    }

    let service = HistoryService::new(state.db.clone());
    let history = service
        .patient_history(patient_id)
        .map_err(map_encounter_error)?;

    Ok(Json(json!({ "history": history })))
}
