// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::AppState;
use shared_models::auth::{Actor, ActorRole};
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentSearchQuery, BookSlotRequest, CancelAppointmentRequest,
    TransitionRequest,
};
use crate::services::booking::BookingService;
use crate::services::lifecycle::AppointmentLifecycleService;

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::PatientNotFound => AppError::NotFound("Patient not found".to_string()),
        AppointmentError::SlotNotFound => AppError::NotFound("Slot not found".to_string()),
        AppointmentError::SlotUnavailable => {
            AppError::Conflict("Slot is not available for booking".to_string())
        }
        AppointmentError::AlreadyCancelled => {
            AppError::Conflict("Appointment is already cancelled".to_string())
        }
        AppointmentError::IllegalTransition { from, to } => {
            AppError::BadRequest(format!("Illegal status transition: {} -> {}", from, to))
        }
        AppointmentError::Forbidden => {
            AppError::Forbidden("Not authorized to act on this appointment".to_string())
        }
        AppointmentError::Database(e) => AppError::Database(e.to_string()),
    }
}

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<BookSlotRequest>,
) -> Result<Json<Value>, AppError> {
    // Patients book for themselves; providers and admins may book on a
    // patient's behalf.
    if !actor.can_act_for_patient(request.patient_id) && actor.role != ActorRole::Provider {
        return Err(AppError::Forbidden(
            "Not authorized to book for this patient".to_string(),
        ));
    }

    let service = BookingService::new(state.db.clone());
    let appointment = service.book_slot(request).map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(state.db.clone());
    let appointment = service
        .cancel_appointment(appointment_id, &actor, request.reason)
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn transition_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentLifecycleService::new(state.db.clone());
    let appointment = service
        .transition(appointment_id, request.target_status, &actor)
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Value>, AppError> {
    let service = BookingService::new(state.db.clone());
    let appointment = service
        .get_appointment(appointment_id)
        .map_err(map_appointment_error)?;

    if !actor.can_act_for_patient(appointment.patient_id)
        && !actor.can_act_for_provider(appointment.provider_id)
    {
        return Err(AppError::Forbidden(
            "Not authorized to view this appointment".to_string(),
        ));
    }

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn search_appointments(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    // Non-admins may only search their own appointments.
    let allowed = match actor.role {
        ActorRole::Admin => true,
        ActorRole::Patient => query.patient_id == Some(actor.id),
        ActorRole::Provider => query.provider_id == Some(actor.id),
    };
    if !allowed {
        return Err(AppError::Forbidden(
            "Search must be scoped to your own appointments".to_string(),
        ));
    }

    let service = BookingService::new(state.db.clone());
    let appointments = service
        .search_appointments(&query)
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "count": appointments.len(),
        "appointments": appointments
    })))
}
