// libs/slot-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_database::AppState;
use shared_models::auth::Actor;
use shared_models::error::AppError;

use crate::models::{
    CreateSlotRequest, ExpandTemplateRequest, SlotError, SlotQueryParams, UpdateSlotRequest,
};
use crate::services::store::SlotStoreService;
use crate::services::template::TemplateExpansionService;

fn map_slot_error(e: SlotError) -> AppError {
    match e {
        SlotError::InvalidRange(msg) => AppError::BadRequest(msg),
        SlotError::Overlap => {
            AppError::Conflict("Slot overlaps an existing slot for this provider".to_string())
        }
        SlotError::NotFound => AppError::NotFound("Slot not found".to_string()),
        SlotError::ProviderNotFound => AppError::NotFound("Provider not found".to_string()),
        SlotError::Conflict => AppError::Conflict(
            "Slot is occupied by a live appointment; cancel the appointment first".to_string(),
        ),
        SlotError::Validation(msg) => AppError::ValidationError(msg),
        SlotError::Database(e) => AppError::Database(e.to_string()),
    }
}

#[axum::debug_handler]
pub async fn create_slot(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<CreateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    // Providers manage their own calendar; admins manage anyone's.
    if !actor.can_act_for_provider(request.provider_id) {
        return Err(AppError::Forbidden(
            "Not authorized to manage this provider's slots".to_string(),
        ));
    }

    let service = SlotStoreService::new(state.db.clone());
    let slot = service.create_slot(request).map_err(map_slot_error)?;

    Ok(Json(json!({
        "success": true,
        "slot": slot
    })))
}

#[axum::debug_handler]
pub async fn list_slots(
    State(state): State<Arc<AppState>>,
    Extension(_actor): Extension<Actor>,
    Query(params): Query<SlotQueryParams>,
) -> Result<Json<Value>, AppError> {
    let service = SlotStoreService::new(state.db.clone());
    let slots = service
        .list_slots(params.provider_id, params.date)
        .map_err(map_slot_error)?;

    Ok(Json(json!({
        "count": slots.len(),
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn update_slot(
    State(state): State<Arc<AppState>>,
    Path(slot_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<UpdateSlotRequest>,
) -> Result<Json<Value>, AppError> {
    let service = SlotStoreService::new(state.db.clone());

    let current = service.get_slot(slot_id).map_err(map_slot_error)?;
    if !actor.can_act_for_provider(current.provider_id) {
        return Err(AppError::Forbidden(
            "Not authorized to manage this provider's slots".to_string(),
        ));
    }

    let slot = service
        .update_slot(slot_id, request)
        .map_err(map_slot_error)?;

    Ok(Json(json!({
        "success": true,
        "slot": slot
    })))
}

#[axum::debug_handler]
pub async fn delete_slot(
    State(state): State<Arc<AppState>>,
    Path(slot_id): Path<Uuid>,
    Extension(actor): Extension<Actor>,
) -> Result<Json<Value>, AppError> {
    let service = SlotStoreService::new(state.db.clone());

    let current = service.get_slot(slot_id).map_err(map_slot_error)?;
    if !actor.can_act_for_provider(current.provider_id) {
        return Err(AppError::Forbidden(
            "Not authorized to manage this provider's slots".to_string(),
        ));
    }

    service.delete_slot(slot_id).map_err(map_slot_error)?;

    Ok(Json(json!({
        "success": true,
        "message": "Slot deleted"
    })))
}

#[axum::debug_handler]
pub async fn expand_template(
    State(state): State<Arc<AppState>>,
    Extension(actor): Extension<Actor>,
    Json(request): Json<ExpandTemplateRequest>,
) -> Result<Json<Value>, AppError> {
    if !actor.can_act_for_provider(request.provider_id) {
        return Err(AppError::Forbidden(
            "Not authorized to manage this provider's slots".to_string(),
        ));
    }

    let service = TemplateExpansionService::new(state.db.clone());
    let report = service.expand(request).map_err(map_slot_error)?;

    Ok(Json(json!({
        "success": true,
        "report": report
    })))
}
