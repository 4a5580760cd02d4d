// libs/encounter-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus};
use shared_database::DatabaseError;

// ==============================================================================
// CLINICAL RECORD MODELS
// ==============================================================================

// Clinical records are append-only; none of these carry an updated_at.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnosis {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub code: Option<String>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicalNote {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Uuid,
    pub appointment_id: Uuid,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub lines: Vec<MedicationLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationLine {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub medication: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosisPayload {
    pub code: Option<String>,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotePayload {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicationLinePayload {
    pub medication: String,
    pub dose: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrescriptionPayload {
    pub notes: Option<String>,
    pub lines: Vec<MedicationLinePayload>,
}

/// Any combination of the three sections may be submitted, including none;
/// a bare request just closes the visit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteVisitRequest {
    pub diagnosis: Option<DiagnosisPayload>,
    pub note: Option<NotePayload>,
    pub prescription: Option<PrescriptionPayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompleteVisitOutcome {
    pub appointment: Appointment,
    /// True when the visit was already completed and this call wrote nothing.
    pub already_applied: bool,
    pub diagnosis: Option<Diagnosis>,
    pub note: Option<ClinicalNote>,
    pub prescription: Option<Prescription>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AppointmentDetail {
    pub appointment: Appointment,
    pub diagnoses: Vec<Diagnosis>,
    pub notes: Vec<ClinicalNote>,
    pub prescriptions: Vec<Prescription>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientHistory {
    pub patient_id: Uuid,
    pub visits: Vec<AppointmentDetail>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EncounterError {
    #[error("Appointment not found")]
    AppointmentNotFound,

    #[error("Patient not found")]
    PatientNotFound,

    #[error("Cannot complete a visit from status {from}")]
    IllegalTransition { from: AppointmentStatus },

    #[error("Not authorized to record this encounter")]
    Forbidden,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),
}
