// libs/encounter-cell/src/services/encounter.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::info;
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentStatus};
use appointment_cell::services::booking::{find_appointment, set_appointment_status};
use shared_database::{encode_ts, ClinicDb, DatabaseError};
use shared_models::auth::Actor;

use crate::models::{
    ClinicalNote, CompleteVisitOutcome, CompleteVisitRequest, Diagnosis, DiagnosisPayload,
    EncounterError, MedicationLine, NotePayload, Prescription, PrescriptionPayload,
};

pub struct EncounterService {
    db: Arc<ClinicDb>,
}

impl EncounterService {
    pub fn new(db: Arc<ClinicDb>) -> Self {
        Self { db }
    }

    /// Close a visit, persisting whatever clinical sections were submitted
    /// and moving the appointment to attended, all in one transaction.
    ///
    /// Re-submitting against an already attended appointment is a no-op that
    /// reports `already_applied`, so a client that times out and retries
    /// cannot duplicate clinical records.
    pub fn complete_visit(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
        request: CompleteVisitRequest,
    ) -> Result<CompleteVisitOutcome, EncounterError> {
        // Every section is validated before any write; the first offending
        // field fails the whole submission.
        validate_request(&request)?;

        self.db.transaction(|tx| {
            let appointment = find_appointment(tx, appointment_id)?
                .ok_or(EncounterError::AppointmentNotFound)?;

            if !actor.can_act_for_provider(appointment.provider_id) {
                return Err(EncounterError::Forbidden);
            }

            match appointment.status {
                AppointmentStatus::Attended => {
                    info!(
                        "Visit {} already completed; skipping re-submit",
                        appointment_id
                    );
                    Ok(CompleteVisitOutcome {
                        appointment,
                        already_applied: true,
                        diagnosis: None,
                        note: None,
                        prescription: None,
                    })
                }
                AppointmentStatus::InProgress => {
                    let now = Utc::now();
                    let diagnosis = request
                        .diagnosis
                        .map(|p| insert_diagnosis(tx, appointment_id, p, now))
                        .transpose()?;
                    let note = request
                        .note
                        .map(|p| insert_note(tx, appointment_id, p, now))
                        .transpose()?;
                    let prescription = request
                        .prescription
                        .map(|p| insert_prescription(tx, appointment_id, p, now))
                        .transpose()?;

                    set_appointment_status(tx, appointment_id, AppointmentStatus::Attended)?;

                    info!(
                        "Visit {} completed by {} (diagnosis: {}, note: {}, prescription: {})",
                        appointment_id,
                        actor.id,
                        diagnosis.is_some(),
                        note.is_some(),
                        prescription.is_some()
                    );
                    Ok(CompleteVisitOutcome {
                        appointment: Appointment {
                            status: AppointmentStatus::Attended,
                            updated_at: now,
                            ..appointment
                        },
                        already_applied: false,
                        diagnosis,
                        note,
                        prescription,
                    })
                }
                other => Err(EncounterError::IllegalTransition { from: other }),
            }
        })
    }
}

fn validate_request(request: &CompleteVisitRequest) -> Result<(), EncounterError> {
    if let Some(diagnosis) = &request.diagnosis {
        if diagnosis.description.trim().is_empty() {
            return Err(EncounterError::Validation(
                "diagnosis.description must not be empty".to_string(),
            ));
        }
    }
    if let Some(note) = &request.note {
        if note.content.trim().is_empty() {
            return Err(EncounterError::Validation(
                "note.content must not be empty".to_string(),
            ));
        }
    }
    if let Some(prescription) = &request.prescription {
        if prescription.lines.is_empty() {
            return Err(EncounterError::Validation(
                "prescription.lines must contain at least one medication line".to_string(),
            ));
        }
        for (i, line) in prescription.lines.iter().enumerate() {
            if line.medication.trim().is_empty() {
                return Err(EncounterError::Validation(format!(
                    "prescription.lines[{i}].medication must not be empty"
                )));
            }
        }
    }
    Ok(())
}

fn insert_diagnosis(
    conn: &Connection,
    appointment_id: Uuid,
    payload: DiagnosisPayload,
    now: DateTime<Utc>,
) -> Result<Diagnosis, DatabaseError> {
    let diagnosis = Diagnosis {
        id: Uuid::new_v4(),
        appointment_id,
        code: payload.code,
        description: payload.description,
        created_at: now,
    };
    conn.execute(
        "INSERT INTO diagnoses (id, appointment_id, code, description, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            diagnosis.id.to_string(),
            diagnosis.appointment_id.to_string(),
            diagnosis.code,
            diagnosis.description,
            encode_ts(diagnosis.created_at),
        ],
    )?;
    Ok(diagnosis)
}

fn insert_note(
    conn: &Connection,
    appointment_id: Uuid,
    payload: NotePayload,
    now: DateTime<Utc>,
) -> Result<ClinicalNote, DatabaseError> {
    let note = ClinicalNote {
        id: Uuid::new_v4(),
        appointment_id,
        content: payload.content,
        created_at: now,
    };
    conn.execute(
        "INSERT INTO clinical_notes (id, appointment_id, content, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            note.id.to_string(),
            note.appointment_id.to_string(),
            note.content,
            encode_ts(note.created_at),
        ],
    )?;
    Ok(note)
}

fn insert_prescription(
    conn: &Connection,
    appointment_id: Uuid,
    payload: PrescriptionPayload,
    now: DateTime<Utc>,
) -> Result<Prescription, DatabaseError> {
    let prescription_id = Uuid::new_v4();
    conn.execute(
        "INSERT INTO prescriptions (id, appointment_id, notes, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            prescription_id.to_string(),
            appointment_id.to_string(),
            payload.notes,
            encode_ts(now),
        ],
    )?;

    let mut lines = Vec::with_capacity(payload.lines.len());
    for line in payload.lines {
        let stored = MedicationLine {
            id: Uuid::new_v4(),
            prescription_id,
            medication: line.medication,
            dose: line.dose,
            frequency: line.frequency,
            duration: line.duration,
            instructions: line.instructions,
        };
        conn.execute(
            "INSERT INTO medication_lines (id, prescription_id, medication, dose, frequency, duration, instructions)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                stored.id.to_string(),
                stored.prescription_id.to_string(),
                stored.medication,
                stored.dose,
                stored.frequency,
                stored.duration,
                stored.instructions,
            ],
        )?;
        lines.push(stored);
    }

    Ok(Prescription {
        id: prescription_id,
        appointment_id,
        notes: payload.notes,
        created_at: now,
        lines,
    })
}
