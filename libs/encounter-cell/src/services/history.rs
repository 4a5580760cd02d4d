// libs/encounter-cell/src/services/history.rs
use std::sync::Arc;

use rusqlite::{params, Connection};
use uuid::Uuid;

use appointment_cell::models::{Appointment, AppointmentSearchQuery, AppointmentStatus};
use appointment_cell::services::booking::{find_appointment, patient_exists, search_appointments};
use shared_database::{decode_ts, ClinicDb, DatabaseError};

use crate::models::{
    AppointmentDetail, ClinicalNote, Diagnosis, EncounterError, MedicationLine, PatientHistory,
    Prescription,
};

pub struct HistoryService {
    db: Arc<ClinicDb>,
}

impl HistoryService {
    pub fn new(db: Arc<ClinicDb>) -> Self {
        Self { db }
    }

    /// One appointment with everything recorded against it. Notes come back
    /// oldest first, following the order they were written.
    pub fn appointment_detail(
        &self,
        appointment_id: Uuid,
    ) -> Result<AppointmentDetail, EncounterError> {
        self.db.read(|conn| {
            let appointment = find_appointment(conn, appointment_id)?
                .ok_or(EncounterError::AppointmentNotFound)?;
            detail_for(conn, appointment).map_err(EncounterError::from)
        })
    }

    /// A patient's completed visits, most recent first, each with its
    /// clinical records.
    pub fn patient_history(&self, patient_id: Uuid) -> Result<PatientHistory, EncounterError> {
        self.db.read(|conn| {
            if !patient_exists(conn, patient_id)? {
                return Err(EncounterError::PatientNotFound);
            }

            // Most recent visit first, courtesy of the search ordering.
            let attended = search_appointments(
                conn,
                &AppointmentSearchQuery {
                    patient_id: Some(patient_id),
                    status: Some(AppointmentStatus::Attended),
                    ..Default::default()
                },
            )?;

            let mut visits = Vec::with_capacity(attended.len());
            for appointment in attended {
                visits.push(detail_for(conn, appointment)?);
            }
            Ok(PatientHistory { patient_id, visits })
        })
    }
}

fn detail_for(
    conn: &Connection,
    appointment: Appointment,
) -> Result<AppointmentDetail, DatabaseError> {
    let diagnoses = diagnoses_for(conn, appointment.id)?;
    let notes = notes_for(conn, appointment.id)?;
    let prescriptions = prescriptions_for(conn, appointment.id)?;
    Ok(AppointmentDetail {
        appointment,
        diagnoses,
        notes,
        prescriptions,
    })
}

fn diagnoses_for(conn: &Connection, appointment_id: Uuid) -> Result<Vec<Diagnosis>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, code, description, created_at
         FROM diagnoses WHERE appointment_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![appointment_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    })?;

    let mut diagnoses = Vec::new();
    for row in rows {
        let (id, appointment_id, code, description, created_at) = row?;
        diagnoses.push(Diagnosis {
            id: parse_uuid("diagnosis.id", &id)?,
            appointment_id: parse_uuid("diagnosis.appointment_id", &appointment_id)?,
            code,
            description,
            created_at: decode_ts(&created_at)?,
        });
    }
    Ok(diagnoses)
}

fn notes_for(conn: &Connection, appointment_id: Uuid) -> Result<Vec<ClinicalNote>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, content, created_at
         FROM clinical_notes WHERE appointment_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![appointment_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut notes = Vec::new();
    for row in rows {
        let (id, appointment_id, content, created_at) = row?;
        notes.push(ClinicalNote {
            id: parse_uuid("clinical_note.id", &id)?,
            appointment_id: parse_uuid("clinical_note.appointment_id", &appointment_id)?,
            content,
            created_at: decode_ts(&created_at)?,
        });
    }
    Ok(notes)
}

fn prescriptions_for(
    conn: &Connection,
    appointment_id: Uuid,
) -> Result<Vec<Prescription>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, appointment_id, notes, created_at
         FROM prescriptions WHERE appointment_id = ?1 ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map(params![appointment_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
        ))
    })?;

    let mut prescriptions = Vec::new();
    for row in rows {
        let (id, appointment_id, notes, created_at) = row?;
        let prescription_id = parse_uuid("prescription.id", &id)?;
        prescriptions.push(Prescription {
            id: prescription_id,
            appointment_id: parse_uuid("prescription.appointment_id", &appointment_id)?,
            notes,
            created_at: decode_ts(&created_at)?,
            lines: lines_for(conn, prescription_id)?,
        });
    }
    Ok(prescriptions)
}

fn lines_for(conn: &Connection, prescription_id: Uuid) -> Result<Vec<MedicationLine>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, prescription_id, medication, dose, frequency, duration, instructions
         FROM medication_lines WHERE prescription_id = ?1 ORDER BY rowid ASC",
    )?;
    let rows = stmt.query_map(params![prescription_id.to_string()], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Option<String>>(3)?,
            row.get::<_, Option<String>>(4)?,
            row.get::<_, Option<String>>(5)?,
            row.get::<_, Option<String>>(6)?,
        ))
    })?;

    let mut lines = Vec::new();
    for row in rows {
        let (id, prescription_id, medication, dose, frequency, duration, instructions) = row?;
        lines.push(MedicationLine {
            id: parse_uuid("medication_line.id", &id)?,
            prescription_id: parse_uuid("medication_line.prescription_id", &prescription_id)?,
            medication,
            dose,
            frequency,
            duration,
            instructions,
        });
    }
    Ok(lines)
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| DatabaseError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}
