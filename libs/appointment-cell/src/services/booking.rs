// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{info, warn};
use uuid::Uuid;

use shared_database::{decode_ts, encode_ts, ClinicDb, DatabaseError};
use shared_models::auth::Actor;
use slot_cell::models::SlotStatus;
use slot_cell::services::store::{find_slot, set_slot_status};

use crate::models::{
    Appointment, AppointmentError, AppointmentSearchQuery, AppointmentStatus, BookSlotRequest,
};

pub struct BookingService {
    db: Arc<ClinicDb>,
}

impl BookingService {
    pub fn new(db: Arc<ClinicDb>) -> Self {
        Self { db }
    }

    /// Book a slot for a patient. The slot status is re-read and flipped to
    /// occupied inside one write transaction, so out of any number of
    /// concurrent attempts exactly one commits; the rest see the slot as no
    /// longer available.
    pub fn book_slot(&self, request: BookSlotRequest) -> Result<Appointment, AppointmentError> {
        self.db.transaction(|tx| {
            if !patient_exists(tx, request.patient_id)? {
                return Err(AppointmentError::PatientNotFound);
            }

            let slot =
                find_slot(tx, request.slot_id)?.ok_or(AppointmentError::SlotNotFound)?;

            if slot.status != SlotStatus::Available {
                warn!(
                    "Booking rejected: slot {} is {}",
                    slot.id, slot.status
                );
                return Err(AppointmentError::SlotUnavailable);
            }

            let status = if request.confirm {
                AppointmentStatus::Confirmed
            } else {
                AppointmentStatus::Pending
            };

            let now = Utc::now();
            let appointment = Appointment {
                id: Uuid::new_v4(),
                patient_id: request.patient_id,
                provider_id: slot.provider_id,
                slot_id: slot.id,
                start_time: slot.start_time,
                end_time: slot.end_time,
                status,
                reason: request.reason,
                notes: None,
                created_at: now,
                updated_at: now,
            };

            tx.execute(
                "INSERT INTO appointments (id, patient_id, provider_id, slot_id, start_time, end_time, status, reason, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    appointment.id.to_string(),
                    appointment.patient_id.to_string(),
                    appointment.provider_id.to_string(),
                    appointment.slot_id.to_string(),
                    encode_ts(appointment.start_time),
                    encode_ts(appointment.end_time),
                    appointment.status.as_str(),
                    appointment.reason,
                    appointment.notes,
                    encode_ts(appointment.created_at),
                    encode_ts(appointment.updated_at),
                ],
            )
            .map_err(DatabaseError::from)?;

            set_slot_status(tx, slot.id, SlotStatus::Occupied)?;

            info!(
                "Appointment {} booked for patient {} with provider {} ({})",
                appointment.id, appointment.patient_id, appointment.provider_id, appointment.status
            );
            Ok(appointment)
        })
    }

    /// Cancel an appointment and release its slot in the same transaction.
    /// Permitted to the patient, the assigned provider, or an admin.
    pub fn cancel_appointment(
        &self,
        appointment_id: Uuid,
        actor: &Actor,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        self.db.transaction(|tx| {
            let appointment =
                find_appointment(tx, appointment_id)?.ok_or(AppointmentError::NotFound)?;

            if appointment.status == AppointmentStatus::Cancelled {
                return Err(AppointmentError::AlreadyCancelled);
            }
            if appointment.status.is_terminal() {
                return Err(AppointmentError::IllegalTransition {
                    from: appointment.status,
                    to: AppointmentStatus::Cancelled,
                });
            }

            if !actor.can_act_for_patient(appointment.patient_id)
                && !actor.can_act_for_provider(appointment.provider_id)
            {
                return Err(AppointmentError::Forbidden);
            }

            let now = Utc::now();
            let notes = reason
                .as_ref()
                .map(|r| format!("Cancelled by {}: {}", actor.role, r));

            tx.execute(
                "UPDATE appointments SET status = ?2, notes = COALESCE(?3, notes), updated_at = ?4
                 WHERE id = ?1",
                params![
                    appointment_id.to_string(),
                    AppointmentStatus::Cancelled.as_str(),
                    notes,
                    encode_ts(now),
                ],
            )
            .map_err(DatabaseError::from)?;

            set_slot_status(tx, appointment.slot_id, SlotStatus::Available)?;

            info!(
                "Appointment {} cancelled by {} {}",
                appointment_id, actor.role, actor.id
            );
            Ok(Appointment {
                status: AppointmentStatus::Cancelled,
                notes: notes.or(appointment.notes),
                updated_at: now,
                ..appointment
            })
        })
    }

    pub fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.db
            .read(|conn| find_appointment(conn, appointment_id).map_err(AppointmentError::from))?
            .ok_or(AppointmentError::NotFound)
    }

    /// Filtered search ordered by start time, most recent first.
    pub fn search_appointments(
        &self,
        query: &AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        self.db
            .read(|conn| search_appointments(conn, query).map_err(AppointmentError::from))
    }
}

/// Connection-level search, shared with the patient history read side.
pub fn search_appointments(
    conn: &Connection,
    query: &AppointmentSearchQuery,
) -> Result<Vec<Appointment>, DatabaseError> {
    let mut sql = String::from(
        "SELECT id, patient_id, provider_id, slot_id, start_time, end_time, status, reason, notes, created_at, updated_at
         FROM appointments WHERE 1 = 1",
    );
    let mut bind: Vec<String> = Vec::new();

    if let Some(patient_id) = query.patient_id {
        bind.push(patient_id.to_string());
        sql.push_str(&format!(" AND patient_id = ?{}", bind.len()));
    }
    if let Some(provider_id) = query.provider_id {
        bind.push(provider_id.to_string());
        sql.push_str(&format!(" AND provider_id = ?{}", bind.len()));
    }
    if let Some(status) = query.status {
        bind.push(status.as_str().to_string());
        sql.push_str(&format!(" AND status = ?{}", bind.len()));
    }
    if let Some(from_date) = query.from_date {
        bind.push(encode_ts(from_date.and_hms_opt(0, 0, 0).unwrap().and_utc()));
        sql.push_str(&format!(" AND start_time >= ?{}", bind.len()));
    }
    if let Some(to_date) = query.to_date {
        let day_end = to_date.and_hms_opt(0, 0, 0).unwrap().and_utc() + chrono::Duration::days(1);
        bind.push(encode_ts(day_end));
        sql.push_str(&format!(" AND start_time < ?{}", bind.len()));
    }
    sql.push_str(" ORDER BY start_time DESC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(bind.iter()), read_appointment_row)?;

    let mut appointments = Vec::new();
    for row in rows {
        appointments.push(appointment_from_row(row?)?);
    }
    Ok(appointments)
}

pub fn patient_exists(conn: &Connection, patient_id: Uuid) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM patients WHERE id = ?1)",
        params![patient_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

struct AppointmentRow {
    id: String,
    patient_id: String,
    provider_id: String,
    slot_id: String,
    start_time: String,
    end_time: String,
    status: String,
    reason: Option<String>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn read_appointment_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AppointmentRow> {
    Ok(AppointmentRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        provider_id: row.get(2)?,
        slot_id: row.get(3)?,
        start_time: row.get(4)?,
        end_time: row.get(5)?,
        status: row.get(6)?,
        reason: row.get(7)?,
        notes: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn appointment_from_row(row: AppointmentRow) -> Result<Appointment, DatabaseError> {
    Ok(Appointment {
        id: parse_uuid("appointment.id", &row.id)?,
        patient_id: parse_uuid("appointment.patient_id", &row.patient_id)?,
        provider_id: parse_uuid("appointment.provider_id", &row.provider_id)?,
        slot_id: parse_uuid("appointment.slot_id", &row.slot_id)?,
        start_time: decode_ts(&row.start_time)?,
        end_time: decode_ts(&row.end_time)?,
        status: AppointmentStatus::parse(&row.status)?,
        reason: row.reason,
        notes: row.notes,
        created_at: decode_ts(&row.created_at)?,
        updated_at: decode_ts(&row.updated_at)?,
    })
}

fn parse_uuid(field: &str, value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|_| DatabaseError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    })
}

/// Look up an appointment inside the caller's transaction. Shared with the
/// lifecycle service and the encounter writer.
pub fn find_appointment(
    conn: &Connection,
    appointment_id: Uuid,
) -> Result<Option<Appointment>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, patient_id, provider_id, slot_id, start_time, end_time, status, reason, notes, created_at, updated_at
         FROM appointments WHERE id = ?1",
    )?;

    match stmt.query_row(params![appointment_id.to_string()], read_appointment_row) {
        Ok(row) => Ok(Some(appointment_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Apply a status inside the caller's transaction. Callers validate the
/// transition first.
pub fn set_appointment_status(
    conn: &Connection,
    appointment_id: Uuid,
    status: AppointmentStatus,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE appointments SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![
            appointment_id.to_string(),
            status.as_str(),
            encode_ts(Utc::now())
        ],
    )?;
    Ok(())
}
