// libs/slot-cell/src/services/store.rs
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{decode_ts, encode_ts, ClinicDb, DatabaseError};

use crate::models::{
    CreateSlotRequest, Modality, Slot, SlotError, SlotStatus, UpdateSlotRequest,
};

pub struct SlotStoreService {
    db: Arc<ClinicDb>,
}

impl SlotStoreService {
    pub fn new(db: Arc<ClinicDb>) -> Self {
        Self { db }
    }

    /// Create a slot, rejecting bad bounds and any collision with an existing
    /// slot for the same provider. The overlap re-check runs inside the write
    /// transaction, so two concurrent overlapping creates cannot both commit.
    pub fn create_slot(&self, request: CreateSlotRequest) -> Result<Slot, SlotError> {
        let status = request.status.unwrap_or(SlotStatus::Available);
        if status == SlotStatus::Occupied {
            return Err(SlotError::Validation(
                "a slot cannot be created as occupied; occupied is set by booking".to_string(),
            ));
        }

        validate_range(request.start_time, request.end_time)?;
        if request.start_time < Utc::now() {
            return Err(SlotError::InvalidRange(
                "start time is in the past".to_string(),
            ));
        }

        self.db.transaction(|tx| {
            if !provider_exists(tx, request.provider_id)? {
                return Err(SlotError::ProviderNotFound);
            }

            // A blocked window still occupies the provider's calendar, so the
            // collision test covers every status, not just bookable slots.
            if has_overlap(tx, request.provider_id, request.start_time, request.end_time, None)? {
                warn!(
                    "Slot overlap for provider {} at {}",
                    request.provider_id, request.start_time
                );
                return Err(SlotError::Overlap);
            }

            let now = Utc::now();
            let slot = Slot {
                id: Uuid::new_v4(),
                provider_id: request.provider_id,
                start_time: request.start_time,
                end_time: request.end_time,
                modality: request.modality,
                status,
                created_at: now,
                updated_at: now,
            };

            tx.execute(
                "INSERT INTO slots (id, provider_id, start_time, end_time, modality, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    slot.id.to_string(),
                    slot.provider_id.to_string(),
                    encode_ts(slot.start_time),
                    encode_ts(slot.end_time),
                    slot.modality.as_str(),
                    slot.status.as_str(),
                    encode_ts(slot.created_at),
                    encode_ts(slot.updated_at),
                ],
            )
            .map_err(DatabaseError::from)?;

            info!("Slot {} created for provider {}", slot.id, slot.provider_id);
            Ok(slot)
        })
    }

    /// Partial update. A slot backing a live appointment cannot be edited:
    /// cancel the appointment first.
    pub fn update_slot(&self, slot_id: Uuid, request: UpdateSlotRequest) -> Result<Slot, SlotError> {
        self.db.transaction(|tx| {
            let current = find_slot(tx, slot_id)?.ok_or(SlotError::NotFound)?;

            if current.status == SlotStatus::Occupied {
                return Err(SlotError::Conflict);
            }

            if let Some(status) = request.status {
                if status == SlotStatus::Occupied {
                    return Err(SlotError::Validation(
                        "occupied is set by booking, not by slot edits".to_string(),
                    ));
                }
            }

            let start_time = request.start_time.unwrap_or(current.start_time);
            let end_time = request.end_time.unwrap_or(current.end_time);
            validate_range(start_time, end_time)?;

            let times_moved = start_time != current.start_time || end_time != current.end_time;
            if times_moved
                && has_overlap(tx, current.provider_id, start_time, end_time, Some(slot_id))?
            {
                return Err(SlotError::Overlap);
            }

            let updated = Slot {
                start_time,
                end_time,
                modality: request.modality.unwrap_or(current.modality),
                status: request.status.unwrap_or(current.status),
                updated_at: Utc::now(),
                ..current
            };

            tx.execute(
                "UPDATE slots SET start_time = ?2, end_time = ?3, modality = ?4, status = ?5, updated_at = ?6
                 WHERE id = ?1",
                params![
                    slot_id.to_string(),
                    encode_ts(updated.start_time),
                    encode_ts(updated.end_time),
                    updated.modality.as_str(),
                    updated.status.as_str(),
                    encode_ts(updated.updated_at),
                ],
            )
            .map_err(DatabaseError::from)?;

            debug!("Slot {} updated", slot_id);
            Ok(updated)
        })
    }

    pub fn delete_slot(&self, slot_id: Uuid) -> Result<(), SlotError> {
        self.db.transaction(|tx| {
            let current = find_slot(tx, slot_id)?.ok_or(SlotError::NotFound)?;

            if current.status == SlotStatus::Occupied {
                return Err(SlotError::Conflict);
            }

            tx.execute(
                "DELETE FROM slots WHERE id = ?1",
                params![slot_id.to_string()],
            )
            .map_err(DatabaseError::from)?;

            info!("Slot {} deleted", slot_id);
            Ok(())
        })
    }

    pub fn get_slot(&self, slot_id: Uuid) -> Result<Slot, SlotError> {
        self.db
            .read(|conn| find_slot(conn, slot_id).map_err(SlotError::from))?
            .ok_or(SlotError::NotFound)
    }

    /// List a provider's slots, optionally restricted to one calendar date,
    /// ordered by start time.
    pub fn list_slots(
        &self,
        provider_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, SlotError> {
        self.db.read(|conn| {
            let mut sql = String::from(
                "SELECT id, provider_id, start_time, end_time, modality, status, created_at, updated_at
                 FROM slots WHERE provider_id = ?1",
            );
            let mut bind: Vec<String> = vec![provider_id.to_string()];

            if let Some(date) = date {
                let day_start = date.and_hms_opt(0, 0, 0).unwrap().and_utc();
                let day_end = day_start + chrono::Duration::days(1);
                sql.push_str(" AND start_time >= ?2 AND start_time < ?3");
                bind.push(encode_ts(day_start));
                bind.push(encode_ts(day_end));
            }
            sql.push_str(" ORDER BY start_time ASC");

            let mut stmt = conn.prepare(&sql).map_err(DatabaseError::from)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(bind.iter()), read_slot_row)
                .map_err(DatabaseError::from)?;

            let mut slots = Vec::new();
            for row in rows {
                slots.push(slot_from_row(row.map_err(DatabaseError::from)?)?);
            }
            Ok(slots)
        })
    }
}

fn validate_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), SlotError> {
    if start >= end {
        return Err(SlotError::InvalidRange(
            "start time must be before end time".to_string(),
        ));
    }
    Ok(())
}

pub fn provider_exists(conn: &Connection, provider_id: Uuid) -> Result<bool, DatabaseError> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM providers WHERE id = ?1)",
        params![provider_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists)
}

/// Half-open interval intersection test against every slot of the provider.
fn has_overlap(
    conn: &Connection,
    provider_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude: Option<Uuid>,
) -> Result<bool, DatabaseError> {
    let exclude = exclude.map(|id| id.to_string()).unwrap_or_default();
    let clash: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM slots
             WHERE provider_id = ?1 AND start_time < ?3 AND end_time > ?2 AND id != ?4)",
        params![provider_id.to_string(), encode_ts(start), encode_ts(end), exclude],
        |row| row.get(0),
    )?;
    Ok(clash)
}

struct SlotRow {
    id: String,
    provider_id: String,
    start_time: String,
    end_time: String,
    modality: String,
    status: String,
    created_at: String,
    updated_at: String,
}

fn read_slot_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SlotRow> {
    Ok(SlotRow {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        start_time: row.get(2)?,
        end_time: row.get(3)?,
        modality: row.get(4)?,
        status: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

fn slot_from_row(row: SlotRow) -> Result<Slot, DatabaseError> {
    Ok(Slot {
        id: parse_uuid("slot.id", &row.id)?,
        provider_id: parse_uuid("slot.provider_id", &row.provider_id)?,
        start_time: decode_ts(&row.start_time)?,
        end_time: decode_ts(&row.end_time)?,
        modality: Modality::parse(&row.modality)?,
        status: SlotStatus::parse(&row.status)?,
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

/// Look up a slot inside the caller's transaction. Shared with the booking
/// coordinator, which re-checks slot status under its own write transaction.
pub fn find_slot(conn: &Connection, slot_id: Uuid) -> Result<Option<Slot>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, provider_id, start_time, end_time, modality, status, created_at, updated_at
         FROM slots WHERE id = ?1",
    )?;

    match stmt.query_row(params![slot_id.to_string()], read_slot_row) {
        Ok(row) => Ok(Some(slot_from_row(row)?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Flip a slot's status inside the caller's transaction.
pub fn set_slot_status(
    conn: &Connection,
    slot_id: Uuid,
    status: SlotStatus,
) -> Result<(), DatabaseError> {
    conn.execute(
        "UPDATE slots SET status = ?2, updated_at = ?3 WHERE id = ?1",
        params![slot_id.to_string(), status.as_str(), encode_ts(Utc::now())],
    )?;
    Ok(())
}
