// libs/slot-cell/src/models.rs
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use shared_database::DatabaseError;

// ==============================================================================
// CORE SLOT MODELS
// ==============================================================================

/// A bookable time window owned by a provider. The [start_time, end_time)
/// interval is half-open, so back-to-back slots are legal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slot {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub modality: Modality,
    pub status: SlotStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Available,
    Blocked,
    Occupied,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Available => "available",
            SlotStatus::Blocked => "blocked",
            SlotStatus::Occupied => "occupied",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "available" => Ok(SlotStatus::Available),
            "blocked" => Ok(SlotStatus::Blocked),
            "occupied" => Ok(SlotStatus::Occupied),
            other => Err(DatabaseError::InvalidValue {
                field: "slot.status".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    InPerson,
    Teleconsult,
}

impl Modality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::InPerson => "in_person",
            Modality::Teleconsult => "teleconsult",
        }
    }

    pub fn parse(value: &str) -> Result<Self, DatabaseError> {
        match value {
            "in_person" => Ok(Modality::InPerson),
            "teleconsult" => Ok(Modality::Teleconsult),
            other => Err(DatabaseError::InvalidValue {
                field: "slot.modality".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateSlotRequest {
    pub provider_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub modality: Modality,
    /// Available when omitted. Occupied is never accepted here: only the
    /// booking coordinator moves a slot to occupied.
    pub status: Option<SlotStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateSlotRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub modality: Option<Modality>,
    pub status: Option<SlotStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SlotQueryParams {
    pub provider_id: Uuid,
    pub date: Option<NaiveDate>,
}

// ==============================================================================
// TEMPLATE EXPANSION MODELS
// ==============================================================================

/// One recurring window inside a weekday's template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub modality: Modality,
}

/// Weekday -> windows mapping. Absent days mean no slots that day.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeeklyTemplate {
    #[serde(default)]
    pub mon: Vec<TemplateEntry>,
    #[serde(default)]
    pub tue: Vec<TemplateEntry>,
    #[serde(default)]
    pub wed: Vec<TemplateEntry>,
    #[serde(default)]
    pub thu: Vec<TemplateEntry>,
    #[serde(default)]
    pub fri: Vec<TemplateEntry>,
    #[serde(default)]
    pub sat: Vec<TemplateEntry>,
    #[serde(default)]
    pub sun: Vec<TemplateEntry>,
}

impl WeeklyTemplate {
    pub fn entries_for(&self, weekday: Weekday) -> &[TemplateEntry] {
        match weekday {
            Weekday::Mon => &self.mon,
            Weekday::Tue => &self.tue,
            Weekday::Wed => &self.wed,
            Weekday::Thu => &self.thu,
            Weekday::Fri => &self.fri,
            Weekday::Sat => &self.sat,
            Weekday::Sun => &self.sun,
        }
    }

    pub fn is_empty(&self) -> bool {
        [
            &self.mon, &self.tue, &self.wed, &self.thu, &self.fri, &self.sat, &self.sun,
        ]
        .iter()
        .all(|day| day.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandTemplateRequest {
    pub provider_id: Uuid,
    pub from_date: NaiveDate,
    /// Inclusive end of the range.
    pub to_date: NaiveDate,
    pub template: WeeklyTemplate,
}

/// Outcome of a bulk expansion. Per-entry failures are reported here rather
/// than aborting the batch: generating against a partially pre-populated
/// calendar is the common case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionReport {
    pub created_count: usize,
    pub created: Vec<Slot>,
    pub errors: Vec<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SlotError {
    #[error("Invalid time range: {0}")]
    InvalidRange(String),

    #[error("Slot overlaps an existing slot for this provider")]
    Overlap,

    #[error("Slot not found")]
    NotFound,

    #[error("Provider not found")]
    ProviderNotFound,

    #[error("Slot is occupied by a live appointment")]
    Conflict,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Database(#[from] DatabaseError),
}
