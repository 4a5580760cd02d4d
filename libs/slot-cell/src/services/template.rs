// libs/slot-cell/src/services/template.rs
use std::sync::Arc;

use chrono::Datelike;
use tracing::{debug, info};

use shared_database::ClinicDb;

use crate::models::{
    CreateSlotRequest, ExpandTemplateRequest, ExpansionReport, SlotError,
};
use crate::services::store::SlotStoreService;

/// Upper bound on the expansion window, to prevent runaway generation.
pub const MAX_EXPANSION_DAYS: i64 = 90;

pub struct TemplateExpansionService {
    store: SlotStoreService,
}

impl TemplateExpansionService {
    pub fn new(db: Arc<ClinicDb>) -> Self {
        Self {
            store: SlotStoreService::new(db),
        }
    }

    /// Expand a weekly template over an inclusive date range into concrete
    /// slots. Each window is attempted independently: a collision on one day
    /// is reported in the result and never aborts the rest of the batch.
    pub fn expand(&self, request: ExpandTemplateRequest) -> Result<ExpansionReport, SlotError> {
        if request.to_date < request.from_date {
            return Err(SlotError::InvalidRange(
                "from_date must not be after to_date".to_string(),
            ));
        }

        let span_days = (request.to_date - request.from_date).num_days();
        if span_days > MAX_EXPANSION_DAYS {
            return Err(SlotError::InvalidRange(format!(
                "expansion window of {} days exceeds the {} day limit",
                span_days, MAX_EXPANSION_DAYS
            )));
        }

        if request.template.is_empty() {
            return Err(SlotError::Validation(
                "template has no entries for any weekday".to_string(),
            ));
        }

        debug!(
            "Expanding template for provider {} over {}..={}",
            request.provider_id, request.from_date, request.to_date
        );

        let mut created = Vec::new();
        let mut errors = Vec::new();

        for date in request
            .from_date
            .iter_days()
            .take_while(|d| *d <= request.to_date)
        {
            for entry in request.template.entries_for(date.weekday()) {
                let label = format!("{} {}", date, entry.start_time.format("%H:%M"));

                if entry.start_time >= entry.end_time {
                    errors.push(format!("{}: start time must be before end time", label));
                    continue;
                }

                let create = CreateSlotRequest {
                    provider_id: request.provider_id,
                    start_time: date.and_time(entry.start_time).and_utc(),
                    end_time: date.and_time(entry.end_time).and_utc(),
                    modality: entry.modality,
                    status: None,
                };

                match self.store.create_slot(create) {
                    Ok(slot) => created.push(slot),
                    // Storage failures mean unknown outcome; abort the batch.
                    Err(SlotError::Database(e)) => return Err(SlotError::Database(e)),
                    Err(e) => errors.push(format!("{}: {}", label, e)),
                }
            }
        }

        info!(
            "Template expansion for provider {}: {} created, {} errors",
            request.provider_id,
            created.len(),
            errors.len()
        );

        Ok(ExpansionReport {
            created_count: created.len(),
            created,
            errors,
        })
    }
}
