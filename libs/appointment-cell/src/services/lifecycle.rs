// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use shared_database::ClinicDb;
use shared_models::auth::Actor;
use slot_cell::models::SlotStatus;
use slot_cell::services::store::set_slot_status;

use crate::models::{Appointment, AppointmentError, AppointmentStatus};
use crate::services::booking::{find_appointment, set_appointment_status};

pub struct AppointmentLifecycleService {
    db: Arc<ClinicDb>,
}

impl AppointmentLifecycleService {
    pub fn new(db: Arc<ClinicDb>) -> Self {
        Self { db }
    }

    /// The single authoritative transition table. Terminal states have no
    /// exits; everything not listed here is illegal.
    pub fn valid_transitions(from: AppointmentStatus) -> &'static [AppointmentStatus] {
        match from {
            AppointmentStatus::Pending => &[
                AppointmentStatus::Confirmed,
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => &[
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InProgress => &[
                AppointmentStatus::Attended,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Attended
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    pub fn validate_status_transition(
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if Self::valid_transitions(from).contains(&to) {
            Ok(())
        } else {
            Err(AppointmentError::IllegalTransition { from, to })
        }
    }

    /// Apply a status transition. Only the assigned provider or an admin may
    /// drive the lifecycle; a transition to cancelled also releases the slot
    /// in the same transaction.
    pub fn transition(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
        actor: &Actor,
    ) -> Result<Appointment, AppointmentError> {
        self.db.transaction(|tx| {
            let appointment =
                find_appointment(tx, appointment_id)?.ok_or(AppointmentError::NotFound)?;

            if !actor.can_act_for_provider(appointment.provider_id) {
                return Err(AppointmentError::Forbidden);
            }

            Self::validate_status_transition(appointment.status, target)?;

            set_appointment_status(tx, appointment_id, target)?;
            if target == AppointmentStatus::Cancelled {
                set_slot_status(tx, appointment.slot_id, SlotStatus::Available)?;
            }

            info!(
                "Appointment {} moved {} -> {}",
                appointment_id, appointment.status, target
            );
            Ok(Appointment {
                status: target,
                updated_at: chrono::Utc::now(),
                ..appointment
            })
        })
    }
}
