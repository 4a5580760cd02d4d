// libs/directory-cell/src/services/directory.rs
use std::sync::Arc;

use chrono::Utc;
use rusqlite::params;
use tracing::info;
use uuid::Uuid;

use shared_database::{decode_ts, encode_ts, ClinicDb, DatabaseError};

use crate::models::{
    CreatePatientRequest, CreateProviderRequest, DirectoryError, Patient, Provider,
};

pub struct DirectoryService {
    db: Arc<ClinicDb>,
}

impl DirectoryService {
    pub fn new(db: Arc<ClinicDb>) -> Self {
        Self { db }
    }

    pub fn create_provider(
        &self,
        request: CreateProviderRequest,
    ) -> Result<Provider, DirectoryError> {
        if request.full_name.trim().is_empty() {
            return Err(DirectoryError::Validation(
                "full_name must not be empty".to_string(),
            ));
        }

        let provider = Provider {
            id: Uuid::new_v4(),
            full_name: request.full_name,
            specialty: request.specialty,
            created_at: Utc::now(),
        };

        self.db.transaction(|tx| {
            tx.execute(
                "INSERT INTO providers (id, full_name, specialty, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![
                    provider.id.to_string(),
                    provider.full_name,
                    provider.specialty,
                    encode_ts(provider.created_at),
                ],
            )
            .map_err(DatabaseError::from)?;
            Ok::<_, DirectoryError>(())
        })?;

        info!("Provider {} registered", provider.id);
        Ok(provider)
    }

    pub fn get_provider(&self, provider_id: Uuid) -> Result<Provider, DirectoryError> {
        self.db.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, full_name, specialty, created_at FROM providers WHERE id = ?1")
                .map_err(DatabaseError::from)?;
            let row = stmt.query_row(params![provider_id.to_string()], |row| {
                Ok((
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            });
            match row {
                Ok((full_name, specialty, created_at)) => Ok(Provider {
                    id: provider_id,
                    full_name,
                    specialty,
                    created_at: decode_ts(&created_at)?,
                }),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(DirectoryError::NotFound),
                Err(e) => Err(DatabaseError::from(e).into()),
            }
        })
    }

    pub fn create_patient(
        &self,
        request: CreatePatientRequest,
    ) -> Result<Patient, DirectoryError> {
        if request.full_name.trim().is_empty() {
            return Err(DirectoryError::Validation(
                "full_name must not be empty".to_string(),
            ));
        }

        let patient = Patient {
            id: Uuid::new_v4(),
            full_name: request.full_name,
            created_at: Utc::now(),
        };

        self.db.transaction(|tx| {
            tx.execute(
                "INSERT INTO patients (id, full_name, created_at) VALUES (?1, ?2, ?3)",
                params![
                    patient.id.to_string(),
                    patient.full_name,
                    encode_ts(patient.created_at),
                ],
            )
            .map_err(DatabaseError::from)?;
            Ok::<_, DirectoryError>(())
        })?;

        info!("Patient {} registered", patient.id);
        Ok(patient)
    }

    pub fn get_patient(&self, patient_id: Uuid) -> Result<Patient, DirectoryError> {
        self.db.read(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, full_name, created_at FROM patients WHERE id = ?1")
                .map_err(DatabaseError::from)?;
            let row = stmt.query_row(params![patient_id.to_string()], |row| {
                Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?))
            });
            match row {
                Ok((full_name, created_at)) => Ok(Patient {
                    id: patient_id,
                    full_name,
                    created_at: decode_ts(&created_at)?,
                }),
                Err(rusqlite::Error::QueryReturnedNoRows) => Err(DirectoryError::NotFound),
                Err(e) => Err(DatabaseError::from(e).into()),
            }
        })
    }
}
