use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::{AppState, ClinicDb};
use shared_models::auth::{Actor, ActorRole};

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-jwt-validation-must-be-long-enough";

/// Build an AppState backed by a fresh in-memory database.
pub fn test_state() -> Arc<AppState> {
    let config = AppConfig {
        database_path: ":memory:".to_string(),
        jwt_secret: TEST_JWT_SECRET.to_string(),
        bind_port: 0,
    };
    let db = Arc::new(ClinicDb::open_in_memory().expect("in-memory database"));
    Arc::new(AppState { config, db })
}

pub struct TestActor {
    pub id: Uuid,
    pub role: ActorRole,
}

impl TestActor {
    pub fn patient() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ActorRole::Patient,
        }
    }

    pub fn provider() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ActorRole::Provider,
        }
    }

    pub fn admin() -> Self {
        Self {
            id: Uuid::new_v4(),
            role: ActorRole::Admin,
        }
    }

    pub fn with_id(id: Uuid, role: ActorRole) -> Self {
        Self { id, role }
    }

    pub fn to_actor(&self) -> Actor {
        Actor {
            id: self.id,
            role: self.role,
        }
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(actor: &TestActor, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": actor.id.to_string(),
            "role": actor.role.to_string(),
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(actor: &TestActor, secret: &str) -> String {
        Self::create_test_token(actor, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(actor: &TestActor) -> String {
        Self::create_test_token(actor, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "invalid.token.format".to_string()
    }
}
