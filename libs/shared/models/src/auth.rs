use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    pub role: Option<String>,
    pub exp: Option<u64>,
    pub iat: Option<u64>,
}

/// Authenticated identity attached to every request by the auth middleware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: ActorRole,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Patient,
    Provider,
    Admin,
}

impl ActorRole {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "patient" => Some(ActorRole::Patient),
            "provider" => Some(ActorRole::Provider),
            "admin" => Some(ActorRole::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActorRole::Patient => write!(f, "patient"),
            ActorRole::Provider => write!(f, "provider"),
            ActorRole::Admin => write!(f, "admin"),
        }
    }
}

impl Actor {
    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    /// True when the actor is this provider, or an admin acting on their behalf.
    pub fn can_act_for_provider(&self, provider_id: Uuid) -> bool {
        self.is_admin() || (self.role == ActorRole::Provider && self.id == provider_id)
    }

    pub fn can_act_for_patient(&self, patient_id: Uuid) -> bool {
        self.is_admin() || (self.role == ActorRole::Patient && self.id == patient_id)
    }
}
