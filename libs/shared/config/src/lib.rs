use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub jwt_secret: String,
    pub bind_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            database_path: env::var("CLINIC_DATABASE_PATH")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_DATABASE_PATH not set, using ./clinic.db");
                    "./clinic.db".to_string()
                }),
            jwt_secret: env::var("CLINIC_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            bind_port: env::var("CLINIC_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty() && !self.database_path.is_empty()
    }
}
