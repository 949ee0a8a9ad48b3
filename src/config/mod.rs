use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub environment: Environment,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub token_path: String,
    pub refresh_path: String,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub log_http_bodies: bool,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    /// Development defaults pointed at an explicit backend, used by tests
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let mut config = Self::development();
        config.api.base_url = base_url.into();
        config
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = env::var("JURIS_API_URL") {
            self.api.base_url = v;
        }
        if let Ok(v) = env::var("JURIS_TOKEN_PATH") {
            self.api.token_path = v;
        }
        if let Ok(v) = env::var("JURIS_REFRESH_PATH") {
            self.api.refresh_path = v;
        }
        if let Ok(v) = env::var("JURIS_REQUEST_TIMEOUT_SECS") {
            self.api.request_timeout_secs = v.parse().unwrap_or(self.api.request_timeout_secs);
        }
        if let Ok(v) = env::var("JURIS_CONNECT_TIMEOUT_SECS") {
            self.api.connect_timeout_secs = v.parse().unwrap_or(self.api.connect_timeout_secs);
        }
        if let Ok(v) = env::var("JURIS_LOG_HTTP_BODIES") {
            self.logging.log_http_bodies = v.parse().unwrap_or(self.logging.log_http_bodies);
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            api: ApiConfig {
                base_url: "http://localhost:8000".to_string(),
                token_path: "/token".to_string(),
                refresh_path: "/refresh".to_string(),
                request_timeout_secs: 120, // agent answers can be slow locally
                connect_timeout_secs: 5,
            },
            logging: LoggingConfig {
                log_http_bodies: true,
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            api: ApiConfig {
                base_url: "https://staging-api.jurisconsultor.app".to_string(),
                token_path: "/token".to_string(),
                refresh_path: "/refresh".to_string(),
                request_timeout_secs: 60,
                connect_timeout_secs: 5,
            },
            logging: LoggingConfig {
                log_http_bodies: false,
            },
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            api: ApiConfig {
                base_url: "https://api.jurisconsultor.app".to_string(),
                token_path: "/token".to_string(),
                refresh_path: "/refresh".to_string(),
                request_timeout_secs: 30,
                connect_timeout_secs: 3,
            },
            logging: LoggingConfig {
                log_http_bodies: false,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<ClientConfig> = Lazy::new(ClientConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static ClientConfig {
    &CONFIG
}
