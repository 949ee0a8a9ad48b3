// Client error taxonomy
use serde_json::{json, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors surfaced by the request client, the resource fetchers and the
/// optimistic controller
#[derive(Debug, Error)]
pub enum ClientError {
    // 401 with no way to recover the session
    #[error("Session expired: {0}")]
    AuthExpired(String),

    // 401 from the token endpoint
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    // Connection failure, timeout or 5xx
    #[error("Transient error: {message}")]
    Transient {
        status: Option<u16>,
        message: String,
    },

    // 4xx other than 401, with the server-provided detail
    #[error("Request rejected ({status}): {detail}")]
    Validation {
        status: u16,
        detail: String,
    },

    #[error("Rollback failed for '{target}': {reason}")]
    RollbackFailure {
        target: String,
        reason: String,
    },

    #[error("Entity '{0}' is not in the current view")]
    UnknownEntity(String),

    #[error("Unexpected response body: {0}")]
    Decode(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// HTTP status behind the error, if there was one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ClientError::AuthExpired(_) => Some(401),
            ClientError::InvalidCredentials(_) => Some(401),
            ClientError::Transient { status, .. } => *status,
            ClientError::Validation { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Get error code for CLI and JSON output
    pub fn error_code(&self) -> &'static str {
        match self {
            ClientError::AuthExpired(_) => "AUTH_EXPIRED",
            ClientError::InvalidCredentials(_) => "INVALID_CREDENTIALS",
            ClientError::Transient { .. } => "TRANSIENT_NETWORK_ERROR",
            ClientError::Validation { .. } => "VALIDATION_ERROR",
            ClientError::RollbackFailure { .. } => "ROLLBACK_FAILURE",
            ClientError::UnknownEntity(_) => "UNKNOWN_ENTITY",
            ClientError::Decode(_) => "DECODE_ERROR",
            ClientError::Storage(_) => "STORAGE_ERROR",
            ClientError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// True when the caller has to log in again
    pub fn requires_login(&self) -> bool {
        matches!(self, ClientError::AuthExpired(_) | ClientError::InvalidCredentials(_))
    }

    /// Message to show next to the triggering control: the server detail when
    /// one was given, otherwise a generic text
    pub fn user_message(&self) -> String {
        match self {
            ClientError::AuthExpired(_) => "Your session has expired, please log in again".to_string(),
            ClientError::InvalidCredentials(detail) if !detail.is_empty() => detail.clone(),
            ClientError::InvalidCredentials(_) => "Incorrect username or password".to_string(),
            ClientError::Validation { detail, .. } if !detail.is_empty() => detail.clone(),
            ClientError::Transient { .. } => "The server could not be reached, please try again".to_string(),
            ClientError::RollbackFailure { .. } => "The list was out of date and has been reloaded".to_string(),
            _ => "An unexpected error occurred".to_string(),
        }
    }

    /// Convert to JSON output body
    pub fn to_json(&self) -> Value {
        let mut body = json!({
            "success": false,
            "error": self.user_message(),
            "error_code": self.error_code(),
        });
        if let Some(status) = self.status_code() {
            body["status"] = json!(status);
        }
        body
    }

    /// Classify a non-success response. 401 is handled by the client before
    /// this is reached, except on the token endpoint.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = extract_detail(body);
        match status {
            401 => ClientError::AuthExpired(detail),
            400..=499 => ClientError::Validation { status, detail },
            _ => ClientError::Transient {
                status: Some(status),
                message: if detail.is_empty() {
                    format!("server responded with status {}", status)
                } else {
                    detail
                },
            },
        }
    }
}

// Static constructor methods
impl ClientError {
    pub fn auth_expired(message: impl Into<String>) -> Self {
        ClientError::AuthExpired(message.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        ClientError::Transient {
            status: None,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        ClientError::Decode(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ClientError::Storage(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        ClientError::Config(message.into())
    }
}

/// Pull the `detail` out of a backend error body. The backend sends either a
/// plain string or a list of `{loc, msg}` field errors.
pub fn extract_detail(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };

    match value.get("detail") {
        Some(Value::String(detail)) => detail.clone(),
        Some(Value::Array(errors)) => match errors.first() {
            Some(first) => {
                let field = first
                    .get("loc")
                    .and_then(Value::as_array)
                    .and_then(|loc| loc.last())
                    .map(|f| match f {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                let msg = first.get("msg").and_then(Value::as_str).unwrap_or("invalid value");
                match field {
                    Some(field) => format!("field '{}': {}", field, msg),
                    None => msg.to_string(),
                }
            }
            None => String::new(),
        },
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return ClientError::Decode(err.to_string());
        }
        ClientError::Transient {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_detail() {
        let err = ClientError::from_status(409, r#"{"detail": "Email already registered."}"#);
        assert_eq!(err.user_message(), "Email already registered.");
        assert_eq!(err.status_code(), Some(409));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_field_error_detail() {
        let body = r#"{"detail": [{"loc": ["body", "assignee_email"], "msg": "value is not a valid email address"}]}"#;
        assert_eq!(extract_detail(body), "field 'assignee_email': value is not a valid email address");
    }

    #[test]
    fn test_server_errors_are_transient() {
        let err = ClientError::from_status(503, "");
        assert!(matches!(err, ClientError::Transient { status: Some(503), .. }));
        assert_eq!(err.user_message(), "The server could not be reached, please try again");
    }

    #[test]
    fn test_generic_message_without_detail() {
        let err = ClientError::from_status(403, "");
        assert_eq!(err.user_message(), "An unexpected error occurred");
        assert!(!err.requires_login());
    }
}
