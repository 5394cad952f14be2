// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest {
        code: &'static str,
        message: String,
    },
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },
    InvalidJson(String),

    // 401 Unauthorized
    Unauthorized {
        code: &'static str,
        message: String,
    },

    // 403 Forbidden
    Forbidden {
        code: &'static str,
        message: String,
        context: Map<String, Value>,
    },

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 429 Too Many Requests
    TooManyRequests {
        message: String,
        context: Map<String, Value>,
    },

    // 500 Internal Server Error
    InternalServerError {
        message: String,
        /// Underlying cause, only surfaced when debug mode is on
        detail: Option<String>,
    },

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::ValidationError { .. } => StatusCode::BAD_REQUEST,
            ApiError::InvalidJson(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden { .. } => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest { message, .. } => message,
            ApiError::ValidationError { message, .. } => message,
            ApiError::InvalidJson(msg) => msg,
            ApiError::Unauthorized { message, .. } => message,
            ApiError::Forbidden { message, .. } => message,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::TooManyRequests { message, .. } => message,
            ApiError::InternalServerError { message, .. } => message,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. } => *code,
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::InvalidJson(_) => "INVALID_JSON",
            ApiError::Unauthorized { code, .. } => *code,
            ApiError::Forbidden { code, .. } => *code,
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TooManyRequests { .. } => "RATE_LIMIT_EXCEEDED",
            ApiError::InternalServerError { .. } => "INTERNAL_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// Convert to the JSON error envelope:
    /// `{success:false, message, errors:{error, message, ...context}, timestamp}`
    pub fn to_json(&self) -> Value {
        let mut errors = Map::new();
        errors.insert("error".into(), Value::from(self.error_code()));
        errors.insert("message".into(), Value::from(self.message()));

        match self {
            ApiError::ValidationError {
                field_errors: Some(field_errors),
                ..
            } => {
                errors.insert("field_errors".into(), json!(field_errors));
            }
            ApiError::Forbidden { context, .. } | ApiError::TooManyRequests { context, .. } => {
                for (key, value) in context {
                    errors.insert(key.clone(), value.clone());
                }
            }
            ApiError::InternalServerError {
                detail: Some(detail),
                ..
            } => {
                errors.insert("detail".into(), Value::from(detail.as_str()));
            }
            _ => {}
        }

        json!({
            "success": false,
            "message": self.message(),
            "errors": errors,
            "timestamp": Utc::now().to_rfc3339(),
        })
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code: "BAD_REQUEST",
            message: message.into(),
        }
    }

    pub fn bad_request_with_code(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>,
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    /// Single-field validation failure
    pub fn invalid_field(field: &str, problem: impl Into<String>) -> Self {
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), problem.into());
        ApiError::validation_error("Invalid field format", Some(field_errors))
    }

    pub fn invalid_json(message: impl Into<String>) -> Self {
        ApiError::InvalidJson(message.into())
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            code,
            message: message.into(),
            context: Map::new(),
        }
    }

    pub fn forbidden_with_context(
        code: &'static str,
        message: impl Into<String>,
        context: Map<String, Value>,
    ) -> Self {
        ApiError::Forbidden {
            code,
            message: message.into(),
            context,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn too_many_requests(message: impl Into<String>, context: Map<String, Value>) -> Self {
        ApiError::TooManyRequests {
            message: message.into(),
            context,
        }
    }

    /// Opaque 500; the cause is logged and only echoed back in debug mode
    pub fn internal(cause: &dyn std::fmt::Display, debug: bool) -> Self {
        tracing::error!("Internal error: {}", cause);
        ApiError::InternalServerError {
            message: "An internal error occurred".to_string(),
            detail: debug.then(|| cause.to_string()),
        }
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(self.to_json())).into_response()
    }
}
