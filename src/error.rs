use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use validator::ValidationErrors;

use crate::{mailer::MailError, repository::RepoError};

/// AppError
///
/// The single error type every handler and extractor returns. Each variant maps to
/// one HTTP status and a JSON body of the form
/// `{"error": ..., "code": ..., "fields": {field: [messages]}}`, where `fields` is
/// present only for field-level validation failures.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Payload failed declarative validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    /// A single field was rejected by a check that needed the store.
    #[error("{field}: {message}")]
    Field {
        field: &'static str,
        message: String,
    },

    /// The request body was not valid JSON for the expected payload.
    #[error("malformed request body: {0}")]
    Body(#[from] JsonRejection),

    /// A bearer token was supplied but could not be accepted.
    #[error("authentication failed: {0}")]
    Unauthorized(&'static str),

    #[error("permission denied: {0}")]
    Forbidden(&'static str),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Repository(#[from] RepoError),

    #[error("token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Mail(#[from] MailError),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Field {
            field,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Field { .. } | AppError::Body(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Repository(err) => match err {
                RepoError::NotFound(_) => StatusCode::NOT_FOUND,
                RepoError::Conflict { .. } | RepoError::InvalidReference { .. } => {
                    StatusCode::BAD_REQUEST
                }
                RepoError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Token(_) | AppError::Mail(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn field_map(field: &str, message: String) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert(field.to_string(), json!([message]));
    fields
}

fn validation_map(errors: &ValidationErrors) -> Map<String, Value> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages: Vec<String> = errs
                .iter()
                .map(|e| match &e.message {
                    Some(message) => message.to_string(),
                    None => format!("invalid value ({})", e.code),
                })
                .collect();
            (field.to_string(), json!(messages))
        })
        .collect()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let (code, message, fields) = match &self {
            AppError::Validation(errors) => (
                "VALIDATION_ERROR",
                "request validation failed".to_string(),
                Some(validation_map(errors)),
            ),
            AppError::Field { field, message } => (
                "VALIDATION_ERROR",
                "request validation failed".to_string(),
                Some(field_map(field, message.clone())),
            ),
            AppError::Body(rejection) => ("BAD_REQUEST", rejection.body_text(), None),
            AppError::Unauthorized(msg) => ("UNAUTHORIZED", msg.to_string(), None),
            AppError::Forbidden(msg) => ("FORBIDDEN", msg.to_string(), None),
            AppError::NotFound(entity) => ("NOT_FOUND", format!("{entity} not found"), None),
            AppError::Repository(err) => match err {
                RepoError::NotFound(entity) => {
                    ("NOT_FOUND", format!("{entity} not found"), None)
                }
                RepoError::Conflict { field, message } => (
                    "VALIDATION_ERROR",
                    "request validation failed".to_string(),
                    Some(field_map(field, message.to_string())),
                ),
                RepoError::InvalidReference { field, value } => (
                    "VALIDATION_ERROR",
                    "request validation failed".to_string(),
                    Some(field_map(field, format!("no {field} with slug '{value}'"))),
                ),
                RepoError::Database(db_err) => {
                    tracing::error!(error = %db_err, "Database error");
                    ("INTERNAL_ERROR", "an internal error occurred".to_string(), None)
                }
            },
            AppError::Token(err) => {
                tracing::error!(error = %err, "Token encoding error");
                ("INTERNAL_ERROR", "an internal error occurred".to_string(), None)
            }
            AppError::Mail(err) => {
                tracing::error!(error = %err, "Mail delivery error");
                ("INTERNAL_ERROR", "an internal error occurred".to_string(), None)
            }
        };

        let mut body = json!({
            "error": message,
            "code": code,
        });
        if let Some(fields) = fields {
            body["fields"] = Value::Object(fields);
        }

        (status, Json(body)).into_response()
    }
}
