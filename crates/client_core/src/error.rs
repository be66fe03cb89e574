use std::fmt;

use shared::error::{ErrorBody, ErrorCode, ErrorDetail};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// `None` for form-level messages that belong to no single field.
    pub field: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormErrors {
    pub fields: Vec<FieldError>,
}

impl FormErrors {
    pub fn general(message: impl Into<String>) -> Self {
        Self {
            fields: vec![FieldError {
                field: None,
                message: message.into(),
            }],
        }
    }

    pub fn push(&mut self, field: &str, message: impl Into<String>) {
        self.fields.push(FieldError {
            field: Some(field.to_string()),
            message: message.into(),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields
            .iter()
            .any(|error| error.field.as_deref() == Some(field))
    }

    pub fn messages_for<'a>(&'a self, field: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |error| error.field.as_deref() == Some(field))
            .map(|error| error.message.as_str())
    }

    pub(crate) fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, error) in self.fields.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            match &error.field {
                Some(field) => write!(f, "{field}: {}", error.message)?,
                None => f.write_str(&error.message)?,
            }
        }
        Ok(())
    }
}

impl std::error::Error for FormErrors {}

impl From<&ErrorDetail> for FormErrors {
    fn from(detail: &ErrorDetail) -> Self {
        match detail {
            ErrorDetail::Message(message) => FormErrors::general(message.clone()),
            ErrorDetail::Fields(issues) => FormErrors {
                fields: issues
                    .iter()
                    .map(|issue| FieldError {
                        field: issue.field(),
                        message: issue.msg.clone(),
                    })
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("not signed in or session expired")]
    Unauthorized,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation failed: {0}")]
    Validation(#[from] FormErrors),
    #[error("network error: {0}")]
    Network(String),
    #[error("server error{}: {message}", status_suffix(.status))]
    Server { status: Option<u16>, message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|status| format!(" ({status})")).unwrap_or_default()
}

/// What a view should do with a failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorDisposition {
    RedirectToLogin,
    InlineFields(Vec<FieldError>),
    Inline(String),
    NotFoundState,
    RetryPrompt(String),
}

impl ClientError {
    /// Builds an error from a non-success response status and its raw body.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let message = parsed
            .as_ref()
            .map(|body| body.detail.summary())
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| format!("HTTP {status}"));

        match ErrorCode::from_status(status) {
            Some(ErrorCode::Unauthorized) => ClientError::Unauthorized,
            Some(ErrorCode::Forbidden) => ClientError::Forbidden(message),
            Some(ErrorCode::NotFound) => ClientError::NotFound(message),
            Some(ErrorCode::Validation) => match parsed {
                Some(body) => ClientError::Validation(FormErrors::from(&body.detail)),
                None => ClientError::Validation(FormErrors::general(message)),
            },
            Some(ErrorCode::Network) => ClientError::Network(message),
            Some(ErrorCode::Server) | None => ClientError::Server {
                status: Some(status),
                message,
            },
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ClientError::Unauthorized => ErrorCode::Unauthorized,
            ClientError::Forbidden(_) => ErrorCode::Forbidden,
            ClientError::NotFound(_) => ErrorCode::NotFound,
            ClientError::Validation(_) => ErrorCode::Validation,
            ClientError::Network(_) => ErrorCode::Network,
            ClientError::Server { .. } => ErrorCode::Server,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        matches!(self, ClientError::Unauthorized)
    }

    pub fn disposition(&self) -> ErrorDisposition {
        match self {
            ClientError::Unauthorized => ErrorDisposition::RedirectToLogin,
            ClientError::Validation(errors) => ErrorDisposition::InlineFields(errors.fields.clone()),
            ClientError::Forbidden(message) => ErrorDisposition::Inline(message.clone()),
            ClientError::NotFound(_) => ErrorDisposition::NotFoundState,
            ClientError::Network(_) => ErrorDisposition::RetryPrompt(
                "Could not reach the GeoQB service. Check your connection and retry.".to_string(),
            ),
            ClientError::Server { .. } => ErrorDisposition::RetryPrompt(
                "The GeoQB service failed to handle the request. Please retry.".to_string(),
            ),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::Server {
                status: err.status().map(|s| s.as_u16()),
                message: format!("invalid response body: {err}"),
            }
        } else if let Some(status) = err.status() {
            ClientError::from_response(status.as_u16(), "")
        } else {
            ClientError::Network(err.to_string())
        }
    }
}
