use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    Network,
    Server,
}

impl ErrorCode {
    /// Classifies a non-success HTTP status. Returns `None` for 1xx-3xx.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            401 => Some(ErrorCode::Unauthorized),
            403 => Some(ErrorCode::Forbidden),
            404 => Some(ErrorCode::NotFound),
            400 | 409 | 422 => Some(ErrorCode::Validation),
            408 | 429 => Some(ErrorCode::Network),
            400..=599 => Some(ErrorCode::Server),
            _ => None,
        }
    }
}

/// Error body returned by the backend: `{"detail": ...}`.
///
/// `detail` is a plain message for handled errors and a list of per-field
/// issues for request validation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: ErrorDetail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ErrorBody {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            detail: ErrorDetail::Message(message.into()),
            error_code: None,
        }
    }

    pub fn fields(issues: Vec<FieldIssue>) -> Self {
        Self {
            detail: ErrorDetail::Fields(issues),
            error_code: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldIssue>),
}

impl ErrorDetail {
    pub fn summary(&self) -> String {
        match self {
            ErrorDetail::Message(message) => message.clone(),
            ErrorDetail::Fields(issues) => issues
                .iter()
                .map(|issue| match issue.field() {
                    Some(field) => format!("{field}: {}", issue.msg),
                    None => issue.msg.clone(),
                })
                .collect::<Vec<_>>()
                .join("; "),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldIssue {
    #[serde(default)]
    pub loc: Vec<Value>,
    pub msg: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl FieldIssue {
    pub fn new(field: &str, msg: impl Into<String>) -> Self {
        Self {
            loc: vec![Value::from("body"), Value::from(field)],
            msg: msg.into(),
            kind: None,
        }
    }

    /// Last location segment, skipping the `body`/`query` prefix.
    pub fn field(&self) -> Option<String> {
        self.loc
            .iter()
            .rev()
            .find(|segment| !matches!(segment.as_str(), Some("body" | "query" | "path")))
            .map(|segment| match segment {
                Value::String(name) => name.clone(),
                other => other.to_string(),
            })
    }
}
