//! User-facing error envelope
//!
//! Store primitives raise [`StoreError`](crate::storage::StoreError); the
//! controller façade converts them into a [`ServiceError`] carrying an
//! [`ErrorCode`], a location breadcrumb and an optional free-text detail.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::storage::StoreError;

/// Error classification shared by every layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    MandatoryFieldMissing,
    DuplicateDocumentRejected,
    ModifyDocumentFailed,
    DocumentNotFound,
    InvalidTypeGiven,
    DocumentInUse,
    UnhandledError,
}

impl ErrorCode {
    /// Fixed message shown to callers for this kind of failure
    pub fn message(&self) -> &'static str {
        match self {
            ErrorCode::MandatoryFieldMissing => "Missing mandatory field! Could not create document",
            ErrorCode::DuplicateDocumentRejected => {
                "Request results in creating a duplicate document, this is disallowed"
            }
            ErrorCode::ModifyDocumentFailed => "Could not update/delete the document",
            ErrorCode::DocumentNotFound => "Document not found in DB",
            ErrorCode::InvalidTypeGiven => "Expected field type is not matching",
            ErrorCode::DocumentInUse => "Document is using some other collection as a foreign key",
            ErrorCode::UnhandledError => "Unhandled exception occurred",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Where an error was raised: component and operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub component: String,
    pub operation: String,
}

impl Location {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.component, self.operation)
    }
}

impl Serialize for Location {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        [&self.component, &self.operation].serialize(serializer)
    }
}

/// Uniform error returned to every caller of the controller and resource layers
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[error("{} (at {location})", render_message(.code, .detail))]
pub struct ServiceError {
    pub code: ErrorCode,
    pub location: Location,
    pub detail: Option<String>,
}

impl ServiceError {
    pub fn new(code: ErrorCode, location: Location) -> Self {
        Self {
            code,
            location,
            detail: None,
        }
    }

    /// Attach a free-text detail
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Report this error at `location` instead
    pub fn relocated(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Translate a store-layer failure raised at `location`
    pub fn from_store(err: StoreError, location: Location) -> Self {
        Self {
            code: err.code(),
            location,
            detail: Some(err.to_string()),
        }
    }

    /// Message text: the code's message, followed by the detail when present
    pub fn message(&self) -> String {
        render_message(&self.code, &self.detail)
    }

    /// HTTP-style status for this error
    pub fn status_code(&self) -> u16 {
        match self.code {
            ErrorCode::UnhandledError => 500,
            _ => 422,
        }
    }

    /// Render the error body returned to clients
    pub fn envelope(&self) -> Value {
        json!({
            "detail": [{
                "loc": self.location,
                "msg": self.message(),
                "type": "validation_studio_error.semantic",
            }]
        })
    }
}

fn render_message(code: &ErrorCode, detail: &Option<String>) -> String {
    match detail {
        Some(detail) if !detail.is_empty() => format!("{}. {}", code.message(), detail),
        _ => code.message().to_string(),
    }
}

/// Result type for façade operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_with_detail() {
        let err = ServiceError::new(
            ErrorCode::MandatoryFieldMissing,
            Location::new("sequences", "update"),
        )
        .with_detail("deleted_by must accompany is_deleted");

        assert_eq!(
            err.message(),
            "Missing mandatory field! Could not create document. deleted_by must accompany is_deleted"
        );
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn test_envelope_shape() {
        let err = ServiceError::new(
            ErrorCode::DocumentNotFound,
            Location::new("controller", "delete"),
        );
        let body = err.envelope();

        assert_eq!(body["detail"][0]["loc"], json!(["controller", "delete"]));
        assert_eq!(body["detail"][0]["msg"], "Document not found in DB");
        assert_eq!(body["detail"][0]["type"], "validation_studio_error.semantic");
    }

    #[test]
    fn test_from_store_keeps_classification() {
        let err = ServiceError::from_store(
            StoreError::DuplicateDocumentRejected {
                collection: "organisations".to_string(),
            },
            Location::new("controller", "create"),
        );

        assert_eq!(err.code, ErrorCode::DuplicateDocumentRejected);
        assert!(err.detail.unwrap().contains("organisations"));
    }

    #[test]
    fn test_unhandled_status() {
        let err = ServiceError::new(ErrorCode::UnhandledError, Location::new("controller", "read"));
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("controller/read"));
    }
}
