//! Application error types.
//!
//! These errors are serializable so the HTTP layer can return them as
//! structured JSON, and carry enough context (status codes, resource ids)
//! for the caller to tell the failure categories apart.

use serde::Serialize;
use thiserror::Error;

/// Application-level errors returned by services and HTTP handlers.
///
/// All variants serialize to a structured JSON object.
#[derive(Debug, Error, Serialize)]
#[serde(tag = "type", content = "details")]
pub enum AppError {
    /// Database operation failed.
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        operation: Option<String>,
    },

    /// GitHub API request was rejected.
    #[error("GitHub API error: {message}")]
    GitHubApi {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },

    /// Network request failed.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Requested resource not found.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Invalid input provided.
    #[error("Invalid input: {message}")]
    InvalidInput {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },

    /// Status sync attempted on a node that has no linked GitHub issue.
    #[error("Node {node_id} is not published to GitHub")]
    NotPublished { node_id: String },

    /// Operation conflicts with the current state of the resource.
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// A required integration is not configured.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal application error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create a database error with optional operation context.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: None,
        }
    }

    /// Create a database error with operation context.
    pub fn database_with_op(message: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
            operation: Some(operation.into()),
        }
    }

    /// Create a GitHub API error for a rejected request.
    pub fn github_api(message: impl Into<String>, status_code: u16) -> Self {
        Self::GitHubApi {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a not found error with ID.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: None,
        }
    }

    /// Create an invalid input error with field name.
    pub fn invalid_input_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not-yet-published error for a node.
    pub fn not_published(node_id: impl Into<String>) -> Self {
        Self::NotPublished {
            node_id: node_id.into(),
        }
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error means the resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::database(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

impl From<crate::db::DbError> for AppError {
    fn from(err: crate::db::DbError) -> Self {
        Self::database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = AppError::database("connection failed");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"Database\""));
        assert!(json.contains("connection failed"));
    }

    #[test]
    fn test_github_api_error_carries_status() {
        let err = AppError::github_api("Validation Failed", 422);
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"type\":\"GitHubApi\""));
        assert!(json.contains("\"status_code\":422"));
    }

    #[test]
    fn test_not_found_with_id() {
        let err = AppError::not_found_with_id("Release", "rel-1");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"resource\":\"Release\""));
        assert!(json.contains("\"id\":\"rel-1\""));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_optional_fields_not_serialized() {
        let err = AppError::database("error");
        let json = serde_json::to_string(&err).unwrap();
        assert!(!json.contains("operation"));
    }

    #[test]
    fn test_display_impl() {
        let err = AppError::not_published("node-7");
        assert_eq!(format!("{}", err), "Node node-7 is not published to GitHub");

        let err = AppError::invalid_input_field("Duplicate node id 'a'", "nodes");
        assert_eq!(format!("{}", err), "Invalid input: Duplicate node id 'a'");
    }
}
