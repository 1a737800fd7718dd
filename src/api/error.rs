//! Error type for the generation backend client.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Network or connection failure.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("Request to {path} failed with status {status}: {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected shape.
    #[error("Failed to parse response from {path}: {message}")]
    Parse { path: String, message: String },

    /// The log stream broke before the server ended it.
    #[error("Log stream error: {0}")]
    Stream(String),
}

impl ApiError {
    pub(crate) fn status(path: &str, status: reqwest::StatusCode, body: String) -> Self {
        let body = if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body
        };
        Self::Status {
            path: path.to_string(),
            status: status.as_u16(),
            body,
        }
    }

    /// HTTP status code, when the backend produced one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status_code() == Some(404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_body_uses_reason_phrase() {
        let err = ApiError::status("/api/tasks/x", reqwest::StatusCode::NOT_FOUND, "  ".into());
        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "Request to /api/tasks/x failed with status 404: Not Found"
        );
    }
}
