use std::io;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Everything that can stop a range response from being produced.
#[derive(Debug, Error)]
pub enum RangeError {
    /// The `Range` header is syntactically invalid, or names bytes outside
    /// the resource.
    #[error("malformed range header: {0:?}")]
    MalformedRangeHeader(String),

    /// The request resolved to several disjoint ranges. multipart/byteranges
    /// responses are not produced.
    #[error("request resolves to {0} disjoint ranges, multipart responses are not supported")]
    UnsupportedMultiRange(usize),

    /// The underlying byte source failed while being sized, hashed or streamed.
    #[error("failed to read resource: {0}")]
    ResourceReadFailure(#[from] io::Error),

    #[error("resource is empty")]
    EmptyResource,

    #[error("identity tag is not a valid header value: {0:?}")]
    InvalidIdentityTag(String),
}

impl RangeError {
    /// True for the errors a client can cause with its `Range` header.
    pub fn is_unsatisfiable(&self) -> bool {
        matches!(self, RangeError::MalformedRangeHeader(_) | RangeError::UnsupportedMultiRange(_))
    }

    /// HTTP status this error is surfaced as.
    pub fn status(&self) -> StatusCode {
        if self.is_unsatisfiable() {
            StatusCode::RANGE_NOT_SATISFIABLE
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for RangeError {
    fn into_response(self) -> Response {
        self.status().into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, RangeError::MalformedRangeHeader("bytes=a".into()).status());
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, RangeError::UnsupportedMultiRange(2).status());
        let read = RangeError::from(io::Error::new(io::ErrorKind::UnexpectedEof, "short read"));
        assert_eq!(StatusCode::INTERNAL_SERVER_ERROR, read.status());
        assert!(!read.is_unsatisfiable());
    }

    #[test]
    fn test_into_response_has_no_body_headers() {
        let response = RangeError::UnsupportedMultiRange(3).into_response();
        assert_eq!(StatusCode::RANGE_NOT_SATISFIABLE, response.status());
        assert!(response.headers().get("Content-Range").is_none());
    }
}
