use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Authentication and authorization errors for the web layer.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// No valid session on the request.
    #[error("not authenticated")]
    Unauthenticated,

    /// Valid session, but a required role is missing.
    #[error("missing required role: {0}")]
    Forbidden(String),

    /// Missing or invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => {
                (StatusCode::UNAUTHORIZED, self.to_string()).into_response()
            }
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()).into_response(),
            Self::Config(_) => {
                tracing::error!(error = %self, "auth configuration error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AuthError::Unauthenticated.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::Forbidden("admin".into()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AuthError::Config("bad".into()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
