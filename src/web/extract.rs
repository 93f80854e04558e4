use std::convert::Infallible;

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;

use super::error::AuthError;
use crate::claims::ClaimSet;
use crate::session::SessionId;

/// Authenticated user for the current request, a read-through projection
/// of the session ticket the refresh middleware validated.
///
/// Use as an Axum extractor in route handlers. Returns `401 Unauthorized`
/// if no valid session exists.
///
/// ```rust,ignore
/// async fn protected(user: CurrentUser) -> impl IntoResponse {
///     format!("Hello, {}", user.claims.get("name").unwrap_or("stranger"))
/// }
///
/// // Optional: accessible to both authenticated and anonymous users
/// async fn public(user: Option<CurrentUser>) -> impl IntoResponse {
///     match user {
///         Some(u) => format!("{} claims", u.claims.len()),
///         None => "Hello, guest".to_string(),
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub session_id: SessionId,
    pub claims: ClaimSet,
}

impl CurrentUser {
    /// 403-style check for endpoints that need a specific role.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Forbidden`] when the claim set lacks the role.
    pub fn require_role(&self, role_claim: &str, role: &str) -> Result<(), AuthError> {
        if self.claims.has_role(role_claim, role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden(role.to_string()))
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AuthError::Unauthenticated)
    }
}

impl<S: Send + Sync> OptionalFromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<CurrentUser>().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> CurrentUser {
        let mut claims = ClaimSet::new();
        claims.push("role", "admin");
        CurrentUser {
            session_id: SessionId("sess-1".into()),
            claims,
        }
    }

    #[test]
    fn role_requirement() {
        assert!(user().require_role("role", "admin").is_ok());
        assert!(matches!(
            user().require_role("role", "ops"),
            Err(AuthError::Forbidden(role)) if role == "ops"
        ));
    }
}
