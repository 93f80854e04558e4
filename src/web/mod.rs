//! Web layer: routes, authorization gates and session middleware.
//!
//! The refresh middleware runs in front of everything, turning a valid
//! session cookie into a [`CurrentUser`] on the request (silently
//! refreshing tokens when needed). The gates then decide what a missing
//! session means per route: [`gate::require_session_redirect`] sends the
//! browser into the login flow, [`gate::require_session_api`] answers
//! `401`.

pub mod api;
mod config;
mod cookies;
mod error;
mod extract;
pub mod gate;
mod routes;
mod state;

pub use config::AuthConfig;
pub use error::AuthError;
pub use extract::CurrentUser;
pub use routes::app_router;
pub use state::AppState;

/// Re-export cookie types for builder APIs.
pub use axum_extra::extract::cookie::{Key as CookieKey, SameSite};
