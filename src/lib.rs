#![doc = include_str!("../README.md")]

pub mod claims;
pub mod discovery;
pub mod error;
pub mod events;
pub mod id_token;
pub mod pkce;
pub mod provider;
pub mod session;
pub mod weather;
pub mod web;

// Re-exports for convenient access
pub use claims::{Claim, ClaimMapping, ClaimSet};
pub use discovery::ProviderMetadata;
pub use error::Error;
pub use events::SessionEvents;
pub use provider::{
    AuthorizationRequest, HttpProvider, IdentityProvider, ProviderSettings, TokenSet,
};
pub use session::{RefreshCoordinator, RefreshOutcome, SessionId, SessionTicket};
pub use weather::{DailyForecast, SampleForecaster, WeatherForecaster};
pub use web::{AppState, AuthConfig, AuthError, CurrentUser, app_router};
