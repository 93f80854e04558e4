use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;

use super::config::{AuthConfig, AuthSettings};
use crate::events::SessionEvents;
use crate::provider::IdentityProvider;
use crate::session::RefreshCoordinator;
use crate::weather::{SampleForecaster, WeatherForecaster};

/// Shared state for the whole application.
pub struct AppState<P> {
    pub(crate) provider: Arc<P>,
    pub(crate) settings: Arc<AuthSettings>,
    pub(crate) refresh: Arc<RefreshCoordinator>,
    pub(crate) events: Arc<SessionEvents>,
    pub(crate) forecaster: Arc<dyn WeatherForecaster>,
}

impl<P: IdentityProvider> AppState<P> {
    #[must_use]
    pub fn new(provider: P, config: AuthConfig) -> Self {
        Self {
            provider: Arc::new(provider),
            settings: Arc::new(config.settings),
            refresh: Arc::new(RefreshCoordinator::new()),
            events: Arc::new(SessionEvents::new()),
            forecaster: Arc::new(SampleForecaster),
        }
    }

    #[must_use]
    pub fn with_events(mut self, events: SessionEvents) -> Self {
        self.events = Arc::new(events);
        self
    }

    #[must_use]
    pub fn with_forecaster(mut self, forecaster: impl WeatherForecaster + 'static) -> Self {
        self.forecaster = Arc::new(forecaster);
        self
    }
}

// Manual Clone: avoid derive adding a `P: Clone` bound.
impl<P> Clone for AppState<P> {
    fn clone(&self) -> Self {
        Self {
            provider: self.provider.clone(),
            settings: self.settings.clone(),
            refresh: self.refresh.clone(),
            events: self.events.clone(),
            forecaster: self.forecaster.clone(),
        }
    }
}

// PrivateCookieJar requires Key to be extractable from state.
impl<P: IdentityProvider> FromRef<AppState<P>> for Key {
    fn from_ref(state: &AppState<P>) -> Self {
        state.settings.cookie_key.clone()
    }
}
