use axum_extra::extract::cookie::{Key, SameSite};
use time::Duration;

use super::error::AuthError;

/// Shared web-layer settings used by routes, gate and refresh middleware.
#[derive(Clone)]
pub(crate) struct AuthSettings {
    pub(crate) cookie_key: Key,
    pub(crate) session_cookie_name: String,
    pub(crate) session_ttl_days: i64,
    pub(crate) refresh_margin: Duration,
    pub(crate) secure_cookies: bool,
    pub(crate) same_site: SameSite,
    pub(crate) auth_path: String,
    pub(crate) login_redirect: String,
    pub(crate) logout_redirect: String,
    pub(crate) error_redirect: String,
    pub(crate) dev_mode: bool,
}

impl AuthSettings {
    fn defaults() -> Self {
        Self {
            cookie_key: Key::generate(),
            session_cookie_name: "__oidc_session".into(),
            session_ttl_days: 30,
            refresh_margin: Duration::seconds(60),
            secure_cookies: true,
            same_site: SameSite::Lax,
            auth_path: "/authentication".into(),
            login_redirect: "/".into(),
            logout_redirect: "/".into(),
            error_redirect: "/".into(),
            dev_mode: false,
        }
    }
}

/// Cookie-session configuration.
///
/// Use [`from_env()`](AuthConfig::from_env) for convention-based setup, or
/// [`new()`](AuthConfig::new) with `with_*` methods for full control.
pub struct AuthConfig {
    pub(crate) settings: AuthSettings,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    /// All settings start from sensible defaults. Override with `with_*`
    /// methods.
    #[must_use]
    pub fn new() -> Self {
        Self {
            settings: AuthSettings::defaults(),
        }
    }

    /// Create config from environment variables.
    ///
    /// # Optional env vars
    /// - `DEV_AUTH`: set to `"1"` or `"true"` to enable dev mode and
    ///   disable secure cookies
    /// - `COOKIE_KEY`: cookie encryption key bytes (at least 64);
    ///   ephemeral key when unset
    /// - `SESSION_COOKIE_NAME`: override the session cookie name
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Config`] if `COOKIE_KEY` is set but invalid.
    pub fn from_env() -> Result<Self, AuthError> {
        let dev_auth = matches!(std::env::var("DEV_AUTH").as_deref(), Ok("1") | Ok("true"));

        let cookie_key = match std::env::var("COOKIE_KEY") {
            Ok(k) => Key::try_from(k.as_bytes()).map_err(|_| {
                AuthError::Config(
                    "COOKIE_KEY is set but invalid (must be at least 64 bytes). \
                     Remove the env var to use an ephemeral key, or provide a valid key."
                        .into(),
                )
            })?,
            Err(_) => Key::generate(),
        };

        let mut config = Self::new()
            .with_cookie_key(cookie_key)
            .with_secure_cookies(!dev_auth)
            .with_dev_mode(dev_auth);

        if let Ok(name) = std::env::var("SESSION_COOKIE_NAME") {
            config = config.with_session_cookie_name(name);
        }

        Ok(config)
    }

    #[must_use]
    pub fn with_cookie_key(mut self, key: Key) -> Self {
        self.settings.cookie_key = key;
        self
    }

    #[must_use]
    pub fn with_session_cookie_name(mut self, name: impl Into<String>) -> Self {
        self.settings.session_cookie_name = name.into();
        self
    }

    #[must_use]
    pub fn with_session_ttl_days(mut self, days: i64) -> Self {
        self.settings.session_ttl_days = days;
        self
    }

    /// How long before access-token expiry a refresh is already triggered.
    #[must_use]
    pub fn with_refresh_margin(mut self, margin: Duration) -> Self {
        self.settings.refresh_margin = margin;
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.settings.secure_cookies = secure;
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.settings.same_site = same_site;
        self
    }

    /// Mount point of the authentication routes. Must start with `/` and
    /// not end with one.
    #[must_use]
    pub fn with_auth_path(mut self, path: impl Into<String>) -> Self {
        self.settings.auth_path = path.into();
        self
    }

    #[must_use]
    pub fn with_login_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.login_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_logout_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.logout_redirect = path.into();
        self
    }

    #[must_use]
    pub fn with_error_redirect(mut self, path: impl Into<String>) -> Self {
        self.settings.error_redirect = path.into();
        self
    }

    /// Dev mode: verbose claim logging and relaxed transport checks.
    #[must_use]
    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.settings.dev_mode = enabled;
        self
    }

    #[must_use]
    pub fn dev_mode(&self) -> bool {
        self.settings.dev_mode
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = AuthConfig::new()
            .with_session_cookie_name("demo_session")
            .with_session_ttl_days(7)
            .with_refresh_margin(Duration::seconds(30))
            .with_dev_mode(true);

        assert_eq!(config.settings.session_cookie_name, "demo_session");
        assert_eq!(config.settings.session_ttl_days, 7);
        assert_eq!(config.settings.refresh_margin, Duration::seconds(30));
        assert!(config.dev_mode());
        // Untouched defaults survive.
        assert_eq!(config.settings.auth_path, "/authentication");
        assert!(config.settings.secure_cookies);
    }
}
