use std::future::Future;

use serde::Deserialize;
use serde_json::Value as JsonValue;
use url::Url;

use crate::claims::ClaimMapping;
use crate::discovery::{self, ProviderMetadata};
use crate::error::Error;
use crate::pkce;

/// Identity provider registration.
///
/// Loaded once at startup and never mutated. Required fields are
/// constructor parameters — no runtime "missing field" errors.
///
/// ```rust,ignore
/// use oidc_weather_demo::ProviderSettings;
///
/// let settings = ProviderSettings::new(
///     "https://id.example/realms/demo".parse()?,
///     "demo-client",
///     "https://app.example/authentication/callback".parse()?,
/// );
/// ```
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub(crate) authority: Url,
    pub(crate) client_id: String,
    pub(crate) redirect_uri: Url,
    pub(crate) post_logout_redirect_uri: Option<Url>,
    pub(crate) scopes: Vec<String>,
    pub(crate) use_pkce: bool,
    pub(crate) name_claim: String,
    pub(crate) role_claim: String,
    pub(crate) claim_mappings: Vec<ClaimMapping>,
}

impl ProviderSettings {
    /// Create a registration with the required fields; everything else
    /// defaults the way the demo provider registration does.
    #[must_use]
    pub fn new(authority: Url, client_id: impl Into<String>, redirect_uri: Url) -> Self {
        Self {
            authority,
            client_id: client_id.into(),
            redirect_uri,
            post_logout_redirect_uri: None,
            scopes: vec!["openid".into(), "profile".into()],
            use_pkce: true,
            name_claim: "name".into(),
            role_claim: "role".into(),
            claim_mappings: vec![ClaimMapping::new("role", "role")],
        }
    }

    /// Create a registration from environment variables.
    ///
    /// # Required env vars
    /// - `OIDC_AUTHORITY`: issuer base URL
    /// - `OIDC_CLIENT_ID`: registered client id
    /// - `OIDC_REDIRECT_URI`: callback URI (must be a valid URL)
    ///
    /// # Optional env vars
    /// - `OIDC_SCOPES`: comma-separated scopes
    /// - `OIDC_USE_PKCE`: `0`/`false` disables PKCE
    /// - `OIDC_POST_LOGOUT_REDIRECT_URI`: where the provider sends the
    ///   browser after RP-initiated logout
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if required env vars are missing or URLs
    /// are invalid.
    pub fn from_env() -> Result<Self, Error> {
        let authority: Url = required_env("OIDC_AUTHORITY")?
            .parse()
            .map_err(|e| Error::Config(format!("OIDC_AUTHORITY: {e}")))?;
        let client_id = required_env("OIDC_CLIENT_ID")?;
        let redirect_uri: Url = required_env("OIDC_REDIRECT_URI")?
            .parse()
            .map_err(|e| Error::Config(format!("OIDC_REDIRECT_URI: {e}")))?;

        let mut settings = Self::new(authority, client_id, redirect_uri);

        if let Ok(scopes) = std::env::var("OIDC_SCOPES") {
            settings =
                settings.with_scopes(scopes.split(',').map(|s| s.trim().to_string()).collect());
        }
        if matches!(
            std::env::var("OIDC_USE_PKCE").as_deref(),
            Ok("0") | Ok("false")
        ) {
            settings = settings.with_pkce(false);
        }
        if let Ok(uri) = std::env::var("OIDC_POST_LOGOUT_REDIRECT_URI") {
            let uri: Url = uri
                .parse()
                .map_err(|e| Error::Config(format!("OIDC_POST_LOGOUT_REDIRECT_URI: {e}")))?;
            settings = settings.with_post_logout_redirect_uri(uri);
        }

        Ok(settings)
    }

    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    #[must_use]
    pub fn with_pkce(mut self, use_pkce: bool) -> Self {
        self.use_pkce = use_pkce;
        self
    }

    #[must_use]
    pub fn with_post_logout_redirect_uri(mut self, uri: Url) -> Self {
        self.post_logout_redirect_uri = Some(uri);
        self
    }

    #[must_use]
    pub fn with_name_claim(mut self, claim_type: impl Into<String>) -> Self {
        self.name_claim = claim_type.into();
        self
    }

    #[must_use]
    pub fn with_role_claim(mut self, claim_type: impl Into<String>) -> Self {
        self.role_claim = claim_type.into();
        self
    }

    /// Replace the claim-mapping rules (default: `role` JSON key → `role`
    /// claim type).
    #[must_use]
    pub fn with_claim_mappings(mut self, mappings: Vec<ClaimMapping>) -> Self {
        self.claim_mappings = mappings;
        self
    }

    #[must_use]
    pub fn authority(&self) -> &Url {
        &self.authority
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_uri(&self) -> &Url {
        &self.redirect_uri
    }

    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    #[must_use]
    pub fn use_pkce(&self) -> bool {
        self.use_pkce
    }

    #[must_use]
    pub fn role_claim(&self) -> &str {
        &self.role_claim
    }

    #[must_use]
    pub fn name_claim(&self) -> &str {
        &self.name_claim
    }

    #[must_use]
    pub fn claim_mappings(&self) -> &[ClaimMapping] {
        &self.claim_mappings
    }
}

fn required_env(name: &'static str) -> Result<String, Error> {
    std::env::var(name).map_err(|_| Error::Config(format!("{name} is required")))
}

/// Authorization URL plus the transaction values to park in short-lived
/// cookies until the callback.
#[derive(Debug)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub nonce: String,
    pub code_verifier: Option<String>,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

/// The seam between the web layer and the identity provider.
///
/// [`HttpProvider`] is the real implementation; tests script their own to
/// count refresh calls and fabricate tokens.
pub trait IdentityProvider: Send + Sync + 'static {
    fn settings(&self) -> &ProviderSettings;

    fn metadata(&self) -> &ProviderMetadata;

    /// Exchange an authorization code for tokens.
    fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> impl Future<Output = Result<TokenSet, Error>> + Send;

    /// Obtain a fresh token set from a refresh token.
    fn refresh(&self, refresh_token: &str)
        -> impl Future<Output = Result<TokenSet, Error>> + Send;

    /// Fetch additional claims from the userinfo endpoint.
    fn fetch_user_info(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<JsonValue, Error>> + Send;

    /// Build an authorization request against the discovered authorize
    /// endpoint: `response_type=code`, state, nonce, and an S256 challenge
    /// when PKCE is on.
    fn begin_authorization(&self) -> AuthorizationRequest {
        let settings = self.settings();
        let state = pkce::generate_state();
        let nonce = pkce::generate_nonce();
        let code_verifier = settings.use_pkce.then(pkce::generate_code_verifier);
        let scope = settings.scopes.join(" ");

        let mut url = self.metadata().authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &settings.client_id)
                .append_pair("redirect_uri", settings.redirect_uri.as_str())
                .append_pair("state", &state)
                .append_pair("nonce", &nonce)
                .append_pair("scope", &scope);
            if let Some(verifier) = &code_verifier {
                query
                    .append_pair("code_challenge", &pkce::generate_code_challenge(verifier))
                    .append_pair("code_challenge_method", "S256");
            }
        }

        AuthorizationRequest {
            url: url.into(),
            state,
            nonce,
            code_verifier,
        }
    }
}

/// Identity provider client talking to a live OIDC provider.
pub struct HttpProvider {
    settings: ProviderSettings,
    metadata: ProviderMetadata,
    http: reqwest::Client,
}

impl HttpProvider {
    /// Resolve the provider's endpoints via discovery and build the
    /// client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Http`] or [`Error::Discovery`] when the discovery
    /// document cannot be fetched or parsed.
    pub async fn discover(settings: ProviderSettings) -> Result<Self, Error> {
        let http = reqwest::Client::new();
        let metadata = discovery::fetch_metadata(&http, &settings.authority).await?;
        Ok(Self {
            settings,
            metadata,
            http,
        })
    }

    /// Build the client from already-known endpoints, skipping discovery.
    #[must_use]
    pub fn from_parts(settings: ProviderSettings, metadata: ProviderMetadata) -> Self {
        Self {
            settings,
            metadata,
            http: reqwest::Client::new(),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Checks HTTP response status; returns the response on success or an
    /// error with details.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, Error> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = response.text().await.unwrap_or_default();
        Err(Error::Provider {
            operation,
            status: Some(status),
            detail,
        })
    }
}

impl IdentityProvider for HttpProvider {
    fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.metadata
    }

    fn exchange_code(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> impl Future<Output = Result<TokenSet, Error>> + Send {
        async move {
            let mut params = vec![
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.settings.redirect_uri.as_str()),
                ("client_id", self.settings.client_id.as_str()),
            ];
            if let Some(verifier) = code_verifier {
                params.push(("code_verifier", verifier));
            }

            let response = self
                .http
                .post(self.metadata.token_endpoint.clone())
                .form(&params)
                .send()
                .await?;

            let response = Self::ensure_success(response, "code exchange").await?;
            response.json::<TokenSet>().await.map_err(Into::into)
        }
    }

    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenSet, Error>> + Send {
        async move {
            let params = [
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.settings.client_id.as_str()),
            ];

            let response = self
                .http
                .post(self.metadata.token_endpoint.clone())
                .form(&params)
                .send()
                .await?;

            let response = Self::ensure_success(response, "token refresh").await?;
            response.json::<TokenSet>().await.map_err(Into::into)
        }
    }

    fn fetch_user_info(
        &self,
        access_token: &str,
    ) -> impl Future<Output = Result<JsonValue, Error>> + Send {
        async move {
            let endpoint = self.metadata.userinfo_endpoint.clone().ok_or({
                Error::Provider {
                    operation: "userinfo request",
                    status: None,
                    detail: "provider does not advertise a userinfo endpoint".into(),
                }
            })?;

            let response = self
                .http
                .get(endpoint)
                .bearer_auth(access_token)
                .send()
                .await?;

            let response = Self::ensure_success(response, "userinfo request").await?;
            response.json::<JsonValue>().await.map_err(Into::into)
        }
    }
}
