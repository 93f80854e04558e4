use serde::Deserialize;
use url::Url;

use crate::error::Error;

/// Endpoints advertised by the provider's discovery document
/// (`{authority}/.well-known/openid-configuration`).
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    #[serde(default)]
    pub userinfo_endpoint: Option<Url>,
    #[serde(default)]
    pub end_session_endpoint: Option<Url>,
}

/// Fetches the provider's discovery document.
///
/// # Errors
///
/// Returns [`Error::Http`] on network failure, or [`Error::Discovery`] if
/// the provider answers with a non-success status or an unparseable
/// document.
pub async fn fetch_metadata(
    http: &reqwest::Client,
    authority: &Url,
) -> Result<ProviderMetadata, Error> {
    let url = discovery_url(authority)?;
    tracing::debug!(%url, "fetching OIDC discovery document");

    let response = http.get(url).send().await?;
    if !response.status().is_success() {
        return Err(Error::Discovery(format!(
            "provider answered with status {}",
            response.status()
        )));
    }

    response
        .json::<ProviderMetadata>()
        .await
        .map_err(|e| Error::Discovery(e.to_string()))
}

/// Builds the discovery URL; the authority may or may not carry a trailing
/// slash.
fn discovery_url(authority: &Url) -> Result<Url, Error> {
    let base = authority.as_str().trim_end_matches('/');
    format!("{base}/.well-known/openid-configuration")
        .parse()
        .map_err(|e| Error::Discovery(format!("invalid authority URL: {e}")))
}
