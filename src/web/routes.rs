use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use axum_extra::extract::PrivateCookieJar;
use serde::Deserialize;
use time::OffsetDateTime;

use super::api;
use super::cookies;
use super::gate;
use super::state::AppState;
use crate::id_token;
use crate::provider::IdentityProvider;
use crate::session::SessionTicket;

/// Assemble the application router: authentication routes under the
/// configured auth path, the gated weather endpoint, and the claims dump.
pub fn app_router<P: IdentityProvider>(state: AppState<P>) -> Router {
    let auth = Router::new()
        .route("/login", get(login::<P>))
        .route("/callback", get(callback::<P>))
        .route("/logout", get(logout::<P>).post(logout::<P>));

    let weather = Router::new()
        .route("/weather-forecast", get(api::weather_forecast::<P>))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::require_session_redirect::<P>,
        ));

    Router::new()
        .nest(&state.settings.auth_path, auth)
        .merge(weather)
        .route("/claims", get(api::claims))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            gate::refresh_session::<P>,
        ))
        .with_state(state)
}

// ── Login ──────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct LoginParams {
    return_url: Option<String>,
}

async fn login<P: IdentityProvider>(
    State(state): State<AppState<P>>,
    jar: PrivateCookieJar,
    Query(params): Query<LoginParams>,
) -> Response {
    begin_authorization(&state, jar, params.return_url)
}

/// Start the authorization-code flow: park state, nonce and PKCE verifier
/// (plus the local return target) in transaction cookies and send the
/// browser to the provider.
pub(crate) fn begin_authorization<P: IdentityProvider>(
    state: &AppState<P>,
    mut jar: PrivateCookieJar,
    return_to: Option<String>,
) -> Response {
    let auth_req = state.provider.begin_authorization();

    let return_to = return_to.filter(|target| is_local_path(target));
    for cookie in cookies::txn_cookies(
        &auth_req.state,
        &auth_req.nonce,
        auth_req.code_verifier.as_deref(),
        return_to.as_deref(),
        state.settings.secure_cookies,
        &state.settings.auth_path,
    ) {
        jar = jar.add(cookie);
    }

    (jar, found(&auth_req.url)).into_response()
}

// ── Callback ───────────────────────────────────────────────────────

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

async fn callback<P: IdentityProvider>(
    State(state): State<AppState<P>>,
    jar: PrivateCookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(PrivateCookieJar, Redirect), Response> {
    let settings = &state.settings;

    if let Some(error) = &params.error {
        let desc = params
            .error_description
            .as_deref()
            .unwrap_or("Unknown error");
        tracing::warn!(error = %error, description = %desc, "provider returned an error");
        return Err(login_error(&settings.error_redirect, error));
    }

    let code = params
        .code
        .ok_or_else(|| login_error(&settings.error_redirect, "missing_code"))?;

    let received_state = params
        .state
        .ok_or_else(|| login_error(&settings.error_redirect, "state_mismatch"))?;

    let stored_state = cookies::txn_state(&jar)
        .ok_or_else(|| login_error(&settings.error_redirect, "state_mismatch"))?;

    if received_state != stored_state {
        tracing::warn!("authorization state mismatch");
        return Err(login_error(&settings.error_redirect, "state_mismatch"));
    }

    let nonce = cookies::txn_nonce(&jar)
        .ok_or_else(|| login_error(&settings.error_redirect, "missing_nonce"))?;

    let code_verifier = if state.provider.settings().use_pkce() {
        Some(
            cookies::txn_verifier(&jar)
                .ok_or_else(|| login_error(&settings.error_redirect, "missing_verifier"))?,
        )
    } else {
        None
    };

    let tokens = state
        .provider
        .exchange_code(&code, code_verifier.as_deref())
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "code exchange failed");
            login_error(&settings.error_redirect, "token_exchange_failed")
        })?;

    let raw_id_token = tokens
        .id_token
        .clone()
        .ok_or_else(|| login_error(&settings.error_redirect, "missing_id_token"))?;

    let now = OffsetDateTime::now_utc();
    let payload = id_token::validate(
        &raw_id_token,
        &state.provider.metadata().issuer,
        state.provider.settings().client_id(),
        Some(&nonce),
        now,
    )
    .map_err(|e| {
        tracing::error!(error = %e, "ID token validation failed");
        login_error(&settings.error_redirect, "invalid_id_token")
    })?;

    let mut claims = id_token::identity_claims(&payload);

    if state.provider.metadata().userinfo_endpoint.is_some() {
        let user_info = state
            .provider
            .fetch_user_info(&tokens.access_token)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "userinfo request failed");
                login_error(&settings.error_redirect, "userinfo_failed")
            })?;
        if let Some(object) = user_info.as_object() {
            claims.merge_userinfo(
                object,
                state.provider.settings().claim_mappings(),
                id_token::PROTOCOL_CLAIMS,
            );
        }
    }

    state.events.claims_received(&claims);

    let ticket = SessionTicket::mint(claims, &tokens, now);

    state.events.session_created(&ticket);

    let ticket_json = serde_json::to_string(&ticket).map_err(|e| {
        tracing::error!(error = %e, "session ticket serialization failed");
        login_error(&settings.error_redirect, "session_failed")
    })?;

    let target = cookies::txn_return(&jar)
        .filter(|t| is_local_path(t))
        .unwrap_or_else(|| settings.login_redirect.clone());

    let mut jar = jar.add(cookies::session_cookie(
        &settings.session_cookie_name,
        ticket_json,
        settings.session_ttl_days,
        settings.secure_cookies,
        settings.same_site,
    ));
    for cookie in cookies::clear_txn_cookies(&settings.auth_path) {
        jar = jar.add(cookie);
    }

    tracing::info!(session_id = %ticket.session_id, "login complete");

    Ok((jar, Redirect::to(&target)))
}

// ── Logout ─────────────────────────────────────────────────────────

async fn logout<P: IdentityProvider>(
    State(state): State<AppState<P>>,
    jar: PrivateCookieJar,
) -> Response {
    let settings = &state.settings;

    let ticket = jar
        .get(&settings.session_cookie_name)
        .and_then(|c| serde_json::from_str::<SessionTicket>(c.value()).ok());

    if let Some(ticket) = &ticket {
        tracing::info!(session_id = %ticket.session_id, "logout");
    }

    let jar = jar.remove(cookies::clear_session_cookie(&settings.session_cookie_name));

    // RP-initiated logout when the provider supports it: sign out there
    // too, passing the ID token as a hint.
    match state.provider.metadata().end_session_endpoint.clone() {
        Some(mut url) => {
            {
                let mut query = url.query_pairs_mut();
                if let Some(id_token) = ticket.as_ref().and_then(|t| t.id_token.as_deref()) {
                    query.append_pair("id_token_hint", id_token);
                }
                if let Some(target) = &state.provider.settings().post_logout_redirect_uri {
                    query.append_pair("post_logout_redirect_uri", target.as_str());
                }
            }
            (jar, found(url.as_str())).into_response()
        }
        None => (jar, Redirect::to(&settings.logout_redirect)).into_response(),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// `302 Found` toward the provider, the redirect the authorize flow
/// expects.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn login_error(error_redirect: &str, code: &str) -> Response {
    let encoded = urlencoding::encode(code);
    Redirect::to(&format!("{error_redirect}?error={encoded}")).into_response()
}

/// Only same-origin paths are allowed as post-login targets.
fn is_local_path(target: &str) -> bool {
    target.starts_with('/') && !target.starts_with("//")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_path_check_blocks_external_targets() {
        assert!(is_local_path("/"));
        assert!(is_local_path("/weather-forecast?x=1"));
        assert!(!is_local_path("//evil.example"));
        assert!(!is_local_path("https://evil.example/"));
        assert!(!is_local_path("evil"));
    }
}
