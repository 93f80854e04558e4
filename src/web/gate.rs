use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum_extra::extract::PrivateCookieJar;
use time::OffsetDateTime;

use super::cookies;
use super::error::AuthError;
use super::extract::CurrentUser;
use super::routes;
use super::state::AppState;
use crate::provider::IdentityProvider;
use crate::session::{RefreshOutcome, SessionTicket};

/// Session middleware: decodes the session cookie, silently refreshes the
/// access token through the coordinator when it is (nearly) expired, and
/// attaches [`CurrentUser`] to the request.
///
/// Requests without a session pass through unauthenticated; the gates
/// downstream decide what that means per route. A session whose refresh
/// token the provider rejected is cleared here, so the next gate hit
/// re-triggers login.
pub async fn refresh_session<P: IdentityProvider>(
    State(state): State<AppState<P>>,
    jar: PrivateCookieJar,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(cookie) = jar.get(&state.settings.session_cookie_name) else {
        return next.run(req).await;
    };

    let Ok(ticket) = serde_json::from_str::<SessionTicket>(cookie.value()) else {
        tracing::warn!("unreadable session cookie, clearing it");
        let jar = jar.remove(cookies::clear_session_cookie(
            &state.settings.session_cookie_name,
        ));
        let response = next.run(req).await;
        return (jar, response).into_response();
    };

    let now = OffsetDateTime::now_utc();
    if !ticket.is_access_expired(state.settings.refresh_margin, now) {
        attach_user(&mut req, &ticket);
        return next.run(req).await;
    }

    let outcome = state
        .refresh
        .refresh_session(
            state.provider.as_ref(),
            &ticket,
            state.settings.refresh_margin,
            now,
        )
        .await;

    match outcome {
        RefreshOutcome::Refreshed(fresh) => {
            attach_user(&mut req, &fresh);
            match serde_json::to_string(&fresh) {
                Ok(json) => {
                    let jar = jar.add(cookies::session_cookie(
                        &state.settings.session_cookie_name,
                        json,
                        state.settings.session_ttl_days,
                        state.settings.secure_cookies,
                        state.settings.same_site,
                    ));
                    let response = next.run(req).await;
                    (jar, response).into_response()
                }
                Err(err) => {
                    // The request still has a valid in-memory session; the
                    // stale cookie will be refreshed again next time.
                    tracing::error!(error = %err, "session ticket serialization failed");
                    next.run(req).await
                }
            }
        }
        RefreshOutcome::Invalidated => {
            let jar = jar.remove(cookies::clear_session_cookie(
                &state.settings.session_cookie_name,
            ));
            let response = next.run(req).await;
            (jar, response).into_response()
        }
        RefreshOutcome::Unavailable(err) => {
            tracing::warn!(error = %err, "token refresh unavailable, treating request as unauthenticated");
            next.run(req).await
        }
    }
}

/// UI-style authorization gate: an unauthenticated request is sent
/// straight into the provider login flow, returning here afterwards.
pub async fn require_session_redirect<P: IdentityProvider>(
    State(state): State<AppState<P>>,
    jar: PrivateCookieJar,
    req: Request,
    next: Next,
) -> Response {
    if req.extensions().get::<CurrentUser>().is_some() {
        return next.run(req).await;
    }

    let return_to = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string());
    routes::begin_authorization(&state, jar, return_to)
}

/// API-style authorization gate: an unauthenticated request gets a bare
/// `401` challenge instead of a redirect.
pub async fn require_session_api(req: Request, next: Next) -> Response {
    if req.extensions().get::<CurrentUser>().is_some() {
        next.run(req).await
    } else {
        AuthError::Unauthenticated.into_response()
    }
}

fn attach_user(req: &mut Request, ticket: &SessionTicket) {
    req.extensions_mut().insert(CurrentUser {
        session_id: ticket.session_id.clone(),
        claims: ticket.claims.clone(),
    });
}
