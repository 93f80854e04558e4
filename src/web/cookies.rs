use axum_extra::extract::PrivateCookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

const STATE_COOKIE_NAME: &str = "__oidc_state";
const NONCE_COOKIE_NAME: &str = "__oidc_nonce";
const VERIFIER_COOKIE_NAME: &str = "__oidc_verifier";
const RETURN_COOKIE_NAME: &str = "__oidc_return";

/// Lifetime of the login-transaction cookies; a login round-trip through
/// the provider has to finish within it.
const TXN_TTL: Duration = Duration::minutes(5);

fn txn_cookie(name: &'static str, value: String, secure: bool, auth_path: &str) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path(auth_path.to_string())
        .max_age(TXN_TTL)
        .build()
}

/// Create the login-transaction cookies: state and nonce always, the PKCE
/// verifier and return-to target when present.
pub(crate) fn txn_cookies(
    state: &str,
    nonce: &str,
    code_verifier: Option<&str>,
    return_to: Option<&str>,
    secure: bool,
    auth_path: &str,
) -> Vec<Cookie<'static>> {
    let mut cookies = vec![
        txn_cookie(STATE_COOKIE_NAME, state.to_string(), secure, auth_path),
        txn_cookie(NONCE_COOKIE_NAME, nonce.to_string(), secure, auth_path),
    ];
    if let Some(verifier) = code_verifier {
        cookies.push(txn_cookie(
            VERIFIER_COOKIE_NAME,
            verifier.to_string(),
            secure,
            auth_path,
        ));
    }
    if let Some(target) = return_to {
        cookies.push(txn_cookie(
            RETURN_COOKIE_NAME,
            target.to_string(),
            secure,
            auth_path,
        ));
    }
    cookies
}

/// Create removal cookies for every login-transaction cookie.
pub(crate) fn clear_txn_cookies(auth_path: &str) -> Vec<Cookie<'static>> {
    [
        STATE_COOKIE_NAME,
        NONCE_COOKIE_NAME,
        VERIFIER_COOKIE_NAME,
        RETURN_COOKIE_NAME,
    ]
    .into_iter()
    .map(|name| {
        Cookie::build((name, ""))
            .path(auth_path.to_string())
            .max_age(Duration::ZERO)
            .build()
    })
    .collect()
}

/// Create the session cookie holding the serialized ticket.
pub(crate) fn session_cookie(
    name: &str,
    ticket_json: String,
    ttl_days: i64,
    secure: bool,
    same_site: SameSite,
) -> Cookie<'static> {
    Cookie::build((name.to_string(), ticket_json))
        .http_only(true)
        .secure(secure)
        .same_site(same_site)
        .path("/".to_string())
        .max_age(Duration::days(ttl_days))
        .build()
}

/// Create removal cookie for the session.
pub(crate) fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_string(), ""))
        .path("/".to_string())
        .max_age(Duration::ZERO)
        .build()
}

/// Get the parked state from cookies.
pub(crate) fn txn_state(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(STATE_COOKIE_NAME).map(|c| c.value().to_string())
}

/// Get the parked nonce from cookies.
pub(crate) fn txn_nonce(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(NONCE_COOKIE_NAME).map(|c| c.value().to_string())
}

/// Get the parked PKCE verifier from cookies.
pub(crate) fn txn_verifier(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(VERIFIER_COOKIE_NAME).map(|c| c.value().to_string())
}

/// Get the parked return-to target from cookies.
pub(crate) fn txn_return(jar: &PrivateCookieJar) -> Option<String> {
    jar.get(RETURN_COOKIE_NAME).map(|c| c.value().to_string())
}
