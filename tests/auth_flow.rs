//! End-to-end tests for the login, refresh and logout lifecycle, driven
//! through the real router with a scripted identity provider.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response, StatusCode, header};
use axum::routing::get;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use http_body_util::BodyExt;
use serde_json::{Value as JsonValue, json};
use time::OffsetDateTime;
use tower::ServiceExt;
use url::Url;

use oidc_weather_demo::web::gate;
use oidc_weather_demo::{
    AppState, AuthConfig, CurrentUser, Error, IdentityProvider, ProviderMetadata,
    ProviderSettings, TokenSet, app_router,
};

// ── Scripted provider ──────────────────────────────────────────────

#[derive(Clone)]
struct FakeProvider {
    inner: Arc<Inner>,
}

struct Inner {
    settings: ProviderSettings,
    metadata: ProviderMetadata,
    /// Nonce the test parsed from the authorize URL; embedded into the
    /// minted ID token like a real provider would.
    nonce: Mutex<Option<String>>,
    id_claims: Vec<(String, String)>,
    userinfo: Option<JsonValue>,
    exchange_expires_in: Option<u64>,
    reject_refresh: bool,
    refresh_calls: AtomicUsize,
}

struct FakeProviderBuilder {
    id_claims: Vec<(String, String)>,
    userinfo: Option<JsonValue>,
    end_session: bool,
    exchange_expires_in: Option<u64>,
    reject_refresh: bool,
}

impl FakeProviderBuilder {
    fn new() -> Self {
        Self {
            id_claims: vec![
                ("sub".into(), "user-1".into()),
                ("role".into(), "admin".into()),
                ("name".into(), "alice".into()),
            ],
            userinfo: None,
            end_session: false,
            exchange_expires_in: Some(3600),
            reject_refresh: false,
        }
    }

    fn id_claims(mut self, claims: &[(&str, &str)]) -> Self {
        self.id_claims = claims
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self
    }

    fn userinfo(mut self, body: JsonValue) -> Self {
        self.userinfo = Some(body);
        self
    }

    fn end_session(mut self) -> Self {
        self.end_session = true;
        self
    }

    fn expires_in(mut self, secs: u64) -> Self {
        self.exchange_expires_in = Some(secs);
        self
    }

    fn reject_refresh(mut self) -> Self {
        self.reject_refresh = true;
        self
    }

    fn build(self) -> FakeProvider {
        let settings = ProviderSettings::new(
            "https://id.example".parse().unwrap(),
            "demo-client",
            "https://app.example/authentication/callback".parse().unwrap(),
        );
        let metadata = ProviderMetadata {
            issuer: "https://id.example".into(),
            authorization_endpoint: "https://id.example/authorize".parse().unwrap(),
            token_endpoint: "https://id.example/token".parse().unwrap(),
            userinfo_endpoint: self
                .userinfo
                .is_some()
                .then(|| "https://id.example/userinfo".parse().unwrap()),
            end_session_endpoint: self
                .end_session
                .then(|| "https://id.example/logout".parse().unwrap()),
        };
        FakeProvider {
            inner: Arc::new(Inner {
                settings,
                metadata,
                nonce: Mutex::new(None),
                id_claims: self.id_claims,
                userinfo: self.userinfo,
                exchange_expires_in: self.exchange_expires_in,
                reject_refresh: self.reject_refresh,
                refresh_calls: AtomicUsize::new(0),
            }),
        }
    }
}

impl FakeProvider {
    fn set_nonce(&self, nonce: &str) {
        *self.inner.nonce.lock().unwrap() = Some(nonce.to_string());
    }

    fn refresh_calls(&self) -> usize {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }
}

impl IdentityProvider for FakeProvider {
    fn settings(&self) -> &ProviderSettings {
        &self.inner.settings
    }

    fn metadata(&self) -> &ProviderMetadata {
        &self.inner.metadata
    }

    fn exchange_code(
        &self,
        _code: &str,
        _code_verifier: Option<&str>,
    ) -> impl Future<Output = Result<TokenSet, Error>> + Send {
        let inner = self.inner.clone();
        async move {
            let mut payload = serde_json::Map::new();
            payload.insert("iss".into(), json!(inner.metadata.issuer));
            payload.insert("aud".into(), json!(inner.settings.client_id()));
            payload.insert(
                "exp".into(),
                json!(OffsetDateTime::now_utc().unix_timestamp() + 600),
            );
            if let Some(nonce) = inner.nonce.lock().unwrap().clone() {
                payload.insert("nonce".into(), json!(nonce));
            }
            for (key, value) in &inner.id_claims {
                payload.insert(key.clone(), json!(value));
            }

            Ok(TokenSet {
                access_token: "at-login".into(),
                token_type: "Bearer".into(),
                expires_in: inner.exchange_expires_in,
                refresh_token: Some("rt-login".into()),
                id_token: Some(encode_token(&JsonValue::Object(payload))),
            })
        }
    }

    fn refresh(
        &self,
        _refresh_token: &str,
    ) -> impl Future<Output = Result<TokenSet, Error>> + Send {
        let inner = self.inner.clone();
        async move {
            inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
            if inner.reject_refresh {
                return Err(Error::Provider {
                    operation: "token refresh",
                    status: Some(400),
                    detail: "invalid_grant".into(),
                });
            }
            Ok(TokenSet {
                access_token: "at-refreshed".into(),
                token_type: "Bearer".into(),
                expires_in: Some(3600),
                refresh_token: Some("rt-refreshed".into()),
                id_token: None,
            })
        }
    }

    fn fetch_user_info(
        &self,
        _access_token: &str,
    ) -> impl Future<Output = Result<JsonValue, Error>> + Send {
        let inner = self.inner.clone();
        async move { Ok(inner.userinfo.clone().unwrap_or_else(|| json!({}))) }
    }
}

fn encode_token(payload: &JsonValue) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
    format!("{header}.{body}.sig")
}

// ── Harness helpers ────────────────────────────────────────────────

fn test_app(fake: FakeProvider) -> Router {
    app_router(AppState::new(fake, AuthConfig::new().with_secure_cookies(false)))
}

async fn send(app: &Router, uri: &str, cookie: Option<&str>) -> Response<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    app.clone()
        .oneshot(builder.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_string(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect must carry a Location header")
        .to_str()
        .unwrap()
        .to_string()
}

fn set_cookie_pairs(response: &Response<Body>) -> Vec<(String, String)> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| {
            let first = value.to_str().unwrap().split(';').next().unwrap();
            let (name, value) = first.split_once('=').unwrap();
            (name.to_string(), value.to_string())
        })
        .collect()
}

fn cookie_header(response: &Response<Body>) -> String {
    set_cookie_pairs(response)
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join("; ")
}

fn session_cookie(response: &Response<Body>) -> Option<String> {
    set_cookie_pairs(response)
        .into_iter()
        .find(|(name, value)| name == "__oidc_session" && !value.is_empty())
        .map(|(name, value)| format!("{name}={value}"))
}

fn clears_session_cookie(response: &Response<Body>) -> bool {
    set_cookie_pairs(response)
        .iter()
        .any(|(name, value)| name == "__oidc_session" && value.is_empty())
}

fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .unwrap()
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

/// Drive the full login flow and return the session cookie.
async fn login(app: &Router, fake: &FakeProvider) -> String {
    let response = send(app, "/authentication/login", None).await;
    assert_eq!(response.status(), StatusCode::FOUND);

    let authorize_url = location(&response);
    let state = query_param(&authorize_url, "state").expect("state in authorize URL");
    fake.set_nonce(&query_param(&authorize_url, "nonce").expect("nonce in authorize URL"));
    let txn_cookies = cookie_header(&response);

    let callback_uri = format!("/authentication/callback?code=fake-code&state={state}");
    let response = send(app, &callback_uri, Some(&txn_cookies)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER, "callback should redirect");

    session_cookie(&response).expect("callback should set a session cookie")
}

// ── Lifecycle tests ────────────────────────────────────────────────

#[tokio::test]
async fn unauthenticated_weather_request_is_redirected_into_login() {
    let app = test_app(FakeProviderBuilder::new().build());

    let response = send(&app, "/weather-forecast", None).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with("https://id.example/authorize?"));
    assert!(target.contains("client_id=demo-client"));
    assert!(target.contains("code_challenge="));
    assert!(target.contains("code_challenge_method=S256"));
    assert!(query_param(&target, "state").is_some());
    assert!(query_param(&target, "nonce").is_some());
}

#[tokio::test]
async fn unauthenticated_claims_request_returns_empty_set() {
    let app = test_app(FakeProviderBuilder::new().build());

    let response = send(&app, "/claims", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, "[]");
}

#[tokio::test]
async fn login_mints_a_session_and_claims_keep_issuance_order() {
    let fake = FakeProviderBuilder::new()
        .id_claims(&[("role", "admin"), ("name", "alice")])
        .build();
    let app = test_app(fake.clone());

    let session = login(&app, &fake).await;

    let response = send(&app, "/claims", Some(&session)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_string(response).await,
        r#"[{"type":"role","value":"admin"},{"type":"name","value":"alice"}]"#
    );
}

#[tokio::test]
async fn gated_login_returns_to_the_originally_requested_url() {
    let fake = FakeProviderBuilder::new().build();
    let app = test_app(fake.clone());

    let challenge = send(&app, "/weather-forecast", None).await;
    assert_eq!(challenge.status(), StatusCode::FOUND);

    let authorize_url = location(&challenge);
    let state = query_param(&authorize_url, "state").unwrap();
    fake.set_nonce(&query_param(&authorize_url, "nonce").unwrap());
    let txn_cookies = cookie_header(&challenge);

    let callback_uri = format!("/authentication/callback?code=fake-code&state={state}");
    let response = send(&app, &callback_uri, Some(&txn_cookies)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/weather-forecast");
    assert!(session_cookie(&response).is_some());
}

#[tokio::test]
async fn userinfo_claims_are_merged_without_overriding_the_id_token() {
    let fake = FakeProviderBuilder::new()
        .id_claims(&[("sub", "user-1"), ("name", "alice")])
        .userinfo(json!({
            "sub": "user-1",
            "role": ["admin", "ops"],
            "email": "alice@example.com",
        }))
        .build();
    let app = test_app(fake.clone());

    let session = login(&app, &fake).await;

    let response = send(&app, "/claims", Some(&session)).await;
    let claims: Vec<JsonValue> = serde_json::from_str(&body_string(response).await).unwrap();
    let pairs: Vec<(String, String)> = claims
        .iter()
        .map(|c| {
            (
                c["type"].as_str().unwrap().to_string(),
                c["value"].as_str().unwrap().to_string(),
            )
        })
        .collect();

    assert_eq!(
        pairs,
        vec![
            ("sub".into(), "user-1".into()),
            ("name".into(), "alice".into()),
            ("role".into(), "admin".into()),
            ("role".into(), "ops".into()),
            ("email".into(), "alice@example.com".into()),
        ]
    );
}

#[tokio::test]
async fn authenticated_weather_request_returns_the_forecast() {
    let fake = FakeProviderBuilder::new().build();
    let app = test_app(fake.clone());

    let session = login(&app, &fake).await;

    let response = send(&app, "/weather-forecast", Some(&session)).await;
    assert_eq!(response.status(), StatusCode::OK);

    let forecast: Vec<JsonValue> = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(forecast.len(), 5);
    for day in &forecast {
        assert!(day["date"].is_string());
        assert!(day["temperatureC"].is_i64());
        assert!(day["summary"].is_string());
    }
    assert_eq!(fake.refresh_calls(), 0, "an unexpired session never hits the provider");
}

// ── Refresh lifecycle ──────────────────────────────────────────────

#[tokio::test]
async fn expired_access_token_is_refreshed_exactly_once_with_claims_intact() {
    let fake = FakeProviderBuilder::new()
        .id_claims(&[("role", "admin"), ("name", "alice")])
        .expires_in(0)
        .build();
    let app = test_app(fake.clone());

    let stale_session = login(&app, &fake).await;

    // First authenticated request: the access token is already expired,
    // so the coordinator refreshes and a new cookie is issued.
    let response = send(&app, "/weather-forecast", Some(&stale_session)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fake.refresh_calls(), 1);
    let fresh_session = session_cookie(&response).expect("refresh should re-issue the cookie");
    assert_ne!(fresh_session, stale_session);

    // The refreshed session carries the exact same identity.
    let response = send(&app, "/claims", Some(&fresh_session)).await;
    assert_eq!(
        body_string(response).await,
        r#"[{"type":"role","value":"admin"},{"type":"name","value":"alice"}]"#
    );

    // And the fresh cookie does not trigger further provider calls.
    let response = send(&app, "/weather-forecast", Some(&fresh_session)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(session_cookie(&response).is_none(), "no re-issue without a refresh");
    assert_eq!(fake.refresh_calls(), 1);
}

#[tokio::test]
async fn straggler_with_the_stale_cookie_adopts_the_refreshed_session() {
    let fake = FakeProviderBuilder::new().expires_in(0).build();
    let app = test_app(fake.clone());

    let stale_session = login(&app, &fake).await;

    let first = send(&app, "/weather-forecast", Some(&stale_session)).await;
    assert_eq!(first.status(), StatusCode::OK);

    // Same stale cookie again: the coordinator hands out the cached
    // outcome instead of refreshing twice.
    let second = send(&app, "/weather-forecast", Some(&stale_session)).await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(fake.refresh_calls(), 1);
}

#[tokio::test]
async fn rejected_refresh_token_forces_reauthentication() {
    let fake = FakeProviderBuilder::new().expires_in(0).reject_refresh().build();
    let app = test_app(fake.clone());

    let session = login(&app, &fake).await;

    let response = send(&app, "/weather-forecast", Some(&session)).await;

    // Session is gone: the cookie is cleared and the browser is sent back
    // into the login flow instead of getting a stale-claims payload.
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(location(&response).starts_with("https://id.example/authorize?"));
    assert!(clears_session_cookie(&response));
    assert_eq!(fake.refresh_calls(), 1);
}

// ── Callback failure handling ──────────────────────────────────────

#[tokio::test]
async fn provider_error_on_callback_redirects_without_a_session() {
    let app = test_app(FakeProviderBuilder::new().build());

    let response = send(
        &app,
        "/authentication/callback?error=access_denied&error_description=nope",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?error=access_denied");
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn state_mismatch_on_callback_is_rejected() {
    let fake = FakeProviderBuilder::new().build();
    let app = test_app(fake.clone());

    let response = send(&app, "/authentication/login", None).await;
    let authorize_url = location(&response);
    fake.set_nonce(&query_param(&authorize_url, "nonce").unwrap());
    let txn_cookies = cookie_header(&response);

    let response = send(
        &app,
        "/authentication/callback?code=fake-code&state=forged",
        Some(&txn_cookies),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?error=state_mismatch");
    assert!(session_cookie(&response).is_none());
}

#[tokio::test]
async fn callback_without_transaction_cookies_is_rejected() {
    let app = test_app(FakeProviderBuilder::new().build());

    let response = send(
        &app,
        "/authentication/callback?code=fake-code&state=whatever",
        None,
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/?error=state_mismatch");
    assert!(session_cookie(&response).is_none());
}

// ── Logout ─────────────────────────────────────────────────────────

#[tokio::test]
async fn logout_clears_the_session_and_signs_out_at_the_provider() {
    let fake = FakeProviderBuilder::new().end_session().build();
    let app = test_app(fake.clone());

    let session = login(&app, &fake).await;

    let response = send(&app, "/authentication/logout", Some(&session)).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let target = location(&response);
    assert!(target.starts_with("https://id.example/logout?"));
    assert!(query_param(&target, "id_token_hint").is_some());
    assert!(clears_session_cookie(&response));

    // The cleared browser is anonymous again.
    let response = send(&app, "/claims", None).await;
    assert_eq!(body_string(response).await, "[]");
}

#[tokio::test]
async fn logout_without_end_session_endpoint_redirects_locally() {
    let fake = FakeProviderBuilder::new().build();
    let app = test_app(fake.clone());

    let session = login(&app, &fake).await;

    let response = send(&app, "/authentication/logout", Some(&session)).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert!(clears_session_cookie(&response));
}

// ── API-style gate ─────────────────────────────────────────────────

#[tokio::test]
async fn api_gate_answers_401_instead_of_redirecting() {
    let fake = FakeProviderBuilder::new().build();
    let state = AppState::new(fake.clone(), AuthConfig::new().with_secure_cookies(false));

    // A bare API surface: same refresh middleware, 401 challenge.
    let app: Router = Router::new()
        .route(
            "/whoami",
            get(|user: CurrentUser| async move {
                user.claims.get("name").unwrap_or("unknown").to_string()
            }),
        )
        .layer(axum::middleware::from_fn(gate::require_session_api))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            gate::refresh_session::<FakeProvider>,
        ))
        .with_state(state);

    let response = send(&app, "/whoami", None).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
