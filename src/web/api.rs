use axum::Json;
use axum::extract::State;

use super::extract::CurrentUser;
use super::state::AppState;
use crate::claims::ClaimSet;
use crate::provider::IdentityProvider;
use crate::weather::DailyForecast;

/// `GET /weather-forecast`: authorization required (the gate in front
/// redirects anonymous browsers into the login flow).
///
/// In dev mode the caller's claims are dumped to the log, a debugging aid
/// the production configuration keeps off.
pub async fn weather_forecast<P: IdentityProvider>(
    State(state): State<AppState<P>>,
    user: CurrentUser,
) -> Json<Vec<DailyForecast>> {
    if state.settings.dev_mode {
        for claim in &user.claims {
            tracing::debug!(
                claim_type = %claim.claim_type,
                value = %claim.value,
                "claim seen by the weather endpoint"
            );
        }
    }

    Json(state.forecaster.forecast())
}

/// `GET /claims`: the caller's claim set in issuance order; `[]` for
/// anonymous callers.
pub async fn claims(user: Option<CurrentUser>) -> Json<ClaimSet> {
    Json(user.map(|u| u.claims).unwrap_or_default())
}
