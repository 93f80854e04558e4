use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

use super::SessionId;
use crate::claims::ClaimSet;
use crate::provider::TokenSet;

/// Access-token lifetime assumed when the provider omits `expires_in`.
const DEFAULT_ACCESS_TTL: Duration = Duration::minutes(5);

/// The authenticated session, as carried (encrypted) inside the session
/// cookie.
///
/// The browser owns this state; the server reads it transiently per
/// request and writes it back only when tokens move. Claims are fixed at
/// login: [`SessionTicket::refreshed`] swaps tokens and expiry, nothing
/// else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTicket {
    pub session_id: SessionId,
    pub claims: ClaimSet,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    #[serde(with = "time::serde::timestamp")]
    pub expires_at: OffsetDateTime,
    #[serde(with = "time::serde::timestamp")]
    pub created_at: OffsetDateTime,
}

impl SessionTicket {
    /// Mint a ticket for a fresh login.
    #[must_use]
    pub fn mint(claims: ClaimSet, tokens: &TokenSet, now: OffsetDateTime) -> Self {
        Self {
            session_id: SessionId::mint(),
            claims,
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            id_token: tokens.id_token.clone(),
            expires_at: now + access_ttl(tokens),
            created_at: now,
        }
    }

    /// The same session with a new token bundle. Tokens the provider did
    /// not rotate are kept; claims, session id and creation time are
    /// untouched.
    #[must_use]
    pub fn refreshed(&self, tokens: TokenSet, now: OffsetDateTime) -> Self {
        let expires_at = now + access_ttl(&tokens);
        Self {
            session_id: self.session_id.clone(),
            claims: self.claims.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.or_else(|| self.refresh_token.clone()),
            id_token: tokens.id_token.or_else(|| self.id_token.clone()),
            expires_at,
            created_at: self.created_at,
        }
    }

    /// Whether the access token is expired, or will be within `margin`.
    #[must_use]
    pub fn is_access_expired(&self, margin: Duration, now: OffsetDateTime) -> bool {
        now + margin >= self.expires_at
    }
}

fn access_ttl(tokens: &TokenSet) -> Duration {
    tokens
        .expires_in
        .map_or(DEFAULT_ACCESS_TTL, |secs| Duration::seconds(secs as i64))
}
