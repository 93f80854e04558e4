//! Cookie-held session state and the token refresh coordinator.

mod refresh;
mod ticket;

pub use refresh::{RefreshCoordinator, RefreshOutcome};
pub use ticket::SessionTicket;

use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Opaque session identifier, minted once per login (ULID format).
///
/// Keys the refresh coordinator's per-session serialization; never reused
/// across logins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl SessionId {
    pub(crate) fn mint() -> Self {
        Self(Ulid::new().to_string())
    }
}
