use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use time::{Duration, OffsetDateTime};

use super::{SessionId, SessionTicket};
use crate::error::Error;
use crate::provider::IdentityProvider;

/// Slots older than this are dropped during pruning.
const SLOT_TTL: Duration = Duration::minutes(10);
/// Pruning kicks in once the slot map reaches this size.
const PRUNE_THRESHOLD: usize = 256;

/// Outcome of driving a session through the refresh coordinator.
#[derive(Debug)]
pub enum RefreshOutcome {
    /// The session holds a usable token set: either it was never stale,
    /// the provider refreshed it, or a concurrent request already did.
    Refreshed(SessionTicket),
    /// The provider rejected the refresh token; the session is dead and
    /// the cookie must be cleared.
    Invalidated,
    /// The provider could not be reached. Terminal for this request, but
    /// the session is left untouched and a later request may retry.
    Unavailable(Error),
}

/// Serializes token refreshes per session.
///
/// Concurrent requests carrying the same stale ticket would each call the
/// provider; the coordinator funnels them through a per-session slot so
/// exactly one effective refresh happens and the rest adopt its outcome.
/// Distinct sessions never contend.
#[derive(Default)]
pub struct RefreshCoordinator {
    slots: Mutex<HashMap<SessionId, Arc<Slot>>>,
}

#[derive(Default)]
struct Slot {
    gate: tokio::sync::Mutex<Option<SlotOutcome>>,
    touched: AtomicI64,
}

enum SlotOutcome {
    Refreshed(SessionTicket),
    Invalidated,
}

impl RefreshCoordinator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bring `ticket` up to date, calling the provider at most once per
    /// session no matter how many requests race here.
    ///
    /// The read-expiry / decide-refresh / write-tokens sequence runs under
    /// the session's slot lock, so it is atomic per session.
    pub async fn refresh_session<P: IdentityProvider>(
        &self,
        provider: &P,
        ticket: &SessionTicket,
        margin: Duration,
        now: OffsetDateTime,
    ) -> RefreshOutcome {
        if !ticket.is_access_expired(margin, now) {
            return RefreshOutcome::Refreshed(ticket.clone());
        }

        let slot = self.slot(&ticket.session_id, now);
        let mut outcome = slot.gate.lock().await;

        // A concurrent request may have settled the session while we
        // waited on the lock.
        match &*outcome {
            Some(SlotOutcome::Invalidated) => return RefreshOutcome::Invalidated,
            Some(SlotOutcome::Refreshed(fresh)) if !fresh.is_access_expired(margin, now) => {
                return RefreshOutcome::Refreshed(fresh.clone());
            }
            _ => {}
        }

        // The newest ticket wins: a previously refreshed one carries the
        // current refresh token if the provider rotates them.
        let base = match &*outcome {
            Some(SlotOutcome::Refreshed(fresh)) => fresh.clone(),
            _ => ticket.clone(),
        };

        let Some(refresh_token) = base.refresh_token.clone() else {
            *outcome = Some(SlotOutcome::Invalidated);
            return RefreshOutcome::Invalidated;
        };

        match provider.refresh(&refresh_token).await {
            Ok(tokens) => {
                let fresh = base.refreshed(tokens, now);
                tracing::debug!(session_id = %fresh.session_id, "access token refreshed");
                *outcome = Some(SlotOutcome::Refreshed(fresh.clone()));
                RefreshOutcome::Refreshed(fresh)
            }
            Err(err @ Error::Provider { .. }) => {
                tracing::info!(
                    session_id = %base.session_id,
                    error = %err,
                    "refresh token rejected, session invalidated"
                );
                *outcome = Some(SlotOutcome::Invalidated);
                RefreshOutcome::Invalidated
            }
            Err(err) => RefreshOutcome::Unavailable(err),
        }
    }

    fn slot(&self, session_id: &SessionId, now: OffsetDateTime) -> Arc<Slot> {
        let mut slots = self.slots.lock().expect("refresh slot map poisoned");

        if slots.len() >= PRUNE_THRESHOLD {
            let horizon = (now - SLOT_TTL).unix_timestamp();
            slots.retain(|_, slot| slot.touched.load(Ordering::Relaxed) >= horizon);
        }

        let slot = slots
            .entry(session_id.clone())
            .or_insert_with(|| Arc::new(Slot::default()))
            .clone();
        slot.touched.store(now.unix_timestamp(), Ordering::Relaxed);
        slot
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap().len()
    }
}
