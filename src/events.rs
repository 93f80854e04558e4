use crate::claims::ClaimSet;
use crate::session::SessionTicket;

type ClaimsHook = Box<dyn Fn(&ClaimSet) + Send + Sync>;
type SessionHook = Box<dyn Fn(&SessionTicket) + Send + Sync>;

/// Named lifecycle callbacks, invoked synchronously at two well-defined
/// points of the login flow: after the merged claim set is assembled, and
/// after the session ticket is minted.
///
/// Debugging aid only: no behavior depends on them, and both default to
/// no-ops.
#[derive(Default)]
pub struct SessionEvents {
    on_claims_received: Option<ClaimsHook>,
    on_session_created: Option<SessionHook>,
}

impl SessionEvents {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_on_claims_received(
        mut self,
        hook: impl Fn(&ClaimSet) + Send + Sync + 'static,
    ) -> Self {
        self.on_claims_received = Some(Box::new(hook));
        self
    }

    #[must_use]
    pub fn with_on_session_created(
        mut self,
        hook: impl Fn(&SessionTicket) + Send + Sync + 'static,
    ) -> Self {
        self.on_session_created = Some(Box::new(hook));
        self
    }

    pub(crate) fn claims_received(&self, claims: &ClaimSet) {
        if let Some(hook) = &self.on_claims_received {
            hook(claims);
        }
    }

    pub(crate) fn session_created(&self, ticket: &SessionTicket) {
        if let Some(hook) = &self.on_session_created {
            hook(ticket);
        }
    }
}
