use std::sync::Arc;

use tokio::sync::{watch, OnceCell};

use super::session::Identity;
use super::{restore_or_create_session, IdentityService};

/// Where the device identity currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapState {
    Unresolved,
    Restoring,
    AnonymousPending,
    Authenticated(Identity),
    Failed { reason: String },
}

impl BootstrapState {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            BootstrapState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    /// Whether bootstrap has finished, successfully or not.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            BootstrapState::Authenticated(_) | BootstrapState::Failed { .. }
        )
    }
}

/// Establishes the device identity once per process.
///
/// Concurrent callers of [`ensure_identity`](Self::ensure_identity) share a
/// single restore/create round trip, so a fresh device never ends up with two
/// anonymous identities. A failed bootstrap is not retried; it stays `Failed`
/// until the next launch.
pub struct SessionBootstrap {
    service: Arc<dyn IdentityService>,
    state: watch::Sender<BootstrapState>,
    resolved: OnceCell<Option<Identity>>,
}

impl std::fmt::Debug for SessionBootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBootstrap")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionBootstrap {
    pub fn new(service: Arc<dyn IdentityService>) -> Self {
        let (state, _) = watch::channel(BootstrapState::Unresolved);
        Self {
            service,
            state,
            resolved: OnceCell::new(),
        }
    }

    /// Start bootstrap, or join the one already in flight, and return the
    /// identity it produced. `None` means no identity is available.
    pub async fn ensure_identity(&self) -> Option<Identity> {
        self.resolved
            .get_or_init(|| self.resolve())
            .await
            .clone()
    }

    /// The identity, if bootstrap has already produced one. Never waits.
    pub fn current(&self) -> Option<Identity> {
        self.state.borrow().identity().cloned()
    }

    pub fn state(&self) -> BootstrapState {
        self.state.borrow().clone()
    }

    /// Observe state changes, e.g. to gate a capture button on `Authenticated`.
    pub fn subscribe(&self) -> watch::Receiver<BootstrapState> {
        self.state.subscribe()
    }

    async fn resolve(&self) -> Option<Identity> {
        let result = restore_or_create_session(self.service.as_ref(), |next| {
            self.state.send_replace(next);
        })
        .await;

        match result {
            Ok(session) => {
                let identity = session.identity();
                tracing::info!(subject = %identity.subject(), "Session established");
                self.state
                    .send_replace(BootstrapState::Authenticated(identity.clone()));
                Some(identity)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session bootstrap failed, no identity available");
                self.state.send_replace(BootstrapState::Failed {
                    reason: e.to_string(),
                });
                None
            }
        }
    }
}
