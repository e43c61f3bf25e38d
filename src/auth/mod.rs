//! Anonymous device identity.
//!
//! The flow: look for a stored session (refreshing it if expired) → if none,
//! sign in anonymously → hand the resulting [`Identity`] to writers. The
//! [`SessionBootstrap`] runs that flow once per process.

pub mod bootstrap;
pub mod client;
pub mod endpoints;
pub mod error;
pub mod responses;
pub mod session;

use async_trait::async_trait;

pub use self::bootstrap::{BootstrapState, SessionBootstrap};
pub use self::client::HttpIdentityService;
pub use self::error::AuthError;
pub use self::session::{Identity, Session, SessionStore};

/// The identity capability: one round trip per call, no retries, no caching.
#[async_trait]
pub trait IdentityService: Send + Sync {
    /// The existing valid session, if any.
    async fn get_current_session(&self) -> Result<Option<Session>, AuthError>;

    /// Issue a new anonymous session.
    async fn create_anonymous_session(&self) -> Result<Session, AuthError>;
}

/// Return the existing session or create an anonymous one.
///
/// `on_transition` observes the intermediate states (`Restoring`, then
/// `AnonymousPending` when no session exists).
pub async fn restore_or_create_session(
    service: &dyn IdentityService,
    mut on_transition: impl FnMut(BootstrapState),
) -> Result<Session, AuthError> {
    on_transition(BootstrapState::Restoring);
    if let Some(session) = service.get_current_session().await? {
        tracing::debug!(subject = %session.subject, "Restored existing session");
        return Ok(session);
    }

    on_transition(BootstrapState::AnonymousPending);
    tracing::info!("No existing session, signing in anonymously");
    service.create_anonymous_session().await
}
