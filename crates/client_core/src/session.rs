//! Scoped auth session: bearer credential plus the resolved user profile.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{
    domain::{Role, UserId},
    protocol::UserProfile,
};
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

use crate::{
    credential::{token_snippet, CredentialStore},
    error::ClientError,
};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// `init` has not finished yet; views must not fire authenticated fetches.
    Pending,
    Unauthenticated,
    Authenticated {
        token: String,
        profile: UserProfile,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    CredentialRejected,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn { user_id: UserId },
    ProfileUpdated { profile: UserProfile },
    /// Front-ends route to the login view on this event.
    LoggedOut { reason: LogoutReason },
}

#[async_trait]
pub trait ProfileSource: Send + Sync {
    async fn fetch_profile(&self, token: &str) -> Result<UserProfile, ClientError>;
}

pub struct Session {
    store: Arc<dyn CredentialStore>,
    state: RwLock<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    pub fn new(store: Arc<dyn CredentialStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            store,
            state: RwLock::new(SessionState::Pending),
            events,
        })
    }

    /// Resolves a stored credential into a full profile before reporting
    /// ready. A rejected credential is wiped. An unreachable or failing
    /// backend leaves it stored and returns the error.
    pub async fn init(&self, source: &dyn ProfileSource) -> Result<SessionState, ClientError> {
        let stored = self.store.load().await.map_err(ClientError::Credential)?;
        let Some(token) = stored else {
            *self.state.write().await = SessionState::Unauthenticated;
            return Ok(SessionState::Unauthenticated);
        };

        match source.fetch_profile(&token).await {
            Ok(profile) => {
                info!(
                    user_id = profile.user_id.0,
                    token = %token_snippet(&token),
                    "session: restored stored credential"
                );
                let user_id = profile.user_id;
                let state = SessionState::Authenticated { token, profile };
                *self.state.write().await = state.clone();
                let _ = self.events.send(SessionEvent::LoggedIn { user_id });
                Ok(state)
            }
            Err(err @ (ClientError::Network(_) | ClientError::Http { .. })) => {
                warn!("session: could not resolve stored credential: {err}");
                *self.state.write().await = SessionState::Unauthenticated;
                Err(err)
            }
            Err(err) => {
                warn!("session: stored credential rejected: {err}");
                self.logout(LogoutReason::CredentialRejected).await;
                Ok(SessionState::Unauthenticated)
            }
        }
    }

    pub(crate) async fn establish(
        &self,
        token: String,
        profile: UserProfile,
    ) -> Result<(), ClientError> {
        self.store
            .save(&token)
            .await
            .map_err(ClientError::Credential)?;
        let user_id = profile.user_id;
        info!(
            user_id = user_id.0,
            token = %token_snippet(&token),
            "session: logged in"
        );
        *self.state.write().await = SessionState::Authenticated { token, profile };
        let _ = self.events.send(SessionEvent::LoggedIn { user_id });
        Ok(())
    }

    /// Teardown. Always clears the stored credential; emits `LoggedOut`
    /// unless the session was already unauthenticated.
    pub async fn logout(&self, reason: LogoutReason) {
        if let Err(err) = self.store.clear().await {
            warn!("session: failed to clear stored credential: {err:#}");
        }
        let previous = {
            let mut guard = self.state.write().await;
            std::mem::replace(&mut *guard, SessionState::Unauthenticated)
        };
        if previous != SessionState::Unauthenticated {
            info!(?reason, "session: logged out");
            let _ = self.events.send(SessionEvent::LoggedOut { reason });
        }
    }

    pub(crate) async fn replace_profile(&self, profile: UserProfile) {
        let mut guard = self.state.write().await;
        if let SessionState::Authenticated {
            profile: current, ..
        } = &mut *guard
        {
            *current = profile.clone();
            let _ = self.events.send(SessionEvent::ProfileUpdated { profile });
        }
    }

    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(
            *self.state.read().await,
            SessionState::Authenticated { .. }
        )
    }

    pub async fn token(&self) -> Option<String> {
        match &*self.state.read().await {
            SessionState::Authenticated { token, .. } => Some(token.clone()),
            _ => None,
        }
    }

    pub async fn profile(&self) -> Option<UserProfile> {
        match &*self.state.read().await {
            SessionState::Authenticated { profile, .. } => Some(profile.clone()),
            _ => None,
        }
    }

    /// Profile of the logged-in user, failing unless it holds `role`.
    pub async fn require_role(&self, role: Role) -> Result<UserProfile, ClientError> {
        let profile = self.profile().await.ok_or(ClientError::NotAuthenticated)?;
        if profile.role != role {
            return Err(ClientError::PermissionDenied { required: role });
        }
        Ok(profile)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
