//! Login and registration.
//!
//! Produces the [`SessionCredentials`] a [`SessionController`] starts from
//! and persists them, so the next run can resume via
//! [`StoredSession::load`].
//!
//! [`SessionController`]: crate::session::SessionController
//! [`StoredSession::load`]: crate::credentials::StoredSession::load

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::SessionConfig;
use crate::credentials::{
    CredentialStore, SessionCredentials, SetOptions, AUTH_HOST_KEY, AUTH_TOKEN_KEY,
};
use crate::error::GatewayError;
use crate::gateway::{Operation, RemoteGateway};
use crate::outcome::Failure;
use crate::session::{InFlightGuard, LogoutReason};
use crate::types::HostId;

/// Result of a login or registration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    LoggedIn(SessionCredentials),
    /// The backend refused; the reason is what the login screen shows
    Rejected(LogoutReason),
    /// Another request of this flow is still running
    Busy,
}

/// Login screen logic.
///
/// Only one request runs at a time; a second one while the first is in
/// flight is answered with [`LoginOutcome::Busy`] without contacting the
/// backend.
pub struct LoginFlow {
    gateway: Arc<dyn RemoteGateway>,
    credentials: Arc<dyn CredentialStore>,
    config: SessionConfig,
    busy: AtomicBool,
}

impl LoginFlow {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        credentials: Arc<dyn CredentialStore>,
        config: SessionConfig,
    ) -> Self {
        Self {
            gateway,
            credentials,
            config,
            busy: AtomicBool::new(false),
        }
    }

    /// Log in as an existing host.
    pub async fn login(&self, host: HostId) -> Result<LoginOutcome, GatewayError> {
        let Some(_guard) = InFlightGuard::acquire(&self.busy) else {
            return Ok(LoginOutcome::Busy);
        };
        self.remember_host(host);
        self.login_unguarded(host).await
    }

    /// Create a new host, then log in as it.
    pub async fn register(&self) -> Result<LoginOutcome, GatewayError> {
        let Some(_guard) = InFlightGuard::acquire(&self.busy) else {
            return Ok(LoginOutcome::Busy);
        };

        let profile = match self.gateway.register().await?.into_result() {
            Ok(profile) => profile,
            Err(failure) => return Ok(self.rejected(Operation::Register, failure)),
        };

        let host = profile.host_id();
        info!(host = %host, "Registered new host");
        self.remember_host(host);
        self.login_unguarded(host).await
    }

    async fn login_unguarded(&self, host: HostId) -> Result<LoginOutcome, GatewayError> {
        let token = match self.gateway.login(host).await?.into_result() {
            Ok(token) => token,
            Err(failure) => return Ok(self.rejected(Operation::Login, failure)),
        };

        let options = SetOptions::expiring_in(self.config.token_expiry_days);
        if let Err(e) = self.credentials.set(AUTH_TOKEN_KEY, token.as_str(), options) {
            warn!(host = %host, error = %e, "Failed to persist token");
        }

        info!(host = %host, "Logged in");
        Ok(LoginOutcome::LoggedIn(SessionCredentials {
            host_id: host,
            token,
        }))
    }

    /// The host id is kept even when login fails, so it can be prefilled.
    fn remember_host(&self, host: HostId) {
        if let Err(e) = self
            .credentials
            .set(AUTH_HOST_KEY, &host.to_string(), SetOptions::default())
        {
            warn!(host = %host, error = %e, "Failed to persist host id");
        }
    }

    fn rejected(&self, operation: Operation, failure: Failure) -> LoginOutcome {
        let reason = LogoutReason::from_failure(failure);
        info!(operation = %operation, reason = %reason, "Login rejected");
        LoginOutcome::Rejected(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{MemoryCredentialStore, StoredSession};
    use crate::gateway::fake::{FakeGateway, DEMO_HOST};
    use crate::types::Service;

    fn flow(gateway: Arc<FakeGateway>) -> (LoginFlow, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let flow = LoginFlow::new(gateway, store.clone(), SessionConfig::default());
        (flow, store)
    }

    #[tokio::test]
    async fn test_login_persists_credentials() {
        let (flow, store) = flow(Arc::new(FakeGateway::demo()));
        let host: HostId = DEMO_HOST.parse().unwrap();

        let LoginOutcome::LoggedIn(credentials) = flow.login(host).await.unwrap() else {
            panic!("expected login to succeed");
        };
        assert_eq!(credentials.host_id, host);

        let stored = StoredSession::load(store.as_ref()).unwrap().unwrap();
        assert_eq!(stored.host_id, host);
        assert_eq!(stored.token, Some(credentials.token));
        assert!(store.expires_at(AUTH_TOKEN_KEY).is_some());
        assert!(store.expires_at(AUTH_HOST_KEY).is_none());
    }

    #[tokio::test]
    async fn test_unknown_host_is_auth_error() {
        let (flow, store) = flow(Arc::new(FakeGateway::demo()));
        let outcome = flow.login(HostId::random()).await.unwrap();
        assert_eq!(outcome, LoginOutcome::Rejected(LogoutReason::AuthError));

        let stored = StoredSession::load(store.as_ref()).unwrap().unwrap();
        assert!(stored.token.is_none());
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let gateway = Arc::new(FakeGateway::new());
        let (flow, _store) = flow(gateway.clone());

        let LoginOutcome::LoggedIn(credentials) = flow.register().await.unwrap() else {
            panic!("expected registration to log in");
        };
        assert!(gateway.profile(credentials.host_id).await.is_some());
        assert_eq!(gateway.call_count(Operation::Login).await, 1);
    }

    #[tokio::test]
    async fn test_register_service_down() {
        let gateway = Arc::new(FakeGateway::new());
        gateway
            .inject_failure(Operation::Register, Failure::ServiceDown(Service::Hosts))
            .await;
        let (flow, _store) = flow(gateway.clone());

        let outcome = flow.register().await.unwrap();
        assert_eq!(outcome, LoginOutcome::Rejected(LogoutReason::HostsServiceDown));
        assert_eq!(gateway.call_count(Operation::Login).await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_request_is_busy() {
        let gateway = Arc::new(FakeGateway::demo().with_latency(std::time::Duration::from_millis(50)));
        let (flow, _store) = flow(gateway.clone());
        let host: HostId = DEMO_HOST.parse().unwrap();

        let (first, second) = tokio::join!(flow.login(host), flow.register());
        assert!(matches!(first.unwrap(), LoginOutcome::LoggedIn(_)));
        assert_eq!(second.unwrap(), LoginOutcome::Busy);
        assert_eq!(gateway.call_count(Operation::Register).await, 0);
    }
}
