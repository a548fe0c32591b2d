//! Session controller.
//!
//! Owns the authenticated state of one host: the current token, the last
//! known [`HostProfile`] and the session phase. It keeps the token alive
//! with a periodic renew-and-refresh cycle and applies profile mutations
//! through the [`RemoteGateway`], committing them locally only once the
//! backend accepted them.
//!
//! ```text
//! Bootstrapping ──renew+fetch ok──▶ Authenticated
//!       │                                │
//!       └──────── classified failure ────┴──▶ LoggedOut (terminal)
//! ```
//!
//! A session that ends on its own emits exactly one [`LogoutReason`] on the
//! channel returned by [`SessionController::start`]. Mutations are not
//! serialized against each other: each commit derives the new profile from
//! the value current at commit time, so two concurrent toggles of the same
//! flag may lose an update.

mod phase;
mod ticker;

pub use phase::{LogoutReason, RefreshOutcome, SessionPhase};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::credentials::{CredentialStore, SessionCredentials, SetOptions, AUTH_TOKEN_KEY};
use crate::error::{Result, SessionError};
use crate::gateway::{Operation, RemoteGateway};
use crate::outcome::Failure;
use crate::types::{AccessToken, HostId, HostProfile};

/// Boolean profile fields that can be toggled.
#[derive(Debug, Clone, Copy)]
enum Flag {
    OnlyFriends,
    AllowNonames,
}

impl Flag {
    fn operation(self) -> Operation {
        match self {
            Flag::OnlyFriends => Operation::SetOnlyFriends,
            Flag::AllowNonames => Operation::SetAllowNonames,
        }
    }

    fn get(self, profile: &HostProfile) -> bool {
        match self {
            Flag::OnlyFriends => profile.only_friends(),
            Flag::AllowNonames => profile.allow_nonames(),
        }
    }

    fn apply(self, profile: &HostProfile, value: bool) -> HostProfile {
        match self {
            Flag::OnlyFriends => profile.with_only_friends(value),
            Flag::AllowNonames => profile.with_allow_nonames(value),
        }
    }
}

/// Friend and ban list changes.
#[derive(Debug, Clone, Copy)]
enum Membership {
    Befriend,
    Unfriend,
    Ban,
    Unban,
}

impl Membership {
    fn operation(self) -> Operation {
        match self {
            Membership::Befriend => Operation::AddFriend,
            Membership::Unfriend => Operation::RemoveFriend,
            Membership::Ban => Operation::AddBan,
            Membership::Unban => Operation::RemoveBan,
        }
    }

    /// Additions report a missing target through the "host not found" flag.
    fn tracks_missing_target(self) -> bool {
        matches!(self, Membership::Befriend | Membership::Ban)
    }

    fn apply(self, profile: &HostProfile, other: HostId) -> HostProfile {
        match self {
            Membership::Befriend => profile.with_friend(other),
            Membership::Unfriend => profile.without_friend(other),
            Membership::Ban => profile.with_banned(other),
            Membership::Unban => profile.without_banned(other),
        }
    }
}

/// Single in-flight guard: at most one holder at a time.
pub(crate) struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    pub(crate) fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) struct SessionInner {
    host_id: HostId,
    gateway: Arc<dyn RemoteGateway>,
    credentials: Arc<dyn CredentialStore>,
    config: SessionConfig,
    token: RwLock<AccessToken>,
    profile: watch::Sender<HostProfile>,
    phase: watch::Sender<SessionPhase>,
    not_found_other: AtomicBool,
    renewing: AtomicBool,
    logout_tx: mpsc::UnboundedSender<LogoutReason>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInner {
    fn is_logged_out(&self) -> bool {
        *self.phase.borrow() == SessionPhase::LoggedOut
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_logged_out() {
            return Err(SessionError::Closed);
        }
        Ok(())
    }

    async fn current_token(&self) -> AccessToken {
        self.token.read().await.clone()
    }

    /// Renew the token, then replace the profile with the authoritative one.
    async fn renew_and_refresh(&self) -> Result<RefreshOutcome> {
        self.ensure_open()?;

        let Some(_guard) = InFlightGuard::acquire(&self.renewing) else {
            return Ok(RefreshOutcome::AlreadyInFlight);
        };

        let current = self.current_token().await;
        let token = match self.gateway.renew(&current).await?.into_result() {
            Ok(token) => token,
            Err(failure) => {
                return Ok(RefreshOutcome::LoggedOut(self.logout(Operation::Renew, failure)));
            }
        };

        // A concurrent mutation may have logged out while renew was in flight.
        self.ensure_open()?;

        *self.token.write().await = token.clone();
        self.persist_token(&token);

        let profile = match self
            .gateway
            .fetch_profile(self.host_id, &token)
            .await?
            .into_result()
        {
            Ok(profile) => profile,
            Err(failure) => {
                return Ok(RefreshOutcome::LoggedOut(
                    self.logout(Operation::FetchProfile, failure),
                ));
            }
        };

        if profile.host_id() != self.host_id {
            return Err(SessionError::ProfileMismatch {
                expected: self.host_id,
                actual: profile.host_id(),
            });
        }

        // Same for the fetch.
        self.ensure_open()?;

        self.profile.send_replace(profile);
        let authenticated = self.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::Bootstrapping {
                *phase = SessionPhase::Authenticated;
                true
            } else {
                false
            }
        });
        if authenticated {
            info!(host = %self.host_id, "Session authenticated");
        }

        Ok(RefreshOutcome::Refreshed)
    }

    fn persist_token(&self, token: &AccessToken) {
        let options = SetOptions::expiring_in(self.config.token_expiry_days);
        if let Err(e) = self.credentials.set(AUTH_TOKEN_KEY, token.as_str(), options) {
            warn!(host = %self.host_id, error = %e, "Failed to persist renewed token");
        }
    }

    /// End the session because of a classified failure.
    ///
    /// Only the first call transitions and emits a signal.
    fn logout(&self, operation: Operation, failure: Failure) -> LogoutReason {
        let reason = LogoutReason::from_failure(failure);

        let transitioned = self.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::LoggedOut {
                false
            } else {
                *phase = SessionPhase::LoggedOut;
                true
            }
        });

        if transitioned {
            warn!(
                host = %self.host_id,
                operation = %operation,
                reason = %reason,
                "Session logged out"
            );
            // The receiver may already be gone; the phase still records the logout.
            let _ = self.logout_tx.send(reason);
            self.stop_ticker();
        }

        reason
    }

    fn stop_ticker(&self) {
        let handle = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Controller for one authenticated host session.
///
/// Dropping the controller cancels the refresh timer.
pub struct SessionController {
    inner: Arc<SessionInner>,
}

impl SessionController {
    /// Start a session and run the initial renew-and-refresh.
    ///
    /// Returns the controller together with the logout channel. A classified
    /// failure during bootstrap still returns the controller, already
    /// `LoggedOut`, with its reason queued on the channel. Defects are
    /// returned as errors.
    pub async fn start(
        gateway: Arc<dyn RemoteGateway>,
        credentials: Arc<dyn CredentialStore>,
        config: SessionConfig,
        session: SessionCredentials,
    ) -> Result<(Self, mpsc::UnboundedReceiver<LogoutReason>)> {
        let (logout_tx, logout_rx) = mpsc::unbounded_channel();
        let host_id = session.host_id;

        let inner = Arc::new(SessionInner {
            host_id,
            gateway,
            credentials,
            config,
            token: RwLock::new(session.token),
            profile: watch::Sender::new(HostProfile::placeholder(host_id)),
            phase: watch::Sender::new(SessionPhase::Bootstrapping),
            not_found_other: AtomicBool::new(false),
            renewing: AtomicBool::new(false),
            logout_tx,
            ticker: Mutex::new(None),
        });

        info!(host = %host_id, "Starting session");
        let controller = Self { inner };

        if controller.inner.renew_and_refresh().await? == RefreshOutcome::Refreshed {
            controller.spawn_ticker();
        }

        Ok((controller, logout_rx))
    }

    fn spawn_ticker(&self) {
        let period = self.inner.config.refresh_interval();
        let handle = ticker::spawn_refresh_task(Arc::downgrade(&self.inner), period);
        debug!(host = %self.inner.host_id, period_secs = period.as_secs(), "Refresh timer started");

        let previous = self
            .inner
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn host_id(&self) -> HostId {
        self.inner.host_id
    }

    /// Snapshot of the current profile.
    pub fn profile(&self) -> HostProfile {
        self.inner.profile.borrow().clone()
    }

    /// Watch profile changes.
    pub fn subscribe(&self) -> watch::Receiver<HostProfile> {
        self.inner.profile.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.borrow()
    }

    /// Watch phase transitions.
    pub fn phase_changes(&self) -> watch::Receiver<SessionPhase> {
        self.inner.phase.subscribe()
    }

    /// Whether the last befriend or ban attempt named a host that does not exist.
    pub fn not_found_other(&self) -> bool {
        self.inner.not_found_other.load(Ordering::Acquire)
    }

    /// Token currently used for requests.
    pub async fn access_token(&self) -> AccessToken {
        self.inner.current_token().await
    }

    /// Run renew-and-refresh now.
    ///
    /// Returns [`RefreshOutcome::AlreadyInFlight`] without any remote call
    /// when a renewal is already running.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        self.inner.renew_and_refresh().await
    }

    /// Flip `only_friends`. Returns the committed value, or `None` when the
    /// session was logged out instead.
    pub async fn toggle_only_friends(&self) -> Result<Option<bool>> {
        self.toggle(Flag::OnlyFriends).await
    }

    /// Flip `allow_nonames`. Returns the committed value, or `None` when the
    /// session was logged out instead.
    pub async fn toggle_allow_nonames(&self) -> Result<Option<bool>> {
        self.toggle(Flag::AllowNonames).await
    }

    /// Add `other` to the friend list.
    ///
    /// `false` when `other` does not exist ([`not_found_other`] is then set)
    /// or when the session was logged out.
    ///
    /// [`not_found_other`]: Self::not_found_other
    pub async fn befriend(&self, other: HostId) -> Result<bool> {
        self.change_membership(Membership::Befriend, other).await
    }

    pub async fn unfriend(&self, other: HostId) -> Result<bool> {
        self.change_membership(Membership::Unfriend, other).await
    }

    pub async fn ban(&self, other: HostId) -> Result<bool> {
        self.change_membership(Membership::Ban, other).await
    }

    pub async fn unban(&self, other: HostId) -> Result<bool> {
        self.change_membership(Membership::Unban, other).await
    }

    /// End the session without a logout signal.
    pub fn close(&self) {
        let closed = self.inner.phase.send_if_modified(|phase| {
            if *phase == SessionPhase::LoggedOut {
                false
            } else {
                *phase = SessionPhase::LoggedOut;
                true
            }
        });
        if closed {
            info!(host = %self.inner.host_id, "Session closed");
        }
        self.inner.stop_ticker();
    }

    async fn toggle(&self, flag: Flag) -> Result<Option<bool>> {
        let inner = &self.inner;
        inner.ensure_open()?;

        let operation = flag.operation();
        let value = !flag.get(&inner.profile.borrow());
        let token = inner.current_token().await;

        let result = match flag {
            Flag::OnlyFriends => {
                inner
                    .gateway
                    .set_only_friends(inner.host_id, &token, value)
                    .await?
            }
            Flag::AllowNonames => {
                inner
                    .gateway
                    .set_allow_nonames(inner.host_id, &token, value)
                    .await?
            }
        };

        match result.into_result() {
            Ok(()) => {
                inner.profile.send_modify(|profile| *profile = flag.apply(profile, value));
                debug!(host = %inner.host_id, operation = %operation, value, "Flag committed");
                Ok(Some(value))
            }
            Err(Failure::NotFound) => Err(SessionError::UnexpectedOutcome {
                operation,
                outcome: "not_found",
            }),
            Err(failure) => {
                inner.logout(operation, failure);
                Ok(None)
            }
        }
    }

    async fn change_membership(&self, membership: Membership, other: HostId) -> Result<bool> {
        let inner = &self.inner;
        inner.ensure_open()?;

        if membership.tracks_missing_target() {
            inner.not_found_other.store(false, Ordering::Release);
        }

        let operation = membership.operation();
        let token = inner.current_token().await;
        let gateway = &inner.gateway;
        let host = inner.host_id;

        let result = match membership {
            Membership::Befriend => gateway.add_friend(host, &token, other).await?,
            Membership::Unfriend => gateway.remove_friend(host, &token, other).await?,
            Membership::Ban => gateway.add_ban(host, &token, other).await?,
            Membership::Unban => gateway.remove_ban(host, &token, other).await?,
        };

        match result.into_result() {
            Ok(()) => {
                inner.profile.send_if_modified(|profile| {
                    let next = membership.apply(profile, other);
                    if next == *profile {
                        false
                    } else {
                        *profile = next;
                        true
                    }
                });
                debug!(host = %host, operation = %operation, other = %other, "Membership committed");
                Ok(true)
            }
            Err(Failure::NotFound) => {
                if membership.tracks_missing_target() {
                    inner.not_found_other.store(true, Ordering::Release);
                }
                debug!(host = %host, operation = %operation, other = %other, "Target not found");
                Ok(false)
            }
            Err(failure) => {
                inner.logout(operation, failure);
                Ok(false)
            }
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.inner.stop_ticker();
    }
}
