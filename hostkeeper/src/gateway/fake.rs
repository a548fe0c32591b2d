//! In-memory gateway for tests and demos.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, MutexGuard};

use super::traits::*;
use crate::outcome::{Failure, RemoteResult};
use crate::types::{AccessToken, HostId, HostProfile};

/// Host seeded by [`FakeGateway::demo`].
pub const DEMO_HOST: &str = "01234567-89AB-CDEF-0123-456789ABCDEF";

/// Other hosts that exist in the demo backend and can be befriended or banned.
pub const DEMO_OTHER_HOSTS: [&str; 4] = [
    "11111111-1111-1111-1111-111111111111",
    "22222222-2222-2222-2222-222222222222",
    "33333333-3333-3333-3333-333333333333",
    "44444444-4444-4444-4444-444444444444",
];

/// A call observed by the fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeCall {
    pub operation: Operation,
    pub token: Option<AccessToken>,
}

#[derive(Default)]
struct FakeState {
    hosts: BTreeMap<HostId, HostProfile>,
    tokens: HashMap<AccessToken, HostId>,
    issued: u64,
    failures: HashMap<Operation, VecDeque<Failure>>,
    calls: Vec<FakeCall>,
}

impl FakeState {
    fn issue_token(&mut self, host: HostId) -> AccessToken {
        self.issued += 1;
        let token = AccessToken::new(format!("fake-token-{}", self.issued));
        self.tokens.insert(token.clone(), host);
        token
    }

    fn injected(&mut self, operation: Operation) -> Option<Failure> {
        self.failures.get_mut(&operation)?.pop_front()
    }

    /// Check that `token` is live and belongs to an existing `host`.
    fn authorize(&self, host: HostId, token: &AccessToken) -> Result<(), Failure> {
        match self.tokens.get(token) {
            Some(owner) if *owner == host => {}
            _ => return Err(Failure::Unauthorized),
        }
        if !self.hosts.contains_key(&host) {
            return Err(Failure::NotFound);
        }
        Ok(())
    }

    fn profile_mut(&mut self, host: HostId) -> Result<&mut HostProfile, Failure> {
        self.hosts.get_mut(&host).ok_or(Failure::NotFound)
    }
}

/// In-memory backend with its own host registry and token table.
///
/// Each instance is independent; construct one per test. Tokens rotate on
/// renew, so a replaced token is rejected as unauthorized afterwards.
#[derive(Default)]
pub struct FakeGateway {
    state: Mutex<FakeState>,
    latency: Option<Duration>,
}

impl FakeGateway {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend seeded with the demo host and a few other existing hosts.
    pub fn demo() -> Self {
        let mut state = FakeState::default();
        for raw in std::iter::once(DEMO_HOST).chain(DEMO_OTHER_HOSTS) {
            if let Ok(id) = raw.parse::<HostId>() {
                state.hosts.insert(id, HostProfile::placeholder(id));
            }
        }
        Self {
            state: Mutex::new(state),
            latency: None,
        }
    }

    /// Add a host with the given profile.
    pub fn with_host(mut self, profile: HostProfile) -> Self {
        self.state.get_mut().hosts.insert(profile.host_id(), profile);
        self
    }

    /// Delay every call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Insert or replace a host profile.
    pub async fn insert_host(&self, profile: HostProfile) {
        self.state.lock().await.hosts.insert(profile.host_id(), profile);
    }

    /// Issue a token for `host` without going through `login`.
    pub async fn issue_token(&self, host: HostId) -> AccessToken {
        self.state.lock().await.issue_token(host)
    }

    /// Revoke every token, as if the auth service forgot all sessions.
    pub async fn revoke_tokens(&self) {
        self.state.lock().await.tokens.clear();
    }

    /// Make the next call of `operation` fail with `failure`.
    ///
    /// Injected failures queue up and are consumed one per call.
    pub async fn inject_failure(&self, operation: Operation, failure: Failure) {
        self.state
            .lock()
            .await
            .failures
            .entry(operation)
            .or_default()
            .push_back(failure);
    }

    /// Current backend-side profile of `host`.
    pub async fn profile(&self, host: HostId) -> Option<HostProfile> {
        self.state.lock().await.hosts.get(&host).cloned()
    }

    /// Every call made so far, in order.
    pub async fn calls(&self) -> Vec<FakeCall> {
        self.state.lock().await.calls.clone()
    }

    /// Number of calls made for `operation`.
    pub async fn call_count(&self, operation: Operation) -> usize {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|call| call.operation == operation)
            .count()
    }

    /// Record the call, apply latency and lock the state.
    async fn enter(&self, operation: Operation, token: Option<&AccessToken>) -> MutexGuard<'_, FakeState> {
        self.state.lock().await.calls.push(FakeCall {
            operation,
            token: token.cloned(),
        });

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.state.lock().await
    }

    /// Shared path of the authenticated profile mutations.
    async fn mutate(
        &self,
        operation: Operation,
        host: HostId,
        token: &AccessToken,
        apply: impl FnOnce(&mut HostProfile) -> Result<(), Failure> + Send,
    ) -> GatewayResult<()> {
        let mut state = self.enter(operation, Some(token)).await;
        if let Some(failure) = state.injected(operation) {
            return Ok(failure.into());
        }
        if let Err(failure) = state.authorize(host, token) {
            return Ok(failure.into());
        }

        let outcome = state.profile_mut(host).and_then(apply);
        Ok(match outcome {
            Ok(()) => RemoteResult::Ok(()),
            Err(failure) => failure.into(),
        })
    }

    /// Mutation that references another host, which must exist.
    async fn mutate_relation(
        &self,
        operation: Operation,
        host: HostId,
        token: &AccessToken,
        other: HostId,
        apply: impl FnOnce(&HostProfile) -> Option<HostProfile> + Send,
    ) -> GatewayResult<()> {
        let mut state = self.enter(operation, Some(token)).await;
        if let Some(failure) = state.injected(operation) {
            return Ok(failure.into());
        }
        if let Err(failure) = state.authorize(host, token) {
            return Ok(failure.into());
        }
        if !state.hosts.contains_key(&other) {
            return Ok(RemoteResult::NotFound);
        }

        let profile = match state.profile_mut(host) {
            Ok(profile) => profile,
            Err(failure) => return Ok(failure.into()),
        };
        Ok(match apply(&*profile) {
            Some(updated) => {
                *profile = updated;
                RemoteResult::Ok(())
            }
            None => RemoteResult::NotFound,
        })
    }
}

#[async_trait]
impl RemoteGateway for FakeGateway {
    async fn register(&self) -> GatewayResult<HostProfile> {
        let mut state = self.enter(Operation::Register, None).await;
        if let Some(failure) = state.injected(Operation::Register) {
            return Ok(failure.into());
        }

        let profile = HostProfile::placeholder(HostId::random());
        state.hosts.insert(profile.host_id(), profile.clone());
        Ok(RemoteResult::Ok(profile))
    }

    async fn login(&self, host: HostId) -> GatewayResult<AccessToken> {
        let mut state = self.enter(Operation::Login, None).await;
        if let Some(failure) = state.injected(Operation::Login) {
            return Ok(failure.into());
        }

        if !state.hosts.contains_key(&host) {
            return Ok(RemoteResult::NotFound);
        }
        Ok(RemoteResult::Ok(state.issue_token(host)))
    }

    async fn renew(&self, token: &AccessToken) -> GatewayResult<AccessToken> {
        let mut state = self.enter(Operation::Renew, Some(token)).await;
        if let Some(failure) = state.injected(Operation::Renew) {
            return Ok(failure.into());
        }

        let Some(host) = state.tokens.remove(token) else {
            return Ok(RemoteResult::Unauthorized);
        };
        if !state.hosts.contains_key(&host) {
            return Ok(RemoteResult::NotFound);
        }
        Ok(RemoteResult::Ok(state.issue_token(host)))
    }

    async fn fetch_profile(&self, host: HostId, token: &AccessToken) -> GatewayResult<HostProfile> {
        let mut state = self.enter(Operation::FetchProfile, Some(token)).await;
        if let Some(failure) = state.injected(Operation::FetchProfile) {
            return Ok(failure.into());
        }
        if let Err(failure) = state.authorize(host, token) {
            return Ok(failure.into());
        }

        Ok(state
            .hosts
            .get(&host)
            .cloned()
            .map_or(RemoteResult::NotFound, RemoteResult::Ok))
    }

    async fn set_only_friends(
        &self,
        host: HostId,
        token: &AccessToken,
        only_friends: bool,
    ) -> GatewayResult<()> {
        self.mutate(Operation::SetOnlyFriends, host, token, |profile| {
            *profile = profile.with_only_friends(only_friends);
            Ok(())
        })
        .await
    }

    async fn set_allow_nonames(
        &self,
        host: HostId,
        token: &AccessToken,
        allow_nonames: bool,
    ) -> GatewayResult<()> {
        self.mutate(Operation::SetAllowNonames, host, token, |profile| {
            *profile = profile.with_allow_nonames(allow_nonames);
            Ok(())
        })
        .await
    }

    async fn add_friend(&self, host: HostId, token: &AccessToken, friend: HostId) -> GatewayResult<()> {
        self.mutate_relation(Operation::AddFriend, host, token, friend, |profile| {
            Some(profile.with_friend(friend))
        })
        .await
    }

    async fn remove_friend(&self, host: HostId, token: &AccessToken, friend: HostId) -> GatewayResult<()> {
        self.mutate_relation(Operation::RemoveFriend, host, token, friend, |profile| {
            profile
                .friends()
                .contains(&friend)
                .then(|| profile.without_friend(friend))
        })
        .await
    }

    async fn add_ban(&self, host: HostId, token: &AccessToken, banned: HostId) -> GatewayResult<()> {
        self.mutate_relation(Operation::AddBan, host, token, banned, |profile| {
            Some(profile.with_banned(banned))
        })
        .await
    }

    async fn remove_ban(&self, host: HostId, token: &AccessToken, banned: HostId) -> GatewayResult<()> {
        self.mutate_relation(Operation::RemoveBan, host, token, banned, |profile| {
            profile
                .banlist()
                .contains(&banned)
                .then(|| profile.without_banned(banned))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Service;

    fn demo_host() -> HostId {
        DEMO_HOST.parse().unwrap()
    }

    fn other(index: usize) -> HostId {
        DEMO_OTHER_HOSTS[index].parse().unwrap()
    }

    #[tokio::test]
    async fn test_login_unknown_host_is_not_found() {
        let gateway = FakeGateway::demo();
        let result = gateway.login(HostId::random()).await.unwrap();
        assert_eq!(result, RemoteResult::NotFound);
    }

    #[tokio::test]
    async fn test_renew_rotates_token() {
        let gateway = FakeGateway::demo();
        let first = gateway.login(demo_host()).await.unwrap().ok().unwrap();
        let second = gateway.renew(&first).await.unwrap().ok().unwrap();
        assert_ne!(first, second);

        // The replaced token is dead.
        assert_eq!(gateway.renew(&first).await.unwrap(), RemoteResult::Unauthorized);
        assert_eq!(
            gateway.fetch_profile(demo_host(), &first).await.unwrap(),
            RemoteResult::Unauthorized
        );
        assert!(gateway.fetch_profile(demo_host(), &second).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_register_creates_fresh_host() {
        let gateway = FakeGateway::new();
        let profile = gateway.register().await.unwrap().ok().unwrap();
        assert_eq!(profile, HostProfile::placeholder(profile.host_id()));
        assert!(gateway.login(profile.host_id()).await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_relations_require_existing_target() {
        let gateway = FakeGateway::demo();
        let token = gateway.issue_token(demo_host()).await;

        let missing = gateway
            .add_friend(demo_host(), &token, HostId::random())
            .await
            .unwrap();
        assert_eq!(missing, RemoteResult::NotFound);

        assert!(gateway.add_friend(demo_host(), &token, other(0)).await.unwrap().is_ok());
        assert!(gateway.add_friend(demo_host(), &token, other(0)).await.unwrap().is_ok());

        let profile = gateway.profile(demo_host()).await.unwrap();
        assert_eq!(profile.friends().len(), 1);
    }

    #[tokio::test]
    async fn test_removing_non_member_is_not_found() {
        let gateway = FakeGateway::demo();
        let token = gateway.issue_token(demo_host()).await;

        let result = gateway.remove_ban(demo_host(), &token, other(1)).await.unwrap();
        assert_eq!(result, RemoteResult::NotFound);

        gateway.add_ban(demo_host(), &token, other(1)).await.unwrap();
        gateway.add_friend(demo_host(), &token, other(2)).await.unwrap();
        let result = gateway.remove_ban(demo_host(), &token, other(1)).await.unwrap();
        assert!(result.is_ok());

        let profile = gateway.profile(demo_host()).await.unwrap();
        assert!(profile.banlist().is_empty());
        assert!(profile.friends().contains(&other(2)));
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let gateway = FakeGateway::demo();
        let token = gateway.issue_token(demo_host()).await;
        gateway
            .inject_failure(Operation::SetOnlyFriends, Failure::ServiceDown(Service::Hosts))
            .await;
        gateway
            .inject_failure(Operation::SetOnlyFriends, Failure::Unauthorized)
            .await;

        let first = gateway.set_only_friends(demo_host(), &token, false).await.unwrap();
        let second = gateway.set_only_friends(demo_host(), &token, false).await.unwrap();
        let third = gateway.set_only_friends(demo_host(), &token, false).await.unwrap();

        assert_eq!(first, RemoteResult::ServiceDown(Service::Hosts));
        assert_eq!(second, RemoteResult::Unauthorized);
        assert_eq!(third, RemoteResult::Ok(()));
        assert_eq!(gateway.call_count(Operation::SetOnlyFriends).await, 3);
        assert!(!gateway.profile(demo_host()).await.unwrap().only_friends());
    }

    #[tokio::test]
    async fn test_token_of_other_host_is_unauthorized() {
        let gateway = FakeGateway::demo();
        let token = gateway.issue_token(other(0)).await;
        let result = gateway.set_allow_nonames(demo_host(), &token, true).await.unwrap();
        assert_eq!(result, RemoteResult::Unauthorized);
    }
}
