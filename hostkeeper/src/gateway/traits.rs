//! Core trait for remote gateways.
//!
//! This module defines the `RemoteGateway` trait - the primary abstraction
//! over the auth and hosts backends. Implementations classify every
//! transport outcome into a [`RemoteResult`] or fail with a
//! [`GatewayError`] defect.

use std::fmt;

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::outcome::RemoteResult;
use crate::types::{AccessToken, HostId, HostProfile};

/// Result of a gateway call: a classified outcome, or a defect.
pub type GatewayResult<T> = Result<RemoteResult<T>, GatewayError>;

/// Remote operations exposed by the backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Register,
    Login,
    Renew,
    FetchProfile,
    SetOnlyFriends,
    SetAllowNonames,
    AddFriend,
    RemoveFriend,
    AddBan,
    RemoveBan,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Register => "register",
            Operation::Login => "login",
            Operation::Renew => "renew",
            Operation::FetchProfile => "fetch_profile",
            Operation::SetOnlyFriends => "set_only_friends",
            Operation::SetAllowNonames => "set_allow_nonames",
            Operation::AddFriend => "add_friend",
            Operation::RemoveFriend => "remove_friend",
            Operation::AddBan => "add_ban",
            Operation::RemoveBan => "remove_ban",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Gateway to the auth and hosts backends.
///
/// Stateless with respect to sessions: every call carries the host id and
/// token it needs.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Create a new host.
    async fn register(&self) -> GatewayResult<HostProfile>;

    /// Obtain a token for an existing host.
    async fn login(&self, host: HostId) -> GatewayResult<AccessToken>;

    /// Exchange a token for a fresh one.
    async fn renew(&self, token: &AccessToken) -> GatewayResult<AccessToken>;

    /// Fetch the authoritative profile of a host.
    async fn fetch_profile(&self, host: HostId, token: &AccessToken) -> GatewayResult<HostProfile>;

    async fn set_only_friends(
        &self,
        host: HostId,
        token: &AccessToken,
        only_friends: bool,
    ) -> GatewayResult<()>;

    async fn set_allow_nonames(
        &self,
        host: HostId,
        token: &AccessToken,
        allow_nonames: bool,
    ) -> GatewayResult<()>;

    async fn add_friend(&self, host: HostId, token: &AccessToken, friend: HostId) -> GatewayResult<()>;

    async fn remove_friend(&self, host: HostId, token: &AccessToken, friend: HostId) -> GatewayResult<()>;

    async fn add_ban(&self, host: HostId, token: &AccessToken, banned: HostId) -> GatewayResult<()>;

    async fn remove_ban(&self, host: HostId, token: &AccessToken, banned: HostId) -> GatewayResult<()>;
}
