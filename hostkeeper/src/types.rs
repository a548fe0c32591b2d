//! Core data model: host identifiers, access tokens and host profiles.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::error::GatewayError;

/// Identifier of a host account.
///
/// Always rendered in canonical upper-case hyphenated form, so two ids that
/// differ only in case compare equal once parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HostId(Uuid);

impl HostId {
    /// Wrap an existing UUID.
    pub fn new(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Generate a fresh random host id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Access the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Uuid::encode_buffer();
        f.write_str(self.0.hyphenated().encode_upper(&mut buf))
    }
}

impl FromStr for HostId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl From<Uuid> for HostId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Serialize for HostId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for HostId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Opaque session token issued by the auth service.
///
/// `Debug` is redacted so tokens never end up in logs.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Value for an `Authorization` header.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Backend service that can report itself unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Service {
    /// Authentication service (tokens)
    Auth,
    /// Host registry service (profiles, lists)
    Hosts,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::Auth => "auth",
            Service::Hosts => "hosts",
        }
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Service {
    type Err = String;

    /// Only the exact literals `auth` and `hosts` are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(Service::Auth),
            "hosts" => Ok(Service::Hosts),
            other => Err(other.to_string()),
        }
    }
}

/// Access-control state of a host.
///
/// Values are never mutated in place: every change produces a new profile
/// derived from the previous one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostProfile {
    host_id: HostId,
    only_friends: bool,
    allow_nonames: bool,
    friends: BTreeSet<HostId>,
    banlist: BTreeSet<HostId>,
}

impl HostProfile {
    pub fn new(
        host_id: HostId,
        only_friends: bool,
        allow_nonames: bool,
        friends: impl IntoIterator<Item = HostId>,
        banlist: impl IntoIterator<Item = HostId>,
    ) -> Self {
        Self {
            host_id,
            only_friends,
            allow_nonames,
            friends: friends.into_iter().collect(),
            banlist: banlist.into_iter().collect(),
        }
    }

    /// Profile shown while the first fetch is still in flight.
    pub fn placeholder(host_id: HostId) -> Self {
        Self::new(host_id, true, false, [], [])
    }

    pub fn host_id(&self) -> HostId {
        self.host_id
    }

    pub fn only_friends(&self) -> bool {
        self.only_friends
    }

    pub fn allow_nonames(&self) -> bool {
        self.allow_nonames
    }

    pub fn friends(&self) -> &BTreeSet<HostId> {
        &self.friends
    }

    pub fn banlist(&self) -> &BTreeSet<HostId> {
        &self.banlist
    }

    pub fn with_only_friends(&self, only_friends: bool) -> Self {
        Self {
            only_friends,
            ..self.clone()
        }
    }

    pub fn with_allow_nonames(&self, allow_nonames: bool) -> Self {
        Self {
            allow_nonames,
            ..self.clone()
        }
    }

    pub fn with_friend(&self, friend: HostId) -> Self {
        let mut friends = self.friends.clone();
        friends.insert(friend);
        Self {
            friends,
            ..self.clone()
        }
    }

    pub fn without_friend(&self, friend: HostId) -> Self {
        let mut friends = self.friends.clone();
        friends.remove(&friend);
        Self {
            friends,
            ..self.clone()
        }
    }

    pub fn with_banned(&self, banned: HostId) -> Self {
        let mut banlist = self.banlist.clone();
        banlist.insert(banned);
        Self {
            banlist,
            ..self.clone()
        }
    }

    pub fn without_banned(&self, banned: HostId) -> Self {
        let mut banlist = self.banlist.clone();
        banlist.remove(&banned);
        Self {
            banlist,
            ..self.clone()
        }
    }
}

/// Host profile as it travels over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct HostDto {
    pub uuid: String,
    pub only_friends: bool,
    pub allow_nonames: bool,
    #[serde(default)]
    pub friends: Vec<String>,
    #[serde(default)]
    pub banlist: Vec<String>,
}

fn parse_host_id(raw: &str) -> Result<HostId, GatewayError> {
    raw.parse()
        .map_err(|source| GatewayError::InvalidIdentifier {
            value: raw.to_string(),
            source,
        })
}

impl TryFrom<HostDto> for HostProfile {
    type Error = GatewayError;

    fn try_from(dto: HostDto) -> Result<Self, Self::Error> {
        let friends = dto
            .friends
            .iter()
            .map(|raw| parse_host_id(raw))
            .collect::<Result<Vec<_>, _>>()?;
        let banlist = dto
            .banlist
            .iter()
            .map(|raw| parse_host_id(raw))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HostProfile::new(
            parse_host_id(&dto.uuid)?,
            dto.only_friends,
            dto.allow_nonames,
            friends,
            banlist,
        ))
    }
}

impl From<&HostProfile> for HostDto {
    fn from(profile: &HostProfile) -> Self {
        Self {
            uuid: profile.host_id.to_string(),
            only_friends: profile.only_friends,
            allow_nonames: profile.allow_nonames,
            friends: profile.friends.iter().map(HostId::to_string).collect(),
            banlist: profile.banlist.iter().map(HostId::to_string).collect(),
        }
    }
}
