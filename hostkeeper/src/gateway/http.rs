//! HTTP gateway for the auth and hosts backends.
//!
//! Status mapping:
//! - 2xx: success, JSON body per operation
//! - 503 with body `auth` or `hosts`: service down
//! - 401 / 404: only where the operation lists them
//! - anything else: defect

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::traits::*;
use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::outcome::RemoteResult;
use crate::types::{AccessToken, HostDto, HostId, HostProfile, Service};

/// Which client-error statuses an operation classifies instead of
/// treating as defects.
#[derive(Debug, Clone, Copy)]
struct Accepts {
    unauthorized: bool,
    not_found: bool,
}

const ANONYMOUS: Accepts = Accepts {
    unauthorized: false,
    not_found: false,
};

const LOOKUP: Accepts = Accepts {
    unauthorized: false,
    not_found: true,
};

const AUTHENTICATED: Accepts = Accepts {
    unauthorized: true,
    not_found: true,
};

/// `{"token": "..."}` payload of login and renew.
#[derive(Debug, Deserialize)]
struct TokenHolder {
    token: String,
}

#[derive(Debug, Serialize)]
struct OnlyFriendsBody {
    only_friends: bool,
}

#[derive(Debug, Serialize)]
struct AllowNonamesBody {
    allow_nonames: bool,
}

/// Gateway backed by the real HTTP API.
pub struct HttpGateway {
    client: Client,
    base_url: String,
}

impl HttpGateway {
    /// Create a gateway from configuration.
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(GatewayError::Client)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn host_url(&self, host: HostId, suffix: &str) -> String {
        format!("{}/hosts/{}{}", self.base_url, host, suffix)
    }

    /// Send a request and classify the response.
    ///
    /// On success the raw body is returned for the caller to decode.
    async fn send(
        &self,
        operation: Operation,
        request: RequestBuilder,
        accepts: Accepts,
    ) -> GatewayResult<String> {
        debug!(operation = %operation, "Sending request");

        let response = request
            .send()
            .await
            .map_err(|source| GatewayError::Transport { operation, source })?;

        let status = response.status();
        if status.is_success() {
            let body = response
                .text()
                .await
                .map_err(|source| GatewayError::Transport { operation, source })?;
            return Ok(RemoteResult::Ok(body));
        }

        debug!(operation = %operation, status = status.as_u16(), "Request failed");

        match status {
            StatusCode::SERVICE_UNAVAILABLE => {
                let body = response
                    .text()
                    .await
                    .map_err(|source| GatewayError::Transport { operation, source })?;
                let service = body
                    .parse::<Service>()
                    .map_err(|body| GatewayError::UnknownService { operation, body })?;
                Ok(RemoteResult::ServiceDown(service))
            }
            StatusCode::UNAUTHORIZED if accepts.unauthorized => Ok(RemoteResult::Unauthorized),
            StatusCode::NOT_FOUND if accepts.not_found => Ok(RemoteResult::NotFound),
            other => Err(GatewayError::UnexpectedStatus {
                operation,
                status: other.as_u16(),
            }),
        }
    }

    async fn send_unit(
        &self,
        operation: Operation,
        request: RequestBuilder,
        token: &AccessToken,
    ) -> GatewayResult<()> {
        let request = request.header(header::AUTHORIZATION, token.bearer());
        Ok(self.send(operation, request, AUTHENTICATED).await?.map(|_| ()))
    }

    async fn send_token(
        &self,
        operation: Operation,
        request: RequestBuilder,
        accepts: Accepts,
    ) -> GatewayResult<AccessToken> {
        self.send(operation, request, accepts)
            .await?
            .try_map(|body| decode::<TokenHolder>(operation, &body))
            .map(|result| result.map(|holder| AccessToken::new(holder.token)))
    }

    async fn send_profile(
        &self,
        operation: Operation,
        request: RequestBuilder,
        accepts: Accepts,
    ) -> GatewayResult<HostProfile> {
        self.send(operation, request, accepts)
            .await?
            .try_map(|body| HostProfile::try_from(decode::<HostDto>(operation, &body)?))
    }
}

fn decode<T: DeserializeOwned>(operation: Operation, body: &str) -> Result<T, GatewayError> {
    serde_json::from_str(body).map_err(|source| GatewayError::Decode { operation, source })
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn register(&self) -> GatewayResult<HostProfile> {
        let request = self.client.post(format!("{}/hosts", self.base_url));
        self.send_profile(Operation::Register, request, ANONYMOUS).await
    }

    async fn login(&self, host: HostId) -> GatewayResult<AccessToken> {
        let request = self.client.get(self.host_url(host, "/access_token"));
        self.send_token(Operation::Login, request, LOOKUP).await
    }

    /// Like `login`, a 503 naming either service is classified, not only
    /// `auth`, so a hosts outage during renewal ends the session with the
    /// hosts reason instead of a defect.
    async fn renew(&self, token: &AccessToken) -> GatewayResult<AccessToken> {
        let request = self
            .client
            .get(format!("{}/hosts/access_token/renew", self.base_url))
            .header(header::AUTHORIZATION, token.bearer());
        self.send_token(Operation::Renew, request, AUTHENTICATED).await
    }

    async fn fetch_profile(&self, host: HostId, token: &AccessToken) -> GatewayResult<HostProfile> {
        let request = self
            .client
            .get(self.host_url(host, ""))
            .header(header::AUTHORIZATION, token.bearer());
        self.send_profile(Operation::FetchProfile, request, AUTHENTICATED)
            .await
    }

    async fn set_only_friends(
        &self,
        host: HostId,
        token: &AccessToken,
        only_friends: bool,
    ) -> GatewayResult<()> {
        let request = self
            .client
            .put(self.host_url(host, "/only_friends"))
            .json(&OnlyFriendsBody { only_friends });
        self.send_unit(Operation::SetOnlyFriends, request, token).await
    }

    async fn set_allow_nonames(
        &self,
        host: HostId,
        token: &AccessToken,
        allow_nonames: bool,
    ) -> GatewayResult<()> {
        let request = self
            .client
            .put(self.host_url(host, "/allow_nonames"))
            .json(&AllowNonamesBody { allow_nonames });
        self.send_unit(Operation::SetAllowNonames, request, token).await
    }

    async fn add_friend(&self, host: HostId, token: &AccessToken, friend: HostId) -> GatewayResult<()> {
        let request = self
            .client
            .post(self.host_url(host, &format!("/friends?friend={}", friend)));
        self.send_unit(Operation::AddFriend, request, token).await
    }

    async fn remove_friend(&self, host: HostId, token: &AccessToken, friend: HostId) -> GatewayResult<()> {
        let request = self
            .client
            .delete(self.host_url(host, &format!("/friends/{}", friend)));
        self.send_unit(Operation::RemoveFriend, request, token).await
    }

    async fn add_ban(&self, host: HostId, token: &AccessToken, banned: HostId) -> GatewayResult<()> {
        let request = self
            .client
            .post(self.host_url(host, &format!("/banlist?banned={}", banned)));
        self.send_unit(Operation::AddBan, request, token).await
    }

    async fn remove_ban(&self, host: HostId, token: &AccessToken, banned: HostId) -> GatewayResult<()> {
        let request = self
            .client
            .delete(self.host_url(host, &format!("/banlist/{}", banned)));
        self.send_unit(Operation::RemoveBan, request, token).await
    }
}
