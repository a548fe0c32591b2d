//! Session lifecycle states and logout reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::outcome::Failure;
use crate::types::Service;

/// Lifecycle of a session. `LoggedOut` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Bootstrapping,
    Authenticated,
    LoggedOut,
}

/// Why a session ended on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    /// Token rejected or host unknown
    AuthError,
    AuthServiceDown,
    HostsServiceDown,
}

impl LogoutReason {
    /// Reason for a classified failure that ends the session.
    pub fn from_failure(failure: Failure) -> Self {
        match failure {
            Failure::Unauthorized | Failure::NotFound => LogoutReason::AuthError,
            Failure::ServiceDown(Service::Auth) => LogoutReason::AuthServiceDown,
            Failure::ServiceDown(Service::Hosts) => LogoutReason::HostsServiceDown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogoutReason::AuthError => "auth_error",
            LogoutReason::AuthServiceDown => "auth_service_down",
            LogoutReason::HostsServiceDown => "hosts_service_down",
        }
    }

    /// Message to show the user on the login screen.
    pub fn message(&self) -> &'static str {
        match self {
            LogoutReason::AuthError => "This account does not exist",
            LogoutReason::AuthServiceDown => "The authentication service is not responding",
            LogoutReason::HostsServiceDown => "The configuration service is not responding",
        }
    }
}

impl fmt::Display for LogoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a renew-and-refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Token renewed and profile replaced
    Refreshed,
    /// The session ended during the attempt
    LoggedOut(LogoutReason),
    /// Another renewal was running; nothing was sent
    AlreadyInFlight,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_down_reasons_are_not_swapped() {
        assert_eq!(
            LogoutReason::from_failure(Failure::ServiceDown(Service::Auth)),
            LogoutReason::AuthServiceDown
        );
        assert_eq!(
            LogoutReason::from_failure(Failure::ServiceDown(Service::Hosts)),
            LogoutReason::HostsServiceDown
        );
        assert_eq!(
            LogoutReason::from_failure(Failure::NotFound),
            LogoutReason::AuthError
        );
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&LogoutReason::HostsServiceDown).unwrap();
        assert_eq!(json, r#""hosts_service_down""#);
        assert_eq!(LogoutReason::HostsServiceDown.to_string(), "hosts_service_down");
    }
}
