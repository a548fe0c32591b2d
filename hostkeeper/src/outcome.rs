//! Classified outcomes of remote operations.
//!
//! Every gateway call resolves to exactly one [`RemoteResult`] branch.
//! Transport states outside this set never show up here; they surface as
//! [`GatewayError`](crate::error::GatewayError) instead.

use crate::types::Service;

/// Outcome of a remote operation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum RemoteResult<T> {
    /// Operation succeeded
    Ok(T),
    /// Session is no longer valid on the auth service
    Unauthorized,
    /// Host, session or target does not exist
    NotFound,
    /// A backend service reported itself unavailable
    ServiceDown(Service),
}

/// The failure branches of [`RemoteResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Failure {
    Unauthorized,
    NotFound,
    ServiceDown(Service),
}

impl<T> RemoteResult<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, RemoteResult::Ok(_))
    }

    /// Success value, if any.
    pub fn ok(self) -> Option<T> {
        match self {
            RemoteResult::Ok(value) => Some(value),
            _ => None,
        }
    }

    /// Split into the success value or the classified failure.
    pub fn into_result(self) -> Result<T, Failure> {
        match self {
            RemoteResult::Ok(value) => Ok(value),
            RemoteResult::Unauthorized => Err(Failure::Unauthorized),
            RemoteResult::NotFound => Err(Failure::NotFound),
            RemoteResult::ServiceDown(service) => Err(Failure::ServiceDown(service)),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> RemoteResult<U> {
        match self.into_result() {
            Ok(value) => RemoteResult::Ok(f(value)),
            Err(failure) => failure.into(),
        }
    }

    /// Like [`map`](Self::map) for conversions that can themselves fail.
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<RemoteResult<U>, E> {
        match self.into_result() {
            Ok(value) => f(value).map(RemoteResult::Ok),
            Err(failure) => Ok(failure.into()),
        }
    }
}

impl<T> From<Failure> for RemoteResult<T> {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::Unauthorized => RemoteResult::Unauthorized,
            Failure::NotFound => RemoteResult::NotFound,
            Failure::ServiceDown(service) => RemoteResult::ServiceDown(service),
        }
    }
}
