//! Hostkeeper - host access-control session engine
//!
//! Keeps one host's access-control profile in sync with the remote auth and
//! hosts services:
//! - Trait-based remote gateway (HTTP, in-memory fake)
//! - Session controller with periodic token renewal and logout signalling
//! - Login and registration flow
//! - Credential persistence with expiry
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          SessionController              │
//! │  (profile, phase, mutations, timer)     │
//! └────────────────┬────────────────────────┘
//!                  │
//!      ┌───────────┴───────────┐
//!      ▼                       ▼
//! ┌──────────────┐      ┌─────────────────┐
//! │ RemoteGateway│      │ CredentialStore │
//! │ (HTTP/Fake)  │      │ (memory/file)   │
//! └──────────────┘      └─────────────────┘
//! ```

pub mod auth;
pub mod config;
pub mod credentials;
pub mod error;
pub mod gateway;
pub mod outcome;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use auth::{LoginFlow, LoginOutcome};
pub use config::ClientConfig;
pub use credentials::{CredentialStore, SessionCredentials, StoredSession};
pub use error::{CredentialError, GatewayError, SessionError};
pub use gateway::{FakeGateway, HttpGateway, Operation, RemoteGateway};
pub use outcome::{Failure, RemoteResult};
pub use session::{LogoutReason, RefreshOutcome, SessionController, SessionPhase};
pub use types::*;
