//! Remote gateway abstraction layer.
//!
//! Provides a trait-based interface over the auth and hosts backends:
//! - HTTP gateway for the real services
//! - In-memory fake for tests and demos

pub mod fake;
pub mod http;
pub mod traits;

pub use fake::{FakeCall, FakeGateway};
pub use http::HttpGateway;
pub use traits::{GatewayResult, Operation, RemoteGateway};
