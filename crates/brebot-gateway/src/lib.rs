//! HTTP API of the Brebot operator service.
//!
//! Exposes the orchestrator's commands and queries as JSON over HTTP, with
//! optional API-key auth and per-client rate limiting.

pub mod error;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use middleware::SecurityConfig;
pub use rate_limit::RateLimiter;
pub use server::{AppState, GatewayServer};
