//! HTTP API for the earnings agent.
//!
//! ## Endpoints
//!
//! - `POST /api/process` - Submit a batch of tickers to process
//! - `GET /api/health` - Health check
//!
//! The process endpoint validates the envelope, acknowledges, and fans
//! each ticker out to its own task; results flow back through the
//! per-ticker callback, not this API.

mod auth;
mod routes;
pub mod types;

pub use routes::serve;
pub use types::*;
