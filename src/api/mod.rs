//! API Module
//!
//! HTTP handlers and routing for the cache admin surface.
//!
//! # Endpoints
//! - `GET /health` - Store connectivity and ping latency
//! - `GET /v1/cache/stats` - Counters, hit rate, memory and per-layer key counts
//! - `POST /v1/cache/stats/reset` - Zero the counters
//! - `POST /v1/cache/warm` - Warm the cache, optionally for one layer
//! - `DELETE /v1/cache` - Delete keys matching `?pattern=` (default: everything)
//! - `POST /v1/cache/layers/:layer/invalidate` - Drop one layer
//! - `POST /v1/cache/sessions/:year/:event/invalidate` - Drop an event or one session
//! - `POST /v1/cache/computed/invalidate` - Drop computed metrics by metric/year/event
//! - `POST /v1/cache/api-responses/invalidate` - Drop cached responses of an endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
