//! Request and Response models for the cache admin API
//!
//! This module defines the DTOs used for serializing/deserializing
//! HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{
    ApiInvalidateQuery, ClearQuery, ComputedInvalidateQuery, SessionInvalidateQuery, WarmRequest,
};
pub use responses::{ErrorResponse, HealthResponse, RemovedResponse, StatsResponse};
