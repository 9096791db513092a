//! Shared building blocks for the admin notification relay: configuration,
//! the error taxonomy, domain types and the Redis connection helper.

pub mod config;
pub mod error;
pub mod redis_client;
pub mod types;
