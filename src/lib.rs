//! # Balance Agent Library
//!
//! Serves a single bank balance from a local cache while keeping every
//! credential private and keeping calls to the metered upstream API to a
//! minimum.
//!
//! Modules:
//! - `config`: service configuration, loading and validation
//! - `cache`: access token and balance records plus their durable stores
//! - `sources`: token manager and the upstream fetch-job protocol (HTTP, demo)
//! - `coordinator`: single-flight refresh coordinator and background scheduler
//! - `server`: JSON endpoints for the dashboard front-end

pub mod config;
pub mod cache;
pub mod sources;
pub mod coordinator;
pub mod resilience;
pub mod observability;
pub mod server;
pub mod errors;
pub mod helpers;
pub mod utils;

#[cfg(test)]
pub mod tests;

pub use crate::config::service::ServiceConfig;
pub use crate::coordinator::refresh::{RefreshCoordinator, RefreshOutcome};
pub use crate::errors::RefreshError;
