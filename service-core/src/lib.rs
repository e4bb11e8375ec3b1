//! service-core: Shared infrastructure for the storefront services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod utils;

