//! service-core: Shared infrastructure for the coloring page service.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
