pub mod common;
pub mod observability;
pub mod pipeline;

// Layered boundaries for application and infrastructure
pub mod app;
pub mod infra;

pub use common::error::{EnricherError, FetchError, Result};
