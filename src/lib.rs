pub mod api;
pub mod axis;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod query;
pub mod retry;
pub mod scheduler;
pub mod source;

pub use error::{DashboardError, FetchFailureKind, Result};
