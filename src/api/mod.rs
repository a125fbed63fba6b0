pub mod dashboard;

pub use dashboard::{dashboard_router, serve, DashboardState};
