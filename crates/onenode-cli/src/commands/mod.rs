pub mod api;
pub mod clean;
pub mod query;
