pub mod app;
pub mod cache;
pub mod error;
pub mod orchestrator;
pub mod routes;
pub mod state;
