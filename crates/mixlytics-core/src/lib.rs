pub mod config;
pub mod error;
pub mod job;
pub mod memory;
pub mod metrics;
pub mod results;
pub mod store;
