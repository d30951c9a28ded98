//! The three stateless computational units of the analytics pipeline.
//!
//! Each model is a pure function from (historical data, parameters) to a
//! result object plus diagnostics. Nothing here touches a store or a clock;
//! the orchestrator and the HTTP layer own those concerns.

pub mod attribution;
pub mod forecast;
pub mod linalg;
pub mod optimizer;
