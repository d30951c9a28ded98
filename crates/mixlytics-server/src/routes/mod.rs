pub mod accounts;
pub mod attribution;
pub mod forecast;
pub mod health;
pub mod jobs;
pub mod optimizer;
