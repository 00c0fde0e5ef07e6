pub mod env;
pub mod infra;
pub mod pipeline;
pub mod services;
