//! Persistence for Mobility Hub vanning and devanning plans.

pub mod config;
pub mod models;
pub mod pool;
pub mod queries;
