//! Vanning and devanning plan logic for Mobility Hubs.

pub mod plan;
pub mod schema;
