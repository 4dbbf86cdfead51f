//! Plan management: payload validation, service layer, cross-plan search.

pub mod input;
pub mod search;
pub mod service;
pub mod time;

pub use input::{PlanInput, PlanPatch, ValidationError, validate_key};
pub use search::{CrossSearch, find_plan};
pub use service::{
    PlanError, UpsertMode, delete_plan, get_plan, search_plans_by_date, upsert_plan,
};
pub use time::{day_window, parse_search_date, parse_timestamp, parse_utc_offset};
