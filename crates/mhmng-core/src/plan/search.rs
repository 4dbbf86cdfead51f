//! Lookup of a plan by transport instruction across the two plan tables.

use std::collections::HashMap;

use sqlx::PgPool;
use tracing::{debug, warn};

use mhmng_db::models::{PlanKind, PlanRecord};
use mhmng_db::queries::plans as plan_queries;

use super::input::ValidationError;
use super::service::PlanError;

/// Parameters of a cross-plan search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossSearch {
    pub kind: PlanKind,
    pub is_departure_hub: bool,
    pub transport_instruction_id: String,
}

impl CrossSearch {
    /// Read the query string parameters `is_departure_mh` (default 0),
    /// `transport_instruction_id` (required, alias `trsp_instruction_id`)
    /// and `is_vanning` (default 0).
    pub fn from_params(params: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let is_departure_hub = flag_param(params, "is_departure_mh")?;
        let is_vanning = flag_param(params, "is_vanning")?;
        let transport_instruction_id = params
            .get("transport_instruction_id")
            .or_else(|| params.get("trsp_instruction_id"))
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or(ValidationError::Missing("transport_instruction_id"))?
            .to_owned();

        Ok(Self {
            kind: if is_vanning {
                PlanKind::Vanning
            } else {
                PlanKind::Devanning
            },
            is_departure_hub,
            transport_instruction_id,
        })
    }
}

fn flag_param(params: &HashMap<String, String>, name: &'static str) -> Result<bool, ValidationError> {
    match params.get(name).map(|s| s.trim()) {
        None | Some("") => Ok(false),
        Some(raw) => match raw.parse::<i64>() {
            Ok(0) => Ok(false),
            Ok(1) => Ok(true),
            _ => Err(ValidationError::BadFlag {
                name,
                value: raw.to_owned(),
            }),
        },
    }
}

/// Find a plan by departure flag and instruction id in the table selected by
/// `search.kind`.
///
/// Hub id is not part of the lookup. When several hubs hold a matching plan
/// the earliest inserted one is returned and a warning is logged.
pub async fn find_plan(pool: &PgPool, search: &CrossSearch) -> Result<Option<PlanRecord>, PlanError> {
    let plan = plan_queries::find_plan_by_instruction(
        pool,
        search.kind,
        search.is_departure_hub,
        &search.transport_instruction_id,
    )
    .await?;

    if plan.is_some() {
        let matches = plan_queries::count_plans_by_instruction(
            pool,
            search.kind,
            search.is_departure_hub,
            &search.transport_instruction_id,
        )
        .await?;
        if matches > 1 {
            warn!(
                kind = %search.kind,
                transport_instruction_id = %search.transport_instruction_id,
                is_departure_hub = search.is_departure_hub,
                matches,
                "cross-plan search matched plans at several hubs; returning the first"
            );
        }
    }

    debug!(kind = %search.kind, found = plan.is_some(), "cross-plan search");
    Ok(plan)
}
