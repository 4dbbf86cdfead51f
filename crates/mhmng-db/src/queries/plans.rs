//! Database query functions for the `vanning_plan` and `devanning_plan`
//! tables.
//!
//! Every function takes the [`PlanKind`] selecting the table, and any
//! executor so callers can run them on the pool or inside a transaction.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::PgExecutor;

use crate::models::{PlanKey, PlanKind, PlanRecord, PlanValues};

/// Fetch a plan by its natural key.
pub async fn get_plan<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: PlanKind,
    key: &PlanKey,
) -> Result<Option<PlanRecord>> {
    let sql = format!(
        "SELECT * FROM {} WHERE hub_id = $1 AND transport_instruction_id = $2",
        kind.table()
    );
    let plan = sqlx::query_as::<_, PlanRecord>(&sql)
        .bind(&key.hub_id)
        .bind(&key.transport_instruction_id)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("failed to fetch {kind} plan {key}"))?;

    Ok(plan)
}

/// Fetch a plan by its natural key and lock the row until the surrounding
/// transaction ends.
pub async fn get_plan_for_update<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: PlanKind,
    key: &PlanKey,
) -> Result<Option<PlanRecord>> {
    let sql = format!(
        "SELECT * FROM {} WHERE hub_id = $1 AND transport_instruction_id = $2 FOR UPDATE",
        kind.table()
    );
    let plan = sqlx::query_as::<_, PlanRecord>(&sql)
        .bind(&key.hub_id)
        .bind(&key.transport_instruction_id)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("failed to lock {kind} plan {key}"))?;

    Ok(plan)
}

/// Insert a bare row for `key` with column defaults and
/// `created_at = updated_at = now`, unless the key already exists.
///
/// Returns `true` if this call created the row. A concurrent insert of the
/// same key blocks until the other transaction ends, then does nothing.
pub async fn insert_plan_if_absent<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: PlanKind,
    key: &PlanKey,
    now: DateTime<Utc>,
) -> Result<bool> {
    let sql = format!(
        "INSERT INTO {} (hub_id, transport_instruction_id, created_at, updated_at) \
         VALUES ($1, $2, $3, $3) \
         ON CONFLICT (hub_id, transport_instruction_id) DO NOTHING",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(&key.hub_id)
        .bind(&key.transport_instruction_id)
        .bind(now)
        .execute(executor)
        .await
        .with_context(|| format!("failed to insert {kind} plan {key}"))?;

    Ok(result.rows_affected() > 0)
}

/// Overwrite every client-writable column of the row with surrogate `id` and
/// set `updated_at = now`. `created_at` is left untouched.
pub async fn update_plan<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: PlanKind,
    id: i64,
    values: &PlanValues,
    now: DateTime<Utc>,
) -> Result<PlanRecord> {
    let sql = format!(
        "UPDATE {} SET hub_space_list = $2, shipper_id = $3, recipient_id = $4, \
         carrier_id = $5, tractor_id = $6, trailer_id_list = $7, \
         requested_from_time = $8, requested_to_time = $9, actual_time = $10, \
         status = $11, needs_bill_of_lading_check = $12, is_departure_hub = $13, \
         updated_at = $14 \
         WHERE id = $1 \
         RETURNING *",
        kind.table()
    );
    let plan = sqlx::query_as::<_, PlanRecord>(&sql)
        .bind(id)
        .bind(&values.hub_space_list)
        .bind(&values.shipper_id)
        .bind(&values.recipient_id)
        .bind(&values.carrier_id)
        .bind(&values.tractor_id)
        .bind(&values.trailer_id_list)
        .bind(values.requested_from_time)
        .bind(values.requested_to_time)
        .bind(values.actual_time)
        .bind(values.status)
        .bind(values.needs_bill_of_lading_check)
        .bind(values.is_departure_hub)
        .bind(now)
        .fetch_optional(executor)
        .await
        .with_context(|| format!("failed to update {kind} plan {id}"))?;

    plan.with_context(|| format!("{kind} plan {id} not found"))
}

/// Delete a plan by its natural key. Returns `true` if a row was removed.
pub async fn delete_plan<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: PlanKind,
    key: &PlanKey,
) -> Result<bool> {
    let sql = format!(
        "DELETE FROM {} WHERE hub_id = $1 AND transport_instruction_id = $2",
        kind.table()
    );
    let result = sqlx::query(&sql)
        .bind(&key.hub_id)
        .bind(&key.transport_instruction_id)
        .execute(executor)
        .await
        .with_context(|| format!("failed to delete {kind} plan {key}"))?;

    Ok(result.rows_affected() > 0)
}

/// List plans of a hub whose requested window starts or ends inside the
/// half-open interval `[start, end)`, in insertion order.
pub async fn list_plans_in_window<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: PlanKind,
    hub_id: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Result<Vec<PlanRecord>> {
    let sql = format!(
        "SELECT * FROM {} \
         WHERE hub_id = $1 \
           AND ((requested_from_time >= $2 AND requested_from_time < $3) \
             OR (requested_to_time >= $2 AND requested_to_time < $3)) \
         ORDER BY id",
        kind.table()
    );
    let plans = sqlx::query_as::<_, PlanRecord>(&sql)
        .bind(hub_id)
        .bind(start)
        .bind(end)
        .fetch_all(executor)
        .await
        .with_context(|| format!("failed to search {kind} plans of hub {hub_id}"))?;

    Ok(plans)
}

/// Find the first plan (by insertion order) for a transport instruction on
/// the departure or arrival side, regardless of hub.
pub async fn find_plan_by_instruction<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: PlanKind,
    is_departure_hub: bool,
    transport_instruction_id: &str,
) -> Result<Option<PlanRecord>> {
    let sql = format!(
        "SELECT * FROM {} \
         WHERE is_departure_hub = $1 AND transport_instruction_id = $2 \
         ORDER BY id \
         LIMIT 1",
        kind.table()
    );
    let plan = sqlx::query_as::<_, PlanRecord>(&sql)
        .bind(is_departure_hub)
        .bind(transport_instruction_id)
        .fetch_optional(executor)
        .await
        .with_context(|| {
            format!("failed to find {kind} plan for instruction {transport_instruction_id}")
        })?;

    Ok(plan)
}

/// Count plans sharing an instruction id and departure flag across hubs.
///
/// The cross search keys on these two columns only, so a count above one
/// means its answer is ambiguous.
pub async fn count_plans_by_instruction<'e, E: PgExecutor<'e>>(
    executor: E,
    kind: PlanKind,
    is_departure_hub: bool,
    transport_instruction_id: &str,
) -> Result<i64> {
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE is_departure_hub = $1 AND transport_instruction_id = $2",
        kind.table()
    );
    let count: i64 = sqlx::query_scalar(&sql)
        .bind(is_departure_hub)
        .bind(transport_instruction_id)
        .fetch_one(executor)
        .await
        .context("failed to count plans by instruction")?;

    Ok(count)
}
