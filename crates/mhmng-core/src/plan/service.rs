//! Plan service layer.
//!
//! Create/update (upsert), fetch, delete and date search for one plan kind.
//! Writes run inside a single transaction; dropping it on any error rolls
//! back.

use anyhow::Context;
use chrono::{FixedOffset, NaiveDate, Utc};
use sqlx::PgPool;
use thiserror::Error;
use tracing::debug;

use mhmng_db::models::{PlanKey, PlanKind, PlanRecord};
use mhmng_db::queries::plans as plan_queries;

use super::input::{PlanPatch, ValidationError, validate_key};
use super::time::day_window;

/// Failure of a plan operation.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The request was malformed.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The store failed; the transaction, if any, was rolled back.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

/// How an upsert treats fields the request does not mention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertMode {
    /// `PUT`: only the fields present in the request change.
    Merge,
    /// `POST`: the requested window and actual time are cleared before the
    /// request is applied; other fields merge.
    Replace,
}

/// Insert or update the plan stored under `key`.
///
/// A new row starts from the column defaults with `created_at = now`. An
/// existing row keeps its `created_at`. `updated_at` is always set to now.
///
/// The key row is created first and then locked, so concurrent writers of
/// the same key serialize on the row lock and the last one to commit wins.
pub async fn upsert_plan(
    pool: &PgPool,
    kind: PlanKind,
    key: &PlanKey,
    patch: &PlanPatch,
    mode: UpsertMode,
) -> Result<PlanRecord, PlanError> {
    validate_key(key)?;

    let now = Utc::now();
    let mut tx = pool.begin().await.context("failed to begin transaction")?;

    let created = plan_queries::insert_plan_if_absent(&mut *tx, kind, key, now).await?;
    let row = plan_queries::get_plan_for_update(&mut *tx, kind, key)
        .await?
        .with_context(|| format!("{kind} plan {key} vanished while locked"))?;

    let mut values = row.values();
    if mode == UpsertMode::Replace {
        values.requested_from_time = None;
        values.requested_to_time = None;
        values.actual_time = None;
    }
    patch.apply(&mut values);

    let plan = plan_queries::update_plan(&mut *tx, kind, row.id, &values, now).await?;

    tx.commit().await.context("failed to commit transaction")?;

    debug!(%kind, %key, ?mode, created, "plan stored");
    Ok(plan)
}

/// Fetch the plan stored under `key`.
pub async fn get_plan(
    pool: &PgPool,
    kind: PlanKind,
    key: &PlanKey,
) -> Result<Option<PlanRecord>, PlanError> {
    Ok(plan_queries::get_plan(pool, kind, key).await?)
}

/// Physically delete the plan stored under `key`.
///
/// Returns `false` when there was nothing to delete.
pub async fn delete_plan(pool: &PgPool, kind: PlanKind, key: &PlanKey) -> Result<bool, PlanError> {
    let deleted = plan_queries::delete_plan(pool, kind, key).await?;
    debug!(%kind, %key, deleted, "plan delete");
    Ok(deleted)
}

/// List the plans of `hub_id` whose requested start or end falls on `date`
/// in the hub time zone `tz`.
pub async fn search_plans_by_date(
    pool: &PgPool,
    kind: PlanKind,
    hub_id: &str,
    date: NaiveDate,
    tz: FixedOffset,
) -> Result<Vec<PlanRecord>, PlanError> {
    let (start, end) = day_window(date, tz)?;
    let plans = plan_queries::list_plans_in_window(pool, kind, hub_id, start, end).await?;
    debug!(%kind, hub_id, %date, count = plans.len(), "plan date search");
    Ok(plans)
}
