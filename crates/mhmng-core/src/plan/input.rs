//! Plan payload parsing and validation.
//!
//! A request body is first deserialized into a loose [`PlanInput`] (every
//! field optional, the aliases from [`schema::PLAN_FIELDS`] accepted) and then
//! checked and converted into a typed [`PlanPatch`] that can be applied to
//! stored values.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use thiserror::Error;

use mhmng_db::models::{PlanKey, PlanStatus, PlanValues, flag};

use super::time::parse_timestamp;
use crate::schema::{self, FieldSpec};

/// Delimiter that list items may not contain.
pub const LIST_DELIMITER: char = ',';

/// Client-side errors: the request can never succeed as sent.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} exceeds {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("{field} is not a valid timestamp: {value:?}")]
    BadTimestamp { field: &'static str, value: String },

    #[error("{field} item {item:?} contains the list delimiter")]
    ListItemDelimiter { field: &'static str, item: String },

    #[error("invalid request body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("request body must be a JSON object")]
    NotAnObject,

    #[error("invalid date {0:?} (expected YYYYMMDD)")]
    BadDate(String),

    #[error("invalid {name} {value:?} (expected 0 or 1)")]
    BadFlag { name: &'static str, value: String },

    #[error("{0} is missing")]
    Missing(&'static str),
}

/// Deserialize a field whose presence matters even when it is `null`.
///
/// Absent → `None` (via `#[serde(default)]`), `null` → `Some(None)`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// A partial plan as sent by a client.
///
/// Key fields and server-managed timestamps in the body are ignored; the key
/// always comes from the request path.
#[derive(Debug, Default, Deserialize)]
pub struct PlanInput {
    #[serde(default)]
    pub hub_space_list: Option<Vec<String>>,
    #[serde(default, deserialize_with = "present")]
    pub shipper_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub recipient_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub carrier_id: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub tractor_id: Option<Option<String>>,
    #[serde(default)]
    pub trailer_id_list: Option<Vec<String>>,
    #[serde(default)]
    pub requested_from_time: Option<String>,
    #[serde(default)]
    pub requested_to_time: Option<String>,
    #[serde(default)]
    pub actual_time: Option<String>,
    #[serde(default)]
    pub status: Option<PlanStatus>,
    #[serde(default, deserialize_with = "flag::deserialize_option")]
    pub needs_bill_of_lading_check: Option<bool>,
    #[serde(default, deserialize_with = "flag::deserialize_option")]
    pub is_departure_hub: Option<bool>,
}

impl PlanInput {
    /// Parse a request body. The body must be a JSON object.
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        let Value::Object(fields) = serde_json::from_slice::<Value>(body)? else {
            return Err(ValidationError::NotAnObject);
        };
        Ok(serde_json::from_value(Value::Object(canonical_names(fields)))?)
    }

    /// Validate lengths and list items, parse timestamps in `tz`.
    pub fn into_patch(self, tz: FixedOffset) -> Result<PlanPatch, ValidationError> {
        check_list(&schema::HUB_SPACE_LIST, self.hub_space_list.as_deref())?;
        check_list(&schema::TRAILER_ID_LIST, self.trailer_id_list.as_deref())?;
        for (spec, value) in [
            (&schema::SHIPPER_ID, &self.shipper_id),
            (&schema::RECIPIENT_ID, &self.recipient_id),
            (&schema::CARRIER_ID, &self.carrier_id),
            (&schema::TRACTOR_ID, &self.tractor_id),
        ] {
            if let Some(Some(v)) = value {
                check_len(spec, v)?;
            }
        }

        Ok(PlanPatch {
            requested_from_time: parse_timestamp(
                schema::REQUESTED_FROM_TIME.name,
                self.requested_from_time.as_deref(),
                tz,
            )?,
            requested_to_time: parse_timestamp(
                schema::REQUESTED_TO_TIME.name,
                self.requested_to_time.as_deref(),
                tz,
            )?,
            actual_time: parse_timestamp(schema::ACTUAL_TIME.name, self.actual_time.as_deref(), tz)?,
            hub_space_list: self.hub_space_list,
            shipper_id: self.shipper_id,
            recipient_id: self.recipient_id,
            carrier_id: self.carrier_id,
            tractor_id: self.tractor_id,
            trailer_id_list: self.trailer_id_list,
            status: self.status,
            needs_bill_of_lading_check: self.needs_bill_of_lading_check,
            is_departure_hub: self.is_departure_hub,
        })
    }
}

/// Rename fields sent under a table alias to their wire name. When a body
/// carries both, the wire name wins.
fn canonical_names(fields: Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(fields.len());
    for (name, value) in fields {
        match schema::field(&name) {
            Some(spec) if spec.name != name => {
                out.entry(spec.name).or_insert(value);
            }
            _ => {
                out.insert(name, value);
            }
        }
    }
    out
}

/// A validated partial update. `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanPatch {
    pub hub_space_list: Option<Vec<String>>,
    pub shipper_id: Option<Option<String>>,
    pub recipient_id: Option<Option<String>>,
    pub carrier_id: Option<Option<String>>,
    pub tractor_id: Option<Option<String>>,
    pub trailer_id_list: Option<Vec<String>>,
    pub requested_from_time: Option<DateTime<Utc>>,
    pub requested_to_time: Option<DateTime<Utc>>,
    pub actual_time: Option<DateTime<Utc>>,
    pub status: Option<PlanStatus>,
    pub needs_bill_of_lading_check: Option<bool>,
    pub is_departure_hub: Option<bool>,
}

impl PlanPatch {
    /// Copy every present field onto `values`.
    pub fn apply(&self, values: &mut PlanValues) {
        if let Some(v) = &self.hub_space_list {
            values.hub_space_list = v.clone();
        }
        if let Some(v) = &self.shipper_id {
            values.shipper_id = v.clone();
        }
        if let Some(v) = &self.recipient_id {
            values.recipient_id = v.clone();
        }
        if let Some(v) = &self.carrier_id {
            values.carrier_id = v.clone();
        }
        if let Some(v) = &self.tractor_id {
            values.tractor_id = v.clone();
        }
        if let Some(v) = &self.trailer_id_list {
            values.trailer_id_list = v.clone();
        }
        if let Some(v) = self.requested_from_time {
            values.requested_from_time = Some(v);
        }
        if let Some(v) = self.requested_to_time {
            values.requested_to_time = Some(v);
        }
        if let Some(v) = self.actual_time {
            values.actual_time = Some(v);
        }
        if let Some(v) = self.status {
            values.status = v;
        }
        if let Some(v) = self.needs_bill_of_lading_check {
            values.needs_bill_of_lading_check = v;
        }
        if let Some(v) = self.is_departure_hub {
            values.is_departure_hub = v;
        }
    }
}

/// Check the path key against the column limits.
pub fn validate_key(key: &PlanKey) -> Result<(), ValidationError> {
    check_len(&schema::HUB_ID, &key.hub_id)?;
    check_len(&schema::TRANSPORT_INSTRUCTION_ID, &key.transport_instruction_id)
}

fn check_len(spec: &FieldSpec, value: &str) -> Result<(), ValidationError> {
    match spec.max_len() {
        Some(max) if value.chars().count() > max => Err(ValidationError::TooLong {
            field: spec.name,
            max,
        }),
        _ => Ok(()),
    }
}

fn check_list(spec: &FieldSpec, items: Option<&[String]>) -> Result<(), ValidationError> {
    for item in items.unwrap_or_default() {
        if item.contains(LIST_DELIMITER) {
            return Err(ValidationError::ListItemDelimiter {
                field: spec.name,
                item: item.clone(),
            });
        }
    }
    Ok(())
}
