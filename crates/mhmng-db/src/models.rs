use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which of the two plan tables a record lives in.
///
/// Vanning plans (loading) and devanning plans (unloading) share one shape but
/// are independent keyspaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Vanning,
    Devanning,
}

impl PlanKind {
    pub const ALL: [PlanKind; 2] = [PlanKind::Vanning, PlanKind::Devanning];

    /// Name of the backing table. Always a static identifier, safe to splice
    /// into SQL text.
    pub fn table(self) -> &'static str {
        match self {
            Self::Vanning => "vanning_plan",
            Self::Devanning => "devanning_plan",
        }
    }
}

impl fmt::Display for PlanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Vanning => "vanning",
            Self::Devanning => "devanning",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanKind {
    type Err = PlanKindParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vanning" => Ok(Self::Vanning),
            "devanning" => Ok(Self::Devanning),
            other => Err(PlanKindParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanKind`] string.
#[derive(Debug, Clone)]
pub struct PlanKindParseError(pub String);

impl fmt::Display for PlanKindParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan kind: {:?}", self.0)
    }
}

impl std::error::Error for PlanKindParseError {}

// ---------------------------------------------------------------------------

/// Lifecycle status of a plan. Stored and exchanged as its integer code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum PlanStatus {
    Cancel = -1,
    #[default]
    Idle = 0,
    Planning = 1,
    Done = 2,
}

impl PlanStatus {
    pub fn code(self) -> i32 {
        self as i32
    }
}

impl From<PlanStatus> for i32 {
    fn from(status: PlanStatus) -> Self {
        status.code()
    }
}

impl TryFrom<i32> for PlanStatus {
    type Error = PlanStatusParseError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(Self::Cancel),
            0 => Ok(Self::Idle),
            1 => Ok(Self::Planning),
            2 => Ok(Self::Done),
            other => Err(PlanStatusParseError(other.to_string())),
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Cancel => "cancel",
            Self::Idle => "idle",
            Self::Planning => "planning",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

impl FromStr for PlanStatus {
    type Err = PlanStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" => Ok(Self::Cancel),
            "idle" => Ok(Self::Idle),
            "planning" => Ok(Self::Planning),
            "done" => Ok(Self::Done),
            other => Err(PlanStatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`PlanStatus`] name or code.
#[derive(Debug, Clone)]
pub struct PlanStatusParseError(pub String);

impl fmt::Display for PlanStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid plan status: {:?}", self.0)
    }
}

impl std::error::Error for PlanStatusParseError {}

// ---------------------------------------------------------------------------
// 0/1 flags
// ---------------------------------------------------------------------------

/// Serde helpers for boolean columns that travel as `0`/`1` on the wire.
///
/// Deserialization also accepts JSON booleans.
pub mod flag {
    use serde::de::{self, Deserializer, Visitor};
    use serde::Serializer;
    use std::fmt;

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(u8::from(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        deserializer.deserialize_any(FlagVisitor)
    }

    /// Like [`deserialize`], for optional fields where `null` means absent.
    pub fn deserialize_option<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<bool>, D::Error> {
        deserializer.deserialize_option(OptionFlagVisitor)
    }

    struct FlagVisitor;

    impl Visitor<'_> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("0, 1, true or false")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(E::invalid_value(de::Unexpected::Unsigned(other), &self)),
            }
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            match v {
                0 => Ok(false),
                1 => Ok(true),
                other => Err(E::invalid_value(de::Unexpected::Signed(other), &self)),
            }
        }
    }

    struct OptionFlagVisitor;

    impl<'de> Visitor<'de> for OptionFlagVisitor {
        type Value = Option<bool>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("0, 1, true, false or null")
        }

        fn visit_none<E: de::Error>(self) -> Result<Option<bool>, E> {
            Ok(None)
        }

        fn visit_unit<E: de::Error>(self) -> Result<Option<bool>, E> {
            Ok(None)
        }

        fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Option<bool>, D::Error> {
            deserialize(d).map(Some)
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// Natural key of a plan within its table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlanKey {
    pub hub_id: String,
    pub transport_instruction_id: String,
}

impl PlanKey {
    pub fn new(hub_id: impl Into<String>, transport_instruction_id: impl Into<String>) -> Self {
        Self {
            hub_id: hub_id.into(),
            transport_instruction_id: transport_instruction_id.into(),
        }
    }
}

impl fmt::Display for PlanKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.hub_id, self.transport_instruction_id)
    }
}

/// A vanning or devanning plan row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct PlanRecord {
    /// Surrogate key; never exposed on the wire.
    #[serde(skip)]
    pub id: i64,
    pub hub_id: String,
    pub transport_instruction_id: String,
    pub hub_space_list: Vec<String>,
    pub shipper_id: Option<String>,
    pub recipient_id: Option<String>,
    pub carrier_id: Option<String>,
    pub tractor_id: Option<String>,
    pub trailer_id_list: Vec<String>,
    pub requested_from_time: Option<DateTime<Utc>>,
    pub requested_to_time: Option<DateTime<Utc>>,
    pub actual_time: Option<DateTime<Utc>>,
    pub status: PlanStatus,
    #[serde(with = "flag")]
    pub needs_bill_of_lading_check: bool,
    #[serde(with = "flag")]
    pub is_departure_hub: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlanRecord {
    /// The client-writable columns of this row.
    pub fn values(&self) -> PlanValues {
        PlanValues {
            hub_space_list: self.hub_space_list.clone(),
            shipper_id: self.shipper_id.clone(),
            recipient_id: self.recipient_id.clone(),
            carrier_id: self.carrier_id.clone(),
            tractor_id: self.tractor_id.clone(),
            trailer_id_list: self.trailer_id_list.clone(),
            requested_from_time: self.requested_from_time,
            requested_to_time: self.requested_to_time,
            actual_time: self.actual_time,
            status: self.status,
            needs_bill_of_lading_check: self.needs_bill_of_lading_check,
            is_departure_hub: self.is_departure_hub,
        }
    }
}

/// Client-writable columns of a plan, i.e. everything except the key, the
/// surrogate id, and the bookkeeping timestamps.
///
/// [`Default`] mirrors the column defaults of a freshly inserted row.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanValues {
    pub hub_space_list: Vec<String>,
    pub shipper_id: Option<String>,
    pub recipient_id: Option<String>,
    pub carrier_id: Option<String>,
    pub tractor_id: Option<String>,
    pub trailer_id_list: Vec<String>,
    pub requested_from_time: Option<DateTime<Utc>>,
    pub requested_to_time: Option<DateTime<Utc>>,
    pub actual_time: Option<DateTime<Utc>>,
    pub status: PlanStatus,
    pub needs_bill_of_lading_check: bool,
    pub is_departure_hub: bool,
}

impl Default for PlanValues {
    fn default() -> Self {
        Self {
            hub_space_list: Vec::new(),
            shipper_id: None,
            recipient_id: None,
            carrier_id: None,
            tractor_id: None,
            trailer_id_list: Vec::new(),
            requested_from_time: None,
            requested_to_time: None,
            actual_time: None,
            status: PlanStatus::Idle,
            needs_bill_of_lading_check: false,
            is_departure_hub: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn plan_kind_display_roundtrip() {
        for kind in PlanKind::ALL {
            let parsed: PlanKind = kind.to_string().parse().expect("should parse");
            assert_eq!(kind, parsed);
        }
        assert_eq!(PlanKind::Vanning.table(), "vanning_plan");
        assert_eq!(PlanKind::Devanning.table(), "devanning_plan");
    }

    #[test]
    fn plan_kind_invalid() {
        assert!("unloading".parse::<PlanKind>().is_err());
    }

    #[test]
    fn plan_status_codes() {
        assert_eq!(PlanStatus::Cancel.code(), -1);
        assert_eq!(PlanStatus::Idle.code(), 0);
        assert_eq!(PlanStatus::Planning.code(), 1);
        assert_eq!(PlanStatus::Done.code(), 2);
        assert_eq!(PlanStatus::try_from(2).unwrap(), PlanStatus::Done);
        assert!(PlanStatus::try_from(3).is_err());
        assert_eq!("planning".parse::<PlanStatus>().unwrap(), PlanStatus::Planning);
    }

    #[test]
    fn plan_status_json_is_integer() {
        assert_eq!(serde_json::to_string(&PlanStatus::Cancel).unwrap(), "-1");
        let parsed: PlanStatus = serde_json::from_str("1").unwrap();
        assert_eq!(parsed, PlanStatus::Planning);
        assert!(serde_json::from_str::<PlanStatus>("7").is_err());
        assert!(serde_json::from_str::<PlanStatus>("\"done\"").is_err());
    }

    #[derive(Debug, Deserialize)]
    struct Flags {
        #[serde(deserialize_with = "flag::deserialize")]
        required: bool,
        #[serde(default, deserialize_with = "flag::deserialize_option")]
        optional: Option<bool>,
    }

    #[test]
    fn flag_accepts_integers_and_booleans() {
        let f: Flags = serde_json::from_str(r#"{"required": 1, "optional": false}"#).unwrap();
        assert!(f.required);
        assert_eq!(f.optional, Some(false));

        let f: Flags = serde_json::from_str(r#"{"required": true, "optional": null}"#).unwrap();
        assert!(f.required);
        assert_eq!(f.optional, None);

        let f: Flags = serde_json::from_str(r#"{"required": 0}"#).unwrap();
        assert!(!f.required);
        assert_eq!(f.optional, None);
    }

    #[test]
    fn flag_rejects_other_values() {
        assert!(serde_json::from_str::<Flags>(r#"{"required": 2}"#).is_err());
        assert!(serde_json::from_str::<Flags>(r#"{"required": "1"}"#).is_err());
        assert!(serde_json::from_str::<Flags>(r#"{"required": 0, "optional": -1}"#).is_err());
    }

    #[test]
    fn plan_record_serializes_flags_as_integers_and_hides_id() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 10, 3, 0, 0).unwrap();
        let record = PlanRecord {
            id: 42,
            hub_id: "9930000010017".into(),
            transport_instruction_id: "20241024".into(),
            hub_space_list: vec!["1".into(), "2".into()],
            shipper_id: None,
            recipient_id: None,
            carrier_id: None,
            tractor_id: None,
            trailer_id_list: vec![],
            requested_from_time: Some(ts),
            requested_to_time: None,
            actual_time: None,
            status: PlanStatus::Planning,
            needs_bill_of_lading_check: false,
            is_departure_hub: true,
            created_at: ts,
            updated_at: ts,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("id").is_none());
        assert_eq!(json["is_departure_hub"], 1);
        assert_eq!(json["needs_bill_of_lading_check"], 0);
        assert_eq!(json["status"], 1);
        assert_eq!(json["hub_space_list"], serde_json::json!(["1", "2"]));
        assert_eq!(json["trailer_id_list"], serde_json::json!([]));
        assert_eq!(json["requested_from_time"], "2025-01-10T03:00:00Z");
        assert!(json["actual_time"].is_null());
    }

    #[test]
    fn plan_values_default_matches_column_defaults() {
        let v = PlanValues::default();
        assert_eq!(v.status, PlanStatus::Idle);
        assert!(v.is_departure_hub);
        assert!(!v.needs_bill_of_lading_check);
        assert!(v.hub_space_list.is_empty());
    }
}
