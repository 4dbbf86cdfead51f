//! Static description of the plan payload and the API document built from it.
//!
//! The field table drives the length limits and the accepted aliases used
//! when parsing request bodies, and the published OpenAPI schemas.

use serde_json::{Map, Value, json};

use mhmng_db::models::PlanKind;

/// Path prefix every plan route is mounted under.
pub const API_BASE_PATH: &str = "/mhapi/v1";

/// Wire type of a plan field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text { max_len: usize },
    TextList,
    Timestamp,
    Status,
    Flag,
}

/// Example value shown in the API document.
#[derive(Debug, Clone, Copy)]
pub enum Example {
    Text(&'static str),
    TextList(&'static [&'static str]),
    Integer(i64),
}

impl Example {
    fn to_json(self) -> Value {
        match self {
            Self::Text(s) => json!(s),
            Self::TextList(items) => json!(items),
            Self::Integer(n) => json!(n),
        }
    }
}

/// One plan field as seen on the wire.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    /// Legacy Mobility Hub API name, renamed to `name` on input.
    pub alias: Option<&'static str>,
    pub field_type: FieldType,
    pub nullable: bool,
    /// Set by the server, ignored on input.
    pub server_managed: bool,
    pub description: &'static str,
    pub example: Example,
}

impl FieldSpec {
    pub fn max_len(&self) -> Option<usize> {
        match self.field_type {
            FieldType::Text { max_len } => Some(max_len),
            _ => None,
        }
    }

    fn json_schema(&self) -> Value {
        let mut obj = Map::new();
        match self.field_type {
            FieldType::Text { max_len } => {
                obj.insert("type".into(), json!("string"));
                obj.insert("maxLength".into(), json!(max_len));
            }
            FieldType::TextList => {
                obj.insert("type".into(), json!("array"));
                obj.insert(
                    "items".into(),
                    json!({ "type": "string", "pattern": "^[^,]*$" }),
                );
            }
            FieldType::Timestamp => {
                obj.insert("type".into(), json!("string"));
                obj.insert("format".into(), json!("date-time"));
            }
            FieldType::Status => {
                obj.insert("type".into(), json!("integer"));
                obj.insert("enum".into(), json!([-1, 0, 1, 2]));
            }
            FieldType::Flag => {
                obj.insert("type".into(), json!("integer"));
                obj.insert("enum".into(), json!([0, 1]));
            }
        }
        obj.insert("description".into(), json!(self.description));
        obj.insert("example".into(), self.example.to_json());
        if self.nullable {
            obj.insert("nullable".into(), json!(true));
        }
        if self.server_managed {
            obj.insert("readOnly".into(), json!(true));
        }
        if let Some(alias) = self.alias {
            obj.insert("x-alias".into(), json!(alias));
        }
        Value::Object(obj)
    }
}

pub static HUB_ID: FieldSpec = FieldSpec {
    name: "hub_id",
    alias: Some("mh"),
    field_type: FieldType::Text { max_len: 16 },
    nullable: false,
    server_managed: false,
    description: "Mobility Hub GLN (3-digit prefix + 13 digits)",
    example: Example::Text("9930000010017"),
};

pub static TRANSPORT_INSTRUCTION_ID: FieldSpec = FieldSpec {
    name: "transport_instruction_id",
    alias: Some("trsp_instruction_id"),
    field_type: FieldType::Text { max_len: 20 },
    nullable: false,
    server_managed: false,
    description: "Transport instruction fulfilled by this plan",
    example: Example::Text("20241024"),
};

pub static HUB_SPACE_LIST: FieldSpec = FieldSpec {
    name: "hub_space_list",
    alias: Some("mh_space_list"),
    field_type: FieldType::TextList,
    nullable: false,
    server_managed: false,
    description: "Hub parking spaces used by the operation",
    example: Example::TextList(&["1", "2"]),
};

pub static SHIPPER_ID: FieldSpec = FieldSpec {
    name: "shipper_id",
    alias: Some("shipper_cid"),
    field_type: FieldType::Text { max_len: 50 },
    nullable: true,
    server_managed: false,
    description: "Business id of the shipper",
    example: Example::Text("990000001"),
};

pub static RECIPIENT_ID: FieldSpec = FieldSpec {
    name: "recipient_id",
    alias: Some("recipient_cid"),
    field_type: FieldType::Text { max_len: 50 },
    nullable: true,
    server_managed: false,
    description: "Business id of the recipient",
    example: Example::Text("991000001"),
};

pub static CARRIER_ID: FieldSpec = FieldSpec {
    name: "carrier_id",
    alias: Some("carrier_cid"),
    field_type: FieldType::Text { max_len: 50 },
    nullable: true,
    server_managed: false,
    description: "Business id of the carrier",
    example: Example::Text("992000001"),
};

pub static TRACTOR_ID: FieldSpec = FieldSpec {
    name: "tractor_id",
    alias: Some("tractor_giai"),
    field_type: FieldType::Text { max_len: 34 },
    nullable: true,
    server_managed: false,
    description: "GIAI of the tractor",
    example: Example::Text("8004990000001000000000000000000001"),
};

pub static TRAILER_ID_LIST: FieldSpec = FieldSpec {
    name: "trailer_id_list",
    alias: Some("trailer_giai_list"),
    field_type: FieldType::TextList,
    nullable: false,
    server_managed: false,
    description: "GIAIs of the trailers",
    example: Example::TextList(&[
        "8004991000001000000000000000000001",
        "8004991000001000000000000000000002",
    ]),
};

pub static REQUESTED_FROM_TIME: FieldSpec = FieldSpec {
    name: "requested_from_time",
    alias: Some("req_from_time"),
    field_type: FieldType::Timestamp,
    nullable: true,
    server_managed: false,
    description: "Requested start of work at the hub",
    example: Example::Text("2025-01-10T12:00:00+09:00"),
};

pub static REQUESTED_TO_TIME: FieldSpec = FieldSpec {
    name: "requested_to_time",
    alias: Some("req_to_time"),
    field_type: FieldType::Timestamp,
    nullable: true,
    server_managed: false,
    description: "Requested end of work at the hub",
    example: Example::Text("2025-01-10T12:10:00+09:00"),
};

pub static ACTUAL_TIME: FieldSpec = FieldSpec {
    name: "actual_time",
    alias: None,
    field_type: FieldType::Timestamp,
    nullable: true,
    server_managed: false,
    description: "Recorded completion of work at the hub",
    example: Example::Text("2025-01-10T12:05:00+09:00"),
};

pub static STATUS: FieldSpec = FieldSpec {
    name: "status",
    alias: None,
    field_type: FieldType::Status,
    nullable: false,
    server_managed: false,
    description: "Status: idle(0), planning(1), done(2), cancel(-1)",
    example: Example::Integer(1),
};

pub static NEEDS_BILL_OF_LADING_CHECK: FieldSpec = FieldSpec {
    name: "needs_bill_of_lading_check",
    alias: Some("is_bl_need"),
    field_type: FieldType::Flag,
    nullable: false,
    server_managed: false,
    description: "B/L check required (1 only at the arrival hub)",
    example: Example::Integer(0),
};

pub static IS_DEPARTURE_HUB: FieldSpec = FieldSpec {
    name: "is_departure_hub",
    alias: Some("is_departure_mh"),
    field_type: FieldType::Flag,
    nullable: false,
    server_managed: false,
    description: "1 at the departure hub, 0 at the arrival hub",
    example: Example::Integer(1),
};

pub static CREATED_AT: FieldSpec = FieldSpec {
    name: "created_at",
    alias: None,
    field_type: FieldType::Timestamp,
    nullable: false,
    server_managed: true,
    description: "Creation time",
    example: Example::Text("2025-01-01T15:00:00Z"),
};

pub static UPDATED_AT: FieldSpec = FieldSpec {
    name: "updated_at",
    alias: None,
    field_type: FieldType::Timestamp,
    nullable: false,
    server_managed: true,
    description: "Last update time",
    example: Example::Text("2025-01-01T17:00:00Z"),
};

/// Every plan field in serialization order.
pub static PLAN_FIELDS: [&FieldSpec; 16] = [
    &HUB_ID,
    &TRANSPORT_INSTRUCTION_ID,
    &HUB_SPACE_LIST,
    &SHIPPER_ID,
    &RECIPIENT_ID,
    &CARRIER_ID,
    &TRACTOR_ID,
    &TRAILER_ID_LIST,
    &REQUESTED_FROM_TIME,
    &REQUESTED_TO_TIME,
    &ACTUAL_TIME,
    &STATUS,
    &NEEDS_BILL_OF_LADING_CHECK,
    &IS_DEPARTURE_HUB,
    &CREATED_AT,
    &UPDATED_AT,
];

/// Look up a field by wire name or alias.
pub fn field(name: &str) -> Option<&'static FieldSpec> {
    PLAN_FIELDS
        .iter()
        .copied()
        .find(|f| f.name == name || f.alias == Some(name))
}

fn object_schema<'a>(fields: impl Iterator<Item = &'a FieldSpec>) -> Value {
    let properties: Map<String, Value> = fields
        .map(|f| (f.name.to_owned(), f.json_schema()))
        .collect();
    json!({ "type": "object", "properties": properties })
}

fn envelope_schema(payload_key: &str, payload: Value) -> Value {
    let mut properties = Map::new();
    properties.insert(payload_key.to_owned(), payload);
    properties.insert(
        "result".into(),
        json!({ "type": "boolean", "example": true, "description": "API result" }),
    );
    properties.insert(
        "error_msg".into(),
        json!({ "type": "string", "example": "", "description": "Error message" }),
    );
    json!({ "type": "object", "properties": properties })
}

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{name}") })
}

fn json_response(description: &str, schema: &str) -> Value {
    json!({
        "description": description,
        "content": { "application/json": { "schema": schema_ref(schema) } },
    })
}

fn title(kind: PlanKind) -> &'static str {
    match kind {
        PlanKind::Vanning => "Vanning",
        PlanKind::Devanning => "Devanning",
    }
}

fn string_param(name: &str, location: &str, required: bool, description: &str) -> Value {
    json!({
        "name": name,
        "in": location,
        "required": required,
        "description": description,
        "schema": { "type": "string" },
    })
}

fn flag_param(name: &str, description: &str) -> Value {
    json!({
        "name": name,
        "in": "query",
        "required": false,
        "description": description,
        "schema": { "type": "integer", "enum": [0, 1], "default": 0 },
    })
}

fn plan_paths(kind: PlanKind, paths: &mut Map<String, Value>, schemas: &mut Map<String, Value>) {
    let t = title(kind);
    let body = format!("{t}PlanBody");
    let plan = format!("{t}Plan");
    let result = format!("{t}PlanResult");
    let list_result = format!("{t}PlanListResult");
    let key = format!("{kind}_plan");
    let list_key = format!("{kind}_plan_list");

    schemas.insert(
        body.clone(),
        object_schema(PLAN_FIELDS.iter().copied().filter(|f| !f.server_managed)),
    );
    schemas.insert(plan.clone(), object_schema(PLAN_FIELDS.iter().copied()));
    schemas.insert(result.clone(), envelope_schema(&key, schema_ref(&plan)));
    schemas.insert(
        list_result.clone(),
        envelope_schema(&list_key, json!({ "type": "array", "items": schema_ref(&plan) })),
    );

    let key_params = json!([
        string_param("hub_id", "path", true, "Mobility Hub GLN"),
        string_param("transport_instruction_id", "path", true, "Transport instruction id"),
    ]);
    let request_body = json!({
        "required": true,
        "content": { "application/json": { "schema": schema_ref(&body) } },
    });

    paths.insert(
        format!("/{key}/{{hub_id}}/{{transport_instruction_id}}"),
        json!({
            "parameters": key_params,
            "put": {
                "summary": format!("Update or insert a {kind} plan (fields merge)"),
                "requestBody": request_body,
                "responses": {
                    "200": json_response("Stored plan", &result),
                    "400": json_response("Invalid input or storage error", &result),
                },
            },
            "post": {
                "summary": format!("Create or replace a {kind} plan (time window reset)"),
                "requestBody": request_body,
                "responses": {
                    "200": json_response("Stored plan", &result),
                    "400": json_response("Invalid input or storage error", &result),
                },
            },
            "get": {
                "summary": format!("Fetch a {kind} plan"),
                "responses": {
                    "200": json_response("Plan, or result=false when absent", &result),
                    "400": json_response("Storage error", &result),
                },
            },
            "delete": {
                "summary": format!("Delete a {kind} plan"),
                "responses": {
                    "200": json_response("Deleted", "DeleteResult"),
                    "403": json_response("No such plan", "DeleteResult"),
                    "400": json_response("Storage error", "DeleteResult"),
                },
            },
        }),
    );

    paths.insert(
        format!("/{key}/{{hub_id}}"),
        json!({
            "get": {
                "summary": format!("Search {kind} plans of a hub by requested date"),
                "parameters": [
                    string_param("hub_id", "path", true, "Mobility Hub GLN"),
                    string_param("date", "query", true, "Search date [YYYYMMDD]"),
                ],
                "responses": {
                    "200": json_response("Matching plans", &list_result),
                    "400": json_response("Missing or invalid date, or storage error", &list_result),
                },
            },
        }),
    );
}

/// Build the OpenAPI 3 document describing the HTTP API.
pub fn openapi_document() -> Value {
    let mut paths = Map::new();
    let mut schemas = Map::new();

    for kind in PlanKind::ALL {
        plan_paths(kind, &mut paths, &mut schemas);
    }

    schemas.insert(
        "DeleteResult".into(),
        json!({
            "type": "object",
            "properties": {
                "result": { "type": "boolean", "example": true },
                "error_msg": { "type": "string", "example": "" },
            },
        }),
    );
    schemas.insert(
        "PlanSearchResult".into(),
        envelope_schema("plan", schema_ref("VanningPlan")),
    );

    paths.insert(
        "/plan_search/".into(),
        json!({
            "get": {
                "summary": "Find a vanning or devanning plan by transport instruction",
                "parameters": [
                    flag_param("is_departure_mh", "1 for the departure hub, 0 for the arrival hub"),
                    string_param("transport_instruction_id", "query", true, "Transport instruction id"),
                    flag_param("is_vanning", "1 for vanning plans, 0 for devanning plans"),
                ],
                "responses": {
                    "200": json_response("Plan", "PlanSearchResult"),
                    "404": json_response("No such plan", "PlanSearchResult"),
                    "400": json_response("Invalid parameters or storage error", "PlanSearchResult"),
                },
            },
        }),
    );

    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "Mobility Hub Management System API",
            "version": env!("CARGO_PKG_VERSION"),
        },
        "servers": [{ "url": API_BASE_PATH }],
        "paths": paths,
        "components": { "schemas": schemas },
    })
}
