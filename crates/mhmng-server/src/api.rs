use std::collections::HashMap;
use std::net::SocketAddr;

use anyhow::Result;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Json, Router};
use chrono::FixedOffset;
use serde_json::{Map, Value};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tracing::{debug, error};

use mhmng_core::plan::{
    self, CrossSearch, PlanError, PlanInput, UpsertMode, ValidationError, parse_search_date,
};
use mhmng_core::schema::{self, API_BASE_PATH};
use mhmng_db::models::{PlanKey, PlanKind, PlanRecord};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    /// Hub time zone for offset-less timestamps and date searches.
    pub time_zone: FixedOffset,
}

// ---------------------------------------------------------------------------
// Response envelope
// ---------------------------------------------------------------------------

/// `{ "<payload_key>": <data or null>, "result": bool, "error_msg": string }`.
///
/// Delete responses have no payload key.
pub struct Envelope {
    status: StatusCode,
    payload_key: Option<&'static str>,
    payload: Value,
    result: bool,
    error_msg: &'static str,
}

impl Envelope {
    fn ok(payload_key: &'static str, payload: Value) -> Self {
        Self {
            status: StatusCode::OK,
            payload_key: Some(payload_key),
            payload,
            result: true,
            error_msg: "",
        }
    }

    /// A well-formed "no such plan" answer. Not an error.
    fn not_found(status: StatusCode, payload_key: Option<&'static str>) -> Self {
        Self {
            status,
            payload_key,
            payload: Value::Null,
            result: false,
            error_msg: "",
        }
    }

    fn deleted() -> Self {
        Self {
            status: StatusCode::OK,
            payload_key: None,
            payload: Value::Null,
            result: true,
            error_msg: "",
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> axum::response::Response {
        let mut body = Map::new();
        if let Some(key) = self.payload_key {
            body.insert(key.to_owned(), self.payload);
        }
        body.insert("result".to_owned(), Value::Bool(self.result));
        body.insert("error_msg".to_owned(), Value::String(self.error_msg.to_owned()));
        (self.status, Json(Value::Object(body))).into_response()
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// A failed request. Always answered with 400 and a fixed message; the cause
/// is logged, never returned.
pub struct AppError {
    payload_key: Option<&'static str>,
    message: &'static str,
}

impl AppError {
    /// Generic failure: `error_msg = "Error"`.
    pub fn failed(payload_key: Option<&'static str>, err: &PlanError) -> Self {
        match err {
            PlanError::Invalid(e) => error!(error = %e, "request rejected"),
            PlanError::Store(e) => error!(error = %format!("{e:#}"), "plan store failure"),
        }
        Self {
            payload_key,
            message: "Error",
        }
    }

    /// A required query parameter is missing.
    pub fn missing(payload_key: Option<&'static str>, message: &'static str) -> Self {
        debug!(message, "required parameter missing");
        Self {
            payload_key,
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        Envelope {
            status: StatusCode::BAD_REQUEST,
            payload_key: self.payload_key,
            payload: Value::Null,
            result: false,
            error_msg: self.message,
        }
        .into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .nest(
            "/vanning_plan",
            plan_routes().layer(Extension(PlanKind::Vanning)),
        )
        .nest(
            "/devanning_plan",
            plan_routes().layer(Extension(PlanKind::Devanning)),
        )
        .route("/plan_search", get(plan_search))
        .route("/plan_search/", get(plan_search))
        .route("/openapi.json", get(openapi));

    Router::new()
        .nest(API_BASE_PATH, api)
        .route("/healthcheck", get(healthcheck))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn plan_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/{hub_id}/{transport_instruction_id}",
            get(get_plan).put(put_plan).post(post_plan).delete(delete_plan),
        )
        .route("/{hub_id}", get(search_by_date))
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("mhmng serve listening on http://{addr}{API_BASE_PATH}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("mhmng serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to install Ctrl+C handler; serving until killed");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn list_key(kind: PlanKind) -> &'static str {
    match kind {
        PlanKind::Vanning => "vanning_plan_list",
        PlanKind::Devanning => "devanning_plan_list",
    }
}

fn to_payload<T: serde::Serialize>(value: &T) -> Result<Value, PlanError> {
    serde_json::to_value(value).map_err(|e| PlanError::Store(e.into()))
}

async fn upsert(
    state: AppState,
    kind: PlanKind,
    key: PlanKey,
    body: Bytes,
    mode: UpsertMode,
) -> Result<Envelope, AppError> {
    debug!(%kind, %key, ?mode, body = %String::from_utf8_lossy(&body), "plan upsert request");

    let stored = store(&state, kind, &key, &body, mode)
        .await
        .map_err(|e| AppError::failed(Some(kind.table()), &e))?;

    Ok(Envelope::ok(kind.table(), stored))
}

async fn store(
    state: &AppState,
    kind: PlanKind,
    key: &PlanKey,
    body: &[u8],
    mode: UpsertMode,
) -> Result<Value, PlanError> {
    let patch = PlanInput::from_json(body)?.into_patch(state.time_zone)?;
    let plan = plan::upsert_plan(&state.pool, kind, key, &patch, mode).await?;
    to_payload(&plan)
}

async fn put_plan(
    State(state): State<AppState>,
    Extension(kind): Extension<PlanKind>,
    Path((hub_id, transport_instruction_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Envelope, AppError> {
    let key = PlanKey::new(hub_id, transport_instruction_id);
    upsert(state, kind, key, body, UpsertMode::Merge).await
}

async fn post_plan(
    State(state): State<AppState>,
    Extension(kind): Extension<PlanKind>,
    Path((hub_id, transport_instruction_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Envelope, AppError> {
    let key = PlanKey::new(hub_id, transport_instruction_id);
    upsert(state, kind, key, body, UpsertMode::Replace).await
}

async fn get_plan(
    State(state): State<AppState>,
    Extension(kind): Extension<PlanKind>,
    Path((hub_id, transport_instruction_id)): Path<(String, String)>,
) -> Result<Envelope, AppError> {
    let key = PlanKey::new(hub_id, transport_instruction_id);
    let payload_key = kind.table();
    debug!(%kind, %key, "plan fetch request");

    let found = plan::get_plan(&state.pool, kind, &key)
        .await
        .and_then(|plan| plan.as_ref().map(to_payload).transpose())
        .map_err(|e| AppError::failed(Some(payload_key), &e))?;

    Ok(match found {
        Some(payload) => Envelope::ok(payload_key, payload),
        None => Envelope::not_found(StatusCode::OK, Some(payload_key)),
    })
}

async fn delete_plan(
    State(state): State<AppState>,
    Extension(kind): Extension<PlanKind>,
    Path((hub_id, transport_instruction_id)): Path<(String, String)>,
) -> Result<Envelope, AppError> {
    let key = PlanKey::new(hub_id, transport_instruction_id);
    debug!(%kind, %key, "plan delete request");

    let deleted = plan::delete_plan(&state.pool, kind, &key)
        .await
        .map_err(|e| AppError::failed(None, &e))?;

    Ok(if deleted {
        Envelope::deleted()
    } else {
        Envelope::not_found(StatusCode::FORBIDDEN, None)
    })
}

async fn search_by_date(
    State(state): State<AppState>,
    Extension(kind): Extension<PlanKind>,
    Path(hub_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Envelope, AppError> {
    let payload_key = list_key(kind);
    debug!(%kind, %hub_id, ?params, "plan date search request");

    let raw_date = params
        .get("date")
        .ok_or_else(|| AppError::missing(Some(payload_key), "date is missing"))?;

    let plans = search_day(&state, kind, &hub_id, raw_date)
        .await
        .map_err(|e| AppError::failed(Some(payload_key), &e))?;

    Ok(Envelope::ok(payload_key, plans))
}

async fn search_day(
    state: &AppState,
    kind: PlanKind,
    hub_id: &str,
    raw_date: &str,
) -> Result<Value, PlanError> {
    let date = parse_search_date(raw_date)?;
    let plans: Vec<PlanRecord> =
        plan::search_plans_by_date(&state.pool, kind, hub_id, date, state.time_zone).await?;
    to_payload(&plans)
}

async fn plan_search(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Envelope, AppError> {
    const PAYLOAD_KEY: &str = "plan";
    debug!(?params, "cross-plan search request");

    let search = CrossSearch::from_params(&params).map_err(|e| match e {
        ValidationError::Missing(_) => {
            AppError::missing(Some(PAYLOAD_KEY), "transport_instruction_id is missing")
        }
        other => AppError::failed(Some(PAYLOAD_KEY), &PlanError::Invalid(other)),
    })?;

    let found = plan::find_plan(&state.pool, &search)
        .await
        .and_then(|plan| plan.as_ref().map(to_payload).transpose())
        .map_err(|e| AppError::failed(Some(PAYLOAD_KEY), &e))?;

    Ok(match found {
        Some(payload) => Envelope::ok(PAYLOAD_KEY, payload),
        None => Envelope::not_found(StatusCode::NOT_FOUND, Some(PAYLOAD_KEY)),
    })
}

async fn openapi() -> Json<Value> {
    Json(schema::openapi_document())
}

async fn healthcheck() -> &'static str {
    "healthcheck OK"
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use chrono::FixedOffset;
    use serde_json::json;
    use sqlx::PgPool;
    use tower::ServiceExt;

    use mhmng_test_utils::{create_test_db, drop_test_db};

    use super::AppState;

    // -----------------------------------------------------------------------
    // HTTP helpers
    // -----------------------------------------------------------------------

    fn app(pool: &PgPool) -> axum::Router {
        super::build_router(AppState {
            pool: pool.clone(),
            time_zone: FixedOffset::east_opt(9 * 3600).unwrap(),
        })
    }

    async fn send(
        pool: &PgPool,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> axum::response::Response {
        let body = match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        };
        app(pool)
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(body)
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const PLAN_URI: &str = "/mhapi/v1/vanning_plan/9930000010017/20241024";

    // -----------------------------------------------------------------------
    // Tests
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_post_creates_plan() {
        let (pool, db_name) = create_test_db().await;

        let resp = send(
            &pool,
            Method::POST,
            PLAN_URI,
            Some(json!({"hub_space_list": ["1"], "status": 1, "is_departure_mh": 1})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["result"], true);
        assert_eq!(json["error_msg"], "");
        let plan = &json["vanning_plan"];
        assert_eq!(plan["hub_id"], "9930000010017");
        assert_eq!(plan["transport_instruction_id"], "20241024");
        assert_eq!(plan["hub_space_list"], json!(["1"]));
        assert_eq!(plan["status"], 1);
        assert_eq!(plan["is_departure_hub"], 1);
        assert!(plan["created_at"].is_string());
        assert!(plan["updated_at"].is_string());
        assert!(plan["requested_from_time"].is_null());
        assert!(plan.get("id").is_none());

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let (pool, db_name) = create_test_db().await;

        let resp = send(
            &pool,
            Method::PUT,
            "/mhapi/v1/devanning_plan/HUB1/T1",
            Some(json!({
                "req_from_time": "2025-01-10 09:00:00",
                "trailer_giai_list": ["TR1", "TR2"],
                "is_bl_need": true,
            })),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = send(&pool, Method::GET, "/mhapi/v1/devanning_plan/HUB1/T1", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["result"], true);
        let plan = &json["devanning_plan"];
        assert_eq!(plan["requested_from_time"], "2025-01-10T00:00:00Z");
        assert_eq!(plan["trailer_id_list"], json!(["TR1", "TR2"]));
        assert_eq!(plan["needs_bill_of_lading_check"], 1);

        // Separate keyspace.
        let resp = send(&pool, Method::GET, "/mhapi/v1/vanning_plan/HUB1/T1", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json, json!({"vanning_plan": null, "result": false, "error_msg": ""}));

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_invalid_requests_return_generic_error() {
        let (pool, db_name) = create_test_db().await;

        let long_hub = "/mhapi/v1/vanning_plan/12345678901234567/20241024";
        let resp = send(&pool, Method::PUT, long_hub, Some(json!({}))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json, json!({"vanning_plan": null, "result": false, "error_msg": "Error"}));

        let resp = send(
            &pool,
            Method::PUT,
            PLAN_URI,
            Some(json!({"requested_to_time": "not a time"})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(&pool, Method::POST, PLAN_URI, Some(json!(["1"]))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = send(
            &pool,
            Method::POST,
            PLAN_URI,
            Some(json!({"shipper_id": "x".repeat(51)})),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Nothing was written.
        let resp = send(&pool, Method::GET, PLAN_URI, None).await;
        assert_eq!(body_json(resp).await["result"], false);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_delete() {
        let (pool, db_name) = create_test_db().await;

        let resp = send(&pool, Method::DELETE, PLAN_URI, None).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(body_json(resp).await, json!({"result": false, "error_msg": ""}));

        send(&pool, Method::PUT, PLAN_URI, Some(json!({}))).await;

        let resp = send(&pool, Method::DELETE, PLAN_URI, None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"result": true, "error_msg": ""}));

        let resp = send(&pool, Method::GET, PLAN_URI, None).await;
        assert_eq!(body_json(resp).await["vanning_plan"], serde_json::Value::Null);

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_search_by_date() {
        let (pool, db_name) = create_test_db().await;

        send(
            &pool,
            Method::PUT,
            "/mhapi/v1/vanning_plan/HUB1/T1",
            Some(json!({"requested_from_time": "2025-01-10T23:30:00+09:00"})),
        )
        .await;
        send(
            &pool,
            Method::PUT,
            "/mhapi/v1/vanning_plan/HUB1/T2",
            Some(json!({"requested_from_time": "2025-01-11T00:00:00+09:00"})),
        )
        .await;

        let resp = send(&pool, Method::GET, "/mhapi/v1/vanning_plan/HUB1?date=20250110", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["result"], true);
        let list = json["vanning_plan_list"].as_array().expect("list");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0]["transport_instruction_id"], "T1");

        let resp = send(&pool, Method::GET, "/mhapi/v1/vanning_plan/HUB9?date=20250110", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["vanning_plan_list"], json!([]));

        let resp = send(&pool, Method::GET, "/mhapi/v1/devanning_plan/HUB1", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            json!({"devanning_plan_list": null, "result": false, "error_msg": "date is missing"})
        );

        let resp = send(&pool, Method::GET, "/mhapi/v1/vanning_plan/HUB1?date=2025-01-10", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error_msg"], "Error");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_plan_search() {
        let (pool, db_name) = create_test_db().await;

        send(
            &pool,
            Method::PUT,
            "/mhapi/v1/vanning_plan/HUB1/T1",
            Some(json!({"is_departure_mh": 1})),
        )
        .await;

        for uri in [
            "/mhapi/v1/plan_search/?is_departure_mh=1&transport_instruction_id=T1&is_vanning=1",
            "/mhapi/v1/plan_search?is_departure_mh=1&trsp_instruction_id=T1&is_vanning=1",
        ] {
            let resp = send(&pool, Method::GET, uri, None).await;
            assert_eq!(resp.status(), StatusCode::OK, "{uri}");
            let json = body_json(resp).await;
            assert_eq!(json["result"], true);
            assert_eq!(json["plan"]["hub_id"], "HUB1");
        }

        // Defaults select the devanning table, arrival side.
        let resp = send(
            &pool,
            Method::GET,
            "/mhapi/v1/plan_search/?transport_instruction_id=T1",
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            body_json(resp).await,
            json!({"plan": null, "result": false, "error_msg": ""})
        );

        let resp = send(&pool, Method::GET, "/mhapi/v1/plan_search/?is_vanning=1", None).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await["error_msg"],
            "transport_instruction_id is missing"
        );

        let resp = send(
            &pool,
            Method::GET,
            "/mhapi/v1/plan_search/?is_vanning=x&transport_instruction_id=T1",
            None,
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["error_msg"], "Error");

        pool.close().await;
        drop_test_db(&db_name).await;
    }

    #[tokio::test]
    async fn test_healthcheck_and_openapi() {
        let (pool, db_name) = create_test_db().await;

        let resp = send(&pool, Method::GET, "/healthcheck", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&bytes[..], b"healthcheck OK");

        let resp = send(&pool, Method::GET, "/mhapi/v1/openapi.json", None).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let doc = body_json(resp).await;
        assert_eq!(doc["servers"][0]["url"], "/mhapi/v1");
        assert!(
            doc["paths"]
                .get("/vanning_plan/{hub_id}/{transport_instruction_id}")
                .is_some()
        );

        pool.close().await;
        drop_test_db(&db_name).await;
    }
}
