//! HTTP adapter: URL paths and form values in, driver operations out.
//!
//! Deliberately thin.  All translation logic is in pure functions; the
//! handlers only look up the named driver and forward.
//!
//! ```text
//! GET  /tv/{name}/state                    → JSON state snapshot
//! POST /tv/{name}/{attribute}
//!        op=set|up|down|toggle|query       (default: set)
//!        value=…                           (required for set)
//!        antenna=…                         (optional, tuning only)
//! ```
//!
//! Value forms at this boundary: switches take `on`/`off`/`true`/`false`/
//! `1`/`0`; levels a decimal integer; inputs `hdmi:2`; channels a bare
//! integer for analog or `major.minor` for digital; raw commands are hex.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Form, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use tv_core::{Antenna, Attribute, Channel, Connection, InputNumber, Op, Operator, Tune, Value};

use crate::driver::{DriverError, Tv};

/// Shared handler state: every configured driver by name.
pub struct AppState {
    pub tvs: HashMap<String, Arc<dyn Tv>>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/tv/{name}/state", get(get_state))
        .route("/tv/{name}/{attribute}", post(post_op))
        .with_state(state)
}

// ── Handlers ──────────────────────────────────────────────────────────────────

async fn get_state(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<tv_core::State>, ApiError> {
    let tv = state
        .tvs
        .get(&name)
        .ok_or_else(|| ApiError::NotFound(name))?;
    Ok(Json(tv.state()?))
}

/// Form fields accepted by the operation endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct OpForm {
    #[serde(default)]
    pub op: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub antenna: Option<u8>,
}

async fn post_op(
    State(state): State<Arc<AppState>>,
    Path((name, attribute)): Path<(String, String)>,
    Form(form): Form<OpForm>,
) -> Result<StatusCode, ApiError> {
    let tv = state
        .tvs
        .get(&name)
        .ok_or_else(|| ApiError::NotFound(name.clone()))?;
    let op = build_op(&attribute, &form)?;
    debug!(tv = %name, attribute = %op.attribute, operator = %op.operator, "dispatching");
    tv.do_op(&op).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Request translation ───────────────────────────────────────────────────────

fn build_op(attribute: &str, form: &OpForm) -> Result<Op, ApiError> {
    let attribute: Attribute = attribute
        .parse()
        .map_err(|_| bad(format!("unknown attribute {attribute:?}")))?;
    let operator: Operator = match form.op.as_deref() {
        None => Operator::Set,
        Some(op) => op
            .parse()
            .map_err(|_| bad(format!("unknown operator {op:?}")))?,
    };
    let value = match operator {
        Operator::Set => parse_value(attribute, form)?,
        _ => Value::None,
    };
    Ok(Op::new(attribute, operator, value))
}

fn parse_value(attribute: Attribute, form: &OpForm) -> Result<Value, ApiError> {
    let raw = form
        .value
        .as_deref()
        .ok_or_else(|| bad(format!("a value is required to set {attribute}")))?;

    if attribute.is_switch() {
        return Ok(Value::Switch(parse_switch(raw)?));
    }
    if attribute.is_level() {
        let level = raw
            .parse::<i32>()
            .map_err(|_| bad(format!("{raw:?} is not a level")))?;
        return Ok(Value::Level(level));
    }
    match attribute {
        Attribute::Input => Ok(Value::Input(parse_input(raw)?)),
        Attribute::Tuning => {
            let channel: Channel = raw.parse().map_err(|e| bad(format!("{e}")))?;
            let antenna = Antenna(form.antenna.unwrap_or(0));
            Ok(Value::Tune(Tune::new(antenna, channel)))
        }
        Attribute::Raw => Ok(Value::Raw(parse_hex(raw)?)),
        _ => Err(bad(format!("attribute {attribute} takes no direct value"))),
    }
}

fn parse_switch(raw: &str) -> Result<bool, ApiError> {
    match raw {
        "1" | "on" | "true" => Ok(true),
        "0" | "off" | "false" => Ok(false),
        _ => Err(bad(format!("{raw:?} is not a switch value"))),
    }
}

/// Inputs are written `<connection>:<number>`, e.g. `hdmi:2`.
fn parse_input(raw: &str) -> Result<InputNumber, ApiError> {
    let (connection, number) = raw
        .split_once(':')
        .ok_or_else(|| bad(format!("{raw:?} is not an input (expected e.g. \"hdmi:2\")")))?;
    let connection: Connection = connection
        .parse()
        .map_err(|_| bad(format!("unknown connection kind {connection:?}")))?;
    let number = number
        .parse::<u32>()
        .map_err(|_| bad(format!("{number:?} is not an input number")))?;
    Ok(InputNumber::new(connection, number))
}

fn parse_hex(raw: &str) -> Result<Vec<u8>, ApiError> {
    let compact: String = raw.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if compact.len() % 2 != 0 {
        return Err(bad("raw value must be an even number of hex digits"));
    }
    compact
        .as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            std::str::from_utf8(pair)
                .ok()
                .and_then(|s| u8::from_str_radix(s, 16).ok())
                .ok_or_else(|| bad(format!("{raw:?} is not hex")))
        })
        .collect()
}

fn bad(message: impl Into<String>) -> ApiError {
    ApiError::BadRequest(message.into())
}

// ── Error mapping ─────────────────────────────────────────────────────────────

/// Errors the adapter reports to HTTP clients.
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Driver(DriverError),
}

impl From<DriverError> for ApiError {
    fn from(e: DriverError) -> Self {
        ApiError::Driver(e)
    }
}

fn driver_status(e: &DriverError) -> StatusCode {
    match e {
        DriverError::Unsupported(_) | DriverError::BadConfig { .. } => StatusCode::BAD_REQUEST,
        DriverError::UnknownModel(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::NotFound(name) => (StatusCode::NOT_FOUND, format!("no such tv {name:?}")),
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::Driver(e) => (driver_status(e), e.to_string()),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
