//! Request handlers for the four domain resources.
//!
//! Every resource answers GET (read, optionally selected by `?action=`) and POST
//! (write). All responses share one envelope:
//! `{ success, data, timestamp, message?, error? }`.

pub(crate) mod beliefs;
pub(crate) mod desires;
pub(crate) mod intentions;
pub(crate) mod status;

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bdi_core::{BoundedHistoryStore, PageLimit, StoreError, ValidationError};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Verbs advertised in the `Allow` header of 405 responses.
const ALLOWED_METHODS: &str = "GET, POST";

/// Query parameters shared by all reads. A repeated key keeps its first value.
#[derive(Debug, Default)]
pub(crate) struct ReadQuery {
    action: Option<String>,
    /// Kept as text so invalid values fall back to the default page size.
    limit: Option<String>,
}

#[axum::async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ReadQuery {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(pairs) = Query::<Vec<(String, String)>>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ApiError::BadQuery(rejection.body_text()))?;
        let mut query = ReadQuery::default();
        for (key, value) in pairs {
            let slot = match key.as_str() {
                "action" => &mut query.action,
                "limit" => &mut query.limit,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }
        Ok(query)
    }
}

impl ReadQuery {
    /// Selected action; an empty `?action=` counts as none.
    pub(crate) fn action(&self) -> Option<&str> {
        self.action.as_deref().map(str::trim).filter(|a| !a.is_empty())
    }

    pub(crate) fn limit(&self) -> PageLimit {
        PageLimit::parse(self.limit.as_deref())
    }
}

#[derive(Debug, Serialize)]
struct Envelope {
    success: bool,
    data: Value,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Status code plus envelope body.
#[derive(Debug)]
pub(crate) struct Reply {
    status: StatusCode,
    body: Envelope,
}

impl Reply {
    fn new(status: StatusCode, success: bool, data: Value) -> Self {
        Self {
            status,
            body: Envelope {
                success,
                data,
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                message: None,
                error: None,
            },
        }
    }

    pub(crate) fn ok(data: impl Serialize) -> Self {
        Self::new(StatusCode::OK, true, to_data(data))
    }

    pub(crate) fn created(data: impl Serialize) -> Self {
        Self::new(StatusCode::CREATED, true, to_data(data))
    }

    /// HTTP 200 carrying `success: false`, for recovered integration failures.
    pub(crate) fn failed(data: impl Serialize, error: impl Into<String>) -> Self {
        let mut reply = Self::new(StatusCode::OK, false, to_data(data));
        reply.body.error = Some(error.into());
        reply
    }

    fn error(status: StatusCode, error: impl Into<String>) -> Self {
        let mut reply = Self::new(status, false, Value::Null);
        reply.body.error = Some(error.into());
        reply
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.body.message = Some(message.into());
        self
    }
}

fn to_data(data: impl Serialize) -> Value {
    serde_json::to_value(data).unwrap_or(Value::Null)
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Errors surfaced to callers. Integration failures never reach this type; they are
/// recovered into a `Reply::failed`.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unsupported action: {0}")]
    UnknownAction(String),

    #[error("invalid query string: {0}")]
    BadQuery(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(Method),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Validation(e) => ApiError::Validation(e),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(_) | ApiError::UnknownAction(_) | ApiError::BadQuery(_) => {
                Reply::error(StatusCode::BAD_REQUEST, self.to_string()).into_response()
            }
            ApiError::MethodNotAllowed(_) => {
                let mut res = Reply::error(StatusCode::METHOD_NOT_ALLOWED, self.to_string()).into_response();
                res.headers_mut()
                    .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
                res
            }
            ApiError::Internal(detail) => {
                tracing::error!(target: "bdi::gateway", error = %detail, "Request failed");
                Reply::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

/// Fallback for any verb other than GET/POST/OPTIONS.
pub(crate) async fn method_not_allowed(method: Method) -> ApiError {
    ApiError::MethodNotAllowed(method)
}

/// Plain OPTIONS requests (preflights are answered by the CORS layer).
pub(crate) async fn preflight() -> StatusCode {
    StatusCode::OK
}

/// Parses a write body. An empty body counts as a missing object.
pub(crate) fn parse_body(body: &[u8]) -> Result<Value, ValidationError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ValidationError::NotAnObject);
    }
    serde_json::from_slice(body).map_err(|_| ValidationError::InvalidJson)
}

pub(crate) fn read_latest(store: &BoundedHistoryStore) -> Result<Reply, ApiError> {
    Ok(match store.latest()? {
        Some(record) => Reply::ok(record),
        None => Reply::ok(Value::Null).with_message(format!("No {} data available yet", store.spec().name)),
    })
}

pub(crate) fn read_history(store: &BoundedHistoryStore, limit: PageLimit) -> Result<Reply, ApiError> {
    Ok(Reply::ok(store.history(limit)?))
}

pub(crate) fn read_stats(store: &BoundedHistoryStore) -> Result<Reply, ApiError> {
    Ok(Reply::ok(store.stats()?))
}

/// Validates and stores a record write; answers 201 with the stored record.
pub(crate) fn write_record(store: &BoundedHistoryStore, body: &[u8]) -> Result<Reply, ApiError> {
    let domain = store.spec().name;
    let payload = parse_body(body).map_err(|e| {
        tracing::warn!(target: "bdi::gateway", domain, error = %e, "Rejected write");
        e
    })?;
    let record = store.record_latest(payload).map_err(|e| {
        tracing::warn!(target: "bdi::gateway", domain, error = %e, "Rejected write");
        e
    })?;
    tracing::info!(
        target: "bdi::gateway",
        domain,
        id = %record.id,
        kind = record.str_at(&[store.spec().discriminator]).unwrap_or("-"),
        "Record stored"
    );
    Ok(Reply::created(&record).with_message(format!("{} record stored", store.spec().id_prefix)))
}
