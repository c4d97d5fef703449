use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use validator::Validate;

use crate::errors::AppError;

/// Request body in the `{ "data": ... }` envelope the web client sends.
///
/// A missing or `null` `data` is read as an empty object so input-less
/// calls still deserialize. The payload is validated before the handler runs.
pub struct DataJson<T>(pub T);

impl<T, S> FromRequest<S> for DataJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(body) = Json::<Value>::from_request(req, state)
            .await
            .map_err(|rejection| {
                let message = format!("Failed to parse JSON request body: {}", rejection);
                tracing::warn!("{}", message);
                AppError::bad_request(message)
            })?;

        let payload = unwrap_envelope(body);
        let value: T = serde_json::from_value(payload).map_err(|err| {
            tracing::warn!("Rejected request payload: {}", err);
            AppError::Validation(json!([{ "message": err.to_string() }]))
        })?;

        value.validate()?;
        Ok(DataJson(value))
    }
}

fn unwrap_envelope(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => match map.remove("data") {
            Some(Value::Null) | None => Value::Object(Default::default()),
            Some(inner) => inner,
        },
        Value::Null => Value::Object(Default::default()),
        other => other,
    }
}

/// Successful response wrapped as `{ "data": ... }`.
pub struct Data<T>(pub T);

impl<T: Serialize> IntoResponse for Data<T> {
    fn into_response(self) -> Response {
        Json(json!({ "data": self.0 })).into_response()
    }
}

/// Same envelope with a non-200 status, e.g. 201 on creation.
pub struct DataWithStatus<T>(pub StatusCode, pub T);

impl<T: Serialize> IntoResponse for DataWithStatus<T> {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "data": self.1 }))).into_response()
    }
}
