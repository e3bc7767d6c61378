//! Custom Axum extractors for the gateway.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::request::Parts,
};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;

/// Request correlation header
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation id for the current request.
///
/// Set by the request id middleware; falls back to the inbound header or a
/// fresh UUID when the middleware is not installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Id from the inbound header, or a new UUID
    #[must_use]
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), String::from);
        Self(id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_else(|| Self::from_headers(&parts.headers)))
    }
}

/// JSON body extractor that answers malformed bodies with `invalid json`
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> axum::extract::FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let request_id = req.extensions().get::<RequestId>().map(|id| id.0.clone());
        let reject = |err: ApiError| match &request_id {
            Some(id) => err.with_request_id(id),
            None => err,
        };

        let bytes = axum::body::Bytes::from_request(req, state)
            .await
            .map_err(|e| reject(ApiError::bad_request(format!("failed to read body: {e}"))))?;

        let value: T = serde_json::from_slice(&bytes).map_err(|e| {
            debug!(error = %e, "JSON parse error");
            reject(ApiError::bad_request("invalid json"))
        })?;

        Ok(Self(value))
    }
}
