// crates/server/src/middleware/correlation.rs
//! Correlation-ID middleware.
//!
//! Honors an inbound `X-Correlation-ID` (when it parses as a UUID, for
//! distributed tracing), otherwise mints a fresh v4. The id rides a tokio
//! task local for the duration of the request so the error envelope can
//! reach it without threading it through every handler, and is echoed on
//! the response.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

tokio::task_local! {
    static CORRELATION_ID: Uuid;
}

/// The correlation id of the request being handled, if any.
pub fn current() -> Option<Uuid> {
    CORRELATION_ID.try_with(|id| *id).ok()
}

pub async fn propagate(request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())
        .unwrap_or_else(Uuid::new_v4);

    let mut response = CORRELATION_ID.scope(id, next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, value);
    }
    response
}
