//! Ticket sale API.
//!
//! Every `/api/...` path is handled here: the path selects the request kind,
//! the request is handed to the sale system, and the handler waits for whichever
//! server answers it.

use crate::error::AppError;
use crate::exchange::HttpExchange;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method as HttpMethod, Uri};
use axum::response::{IntoResponse, Response};
use ticket_sale_core::{Method, RequestHandler, RequestKind};

/// Route an API request into the sale system.
///
/// # Errors
///
/// - 404 for paths outside the API
/// - 405 for methods other than `GET` and `POST`
/// - 500 if the request was dropped without an answer
pub async fn dispatch(
    State(state): State<AppState>,
    method: HttpMethod,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let kind = RequestKind::from_path(uri.path()).ok_or_else(|| AppError::UnknownEndpoint(uri.path().to_string()))?;
    let method = Method::from_name(method.as_str()).ok_or_else(|| AppError::MethodNotAllowed(method.to_string()))?;

    let (exchange, answer) = HttpExchange::new(method, kind, &headers, body);
    state.system.handle(Box::new(exchange));

    Ok(answer.await?.into_response())
}
