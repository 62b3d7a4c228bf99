//! HTTP handlers.

pub mod ops;
pub mod orders;
pub mod payments;

use std::str::FromStr;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use checkout::{OrderCreationService, OrderStateService};
use common::OrderId;
use ::payments::PaymentOrchestrator;
use serde::Serialize;

use crate::config::WebhookSecret;
use crate::error::ApiError;

/// Shared application state accessible from all order and payment handlers.
pub struct AppState<R, L> {
    pub creation: OrderCreationService<R, L>,
    pub states: OrderStateService<R, L>,
    pub payments: PaymentOrchestrator<R>,

    /// `None` refuses every webhook.
    pub webhook_secret: Option<WebhookSecret>,
}

/// Success envelope: `{"success": true, "data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse {
        success: true,
        data,
    })
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::from_str(id)
        .map_err(|e| ApiError::bad_request("INVALID_ID", format!("Invalid order id: {e}")))
}

/// Unwraps a JSON body, reporting malformed input in the error envelope.
pub(crate) fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::bad_request("INVALID_BODY", e.body_text()))
}
