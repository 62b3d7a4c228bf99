//! Payment attempts and provider webhooks.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use order_store::{OrderRepository, StockLedger};
use payments::{MethodDetails, PaymentOutcome, PaymentWebhook, WebhookReceipt};

use super::{ApiResponse, AppState, body, ok, parse_order_id};
use crate::actor::RequestActor;
use crate::error::ApiError;

/// POST /orders/{id}/payment: pay with `{"method": ..., "details": {...}}`.
///
/// A rejected charge is still a 200; the outcome is in the payload.
#[tracing::instrument(skip_all, fields(actor_id = %actor.id))]
pub async fn process<R, L>(
    State(state): State<Arc<AppState<R, L>>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
    payload: Result<Json<MethodDetails>, JsonRejection>,
) -> Result<Json<ApiResponse<PaymentOutcome>>, ApiError>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let details = body(payload)?;
    let outcome = state
        .payments
        .process_payment(&actor, order_id, details)
        .await?;
    Ok(ok(outcome))
}

/// Header carrying the provider's shared secret.
pub const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

/// POST /payments/webhook: provider callback, applied as the platform.
///
/// Callers must present the configured secret in `x-webhook-secret`.
#[tracing::instrument(skip_all)]
pub async fn webhook<R, L>(
    State(state): State<Arc<AppState<R, L>>>,
    headers: HeaderMap,
    payload: Result<Json<PaymentWebhook>, JsonRejection>,
) -> Result<Json<ApiResponse<WebhookReceipt>>, ApiError>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    let trusted = match (&state.webhook_secret, presented) {
        (Some(secret), Some(presented)) => secret.matches(presented),
        _ => false,
    };
    if !trusted {
        tracing::warn!("Webhook refused: missing or wrong secret");
        metrics::counter!("payment_webhooks_total", "outcome" => "unauthorized").increment(1);
        return Err(ApiError::forbidden(
            "INVALID_WEBHOOK_SECRET",
            "Webhook caller could not be verified",
        ));
    }

    let webhook = body(payload)?;
    let receipt = state.payments.payment_webhook(webhook).await?;
    Ok(ok(receipt))
}
