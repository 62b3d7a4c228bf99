//! Order creation, state transitions and reads.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use checkout::{CreateOrderRequest, MerchantOrderView};
use common::UserId;
use domain::{Order, OrderStatus};
use order_store::{OrderQuery, OrderRepository, StockLedger};
use serde::Deserialize;

use super::{ApiResponse, AppState, body, ok, parse_order_id};
use crate::actor::RequestActor;
use crate::error::ApiError;

type Reply<T> = Result<Json<ApiResponse<T>>, ApiError>;

// -- Request types --

/// Listing filters shared by the customer and merchant views.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<OrderStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,

    /// Whose orders to list; defaults to the caller. Only administrators may
    /// name someone else.
    pub owner_id: Option<UserId>,
}

impl ListParams {
    fn query(&self) -> OrderQuery {
        OrderQuery {
            status: self.status,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryConfirmationRequest {
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

// -- Handlers --

/// POST /orders: check out the caller's cart.
#[tracing::instrument(skip_all, fields(actor_id = %actor.id))]
pub async fn create<R, L>(
    State(state): State<Arc<AppState<R, L>>>,
    RequestActor(actor): RequestActor,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<Order>>), ApiError>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let request = body(payload)?;
    let order = state.creation.create_order(&actor, request).await?;
    Ok((StatusCode::CREATED, ok(order)))
}

/// GET /orders/{id}
#[tracing::instrument(skip_all, fields(actor_id = %actor.id))]
pub async fn get<R, L>(
    State(state): State<Arc<AppState<R, L>>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
) -> Reply<Order>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let order = state.states.get_order(&actor, order_id).await?;
    Ok(ok(order))
}

/// GET /orders: the caller's orders as a customer, newest first.
#[tracing::instrument(skip_all, fields(actor_id = %actor.id))]
pub async fn list<R, L>(
    State(state): State<Arc<AppState<R, L>>>,
    RequestActor(actor): RequestActor,
    Query(params): Query<ListParams>,
) -> Reply<Vec<Order>>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let customer_id = params.owner_id.unwrap_or(actor.id);
    let orders = state
        .states
        .list_orders_for_customer(&actor, customer_id, &params.query())
        .await?;
    Ok(ok(orders))
}

/// GET /merchant/orders: orders containing the merchant's lines, with
/// earnings.
#[tracing::instrument(skip_all, fields(actor_id = %actor.id))]
pub async fn list_for_merchant<R, L>(
    State(state): State<Arc<AppState<R, L>>>,
    RequestActor(actor): RequestActor,
    Query(params): Query<ListParams>,
) -> Reply<Vec<MerchantOrderView>>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let merchant_id = params.owner_id.unwrap_or(actor.id);
    let views = state
        .states
        .list_orders_for_merchant(&actor, merchant_id, &params.query())
        .await?;
    Ok(ok(views))
}

/// POST /orders/{id}/status
#[tracing::instrument(skip_all, fields(actor_id = %actor.id))]
pub async fn transition<R, L>(
    State(state): State<Arc<AppState<R, L>>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
    payload: Result<Json<TransitionRequest>, JsonRejection>,
) -> Reply<Order>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let request = body(payload)?;
    let order = state
        .states
        .transition_order_status(&actor, order_id, request.status, request.comment)
        .await?;
    Ok(ok(order))
}

/// POST /orders/{id}/cancel
#[tracing::instrument(skip_all, fields(actor_id = %actor.id))]
pub async fn cancel<R, L>(
    State(state): State<Arc<AppState<R, L>>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
    payload: Result<Json<CancelRequest>, JsonRejection>,
) -> Reply<Order>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let request = body(payload)?;
    let order = state
        .states
        .cancel_order(&actor, order_id, request.reason)
        .await?;
    Ok(ok(order))
}

/// POST /orders/{id}/delivery-confirmation
#[tracing::instrument(skip_all, fields(actor_id = %actor.id))]
pub async fn confirm_delivery<R, L>(
    State(state): State<Arc<AppState<R, L>>>,
    RequestActor(actor): RequestActor,
    Path(id): Path<String>,
    payload: Result<Json<DeliveryConfirmationRequest>, JsonRejection>,
) -> Reply<Order>
where
    R: OrderRepository + Clone + 'static,
    L: StockLedger + Clone + 'static,
{
    let order_id = parse_order_id(&id)?;
    let request = body(payload)?;
    let order = state
        .states
        .confirm_delivery(&actor, order_id, request.rating, request.comment)
        .await?;
    Ok(ok(order))
}
