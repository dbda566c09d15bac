use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::Html,
};
use tracing::{error, info, warn};

use crate::{
    error::AppError,
    models::{
        Health, LastOrder, Message, NewOrder, ORDER_COMPLETED, ORDER_READY, ORDER_SAVED, Order,
        OrderFilter, OrderNumber, OrderPlaced, OrderStatus, SERVER_RUNNING,
    },
    numbering::{next_order_number, place_order},
    state::AppState,
};

const KITCHEN_MONITOR: &str = include_str!("../static/kitchen_monitor.html");

pub async fn last_order_handler(State(state): State<Arc<AppState>>) -> Json<LastOrder> {
    let next_order = next_order_number(state.store.as_ref()).await;

    let last_order = state
        .store
        .max_order_number()
        .await
        .unwrap_or_else(|e| {
            warn!("Failed to read last order, reporting 0: {e}");
            None
        })
        .unwrap_or(0);

    Json(LastOrder {
        last_order,
        next_order,
    })
}

pub async fn create_order_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<Json<OrderPlaced>, AppError> {
    let Json(order) = payload?;

    let food = order.food.ok_or(AppError::MissingField("food"))?;
    let drink = order.drink.ok_or(AppError::MissingField("drink"))?;

    let order_number = place_order(state.store.as_ref(), &food, &drink).await?;
    info!("Order {order_number} placed");

    Ok(Json(OrderPlaced {
        message: ORDER_SAVED,
        order_number,
        status: OrderStatus::Preparing,
    }))
}

pub async fn orders_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    Json(list_or_empty(&state, OrderFilter::All).await)
}

pub async fn kitchen_orders_handler(State(state): State<Arc<AppState>>) -> Json<Vec<Order>> {
    Json(list_or_empty(&state, OrderFilter::Pending).await)
}

/// Listings answer `[]` instead of an error so the kitchen display keeps polling.
async fn list_or_empty(state: &AppState, filter: OrderFilter) -> Vec<Order> {
    state.store.list_all(filter).await.unwrap_or_else(|e| {
        error!("Failed to list {filter:?} orders, serving none: {e}");
        Vec::new()
    })
}

pub async fn mark_ready_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OrderNumber>, JsonRejection>,
) -> Result<Json<Message>, AppError> {
    let Json(target) = payload?;
    let number = target
        .order_number
        .ok_or(AppError::MissingField("order_number"))?;

    if state.store.update_status(number, OrderStatus::Ready).await? == 0 {
        warn!("Order {number} marked ready but does not exist");
    } else {
        info!("Order {number} ready");
    }

    Ok(Json(Message {
        message: ORDER_READY,
    }))
}

pub async fn complete_order_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<OrderNumber>, JsonRejection>,
) -> Result<Json<Message>, AppError> {
    let Json(target) = payload?;
    let number = target
        .order_number
        .ok_or(AppError::MissingField("order_number"))?;

    if state.store.delete(number).await? == 0 {
        return Err(AppError::NotFound);
    }
    info!("Order {number} completed");

    Ok(Json(Message {
        message: ORDER_COMPLETED,
    }))
}

pub async fn health_handler() -> Json<Health> {
    Json(Health {
        status: "ok",
        message: SERVER_RUNNING,
    })
}

pub async fn kitchen_handler() -> Html<&'static str> {
    Html(KITCHEN_MONITOR)
}
