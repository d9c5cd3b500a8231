use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::error::AppError;
use crate::geo::Location;
use crate::models::courier::{CourierView, NewCourier};
use crate::models::order::{Order, OrderStatus};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/couriers", post(register_courier).get(list_couriers))
        .route("/admin/couriers/eligible", get(list_eligible_couriers))
        .route("/admin/couriers/:id/block", post(block_courier))
        .route("/admin/couriers/:id/unblock", post(unblock_courier))
        .route("/admin/couriers/:id/reset_password", post(reset_password))
        .route("/couriers/login", post(courier_login))
        .route("/couriers/:id", get(get_courier))
        .route("/couriers/:id/location", post(update_location))
        .route("/couriers/:id/orders", get(courier_orders))
        .route("/couriers/:id/status", post(update_order_status))
        .route("/couriers/:id/logout", post(courier_logout))
        .route("/public/couriers/:id/location", get(courier_location))
}

#[derive(Deserialize)]
pub struct RegisterCourierRequest {
    pub id: String,
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub phone_number: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct UpdateLocationRequest {
    pub lat: f64,
    pub lng: f64,
    pub battery_level: Option<String>,
    pub network_info: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub order_id: String,
    pub status: String,
}

async fn register_courier(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterCourierRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let location = Location::from_pair(payload.lat, payload.lng)?;

    let courier = state.couriers.register(NewCourier {
        id: payload.id,
        name: payload.name,
        phone: payload.phone_number,
        password: payload.password,
        location,
    })?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "status": "created", "id": courier.id })),
    ))
}

async fn list_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<CourierView>> {
    Json(state.couriers.list())
}

async fn list_eligible_couriers(State(state): State<Arc<AppState>>) -> Json<Vec<CourierView>> {
    Json(state.couriers.list_eligible())
}

async fn block_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.couriers.block(&id)?;
    Ok(Json(json!({ "status": "blocked" })))
}

async fn unblock_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.couriers.unblock(&id)?;
    Ok(Json(json!({ "status": "unblocked" })))
}

async fn reset_password(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<Value>, AppError> {
    state.couriers.reset_password(&id, &payload.new_password)?;
    Ok(Json(json!({ "status": "password updated" })))
}

/// Marks the courier online and tries to hand it the nearest pending order.
async fn courier_login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<CourierView>, AppError> {
    let courier = state
        .couriers
        .authenticate(&payload.name, &payload.password)?;
    state.couriers.set_online(&courier.id, true)?;
    info!(courier_id = %courier.id, "courier logged in");

    if let Err(err) = state.matcher.assign_best_order(&courier.id) {
        warn!(courier_id = %courier.id, error = %err, "no order offered at login");
    }

    Ok(Json(state.couriers.get(&courier.id)?))
}

async fn update_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateLocationRequest>,
) -> Result<Json<Value>, AppError> {
    state.couriers.update_location(
        &id,
        Location::new(payload.lat, payload.lng),
        Some(payload.battery_level.unwrap_or_else(|| "n/a".to_string())),
        Some(payload.network_info.unwrap_or_else(|| "n/a".to_string())),
    )?;
    Ok(Json(json!({ "status": "updated" })))
}

async fn courier_orders(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<Vec<Order>> {
    Json(state.orders.list_by_courier(&id))
}

async fn update_order_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> Result<Json<Order>, AppError> {
    let status: OrderStatus = payload.status.parse()?;
    Ok(Json(state.orders.update_status(
        &payload.order_id,
        &id,
        status,
    )?))
}

async fn courier_logout(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.couriers.set_online(&id, false)?;
    Ok(Json(json!({ "status": "logged out" })))
}

async fn get_courier(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CourierView>, AppError> {
    Ok(Json(state.couriers.get(&id)?))
}

async fn courier_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let location = state
        .couriers
        .get(&id)?
        .location
        .ok_or_else(|| AppError::NotFound(format!("courier {id} has no location")))?;
    Ok(Json(json!({ "courier_id": id, "location": location })))
}
