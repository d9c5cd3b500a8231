pub mod couriers;
pub mod orders;

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::models::stats::StatsSnapshot;
use crate::state::AppState;

pub fn router(state: Arc<AppState>, static_dir: &str) -> Router {
    Router::new()
        .merge(couriers::router())
        .merge(orders::router())
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/admin/login", get(admin_login))
        .route("/admin/stats", get(stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .fallback_service(ServeDir::new(static_dir))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    couriers: usize,
    orders: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        couriers: state.store.courier_count(),
        orders: state.store.order_count(),
    })
}

async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err).into_response(),
    }
}

#[derive(Deserialize)]
pub struct AdminLoginQuery {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

async fn admin_login(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminLoginQuery>,
) -> Result<Json<Value>, AppError> {
    if query.username == state.admin.username && query.password == state.admin.password {
        return Ok(Json(json!({ "token": "admin-token" })));
    }
    Err(AppError::InvalidCredentials)
}

async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(state.stats.get())
}
