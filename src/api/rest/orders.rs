use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::geo::Location;
use crate::models::order::{ExportRow, NewOrder, Order, OrderPage, Tracking};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/orders", post(create_order).get(list_orders))
        .route("/admin/orders/export", get(export_orders))
        .route("/admin/orders/:id/cancel", post(cancel_order))
        .route("/admin/orders/:id/assign", post(reassign_order))
        .route("/public/orders/:id/tracking", get(order_tracking))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub order_id: Option<String>,
    pub customer_lat: f64,
    pub customer_lng: f64,
    pub store_lat: f64,
    pub store_lng: f64,
    #[serde(default)]
    pub cust_name: String,
    #[serde(default)]
    pub cust_phone: String,
    #[serde(default)]
    pub cust_address_bp: String,
    #[serde(default)]
    pub cust_address_details: String,
}

#[derive(Deserialize)]
pub struct ListOrdersQuery {
    #[serde(rename = "searchByID")]
    pub search_by_id: Option<String>,
    #[serde(rename = "pageNumber")]
    pub page_number: Option<String>,
    #[serde(rename = "pageLimit")]
    pub page_limit: Option<String>,
}

#[derive(Deserialize)]
pub struct ReassignRequest {
    pub courier_id: String,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), AppError> {
    let order = state.matcher.dispatch_new_order(NewOrder {
        id: payload.order_id,
        customer_location: Location::new(payload.customer_lat, payload.customer_lng),
        store_location: Location::new(payload.store_lat, payload.store_lng),
        customer_phone: payload.cust_phone,
        customer_name: payload.cust_name,
        customer_addr_bp: payload.cust_address_bp,
        customer_addr_details: payload.cust_address_details,
    })?;

    Ok((StatusCode::CREATED, Json(order)))
}

async fn list_orders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListOrdersQuery>,
) -> Json<OrderPage> {
    let page = positive(query.page_number.as_deref()).unwrap_or(1);
    let limit = positive(query.page_limit.as_deref()).unwrap_or(state.default_page_limit);
    let offset = (page - 1).saturating_mul(limit);

    let filter = query.search_by_id.as_deref().filter(|id| !id.is_empty());
    Json(state.orders.list(filter, offset, limit))
}

async fn cancel_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, AppError> {
    state.orders.cancel(&id)?;
    Ok(Json(json!({ "status": "cancelled" })))
}

async fn reassign_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<ReassignRequest>,
) -> Result<Json<Value>, AppError> {
    state.orders.reassign(&id, &payload.courier_id)?;
    Ok(Json(json!({
        "status": "reassigned",
        "order_id": id,
        "courier_id": payload.courier_id,
    })))
}

async fn export_orders(State(state): State<Arc<AppState>>) -> Response {
    let header_line = csv_line(ExportRow::HEADERS.iter().copied());
    let rows = state
        .orders
        .export_all()
        .map(|row| csv_line(row.fields().iter().map(String::as_str)));

    let lines = std::iter::once(header_line)
        .chain(rows)
        .map(Ok::<_, Infallible>);

    (
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=orders_export.csv",
            ),
        ],
        Body::from_stream(tokio_stream::iter(lines)),
    )
        .into_response()
}

async fn order_tracking(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Tracking>, AppError> {
    Ok(Json(state.orders.get_tracking(&id)?))
}

fn positive(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|value| value.trim().parse::<usize>().ok())
        .filter(|value| *value > 0)
}

fn csv_line<'a>(fields: impl Iterator<Item = &'a str>) -> String {
    let mut line = fields.map(csv_field).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::{csv_line, positive};

    #[test]
    fn csv_quotes_fields_with_separators() {
        let line = csv_line(["o1", "0.000000,1.000000", "say \"hi\"", ""].into_iter());
        assert_eq!(line, "o1,\"0.000000,1.000000\",\"say \"\"hi\"\"\",\n");
    }

    #[test]
    fn pagination_ignores_non_positive_values() {
        assert_eq!(positive(Some("3")), Some(3));
        assert_eq!(positive(Some("0")), None);
        assert_eq!(positive(Some("-2")), None);
        assert_eq!(positive(Some("abc")), None);
        assert_eq!(positive(None), None);
    }
}
