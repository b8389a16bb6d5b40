use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{get, post},
    serve, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::application::checkout::{CheckoutService, PlaceOrder};
use crate::errors::AppError;
use checkout_types::domain::order::{FulfilmentStage, Order};

#[derive(Clone)]
pub struct HttpServerConfig {
    pub port: String,
}

#[derive(Clone)]
pub struct HttpServer {
    pub service: Arc<CheckoutService>,
    pub config: HttpServerConfig,
}

#[derive(Serialize)]
struct PlacedOrderResponse {
    id: String,
    state: &'static str,
    total: i64,
}

impl From<&Order> for PlacedOrderResponse {
    fn from(o: &Order) -> Self {
        Self {
            id: o.id.to_string(),
            state: o.state.label(),
            total: o.total,
        }
    }
}

#[derive(Deserialize)]
struct PaymentUrlQuery {
    bank_code: Option<String>,
    locale: Option<String>,
}

#[derive(Deserialize)]
struct SlotsQuery {
    from: DateTime<Utc>,
    to: DateTime<Utc>,
}

#[derive(Deserialize)]
struct FulfilmentRequest {
    stage: FulfilmentStage,
}

#[derive(Deserialize)]
struct RealPriceItem {
    service_id: Uuid,
    price: i64,
}

#[derive(Deserialize, Default)]
struct CompleteRequest {
    #[serde(default)]
    real_prices: Vec<RealPriceItem>,
}

impl HttpServer {
    pub async fn new(service: CheckoutService, config: HttpServerConfig) -> anyhow::Result<Self> {
        Ok(Self {
            service: Arc::new(service),
            config,
        })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &axum::extract::Request<_>| {
                let uri = request.uri().to_string();
                let request_id = Uuid::new_v4();
                tracing::info_span!(
                    "http_request",
                    %request_id,
                    method = %request.method(),
                    uri
                )
            })
            .on_request(
                |request: &axum::extract::Request<_>, span: &tracing::Span| {
                    tracing::info!(
                        parent: span,
                        method = %request.method(),
                        uri = %request.uri(),
                        "request"
                    );
                },
            )
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &tracing::Span| {
                    tracing::info!(
                        parent: span,
                        status = %response.status(),
                        latency_ms = %latency.as_millis(),
                        "response"
                    );
                },
            );

        let svc = self.service.clone();
        let app = Router::new()
            .route("/health", get(health))
            .route("/orders", post(place_order))
            .route("/orders/pending", get(pending_orders))
            .route("/orders/{id}", get(get_order))
            .route("/orders/{id}/payment-url", get(payment_url))
            .route("/orders/{id}/cash-on-delivery", post(cash_on_delivery))
            .route("/orders/{id}/fulfilment", post(begin_fulfilment))
            .route("/orders/{id}/complete", post(complete_order))
            .route("/orders/{id}/cancel", post(cancel_order))
            .route("/payments/callback", get(gateway_callback))
            .route("/services/{id}/slots", get(service_slots))
            .layer(trace_layer)
            .with_state(svc);

        let addr: SocketAddr = format!("0.0.0.0:{}", self.config.port).parse()?;
        tracing::info!("starting server on {}", addr);
        let listener = tokio::net::TcpListener::bind(addr).await?;
        serve(listener, app.into_make_service()).await?;
        Ok(())
    }
}

async fn health() -> (axum::http::StatusCode, Json<serde_json::Value>) {
    (
        axum::http::StatusCode::OK,
        Json(serde_json::json!({ "status": "ok" })),
    )
}

fn parse_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|e| AppError::BadRequest(e.to_string()))
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "127.0.0.1".into())
}

async fn place_order(
    State(service): State<Arc<CheckoutService>>,
    Json(payload): Json<PlaceOrder>,
) -> Result<(axum::http::StatusCode, Json<PlacedOrderResponse>), AppError> {
    let order = service.place_order(payload).await?;
    Ok((axum::http::StatusCode::CREATED, Json((&order).into())))
}

async fn get_order(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    let order = service.get_order(parse_id(&id)?).await?;
    Ok(Json(order))
}

async fn pending_orders(
    State(service): State<Arc<CheckoutService>>,
) -> Result<Json<Vec<Order>>, AppError> {
    Ok(Json(service.pending_orders().await?))
}

async fn payment_url(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<String>,
    Query(q): Query<PaymentUrlQuery>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let url = service
        .payment_url(parse_id(&id)?, client_ip(&headers), q.bank_code, q.locale)
        .await?;
    Ok(Json(serde_json::json!({ "url": url })))
}

/// The gateway redirects the buyer here with the signed parameter set. The
/// whole set goes back through signature verification; on any mismatch the
/// response is an opaque "payment not confirmed".
async fn gateway_callback(
    State(service): State<Arc<CheckoutService>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let order = service.handle_gateway_callback(&params).await?;
    Ok(Json(serde_json::json!({
        "order_id": order.id.to_string(),
        "state": order.state.label(),
    })))
}

async fn cash_on_delivery(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(service.confirm_cash_on_delivery(parse_id(&id)?).await?))
}

async fn begin_fulfilment(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<String>,
    Json(payload): Json<FulfilmentRequest>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(
        service.begin_fulfilment(parse_id(&id)?, payload.stage).await?,
    ))
}

async fn complete_order(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<String>,
    payload: Option<Json<CompleteRequest>>,
) -> Result<Json<Order>, AppError> {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let prices: Vec<(Uuid, i64)> = req
        .real_prices
        .iter()
        .map(|p| (p.service_id, p.price))
        .collect();
    Ok(Json(service.complete(parse_id(&id)?, &prices).await?))
}

async fn cancel_order(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<String>,
) -> Result<Json<Order>, AppError> {
    Ok(Json(service.cancel(parse_id(&id)?).await?))
}

async fn service_slots(
    State(service): State<Arc<CheckoutService>>,
    Path(id): Path<String>,
    Query(q): Query<SlotsQuery>,
) -> Result<Json<Vec<DateTime<Utc>>>, AppError> {
    Ok(Json(
        service.available_slots(parse_id(&id)?, q.from, q.to).await?,
    ))
}
