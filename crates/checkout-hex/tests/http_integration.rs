use std::collections::BTreeMap;
use std::sync::Arc;

use checkout_hex::application::checkout::CheckoutService;
use checkout_hex::application::coupons::CouponLedger;
use checkout_hex::application::gateway::{canonical_query, GatewaySigner};
use checkout_hex::application::slots::{BusinessHours, SlotAllocator};
use checkout_hex::config::GatewayConfig;
use checkout_hex::inbound::http::{HttpServer, HttpServerConfig};
use checkout_repo::catalog::InMemoryCatalog;
use checkout_repo::memory::InMemoryRepo;
use checkout_repo::notify::TracingNotifier;
use checkout_types::domain::order::Order;
use checkout_types::ports::catalog::{ProductInfo, ServiceInfo};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

fn find_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        merchant_code: "SHOPTMN1".into(),
        hash_secret: "http-test-secret".into(),
        base_url: "https://sandbox.gateway.test/paymentv2/vpcpay.html".into(),
        return_url: "http://127.0.0.1/payments/callback".into(),
    }
}

struct TestApp {
    addr: String,
    signer: GatewaySigner,
    product_id: Uuid,
    service_id: Uuid,
    handle: tokio::task::JoinHandle<()>,
}

async fn spawn_app() -> TestApp {
    let port = find_free_port();
    let repo = Arc::new(InMemoryRepo::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let product_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();
    catalog.seed_product(ProductInfo {
        id: product_id,
        name: "Beef Treats".into(),
        price: 80_000,
    });
    catalog.seed_service(ServiceInfo {
        id: service_id,
        name: "Bath & Trim".into(),
        price: 150_000,
        duration_min: 60,
    });

    let signer = GatewaySigner::new(gateway_config()).unwrap();
    let service = CheckoutService::new(
        repo.clone(),
        CouponLedger::new(repo.clone()),
        SlotAllocator::new(repo, catalog.clone(), BusinessHours::default()),
        catalog,
        Arc::new(TracingNotifier),
        signer.clone(),
    );
    let server = HttpServer::new(
        service,
        HttpServerConfig {
            port: port.to_string(),
        },
    )
    .await
    .unwrap();

    let handle = tokio::spawn(async move {
        server.run().await.expect("server run");
    });
    // Give the server a moment to start.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    TestApp {
        addr: format!("http://127.0.0.1:{}", port),
        signer,
        product_id,
        service_id,
        handle,
    }
}

#[derive(Deserialize)]
struct Placed {
    id: String,
    state: String,
    total: i64,
}

fn signed_callback_query(
    signer: &GatewaySigner,
    order_id: &str,
    amount: i64,
) -> Vec<(String, String)> {
    let mut params = BTreeMap::new();
    params.insert("vnp_TxnRef".to_string(), order_id.to_string());
    params.insert("vnp_Amount".to_string(), (amount * 100).to_string());
    params.insert("vnp_ResponseCode".to_string(), "00".to_string());
    params.insert("vnp_TransactionNo".to_string(), "20250001".to_string());
    let canonical = canonical_query(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    let sig = signer.sign(&canonical);
    let mut query: Vec<(String, String)> = params.into_iter().collect();
    query.push(("vnp_SecureHash".into(), sig));
    query
}

#[tokio::test]
async fn checkout_and_gateway_payment_over_http() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let body = json!({
        "customer_name": "HttpUser",
        "email": "http@example.com",
        "shipping_address": "2 Dock Rd",
        "lines": [
            { "Product": { "product_id": app.product_id, "qty": 3 } }
        ],
        "coupon_code": null,
        "delivery_fee": 15_000
    });
    let res = client
        .post(format!("{}/orders", app.addr))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::CREATED);
    let placed: Placed = res.json().await.unwrap();
    assert_eq!(placed.state, "Pending");
    assert_eq!(placed.total, 3 * 80_000 + 15_000);

    let fetched: Order = client
        .get(format!("{}/orders/{}", app.addr, placed.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.customer_name, "HttpUser");

    let pending: Vec<Order> = client
        .get(format!("{}/orders/pending", app.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);

    #[derive(Deserialize)]
    struct UrlBody {
        url: String,
    }
    let res = client
        .get(format!("{}/orders/{}/payment-url", app.addr, placed.id))
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let url: UrlBody = res.json().await.unwrap();
    assert!(url.url.starts_with("https://sandbox.gateway.test/"));
    assert!(url.url.contains("vnp_SecureHash="));
    assert!(url.url.contains(&format!("vnp_Amount={}", placed.total * 100)));

    let res = client
        .get(format!("{}/payments/callback", app.addr))
        .query(&signed_callback_query(&app.signer, &placed.id, placed.total))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let confirmed: serde_json::Value = res.json().await.unwrap();
    assert_eq!(confirmed["state"], "Processing");

    let pending: Vec<Order> = client
        .get(format!("{}/orders/pending", app.addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(pending.is_empty());

    app.handle.abort();
}

#[tokio::test]
async fn tampered_callback_is_rejected_with_an_opaque_error() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let body = json!({
        "customer_name": "HttpUser",
        "email": "http@example.com",
        "shipping_address": null,
        "lines": [
            { "Product": { "product_id": app.product_id, "qty": 1 } }
        ],
        "coupon_code": null
    });
    let placed: Placed = client
        .post(format!("{}/orders", app.addr))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let mut query = signed_callback_query(&app.signer, &placed.id, placed.total);
    for pair in query.iter_mut() {
        if pair.0 == "vnp_Amount" {
            pair.1 = "1".into();
        }
    }
    let res = client
        .get(format!("{}/payments/callback", app.addr))
        .query(&query)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);
    let err: serde_json::Value = res.json().await.unwrap();
    assert_eq!(err["error"], "payment not confirmed");

    let fetched: Order = client
        .get(format!("{}/orders/{}", app.addr, placed.id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(fetched.state.label(), "Pending");

    app.handle.abort();
}

#[tokio::test]
async fn booking_lifecycle_over_http() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let day = |h: u32| Utc.with_ymd_and_hms(2026, 6, 1, h, 0, 0).unwrap();

    let slots_url = format!("{}/services/{}/slots", app.addr, app.service_id);
    let range = [
        ("from", day(8).to_rfc3339()),
        ("to", day(18).to_rfc3339()),
    ];
    let open: Vec<DateTime<Utc>> = client
        .get(&slots_url)
        .query(&range)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(open.contains(&day(10)));

    let body = json!({
        "customer_name": "Booker",
        "email": "booker@example.com",
        "shipping_address": null,
        "lines": [
            { "Service": {
                "service_id": app.service_id,
                "starts_at": day(10),
                "pet": { "name": "Rex", "species": "dog", "note": null }
            } }
        ],
        "coupon_code": null
    });
    let placed: Placed = client
        .post(format!("{}/orders", app.addr))
        .json(&body)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let open: Vec<DateTime<Utc>> = client
        .get(&slots_url)
        .query(&range)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(!open.contains(&day(10)));

    // double-booking the same hour is refused
    let res = client
        .post(format!("{}/orders", app.addr))
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::CONFLICT);

    let res = client
        .post(format!("{}/orders/{}/cash-on-delivery", app.addr, placed.id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    let res = client
        .post(format!("{}/orders/{}/fulfilment", app.addr, placed.id))
        .json(&json!({ "stage": "ServiceInProgress" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);

    let res = client
        .post(format!("{}/orders/{}/complete", app.addr, placed.id))
        .json(&json!({
            "real_prices": [ { "service_id": app.service_id, "price": 180_000 } ]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::OK);
    let done: Order = res.json().await.unwrap();
    assert_eq!(done.state.label(), "Completed");

    // a completed order cannot be cancelled
    let res = client
        .post(format!("{}/orders/{}/cancel", app.addr, placed.id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::CONFLICT);

    app.handle.abort();
}

#[tokio::test]
async fn bad_request_and_not_found_paths() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();

    let bad_body = json!({
        "customer_name": "",
        "email": "invalid",
        "shipping_address": null,
        "lines": [],
        "coupon_code": null
    });
    let res = client
        .post(format!("{}/orders", app.addr))
        .json(&bad_body)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);

    let missing_id = Uuid::new_v4();
    let res = client
        .get(format!("{}/orders/{}", app.addr, missing_id))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::NOT_FOUND);

    let res = client
        .get(format!("{}/orders/not-a-uuid", app.addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::BAD_REQUEST);

    app.handle.abort();
}
