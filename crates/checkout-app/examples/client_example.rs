///  To run :
///  cargo r --example client_example
use std::sync::Arc;

use checkout_client::{CheckoutClient, PlaceOrderRequest, RequestLine};
use checkout_hex::application::checkout::CheckoutService;
use checkout_hex::application::coupons::CouponLedger;
use checkout_hex::application::gateway::GatewaySigner;
use checkout_hex::application::slots::{BusinessHours, SlotAllocator};
use checkout_hex::config::GatewayConfig;
use checkout_hex::inbound::http::{HttpServer, HttpServerConfig};
use checkout_repo::catalog::InMemoryCatalog;
use checkout_repo::notify::TracingNotifier;
use checkout_repo::{build_repo, Repo};
use checkout_types::domain::order::{FulfilmentStage, PetInfo};
use checkout_types::ports::catalog::{ProductInfo, ServiceInfo};
use chrono::{Duration, DurationRound, Utc};
use tempfile::tempdir;
use uuid::Uuid;

fn find_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Start server on ephemeral port.
    let port = find_free_port();
    let addr = format!("http://127.0.0.1:{port}/");

    // Use a temp file-backed SQLite DB so multiple connections see the same data.
    let tmp = tempdir()?;
    let db_path = tmp.path().join("checkout.db");
    let db_url = format!("sqlite://{}", db_path.display());

    let repo: Arc<Repo> = Arc::new(build_repo(Some(&db_url)).await?);
    let catalog = Arc::new(InMemoryCatalog::new());
    let product_id = Uuid::new_v4();
    let service_id = Uuid::new_v4();
    catalog.seed_product(ProductInfo {
        id: product_id,
        name: "Salmon Kibble".into(),
        price: 240_000,
    });
    catalog.seed_service(ServiceInfo {
        id: service_id,
        name: "Grooming".into(),
        price: 260_000,
        duration_min: 60,
    });

    let signer = GatewaySigner::new(GatewayConfig {
        merchant_code: "DEMO0001".into(),
        hash_secret: "demo-secret".into(),
        base_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".into(),
        return_url: format!("{addr}payments/callback"),
    })?;
    let service = CheckoutService::new(
        repo.clone(),
        CouponLedger::new(repo.clone()),
        SlotAllocator::new(repo, catalog.clone(), BusinessHours::default()),
        catalog,
        Arc::new(TracingNotifier),
        signer,
    );
    let server = HttpServer::new(
        service,
        HttpServerConfig {
            port: port.to_string(),
        },
    )
    .await?;

    let handle = tokio::spawn(async move {
        server.run().await.expect("server run");
    });
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // A booking for tomorrow at 10:00 UTC.
    let starts_at = (Utc::now() + Duration::days(1)).duration_trunc(Duration::days(1))?
        + Duration::hours(10);

    let client = CheckoutClient::new(&addr)?;
    let placed = client
        .place_order(PlaceOrderRequest {
            customer_name: "Example".into(),
            email: "example@example.com".into(),
            shipping_address: Some("1 Pier Ln".into()),
            lines: vec![
                RequestLine::Product {
                    product_id,
                    qty: 2,
                },
                RequestLine::Service {
                    service_id,
                    starts_at,
                    pet: PetInfo {
                        name: "Mochi".into(),
                        species: "cat".into(),
                        note: None,
                    },
                },
            ],
            coupon_code: None,
            delivery_fee: 20_000,
        })
        .await?;
    println!("Placed order id={} total={}", placed.id, placed.total);
    assert_eq!(placed.state, "Pending");

    // The slot we booked is gone from the listing.
    let open = client
        .available_slots(service_id, starts_at - Duration::hours(2), starts_at + Duration::hours(2))
        .await?;
    assert!(!open.contains(&starts_at));
    println!("Open slots around the booking: {}", open.len());

    // A gateway redirect URL for the pending order.
    let url = client.payment_url(&placed.id, None, None).await?;
    println!("Redirect the buyer to: {url}");

    // Settle in cash instead and walk the order to completion.
    let paid = client.confirm_cash_on_delivery(&placed.id).await?;
    println!("Confirmed COD, state={}", paid.state.label());

    client
        .begin_fulfilment(&placed.id, FulfilmentStage::ServiceInProgress)
        .await?;
    let done = client.complete(&placed.id, vec![]).await?;
    println!("Completed, state={}", done.state.label());

    handle.abort();
    Ok(())
}
