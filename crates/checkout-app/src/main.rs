use std::sync::Arc;

use checkout_hex::application::checkout::CheckoutService;
use checkout_hex::application::coupons::CouponLedger;
use checkout_hex::application::gateway::GatewaySigner;
use checkout_hex::application::slots::{BusinessHours, SlotAllocator};
use checkout_hex::config::Config;
use checkout_hex::inbound::http::{HttpServer, HttpServerConfig};
use checkout_repo::catalog::InMemoryCatalog;
use checkout_repo::notify::TracingNotifier;
use checkout_repo::{build_repo, Repo};
use checkout_types::ports::catalog::{ProductInfo, ServiceInfo};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env for DATABASE_URL / SERVER_PORT / VNP_* when present.
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "debug".to_string()))
        .init();

    let config = Config::from_env()?;
    let repo: Arc<Repo> = Arc::new(build_repo(config.database_url.as_deref()).await?);
    let catalog = Arc::new(InMemoryCatalog::new());
    seed_catalog(&catalog);

    let signer = GatewaySigner::new(config.gateway.clone())?;
    let hours = BusinessHours {
        open_hour: config.open_hour,
        close_hour: config.close_hour,
    };
    let service = CheckoutService::new(
        repo.clone(),
        CouponLedger::new(repo.clone()),
        SlotAllocator::new(repo, catalog.clone(), hours),
        catalog,
        Arc::new(TracingNotifier),
        signer,
    );

    let server_cfg = HttpServerConfig {
        port: config.server_port.clone(),
    };

    let http = HttpServer::new(service, server_cfg).await?;
    http.run().await
}

// Catalog entries belong to the storefront subsystem; until that is wired
// in, a small fixed set keeps the checkout runnable end to end.
fn seed_catalog(catalog: &InMemoryCatalog) {
    catalog.seed_product(ProductInfo {
        id: Uuid::from_u128(0x01),
        name: "Salmon Kibble 2kg".into(),
        price: 240_000,
    });
    catalog.seed_product(ProductInfo {
        id: Uuid::from_u128(0x02),
        name: "Rope Toy".into(),
        price: 45_000,
    });
    catalog.seed_service(ServiceInfo {
        id: Uuid::from_u128(0x10),
        name: "Grooming".into(),
        price: 260_000,
        duration_min: 60,
    });
    catalog.seed_service(ServiceInfo {
        id: Uuid::from_u128(0x11),
        name: "Spa & Bath".into(),
        price: 180_000,
        duration_min: 60,
    });
}
