//! Typed HTTP client for the checkout service. Mirrors the inbound HTTP
//! surface: placing orders, requesting gateway payment URLs, confirming
//! cash-on-delivery, walking fulfilment, and querying booking slots.

use std::time::Duration;

use anyhow::Context;
use checkout_types::domain::order::{FulfilmentStage, Order, PetInfo};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone)]
pub struct CheckoutClientBuilder {
    base: Url,
    headers: HeaderMap,
    timeout: Option<Duration>,
    client: Option<reqwest::Client>,
}

#[derive(Clone)]
pub struct CheckoutClient {
    base: Url,
    client: reqwest::Client,
}

impl CheckoutClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        Self::builder(base_url)?.build()
    }

    pub fn builder(base_url: &str) -> anyhow::Result<CheckoutClientBuilder> {
        let base = Url::parse(base_url).context("invalid base url")?;
        Ok(CheckoutClientBuilder {
            base,
            headers: HeaderMap::new(),
            timeout: None,
            client: None,
        })
    }

    fn url(&self, path: &str) -> anyhow::Result<Url> {
        self.base.join(path).context("failed to join url")
    }

    pub async fn place_order(&self, req: PlaceOrderRequest) -> anyhow::Result<PlacedOrder> {
        let res = self
            .client
            .post(self.url("orders")?)
            .json(&req)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    pub async fn get_order(&self, id: &str) -> anyhow::Result<Order> {
        let res = self
            .client
            .get(self.url(&format!("orders/{id}"))?)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    pub async fn pending_orders(&self) -> anyhow::Result<Vec<Order>> {
        let res = self
            .client
            .get(self.url("orders/pending")?)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    /// Signed gateway redirect URL the buyer should be sent to.
    pub async fn payment_url(
        &self,
        id: &str,
        bank_code: Option<&str>,
        locale: Option<&str>,
    ) -> anyhow::Result<String> {
        let mut url = self.url(&format!("orders/{id}/payment-url"))?;
        {
            let mut q = url.query_pairs_mut();
            if let Some(bank) = bank_code {
                q.append_pair("bank_code", bank);
            }
            if let Some(locale) = locale {
                q.append_pair("locale", locale);
            }
        }
        let res = self.client.get(url).send().await?.error_for_status()?;
        let body: PaymentUrl = res.json().await?;
        Ok(body.url)
    }

    pub async fn confirm_cash_on_delivery(&self, id: &str) -> anyhow::Result<Order> {
        let res = self
            .client
            .post(self.url(&format!("orders/{id}/cash-on-delivery"))?)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    pub async fn begin_fulfilment(
        &self,
        id: &str,
        stage: FulfilmentStage,
    ) -> anyhow::Result<Order> {
        let res = self
            .client
            .post(self.url(&format!("orders/{id}/fulfilment"))?)
            .json(&FulfilmentRequest { stage })
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    /// Completes the order, optionally recording post-service prices.
    pub async fn complete(
        &self,
        id: &str,
        real_prices: Vec<RealPrice>,
    ) -> anyhow::Result<Order> {
        let res = self
            .client
            .post(self.url(&format!("orders/{id}/complete"))?)
            .json(&CompleteRequest { real_prices })
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    pub async fn cancel(&self, id: &str) -> anyhow::Result<Order> {
        let res = self
            .client
            .post(self.url(&format!("orders/{id}/cancel"))?)
            .send()
            .await?
            .error_for_status()?;
        Ok(res.json().await?)
    }

    pub async fn available_slots(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<DateTime<Utc>>> {
        let mut url = self.url(&format!("services/{service_id}/slots"))?;
        url.query_pairs_mut()
            .append_pair("from", &from.to_rfc3339())
            .append_pair("to", &to.to_rfc3339());
        let res = self.client.get(url).send().await?.error_for_status()?;
        Ok(res.json().await?)
    }
}

impl CheckoutClientBuilder {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_header(
        mut self,
        key: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> anyhow::Result<Self> {
        let header_name =
            HeaderName::from_bytes(key.as_ref().as_bytes()).context("invalid header name")?;
        let header_value = HeaderValue::from_str(value.as_ref()).context("invalid header value")?;
        self.headers.insert(header_name, header_value);
        Ok(self)
    }

    pub fn with_reqwest_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> anyhow::Result<CheckoutClient> {
        if let Some(client) = self.client {
            return Ok(CheckoutClient {
                base: self.base,
                client,
            });
        }

        let mut builder = reqwest::Client::builder();
        if !self.headers.is_empty() {
            builder = builder.default_headers(self.headers);
        }
        if let Some(t) = self.timeout {
            builder = builder.timeout(t);
        }
        let client = builder.build()?;
        Ok(CheckoutClient {
            base: self.base,
            client,
        })
    }
}

/// One requested line; must serialize the way the server expects it.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum RequestLine {
    Product {
        product_id: Uuid,
        qty: u32,
    },
    Service {
        service_id: Uuid,
        starts_at: DateTime<Utc>,
        pet: PetInfo,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlaceOrderRequest {
    pub customer_name: String,
    pub email: String,
    pub shipping_address: Option<String>,
    pub lines: Vec<RequestLine>,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub delivery_fee: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub id: String,
    pub state: String,
    pub total: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct PaymentUrl {
    url: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct FulfilmentRequest {
    stage: FulfilmentStage,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RealPrice {
    pub service_id: Uuid,
    pub price: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct CompleteRequest {
    real_prices: Vec<RealPrice>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_types::domain::order::{OrderLine, OrderState};
    use httpmock::prelude::*;

    fn sample_order() -> Order {
        Order::new(
            "User".into(),
            "user@example.com".into(),
            Some("1 Pier Ln".into()),
            vec![OrderLine::Product {
                product_id: Uuid::new_v4(),
                name: "Widget".into(),
                qty: 1,
                unit_price: 500,
            }],
            None,
            0,
            0,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn place_and_get_order() {
        let server = MockServer::start();
        let order = sample_order();

        let req = PlaceOrderRequest {
            customer_name: order.customer_name.clone(),
            email: order.email.clone(),
            shipping_address: order.shipping_address.clone(),
            lines: vec![RequestLine::Product {
                product_id: Uuid::new_v4(),
                qty: 1,
            }],
            coupon_code: None,
            delivery_fee: 0,
        };

        let place_mock = server.mock(|when, then| {
            when.method(POST).path("/orders").json_body_obj(&req);
            then.status(201).json_body_obj(&PlacedOrder {
                id: order.id.to_string(),
                state: "Pending".into(),
                total: order.total,
            });
        });

        let get_mock = server.mock(|when, then| {
            when.method(GET).path(format!("/orders/{}", order.id));
            then.status(200).json_body_obj(&order);
        });

        let client = CheckoutClient::new(&server.base_url()).unwrap();
        let placed = client.place_order(req).await.unwrap();
        assert_eq!(placed.id, order.id.to_string());
        assert_eq!(placed.state, "Pending");

        let fetched = client.get_order(&order.id.to_string()).await.unwrap();
        assert_eq!(fetched.email, order.email);
        assert_eq!(fetched.state, OrderState::Pending);

        place_mock.assert();
        get_mock.assert();
    }

    #[tokio::test]
    async fn payment_url_and_cancel() {
        let server = MockServer::start();
        let order = sample_order();

        let url_mock = server.mock(|when, then| {
            when.method(GET)
                .path(format!("/orders/{}/payment-url", order.id))
                .query_param("bank_code", "NCB");
            then.status(200)
                .json_body(serde_json::json!({ "url": "https://gw/pay?vnp_SecureHash=ab" }));
        });

        let cancel_mock = server.mock(|when, then| {
            when.method(POST).path(format!("/orders/{}/cancel", order.id));
            let mut cancelled = order.clone();
            cancelled.state = OrderState::Cancelled { was_paid: false };
            then.status(200).json_body_obj(&cancelled);
        });

        let client = CheckoutClient::new(&server.base_url()).unwrap();
        let url = client
            .payment_url(&order.id.to_string(), Some("NCB"), None)
            .await
            .unwrap();
        assert!(url.contains("vnp_SecureHash="));

        let cancelled = client.cancel(&order.id.to_string()).await.unwrap();
        assert_eq!(cancelled.state, OrderState::Cancelled { was_paid: false });

        url_mock.assert();
        cancel_mock.assert();
    }

    #[tokio::test]
    async fn slots_round_trip() {
        let server = MockServer::start();
        let service_id = Uuid::new_v4();
        let from = chrono::Utc::now();
        let to = from + chrono::Duration::hours(8);
        let open = vec![from + chrono::Duration::hours(1)];

        let slots_mock = server.mock(|when, then| {
            when.method(GET)
                .path(format!("/services/{service_id}/slots"))
                .query_param("from", from.to_rfc3339());
            then.status(200).json_body_obj(&open);
        });

        let client = CheckoutClient::new(&server.base_url()).unwrap();
        let got = client.available_slots(service_id, from, to).await.unwrap();
        assert_eq!(got, open);

        slots_mock.assert();
    }
}
