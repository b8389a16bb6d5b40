use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::application::coupons::CouponLedger;
use crate::application::gateway::{GatewaySigner, PaymentParams};
use crate::application::slots::SlotAllocator;
use crate::errors::AppError;
use checkout_types::domain::coupon::Coupon;
use checkout_types::domain::order::{
    FulfilmentStage, Order, OrderLine, OrderState, PaymentConfirmation, PetInfo,
};
use checkout_types::ports::catalog::CatalogPort;
use checkout_types::ports::notifier::Notifier;
use checkout_types::ports::order_repository::{CasOutcome, OrderRepository};

/// One requested line at checkout time; prices and durations are resolved
/// against the catalog, never trusted from the client.
#[derive(Debug, Clone, Deserialize)]
pub enum NewLine {
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

#[derive(Debug, Deserialize)]
pub struct PlaceOrder {
    pub customer_name: String,
    pub email: String,
    pub shipping_address: Option<String>,
    pub lines: Vec<NewLine>,
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub delivery_fee: i64,
}

/// The order lifecycle coordinator: sole writer of order state, and the only
/// place where payment confirmation, coupon redemption and slot bookkeeping
/// are stitched together. Every step either fully commits or leaves all
/// entities untouched.
#[derive(Clone)]
pub struct CheckoutService {
    orders: Arc<dyn OrderRepository>,
    coupons: CouponLedger,
    slots: SlotAllocator,
    catalog: Arc<dyn CatalogPort>,
    notifier: Arc<dyn Notifier>,
    signer: GatewaySigner,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        coupons: CouponLedger,
        slots: SlotAllocator,
        catalog: Arc<dyn CatalogPort>,
        notifier: Arc<dyn Notifier>,
        signer: GatewaySigner,
    ) -> Self {
        Self {
            orders,
            coupons,
            slots,
            catalog,
            notifier,
            signer,
        }
    }

    async fn require(&self, id: Uuid) -> Result<Order, AppError> {
        match self.orders.get(id).await? {
            Some(o) => Ok(o),
            None => Err(AppError::NotFound(format!("order {id}"))),
        }
    }

    /// Checkout: resolve lines against the catalog, validate the coupon,
    /// reserve service slots, persist the order as `Pending`. Any failure
    /// after slots were taken releases them again before returning.
    pub async fn place_order(&self, req: PlaceOrder) -> Result<Order, AppError> {
        let mut lines = Vec::with_capacity(req.lines.len());
        let mut bookings = Vec::new();
        for line in &req.lines {
            match line {
                NewLine::Product { product_id, qty } => {
                    let product = self
                        .catalog
                        .product(*product_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("product {product_id}")))?;
                    lines.push(OrderLine::Product {
                        product_id: product.id,
                        name: product.name,
                        qty: *qty,
                        unit_price: product.price,
                    });
                }
                NewLine::Service {
                    service_id,
                    starts_at,
                    pet,
                } => {
                    let service = self
                        .catalog
                        .service(*service_id)
                        .await?
                        .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))?;
                    bookings.push((service.id, *starts_at));
                    lines.push(OrderLine::Service {
                        service_id: service.id,
                        name: service.name,
                        listed_price: service.price,
                        starts_at: *starts_at,
                        duration_min: service.duration_min,
                        pet: pet.clone(),
                        real_price: None,
                        is_rated: false,
                    });
                }
            }
        }

        let subtotal: i64 = lines.iter().map(OrderLine::amount).sum();
        let coupon_code = req.coupon_code.as_deref().map(Coupon::normalize_code);
        let discount = match &coupon_code {
            Some(code) => {
                self.coupons
                    .validate(code, subtotal + req.delivery_fee, Utc::now())
                    .await?
            }
            None => 0,
        };

        let order = Order::new(
            req.customer_name,
            req.email,
            req.shipping_address,
            lines,
            coupon_code,
            discount,
            req.delivery_fee,
        )
        .map_err(|e| AppError::BadRequest(e.to_string()))?;

        for (service_id, starts_at) in &bookings {
            if let Err(err) = self.slots.reserve(*service_id, *starts_at, order.id).await {
                self.slots.release_for_order(order.id).await?;
                return Err(err);
            }
        }

        let order_id = order.id;
        match self.orders.create(order).await {
            Ok(order) => Ok(order),
            Err(e) => {
                if let Err(release_err) = self.slots.release_for_order(order_id).await {
                    tracing::warn!(%order_id, error = %release_err, "slot release after failed create also failed");
                }
                Err(e.into())
            }
        }
    }

    /// Builds the signed gateway redirect URL for a pending order.
    pub async fn payment_url(
        &self,
        order_id: Uuid,
        client_ip: String,
        bank_code: Option<String>,
        locale: Option<String>,
    ) -> Result<String, AppError> {
        let order = self.require(order_id).await?;
        if !matches!(order.state, OrderState::Pending) {
            return Err(AppError::Conflict(format!(
                "cannot request payment for an order in state {}",
                order.state.label()
            )));
        }
        let params = PaymentParams {
            order_ref: order.id.to_string(),
            amount: order.total,
            bank_code,
            locale: locale.unwrap_or_else(|| "vn".into()),
            client_ip,
            created_at: Utc::now(),
        };
        self.signer
            .build_payment_request(&params)
            .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))
    }

    /// Gateway return handler. Verifies the signature, then the transaction
    /// ref, amount and gateway response code against the stored order; only
    /// after all of that does the order move `Pending -> Processing` with the
    /// coupon redeemed in the same commit. Nothing about the failure cause is
    /// surfaced to the caller; operators get it in the log.
    pub async fn handle_gateway_callback(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<Order, AppError> {
        if !self.signer.verify_callback(params) {
            tracing::warn!("gateway callback rejected: bad signature");
            return Err(AppError::PaymentNotConfirmed);
        }

        let order_id = match params.get("vnp_TxnRef").map(|r| Uuid::parse_str(r)) {
            Some(Ok(id)) => id,
            _ => {
                tracing::warn!("gateway callback rejected: unparseable txn ref");
                return Err(AppError::PaymentNotConfirmed);
            }
        };
        let Some(order) = self.orders.get(order_id).await? else {
            tracing::warn!(%order_id, "gateway callback rejected: unknown order");
            return Err(AppError::PaymentNotConfirmed);
        };

        let amount_matches = params
            .get("vnp_Amount")
            .and_then(|a| a.parse::<i64>().ok())
            .map(|a| a == order.total * 100)
            .unwrap_or(false);
        if !amount_matches {
            tracing::warn!(%order_id, "gateway callback rejected: amount mismatch");
            return Err(AppError::PaymentNotConfirmed);
        }

        if params.get("vnp_ResponseCode").map(String::as_str) != Some("00") {
            tracing::info!(%order_id, "gateway reported unsuccessful payment, order stays pending");
            return Err(AppError::PaymentNotConfirmed);
        }

        let txn_ref = params
            .get("vnp_TransactionNo")
            .or_else(|| params.get("vnp_TxnRef"))
            .cloned()
            .unwrap_or_default();
        let payment = PaymentConfirmation::Gateway { txn_ref };

        // Replayed callbacks for a payment we already hold are a success.
        if let Some(existing) = order.payment() {
            if *existing == payment {
                return Ok(order);
            }
            tracing::warn!(%order_id, "gateway callback rejected: order already paid differently");
            return Err(AppError::PaymentNotConfirmed);
        }

        match self.commit_payment(order, payment.clone()).await {
            Ok(order) => Ok(order),
            Err(AppError::Conflict(reason)) => {
                // A racing callback may have landed the same payment first.
                let current = self.require(order_id).await?;
                if current.payment() == Some(&payment) {
                    return Ok(current);
                }
                Err(AppError::Conflict(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Cash-on-delivery confirmation: same commit path as the gateway, minus
    /// the signature. Idempotent.
    pub async fn confirm_cash_on_delivery(&self, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.require(order_id).await?;
        if order.payment() == Some(&PaymentConfirmation::CashOnDelivery) {
            return Ok(order);
        }
        self.commit_payment(order, PaymentConfirmation::CashOnDelivery)
            .await
    }

    /// Moves the order into `Processing` and redeems its coupon as one
    /// logical commit: if the redemption fails, the state transition is
    /// rolled back before the error surfaces.
    async fn commit_payment(
        &self,
        order: Order,
        payment: PaymentConfirmation,
    ) -> Result<Order, AppError> {
        let mut updated = order.clone();
        updated
            .confirm_payment(payment)
            .map_err(|e| AppError::Conflict(e.to_string()))?;

        match self.orders.compare_and_update(order.version, updated).await? {
            CasOutcome::Updated(committed) => {
                if let Some(code) = committed.coupon_code.clone() {
                    if let Err(err) = self.coupons.redeem(&code, committed.id).await {
                        self.revert_unredeemed_payment(committed).await?;
                        return Err(err);
                    }
                }
                Ok(committed)
            }
            CasOutcome::Conflict => Err(AppError::Conflict(
                "order was modified concurrently".into(),
            )),
            CasOutcome::Missing => Err(AppError::NotFound(format!("order {}", order.id))),
        }
    }

    /// Undoes a `Pending -> Processing` transition whose coupon redemption
    /// failed. The revert CAS must land: losing it to a concurrent writer
    /// would leave the order paid with no redemption, and a replayed
    /// callback would then confirm it for free. On conflict the current
    /// state is re-read and the rescind retried; if someone else has moved
    /// the order out of `Processing` meanwhile there is nothing to revert.
    async fn revert_unredeemed_payment(&self, committed: Order) -> Result<(), AppError> {
        let mut current = committed;
        loop {
            let mut revert = current.clone();
            if revert.rescind_payment().is_err() {
                tracing::warn!(
                    order_id = %current.id,
                    state = current.state.label(),
                    "order moved past Processing before its failed redemption could be reverted"
                );
                return Ok(());
            }
            match self.orders.compare_and_update(current.version, revert).await? {
                CasOutcome::Updated(_) | CasOutcome::Missing => return Ok(()),
                CasOutcome::Conflict => {
                    tracing::warn!(order_id = %current.id, "payment revert lost a concurrent write, retrying");
                    match self.orders.get(current.id).await? {
                        Some(o) => current = o,
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    /// Processing -> InFulfilment (shipping for goods, in-progress for
    /// service bookings).
    pub async fn begin_fulfilment(
        &self,
        order_id: Uuid,
        stage: FulfilmentStage,
    ) -> Result<Order, AppError> {
        let order = self.require(order_id).await?;
        let mut updated = order.clone();
        updated
            .begin_fulfilment(stage)
            .map_err(|e| AppError::Conflict(e.to_string()))?;
        match self.orders.compare_and_update(order.version, updated).await? {
            CasOutcome::Updated(o) => Ok(o),
            CasOutcome::Conflict => Err(AppError::Conflict(
                "order was modified concurrently".into(),
            )),
            CasOutcome::Missing => Err(AppError::NotFound(format!("order {order_id}"))),
        }
    }

    /// Fulfilment done: records post-service prices, completes the order and
    /// pings the notification collaborator (best effort).
    pub async fn complete(
        &self,
        order_id: Uuid,
        real_prices: &[(Uuid, i64)],
    ) -> Result<Order, AppError> {
        let order = self.require(order_id).await?;
        let mut updated = order.clone();
        for (service_id, price) in real_prices {
            updated
                .set_real_price(*service_id, *price)
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
        }
        updated
            .complete()
            .map_err(|e| AppError::Conflict(e.to_string()))?;

        match self.orders.compare_and_update(order.version, updated).await? {
            CasOutcome::Updated(o) => {
                if o.has_service_lines() {
                    if let Err(e) = self.notifier.booking_completed(&o).await {
                        tracing::warn!(order_id = %o.id, error = %e, "completion notification failed");
                    }
                }
                Ok(o)
            }
            CasOutcome::Conflict => Err(AppError::Conflict(
                "order was modified concurrently".into(),
            )),
            CasOutcome::Missing => Err(AppError::NotFound(format!("order {order_id}"))),
        }
    }

    /// Cancels a pending or processing order, then releases its slots and
    /// (for orders that never saw gateway money) its coupon use before
    /// returning. Both releases are idempotent per order, so cancelling an
    /// already-cancelled order runs them again; a retry after a release
    /// failure cannot strand the slot or the coupon use.
    pub async fn cancel(&self, order_id: Uuid) -> Result<Order, AppError> {
        let order = self.require(order_id).await?;
        let mut updated = order.clone();
        let moved = updated
            .cancel()
            .map_err(|e| AppError::Conflict(e.to_string()))?;
        if !moved {
            self.release_cancelled_holdings(&order).await?;
            return Ok(order);
        }

        match self.orders.compare_and_update(order.version, updated).await? {
            CasOutcome::Updated(o) => {
                self.release_cancelled_holdings(&o).await?;
                Ok(o)
            }
            CasOutcome::Conflict => Err(AppError::Conflict(
                "order was modified concurrently".into(),
            )),
            CasOutcome::Missing => Err(AppError::NotFound(format!("order {order_id}"))),
        }
    }

    async fn release_cancelled_holdings(&self, order: &Order) -> Result<(), AppError> {
        self.slots.release_for_order(order.id).await?;
        if let Some(code) = &order.coupon_code {
            let paid = matches!(order.state, OrderState::Cancelled { was_paid: true });
            // post-payment refunds keep their redemption; that path is an
            // explicit extension point
            if !paid {
                self.coupons.release(code, order.id).await?;
            }
        }
        Ok(())
    }

    pub async fn get_order(&self, id: Uuid) -> Result<Order, AppError> {
        self.require(id).await
    }

    /// Read-only projection of orders still awaiting payment.
    pub async fn pending_orders(&self) -> Result<Vec<Order>, AppError> {
        Ok(self.orders.list_pending().await?)
    }

    /// Read-only slot availability; reservation happens at checkout.
    pub async fn available_slots(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, AppError> {
        self.slots.available_slots(service_id, from, to).await
    }
}
