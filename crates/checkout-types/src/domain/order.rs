use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// How an order's payment was settled. An order can only leave `Pending`
/// by acquiring one of these, so later states are unreachable without a
/// payment confirmation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PaymentConfirmation {
    /// Confirmed by a signature-verified gateway callback.
    Gateway { txn_ref: String },
    CashOnDelivery,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FulfilmentStage {
    /// Goods handed to the courier.
    Shipping,
    /// Service booking confirmed and underway.
    ServiceInProgress,
}

/// Explicit order state. The legacy model carried payment status, order
/// status and booking status as three independently writable fields; here
/// every valid combination is one variant and the transition methods on
/// [`Order`] reject the rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderState {
    Pending,
    Processing {
        payment: PaymentConfirmation,
    },
    InFulfilment {
        payment: PaymentConfirmation,
        stage: FulfilmentStage,
    },
    Completed {
        payment: PaymentConfirmation,
    },
    Cancelled {
        was_paid: bool,
    },
}

impl OrderState {
    pub fn label(&self) -> &'static str {
        match self {
            OrderState::Pending => "Pending",
            OrderState::Processing { .. } => "Processing",
            OrderState::InFulfilment { .. } => "InFulfilment",
            OrderState::Completed { .. } => "Completed",
            OrderState::Cancelled { .. } => "Cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PetInfo {
    pub name: String,
    pub species: String,
    pub note: Option<String>,
}

/// One line of an order: either a quantity of a product or a single
/// scheduled service booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OrderLine {
    Product {
        product_id: Uuid,
        name: String,
        qty: u32,
        unit_price: i64,
    },
    Service {
        service_id: Uuid,
        name: String,
        listed_price: i64,
        starts_at: DateTime<Utc>,
        duration_min: i64,
        pet: PetInfo,
        /// Adjusted price set once the service has been performed.
        real_price: Option<i64>,
        is_rated: bool,
    },
}

impl OrderLine {
    pub fn amount(&self) -> i64 {
        match self {
            OrderLine::Product {
                qty, unit_price, ..
            } => (*qty as i64) * unit_price,
            OrderLine::Service { listed_price, .. } => *listed_price,
        }
    }
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("cannot {action} an order in state {from}")]
    InvalidTransition {
        from: &'static str,
        action: &'static str,
    },
    #[error("order has no service line for service {0}")]
    NoSuchServiceLine(Uuid),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub customer_name: String,
    pub email: String,
    pub shipping_address: Option<String>,
    pub lines: Vec<OrderLine>,
    pub coupon_code: Option<String>,
    pub discount: i64,
    pub delivery_fee: i64,
    pub total: i64,
    pub state: OrderState,
    /// Optimistic-concurrency version, bumped by the repository on every
    /// compare-and-update.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new(
        customer_name: String,
        email: String,
        shipping_address: Option<String>,
        lines: Vec<OrderLine>,
        coupon_code: Option<String>,
        discount: i64,
        delivery_fee: i64,
    ) -> anyhow::Result<Self> {
        if customer_name.trim().is_empty() {
            anyhow::bail!("customer_name empty");
        }
        if !email.contains('@') {
            anyhow::bail!("invalid email");
        }
        if lines.is_empty() {
            anyhow::bail!("lines empty");
        }
        for line in &lines {
            match line {
                OrderLine::Product { qty, unit_price, .. } => {
                    if *qty == 0 {
                        anyhow::bail!("product qty must be > 0");
                    }
                    if *unit_price < 0 {
                        anyhow::bail!("negative unit price");
                    }
                }
                OrderLine::Service {
                    listed_price,
                    duration_min,
                    ..
                } => {
                    if *listed_price < 0 {
                        anyhow::bail!("negative service price");
                    }
                    if *duration_min <= 0 {
                        anyhow::bail!("service duration must be > 0");
                    }
                }
            }
        }
        if discount < 0 || delivery_fee < 0 {
            anyhow::bail!("negative discount or delivery fee");
        }
        if discount > 0 && coupon_code.is_none() {
            anyhow::bail!("discount without coupon");
        }
        let subtotal: i64 = lines.iter().map(OrderLine::amount).sum();
        if discount > subtotal + delivery_fee {
            anyhow::bail!("discount exceeds order value");
        }
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            customer_name,
            email,
            shipping_address,
            lines,
            coupon_code,
            discount,
            delivery_fee,
            total: subtotal + delivery_fee - discount,
            state: OrderState::Pending,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn payment(&self) -> Option<&PaymentConfirmation> {
        match &self.state {
            OrderState::Pending | OrderState::Cancelled { .. } => None,
            OrderState::Processing { payment }
            | OrderState::InFulfilment { payment, .. }
            | OrderState::Completed { payment } => Some(payment),
        }
    }

    pub fn is_gateway_paid(&self) -> bool {
        matches!(
            self.payment(),
            Some(PaymentConfirmation::Gateway { .. })
        )
    }

    pub fn has_service_lines(&self) -> bool {
        self.lines
            .iter()
            .any(|l| matches!(l, OrderLine::Service { .. }))
    }

    /// Pending -> Processing, carrying the payment confirmation.
    pub fn confirm_payment(&mut self, payment: PaymentConfirmation) -> Result<(), OrderError> {
        match self.state {
            OrderState::Pending => {
                self.state = OrderState::Processing { payment };
                self.touch();
                Ok(())
            }
            _ => Err(OrderError::InvalidTransition {
                from: self.state.label(),
                action: "confirm payment on",
            }),
        }
    }

    /// Processing -> Pending. Used when a step that must commit together
    /// with the payment (coupon redemption) fails after the state moved.
    pub fn rescind_payment(&mut self) -> Result<(), OrderError> {
        match self.state {
            OrderState::Processing { .. } => {
                self.state = OrderState::Pending;
                self.touch();
                Ok(())
            }
            _ => Err(OrderError::InvalidTransition {
                from: self.state.label(),
                action: "rescind payment on",
            }),
        }
    }

    /// Processing -> InFulfilment.
    pub fn begin_fulfilment(&mut self, stage: FulfilmentStage) -> Result<(), OrderError> {
        match std::mem::replace(&mut self.state, OrderState::Pending) {
            OrderState::Processing { payment } => {
                self.state = OrderState::InFulfilment { payment, stage };
                self.touch();
                Ok(())
            }
            other => {
                self.state = other;
                Err(OrderError::InvalidTransition {
                    from: self.state.label(),
                    action: "begin fulfilment of",
                })
            }
        }
    }

    /// InFulfilment -> Completed.
    pub fn complete(&mut self) -> Result<(), OrderError> {
        match std::mem::replace(&mut self.state, OrderState::Pending) {
            OrderState::InFulfilment { payment, .. } => {
                self.state = OrderState::Completed { payment };
                self.touch();
                Ok(())
            }
            other => {
                self.state = other;
                Err(OrderError::InvalidTransition {
                    from: self.state.label(),
                    action: "complete",
                })
            }
        }
    }

    /// Pending/Processing -> Cancelled. Returns `Ok(false)` without touching
    /// anything when the order is already cancelled, so callers can keep
    /// slot and coupon release idempotent.
    pub fn cancel(&mut self) -> Result<bool, OrderError> {
        match &self.state {
            OrderState::Cancelled { .. } => Ok(false),
            OrderState::Pending => {
                self.state = OrderState::Cancelled { was_paid: false };
                self.touch();
                Ok(true)
            }
            OrderState::Processing { payment } => {
                let was_paid = matches!(payment, PaymentConfirmation::Gateway { .. });
                self.state = OrderState::Cancelled { was_paid };
                self.touch();
                Ok(true)
            }
            _ => Err(OrderError::InvalidTransition {
                from: self.state.label(),
                action: "cancel",
            }),
        }
    }

    /// Records the post-service adjusted price on a service line.
    pub fn set_real_price(&mut self, service_id: Uuid, price: i64) -> Result<(), OrderError> {
        for line in &mut self.lines {
            if let OrderLine::Service {
                service_id: sid,
                real_price,
                ..
            } = line
            {
                if *sid == service_id {
                    *real_price = Some(price);
                    self.touch();
                    return Ok(());
                }
            }
        }
        Err(OrderError::NoSuchServiceLine(service_id))
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
