use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{FromRow, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

use checkout_types::domain::coupon::Coupon;
use checkout_types::domain::order::{Order, OrderLine, OrderState};
use checkout_types::domain::slot::Slot;
use checkout_types::ports::coupon_repository::{CouponRepository, RedeemOutcome};
use checkout_types::ports::order_repository::{CasOutcome, OrderRepository};
use checkout_types::ports::slot_repository::{ReserveOutcome, SlotRepository};
use checkout_types::ports::RepoError;

pub struct SqliteRepo {
    pool: SqlitePool,
}

fn db_err(e: impl std::fmt::Display) -> RepoError {
    RepoError::DbError(e.to_string())
}

#[derive(FromRow)]
struct DbOrder {
    id: String,
    customer_name: String,
    email: String,
    shipping_address: Option<String>,
    lines_json: String,
    coupon_code: Option<String>,
    discount: i64,
    delivery_fee: i64,
    total: i64,
    state_json: String,
    version: i64,
    created_at: String,
    updated_at: String,
}

impl DbOrder {
    fn into_order(self) -> Result<Order, RepoError> {
        let lines: Vec<OrderLine> = serde_json::from_str(&self.lines_json).map_err(db_err)?;
        let state: OrderState = serde_json::from_str(&self.state_json).map_err(db_err)?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(db_err)?
            .with_timezone(&Utc);
        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map_err(db_err)?
            .with_timezone(&Utc);
        let id = Uuid::parse_str(&self.id).map_err(db_err)?;
        Ok(Order {
            id,
            customer_name: self.customer_name,
            email: self.email,
            shipping_address: self.shipping_address,
            lines,
            coupon_code: self.coupon_code,
            discount: self.discount,
            delivery_fee: self.delivery_fee,
            total: self.total,
            state,
            version: self.version as u64,
            created_at,
            updated_at,
        })
    }
}

#[derive(FromRow)]
struct DbCoupon {
    code: String,
    discount: i64,
    min_order_value: i64,
    starts_at: String,
    ends_at: String,
    usage_limit: i64,
    used_count: i64,
    active: i64,
}

impl DbCoupon {
    fn into_coupon(self) -> Result<Coupon, RepoError> {
        Ok(Coupon {
            code: self.code,
            discount: self.discount,
            min_order_value: self.min_order_value,
            starts_at: DateTime::parse_from_rfc3339(&self.starts_at)
                .map_err(db_err)?
                .with_timezone(&Utc),
            ends_at: DateTime::parse_from_rfc3339(&self.ends_at)
                .map_err(db_err)?
                .with_timezone(&Utc),
            usage_limit: self.usage_limit as u32,
            used_count: self.used_count as u32,
            active: self.active != 0,
        })
    }
}

const ORDER_COLUMNS: &str = "id, customer_name, email, shipping_address, lines_json, coupon_code, \
     discount, delivery_fee, total, state_json, version, created_at, updated_at";

impl SqliteRepo {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        // Run migration from migration file, one statement at a time.
        let ddl = include_str!("migrations/0001_create_checkout.sql");
        for stmt in ddl.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(stmt).execute(&pool).await?;
        }

        Ok(Self { pool })
    }
}

#[async_trait]
impl OrderRepository for SqliteRepo {
    async fn create(&self, order: Order) -> Result<Order, RepoError> {
        let lines_json = serde_json::to_string(&order.lines).map_err(db_err)?;
        let state_json = serde_json::to_string(&order.state).map_err(db_err)?;
        sqlx::query(
            "INSERT INTO orders (id, customer_name, email, shipping_address, lines_json, \
             coupon_code, discount, delivery_fee, total, state_json, state_label, version, \
             created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(order.id.to_string())
        .bind(&order.customer_name)
        .bind(&order.email)
        .bind(&order.shipping_address)
        .bind(lines_json)
        .bind(&order.coupon_code)
        .bind(order.discount)
        .bind(order.delivery_fee)
        .bind(order.total)
        .bind(state_json)
        .bind(order.state.label())
        .bind(order.version as i64)
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(order)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepoError> {
        let row: Option<DbOrder> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?"))
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;
        row.map(|r| r.into_order()).transpose()
    }

    async fn list_pending(&self) -> Result<Vec<Order>, RepoError> {
        let rows: Vec<DbOrder> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE state_label = 'Pending' ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.into_iter().map(|r| r.into_order()).collect()
    }

    async fn compare_and_update(
        &self,
        expected_version: u64,
        mut order: Order,
    ) -> Result<CasOutcome, RepoError> {
        order.version = expected_version + 1;
        let lines_json = serde_json::to_string(&order.lines).map_err(db_err)?;
        let state_json = serde_json::to_string(&order.state).map_err(db_err)?;
        let updated = sqlx::query(
            "UPDATE orders SET lines_json = ?, discount = ?, delivery_fee = ?, total = ?, \
             state_json = ?, state_label = ?, version = ?, updated_at = ? \
             WHERE id = ? AND version = ?",
        )
        .bind(lines_json)
        .bind(order.discount)
        .bind(order.delivery_fee)
        .bind(order.total)
        .bind(state_json)
        .bind(order.state.label())
        .bind(order.version as i64)
        .bind(order.updated_at.to_rfc3339())
        .bind(order.id.to_string())
        .bind(expected_version as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() > 0 {
            return Ok(CasOutcome::Updated(order));
        }
        match self.get(order.id).await? {
            Some(_) => Ok(CasOutcome::Conflict),
            None => Ok(CasOutcome::Missing),
        }
    }
}

#[async_trait]
impl CouponRepository for SqliteRepo {
    async fn create(&self, coupon: Coupon) -> Result<Coupon, RepoError> {
        sqlx::query(
            "INSERT OR REPLACE INTO coupons (code, discount, min_order_value, starts_at, \
             ends_at, usage_limit, used_count, active) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&coupon.code)
        .bind(coupon.discount)
        .bind(coupon.min_order_value)
        .bind(coupon.starts_at.to_rfc3339())
        .bind(coupon.ends_at.to_rfc3339())
        .bind(coupon.usage_limit as i64)
        .bind(coupon.used_count as i64)
        .bind(coupon.active as i64)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(coupon)
    }

    async fn find(&self, code: &str) -> Result<Option<Coupon>, RepoError> {
        let row: Option<DbCoupon> = sqlx::query_as(
            "SELECT code, discount, min_order_value, starts_at, ends_at, usage_limit, \
             used_count, active FROM coupons WHERE code = ?",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.map(|r| r.into_coupon()).transpose()
    }

    async fn redeem(&self, code: &str, order_id: Uuid) -> Result<RedeemOutcome, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let known: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM coupons WHERE code = ?")
            .bind(code)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_err)?;
        if known.is_none() {
            return Ok(RedeemOutcome::NotFound);
        }

        let inserted =
            sqlx::query("INSERT OR IGNORE INTO coupon_redemptions (code, order_id) VALUES (?, ?)")
                .bind(code)
                .bind(order_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        if inserted.rows_affected() == 0 {
            // replayed redemption for the same order
            tx.commit().await.map_err(db_err)?;
            return Ok(RedeemOutcome::Redeemed);
        }

        let bumped = sqlx::query(
            "UPDATE coupons SET used_count = used_count + 1 \
             WHERE code = ? AND used_count < usage_limit",
        )
        .bind(code)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if bumped.rows_affected() == 0 {
            tx.rollback().await.map_err(db_err)?;
            return Ok(RedeemOutcome::Exhausted);
        }

        tx.commit().await.map_err(db_err)?;
        Ok(RedeemOutcome::Redeemed)
    }

    async fn release(&self, code: &str, order_id: Uuid) -> Result<bool, RepoError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let removed =
            sqlx::query("DELETE FROM coupon_redemptions WHERE code = ? AND order_id = ?")
                .bind(code)
                .bind(order_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        if removed.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE coupons SET used_count = used_count - 1 WHERE code = ? AND used_count > 0")
            .bind(code)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(true)
    }
}

#[async_trait]
impl SlotRepository for SqliteRepo {
    async fn active_reservations(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>, RepoError> {
        let rows: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT starts_at_ms, duration_min FROM slot_reservations \
             WHERE service_id = ? AND active = 1 AND starts_at_ms < ? AND ends_at_ms > ? \
             ORDER BY starts_at_ms",
        )
        .bind(service_id.to_string())
        .bind(to.timestamp_millis())
        .bind(from.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.into_iter()
            .map(|(start_ms, duration_min)| {
                let starts_at = Utc
                    .timestamp_millis_opt(start_ms)
                    .single()
                    .ok_or_else(|| RepoError::DbError(format!("bad timestamp {start_ms}")))?;
                Ok(Slot::new(service_id, starts_at, duration_min))
            })
            .collect()
    }

    async fn reserve(&self, slot: Slot, order_id: Uuid) -> Result<ReserveOutcome, RepoError> {
        // single statement: the overlap check and the insert are atomic
        // because SQLite serializes writers
        let start_ms = slot.starts_at.timestamp_millis();
        let end_ms = slot.ends_at().timestamp_millis();
        let inserted = sqlx::query(
            "INSERT INTO slot_reservations \
                 (service_id, starts_at_ms, ends_at_ms, duration_min, order_id, active) \
             SELECT ?, ?, ?, ?, ?, 1 \
             WHERE NOT EXISTS ( \
                 SELECT 1 FROM slot_reservations \
                 WHERE service_id = ? AND active = 1 AND starts_at_ms < ? AND ends_at_ms > ? \
             )",
        )
        .bind(slot.service_id.to_string())
        .bind(start_ms)
        .bind(end_ms)
        .bind(slot.duration_min)
        .bind(order_id.to_string())
        .bind(slot.service_id.to_string())
        .bind(end_ms)
        .bind(start_ms)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if inserted.rows_affected() > 0 {
            Ok(ReserveOutcome::Reserved)
        } else {
            Ok(ReserveOutcome::Taken)
        }
    }

    async fn release_for_order(&self, order_id: Uuid) -> Result<u32, RepoError> {
        let freed =
            sqlx::query("UPDATE slot_reservations SET active = 0 WHERE order_id = ? AND active = 1")
                .bind(order_id.to_string())
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        Ok(freed.rows_affected() as u32)
    }
}
