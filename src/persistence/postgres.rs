use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;

use crate::config::DatabaseConfig;
use crate::domain::order::{Delivery, Item, Order, Payment};
use super::repository::{OrderRepository, StoreError};

// ============================================================================
// PostgreSQL Order Repository
// ============================================================================
//
// Tables: orders, deliveries, payments (keyed by order_uid) and items
// (keyed by order_uid + chrt_id, ordered by line_no).
//
// The orders row decides: if its `ON CONFLICT DO NOTHING` insert is a no-op,
// the order is already stored and nothing else is written, so a re-submitted
// aggregate (even with different items) leaves the first write untouched.
// All four tables are written in one transaction; dropping the transaction on
// error rolls it back, so no row of an order is ever visible without its
// siblings.
//
// ============================================================================

const SELECT_ORDER_COLUMNS: &str = r#"
    SELECT o.order_uid, o.track_number, o.entry, o.locale, o.internal_signature,
           o.customer_id, o.delivery_service, o.shardkey, o.sm_id, o.date_created, o.oof_shard,
           d.name AS delivery_name, d.phone, d.zip, d.city, d.address, d.region, d.email,
           p.transaction, p.request_id, p.currency, p.provider, p.amount, p.payment_dt,
           p.bank, p.delivery_cost, p.goods_total, p.custom_fee
    FROM orders o
    JOIN deliveries d ON d.order_uid = o.order_uid
    JOIN payments p ON p.order_uid = o.order_uid
"#;

#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool sized from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(config.connect_options())
            .await?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: &PgRow) -> Result<Order, sqlx::Error> {
        Ok(Order {
            order_uid: row.try_get("order_uid")?,
            track_number: row.try_get("track_number")?,
            entry: row.try_get("entry")?,
            locale: row.try_get("locale")?,
            internal_signature: row.try_get("internal_signature")?,
            customer_id: row.try_get("customer_id")?,
            delivery_service: row.try_get("delivery_service")?,
            shardkey: row.try_get("shardkey")?,
            sm_id: row.try_get("sm_id")?,
            date_created: row.try_get("date_created")?,
            oof_shard: row.try_get("oof_shard")?,
            delivery: Delivery {
                name: row.try_get("delivery_name")?,
                phone: row.try_get("phone")?,
                zip: row.try_get("zip")?,
                city: row.try_get("city")?,
                address: row.try_get("address")?,
                region: row.try_get("region")?,
                email: row.try_get("email")?,
            },
            payment: Payment {
                transaction: row.try_get("transaction")?,
                request_id: row.try_get("request_id")?,
                currency: row.try_get("currency")?,
                provider: row.try_get("provider")?,
                amount: row.try_get("amount")?,
                payment_dt: row.try_get("payment_dt")?,
                bank: row.try_get("bank")?,
                delivery_cost: row.try_get("delivery_cost")?,
                goods_total: row.try_get("goods_total")?,
                custom_fee: row.try_get("custom_fee")?,
            },
            items: Vec::new(),
        })
    }

    fn row_to_item(row: &PgRow) -> Result<Item, sqlx::Error> {
        Ok(Item {
            chrt_id: row.try_get("chrt_id")?,
            track_number: row.try_get("track_number")?,
            price: row.try_get("price")?,
            rid: row.try_get("rid")?,
            name: row.try_get("name")?,
            sale: row.try_get("sale")?,
            size: row.try_get("size")?,
            total_price: row.try_get("total_price")?,
            nm_id: row.try_get("nm_id")?,
            brand: row.try_get("brand")?,
            status: row.try_get("status")?,
        })
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn save(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO NOTHING
            "#,
        )
        .bind(&order.order_uid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shardkey)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await?;
            tracing::debug!(order_uid = %order.order_uid, "Order already stored, save was a no-op");
            return Ok(());
        }

        let delivery = &order.delivery;
        sqlx::query(
            r#"
            INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_uid) DO NOTHING
            "#,
        )
        .bind(&order.order_uid)
        .bind(&delivery.name)
        .bind(&delivery.phone)
        .bind(&delivery.zip)
        .bind(&delivery.city)
        .bind(&delivery.address)
        .bind(&delivery.region)
        .bind(&delivery.email)
        .execute(&mut *tx)
        .await?;

        let payment = &order.payment;
        sqlx::query(
            r#"
            INSERT INTO payments (
                order_uid, transaction, request_id, currency, provider, amount,
                payment_dt, bank, delivery_cost, goods_total, custom_fee
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO NOTHING
            "#,
        )
        .bind(&order.order_uid)
        .bind(&payment.transaction)
        .bind(&payment.request_id)
        .bind(&payment.currency)
        .bind(&payment.provider)
        .bind(payment.amount)
        .bind(payment.payment_dt)
        .bind(&payment.bank)
        .bind(payment.delivery_cost)
        .bind(payment.goods_total)
        .bind(payment.custom_fee)
        .execute(&mut *tx)
        .await?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO items (
                    order_uid, line_no, chrt_id, track_number, price, rid, name,
                    sale, size, total_price, nm_id, brand, status
                ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                ON CONFLICT (order_uid, chrt_id) DO NOTHING
                "#,
            )
            .bind(&order.order_uid)
            .bind(line_no as i32)
            .bind(item.chrt_id)
            .bind(&item.track_number)
            .bind(item.price)
            .bind(&item.rid)
            .bind(&item.name)
            .bind(item.sale)
            .bind(&item.size)
            .bind(item.total_price)
            .bind(item.nm_id)
            .bind(&item.brand)
            .bind(item.status)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            order_uid = %order.order_uid,
            item_count = order.items.len(),
            "Order stored"
        );

        Ok(())
    }

    async fn get(&self, order_uid: &str) -> Result<Order, StoreError> {
        let sql = format!("{SELECT_ORDER_COLUMNS} WHERE o.order_uid = $1");

        let row = sqlx::query(&sql)
            .bind(order_uid)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(order_uid.to_string()))?;

        let mut order = Self::row_to_order(&row)?;
        order.items = self.get_items(order_uid).await?;

        Ok(order)
    }

    async fn get_items(&self, order_uid: &str) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status
            FROM items
            WHERE order_uid = $1
            ORDER BY line_no ASC
            "#,
        )
        .bind(order_uid)
        .fetch_all(&self.pool)
        .await?;

        let items = rows
            .iter()
            .map(Self::row_to_item)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(items)
    }

    async fn get_all(&self) -> Result<Vec<Order>, StoreError> {
        // Oldest first: when warming a cache smaller than the table, the
        // newest orders are inserted last and survive eviction.
        let sql = format!("{SELECT_ORDER_COLUMNS} ORDER BY o.date_created ASC");

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(orders)
    }
}
