//! `PostgreSQL` order store: order headers, line items and payments.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{begin, with_deadline};
use crate::error::{Result, TicketingError};
use crate::orders::{StatusPlan, append_note, audit_line, plan_status_change};
use crate::settlement::NewPayment;
use crate::store::{OrderStore, StoreFuture};
use crate::types::{
    BillingInfo, Money, Order, OrderFilter, OrderId, OrderItem, OrderStatus, Page, PageRequest,
    Payment, StatusChange, TicketId, quantity_from_db, quantity_to_db,
};

const ORDER_COLUMNS: &str = "id, order_number, customer_id, subtotal, discount_amount, tax_amount, \
     fee_amount, total_amount, currency, status, billing, notes, order_date, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, ticket_id, quantity, unit_price, subtotal, discount_amount, \
     tax_amount, fee_amount, total_amount, status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    order_number: String,
    customer_id: String,
    subtotal: i64,
    discount_amount: i64,
    tax_amount: i64,
    fee_amount: i64,
    total_amount: i64,
    currency: String,
    status: String,
    billing: Option<Json<BillingInfo>>,
    notes: Option<String>,
    order_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(self.id),
            order_number: self.order_number,
            customer_id: self.customer_id,
            items,
            subtotal: Money::from_db(self.subtotal)?,
            discount_amount: Money::from_db(self.discount_amount)?,
            tax_amount: Money::from_db(self.tax_amount)?,
            fee_amount: Money::from_db(self.fee_amount)?,
            total_amount: Money::from_db(self.total_amount)?,
            currency: self.currency,
            status: OrderStatus::parse(&self.status)
                .map_err(|e| TicketingError::InvariantViolation(e.to_string()))?,
            billing: self.billing.map(|Json(billing)| billing),
            notes: self.notes,
            order_date: self.order_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    order_id: Uuid,
    ticket_id: Uuid,
    quantity: i32,
    unit_price: i64,
    subtotal: i64,
    discount_amount: i64,
    tax_amount: i64,
    fee_amount: i64,
    total_amount: i64,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for OrderItem {
    type Error = TicketingError;

    fn try_from(row: ItemRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            ticket_id: TicketId::from_uuid(row.ticket_id),
            quantity: quantity_from_db("quantity", row.quantity)?,
            unit_price: Money::from_db(row.unit_price)?,
            subtotal: Money::from_db(row.subtotal)?,
            discount_amount: Money::from_db(row.discount_amount)?,
            tax_amount: Money::from_db(row.tax_amount)?,
            fee_amount: Money::from_db(row.fee_amount)?,
            total_amount: Money::from_db(row.total_amount)?,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// `PostgreSQL` order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
    transaction_timeout: Duration,
}

impl PostgresOrderStore {
    /// Create a store over `pool` whose transactions time out after
    /// `transaction_timeout`.
    #[must_use]
    pub const fn new(pool: PgPool, transaction_timeout: Duration) -> Self {
        Self {
            pool,
            transaction_timeout,
        }
    }

    async fn insert_in_tx(&self, order: &Order) -> Result<()> {
        let mut tx = begin(&self.pool, self.transaction_timeout).await?;

        sqlx::query(&format!(
            "INSERT INTO orders ({ORDER_COLUMNS})
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
        ))
        .bind(order.id.as_uuid())
        .bind(&order.order_number)
        .bind(&order.customer_id)
        .bind(order.subtotal.to_db()?)
        .bind(order.discount_amount.to_db()?)
        .bind(order.tax_amount.to_db()?)
        .bind(order.fee_amount.to_db()?)
        .bind(order.total_amount.to_db()?)
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(order.billing.clone().map(Json))
        .bind(&order.notes)
        .bind(order.order_date)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (order_id, ticket_id, quantity, unit_price, subtotal,
                                          discount_amount, tax_amount, fee_amount, total_amount,
                                          status, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(order.id.as_uuid())
            .bind(item.ticket_id.as_uuid())
            .bind(quantity_to_db("quantity", item.quantity)?)
            .bind(item.unit_price.to_db()?)
            .bind(item.subtotal.to_db()?)
            .bind(item.discount_amount.to_db()?)
            .bind(item.tax_amount.to_db()?)
            .bind(item.fee_amount.to_db()?)
            .bind(item.total_amount.to_db()?)
            .bind(&item.status)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn insert_and_reload(&self, order: Order) -> Result<Order> {
        with_deadline(self.transaction_timeout, "insert_order", self.insert_in_tx(&order)).await?;
        self.load(order.id)
            .await?
            .ok_or_else(|| TicketingError::Storage(format!("order {} missing after insert", order.id)))
    }

    async fn load(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<OrderRow> =
            sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
                .bind(order_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let mut items = load_items(&self.pool, &[row.id]).await?;
        let items = items.remove(&row.id).unwrap_or_default();
        row.into_order(items).map(Some)
    }

    async fn page_of_orders(&self, filter: OrderFilter, page: PageRequest) -> Result<Page<Order>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_order_filter(&mut count, &filter);
        let total_count: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_order_filter(&mut select, &filter);
        select
            .push(" ORDER BY order_date DESC, order_number DESC LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        let rows: Vec<OrderRow> = select.build_query_as().fetch_all(&self.pool).await?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let mut items = load_items(&self.pool, &ids).await?;
        let orders = rows
            .into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_order(order_items)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Page {
            items: orders,
            total_count: u64::try_from(total_count).unwrap_or_default(),
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn update_status_in_tx(&self, order_id: OrderId, change: &StatusChange) -> Result<()> {
        let mut tx = begin(&self.pool, self.transaction_timeout).await?;

        let current = lock_order(&mut tx, order_id).await?;
        let plan = plan_status_change(current.status, change.status)?;
        let notes = append_note(current.notes.as_deref(), &audit_line(current.status, plan, change));
        let status = match plan {
            StatusPlan::Apply { .. } => change.status,
            StatusPlan::Unchanged => current.status,
        };

        sqlx::query("UPDATE orders SET status = $2, notes = $3, updated_at = $4 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(status.as_str())
            .bind(notes)
            .bind(change.at)
            .execute(&mut *tx)
            .await?;

        if matches!(plan, StatusPlan::Apply { .. }) && status == OrderStatus::Cancelled {
            sqlx::query("UPDATE order_items SET status = 'cancelled', updated_at = $2 WHERE order_id = $1")
                .bind(order_id.as_uuid())
                .bind(change.at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update_and_reload(&self, order_id: OrderId, change: StatusChange) -> Result<Order> {
        with_deadline(
            self.transaction_timeout,
            "update_status",
            self.update_status_in_tx(order_id, &change),
        )
        .await?;
        self.load(order_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("order", order_id))
    }

    async fn payment_in_tx(&self, order_id: OrderId, payment: &NewPayment) -> Result<Payment> {
        let mut tx = begin(&self.pool, self.transaction_timeout).await?;

        let current = lock_order(&mut tx, order_id).await?;
        let recorded = payment.settle(&current)?;

        sqlx::query(
            "INSERT INTO payments (id, order_id, transaction_id, amount, currency, method, reference, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(recorded.id.as_uuid())
        .bind(recorded.order_id.as_uuid())
        .bind(&recorded.transaction_id)
        .bind(recorded.amount.to_db()?)
        .bind(&recorded.currency)
        .bind(&recorded.method)
        .bind(&recorded.reference)
        .bind(&recorded.status)
        .bind(recorded.created_at)
        .execute(&mut *tx)
        .await?;

        let change = StatusChange {
            status: OrderStatus::Paid,
            reason: Some(format!("payment {}", recorded.transaction_id)),
            at: payment.at,
        };
        let plan = plan_status_change(current.status, OrderStatus::Paid)?;
        let notes = append_note(current.notes.as_deref(), &audit_line(current.status, plan, &change));

        sqlx::query(
            "UPDATE orders SET status = 'paid', notes = $2, updated_at = $3
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(order_id.as_uuid())
        .bind(notes)
        .bind(payment.at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(recorded)
    }

    async fn pay_and_reload(&self, order_id: OrderId, payment: NewPayment) -> Result<(Payment, Order)> {
        let recorded = with_deadline(
            self.transaction_timeout,
            "record_payment",
            self.payment_in_tx(order_id, &payment),
        )
        .await?;
        let order = self
            .load(order_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("order", order_id))?;
        Ok((recorded, order))
    }
}

fn push_order_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    query
        .push(" WHERE customer_id = ")
        .push_bind(filter.customer_id.clone());
    if let Some(status) = filter.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(from) = filter.from {
        query.push(" AND order_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND order_date <= ").push_bind(to);
    }
}

/// Lock the order header; items are not needed for status decisions.
async fn lock_order(conn: &mut PgConnection, order_id: OrderId) -> Result<Order> {
    let row: Option<OrderRow> = sqlx::query_as(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"
    ))
    .bind(order_id.as_uuid())
    .fetch_optional(conn)
    .await?;
    row.ok_or_else(|| TicketingError::not_found("order", order_id))?
        .into_order(Vec::new())
}

async fn load_items(pool: &PgPool, order_ids: &[Uuid]) -> Result<HashMap<Uuid, Vec<OrderItem>>> {
    if order_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<ItemRow> = sqlx::query_as(&format!(
        "SELECT {ITEM_COLUMNS} FROM order_items WHERE order_id = ANY($1) ORDER BY id"
    ))
    .bind(order_ids)
    .fetch_all(pool)
    .await?;

    let mut items: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for row in rows {
        let order_id = row.order_id;
        items.entry(order_id).or_default().push(OrderItem::try_from(row)?);
    }
    Ok(items)
}

impl OrderStore for PostgresOrderStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }

    fn insert_order(&self, order: Order) -> StoreFuture<'_, Order> {
        Box::pin(self.insert_and_reload(order))
    }

    fn get_order(&self, order_id: OrderId) -> StoreFuture<'_, Option<Order>> {
        Box::pin(self.load(order_id))
    }

    fn list_orders(&self, filter: OrderFilter, page: PageRequest) -> StoreFuture<'_, Page<Order>> {
        Box::pin(self.page_of_orders(filter, page))
    }

    fn update_status(&self, order_id: OrderId, change: StatusChange) -> StoreFuture<'_, Order> {
        Box::pin(self.update_and_reload(order_id, change))
    }

    fn record_payment(&self, order_id: OrderId, payment: NewPayment) -> StoreFuture<'_, (Payment, Order)> {
        Box::pin(self.pay_and_reload(order_id, payment))
    }
}
