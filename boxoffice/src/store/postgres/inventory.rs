//! `PostgreSQL` inventory store: tickets, counters and reservation holds.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{begin, with_deadline};
use crate::error::{Result, TicketingError};
use crate::reservation::ReservationTransition;
use crate::store::{DueCursor, InventoryStore, StoreFuture, TransitionOutcome};
use crate::types::{
    Money, Page, PageRequest, Reservation, ReservationId, ReservationStatus, Ticket, TicketFilter,
    TicketId, TicketInventory, quantity_from_db, quantity_to_db,
};

const TICKET_COLUMNS: &str = "id, event_id, ticket_type_id, name, description, price_cents, currency, \
     max_tickets_per_order, is_transferable, is_refundable, sales_start_date, sales_end_date, \
     status, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    event_id: Uuid,
    ticket_type_id: String,
    name: String,
    description: String,
    price_cents: i64,
    currency: String,
    max_tickets_per_order: i32,
    is_transferable: bool,
    is_refundable: bool,
    sales_start_date: Option<DateTime<Utc>>,
    sales_end_date: Option<DateTime<Utc>>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TicketRow> for Ticket {
    type Error = TicketingError;

    fn try_from(row: TicketRow) -> Result<Self> {
        Ok(Self {
            id: TicketId::from_uuid(row.id),
            event_id: row.event_id,
            ticket_type_id: row.ticket_type_id,
            name: row.name,
            description: row.description,
            price: Money::from_db(row.price_cents)?,
            currency: row.currency,
            max_tickets_per_order: quantity_from_db("max_tickets_per_order", row.max_tickets_per_order)?,
            is_transferable: row.is_transferable,
            is_refundable: row.is_refundable,
            sales_start_date: row.sales_start_date,
            sales_end_date: row.sales_end_date,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InventoryRow {
    ticket_id: Uuid,
    total_quantity: i32,
    available_quantity: i32,
    reserved_quantity: i32,
    sold_quantity: i32,
    last_updated: DateTime<Utc>,
}

impl TryFrom<InventoryRow> for TicketInventory {
    type Error = TicketingError;

    fn try_from(row: InventoryRow) -> Result<Self> {
        Ok(Self {
            ticket_id: TicketId::from_uuid(row.ticket_id),
            total_quantity: quantity_from_db("total_quantity", row.total_quantity)?,
            available_quantity: quantity_from_db("available_quantity", row.available_quantity)?,
            reserved_quantity: quantity_from_db("reserved_quantity", row.reserved_quantity)?,
            sold_quantity: quantity_from_db("sold_quantity", row.sold_quantity)?,
            last_updated: row.last_updated,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ReservationRow {
    id: Uuid,
    ticket_id: Uuid,
    user_id: String,
    quantity: i32,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: String,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = TicketingError;

    fn try_from(row: ReservationRow) -> Result<Self> {
        Ok(Self {
            id: ReservationId::from_uuid(row.id),
            ticket_id: TicketId::from_uuid(row.ticket_id),
            user_id: row.user_id,
            quantity: quantity_from_db("quantity", row.quantity)?,
            created_at: row.created_at,
            expires_at: row.expires_at,
            status: ReservationStatus::parse(&row.status)?,
        })
    }
}

/// `PostgreSQL` inventory store.
#[derive(Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
    transaction_timeout: Duration,
}

impl PostgresInventoryStore {
    /// Create a store over `pool` whose transactions time out after
    /// `transaction_timeout`.
    #[must_use]
    pub const fn new(pool: PgPool, transaction_timeout: Duration) -> Self {
        Self {
            pool,
            transaction_timeout,
        }
    }

    async fn insert_ticket(&self, ticket: Ticket, inventory: TicketInventory) -> Result<Ticket> {
        let mut tx = begin(&self.pool, self.transaction_timeout).await?;

        sqlx::query(
            "INSERT INTO tickets (id, event_id, ticket_type_id, name, description, price_cents, currency,
                                  max_tickets_per_order, is_transferable, is_refundable,
                                  sales_start_date, sales_end_date, status, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(ticket.id.as_uuid())
        .bind(ticket.event_id)
        .bind(&ticket.ticket_type_id)
        .bind(&ticket.name)
        .bind(&ticket.description)
        .bind(ticket.price.to_db()?)
        .bind(&ticket.currency)
        .bind(quantity_to_db("max_tickets_per_order", ticket.max_tickets_per_order)?)
        .bind(ticket.is_transferable)
        .bind(ticket.is_refundable)
        .bind(ticket.sales_start_date)
        .bind(ticket.sales_end_date)
        .bind(&ticket.status)
        .bind(ticket.created_at)
        .bind(ticket.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO ticket_inventory (ticket_id, total_quantity, available_quantity,
                                           reserved_quantity, sold_quantity, last_updated)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(inventory.ticket_id.as_uuid())
        .bind(quantity_to_db("total_quantity", inventory.total_quantity)?)
        .bind(quantity_to_db("available_quantity", inventory.available_quantity)?)
        .bind(quantity_to_db("reserved_quantity", inventory.reserved_quantity)?)
        .bind(quantity_to_db("sold_quantity", inventory.sold_quantity)?)
        .bind(inventory.last_updated)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ticket)
    }

    async fn page_of_tickets(&self, filter: TicketFilter, page: PageRequest) -> Result<Page<Ticket>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tickets");
        push_ticket_filter(&mut count, &filter);
        let total_count: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {TICKET_COLUMNS} FROM tickets"));
        push_ticket_filter(&mut select, &filter);
        select
            .push(" ORDER BY created_at DESC, id LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
        let rows: Vec<TicketRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok(Page {
            items: rows.into_iter().map(Ticket::try_from).collect::<Result<_>>()?,
            total_count: u64::try_from(total_count).unwrap_or_default(),
            page: page.page,
            page_size: page.page_size,
        })
    }

    async fn hold_in_tx(&self, reservation: Reservation) -> Result<(Reservation, TicketInventory)> {
        let mut tx = begin(&self.pool, self.transaction_timeout).await?;

        let mut inventory = lock_inventory(&mut tx, reservation.ticket_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("ticket", reservation.ticket_id))?;
        inventory.reserve(reservation.quantity, reservation.created_at)?;
        write_inventory(&mut tx, &inventory).await?;

        sqlx::query(
            "INSERT INTO ticket_reservations (id, ticket_id, user_id, quantity, created_at, expires_at, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.ticket_id.as_uuid())
        .bind(&reservation.user_id)
        .bind(quantity_to_db("quantity", reservation.quantity)?)
        .bind(reservation.created_at)
        .bind(reservation.expires_at)
        .bind(reservation.status.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((reservation, inventory))
    }

    async fn transition_in_tx(
        &self,
        id: ReservationId,
        transition: ReservationTransition,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome> {
        let mut tx = begin(&self.pool, self.transaction_timeout).await?;

        let row: Option<ReservationRow> = sqlx::query_as(
            "SELECT id, ticket_id, user_id, quantity, created_at, expires_at, status
             FROM ticket_reservations
             WHERE id = $1
             FOR UPDATE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?;
        let mut reservation = Reservation::try_from(
            row.ok_or_else(|| TicketingError::not_found("reservation", id))?,
        )?;

        if !transition.plan(&reservation, now)? {
            tx.rollback().await?;
            return Ok(TransitionOutcome::Unchanged(reservation));
        }

        let target = transition.target();
        let flipped = match transition {
            ReservationTransition::Expire => sqlx::query(
                "UPDATE ticket_reservations SET status = $2
                 WHERE id = $1 AND status = 'active' AND expires_at <= $3",
            )
            .bind(id.as_uuid())
            .bind(target.as_str())
            .bind(now),
            ReservationTransition::Confirm => sqlx::query(
                "UPDATE ticket_reservations SET status = $2
                 WHERE id = $1 AND status = 'active' AND expires_at > $3",
            )
            .bind(id.as_uuid())
            .bind(target.as_str())
            .bind(now),
            ReservationTransition::Cancel => sqlx::query(
                "UPDATE ticket_reservations SET status = $2
                 WHERE id = $1 AND status = 'active'",
            )
            .bind(id.as_uuid())
            .bind(target.as_str()),
        }
        .execute(&mut *tx)
        .await?;

        if flipped.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(TransitionOutcome::Unchanged(reservation));
        }

        let mut inventory = lock_inventory(&mut tx, reservation.ticket_id)
            .await?
            .ok_or_else(|| {
                TicketingError::InvariantViolation(format!(
                    "reservation {id} references missing inventory {}",
                    reservation.ticket_id
                ))
            })?;
        transition.apply_to_ledger(&mut inventory, reservation.quantity, now)?;
        write_inventory(&mut tx, &inventory).await?;

        tx.commit().await?;
        reservation.status = target;
        Ok(TransitionOutcome::Applied {
            reservation,
            inventory,
        })
    }
}

fn push_ticket_filter(query: &mut QueryBuilder<'_, Postgres>, filter: &TicketFilter) {
    query.push(" WHERE TRUE");
    if let Some(event_id) = filter.event_id {
        query.push(" AND event_id = ").push_bind(event_id);
    }
    if let Some(status) = &filter.status {
        query.push(" AND status = ").push_bind(status.clone());
    }
}

async fn lock_inventory(conn: &mut PgConnection, ticket_id: TicketId) -> Result<Option<TicketInventory>> {
    let row: Option<InventoryRow> = sqlx::query_as(
        "SELECT ticket_id, total_quantity, available_quantity, reserved_quantity, sold_quantity, last_updated
         FROM ticket_inventory
         WHERE ticket_id = $1
         FOR UPDATE",
    )
    .bind(ticket_id.as_uuid())
    .fetch_optional(conn)
    .await?;
    row.map(TicketInventory::try_from).transpose()
}

async fn write_inventory(conn: &mut PgConnection, inventory: &TicketInventory) -> Result<()> {
    sqlx::query(
        "UPDATE ticket_inventory
         SET available_quantity = $2, reserved_quantity = $3, sold_quantity = $4, last_updated = $5
         WHERE ticket_id = $1",
    )
    .bind(inventory.ticket_id.as_uuid())
    .bind(quantity_to_db("available_quantity", inventory.available_quantity)?)
    .bind(quantity_to_db("reserved_quantity", inventory.reserved_quantity)?)
    .bind(quantity_to_db("sold_quantity", inventory.sold_quantity)?)
    .bind(inventory.last_updated)
    .execute(conn)
    .await?;
    Ok(())
}

impl InventoryStore for PostgresInventoryStore {
    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1").execute(&self.pool).await?;
            Ok(())
        })
    }

    fn create_ticket(&self, ticket: Ticket, inventory: TicketInventory) -> StoreFuture<'_, Ticket> {
        Box::pin(with_deadline(
            self.transaction_timeout,
            "create_ticket",
            self.insert_ticket(ticket, inventory),
        ))
    }

    fn get_ticket(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<Ticket>> {
        Box::pin(async move {
            let row: Option<TicketRow> =
                sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
                    .bind(ticket_id.as_uuid())
                    .fetch_optional(&self.pool)
                    .await?;
            row.map(Ticket::try_from).transpose()
        })
    }

    fn list_tickets(&self, filter: TicketFilter, page: PageRequest) -> StoreFuture<'_, Page<Ticket>> {
        Box::pin(self.page_of_tickets(filter, page))
    }

    fn load_inventory(&self, ticket_id: TicketId) -> StoreFuture<'_, Option<TicketInventory>> {
        Box::pin(async move {
            let row: Option<InventoryRow> = sqlx::query_as(
                "SELECT ticket_id, total_quantity, available_quantity, reserved_quantity, sold_quantity, last_updated
                 FROM ticket_inventory
                 WHERE ticket_id = $1",
            )
            .bind(ticket_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
            row.map(TicketInventory::try_from).transpose()
        })
    }

    fn hold(&self, reservation: Reservation) -> StoreFuture<'_, (Reservation, TicketInventory)> {
        Box::pin(with_deadline(
            self.transaction_timeout,
            "hold",
            self.hold_in_tx(reservation),
        ))
    }

    fn get_reservation(&self, id: ReservationId) -> StoreFuture<'_, Option<Reservation>> {
        Box::pin(async move {
            let row: Option<ReservationRow> = sqlx::query_as(
                "SELECT id, ticket_id, user_id, quantity, created_at, expires_at, status
                 FROM ticket_reservations
                 WHERE id = $1",
            )
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
            row.map(Reservation::try_from).transpose()
        })
    }

    fn due_reservations(
        &self,
        now: DateTime<Utc>,
        after: Option<DueCursor>,
        limit: u32,
    ) -> StoreFuture<'_, Vec<DueCursor>> {
        Box::pin(async move {
            let rows: Vec<(Uuid, DateTime<Utc>)> = sqlx::query_as(
                "SELECT id, expires_at FROM ticket_reservations
                 WHERE status = 'active' AND expires_at <= $1
                   AND ($2::timestamptz IS NULL OR (expires_at, id) > ($2, $3))
                 ORDER BY expires_at, id
                 LIMIT $4",
            )
            .bind(now)
            .bind(after.map(|c| c.expires_at))
            .bind(after.map(|c| *c.id.as_uuid()))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await?;
            Ok(rows
                .into_iter()
                .map(|(id, expires_at)| DueCursor {
                    expires_at,
                    id: ReservationId::from_uuid(id),
                })
                .collect())
        })
    }

    fn transition_reservation(
        &self,
        id: ReservationId,
        transition: ReservationTransition,
        now: DateTime<Utc>,
    ) -> StoreFuture<'_, TransitionOutcome> {
        Box::pin(with_deadline(
            self.transaction_timeout,
            "transition_reservation",
            self.transition_in_tx(id, transition, now),
        ))
    }
}
