//! Domain types for the box office.
//!
//! Value objects (identifiers, money), the inventory ledger row, reservation
//! holds, orders with their line items, and payment records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::TicketingError;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a ticket type
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TicketId {
    type Err = TicketingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_uuid("ticket_id", s).map(Self)
    }
}

/// Unique identifier for a reservation hold
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(Uuid);

impl ReservationId {
    /// Creates a new random `ReservationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ReservationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReservationId {
    type Err = TicketingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_uuid("reservation_id", s).map(Self)
    }
}

/// Unique identifier for an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random `OrderId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `OrderId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OrderId {
    type Err = TicketingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_uuid("order_id", s).map(Self)
    }
}

/// Unique identifier for a recorded payment
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    /// Creates a new random `PaymentId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `PaymentId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn parse_uuid(field: &str, s: &str) -> Result<Uuid, TicketingError> {
    if s.trim().is_empty() {
        return Err(TicketingError::InvalidArgument(format!("{field} is required")));
    }
    Uuid::parse_str(s.trim())
        .map_err(|_| TicketingError::InvalidArgument(format!("{field} '{s}' is not a valid UUID")))
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount in dollars (rounded down)
    #[must_use]
    pub const fn dollars(&self) -> u64 {
        self.0 / 100
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Converts a stored BIGINT cents column into `Money`.
    ///
    /// # Errors
    ///
    /// Returns `InvariantViolation` if the stored amount is negative.
    pub fn from_db(cents: i64) -> Result<Self, TicketingError> {
        u64::try_from(cents)
            .map(Self)
            .map_err(|_| TicketingError::InvariantViolation(format!("negative amount {cents} in storage")))
    }

    /// Converts the amount into a BIGINT cents column value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the amount does not fit in an `i64`.
    pub fn to_db(self) -> Result<i64, TicketingError> {
        i64::try_from(self.0)
            .map_err(|_| TicketingError::InvalidArgument(format!("amount {self} is too large")))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.dollars(), self.0 % 100)
    }
}

/// Normalizes and validates an ISO-4217 style currency code.
///
/// # Errors
///
/// Returns `InvalidArgument` unless the code is three ASCII letters.
pub fn normalize_currency(code: &str) -> Result<String, TicketingError> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(TicketingError::InvalidArgument(format!(
            "currency '{code}' must be a three-letter code"
        )))
    }
}

// ============================================================================
// Quantities
// ============================================================================

/// Converts a stored INTEGER counter into a `u32`.
///
/// # Errors
///
/// Returns `InvariantViolation` for negative values.
pub fn quantity_from_db(field: &str, value: i32) -> Result<u32, TicketingError> {
    u32::try_from(value).map_err(|_| {
        TicketingError::InvariantViolation(format!("{field} is negative ({value}) in storage"))
    })
}

/// Converts a `u32` quantity into an INTEGER column value.
///
/// # Errors
///
/// Returns `InvalidArgument` if the quantity exceeds `i32::MAX`.
pub fn quantity_to_db(field: &str, value: u32) -> Result<i32, TicketingError> {
    i32::try_from(value)
        .map_err(|_| TicketingError::InvalidArgument(format!("{field} {value} is too large")))
}

// ============================================================================
// Ticket catalog
// ============================================================================

/// A ticket type: a category of admission with its own price and inventory pool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket type identifier (also the inventory key)
    pub id: TicketId,
    /// Event this ticket type admits to
    pub event_id: Uuid,
    /// External ticket type reference
    pub ticket_type_id: String,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
    /// Unit price
    pub price: Money,
    /// Currency code
    pub currency: String,
    /// Per-order cap (0 = unlimited)
    pub max_tickets_per_order: u32,
    /// Whether tickets may be transferred
    pub is_transferable: bool,
    /// Whether tickets may be refunded
    pub is_refundable: bool,
    /// Sales window start
    pub sales_start_date: Option<DateTime<Utc>>,
    /// Sales window end
    pub sales_end_date: Option<DateTime<Utc>>,
    /// Catalog status (`active`, ...)
    pub status: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Filter shared by the ticket page query and its count query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TicketFilter {
    /// Optional event restriction
    pub event_id: Option<Uuid>,
    /// Optional catalog status restriction
    pub status: Option<String>,
}

impl TicketFilter {
    /// Whether a ticket satisfies the filter
    #[must_use]
    pub fn matches(&self, ticket: &Ticket) -> bool {
        self.event_id.is_none_or(|event_id| ticket.event_id == event_id)
            && self.status.as_deref().is_none_or(|status| ticket.status == status)
    }
}

/// Authoritative unit price for a ticket type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Price per ticket
    pub unit_price: Money,
    /// Currency code
    pub currency: String,
}

// ============================================================================
// Inventory ledger row
// ============================================================================

/// Per-ticket-type capacity counters.
///
/// Invariant: `total_quantity = available_quantity + reserved_quantity + sold_quantity`.
/// Mutated only through the ledger operations in [`crate::ledger`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketInventory {
    /// Ticket type this row counts
    pub ticket_id: TicketId,
    /// Total capacity
    pub total_quantity: u32,
    /// Free to hold
    pub available_quantity: u32,
    /// Held by active reservations
    pub reserved_quantity: u32,
    /// Settled
    pub sold_quantity: u32,
    /// Last mutation time
    pub last_updated: DateTime<Utc>,
}

impl TicketInventory {
    /// Creates a fresh inventory row with everything available
    #[must_use]
    pub const fn new(ticket_id: TicketId, total_quantity: u32, now: DateTime<Utc>) -> Self {
        Self {
            ticket_id,
            total_quantity,
            available_quantity: total_quantity,
            reserved_quantity: 0,
            sold_quantity: 0,
            last_updated: now,
        }
    }
}

// ============================================================================
// Reservations
// ============================================================================

/// Reservation status.
///
/// `Active` is the only non-terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    /// Holding inventory
    Active,
    /// Settled; quantity moved reserved → sold
    Confirmed,
    /// Hold window elapsed; quantity returned to available
    Expired,
    /// Released on request; quantity returned to available
    Cancelled,
}

impl ReservationStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Confirmed => "confirmed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse status from database string.
    ///
    /// # Errors
    ///
    /// Returns error if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, TicketingError> {
        match s {
            "active" => Ok(Self::Active),
            "confirmed" => Ok(Self::Confirmed),
            "expired" => Ok(Self::Expired),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(TicketingError::InvariantViolation(format!(
                "unknown reservation status '{s}'"
            ))),
        }
    }

    /// Whether no further transitions are possible
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time-bounded hold on ticket-type inventory.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identifier
    pub id: ReservationId,
    /// Ticket type held
    pub ticket_id: TicketId,
    /// Holder
    pub user_id: String,
    /// Quantity held
    pub quantity: u32,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// End of the hold window
    pub expires_at: DateTime<Utc>,
    /// Current status
    pub status: ReservationStatus,
}

impl Reservation {
    /// Creates a new active reservation
    #[must_use]
    pub const fn new(
        id: ReservationId,
        ticket_id: TicketId,
        user_id: String,
        quantity: u32,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            ticket_id,
            user_id,
            quantity,
            created_at,
            expires_at,
            status: ReservationStatus::Active,
        }
    }

    /// Whether the hold window has elapsed at `now`
    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

// ============================================================================
// Orders
// ============================================================================

/// Order status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created, awaiting settlement
    Pending,
    /// Settlement recorded
    Paid,
    /// Cancelled
    Cancelled,
}

impl OrderStatus {
    /// Convert status to database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse status from its string form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, TicketingError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(TicketingError::InvalidArgument(format!(
                "unknown order status '{other}'"
            ))),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Billing snapshot captured with the order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingInfo {
    /// Full name
    pub name: Option<String>,
    /// Email address
    pub email: Option<String>,
    /// Street address
    pub address: Option<String>,
    /// City
    pub city: Option<String>,
    /// State/Province
    pub state: Option<String>,
    /// Country code
    pub country: Option<String>,
    /// Postal code
    pub postal_code: Option<String>,
    /// Phone number
    pub phone: Option<String>,
}

/// A priced line of an order.
///
/// `unit_price` is the snapshot taken at order time and never changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Storage-assigned identifier (0 until persisted)
    pub id: i64,
    /// Ticket type ordered
    pub ticket_id: TicketId,
    /// Quantity
    pub quantity: u32,
    /// Unit price snapshot
    pub unit_price: Money,
    /// `quantity * unit_price`
    pub subtotal: Money,
    /// Discount applied to the line
    pub discount_amount: Money,
    /// Tax applied to the line
    pub tax_amount: Money,
    /// Fees applied to the line
    pub fee_amount: Money,
    /// Line total
    pub total_amount: Money,
    /// Line status (`active`, `cancelled`)
    pub status: String,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// An order header with its line items.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order identifier
    pub id: OrderId,
    /// Human-facing order number
    pub order_number: String,
    /// Customer placing the order
    pub customer_id: String,
    /// Line items
    pub items: Vec<OrderItem>,
    /// Sum of line subtotals
    pub subtotal: Money,
    /// Discount amount
    pub discount_amount: Money,
    /// Tax amount
    pub tax_amount: Money,
    /// Fee amount
    pub fee_amount: Money,
    /// Amount due
    pub total_amount: Money,
    /// Currency code
    pub currency: String,
    /// Current status
    pub status: OrderStatus,
    /// Billing snapshot
    pub billing: Option<BillingInfo>,
    /// Free text notes and status audit trail
    pub notes: Option<String>,
    /// When the order was placed
    pub order_date: DateTime<Utc>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

/// Requested status change with its audit note.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusChange {
    /// Target status
    pub status: OrderStatus,
    /// Caller-supplied reason recorded in the audit line
    pub reason: Option<String>,
    /// When the change is made
    pub at: DateTime<Utc>,
}

/// Filter shared by the order page query and its count query.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Customer whose orders are listed
    pub customer_id: String,
    /// Optional status restriction
    pub status: Option<OrderStatus>,
    /// Inclusive lower bound on `order_date`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `order_date`
    pub to: Option<DateTime<Utc>>,
}

impl OrderFilter {
    /// Whether an order satisfies the filter
    #[must_use]
    pub fn matches(&self, order: &Order) -> bool {
        order.customer_id == self.customer_id
            && self.status.is_none_or(|status| order.status == status)
            && self.from.is_none_or(|from| order.order_date >= from)
            && self.to.is_none_or(|to| order.order_date <= to)
    }
}

/// One-based page request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    /// Page number (starts at 1)
    pub page: u32,
    /// Rows per page
    pub page_size: u32,
}

impl PageRequest {
    /// Builds a page request from optional caller values.
    ///
    /// A missing or zero `page` means the first page; a missing or zero
    /// `page_size` means `default_size`; sizes above `max_size` are capped.
    #[must_use]
    pub fn resolve(page: Option<u32>, page_size: Option<u32>, default_size: u32, max_size: u32) -> Self {
        let page = page.filter(|p| *p > 0).unwrap_or(1);
        let page_size = page_size
            .filter(|s| *s > 0)
            .unwrap_or(default_size)
            .min(max_size.max(1));
        Self { page, page_size }
    }

    /// Rows to skip
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page.saturating_sub(1) as u64) * self.page_size as u64
    }
}

/// A page of results plus the total row count for the same filter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    /// Rows on this page
    pub items: Vec<T>,
    /// Rows matching the filter across all pages
    pub total_count: u64,
    /// Page number
    pub page: u32,
    /// Page size
    pub page_size: u32,
}

// ============================================================================
// Payments
// ============================================================================

/// Payment details supplied by the caller.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    /// Payment method (e.g. `card`)
    pub method: String,
    /// Caller-side reference, if any
    #[serde(default)]
    pub reference: Option<String>,
}

/// A recorded settlement fact.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment identifier
    pub id: PaymentId,
    /// Settled order
    pub order_id: OrderId,
    /// Transaction identifier returned to the caller
    pub transaction_id: String,
    /// Amount equal to the order total at call time
    pub amount: Money,
    /// Currency code
    pub currency: String,
    /// Method
    pub method: String,
    /// Caller reference
    pub reference: Option<String>,
    /// Always `completed` for recorded payments
    pub status: String,
    /// Recording time
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_money_display_and_arithmetic() {
        let ten = Money::from_cents(1000);
        let five = Money::from_cents(500);
        let total = ten.checked_multiply(2).unwrap().checked_add(five).unwrap();
        assert_eq!(total, Money::from_cents(2500));
        assert_eq!(total.to_string(), "$25.00");
        assert_eq!(Money::from_cents(1999).to_string(), "$19.99");
        assert!(Money::from_cents(u64::MAX).checked_multiply(2).is_none());
    }

    #[test]
    fn test_money_db_round_trip_rejects_negative() {
        assert!(Money::from_db(-1).is_err());
        assert_eq!(Money::from_db(250).unwrap(), Money::from_cents(250));
        assert!(Money::from_cents(u64::MAX).to_db().is_err());
    }

    #[test]
    fn test_parse_ids() {
        let id = TicketId::new();
        assert_eq!(id.to_string().parse::<TicketId>().unwrap(), id);
        assert!("not-a-uuid".parse::<OrderId>().is_err());
        assert!("".parse::<ReservationId>().is_err());
    }

    #[test]
    fn test_currency_normalization() {
        assert_eq!(normalize_currency("usd").unwrap(), "USD");
        assert!(normalize_currency("US").is_err());
        assert!(normalize_currency("U$D").is_err());
    }

    #[test]
    fn test_reservation_status_strings() {
        for status in [
            ReservationStatus::Active,
            ReservationStatus::Confirmed,
            ReservationStatus::Expired,
            ReservationStatus::Cancelled,
        ] {
            assert_eq!(ReservationStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(!ReservationStatus::Active.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }

    #[test]
    fn test_order_status_parse_accepts_spelling_variants() {
        assert_eq!(OrderStatus::parse("Canceled").unwrap(), OrderStatus::Cancelled);
        assert_eq!(OrderStatus::parse("paid").unwrap(), OrderStatus::Paid);
        assert!(OrderStatus::parse("refunded").is_err());
    }

    #[test]
    fn test_page_offset() {
        assert_eq!(PageRequest::resolve(None, None, 10, 100), PageRequest { page: 1, page_size: 10 });
        assert_eq!(PageRequest::resolve(Some(0), Some(500), 10, 100).page_size, 100);
        assert_eq!(PageRequest { page: 1, page_size: 10 }.offset(), 0);
        assert_eq!(PageRequest { page: 3, page_size: 25 }.offset(), 50);
    }
}
