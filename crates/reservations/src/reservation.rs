use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::{
    CartId, DomainError, OrderId, ProductId, ReservationId, Sku, UserId, WarehouseId,
};

use crate::error::ReservationError;

/// Reservation lifecycle.
///
/// ```text
///            create (ledger reserve succeeded)
///  [none] ---------------------------------> Reserved
///  Reserved --commit----------------------> Confirmed   (terminal)
///  Reserved --release---------------------> Released    (terminal)
///  Reserved --sweep, past expires_at------> Expired     (terminal)
/// ```
///
/// One canonical enum, serialized lowercase, used on every code path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Reserved,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Reserved)
    }
}

impl core::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Self::Reserved => "reserved",
            Self::Confirmed => "confirmed",
            Self::Released => "released",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// How long a hold stays committable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HoldWindow(i64);

impl HoldWindow {
    /// Checkout default: 15 minutes.
    pub const DEFAULT: Self = Self(15);

    pub fn minutes(minutes: i64) -> Result<Self, DomainError> {
        if minutes <= 0 {
            return Err(DomainError::validation("hold window must be positive"));
        }
        Ok(Self(minutes))
    }

    pub fn as_duration(&self) -> Duration {
        Duration::minutes(self.0)
    }
}

impl Default for HoldWindow {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Optional identifiers tying a hold back to the checkout that made it.
/// Mutually informative; none required.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Correlation {
    pub order_id: Option<OrderId>,
    pub cart_id: Option<CartId>,
    pub user_id: Option<UserId>,
}

impl Correlation {
    pub fn for_cart(cart_id: CartId) -> Self {
        Self {
            cart_id: Some(cart_id),
            ..Self::default()
        }
    }

    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            order_id: Some(order_id),
            ..Self::default()
        }
    }
}

/// One hold attempt: a time-bounded claim on `quantity` units of a product
/// in one warehouse. Exclusively owned by the reservation store; the stock
/// ledger only ever sees the aggregate counter effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    pub sku: Sku,
    pub quantity: u64,
    pub status: ReservationStatus,
    #[serde(flatten)]
    pub correlation: Correlation,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub committed_at: Option<DateTime<Utc>>,
    pub released_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Build a new RESERVED hold. The caller (the reservation service) only
    /// does this after the ledger debit succeeded.
    pub fn new(
        product_id: ProductId,
        warehouse_id: WarehouseId,
        sku: Sku,
        quantity: u64,
        window: HoldWindow,
        correlation: Correlation,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        Ok(Self {
            id: ReservationId::new(),
            product_id,
            warehouse_id,
            sku,
            quantity,
            status: ReservationStatus::Reserved,
            correlation,
            created_at: now,
            expires_at: now + window.as_duration(),
            committed_at: None,
            released_at: None,
        })
    }

    /// A hold past its deadline is logically expired even before the sweeper
    /// visits it. Read-only; no write required.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Reserved && self.expires_at <= now
    }

    /// Still committable: RESERVED and within the hold window.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Reserved && now < self.expires_at
    }

    /// RESERVED -> CONFIRMED. A lapsed hold cannot be committed; the caller
    /// must re-reserve.
    pub fn confirm(&self, now: DateTime<Utc>) -> Result<Self, ReservationError> {
        self.ensure_reserved()?;
        if self.is_expired(now) {
            return Err(ReservationError::Expired);
        }
        let mut next = self.clone();
        next.status = ReservationStatus::Confirmed;
        next.committed_at = Some(now);
        Ok(next)
    }

    /// RESERVED -> RELEASED. Confirmed stock already left the building and
    /// cannot be recalled through this path.
    pub fn release(&self, now: DateTime<Utc>) -> Result<Self, ReservationError> {
        self.ensure_reserved()?;
        let mut next = self.clone();
        next.status = ReservationStatus::Released;
        next.released_at = Some(now);
        Ok(next)
    }

    /// RESERVED -> EXPIRED (sweeper path). Same ledger effect as release,
    /// different terminal label for audit.
    pub fn expire(&self, now: DateTime<Utc>) -> Result<Self, ReservationError> {
        self.ensure_reserved()?;
        let mut next = self.clone();
        next.status = ReservationStatus::Expired;
        next.released_at = Some(now);
        Ok(next)
    }

    fn ensure_reserved(&self) -> Result<(), ReservationError> {
        if self.status != ReservationStatus::Reserved {
            return Err(ReservationError::InvalidState {
                current: self.status,
            });
        }
        Ok(())
    }
}
