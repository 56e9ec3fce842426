//! Reservation storage.
//!
//! Updates are status-guarded compare-and-set operations: the caller names
//! the status it believes the reservation is in, and a concurrent transition
//! makes the update fail with `StaleStatus`. That guard is what resolves
//! commit/release/sweep races to exactly one winner.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use stockyard_core::{CartId, OrderId, ReservationId};
use stockyard_reservations::{Reservation, ReservationError, ReservationStatus};

/// Reservation store abstraction.
///
/// Secondary lookups mirror the persisted shape's indexes: (status,
/// expires_at) for the sweep, (cart_id, status) and (order_id, status) for
/// the batch-release and bulk-confirm paths.
pub trait ReservationStore: Send + Sync {
    /// Persist a new reservation. The id must be fresh.
    fn insert(&self, reservation: Reservation) -> Result<(), ReservationError>;

    /// Fetch one reservation by id.
    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, ReservationError>;

    /// Compare-and-set update: install `updated` only if the stored
    /// reservation is currently in `expected` status. Fails with
    /// `StaleStatus` when a concurrent transition won, `NotFound` when the
    /// id is unknown.
    fn update_from(
        &self,
        expected: ReservationStatus,
        updated: &Reservation,
    ) -> Result<(), ReservationError>;

    /// All still-RESERVED holds whose deadline has passed, oldest first.
    fn expired_as_of(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, ReservationError>;

    /// All RESERVED holds correlated to one cart, oldest first.
    fn reserved_for_cart(&self, cart_id: CartId) -> Result<Vec<Reservation>, ReservationError>;

    /// All RESERVED holds correlated to one order, oldest first.
    fn reserved_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>, ReservationError>;
}

impl<S> ReservationStore for Arc<S>
where
    S: ReservationStore + ?Sized,
{
    fn insert(&self, reservation: Reservation) -> Result<(), ReservationError> {
        (**self).insert(reservation)
    }

    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, ReservationError> {
        (**self).get(id)
    }

    fn update_from(
        &self,
        expected: ReservationStatus,
        updated: &Reservation,
    ) -> Result<(), ReservationError> {
        (**self).update_from(expected, updated)
    }

    fn expired_as_of(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, ReservationError> {
        (**self).expired_as_of(now)
    }

    fn reserved_for_cart(&self, cart_id: CartId) -> Result<Vec<Reservation>, ReservationError> {
        (**self).reserved_for_cart(cart_id)
    }

    fn reserved_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>, ReservationError> {
        (**self).reserved_for_order(order_id)
    }
}

/// In-memory reservation store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    reservations: RwLock<HashMap<ReservationId, Reservation>>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn filtered<F>(&self, predicate: F) -> Result<Vec<Reservation>, ReservationError>
    where
        F: Fn(&Reservation) -> bool,
    {
        let reservations = self
            .reservations
            .read()
            .map_err(|_| ReservationError::storage("reservation store lock poisoned"))?;

        let mut result: Vec<_> = reservations.values().filter(|r| predicate(r)).cloned().collect();
        // Ids are UUIDv7, so this is creation order.
        result.sort_by_key(|r| r.id);
        Ok(result)
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn insert(&self, reservation: Reservation) -> Result<(), ReservationError> {
        let mut reservations = self
            .reservations
            .write()
            .map_err(|_| ReservationError::storage("reservation store lock poisoned"))?;

        if reservations.contains_key(&reservation.id) {
            return Err(ReservationError::storage(format!(
                "duplicate reservation id {}",
                reservation.id
            )));
        }
        reservations.insert(reservation.id, reservation);
        Ok(())
    }

    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, ReservationError> {
        let reservations = self
            .reservations
            .read()
            .map_err(|_| ReservationError::storage("reservation store lock poisoned"))?;
        Ok(reservations.get(&id).cloned())
    }

    fn update_from(
        &self,
        expected: ReservationStatus,
        updated: &Reservation,
    ) -> Result<(), ReservationError> {
        let mut reservations = self
            .reservations
            .write()
            .map_err(|_| ReservationError::storage("reservation store lock poisoned"))?;

        let current = reservations
            .get_mut(&updated.id)
            .ok_or(ReservationError::NotFound)?;

        if current.status != expected {
            return Err(ReservationError::StaleStatus {
                expected,
                found: current.status,
            });
        }

        *current = updated.clone();
        Ok(())
    }

    fn expired_as_of(&self, now: DateTime<Utc>) -> Result<Vec<Reservation>, ReservationError> {
        self.filtered(|r| r.is_expired(now))
    }

    fn reserved_for_cart(&self, cart_id: CartId) -> Result<Vec<Reservation>, ReservationError> {
        self.filtered(|r| {
            r.status == ReservationStatus::Reserved && r.correlation.cart_id == Some(cart_id)
        })
    }

    fn reserved_for_order(&self, order_id: OrderId) -> Result<Vec<Reservation>, ReservationError> {
        self.filtered(|r| {
            r.status == ReservationStatus::Reserved && r.correlation.order_id == Some(order_id)
        })
    }
}
