//! Reservation lifecycle orchestration.
//!
//! `ReservationService` is the only component that touches both the stock
//! ledger and the reservation records. The ledger stays a pure counter
//! machine; the service drives the hold state machine on top of it.
//!
//! Transition ordering: a commit/release/expire first claims the reservation
//! row with a status-guarded update, then applies the ledger effect. Claiming
//! first means a concurrent competing transition loses at the guard and never
//! touches the ledger, so a hold's counters move exactly once. A ledger
//! failure after a successful claim can only be a defect-class invariant
//! violation; it is logged at error severity and surfaced, never papered
//! over.

use chrono::Utc;
use tracing::{debug, error, info, warn};

use stockyard_core::{CartId, OrderId, ProductId, ReservationId, Sku, WarehouseId};
use stockyard_reservations::{
    Correlation, HoldWindow, Reservation, ReservationError, ReservationStatus,
};

use crate::ledger_store::LedgerStore;
use crate::reservation_store::ReservationStore;

/// Orchestrates holds across the ledger store and the reservation store.
pub struct ReservationService<L, R> {
    ledger: L,
    reservations: R,
}

impl<L, R> ReservationService<L, R>
where
    L: LedgerStore,
    R: ReservationStore,
{
    pub fn new(ledger: L, reservations: R) -> Self {
        Self {
            ledger,
            reservations,
        }
    }

    /// The warehouse-selection and stock read paths, for the checkout
    /// orchestrator.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn reservations(&self) -> &R {
        &self.reservations
    }

    /// Place a hold: debit the ledger, then persist the RESERVED row.
    ///
    /// If the ledger debit fails (typically `NotEnoughStock`) no reservation
    /// record is created -- there is no partial state for the caller to
    /// clean up.
    pub fn create_reservation(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        sku: Sku,
        quantity: u64,
        window: HoldWindow,
        correlation: Correlation,
    ) -> Result<Reservation, ReservationError> {
        let now = Utc::now();
        let reservation = Reservation::new(
            product_id,
            warehouse_id,
            sku,
            quantity,
            window,
            correlation,
            now,
        )?;

        self.ledger.reserve_stock(product_id, warehouse_id, quantity)?;

        if let Err(err) = self.reservations.insert(reservation.clone()) {
            // The debit already happened; hand the units back before failing.
            if let Err(undo) = self
                .ledger
                .release_reservation(product_id, warehouse_id, quantity)
            {
                error!(
                    reservation_id = %reservation.id,
                    error = %undo,
                    "failed to return stock after reservation insert failure"
                );
            }
            return Err(err);
        }

        info!(
            reservation_id = %reservation.id,
            %product_id,
            %warehouse_id,
            quantity,
            expires_at = %reservation.expires_at,
            "reservation created"
        );
        Ok(reservation)
    }

    /// Convert a hold into a confirmed, physical stock reduction.
    ///
    /// Stale holds (past `expires_at`) are rejected with `Expired` and left
    /// for the sweeper; the caller must re-reserve.
    pub fn commit_reservation(&self, id: ReservationId) -> Result<Reservation, ReservationError> {
        let now = Utc::now();
        let reservation = self.load(id)?;

        if reservation.is_expired(now) {
            return Err(ReservationError::Expired);
        }
        let confirmed = reservation.confirm(now)?;

        self.claim(&confirmed)?;
        self.apply_ledger_commit(&confirmed)?;

        info!(reservation_id = %id, quantity = confirmed.quantity, "reservation committed");
        Ok(confirmed)
    }

    /// Hand a hold's units back to available stock.
    ///
    /// A CONFIRMED reservation cannot be released: the stock already left the
    /// warehouse and recalling it is a returns/refund concern, not ours.
    /// Releasing an already-terminal hold is rejected informatively.
    pub fn release_reservation(&self, id: ReservationId) -> Result<Reservation, ReservationError> {
        let now = Utc::now();
        let reservation = self.load(id)?;
        let released = reservation.release(now)?;

        self.claim(&released)?;
        self.apply_ledger_release(&released)?;

        info!(reservation_id = %id, quantity = released.quantity, "reservation released");
        Ok(released)
    }

    /// Sweep all lapsed holds back into available stock, marking them
    /// EXPIRED. Per-row failures are logged and skipped; the batch always
    /// runs to completion. Returns the number of holds transitioned.
    ///
    /// Safe under overlapping schedules: a row another run (or a concurrent
    /// commit/release) already moved out of RESERVED fails the status guard
    /// and is counted by nobody.
    pub fn release_expired_reservations(&self) -> Result<usize, ReservationError> {
        let now = Utc::now();
        let expired = self.reservations.expired_as_of(now)?;

        let mut count = 0;
        for reservation in expired {
            let next = match reservation.expire(now) {
                Ok(next) => next,
                Err(err) => {
                    warn!(reservation_id = %reservation.id, error = %err, "skipping sweep row");
                    continue;
                }
            };

            match self.claim(&next) {
                Ok(()) => {}
                Err(ReservationError::InvalidState { current }) => {
                    // A concurrent caller transitioned it first; nothing to do.
                    debug!(reservation_id = %reservation.id, status = %current, "sweep no-op");
                    continue;
                }
                Err(err) => {
                    warn!(reservation_id = %reservation.id, error = %err, "sweep claim failed");
                    continue;
                }
            }

            if let Err(err) = self.apply_ledger_release(&next) {
                warn!(reservation_id = %reservation.id, error = %err, "sweep ledger release failed");
                continue;
            }

            count += 1;
        }

        if count > 0 {
            info!(count, "expired reservations released");
        }
        Ok(count)
    }

    /// Release every RESERVED hold correlated to one cart (abandonment or
    /// payment failure). Same per-row tolerance as the expiry sweep.
    pub fn release_cart_reservations(&self, cart_id: CartId) -> Result<usize, ReservationError> {
        let now = Utc::now();
        let held = self.reservations.reserved_for_cart(cart_id)?;

        let mut count = 0;
        for reservation in held {
            let next = match reservation.release(now) {
                Ok(next) => next,
                Err(err) => {
                    warn!(reservation_id = %reservation.id, error = %err, "skipping cart release row");
                    continue;
                }
            };

            if let Err(err) = self.claim(&next).and_then(|()| self.apply_ledger_release(&next)) {
                warn!(reservation_id = %reservation.id, %cart_id, error = %err, "cart release failed");
                continue;
            }
            count += 1;
        }

        if count > 0 {
            info!(%cart_id, count, "cart reservations released");
        }
        Ok(count)
    }

    /// Commit every still-valid RESERVED hold correlated to one order (the
    /// order-confirmation flow's bulk transition). Lapsed holds are left for
    /// the sweeper. Returns the number committed.
    pub fn confirm_order_reservations(&self, order_id: OrderId) -> Result<usize, ReservationError> {
        let now = Utc::now();
        let held = self.reservations.reserved_for_order(order_id)?;

        let mut count = 0;
        for reservation in held {
            if reservation.is_expired(now) {
                warn!(reservation_id = %reservation.id, %order_id, "hold lapsed before confirmation");
                continue;
            }

            let next = match reservation.confirm(now) {
                Ok(next) => next,
                Err(err) => {
                    warn!(reservation_id = %reservation.id, error = %err, "skipping order confirm row");
                    continue;
                }
            };

            if let Err(err) = self.claim(&next).and_then(|()| self.apply_ledger_commit(&next)) {
                warn!(reservation_id = %reservation.id, %order_id, error = %err, "order confirm failed");
                continue;
            }
            count += 1;
        }

        if count > 0 {
            info!(%order_id, count, "order reservations committed");
        }
        Ok(count)
    }

    fn load(&self, id: ReservationId) -> Result<Reservation, ReservationError> {
        self.reservations.get(id)?.ok_or(ReservationError::NotFound)
    }

    /// Claim exclusive ownership of the transition via the status guard.
    /// A lost race surfaces as `InvalidState` naming the winner's status.
    fn claim(&self, next: &Reservation) -> Result<(), ReservationError> {
        match self.reservations.update_from(ReservationStatus::Reserved, next) {
            Ok(()) => Ok(()),
            Err(ReservationError::StaleStatus { found, .. }) => {
                Err(ReservationError::InvalidState { current: found })
            }
            Err(err) => Err(err),
        }
    }

    fn apply_ledger_release(&self, reservation: &Reservation) -> Result<(), ReservationError> {
        self.ledger
            .release_reservation(
                reservation.product_id,
                reservation.warehouse_id,
                reservation.quantity,
            )
            .map_err(|err| {
                error!(
                    reservation_id = %reservation.id,
                    error = %err,
                    "ledger release failed after reservation claim"
                );
                err
            })?;
        Ok(())
    }

    fn apply_ledger_commit(&self, reservation: &Reservation) -> Result<(), ReservationError> {
        self.ledger
            .commit_reservation(
                reservation.product_id,
                reservation.warehouse_id,
                reservation.quantity,
            )
            .map_err(|err| {
                error!(
                    reservation_id = %reservation.id,
                    error = %err,
                    "ledger commit failed after reservation claim"
                );
                err
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use stockyard_ledger::LedgerError;

    use crate::ledger_store::{InMemoryLedgerStore, LedgerStore};
    use crate::reservation_store::{InMemoryReservationStore, ReservationStore};

    type TestService = ReservationService<InMemoryLedgerStore, InMemoryReservationStore>;

    fn sku() -> Sku {
        Sku::new("SVC-1").unwrap()
    }

    fn seeded(available: u64) -> (TestService, ProductId, WarehouseId) {
        let ledger = InMemoryLedgerStore::new();
        let product = ProductId::new();
        let warehouse = WarehouseId::new();
        ledger.add_stock(product, warehouse, &sku(), available).unwrap();
        (
            ReservationService::new(ledger, InMemoryReservationStore::new()),
            product,
            warehouse,
        )
    }

    fn create(
        service: &TestService,
        product: ProductId,
        warehouse: WarehouseId,
        qty: u64,
    ) -> Result<Reservation, ReservationError> {
        service.create_reservation(
            product,
            warehouse,
            sku(),
            qty,
            HoldWindow::DEFAULT,
            Correlation::default(),
        )
    }

    fn levels(service: &TestService, product: ProductId, warehouse: WarehouseId) -> (u64, u64, u64, u64) {
        let row = service.ledger().get(product, warehouse).unwrap().unwrap();
        (
            row.levels.available,
            row.levels.reserved,
            row.levels.damaged,
            row.levels.total,
        )
    }

    /// Backdate a hold so it reads as lapsed without sleeping.
    fn force_expiry(service: &TestService, reservation: &Reservation) {
        let mut lapsed = reservation.clone();
        lapsed.expires_at = Utc::now() - Duration::minutes(1);
        service
            .reservations()
            .update_from(ReservationStatus::Reserved, &lapsed)
            .unwrap();
    }

    #[test]
    fn checkout_scenario_reserve_all_then_commit() {
        let (service, product, warehouse) = seeded(5);

        let hold = create(&service, product, warehouse, 5).unwrap();
        assert_eq!(levels(&service, product, warehouse), (0, 5, 0, 5));

        // Second hold finds nothing left; ledger unchanged.
        let err = create(&service, product, warehouse, 1).unwrap_err();
        assert!(matches!(
            err,
            ReservationError::Ledger(LedgerError::NotEnoughStock { .. })
        ));
        assert_eq!(levels(&service, product, warehouse), (0, 5, 0, 5));

        let committed = service.commit_reservation(hold.id).unwrap();
        assert_eq!(committed.status, ReservationStatus::Confirmed);
        assert_eq!(levels(&service, product, warehouse), (0, 0, 0, 0));
    }

    #[test]
    fn failed_create_leaves_no_reservation_record() {
        let (service, product, warehouse) = seeded(2);

        let err = create(&service, product, warehouse, 3).unwrap_err();
        assert!(matches!(err, ReservationError::Ledger(_)));

        assert!(service
            .reservations()
            .expired_as_of(Utc::now() + Duration::days(1))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn release_restores_available_stock() {
        let (service, product, warehouse) = seeded(10);

        let hold = create(&service, product, warehouse, 4).unwrap();
        assert_eq!(levels(&service, product, warehouse), (6, 4, 0, 10));

        let released = service.release_reservation(hold.id).unwrap();
        assert_eq!(released.status, ReservationStatus::Released);
        assert_eq!(levels(&service, product, warehouse), (10, 0, 0, 10));
    }

    #[test]
    fn terminal_states_reject_commit_and_release_without_ledger_effect() {
        let (service, product, warehouse) = seeded(10);

        let hold = create(&service, product, warehouse, 4).unwrap();
        service.release_reservation(hold.id).unwrap();
        let after_release = levels(&service, product, warehouse);

        for result in [
            service.commit_reservation(hold.id),
            service.release_reservation(hold.id),
        ] {
            assert_eq!(
                result.unwrap_err(),
                ReservationError::InvalidState {
                    current: ReservationStatus::Released
                }
            );
        }
        assert_eq!(levels(&service, product, warehouse), after_release);
    }

    #[test]
    fn confirmed_reservation_cannot_be_released() {
        let (service, product, warehouse) = seeded(10);

        let hold = create(&service, product, warehouse, 4).unwrap();
        service.commit_reservation(hold.id).unwrap();

        let err = service.release_reservation(hold.id).unwrap_err();
        assert_eq!(
            err,
            ReservationError::InvalidState {
                current: ReservationStatus::Confirmed
            }
        );
        // Committed stock stays gone.
        assert_eq!(levels(&service, product, warehouse), (6, 0, 0, 6));
    }

    #[test]
    fn commit_of_unknown_reservation_is_not_found() {
        let (service, _, _) = seeded(1);
        assert_eq!(
            service.commit_reservation(ReservationId::new()).unwrap_err(),
            ReservationError::NotFound
        );
    }

    #[test]
    fn lapsed_hold_cannot_be_committed() {
        let (service, product, warehouse) = seeded(5);

        let hold = create(&service, product, warehouse, 5).unwrap();
        force_expiry(&service, &hold);

        let err = service.commit_reservation(hold.id).unwrap_err();
        assert_eq!(err, ReservationError::Expired);
        // Nothing moved: the hold is merely ineligible, awaiting the sweeper.
        assert_eq!(levels(&service, product, warehouse), (0, 5, 0, 5));
    }

    #[test]
    fn expiry_scenario_sweep_restores_stock_for_fresh_holds() {
        let (service, product, warehouse) = seeded(5);

        let hold = create(&service, product, warehouse, 5).unwrap();
        assert_eq!(levels(&service, product, warehouse), (0, 5, 0, 5));
        force_expiry(&service, &hold);

        let count = service.release_expired_reservations().unwrap();
        assert_eq!(count, 1);
        assert_eq!(levels(&service, product, warehouse), (5, 0, 0, 5));

        let swept = service.reservations().get(hold.id).unwrap().unwrap();
        assert_eq!(swept.status, ReservationStatus::Expired);

        // The freed stock is sellable again.
        let fresh = create(&service, product, warehouse, 5).unwrap();
        assert_eq!(fresh.status, ReservationStatus::Reserved);
        assert_eq!(levels(&service, product, warehouse), (0, 5, 0, 5));
    }

    #[test]
    fn sweep_is_idempotent() {
        let (service, product, warehouse) = seeded(5);

        let hold = create(&service, product, warehouse, 2).unwrap();
        force_expiry(&service, &hold);

        assert_eq!(service.release_expired_reservations().unwrap(), 1);
        let after_first = levels(&service, product, warehouse);

        // Nothing new expired: the second run is a no-op.
        assert_eq!(service.release_expired_reservations().unwrap(), 0);
        assert_eq!(levels(&service, product, warehouse), after_first);
    }

    #[test]
    fn sweep_tolerates_a_poisoned_row_and_continues() {
        let (service, product, warehouse) = seeded(10);

        let good = create(&service, product, warehouse, 2).unwrap();
        let bad = create(&service, product, warehouse, 3).unwrap();
        force_expiry(&service, &good);
        force_expiry(&service, &bad);

        // Sabotage one row's ledger release by draining its reserved units
        // behind the service's back.
        service
            .ledger()
            .release_reservation(product, warehouse, 3)
            .unwrap();

        // One of the two rows fails its ledger release (not enough reserved),
        // the other still goes through.
        let count = service.release_expired_reservations().unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn cart_release_is_scoped_and_counted() {
        let (service, product, warehouse) = seeded(10);
        let cart = CartId::new();

        for _ in 0..2 {
            service
                .create_reservation(
                    product,
                    warehouse,
                    sku(),
                    2,
                    HoldWindow::DEFAULT,
                    Correlation::for_cart(cart),
                )
                .unwrap();
        }
        let other = create(&service, product, warehouse, 1).unwrap();

        assert_eq!(levels(&service, product, warehouse), (5, 5, 0, 10));
        assert_eq!(service.release_cart_reservations(cart).unwrap(), 2);
        assert_eq!(levels(&service, product, warehouse), (9, 1, 0, 10));

        // The uncorrelated hold is untouched.
        let other_still = service.reservations().get(other.id).unwrap().unwrap();
        assert_eq!(other_still.status, ReservationStatus::Reserved);

        // Re-running finds nothing left for the cart.
        assert_eq!(service.release_cart_reservations(cart).unwrap(), 0);
    }

    #[test]
    fn order_confirmation_bulk_commits_valid_holds_only() {
        let (service, product, warehouse) = seeded(10);
        let order = OrderId::new();

        let fresh = service
            .create_reservation(
                product,
                warehouse,
                sku(),
                2,
                HoldWindow::DEFAULT,
                Correlation::for_order(order),
            )
            .unwrap();
        let lapsed = service
            .create_reservation(
                product,
                warehouse,
                sku(),
                3,
                HoldWindow::DEFAULT,
                Correlation::for_order(order),
            )
            .unwrap();
        force_expiry(&service, &lapsed);

        assert_eq!(service.confirm_order_reservations(order).unwrap(), 1);

        let confirmed = service.reservations().get(fresh.id).unwrap().unwrap();
        assert_eq!(confirmed.status, ReservationStatus::Confirmed);
        let still_lapsed = service.reservations().get(lapsed.id).unwrap().unwrap();
        assert_eq!(still_lapsed.status, ReservationStatus::Reserved);

        // 2 committed (total down), 3 still reserved for the sweeper.
        assert_eq!(levels(&service, product, warehouse), (5, 3, 0, 8));
    }
}
