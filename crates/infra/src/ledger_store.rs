//! Stock ledger storage.
//!
//! The trait is the ledger's entire mutation surface: each method is one
//! conditional atomic update ("change these counters, but only if the current
//! stored values satisfy the precondition, and report whether it held").
//! No caller ever reads a row and writes it back in a second round-trip.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::error;

use stockyard_core::{ProductId, Sku, WarehouseId};
use stockyard_ledger::{best_warehouse, LedgerError, StockLedgerRow};

/// Stock ledger store abstraction.
///
/// Mutations are serialized per row by the store itself; under concurrent
/// callers exactly one wins each contended update and the loser observes a
/// failure with no partial effect.
pub trait LedgerStore: Send + Sync {
    /// Move `qty` from available to reserved, only if `available >= qty` at
    /// the moment of the update. An absent row reads as zero stock.
    fn reserve_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError>;

    /// Move `qty` back from reserved to available, only if `reserved >= qty`.
    fn release_reservation(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError>;

    /// Consume `qty` reserved units (stock physically leaves the warehouse),
    /// only if `reserved >= qty`.
    fn commit_reservation(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError>;

    /// Receive `qty` units; upserts the row if absent and stamps
    /// `last_restocked`.
    fn add_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        sku: &Sku,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError>;

    /// Move `qty` from available to damaged, only if `available >= qty`.
    fn mark_damaged(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError>;

    /// Read one row. `None` means zero stock at that warehouse.
    fn get(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockLedgerRow>, LedgerError>;

    /// All rows for a product, ordered by warehouse id.
    fn rows_for_product(&self, product_id: ProductId) -> Result<Vec<StockLedgerRow>, LedgerError>;

    /// Sum of `available` across all warehouses for a product.
    fn total_available(&self, product_id: ProductId) -> Result<u64, LedgerError> {
        Ok(self
            .rows_for_product(product_id)?
            .iter()
            .map(|r| r.levels.available)
            .sum())
    }

    /// Warehouse-selection read path; see `stockyard_ledger::best_warehouse`
    /// for the rule.
    fn find_best_warehouse(
        &self,
        product_id: ProductId,
        qty: u64,
        locality_hint: Option<WarehouseId>,
    ) -> Result<Option<StockLedgerRow>, LedgerError> {
        let rows = self.rows_for_product(product_id)?;
        Ok(best_warehouse(&rows, qty, locality_hint).cloned())
    }
}

impl<S> LedgerStore for Arc<S>
where
    S: LedgerStore + ?Sized,
{
    fn reserve_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        (**self).reserve_stock(product_id, warehouse_id, qty)
    }

    fn release_reservation(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        (**self).release_reservation(product_id, warehouse_id, qty)
    }

    fn commit_reservation(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        (**self).commit_reservation(product_id, warehouse_id, qty)
    }

    fn add_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        sku: &Sku,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        (**self).add_stock(product_id, warehouse_id, sku, qty)
    }

    fn mark_damaged(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        (**self).mark_damaged(product_id, warehouse_id, qty)
    }

    fn get(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockLedgerRow>, LedgerError> {
        (**self).get(product_id, warehouse_id)
    }

    fn rows_for_product(&self, product_id: ProductId) -> Result<Vec<StockLedgerRow>, LedgerError> {
        (**self).rows_for_product(product_id)
    }

    fn total_available(&self, product_id: ProductId) -> Result<u64, LedgerError> {
        (**self).total_available(product_id)
    }

    fn find_best_warehouse(
        &self,
        product_id: ProductId,
        qty: u64,
        locality_hint: Option<WarehouseId>,
    ) -> Result<Option<StockLedgerRow>, LedgerError> {
        (**self).find_best_warehouse(product_id, qty, locality_hint)
    }
}

/// In-memory ledger store for tests/dev.
///
/// Each mutation takes the write lock once, applies the pure row transition,
/// and installs the new row only on success. The lock stands in for the
/// durable store's per-document serialization.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    rows: RwLock<HashMap<(ProductId, WarehouseId), StockLedgerRow>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// One conditional atomic update: `transition` sees the current row (or
    /// `None`) and either produces the replacement row or fails; nothing is
    /// written on failure.
    fn mutate<F>(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        transition: F,
    ) -> Result<StockLedgerRow, LedgerError>
    where
        F: FnOnce(Option<&StockLedgerRow>) -> Result<StockLedgerRow, LedgerError>,
    {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| LedgerError::storage("ledger store lock poisoned"))?;

        let current = rows.get(&(product_id, warehouse_id)).cloned();
        match transition(current.as_ref()) {
            Ok(next) => {
                rows.insert((product_id, warehouse_id), next.clone());
                Ok(next)
            }
            Err(err) => {
                if let LedgerError::InvariantViolation(_) = &err {
                    // Defect-class failure: surface the full row state and
                    // fail closed. No automatic repair.
                    error!(
                        %product_id,
                        %warehouse_id,
                        row = ?current,
                        error = %err,
                        "ledger invariant violation"
                    );
                }
                Err(err)
            }
        }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn reserve_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        self.mutate(product_id, warehouse_id, |current| match current {
            Some(row) => row.reserve(qty),
            None => Err(LedgerError::NotEnoughStock {
                requested: qty,
                available: 0,
            }),
        })
    }

    fn release_reservation(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        self.mutate(product_id, warehouse_id, |current| match current {
            Some(row) => row.release(qty),
            None => Err(LedgerError::invariant(format!(
                "cannot release {qty}: no ledger row for this product/warehouse"
            ))),
        })
    }

    fn commit_reservation(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        self.mutate(product_id, warehouse_id, |current| match current {
            Some(row) => row.commit(qty),
            None => Err(LedgerError::invariant(format!(
                "cannot commit {qty}: no ledger row for this product/warehouse"
            ))),
        })
    }

    fn add_stock(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        sku: &Sku,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        let now = Utc::now();
        self.mutate(product_id, warehouse_id, |current| {
            let base = match current {
                Some(row) => row.clone(),
                None => StockLedgerRow::empty(product_id, warehouse_id, sku.clone()),
            };
            base.add_stock(qty, now)
        })
    }

    fn mark_damaged(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
        qty: u64,
    ) -> Result<StockLedgerRow, LedgerError> {
        self.mutate(product_id, warehouse_id, |current| match current {
            Some(row) => row.mark_damaged(qty),
            None => Err(LedgerError::NotEnoughStock {
                requested: qty,
                available: 0,
            }),
        })
    }

    fn get(
        &self,
        product_id: ProductId,
        warehouse_id: WarehouseId,
    ) -> Result<Option<StockLedgerRow>, LedgerError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| LedgerError::storage("ledger store lock poisoned"))?;
        Ok(rows.get(&(product_id, warehouse_id)).cloned())
    }

    fn rows_for_product(&self, product_id: ProductId) -> Result<Vec<StockLedgerRow>, LedgerError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| LedgerError::storage("ledger store lock poisoned"))?;

        let mut result: Vec<_> = rows
            .values()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();

        result.sort_by_key(|r| r.warehouse_id);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sku() -> Sku {
        Sku::new("LS-1").unwrap()
    }

    fn seeded(available: u64) -> (InMemoryLedgerStore, ProductId, WarehouseId) {
        let store = InMemoryLedgerStore::new();
        let product = ProductId::new();
        let warehouse = WarehouseId::new();
        store.add_stock(product, warehouse, &sku(), available).unwrap();
        (store, product, warehouse)
    }

    #[test]
    fn add_stock_upserts_missing_row() {
        let store = InMemoryLedgerStore::new();
        let product = ProductId::new();
        let warehouse = WarehouseId::new();

        assert!(store.get(product, warehouse).unwrap().is_none());

        let row = store.add_stock(product, warehouse, &sku(), 7).unwrap();
        assert_eq!(row.levels.available, 7);
        assert_eq!(row.levels.total, 7);
        assert!(row.last_restocked.is_some());
    }

    #[test]
    fn reserve_on_missing_row_reads_as_zero_stock() {
        let store = InMemoryLedgerStore::new();
        let err = store
            .reserve_stock(ProductId::new(), WarehouseId::new(), 1)
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::NotEnoughStock {
                requested: 1,
                available: 0
            }
        );
    }

    #[test]
    fn failed_reserve_leaves_row_untouched() {
        let (store, product, warehouse) = seeded(3);

        let err = store.reserve_stock(product, warehouse, 4).unwrap_err();
        assert!(matches!(err, LedgerError::NotEnoughStock { .. }));

        let row = store.get(product, warehouse).unwrap().unwrap();
        assert_eq!(row.levels.available, 3);
        assert_eq!(row.levels.reserved, 0);
    }

    #[test]
    fn reserve_release_round_trip_restores_counters() {
        let (store, product, warehouse) = seeded(10);

        store.reserve_stock(product, warehouse, 4).unwrap();
        let row = store.release_reservation(product, warehouse, 4).unwrap();

        assert_eq!(row.levels.available, 10);
        assert_eq!(row.levels.reserved, 0);
        assert_eq!(row.levels.total, 10);
    }

    #[test]
    fn commit_reduces_total() {
        let (store, product, warehouse) = seeded(10);

        store.reserve_stock(product, warehouse, 4).unwrap();
        let row = store.commit_reservation(product, warehouse, 4).unwrap();

        assert_eq!(row.levels.available, 6);
        assert_eq!(row.levels.reserved, 0);
        assert_eq!(row.levels.total, 6);
    }

    #[test]
    fn release_without_ledger_row_is_invariant_violation() {
        let store = InMemoryLedgerStore::new();
        assert!(matches!(
            store.release_reservation(ProductId::new(), WarehouseId::new(), 1),
            Err(LedgerError::InvariantViolation(_))
        ));
    }

    #[test]
    fn total_available_sums_across_warehouses() {
        let store = InMemoryLedgerStore::new();
        let product = ProductId::new();
        store.add_stock(product, WarehouseId::new(), &sku(), 3).unwrap();
        store.add_stock(product, WarehouseId::new(), &sku(), 5).unwrap();
        // Another product must not leak into the sum.
        store
            .add_stock(ProductId::new(), WarehouseId::new(), &sku(), 100)
            .unwrap();

        assert_eq!(store.total_available(product).unwrap(), 8);
    }

    #[test]
    fn rows_for_product_is_ordered_by_warehouse_id() {
        let store = InMemoryLedgerStore::new();
        let product = ProductId::new();
        for _ in 0..5 {
            store.add_stock(product, WarehouseId::new(), &sku(), 1).unwrap();
        }

        let rows = store.rows_for_product(product).unwrap();
        assert_eq!(rows.len(), 5);
        assert!(rows.windows(2).all(|w| w[0].warehouse_id <= w[1].warehouse_id));
    }

    #[test]
    fn find_best_warehouse_prefers_hint() {
        let store = InMemoryLedgerStore::new();
        let product = ProductId::new();
        let near = WarehouseId::new();
        let far = WarehouseId::new();
        store.add_stock(product, far, &sku(), 50).unwrap();
        store.add_stock(product, near, &sku(), 10).unwrap();

        let picked = store
            .find_best_warehouse(product, 5, Some(near))
            .unwrap()
            .unwrap();
        assert_eq!(picked.warehouse_id, near);

        let picked = store.find_best_warehouse(product, 5, None).unwrap().unwrap();
        assert_eq!(picked.warehouse_id, far);
    }

    #[test]
    fn mark_damaged_through_store() {
        let (store, product, warehouse) = seeded(5);
        let row = store.mark_damaged(product, warehouse, 2).unwrap();
        assert_eq!(row.levels.available, 3);
        assert_eq!(row.levels.damaged, 2);
        assert_eq!(row.levels.total, 5);
    }
}
