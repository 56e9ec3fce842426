use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockyard_core::{ProductId, Sku, WarehouseId};

use crate::error::LedgerError;

/// Counter breakdown for one (product, warehouse) pair.
///
/// Invariant: `total == available + reserved + damaged` at every observable
/// state. Counters are unsigned, so non-negativity holds by construction;
/// every transition checks its precondition before subtracting.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub available: u64,
    pub reserved: u64,
    pub damaged: u64,
    pub total: u64,
}

impl StockLevels {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Does `total` equal the sum of the parts?
    pub fn is_balanced(&self) -> bool {
        self.available
            .checked_add(self.reserved)
            .and_then(|s| s.checked_add(self.damaged))
            .map(|sum| sum == self.total)
            .unwrap_or(false)
    }
}

impl core::fmt::Display for StockLevels {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "available={} reserved={} damaged={} total={}",
            self.available, self.reserved, self.damaged, self.total
        )
    }
}

/// One stock ledger row, unique per (product, warehouse).
///
/// Rows are created on first stock addition and never hard-deleted; an absent
/// row reads as zero stock. The row holds aggregate counters only -- it never
/// references individual reservations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLedgerRow {
    pub product_id: ProductId,
    pub warehouse_id: WarehouseId,
    /// Denormalized for lookup.
    pub sku: Sku,
    pub levels: StockLevels,
    pub reorder_point: Option<u64>,
    pub reorder_quantity: Option<u64>,
    pub last_restocked: Option<DateTime<Utc>>,
}

impl StockLedgerRow {
    /// Fresh row with zero counters (the upsert base for `add_stock`).
    pub fn empty(product_id: ProductId, warehouse_id: WarehouseId, sku: Sku) -> Self {
        Self {
            product_id,
            warehouse_id,
            sku,
            levels: StockLevels::zero(),
            reorder_point: None,
            reorder_quantity: None,
            last_restocked: None,
        }
    }

    /// Move `qty` from available to reserved.
    ///
    /// Fails with `NotEnoughStock` when `available < qty`; on failure no
    /// counter changes. This is the correctness-critical transition: applied
    /// atomically by the store, it guarantees two competing holds can never
    /// double-count the same unit.
    pub fn reserve(&self, qty: u64) -> Result<Self, LedgerError> {
        ensure_positive(qty)?;
        if self.levels.available < qty {
            return Err(LedgerError::NotEnoughStock {
                requested: qty,
                available: self.levels.available,
            });
        }
        let mut next = self.clone();
        next.levels.available -= qty;
        next.levels.reserved += qty;
        next.ensure_balanced()?;
        Ok(next)
    }

    /// Move `qty` back from reserved to available (hold released or expired).
    ///
    /// `reserved < qty` means a caller is releasing stock it never held,
    /// which is a defect, not a business outcome.
    pub fn release(&self, qty: u64) -> Result<Self, LedgerError> {
        ensure_positive(qty)?;
        if self.levels.reserved < qty {
            return Err(LedgerError::invariant(format!(
                "cannot release {qty}: only {} reserved ({})",
                self.levels.reserved, self.levels
            )));
        }
        let mut next = self.clone();
        next.levels.reserved -= qty;
        next.levels.available += qty;
        next.ensure_balanced()?;
        Ok(next)
    }

    /// Consume `qty` of reserved stock: it physically leaves the warehouse,
    /// so both `reserved` and `total` drop. `available` is untouched.
    pub fn commit(&self, qty: u64) -> Result<Self, LedgerError> {
        ensure_positive(qty)?;
        if self.levels.reserved < qty {
            return Err(LedgerError::invariant(format!(
                "cannot commit {qty}: only {} reserved ({})",
                self.levels.reserved, self.levels
            )));
        }
        if self.levels.total < qty {
            // Unreachable when balanced, but never trust a stored row blindly.
            return Err(LedgerError::invariant(format!(
                "cannot commit {qty}: total is {} ({})",
                self.levels.total, self.levels
            )));
        }
        let mut next = self.clone();
        next.levels.reserved -= qty;
        next.levels.total -= qty;
        next.ensure_balanced()?;
        Ok(next)
    }

    /// Receive `qty` new units into the warehouse.
    pub fn add_stock(&self, qty: u64, now: DateTime<Utc>) -> Result<Self, LedgerError> {
        ensure_positive(qty)?;
        let mut next = self.clone();
        next.levels.available = next
            .levels
            .available
            .checked_add(qty)
            .ok_or_else(|| LedgerError::invariant("available counter overflow"))?;
        next.levels.total = next
            .levels
            .total
            .checked_add(qty)
            .ok_or_else(|| LedgerError::invariant("total counter overflow"))?;
        next.last_restocked = Some(now);
        next.ensure_balanced()?;
        Ok(next)
    }

    /// Move `qty` from available to damaged (units found unsellable).
    pub fn mark_damaged(&self, qty: u64) -> Result<Self, LedgerError> {
        ensure_positive(qty)?;
        if self.levels.available < qty {
            return Err(LedgerError::NotEnoughStock {
                requested: qty,
                available: self.levels.available,
            });
        }
        let mut next = self.clone();
        next.levels.available -= qty;
        next.levels.damaged += qty;
        next.ensure_balanced()?;
        Ok(next)
    }

    /// Restocking threshold reached?
    pub fn needs_reorder(&self) -> bool {
        match self.reorder_point {
            Some(point) => self.levels.available <= point,
            None => false,
        }
    }

    fn ensure_balanced(&self) -> Result<(), LedgerError> {
        if self.levels.is_balanced() {
            Ok(())
        } else {
            Err(LedgerError::invariant(format!(
                "total != available + reserved + damaged ({})",
                self.levels
            )))
        }
    }
}

fn ensure_positive(qty: u64) -> Result<(), LedgerError> {
    if qty == 0 {
        return Err(LedgerError::validation("quantity must be positive"));
    }
    Ok(())
}
