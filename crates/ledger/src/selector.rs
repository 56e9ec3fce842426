//! Warehouse selection for fulfillment.
//!
//! A read-only rule, but a named contract: locality hint first, then the
//! deepest available pile, with a deterministic tie-break so tests (and
//! support engineers reading logs) see stable picks.

use std::cmp::Reverse;

use stockyard_core::WarehouseId;

use crate::row::StockLedgerRow;

/// Pick the fulfillment warehouse for a requested quantity.
///
/// Among rows with `available >= qty`:
/// - a row matching `locality_hint` wins outright;
/// - otherwise the row with the highest `available` wins;
/// - ties break toward the lowest warehouse id.
///
/// Returns `None` when no single warehouse can cover the quantity (split
/// shipments are the caller's problem, not the selector's).
pub fn best_warehouse<'a>(
    rows: &'a [StockLedgerRow],
    qty: u64,
    locality_hint: Option<WarehouseId>,
) -> Option<&'a StockLedgerRow> {
    let mut candidates = rows.iter().filter(|r| r.levels.available >= qty);

    if let Some(hint) = locality_hint {
        if let Some(local) = candidates.clone().find(|r| r.warehouse_id == hint) {
            return Some(local);
        }
    }

    candidates.max_by_key(|r| (r.levels.available, Reverse(r.warehouse_id)))
}
