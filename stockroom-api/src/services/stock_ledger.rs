//! Stock ledger
//!
//! Drafts of stock-in, stock-out and waste are freely editable; finalizing
//! one is a one-way transition that makes it count toward stock. Every
//! mutation runs in a single transaction on the caller's (already pinned)
//! connection. Finalize locks the affected item rows, so two finalizations
//! touching the same item serialize and the non-negative check always sees
//! committed totals.

use std::collections::{HashMap, HashSet};

use sqlx::{Acquire, PgConnection};
use stockroom_common::time::SharedClock;
use stockroom_common::{Error, Result};
use tracing::info;

use crate::db::{items, packagings, stock, stock_in, stock_out, stock_waste};
use crate::models::{
    MovementStatus, PackagingCount, StockIn, StockInPayload, StockOut, StockOutLine, StockOutPayload,
    StockWaste, StockWastePayload,
};

/// Allowed float drift when comparing quantities
pub const QUANTITY_TOLERANCE: f64 = 1e-6;

// ========================================
// Pure Rules
// ========================================

/// Child rows to insert, update and delete to reach the requested set
#[derive(Debug)]
pub struct DiffPlan<'a, T> {
    pub inserts: Vec<&'a T>,
    pub updates: Vec<(i64, &'a T)>,
    pub deletes: Vec<i64>,
}

/// Diff requested children against the ids stored today
///
/// Entries without an id are inserts, entries with a known id are updates,
/// stored ids absent from the request are deletes. An unknown or repeated id
/// is rejected.
pub fn plan_diff<'a, T>(
    existing: &[i64],
    incoming: &'a [T],
    id_of: impl Fn(&T) -> Option<i64>,
    what: &str,
) -> Result<DiffPlan<'a, T>> {
    let known: HashSet<i64> = existing.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut plan = DiffPlan {
        inserts: Vec::new(),
        updates: Vec::new(),
        deletes: Vec::new(),
    };

    for entry in incoming {
        match id_of(entry) {
            None => plan.inserts.push(entry),
            Some(id) if !known.contains(&id) => {
                return Err(Error::UnprocessableEntity(format!(
                    "{} {} does not belong to this movement",
                    what, id
                )));
            }
            Some(id) if !seen.insert(id) => {
                return Err(Error::UnprocessableEntity(format!("{} {} appears twice", what, id)));
            }
            Some(id) => plan.updates.push((id, entry)),
        }
    }

    plan.deletes = existing.iter().copied().filter(|id| !seen.contains(id)).collect();
    Ok(plan)
}

/// Packaging breakdown must add up to the line total
///
/// `parts` holds `(packaging size, packaging count)` pairs.
pub fn check_breakdown(item_id: i64, total_quantity: f64, parts: &[(f64, i32)]) -> Result<()> {
    let sum: f64 = parts.iter().map(|(size, count)| size * f64::from(*count)).sum();
    if (sum - total_quantity).abs() > QUANTITY_TOLERANCE {
        return Err(Error::BreakdownMismatch(format!(
            "item {}: packagings add up to {} but total_quantity is {}",
            item_id, sum, total_quantity
        )));
    }
    Ok(())
}

/// Removing `requested` must not take the item below zero
pub fn check_sufficient(item_id: i64, current: f64, requested: f64) -> Result<()> {
    if current - requested < -QUANTITY_TOLERANCE {
        return Err(Error::InsufficientStock(format!(
            "item {}: {} requested, {} in stock",
            item_id, requested, current
        )));
    }
    Ok(())
}

fn ensure_draft(status: MovementStatus, what: &str, id: i64) -> Result<()> {
    if status.is_finalized() {
        return Err(Error::ConflictingState(format!("{} {} is already finalized", what, id)));
    }
    Ok(())
}

fn reject_ids_on_create<T>(entries: &[T], id_of: impl Fn(&T) -> Option<i64>, what: &str) -> Result<()> {
    if let Some(id) = entries.iter().find_map(id_of) {
        return Err(Error::UnprocessableEntity(format!(
            "{} {} cannot be referenced on a new movement",
            what, id
        )));
    }
    Ok(())
}

fn join_ids(ids: &[i64]) -> String {
    ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ")
}

/// One stock-out line reduced to what the breakdown rule looks at
struct BreakdownLine {
    item_id: i64,
    total_quantity: f64,
    /// `(item_packaging_id, count)`
    parts: Vec<(i64, i32)>,
}

impl From<&StockOutLine> for BreakdownLine {
    fn from(line: &StockOutLine) -> Self {
        Self {
            item_id: line.item_id,
            total_quantity: line.total_quantity,
            parts: line
                .packagings
                .iter()
                .map(|p| (p.item_packaging_id, p.quantity))
                .collect(),
        }
    }
}

// ========================================
// Shared Checks
// ========================================

async fn ensure_items_in_store(conn: &mut PgConnection, store_id: i64, ids: &[i64]) -> Result<()> {
    let missing = items::missing_from_store(conn, store_id, ids).await?;
    if !missing.is_empty() {
        return Err(Error::UnprocessableEntity(format!(
            "items [{}] do not belong to store {}",
            join_ids(&missing),
            store_id
        )));
    }
    Ok(())
}

async fn packaging_units_in_store(
    conn: &mut PgConnection,
    store_id: i64,
    ids: &[i64],
) -> Result<HashMap<i64, packagings::PackagingUnit>> {
    let units: HashMap<_, _> = packagings::units_in_store(conn, store_id, ids)
        .await?
        .into_iter()
        .map(|unit| (unit.id, unit))
        .collect();

    let mut missing: Vec<i64> = ids.iter().copied().filter(|id| !units.contains_key(id)).collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        missing.dedup();
        return Err(Error::UnprocessableEntity(format!(
            "packagings [{}] do not belong to store {}",
            join_ids(&missing),
            store_id
        )));
    }
    Ok(units)
}

/// Check that lines reference items and packagings of `store_id`
///
/// Returns each line's parts as `(packaging quantity, count)`.
async fn resolve_breakdowns(
    conn: &mut PgConnection,
    store_id: i64,
    lines: &[BreakdownLine],
) -> Result<Vec<Vec<(f64, i32)>>> {
    let item_ids: Vec<i64> = lines.iter().map(|l| l.item_id).collect();
    ensure_items_in_store(conn, store_id, &item_ids).await?;

    let packaging_ids: Vec<i64> = lines
        .iter()
        .flat_map(|l| l.parts.iter().map(|(id, _)| *id))
        .collect();
    let units = packaging_units_in_store(conn, store_id, &packaging_ids).await?;

    let mut resolved = Vec::with_capacity(lines.len());
    for line in lines {
        let mut parts = Vec::with_capacity(line.parts.len());
        for (packaging_id, count) in &line.parts {
            let unit = &units[packaging_id];
            if unit.item_id != line.item_id {
                return Err(Error::UnprocessableEntity(format!(
                    "packaging {} is not a packaging of item {}",
                    packaging_id, line.item_id
                )));
            }
            parts.push((unit.quantity, *count));
        }
        resolved.push(parts);
    }
    Ok(resolved)
}

/// Lock `item_ids` and verify each can give up `requested[item]`
async fn lock_and_check_stock(conn: &mut PgConnection, requested: &[(i64, f64)]) -> Result<()> {
    let item_ids: Vec<i64> = requested.iter().map(|(id, _)| *id).collect();
    items::lock_for_update(conn, &item_ids).await?;

    let balances: HashMap<i64, f64> = stock::balances(conn, &item_ids)
        .await?
        .into_iter()
        .map(|b| (b.item_id, b.current_stock))
        .collect();

    for (item_id, quantity) in requested {
        let current = balances.get(item_id).copied().unwrap_or(0.0);
        check_sufficient(*item_id, current, *quantity)?;
    }
    Ok(())
}

// ========================================
// Ledger
// ========================================

/// Draft and finalize operations for stock movements
#[derive(Clone)]
pub struct StockLedger {
    clock: SharedClock,
}

impl StockLedger {
    pub fn new(clock: SharedClock) -> Self {
        Self { clock }
    }

    // ---- stock in ----

    pub async fn create_stock_in(
        &self,
        conn: &mut PgConnection,
        store_id: i64,
        created_by: i64,
        payload: &StockInPayload,
    ) -> Result<StockIn> {
        reject_ids_on_create(&payload.items, |l| l.id, "stock-in line")?;

        let mut tx = conn.begin().await?;
        let packaging_ids: Vec<i64> = payload.items.iter().map(|l| l.item_packaging_id).collect();
        packaging_units_in_store(&mut tx, store_id, &packaging_ids).await?;

        let header = stock_in::insert_header(&mut tx, store_id, created_by).await?;
        for line in &payload.items {
            stock_in::insert_line(&mut tx, header.id, line).await?;
        }
        tx.commit().await?;

        stock_in::get(conn, store_id, header.id).await
    }

    pub async fn update_stock_in(
        &self,
        conn: &mut PgConnection,
        store_id: i64,
        id: i64,
        payload: &StockInPayload,
    ) -> Result<StockIn> {
        let mut tx = conn.begin().await?;
        let header = stock_in::lock_header(&mut tx, store_id, id).await?;
        ensure_draft(header.status, "stock-in", id)?;

        let packaging_ids: Vec<i64> = payload.items.iter().map(|l| l.item_packaging_id).collect();
        packaging_units_in_store(&mut tx, store_id, &packaging_ids).await?;

        let existing = stock_in::line_ids(&mut tx, id).await?;
        let plan = plan_diff(&existing, &payload.items, |l| l.id, "stock-in line")?;

        if !plan.deletes.is_empty() {
            stock_in::delete_lines(&mut tx, id, &plan.deletes).await?;
        }
        for (line_id, line) in &plan.updates {
            stock_in::update_line(&mut tx, id, *line_id, line).await?;
        }
        for line in &plan.inserts {
            stock_in::insert_line(&mut tx, id, line).await?;
        }
        stock_in::touch(&mut tx, id).await?;
        tx.commit().await?;

        stock_in::get(conn, store_id, id).await
    }

    pub async fn delete_stock_in(&self, conn: &mut PgConnection, store_id: i64, id: i64) -> Result<()> {
        let mut tx = conn.begin().await?;
        let header = stock_in::lock_header(&mut tx, store_id, id).await?;
        ensure_draft(header.status, "stock-in", id)?;

        stock_in::delete_all_lines(&mut tx, id).await?;
        stock_in::delete_header(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn finalize_stock_in(&self, conn: &mut PgConnection, store_id: i64, id: i64) -> Result<StockIn> {
        let mut tx = conn.begin().await?;
        let header = stock_in::lock_header(&mut tx, store_id, id).await?;
        ensure_draft(header.status, "stock-in", id)?;

        let affected = stock_in::affected_items(&mut tx, id).await?;
        if affected.is_empty() {
            return Err(Error::UnprocessableEntity(format!("stock-in {} has no lines", id)));
        }
        items::lock_for_update(&mut tx, &affected).await?;

        stock_in::mark_finalized(&mut tx, id, self.clock.now()).await?;
        tx.commit().await?;

        info!(store_id, stock_in_id = id, items = affected.len(), "Stock-in finalized");
        stock_in::get(conn, store_id, id).await
    }

    // ---- stock out ----

    pub async fn create_stock_out(
        &self,
        conn: &mut PgConnection,
        store_id: i64,
        created_by: i64,
        payload: &StockOutPayload,
    ) -> Result<StockOut> {
        reject_ids_on_create(&payload.items, |l| l.id, "stock-out line")?;
        for line in &payload.items {
            reject_ids_on_create(&line.packagings, |p| p.id, "stock-out packaging")?;
        }

        let mut tx = conn.begin().await?;
        let lines: Vec<BreakdownLine> = payload.items.iter().map(BreakdownLine::from).collect();
        resolve_breakdowns(&mut tx, store_id, &lines).await?;

        let header = stock_out::insert_header(&mut tx, store_id, created_by).await?;
        for line in &payload.items {
            insert_stock_out_line(&mut tx, header.id, line).await?;
        }
        tx.commit().await?;

        stock_out::get(conn, store_id, header.id).await
    }

    pub async fn update_stock_out(
        &self,
        conn: &mut PgConnection,
        store_id: i64,
        id: i64,
        payload: &StockOutPayload,
    ) -> Result<StockOut> {
        let mut tx = conn.begin().await?;
        let header = stock_out::lock_header(&mut tx, store_id, id).await?;
        ensure_draft(header.status, "stock-out", id)?;

        let lines: Vec<BreakdownLine> = payload.items.iter().map(BreakdownLine::from).collect();
        resolve_breakdowns(&mut tx, store_id, &lines).await?;

        let existing = stock_out::line_ids(&mut tx, id).await?;
        let plan = plan_diff(&existing, &payload.items, |l| l.id, "stock-out line")?;
        for line in &plan.inserts {
            reject_ids_on_create(&line.packagings, |p| p.id, "stock-out packaging")?;
        }

        if !plan.deletes.is_empty() {
            stock_out::delete_lines(&mut tx, id, &plan.deletes).await?;
        }
        for (line_id, line) in &plan.updates {
            stock_out::update_line(&mut tx, id, *line_id, line).await?;
            sync_breakdown(&mut tx, *line_id, &line.packagings).await?;
        }
        for line in &plan.inserts {
            insert_stock_out_line(&mut tx, id, line).await?;
        }
        stock_out::touch(&mut tx, id).await?;
        tx.commit().await?;

        stock_out::get(conn, store_id, id).await
    }

    pub async fn delete_stock_out(&self, conn: &mut PgConnection, store_id: i64, id: i64) -> Result<()> {
        let mut tx = conn.begin().await?;
        let header = stock_out::lock_header(&mut tx, store_id, id).await?;
        ensure_draft(header.status, "stock-out", id)?;

        stock_out::delete_all(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn finalize_stock_out(&self, conn: &mut PgConnection, store_id: i64, id: i64) -> Result<StockOut> {
        let mut tx = conn.begin().await?;
        let header = stock_out::lock_header(&mut tx, store_id, id).await?;
        ensure_draft(header.status, "stock-out", id)?;

        let stored = stock_out::get(&mut tx, store_id, id).await?;
        if stored.items.is_empty() {
            return Err(Error::UnprocessableEntity(format!("stock-out {} has no lines", id)));
        }
        let lines: Vec<BreakdownLine> = stored
            .items
            .iter()
            .map(|item| BreakdownLine {
                item_id: item.item_id,
                total_quantity: item.total_quantity,
                parts: item
                    .packagings
                    .iter()
                    .map(|p| (p.item_packaging_id, p.quantity))
                    .collect(),
            })
            .collect();
        let resolved = resolve_breakdowns(&mut tx, store_id, &lines).await?;
        for (line, parts) in lines.iter().zip(&resolved) {
            check_breakdown(line.item_id, line.total_quantity, parts)?;
        }

        let demand: Vec<(i64, f64)> = stock_out::demand(&mut tx, id)
            .await?
            .into_iter()
            .map(|d| (d.item_id, d.quantity))
            .collect();
        lock_and_check_stock(&mut tx, &demand).await?;

        stock_out::mark_finalized(&mut tx, id, self.clock.now()).await?;
        tx.commit().await?;

        info!(store_id, stock_out_id = id, items = demand.len(), "Stock-out finalized");
        stock_out::get(conn, store_id, id).await
    }

    // ---- waste ----

    pub async fn create_waste(
        &self,
        conn: &mut PgConnection,
        store_id: i64,
        created_by: i64,
        payload: &StockWastePayload,
    ) -> Result<StockWaste> {
        let mut tx = conn.begin().await?;
        ensure_items_in_store(&mut tx, store_id, &[payload.item_id]).await?;
        let waste = stock_waste::insert(&mut tx, store_id, payload, created_by).await?;
        tx.commit().await?;
        Ok(waste)
    }

    pub async fn update_waste(
        &self,
        conn: &mut PgConnection,
        store_id: i64,
        id: i64,
        payload: &StockWastePayload,
    ) -> Result<StockWaste> {
        let mut tx = conn.begin().await?;
        let current = stock_waste::lock(&mut tx, store_id, id).await?;
        ensure_draft(current.status, "stock waste", id)?;
        ensure_items_in_store(&mut tx, store_id, &[payload.item_id]).await?;

        let waste = stock_waste::update(&mut tx, id, payload).await?;
        tx.commit().await?;
        Ok(waste)
    }

    pub async fn delete_waste(&self, conn: &mut PgConnection, store_id: i64, id: i64) -> Result<()> {
        let mut tx = conn.begin().await?;
        let current = stock_waste::lock(&mut tx, store_id, id).await?;
        ensure_draft(current.status, "stock waste", id)?;

        stock_waste::delete(&mut tx, id).await?;
        tx.commit().await?;
        Ok(())
    }

    pub async fn finalize_waste(&self, conn: &mut PgConnection, store_id: i64, id: i64) -> Result<StockWaste> {
        let mut tx = conn.begin().await?;
        let current = stock_waste::lock(&mut tx, store_id, id).await?;
        ensure_draft(current.status, "stock waste", id)?;

        lock_and_check_stock(&mut tx, &[(current.item_id, current.wasted_quantity)]).await?;

        let waste = stock_waste::mark_finalized(&mut tx, id, self.clock.now()).await?;
        tx.commit().await?;

        info!(store_id, stock_waste_id = id, item_id = waste.item_id, "Stock waste finalized");
        Ok(waste)
    }
}

async fn insert_stock_out_line(conn: &mut PgConnection, stock_out_id: i64, line: &StockOutLine) -> Result<()> {
    let line_id = stock_out::insert_line(conn, stock_out_id, line).await?;
    for (position, count) in line.packagings.iter().enumerate() {
        stock_out::insert_packaging(conn, line_id, position as i32, count).await?;
    }
    Ok(())
}

async fn sync_breakdown(conn: &mut PgConnection, line_id: i64, requested: &[PackagingCount]) -> Result<()> {
    let existing = stock_out::packaging_ids(conn, line_id).await?;
    let plan = plan_diff(&existing, requested, |p| p.id, "stock-out packaging")?;

    if !plan.deletes.is_empty() {
        stock_out::delete_packagings(conn, line_id, &plan.deletes).await?;
    }
    for (position, count) in requested.iter().enumerate() {
        match count.id {
            Some(id) => stock_out::update_packaging(conn, line_id, id, position as i32, count).await?,
            None => stock_out::insert_packaging(conn, line_id, position as i32, count).await?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Line {
        id: Option<i64>,
        qty: i32,
    }

    fn line(id: Option<i64>, qty: i32) -> Line {
        Line { id, qty }
    }

    #[test]
    fn test_plan_diff_mixes_insert_update_delete() {
        let incoming = vec![line(Some(2), 5), line(None, 1), line(None, 3)];
        let plan = plan_diff(&[1, 2, 3], &incoming, |l| l.id, "line").unwrap();

        assert_eq!(plan.inserts.len(), 2);
        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].0, 2);
        assert_eq!(plan.updates[0].1.qty, 5);
        assert_eq!(plan.deletes, vec![1, 3]);
    }

    #[test]
    fn test_plan_diff_unknown_id_rejected() {
        let incoming = vec![line(Some(99), 1)];
        let result = plan_diff(&[1, 2], &incoming, |l| l.id, "line");
        assert!(matches!(result, Err(Error::UnprocessableEntity(_))));
    }

    #[test]
    fn test_plan_diff_repeated_id_rejected() {
        let incoming = vec![line(Some(1), 1), line(Some(1), 2)];
        let result = plan_diff(&[1], &incoming, |l| l.id, "line");
        assert!(matches!(result, Err(Error::UnprocessableEntity(_))));
    }

    #[test]
    fn test_plan_diff_empty_request_deletes_everything() {
        let incoming: Vec<Line> = Vec::new();
        let plan = plan_diff(&[4, 5], &incoming, |l| l.id, "line").unwrap();
        assert!(plan.inserts.is_empty());
        assert_eq!(plan.deletes, vec![4, 5]);
    }

    #[test]
    fn test_breakdown_exact_sum() {
        // 2 x 5 + 1 x 2 = 12
        assert!(check_breakdown(7, 12.0, &[(5.0, 2), (2.0, 1)]).is_ok());
    }

    #[test]
    fn test_breakdown_mismatch() {
        // 2 x 5 = 10, not 12
        let err = check_breakdown(7, 12.0, &[(5.0, 2)]).unwrap_err();
        assert!(matches!(err, Error::BreakdownMismatch(_)));
        assert_eq!(err.code(), "BREAKDOWN_MISMATCH");
    }

    #[test]
    fn test_breakdown_tolerates_float_drift() {
        // 3 x 0.1 is not exactly 0.3 in binary floating point
        assert!(check_breakdown(1, 0.3, &[(0.1, 3)]).is_ok());
        assert!(check_breakdown(1, 0.3001, &[(0.1, 3)]).is_err());
    }

    #[test]
    fn test_breakdown_empty_only_matches_zero() {
        assert!(check_breakdown(1, 0.0, &[]).is_ok());
        assert!(check_breakdown(1, 1.0, &[]).is_err());
    }

    #[test]
    fn test_sufficient_stock() {
        assert!(check_sufficient(1, 10.0, 10.0).is_ok());
        assert!(check_sufficient(1, 10.0, 4.0).is_ok());
        assert!(matches!(
            check_sufficient(1, 10.0, 15.0),
            Err(Error::InsufficientStock(_))
        ));
        assert!(check_sufficient(1, 0.0, 0.5).is_err());
    }

    #[test]
    fn test_ensure_draft() {
        assert!(ensure_draft(MovementStatus::Draft, "stock-in", 1).is_ok());
        assert!(matches!(
            ensure_draft(MovementStatus::Finalized, "stock-in", 1),
            Err(Error::ConflictingState(_))
        ));
    }

    #[test]
    fn test_ids_rejected_on_create() {
        let entries = vec![line(None, 1), line(Some(3), 2)];
        assert!(reject_ids_on_create(&entries, |l| l.id, "line").is_err());
        assert!(reject_ids_on_create(&entries[..1], |l| l.id, "line").is_ok());
    }
}
