//! Postgres-backed adoption store.
//!
//! Persists the four adoption tables in PostgreSQL. The conditional-update
//! contract of [`AdoptionStore`] maps directly onto guarded `UPDATE ...
//! WHERE` statements with affected-row-count checks; compound operations run
//! inside one `sqlx` transaction so a failure anywhere rolls everything
//! back.
//!
//! ## Error mapping
//!
//! A *zero-rows-affected* conditional update is not a database error: it is
//! diagnosed (inside the same transaction) into the precise domain error:
//! `NotFound`, `InvalidStateTransition`, or `InsufficientInventory`. Actual
//! SQLx failures (connection loss, constraint violations, pool closed)
//! become `StoreError::Storage` with the operation name in the message.
//!
//! ## Thread safety
//!
//! `PostgresAdoptionStore` is `Send + Sync`; all operations go through the
//! SQLx connection pool.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use cropshare_core::{DomainError, OrderId, ProjectId, RecordId, UnitId, UserId};
use cropshare_fulfillment::{HarvestOutcome, Record, RecordStatus};
use cropshare_inventory::{Project, ProjectStatus, Unit, UnitStatus};
use cropshare_orders::{Order, OrderStatus, PaymentStamp};

use super::r#trait::{AdoptionStore, PaidOutcome, StoreError, StoreResult};

/// Schema for the four adoption tables.
///
/// `order_no` carries no UNIQUE constraint: the generation scheme is
/// best-effort and collisions within one second are a documented weakness.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id              UUID PRIMARY KEY,
    name            TEXT NOT NULL,
    total_units     INT NOT NULL CHECK (total_units > 0),
    available_units INT NOT NULL CHECK (available_units >= 0 AND available_units <= total_units),
    unit_price      BIGINT NOT NULL,
    status          TEXT NOT NULL,
    deleted         BOOLEAN NOT NULL DEFAULT FALSE,
    created_at      TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS units (
    id          UUID PRIMARY KEY,
    project_id  UUID NOT NULL REFERENCES projects(id),
    unit_number INT NOT NULL,
    grid_row    INT NOT NULL,
    grid_column INT NOT NULL,
    status      TEXT NOT NULL,
    deleted     BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (project_id, unit_number)
);

CREATE TABLE IF NOT EXISTS orders (
    id              UUID PRIMARY KEY,
    order_no        TEXT NOT NULL,
    user_id         UUID NOT NULL,
    project_id      UUID NOT NULL REFERENCES projects(id),
    unit_count      INT NOT NULL CHECK (unit_count > 0),
    unit_price      BIGINT NOT NULL,
    total_amount    BIGINT NOT NULL,
    discount_amount BIGINT NOT NULL,
    actual_amount   BIGINT NOT NULL,
    status          TEXT NOT NULL,
    payment_method  TEXT,
    payment_no      TEXT,
    payment_time    TIMESTAMPTZ,
    remark          TEXT,
    created_at      TIMESTAMPTZ NOT NULL,
    deleted         BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_orders_status_created ON orders (status, created_at);
CREATE INDEX IF NOT EXISTS idx_orders_order_no ON orders (order_no);

CREATE TABLE IF NOT EXISTS records (
    id            UUID PRIMARY KEY,
    order_id      UUID NOT NULL REFERENCES orders(id),
    user_id       UUID NOT NULL,
    project_id    UUID NOT NULL REFERENCES projects(id),
    unit_id       UUID NOT NULL REFERENCES units(id),
    status        TEXT NOT NULL,
    adoption_date TIMESTAMPTZ NOT NULL,
    planting_date TIMESTAMPTZ,
    harvest_date  TIMESTAMPTZ,
    actual_yield  BIGINT,
    quality_grade TEXT,
    deleted       BOOLEAN NOT NULL DEFAULT FALSE
);

CREATE INDEX IF NOT EXISTS idx_records_order ON records (order_id);
"#;

/// Postgres-backed adoption store.
#[derive(Debug, Clone)]
pub struct PostgresAdoptionStore {
    pool: Arc<PgPool>,
}

impl PostgresAdoptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Create the adoption tables if they do not exist.
    pub async fn ensure_schema(&self) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        for statement in SCHEMA.split(';').filter(|s| !s.trim().is_empty()) {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))
    }

    // ---- async operations (mirrored by the sync trait impl) ---------

    pub async fn project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        let row = sqlx::query(
            "SELECT * FROM projects WHERE id = $1 AND deleted = FALSE",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("project", e))?;

        row.map(|r| project_from_row(&r)).transpose()
    }

    pub async fn order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 AND deleted = FALSE")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("order", e))?;
        row.map(|r| order_from_row(&r)).transpose()
    }

    pub async fn order_by_no(&self, order_no: &str) -> StoreResult<Option<Order>> {
        let row = sqlx::query(
            "SELECT * FROM orders WHERE order_no = $1 AND deleted = FALSE \
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(order_no)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("order_by_no", e))?;
        row.map(|r| order_from_row(&r)).transpose()
    }

    pub async fn record(&self, id: RecordId) -> StoreResult<Option<Record>> {
        let row = sqlx::query("SELECT * FROM records WHERE id = $1 AND deleted = FALSE")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("record", e))?;
        row.map(|r| record_from_row(&r)).transpose()
    }

    pub async fn records_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT * FROM records WHERE order_id = $1 AND deleted = FALSE ORDER BY id ASC",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("records_for_order", e))?;
        rows.iter().map(record_from_row).collect()
    }

    pub async fn unit(&self, id: UnitId) -> StoreResult<Option<Unit>> {
        let row = sqlx::query("SELECT * FROM units WHERE id = $1 AND deleted = FALSE")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("unit", e))?;
        row.map(|r| unit_from_row(&r)).transpose()
    }

    pub async fn units_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Unit>> {
        let rows = sqlx::query(
            "SELECT * FROM units WHERE project_id = $1 AND deleted = FALSE \
             ORDER BY unit_number ASC",
        )
        .bind(project_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("units_for_project", e))?;
        rows.iter().map(unit_from_row).collect()
    }

    pub async fn expired_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE status = 'pending' AND deleted = FALSE \
             AND created_at < $1 ORDER BY created_at ASC",
        )
        .bind(cutoff)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("expired_pending_orders", e))?;
        rows.iter().map(order_from_row).collect()
    }

    pub async fn insert_project(&self, project: &Project) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO projects \
             (id, name, total_units, available_units, unit_price, status, deleted, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(project.id.as_uuid())
        .bind(&project.name)
        .bind(project.total_units as i32)
        .bind(project.available_units as i32)
        .bind(project.unit_price as i64)
        .bind(project_status_str(project.status))
        .bind(project.deleted)
        .bind(project.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("insert_project", e))?;
        Ok(())
    }

    pub async fn insert_units(&self, units: &[Unit]) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        for unit in units {
            sqlx::query(
                "INSERT INTO units \
                 (id, project_id, unit_number, grid_row, grid_column, status, deleted) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(unit.id.as_uuid())
            .bind(unit.project_id.as_uuid())
            .bind(unit.unit_number as i32)
            .bind(unit.row as i32)
            .bind(unit.column as i32)
            .bind(unit_status_str(unit.status))
            .bind(unit.deleted)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_units", e))?;
        }
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("insert_units", e))
    }

    pub async fn set_project_status(
        &self,
        project_id: ProjectId,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> StoreResult<Project> {
        let row = sqlx::query(
            "UPDATE projects SET status = $3 \
             WHERE id = $1 AND deleted = FALSE AND status = $2 RETURNING *",
        )
        .bind(project_id.as_uuid())
        .bind(project_status_str(from))
        .bind(project_status_str(to))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("set_project_status", e))?;

        match row {
            Some(r) => project_from_row(&r),
            None => {
                let current = sqlx::query(
                    "SELECT status FROM projects WHERE id = $1 AND deleted = FALSE",
                )
                .bind(project_id.as_uuid())
                .fetch_optional(&*self.pool)
                .await
                .map_err(|e| map_sqlx_error("set_project_status", e))?;
                match current {
                    None => Err(DomainError::NotFound.into()),
                    Some(r) => {
                        let status: String = get(&r, "status")?;
                        Err(DomainError::invalid_transition(format!(
                            "project cannot move {status} -> {to:?}"
                        ))
                        .into())
                    }
                }
            }
        }
    }

    pub async fn reserve_units(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        reserve_in_tx(&mut tx, project_id, count).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("reserve_units", e))
    }

    pub async fn release_pool(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        let mut tx = self.begin().await?;
        release_in_tx(&mut tx, project_id, count).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("release_pool", e))
    }

    pub async fn create_order(&self, order: &Order) -> StoreResult<()> {
        let mut tx = self.begin().await?;

        reserve_in_tx(&mut tx, order.project_id, order.unit_count).await?;

        sqlx::query(
            "INSERT INTO orders \
             (id, order_no, user_id, project_id, unit_count, unit_price, total_amount, \
              discount_amount, actual_amount, status, payment_method, payment_no, \
              payment_time, remark, created_at, deleted) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(order.id.as_uuid())
        .bind(&order.order_no)
        .bind(order.user_id.as_uuid())
        .bind(order.project_id.as_uuid())
        .bind(order.unit_count as i32)
        .bind(order.unit_price as i64)
        .bind(order.total_amount as i64)
        .bind(order.discount_amount as i64)
        .bind(order.actual_amount as i64)
        .bind(order_status_str(order.status))
        .bind(order.payment_method.as_deref())
        .bind(order.payment_no.as_deref())
        .bind(order.payment_time)
        .bind(order.remark.as_deref())
        .bind(order.created_at)
        .bind(order.deleted)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("create_order", e))?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("create_order", e))
    }

    pub async fn mark_paid(
        &self,
        order_id: OrderId,
        stamp: &PaymentStamp,
    ) -> StoreResult<PaidOutcome> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(
            "UPDATE orders SET status = 'paid', payment_method = $2, payment_no = $3, \
             payment_time = $4 \
             WHERE id = $1 AND deleted = FALSE AND status = 'pending' RETURNING *",
        )
        .bind(order_id.as_uuid())
        .bind(&stamp.method)
        .bind(&stamp.payment_no)
        .bind(stamp.paid_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("mark_paid", e))?;

        let order = match row {
            Some(r) => order_from_row(&r)?,
            None => return Err(diagnose_order(&mut tx, order_id, OrderStatus::Paid).await),
        };

        let unit_ids = allocate_in_tx(&mut tx, order.project_id, order.unit_count).await?;

        let mut records = Vec::with_capacity(unit_ids.len());
        for unit_id in unit_ids {
            let record = Record::adopted(
                order_id,
                order.user_id,
                order.project_id,
                unit_id,
                stamp.paid_at,
            );
            sqlx::query(
                "INSERT INTO records \
                 (id, order_id, user_id, project_id, unit_id, status, adoption_date, \
                  planting_date, harvest_date, actual_yield, quality_grade, deleted) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
            )
            .bind(record.id.as_uuid())
            .bind(record.order_id.as_uuid())
            .bind(record.user_id.as_uuid())
            .bind(record.project_id.as_uuid())
            .bind(record.unit_id.as_uuid())
            .bind(record_status_str(record.status))
            .bind(record.adoption_date)
            .bind(record.planting_date)
            .bind(record.harvest_date)
            .bind(record.actual_yield.map(|y| y as i64))
            .bind(record.quality_grade.as_deref())
            .bind(record.deleted)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("mark_paid", e))?;
            records.push(record);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("mark_paid", e))?;

        Ok(PaidOutcome { order, records })
    }

    pub async fn cancel_order(&self, order_id: OrderId) -> StoreResult<Order> {
        let mut tx = self.begin().await?;

        let row = sqlx::query(
            "UPDATE orders SET status = 'cancelled' \
             WHERE id = $1 AND deleted = FALSE AND status = 'pending' RETURNING *",
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("cancel_order", e))?;

        let order = match row {
            Some(r) => order_from_row(&r)?,
            None => {
                return Err(diagnose_order(&mut tx, order_id, OrderStatus::Cancelled).await)
            }
        };

        release_in_tx(&mut tx, order.project_id, order.unit_count).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("cancel_order", e))?;
        Ok(order)
    }

    pub async fn complete_order(&self, order_id: OrderId) -> StoreResult<Order> {
        let mut tx = self.begin().await?;
        let order =
            flip_status_in_tx(&mut tx, order_id, OrderStatus::Paid, OrderStatus::Completed)
                .await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("complete_order", e))?;
        Ok(order)
    }

    pub async fn request_refund(&self, order_id: OrderId) -> StoreResult<Order> {
        let mut tx = self.begin().await?;
        let order =
            flip_status_in_tx(&mut tx, order_id, OrderStatus::Paid, OrderStatus::Refunded)
                .await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("request_refund", e))?;
        Ok(order)
    }

    pub async fn settle_refund(&self, order_id: OrderId, approved: bool) -> StoreResult<Order> {
        let mut tx = self.begin().await?;

        if !approved {
            // Rejected refund request: the one backward edge of the graph.
            // The flip write-locks the order row; the unit check below then
            // rolls the flip back if an approved settlement already
            // released the units.
            let order =
                flip_status_in_tx(&mut tx, order_id, OrderStatus::Refunded, OrderStatus::Paid)
                    .await?;
            let unsettled: i64 = sqlx::query(
                "SELECT COUNT(*) AS n FROM records r \
                 JOIN units u ON u.id = r.unit_id \
                 WHERE r.order_id = $1 AND r.deleted = FALSE AND u.status = 'adopted'",
            )
            .bind(order_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("settle_refund", e))?
            .try_get("n")
            .map_err(|e| StoreError::storage(format!("settle_refund: {e}")))?;
            if unsettled != i64::from(order.unit_count) {
                return Err(DomainError::invalid_transition(
                    "refund was already settled, cannot revert to paid",
                )
                .into());
            }
            tx.commit()
                .await
                .map_err(|e| map_sqlx_error("settle_refund", e))?;
            return Ok(order);
        }

        // Conditional self-flip: confirms the order is still Refunded and
        // write-locks its row, so a concurrent rejected settlement taking
        // the Refunded -> Paid back-edge cannot interleave with the unit
        // and counter release below.
        let order =
            flip_status_in_tx(&mut tx, order_id, OrderStatus::Refunded, OrderStatus::Refunded)
                .await?;

        let unit_rows = sqlx::query(
            "SELECT unit_id FROM records WHERE order_id = $1 AND deleted = FALSE",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("settle_refund", e))?;
        let unit_ids: Vec<Uuid> = unit_rows
            .iter()
            .map(|r| r.try_get("unit_id"))
            .collect::<Result<_, _>>()
            .map_err(|e| StoreError::storage(format!("settle_refund: {e}")))?;

        // Only Adopted units come back; a second approval finds them
        // Available and fails here, rolling everything back.
        let released = sqlx::query(
            "UPDATE units SET status = 'available' \
             WHERE id = ANY($1) AND deleted = FALSE AND status = 'adopted'",
        )
        .bind(&unit_ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("settle_refund", e))?
        .rows_affected();
        if released != unit_ids.len() as u64 {
            return Err(DomainError::invalid_transition(
                "some units of this order are no longer releasable",
            )
            .into());
        }

        release_in_tx(&mut tx, order.project_id, order.unit_count).await?;

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("settle_refund", e))?;
        Ok(order)
    }

    pub async fn allocate_units(
        &self,
        project_id: ProjectId,
        count: u32,
    ) -> StoreResult<Vec<UnitId>> {
        let mut tx = self.begin().await?;
        let ids = allocate_in_tx(&mut tx, project_id, count).await?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("allocate_units", e))?;
        Ok(ids)
    }

    pub async fn release_units(&self, unit_ids: &[UnitId]) -> StoreResult<()> {
        let ids: Vec<Uuid> = unit_ids.iter().map(|id| *id.as_uuid()).collect();
        let mut tx = self.begin().await?;

        let released = sqlx::query(
            "UPDATE units SET status = 'available' \
             WHERE id = ANY($1) AND deleted = FALSE AND status = 'adopted'",
        )
        .bind(&ids)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("release_units", e))?
        .rows_affected();
        if released != ids.len() as u64 {
            return Err(DomainError::invalid_transition(
                "only adopted units can be released",
            )
            .into());
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("release_units", e))
    }

    pub async fn advance_units(
        &self,
        unit_ids: &[UnitId],
        from: UnitStatus,
        to: UnitStatus,
    ) -> StoreResult<()> {
        if !from.can_advance_to(to) {
            return Err(DomainError::invalid_transition(format!(
                "units cannot move {from:?} -> {to:?}"
            ))
            .into());
        }
        let ids: Vec<Uuid> = unit_ids.iter().map(|id| *id.as_uuid()).collect();
        let mut tx = self.begin().await?;

        let moved = sqlx::query(
            "UPDATE units SET status = $3 \
             WHERE id = ANY($1) AND deleted = FALSE AND status = $2",
        )
        .bind(&ids)
        .bind(unit_status_str(from))
        .bind(unit_status_str(to))
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("advance_units", e))?
        .rows_affected();
        if moved != ids.len() as u64 {
            return Err(DomainError::invalid_transition(format!(
                "batch advance {from:?} -> {to:?} matched {moved} of {} units",
                ids.len()
            ))
            .into());
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("advance_units", e))
    }

    pub async fn advance_records(
        &self,
        record_ids: &[RecordId],
        target: RecordStatus,
        now: DateTime<Utc>,
        outcome: Option<&HarvestOutcome>,
    ) -> StoreResult<usize> {
        if target == RecordStatus::Harvested && outcome.is_none() {
            return Err(
                DomainError::validation("harvest outcome is required for Harvested").into(),
            );
        }
        let Some(predecessor) = target.prev() else {
            return Err(DomainError::invalid_transition(
                "records cannot be advanced back to Adopted",
            )
            .into());
        };
        let ids: Vec<Uuid> = record_ids.iter().map(|id| *id.as_uuid()).collect();
        let mut tx = self.begin().await?;

        let found: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM records WHERE id = ANY($1) AND deleted = FALSE",
        )
        .bind(&ids)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("advance_records", e))?
        .try_get("n")
        .map_err(|e| StoreError::storage(format!("advance_records: {e}")))?;
        if found != ids.len() as i64 {
            return Err(DomainError::NotFound.into());
        }

        // Records already at the target re-apply as no-ops.
        let noops: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM records \
             WHERE id = ANY($1) AND deleted = FALSE AND status = $2",
        )
        .bind(&ids)
        .bind(record_status_str(target))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("advance_records", e))?
        .try_get("n")
        .map_err(|e| StoreError::storage(format!("advance_records: {e}")))?;

        let advanced = match (target, outcome) {
            (RecordStatus::Planting, _) => sqlx::query(
                "UPDATE records SET status = $2, planting_date = $3 \
                 WHERE id = ANY($1) AND deleted = FALSE AND status = $4",
            )
            .bind(&ids)
            .bind(record_status_str(target))
            .bind(now)
            .bind(record_status_str(predecessor)),
            (RecordStatus::Harvested, Some(h)) => sqlx::query(
                "UPDATE records SET status = $2, harvest_date = $3, actual_yield = $4, \
                 quality_grade = $5 \
                 WHERE id = ANY($1) AND deleted = FALSE AND status = $6",
            )
            .bind(&ids)
            .bind(record_status_str(target))
            .bind(h.harvested_at)
            .bind(h.actual_yield as i64)
            .bind(h.quality_grade.as_str())
            .bind(record_status_str(predecessor)),
            _ => sqlx::query(
                "UPDATE records SET status = $2 \
                 WHERE id = ANY($1) AND deleted = FALSE AND status = $3",
            )
            .bind(&ids)
            .bind(record_status_str(target))
            .bind(record_status_str(predecessor)),
        }
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("advance_records", e))?
        .rows_affected();

        if advanced + noops as u64 != ids.len() as u64 {
            return Err(DomainError::invalid_transition(format!(
                "batch advance to {target:?} matched {advanced} of {} records",
                ids.len()
            ))
            .into());
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("advance_records", e))?;
        Ok(advanced as usize)
    }
}

// ---- transaction helpers ------------------------------------------------

/// The race-safe pool decrement: one conditional UPDATE, never a
/// read-modify-write pair. Zero rows affected is diagnosed into the precise
/// domain error inside the same transaction.
async fn reserve_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    project_id: ProjectId,
    count: u32,
) -> StoreResult<()> {
    let affected = sqlx::query(
        "UPDATE projects SET available_units = available_units - $2 \
         WHERE id = $1 AND deleted = FALSE AND status = 'adopting' \
         AND available_units >= $2",
    )
    .bind(project_id.as_uuid())
    .bind(count as i32)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("reserve_units", e))?
    .rows_affected();

    if affected == 1 {
        return Ok(());
    }

    let row = sqlx::query(
        "SELECT status, available_units FROM projects WHERE id = $1 AND deleted = FALSE",
    )
    .bind(project_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("reserve_units", e))?;

    match row {
        None => Err(DomainError::NotFound.into()),
        Some(r) => {
            let status: String = r
                .try_get("status")
                .map_err(|e| StoreError::storage(format!("reserve_units: {e}")))?;
            if status != "adopting" {
                Err(DomainError::invalid_transition(format!(
                    "project is not open for adoption (status: {status})"
                ))
                .into())
            } else {
                let available: i32 = r
                    .try_get("available_units")
                    .map_err(|e| StoreError::storage(format!("reserve_units: {e}")))?;
                Err(DomainError::insufficient(format!(
                    "requested {count} units, {available} available"
                ))
                .into())
            }
        }
    }
}

async fn release_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    project_id: ProjectId,
    count: u32,
) -> StoreResult<()> {
    let affected = sqlx::query(
        "UPDATE projects SET available_units = available_units + $2 \
         WHERE id = $1 AND deleted = FALSE",
    )
    .bind(project_id.as_uuid())
    .bind(count as i32)
    .execute(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("release_pool", e))?
    .rows_affected();

    if affected == 1 {
        Ok(())
    } else {
        Err(DomainError::NotFound.into())
    }
}

/// Conditional status flip; zero rows affected is diagnosed in the same
/// transaction so the reaper/user race loser sees `InvalidStateTransition`.
async fn flip_status_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    from: OrderStatus,
    to: OrderStatus,
) -> StoreResult<Order> {
    let row = sqlx::query(
        "UPDATE orders SET status = $3 \
         WHERE id = $1 AND deleted = FALSE AND status = $2 RETURNING *",
    )
    .bind(order_id.as_uuid())
    .bind(order_status_str(from))
    .bind(order_status_str(to))
    .fetch_optional(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("flip_status", e))?;

    match row {
        Some(r) => order_from_row(&r),
        None => Err(diagnose_order(tx, order_id, to).await),
    }
}

/// Explain a failed conditional order update: missing row vs. wrong status.
async fn diagnose_order(
    tx: &mut Transaction<'_, Postgres>,
    order_id: OrderId,
    attempted: OrderStatus,
) -> StoreError {
    let row = sqlx::query(
        "SELECT order_no, status FROM orders WHERE id = $1 AND deleted = FALSE",
    )
    .bind(order_id.as_uuid())
    .fetch_optional(&mut **tx)
    .await;

    match row {
        Ok(None) => DomainError::NotFound.into(),
        Ok(Some(r)) => {
            let order_no: String = r.try_get("order_no").unwrap_or_default();
            let status: String = r.try_get("status").unwrap_or_default();
            DomainError::invalid_transition(format!(
                "order {order_no} cannot move {status} -> {attempted:?}"
            ))
            .into()
        }
        Err(e) => map_sqlx_error("diagnose_order", e),
    }
}

/// Allocate `count` Available units of the project, lowest `unit_number`
/// first, and mark them Adopted. Allocation order must be deterministic.
async fn allocate_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    project_id: ProjectId,
    count: u32,
) -> StoreResult<Vec<UnitId>> {
    let rows = sqlx::query(
        "UPDATE units SET status = 'adopted' \
         WHERE id IN ( \
             SELECT id FROM units \
             WHERE project_id = $1 AND deleted = FALSE AND status = 'available' \
             ORDER BY unit_number ASC LIMIT $2 FOR UPDATE \
         ) RETURNING id, unit_number",
    )
    .bind(project_id.as_uuid())
    .bind(count as i64)
    .fetch_all(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("allocate_units", e))?;

    if rows.len() != count as usize {
        return Err(DomainError::insufficient(format!(
            "allocation needs {count} units, {} available",
            rows.len()
        ))
        .into());
    }

    let mut allocated: Vec<(i32, Uuid)> = rows
        .iter()
        .map(|r| Ok((r.try_get("unit_number")?, r.try_get("id")?)))
        .collect::<Result<_, sqlx::Error>>()
        .map_err(|e| StoreError::storage(format!("allocate_units: {e}")))?;
    allocated.sort_by_key(|(n, _)| *n);
    Ok(allocated
        .into_iter()
        .map(|(_, id)| UnitId::from_uuid(id))
        .collect())
}

/// Map SQLx errors to `StoreError::Storage` with the operation name.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => StoreError::storage(format!(
            "database error in {operation}: {} (code: {:?})",
            db_err.message(),
            db_err.code()
        )),
        sqlx::Error::PoolClosed => {
            StoreError::storage(format!("connection pool closed in {operation}"))
        }
        other => StoreError::storage(format!("sqlx error in {operation}: {other}")),
    }
}

// ---- row mapping --------------------------------------------------------

fn project_status_str(status: ProjectStatus) -> &'static str {
    match status {
        ProjectStatus::Preparing => "preparing",
        ProjectStatus::Adopting => "adopting",
        ProjectStatus::Planting => "planting",
        ProjectStatus::Harvesting => "harvesting",
        ProjectStatus::Completed => "completed",
        ProjectStatus::Cancelled => "cancelled",
    }
}

fn project_status_parse(s: &str) -> StoreResult<ProjectStatus> {
    Ok(match s {
        "preparing" => ProjectStatus::Preparing,
        "adopting" => ProjectStatus::Adopting,
        "planting" => ProjectStatus::Planting,
        "harvesting" => ProjectStatus::Harvesting,
        "completed" => ProjectStatus::Completed,
        "cancelled" => ProjectStatus::Cancelled,
        other => return Err(StoreError::storage(format!("unknown project status: {other}"))),
    })
}

fn unit_status_str(status: UnitStatus) -> &'static str {
    match status {
        UnitStatus::Available => "available",
        UnitStatus::Adopted => "adopted",
        UnitStatus::Planting => "planting",
        UnitStatus::AwaitingHarvest => "awaiting_harvest",
        UnitStatus::Harvested => "harvested",
    }
}

fn unit_status_parse(s: &str) -> StoreResult<UnitStatus> {
    Ok(match s {
        "available" => UnitStatus::Available,
        "adopted" => UnitStatus::Adopted,
        "planting" => UnitStatus::Planting,
        "awaiting_harvest" => UnitStatus::AwaitingHarvest,
        "harvested" => UnitStatus::Harvested,
        other => return Err(StoreError::storage(format!("unknown unit status: {other}"))),
    })
}

fn order_status_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Paid => "paid",
        OrderStatus::Completed => "completed",
        OrderStatus::Cancelled => "cancelled",
        OrderStatus::Refunded => "refunded",
    }
}

fn order_status_parse(s: &str) -> StoreResult<OrderStatus> {
    Ok(match s {
        "pending" => OrderStatus::Pending,
        "paid" => OrderStatus::Paid,
        "completed" => OrderStatus::Completed,
        "cancelled" => OrderStatus::Cancelled,
        "refunded" => OrderStatus::Refunded,
        other => return Err(StoreError::storage(format!("unknown order status: {other}"))),
    })
}

fn record_status_str(status: RecordStatus) -> &'static str {
    match status {
        RecordStatus::Adopted => "adopted",
        RecordStatus::Planting => "planting",
        RecordStatus::AwaitingHarvest => "awaiting_harvest",
        RecordStatus::Harvested => "harvested",
        RecordStatus::Completed => "completed",
    }
}

fn record_status_parse(s: &str) -> StoreResult<RecordStatus> {
    Ok(match s {
        "adopted" => RecordStatus::Adopted,
        "planting" => RecordStatus::Planting,
        "awaiting_harvest" => RecordStatus::AwaitingHarvest,
        "harvested" => RecordStatus::Harvested,
        "completed" => RecordStatus::Completed,
        other => return Err(StoreError::storage(format!("unknown record status: {other}"))),
    })
}

fn project_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Project> {
    let status: String = get(row, "status")?;
    Ok(Project {
        id: ProjectId::from_uuid(get(row, "id")?),
        name: get(row, "name")?,
        total_units: get::<i32>(row, "total_units")? as u32,
        available_units: get::<i32>(row, "available_units")? as u32,
        unit_price: get::<i64>(row, "unit_price")? as u64,
        status: project_status_parse(&status)?,
        deleted: get(row, "deleted")?,
        created_at: get(row, "created_at")?,
    })
}

fn unit_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Unit> {
    let status: String = get(row, "status")?;
    Ok(Unit {
        id: UnitId::from_uuid(get(row, "id")?),
        project_id: ProjectId::from_uuid(get(row, "project_id")?),
        unit_number: get::<i32>(row, "unit_number")? as u32,
        row: get::<i32>(row, "grid_row")? as u32,
        column: get::<i32>(row, "grid_column")? as u32,
        status: unit_status_parse(&status)?,
        deleted: get(row, "deleted")?,
    })
}

fn order_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Order> {
    let status: String = get(row, "status")?;
    Ok(Order {
        id: OrderId::from_uuid(get(row, "id")?),
        order_no: get(row, "order_no")?,
        user_id: UserId::from_uuid(get(row, "user_id")?),
        project_id: ProjectId::from_uuid(get(row, "project_id")?),
        unit_count: get::<i32>(row, "unit_count")? as u32,
        unit_price: get::<i64>(row, "unit_price")? as u64,
        total_amount: get::<i64>(row, "total_amount")? as u64,
        discount_amount: get::<i64>(row, "discount_amount")? as u64,
        actual_amount: get::<i64>(row, "actual_amount")? as u64,
        status: order_status_parse(&status)?,
        payment_method: get(row, "payment_method")?,
        payment_no: get(row, "payment_no")?,
        payment_time: get(row, "payment_time")?,
        remark: get(row, "remark")?,
        created_at: get(row, "created_at")?,
        deleted: get(row, "deleted")?,
    })
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> StoreResult<Record> {
    let status: String = get(row, "status")?;
    Ok(Record {
        id: RecordId::from_uuid(get(row, "id")?),
        order_id: OrderId::from_uuid(get(row, "order_id")?),
        user_id: UserId::from_uuid(get(row, "user_id")?),
        project_id: ProjectId::from_uuid(get(row, "project_id")?),
        unit_id: UnitId::from_uuid(get(row, "unit_id")?),
        status: record_status_parse(&status)?,
        adoption_date: get(row, "adoption_date")?,
        planting_date: get(row, "planting_date")?,
        harvest_date: get(row, "harvest_date")?,
        actual_yield: get::<Option<i64>>(row, "actual_yield")?.map(|y| y as u64),
        quality_grade: get(row, "quality_grade")?,
        deleted: get(row, "deleted")?,
    })
}

fn get<'r, T>(row: &'r sqlx::postgres::PgRow, column: &str) -> StoreResult<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(column)
        .map_err(|e| StoreError::storage(format!("failed to read column {column}: {e}")))
}

// Implement the sync AdoptionStore trait.
//
// The trait is synchronous but Postgres operations require async; we use
// tokio::runtime::Handle to run async code in a sync context, exactly when
// called from within a tokio runtime (e.g. from axum handlers on a
// blocking thread).

fn runtime_handle() -> StoreResult<tokio::runtime::Handle> {
    tokio::runtime::Handle::try_current().map_err(|_| {
        StoreError::storage(
            "PostgresAdoptionStore requires a tokio runtime context".to_string(),
        )
    })
}

impl AdoptionStore for PostgresAdoptionStore {
    fn project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        runtime_handle()?.block_on(self.project(id))
    }

    fn order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        runtime_handle()?.block_on(self.order(id))
    }

    fn order_by_no(&self, order_no: &str) -> StoreResult<Option<Order>> {
        runtime_handle()?.block_on(self.order_by_no(order_no))
    }

    fn record(&self, id: RecordId) -> StoreResult<Option<Record>> {
        runtime_handle()?.block_on(self.record(id))
    }

    fn records_for_order(&self, order_id: OrderId) -> StoreResult<Vec<Record>> {
        runtime_handle()?.block_on(self.records_for_order(order_id))
    }

    fn unit(&self, id: UnitId) -> StoreResult<Option<Unit>> {
        runtime_handle()?.block_on(self.unit(id))
    }

    fn units_for_project(&self, project_id: ProjectId) -> StoreResult<Vec<Unit>> {
        runtime_handle()?.block_on(self.units_for_project(project_id))
    }

    fn expired_pending_orders(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Order>> {
        runtime_handle()?.block_on(self.expired_pending_orders(cutoff))
    }

    fn insert_project(&self, project: &Project) -> StoreResult<()> {
        runtime_handle()?.block_on(self.insert_project(project))
    }

    fn insert_units(&self, units: &[Unit]) -> StoreResult<()> {
        runtime_handle()?.block_on(self.insert_units(units))
    }

    fn set_project_status(
        &self,
        project_id: ProjectId,
        from: ProjectStatus,
        to: ProjectStatus,
    ) -> StoreResult<Project> {
        runtime_handle()?.block_on(self.set_project_status(project_id, from, to))
    }

    fn reserve_units(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        runtime_handle()?.block_on(self.reserve_units(project_id, count))
    }

    fn release_pool(&self, project_id: ProjectId, count: u32) -> StoreResult<()> {
        runtime_handle()?.block_on(self.release_pool(project_id, count))
    }

    fn create_order(&self, order: &Order) -> StoreResult<()> {
        runtime_handle()?.block_on(self.create_order(order))
    }

    fn mark_paid(&self, order_id: OrderId, stamp: &PaymentStamp) -> StoreResult<PaidOutcome> {
        runtime_handle()?.block_on(self.mark_paid(order_id, stamp))
    }

    fn cancel_order(&self, order_id: OrderId) -> StoreResult<Order> {
        runtime_handle()?.block_on(self.cancel_order(order_id))
    }

    fn complete_order(&self, order_id: OrderId) -> StoreResult<Order> {
        runtime_handle()?.block_on(self.complete_order(order_id))
    }

    fn request_refund(&self, order_id: OrderId) -> StoreResult<Order> {
        runtime_handle()?.block_on(self.request_refund(order_id))
    }

    fn settle_refund(&self, order_id: OrderId, approved: bool) -> StoreResult<Order> {
        runtime_handle()?.block_on(self.settle_refund(order_id, approved))
    }

    fn allocate_units(&self, project_id: ProjectId, count: u32) -> StoreResult<Vec<UnitId>> {
        runtime_handle()?.block_on(self.allocate_units(project_id, count))
    }

    fn release_units(&self, unit_ids: &[UnitId]) -> StoreResult<()> {
        runtime_handle()?.block_on(self.release_units(unit_ids))
    }

    fn advance_units(
        &self,
        unit_ids: &[UnitId],
        from: UnitStatus,
        to: UnitStatus,
    ) -> StoreResult<()> {
        runtime_handle()?.block_on(self.advance_units(unit_ids, from, to))
    }

    fn advance_records(
        &self,
        record_ids: &[RecordId],
        target: RecordStatus,
        now: DateTime<Utc>,
        outcome: Option<&HarvestOutcome>,
    ) -> StoreResult<usize> {
        runtime_handle()?.block_on(self.advance_records(record_ids, target, now, outcome))
    }
}
