//! PostgreSQL reconciliation repository.
//!
//! The unique index on `run_lock` guarantees a single unfinished
//! reconciliation per cluster even when several schedulers race. Operation
//! state changes are conditional updates on the expected prior state.

use crate::filter::{Filter, SqlArgs, SqlValue};
use crate::model::{check_transition, join_reasons, new_reconciliation};
use crate::processable::find_processable_operations;
use crate::traits::ReconciliationRepository;
use crate::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use convoy_types::{
    ClusterState, ClusterStatus, CorrelationId, Operation, OperationState, OperationType,
    Reconciliation, RuntimeId, SchedulingId, SequenceConfig,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use uuid::Uuid;

const RECONCILIATION_COLUMNS: &str = "scheduling_id, runtime_id, cluster_config_version, \
     cluster_config_status_id, run_lock, finished, status, delete_strategy, created, updated";

const OPERATION_COLUMNS: &str = "scheduling_id, correlation_id, runtime_id, \
     cluster_config_version, component, priority, kind, state, reason, created, updated";

/// PostgreSQL-backed reconciliation repository.
#[derive(Clone)]
pub struct PostgresReconciliationRepository {
    pool: PgPool,
}

impl PostgresReconciliationRepository {
    /// Connect to PostgreSQL and initialize required schema.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with_options(database_url, 10, 5).await
    }

    /// Connect with explicit pool parameters.
    pub async fn connect_with_options(
        database_url: &str,
        max_connections: u32,
        connect_timeout_secs: u64,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(connect_timeout_secs))
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("failed to connect postgres: {e}")))?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Create repository from an existing pool.
    pub async fn from_pool(pool: PgPool) -> StoreResult<Self> {
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the migrations embedded from `migrations/`.
    async fn init_schema(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Backend(format!("schema migration failed: {e}")))?;
        tracing::debug!("Reconciliation schema is up to date");
        Ok(())
    }

    async fn find_operation(
        &self,
        scheduling_id: &SchedulingId,
        correlation_id: &CorrelationId,
    ) -> StoreResult<Option<Operation>> {
        let sql = format!(
            "SELECT {OPERATION_COLUMNS} FROM convoy_operations WHERE scheduling_id = $1 AND correlation_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(*scheduling_id.as_uuid())
            .bind(*correlation_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.as_ref().map(operation_from_row).transpose()
    }
}

#[async_trait]
impl ReconciliationRepository for PostgresReconciliationRepository {
    async fn create_reconciliation(
        &self,
        state: &ClusterState,
        cfg: &SequenceConfig,
    ) -> StoreResult<Reconciliation> {
        let (reconciliation, operations) = new_reconciliation(state, cfg)?;

        let mut tx = self.pool.begin().await.map_err(backend)?;

        let running: Option<Uuid> = sqlx::query_scalar(
            "SELECT scheduling_id FROM convoy_reconciliations WHERE runtime_id = $1 AND finished = FALSE LIMIT 1",
        )
        .bind(reconciliation.runtime_id.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(backend)?;
        if running.is_some() {
            return Err(StoreError::DuplicateReconciliation(
                reconciliation.runtime_id.clone(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO convoy_reconciliations
                (scheduling_id, runtime_id, cluster_config_version, cluster_config_status_id, run_lock, finished, status, delete_strategy, created, updated)
            VALUES ($1, $2, $3, $4, $5, FALSE, $6, $7, $8, $8)
            "#,
        )
        .bind(*reconciliation.scheduling_id.as_uuid())
        .bind(reconciliation.runtime_id.as_str())
        .bind(reconciliation.cluster_config_version)
        .bind(reconciliation.cluster_config_status_id)
        .bind(reconciliation.lock.as_str())
        .bind(reconciliation.status.as_str())
        .bind(reconciliation.delete_strategy.as_str())
        .bind(reconciliation.created)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_lock_conflict(e, &reconciliation.runtime_id))?;

        for op in &operations {
            sqlx::query(
                r#"
                INSERT INTO convoy_operations
                    (scheduling_id, correlation_id, runtime_id, cluster_config_version, component, priority, kind, state, reason, created, updated)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
                "#,
            )
            .bind(*op.scheduling_id.as_uuid())
            .bind(*op.correlation_id.as_uuid())
            .bind(op.runtime_id.as_str())
            .bind(op.cluster_config_version)
            .bind(op.component.as_str())
            .bind(op.priority)
            .bind(op.kind.as_str())
            .bind(op.state.as_str())
            .bind(op.reason.as_str())
            .bind(op.created)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        }

        tx.commit().await.map_err(backend)?;

        tracing::debug!(
            scheduling_id = %reconciliation.scheduling_id,
            runtime_id = %reconciliation.runtime_id,
            operations = operations.len(),
            "Reconciliation persisted"
        );
        Ok(reconciliation)
    }

    async fn get_reconciliation(
        &self,
        scheduling_id: &SchedulingId,
    ) -> StoreResult<Reconciliation> {
        let sql = format!(
            "SELECT {RECONCILIATION_COLUMNS} FROM convoy_reconciliations WHERE scheduling_id = $1"
        );
        let row = sqlx::query(&sql)
            .bind(*scheduling_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
            .ok_or_else(|| StoreError::NotFound(format!("reconciliation {scheduling_id}")))?;
        reconciliation_from_row(&row)
    }

    async fn get_reconciliations(&self, filter: &dyn Filter) -> StoreResult<Vec<Reconciliation>> {
        let mut args = SqlArgs::new();
        let condition = filter.sql_condition(&mut args);
        let sql = format!(
            "SELECT {RECONCILIATION_COLUMNS} FROM convoy_reconciliations WHERE {condition} ORDER BY created ASC, scheduling_id ASC"
        );

        let mut query = sqlx::query(&sql);
        for value in args.into_values() {
            query = match value {
                SqlValue::Text(v) => query.bind(v),
                SqlValue::TextArray(v) => query.bind(v),
                SqlValue::Uuid(v) => query.bind(v),
                SqlValue::Bool(v) => query.bind(v),
                SqlValue::Timestamp(v) => query.bind(v),
            };
        }

        let rows = query.fetch_all(&self.pool).await.map_err(backend)?;
        rows.iter().map(reconciliation_from_row).collect()
    }

    async fn finish_reconciliation(
        &self,
        scheduling_id: &SchedulingId,
        status: ClusterStatus,
    ) -> StoreResult<Reconciliation> {
        let sql = format!(
            r#"
            UPDATE convoy_reconciliations
               SET finished = TRUE,
                   run_lock = NULL,
                   status = $1,
                   updated = $2
             WHERE scheduling_id = $3
               AND finished = FALSE
            RETURNING {RECONCILIATION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(*scheduling_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => reconciliation_from_row(&row),
            None => {
                // distinguish unknown from already finished
                self.get_reconciliation(scheduling_id).await?;
                Err(StoreError::AlreadyFinished(*scheduling_id))
            }
        }
    }

    async fn remove_reconciliation(&self, scheduling_id: &SchedulingId) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        sqlx::query("DELETE FROM convoy_operations WHERE scheduling_id = $1")
            .bind(*scheduling_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        sqlx::query("DELETE FROM convoy_reconciliations WHERE scheduling_id = $1")
            .bind(*scheduling_id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)
    }

    async fn get_runtime_ids(&self) -> StoreResult<Vec<RuntimeId>> {
        let ids: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT runtime_id FROM convoy_reconciliations ORDER BY runtime_id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(ids.into_iter().map(RuntimeId::from).collect())
    }

    async fn get_operations(
        &self,
        scheduling_id: &SchedulingId,
        states: &[OperationState],
    ) -> StoreResult<Vec<Operation>> {
        let rows = if states.is_empty() {
            let sql = format!(
                "SELECT {OPERATION_COLUMNS} FROM convoy_operations WHERE scheduling_id = $1 ORDER BY priority ASC, created ASC"
            );
            sqlx::query(&sql)
                .bind(*scheduling_id.as_uuid())
                .fetch_all(&self.pool)
                .await
        } else {
            let sql = format!(
                "SELECT {OPERATION_COLUMNS} FROM convoy_operations WHERE scheduling_id = $1 AND state = ANY($2) ORDER BY priority ASC, created ASC"
            );
            let states: Vec<String> = states.iter().map(|s| s.as_str().to_string()).collect();
            sqlx::query(&sql)
                .bind(*scheduling_id.as_uuid())
                .bind(states)
                .fetch_all(&self.pool)
                .await
        }
        .map_err(backend)?;

        rows.iter().map(operation_from_row).collect()
    }

    async fn get_operation(
        &self,
        scheduling_id: &SchedulingId,
        correlation_id: &CorrelationId,
    ) -> StoreResult<Option<Operation>> {
        self.find_operation(scheduling_id, correlation_id).await
    }

    async fn get_processable_operations(
        &self,
        max_parallel: usize,
    ) -> StoreResult<Vec<Operation>> {
        let operations = self.get_reconciling_operations().await?;
        Ok(find_processable_operations(operations, max_parallel))
    }

    async fn get_reconciling_operations(&self) -> StoreResult<Vec<Operation>> {
        let sql = format!(
            r#"
            SELECT {OPERATION_COLUMNS}
              FROM convoy_operations
             WHERE scheduling_id IN (
                   SELECT scheduling_id FROM convoy_reconciliations WHERE finished = FALSE
             )
             ORDER BY created ASC, priority ASC
            "#
        );
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.iter().map(operation_from_row).collect()
    }

    async fn compare_and_swap_operation_state(
        &self,
        scheduling_id: &SchedulingId,
        correlation_id: &CorrelationId,
        expected: OperationState,
        state: OperationState,
        reasons: &[String],
    ) -> StoreResult<Operation> {
        let reason = join_reasons(reasons);
        check_transition(correlation_id, expected, state, &reason)?;

        let sql = format!(
            r#"
            UPDATE convoy_operations
               SET state = $1,
                   reason = $2,
                   updated = $3
             WHERE scheduling_id = $4
               AND correlation_id = $5
               AND state = $6
            RETURNING {OPERATION_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(state.as_str())
            .bind(reason.as_str())
            .bind(Utc::now())
            .bind(*scheduling_id.as_uuid())
            .bind(*correlation_id.as_uuid())
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        if let Some(row) = row {
            return operation_from_row(&row);
        }

        match self.find_operation(scheduling_id, correlation_id).await? {
            None => Err(StoreError::NotFound(format!(
                "operation {correlation_id} of reconciliation {scheduling_id}"
            ))),
            Some(current) if current.state.is_final() => Err(StoreError::FinalState {
                correlation_id: *correlation_id,
                state: current.state,
            }),
            Some(current) => Err(StoreError::Concurrency(format!(
                "operation {correlation_id} is in state {} but {expected} was expected",
                current.state
            ))),
        }
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn map_lock_conflict(err: sqlx::Error, runtime_id: &RuntimeId) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            return StoreError::DuplicateReconciliation(runtime_id.clone());
        }
    }
    StoreError::Backend(err.to_string())
}

fn reconciliation_from_row(row: &PgRow) -> StoreResult<Reconciliation> {
    let status: String = row.try_get("status").map_err(backend)?;
    let lock: Option<String> = row.try_get("run_lock").map_err(backend)?;
    let scheduling_id: Uuid = row.try_get("scheduling_id").map_err(backend)?;
    let runtime_id: String = row.try_get("runtime_id").map_err(backend)?;
    let created: DateTime<Utc> = row.try_get("created").map_err(backend)?;
    let updated: DateTime<Utc> = row.try_get("updated").map_err(backend)?;

    Ok(Reconciliation {
        scheduling_id: SchedulingId::from_uuid(scheduling_id),
        runtime_id: RuntimeId::from(runtime_id),
        cluster_config_version: row.try_get("cluster_config_version").map_err(backend)?,
        cluster_config_status_id: row.try_get("cluster_config_status_id").map_err(backend)?,
        lock: lock.unwrap_or_default(),
        finished: row.try_get("finished").map_err(backend)?,
        status: status
            .parse()
            .map_err(|e: convoy_types::TypeError| StoreError::Serialization(e.to_string()))?,
        delete_strategy: row.try_get("delete_strategy").map_err(backend)?,
        created,
        updated,
    })
}

fn operation_from_row(row: &PgRow) -> StoreResult<Operation> {
    let scheduling_id: Uuid = row.try_get("scheduling_id").map_err(backend)?;
    let correlation_id: Uuid = row.try_get("correlation_id").map_err(backend)?;
    let runtime_id: String = row.try_get("runtime_id").map_err(backend)?;
    let kind: String = row.try_get("kind").map_err(backend)?;
    let state: String = row.try_get("state").map_err(backend)?;

    Ok(Operation {
        scheduling_id: SchedulingId::from_uuid(scheduling_id),
        correlation_id: CorrelationId::from_uuid(correlation_id),
        runtime_id: RuntimeId::from(runtime_id),
        cluster_config_version: row.try_get("cluster_config_version").map_err(backend)?,
        component: row.try_get("component").map_err(backend)?,
        priority: row.try_get("priority").map_err(backend)?,
        kind: kind
            .parse::<OperationType>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        state: state
            .parse::<OperationState>()
            .map_err(|e| StoreError::Serialization(e.to_string()))?,
        reason: row.try_get("reason").map_err(backend)?,
        created: row.try_get("created").map_err(backend)?,
        updated: row.try_get("updated").map_err(backend)?,
    })
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_embedded_schema_covers_repository_columns() {
        let migrator = sqlx::migrate!("./migrations");
        assert_eq!(migrator.migrations.len(), 1);

        let schema = &migrator.migrations[0].sql;
        for column in super::RECONCILIATION_COLUMNS
            .split(',')
            .chain(super::OPERATION_COLUMNS.split(','))
        {
            assert!(schema.contains(column.trim()), "missing column {}", column.trim());
        }
    }
}
