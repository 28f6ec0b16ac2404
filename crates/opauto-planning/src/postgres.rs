//! Planning repository over the ERP planning table (sqlx / Postgres).
//!
//! Tables:
//! - `ad_plan`: planning rows (`nuplan`, `codprod`, `qtdplan`, `dtinc`, `braco`,
//!   `rodada`, `idiproc`, `nrolote`)
//! - `tpriproc`: process instances, where the batch procedure stamps `nrolote`

use std::future::Future;
use std::time::Duration;

use chrono::NaiveDate;
use opauto_core::{BatchId, OrderId, PlanId, PlanningRecord, RunParams};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, error, info, warn};

use crate::config::DatabaseConfig;
use crate::error::{PlanningError, PlanningResult};
use crate::repository::{BoxFuture, DynPlanningRepository, PlanningConnector, PlanningRepository};

const COUNT_PENDING_SQL: &str = r#"
    SELECT COUNT(*)
    FROM ad_plan
    WHERE dtinc::date = $1
      AND braco = $2
      AND rodada BETWEEN $3 AND $4
      AND idiproc IS NULL
"#;

const FETCH_PENDING_SQL: &str = r#"
    SELECT nuplan::int8 AS nuplan, codprod::text AS codprod, qtdplan::numeric AS qtdplan, rodada::int4 AS rodada
    FROM ad_plan
    WHERE dtinc::date = $1
      AND braco = $2
      AND rodada = $3
      AND idiproc IS NULL
    ORDER BY nuplan
"#;

const MARK_ORDER_SQL: &str = r#"
    UPDATE ad_plan
    SET idiproc = $1
    WHERE nuplan = $2
      AND idiproc IS NULL
"#;

const BATCH_PROCEDURE_SQL: &str = "CALL stp_gerar_rodada_vasap_ext($1, $2, NULL)";

const BATCH_LOOKUP_SQL: &str = r#"
    SELECT DISTINCT nrolote::int8
    FROM tpriproc
    WHERE idiproc = ANY($1)
      AND nrolote IS NOT NULL
"#;

const TAG_BATCH_SQL: &str = r#"
    UPDATE ad_plan
    SET nrolote = $1
    WHERE nuplan = ANY($2)
"#;

/// Opens a dedicated pool per unit of work.
pub struct PgConnector {
    config: DatabaseConfig,
}

impl PgConnector {
    pub fn new(config: DatabaseConfig) -> PlanningResult<Self> {
        if config.url.is_empty() {
            return Err(PlanningError::Config(
                "database url is not set (DATABASE_URL)".to_string(),
            ));
        }
        Ok(Self { config })
    }
}

impl PlanningConnector for PgConnector {
    fn connect(&self) -> BoxFuture<'_, PlanningResult<DynPlanningRepository>> {
        Box::pin(async move {
            let repo = PgPlanningRepository::connect(&self.config).await?;
            Ok(std::sync::Arc::new(repo) as DynPlanningRepository)
        })
    }
}

/// Planning repository backed by a Postgres pool.
pub struct PgPlanningRepository {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgPlanningRepository {
    /// Connect to the planning database.
    pub async fn connect(config: &DatabaseConfig) -> PlanningResult<Self> {
        info!(
            max_connections = config.max_connections,
            "Connecting to planning database"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout())
            .connect(&config.url)
            .await?;

        info!("Planning database connection established");
        Ok(Self::from_pool(pool, config.query_timeout()))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Bound a database future by the configured timeout.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> PlanningResult<T>
    where
        F: Future<Output = PlanningResult<T>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                error!(operation, "Database operation timed out");
                Err(PlanningError::Timeout {
                    operation,
                    timeout_ms: self.query_timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn run_batch_transaction(
        &self,
        order_ids: &[OrderId],
        line: i32,
    ) -> PlanningResult<BatchId> {
        let csv = join_ids(order_ids.iter().map(|id| id.get()));
        let raw_ids: Vec<i64> = order_ids.iter().map(|id| id.get()).collect();

        let mut tx = self.pool.begin().await?;

        info!(orders = %csv, line, "Calling batch procedure");
        let message: Option<Option<String>> =
            sqlx::query_scalar::<_, Option<String>>(BATCH_PROCEDURE_SQL)
                .bind(&csv)
                .bind(line)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some(message) = message.flatten().filter(|m| !m.is_empty()) {
            debug!(message = %message, "Batch procedure message");
        }

        let batch_ids: Vec<i64> = sqlx::query_scalar::<_, i64>(BATCH_LOOKUP_SQL)
            .bind(&raw_ids)
            .fetch_all(&mut *tx)
            .await?;

        match batch_ids.as_slice() {
            [batch_id] => {
                tx.commit().await?;
                info!(batch_id, orders = %csv, "Batch consolidated");
                Ok(BatchId::new(*batch_id))
            }
            [] => {
                tx.rollback().await?;
                error!(orders = %csv, "No batch id found after batch procedure, rolled back");
                Err(PlanningError::BatchNotFound { order_ids: csv })
            }
            several => {
                tx.rollback().await?;
                let batch_ids = join_ids(several.iter().copied());
                error!(orders = %csv, batch_ids = %batch_ids, "Orders resolved to several batches, rolled back");
                Err(PlanningError::AmbiguousBatch {
                    order_ids: csv,
                    batch_ids,
                })
            }
        }
    }

    async fn run_tag_transaction(&self, batch_id: BatchId, plan_ids: &[PlanId]) -> PlanningResult<u64> {
        let raw_ids: Vec<i64> = plan_ids.iter().map(|id| id.get()).collect();

        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(TAG_BATCH_SQL)
            .bind(batch_id.get())
            .bind(&raw_ids)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }
}

fn row_to_record(row: &PgRow) -> PlanningResult<PlanningRecord> {
    let plan_id: i64 = row.try_get("nuplan")?;
    let product_code: String = row.try_get("codprod")?;
    let planned_qty: Decimal = row.try_get("qtdplan")?;
    let round: i32 = row.try_get("rodada")?;
    Ok(PlanningRecord::pending(
        PlanId::new(plan_id),
        product_code,
        planned_qty,
        round,
    ))
}

fn join_ids(ids: impl Iterator<Item = i64>) -> String {
    ids.map(|id| id.to_string()).collect::<Vec<_>>().join(",")
}

impl PlanningRepository for PgPlanningRepository {
    fn count_pending(&self, params: RunParams) -> BoxFuture<'_, PlanningResult<u64>> {
        Box::pin(async move {
            let count: i64 = self
                .bounded("count_pending", async {
                    Ok::<_, PlanningError>(sqlx::query_scalar::<_, i64>(COUNT_PENDING_SQL)
                        .bind(params.plan_date)
                        .bind(params.line)
                        .bind(params.round_from)
                        .bind(params.round_to)
                        .fetch_one(&self.pool)
                        .await?)
                })
                .await?;

            debug!(
                plan_date = %params.plan_date,
                line = params.line,
                round_from = params.round_from,
                round_to = params.round_to,
                count,
                "Counted pending planning records"
            );
            Ok(count.max(0) as u64)
        })
    }

    fn fetch_pending(
        &self,
        plan_date: NaiveDate,
        line: i32,
        round: i32,
    ) -> BoxFuture<'_, PlanningResult<Vec<PlanningRecord>>> {
        Box::pin(async move {
            let rows = self
                .bounded("fetch_pending", async {
                    Ok::<_, PlanningError>(sqlx::query(FETCH_PENDING_SQL)
                        .bind(plan_date)
                        .bind(line)
                        .bind(round)
                        .fetch_all(&self.pool)
                        .await?)
                })
                .await?;

            let records = rows
                .iter()
                .map(row_to_record)
                .collect::<PlanningResult<Vec<_>>>()?;

            info!(round, count = records.len(), "Fetched pending planning records");
            Ok(records)
        })
    }

    fn mark_order_created(
        &self,
        plan_id: PlanId,
        order_id: OrderId,
    ) -> BoxFuture<'_, PlanningResult<bool>> {
        Box::pin(async move {
            let result = self
                .bounded("mark_order_created", async {
                    Ok::<_, PlanningError>(sqlx::query(MARK_ORDER_SQL)
                        .bind(order_id.get())
                        .bind(plan_id.get())
                        .execute(&self.pool)
                        .await?)
                })
                .await?;

            let updated = result.rows_affected() == 1;
            if updated {
                info!(%plan_id, %order_id, "Order id written to planning record");
            } else {
                warn!(
                    %plan_id,
                    %order_id,
                    rows = result.rows_affected(),
                    "Planning record not updated"
                );
            }
            Ok(updated)
        })
    }

    fn consolidate_batch<'a>(
        &'a self,
        order_ids: &'a [OrderId],
        line: i32,
    ) -> BoxFuture<'a, PlanningResult<BatchId>> {
        Box::pin(async move {
            if order_ids.is_empty() {
                warn!("No orders to consolidate, batch procedure not called");
                return Err(PlanningError::EmptyOrderSet);
            }
            self.bounded("consolidate_batch", self.run_batch_transaction(order_ids, line))
                .await
        })
    }

    fn tag_records_with_batch<'a>(
        &'a self,
        batch_id: BatchId,
        plan_ids: &'a [PlanId],
    ) -> BoxFuture<'a, PlanningResult<bool>> {
        Box::pin(async move {
            if plan_ids.is_empty() {
                return Ok(false);
            }
            let rows = self
                .bounded(
                    "tag_records_with_batch",
                    self.run_tag_transaction(batch_id, plan_ids),
                )
                .await?;

            info!(%batch_id, rows, "Planning records tagged with batch");
            Ok(rows > 0)
        })
    }

    fn ping(&self) -> BoxFuture<'_, PlanningResult<()>> {
        Box::pin(async move {
            let one: i32 = self
                .bounded("ping", async {
                    Ok::<_, PlanningError>(
                        sqlx::query_scalar::<_, i32>("SELECT 1")
                            .fetch_one(&self.pool)
                            .await?,
                    )
                })
                .await?;
            if one == 1 {
                Ok(())
            } else {
                Err(PlanningError::Unavailable(format!(
                    "probe returned {one} instead of 1"
                )))
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.pool.close().await;
            info!("Planning database connection closed");
        })
    }
}
