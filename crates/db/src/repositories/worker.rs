use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use permitdesk_core::domain::permit::PermitId;
use permitdesk_core::domain::worker::{Worker, WorkerId};

use super::{parse_timestamp, RepositoryError, WorkerRepository};
use crate::DbPool;

pub struct SqlWorkerRepository {
    pool: DbPool,
}

impl SqlWorkerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_worker(row: &SqliteRow) -> Result<Worker, RepositoryError> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Worker {
        id: WorkerId(row.try_get("id")?),
        permit_id: PermitId(row.try_get("permit_id")?),
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        company: row.try_get("company")?,
        trade: row.try_get("trade")?,
        badge_number: row.try_get("badge_number")?,
        created_at: parse_timestamp(&created_at),
    })
}

#[async_trait::async_trait]
impl WorkerRepository for SqlWorkerRepository {
    async fn insert(&self, worker: &Worker) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO workers
                 (id, permit_id, name, phone, company, trade, badge_number, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&worker.id.0)
        .bind(&worker.permit_id.0)
        .bind(&worker.name)
        .bind(&worker.phone)
        .bind(&worker.company)
        .bind(&worker.trade)
        .bind(&worker.badge_number)
        .bind(worker.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_permit(&self, permit_id: &PermitId) -> Result<Vec<Worker>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, permit_id, name, phone, company, trade, badge_number, created_at
             FROM workers WHERE permit_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(&permit_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_worker).collect()
    }
}
