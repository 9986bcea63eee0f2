use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};

use permitdesk_core::domain::approval::PermitApproval;
use permitdesk_core::domain::permit::{
    PermitFilter, PermitId, PermitRequest, PermitStatus, PermitStatusCounts, Priority, WorkType,
};
use permitdesk_core::domain::user::UserId;
use permitdesk_core::encoding::{decode_list, encode_list};

use super::{like_pattern, parse_timestamp, PageRequest, Paged, PermitRepository, RepositoryError};
use crate::DbPool;

const PERMIT_COLUMNS: &str = "id, title, description, location, work_type, start_date, end_date,
    status, priority, hazards, precautions, equipment, created_by, company_name, contractor_name,
    contractor_phone, workers, safety_checklist, created_at, updated_at";

pub struct SqlPermitRepository {
    pool: DbPool,
}

impl SqlPermitRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_permit(row: &SqliteRow) -> Result<PermitRequest, RepositoryError> {
    let work_type: String = row.try_get("work_type")?;
    let status: String = row.try_get("status")?;
    let priority: String = row.try_get("priority")?;
    let start_date: String = row.try_get("start_date")?;
    let end_date: String = row.try_get("end_date")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;
    let hazards: Option<String> = row.try_get("hazards")?;
    let precautions: Option<String> = row.try_get("precautions")?;
    let equipment: Option<String> = row.try_get("equipment")?;
    let workers: Option<String> = row.try_get("workers")?;
    let safety_checklist: Option<String> = row.try_get("safety_checklist")?;

    Ok(PermitRequest {
        id: PermitId(row.try_get("id")?),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        location: row.try_get("location")?,
        work_type: WorkType::parse(&work_type)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown work type `{work_type}`")))?,
        start_date: parse_timestamp(&start_date),
        end_date: parse_timestamp(&end_date),
        status: PermitStatus::parse(&status)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown permit status `{status}`")))?,
        priority: Priority::parse(&priority).unwrap_or_default(),
        hazards: decode_list(hazards.as_deref()),
        precautions: decode_list(precautions.as_deref()),
        equipment: decode_list(equipment.as_deref()),
        created_by: UserId(row.try_get("created_by")?),
        company_name: row.try_get("company_name")?,
        contractor_name: row.try_get("contractor_name")?,
        contractor_phone: row.try_get("contractor_phone")?,
        workers: decode_list(workers.as_deref()),
        safety_checklist: decode_list(safety_checklist.as_deref()),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn push_permit_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &PermitFilter) {
    builder.push(" WHERE 1=1");
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(work_type) = filter.work_type {
        builder.push(" AND work_type = ").push_bind(work_type.as_str());
    }
    if let Some(priority) = filter.priority {
        builder.push(" AND priority = ").push_bind(priority.as_str());
    }
    if let Some(created_by) = &filter.created_by {
        builder.push(" AND created_by = ").push_bind(created_by.0.clone());
    }
    if let Some(search) = filter.search.as_deref().filter(|term| !term.trim().is_empty()) {
        let pattern = like_pattern(search);
        builder
            .push(" AND (LOWER(title) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(description, '')) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(COALESCE(location, '')) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait::async_trait]
impl PermitRepository for SqlPermitRepository {
    async fn create_with_approval(
        &self,
        permit: &PermitRequest,
        approval: &PermitApproval,
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO permit_requests (id, title, description, location, work_type, start_date,
                                          end_date, status, priority, hazards, precautions,
                                          equipment, created_by, company_name, contractor_name,
                                          contractor_phone, workers, safety_checklist,
                                          created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&permit.id.0)
        .bind(&permit.title)
        .bind(&permit.description)
        .bind(&permit.location)
        .bind(permit.work_type.as_str())
        .bind(permit.start_date.to_rfc3339())
        .bind(permit.end_date.to_rfc3339())
        .bind(permit.status.as_str())
        .bind(permit.priority.as_str())
        .bind(encode_list(&permit.hazards))
        .bind(encode_list(&permit.precautions))
        .bind(encode_list(&permit.equipment))
        .bind(&permit.created_by.0)
        .bind(&permit.company_name)
        .bind(&permit.contractor_name)
        .bind(&permit.contractor_phone)
        .bind(encode_list(&permit.workers))
        .bind(encode_list(&permit.safety_checklist))
        .bind(permit.created_at.to_rfc3339())
        .bind(permit.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO permit_approvals (id, permit_id, approver_role, approver_id, approver_name,
                                           decision, comment, signature, approved_at, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&approval.id.0)
        .bind(&approval.permit_id.0)
        .bind(approval.approver_role.as_str())
        .bind(approval.approver_id.as_ref().map(|id| id.0.as_str()))
        .bind(&approval.approver_name)
        .bind(approval.decision.as_str())
        .bind(&approval.comment)
        .bind(&approval.signature)
        .bind(approval.approved_at.map(|at| at.to_rfc3339()))
        .bind(approval.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &PermitId) -> Result<Option<PermitRequest>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {PERMIT_COLUMNS} FROM permit_requests WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(row_to_permit).transpose()
    }

    async fn list(
        &self,
        filter: &PermitFilter,
        page: PageRequest,
    ) -> Result<Paged<PermitRequest>, RepositoryError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM permit_requests");
        push_permit_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Sqlite>::new(format!("SELECT {PERMIT_COLUMNS} FROM permit_requests"));
        push_permit_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        let items = rows.iter().map(row_to_permit).collect::<Result<Vec<_>, _>>()?;
        Ok(Paged { items, total, page })
    }

    /// Writes every editable column. Status changes go through the approval decision path.
    async fn update(&self, permit: &PermitRequest) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE permit_requests SET
                 title = ?, description = ?, location = ?, work_type = ?, start_date = ?,
                 end_date = ?, priority = ?, hazards = ?, precautions = ?, equipment = ?,
                 company_name = ?, contractor_name = ?, contractor_phone = ?, workers = ?,
                 safety_checklist = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&permit.title)
        .bind(&permit.description)
        .bind(&permit.location)
        .bind(permit.work_type.as_str())
        .bind(permit.start_date.to_rfc3339())
        .bind(permit.end_date.to_rfc3339())
        .bind(permit.priority.as_str())
        .bind(encode_list(&permit.hazards))
        .bind(encode_list(&permit.precautions))
        .bind(encode_list(&permit.equipment))
        .bind(&permit.company_name)
        .bind(&permit.contractor_name)
        .bind(&permit.contractor_phone)
        .bind(encode_list(&permit.workers))
        .bind(encode_list(&permit.safety_checklist))
        .bind(permit.updated_at.to_rfc3339())
        .bind(&permit.id.0)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound("Permit".to_string()));
        }
        Ok(())
    }

    async fn delete(&self, id: &PermitId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM permit_requests WHERE id = ?")
            .bind(&id.0)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn status_counts(
        &self,
        created_by: Option<&UserId>,
    ) -> Result<PermitStatusCounts, RepositoryError> {
        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT status, COUNT(*) AS count FROM permit_requests");
        if let Some(created_by) = created_by {
            builder.push(" WHERE created_by = ").push_bind(created_by.0.clone());
        }
        builder.push(" GROUP BY status");
        let rows = builder.build().fetch_all(&self.pool).await?;

        let mut counts = PermitStatusCounts::default();
        for row in &rows {
            let status: String = row.try_get("status")?;
            let count: i64 = row.try_get("count")?;
            if let Some(status) = PermitStatus::parse(&status) {
                counts.record(status, count);
            }
        }
        Ok(counts)
    }
}
