use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use permitdesk_core::domain::approval::{
    ApprovalFilter, ApprovalId, ApprovalStats, Decision, DecisionRecord, PermitApproval,
};
use permitdesk_core::domain::permit::PermitId;
use permitdesk_core::domain::role::RoleName;
use permitdesk_core::domain::user::UserId;

use super::{
    parse_optional_timestamp, parse_timestamp, ApprovalRepository, PageRequest, Paged,
    RepositoryError,
};
use crate::DbPool;

const APPROVAL_COLUMNS: &str = "id, permit_id, approver_role, approver_id, approver_name, decision,
    comment, signature, approved_at, created_at";

pub struct SqlApprovalRepository {
    pool: DbPool,
}

impl SqlApprovalRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_approval(row: &SqliteRow) -> Result<PermitApproval, RepositoryError> {
    let approver_role: String = row.try_get("approver_role")?;
    let approver_id: Option<String> = row.try_get("approver_id")?;
    let decision: String = row.try_get("decision")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(PermitApproval {
        id: ApprovalId(row.try_get("id")?),
        permit_id: PermitId(row.try_get("permit_id")?),
        approver_role: RoleName::parse(&approver_role).ok_or_else(|| {
            RepositoryError::Decode(format!("unknown approver role `{approver_role}`"))
        })?,
        approver_id: approver_id.map(UserId),
        approver_name: row.try_get("approver_name")?,
        decision: Decision::parse(&decision)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown decision `{decision}`")))?,
        comment: row.try_get("comment")?,
        signature: row.try_get("signature")?,
        approved_at: parse_optional_timestamp(row.try_get("approved_at")?),
        created_at: parse_timestamp(&created_at),
    })
}

fn push_approval_filters(builder: &mut QueryBuilder<'_, Sqlite>, filter: &ApprovalFilter) {
    builder.push(" WHERE 1=1");
    if let Some(decision) = filter.decision {
        builder.push(" AND decision = ").push_bind(decision.as_str());
    }
    if let Some(permit_id) = &filter.permit_id {
        builder.push(" AND permit_id = ").push_bind(permit_id.0.clone());
    }
}

#[async_trait::async_trait]
impl ApprovalRepository for SqlApprovalRepository {
    async fn find_by_id(&self, id: &ApprovalId) -> Result<Option<PermitApproval>, RepositoryError> {
        let row =
            sqlx::query(&format!("SELECT {APPROVAL_COLUMNS} FROM permit_approvals WHERE id = ?"))
                .bind(&id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.as_ref().map(row_to_approval).transpose()
    }

    async fn list_for_permit(
        &self,
        permit_id: &PermitId,
    ) -> Result<Vec<PermitApproval>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM permit_approvals
             WHERE permit_id = ? ORDER BY created_at ASC, id ASC"
        ))
        .bind(&permit_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_approval).collect()
    }

    async fn list(
        &self,
        filter: &ApprovalFilter,
        page: PageRequest,
    ) -> Result<Paged<PermitApproval>, RepositoryError> {
        let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM permit_approvals");
        push_approval_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Sqlite>::new(format!("SELECT {APPROVAL_COLUMNS} FROM permit_approvals"));
        push_approval_filters(&mut select, filter);
        select
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset());
        let rows = select.build().fetch_all(&self.pool).await?;

        let items = rows.iter().map(row_to_approval).collect::<Result<Vec<_>, _>>()?;
        Ok(Paged { items, total, page })
    }

    /// Records the decision and mirrors it onto the permit in one transaction. The update is
    /// conditional on `decision = 'PENDING'`, so of two racing callers exactly one wins.
    async fn decide(
        &self,
        id: &ApprovalId,
        record: &DecisionRecord,
    ) -> Result<PermitApproval, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let permit_id: Option<String> =
            sqlx::query_scalar("SELECT permit_id FROM permit_approvals WHERE id = ?")
                .bind(&id.0)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(permit_id) = permit_id else {
            return Err(RepositoryError::NotFound("Approval".to_string()));
        };

        let decided_at = record.decided_at.to_rfc3339();
        let updated = sqlx::query(
            "UPDATE permit_approvals SET
                 decision = ?, approver_id = ?, approver_name = ?, comment = ?, signature = ?,
                 approved_at = ?
             WHERE id = ? AND decision = 'PENDING'",
        )
        .bind(record.decision.as_str())
        .bind(&record.approver_id.0)
        .bind(&record.approver_name)
        .bind(&record.comment)
        .bind(&record.signature)
        .bind(&decided_at)
        .bind(&id.0)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            debug!(
                event_name = "db.approval.decide_conflict",
                approval_id = %id.0,
                "approval was already decided"
            );
            return Err(RepositoryError::Conflict("Approval already processed".to_string()));
        }

        sqlx::query("UPDATE permit_requests SET status = ?, updated_at = ? WHERE id = ?")
            .bind(record.decision.as_permit_status().as_str())
            .bind(&decided_at)
            .bind(&permit_id)
            .execute(&mut *tx)
            .await?;

        let row =
            sqlx::query(&format!("SELECT {APPROVAL_COLUMNS} FROM permit_approvals WHERE id = ?"))
                .bind(&id.0)
                .fetch_one(&mut *tx)
                .await?;
        let approval = row_to_approval(&row)?;

        tx.commit().await?;
        Ok(approval)
    }

    async fn pending_count(&self) -> Result<i64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM permit_approvals WHERE decision = 'PENDING'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn stats(&self) -> Result<ApprovalStats, RepositoryError> {
        let rows = sqlx::query(
            "SELECT decision, COUNT(*) AS count FROM permit_approvals GROUP BY decision",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut stats = ApprovalStats::default();
        for row in &rows {
            let decision: String = row.try_get("decision")?;
            if let Some(decision) = Decision::parse(&decision) {
                stats.record(decision, row.try_get("count")?);
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use permitdesk_core::domain::approval::{
        ApprovalFilter, Decision, DecisionRecord, PermitApproval,
    };
    use permitdesk_core::domain::permit::{
        PermitDraft, PermitRequest, PermitStatus, Priority, WorkType,
    };
    use permitdesk_core::domain::role::RoleName;
    use permitdesk_core::domain::user::User;

    use super::SqlApprovalRepository;
    use crate::repositories::test_support::{pool, seeded_user};
    use crate::repositories::{
        ApprovalRepository, PageRequest, PermitRepository, RepositoryError, SqlPermitRepository,
    };
    use crate::DbPool;

    async fn pending_permit(pool: &DbPool, owner: &User) -> (PermitRequest, PermitApproval) {
        let now = Utc::now();
        let permit = PermitDraft {
            title: "Tank entry".to_string(),
            description: None,
            location: None,
            work_type: WorkType::ConfinedSpace,
            start_date: now,
            end_date: now + Duration::hours(8),
            priority: Priority::Critical,
            hazards: Vec::new(),
            precautions: Vec::new(),
            equipment: Vec::new(),
            company_name: None,
            contractor_name: None,
            contractor_phone: None,
            workers: Vec::new(),
            safety_checklist: Vec::new(),
        }
        .into_permit(owner.id.clone(), now);
        let approval = PermitApproval::pending_for(permit.id.clone(), now);
        SqlPermitRepository::new(pool.clone())
            .create_with_approval(&permit, &approval)
            .await
            .expect("create permit");
        (permit, approval)
    }

    fn record(officer: &User, decision: Decision) -> DecisionRecord {
        DecisionRecord {
            decision,
            approver_id: officer.id.clone(),
            approver_name: officer.full_name(),
            comment: Some("ok".to_string()),
            signature: None,
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn decide_mirrors_decision_onto_permit_exactly_once() {
        let pool = pool().await;
        let owner = seeded_user(&pool, "req@example.com", RoleName::Requestor).await;
        let officer = seeded_user(&pool, "so@example.com", RoleName::SafetyOfficer).await;
        let (permit, approval) = pending_permit(&pool, &owner).await;
        let repo = SqlApprovalRepository::new(pool.clone());

        let decided = repo.decide(&approval.id, &record(&officer, Decision::Approved)).await;
        let decided = decided.expect("first decide");
        assert_eq!(decided.decision, Decision::Approved);
        assert_eq!(decided.approver_name.as_deref(), Some("Test User"));
        assert_eq!(decided.comment.as_deref(), Some("ok"));
        assert!(decided.approved_at.is_some());

        let stored = SqlPermitRepository::new(pool)
            .find_by_id(&permit.id)
            .await
            .expect("find")
            .expect("exists");
        assert_eq!(stored.status, PermitStatus::Approved);

        let second = repo.decide(&approval.id, &record(&officer, Decision::Rejected)).await;
        assert!(matches!(
            second,
            Err(RepositoryError::Conflict(ref message)) if message == "Approval already processed"
        ));
    }

    #[tokio::test]
    async fn decide_unknown_approval_is_not_found() {
        let pool = pool().await;
        let officer = seeded_user(&pool, "so@example.com", RoleName::SafetyOfficer).await;
        let repo = SqlApprovalRepository::new(pool);

        let missing = permitdesk_core::domain::approval::ApprovalId("nope".to_string());
        assert!(matches!(
            repo.decide(&missing, &record(&officer, Decision::Approved)).await,
            Err(RepositoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn counts_and_filters_follow_decisions() {
        let pool = pool().await;
        let owner = seeded_user(&pool, "req@example.com", RoleName::Requestor).await;
        let officer = seeded_user(&pool, "so@example.com", RoleName::SafetyOfficer).await;
        let (_, first) = pending_permit(&pool, &owner).await;
        pending_permit(&pool, &owner).await;
        pending_permit(&pool, &owner).await;
        let repo = SqlApprovalRepository::new(pool);

        repo.decide(&first.id, &record(&officer, Decision::Rejected)).await.expect("decide");

        assert_eq!(repo.pending_count().await.expect("pending"), 2);
        let stats = repo.stats().await.expect("stats");
        assert_eq!((stats.total, stats.pending, stats.rejected), (3, 2, 1));

        let rejected =
            ApprovalFilter { decision: Some(Decision::Rejected), ..ApprovalFilter::default() };
        let page = repo.list(&rejected, PageRequest::default()).await.expect("list");
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, first.id);
    }
}
