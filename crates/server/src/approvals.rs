//! Safety review endpoints under `/api/approvals`. Every route requires SAFETY_OFFICER or ADMIN.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Extension;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use permitdesk_core::access::{ensure, AccessRequest, Capability};
use permitdesk_core::audit::{AuditAction, AuditEntry, EntityType};
use permitdesk_core::domain::approval::{
    ApprovalFilter, ApprovalId, Decision, DecisionRecord, PermitApproval,
};
use permitdesk_core::domain::permit::{PermitId, PermitRequest, PermitStatus, Priority, WorkType};
use permitdesk_core::domain::user::{User, UserId};
use permitdesk_core::lifecycle;
use permitdesk_db::PageRequest;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::permits::pagination_json;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitSummary {
    pub id: PermitId,
    pub title: String,
    pub location: Option<String>,
    pub work_type: WorkType,
    pub status: PermitStatus,
    pub priority: Priority,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub created_by: UserId,
}

impl From<PermitRequest> for PermitSummary {
    fn from(permit: PermitRequest) -> Self {
        Self {
            id: permit.id,
            title: permit.title,
            location: permit.location,
            work_type: permit.work_type,
            status: permit.status,
            priority: permit.priority,
            start_date: permit.start_date,
            end_date: permit.end_date,
            created_by: permit.created_by,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    #[serde(flatten)]
    pub approval: PermitApproval,
    pub permit: Option<PermitSummary>,
}

fn require(actor: &User, capability: Capability) -> ApiResult<()> {
    ensure(&AccessRequest::new(actor.role, &actor.id, capability))?;
    Ok(())
}

async fn with_permit(state: &AppState, approval: PermitApproval) -> ApiResult<ApprovalView> {
    let permit = state.permits.find_by_id(&approval.permit_id).await?.map(PermitSummary::from);
    Ok(ApprovalView { approval, permit })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(alias = "status")]
    pub decision: Option<String>,
    pub permit_id: Option<String>,
}

pub async fn list_approvals(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<ApprovalListQuery>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require(&actor, Capability::ReviewApprovals)?;

    let decision = match query.decision.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            Decision::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("Invalid decision: {raw}")))?,
        ),
        None => None,
    };
    let filter = ApprovalFilter {
        decision,
        permit_id: query
            .permit_id
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty())
            .map(PermitId),
    };
    let paged = state.approvals.list(&filter, PageRequest::new(query.page, query.limit)).await?;

    let mut approvals = Vec::with_capacity(paged.items.len());
    for approval in paged.items {
        approvals.push(with_permit(&state, approval).await?);
    }
    Ok(ApiJson(json!({
        "approvals": approvals,
        "pagination": pagination_json(paged.page, paged.total),
    })))
}

pub async fn pending_count(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require(&actor, Capability::ReviewApprovals)?;
    let count = state.approvals.pending_count().await?;
    Ok(ApiJson(json!({ "count": count })))
}

pub async fn approval_stats(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require(&actor, Capability::ReviewApprovals)?;
    let approvals = state.approvals.stats().await?;
    let permits = state.permits.status_counts(None).await?;
    Ok(ApiJson(json!({ "approvals": approvals, "permits": permits })))
}

pub async fn get_approval(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require(&actor, Capability::ReviewApprovals)?;
    let approval = state
        .approvals
        .find_by_id(&ApprovalId(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Approval"))?;
    Ok(ApiJson(json!({ "approval": with_permit(&state, approval).await? })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    #[serde(alias = "status")]
    pub decision: String,
    pub comment: Option<String>,
    pub signature: Option<String>,
}

pub async fn decide_approval(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<DecisionRequest>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require(&actor, Capability::DecideApproval)?;

    let decision = Decision::parse(&body.decision).ok_or_else(|| {
        ApiError::bad_request("Decision must be APPROVED or REJECTED")
    })?;
    let current = state
        .approvals
        .find_by_id(&ApprovalId(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Approval"))?;
    let permit_status = lifecycle::decide(&current, decision)?;

    let record = DecisionRecord {
        decision,
        approver_id: actor.id.clone(),
        approver_name: actor.full_name(),
        comment: body.comment,
        signature: body.signature,
        decided_at: Utc::now(),
    };
    let decided = state.approvals.decide(&current.id, &record).await?;

    let action = match decision {
        Decision::Rejected => AuditAction::Reject,
        _ => AuditAction::Approve,
    };
    state
        .record_audit(
            AuditEntry::new(action, EntityType::PermitApproval, decided.id.0.clone())
                .by(&actor.id)
                .with_old(&current)
                .with_new(&decided),
            &headers,
        )
        .await;

    info!(
        event_name = "approval.decided",
        approval_id = %decided.id,
        permit_id = %decided.permit_id,
        decision = decision.as_str(),
        permit_status = permit_status.as_str(),
        decided_by = %actor.id,
        "approval decided"
    );

    let message = match decision {
        Decision::Rejected => "Permit rejected",
        _ => "Permit approved",
    };
    Ok(ApiJson(json!({ "message": message, "approval": with_permit(&state, decided).await? })))
}
