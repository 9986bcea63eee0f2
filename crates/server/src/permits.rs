//! Permit endpoints under `/api/permits`.
//!
//! Authenticated:
//! - `GET    /api/permits`           paginated list, requestors see only their own
//! - `POST   /api/permits`           create with its pending safety-officer approval
//! - `GET    /api/permits/{id}`      permit with approvals and registered workers
//! - `PUT    /api/permits/{id}`
//! - `DELETE /api/permits/{id}`
//! - `GET    /api/permits/{id}/pdf`  printable document
//!
//! Public:
//! - `GET  /api/permits/work-types`
//! - `GET  /api/permits/{id}/public`   verification view behind the document's QR link
//! - `POST /api/permits/{id}/workers`  on-site worker sign-in

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use permitdesk_core::access::{ensure, AccessRequest, Capability};
use permitdesk_core::audit::{AuditAction, AuditEntry, EntityType};
use permitdesk_core::domain::approval::{Decision, PermitApproval};
use permitdesk_core::domain::permit::{
    parse_permit_date, ChecklistItem, PermitDraft, PermitFilter, PermitId, PermitPatch,
    PermitRequest, PermitStatus, Priority, WorkType, WorkerEntry,
};
use permitdesk_core::domain::role::RoleName;
use permitdesk_core::domain::user::User;
use permitdesk_core::domain::worker::Worker;
use permitdesk_db::PageRequest;

use crate::auth::CurrentUser;
use crate::document::{layout, DocumentContext};
use crate::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermitPayload {
    pub title: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub work_type: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub priority: Option<String>,
    pub hazards: Option<Vec<String>>,
    pub precautions: Option<Vec<String>>,
    pub equipment: Option<Vec<String>>,
    pub company_name: Option<String>,
    pub contractor_name: Option<String>,
    pub contractor_phone: Option<String>,
    pub workers: Option<Vec<WorkerEntry>>,
    pub safety_checklist: Option<Vec<ChecklistItem>>,
}

fn parse_work_type(raw: &str) -> ApiResult<WorkType> {
    WorkType::parse(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid work type: {raw}")))
}

fn parse_priority(raw: &str) -> ApiResult<Priority> {
    Priority::parse(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid priority: {raw}")))
}

fn parse_date(field: &str, raw: &str) -> ApiResult<DateTime<Utc>> {
    parse_permit_date(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid {field}: {raw}")))
}

impl PermitPayload {
    pub fn into_draft(self) -> ApiResult<PermitDraft> {
        let title = self.title.unwrap_or_default();
        let work_type = self
            .work_type
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("Work type is required"))
            .and_then(parse_work_type)?;
        let start_date = self
            .start_date
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("Start date is required"))
            .and_then(|raw| parse_date("start date", raw))?;
        let end_date = self
            .end_date
            .as_deref()
            .ok_or_else(|| ApiError::bad_request("End date is required"))
            .and_then(|raw| parse_date("end date", raw))?;
        let priority =
            self.priority.as_deref().map(parse_priority).transpose()?.unwrap_or_default();

        let draft = PermitDraft {
            title,
            description: self.description,
            location: self.location,
            work_type,
            start_date,
            end_date,
            priority,
            hazards: self.hazards.unwrap_or_default(),
            precautions: self.precautions.unwrap_or_default(),
            equipment: self.equipment.unwrap_or_default(),
            company_name: self.company_name,
            contractor_name: self.contractor_name,
            contractor_phone: self.contractor_phone,
            workers: self.workers.unwrap_or_default(),
            safety_checklist: self.safety_checklist.unwrap_or_default(),
        };
        draft.validate()?;
        Ok(draft)
    }

    pub fn into_patch(self) -> ApiResult<PermitPatch> {
        Ok(PermitPatch {
            title: self.title,
            description: self.description,
            location: self.location,
            work_type: self.work_type.as_deref().map(parse_work_type).transpose()?,
            start_date: self
                .start_date
                .as_deref()
                .map(|raw| parse_date("start date", raw))
                .transpose()?,
            end_date: self.end_date.as_deref().map(|raw| parse_date("end date", raw)).transpose()?,
            priority: self.priority.as_deref().map(parse_priority).transpose()?,
            hazards: self.hazards,
            precautions: self.precautions,
            equipment: self.equipment,
            company_name: self.company_name,
            contractor_name: self.contractor_name,
            contractor_phone: self.contractor_phone,
            workers: self.workers,
            safety_checklist: self.safety_checklist,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermitDetail {
    #[serde(flatten)]
    pub permit: PermitRequest,
    pub approvals: Vec<PermitApproval>,
    pub registered_workers: Vec<Worker>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PermitListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub work_type: Option<String>,
    pub priority: Option<String>,
    pub search: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|raw| raw.trim().to_string()).filter(|raw| !raw.is_empty())
}

impl PermitListQuery {
    fn into_filter(self, actor: &User) -> ApiResult<(PermitFilter, PageRequest)> {
        let status = match non_blank(self.status) {
            Some(raw) => Some(
                PermitStatus::parse(&raw)
                    .ok_or_else(|| ApiError::bad_request(format!("Invalid status: {raw}")))?,
            ),
            None => None,
        };
        let filter = PermitFilter {
            status,
            work_type: non_blank(self.work_type).as_deref().map(parse_work_type).transpose()?,
            priority: non_blank(self.priority).as_deref().map(parse_priority).transpose()?,
            created_by: (actor.role == RoleName::Requestor).then(|| actor.id.clone()),
            search: non_blank(self.search),
        };
        Ok((filter, PageRequest::new(self.page, self.limit)))
    }
}

pub fn pagination_json(page: PageRequest, total: i64) -> serde_json::Value {
    json!({
        "page": page.page,
        "limit": page.limit,
        "total": total,
        "totalPages": page.total_pages(total),
    })
}

async fn load_permit(state: &AppState, id: &PermitId) -> ApiResult<PermitRequest> {
    state.permits.find_by_id(id).await?.ok_or_else(|| ApiError::not_found("Permit"))
}

async fn load_detail(state: &AppState, permit: PermitRequest) -> ApiResult<PermitDetail> {
    let approvals = state.approvals.list_for_permit(&permit.id).await?;
    let registered_workers = state.workers.list_for_permit(&permit.id).await?;
    Ok(PermitDetail { permit, approvals, registered_workers })
}

fn check(actor: &User, capability: Capability, permit: &PermitRequest) -> ApiResult<()> {
    ensure(
        &AccessRequest::new(actor.role, &actor.id, capability)
            .on_permit(&permit.created_by, permit.status),
    )?;
    Ok(())
}

pub async fn list_permits(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<PermitListQuery>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    ensure(&AccessRequest::new(actor.role, &actor.id, Capability::ViewPermit))?;
    let (filter, page) = query.into_filter(&actor)?;
    let paged = state.permits.list(&filter, page).await?;

    Ok(ApiJson(json!({
        "permits": paged.items,
        "pagination": pagination_json(paged.page, paged.total),
    })))
}

pub async fn create_permit(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<PermitPayload>,
) -> ApiResult<impl IntoResponse> {
    ensure(&AccessRequest::new(actor.role, &actor.id, Capability::CreatePermit))?;
    let now = Utc::now();
    let permit = body.into_draft()?.into_permit(actor.id.clone(), now);
    let approval = PermitApproval::pending_for(permit.id.clone(), now);

    state.permits.create_with_approval(&permit, &approval).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::Create, EntityType::PermitRequest, permit.id.0.clone())
                .by(&actor.id)
                .with_new(&permit),
            &headers,
        )
        .await;

    info!(
        event_name = "permit.created",
        permit_id = %permit.id,
        created_by = %actor.id,
        work_type = permit.work_type.as_str(),
        priority = permit.priority.as_str(),
        "permit request created"
    );

    let detail = PermitDetail { permit, approvals: vec![approval], registered_workers: Vec::new() };
    Ok((
        StatusCode::CREATED,
        ApiJson(json!({ "message": "Permit request created successfully", "permit": detail })),
    ))
}

pub async fn get_permit(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    let permit = load_permit(&state, &PermitId(id)).await?;
    check(&actor, Capability::ViewPermit, &permit)?;
    let detail = load_detail(&state, permit).await?;
    Ok(ApiJson(json!({ "permit": detail })))
}

pub async fn update_permit(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<PermitPayload>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    let mut permit = load_permit(&state, &PermitId(id)).await?;
    check(&actor, Capability::UpdatePermit, &permit)?;

    let before = permit.clone();
    body.into_patch()?.apply(&mut permit, Utc::now())?;
    state.permits.update(&permit).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::Update, EntityType::PermitRequest, permit.id.0.clone())
                .by(&actor.id)
                .with_old(&before)
                .with_new(&permit),
            &headers,
        )
        .await;

    info!(
        event_name = "permit.updated",
        permit_id = %permit.id,
        updated_by = %actor.id,
        "permit updated"
    );

    let detail = load_detail(&state, permit).await?;
    Ok(ApiJson(json!({ "message": "Permit updated successfully", "permit": detail })))
}

pub async fn delete_permit(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ApiJson<serde_json::Value>> {
    let permit = load_permit(&state, &PermitId(id)).await?;
    check(&actor, Capability::DeletePermit, &permit)?;

    if !state.permits.delete(&permit.id).await? {
        return Err(ApiError::not_found("Permit"));
    }
    state
        .record_audit(
            AuditEntry::new(AuditAction::Delete, EntityType::PermitRequest, permit.id.0.clone())
                .by(&actor.id)
                .with_old(&permit),
            &headers,
        )
        .await;

    info!(
        event_name = "permit.deleted",
        permit_id = %permit.id,
        deleted_by = %actor.id,
        "permit deleted"
    );
    Ok(ApiJson(json!({ "message": "Permit deleted successfully" })))
}

pub async fn work_types() -> ApiJson<serde_json::Value> {
    let types: Vec<serde_json::Value> = WorkType::ALL
        .iter()
        .map(|work_type| json!({ "value": work_type.as_str(), "label": work_type.label() }))
        .collect();
    ApiJson(json!({ "workTypes": types }))
}

/// What an unauthenticated visitor may see. Ownership and contact details stay private.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicPermitView {
    pub id: PermitId,
    pub title: String,
    pub location: Option<String>,
    pub work_type: WorkType,
    pub work_type_label: &'static str,
    pub status: PermitStatus,
    pub priority: Priority,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub company_name: Option<String>,
    pub hazards: Vec<String>,
    pub precautions: Vec<String>,
    pub equipment: Vec<String>,
    pub registered_worker_count: usize,
    pub approvals: Vec<PublicApprovalView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicApprovalView {
    pub approver_role: RoleName,
    pub approver_name: Option<String>,
    pub decision: Decision,
    pub approved_at: Option<DateTime<Utc>>,
}

pub async fn public_permit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    let permit = load_permit(&state, &PermitId(id)).await?;
    let detail = load_detail(&state, permit).await?;
    let permit = detail.permit;

    let view = PublicPermitView {
        work_type_label: permit.work_type.label(),
        registered_worker_count: detail.registered_workers.len(),
        approvals: detail
            .approvals
            .into_iter()
            .map(|approval| PublicApprovalView {
                approver_role: approval.approver_role,
                approver_name: approval.approver_name,
                decision: approval.decision,
                approved_at: approval.approved_at,
            })
            .collect(),
        id: permit.id,
        title: permit.title,
        location: permit.location,
        work_type: permit.work_type,
        status: permit.status,
        priority: permit.priority,
        start_date: permit.start_date,
        end_date: permit.end_date,
        company_name: permit.company_name,
        hazards: permit.hazards,
        precautions: permit.precautions,
        equipment: permit.equipment,
    };
    Ok(ApiJson(json!({ "permit": view })))
}

pub async fn register_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ApiJson(entry): ApiJson<WorkerEntry>,
) -> ApiResult<impl IntoResponse> {
    let permit = load_permit(&state, &PermitId(id)).await?;
    if !matches!(permit.status, PermitStatus::Pending | PermitStatus::Approved) {
        return Err(ApiError::bad_request(
            "Workers can only register for pending or approved permits",
        ));
    }

    let worker = Worker::register(permit.id.clone(), entry, Utc::now())?;
    state.workers.insert(&worker).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::WorkerRegister, EntityType::Worker, worker.id.0.clone())
                .with_new(&worker),
            &headers,
        )
        .await;

    info!(
        event_name = "permit.worker_registered",
        permit_id = %permit.id,
        worker_id = %worker.id.0,
        "worker registered against permit"
    );
    Ok((
        StatusCode::CREATED,
        ApiJson(json!({ "message": "Worker registered successfully", "worker": worker })),
    ))
}

pub async fn permit_pdf(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<Response> {
    let permit = load_permit(&state, &PermitId(id)).await?;
    check(&actor, Capability::ViewPermit, &permit)?;
    let detail = load_detail(&state, permit).await?;

    let context = DocumentContext {
        company_name: state.documents.company_name(),
        public_base_url: &state.config.server.public_base_url,
        generated_at: Utc::now(),
    };
    let document = layout(&context, &detail.permit, &detail.approvals, &detail.registered_workers);
    let rendered = state.documents.render_permit(&document).await.map_err(|error| {
        error!(
            event_name = "permit.pdf.failed",
            permit_id = %detail.permit.id,
            error = %error,
            "permit document rendering failed"
        );
        ApiError::Internal(format!("document rendering failed: {error}"))
    })?;

    info!(
        event_name = "permit.pdf.served",
        permit_id = %detail.permit.id,
        pages = document.page_count(),
        "permit document served"
    );
    Ok(rendered.into_response(&format!("permit-{}", detail.permit.id)))
}
