//! Account administration under `/api/users`. Every route requires ADMIN.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use permitdesk_core::access::{ensure, AccessRequest, Capability};
use permitdesk_core::audit::{AuditAction, AuditEntry, EntityType};
use permitdesk_core::domain::role::RoleName;
use permitdesk_core::domain::user::{
    is_plausible_email, normalize_email, User, UserFilter, UserId, MIN_PASSWORD_LEN,
};
use permitdesk_db::PageRequest;

use crate::auth::{hash_password, CurrentUser};
use crate::error::{ApiError, ApiJson, ApiQuery, ApiResult};
use crate::permits::pagination_json;
use crate::state::AppState;

fn require_admin(actor: &User) -> ApiResult<()> {
    ensure(&AccessRequest::new(actor.role, &actor.id, Capability::ManageUsers))?;
    Ok(())
}

fn parse_role(raw: &str) -> ApiResult<RoleName> {
    RoleName::parse(raw).ok_or_else(|| ApiError::bad_request(format!("Invalid role: {raw}")))
}

async fn load_user(state: &AppState, id: String) -> ApiResult<User> {
    state.users.find_by_id(&UserId(id)).await?.ok_or_else(|| ApiError::not_found("User"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
    pub is_approved: Option<bool>,
    pub search: Option<String>,
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require_admin(&actor)?;
    let role = query
        .role
        .as_deref()
        .map(str::trim)
        .filter(|raw| !raw.is_empty())
        .map(parse_role)
        .transpose()?;
    let filter = UserFilter {
        role,
        is_active: query.is_active,
        is_approved: query.is_approved,
        search: query.search.filter(|raw| !raw.trim().is_empty()),
    };
    let paged = state.users.list(&filter, PageRequest::new(query.page, query.limit)).await?;

    Ok(ApiJson(json!({
        "users": paged.items,
        "pagination": pagination_json(paged.page, paged.total),
    })))
}

pub async fn pending_users(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<UserListQuery>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require_admin(&actor)?;
    let filter =
        UserFilter { is_active: Some(true), is_approved: Some(false), ..UserFilter::default() };
    let paged = state.users.list(&filter, PageRequest::new(query.page, query.limit)).await?;

    Ok(ApiJson(json!({
        "users": paged.items,
        "pagination": pagination_json(paged.page, paged.total),
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

/// Accounts created by an administrator are approved on creation.
pub async fn create_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<CreateUserRequest>,
) -> ApiResult<impl IntoResponse> {
    require_admin(&actor)?;
    if !is_plausible_email(&body.email) {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    if body.first_name.trim().is_empty() || body.last_name.trim().is_empty() {
        return Err(ApiError::bad_request("First name and last name are required"));
    }
    let role = body.role.as_deref().map(parse_role).transpose()?.unwrap_or(RoleName::DEFAULT);

    let now = Utc::now();
    let user = User {
        id: UserId::new(),
        email: normalize_email(&body.email),
        password_hash: hash_password(&body.password, state.config.auth.bcrypt_cost).await?,
        first_name: body.first_name.trim().to_string(),
        last_name: body.last_name.trim().to_string(),
        department: body.department,
        phone: body.phone,
        role,
        requested_role: None,
        is_active: true,
        is_approved: true,
        approved_by: Some(actor.id.clone()),
        approved_at: Some(now),
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    };
    state.users.insert(&user).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::Create, EntityType::User, user.id.0.clone())
                .by(&actor.id)
                .with_new(&user),
            &headers,
        )
        .await;

    info!(
        event_name = "user.created",
        user_id = %user.id,
        role = %user.role,
        created_by = %actor.id,
        "user created"
    );
    Ok((
        StatusCode::CREATED,
        ApiJson(json!({ "message": "User created successfully", "user": user })),
    ))
}

pub async fn get_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require_admin(&actor)?;
    let user = load_user(&state, id).await?;
    Ok(ApiJson(json!({ "user": user })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub is_active: Option<bool>,
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<UpdateUserRequest>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require_admin(&actor)?;
    let before = load_user(&state, id).await?;
    let mut user = before.clone();

    if let Some(email) = body.email {
        if !is_plausible_email(&email) {
            return Err(ApiError::bad_request("A valid email is required"));
        }
        user.email = normalize_email(&email);
    }
    if let Some(first_name) = body.first_name.filter(|name| !name.trim().is_empty()) {
        user.first_name = first_name.trim().to_string();
    }
    if let Some(last_name) = body.last_name.filter(|name| !name.trim().is_empty()) {
        user.last_name = last_name.trim().to_string();
    }
    if let Some(department) = body.department {
        user.department = Some(department);
    }
    if let Some(phone) = body.phone {
        user.phone = Some(phone);
    }
    if let Some(role) = body.role.as_deref() {
        user.role = parse_role(role)?;
    }
    if let Some(is_active) = body.is_active {
        if !is_active && user.id == actor.id {
            return Err(ApiError::bad_request("You cannot deactivate your own account"));
        }
        user.is_active = is_active;
    }
    user.updated_at = Utc::now();

    state.users.update(&user).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::Update, EntityType::User, user.id.0.clone())
                .by(&actor.id)
                .with_old(&before)
                .with_new(&user),
            &headers,
        )
        .await;

    Ok(ApiJson(json!({ "message": "User updated successfully", "user": user })))
}

/// Soft delete: the account is deactivated so audit history and permit ownership survive.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require_admin(&actor)?;
    let user = load_user(&state, id).await?;
    if user.id == actor.id {
        return Err(ApiError::bad_request("You cannot deactivate your own account"));
    }

    if !state.users.deactivate(&user.id, Utc::now()).await? {
        return Err(ApiError::not_found("User"));
    }
    state
        .record_audit(
            AuditEntry::new(AuditAction::Delete, EntityType::User, user.id.0.clone())
                .by(&actor.id)
                .with_old(&user),
            &headers,
        )
        .await;

    info!(
        event_name = "user.deactivated",
        user_id = %user.id,
        deactivated_by = %actor.id,
        "user deactivated"
    );
    Ok(ApiJson(json!({ "message": "User deactivated successfully" })))
}

pub async fn approve_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require_admin(&actor)?;
    let user = state.users.approve(&UserId(id), &actor.id, Utc::now()).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::Approve, EntityType::User, user.id.0.clone())
                .by(&actor.id)
                .with_new(&user),
            &headers,
        )
        .await;

    info!(
        event_name = "user.approved",
        user_id = %user.id,
        role = %user.role,
        approved_by = %actor.id,
        "user approved"
    );
    Ok(ApiJson(json!({ "message": "User approved successfully", "user": user })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RejectUserRequest {
    pub reason: Option<String>,
}

pub async fn reject_user(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<ApiJson<RejectUserRequest>>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require_admin(&actor)?;
    let reason = body
        .and_then(|ApiJson(body)| body.reason)
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());
    let user = state.users.reject(&UserId(id), reason.as_deref(), Utc::now()).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::Reject, EntityType::User, user.id.0.clone())
                .by(&actor.id)
                .with_new(&user),
            &headers,
        )
        .await;

    info!(
        event_name = "user.rejected",
        user_id = %user.id,
        rejected_by = %actor.id,
        "user rejected"
    );
    Ok(ApiJson(json!({ "message": "User registration rejected", "user": user })))
}

pub async fn user_stats(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    require_admin(&actor)?;
    let stats = state.users.stats().await?;
    Ok(ApiJson(json!({ "stats": stats })))
}
