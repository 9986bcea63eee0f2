use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Extension;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use permitdesk_core::access::{ensure, AccessRequest, Capability};
use permitdesk_core::audit::{AuditAction, AuditEntry, EntityType};
use permitdesk_core::domain::role::RoleId;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiJson, ApiResult};
use crate::state::AppState;

pub async fn list_roles(State(state): State<AppState>) -> ApiResult<ApiJson<serde_json::Value>> {
    let roles = state.roles.list().await?;
    Ok(ApiJson(json!({ "roles": roles })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateRoleRequest {
    pub description: Option<String>,
    pub permissions: Option<Vec<String>>,
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(id): Path<String>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<UpdateRoleRequest>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    ensure(&AccessRequest::new(actor.role, &actor.id, Capability::EditRoles))?;
    let before =
        state.roles.find_by_id(&RoleId(id)).await?.ok_or_else(|| ApiError::not_found("Role"))?;

    let mut role = before.clone();
    if let Some(description) = body.description {
        role.description = Some(description);
    }
    if let Some(permissions) = body.permissions {
        if permissions.iter().any(|permission| permission.trim().is_empty()) {
            return Err(ApiError::bad_request("Permissions must not be blank"));
        }
        role.permissions = permissions;
    }
    role.updated_at = Utc::now();

    state.roles.update(&role).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::RoleUpdate, EntityType::Role, role.id.0.clone())
                .by(&actor.id)
                .with_old(&before)
                .with_new(&role),
            &headers,
        )
        .await;

    info!(event_name = "role.updated", role = %role.name, updated_by = %actor.id, "role updated");
    Ok(ApiJson(json!({ "message": "Role updated successfully", "role": role })))
}
