use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{FromRequest, FromRequestParts, OptionalFromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tracing::error;

use permitdesk_core::{DomainError, OtpError};
use permitdesk_db::RepositoryError;

/// HTTP-facing error. Every variant renders as `{ "message": ... }`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    PendingApproval(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn not_found(what: &str) -> Self {
        Self::NotFound(format!("{what} not found"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::PendingApproval(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::PendingApproval(message) => {
                json!({ "message": message, "pendingApproval": true })
            }
            Self::Internal(detail) => {
                error!(event_name = "api.internal_error", error = %detail, "request failed");
                json!({ "message": "Internal server error" })
            }
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(message) => Self::BadRequest(message),
            RepositoryError::NotFound(what) => Self::not_found(&what),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::NotOwner | DomainError::RoleNotPermitted { .. } => {
                Self::Forbidden(err.user_message())
            }
            DomainError::Validation(_)
            | DomainError::AlreadyProcessed
            | DomainError::PermitLocked { .. }
            | DomainError::InvalidTransition { .. } => Self::BadRequest(err.user_message()),
        }
    }
}

impl From<OtpError> for ApiError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::EmptyKey => Self::BadRequest("Email is required".to_string()),
            OtpError::Store(detail) => Self::Internal(detail),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// `Json` extractor whose rejections use the `{ "message": ... }` envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

/// A missing body yields `None`; a malformed one is still rejected.
impl<T, S> OptionalFromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Option<Self>, Self::Rejection> {
        let body = <Json<T> as OptionalFromRequest<S>>::from_request(req, state).await?;
        Ok(body.map(|Json(value)| ApiJson(value)))
    }
}

/// `Query` extractor with the same rejection envelope as [`ApiJson`].
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    use permitdesk_core::{DomainError, PermitStatus, RoleName};
    use permitdesk_db::RepositoryError;

    use super::ApiError;

    async fn body_json(error: ApiError) -> (StatusCode, serde_json::Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes =
            axum::body::to_bytes(response.into_body(), usize::MAX).await.expect("read body");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn pending_approval_carries_flag() {
        let (status, body) =
            body_json(ApiError::PendingApproval("Account pending approval".to_string())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["pendingApproval"], true);
        assert_eq!(body["message"], "Account pending approval");
    }

    #[tokio::test]
    async fn internal_detail_is_not_leaked() {
        let (status, body) = body_json(ApiError::Internal("disk I/O error".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }

    #[test]
    fn repository_and_domain_errors_map_to_statuses() {
        let conflict =
            ApiError::from(RepositoryError::Conflict("Approval already processed".into()));
        assert_eq!(conflict.status(), StatusCode::BAD_REQUEST);

        let missing = ApiError::from(RepositoryError::NotFound("Permit".into()));
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(missing.to_string(), "Permit not found");

        assert_eq!(ApiError::from(DomainError::NotOwner).status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(DomainError::RoleNotPermitted { role: RoleName::Requestor }).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::from(DomainError::PermitLocked { status: PermitStatus::Approved }).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
