//! Authentication: JWT issuance, the bearer-token middleware and the `/api/auth` handlers.
//!
//! - `POST /api/auth/register`        public self-registration
//! - `POST /api/auth/login`           public, returns `{ token, user }`
//! - `GET  /api/auth/me`              current account
//! - `POST /api/auth/change-password`
//! - `PUT  /api/auth/profile`
//! - `POST /api/auth/otp/send`        public
//! - `POST /api/auth/otp/verify`      public

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Extension;
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use permitdesk_core::audit::{AuditAction, AuditEntry, EntityType};
use permitdesk_core::domain::role::RoleName;
use permitdesk_core::domain::user::{
    is_plausible_email, normalize_email, RegistrationPlan, User, UserId, MIN_PASSWORD_LEN,
};

use crate::error::{ApiError, ApiJson, ApiResult};
use crate::state::AppState;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub role: RoleName,
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenService {
    secret: SecretString,
    ttl_hours: u64,
}

impl TokenService {
    pub fn new(secret: SecretString, ttl_hours: u64) -> Self {
        Self { secret, ttl_hours }
    }

    pub fn issue(&self, user: &User) -> ApiResult<String> {
        let now = Utc::now().timestamp();
        let ttl_secs = i64::try_from(self.ttl_hours.saturating_mul(3600)).unwrap_or(i64::MAX);
        let claims = Claims {
            sub: user.id.0.clone(),
            role: user.role,
            iat: now,
            exp: now.saturating_add(ttl_secs),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.expose_secret().as_bytes()),
        )
        .map_err(|error| ApiError::Internal(format!("token encoding failed: {error}")))
    }

    pub fn validate(&self, token: &str) -> ApiResult<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.expose_secret().as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))
    }
}

pub async fn hash_password(password: &str, cost: u32) -> ApiResult<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|error| ApiError::Internal(format!("hashing task failed: {error}")))?
        .map_err(|error| ApiError::Internal(format!("password hashing failed: {error}")))
}

/// A malformed stored hash counts as a mismatch.
pub async fn verify_password(password: &str, hash: &str) -> ApiResult<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|error| ApiError::Internal(format!("verify task failed: {error}")))?;
    Ok(verified.unwrap_or(false))
}

/// The authenticated account, reloaded from the database on every request.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
    let claims = state.tokens.validate(token)?;

    let user = state
        .users
        .find_by_id(&UserId(claims.sub))
        .await?
        .filter(|user| user.is_active)
        .ok_or_else(|| ApiError::Unauthorized("User not found or inactive".to_string()))?;

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub department: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
}

pub async fn register(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    if !is_plausible_email(&body.email) {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    if body.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    let first_name = body.first_name.trim();
    let last_name = body.last_name.trim();
    if first_name.is_empty() || last_name.is_empty() {
        return Err(ApiError::bad_request("First name and last name are required"));
    }
    let requested = match body.role.as_deref().map(str::trim).filter(|raw| !raw.is_empty()) {
        Some(raw) => Some(
            RoleName::parse(raw)
                .ok_or_else(|| ApiError::bad_request(format!("Invalid role: {raw}")))?,
        ),
        None => None,
    };

    let email = normalize_email(&body.email);
    if state.users.find_by_email(&email).await?.is_some() {
        return Err(ApiError::bad_request("User with this email already exists"));
    }

    let plan = RegistrationPlan::for_requested(requested);
    let now = Utc::now();
    let user = User {
        id: UserId::new(),
        email,
        password_hash: hash_password(&body.password, state.config.auth.bcrypt_cost).await?,
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        department: body.department,
        phone: body.phone,
        role: plan.role,
        requested_role: plan.requested_role,
        is_active: true,
        is_approved: plan.is_approved,
        approved_by: None,
        approved_at: None,
        rejection_reason: None,
        created_at: now,
        updated_at: now,
    };
    state.users.insert(&user).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::Register, EntityType::User, user.id.0.clone())
                .by(&user.id)
                .with_new(&user),
            &headers,
        )
        .await;

    info!(
        event_name = "auth.registered",
        user_id = %user.id,
        role = %user.role,
        requested_role = ?user.requested_role.map(|role| role.as_str()),
        "user registered"
    );

    let body = if user.is_approved {
        json!({
            "message": "Registration successful",
            "token": state.tokens.issue(&user)?,
            "user": user,
        })
    } else {
        json!({
            "message": "Registration submitted. Your account is pending admin approval.",
            "pendingApproval": true,
            "user": user,
        })
    };
    Ok((StatusCode::CREATED, ApiJson(body)))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<LoginRequest>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    let email = normalize_email(&body.email);
    let invalid = || ApiError::Unauthorized("Invalid credentials".to_string());

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(event_name = "auth.login_rejected", reason = "unknown_email", "login rejected");
        return Err(invalid());
    };
    if !verify_password(&body.password, &user.password_hash).await? {
        warn!(
            event_name = "auth.login_rejected",
            reason = "bad_password",
            user_id = %user.id,
            "login rejected"
        );
        return Err(invalid());
    }
    if !user.is_active {
        warn!(
            event_name = "auth.login_rejected",
            reason = "inactive",
            user_id = %user.id,
            "login rejected"
        );
        return Err(ApiError::Unauthorized("Account is deactivated".to_string()));
    }
    if !user.is_approved {
        warn!(
            event_name = "auth.login_rejected",
            reason = "pending_approval",
            user_id = %user.id,
            "login rejected"
        );
        return Err(ApiError::PendingApproval(
            "Your account is pending admin approval".to_string(),
        ));
    }

    let token = state.tokens.issue(&user)?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::Login, EntityType::User, user.id.0.clone()).by(&user.id),
            &headers,
        )
        .await;
    info!(event_name = "auth.login", user_id = %user.id, role = %user.role, "user logged in");

    Ok(ApiJson(json!({ "message": "Login successful", "token": token, "user": user })))
}

pub async fn me(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> ApiJson<serde_json::Value> {
    ApiJson(json!({ "user": user }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<ChangePasswordRequest>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    if !verify_password(&body.current_password, &user.password_hash).await? {
        return Err(ApiError::bad_request("Current password is incorrect"));
    }
    if body.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    user.password_hash = hash_password(&body.new_password, state.config.auth.bcrypt_cost).await?;
    user.updated_at = Utc::now();
    state.users.update(&user).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::PasswordChange, EntityType::User, user.id.0.clone())
                .by(&user.id),
            &headers,
        )
        .await;

    Ok(ApiJson(json!({ "message": "Password changed successfully" })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub department: Option<String>,
    pub phone: Option<String>,
}

pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    headers: HeaderMap,
    ApiJson(body): ApiJson<ProfileRequest>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    let before = user.clone();
    let mut user = user;
    if let Some(first_name) = body.first_name {
        let first_name = first_name.trim();
        if first_name.is_empty() {
            return Err(ApiError::bad_request("First name cannot be empty"));
        }
        user.first_name = first_name.to_string();
    }
    if let Some(last_name) = body.last_name {
        let last_name = last_name.trim();
        if last_name.is_empty() {
            return Err(ApiError::bad_request("Last name cannot be empty"));
        }
        user.last_name = last_name.to_string();
    }
    if let Some(department) = body.department {
        user.department = Some(department);
    }
    if let Some(phone) = body.phone {
        user.phone = Some(phone);
    }
    user.updated_at = Utc::now();

    state.users.update(&user).await?;
    state
        .record_audit(
            AuditEntry::new(AuditAction::ProfileUpdate, EntityType::User, user.id.0.clone())
                .by(&user.id)
                .with_old(&before)
                .with_new(&user),
            &headers,
        )
        .await;

    Ok(ApiJson(json!({ "message": "Profile updated successfully", "user": user })))
}

#[derive(Debug, Deserialize)]
pub struct OtpSendRequest {
    pub email: String,
}

pub async fn send_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OtpSendRequest>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    if !is_plausible_email(&body.email) {
        return Err(ApiError::bad_request("A valid email is required"));
    }
    let email = normalize_email(&body.email);
    let issued = state.otp.issue(&email).await?;

    // Delivery is a log line until a mail transport is configured.
    info!(
        event_name = "auth.otp.issued",
        email = %email,
        code = %issued.code,
        expires_at = %issued.expires_at.to_rfc3339(),
        "one-time code issued"
    );

    Ok(ApiJson(json!({
        "message": "OTP sent successfully",
        "expiresAt": issued.expires_at,
    })))
}

#[derive(Debug, Deserialize)]
pub struct OtpVerifyRequest {
    pub email: String,
    pub otp: String,
}

pub async fn verify_otp(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<OtpVerifyRequest>,
) -> ApiResult<ApiJson<serde_json::Value>> {
    let email = normalize_email(&body.email);
    if !state.otp.verify(&email, &body.otp).await? {
        warn!(event_name = "auth.otp.rejected", email = %email, "one-time code rejected");
        return Err(ApiError::bad_request("Invalid or expired OTP"));
    }

    info!(event_name = "auth.otp.verified", email = %email, "one-time code verified");
    Ok(ApiJson(json!({ "verified": true, "message": "OTP verified successfully" })))
}
