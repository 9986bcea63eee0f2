use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::services::ServeDir;
use tracing::info;

use crate::auth::{self, require_auth};
use crate::state::AppState;
use crate::{approvals, health, mis, permits, roles, users};

fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/otp/send", post(auth::send_otp))
        .route("/api/auth/otp/verify", post(auth::verify_otp))
        .route("/api/permits/work-types", get(permits::work_types))
        .route("/api/permits/{id}/public", get(permits::public_permit))
        .route("/api/permits/{id}/workers", post(permits::register_worker))
}

fn protected_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/auth/me", get(auth::me))
        .route("/api/auth/change-password", post(auth::change_password))
        .route("/api/auth/profile", put(auth::update_profile))
        .route("/api/permits", get(permits::list_permits).post(permits::create_permit))
        .route(
            "/api/permits/{id}",
            get(permits::get_permit).put(permits::update_permit).delete(permits::delete_permit),
        )
        .route("/api/permits/{id}/pdf", get(permits::permit_pdf))
        .route("/api/approvals", get(approvals::list_approvals))
        .route("/api/approvals/pending-count", get(approvals::pending_count))
        .route("/api/approvals/stats", get(approvals::approval_stats))
        .route("/api/approvals/{id}", get(approvals::get_approval))
        .route("/api/approvals/{id}/decision", put(approvals::decide_approval))
        .route("/api/users", get(users::list_users).post(users::create_user))
        .route("/api/users/pending", get(users::pending_users))
        .route("/api/users/stats", get(users::user_stats))
        .route(
            "/api/users/{id}",
            get(users::get_user).put(users::update_user).delete(users::delete_user),
        )
        .route("/api/users/{id}/approve", post(users::approve_user))
        .route("/api/users/{id}/reject", post(users::reject_user))
        .route("/api/roles", get(roles::list_roles))
        .route("/api/roles/{id}", put(roles::update_role))
        .route("/api/mis/readings", get(mis::list_readings).post(mis::create_reading))
        .route("/api/mis/dashboard", get(mis::dashboard))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth))
}

/// Full application router. Non-API paths fall through to the frontend bundle when configured.
pub fn router(state: AppState) -> Router {
    let static_dir = state.config.server.static_dir.clone();
    let db_pool = state.db_pool.clone();

    let app = public_routes()
        .merge(protected_routes(&state))
        .with_state(state)
        .merge(health::router(db_pool));

    match static_dir {
        Some(dir) => {
            info!(event_name = "system.server.static_dir", static_dir = %dir, "serving frontend");
            app.fallback_service(ServeDir::new(dir))
        }
        None => app,
    }
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use axum::Router;
    use chrono::Utc;
    use permitdesk_core::config::{AppConfig, OtpStoreKind};
    use permitdesk_core::domain::role::RoleName;
    use permitdesk_core::domain::user::{User, UserId};
    use permitdesk_db::{connect_with_settings, migrations};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;
    use crate::auth::hash_password;
    use crate::pdf::PdfGenerator;
    use crate::state::AppState;

    struct Harness {
        state: AppState,
        app: Router,
    }

    async fn harness() -> Harness {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "router-test-secret-value".to_string().into();
        config.auth.bcrypt_cost = 4;
        config.otp.store = OtpStoreKind::Memory;

        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let documents = PdfGenerator::with_embedded_templates("Acme Refinery")
            .expect("template")
            .without_converter();

        let state = AppState::new(config, pool, documents);
        Harness { app: router(state.clone()), state }
    }

    impl Harness {
        async fn user(&self, email: &str, role: RoleName) -> (User, String) {
            let now = Utc::now();
            let user = User {
                id: UserId::new(),
                email: email.to_string(),
                password_hash: hash_password("correct-horse", 4).await.expect("hash"),
                first_name: "Test".to_string(),
                last_name: role.label().to_string(),
                department: None,
                phone: None,
                role,
                requested_role: None,
                is_active: true,
                is_approved: true,
                approved_by: None,
                approved_at: Some(now),
                rejection_reason: None,
                created_at: now,
                updated_at: now,
            };
            self.state.users.insert(&user).await.expect("insert user");
            let token = self.state.tokens.issue(&user).expect("token");
            (user, token)
        }

        async fn call(
            &self,
            method: Method,
            uri: &str,
            token: Option<&str>,
            body: Option<Value>,
        ) -> (StatusCode, Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(token) = token {
                request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string())),
                None => request.body(Body::empty()),
            }
            .expect("request");

            self.send(request).await
        }

        async fn call_raw(
            &self,
            method: Method,
            uri: &str,
            token: &str,
            raw: &str,
        ) -> (StatusCode, Value) {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(raw.to_string()))
                .expect("request");
            self.send(request).await
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(request).await.expect("response");
            let status = response.status();
            let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(Value::Null)
            };
            (status, value)
        }
    }

    fn hot_work_permit() -> Value {
        json!({
            "title": "T",
            "workType": "HOT_WORK",
            "startDate": "2024-01-01",
            "endDate": "2024-01-02",
            "hazards": ["Fire"],
        })
    }

    #[tokio::test]
    async fn create_then_decide_mirrors_the_decision_exactly_once() {
        let harness = harness().await;
        let (_, requestor) = harness.user("req@example.com", RoleName::Requestor).await;
        let (_, officer) = harness.user("safety@example.com", RoleName::SafetyOfficer).await;

        let (status, body) = harness
            .call(Method::POST, "/api/permits", Some(&requestor), Some(hot_work_permit()))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let permit = &body["permit"];
        assert_eq!(permit["status"], "PENDING");
        assert_eq!(permit["hazards"], json!(["Fire"]));
        let approvals = permit["approvals"].as_array().expect("approvals");
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0]["decision"], "PENDING");

        let permit_id = permit["id"].as_str().expect("permit id").to_string();
        let approval_id = approvals[0]["id"].as_str().expect("approval id").to_string();
        let decision_uri = format!("/api/approvals/{approval_id}/decision");

        let (status, body) = harness
            .call(
                Method::PUT,
                &decision_uri,
                Some(&officer),
                Some(json!({ "decision": "APPROVED", "comment": "ok" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["approval"]["decision"], "APPROVED");

        let permit_uri = format!("/api/permits/{permit_id}");
        let (_, body) = harness.call(Method::GET, &permit_uri, Some(&requestor), None).await;
        assert_eq!(body["permit"]["status"], "APPROVED");

        let (status, body) = harness
            .call(
                Method::PUT,
                &decision_uri,
                Some(&officer),
                Some(json!({ "decision": "REJECTED" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let message = body["message"].as_str().expect("message");
        assert!(message.contains("already processed"), "unexpected message: {message}");
    }

    #[tokio::test]
    async fn requestors_cannot_touch_permits_they_did_not_create() {
        let harness = harness().await;
        let (_, owner) = harness.user("owner@example.com", RoleName::Requestor).await;
        let (_, other) = harness.user("other@example.com", RoleName::Requestor).await;

        let (_, body) = harness
            .call(Method::POST, "/api/permits", Some(&owner), Some(hot_work_permit()))
            .await;
        let uri = format!("/api/permits/{}", body["permit"]["id"].as_str().expect("id"));

        let (status, _) = harness.call(Method::GET, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = harness
            .call(Method::PUT, &uri, Some(&other), Some(json!({ "title": "Hijacked" })))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = harness.call(Method::DELETE, &uri, Some(&other), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (_, listing) = harness.call(Method::GET, "/api/permits", Some(&other), None).await;
        assert_eq!(listing["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn elevated_registrations_cannot_log_in_until_approved() {
        let harness = harness().await;
        let (status, body) = harness
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "email": "New.Officer@Example.com",
                    "password": "correct-horse",
                    "firstName": "New",
                    "lastName": "Officer",
                    "role": "SAFETY_OFFICER",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["pendingApproval"], true);
        assert!(body.get("token").is_none());

        let credentials =
            json!({ "email": "new.officer@example.com", "password": "correct-horse" });
        let (status, body) =
            harness.call(Method::POST, "/api/auth/login", None, Some(credentials.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["pendingApproval"], true);

        let (_, admin) = harness.user("admin@example.com", RoleName::Admin).await;
        let (_, pending) =
            harness.call(Method::GET, "/api/users/pending", Some(&admin), None).await;
        let pending_id = pending["users"][0]["id"].as_str().expect("pending id").to_string();
        let (status, _) = harness
            .call(Method::POST, &format!("/api/users/{pending_id}/approve"), Some(&admin), None)
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            harness.call(Method::POST, "/api/auth/login", None, Some(credentials)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].as_str().is_some());
        assert_eq!(body["user"]["role"], "SAFETY_OFFICER");
    }

    #[tokio::test]
    async fn protected_routes_require_a_bearer_token() {
        let harness = harness().await;
        let (status, body) = harness.call(Method::GET, "/api/permits", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["message"].is_string());

        let (status, body) = harness.call(Method::GET, "/api/permits/work-types", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["workTypes"].as_array().map(Vec::len), Some(15));
    }

    #[tokio::test]
    async fn public_view_and_document_follow_the_permit() {
        let harness = harness().await;
        let (_, requestor) = harness.user("crew@example.com", RoleName::Requestor).await;
        let (_, body) = harness
            .call(Method::POST, "/api/permits", Some(&requestor), Some(hot_work_permit()))
            .await;
        let permit_id = body["permit"]["id"].as_str().expect("id").to_string();

        let (status, body) = harness
            .call(
                Method::POST,
                &format!("/api/permits/{permit_id}/workers"),
                None,
                Some(json!({ "name": "Ravi", "badgeNumber": "B-17" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["worker"]["name"], "Ravi");

        let (status, body) = harness
            .call(Method::GET, &format!("/api/permits/{permit_id}/public"), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["permit"]["status"], "PENDING");
        assert!(body["permit"].get("createdBy").is_none());

        let request = Request::builder()
            .uri(format!("/api/permits/{permit_id}/pdf"))
            .header(header::AUTHORIZATION, format!("Bearer {requestor}"))
            .body(Body::empty())
            .expect("request");
        let response = harness.app.clone().oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(content_type.starts_with("text/html"), "unexpected type: {content_type}");
    }

    #[tokio::test]
    async fn meter_readings_feed_the_dashboard() {
        let harness = harness().await;
        let (_, engineer) = harness.user("site@example.com", RoleName::SiteEngineer).await;
        let (_, requestor) = harness.user("viewer@example.com", RoleName::Requestor).await;

        for (reading, date) in [("120.5", "2024-03-01"), ("180.25", "2024-03-08")] {
            let (status, _) = harness
                .call(
                    Method::POST,
                    "/api/mis/readings",
                    Some(&engineer),
                    Some(json!({
                        "meterName": "Boiler feed",
                        "reading": reading,
                        "unit": "m3",
                        "readingDate": date,
                    })),
                )
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (status, _) = harness
            .call(
                Method::POST,
                "/api/mis/readings",
                Some(&requestor),
                Some(json!({ "meterName": "Boiler feed", "reading": "1", "unit": "m3" })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) =
            harness.call(Method::GET, "/api/mis/dashboard", Some(&requestor), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalReadings"], 2);
        assert_eq!(body["meters"].as_array().map(Vec::len), Some(1));
        assert_eq!(body["recentReadings"].as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn only_reviewers_decide_and_decided_permits_lock_for_owners() {
        let harness = harness().await;
        let (_, requestor) = harness.user("owner@example.com", RoleName::Requestor).await;
        let (_, engineer) = harness.user("engineer@example.com", RoleName::SiteEngineer).await;
        let (_, officer) = harness.user("officer@example.com", RoleName::SafetyOfficer).await;
        let (_, admin) = harness.user("admin@example.com", RoleName::Admin).await;

        let (_, body) = harness
            .call(Method::POST, "/api/permits", Some(&requestor), Some(hot_work_permit()))
            .await;
        let permit_uri = format!("/api/permits/{}", body["permit"]["id"].as_str().expect("id"));
        let approval_id = body["permit"]["approvals"][0]["id"].as_str().expect("approval");
        let decision_uri = format!("/api/approvals/{approval_id}/decision");
        let approve = json!({ "decision": "APPROVED" });

        for token in [&engineer, &requestor] {
            let (status, body) =
                harness.call(Method::PUT, &decision_uri, Some(token), Some(approve.clone())).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            assert!(body["message"].is_string());
        }
        let (status, _) =
            harness.call(Method::PUT, &decision_uri, Some(&officer), Some(approve)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = harness
            .call(Method::PUT, &permit_uri, Some(&requestor), Some(json!({ "title": "Moved" })))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "permit is APPROVED and can no longer be modified");
        let (status, _) = harness.call(Method::DELETE, &permit_uri, Some(&requestor), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = harness
            .call(Method::PUT, &permit_uri, Some(&admin), Some(json!({ "title": "Re-scoped" })))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["permit"]["title"], "Re-scoped");
        assert_eq!(body["permit"]["status"], "APPROVED");
    }

    #[tokio::test]
    async fn malformed_query_and_body_keep_the_message_envelope() {
        let harness = harness().await;
        let (_, admin) = harness.user("admin@example.com", RoleName::Admin).await;

        for uri in ["/api/permits?page=abc", "/api/approvals?limit=-1", "/api/users?page=x"] {
            let (status, body) = harness.call(Method::GET, uri, Some(&admin), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["message"].is_string(), "{uri}: {body}");
        }

        let (status, _) = harness
            .call(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "email": "engineer@example.com",
                    "password": "correct-horse",
                    "firstName": "Site",
                    "lastName": "Engineer",
                    "role": "SITE_ENGINEER",
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let (_, pending) =
            harness.call(Method::GET, "/api/users/pending", Some(&admin), None).await;
        let reject_uri =
            format!("/api/users/{}/reject", pending["users"][0]["id"].as_str().expect("id"));

        let (status, body) =
            harness.call_raw(Method::POST, &reject_uri, &admin, "{\"reason\": ").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["message"].is_string(), "{body}");

        let (status, body) = harness.call(Method::POST, &reject_uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["isActive"], false);
    }
}
