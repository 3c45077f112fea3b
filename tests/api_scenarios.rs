//! HTTP scenarios against the router backed by the in-memory store.
//!
//! Every test builds a fresh application with an administrator account
//! (`admin@sqlm.dev`) and drives it through `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE},
        Method, Request, StatusCode,
    },
    Router,
};
use http_body_util::BodyExt;
use secrecy::SecretString;
use serde_json::{json, Value};
use sqlm_auth::{
    api::{bootstrap, router, AdminAccount, AppState, AuthConfig},
    auth::StaticPolicy,
    store::{memory::MemoryStore, SharedStore},
};
use std::sync::Arc;
use tower::ServiceExt;

const ADMIN_EMAIL: &str = "admin@sqlm.dev";
const ADMIN_PASSWORD: &str = "admin-password";

struct TestApp {
    router: Router,
}

struct TestResponse {
    status: StatusCode,
    headers: axum::http::HeaderMap,
    body: Value,
}

impl TestApp {
    async fn new() -> Self {
        let store: SharedStore = Arc::new(MemoryStore::new());
        bootstrap::ensure_admin(
            &*store,
            &AdminAccount {
                email: ADMIN_EMAIL.to_string(),
                password: SecretString::from(ADMIN_PASSWORD),
                team: "admins".to_string(),
            },
        )
        .await
        .unwrap();

        let policy = Arc::new(StaticPolicy::embedded().unwrap());
        let state = Arc::new(AppState::new(store, policy, AuthConfig::new()));

        Self {
            router: router(state),
        }
    }

    async fn call(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut request = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => request
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .call(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["authentication_token"]["token"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    async fn create_user(&self, token: &str, email: &str, role: &str, team: &str) -> Value {
        let response = self
            .call(
                Method::POST,
                "/v1/users",
                Some(token),
                Some(json!({
                    "email": email,
                    "password": "member-password",
                    "role": role,
                    "team": team,
                })),
            )
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{}", response.body);
        response.body["user"].clone()
    }
}

#[tokio::test]
async fn login_issues_a_login_token() {
    let app = TestApp::new().await;

    let response = app
        .call(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": " Admin@SQLM.dev ", "password": ADMIN_PASSWORD })),
        )
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    let token = response.body["authentication_token"]["token"].as_str().unwrap();
    assert!(token.starts_with("sml_"));
    assert_eq!(response.body["authentication_token"]["scope"], "login");
}

#[tokio::test]
async fn wrong_password_and_unknown_email_look_the_same() {
    let app = TestApp::new().await;

    for (email, password) in [(ADMIN_EMAIL, "not-the-password"), ("ghost@sqlm.dev", ADMIN_PASSWORD)] {
        let response = app
            .call(
                Method::POST,
                "/v1/tokens/authentication",
                None,
                Some(json!({ "email": email, "password": password })),
            )
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.body, json!({ "error": "invalid credentials" }));
    }
}

#[tokio::test]
async fn login_validates_fields() {
    let app = TestApp::new().await;

    let response = app
        .call(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "not-an-email", "password": "short" })),
        )
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["errors"]["email"], "must be a valid email address");
    assert_eq!(response.body["errors"]["password"], "must be at least 8 bytes long");
}

#[tokio::test]
async fn current_user_requires_a_token() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let response = app.call(Method::GET, "/v1/users", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["email"], ADMIN_EMAIL);
    assert_eq!(response.body["user"]["role"], "admin");
    assert_eq!(response.body["user"]["team"]["name"], "admins");
    assert!(response.body["user"].get("password").is_none());

    let response = app.call(Method::GET, "/v1/users", None, None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_token_is_rejected_with_challenge() {
    let app = TestApp::new().await;

    let response = app
        .call(
            Method::GET,
            "/v1/users",
            Some("sml_AAAAAAAAAAAAAAAAAAAAAA"),
            None,
        )
        .await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers[WWW_AUTHENTICATE], "Bearer");
}

#[tokio::test]
async fn read_only_token_cannot_open_a_session() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let response = app
        .call(Method::POST, "/v1/tokens/read-only", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let read_only = response.body["read_only_token"]["token"].as_str().unwrap();
    assert!(read_only.starts_with("smr_"));

    let response = app.call(Method::GET, "/v1/users", Some(read_only), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_removes_every_login_token() {
    let app = TestApp::new().await;
    let first = app.admin_token().await;
    let second = app.admin_token().await;

    let response = app
        .call(Method::DELETE, "/v1/tokens/authentication", Some(&first), None)
        .await;
    assert_eq!(response.status, StatusCode::NO_CONTENT);

    for token in [&first, &second] {
        let response = app.call(Method::GET, "/v1/users", Some(token), None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    let response = app
        .call(Method::DELETE, "/v1/tokens/authentication", None, None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn registration_creates_team_on_demand_and_rejects_duplicates() {
    let app = TestApp::new().await;
    let token = app.admin_token().await;

    let user = app.create_user(&token, "dev@sqlm.dev", "user", "backend").await;
    assert_eq!(user["version"], 1);
    assert_eq!(user["team"]["name"], "backend");

    let team_id = user["team"]["id"].as_i64().unwrap();
    let response = app
        .call(Method::GET, &format!("/v1/teams/{team_id}"), Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["team"]["num_members"], 1);

    let response = app
        .call(
            Method::POST,
            "/v1/users",
            Some(&token),
            Some(json!({
                "email": "DEV@sqlm.dev",
                "password": "member-password",
                "role": "user",
                "team": "backend",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.body["errors"]["email"],
        "a record with this email already exists"
    );
}

#[tokio::test]
async fn role_without_permission_is_forbidden() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    app.create_user(&admin, "reader@sqlm.dev", "reader", "audit").await;
    let reader = app.login("reader@sqlm.dev", "member-password").await;

    let response = app.call(Method::GET, "/v1/users", Some(&reader), None).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .call(
            Method::POST,
            "/v1/teams",
            Some(&reader),
            Some(json!({ "name": "rogue" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .call(Method::POST, "/v1/tokens/read-only", Some(&reader), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn role_change_applies_to_the_next_request() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let user = app.create_user(&admin, "dev@sqlm.dev", "user", "backend").await;
    let dev = app.login("dev@sqlm.dev", "member-password").await;

    let response = app
        .call(Method::POST, "/v1/tokens/read-only", Some(&dev), None)
        .await;
    assert_eq!(response.status, StatusCode::CREATED);

    let response = app
        .call(
            Method::PATCH,
            &format!("/v1/users/{}", user["id"]),
            Some(&admin),
            Some(json!({ "version": 1, "role": "reader" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .call(Method::POST, "/v1/tokens/read-only", Some(&dev), None)
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn stale_update_conflicts_and_retry_succeeds() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let user = app.create_user(&admin, "dev@sqlm.dev", "user", "backend").await;
    let uri = format!("/v1/users/{}", user["id"]);

    let response = app
        .call(
            Method::PATCH,
            &uri,
            Some(&admin),
            Some(json!({ "version": 1, "activated": false })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["version"], 2);
    assert_eq!(response.body["user"]["activated"], false);

    let response = app
        .call(
            Method::PATCH,
            &uri,
            Some(&admin),
            Some(json!({ "version": 1, "activated": true })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = app.call(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(response.body["user"]["activated"], false);
    assert_eq!(response.body["user"]["version"], 2);

    let response = app
        .call(
            Method::PATCH,
            &uri,
            Some(&admin),
            Some(json!({ "version": 0, "activated": true })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["errors"]["version"], "must be greater than zero");

    let response = app
        .call(
            Method::PATCH,
            &uri,
            Some(&admin),
            Some(json!({ "version": 2, "activated": true })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["version"], 3);
}

#[tokio::test]
async fn permission_follows_the_role_of_a_fresh_account() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let response = app
        .call(
            Method::POST,
            "/v1/users",
            Some(&admin),
            Some(json!({
                "email": "a@b",
                "password": "abc12345",
                "role": "anon",
                "team": "aces",
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.body["user"]["version"], 1);
    let uri = format!("/v1/users/{}", response.body["user"]["id"]);

    let token = app.login("a@b", "abc12345").await;
    let response = app.call(Method::GET, "/v1/users", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .call(
            Method::PATCH,
            &uri,
            Some(&admin),
            Some(json!({ "version": 1, "role": "reader" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.call(Method::GET, "/v1/users", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["user"]["email"], "a@b");
}

#[tokio::test]
async fn deactivated_account_cannot_log_in() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let user = app.create_user(&admin, "dev@sqlm.dev", "user", "backend").await;

    app.call(
        Method::PATCH,
        &format!("/v1/users/{}", user["id"]),
        Some(&admin),
        Some(json!({ "version": 1, "activated": false })),
    )
    .await;

    let response = app
        .call(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "dev@sqlm.dev", "password": "member-password" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deactivated_account_tokens_stop_working() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let user = app.create_user(&admin, "dev@sqlm.dev", "user", "backend").await;
    let token = app.login("dev@sqlm.dev", "member-password").await;

    let response = app.call(Method::GET, "/v1/users", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app
        .call(
            Method::PATCH,
            &format!("/v1/users/{}", user["id"]),
            Some(&admin),
            Some(json!({ "version": 1, "activated": false })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.call(Method::GET, "/v1/users", Some(&token), None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers[WWW_AUTHENTICATE], "Bearer");

    let response = app
        .call(Method::POST, "/v1/tokens/read-only", Some(&token), None)
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn password_change_takes_effect_at_login() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let user = app.create_user(&admin, "dev@sqlm.dev", "user", "backend").await;

    let response = app
        .call(
            Method::PATCH,
            &format!("/v1/users/{}", user["id"]),
            Some(&admin),
            Some(json!({ "version": 1, "password": "brand-new-password" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    app.login("dev@sqlm.dev", "brand-new-password").await;
    let response = app
        .call(
            Method::POST,
            "/v1/tokens/authentication",
            None,
            Some(json!({ "email": "dev@sqlm.dev", "password": "member-password" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn deleting_accounts_and_teams() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;
    let user = app.create_user(&admin, "dev@sqlm.dev", "user", "backend").await;
    let team_uri = format!("/v1/teams/{}", user["team"]["id"]);
    let user_uri = format!("/v1/users/{}", user["id"]);

    let response = app
        .call(Method::DELETE, &team_uri, Some(&admin), Some(json!({ "version": 1 })))
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(response.body["errors"]["team"], "team still has members");

    let response = app
        .call(Method::DELETE, &user_uri, Some(&admin), Some(json!({ "version": 7 })))
        .await;
    assert_eq!(response.status, StatusCode::CONFLICT);

    let response = app
        .call(Method::DELETE, &user_uri, Some(&admin), Some(json!({ "version": 1 })))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "user successfully deleted");

    let response = app
        .call(Method::DELETE, &user_uri, Some(&admin), Some(json!({ "version": 1 })))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .call(Method::DELETE, &team_uri, Some(&admin), Some(json!({ "version": 1 })))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["message"], "team successfully deleted");
}

#[tokio::test]
async fn teams_are_created_updated_and_read_back() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let response = app
        .call(
            Method::POST,
            "/v1/teams",
            Some(&admin),
            Some(json!({
                "name": "data",
                "meta": { "git_url": "https://git.example.com/data.git" },
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::CREATED);
    let uri = format!("/v1/teams/{}", response.body["team"]["id"]);
    assert_eq!(response.body["team"]["meta"]["server_url"], "");

    let response = app
        .call(
            Method::PATCH,
            &uri,
            Some(&admin),
            Some(json!({
                "version": 1,
                "meta": { "server_url": "https://db.example.com" },
            })),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["team"]["version"], 2);

    let response = app.call(Method::GET, &uri, Some(&admin), None).await;
    assert_eq!(response.body["team"]["name"], "data");
    assert_eq!(
        response.body["team"]["meta"]["git_url"],
        "https://git.example.com/data.git"
    );
    assert_eq!(
        response.body["team"]["meta"]["server_url"],
        "https://db.example.com"
    );

    let response = app
        .call(
            Method::POST,
            "/v1/teams",
            Some(&admin),
            Some(json!({ "name": "data" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(
        response.body["errors"]["name"],
        "a record with this name already exists"
    );
}

#[tokio::test]
async fn missing_records_and_bad_bodies() {
    let app = TestApp::new().await;
    let admin = app.admin_token().await;

    let response = app.call(Method::GET, "/v1/users/9999", Some(&admin), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app.call(Method::GET, "/v1/teams/abc", Some(&admin), None).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);

    let response = app
        .call(
            Method::POST,
            "/v1/users",
            Some(&admin),
            Some(json!({ "email": "x@y" })),
        )
        .await;
    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(response.body["errors"]["body"].is_string());
}

#[tokio::test]
async fn public_routes_need_no_token() {
    let app = TestApp::new().await;

    let response = app.call(Method::GET, "/v1/ping", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["api_version"], "v1");

    let response = app.call(Method::GET, "/health", None, None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["name"], env!("CARGO_PKG_NAME"));
}
