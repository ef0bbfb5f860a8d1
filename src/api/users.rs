//! Profile and admin account endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use validator::Validate;

use crate::api::extract::{AdminUser, CurrentUser, ValidatedJson};
use crate::api::AppState;
use crate::domain::aggregates::{Role, User};
use crate::services::{IssuedUser, Profile};
use crate::Result;

pub async fn profile(State(s): State<AppState>, CurrentUser(user): CurrentUser) -> Result<Json<Profile>> {
    Ok(Json(s.services().users.profile(&user).await?))
}

pub async fn list_users(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<User>>> {
    Ok(Json(s.services().users.list().await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 120))]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Role,
}

pub async fn create_user(
    State(s): State<AppState>,
    AdminUser(admin): AdminUser,
    ValidatedJson(r): ValidatedJson<CreateUserRequest>,
) -> Result<(StatusCode, Json<IssuedUser>)> {
    tracing::info!(admin_id = %admin.id, role = r.role.as_str(), "admin creating user");
    let issued = s.services().users.create(&r.email, r.name, r.role).await?;
    Ok((StatusCode::CREATED, Json(issued)))
}

#[cfg(test)]
mod tests {
    use crate::api::test_support::TestApp;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_profile_reports_first_time() {
        let app = TestApp::new().await;
        let (status, body) = app.call(Method::GET, "/api/v1/profile", app.customer_token(), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["role"], "customer");
        assert_eq!(body["orderCount"], 0);
        assert_eq!(body["isFirstTime"], true);
        assert!(body.get("apiToken").is_none());
    }

    #[tokio::test]
    async fn test_admin_issues_tokens() {
        let app = TestApp::new().await;
        let body = json!({"email": "Kiran@Example.com", "name": "Kiran"});
        let (status, issued) = app.call(Method::POST, "/api/v1/admin/users", app.admin_token(), Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issued["email"], "kiran@example.com");
        let token = issued["apiToken"].as_str().unwrap().to_string();

        let (status, me) = app.call(Method::GET, "/api/v1/profile", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["id"], issued["id"]);

        let (status, body) = app
            .call(Method::POST, "/api/v1/admin/users", app.admin_token(), Some(json!({"email": "not-an-email"})))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");

        let (status, _) = app.call(Method::GET, "/api/v1/admin/users", Some(token.as_str()), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
