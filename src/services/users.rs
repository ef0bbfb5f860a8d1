//! Accounts, profiles and bearer-token lookup.

use std::sync::Arc;

use serde::Serialize;

use crate::domain::aggregates::{Role, User};
use crate::store::Store;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(flatten)]
    pub user: User,
    pub order_count: u64,
    pub is_first_time: bool,
}

/// A freshly created account together with its credential. The token is
/// only ever returned here.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedUser {
    #[serde(flatten)]
    pub user: User,
    pub api_token: String,
}

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn Store>,
}

impl UserService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn authenticate(&self, token: &str) -> Result<User> {
        if token.is_empty() {
            return Err(EcommerceError::Unauthorized);
        }
        self.store.user_by_token(token).await?.ok_or(EcommerceError::Unauthorized)
    }

    pub async fn profile(&self, user: &User) -> Result<Profile> {
        let order_count = self.store.count_orders_for_user(user.id).await?;
        Ok(Profile { user: user.clone(), order_count, is_first_time: order_count == 0 })
    }

    pub async fn list(&self) -> Result<Vec<User>> {
        Ok(self.store.list_users().await?)
    }

    #[tracing::instrument(skip(self, name))]
    pub async fn create(&self, email: &str, name: Option<String>, role: Role) -> Result<IssuedUser> {
        let user = User::new(email, name, role);
        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, role = role.as_str(), "user created");
        let api_token = user.api_token.clone();
        Ok(IssuedUser { user, api_token })
    }

    /// Ensures the configured admin exists. Safe to call on every start: a
    /// changed token for a known email replaces the old one, and an existing
    /// account with that email is promoted to admin.
    pub async fn bootstrap_admin(&self, email: &str, token: &str) -> Result<User> {
        if let Some(existing) = self.store.user_by_token(token).await? {
            if existing.is_admin() {
                return Ok(existing);
            }
            tracing::warn!(user_id = %existing.id, "bootstrap admin token belongs to a non-admin account");
            return Err(EcommerceError::Conflict("user"));
        }
        let email = email.trim().to_lowercase();
        if let Some(mut existing) = self.store.user_by_email(&email).await? {
            existing.role = Role::Admin;
            existing.api_token = token.to_string();
            self.store.update_user(&existing).await?;
            tracing::warn!(user_id = %existing.id, %email, "bootstrap admin token rotated");
            return Ok(existing);
        }
        let admin = User::with_token(&email, Some("Administrator".into()), Role::Admin, token.to_string());
        match self.store.insert_user(&admin).await {
            Ok(()) => {
                tracing::info!(email = %admin.email, "bootstrap admin created");
                Ok(admin)
            }
            Err(e) => {
                tracing::warn!(email = %admin.email, error = %e, "bootstrap admin not created");
                Err(e.into())
            }
        }
    }
}
