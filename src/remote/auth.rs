//! In-memory identity provider.

use super::AuthService;
use crate::error::AuthError;
use crate::types::User;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

/// Minimum accepted password length.
const MIN_PASSWORD_LEN: usize = 6;

struct Account {
    password: String,
    user: User,
}

/// Email/password accounts kept in memory, with one signed-in user.
#[derive(Default)]
pub struct MemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    current: RwLock<Option<User>>,
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with `user` already signed in.
    pub fn signed_in(user: User) -> Self {
        let auth = Self::new();
        auth.sign_in_as(user);
        auth
    }

    pub fn sign_in_as(&self, user: User) {
        *self.current.write() = Some(user);
    }

    pub fn sign_out(&self) {
        *self.current.write() = None;
    }
}

fn check_email(email: &str) -> Result<(), AuthError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(AuthError::InvalidEmail),
    }
}

#[async_trait]
impl AuthService for MemoryAuth {
    fn current_user(&self) -> Option<User> {
        self.current.read().clone()
    }

    async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        check_email(email)?;
        let user = {
            let accounts = self.accounts.lock();
            let account = accounts.get(email).ok_or(AuthError::UserNotFound)?;
            if account.password != password {
                return Err(AuthError::InvalidCredential);
            }
            account.user.clone()
        };
        self.sign_in_as(user.clone());
        tracing::info!(user = %user.id, "signed in");
        Ok(user)
    }

    async fn register(
        &self,
        email: &str,
        password: &str,
        display_name: Option<&str>,
    ) -> Result<User, AuthError> {
        check_email(email)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::WeakPassword);
        }

        let user = {
            let mut accounts = self.accounts.lock();
            if accounts.contains_key(email) {
                return Err(AuthError::EmailAlreadyInUse);
            }
            let user = User {
                id: uuid::Uuid::new_v4().simple().to_string(),
                display_name: display_name.map(str::to_string),
                email: Some(email.to_string()),
            };
            accounts.insert(
                email.to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            user
        };
        self.sign_in_as(user.clone());
        tracing::info!(user = %user.id, "registered");
        Ok(user)
    }

    async fn logout(&self) -> Result<(), AuthError> {
        self.sign_out();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_login_logout() {
        let auth = MemoryAuth::new();
        assert!(auth.current_user().is_none());

        let user = auth
            .register("ana@example.com", "secret1", Some("Ana"))
            .await
            .unwrap();
        assert_eq!(auth.current_user(), Some(user.clone()));

        auth.logout().await.unwrap();
        assert!(auth.current_user().is_none());

        let again = auth.login("ana@example.com", "secret1").await.unwrap();
        assert_eq!(again.id, user.id);
    }

    #[tokio::test]
    async fn test_structured_errors() {
        let auth = MemoryAuth::new();
        assert_eq!(
            auth.register("not-an-email", "secret1", None).await,
            Err(AuthError::InvalidEmail)
        );
        assert_eq!(
            auth.register("ana@example.com", "123", None).await,
            Err(AuthError::WeakPassword)
        );
        auth.register("ana@example.com", "secret1", None)
            .await
            .unwrap();
        assert_eq!(
            auth.register("ana@example.com", "secret2", None).await,
            Err(AuthError::EmailAlreadyInUse)
        );
        assert_eq!(
            auth.login("ana@example.com", "wrong!").await,
            Err(AuthError::InvalidCredential)
        );
        assert_eq!(
            auth.login("bob@example.com", "secret1").await,
            Err(AuthError::UserNotFound)
        );
    }
}
