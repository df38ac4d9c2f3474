use async_trait::async_trait;
use dashmap::DashMap;
use spacestore_error::{AuthError, SpaceResult};
use tracing::debug;

use super::{api_key::generate_api_key, password::verify_password, User};
use crate::auth::password::hash_password;

/// Провайдер идентичности: проверяет учётные данные и возвращает
/// пользователя.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Проверяет пару имя/пароль.
    async fn validate_password(
        &self,
        username: &str,
        password: &str,
    ) -> SpaceResult<User>;

    /// Проверяет ключ API, уже прошедший структурную проверку.
    async fn validate_api_key(
        &self,
        api_key: &str,
    ) -> SpaceResult<User>;
}

#[derive(Debug, Clone)]
struct StoredUser {
    user: User,
    password_hash: String,
}

/// Провайдер в памяти. Пользователи индексируются по имени.
#[derive(Debug, Default)]
pub struct InMemoryIdentityProvider {
    users: DashMap<String, StoredUser>,
    api_keys: DashMap<String, String>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Добавляет или заменяет пользователя. Пароль хранится только как хеш.
    pub fn add_user(
        &self,
        user: User,
        password: &str,
    ) {
        debug!(user_id = %user.id, name = %user.name, "identity: user added");
        self.users.insert(
            user.name.clone(),
            StoredUser {
                user,
                password_hash: hash_password(password),
            },
        );
    }

    /// Выпускает ключ API для пользователя с именем `username`.
    pub fn issue_api_key(
        &self,
        username: &str,
    ) -> SpaceResult<String> {
        if !self.users.contains_key(username) {
            return Err(AuthError::InvalidCredentials.into());
        }
        let key = generate_api_key();
        self.api_keys.insert(key.clone(), username.to_string());
        Ok(key)
    }

    pub fn revoke_api_key(
        &self,
        api_key: &str,
    ) -> bool {
        self.api_keys.remove(api_key).is_some()
    }

    pub fn user(
        &self,
        username: &str,
    ) -> Option<User> {
        self.users.get(username).map(|s| s.user.clone())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов для InMemoryIdentityProvider
////////////////////////////////////////////////////////////////////////////////

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    async fn validate_password(
        &self,
        username: &str,
        password: &str,
    ) -> SpaceResult<User> {
        let stored = self
            .users
            .get(username)
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password(&stored.password_hash, password) {
            return Err(AuthError::InvalidCredentials.into());
        }
        Ok(stored.user.clone())
    }

    async fn validate_api_key(
        &self,
        api_key: &str,
    ) -> SpaceResult<User> {
        let username = self
            .api_keys
            .get(api_key)
            .map(|name| name.clone())
            .ok_or(AuthError::InvalidCredentials)?;
        self.user(&username)
            .ok_or_else(|| AuthError::InvalidCredentials.into())
    }
}
