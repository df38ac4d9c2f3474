use std::sync::Arc;

use spacestore_error::{AuthError, GenericError, SpaceResult};
use tracing::{debug, info};

use super::{api_key::check_api_key_format, IdentityProvider, User};
use crate::protocol::WireReader;

/// Метод входа `1`: имя и пароль.
pub const LOGIN_METHOD_PASSWORD: u8 = 1;
/// Метод входа `2`: ключ API.
pub const LOGIN_METHOD_API_KEY: u8 = 2;

/// Разобранное тело команды `Login`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginRequest {
    Password { username: String, password: String },
    ApiKey(String),
}

/// Точка входа аутентификации поверх провайдера идентичности.
#[derive(Clone)]
pub struct AuthManager {
    provider: Arc<dyn IdentityProvider>,
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl LoginRequest {
    /// Разбирает `method: u8` и одну или две строки с префиксом `u16`.
    ///
    /// Неизвестный метод даёт `InvalidCredentials`, обрезанное тело
    /// `BadRequest`.
    pub fn decode(body: &[u8]) -> SpaceResult<Self> {
        let mut r = WireReader::new(body);
        let method = r.u8().map_err(truncated)?;
        match method {
            LOGIN_METHOD_PASSWORD => {
                let username = r.short_str("username").map_err(truncated)?.to_string();
                let password = r.short_str("password").map_err(truncated)?.to_string();
                Ok(Self::Password { username, password })
            }
            LOGIN_METHOD_API_KEY => {
                let key = r.short_str("api_key").map_err(truncated)?.to_string();
                Ok(Self::ApiKey(key))
            }
            other => Err(AuthError::UnsupportedMethod { method: other }.into()),
        }
    }

    /// Кодирует запрос (используется клиентом).
    pub fn encode_into(
        &self,
        buf: &mut Vec<u8>,
    ) -> SpaceResult<()> {
        match self {
            Self::Password { username, password } => {
                buf.push(LOGIN_METHOD_PASSWORD);
                crate::protocol::put_short_str(buf, "username", username)?;
                crate::protocol::put_short_str(buf, "password", password)?;
            }
            Self::ApiKey(key) => {
                buf.push(LOGIN_METHOD_API_KEY);
                crate::protocol::put_short_str(buf, "api_key", key)?;
            }
        }
        Ok(())
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Password { .. } => "password",
            Self::ApiKey(_) => "api_key",
        }
    }
}

fn truncated(e: spacestore_error::WireError) -> spacestore_error::StackError {
    GenericError::bad_request(format!("malformed login payload: {e}")).into()
}

impl AuthManager {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        Self { provider }
    }

    /// Проверяет учётные данные и возвращает пользователя.
    ///
    /// Неактивный или неподтверждённый пользователь считается неверными
    /// учётными данными.
    pub async fn authenticate(
        &self,
        request: &LoginRequest,
    ) -> SpaceResult<User> {
        let user = match request {
            LoginRequest::Password { username, password } => {
                self.provider.validate_password(username, password).await?
            }
            LoginRequest::ApiKey(key) => {
                check_api_key_format(key)?;
                self.provider.validate_api_key(key).await?
            }
        };

        if !user.is_valid() {
            debug!(user_id = %user.id, "login rejected: user inactive or unverified");
            return Err(AuthError::InvalidCredentials.into());
        }

        info!(
            user_id = %user.id,
            method = request.method_name(),
            "login succeeded"
        );
        Ok(user)
    }
}

impl std::fmt::Debug for AuthManager {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("AuthManager").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use spacestore_error::StatusCode;

    use super::*;
    use crate::auth::InMemoryIdentityProvider;

    fn manager() -> (AuthManager, Arc<InMemoryIdentityProvider>) {
        let provider = Arc::new(InMemoryIdentityProvider::new());
        provider.add_user(User::new("u-alice", "alice"), "x");
        let mut inactive = User::new("u-bob", "bob");
        inactive.is_active = false;
        provider.add_user(inactive, "y");
        (AuthManager::new(provider.clone()), provider)
    }

    fn encoded(req: &LoginRequest) -> Vec<u8> {
        let mut buf = Vec::new();
        req.encode_into(&mut buf).unwrap();
        buf
    }

    #[test]
    fn test_decode_password_login() {
        let req = LoginRequest::Password {
            username: "alice".into(),
            password: "x".into(),
        };
        let buf = encoded(&req);
        assert_eq!(buf, vec![1, 0, 5, b'a', b'l', b'i', b'c', b'e', 0, 1, b'x']);
        assert_eq!(LoginRequest::decode(&buf).unwrap(), req);
    }

    #[test]
    fn test_decode_errors() {
        let err = LoginRequest::decode(&[9]).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidCredentials);

        let err = LoginRequest::decode(&[1, 0, 5, b'a']).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadRequest);

        let err = LoginRequest::decode(&[]).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn test_authenticate_password() {
        let (m, _) = manager();
        let user = m
            .authenticate(&LoginRequest::Password {
                username: "alice".into(),
                password: "x".into(),
            })
            .await
            .unwrap();
        assert_eq!(user.name, "alice");
    }

    /// Тест проверяет, что неактивный пользователь не может войти даже с
    /// верным паролем.
    #[tokio::test]
    async fn test_inactive_user_rejected() {
        let (m, _) = manager();
        let err = m
            .authenticate(&LoginRequest::Password {
                username: "bob".into(),
                password: "y".into(),
            })
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidCredentials);
    }

    #[tokio::test]
    async fn test_authenticate_api_key() {
        let (m, provider) = manager();
        let key = provider.issue_api_key("alice").unwrap();
        let user = m.authenticate(&LoginRequest::ApiKey(key)).await.unwrap();
        assert_eq!(user.id, "u-alice");

        let err = m
            .authenticate(&LoginRequest::ApiKey("not-a-key".into()))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::InvalidCredentials);
    }
}
