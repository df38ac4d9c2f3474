//! Аутентификация: пользователи, пароли, ключи API и провайдер
//! идентичности.

pub mod api_key;
pub mod manager;
pub mod password;
pub mod provider;
pub mod user;

pub use api_key::{check_api_key_format, generate_api_key, API_KEY_PREFIX, MAX_API_KEY_LEN};
pub use manager::{AuthManager, LoginRequest, LOGIN_METHOD_API_KEY, LOGIN_METHOD_PASSWORD};
pub use password::{hash_password, verify_password};
pub use provider::{IdentityProvider, InMemoryIdentityProvider};
pub use user::{User, ADMIN_ROLE};
