use std::sync::Arc;

use parking_lot::RwLock;
use spacestore_error::{AuthError, SpaceResult};

use crate::auth::User;

/// Состояние соединения, видимое обработчикам команд: идентификатор и
/// принципал после `Login`.
#[derive(Debug)]
pub struct Session {
    connection_id: Arc<str>,
    principal: RwLock<Option<User>>,
}

impl Session {
    pub fn new(connection_id: impl Into<Arc<str>>) -> Self {
        Self {
            connection_id: connection_id.into(),
            principal: RwLock::new(None),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn principal(&self) -> Option<User> {
        self.principal.read().clone()
    }

    /// Идентификатор принципала для логов.
    pub fn principal_id(&self) -> Option<String> {
        self.principal.read().as_ref().map(|u| u.id.clone())
    }

    pub fn set_principal(
        &self,
        user: User,
    ) {
        *self.principal.write() = Some(user);
    }

    pub fn clear_principal(&self) {
        *self.principal.write() = None;
    }

    /// Принципал, если он есть, активен и подтверждён; иначе `Unauthorized`.
    pub fn require_principal(&self) -> SpaceResult<User> {
        match &*self.principal.read() {
            Some(user) if user.is_valid() => Ok(user.clone()),
            _ => Err(AuthError::Unauthorized.into()),
        }
    }
}
