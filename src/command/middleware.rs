use async_trait::async_trait;
use spacestore_error::{AuthError, SpaceResult};
use tracing::trace;

use super::{Handler, Reply, Request, Services};
use crate::{auth::User, catalog::PermissionLevel};

/// Требует валидного принципала на соединении.
pub struct Authenticated<H> {
    inner: H,
}

/// Требует уровень доступа к базе `command.database`.
///
/// Пустое имя базы пропускает проверку, администратор проходит всегда.
pub struct DatabaseAccess<H> {
    inner: H,
    level: PermissionLevel,
}

/// Проверяет доступ `user` к базе `database`.
///
/// Отсутствующая база даёт `DatabaseNotFound`, недостаточный уровень
/// `Forbidden`.
pub async fn authorize(
    services: &Services,
    user: &User,
    database: &str,
    level: PermissionLevel,
) -> SpaceResult<()> {
    if user.is_admin() {
        return Ok(());
    }
    let db = services.catalog.get_database(database).await?;
    if !db.has_permission(&user.id, level) {
        return Err(AuthError::Forbidden {
            database: database.to_string(),
            required: level.as_str(),
        }
        .into());
    }
    trace!(user_id = %user.id, db = database, level = %level, "access granted");
    Ok(())
}

impl<H> Authenticated<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

impl<H> DatabaseAccess<H> {
    pub fn new(
        inner: H,
        level: PermissionLevel,
    ) -> Self {
        Self { inner, level }
    }
}

#[async_trait]
impl<H: Handler> Handler for Authenticated<H> {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply> {
        req.session.require_principal()?;
        self.inner.handle(req).await
    }
}

#[async_trait]
impl<H: Handler> Handler for DatabaseAccess<H> {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply> {
        let database = req.command.database.as_str();
        if !database.is_empty() {
            let user = req.session.require_principal()?;
            authorize(req.services, &user, database, self.level).await?;
        }
        self.inner.handle(req).await
    }
}
