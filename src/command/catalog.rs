use async_trait::async_trait;
use spacestore_error::SpaceResult;

use super::{authorize, Handler, Reply, Request};
use crate::{
    catalog::PermissionLevel,
    codec::{marshal, Value},
};

/// `DatabaseGet`: запись базы данных, обёрнутая в `Binary`.
pub struct DatabaseGet;

/// `CollectionGet`: запись коллекции, обёрнутая в `Binary`.
pub struct CollectionGet;

#[async_trait]
impl Handler for DatabaseGet {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply> {
        let mut payload = req.payload();
        let name = payload.key("database")?;

        let user = req.session.require_principal()?;
        authorize(req.services, &user, name, PermissionLevel::ReadOnly).await?;

        let database = req.services.catalog.get_database(name).await?;
        Reply::value(&Value::Binary(marshal(&database)?))
    }
}

#[async_trait]
impl Handler for CollectionGet {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply> {
        let mut payload = req.payload();
        let database = payload.key("database")?;
        let name = payload.key("collection")?;

        let user = req.session.require_principal()?;
        authorize(req.services, &user, database, PermissionLevel::ReadOnly).await?;

        let collection = req
            .services
            .catalog
            .get_collection(database, name)
            .await?;
        Reply::value(&Value::Binary(marshal(&collection)?))
    }
}
