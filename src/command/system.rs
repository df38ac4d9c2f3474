//! Системные команды: `Ping`, `SupportedProtocolVersions`, `Login`,
//! `AuthStatus`. Выполняются без принципала.

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use spacestore_error::{AuthError, SpaceResult};
use tracing::debug;

use super::{Handler, Reply, Request};
use crate::{auth::LoginRequest, protocol::SUPPORTED_VERSIONS};

pub struct Ping;
pub struct SupportedVersions;
pub struct Login;
pub struct AuthStatus;

#[async_trait]
impl Handler for Ping {
    async fn handle(
        &self,
        _req: Request<'_>,
    ) -> SpaceResult<Reply> {
        Ok(Reply::ok(Bytes::from_static(b"pong")))
    }
}

#[async_trait]
impl Handler for SupportedVersions {
    async fn handle(
        &self,
        _req: Request<'_>,
    ) -> SpaceResult<Reply> {
        let mut body = BytesMut::with_capacity(1 + SUPPORTED_VERSIONS.len());
        body.put_u8(SUPPORTED_VERSIONS.len() as u8);
        body.put_slice(SUPPORTED_VERSIONS);
        Ok(Reply::ok(body.freeze()))
    }
}

#[async_trait]
impl Handler for Login {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply> {
        let login = LoginRequest::decode(&req.command.body)?;
        match req.services.auth.authenticate(&login).await {
            Ok(user) => {
                debug!(
                    connection_id = req.session.connection_id(),
                    user_id = %user.id,
                    "principal attached"
                );
                req.session.set_principal(user);
                Ok(Reply::empty())
            }
            Err(e) => {
                // Неудачная попытка снимает прежний принципал.
                req.session.clear_principal();
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Handler for AuthStatus {
    async fn handle(
        &self,
        req: Request<'_>,
    ) -> SpaceResult<Reply> {
        match req.session.require_principal() {
            Ok(_) => Ok(Reply::empty()),
            Err(_) => Err(AuthError::Unauthorized.into()),
        }
    }
}
