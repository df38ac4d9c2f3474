//! Общий стенд интеграционных тестов: сервер на `127.0.0.1:0` с базой `d`.

#![allow(dead_code)]

use std::{net::SocketAddr, sync::Arc, time::Duration};

use spacestore::{
    auth::{AuthManager, InMemoryIdentityProvider, User, ADMIN_ROLE},
    catalog::{Collection, Database, EngineKind, InMemoryCatalog, PermissionLevel},
    command::{Dispatcher, Services},
    engine::{EngineOptions, EngineRegistry},
    network::{ConnectionConfig, ConnectionManager, ConnectionRegistry, Server},
    protocol::{read_frame_into, Command, Message, Response},
};
use tokio::{io::AsyncWriteExt, net::TcpStream};

pub struct TestServer {
    pub addr: SocketAddr,
    pub manager: Arc<ConnectionManager>,
    pub engines: Arc<EngineRegistry>,
}

/// База `d`: `alice` (ReadWrite), `bob` (ReadOnly), `root` (admin без
/// явного доступа). Коллекции `c` (kv), `blobs` (object), `q` (broker).
pub async fn start() -> TestServer {
    start_with(ConnectionConfig::default()).await
}

pub async fn start_with(config: ConnectionConfig) -> TestServer {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.put_database(
        Database::new("d")
            .with_user("u-alice", PermissionLevel::ReadWrite)
            .with_user("u-bob", PermissionLevel::ReadOnly),
    );
    for (name, kind) in [
        ("c", EngineKind::KeyValue),
        ("blobs", EngineKind::Object),
        ("q", EngineKind::Broker),
    ] {
        catalog
            .put_collection(Collection::new("d", name, kind))
            .unwrap();
    }

    let provider = Arc::new(InMemoryIdentityProvider::new());
    provider.add_user(User::new("u-alice", "alice"), "x");
    provider.add_user(User::new("u-bob", "bob"), "y");
    provider.add_user(User::new("u-root", "root").with_role(ADMIN_ROLE), "z");

    let registry = Arc::new(ConnectionRegistry::new());
    let options = EngineOptions {
        sweep_interval: Duration::from_millis(20),
        cleanup_interval: Duration::from_millis(50),
        batch_timeout: Duration::from_millis(5),
        ..EngineOptions::default()
    };
    let engines = Arc::new(EngineRegistry::new(registry.clone(), options));
    engines.load(catalog.as_ref()).await.unwrap();

    let services = Arc::new(Services {
        catalog,
        engines: engines.clone(),
        auth: AuthManager::new(provider),
    });
    let dispatcher = Arc::new(Dispatcher::new(services));
    let manager = Arc::new(ConnectionManager::new(config, registry, dispatcher));

    let server = Server::bind("127.0.0.1:0".parse().unwrap(), manager.clone())
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    TestServer {
        addr,
        manager,
        engines,
    }
}

pub async fn send(
    stream: &mut TcpStream,
    command: &Command,
) {
    let mut buf = Vec::new();
    command.encode_frame(&mut buf).unwrap();
    stream.write_all(&buf).await.unwrap();
}

pub async fn recv(stream: &mut TcpStream) -> Response {
    let mut frame = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), read_frame_into(stream, &mut frame))
        .await
        .expect("response timed out")
        .unwrap();
    Response::decode(Message::decode(&frame).unwrap().payload).unwrap()
}

pub async fn roundtrip(
    stream: &mut TcpStream,
    command: &Command,
) -> Response {
    send(stream, command).await;
    recv(stream).await
}

/// Ждёт, пока `check` не станет истинным, но не дольше пяти секунд.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
