/// Authentication: users, password hashes, API keys, identity provider.
pub mod auth;
/// Database and collection catalog.
pub mod catalog;
/// Async client with typed collection handles.
pub mod client;
/// Self-describing binary value codec and record marshaling.
pub mod codec;
/// Command handlers, middleware chain and dispatcher.
pub mod command;
/// Server settings: defaults, `spacestore.toml`, `SPACESTORE_*` variables.
pub mod config;
/// Collection engines: key-value, object store, broker.
pub mod engine;
/// Flexible logging (formats, filters, sinks).
pub mod logging;
/// Network stack: connection manager, registry and TCP server.
pub mod network;
/// Wire protocol: frames, envelope, commands and responses.
pub mod protocol;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

/// Authentication entry point and the in-memory identity provider.
pub use auth::{AuthManager, IdentityProvider, InMemoryIdentityProvider, LoginRequest, User};
/// Catalog trait, in-memory implementation and records.
pub use catalog::{Catalog, Collection, Database, EngineKind, InMemoryCatalog, PermissionLevel};
/// Client.
pub use client::{ClientConfig, SpaceClient};
/// Codec value and marshaling entry points.
pub use codec::{decode, marshal, unmarshal, FromValue, ToValue, Value};
/// Dispatcher and shared handler dependencies.
pub use command::{Dispatcher, Services};
/// Settings.
pub use config::Settings;
/// Engines and their registry.
pub use engine::{BrokerEngine, ConnectionSink, EngineRegistry, KvEngine, ObjectEngine};
/// Network server.
pub use network::{ConnectionManager, ConnectionRegistry, Server};
/// Wire protocol types.
pub use protocol::{Command, CommandId, Delivery, Response};
/// Error types shared with the error crate.
pub use spacestore_error::{SpaceResult, StackError, StatusCode};
