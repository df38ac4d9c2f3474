use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use spacestore::{
    auth::{AuthManager, InMemoryIdentityProvider, User, ADMIN_ROLE},
    catalog::{Catalog, InMemoryCatalog, PermissionLevel, SYSTEM_DATABASE},
    command::{Dispatcher, Services},
    config::Settings,
    engine::EngineRegistry,
    logging::init_logging,
    network::{
        print_banner, print_startup_log, BannerInfo, ConnectionManager, ConnectionRegistry, Server,
    },
};
use tracing::{error, info, warn};

/// Сколько ждать закрытия соединений после Ctrl+C.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Сервер SpaceStore
#[derive(Debug, Parser)]
#[command(name = "spacestore", version, about, long_about = None)]
struct Args {
    /// Адрес для входящих соединений
    #[arg(short, long, env = "SPACESTORE_LISTEN")]
    listen: Option<SocketAddr>,
    /// Файл настроек (по умолчанию `spacestore.toml`, если есть)
    #[arg(short, long, env = "SPACESTORE_CONFIG")]
    config: Option<PathBuf>,
    /// Уровень логирования: trace, debug, info, warn, error
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut settings =
        Settings::load(args.config.as_deref()).context("failed to load configuration")?;
    if let Some(listen) = args.listen {
        settings.listen_address = listen;
    }
    if let Some(level) = args.log_level {
        settings.logging.level = level;
    }

    let logging = init_logging(settings.logging.clone()).context("failed to initialize logging")?;

    let catalog = Arc::new(InMemoryCatalog::with_system_seed());
    let provider = Arc::new(InMemoryIdentityProvider::new());
    seed_admin(&settings, &catalog, &provider)?;

    let registry = Arc::new(ConnectionRegistry::new());
    let engines = Arc::new(EngineRegistry::new(
        registry.clone(),
        settings.engine_options(),
    ));
    engines
        .load(catalog.as_ref())
        .await
        .context("failed to create engines from catalog")?;

    let (databases, collections) = catalog_counts(catalog.as_ref()).await?;
    let services = Arc::new(Services {
        catalog,
        engines: engines.clone(),
        auth: AuthManager::new(provider),
    });
    let dispatcher = Arc::new(Dispatcher::new(services));
    let manager = Arc::new(ConnectionManager::new(
        settings.connection_config(),
        registry,
        dispatcher,
    ));

    let server = Server::bind(settings.listen_address, manager.clone()).await?;
    let listen = server.local_addr()?;

    print_banner(&BannerInfo::collect(listen, databases, collections));
    print_startup_log(listen);

    let mut server_task = tokio::spawn(server.run());

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                error!(error = %e, "failed to listen for ctrl_c");
            }
            info!("shutdown signal received");
        }
        res = &mut server_task => {
            match res {
                Ok(Ok(())) => info!("server stopped"),
                Ok(Err(e)) => error!(error = format!("{e:#}"), "server failed"),
                Err(e) => error!(error = %e, "server task panicked"),
            }
        }
    }

    manager.shutdown();
    if manager.wait_for_shutdown(SHUTDOWN_GRACE).await.is_err() {
        warn!("some connections did not close in time");
    }
    if !server_task.is_finished() {
        server_task.abort();
    }
    engines.shutdown();
    info!("bye");
    logging.shutdown();
    Ok(())
}

/// Добавляет администратора из настроек и даёт ему доступ к `system`.
fn seed_admin(
    settings: &Settings,
    catalog: &InMemoryCatalog,
    provider: &InMemoryIdentityProvider,
) -> Result<()> {
    let seed = &settings.seed;
    if seed.uses_default_password() {
        warn!(
            admin = %seed.admin_name,
            "built-in admin uses the default password, set seed.admin_password"
        );
    }
    let admin = User::new(format!("u-{}", seed.admin_name), seed.admin_name.clone())
        .with_role(ADMIN_ROLE);
    catalog
        .grant(SYSTEM_DATABASE, &admin.id, PermissionLevel::ReadWrite)
        .context("failed to grant admin access")?;
    provider.add_user(admin, &seed.admin_password);
    Ok(())
}

async fn catalog_counts(catalog: &dyn Catalog) -> Result<(usize, usize)> {
    let all = catalog.list_all().await.context("failed to list catalog")?;
    let collections = all.iter().map(|(_, c)| c.len()).sum();
    Ok((all.len(), collections))
}
