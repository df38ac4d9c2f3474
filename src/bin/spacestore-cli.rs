//! CLI клиент SpaceStore
//!
//! Клиент командной строки: проверка соединения, чтение каталога,
//! команды key-value и object коллекций, публикация и подписка.

use std::{net::SocketAddr, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use spacestore::{
    client::{expires_in, ClientConfig, SpaceClient},
    Value,
};
use tracing::debug;

/// Основная структура CLI аргументов
#[derive(Parser)]
#[command(name = "spacestore-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Command line client for the SpaceStore server", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Хост сервера (IP или доменное имя)
    #[arg(short = 'H', long, default_value = "127.0.0.1", env = "SPACESTORE_HOST")]
    host: String,
    /// Порт сервера
    #[arg(short, long, default_value = "7070", env = "SPACESTORE_PORT")]
    port: u16,
    /// Имя пользователя для входа
    #[arg(short, long, env = "SPACESTORE_USER")]
    user: Option<String>,
    /// Пароль для входа
    #[arg(short = 'a', long, env = "SPACESTORE_PASSWORD")]
    password: Option<String>,
    /// Ключ API (вместо имени и пароля)
    #[arg(long, env = "SPACESTORE_API_KEY")]
    api_key: Option<String>,
    /// Таймаут соединения в секундах
    #[arg(long, default_value = "5")]
    timeout: u64,
    /// Таймаут ожидания ответа в секундах
    #[arg(long, default_value = "30")]
    request_timeout: u64,
    /// Формат вывода
    #[arg(long, value_enum, default_value = "pretty")]
    output: OutputFormat,
    /// Подробный вывод (debug)
    #[arg(short, long)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

/// Тип значения, переданного в командной строке
#[derive(Clone, Copy, Debug, ValueEnum)]
enum ValueType {
    String,
    Int,
    Uint,
    Float,
    Bool,
    Binary,
}

#[derive(Subcommand)]
enum Commands {
    /// Проверка соединения с сервером
    Ping {
        #[arg(short = 'c', long, default_value = "1")]
        count: u32,
        /// Интервал между пингами (мс)
        #[arg(short, long, default_value = "1000")]
        interval: u64,
    },
    /// Поддерживаемые версии протокола
    Versions,
    /// Проверить вход
    Whoami,
    /// Запись базы данных из каталога
    Database { name: String },
    /// Запись коллекции из каталога
    Collection { database: String, name: String },
    /// Команды key-value коллекции
    Kv {
        database: String,
        collection: String,
        #[command(subcommand)]
        op: KvOp,
    },
    /// Команды object-коллекции
    Obj {
        database: String,
        collection: String,
        #[command(subcommand)]
        op: ObjOp,
    },
    /// Опубликовать сообщение
    Publish {
        database: String,
        collection: String,
        subject: String,
        message: String,
    },
    /// Подписаться и печатать сообщения до Ctrl+C
    Subscribe {
        database: String,
        collection: String,
        subject: String,
        /// Группа: сообщение получает один участник
        #[arg(short, long)]
        queue: Option<String>,
    },
}

#[derive(Subcommand)]
enum KvOp {
    Get { key: String },
    Set {
        key: String,
        value: String,
        #[arg(short = 't', long, value_enum, default_value = "string")]
        value_type: ValueType,
        /// Время жизни в секундах
        #[arg(long)]
        ttl: Option<u64>,
        /// Записать, только если ключа нет
        #[arg(long, conflicts_with = "xx")]
        nx: bool,
        /// Записать, только если ключ есть
        #[arg(long)]
        xx: bool,
    },
    Del { keys: Vec<String> },
    Exists { key: String },
    Ttl { key: String },
    Keys,
    All,
    Count,
    Size,
    Flush,
}

#[derive(Subcommand)]
enum ObjOp {
    /// Загрузить файл как объект
    Put { key: String, path: std::path::PathBuf },
    /// Выгрузить объект в файл
    Get { key: String, path: std::path::PathBuf },
    Meta { key: String },
    Del { key: String },
    Count,
    Size,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let addr: SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .context("Неверный формат адреса сервера")?;

    let mut config = ClientConfig {
        connect_timeout: Duration::from_secs(cli.timeout),
        request_timeout: Duration::from_secs(cli.request_timeout),
        ..ClientConfig::default()
    };
    if let (Some(user), Some(pass)) = (&cli.user, &cli.password) {
        config = config.with_password(user, pass);
    } else if let Some(key) = &cli.api_key {
        config = config.with_api_key(key);
    }

    let mut client = SpaceClient::connect(addr, config)
        .await
        .with_context(|| format!("Не удалось подключиться к {addr}"))?;
    debug!("подключено к {addr}");

    let result = run(&mut client, &cli).await;
    let _ = client.close().await;
    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if verbose { "debug" } else { "error" };
    fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Ошибка инициализации логирования: {e}"))
}

async fn run(
    client: &mut SpaceClient,
    cli: &Cli,
) -> Result<()> {
    let out = cli.output;
    match &cli.command {
        Commands::Ping { count, interval } => {
            ping(client, *count, Duration::from_millis(*interval)).await
        }
        Commands::Versions => {
            let versions = client.supported_versions().await?;
            print_json_or(out, serde_json::json!(versions), || format!("{versions:?}"));
            Ok(())
        }
        Commands::Whoami => {
            let ok = client.auth_status().await?;
            println!("{}", if ok { "authenticated" } else { "anonymous" });
            Ok(())
        }
        Commands::Database { name } => {
            let db = client.database(name).await?;
            print_value(out, &spacestore::codec::ToValue::to_value(&db));
            Ok(())
        }
        Commands::Collection { database, name } => {
            let coll = client.collection(database, name).await?;
            print_value(out, &spacestore::codec::ToValue::to_value(&coll));
            Ok(())
        }
        Commands::Kv {
            database,
            collection,
            op,
        } => kv(client, out, database, collection, op).await,
        Commands::Obj {
            database,
            collection,
            op,
        } => obj(client, out, database, collection, op).await,
        Commands::Publish {
            database,
            collection,
            subject,
            message,
        } => {
            client
                .broker(database, collection)
                .publish(subject, message.as_bytes())
                .await?;
            println!("OK");
            Ok(())
        }
        Commands::Subscribe {
            database,
            collection,
            subject,
            queue,
        } => {
            let mut deliveries = client
                .take_deliveries()
                .context("поток рассылок уже занят")?;
            let broker = client.broker(database, collection);
            match queue {
                Some(q) => broker.subscribe_queue(subject, q).await?,
                None => broker.subscribe(subject).await?,
            }
            eprintln!("подписка на {subject}, Ctrl+C для выхода");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    d = deliveries.recv() => match d {
                        Some(d) => println!("{}: {}", d.subject, String::from_utf8_lossy(&d.payload)),
                        None => anyhow::bail!("соединение закрыто"),
                    },
                }
            }
            broker.unsubscribe(subject).await?;
            Ok(())
        }
    }
}

async fn ping(
    client: &SpaceClient,
    count: u32,
    interval: Duration,
) -> Result<()> {
    println!("PING {}", client.connection().addr());
    let mut successful = 0u32;
    let mut total = Duration::ZERO;
    for i in 1..=count {
        let start = std::time::Instant::now();
        match client.ping().await {
            Ok(()) => {
                let elapsed = start.elapsed();
                total += elapsed;
                successful += 1;
                println!("#{i}: PONG время={:.2}ms", elapsed.as_secs_f64() * 1000.0);
            }
            Err(e) => println!("#{i}: ошибка {e}"),
        }
        if i < count {
            tokio::time::sleep(interval).await;
        }
    }
    if count > 1 {
        println!("--- отправлено {count}, успешно {successful} ---");
        if successful > 0 {
            let avg = total.as_secs_f64() * 1000.0 / f64::from(successful);
            println!("среднее время: {avg:.2}ms");
        }
    }
    Ok(())
}

async fn kv(
    client: &SpaceClient,
    out: OutputFormat,
    database: &str,
    collection: &str,
    op: &KvOp,
) -> Result<()> {
    let kv = client.kv(database, collection);
    match op {
        KvOp::Get { key } => match kv.get(key).await? {
            Some(v) => print_value(out, &v),
            None => println!("(nil)"),
        },
        KvOp::Set {
            key,
            value,
            value_type,
            ttl,
            nx,
            xx,
        } => {
            let value = parse_value(value, *value_type)?;
            let expires_at = ttl.map(|s| expires_in(Duration::from_secs(s)));
            let written = match (nx, xx, expires_at) {
                (true, _, None) => kv.set_if_not_exists(key, &value).await?,
                (true, _, Some(t)) => kv.set_if_not_exists_with_ttl(key, &value, t).await?,
                (_, true, None) => kv.set_if_exists(key, &value).await?,
                (_, true, Some(t)) => kv.set_if_exists_with_ttl(key, &value, t).await?,
                (_, _, None) => kv.set(key, &value).await.map(|_| true)?,
                (_, _, Some(t)) => kv.set_with_ttl(key, &value, t).await.map(|_| true)?,
            };
            println!("{}", if written { "OK" } else { "(not set)" });
        }
        KvOp::Del { keys } => {
            match keys.as_slice() {
                [one] => kv.delete(one).await?,
                many => kv.delete_multiple(many.iter().cloned()).await?,
            }
            println!("OK");
        }
        KvOp::Exists { key } => println!("{}", kv.exists(key).await?),
        KvOp::Ttl { key } => match kv.get_ttl(key).await? {
            Some(ns) => {
                use chrono::TimeZone;
                println!("{}", chrono::Utc.timestamp_nanos(ns).to_rfc3339());
            }
            None => println!("(no expiry)"),
        },
        KvOp::Keys => {
            let keys = kv.keys().await?;
            print_value(out, &Value::string_list(keys));
        }
        KvOp::All => print_value(out, &Value::Map(kv.get_all().await?)),
        KvOp::Count => println!("{}", kv.count().await?),
        KvOp::Size => println!("{}", kv.size().await?),
        KvOp::Flush => {
            kv.delete_all().await?;
            println!("OK");
        }
    }
    Ok(())
}

async fn obj(
    client: &SpaceClient,
    out: OutputFormat,
    database: &str,
    collection: &str,
    op: &ObjOp,
) -> Result<()> {
    let objects = client.objects(database, collection);
    match op {
        ObjOp::Put { key, path } => {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("не удалось прочитать {}", path.display()))?;
            objects.put(key, &data).await?;
            println!("OK ({} bytes)", data.len());
        }
        ObjOp::Get { key, path } => match objects.get(key).await? {
            Some(data) => {
                tokio::fs::write(path, &data)
                    .await
                    .with_context(|| format!("не удалось записать {}", path.display()))?;
                println!("OK ({} bytes)", data.len());
            }
            None => println!("(nil)"),
        },
        ObjOp::Meta { key } => match objects.metadata(key).await? {
            Some(m) => print_json_or(
                out,
                serde_json::json!({
                    "size": m.size,
                    "crc32": m.crc32,
                    "created_at_ms": m.created_at_ms,
                    "modified_at_ms": m.modified_at_ms,
                }),
                || {
                    format!(
                        "size={} crc32={:08x} created={} modified={}",
                        m.size, m.crc32, m.created_at_ms, m.modified_at_ms
                    )
                },
            ),
            None => println!("(nil)"),
        },
        ObjOp::Del { key } => println!("{}", objects.delete(key).await?),
        ObjOp::Count => println!("{}", objects.count().await?),
        ObjOp::Size => println!("{}", objects.size().await?),
    }
    Ok(())
}

fn parse_value(
    raw: &str,
    ty: ValueType,
) -> Result<Value> {
    Ok(match ty {
        ValueType::String => Value::from(raw),
        ValueType::Int => Value::Int64(raw.parse().context("ожидалось целое число")?),
        ValueType::Uint => Value::Uint64(raw.parse().context("ожидалось беззнаковое число")?),
        ValueType::Float => Value::Float64(raw.parse().context("ожидалось число")?),
        ValueType::Bool => Value::Bool(raw.parse().context("ожидалось true или false")?),
        ValueType::Binary => Value::Binary(bytes::Bytes::copy_from_slice(raw.as_bytes())),
    })
}

fn print_json_or(
    out: OutputFormat,
    json: serde_json::Value,
    pretty: impl FnOnce() -> String,
) {
    match out {
        OutputFormat::Json => println!("{json}"),
        OutputFormat::Pretty => println!("{}", pretty()),
    }
}

fn print_value(
    out: OutputFormat,
    v: &Value,
) {
    print_json_or(out, to_json(v), || format_value(v));
}

/// Значение в человекочитаемом виде
fn format_value(v: &Value) -> String {
    match v {
        Value::Empty => "(empty)".to_string(),
        Value::String(s) => format!("{s:?}"),
        Value::Binary(b) => format!("(binary {} bytes)", b.len()),
        Value::List(items) => {
            let inner: Vec<String> = items.iter().map(format_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Value::Map(map) => {
            let inner: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{k}: {}", format_value(v)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
        scalar => to_json(scalar).to_string(),
    }
}

fn to_json(v: &Value) -> serde_json::Value {
    use serde_json::{json, Value as J};
    match v {
        Value::Empty => J::Null,
        Value::Bool(b) => json!(b),
        Value::Byte(n) => json!(n),
        Value::Uint16(n) => json!(n),
        Value::Uint32(n) => json!(n),
        Value::Uint64(n) => json!(n),
        Value::Int16(n) => json!(n),
        Value::Int32(n) => json!(n),
        Value::Int64(n) => json!(n),
        Value::Float32(n) => json!(n),
        Value::Float64(n) => json!(n),
        Value::Binary(b) => json!(String::from_utf8_lossy(b)),
        Value::String(s) => json!(s),
        Value::List(items) => J::Array(items.iter().map(to_json).collect()),
        Value::Map(map) => J::Object(map.iter().map(|(k, v)| (k.clone(), to_json(v))).collect()),
    }
}
