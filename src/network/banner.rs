use std::{env, net::SocketAddr};

use atty::Stream;
use chrono::{DateTime, Local};
use owo_colors::OwoColorize;
use sysinfo::System;

/// Переменная окружения, выбирающая вид баннера: `full` или `compact`.
pub const BANNER_ENV: &str = "SPACESTORE_BANNER";

/// Сведения о процессе и сборке, которые печатаются при старте.
#[derive(Debug, Clone)]
pub struct BannerInfo {
    pub version: String,
    pub mode: &'static str,
    pub listen: SocketAddr,
    pub databases: usize,
    pub collections: usize,
    pub pid: u32,
    pub host: String,
    pub cpus: usize,
    pub memory: String,
    pub git: &'static str,
    pub build_time: String,
}

impl BannerInfo {
    /// Собирает сведения о текущем процессе.
    pub fn collect(
        listen: SocketAddr,
        databases: usize,
        collections: usize,
    ) -> Self {
        let bits = std::mem::size_of::<usize>() * 8;
        let mut sys = System::new();
        sys.refresh_memory();

        Self {
            version: format!("{} ({bits}-bit)", env!("CARGO_PKG_VERSION")),
            mode: if cfg!(debug_assertions) {
                "debug"
            } else {
                "release"
            },
            listen,
            databases,
            collections,
            pid: std::process::id(),
            host: System::host_name().unwrap_or_else(|| "unknown".into()),
            cpus: num_cpus::get(),
            memory: human_memory(sys.total_memory()),
            git: option_env!("GIT_COMMIT").unwrap_or("unknown"),
            build_time: build_time(option_env!("BUILD_TIME").unwrap_or("unknown")),
        }
    }

    /// Полный многострочный баннер.
    pub fn render_full(&self) -> String {
        let rows = [
            ("Mode", self.mode.to_string()),
            ("Listening", self.listen.to_string()),
            ("Databases", self.databases.to_string()),
            ("Collections", self.collections.to_string()),
            ("PID", self.pid.to_string()),
            ("Host", self.host.clone()),
            (
                "OS/Arch",
                format!("{}/{}", env::consts::OS, env::consts::ARCH),
            ),
            ("CPU(s)", self.cpus.to_string()),
            ("Memory", self.memory.clone()),
            ("Build", format!("{} ({})", self.git, self.build_time)),
        ];

        let mut out = format!("SpaceStore {}\n{}\n", self.version, "-".repeat(46));
        for (name, value) in rows {
            out.push_str(&format!("{:<18}{value}\n", format!("{name}:")));
        }
        out
    }

    /// Однострочный баннер.
    pub fn render_compact(&self) -> String {
        format!(
            "SpaceStore {} | {} | {} | PID {}",
            self.version, self.mode, self.listen, self.pid
        )
    }
}

/// Печатает баннер в stdout. В debug-сборке по умолчанию полный, в release
/// компактный; `SPACESTORE_BANNER` переопределяет выбор.
pub fn print_banner(info: &BannerInfo) {
    let full = match env::var(BANNER_ENV).ok().as_deref() {
        Some("full") => true,
        Some("compact") => false,
        _ => cfg!(debug_assertions),
    };
    let color = atty::is(Stream::Stdout);

    if !full {
        let line = info.render_compact();
        if color {
            println!("{}", line.bold().green());
        } else {
            println!("{line}");
        }
        return;
    }

    let text = info.render_full();
    if !color {
        println!("{text}");
        return;
    }
    for (i, line) in text.lines().enumerate() {
        if i == 0 {
            println!("{}", line.bold().bright_blue());
        } else if line.starts_with("Build:") {
            println!("{}", line.dimmed());
        } else if line.starts_with("Listening:") || line.starts_with("PID:") {
            println!("{}", line.magenta());
        } else {
            println!("{line}");
        }
    }
    println!();
}

/// Строка о готовности принимать соединения.
pub fn print_startup_log(listen: SocketAddr) {
    let pid = std::process::id();
    let ts = Local::now().format("%d %b %Y %H:%M:%S%.3f").to_string();

    if atty::is(Stream::Stdout) {
        println!(
            "[{}] {} {}",
            pid.to_string().red(),
            ts.white(),
            format!("* Ready to accept connections on {listen}").green()
        );
    } else {
        println!("[{pid}] {ts} * Ready to accept connections on {listen}");
    }
}

fn human_memory(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b >= KB * KB * KB {
        format!("{:.1} GB", b / (KB * KB * KB))
    } else if b >= KB * KB {
        format!("{:.1} MB", b / (KB * KB))
    } else {
        format!("{:.1} KB", b / KB)
    }
}

fn build_time(raw: &str) -> String {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(dt) => dt
            .with_timezone(&Local)
            .format("%d.%m.%Y %H:%M:%S")
            .to_string(),
        Err(_) => raw.to_string(),
    }
}
