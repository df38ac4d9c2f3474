use std::{path::PathBuf, time::Instant};

use tracing_appender::non_blocking::WorkerGuard;

/// Держит ресурсы логирования до конца работы процесса.
///
/// Пока handle жив, фоновый writer файлового слоя принимает события; при
/// drop или [`LoggingHandle::shutdown`] буфер дописывается на диск.
pub struct LoggingHandle {
    file_guard: Option<WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingHandle {
    pub fn new(
        file_guard: Option<WorkerGuard>,
        log_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            file_guard,
            log_dir,
        }
    }

    pub fn has_file_sink(&self) -> bool {
        self.file_guard.is_some()
    }

    pub fn log_dir(&self) -> Option<&PathBuf> {
        self.log_dir.as_ref()
    }

    /// Дописывает буферы и закрывает файловый writer.
    pub fn shutdown(mut self) {
        let Some(guard) = self.file_guard.take() else {
            return;
        };
        tracing::info!("flushing log files");
        let start = Instant::now();
        drop(guard);
        // подписчик ещё жив, но файловый writer уже закрыт
        tracing::debug!(elapsed_ms = start.elapsed().as_millis() as u64, "log files flushed");
    }
}

impl std::fmt::Debug for LoggingHandle {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("LoggingHandle")
            .field("file_sink", &self.has_file_sink())
            .field("log_dir", &self.log_dir)
            .finish()
    }
}
