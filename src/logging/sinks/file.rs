use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{layer::Layer, registry::LookupSpan};

use crate::logging::{config::LoggingConfig, formats};

/// Файловый слой с суточной ротацией. `None`, если `log_dir` не задан.
///
/// Запись идёт через фоновый поток; возвращённый guard дописывает буфер
/// при drop.
pub fn layer_with_config<S>(
    config: &LoggingConfig
) -> Option<(Box<dyn Layer<S> + Send + Sync>, WorkerGuard)>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    let dir = config.log_dir.as_ref()?;
    let appender = rolling::daily(dir, &config.file_prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let layer = formats::build_layer(config, config.format, writer, false);
    Some((layer, guard))
}
