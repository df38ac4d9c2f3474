//! Сборка fmt-слоя под выбранный формат.

pub mod compact;
pub mod json;
pub mod pretty;

use tracing_subscriber::{fmt::MakeWriter, layer::Layer, registry::LookupSpan};

use crate::logging::config::{LogFormat, LoggingConfig};

/// Слой с произвольным writer в формате `format`.
pub fn build_layer<S, W>(
    config: &LoggingConfig,
    format: LogFormat,
    writer: W,
    with_ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match format {
        LogFormat::Json => json::build_json_layer(config, writer),
        LogFormat::Pretty => pretty::build_pretty_layer(config, writer, with_ansi),
        LogFormat::Compact => compact::build_compact_layer(config, writer, with_ansi),
    }
}
