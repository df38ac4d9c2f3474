use tracing_subscriber::{fmt, fmt::MakeWriter, layer::Layer, registry::LookupSpan};

use crate::logging::config::LoggingConfig;

/// Однострочный формат по умолчанию.
pub fn build_compact_layer<S, W>(
    config: &LoggingConfig,
    writer: W,
    with_ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .compact()
        .with_writer(writer)
        .with_ansi(with_ansi)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_line_number(config.with_line_numbers);
    Box::new(layer)
}
