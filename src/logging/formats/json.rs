use tracing_subscriber::{fmt, fmt::MakeWriter, layer::Layer, registry::LookupSpan};

use crate::logging::config::LoggingConfig;

/// JSON по строке на событие, с текущим span. ANSI не используется.
pub fn build_json_layer<S, W>(
    config: &LoggingConfig,
    writer: W,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(false)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(config.with_target)
        .with_thread_ids(config.with_thread_ids)
        .with_line_number(config.with_line_numbers);
    Box::new(layer)
}
