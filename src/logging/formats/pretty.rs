use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::Layer,
    registry::LookupSpan,
};

use crate::logging::config::LoggingConfig;

/// Многострочный формат для разработки.
pub fn build_pretty_layer<S, W>(
    config: &LoggingConfig,
    writer: W,
    with_ansi: bool,
) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    let layer = fmt::layer()
        .pretty()
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(writer)
        .with_ansi(with_ansi)
        .with_target(config.with_target)
        .with_thread_names(true)
        .with_thread_ids(config.with_thread_ids)
        .with_line_number(config.with_line_numbers);
    Box::new(layer)
}
