use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How log lines are rendered. Both go to stderr so stdout stays free for command output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event, with span context. Used by the server.
    Json,

    /// Single-line human-readable events. Used by the CLI.
    Compact,
}

/// Initialize structured JSON logging at `info`, unless overridden by `VOICEBOOK_LOG`.
pub fn init() {
    init_with(LogFormat::Json, LevelFilter::INFO);
}

/// Initialize logging with an explicit format and default level.
///
/// `VOICEBOOK_LOG` (an `EnvFilter` directive string) takes precedence over `default_level`.
/// Calling this more than once is harmless; only the first call installs a subscriber.
pub fn init_with(format: LogFormat, default_level: LevelFilter) {
    let filter = EnvFilter::builder()
        .with_env_var("VOICEBOOK_LOG")
        .with_default_directive(default_level.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(filter);
    let _ = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init_with(LogFormat::Compact, LevelFilter::WARN);
        init();
    }
}
