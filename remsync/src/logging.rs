use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;

pub const LOG_ENV: &str = "REMSYNC_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Installs the global stderr subscriber. `REMSYNC_LOG` takes the usual
/// `EnvFilter` directives; HTTP internals stay at `warn`.
pub fn init_logging() {
    let env_filter = build_filter(std::env::var(LOG_ENV).ok().as_deref());
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);
    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn build_filter(directives: Option<&str>) -> EnvFilter {
    let base = directives
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_DIRECTIVE);
    let filter = EnvFilter::try_new(base).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));
    ["hyper=warn", "reqwest=warn", "sqlx=warn"]
        .into_iter()
        .filter_map(|directive| directive.parse::<Directive>().ok())
        .fold(filter, EnvFilter::add_directive)
}
