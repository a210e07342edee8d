//! Process-wide tracing subscriber.
//!
//! `RUST_LOG` wins when set; otherwise the level comes from the logging config.
//! Output goes to stderr so `--gen-index` can print the index on stdout.

use tracing_subscriber::{prelude::*, registry, EnvFilter};

use crate::config::LoggingConfig;

fn default_directives(config: &LoggingConfig) -> &'static str {
    if config.debug {
        "chart_server=debug,chart_storage=debug,info"
    } else {
        "chart_server=info,chart_storage=info,warn"
    }
}

/// Build the filter for `config`, honouring `RUST_LOG`.
pub fn env_filter(config: &LoggingConfig) -> anyhow::Result<EnvFilter> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives(config))?,
    };
    let filter = filter
        .add_directive("tokio=warn".parse()?)
        .add_directive("hyper=warn".parse()?);
    Ok(filter)
}

/// Install the global subscriber. Fails if one is already set.
pub fn init_subscriber(config: &LoggingConfig) -> anyhow::Result<()> {
    let subscriber = registry().with(env_filter(config)?);
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true);

    if config.json {
        subscriber.with(fmt_layer.json()).try_init()?;
    } else {
        subscriber.with(fmt_layer).try_init()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_flag_raises_crate_level() {
        let quiet = LoggingConfig::default();
        let loud = LoggingConfig {
            debug: true,
            json: false,
        };
        assert!(default_directives(&quiet).starts_with("chart_server=info"));
        assert!(default_directives(&loud).starts_with("chart_server=debug"));
        assert!(EnvFilter::try_new(default_directives(&loud)).is_ok());
    }
}
