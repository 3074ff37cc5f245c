use tracing_subscriber::{fmt, EnvFilter};

use crate::core::config::Settings;

/// Chatty dependencies stay at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["hyper", "h2", "rustls", "aws_config", "aws_smithy_runtime", "sqlx"];

pub(crate) fn init_tracing(settings: &Settings) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&settings.telemetry().log_level)));

    let builder = fmt().with_env_filter(filter).with_target(false);

    if settings.telemetry().json {
        builder
            .json()
            .with_current_span(true)
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    } else {
        builder
            .with_span_events(fmt::format::FmtSpan::CLOSE)
            .try_init()
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;
    }

    tracing::info!(
        service = %settings.api().project_name,
        environment = %settings.runtime().environment.as_str(),
        "Tracing initialised"
    );

    Ok(())
}

fn default_directives(level: &str) -> String {
    let mut directives = vec![level.trim().to_string()];
    directives.extend(QUIET_TARGETS.iter().map(|target| format!("{target}=warn")));
    directives.join(",")
}

#[cfg(test)]
mod tests {
    use super::default_directives;

    #[test]
    fn dependencies_are_quieted_below_the_base_level() {
        let directives = default_directives("info");

        assert!(directives.starts_with("info,"));
        assert!(directives.contains("sqlx=warn"));
    }
}
