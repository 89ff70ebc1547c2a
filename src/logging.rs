use crate::{Error, Result};
use tracing::Level;
use tracing_subscriber::fmt::time::SystemTime;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Initialize logging for the recovery engine.
///
/// `RUST_LOG` takes precedence over `level`. JSON output is meant for
/// production log shipping, the plain format for operators at a terminal.
pub fn init_logging(level: Level, json_output: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("lightning_recovery={},warn", level)));

    let result = if json_output {
        let fmt_layer = fmt::layer()
            .json()
            .with_timer(SystemTime)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_thread_ids(true)
            .with_thread_names(true);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    } else {
        let fmt_layer = fmt::layer()
            .with_timer(SystemTime)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .with_thread_ids(false)
            .with_thread_names(false);

        Registry::default().with(env_filter).with(fmt_layer).try_init()
    };

    result.map_err(|e| Error::Config(format!("Failed to initialize logging: {}", e)))
}

/// Structured log line for a step transition
#[macro_export]
macro_rules! log_step {
    ($plan:expr, $step:expr, $phase:expr, $message:expr) => {
        tracing::info!(
            plan_id = %$plan,
            step_id = %$step,
            phase = %$phase,
            "{}",
            $message
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_reports_error() {
        // Whichever call wins the global subscriber, the other must not panic.
        let first = init_logging(Level::DEBUG, false);
        let second = init_logging(Level::INFO, true);
        assert!(first.is_ok() || second.is_err());
        assert!(second.is_err());
    }
}
