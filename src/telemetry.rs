//! Logging setup.

use crate::error::GentunError;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber.
///
/// Filtering follows `RUST_LOG`. `GENTUN_LOG_FORMAT=json` switches to one
/// JSON object per line, the format log collectors on worker machines
/// expect; anything else prints human-readable output.
///
/// Fails if a global subscriber is already installed.
///
/// # Example
///
/// ```no_run
/// gentun::telemetry::init_tracing()?;
/// # Ok::<(), gentun::GentunError>(())
/// ```
pub fn init_tracing() -> Result<(), GentunError> {
    let format = std::env::var("GENTUN_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let result = match format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(EnvFilter::from_default_env())
            .with_current_span(true)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init(),
    };

    result.map_err(|e| GentunError::Configuration(format!("tracing init failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Another test may have installed a subscriber first; either way the
        // last call must report the conflict.
        let _ = init_tracing();
        assert!(matches!(init_tracing(), Err(GentunError::Configuration(_))));
    }
}
