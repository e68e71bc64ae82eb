//! tracing setup for the binary

use tracing_subscriber::{fmt, EnvFilter};

/// Default filter for a `-v` count; `RUST_LOG` takes precedence
fn default_directive(verbosity: u8, quiet: bool) -> &'static str {
    match (quiet, verbosity) {
        (true, _) => "off",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    }
}

/// Install the global subscriber, writing to stderr.
///
/// `quiet` turns logging off unless `RUST_LOG` asks for it, for when the
/// terminal is owned by the dashboard.
pub fn init_logging(verbosity: u8, quiet: bool) {
    if tracing::dispatcher::has_been_set() {
        return;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity, quiet)));

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(0, false), "warn");
        assert_eq!(default_directive(1, false), "info");
        assert_eq!(default_directive(5, false), "debug");
    }

    #[test]
    fn test_quiet_silences_every_level() {
        assert_eq!(default_directive(0, true), "off");
        assert_eq!(default_directive(3, true), "off");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_logging(1, false);
        init_logging(2, true);
        assert!(tracing::dispatcher::has_been_set());
    }
}
