//! Logging init: stderr subscriber filtered by `RUST_LOG` or a verbosity level.

use tracing_subscriber::EnvFilter;

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "warn",
        1 => "info,mediafetch_core=info",
        2 => "info,mediafetch_core=debug",
        _ => "debug,mediafetch_core=trace",
    }
}

/// Installs the global subscriber. `RUST_LOG` overrides `verbosity`.
/// Returns `false` when a subscriber was already installed.
pub fn init_logging(verbosity: u8) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_level() {
        assert_eq!(default_directive(0), "warn");
        assert!(default_directive(2).contains("debug"));
        assert!(default_directive(9).contains("trace"));
    }

    #[test]
    fn second_init_is_harmless() {
        init_logging(0);
        assert!(!init_logging(0));
    }
}
