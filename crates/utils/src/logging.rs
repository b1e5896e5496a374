//! Tracing subscriber setup shared by the binaries.

use tracing_subscriber::{EnvFilter, prelude::*};

/// Crates whose events follow the configured level; everything else stays at `warn`.
const WORKSPACE_TARGETS: &[&str] = &["herald", "herald_cli", "services", "utils"];

/// Builds the filter directive string for `level`, e.g. `warn,herald=debug,...`.
pub fn filter_directives(level: &str) -> String {
    let mut directives = String::from("warn");
    for target in WORKSPACE_TARGETS {
        directives.push(',');
        directives.push_str(target);
        directives.push('=');
        directives.push_str(level);
    }
    directives
}

/// Installs the global subscriber on stderr. `RUST_LOG` wins over
/// `default_level` when set.
///
/// Calling this twice is harmless; the second registration is ignored.
pub fn init_tracing(default_level: &str) {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| default_level.to_string());
    let env_filter = EnvFilter::try_new(filter_directives(&log_level)).unwrap_or_else(|err| {
        eprintln!("invalid log level '{log_level}' ({err}), falling back to info");
        EnvFilter::new(filter_directives("info"))
    });

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(env_filter),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directives_cover_workspace_crates() {
        let directives = filter_directives("debug");
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("herald=debug"));
        assert!(directives.contains("services=debug"));
        assert!(EnvFilter::try_new(directives).is_ok());
    }
}
