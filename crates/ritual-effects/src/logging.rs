//! Tracing subscriber installation.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `filter` (overridden by `RUST_LOG`).
///
/// Returns false when a global subscriber was already installed.
pub fn init_tracing(filter: &str) -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_refused() {
        let _ = init_tracing("debug");
        assert!(!init_tracing("info"));
    }
}
