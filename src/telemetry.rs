//! Opt-in tracing setup for applications embedding `xy-table`.
//!
//! Structural table operations (series added or removed, columns pruned,
//! member resync) log at `debug`. Per-slot back-fill and suppressed
//! notifications log at `trace`. Hosts that already own a subscriber need
//! nothing from this module.

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn,xy_table=info";

/// Installs a compact `fmt` subscriber filtered by `RUST_LOG`, falling back
/// to [`DEFAULT_FILTER`].
///
/// Returns `false` without the `telemetry` feature, or when a global
/// subscriber is already installed.
#[must_use]
pub fn init_default_tracing() -> bool {
    init_tracing_with_fallback(DEFAULT_FILTER)
}

/// Same as [`init_default_tracing`] with a caller-chosen fallback directive.
#[must_use]
pub fn init_tracing_with_fallback(fallback: &str) -> bool {
    #[cfg(feature = "telemetry")]
    {
        use tracing_subscriber::EnvFilter;

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .compact()
            .try_init()
            .is_ok()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        let _ = fallback;
        false
    }
}

#[cfg(all(test, not(feature = "telemetry")))]
mod tests {
    #[test]
    fn disabled_feature_never_installs_a_subscriber() {
        assert!(!super::init_default_tracing());
        assert!(!super::init_tracing_with_fallback("debug"));
    }
}
