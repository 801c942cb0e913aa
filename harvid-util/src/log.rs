use std::sync::Once;

use tracing_subscriber::fmt::format::FmtSpan;

/// Installs the global `tracing` subscriber. Safe to call from multiple
/// binaries/tests; only the first call takes effect.
pub fn init() {
    static START: Once = Once::new();
    START.call_once(|| {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_span_events(FmtSpan::ENTER | FmtSpan::CLOSE)
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)
            .expect("failed to set global default tracing subscriber");
    });
}
