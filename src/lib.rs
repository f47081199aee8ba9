// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod analyze;
pub mod api;
pub mod app;
pub mod config;
pub mod dedup;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod pipeline;
pub mod resilience;
pub mod routing;

pub use crate::api::{create_router, AppState};
pub use crate::app::Relay;
pub use crate::config::AppConfig;
pub use crate::model::{Priority, ScoredItem, SourceType, UpstreamItem};

/// Short, stable fingerprint for logging content without logging the content.
pub fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    #[test]
    fn anon_hash_is_short_and_stable() {
        let a = super::anon_hash("launch day");
        assert_eq!(a.len(), 12);
        assert_eq!(a, super::anon_hash("launch day"));
        assert_ne!(a, super::anon_hash("launch night"));
    }
}
