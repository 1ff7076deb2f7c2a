//! Provider detection.
//!
//! [`ProviderFactory`] holds one adapter per [`ProviderType`](crate::store::ProviderType)
//! and answers which of them are usable. A backend counts only when its
//! adapter is bound *and* its health check passes within the timeout. Probe
//! failures are logged and narrow the result; they are never returned as
//! errors.
//!
//! ```rust,ignore
//! let factory = ProviderFactory::new(vector, graph)
//!     .with_health_timeout(Duration::from_millis(500));
//!
//! let detection = Arc::new(factory.detect_memory_capabilities(&prefs).await);
//! if detection.features.graph_traversal {
//!     // relationship features on
//! }
//! ```

mod factory;
mod types;

pub use factory::{ProviderFactory, DEFAULT_HEALTH_TIMEOUT};
pub use types::{
    DetectionResult, FeatureFlags, MemoryProvider, ProviderCapability, ProviderStatus,
};
