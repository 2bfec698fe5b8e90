//! Production-friendly observability hooks for provider, tool, store and
//! conversation phases.
//!
//! ```rust
//! use kobserve::{MetricsObservabilityHooks, SafeProviderHooks, TracingObservabilityHooks};
//!
//! let _provider_hooks = SafeProviderHooks::new(TracingObservabilityHooks);
//! let _metrics = MetricsObservabilityHooks;
//! ```

mod metrics_hooks;
mod safe_hooks;
mod tracing_hooks;

pub use metrics_hooks::MetricsObservabilityHooks;
pub use safe_hooks::{SafeConversationHooks, SafeProviderHooks, SafeStoreHooks, SafeToolHooks};
pub use tracing_hooks::TracingObservabilityHooks;

pub mod prelude {
    pub use crate::{
        MetricsObservabilityHooks, SafeConversationHooks, SafeProviderHooks, SafeStoreHooks,
        SafeToolHooks, TracingObservabilityHooks,
    };
}
