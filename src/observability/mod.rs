//! Observability: structured logging through `tracing`.
//!
//! Formats: pretty, compact (default) and JSON. `RUST_LOG` overrides the
//! configured level and filter.

#[cfg(feature = "server")]
mod tracing_init;

#[cfg(feature = "server")]
pub use tracing_init::*;
