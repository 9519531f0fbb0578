//! bpack core - error taxonomy, stack configuration and build spec model.
//!
//! Shared by the runtime (layer generation and image assembly) and the CLI.

pub mod config;
pub mod error;
pub mod spec;

// Re-export commonly used types
pub use config::{RegistryFallback, StackConfig, StackTable};
pub use error::{BuildError, Result};
pub use spec::{BuildSpec, ModuleGroup, ModuleRef, SpecFile};

/// bpack version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
