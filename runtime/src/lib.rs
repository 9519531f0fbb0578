//! bpack runtime - builder image composition.
//!
//! Provides the image collaborators (local store, registry client), the
//! layer generators and the assembler behind `bpack create-builder`.

#![allow(clippy::result_large_err)]

pub mod oci;

pub use oci::{BuildResult, BuildSpecResolver, BuilderAssembler, BuilderConfig, CreateBuilderFlags};
pub use oci::{Daemon, ImageRepositories, LocalDaemon, RepoStore, RepoStoreFactory};
pub use oci::{ImageReference, ImageStore, OciImage, StoredImage};

/// bpack runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
