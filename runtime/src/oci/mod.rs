//! OCI image support for bpack.
//!
//! Base images and finished builders are handled as OCI image layouts:
//!
//! ```text
//! image/
//! ├── oci-layout           (OCI layout marker)
//! ├── index.json           (Image index)
//! └── blobs/
//!     └── sha256/
//!         ├── <manifest>   (Image manifest)
//!         ├── <config>     (Image configuration)
//!         └── <layers>     (Filesystem layers)
//! ```

pub mod build;
pub mod daemon;
mod image;
pub mod reference;
pub mod registry;
pub mod repo;
pub mod store;

pub use build::{BuildResult, BuildSpecResolver, BuilderAssembler, BuilderConfig, CreateBuilderFlags};
pub use daemon::{Daemon, LocalDaemon};
pub use image::{ImageLayer, OciImage};
pub use reference::ImageReference;
pub use registry::RegistryClient;
pub use repo::{ImageRepositories, LocalRepoStore, RemoteRepoStore, RepoStore, RepoStoreFactory};
pub use store::{ImageStore, StoredImage};
