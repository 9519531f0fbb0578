//! Builder image composition.
//!
//! Resolves a `builder.toml` against the stack table, generates the order
//! and module layers, and appends them to the base image.
//!
//! # Usage
//!
//! ```text
//! bpack create-builder me/builder --builder-config ./builder.toml
//! ```
//!
//! # Image layout
//!
//! ```text
//! /buildpacks/order.toml
//! /buildpacks/<id>/<version>/...
//! ```

pub mod descriptor;
pub mod engine;
pub mod generate;
pub mod layer;
pub mod resolve;
pub mod workdir;

pub use descriptor::{read_descriptor, resolve_location, ModuleDescriptor};
pub use engine::{BuildPhase, BuildResult, BuilderAssembler};
pub use generate::{module_layer, order_layer, order_manifest};
pub use layer::{create_tgz, Layer};
pub use resolve::{image_by_registry, BuildSpecResolver, BuilderConfig, CreateBuilderFlags};
pub use workdir::WorkDir;
