//! Layer generators: the order manifest layer and one layer per module.

use std::path::Path;

use bpack_core::error::{BuildError, Result};
use bpack_core::spec::{ModuleGroup, ModuleRef};
use serde::Serialize;

use super::descriptor::{read_descriptor, resolve_location};
use super::layer::{create_tgz, Layer};

/// Directory inside the image holding the order manifest and all modules.
pub const BUILDPACKS_DIR: &str = "/buildpacks";

/// File name of the order manifest.
pub const ORDER_FILE: &str = "order.toml";

#[derive(Serialize)]
struct OrderManifest<'a> {
    groups: &'a [ModuleGroup],
}

/// Serialize ordering groups as the order manifest document.
pub fn order_manifest(groups: &[ModuleGroup]) -> Result<String> {
    Ok(toml::to_string(&OrderManifest { groups })?)
}

/// Write `order.toml` into the working directory and package it as the
/// layer placed at `/buildpacks`.
pub fn order_layer(work_dir: &Path, groups: &[ModuleGroup]) -> Result<Layer> {
    let staging = work_dir.join("buildpack");
    std::fs::create_dir(&staging).map_err(|e| {
        BuildError::LayerError(format!(
            "Failed to create order staging directory {}: {}",
            staging.display(),
            e
        ))
    })?;

    let manifest = order_manifest(groups)?;
    let order_path = staging.join(ORDER_FILE);
    std::fs::write(&order_path, manifest).map_err(|e| {
        BuildError::LayerError(format!(
            "Failed to write {}: {}",
            order_path.display(),
            e
        ))
    })?;

    create_tgz(&staging, BUILDPACKS_DIR, &work_dir.join("order.tgz"), 0, 0)
}

/// Validate a module against its `buildpack.toml` and package it at
/// `/buildpacks/<id>/<version>`.
///
/// `position` is the module's 1-based place in the build and names the
/// archive in `work_dir`, so every module of a build gets its own file.
pub fn module_layer(
    work_dir: &Path,
    position: usize,
    module: &ModuleRef,
    spec_dir: &Path,
) -> Result<Layer> {
    let dir = resolve_location(&module.uri, spec_dir);
    let descriptor = read_descriptor(&dir)?;

    if descriptor.id != module.id {
        return Err(BuildError::ValidationError(format!(
            "buildpack ids did not match: {} != {}",
            module.id, descriptor.id
        )));
    }
    if descriptor.version.is_empty() {
        return Err(BuildError::ValidationError(format!(
            "buildpack.toml must provide version: {}",
            descriptor.descriptor_path().display()
        )));
    }

    let target = format!("{}/{}/{}", BUILDPACKS_DIR, module.id, descriptor.version);
    let file_name = format!("buildpack-{}.tgz", position);

    tracing::debug!(
        id = %module.id,
        version = %descriptor.version,
        name = descriptor.name.as_deref().unwrap_or(""),
        source = %dir.display(),
        "Packaging buildpack"
    );

    create_tgz(&dir, &target, &work_dir.join(file_name), 0, 0)
}
