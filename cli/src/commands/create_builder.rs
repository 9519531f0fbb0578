//! `bpack create-builder` command - Compose a builder image.
//!
//! Resolves the stack's build image, layers the buildpacks listed in
//! `builder.toml` on top of it, and stores the result locally or publishes
//! it to the registry.

use std::path::PathBuf;
use std::sync::Arc;

use bpack_core::config::{default_config_path, StackTable};
use bpack_runtime::{
    BuildSpecResolver, BuilderAssembler, CreateBuilderFlags, ImageRepositories, LocalDaemon,
};
use clap::Args;

#[derive(Args)]
pub struct CreateBuilderArgs {
    /// Name of the builder image to create (e.g., "me/builder")
    pub repo_name: String,

    /// Path to builder.toml
    #[arg(short = 'b', long = "builder-config")]
    pub builder_config: PathBuf,

    /// Stack to base the builder on (default stack when omitted)
    #[arg(short = 's', long = "stack", default_value = "")]
    pub stack: String,

    /// Publish to the registry instead of the local image store
    #[arg(long)]
    pub publish: bool,

    /// Do not pull the stack build image first
    #[arg(long = "no-pull")]
    pub no_pull: bool,
}

impl CreateBuilderArgs {
    fn flags(&self) -> CreateBuilderFlags {
        CreateBuilderFlags {
            repo_name: self.repo_name.clone(),
            builder_config_path: self.builder_config.clone(),
            stack_id: self.stack.clone(),
            publish: self.publish,
            no_pull: self.no_pull,
        }
    }
}

pub async fn execute(args: CreateBuilderArgs) -> Result<(), Box<dyn std::error::Error>> {
    let stacks = StackTable::load(&default_config_path())?;

    let store = Arc::new(super::open_image_store()?);
    let daemon = Arc::new(LocalDaemon::new(store.clone()));
    let repos = Arc::new(ImageRepositories::new(store));

    tracing::debug!(
        repo = %args.repo_name,
        config = %args.builder_config.display(),
        publish = args.publish,
        "Creating builder"
    );

    let resolver = BuildSpecResolver::new(stacks, daemon, repos);
    let config = resolver.resolve(&args.flags()).await?;
    let result = BuilderAssembler::new().assemble(config).await?;

    println!("Successfully created builder image: {}", result.repo_name);
    println!(
        "Tip: Run `bpack build <image-name> --builder {}` to use this builder",
        result.repo_name
    );

    Ok(())
}
