//! CLI command definitions and dispatch.

mod create_builder;
mod version;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// bpack - build buildpack builder images.
#[derive(Parser)]
#[command(name = "bpack", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Create a builder image from a builder.toml
    CreateBuilder(create_builder::CreateBuilderArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Directory holding the local image store.
pub(crate) fn images_dir() -> PathBuf {
    bpack_core::config::bpack_home().join("images")
}

/// Open the shared image store.
pub(crate) fn open_image_store() -> Result<bpack_runtime::ImageStore, Box<dyn std::error::Error>> {
    let dir = images_dir();
    let store = bpack_runtime::ImageStore::new(&dir)?;
    Ok(store)
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::CreateBuilder(args) => create_builder::execute(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        let cli = Cli::try_parse_from(["bpack", "version"]).unwrap();
        assert!(matches!(cli.command, Command::Version(_)));
    }

    #[test]
    fn test_unknown_command_rejected() {
        assert!(Cli::try_parse_from(["bpack", "build"]).is_err());
    }

    #[test]
    fn test_images_dir_under_home() {
        assert!(images_dir().ends_with("images"));
    }
}
