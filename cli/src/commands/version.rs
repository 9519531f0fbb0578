//! `bpack version` command.

use clap::Args;

#[derive(Args)]
pub struct VersionArgs;

pub async fn execute(_args: VersionArgs) -> Result<(), Box<dyn std::error::Error>> {
    println!("bpack version {}", bpack_core::VERSION);
    Ok(())
}
