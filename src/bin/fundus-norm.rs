//! Fundus normalization CLI tool
//!
//! Locates the fundus disk in retinal photographs and writes square,
//! centered images at a fixed diameter.

#[cfg(feature = "cli")]
use fundus_norm::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
