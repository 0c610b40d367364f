//! Sign translation CLI tool
//!
//! Classifies sign clips into text and composes sign videos from text, using
//! the sign-translate library with ONNX Runtime or Tract backends.

#[cfg(feature = "cli")]
use sign_translate::cli;

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
