//! Keruu CLI entry point.

use keruu_lib::cli::{self, Cli};
use keruu_lib::core::Result;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli::execute(cli).await
}
