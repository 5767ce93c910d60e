mod cli;
mod error;
mod native;
mod ui;

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    cli::run().await
}
