//! Shipwright - release build-and-package orchestrator.
//!
//! This binary builds, signs, and packages a server/client product pair for
//! multiple platforms in one run, with per-target isolation and a machine-
//! readable build report.

use std::process;

#[tokio::main]
async fn main() {
    env_logger::init();

    let exit_code = shipwright::cli::run().await;
    process::exit(exit_code);
}
