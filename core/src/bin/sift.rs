//! Sift command-line tool
//!
//! Checks, describes and runs script units from their JSON AST form.

use sift_core::cli;

fn main() {
    if let Err(e) = cli::run_cli() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
