// Binary entry point for settle
// This is a thin wrapper that delegates to the library implementation

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match settle::shell::run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("settle fatal error: {:#}", e);
            ExitCode::from(settle::shell::cli::EXIT_FAILED)
        }
    }
}
