//! mpdataserver - HTTPS multiplayer data server

use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    match mpdataserver::cli::run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(mpdataserver::exit_code(&e))
        }
    }
}
