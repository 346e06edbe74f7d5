use clap::Parser;
use skybook::app::App;
use skybook::cli::Args;
use skybook::config::Config;
use skybook::logging::setup_logging;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config before App assembly so startup logs are never silently dropped
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("failed to load config: {err:#}");
            return ExitCode::FAILURE;
        }
    };
    setup_logging(&config, args.tracing);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = if cfg!(debug_assertions) {
            "development"
        } else {
            "production"
        },
        "starting skybook"
    );

    let app = match App::with_config(config) {
        Ok(app) => app,
        Err(err) => {
            error!(error = ?err, "failed to initialize application");
            return ExitCode::FAILURE;
        }
    };

    match app.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = ?err, "server exited with error");
            ExitCode::FAILURE
        }
    }
}
