//! note-assist: serve the enhancement API over HTTP.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use note_assist::config::{AppConfig, Cli};
use note_assist::enhance::{EnhancementService, PromptBuilder};
use note_assist::llm::{LlmClient, StreamTranscoder};
use note_assist::middleware::{LoggerMiddleware, Pipeline};
use note_assist::security::CorsMiddleware;
use note_assist::{Server, api};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("note_assist=info")),
        )
        .init();

    let config = match Cli::parse_args().into_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        model = %config.provider.model,
        base_url = %config.provider.base_url,
        cors_origins = config.cors_origins.len(),
        "starting note-assist"
    );

    let transcoder = StreamTranscoder::new(config.provider.stream_idle_timeout);
    let client = LlmClient::new(config.provider)?;
    let service = EnhancementService::new(client, PromptBuilder::new(config.limits), transcoder);

    let pipeline = Pipeline::new(api::routes(service))
        .with(Arc::new(LoggerMiddleware))
        .with(Arc::new(CorsMiddleware::from_origins(config.cors_origins)));

    let server = Server::bind(&config.bind).await?;
    server
        .run_until(
            move |req| {
                let pipeline = pipeline.clone();
                async move { pipeline.handle(req).await }
            },
            shutdown_signal(),
        )
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
