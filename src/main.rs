use llm_interface::GeminiProvider;
use persistence::PersistenceGateway;
use reply_engine::ReplyEngine;
use replyflow_core::EngineConfig;
use std::sync::Arc;
use threads_client::ThreadsApiClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "replyflow=debug,reply_engine=debug,threads_client=info,llm_interface=info,persistence=info"
                    .into()
            }),
        )
        .init();

    tracing::info!("Starting Replyflow - Threads Auto-Reply Engine");

    let config = EngineConfig::from_env();
    let data_dir = std::env::var("REPLYFLOW_DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let gateway = PersistenceGateway::new(&data_dir);

    let threads = Arc::new(ThreadsApiClient::new(config.credentials.access_token.clone()));
    let gemini = Arc::new(GeminiProvider::new(config.credentials.gemini_api_key.clone()));

    let comments: Arc<dyn threads_client::CommentSource> = threads.clone();
    let engine = ReplyEngine::bootstrap(config, gateway, comments, gemini, threads).await;

    let status = engine.status().await;
    tracing::info!(
        "Engine ready: {} monitored posts, {} replies sent so far, data in {}",
        status.monitored_count,
        status.total_replies,
        data_dir
    );

    if status.enabled {
        match engine.start().await {
            Ok(()) => tracing::info!("Auto-reply is enabled, background job started"),
            Err(e) => tracing::warn!("Auto-reply not started: {}", e),
        }
    } else {
        tracing::info!("Auto-reply disabled; set AUTO_REPLY_ENABLED=true to activate");
    }

    wait_for_shutdown_signal().await?;

    tracing::info!("Shutdown signal received, saving data...");
    engine.shutdown().await;
    tracing::info!("Goodbye");
    Ok(())
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }
    Ok(())
}
