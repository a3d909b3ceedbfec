use anyhow::Context;
use timbre_pipeline::SessionConfig;
use timbre_server::AppState;
use tokio::net::TcpListener;

use crate::cli::ServeArgs;

pub async fn run(args: ServeArgs) -> anyhow::Result<()> {
    let mut template = super::load_config(&args.session, SessionConfig::streaming)?;
    if let Some(chunk_seconds) = args.chunk_seconds {
        template.block_time = chunk_seconds;
    }
    if args.vad {
        template.vad_enabled = true;
    }

    let catalog = super::open_catalog(&args.session)?;
    let adapter = super::create_adapter(&args.session);
    let state = AppState::new(catalog, adapter, template)?;

    let addr = format!("{}:{}", args.host, args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("cannot bind {addr}"))?;

    let shutdown = state.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
        }
        shutdown.cancel();
    });

    timbre_server::serve(listener, state).await?;
    Ok(())
}
