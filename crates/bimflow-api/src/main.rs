use bimflow_core::Config;

// mimalloc keeps fragmentation low under many concurrent multipart uploads,
// especially on musl-based container images.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let config = Config::from_env()?;

    // Initialize the application (telemetry, persistence, storage, workers, routes)
    let (state, router) = bimflow_api::setup::initialize_app(config.clone()).await?;

    bimflow_api::setup::server::start_server(&config, router).await?;

    // Stop claiming jobs once the listener is closed
    state.shutdown().await;

    Ok(())
}
