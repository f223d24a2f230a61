use anyhow::Result;
use image_classifier_node::{
    api, config::Config, metrics, EnginePool, ImageClassifier, LabelSet, OnnxEngine, TempArtifactStore,
};
use std::sync::Arc;

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received, draining in-flight requests");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with filters
    // ONNX Runtime is chatty at info, keep it to errors unless RUST_LOG says otherwise
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,ort=error,tower_http=info")
            }),
        )
        .init();

    tracing::info!("Starting image classification node...");

    // Initialize metrics
    metrics::init_metrics();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        pool_size = config.pool_config.size,
        temp_dir = %config.temp_images_dir.display(),
        "Configuration loaded"
    );

    // Staging directory must exist before the first upload arrives
    let store = TempArtifactStore::new(config.temp_images_dir.clone());
    store.ensure_dir().await?;

    // Label table is read once and shared read-only
    let labels = Arc::new(LabelSet::load(&config.model_config.labels_file_path)?);

    // Every engine is built now; none are created after startup
    let model_path = config.model_config.model_path.clone();
    let settings = config.model_config.image_settings();
    let intra_threads = config.model_config.intra_threads;
    let pool_size = config.pool_config.size;
    let acquire_timeout = config.pool_config.acquire_timeout();
    let pool = tokio::task::spawn_blocking(move || {
        EnginePool::from_factory(pool_size, acquire_timeout, |slot| {
            tracing::info!("📦 Loading engine {} of {}", slot + 1, pool_size);
            OnnxEngine::load(&model_path, settings.clone(), intra_threads)
        })
    })
    .await??;

    let classifier = ImageClassifier::new(store, pool, labels);
    let app = api::create_router(classifier, config.max_upload_bytes);

    tracing::info!("🌐 Image classification API listening on http://{}", config.bind_addr());
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Image classification node stopped");
    Ok(())
}
