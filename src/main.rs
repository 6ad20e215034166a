use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use verimedia_core::{
    api, store, Config, Engine, EngineParts, HttpClassifier, ProvenanceSigner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ----------------------------------------------------------------
    // 0. Configuration
    // ----------------------------------------------------------------
    let config = Config::from_env()?;
    // Validated once, when the engine builds its aggregator.
    let settings = config.load_settings()?;
    info!(
        host = %config.host,
        port = config.port,
        db = %config.db_path,
        key = %config.key_path,
        classifier = %config.classifier_url,
        "⚙️  configuration loaded"
    );

    // ----------------------------------------------------------------
    // 1. Identity + storage
    // ----------------------------------------------------------------
    let signer = ProvenanceSigner::load_or_generate(&config.key_path)?;
    info!(public_key = %hex::encode(signer.public_key().to_bytes()), issuer = %config.issuer, "🆔 signing identity ready");

    let db = store::open_database(&config.db_path)?;

    let classifier = HttpClassifier::new(config.classifier_url.clone())
        .with_timeout(settings.classifier_timeout())
        .with_max_payload(settings.max_asset_bytes);

    // ----------------------------------------------------------------
    // 2. Engine
    // ----------------------------------------------------------------
    let engine = Engine::new(
        EngineParts {
            db,
            signer,
            issuer: config.issuer.clone(),
            classifier: Arc::new(classifier),
            output_dir: Some(config.output_dir.clone().into()),
            trusted_keys: Vec::new(),
        },
        &settings,
    )?;

    let state = Arc::new(api::AppState {
        engine: Arc::new(engine),
    });

    // ----------------------------------------------------------------
    // 3. HTTP
    // ----------------------------------------------------------------
    let app = api::app(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;

    info!("🚀 VeriMedia API listening on http://{}", addr);
    info!("   - POST /verify            : multi-layer authenticity report");
    info!("   - POST /watermark         : embed provenance watermark");
    info!("   - GET  /records/{{digest}} : provenance sidecar");
    info!("   - GET  /audit/{{digest}}   : ledger inclusion proof");

    axum::serve(listener, app).await?;

    Ok(())
}
