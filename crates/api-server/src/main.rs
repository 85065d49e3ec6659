//! API Server Binary Entry Point

use anyhow::Context;
use deepfake_api_server::{start_server, ApiState, ServerConfig};
use deepfake_frame_classifier::{ClassifierConfig, FrameClassifierAdapter, OnnxDeepfakeClassifier};
use deepfake_pipeline::{load_overlay_font, DeepfakePipeline};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "deepfake_api_server=info,deepfake_pipeline=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;

    let mut classifier_config = ClassifierConfig::default();
    if let Some(labels_path) = &config.labels_path {
        classifier_config = classifier_config
            .with_labels_from_file(labels_path)
            .with_context(|| format!("Failed to read labels from {}", labels_path.display()))?;
    }
    let classifier = Arc::new(
        OnnxDeepfakeClassifier::new(&config.model_path, classifier_config).with_context(|| {
            format!(
                "Failed to load deepfake model from {}",
                config.model_path.display()
            )
        })?,
    );

    let font = match &config.font_path {
        Some(path) => Some(load_overlay_font(path)?),
        None => {
            tracing::warn!("DEEPFAKE_FONT_PATH not set, anomaly frames get a marker bar instead of score text");
            None
        }
    };

    let pipeline = DeepfakePipeline::new(
        FrameClassifierAdapter::new(classifier.clone()),
        config.pipeline_config(),
    )
    .with_font(font);

    let addr = config.addr.clone();
    let state = ApiState::new(pipeline, config);

    tracing::info!("Starting Deepfake Video Analysis API Server");
    start_server(&addr, state).await?;

    match Arc::try_unwrap(classifier) {
        Ok(classifier) => classifier.shutdown(),
        Err(_) => tracing::warn!("Classifier still referenced at shutdown, leaving it to process exit"),
    }

    Ok(())
}
