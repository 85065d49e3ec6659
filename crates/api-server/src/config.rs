//! Server configuration from environment variables

use anyhow::{Context, Result};
use deepfake_pipeline::PipelineConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the API server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (`API_SERVER_ADDR`)
    pub addr: String,
    /// Root for uploaded videos, one subdirectory per request (`DEEPFAKE_UPLOAD_DIR`)
    pub upload_dir: PathBuf,
    /// Root for generated artifacts, one subdirectory per request (`DEEPFAKE_PROCESSED_DIR`)
    pub processed_dir: PathBuf,
    /// ONNX model (`DEEPFAKE_MODEL_PATH`)
    pub model_path: PathBuf,
    /// HuggingFace `config.json` holding `id2label` (`DEEPFAKE_LABELS_PATH`)
    pub labels_path: Option<PathBuf>,
    /// TrueType font for overlay text (`DEEPFAKE_FONT_PATH`)
    pub font_path: Option<PathBuf>,
    /// Classification workers per request (`DEEPFAKE_WORKERS`)
    pub workers: Option<usize>,
    /// Pipeline deadline (`DEEPFAKE_TIMEOUT_SECS`)
    pub timeout: Duration,
    /// Maximum upload body size in bytes (`DEEPFAKE_MAX_UPLOAD_MB`)
    pub max_upload_bytes: usize,
    /// Prefix for artifact URLs in responses (`DEEPFAKE_PUBLIC_BASE_URL`)
    pub public_base_url: String,
    /// Minimum score for a frame to count (`DEEPFAKE_MIN_CONFIDENCE`)
    pub min_confidence: Option<f32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
            upload_dir: PathBuf::from("uploads"),
            processed_dir: PathBuf::from("processed_frames"),
            model_path: PathBuf::from("models/deepfake-detection/model.onnx"),
            labels_path: None,
            font_path: None,
            workers: None,
            timeout: Duration::from_secs(600),
            max_upload_bytes: 512 * 1024 * 1024,
            public_base_url: String::new(),
            min_confidence: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let workers = var("DEEPFAKE_WORKERS")
            .map(|v| v.trim().parse::<usize>())
            .transpose()
            .context("DEEPFAKE_WORKERS must be a positive integer")?;
        let timeout = var("DEEPFAKE_TIMEOUT_SECS")
            .map(|v| v.trim().parse::<u64>().map(Duration::from_secs))
            .transpose()
            .context("DEEPFAKE_TIMEOUT_SECS must be a number of seconds")?
            .unwrap_or(defaults.timeout);
        let max_upload_bytes = var("DEEPFAKE_MAX_UPLOAD_MB")
            .map(|v| v.trim().parse::<usize>().map(|mb| mb * 1024 * 1024))
            .transpose()
            .context("DEEPFAKE_MAX_UPLOAD_MB must be a number of megabytes")?
            .unwrap_or(defaults.max_upload_bytes);
        let min_confidence = var("DEEPFAKE_MIN_CONFIDENCE")
            .map(|v| v.trim().parse::<f32>())
            .transpose()
            .context("DEEPFAKE_MIN_CONFIDENCE must be a number between 0 and 1")?;

        Ok(Self {
            addr: var("API_SERVER_ADDR").unwrap_or(defaults.addr),
            upload_dir: var("DEEPFAKE_UPLOAD_DIR").map_or(defaults.upload_dir, PathBuf::from),
            processed_dir: var("DEEPFAKE_PROCESSED_DIR")
                .map_or(defaults.processed_dir, PathBuf::from),
            model_path: var("DEEPFAKE_MODEL_PATH").map_or(defaults.model_path, PathBuf::from),
            labels_path: var("DEEPFAKE_LABELS_PATH").map(PathBuf::from),
            font_path: var("DEEPFAKE_FONT_PATH").map(PathBuf::from),
            workers,
            timeout,
            max_upload_bytes,
            public_base_url: var("DEEPFAKE_PUBLIC_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.public_base_url),
            min_confidence,
        })
    }

    /// Pipeline settings derived from this configuration
    #[must_use]
    pub fn pipeline_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig {
            timeout: self.timeout,
            min_confidence: self.min_confidence,
            ..PipelineConfig::default()
        };
        if let Some(workers) = self.workers {
            config.workers = workers.max(1);
            config.channel_capacity = config.workers * 2;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.addr, "0.0.0.0:8080");
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
        assert_eq!(config.processed_dir, PathBuf::from("processed_frames"));
        assert_eq!(config.timeout, Duration::from_secs(600));
        assert_eq!(config.max_upload_bytes, 512 * 1024 * 1024);
        assert!(config.labels_path.is_none());
        assert!(config.min_confidence.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("API_SERVER_ADDR", "127.0.0.1:9000"),
            ("DEEPFAKE_WORKERS", "3"),
            ("DEEPFAKE_TIMEOUT_SECS", "30"),
            ("DEEPFAKE_MAX_UPLOAD_MB", "8"),
            ("DEEPFAKE_PUBLIC_BASE_URL", "https://media.example.org/"),
            ("DEEPFAKE_MIN_CONFIDENCE", "0.6"),
            ("DEEPFAKE_FONT_PATH", "fonts/DejaVuSans.ttf"),
        ]))
        .unwrap();

        assert_eq!(config.addr, "127.0.0.1:9000");
        assert_eq!(config.workers, Some(3));
        assert_eq!(config.max_upload_bytes, 8 * 1024 * 1024);
        assert_eq!(config.public_base_url, "https://media.example.org");
        assert_eq!(config.font_path, Some(PathBuf::from("fonts/DejaVuSans.ttf")));

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.workers, 3);
        assert_eq!(pipeline.timeout, Duration::from_secs(30));
        assert_eq!(pipeline.min_confidence, Some(0.6));
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        assert!(ServerConfig::from_lookup(lookup(&[("DEEPFAKE_WORKERS", "many")])).is_err());
        assert!(ServerConfig::from_lookup(lookup(&[("DEEPFAKE_TIMEOUT_SECS", "-1")])).is_err());
    }

    #[test]
    fn test_blank_values_use_defaults() {
        let config = ServerConfig::from_lookup(lookup(&[("DEEPFAKE_UPLOAD_DIR", "  ")])).unwrap();
        assert_eq!(config.upload_dir, PathBuf::from("uploads"));
    }
}
