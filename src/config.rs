use crate::engine::ImageSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default request body ceiling (10MB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub api_host: String,
    pub api_port: u16,
    pub model_config: ModelConfig,
    pub pool_config: PoolConfig,
    pub temp_images_dir: PathBuf,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub labels_file_path: PathBuf,
    pub image_width: u32,
    pub image_height: u32,
    pub image_mean: f32,
    pub image_scale: f32,
    pub channels_last: bool,
    pub intra_threads: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    pub size: usize,
    pub acquire_timeout_ms: Option<u64>, // None = wait indefinitely
}

impl ModelConfig {
    pub fn image_settings(&self) -> ImageSettings {
        ImageSettings {
            width: self.image_width,
            height: self.image_height,
            mean: self.image_mean,
            scale: self.image_scale,
            channels_last: self.channels_last,
        }
    }
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout_ms.map(Duration::from_millis)
    }
}

/// Parse an env var, falling back to `default` only when it is unset
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {:?} ({})", key, raw, e)),
        Err(_) => Ok(default),
    }
}

fn env_path(key: &str, default: &str) -> PathBuf {
    PathBuf::from(env::var(key).unwrap_or_else(|_| default.to_string()))
}

fn default_pool_size() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

impl Config {
    pub fn load() -> Result<Self> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let api_port = env_parse("API_PORT", 8080u16)?;

        // Model Configuration
        let model_config = ModelConfig {
            model_path: env_path("MODEL_PATH", "./ML/model.onnx"),
            labels_file_path: env_path("LABELS_FILE_PATH", "./ML/labels.txt"),
            image_width: env_parse("IMAGE_WIDTH", 224u32)?,
            image_height: env_parse("IMAGE_HEIGHT", 224u32)?,
            image_mean: env_parse("IMAGE_MEAN", 117.0f32)?,
            image_scale: env_parse("IMAGE_SCALE", 1.0f32)?,
            channels_last: env_parse("CHANNELS_LAST", true)?,
            intra_threads: env_parse("ENGINE_INTRA_THREADS", 1usize)?,
        };

        // Engine Pool Configuration
        let size = env_parse("ENGINE_POOL_SIZE", default_pool_size())?;
        if size == 0 {
            anyhow::bail!("ENGINE_POOL_SIZE must be at least 1");
        }
        let acquire_timeout_ms = match env::var("POOL_ACQUIRE_TIMEOUT_MS") {
            Ok(raw) if !raw.trim().is_empty() => Some(
                raw.trim()
                    .parse()
                    .with_context(|| format!("Invalid value for POOL_ACQUIRE_TIMEOUT_MS: {:?}", raw))?,
            ),
            _ => None,
        };

        let temp_images_dir = env_path("TEMP_IMAGES_DIR", "./TempImages");
        let max_upload_bytes = env_parse("MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?;

        Ok(Self {
            api_host,
            api_port,
            model_config,
            pool_config: PoolConfig {
                size,
                acquire_timeout_ms,
            },
            temp_images_dir,
            max_upload_bytes,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.api_host, self.api_port)
    }
}
