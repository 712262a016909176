//! Configuration loaded from the environment.

use crate::domain::av::cmd::TranscoderSettings;
use crate::domain::chunker::ChunkingPolicy;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Where session directories may live, in fallback order.
#[derive(Clone, Debug)]
pub struct StorageConfig {
    /// Explicitly configured absolute root (`HLS_ROOT`)
    pub hls_root: Option<PathBuf>,
    /// Media root; sessions go under `<media_root>/hls`
    pub media_root: PathBuf,
    /// Deployment-specific path tried before falling back to a temp dir
    pub deploy_root: PathBuf,
    /// Public URL prefix, ends with `/`
    pub base_url: String,
    /// Mirror sessions into the expected directory with symlinks
    /// (`HLS_MIRROR_LINKS`); copy them when false
    pub link_mirrors: bool,
}

impl StorageConfig {
    /// The directory an external static server expects sessions in.
    pub fn expected_dir(&self) -> PathBuf {
        match &self.hls_root {
            Some(root) => root.clone(),
            None => self.media_root.join("hls"),
        }
    }
}

/// Connection settings for an OpenAI-compatible completion endpoint.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

/// Full service configuration.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// HTTP server bind address
    pub addr: String,
    /// HTTP server port
    pub port: String,
    pub storage: StorageConfig,
    pub transcoder: TranscoderSettings,
    pub chunking: ChunkingPolicy,
    /// How long `begin` waits for the first segment
    pub bootstrap_timeout: Duration,
    /// Segments required before `begin` returns early
    pub bootstrap_min_segments: usize,
    /// Age after which finished sessions are evicted; `None` keeps them forever
    pub retention: Option<Duration>,
    pub llm: LlmConfig,
    /// Override for the speech endpoint (`TTS_ENDPOINT`)
    pub tts_endpoint: Option<String>,
}

impl StreamConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let hls_root = env::var("HLS_ROOT")
            .ok()
            .map(PathBuf::from)
            .filter(|p| p.is_absolute());

        let mut base_url = env::var("HLS_URL").unwrap_or_else(|_| String::from("/media/hls/"));
        if !base_url.ends_with('/') {
            base_url.push('/');
        }

        let defaults = TranscoderSettings::default();
        let chunk_defaults = ChunkingPolicy::default();
        let retention_secs: u64 = parse_or("HLS_RETENTION_SECS", 0);

        Self {
            addr: env::var("ADDR").unwrap_or_else(|_| String::from("127.0.0.1")),
            port: env::var("PORT").unwrap_or_else(|_| String::from("3000")),
            storage: StorageConfig {
                hls_root,
                media_root: PathBuf::from(
                    env::var("MEDIA_ROOT").unwrap_or_else(|_| String::from("./media")),
                ),
                deploy_root: PathBuf::from(
                    env::var("DEPLOY_HLS_ROOT").unwrap_or_else(|_| String::from("/app/media/hls")),
                ),
                base_url,
                link_mirrors: parse_or("HLS_MIRROR_LINKS", true),
            },
            transcoder: TranscoderSettings {
                program: env::var("FFMPEG_BIN").unwrap_or(defaults.program),
                input_format: env::var("HLS_INPUT_FORMAT").unwrap_or(defaults.input_format),
                segment_seconds: parse_or("HLS_SEGMENT_SECONDS", defaults.segment_seconds),
                list_size: parse_or("HLS_LIST_SIZE", defaults.list_size),
                ..defaults
            },
            chunking: ChunkingPolicy::new(
                parse_or("FIRST_CHUNK_WORDS", chunk_defaults.first_chunk_words),
                parse_or("CHUNK_WORDS", chunk_defaults.chunk_words),
            ),
            bootstrap_timeout: secs_or("BOOTSTRAP_TIMEOUT_SECS", Duration::from_secs(10)),
            bootstrap_min_segments: parse_or("BOOTSTRAP_MIN_SEGMENTS", 1),
            retention: (retention_secs > 0).then(|| Duration::from_secs(retention_secs)),
            llm: LlmConfig {
                api_base: env::var("LLM_API_BASE")
                    .unwrap_or_else(|_| String::from("https://api.openai.com/v1")),
                api_key: env::var("LLM_API_KEY").ok(),
                model: env::var("LLM_MODEL_NAME").unwrap_or_else(|_| String::from("gpt-4o")),
                max_tokens: parse_or("LLM_MAX_TOKENS", 100),
                timeout: Duration::from_secs(60),
            },
            tts_endpoint: env::var("TTS_ENDPOINT").ok(),
        }
    }
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Fractional seconds; negative, NaN and out of range values fall back to `default`.
fn secs_or(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .unwrap_or(default)
}
