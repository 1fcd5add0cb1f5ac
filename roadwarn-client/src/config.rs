//! Client configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use roadwarn_core::network::endpoint::DETECT_PATH;
use roadwarn_core::{
    BackoffPolicy, DetectError, DetectionParams, Endpoint, Facing, LinkConfig, PipelineConfig,
    ReconcileConfig, TransmitConfig,
};

/// Top-level configuration for the console client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the detection service lives.
    pub network: NetworkConfig,
    /// Reconnect and keepalive policy.
    pub connection: ConnectionConfig,
    /// Frame source and pacing.
    pub capture: CaptureConfig,
    /// Knobs forwarded with every frame.
    pub detection: DetectionConfig,
    /// Warning panel behaviour.
    pub warnings: WarningsConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Network settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Service origin, e.g. `https://roadwarn.example.com`.
    pub origin: String,
    /// Route appended to the origin.
    pub detect_path: String,
    /// Full `ws://` / `wss://` URL; overrides `origin` when set.
    pub url: String,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

/// Reconnect and keepalive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    pub backoff_base_ms: u64,
    pub backoff_growth: f64,
    pub backoff_cap_ms: u64,
    pub backoff_jitter_ms: u64,
    /// Consecutive failures before giving up.
    pub max_retries: u32,
    pub keepalive_interval_ms: u64,
}

/// Capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Send cadence in milliseconds.
    pub interval_ms: u64,
    /// Directory of JPEG frames (optionally split into `user/` and
    /// `environment/`).
    pub frames_dir: PathBuf,
    /// Camera in use at startup.
    pub facing: Facing,
    /// Give up on an unanswered frame after this long and send again.
    /// `0` waits for the result or a link drop.
    pub result_timeout_ms: u64,
}

/// Detection knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub confidence_threshold: f32,
    pub window_size: [u32; 2],
    pub nms_threshold: f32,
    /// Extra numeric knobs sent verbatim.
    pub extra: BTreeMap<String, f64>,
}

/// Warning panel settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WarningsConfig {
    /// How long a warning stays without a fresh sighting.
    pub ttl_ms: u64,
    /// How often expired warnings are removed.
    pub sweep_interval_ms: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (overridden by `RUST_LOG`).
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8000".into(),
            detect_path: DETECT_PATH.into(),
            url: String::new(),
            connect_timeout_ms: 10_000,
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        let backoff = BackoffPolicy::default();
        Self {
            backoff_base_ms: backoff.base.as_millis() as u64,
            backoff_growth: backoff.growth,
            backoff_cap_ms: backoff.cap.as_millis() as u64,
            backoff_jitter_ms: backoff.jitter.as_millis() as u64,
            max_retries: backoff.max_retries,
            keepalive_interval_ms: 30_000,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interval_ms: 500,
            frames_dir: PathBuf::from("frames"),
            facing: Facing::Environment,
            result_timeout_ms: 0,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        let params = DetectionParams::default();
        Self {
            confidence_threshold: params.confidence_threshold,
            window_size: params.window_size,
            nms_threshold: params.nms_threshold,
            extra: params.extra,
        }
    }
}

impl Default for WarningsConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 5000,
            sweep_interval_ms: 1000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ClientConfig {
    /// Load from a TOML file. A missing file yields the defaults; a file
    /// that does not parse is an error for the caller to report.
    pub fn load(path: &Path) -> Result<Self, toml::de::Error> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> std::io::Result<()> {
        let text = toml::to_string_pretty(&Self::default()).map_err(std::io::Error::other)?;
        std::fs::write(path, text)
    }

    /// The detection endpoint: the explicit URL if set, otherwise the
    /// origin plus the detection route.
    pub fn endpoint(&self) -> Result<Endpoint, DetectError> {
        if self.network.url.trim().is_empty() {
            Endpoint::from_origin_with_path(&self.network.origin, &self.network.detect_path)
        } else {
            Endpoint::parse(self.network.url.trim())
        }
    }

    pub fn link_config(&self) -> Result<LinkConfig, DetectError> {
        let c = &self.connection;
        Ok(LinkConfig {
            backoff: BackoffPolicy {
                base: Duration::from_millis(c.backoff_base_ms),
                growth: c.backoff_growth,
                cap: Duration::from_millis(c.backoff_cap_ms),
                jitter: Duration::from_millis(c.backoff_jitter_ms),
                max_retries: c.max_retries,
            },
            keepalive_interval: Duration::from_millis(c.keepalive_interval_ms.max(1)),
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms.max(1)),
            ..LinkConfig::new(self.endpoint()?)
        })
    }

    pub fn detection_params(&self) -> DetectionParams {
        let d = &self.detection;
        DetectionParams {
            confidence_threshold: d.confidence_threshold,
            window_size: d.window_size,
            nms_threshold: d.nms_threshold,
            extra: d.extra.clone(),
        }
    }

    pub fn transmit_config(&self) -> TransmitConfig {
        TransmitConfig {
            interval: Duration::from_millis(self.capture.interval_ms.max(1)),
            params: self.detection_params(),
            result_timeout: match self.capture.result_timeout_ms {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            },
        }
    }

    pub fn reconcile_config(&self) -> ReconcileConfig {
        ReconcileConfig {
            ttl: Duration::from_millis(self.warnings.ttl_ms),
            sweep_interval: Duration::from_millis(self.warnings.sweep_interval_ms.max(1)),
        }
    }

    /// Everything the pipeline needs.
    pub fn pipeline_config(&self) -> Result<PipelineConfig, DetectError> {
        Ok(PipelineConfig {
            link: self.link_config()?,
            transmit: self.transmit_config(),
            reconcile: self.reconcile_config(),
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        assert!(text.contains("origin"));
        assert!(text.contains("keepalive_interval_ms"));
        assert!(text.contains("facing = \"environment\""));
    }

    #[test]
    fn roundtrip_config() {
        let text = toml::to_string_pretty(&ClientConfig::default()).unwrap();
        let parsed: ClientConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.capture.interval_ms, 500);
        assert_eq!(parsed.network.detect_path, "/api/v1/ws/detect");
        assert_eq!(parsed.detection.window_size, [160, 160]);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let parsed: ClientConfig = toml::from_str(
            r#"
            [network]
            origin = "https://signs.example.com"

            [capture]
            facing = "user"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.capture.facing, Facing::User);
        assert_eq!(parsed.connection.max_retries, 10);

        let endpoint = parsed.endpoint().unwrap();
        assert_eq!(endpoint.as_str(), "wss://signs.example.com/api/v1/ws/detect");
    }

    #[test]
    fn explicit_url_overrides_origin() {
        let mut cfg = ClientConfig::default();
        cfg.network.url = "ws://10.0.0.5:9000/custom".into();
        assert_eq!(cfg.endpoint().unwrap().as_str(), "ws://10.0.0.5:9000/custom");
    }

    #[test]
    fn converts_into_core_configs() {
        let mut cfg = ClientConfig::default();
        cfg.connection.max_retries = 3;
        cfg.detection.confidence_threshold = 0.55;
        cfg.warnings.ttl_ms = 8000;

        let pipeline = cfg.pipeline_config().unwrap();
        assert_eq!(pipeline.link.backoff.max_retries, 3);
        assert_eq!(pipeline.link.backoff.base, Duration::from_secs(1));
        assert_eq!(pipeline.link.keepalive_interval, Duration::from_secs(30));
        assert_eq!(pipeline.transmit.interval, Duration::from_millis(500));
        assert_eq!(pipeline.transmit.result_timeout, None);
        assert_eq!(pipeline.transmit.params.confidence_threshold, 0.55);
        assert_eq!(pipeline.reconcile.ttl, Duration::from_secs(8));
    }

    #[test]
    fn written_default_loads_back() {
        let path = std::env::temp_dir().join(format!(
            "roadwarn-client-{}.toml",
            std::process::id()
        ));
        ClientConfig::write_default(&path).unwrap();
        let cfg = ClientConfig::load(&path).unwrap();
        assert_eq!(cfg.warnings.ttl_ms, 5000);
        assert_eq!(cfg.connection.backoff_growth, 1.5);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ClientConfig::load(Path::new("/nonexistent/roadwarn-client.toml")).unwrap();
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn unparsable_file_is_reported() {
        let path = std::env::temp_dir().join(format!(
            "roadwarn-client-bad-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[capture]\ninterval_ms = \"fast\"\n").unwrap();
        let err = ClientConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn result_timeout_is_opt_in() {
        let mut cfg = ClientConfig::default();
        assert_eq!(cfg.transmit_config().result_timeout, None);

        cfg.capture.result_timeout_ms = 0;
        assert_eq!(cfg.transmit_config().result_timeout, None);

        cfg.capture.result_timeout_ms = 15_000;
        assert_eq!(
            cfg.transmit_config().result_timeout,
            Some(Duration::from_secs(15))
        );
    }
}
