//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::types::Coordinate;
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct NavigationConfig {
    /// Distance at which a waypoint's instruction is announced (meters)
    #[serde(default = "default_instruction_radius_m")]
    pub instruction_radius_m: f64,
    /// Distance at which a waypoint counts as reached (meters)
    #[serde(default = "default_arrival_radius_m")]
    pub arrival_radius_m: f64,
    /// Synthetic playback pace, one waypoint per interval
    #[serde(default = "default_synthetic_interval_ms")]
    pub synthetic_interval_ms: u64,
    /// Re-announce an instruction on every tick inside the instruction radius
    #[serde(default = "default_repeat_instructions")]
    pub repeat_instructions: bool,
    /// Samples older than this are not trusted for arrival decisions (0 disables)
    #[serde(default = "default_max_sample_age_ms")]
    pub max_sample_age_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            instruction_radius_m: default_instruction_radius_m(),
            arrival_radius_m: default_arrival_radius_m(),
            synthetic_interval_ms: default_synthetic_interval_ms(),
            repeat_instructions: default_repeat_instructions(),
            max_sample_age_ms: default_max_sample_age_ms(),
        }
    }
}

fn default_instruction_radius_m() -> f64 {
    20.0
}

fn default_arrival_radius_m() -> f64 {
    5.0
}

fn default_synthetic_interval_ms() -> u64 {
    3000
}

fn default_repeat_instructions() -> bool {
    true
}

fn default_max_sample_age_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    /// Position assumed when no fix has ever been reported
    #[serde(default = "default_fallback_lat")]
    pub fallback_lat: f64,
    #[serde(default = "default_fallback_lon")]
    pub fallback_lon: f64,
    #[serde(default = "default_nearby_radius_m")]
    pub nearby_radius_m: f64,
    #[serde(default = "default_nearby_announce_limit")]
    pub nearby_announce_limit: usize,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            fallback_lat: default_fallback_lat(),
            fallback_lon: default_fallback_lon(),
            nearby_radius_m: default_nearby_radius_m(),
            nearby_announce_limit: default_nearby_announce_limit(),
        }
    }
}

fn default_fallback_lat() -> f64 {
    39.9040
}

fn default_fallback_lon() -> f64 {
    116.4070
}

fn default_nearby_radius_m() -> f64 {
    100.0
}

fn default_nearby_announce_limit() -> usize {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Campus dataset (JSON: locations and routes)
    #[serde(default = "default_campus_file")]
    pub campus_file: String,
    /// Navigation history (JSONL)
    #[serde(default = "default_history_file")]
    pub history_file: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { campus_file: default_campus_file(), history_file: default_history_file() }
    }
}

fn default_campus_file() -> String {
    "data/campus.json".to_string()
}

fn default_history_file() -> String {
    "data/history.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeechConfig {
    /// Maximum queued utterances before new ones are dropped
    #[serde(default = "default_speech_queue_size")]
    pub queue_size: usize,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self { queue_size: default_speech_queue_size() }
    }
}

fn default_speech_queue_size() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct PositioningConfig {
    /// Enable the TCP position fix listener (live driver)
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_positioning_port")]
    pub port: u16,
}

impl Default for PositioningConfig {
    fn default() -> Self {
        Self { enabled: false, port: default_positioning_port() }
    }
}

fn default_positioning_port() -> u16 {
    7878
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    /// Status HTTP port (0 to disable)
    #[serde(default = "default_status_port")]
    pub port: u16,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { port: default_status_port() }
    }
}

fn default_status_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs() }
    }
}

fn default_metrics_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub navigation: NavigationConfig,
    #[serde(default)]
    pub location: LocationConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub speech: SpeechConfig,
    #[serde(default)]
    pub positioning: PositioningConfig,
    #[serde(default)]
    pub status: StatusConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    instruction_radius_m: f64,
    arrival_radius_m: f64,
    synthetic_interval_ms: u64,
    repeat_instructions: bool,
    max_sample_age_ms: u64,
    fallback_position: Coordinate,
    nearby_radius_m: f64,
    nearby_announce_limit: usize,
    campus_file: String,
    history_file: String,
    speech_queue_size: usize,
    positioning_enabled: bool,
    positioning_port: u16,
    status_port: u16,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        let TomlConfig { navigation, location, store, speech, positioning, status, metrics } =
            toml_config;

        Self {
            instruction_radius_m: navigation.instruction_radius_m,
            arrival_radius_m: navigation.arrival_radius_m,
            synthetic_interval_ms: navigation.synthetic_interval_ms,
            repeat_instructions: navigation.repeat_instructions,
            max_sample_age_ms: navigation.max_sample_age_ms,
            fallback_position: Coordinate::new(location.fallback_lat, location.fallback_lon),
            nearby_radius_m: location.nearby_radius_m,
            nearby_announce_limit: location.nearby_announce_limit,
            campus_file: store.campus_file,
            history_file: store.history_file,
            speech_queue_size: speech.queue_size,
            positioning_enabled: positioning.enabled,
            positioning_port: positioning.port,
            status_port: status.port,
            metrics_interval_secs: metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let config = Self::from_toml(toml_config, &path.display().to_string());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "config_load_failed_using_defaults");
                Self::default()
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        for (name, value) in [
            ("instruction_radius_m", self.instruction_radius_m),
            ("arrival_radius_m", self.arrival_radius_m),
            ("nearby_radius_m", self.nearby_radius_m),
        ] {
            if !value.is_finite() {
                anyhow::bail!("{name} must be a finite number, got {value}");
            }
        }
        if self.arrival_radius_m > self.instruction_radius_m {
            anyhow::bail!(
                "arrival_radius_m ({}) must not exceed instruction_radius_m ({})",
                self.arrival_radius_m,
                self.instruction_radius_m
            );
        }
        if self.arrival_radius_m < 0.0 {
            anyhow::bail!("arrival_radius_m must be non-negative");
        }
        if self.synthetic_interval_ms == 0 {
            anyhow::bail!("synthetic_interval_ms must be positive");
        }
        Ok(())
    }

    pub fn instruction_radius_m(&self) -> f64 {
        self.instruction_radius_m
    }

    pub fn arrival_radius_m(&self) -> f64 {
        self.arrival_radius_m
    }

    pub fn synthetic_interval_ms(&self) -> u64 {
        self.synthetic_interval_ms
    }

    pub fn repeat_instructions(&self) -> bool {
        self.repeat_instructions
    }

    pub fn max_sample_age_ms(&self) -> u64 {
        self.max_sample_age_ms
    }

    pub fn fallback_position(&self) -> Coordinate {
        self.fallback_position
    }

    pub fn nearby_radius_m(&self) -> f64 {
        self.nearby_radius_m
    }

    pub fn nearby_announce_limit(&self) -> usize {
        self.nearby_announce_limit
    }

    pub fn campus_file(&self) -> &str {
        &self.campus_file
    }

    pub fn history_file(&self) -> &str {
        &self.history_file
    }

    pub fn speech_queue_size(&self) -> usize {
        self.speech_queue_size
    }

    pub fn positioning_enabled(&self) -> bool {
        self.positioning_enabled
    }

    pub fn positioning_port(&self) -> u16 {
        self.positioning_port
    }

    pub fn status_port(&self) -> u16 {
        self.status_port
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the synthetic playback interval
    pub fn with_synthetic_interval_ms(mut self, ms: u64) -> Self {
        self.synthetic_interval_ms = ms;
        self
    }

    /// Builder method for tests to toggle instruction repeats
    pub fn with_repeat_instructions(mut self, repeat: bool) -> Self {
        self.repeat_instructions = repeat;
        self
    }

    /// Builder method for tests to set the sample staleness limit
    pub fn with_max_sample_age_ms(mut self, ms: u64) -> Self {
        self.max_sample_age_ms = ms;
        self
    }

    /// Builder method for tests to set the fallback position
    pub fn with_fallback_position(mut self, position: Coordinate) -> Self {
        self.fallback_position = position;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.instruction_radius_m(), 20.0);
        assert_eq!(config.arrival_radius_m(), 5.0);
        assert_eq!(config.synthetic_interval_ms(), 3000);
        assert!(config.repeat_instructions());
        assert_eq!(config.fallback_position(), Coordinate::new(39.9040, 116.4070));
        assert_eq!(config.nearby_announce_limit(), 5);
        assert!(!config.positioning_enabled());
        assert_eq!(config.config_file(), "default");
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["wayfinder".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> = vec![
            "wayfinder".to_string(),
            "--config".to_string(),
            "config/campus.toml".to_string(),
        ];
        assert_eq!(Config::resolve_config_path(&args), "config/campus.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> =
            vec!["wayfinder".to_string(), "--config=config/demo.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/demo.toml");
    }

    #[test]
    fn test_partial_sections_use_defaults() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
[navigation]
instruction_radius_m = 30.0
"#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline");
        assert_eq!(config.instruction_radius_m(), 30.0);
        assert_eq!(config.arrival_radius_m(), 5.0);
        assert_eq!(config.status_port(), 8080);
    }

    #[test]
    fn test_validate_rejects_inverted_radii() {
        let mut config = Config::default();
        config.arrival_radius_m = 50.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_radii() {
        let mut config = Config::default();
        config.instruction_radius_m = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.arrival_radius_m = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.nearby_radius_m = f64::INFINITY;
        assert!(config.validate().is_err());
    }
}
