use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::defaults;
use crate::error::{Result, ScribedError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub timing: TimingConfig,
}

/// Model and inference configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Path to the whisper model file
    pub model_path: String,
    /// Path to the Silero VAD model; empty disables VAD
    pub vad_model_path: String,
    /// Language code passed to the transcriber
    pub language: String,
    /// Translate output to English
    pub translate: bool,
    /// Number of pooled whisper contexts
    pub n_contexts: usize,
    /// Threads per inference call
    pub n_threads: usize,
    /// GPU acceleration for the whisper contexts
    pub use_gpu: bool,
    /// Flash attention for the whisper contexts
    pub flash_attn: bool,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Shared token checked at upgrade time; empty disables the check
    pub auth_token: String,
}

/// Scheduler timing configuration, all values in milliseconds unless noted
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimingConfig {
    pub step_ms: u64,
    pub length_ms: u64,
    pub keep_ms: u64,
    pub vad_check_ms: u64,
    pub silence_trigger_ms: u64,
    pub min_speech_ms: u64,
    pub vad_threshold: f32,
    /// Maximum audio retained per session, in seconds
    pub max_retain_seconds: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: defaults::DEFAULT_MODEL.to_string(),
            vad_model_path: String::new(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            translate: false,
            n_contexts: defaults::N_CONTEXTS,
            n_threads: defaults::N_THREADS,
            use_gpu: true,
            flash_attn: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::DEFAULT_HOST.to_string(),
            port: defaults::DEFAULT_PORT,
            auth_token: String::new(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            step_ms: defaults::STEP_MS,
            length_ms: defaults::LENGTH_MS,
            keep_ms: defaults::KEEP_MS,
            vad_check_ms: defaults::VAD_CHECK_MS,
            silence_trigger_ms: defaults::SILENCE_TRIGGER_MS,
            min_speech_ms: defaults::MIN_SPEECH_MS,
            vad_threshold: defaults::VAD_THRESHOLD,
            max_retain_seconds: defaults::MAX_RETAIN_SECONDS,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// Missing fields use default values; invalid TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ScribedError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                ScribedError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - SCRIBED_MODEL → model.model_path
    /// - SCRIBED_VAD_MODEL → model.vad_model_path
    /// - SCRIBED_LANGUAGE → model.language
    /// - SCRIBED_AUTH_TOKEN → server.auth_token
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("SCRIBED_MODEL")
            && !model.is_empty()
        {
            self.model.model_path = model;
        }

        if let Ok(vad_model) = std::env::var("SCRIBED_VAD_MODEL")
            && !vad_model.is_empty()
        {
            self.model.vad_model_path = vad_model;
        }

        if let Ok(language) = std::env::var("SCRIBED_LANGUAGE")
            && !language.is_empty()
        {
            self.model.language = language;
        }

        if let Ok(token) = std::env::var("SCRIBED_AUTH_TOKEN")
            && !token.is_empty()
        {
            self.server.auth_token = token;
        }

        self
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.model.model_path.is_empty() {
            return Err(ScribedError::ConfigInvalid {
                key: "model.model_path".to_string(),
                message: "a whisper model path is required".to_string(),
            });
        }
        if self.model.n_contexts == 0 {
            return Err(ScribedError::ConfigInvalid {
                key: "model.n_contexts".to_string(),
                message: "at least one context is required".to_string(),
            });
        }
        if self.model.n_threads == 0 {
            return Err(ScribedError::ConfigInvalid {
                key: "model.n_threads".to_string(),
                message: "at least one thread is required".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.timing.vad_threshold) {
            return Err(ScribedError::ConfigInvalid {
                key: "timing.vad_threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        for (key, value) in [
            ("timing.step_ms", self.timing.step_ms),
            ("timing.length_ms", self.timing.length_ms),
            ("timing.vad_check_ms", self.timing.vad_check_ms),
            ("timing.silence_trigger_ms", self.timing.silence_trigger_ms),
        ] {
            if value == 0 {
                return Err(ScribedError::ConfigInvalid {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.timing.max_retain_seconds == 0 {
            return Err(ScribedError::ConfigInvalid {
                key: "timing.max_retain_seconds".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// True when a VAD model is configured.
    pub fn vad_enabled(&self) -> bool {
        !self.model.vad_model_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    // Mutex to serialize tests that modify environment variables
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    // SAFETY: These helpers are only used in tests with ENV_LOCK held,
    // ensuring no concurrent access to environment variables.
    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    fn clear_scribed_env() {
        remove_env("SCRIBED_MODEL");
        remove_env("SCRIBED_VAD_MODEL");
        remove_env("SCRIBED_LANGUAGE");
        remove_env("SCRIBED_AUTH_TOKEN");
    }

    #[test]
    fn test_default_config_has_documented_values() {
        let config = Config::default();

        assert_eq!(config.model.model_path, "models/ggml-base.en.bin");
        assert_eq!(config.model.vad_model_path, "");
        assert_eq!(config.model.language, "en");
        assert!(!config.model.translate);
        assert_eq!(config.model.n_contexts, 2);
        assert_eq!(config.model.n_threads, 4);
        assert!(config.model.use_gpu);
        assert!(config.model.flash_attn);

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.auth_token, "");

        assert_eq!(config.timing.step_ms, 500);
        assert_eq!(config.timing.length_ms, 5000);
        assert_eq!(config.timing.keep_ms, 200);
        assert_eq!(config.timing.vad_check_ms, 30);
        assert_eq!(config.timing.silence_trigger_ms, 1000);
        assert_eq!(config.timing.min_speech_ms, 100);
        assert_eq!(config.timing.vad_threshold, 0.5);
        assert_eq!(config.timing.max_retain_seconds, 30);
    }

    #[test]
    fn test_default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_vad_disabled_by_default() {
        assert!(!Config::default().vad_enabled());
    }

    #[test]
    fn test_load_from_toml_file() {
        let toml_content = r#"
            [model]
            model_path = "/models/ggml-small.bin"
            vad_model_path = "/models/silero.onnx"
            language = "de"
            n_contexts = 4

            [server]
            port = 8080
            auth_token = "secret"

            [timing]
            step_ms = 250
            silence_trigger_ms = 800
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.model.model_path, "/models/ggml-small.bin");
        assert_eq!(config.model.vad_model_path, "/models/silero.onnx");
        assert!(config.vad_enabled());
        assert_eq!(config.model.language, "de");
        assert_eq!(config.model.n_contexts, 4);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.auth_token, "secret");
        assert_eq!(config.timing.step_ms, 250);
        assert_eq!(config.timing.silence_trigger_ms, 800);

        // Everything else keeps defaults
        assert_eq!(config.model.n_threads, 4);
        assert_eq!(config.timing.length_ms, 5000);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let result = Config::load(Path::new("/tmp/nonexistent_scribed_config_12345.toml"));
        assert!(matches!(
            result,
            Err(ScribedError::ConfigFileNotFound { .. })
        ));
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[model\nbroken").unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_scribed_env();

        set_env("SCRIBED_MODEL", "/opt/models/ggml-tiny.bin");
        set_env("SCRIBED_AUTH_TOKEN", "hunter2");
        let config = Config::default().with_env_overrides();

        assert_eq!(config.model.model_path, "/opt/models/ggml-tiny.bin");
        assert_eq!(config.server.auth_token, "hunter2");
        assert_eq!(config.model.language, "en"); // Not overridden

        clear_scribed_env();
    }

    #[test]
    fn test_env_override_empty_string_ignored() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_scribed_env();

        set_env("SCRIBED_LANGUAGE", "");
        let config = Config::default().with_env_overrides();
        assert_eq!(config.model.language, "en");

        clear_scribed_env();
    }

    #[test]
    fn test_validate_rejects_empty_model_path() {
        let mut config = Config::default();
        config.model.model_path.clear();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("model.model_path"));
    }

    #[test]
    fn test_validate_rejects_zero_contexts() {
        let mut config = Config::default();
        config.model.n_contexts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = Config::default();
        config.timing.vad_threshold = 1.5;
        assert!(config.validate().is_err());

        config.timing.vad_threshold = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timings() {
        let mut config = Config::default();
        config.timing.step_ms = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.timing.max_retain_seconds = 0;
        assert!(config.validate().is_err());
    }
}
