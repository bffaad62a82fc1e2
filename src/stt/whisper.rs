//! Whisper-based transcription backend using whisper-rs.
//!
//! One `WhisperTranscriber` wraps one loaded `WhisperContext`; the context
//! pool creates `n_contexts` of them at startup and each session borrows
//! one for its lifetime.
//!
//! # Feature Gate
//!
//! Requires the `whisper` feature (enabled by default) and cmake to build
//! whisper.cpp. Without the feature a stub is compiled that fails on use,
//! so the engine and its tests build everywhere.

use crate::error::{Result, ScribedError};
use crate::stt::transcriber::{TranscribeOptions, Transcriber};
use std::path::{Path, PathBuf};

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for opening a whisper context.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Path to the ggml model file
    pub model_path: PathBuf,
    /// Whether to use GPU acceleration
    pub use_gpu: bool,
    /// Whether to use flash attention kernels
    pub flash_attn: bool,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from(crate::defaults::DEFAULT_MODEL),
            use_gpu: true,
            flash_attn: true,
        }
    }
}

/// Whisper-backed transcriber holding one loaded context.
#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

/// Whisper-backed transcriber placeholder (without the `whisper` feature).
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperTranscriber {
    model_name: String,
}

fn model_name_from_path(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    /// Load a whisper model into a fresh context.
    ///
    /// # Errors
    /// Returns `ScribedError::ModelNotFound` if the model file doesn't
    /// exist and `ScribedError::ModelLoad` if loading fails.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        // Suppress whisper.cpp's own logging (only once per process)
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        if !config.model_path.exists() {
            return Err(ScribedError::ModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }

        let model_name = model_name_from_path(&config.model_path);

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(config.use_gpu);
        context_params.flash_attn(config.flash_attn);

        let context = WhisperContext::new_with_params(
            config.model_path.to_str().ok_or_else(|| ScribedError::ModelLoad {
                message: "Invalid UTF-8 in model path".to_string(),
            })?,
            context_params,
        )
        .map_err(|e| ScribedError::ModelLoad {
            message: format!("Failed to load whisper model: {}", e),
        })?;

        Ok(Self {
            context: Mutex::new(context),
            model_name,
        })
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperTranscriber {
    /// Create a whisper transcriber (stub implementation).
    pub fn new(config: WhisperConfig) -> Result<Self> {
        if !config.model_path.exists() {
            return Err(ScribedError::ModelNotFound {
                path: config.model_path.to_string_lossy().to_string(),
            });
        }

        Ok(Self {
            model_name: model_name_from_path(&config.model_path),
        })
    }
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, samples: &[f32], options: &TranscribeOptions) -> Result<Vec<String>> {
        let context = self.context.lock().map_err(|e| ScribedError::Inference {
            message: format!("Failed to acquire context lock: {}", e),
        })?;

        // Fresh state per call keeps the long-lived context reusable
        let mut state = context.create_state().map_err(|e| ScribedError::Inference {
            message: format!("Failed to create whisper state: {}", e),
        })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(&options.language));
        params.set_translate(options.translate);
        params.set_n_threads(options.threads as i32);
        params.set_single_segment(options.single_segment);
        params.set_no_context(options.no_context);

        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        if options.no_timestamps {
            params.set_token_timestamps(false);
        }

        state
            .full(params, samples)
            .map_err(|e| ScribedError::Inference {
                message: format!("Whisper inference failed: {}", e),
            })?;

        let mut segments = Vec::new();
        for segment in state.as_iter() {
            if let Ok(text) = segment.to_str_lossy() {
                segments.push(text.into_owned());
            }
        }

        Ok(segments)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, _samples: &[f32], _options: &TranscribeOptions) -> Result<Vec<String>> {
        Err(ScribedError::Inference {
            message: concat!(
                "Whisper feature not enabled. This binary was built without speech recognition.\n",
                "To fix: cargo build --release (whisper is enabled by default)\n",
                "If the build fails with cmake errors, install: sudo apt install cmake"
            )
            .to_string(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whisper_config_default() {
        let config = WhisperConfig::default();
        assert_eq!(config.model_path, PathBuf::from("models/ggml-base.en.bin"));
        assert!(config.use_gpu);
        assert!(config.flash_attn);
    }

    #[test]
    fn test_new_fails_for_missing_model() {
        let config = WhisperConfig {
            model_path: PathBuf::from("/nonexistent/model.bin"),
            ..Default::default()
        };

        match WhisperTranscriber::new(config) {
            Err(ScribedError::ModelNotFound { path }) => {
                assert_eq!(path, "/nonexistent/model.bin");
            }
            _ => panic!("Expected ModelNotFound error"),
        }
    }

    #[test]
    fn test_model_name_from_path() {
        assert_eq!(
            model_name_from_path(Path::new("/models/ggml-base.en.bin")),
            "ggml-base.en"
        );
        assert_eq!(model_name_from_path(Path::new("")), "unknown");
    }

    // Integration tests below run only when a real model is installed and
    // print a visible warning otherwise.

    #[cfg(feature = "whisper")]
    fn require_model() -> Option<PathBuf> {
        for candidate in ["models/ggml-tiny.en.bin", "models/ggml-base.en.bin"] {
            let path = PathBuf::from(candidate);
            if path.exists() {
                return Some(path);
            }
        }
        eprintln!();
        eprintln!("  ╔══════════════════════════════════════════════════════════╗");
        eprintln!("  ║  NO WHISPER MODEL FOUND — SKIPPING TEST                  ║");
        eprintln!("  ║  Place a ggml model under models/ to enable it.          ║");
        eprintln!("  ╚══════════════════════════════════════════════════════════╝");
        eprintln!();
        None
    }

    #[cfg(feature = "whisper")]
    #[test]
    fn test_transcribe_silence_with_real_model() {
        let Some(model_path) = require_model() else {
            return;
        };

        let transcriber = WhisperTranscriber::new(WhisperConfig {
            model_path,
            use_gpu: false,
            flash_attn: false,
        })
        .unwrap();

        let audio = vec![0.0f32; 16000];
        let options = TranscribeOptions {
            threads: 2,
            ..Default::default()
        };
        let segments = transcriber.transcribe(&audio, &options).unwrap();
        println!("Silence transcribed to {:?}", segments);
    }
}
