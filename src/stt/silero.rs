//! Silero VAD backend via ONNX Runtime.
//!
//! Silero is a small stateful model that scores 512-sample frames (32ms
//! at 16kHz) with a 64-sample context carried from the previous frame.
//! `probability` feeds the whole window through frame by frame and
//! returns the last frame's score, which is what the speech state
//! machine keys on.
//!
//! # Feature Gate
//!
//! Requires the `vad-onnx` feature (enabled by default). Without it a
//! stub is compiled that fails on open.

use crate::error::{Result, ScribedError};
use crate::stt::detector::SpeechDetector;
use std::path::Path;

#[cfg(feature = "vad-onnx")]
use ort::session::{Session, builder::GraphOptimizationLevel};
#[cfg(feature = "vad-onnx")]
use ort::value::Value;

/// Samples per Silero frame at 16kHz.
const FRAME_SIZE: usize = 512;
/// Context samples carried between frames at 16kHz.
const CONTEXT_SIZE: usize = 64;
/// Flattened shape of the model's recurrent state tensor [2, 1, 128].
#[cfg(feature = "vad-onnx")]
const STATE_SIZE: usize = 2 * 128;

/// Silero VAD detector holding one ONNX session.
#[cfg(feature = "vad-onnx")]
pub struct SileroDetector {
    session: Session,
    /// Hidden state tensor, flattened [2, 1, 128]
    state: Vec<f32>,
    /// Tail of the previous frame, prepended to the next
    context: Vec<f32>,
}

/// Silero VAD detector placeholder (without the `vad-onnx` feature).
#[cfg(not(feature = "vad-onnx"))]
pub struct SileroDetector;

#[cfg(feature = "vad-onnx")]
impl SileroDetector {
    /// Load the Silero VAD model from an ONNX file.
    ///
    /// # Errors
    /// Returns `ScribedError::ModelNotFound` if the file doesn't exist
    /// and `ScribedError::ModelLoad` if the session cannot be built.
    pub fn new(model_path: &Path, threads: usize) -> Result<Self> {
        if !model_path.exists() {
            return Err(ScribedError::ModelNotFound {
                path: model_path.display().to_string(),
            });
        }

        let session = Session::builder()
            .map_err(|e| ScribedError::ModelLoad {
                message: format!("Failed to create session builder: {}", e),
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| ScribedError::ModelLoad {
                message: format!("Failed to set optimization level: {}", e),
            })?
            .with_intra_threads(threads)
            .map_err(|e| ScribedError::ModelLoad {
                message: format!("Failed to set threads: {}", e),
            })?
            .commit_from_file(model_path)
            .map_err(|e| ScribedError::ModelLoad {
                message: format!("Failed to load VAD model: {}", e),
            })?;

        Ok(Self {
            session,
            state: vec![0.0; STATE_SIZE],
            context: vec![0.0; CONTEXT_SIZE],
        })
    }

    /// Score one 512-sample frame and update the recurrent state.
    fn run_frame(&mut self, frame: &[f32]) -> Result<f32> {
        debug_assert_eq!(frame.len(), FRAME_SIZE);

        // Model input is [context | frame]
        let mut input = Vec::with_capacity(CONTEXT_SIZE + FRAME_SIZE);
        input.extend_from_slice(&self.context);
        input.extend_from_slice(frame);

        self.context.copy_from_slice(&frame[FRAME_SIZE - CONTEXT_SIZE..]);

        let input_tensor = Value::from_array(
            ndarray::Array2::from_shape_vec((1, CONTEXT_SIZE + FRAME_SIZE), input).map_err(
                |e| ScribedError::Detector {
                    message: format!("Failed to create input array: {}", e),
                },
            )?,
        )
        .map_err(|e| ScribedError::Detector {
            message: format!("Failed to create input tensor: {}", e),
        })?;

        let sr_tensor = Value::from_array(ndarray::Array::from_elem((), 16000i64)).map_err(
            |e| ScribedError::Detector {
                message: format!("Failed to create sr tensor: {}", e),
            },
        )?;

        let state_tensor = Value::from_array(
            ndarray::Array3::from_shape_vec((2, 1, 128), self.state.clone()).map_err(|e| {
                ScribedError::Detector {
                    message: format!("Failed to create state array: {}", e),
                }
            })?,
        )
        .map_err(|e| ScribedError::Detector {
            message: format!("Failed to create state tensor: {}", e),
        })?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input" => input_tensor,
                "sr" => sr_tensor,
                "state" => state_tensor,
            ])
            .map_err(|e| ScribedError::Detector {
                message: format!("VAD inference failed: {}", e),
            })?;

        let output = outputs.get("output").ok_or_else(|| ScribedError::Detector {
            message: "Missing 'output' in results".to_string(),
        })?;
        let (_, output_data) =
            output
                .try_extract_tensor::<f32>()
                .map_err(|e| ScribedError::Detector {
                    message: format!("Failed to extract output: {}", e),
                })?;
        let probability = output_data.first().copied().unwrap_or(0.0);

        let state_out = outputs.get("stateN").ok_or_else(|| ScribedError::Detector {
            message: "Missing 'stateN' in results".to_string(),
        })?;
        let (_, state_data) =
            state_out
                .try_extract_tensor::<f32>()
                .map_err(|e| ScribedError::Detector {
                    message: format!("Failed to extract state: {}", e),
                })?;
        self.state = state_data.to_vec();

        Ok(probability)
    }
}

#[cfg(feature = "vad-onnx")]
impl SpeechDetector for SileroDetector {
    fn probability(&mut self, samples: &[f32]) -> Result<f32> {
        if samples.is_empty() {
            return Err(ScribedError::Detector {
                message: "no frames".to_string(),
            });
        }

        let mut last_prob = 0.0;
        let mut chunks = samples.chunks_exact(FRAME_SIZE);
        for frame in &mut chunks {
            last_prob = self.run_frame(frame)?;
        }

        // A trailing short frame (the 30ms VAD window is 480 samples,
        // less than one full frame) is zero-padded rather than dropped.
        let remainder = chunks.remainder();
        if !remainder.is_empty() {
            let mut frame = vec![0.0f32; FRAME_SIZE];
            frame[..remainder.len()].copy_from_slice(remainder);
            last_prob = self.run_frame(&frame)?;
        }

        Ok(last_prob)
    }
}

#[cfg(not(feature = "vad-onnx"))]
impl SileroDetector {
    /// Create a Silero detector (stub implementation).
    pub fn new(_model_path: &Path, _threads: usize) -> Result<Self> {
        Err(ScribedError::ModelLoad {
            message: concat!(
                "VAD support not enabled. This binary was built without the vad-onnx feature.\n",
                "To fix: cargo build --release (vad-onnx is enabled by default)"
            )
            .to_string(),
        })
    }
}

#[cfg(not(feature = "vad-onnx"))]
impl SpeechDetector for SileroDetector {
    fn probability(&mut self, _samples: &[f32]) -> Result<f32> {
        Err(ScribedError::Detector {
            message: "VAD support not enabled".to_string(),
        })
    }
}
