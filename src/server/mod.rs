//! The WebSocket server: initialisation, routing, and lifecycle.
//!
//! This layer owns the tokio side of the system. The engine (pool,
//! registry, scheduler) is built here at startup, the scheduler thread is
//! spawned, and graceful shutdown tears everything down in order:
//! listener, scheduler, sessions, pool.

pub mod ws;

use crate::config::Config;
use crate::engine::{ContextPool, InferenceScheduler, OutboundCourier, SchedulerConfig, SessionRegistry};
use crate::error::Result;
use crate::protocol::ServerMessage;
use crate::stt::{SileroDetector, SpeechDetector, Transcriber, WhisperConfig, WhisperTranscriber};
use axum::routing::get;
use axum::{Json, Router, extract::State};
use std::future::IntoFuture;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ws::WsBridge;

/// Shared state for the HTTP/WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub bridge: Arc<WsBridge>,
    /// Prebuilt ready frame; identical for every session.
    pub ready_message: String,
    /// Empty disables the token check.
    pub auth_token: String,
}

/// Build the engine and run the server until a termination signal.
pub async fn run(config: Config) -> Result<()> {
    config.validate()?;

    tracing::info!(
        model = %config.model.model_path,
        contexts = config.model.n_contexts,
        gpu = config.model.use_gpu,
        backend = crate::defaults::gpu_backend(),
        "initialising"
    );

    let mut contexts: Vec<Arc<dyn Transcriber>> = Vec::with_capacity(config.model.n_contexts);
    for i in 0..config.model.n_contexts {
        tracing::info!("loading context {}/{}", i + 1, config.model.n_contexts);
        let transcriber = WhisperTranscriber::new(WhisperConfig {
            model_path: PathBuf::from(&config.model.model_path),
            use_gpu: config.model.use_gpu,
            flash_attn: config.model.flash_attn,
        })?;
        contexts.push(Arc::new(transcriber));
    }

    let detector: Option<Box<dyn SpeechDetector>> = if config.vad_enabled() {
        tracing::info!(model = %config.model.vad_model_path, "loading VAD model");
        // The VAD model is tiny; two CPU threads are plenty
        let detector = SileroDetector::new(Path::new(&config.model.vad_model_path), 2)?;
        Some(Box::new(detector))
    } else {
        None
    };

    let pool = Arc::new(ContextPool::new(contexts));
    let registry = Arc::new(SessionRegistry::new(
        pool.clone(),
        config.timing.max_retain_seconds,
        crate::defaults::SAMPLE_RATE,
    ));
    let bridge = Arc::new(WsBridge::new());
    let courier = OutboundCourier::new(registry.clone(), bridge.clone());

    let scheduler = InferenceScheduler::new(
        registry.clone(),
        courier,
        detector,
        SchedulerConfig::from_config(&config),
    );
    let mut scheduler_handle = scheduler.spawn();

    let state = AppState {
        registry: registry.clone(),
        bridge,
        ready_message: ServerMessage::Ready {
            model: config.model.model_path.clone(),
            contexts: config.model.n_contexts,
        }
        .to_json(),
        auth_token: config.server.auth_token.clone(),
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "listening");

    let app = router(state);
    let server = axum::serve(listener, app).into_future();

    tokio::select! {
        result = server => {
            result?;
        }
        _ = shutdown_signal() => {
            tracing::info!("termination signal received, shutting down");
        }
    }

    // Shutdown order matters: stop producing, then tear sessions down,
    // then drop the model memory.
    scheduler_handle.stop();
    registry.destroy_all();
    pool.close_all();

    tracing::info!("server stopped");
    Ok(())
}

/// The application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(ws::ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.registry.count(),
    }))
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
