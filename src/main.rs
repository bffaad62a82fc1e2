use anyhow::Context;
use clap::Parser;
use scribed::config::Config;
use std::path::PathBuf;

fn version_string() -> &'static str {
    match option_env!("GIT_HASH") {
        Some(hash) => format!("{} ({})", env!("CARGO_PKG_VERSION"), hash).leak(),
        None => env!("CARGO_PKG_VERSION"),
    }
}

#[derive(Parser, Debug)]
#[command(name = "scribed", version = version_string(), about = "Real-time speech-to-text streaming server")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to the whisper model
    #[arg(short, long)]
    model: Option<String>,

    /// Path to the Silero VAD model (enables VAD)
    #[arg(long)]
    vad_model: Option<String>,

    /// Host to bind
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Number of parallel whisper contexts
    #[arg(short, long)]
    contexts: Option<usize>,

    /// Threads per inference
    #[arg(short, long)]
    threads: Option<usize>,

    /// Language code
    #[arg(short, long)]
    language: Option<String>,

    /// Inference step interval in ms
    #[arg(long)]
    step: Option<u64>,

    /// Audio context window length in ms
    #[arg(long)]
    length: Option<u64>,

    /// Audio overlap between windows in ms
    #[arg(long)]
    keep: Option<u64>,

    /// Speech probability threshold (0.0-1.0)
    #[arg(long)]
    vad_threshold: Option<f32>,

    /// Silence duration before a final in ms
    #[arg(long)]
    vad_silence: Option<u64>,

    /// Shared token clients must present; empty disables the check
    #[arg(long)]
    auth_token: Option<String>,

    /// Disable GPU acceleration
    #[arg(long)]
    no_gpu: bool,

    /// Translate transcripts to English
    #[arg(long)]
    translate: bool,
}

impl Cli {
    fn into_config(self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => Config::default(),
        };
        config = config.with_env_overrides();

        if let Some(model) = self.model {
            config.model.model_path = model;
        }
        if let Some(vad_model) = self.vad_model {
            config.model.vad_model_path = vad_model;
        }
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(contexts) = self.contexts {
            config.model.n_contexts = contexts;
        }
        if let Some(threads) = self.threads {
            config.model.n_threads = threads;
        }
        if let Some(language) = self.language {
            config.model.language = language;
        }
        if let Some(step) = self.step {
            config.timing.step_ms = step;
        }
        if let Some(length) = self.length {
            config.timing.length_ms = length;
        }
        if let Some(keep) = self.keep {
            config.timing.keep_ms = keep;
        }
        if let Some(threshold) = self.vad_threshold {
            config.timing.vad_threshold = threshold;
        }
        if let Some(silence) = self.vad_silence {
            config.timing.silence_trigger_ms = silence;
        }
        if let Some(token) = self.auth_token {
            config.server.auth_token = token;
        }
        if self.no_gpu {
            config.model.use_gpu = false;
        }
        if self.translate {
            config.model.translate = true;
        }

        Ok(config)
    }
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = Cli::parse().into_config()?;
    scribed::server::run(config)
        .await
        .context("server failed")?;

    Ok(())
}
