//! Application entry point — real-time subtitle pipeline.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] from disk (returns default on first run).
//! 3. Build the primary (and optional fallback) speech backend.
//! 4. Create the event hub and shared status.
//! 5. Spawn the pipeline runner on the tokio runtime.
//! 6. Start cpal audio capture; a feeder thread downmixes, resamples to the
//!    pipeline rate, and pushes sample blocks into the audio channel.
//! 7. Subscribe a console sink that prints each final subtitle line.
//! 8. Wait for Ctrl-C, send `Shutdown`, and print session stats.

use std::sync::Arc;

use tokio::sync::mpsc;

use livesub::audio::{stereo_to_mono, AudioCapture, AudioChunk, StreamResampler};
use livesub::config::{AppConfig, AppPaths, BackendConfig, BackendProvider};
use livesub::hub::EventHub;
use livesub::pipeline::{new_shared_status, ControlCommand, PipelineRunner};
use livesub::stt::{BackendGateway, LocalBackend, RemoteBackend, SpeechBackend};

// ---------------------------------------------------------------------------
// Backend construction
// ---------------------------------------------------------------------------

/// Build a backend instance from its configuration.
fn build_backend(config: &BackendConfig) -> anyhow::Result<Arc<dyn SpeechBackend>> {
    match config.provider {
        BackendProvider::Local => {
            let model_path = AppPaths::new()
                .models_dir
                .join(format!("{}.bin", config.model));
            let backend = LocalBackend::load(&model_path)?;
            log::info!("local model loaded: {}", model_path.display());
            Ok(Arc::new(backend))
        }
        BackendProvider::Remote => {
            let backend = RemoteBackend::from_config(config);
            log::info!("remote backend ready: {}", backend.identity());
            Ok(Arc::new(backend))
        }
    }
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("livesub starting up");

    // 2. Configuration
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("failed to load config ({e}); using defaults");
        AppConfig::default()
    });

    // 3. Backends
    let primary = build_backend(&config.backend)?;
    let secondary = match &config.fallback_backend {
        Some(fallback) => match build_backend(fallback) {
            Ok(backend) => Some(backend),
            Err(e) => {
                log::warn!("fallback backend unavailable ({e}); continuing without one");
                None
            }
        },
        None => None,
    };
    let gateway = BackendGateway::new(primary, secondary, &config.backend);

    // 4. Hub + status
    let hub = EventHub::new(&config.hub);
    let status = new_shared_status(config.windower.mode, gateway.identity().to_string());

    // 5. Pipeline runner
    let (audio_tx, audio_rx) = mpsc::channel::<Vec<f32>>(32);
    let (control_tx, control_rx) = mpsc::channel::<ControlCommand>(8);

    let runner = PipelineRunner::new(&config, gateway, hub.clone(), Arc::clone(&status));
    let pipeline = tokio::spawn(runner.run(audio_rx, control_rx));

    // 6. Audio capture → downmix → resample → pipeline channel
    let capture = AudioCapture::new(config.audio.device.as_deref())?;
    let native_rate = capture.sample_rate();
    let channels = capture.channels();
    let mut resampler = StreamResampler::new(native_rate, config.audio.sample_rate)?;

    let (chunk_tx, chunk_rx) = std::sync::mpsc::channel::<AudioChunk>();
    std::thread::Builder::new()
        .name("audio-feeder".into())
        .spawn(move || {
            while let Ok(chunk) = chunk_rx.recv() {
                let mono = stereo_to_mono(&chunk.samples, channels);
                match resampler.process(&mono) {
                    Ok(block) => {
                        if !block.is_empty() && audio_tx.blocking_send(block).is_err() {
                            break; // pipeline gone
                        }
                    }
                    Err(e) => log::warn!("resampler error: {e}"),
                }
            }
        })
        .expect("failed to spawn audio-feeder thread");

    let _stream = capture.start(chunk_tx)?;
    log::info!("audio capture started ({native_rate} Hz, {channels} ch)");

    // 7. Console sink — the same role a WebSocket relay would play.
    let mut subtitles = hub.subscribe(0);
    tokio::spawn(async move {
        while let Some(event) = subtitles.recv().await {
            if event.kind.is_final() {
                println!("{}", event.text);
            }
        }
    });

    log::info!("system ready — press Ctrl-C to stop");

    // 8. Shutdown
    tokio::signal::ctrl_c().await?;
    log::info!("shutting down");
    let _ = control_tx.send(ControlCommand::Shutdown).await;
    let _ = pipeline.await;

    let st = status.lock().unwrap().clone();
    log::info!(
        "session stats: {} windows ({} dropped), {} events, {} backend errors, {} filtered",
        st.windows_processed,
        st.windows_dropped,
        st.events_published,
        st.backend_errors,
        st.filtered_hallucinations,
    );

    Ok(())
}
