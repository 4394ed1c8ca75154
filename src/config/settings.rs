//! Pipeline settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files, snapshotted into a
//! [`crate::pipeline::ControlCommand::Reconfigure`] command, and shared
//! across threads.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// WindowingMode
// ---------------------------------------------------------------------------

/// Selects how the audio stream is cut into inference windows.
///
/// | Variant  | Behaviour                                        | Trade-off          |
/// |----------|--------------------------------------------------|--------------------|
/// | Fixed    | A window every `window - overlap` seconds        | Bounded latency    |
/// | Boundary | A window per utterance, ended by a silence gap   | Coherent sentences |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowingMode {
    /// Emit on a fixed schedule regardless of speech content.
    Fixed,
    /// Accumulate until a silence gap ends the utterance.
    Boundary,
}

impl Default for WindowingMode {
    fn default() -> Self {
        Self::Fixed
    }
}

// ---------------------------------------------------------------------------
// TranscribeTask
// ---------------------------------------------------------------------------

/// What the speech backend is asked to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscribeTask {
    /// Text in the source language.
    Transcribe,
    /// English text translated from the source language.
    Translate,
}

impl Default for TranscribeTask {
    fn default() -> Self {
        Self::Translate
    }
}

// ---------------------------------------------------------------------------
// WindowerConfig
// ---------------------------------------------------------------------------

/// Settings for cutting the sample stream into [`crate::audio::AudioWindow`]s.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowerConfig {
    /// Active windowing policy.
    pub mode: WindowingMode,
    /// Fixed mode: duration of each window in seconds.
    pub window_secs: f32,
    /// Fixed mode: seconds of audio shared with the previous window.
    ///
    /// Overlap gives the backend acoustic context across the cut point; the
    /// duplicated words it produces are stripped downstream by the
    /// stabilizer, never here.
    pub overlap_secs: f32,
    /// Boundary mode: speech bursts shorter than this are discarded.
    pub min_window_secs: f32,
    /// Boundary mode: force emission at this length even with no silence,
    /// bounding worst-case latency.
    pub max_window_secs: f32,
    /// Boundary mode: trailing silence that ends an utterance.
    pub min_silence_secs: f32,
    /// Boundary mode: milliseconds of audio kept from before speech onset so
    /// the first phoneme is not lost.
    pub pre_roll_ms: u64,
    /// RMS amplitude below which a 30 ms frame counts as silence.
    pub silence_rms: f32,
}

impl Default for WindowerConfig {
    fn default() -> Self {
        Self {
            mode: WindowingMode::default(),
            window_secs: 5.0,
            overlap_secs: 1.0,
            min_window_secs: 1.0,
            max_window_secs: 10.0,
            min_silence_secs: 0.6,
            pre_roll_ms: 200,
            silence_rms: 0.02,
        }
    }
}

// ---------------------------------------------------------------------------
// BackendProvider / BackendConfig
// ---------------------------------------------------------------------------

/// Selects which speech backend implementation handles inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendProvider {
    /// In-process Whisper inference via `whisper-rs`.
    Local,
    /// An OpenAI-compatible `audio/transcriptions` REST API.
    Remote,
}

impl Default for BackendProvider {
    fn default() -> Self {
        Self::Local
    }
}

/// Settings for one speech backend instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Which implementation to use.
    pub provider: BackendProvider,
    /// GGML model file stem (local) or API model identifier (remote).
    pub model: String,
    /// Source speech language as an ISO-639-1 code, or `"auto"`.
    pub language: String,
    /// Transcribe in the source language or translate to English.
    pub task: TranscribeTask,
    /// Base URL of the API endpoint (remote only).
    pub base_url: String,
    /// API key — `None` for local inference or unauthenticated endpoints.
    pub api_key: Option<String>,
    /// Hard deadline for a single inference call in seconds.
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: BackendProvider::default(),
            model: "ggml-small".into(),
            language: "ja".into(),
            task: TranscribeTask::default(),
            base_url: "https://api.groq.com/openai".into(),
            api_key: None,
            timeout_secs: 30,
        }
    }
}

// ---------------------------------------------------------------------------
// FilterConfig
// ---------------------------------------------------------------------------

/// Settings for the hallucination filter.
///
/// Both lists are hot-reloadable: the pipeline rebuilds its filter whenever a
/// `Reconfigure` command arrives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Case-insensitive phrases whose presence rejects the whole result.
    pub phrases: Vec<String>,
    /// Case-insensitive anchored regexes; a match rejects the whole result.
    pub patterns: Vec<String>,
    /// Reject results whose backend-reported no-speech probability exceeds
    /// this threshold.
    pub no_speech_threshold: f32,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            phrases: default_hallucination_phrases(),
            patterns: default_hallucination_patterns(),
            no_speech_threshold: 0.6,
        }
    }
}

/// Stock phrases Whisper-family models emit on silence, music, or noise.
fn default_hallucination_phrases() -> Vec<String> {
    [
        "thank you for watching",
        "thanks for watching",
        "thank you very much",
        "please subscribe",
        "like and subscribe",
        "see you next time",
        "bye bye",
        "the end",
        "to be continued",
        "subtitles by",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Anchored patterns for short filler phrases that only ever appear alone.
fn default_hallucination_patterns() -> Vec<String> {
    [
        r"^thank you[\s\w]*[.!?]*$",
        r"^thanks[.!?, ]*$",
        r"^okay[.!?, ]*$",
        r"^bye[.!?, ]*$",
        r"^goodbye[.!?, ]*$",
        r"^uh[.!?, ]*$",
        r"^um[.!?, ]*$",
        r"^huh[.!?, ]*$",
        r"^subscribe[.!?, ]*$",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

// ---------------------------------------------------------------------------
// StabilizerConfig
// ---------------------------------------------------------------------------

/// Settings for the text stabilizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Buffered word count above which an interim event is emitted while
    /// waiting for terminal punctuation.
    pub max_buffer_words: usize,
    /// Seconds without a new fragment after which a non-empty buffer is
    /// flushed as final.
    pub stale_flush_secs: f32,
    /// How many trailing words of the previous text are searched when
    /// stripping window-overlap duplication.
    pub overlap_search_words: usize,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            max_buffer_words: 16,
            stale_flush_secs: 2.5,
            overlap_search_words: 12,
        }
    }
}

// ---------------------------------------------------------------------------
// HubConfig
// ---------------------------------------------------------------------------

/// Settings for the subtitle event hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Per-subscriber queue depth before the eviction policy kicks in.
    pub queue_capacity: usize,
    /// How many recent final events are retained for late joiners.
    pub history: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 32,
            history: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// ContextConfig  (rolling context passed to the backend as a hint)
// ---------------------------------------------------------------------------

/// Settings that control the rolling context window of accepted sentences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Number of previous accepted sentences kept as a backend hint.
    pub sentences: usize,
    /// Seconds of silence after which the context window is cleared
    /// (topic change assumed).
    pub reset_silence_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            sentences: 3,
            reset_silence_secs: 120,
        }
    }
}

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Settings for audio capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Target sample rate in Hz fed to the pipeline (backends expect 16 000).
    pub sample_rate: u32,
    /// Input device name — `None` means the system default.
    pub device: Option<String>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level pipeline configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use livesub::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Windowing policy and timings.
    pub windower: WindowerConfig,
    /// Primary speech backend.
    pub backend: BackendConfig,
    /// Optional secondary backend used after repeated primary failures.
    pub fallback_backend: Option<BackendConfig>,
    /// Hallucination filter lists and thresholds.
    pub filter: FilterConfig,
    /// Text stabilizer thresholds.
    pub stabilizer: StabilizerConfig,
    /// Event hub queue / history sizing.
    pub hub: HubConfig,
    /// Rolling context hint settings.
    pub context: ContextConfig,
    /// Audio capture settings.
    pub audio: AudioConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            windower: WindowerConfig::default(),
            backend: BackendConfig::default(),
            fallback_backend: None,
            filter: FilterConfig::default(),
            stabilizer: StabilizerConfig::default(),
            hub: HubConfig::default(),
            context: ContextConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
