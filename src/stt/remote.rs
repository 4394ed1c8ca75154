//! Remote speech backend over an OpenAI-compatible audio API.
//!
//! [`RemoteBackend`] posts each window as an in-memory WAV file to
//! `{base_url}/v1/audio/transcriptions` (or `/translations` for the
//! translate task) — the wire format spoken by OpenAI, Groq, and most
//! self-hosted Whisper servers.  All connection details come from
//! [`BackendConfig`]; nothing is hardcoded.

use async_trait::async_trait;

use crate::config::{BackendConfig, TranscribeTask};
use crate::stt::backend::{
    BackendError, BackendId, SpeechBackend, TranscribeRequest, Transcription,
};

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BackendError::Timeout
        } else {
            BackendError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// RemoteBackend
// ---------------------------------------------------------------------------

/// Calls an OpenAI-compatible `audio/transcriptions` endpoint.
///
/// The `Authorization: Bearer …` header is attached **only** when
/// `config.api_key` is a non-empty string — safe for unauthenticated
/// self-hosted servers.
pub struct RemoteBackend {
    client: reqwest::Client,
    config: BackendConfig,
    id: BackendId,
}

impl RemoteBackend {
    /// Build a `RemoteBackend` from backend config.
    ///
    /// The HTTP client is pre-configured with the per-request timeout from
    /// `config.timeout_secs`.  A default (no-timeout) client is used as a
    /// last-resort fallback if the builder fails (should never happen in
    /// practice).
    pub fn from_config(config: &BackendConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            id: BackendId::new(format!("remote:{}", config.model)),
            config: config.clone(),
        }
    }

    /// Endpoint URL for the requested task.
    fn endpoint(&self, task: TranscribeTask) -> String {
        let path = match task {
            TranscribeTask::Transcribe => "transcriptions",
            TranscribeTask::Translate => "translations",
        };
        format!("{}/v1/audio/{path}", self.config.base_url)
    }

    /// Encode float samples as a 16-bit mono WAV file in memory.
    fn encode_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, BackendError> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = std::io::Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)
                .map_err(|e| BackendError::Request(format!("wav encode: {e}")))?;
            for &s in samples {
                let value = (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                writer
                    .write_sample(value)
                    .map_err(|e| BackendError::Request(format!("wav encode: {e}")))?;
            }
            writer
                .finalize()
                .map_err(|e| BackendError::Request(format!("wav encode: {e}")))?;
        }

        Ok(cursor.into_inner())
    }
}

#[async_trait]
impl SpeechBackend for RemoteBackend {
    async fn transcribe(
        &self,
        req: TranscribeRequest<'_>,
    ) -> Result<Transcription, BackendError> {
        let wav = Self::encode_wav(req.samples, req.sample_rate)?;

        let file = reqwest::multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| BackendError::Request(e.to_string()))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file)
            .text("model", self.config.model.clone());

        // The transcriptions endpoint accepts a source-language hint; the
        // translations endpoint auto-detects.
        if req.task == TranscribeTask::Transcribe && req.language != "auto" {
            form = form.text("language", req.language.to_string());
        }

        if let Some(hint) = req.context_hint {
            form = form.text("prompt", hint.to_string());
        }

        let mut request = self.client.post(self.endpoint(req.task)).multipart(form);

        let key = self.config.api_key.as_deref().unwrap_or("");
        if !key.is_empty() {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Request(format!(
                "API error {status}: {body}"
            )));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        let text = json["text"]
            .as_str()
            .ok_or_else(|| BackendError::Parse("response has no 'text' field".into()))?
            .trim()
            .to_string();

        // Present with response_format=verbose_json on some servers.
        let no_speech_prob = json["no_speech_prob"].as_f64().map(|p| p as f32);

        Ok(Transcription {
            text,
            source_text: None,
            no_speech_prob,
        })
    }

    fn supports_translation(&self) -> bool {
        true
    }

    fn identity(&self) -> BackendId {
        self.id.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendProvider;

    fn make_config(api_key: Option<&str>) -> BackendConfig {
        BackendConfig {
            provider: BackendProvider::Remote,
            model: "whisper-large-v3".into(),
            language: "ja".into(),
            task: TranscribeTask::Translate,
            base_url: "https://api.example.com/openai".into(),
            api_key: api_key.map(|s| s.to_string()),
            timeout_secs: 30,
        }
    }

    #[test]
    fn from_config_builds_without_panic() {
        let backend = RemoteBackend::from_config(&make_config(None));
        assert_eq!(backend.identity().as_str(), "remote:whisper-large-v3");
    }

    #[test]
    fn endpoint_depends_on_task() {
        let backend = RemoteBackend::from_config(&make_config(Some("sk-test")));
        assert_eq!(
            backend.endpoint(TranscribeTask::Translate),
            "https://api.example.com/openai/v1/audio/translations"
        );
        assert_eq!(
            backend.endpoint(TranscribeTask::Transcribe),
            "https://api.example.com/openai/v1/audio/transcriptions"
        );
    }

    #[test]
    fn encode_wav_produces_valid_header() {
        // 100 ms of a constant signal
        let samples = vec![0.5_f32; 1_600];
        let wav = RemoteBackend::encode_wav(&samples, 16_000).expect("encode");

        // RIFF/WAVE magic plus 16-bit mono PCM payload
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + samples.len() * 2);
    }

    #[test]
    fn encode_wav_clamps_out_of_range_samples() {
        let samples = vec![2.0_f32, -2.0];
        let wav = RemoteBackend::encode_wav(&samples, 16_000).expect("encode");
        let hi = i16::from_le_bytes([wav[44], wav[45]]);
        let lo = i16::from_le_bytes([wav[46], wav[47]]);
        assert_eq!(hi, i16::MAX);
        assert_eq!(lo, -i16::MAX);
    }

    /// Verify that `RemoteBackend` is object-safe (usable as a trait object).
    #[test]
    fn backend_is_object_safe() {
        let backend: Box<dyn SpeechBackend> =
            Box::new(RemoteBackend::from_config(&make_config(None)));
        assert!(backend.supports_translation());
    }
}
