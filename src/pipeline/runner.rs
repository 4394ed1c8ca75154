//! Pipeline runner — the coordinating task that owns the session.
//!
//! [`PipelineRunner`] drives samples → windows → backend → filter →
//! stabilizer → hub, and doubles as the mode controller: runtime commands
//! arrive over a `tokio::sync::mpsc` channel and reconfigure the pipeline
//! without restarting it.
//!
//! # Data flow
//!
//! ```text
//! audio_rx (Vec<f32>, 16 kHz mono)
//!   └─▶ Windower ──▶ bounded queue (oldest dropped under load)
//!         └─▶ BackendGateway::transcribe_window   [dominant suspension]
//!               └─▶ HallucinationFilter ──▶ TextStabilizer ──▶ EventHub
//!
//! control_rx (ControlCommand)
//!   ├─ SetMode        drain windower, reconfigure, reset rolling context
//!   ├─ SwitchBackend  grace-cancel in-flight call, swap, keep context
//!   ├─ Reconfigure    hot-apply windower/filter/stabilizer/gateway settings
//!   └─ Shutdown       drain everything and stop
//! ```
//!
//! `SessionState` is owned by this task exclusively; the stabilizer and the
//! command handlers mutate it synchronously between awaits, so ordering and
//! dedup decisions never race.  One backend call is in flight at a time;
//! windows that become ready meanwhile wait in a depth-bounded queue where
//! the **oldest** entry is dropped on overflow — a stale window is worth
//! less than a fresh one when the backend cannot keep up.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::audio::{AudioWindow, Windower};
use crate::config::{AppConfig, WindowingMode};
use crate::filter::HallucinationFilter;
use crate::hub::EventHub;
use crate::pipeline::state::{PipelineHealth, SharedStatus};
use crate::session::SessionState;
use crate::stabilizer::{StabilizedEvent, TextStabilizer};
use crate::stt::{BackendGateway, RawResult, SpeechBackend};

/// Windows allowed to wait while a backend call is in flight.
const PENDING_DEPTH: usize = 2;

/// How long an in-flight backend call may run on after a preempting command
/// before it is cancelled and its result discarded.
const CANCEL_GRACE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// ControlCommand
// ---------------------------------------------------------------------------

/// Runtime commands accepted by the pipeline task (the control surface).
pub enum ControlCommand {
    /// Switch windowing policy.  Drains buffered audio through the pipeline
    /// and resets the rolling context — a mode switch is a new conversation.
    SetMode(WindowingMode),
    /// Install a new primary backend.  Any in-flight call gets a grace
    /// period, then is cancelled; its late result is discarded.
    SwitchBackend(Arc<dyn SpeechBackend>),
    /// Hot-apply a full configuration snapshot (windower, filter,
    /// stabilizer thresholds, backend call settings).
    Reconfigure(AppConfig),
    /// Drain and stop the pipeline task.
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Shutdown,
}

/// Commands that justify cancelling an in-flight backend call.
fn command_preempts(cmd: &ControlCommand) -> bool {
    matches!(
        cmd,
        ControlCommand::SetMode(_) | ControlCommand::SwitchBackend(_)
    )
}

// ---------------------------------------------------------------------------
// PipelineRunner
// ---------------------------------------------------------------------------

/// The coordinating pipeline task.
///
/// Create with [`PipelineRunner::new`], then call [`run`](Self::run) inside
/// a tokio task (multi-thread runtime — local inference uses
/// `block_in_place`).
pub struct PipelineRunner {
    windower: Windower,
    gateway: BackendGateway,
    filter: HallucinationFilter,
    stabilizer: TextStabilizer,
    session: SessionState,
    hub: EventHub,
    status: SharedStatus,
    pending: VecDeque<AudioWindow>,
}

impl PipelineRunner {
    /// Build a runner from configuration and an already-constructed gateway.
    pub fn new(
        config: &AppConfig,
        gateway: BackendGateway,
        hub: EventHub,
        status: SharedStatus,
    ) -> Self {
        let session = SessionState::new(
            config.windower.mode,
            gateway.identity(),
            &config.context,
        );
        Self {
            windower: Windower::new(config.windower.clone(), config.audio.sample_rate),
            filter: HallucinationFilter::from_config(&config.filter),
            stabilizer: TextStabilizer::new(config.stabilizer.clone()),
            session,
            gateway,
            hub,
            status,
            pending: VecDeque::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Main async loop
    // -----------------------------------------------------------------------

    /// Run until the audio source closes or a `Shutdown` command arrives.
    ///
    /// On exit the windower and the stabilizer buffer are drained so a
    /// trailing sentence is not lost.
    pub async fn run(
        mut self,
        mut audio_rx: mpsc::Receiver<Vec<f32>>,
        mut control_rx: mpsc::Receiver<ControlCommand>,
    ) {
        log::info!(
            "pipeline started (backend {}, mode {:?})",
            self.gateway.identity(),
            self.session.mode()
        );

        'outer: loop {
            // Work through queued windows first, one in-flight call at a time.
            while let Some(window) = self.pending.pop_front() {
                match self.process_window(window, &mut control_rx).await {
                    Flow::Continue => {}
                    Flow::Shutdown => break 'outer,
                }
            }

            let stale_deadline = self.stabilizer.stale_deadline();

            tokio::select! {
                block = audio_rx.recv() => match block {
                    Some(samples) => self.ingest(&samples),
                    None => {
                        log::info!("audio source closed");
                        break 'outer;
                    }
                },
                cmd = control_rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd) == Flow::Shutdown {
                            break 'outer;
                        }
                    }
                    None => {
                        log::info!("control channel closed");
                        break 'outer;
                    }
                },
                _ = tokio::time::sleep_until(tokio::time::Instant::from_std(
                    stale_deadline.unwrap_or_else(Instant::now),
                )), if stale_deadline.is_some() => {
                    self.stale_tick();
                }
            }
        }

        self.drain().await;
        log::info!("pipeline stopped");
    }

    // -----------------------------------------------------------------------
    // Window processing
    // -----------------------------------------------------------------------

    /// Cut incoming samples into windows and queue them, oldest-out.
    fn ingest(&mut self, samples: &[f32]) {
        for window in self.windower.push(samples) {
            self.enqueue(window);
        }
    }

    fn enqueue(&mut self, window: AudioWindow) {
        if self.pending.len() >= PENDING_DEPTH {
            self.pending.pop_front();
            self.status.lock().unwrap().windows_dropped += 1;
            log::warn!("backend busy; dropping oldest queued window");
        }
        self.pending.push_back(window);
    }

    /// Submit one window, staying responsive to control commands.
    ///
    /// A preempting command (mode or backend switch) gives the in-flight
    /// call [`CANCEL_GRACE`] to finish, then drops it; the cancelled call's
    /// result is never merged.  Other commands wait for the call.
    async fn process_window(
        &mut self,
        window: AudioWindow,
        control_rx: &mut mpsc::Receiver<ControlCommand>,
    ) -> Flow {
        let hint = self.session.context_hint();

        let (raw, deferred) = {
            let call = self.gateway.transcribe_window(window, hint.as_deref());
            tokio::pin!(call);

            tokio::select! {
                raw = &mut call => (Some(raw), None),
                cmd = control_rx.recv() => match cmd {
                    None => (Some(call.await), None),
                    Some(cmd) if command_preempts(&cmd) => {
                        match tokio::time::timeout(CANCEL_GRACE, &mut call).await {
                            Ok(raw) => (Some(raw), Some(cmd)),
                            Err(_) => {
                                log::info!("cancelled in-flight backend call for reconfiguration");
                                (None, Some(cmd))
                            }
                        }
                    }
                    Some(cmd) => (Some(call.await), Some(cmd)),
                },
            }
        };

        if let Some(raw) = raw {
            self.handle_raw(raw);
        }

        match deferred {
            Some(cmd) => self.handle_command(cmd),
            None => Flow::Continue,
        }
    }

    /// Filter and stabilize one backend result, publishing whatever the
    /// stabilizer decides to emit.
    fn handle_raw(&mut self, raw: RawResult) {
        {
            let mut st = self.status.lock().unwrap();
            st.windows_processed += 1;
            if raw.is_error() {
                st.backend_errors += 1;
            }
            st.health = if self.gateway.is_degraded() {
                PipelineHealth::Degraded
            } else {
                PipelineHealth::Running
            };
            st.backend = self.gateway.identity().to_string();
        }

        let text = self.filter.apply(&raw);
        if text.is_empty() && !raw.is_error() && !raw.text.trim().is_empty() {
            self.status.lock().unwrap().filtered_hallucinations += 1;
        }

        let events =
            self.stabilizer
                .push(&text, raw.source_text.as_deref(), &raw.window, &mut self.session);
        for event in events {
            self.publish(event);
        }
    }

    fn publish(&mut self, event: StabilizedEvent) {
        log::info!("[{} ms] {}", event.latency_ms, event.text);
        self.status.lock().unwrap().events_published += 1;
        self.hub.publish(event);
    }

    fn stale_tick(&mut self) {
        if let Some(event) = self.stabilizer.flush_stale(Instant::now(), &mut self.session) {
            self.publish(event);
        }
    }

    // -----------------------------------------------------------------------
    // Command handling (mode controller)
    // -----------------------------------------------------------------------

    fn handle_command(&mut self, cmd: ControlCommand) -> Flow {
        match cmd {
            ControlCommand::SetMode(mode) => {
                if mode == self.session.mode() {
                    return Flow::Continue;
                }
                log::info!("mode transition: {:?} -> {:?}", self.session.mode(), mode);

                // Drain: buffered audio completes through the pipeline.
                if let Some(window) = self.windower.flush() {
                    self.enqueue(window);
                }

                let mut windower_config = self.windower.config().clone();
                windower_config.mode = mode;
                self.windower.set_config(windower_config);
                self.session.set_mode(mode);
                self.status.lock().unwrap().mode = mode;
                Flow::Continue
            }

            ControlCommand::SwitchBackend(backend) => {
                self.gateway.swap(backend);
                let id = self.gateway.identity();
                self.session.set_backend(id.clone());
                self.status.lock().unwrap().backend = id.to_string();
                Flow::Continue
            }

            ControlCommand::Reconfigure(config) => {
                log::info!("applying hot-reloaded configuration");
                if let Some(window) = self.windower.flush() {
                    self.enqueue(window);
                }
                self.windower.set_config(config.windower.clone());
                self.session.set_mode(config.windower.mode);
                self.filter = HallucinationFilter::from_config(&config.filter);
                self.stabilizer.set_config(config.stabilizer.clone());
                self.gateway.apply_settings(&config.backend);
                self.status.lock().unwrap().mode = config.windower.mode;
                Flow::Continue
            }

            ControlCommand::Shutdown => {
                log::info!("shutdown requested");
                Flow::Shutdown
            }
        }
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Push everything still buffered through the pipeline, then flush the
    /// stabilizer so a trailing unterminated sentence still becomes a final
    /// event.
    async fn drain(&mut self) {
        if let Some(window) = self.windower.flush() {
            self.enqueue(window);
        }

        while let Some(window) = self.pending.pop_front() {
            let hint = self.session.context_hint();
            let raw = self.gateway.transcribe_window(window, hint.as_deref()).await;
            self.handle_raw(raw);
        }

        if let Some(event) = self.stabilizer.flush_now(&mut self.session) {
            self.publish(event);
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
