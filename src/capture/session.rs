use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use serde::Serialize;
use tracing::{info, warn};

use crate::audio::buffer::SharedBuffer;
use crate::audio::device;
use crate::audio::router::{OutputRouter, RoutingGuard};
use crate::config::{AudioConfig, RoutingConfig};
use crate::error::{CaptureError, StreamError};
use crate::transcript::SourceRole;

/// Lifecycle of one recording attempt.
///
/// `Idle` is initial; `Saved` and `Discarded` are terminal. Once a session
/// reaches `Stopping`, discard is no longer possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Recording,
    Stopping,
    Saved,
    Discarded,
}

impl SessionState {
    pub fn name(self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Recording => "Recording",
            SessionState::Stopping => "Stopping",
            SessionState::Saved => "Saved",
            SessionState::Discarded => "Discarded",
        }
    }
}

/// One finished, role-tagged recording produced by `stop()`.
#[derive(Debug, Clone)]
pub struct SourceTrack {
    pub role: SourceRole,
    pub device_name: String,
    pub samples: Vec<f32>,
    /// Seconds between session start and this track's first captured chunk.
    pub start_offset_secs: f64,
}

/// Everything `stop()` hands to the persistence layer.
#[derive(Debug, Clone)]
pub struct SessionAudio {
    pub started_at: DateTime<Local>,
    pub sample_rate: u32,
    pub channels: u16,
    pub mic: SourceTrack,
    pub speaker: Option<SourceTrack>,
    pub loopback_device: String,
    pub output_device: String,
    pub dropped_chunks: u64,
}

impl SessionAudio {
    pub fn is_dual(&self) -> bool {
        self.speaker.is_some()
    }

    pub fn duration_secs(&self) -> f64 {
        self.mic.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }
}

/// Point-in-time view of a running session, for status displays.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub state: &'static str,
    pub elapsed_secs: f64,
    pub mic_device: String,
    pub speaker_active: bool,
    pub mic_samples: usize,
    pub speaker_samples: usize,
    pub dropped_chunks: u64,
}

/// Outcome of `start()`: a failed speaker setup degrades to mic-only rather
/// than aborting, and surfaces here as a recoverable warning.
#[derive(Debug, Clone)]
pub struct StartReport {
    pub mic_device: String,
    pub speaker_active: bool,
    pub warning: Option<String>,
}

/// A live connection to one input device.
///
/// Owns the cpal stream plus the fault slot its error callback writes into.
/// The handle is confined to the coordinating thread (cpal streams are not
/// `Send`); only the data callback's buffer handle crosses threads.
struct StreamHandle {
    stream: cpal::Stream,
    device_name: String,
    fault: Arc<Mutex<Option<String>>>,
}

impl StreamHandle {
    fn open(
        device_name: &str,
        config: &AudioConfig,
        buffer: SharedBuffer,
    ) -> Result<Self, CaptureError> {
        let device = device::open_input(device_name)?;

        let supported = device
            .default_input_config()
            .map_err(|source| StreamError::Config {
                device: device_name.to_string(),
                source,
            })?;

        let stream_config = cpal::StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let fault = Arc::new(Mutex::new(None));
        let fault_slot = Arc::clone(&fault);
        let fault_device = device_name.to_string();
        let err_fn = move |e: cpal::StreamError| {
            warn!("input stream on '{}' faulted: {}", fault_device, e);
            if let Ok(mut slot) = fault_slot.lock() {
                slot.get_or_insert_with(|| e.to_string());
            }
        };

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                build_stream::<f32>(&device, &stream_config, buffer, err_fn)
            }
            cpal::SampleFormat::I16 => {
                build_stream::<i16>(&device, &stream_config, buffer, err_fn)
            }
            cpal::SampleFormat::U16 => {
                build_stream::<u16>(&device, &stream_config, buffer, err_fn)
            }
            other => {
                return Err(StreamError::UnsupportedFormat {
                    device: device_name.to_string(),
                    format: format!("{:?}", other),
                }
                .into())
            }
        }
        .map_err(|source| StreamError::Build {
            device: device_name.to_string(),
            source,
        })?;

        stream.play().map_err(|source| StreamError::Play {
            device: device_name.to_string(),
            source,
        })?;

        info!("input stream opened on '{}'", device_name);

        Ok(Self {
            stream,
            device_name: device_name.to_string(),
            fault,
        })
    }

    fn take_fault(&self) -> Option<String> {
        self.fault.lock().ok().and_then(|mut slot| slot.take())
    }

    /// Stop and drain. Pausing halts the callbacks; dropping the stream tears
    /// the device connection down, so no writer for this handle survives the
    /// call.
    fn stop(self) {
        if let Err(e) = self.stream.pause() {
            warn!("pausing stream on '{}' failed: {}", self.device_name, e);
        }
        drop(self.stream);
        info!("input stream on '{}' stopped", self.device_name);
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    buffer: SharedBuffer,
    err_fn: impl FnMut(cpal::StreamError) + Send + 'static,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            // Audio callback context: one copy under a short-held lock, no
            // I/O, never blocks.
            let chunk: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
            buffer.push_from_callback(&chunk);
        },
        err_fn,
        None,
    )
}

/// The stateful owner of live input streams and their buffers for one
/// recording attempt. Exactly one session is active per recording; it owns
/// all stream handles and buffers exclusively.
pub struct CaptureSession {
    audio: AudioConfig,
    routing_cfg: RoutingConfig,
    state: SessionState,
    mic_stream: Option<StreamHandle>,
    speaker_stream: Option<StreamHandle>,
    mic_buffer: SharedBuffer,
    speaker_buffer: SharedBuffer,
    routing: RoutingGuard,
    mic_device_name: String,
    started_at: Option<DateTime<Local>>,
    started_instant: Option<Instant>,
    speaker_ever_enabled: bool,
}

impl CaptureSession {
    pub fn new(
        audio: AudioConfig,
        routing_cfg: RoutingConfig,
        router: Arc<dyn OutputRouter>,
    ) -> Self {
        Self {
            audio,
            routing_cfg,
            state: SessionState::Idle,
            mic_stream: None,
            speaker_stream: None,
            mic_buffer: SharedBuffer::new(),
            speaker_buffer: SharedBuffer::new(),
            routing: RoutingGuard::new(router),
            mic_device_name: String::new(),
            started_at: None,
            started_instant: None,
            speaker_ever_enabled: false,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started_instant
            .map(|t| t.elapsed())
            .unwrap_or_default()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            state: self.state.name(),
            elapsed_secs: self.elapsed().as_secs_f64(),
            mic_device: self.mic_device_name.clone(),
            speaker_active: self.speaker_stream.is_some(),
            mic_samples: self.mic_buffer.total_samples(),
            speaker_samples: self.speaker_buffer.total_samples(),
            dropped_chunks: self.mic_buffer.dropped_chunks() + self.speaker_buffer.dropped_chunks(),
        }
    }

    fn ensure_state(&self, expected: SessionState, op: &'static str) -> Result<(), CaptureError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(CaptureError::InvalidState {
                op,
                state: self.state.name(),
            })
        }
    }

    /// Idle → Recording. Opens the mic stream (failure is fatal to the
    /// attempt: the session stays Idle); a speaker setup failure degrades to
    /// mic-only and is reported as a warning in the returned report.
    pub fn start(
        &mut self,
        mic: Option<&str>,
        speaker: bool,
    ) -> Result<StartReport, CaptureError> {
        self.ensure_state(SessionState::Idle, "start")?;

        let mic_device = device::resolve_input(mic)?;
        let handle = StreamHandle::open(&mic_device.name, &self.audio, self.mic_buffer.clone())?;

        self.mic_stream = Some(handle);
        self.mic_device_name = mic_device.name.clone();
        self.started_at = Some(Local::now());
        self.started_instant = Some(Instant::now());
        self.state = SessionState::Recording;

        info!(
            "recording started on '{}' ({}Hz, {}ch)",
            mic_device.name, self.audio.sample_rate, self.audio.channels
        );

        let mut warning = None;
        if speaker {
            if let Err(e) = self.open_speaker() {
                warn!("speaker capture unavailable, continuing mic-only: {}", e);
                warning = Some(e.to_string());
            }
        }

        Ok(StartReport {
            mic_device: mic_device.name,
            speaker_active: self.speaker_stream.is_some(),
            warning,
        })
    }

    fn open_speaker(&mut self) -> Result<(), CaptureError> {
        if self.speaker_stream.is_some() {
            return Ok(());
        }

        let loopback = device::find_loopback(&self.routing_cfg.loopback_device)?;

        self.routing
            .switch_to(&self.routing_cfg.output_device)
            .map_err(|_| CaptureError::OutputSwitch(self.routing_cfg.output_device.clone()))?;

        match StreamHandle::open(&loopback.name, &self.audio, self.speaker_buffer.clone()) {
            Ok(handle) => {
                self.speaker_stream = Some(handle);
                self.speaker_ever_enabled = true;
                info!("speaker capture enabled via '{}'", loopback.name);
                Ok(())
            }
            Err(e) => {
                // The switch must not outlive a failed enable.
                self.routing.restore();
                Err(e)
            }
        }
    }

    /// Enable speaker capture mid-recording. Idempotent: enabling twice in a
    /// row is a no-op.
    pub fn enable_speaker_capture(&mut self) -> Result<(), CaptureError> {
        self.ensure_state(SessionState::Recording, "enable_speaker_capture")?;
        self.open_speaker()
    }

    /// Disable speaker capture and restore output routing. Disabling when
    /// never enabled is a no-op.
    pub fn disable_speaker_capture(&mut self) -> Result<(), CaptureError> {
        self.ensure_state(SessionState::Recording, "disable_speaker_capture")?;

        if let Some(handle) = self.speaker_stream.take() {
            handle.stop();
        }
        self.routing.restore();
        Ok(())
    }

    /// Replace the active mic mid-recording, continuing into the same buffer.
    ///
    /// The old handle is stopped and drained before the replacement may
    /// write, so no captured audio is lost; the capture gap is bounded by the
    /// device swap latency. On failure the session keeps Recording on the
    /// prior device when that device is still usable, and surfaces a fatal
    /// `StreamError` otherwise.
    pub fn switch_mic_device(&mut self, selector: &str) -> Result<(), CaptureError> {
        self.ensure_state(SessionState::Recording, "switch_mic_device")?;

        let new_device = device::resolve_input(Some(selector))?;
        if new_device.name == self.mic_device_name {
            return Ok(());
        }

        let previous = self.mic_device_name.clone();
        if let Some(old) = self.mic_stream.take() {
            old.stop();
        }

        match StreamHandle::open(&new_device.name, &self.audio, self.mic_buffer.clone()) {
            Ok(handle) => {
                self.mic_stream = Some(handle);
                self.mic_device_name = new_device.name.clone();
                info!("mic switched to '{}'", new_device.name);
                Ok(())
            }
            Err(switch_err) => {
                warn!(
                    "could not open '{}', falling back to '{}': {}",
                    new_device.name, previous, switch_err
                );
                match StreamHandle::open(&previous, &self.audio, self.mic_buffer.clone()) {
                    Ok(handle) => {
                        self.mic_stream = Some(handle);
                        Err(switch_err)
                    }
                    Err(fallback_err) => Err(StreamError::Fault {
                        device: previous,
                        message: format!(
                            "prior device unusable after failed switch: {}",
                            fallback_err
                        ),
                    }
                    .into()),
                }
            }
        }
    }

    /// Surface faults recorded asynchronously by the stream error callbacks.
    ///
    /// A mic fault is fatal: the caller should `stop()` to keep the audio
    /// captured so far. A speaker fault degrades the session to mic-only.
    pub fn check_streams(&mut self) -> Result<(), CaptureError> {
        let speaker_fault = self
            .speaker_stream
            .as_ref()
            .and_then(|s| s.take_fault());
        if let Some(message) = speaker_fault {
            warn!("speaker stream failed, degrading to mic-only: {}", message);
            if let Some(handle) = self.speaker_stream.take() {
                handle.stop();
            }
            self.routing.restore();
        }

        if let Some(mic) = &self.mic_stream {
            if let Some(message) = mic.take_fault() {
                return Err(StreamError::Fault {
                    device: mic.device_name.clone(),
                    message,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Recording → Stopping → Saved. Stops every stream, restores routing,
    /// and finalizes the buffers into role-tagged tracks for persistence.
    pub fn stop(&mut self) -> Result<SessionAudio, CaptureError> {
        self.ensure_state(SessionState::Recording, "stop")?;
        self.state = SessionState::Stopping;

        if let Some(handle) = self.mic_stream.take() {
            handle.stop();
        }
        if let Some(handle) = self.speaker_stream.take() {
            handle.stop();
        }
        self.routing.restore();

        let started_instant = self.started_instant.unwrap_or_else(Instant::now);
        let offset_from_start = |arrival: Option<Instant>| {
            arrival
                .map(|t| t.duration_since(started_instant).as_secs_f64())
                .unwrap_or(0.0)
        };

        let dropped = self.mic_buffer.dropped_chunks() + self.speaker_buffer.dropped_chunks();
        if dropped > 0 {
            warn!("{} audio chunk(s) dropped during capture", dropped);
        }

        let mic = SourceTrack {
            role: SourceRole::Mic,
            device_name: self.mic_device_name.clone(),
            start_offset_secs: offset_from_start(self.mic_buffer.first_arrival()),
            samples: self.mic_buffer.take().finish(),
        };

        let speaker = if self.speaker_ever_enabled {
            Some(SourceTrack {
                role: SourceRole::Speaker,
                device_name: self.routing_cfg.loopback_device.clone(),
                start_offset_secs: offset_from_start(self.speaker_buffer.first_arrival()),
                samples: self.speaker_buffer.take().finish(),
            })
        } else {
            None
        };

        self.state = SessionState::Saved;
        info!(
            "recording stopped after {:.1}s ({} mic samples)",
            self.elapsed().as_secs_f64(),
            mic.samples.len()
        );

        Ok(SessionAudio {
            started_at: self.started_at.unwrap_or_else(Local::now),
            sample_rate: self.audio.sample_rate,
            channels: self.audio.channels,
            mic,
            speaker,
            loopback_device: self.routing_cfg.loopback_device.clone(),
            output_device: self.routing_cfg.output_device.clone(),
            dropped_chunks: dropped,
        })
    }

    /// Recording → Discarded. Stops every stream, restores routing, and
    /// drops all buffered audio without writing anything.
    pub fn cancel(&mut self) -> Result<(), CaptureError> {
        self.ensure_state(SessionState::Recording, "cancel")?;

        if let Some(handle) = self.mic_stream.take() {
            handle.stop();
        }
        if let Some(handle) = self.speaker_stream.take() {
            handle.stop();
        }
        self.routing.restore();

        drop(self.mic_buffer.take());
        drop(self.speaker_buffer.take());

        self.state = SessionState::Discarded;
        info!("recording cancelled, buffers discarded");
        Ok(())
    }
}
