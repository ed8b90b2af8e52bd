use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors querying or resolving audio input devices.
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("could not query audio devices: {0}")]
    Query(#[from] cpal::DevicesError),

    #[error("no default input device available")]
    NoDefault,

    #[error("no input device matching '{0}' found")]
    NotFound(String),

    #[error("device index {0} is not a valid input device")]
    BadIndex(usize),

    #[error("input device '{0}' disappeared")]
    Vanished(String),

    #[error("loopback input '{0}' not found")]
    LoopbackMissing(String),
}

/// Errors opening or running a live input stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("could not read input config for '{device}': {source}")]
    Config {
        device: String,
        #[source]
        source: cpal::DefaultStreamConfigError,
    },

    #[error("could not open input stream on '{device}': {source}")]
    Build {
        device: String,
        #[source]
        source: cpal::BuildStreamError,
    },

    #[error("could not start input stream on '{device}': {source}")]
    Play {
        device: String,
        #[source]
        source: cpal::PlayStreamError,
    },

    #[error("unsupported sample format {format} on '{device}'")]
    UnsupportedFormat { device: String, format: String },

    /// An already-running stream failed (device removed, driver fault).
    #[error("input stream on '{device}' failed: {message}")]
    Fault { device: String, message: String },
}

/// Errors from the capture session state machine.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("{op} is not valid in the {state} state")]
    InvalidState { op: &'static str, state: &'static str },

    #[error("could not switch audio output to '{0}'")]
    OutputSwitch(String),
}

/// Errors from the system output router.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("output switch command unavailable: {0}")]
    Unavailable(#[source] std::io::Error),

    #[error("failed to switch audio output to '{0}'")]
    SwitchFailed(String),
}

/// Errors writing audio, manifests, or transcripts to disk.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("no audio captured")]
    NoAudio,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("WAV encoding failed for {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("malformed session manifest at {path}: {source}")]
    BadManifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("refusing to delete audio: transcript not found at {0}")]
    TranscriptMissing(PathBuf),

    #[error("refusing to delete audio: transcript is empty at {0}")]
    TranscriptEmpty(PathBuf),
}

/// Errors from an external transcription engine invocation.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("could not spawn engine '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("engine timed out after {0:?}")]
    Timeout(Duration),

    /// The engine's durable failure marker.
    #[error("engine reported failure: {0}")]
    Engine(String),

    #[error("engine exited ({status}) without writing a result marker")]
    NoResult { status: String },

    #[error("could not parse engine output {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error talking to engine: {0}")]
    Io(#[from] std::io::Error),
}

/// Why a single transcript segment was rejected by the merge engine.
///
/// These never abort a merge; offending segments are dropped and counted.
#[derive(Debug, Error, PartialEq)]
pub enum MergeError {
    #[error("segment has negative start offset {start}")]
    NegativeOffset { start: f64 },

    #[error("segment ends at {end} before it starts at {start}")]
    InvertedOffsets { start: f64, end: f64 },
}
