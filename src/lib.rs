pub mod audio;
pub mod capture;
pub mod config;
pub mod error;
pub mod store;
pub mod transcribe;
pub mod transcript;

pub use audio::{
    list_input_devices, Device, OutputRouter, RoutingGuard, SharedBuffer, SwitchAudioRouter,
};
pub use capture::{CaptureSession, SessionAudio, SessionState, SessionStatus, StartReport};
pub use config::Config;
pub use store::{SavedAudio, SessionManifest};
pub use transcribe::{
    process_recording, ProgressUpdate, TranscriptionEngine, WorkerEngine,
};
pub use transcript::{
    merge, MergePolicy, Note, NoteCollection, RawSegment, Segment, SourceRole, TrackOutcome,
    Transcript,
};
