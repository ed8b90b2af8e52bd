pub mod session;

pub use session::{
    CaptureSession, SessionAudio, SessionState, SessionStatus, SourceTrack, StartReport,
};
