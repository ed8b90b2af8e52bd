pub mod engine;
pub mod progress;

pub use engine::{EngineOutput, ProgressSink, TranscriptionEngine, WorkerEngine};
pub use progress::{parse_line, relay_progress, ProgressUpdate};

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Local;
use tracing::warn;

use crate::config::Config;
use crate::error::TranscriptionError;
use crate::store::{self, SavedAudio, SessionManifest};
use crate::transcript::{
    build_markdown, merge, DocumentInfo, MergePolicy, Note, RawSegment, SourceRole, TrackOutcome,
};

/// Run the full post-processing pipeline for a saved recording: transcribe
/// each source track, merge into one timeline, write the transcript, and
/// delete the source audio once the transcript is verified on disk.
///
/// A single failed track degrades to a transcript from the surviving source;
/// only when every track fails does this return an error, with all source
/// audio retained.
pub async fn process_recording(
    engine: &dyn TranscriptionEngine,
    saved: &SavedAudio,
    notes: Vec<Note>,
    mic_name: Option<&str>,
    config: &Config,
    progress: ProgressSink,
) -> Result<PathBuf> {
    let language_hint = config.engine.language.as_deref();

    let manifest = match &saved.manifest {
        Some(path) => match SessionManifest::load(path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!("unreadable session manifest, merging without alignment: {}", e);
                None
            }
        },
        None => None,
    };

    let (mic_result, speaker_result) = match &saved.speaker {
        Some(speaker_path) => {
            let mic_fut = engine.transcribe(&saved.primary, language_hint, progress.clone());
            let speaker_fut = engine.transcribe(speaker_path, language_hint, progress.clone());
            let (mic, speaker) = tokio::join!(mic_fut, speaker_fut);
            (mic, Some(speaker))
        }
        None => (
            engine
                .transcribe(&saved.primary, language_hint, progress.clone())
                .await,
            None,
        ),
    };

    let mut languages = Vec::new();
    let mut durations = Vec::new();
    let mut tracks = Vec::new();
    let mut failures = 0usize;

    let mut push_track = |role: SourceRole,
                          result: Result<EngineOutput, TranscriptionError>,
                          offset: f64| {
        match result {
            Ok(output) => {
                languages.push(output.language.clone());
                durations.push(output.duration + offset.max(0.0));
                tracks.push(TrackOutcome::Segments(
                    role,
                    shift_segments(output.segments, offset),
                ));
            }
            Err(e) => {
                warn!("{} transcription failed: {}", role, e);
                failures += 1;
                tracks.push(TrackOutcome::Unavailable(role, e.to_string()));
            }
        }
    };

    let speaker_offset = manifest
        .as_ref()
        .map(|m| m.speaker_offset_seconds)
        .unwrap_or(0.0);

    push_track(SourceRole::Mic, mic_result, 0.0);
    if let Some(result) = speaker_result {
        push_track(SourceRole::Speaker, result, speaker_offset);
    }

    let track_count = tracks.len();
    if failures == track_count {
        anyhow::bail!("transcription failed for every source track; audio retained");
    }

    let transcript = merge(tracks, &notes, MergePolicy::default());

    let info = DocumentInfo {
        date: Local::now(),
        duration_seconds: durations.iter().cloned().fold(0.0, f64::max).max(transcript.last_end()),
        language: languages.first().cloned().unwrap_or_else(|| "unknown".to_string()),
        mic_name: mic_name
            .map(str::to_string)
            .or_else(|| manifest.as_ref().map(|m| m.mic_device.clone()))
            .unwrap_or_else(|| "unknown".to_string()),
        speaker_capture: saved.is_dual(),
        source_audio: saved
            .primary
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        model: config.engine.model.clone(),
    };

    let content = build_markdown(&transcript, &info);
    let transcript_path = saved.transcript_path();
    store::finalize_transcript(&content, &transcript_path, saved)
        .context("could not finalize transcript; source audio retained")?;

    Ok(transcript_path)
}

/// Shift a track's segment offsets onto the session clock. Clamped so a
/// slightly negative alignment can never produce invalid offsets.
fn shift_segments(segments: Vec<RawSegment>, offset: f64) -> Vec<RawSegment> {
    if offset == 0.0 {
        return segments;
    }
    segments
        .into_iter()
        .map(|s| {
            let start = (s.start + offset).max(0.0);
            RawSegment {
                start,
                end: (s.end + offset).max(start),
                text: s.text,
            }
        })
        .collect()
}
