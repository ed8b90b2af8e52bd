// Integration tests for persistence
//
// These verify the atomic write discipline (no partial files at final
// paths), the dual-source session layout, and the critical safety rule:
// source audio is deleted only after the transcript is verified present and
// non-empty on disk.

use std::fs;
use std::path::Path;

use chrono::Local;
use recscribe::capture::{SessionAudio, SourceTrack};
use recscribe::error::PersistError;
use recscribe::store::{self, SessionManifest};
use recscribe::transcript::SourceRole;
use tempfile::TempDir;

fn mic_track(samples: Vec<f32>) -> SourceTrack {
    SourceTrack {
        role: SourceRole::Mic,
        device_name: "Test Microphone".to_string(),
        samples,
        start_offset_secs: 0.05,
    }
}

fn session(mic_samples: Vec<f32>, speaker_samples: Option<Vec<f32>>) -> SessionAudio {
    SessionAudio {
        started_at: Local::now(),
        sample_rate: 16000,
        channels: 1,
        mic: mic_track(mic_samples),
        speaker: speaker_samples.map(|samples| SourceTrack {
            role: SourceRole::Speaker,
            device_name: "BlackHole 2ch".to_string(),
            samples,
            start_offset_secs: 0.30,
        }),
        loopback_device: "BlackHole 2ch".to_string(),
        output_device: "Multi-Output Device".to_string(),
        dropped_chunks: 0,
    }
}

fn wav_sample_count(path: &Path) -> usize {
    hound::WavReader::open(path).unwrap().len() as usize
}

#[test]
fn test_persist_single_source_writes_one_wav() {
    let dir = TempDir::new().unwrap();

    let saved = store::persist(&session(vec![0.1; 1600], None), dir.path()).unwrap();

    assert!(saved.primary.exists());
    assert_eq!(saved.primary.extension().unwrap(), "wav");
    assert!(saved.speaker.is_none());
    assert!(saved.manifest.is_none());
    assert_eq!(wav_sample_count(&saved.primary), 1600);
}

#[test]
fn test_persist_leaves_no_temp_files_behind() {
    let dir = TempDir::new().unwrap();

    store::persist(&session(vec![0.1; 100], None), dir.path()).unwrap();

    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);
}

#[test]
fn test_persist_rejects_empty_recording() {
    let dir = TempDir::new().unwrap();

    let result = store::persist(&session(Vec::new(), None), dir.path());
    assert!(matches!(result, Err(PersistError::NoAudio)));
}

#[test]
fn test_persist_dual_source_writes_session_directory() {
    let dir = TempDir::new().unwrap();

    let saved = store::persist(
        &session(vec![0.1; 1600], Some(vec![0.2; 1600])),
        dir.path(),
    )
    .unwrap();

    let session_dir = saved.session_dir.as_ref().unwrap();
    assert!(session_dir.is_dir());
    assert!(session_dir.join("mic.wav").exists());
    assert!(session_dir.join("speaker.wav").exists());
    assert!(session_dir.join("session.json").exists());
}

#[test]
fn test_dual_source_tracks_are_padded_to_equal_length() {
    let dir = TempDir::new().unwrap();

    // Speaker enabled mid-session: its track is shorter.
    let saved = store::persist(
        &session(vec![0.1; 2000], Some(vec![0.2; 500])),
        dir.path(),
    )
    .unwrap();

    assert_eq!(wav_sample_count(&saved.primary), 2000);
    assert_eq!(wav_sample_count(saved.speaker.as_ref().unwrap()), 2000);
}

#[test]
fn test_manifest_round_trip() {
    let dir = TempDir::new().unwrap();

    let saved = store::persist(
        &session(vec![0.1; 100], Some(vec![0.2; 100])),
        dir.path(),
    )
    .unwrap();

    let manifest = SessionManifest::load(saved.manifest.as_ref().unwrap()).unwrap();
    assert_eq!(manifest.mode, "mic+speaker");
    assert_eq!(manifest.sample_rate, 16000);
    assert_eq!(manifest.channels, 1);
    assert_eq!(manifest.mic_device, "Test Microphone");
    assert_eq!(manifest.loopback_device, "BlackHole 2ch");
    // 0.30 - 0.05, rounded to 4 decimals.
    assert!((manifest.speaker_offset_seconds - 0.25).abs() < 1e-9);
}

#[test]
fn test_cleanup_refuses_when_transcript_missing() {
    let dir = TempDir::new().unwrap();
    let saved = store::persist(&session(vec![0.1; 100], None), dir.path()).unwrap();

    let missing = dir.path().join("never-written.md");
    let result = store::cleanup_sources(&missing, &saved);

    assert!(matches!(result, Err(PersistError::TranscriptMissing(_))));
    assert!(saved.primary.exists(), "source audio must be retained");
}

#[test]
fn test_cleanup_refuses_when_transcript_empty() {
    let dir = TempDir::new().unwrap();
    let saved = store::persist(&session(vec![0.1; 100], None), dir.path()).unwrap();

    let empty = dir.path().join("empty.md");
    fs::write(&empty, b"").unwrap();
    let result = store::cleanup_sources(&empty, &saved);

    assert!(matches!(result, Err(PersistError::TranscriptEmpty(_))));
    assert!(saved.primary.exists(), "source audio must be retained");
}

#[test]
fn test_finalize_transcript_deletes_sources_after_verification() {
    let dir = TempDir::new().unwrap();
    let saved = store::persist(
        &session(vec![0.1; 100], Some(vec![0.2; 100])),
        dir.path(),
    )
    .unwrap();

    let transcript_path = saved.transcript_path();
    store::finalize_transcript("## Transcript\n\nhello\n", &transcript_path, &saved).unwrap();

    assert!(transcript_path.exists());
    assert!(!saved.primary.exists());
    assert!(!saved.speaker.as_ref().unwrap().exists());
    assert!(!saved.manifest.as_ref().unwrap().exists());
    // The emptied session directory goes away too.
    assert!(!saved.session_dir.as_ref().unwrap().exists());
}

#[test]
fn test_locate_saved_finds_dual_session_from_directory() {
    let dir = TempDir::new().unwrap();
    let saved = store::persist(
        &session(vec![0.1; 100], Some(vec![0.2; 100])),
        dir.path(),
    )
    .unwrap();

    let located = store::locate_saved(saved.session_dir.as_ref().unwrap()).unwrap();
    assert!(located.is_dual());
    assert_eq!(located.primary, saved.primary);

    // Pointing at the mic track inside the directory resolves the same way.
    let located = store::locate_saved(&saved.primary).unwrap();
    assert!(located.is_dual());
}

#[test]
fn test_locate_saved_treats_lone_wav_as_single_source() {
    let dir = TempDir::new().unwrap();
    let saved = store::persist(&session(vec![0.1; 100], None), dir.path()).unwrap();

    let located = store::locate_saved(&saved.primary).unwrap();
    assert!(!located.is_dual());
    assert_eq!(located.transcript_path(), saved.primary.with_extension("md"));
}

#[test]
fn test_locate_saved_reports_missing_path() {
    let result = store::locate_saved(Path::new("/nonexistent/recording.wav"));
    assert!(matches!(result, Err(PersistError::Io { .. })));
}
