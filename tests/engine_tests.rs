// Integration tests for the worker-engine invocation
//
// A stand-in engine script exercises the real child-process plumbing: the
// stdout progress stream, the durable OK:/ERROR: result marker, and the
// timeout kill path. Unix-only because the stand-in is a shell script.

#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use recscribe::error::TranscriptionError;
use recscribe::transcribe::{TranscriptionEngine, WorkerEngine};
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn write_dummy_audio(dir: &Path) -> PathBuf {
    let path = dir.join("input.wav");
    fs::write(&path, b"not really audio").unwrap();
    path
}

const OK_ENGINE: &str = r#"#!/bin/sh
result=""
segments=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --result-file) result="$2"; shift 2 ;;
    --segments-file) segments="$2"; shift 2 ;;
    *) shift ;;
  esac
done
echo '{"type":"progress","value":0.5,"eta_sec":2.0,"elapsed_sec":2.0}'
echo 'this line is garbage and must be skipped'
echo '{"type":"progress","value":1.0,"eta_sec":0.0,"elapsed_sec":4.0}'
printf '%s' '{"language":"en","duration":2.0,"segments":[{"start":0.0,"end":2.0,"text":"hello"}]}' > "$segments"
printf 'OK:%s' "$segments" > "$result"
"#;

const FAILING_ENGINE: &str = r#"#!/bin/sh
result=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --result-file) result="$2"; shift 2 ;;
    *) shift ;;
  esac
done
printf 'ERROR:model not installed' > "$result"
exit 1
"#;

const HANGING_ENGINE: &str = r#"#!/bin/sh
sleep 30
"#;

const SILENT_ENGINE: &str = r#"#!/bin/sh
exit 3
"#;

#[tokio::test]
async fn test_successful_engine_run_returns_segments() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "engine.sh", OK_ENGINE);
    let audio = write_dummy_audio(dir.path());

    let engine = WorkerEngine::new(
        script.to_string_lossy(),
        "base",
        Duration::from_secs(10),
    );
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

    let output = engine
        .transcribe(&audio, Some("en"), Some(tx))
        .await
        .expect("engine run succeeds");

    assert_eq!(output.language, "en");
    assert_eq!(output.segments.len(), 1);
    assert_eq!(output.segments[0].text, "hello");

    // Both well-formed progress lines arrived; the garbage line did not.
    let mut values = Vec::new();
    while let Ok(update) = rx.try_recv() {
        values.push(update.value);
    }
    assert_eq!(values, vec![0.5, 1.0]);
}

#[tokio::test]
async fn test_failure_marker_surfaces_engine_error() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "engine.sh", FAILING_ENGINE);
    let audio = write_dummy_audio(dir.path());

    let engine = WorkerEngine::new(
        script.to_string_lossy(),
        "base",
        Duration::from_secs(10),
    );

    let err = engine
        .transcribe(&audio, None, None)
        .await
        .expect_err("engine reports failure");

    match err {
        TranscriptionError::Engine(message) => assert_eq!(message, "model not installed"),
        other => panic!("expected Engine error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_hanging_engine_is_killed_on_timeout() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "engine.sh", HANGING_ENGINE);
    let audio = write_dummy_audio(dir.path());

    let engine = WorkerEngine::new(
        script.to_string_lossy(),
        "base",
        Duration::from_millis(200),
    );

    let err = engine
        .transcribe(&audio, None, None)
        .await
        .expect_err("hang becomes a timeout");

    assert!(matches!(err, TranscriptionError::Timeout(_)));
}

#[tokio::test]
async fn test_exit_without_marker_is_reported() {
    let dir = TempDir::new().unwrap();
    let script = write_script(dir.path(), "engine.sh", SILENT_ENGINE);
    let audio = write_dummy_audio(dir.path());

    let engine = WorkerEngine::new(
        script.to_string_lossy(),
        "base",
        Duration::from_secs(10),
    );

    let err = engine
        .transcribe(&audio, None, None)
        .await
        .expect_err("missing marker is an error");

    assert!(matches!(err, TranscriptionError::NoResult { .. }));
}

#[tokio::test]
async fn test_missing_executable_fails_to_spawn() {
    let dir = TempDir::new().unwrap();
    let audio = write_dummy_audio(dir.path());

    let engine = WorkerEngine::new(
        "/nonexistent/stt-worker",
        "base",
        Duration::from_secs(1),
    );

    let err = engine
        .transcribe(&audio, None, None)
        .await
        .expect_err("spawn fails");

    assert!(matches!(err, TranscriptionError::Spawn { .. }));
}
