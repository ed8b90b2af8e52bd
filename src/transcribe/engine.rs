use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{info, warn};

use super::progress::{relay_progress, ProgressUpdate};
use crate::config::EngineConfig;
use crate::error::TranscriptionError;
use crate::transcript::RawSegment;

/// What the engine produced for one source track: the segments file named by
/// the `OK:` result marker.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineOutput {
    pub language: String,
    pub duration: f64,
    pub segments: Vec<RawSegment>,
}

/// Sink for relayed progress updates; `None` discards them.
pub type ProgressSink = Option<tokio::sync::mpsc::UnboundedSender<ProgressUpdate>>;

/// The external speech-to-text engine, consumed as a black box: one audio
/// file and a language hint in, timestamped segments out.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(
        &self,
        audio: &Path,
        language: Option<&str>,
        progress: ProgressSink,
    ) -> Result<EngineOutput, TranscriptionError>;
}

/// Runs the engine as an isolated child process per invocation, so its file
/// descriptors and worker pools never touch the live audio callbacks.
///
/// Contract with the worker executable:
///   <command> <audio> --model <m> --result-file <r> --segments-file <s>
///             [--language <hint>]
/// Progress streams over the child's stdout as line-delimited JSON; the
/// durable outcome is the result file: `OK:<segments-path>` on success or
/// `ERROR:<message>` on failure.
pub struct WorkerEngine {
    command: String,
    model: String,
    timeout: Duration,
}

impl WorkerEngine {
    pub fn new(command: impl Into<String>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            model: model.into(),
            timeout,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            &config.command,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

#[async_trait]
impl TranscriptionEngine for WorkerEngine {
    async fn transcribe(
        &self,
        audio: &Path,
        language: Option<&str>,
        progress: ProgressSink,
    ) -> Result<EngineOutput, TranscriptionError> {
        let scratch = std::env::temp_dir();
        let token = uuid::Uuid::new_v4();
        let result_path = scratch.join(format!("recscribe-result-{}", token));
        let segments_path = scratch.join(format!("recscribe-segments-{}.json", token));

        let mut command = Command::new(&self.command);
        command
            .arg(audio)
            .arg("--model")
            .arg(&self.model)
            .arg("--result-file")
            .arg(&result_path)
            .arg("--segments-file")
            .arg(&segments_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(hint) = language {
            command.arg("--language").arg(hint);
        }

        info!("transcribing {} with '{}'", audio.display(), self.command);

        let mut child = command.spawn().map_err(|source| TranscriptionError::Spawn {
            command: self.command.clone(),
            source,
        })?;

        let relay = child.stdout.take().map(|stdout| {
            tokio::spawn(async move {
                relay_progress(stdout, move |update| {
                    if let Some(sink) = &progress {
                        let _ = sink.send(update);
                    }
                })
                .await;
            })
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                cleanup(&[&result_path, &segments_path]).await;
                return Err(TranscriptionError::Io(e));
            }
            Err(_) => {
                warn!("engine timed out, killing worker");
                let _ = child.start_kill();
                let _ = child.wait().await;
                cleanup(&[&result_path, &segments_path]).await;
                return Err(TranscriptionError::Timeout(self.timeout));
            }
        };

        if let Some(task) = relay {
            let _ = task.await;
        }

        // The durable channel: the marker file survives even when every
        // progress line was lost.
        let marker = match tokio::fs::read_to_string(&result_path).await {
            Ok(marker) => marker,
            Err(_) => {
                cleanup(&[&segments_path]).await;
                return Err(TranscriptionError::NoResult {
                    status: status.to_string(),
                });
            }
        };
        cleanup(&[&result_path]).await;

        if let Some(message) = marker.strip_prefix("ERROR:") {
            cleanup(&[&segments_path]).await;
            return Err(TranscriptionError::Engine(message.trim().to_string()));
        }

        let Some(named) = marker.strip_prefix("OK:") else {
            cleanup(&[&segments_path]).await;
            return Err(TranscriptionError::NoResult {
                status: status.to_string(),
            });
        };

        let output_path = PathBuf::from(named.trim());
        let raw = match tokio::fs::read_to_string(&output_path).await {
            Ok(raw) => raw,
            Err(e) => {
                cleanup(&[&segments_path]).await;
                return Err(TranscriptionError::Io(e));
            }
        };
        let parsed = serde_json::from_str::<EngineOutput>(&raw);
        cleanup(&[&output_path, &segments_path]).await;
        let output = parsed.map_err(|source| TranscriptionError::Malformed {
            path: output_path.clone(),
            source,
        })?;

        info!(
            "transcription complete: {} segment(s), language={}",
            output.segments.len(),
            output.language
        );
        Ok(output)
    }
}

async fn cleanup(paths: &[&PathBuf]) {
    for path in paths {
        let _ = tokio::fs::remove_file(path).await;
    }
}
