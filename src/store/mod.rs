use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::capture::SessionAudio;
use crate::error::PersistError;

/// Durable record binding the tracks of a dual-source session together, so
/// the merge can associate segment sequences with the correct role after
/// independent transcription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionManifest {
    pub mode: String,
    pub started_at: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub mic_device: String,
    pub loopback_device: String,
    pub output_device: String,
    /// Seconds the speaker track's first chunk lagged the mic track's; added
    /// to speaker segment offsets to align both tracks on the session clock.
    pub speaker_offset_seconds: f64,
}

pub const MANIFEST_FILE: &str = "session.json";
pub const MIC_TRACK_FILE: &str = "mic.wav";
pub const SPEAKER_TRACK_FILE: &str = "speaker.wav";

impl SessionManifest {
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        let raw = fs::read_to_string(path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| PersistError::BadManifest {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Where a persisted session's files landed.
#[derive(Debug, Clone)]
pub struct SavedAudio {
    /// The mic track (the only track for a single-source session).
    pub primary: PathBuf,
    pub speaker: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
    /// Present for dual-source sessions.
    pub session_dir: Option<PathBuf>,
}

impl SavedAudio {
    pub fn is_dual(&self) -> bool {
        self.speaker.is_some()
    }

    /// Everything deleted once the transcript is verified on disk.
    fn cleanup_targets(&self) -> Vec<&PathBuf> {
        let mut targets = vec![&self.primary];
        targets.extend(self.speaker.iter());
        targets.extend(self.manifest.iter());
        targets
    }

    /// Where this session's transcript belongs: next to a single-file
    /// recording, or as a sibling of a dual-source session directory.
    pub fn transcript_path(&self) -> PathBuf {
        match &self.session_dir {
            Some(dir) => dir.with_extension("md"),
            None => self.primary.with_extension("md"),
        }
    }
}

/// Write one audio file per source track, plus the manifest for dual-source
/// sessions. Every file lands via write-to-temp, fsync, rename, so a crash
/// mid-write never leaves a corrupt file at the final path.
pub fn persist(audio: &SessionAudio, base_dir: &Path) -> Result<SavedAudio, PersistError> {
    if audio.mic.samples.is_empty() {
        return Err(PersistError::NoAudio);
    }

    fs::create_dir_all(base_dir).map_err(|source| PersistError::Io {
        path: base_dir.to_path_buf(),
        source,
    })?;

    let timestamp = audio.started_at.format("%Y-%m-%d_%H-%M-%S").to_string();

    let Some(speaker) = &audio.speaker else {
        let wav_path = base_dir.join(format!("{}.wav", timestamp));
        write_wav_atomic(&wav_path, &audio.mic.samples, audio.sample_rate, audio.channels)?;
        info!("saved recording: {}", wav_path.display());
        return Ok(SavedAudio {
            primary: wav_path,
            speaker: None,
            manifest: None,
            session_dir: None,
        });
    };

    let session_dir = base_dir.join(&timestamp);
    fs::create_dir_all(&session_dir).map_err(|source| PersistError::Io {
        path: session_dir.clone(),
        source,
    })?;

    // Both WAVs span the session: pad the shorter track with silence.
    let len = audio.mic.samples.len().max(speaker.samples.len());
    let mic_samples = padded(&audio.mic.samples, len);
    let speaker_samples = padded(&speaker.samples, len);

    let mic_path = session_dir.join(MIC_TRACK_FILE);
    let speaker_path = session_dir.join(SPEAKER_TRACK_FILE);
    write_wav_atomic(&mic_path, &mic_samples, audio.sample_rate, audio.channels)?;
    write_wav_atomic(&speaker_path, &speaker_samples, audio.sample_rate, audio.channels)?;

    let manifest = SessionManifest {
        mode: "mic+speaker".to_string(),
        started_at: audio.started_at.to_rfc3339(),
        sample_rate: audio.sample_rate,
        channels: audio.channels,
        mic_device: audio.mic.device_name.clone(),
        loopback_device: audio.loopback_device.clone(),
        output_device: audio.output_device.clone(),
        speaker_offset_seconds: ((speaker.start_offset_secs - audio.mic.start_offset_secs)
            * 10_000.0)
            .round()
            / 10_000.0,
    };
    let manifest_path = session_dir.join(MANIFEST_FILE);
    let body = serde_json::to_vec_pretty(&manifest).map_err(|source| PersistError::BadManifest {
        path: manifest_path.clone(),
        source,
    })?;
    write_atomic(&manifest_path, &body)?;
    restrict_permissions(&manifest_path);

    info!("saved dual-source session: {}", session_dir.display());

    Ok(SavedAudio {
        primary: mic_path,
        speaker: Some(speaker_path),
        manifest: Some(manifest_path),
        session_dir: Some(session_dir),
    })
}

fn padded(samples: &[f32], len: usize) -> Vec<f32> {
    let mut out = samples.to_vec();
    out.resize(len, 0.0);
    out
}

/// Reconstruct the saved layout from a path the user handed us: a session
/// directory, a track inside one, or a standalone WAV.
pub fn locate_saved(path: &Path) -> Result<SavedAudio, PersistError> {
    let dir_candidate = if path.is_dir() {
        Some(path.to_path_buf())
    } else if path.file_name().and_then(|n| n.to_str()) == Some(MIC_TRACK_FILE) {
        path.parent().map(Path::to_path_buf)
    } else {
        None
    };

    if let Some(dir) = dir_candidate {
        let mic = dir.join(MIC_TRACK_FILE);
        let speaker = dir.join(SPEAKER_TRACK_FILE);
        let manifest = dir.join(MANIFEST_FILE);
        if mic.exists() && speaker.exists() && manifest.exists() {
            return Ok(SavedAudio {
                primary: mic,
                speaker: Some(speaker),
                manifest: Some(manifest),
                session_dir: Some(dir),
            });
        }
    }

    if path.is_dir() {
        return Err(PersistError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "directory is not a recording session",
            ),
        });
    }
    if !path.exists() {
        return Err(PersistError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "audio file not found"),
        });
    }

    Ok(SavedAudio {
        primary: path.to_path_buf(),
        speaker: None,
        manifest: None,
        session_dir: None,
    })
}

/// Write the transcript atomically, then delete the source audio — but only
/// once the transcript is verified present and non-empty on disk. A failed
/// write surfaces immediately and retains every source file.
pub fn finalize_transcript(
    content: &str,
    transcript_path: &Path,
    saved: &SavedAudio,
) -> Result<(), PersistError> {
    write_atomic(transcript_path, content.as_bytes())?;
    cleanup_sources(transcript_path, saved)?;
    info!("transcript saved: {}", transcript_path.display());
    Ok(())
}

/// Delete a session's source files if and only if the transcript at
/// `transcript_path` exists and is non-empty at the time of the check.
pub fn cleanup_sources(transcript_path: &Path, saved: &SavedAudio) -> Result<(), PersistError> {
    let meta = fs::metadata(transcript_path)
        .map_err(|_| PersistError::TranscriptMissing(transcript_path.to_path_buf()))?;
    if meta.len() == 0 {
        return Err(PersistError::TranscriptEmpty(transcript_path.to_path_buf()));
    }

    for target in saved.cleanup_targets() {
        match fs::remove_file(target) {
            Ok(()) => info!("source file removed: {}", target.display()),
            Err(e) => warn!("could not delete {}: {}", target.display(), e),
        }
    }

    if let Some(dir) = &saved.session_dir {
        // Only an emptied session directory goes away.
        if let Err(e) = fs::remove_dir(dir) {
            warn!("could not remove session dir {}: {}", dir.display(), e);
        }
    }

    Ok(())
}

/// Atomic write: temp name in the destination directory, fsync, rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PersistError> {
    let tmp = temp_sibling(path);
    let io_err = |p: &Path| {
        let p = p.to_path_buf();
        move |source: std::io::Error| PersistError::Io { path: p, source }
    };

    fs::write(&tmp, bytes).map_err(io_err(&tmp))?;
    let file = File::open(&tmp).map_err(io_err(&tmp))?;
    file.sync_all().map_err(io_err(&tmp))?;

    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        PersistError::Io {
            path: path.to_path_buf(),
            source,
        }
    })
}

fn write_wav_atomic(
    path: &Path,
    samples: &[f32],
    sample_rate: u32,
    channels: u16,
) -> Result<(), PersistError> {
    let tmp = temp_sibling(path);

    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let result = (|| -> Result<(), PersistError> {
        let file = File::create(&tmp).map_err(|source| PersistError::Io {
            path: tmp.clone(),
            source,
        })?;
        let mut writer =
            hound::WavWriter::new(BufWriter::new(file), spec).map_err(|source| {
                PersistError::Encode {
                    path: tmp.clone(),
                    source,
                }
            })?;
        for &sample in samples {
            let value = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(value).map_err(|source| PersistError::Encode {
                path: tmp.clone(),
                source,
            })?;
        }
        writer.finalize().map_err(|source| PersistError::Encode {
            path: tmp.clone(),
            source,
        })?;

        let file = File::open(&tmp).map_err(|source| PersistError::Io {
            path: tmp.clone(),
            source,
        })?;
        file.sync_all().map_err(|source| PersistError::Io {
            path: tmp.clone(),
            source,
        })?;
        restrict_permissions(&tmp);

        fs::rename(&tmp, path).map_err(|source| PersistError::Io {
            path: path.to_path_buf(),
            source,
        })
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    path.with_file_name(format!(".{}.tmp-{}", name, uuid::Uuid::new_v4()))
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
        warn!("could not restrict permissions on {}: {}", path.display(), e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
