use chrono::{DateTime, Local};

use super::merge::Transcript;

/// Recoverable header fields written into the transcript's front matter.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub date: DateTime<Local>,
    pub duration_seconds: f64,
    pub language: String,
    pub mic_name: String,
    pub speaker_capture: bool,
    /// File name of the primary source audio.
    pub source_audio: String,
    pub model: String,
}

/// Render an offset in seconds as `m:ss` (or `h:mm:ss` past the hour).
pub fn format_offset(secs: f64) -> String {
    let total = secs.max(0.0) as u64;
    let (hours, mins, secs) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, mins, secs)
    } else {
        format!("{}:{:02}", mins, secs)
    }
}

/// Build the full Markdown document: front matter, merged transcript body,
/// trailing footnotes.
pub fn build_markdown(transcript: &Transcript, info: &DocumentInfo) -> String {
    let mut lines = Vec::new();

    lines.push("---".to_string());
    lines.push(format!(
        "title: Transcript {}",
        info.date.format("%Y-%m-%d %H:%M")
    ));
    lines.push(format!("date: {}", info.date.format("%Y-%m-%dT%H:%M:%S")));
    lines.push(format!(
        "duration_seconds: {:.1}",
        info.duration_seconds
    ));
    lines.push(format!("word_count: {}", transcript.word_count()));
    lines.push(format!("language: {}", info.language));
    lines.push(format!("mic: {}", info.mic_name));
    lines.push(format!("speaker_capture: {}", info.speaker_capture));
    lines.push(format!("source_audio: {}", info.source_audio));
    lines.push(format!("model: {}", info.model));
    lines.push("---".to_string());
    lines.push(String::new());
    lines.push("## Transcript".to_string());
    lines.push(String::new());

    for marker in &transcript.markers {
        lines.push(format!("*{}*", marker));
    }
    if !transcript.markers.is_empty() {
        lines.push(String::new());
    }

    for line in &transcript.lines {
        let refs: String = line
            .note_refs
            .iter()
            .map(|i| format!("[^{}]", i))
            .collect();
        lines.push(format!(
            "[{}] {}: {}{}",
            format_offset(line.segment.start),
            line.segment.role.label(),
            line.segment.text.trim(),
            refs
        ));
    }
    lines.push(String::new());

    if !transcript.notes.is_empty() {
        lines.push("## Notes".to_string());
        lines.push(String::new());
        for note in &transcript.notes {
            lines.push(format!(
                "[^{}]: {} (at {})",
                note.index,
                note.text,
                format_offset(note.offset_secs)
            ));
        }
        lines.push(String::new());
    }

    lines.join("\n")
}
