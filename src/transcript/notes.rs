use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A user-entered annotation captured during the live session.
///
/// The ordinal index is assigned at capture time and is what the footnote
/// markers and the trailing notes section key on, independent of where the
/// note lands in the merged timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub index: usize,
    /// Seconds since the session started.
    pub offset_secs: f64,
    pub text: String,
}

/// Collects timestamped notes during a recording session.
#[derive(Debug, Default)]
pub struct NoteCollection {
    notes: Vec<Note>,
    started: Option<Instant>,
}

impl NoteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor note offsets to the session start.
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    pub fn add(&mut self, text: impl Into<String>) -> Note {
        let offset_secs = self
            .started
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let note = Note {
            index: self.notes.len() + 1,
            offset_secs,
            text: text.into(),
        };
        self.notes.push(note.clone());
        note
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn into_notes(self) -> Vec<Note> {
        self.notes
    }
}
