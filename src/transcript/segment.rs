use serde::{Deserialize, Serialize};

use crate::error::MergeError;

/// Which source track a segment came from.
///
/// The derived ordering (`Mic < Speaker`) is the merge tie-break: at equal
/// start offsets the mic segment is emitted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceRole {
    Mic,
    Speaker,
}

impl SourceRole {
    /// Speaker label used in the rendered transcript.
    pub fn label(self) -> &'static str {
        match self {
            SourceRole::Mic => "Me",
            SourceRole::Speaker => "Them",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceRole::Mic => "mic",
            SourceRole::Speaker => "speaker",
        }
    }
}

impl std::fmt::Display for SourceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of transcribed speech as emitted by the engine, before it is
/// tagged with a role. Offsets are seconds from the start of the track's
/// audio file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// A role-tagged segment on the shared session timeline. Never mutated after
/// creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub role: SourceRole,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Segment {
    pub fn from_raw(role: SourceRole, raw: RawSegment) -> Self {
        Self {
            role,
            start: raw.start,
            end: raw.end,
            text: raw.text,
        }
    }

    /// Reject offsets the engine should never produce. Invalid segments are
    /// dropped individually by the merge, with a logged count.
    pub fn validate(&self) -> Result<(), MergeError> {
        if self.start < 0.0 {
            return Err(MergeError::NegativeOffset { start: self.start });
        }
        if self.end < self.start {
            return Err(MergeError::InvertedOffsets {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Whether `offset` falls inside this segment's interval (inclusive).
    pub fn contains(&self, offset: f64) -> bool {
        self.start <= offset && offset <= self.end
    }
}
