pub mod document;
pub mod merge;
pub mod notes;
pub mod segment;

pub use document::{build_markdown, format_offset, DocumentInfo};
pub use merge::{merge, MergePolicy, OverlapPolicy, TrackOutcome, Transcript, TranscriptLine};
pub use notes::{Note, NoteCollection};
pub use segment::{RawSegment, Segment, SourceRole};
