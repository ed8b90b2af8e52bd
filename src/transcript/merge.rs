use tracing::warn;

use super::notes::Note;
use super::segment::{RawSegment, Segment, SourceRole};

/// What to do when both tracks carry speech over the same interval.
///
/// Only `EmitBoth` is implemented: overlapping segments are emitted at their
/// natural offsets, showing interleaved near-simultaneous lines rather than
/// inventing a resolution. The policy is a parameter so alternative
/// resolutions can be added without touching call sites.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverlapPolicy {
    #[default]
    EmitBoth,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MergePolicy {
    pub overlap: OverlapPolicy,
}

/// The outcome of transcribing one source track, as handed to the merge.
#[derive(Debug, Clone)]
pub enum TrackOutcome {
    Segments(SourceRole, Vec<RawSegment>),
    /// The track's transcription failed outright; the merge still produces a
    /// transcript from the surviving source, with a visible marker.
    Unavailable(SourceRole, String),
}

/// One merged, speaker-labeled line plus the capture-time ordinals of any
/// notes anchored to it.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptLine {
    pub segment: Segment,
    pub note_refs: Vec<usize>,
}

/// The final merged artifact: ordered lines, unavailable-source markers, and
/// the notes for the trailing footnotes section. Created once, after all
/// available segment sequences are in; immutable thereafter.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    pub lines: Vec<TranscriptLine>,
    pub markers: Vec<String>,
    pub notes: Vec<Note>,
    /// Segments rejected for malformed offsets (logged, never fatal).
    pub dropped_segments: usize,
}

impl Transcript {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn word_count(&self) -> usize {
        self.lines
            .iter()
            .map(|l| l.segment.text.split_whitespace().count())
            .sum()
    }

    /// End offset of the last line, used as a duration fallback.
    pub fn last_end(&self) -> f64 {
        self.lines
            .iter()
            .map(|l| l.segment.end)
            .fold(0.0, f64::max)
    }
}

/// Merge the per-source segment sequences into one chronological timeline.
///
/// Ordering is by ascending start offset; at equal offsets the mic segment
/// precedes the speaker segment. The result depends only on the inputs,
/// never on which transcription call finished first.
pub fn merge(tracks: Vec<TrackOutcome>, notes: &[Note], policy: MergePolicy) -> Transcript {
    // Single implemented policy; matching here keeps the policy surface
    // explicit for future variants.
    let OverlapPolicy::EmitBoth = policy.overlap;

    let mut per_role: Vec<Vec<Segment>> = Vec::new();
    let mut markers = Vec::new();
    let mut dropped = 0usize;

    for track in tracks {
        match track {
            TrackOutcome::Segments(role, raw) => {
                let mut segments = Vec::with_capacity(raw.len());
                for raw_segment in raw {
                    let segment = Segment::from_raw(role, raw_segment);
                    match segment.validate() {
                        Ok(()) => segments.push(segment),
                        Err(reason) => {
                            warn!("dropping malformed {} segment: {}", role, reason);
                            dropped += 1;
                        }
                    }
                }
                // Engines emit in order, but ordering is their business, not
                // a guarantee we rely on.
                segments.sort_by(|a, b| a.start.total_cmp(&b.start));
                per_role.push(segments);
            }
            TrackOutcome::Unavailable(role, reason) => {
                warn!("{} track unavailable: {}", role, reason);
                markers.push(format!("({} track unavailable: {})", role, reason));
            }
        }
    }

    if dropped > 0 {
        warn!("dropped {} malformed segment(s) during merge", dropped);
    }

    let merged = merge_ordered(per_role);

    let lines = attach_notes(merged, notes);

    Transcript {
        lines,
        markers,
        notes: notes.to_vec(),
        dropped_segments: dropped,
    }
}

/// K-way merge of per-source sequences, each already sorted by start offset.
/// Tie-break at equal start: lower role (mic) first; the per-source order is
/// preserved for equal keys within one source.
fn merge_ordered(sources: Vec<Vec<Segment>>) -> Vec<Segment> {
    let total: usize = sources.iter().map(|s| s.len()).sum();
    let mut cursors = vec![0usize; sources.len()];
    let mut merged = Vec::with_capacity(total);

    while merged.len() < total {
        let mut best: Option<usize> = None;
        for (i, source) in sources.iter().enumerate() {
            let Some(candidate) = source.get(cursors[i]) else {
                continue;
            };
            best = match best {
                None => Some(i),
                Some(j) => {
                    let current = &sources[j][cursors[j]];
                    let earlier = match candidate.start.total_cmp(&current.start) {
                        std::cmp::Ordering::Less => true,
                        std::cmp::Ordering::Greater => false,
                        std::cmp::Ordering::Equal => candidate.role < current.role,
                    };
                    Some(if earlier { i } else { j })
                }
            };
        }
        let Some(i) = best else { break };
        merged.push(sources[i][cursors[i]].clone());
        cursors[i] += 1;
    }

    merged
}

/// Anchor each note to the merged line whose interval contains its offset;
/// a note falling in a gap attaches to the nearest preceding line. A note
/// ahead of every line attaches to the first one.
fn attach_notes(segments: Vec<Segment>, notes: &[Note]) -> Vec<TranscriptLine> {
    let mut lines: Vec<TranscriptLine> = segments
        .into_iter()
        .map(|segment| TranscriptLine {
            segment,
            note_refs: Vec::new(),
        })
        .collect();

    if lines.is_empty() {
        return lines;
    }

    for note in notes {
        let target = lines
            .iter()
            .position(|l| l.segment.contains(note.offset_secs))
            .or_else(|| {
                lines
                    .iter()
                    .rposition(|l| l.segment.end <= note.offset_secs)
            })
            .unwrap_or(0);
        lines[target].note_refs.push(note.index);
    }

    lines
}
