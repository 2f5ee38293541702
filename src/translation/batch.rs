/*!
 * Batch packing and reassembly.
 *
 * Consecutive entries, each followed by a blank-line delimiter, are packed into texts of bounded
 * length, so one backend call carries many subtitle lines. After translation each
 * batch is split back on the same delimiter and the pieces are laid onto the
 * entries they came from.
 */

use log::{debug, warn};
use std::ops::Range;

use crate::errors::TranslationError;
use crate::subtitle_processor::SubtitleEntry;

use super::dispatch::TranslationResult;

/// Separator between entries inside a packed batch
pub const ENTRY_DELIMITER: &str = "\n\n\n";

/// Default upper bound on packed text length, in characters
pub const DEFAULT_LENGTH_LIMIT: usize = 1400;

/// A run of consecutive entries packed into one text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Positions of the packed entries in the document
    pub entry_range: Range<usize>,
    /// Entry texts, each followed by `ENTRY_DELIMITER`
    pub packed_text: String,
}

impl Batch {
    /// Number of entries in the batch
    pub fn len(&self) -> usize {
        self.entry_range.len()
    }

    /// Whether the batch holds no entries
    pub fn is_empty(&self) -> bool {
        self.entry_range.is_empty()
    }

    /// Length of the packed text in characters
    pub fn char_count(&self) -> usize {
        self.packed_text.chars().count()
    }
}

/// A batch that could not be laid back onto its entries
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    /// Position of the batch in dispatch order
    pub batch_index: usize,
    /// Entries the batch covered
    pub entry_range: Range<usize>,
    /// What went wrong
    pub error: TranslationError,
}

/// Entries after reassembly, with the batches that fell back to source text
#[derive(Debug, Clone, PartialEq)]
pub struct Reassembly {
    /// One entry per source entry, in source order
    pub entries: Vec<SubtitleEntry>,
    /// Batches whose entries kept their source text
    pub failures: Vec<BatchFailure>,
}

/// Greedily pack entries into batches of at most `length_limit` characters
///
/// Every entry text is suffixed with `ENTRY_DELIMITER` and counted with it. A batch is
/// closed when the next suffixed entry would push it past the limit. An entry longer
/// than the limit on its own becomes a single-entry batch.
pub fn pack(entries: &[SubtitleEntry], length_limit: usize) -> Vec<Batch> {
    let delimiter_len = ENTRY_DELIMITER.chars().count();
    let mut batches = Vec::new();
    let mut start = 0;
    let mut current = String::new();
    let mut current_len = 0;

    for (index, entry) in entries.iter().enumerate() {
        let piece_len = entry.text.chars().count() + delimiter_len;

        if index > start && current_len + piece_len > length_limit {
            batches.push(Batch {
                entry_range: start..index,
                packed_text: std::mem::take(&mut current),
            });
            start = index;
            current_len = 0;
        }

        current.push_str(&entry.text);
        current.push_str(ENTRY_DELIMITER);
        current_len += piece_len;
    }

    if start < entries.len() {
        batches.push(Batch {
            entry_range: start..entries.len(),
            packed_text: current,
        });
    }

    debug!("Packed {} entries into {} batches (limit {} chars)", entries.len(), batches.len(), length_limit);
    batches
}

/// Tidy one piece of translated text
///
/// Removes line breaks at both ends and drops empty lines inside, so the piece
/// cannot break the block structure of the serialized document. Lines holding only
/// spaces are kept as they are.
pub fn normalize_piece(piece: &str) -> String {
    let trimmed = piece.trim_matches(|c| c == '\n' || c == '\r');
    trimmed
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Split a translated batch back into per-entry pieces
///
/// One trailing empty fragment, left by a translator that echoes a final delimiter,
/// is dropped.
pub fn split(translated: &str) -> Vec<String> {
    let mut pieces: Vec<String> = translated
        .split(ENTRY_DELIMITER)
        .map(normalize_piece)
        .collect();

    if pieces.len() > 1 && pieces.last().is_some_and(|p| p.is_empty()) {
        pieces.pop();
    }
    pieces
}

/// Lay translated batches back onto the entries they were packed from
///
/// `results` may arrive in any order; they are matched to batches by index. A batch
/// whose call failed, or whose split yields the wrong number of pieces, leaves its
/// entries with their source text and is reported in `failures`.
pub fn reassemble(entries: &[SubtitleEntry], batches: &[Batch], results: Vec<TranslationResult>) -> Reassembly {
    let mut outcomes: Vec<Option<Result<String, TranslationError>>> = batches.iter().map(|_| None).collect();
    for result in results {
        match outcomes.get_mut(result.batch_index) {
            Some(slot) => *slot = Some(result.outcome),
            None => warn!("Ignoring result for unknown batch {}", result.batch_index),
        }
    }

    let mut reassembled = entries.to_vec();
    let mut failures = Vec::new();

    for (batch_index, (batch, outcome)) in batches.iter().zip(outcomes).enumerate() {
        let outcome = outcome.unwrap_or(Err(TranslationError::Cancelled));
        let pieces = match outcome {
            Ok(text) => split(&text),
            Err(error) => {
                warn!("Batch {} failed, keeping source text: {}", batch_index + 1, error);
                failures.push(BatchFailure { batch_index, entry_range: batch.entry_range.clone(), error });
                continue;
            }
        };

        if pieces.len() != batch.len() {
            warn!(
                "Batch {} split into {} pieces for {} entries, keeping source text",
                batch_index + 1, pieces.len(), batch.len()
            );
            failures.push(BatchFailure {
                batch_index,
                entry_range: batch.entry_range.clone(),
                error: TranslationError::ReassemblyMismatch {
                    batch_index,
                    expected: batch.len(),
                    actual: pieces.len(),
                },
            });
            continue;
        }

        for (entry, piece) in reassembled[batch.entry_range.clone()].iter_mut().zip(pieces) {
            entry.text = piece;
        }
    }

    Reassembly { entries: reassembled, failures }
}
