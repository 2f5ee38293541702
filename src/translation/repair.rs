/*!
 * Verification and repair of untranslated entries.
 *
 * After reassembly some entries can still hold their source text: their batch
 * failed, split wrongly, or the backend echoed a line back. Those entries are found
 * by comparing against the source document and re-translated one at a time, for a
 * bounded number of rounds.
 */

use log::{debug, info, warn};

use crate::errors::{SubtitleError, TranslationError};
use crate::subtitle_processor::SubtitleEntry;

use super::batch::normalize_piece;
use super::core::Translator;
use super::dispatch::{dispatch_all, CancellationFlag};

/// An entry that still reads like the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairCandidate {
    /// Position of the entry in the document
    pub index: usize,
    /// Sequence number of the entry
    pub seq_num: usize,
    /// Source text to translate again
    pub source_text: String,
}

/// Repair pass settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairConfig {
    /// Parallel single-entry calls
    pub concurrency: usize,
    /// Rounds of re-translation before giving up
    pub rounds: usize,
    /// Leave entries without any letters alone
    pub skip_non_alphabetic: bool,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            concurrency: 20,
            rounds: 2,
            skip_non_alphabetic: true,
        }
    }
}

/// Result of the repair pass
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    /// Entries after repair, in source order
    pub entries: Vec<SubtitleEntry>,
    /// Candidates found before the first round
    pub candidates: usize,
    /// Candidates that received a differing translation
    pub repaired: usize,
    /// Candidates still untranslated after the last round
    pub exhausted: Vec<RepairCandidate>,
}

impl RepairOutcome {
    /// Whether every candidate was repaired
    pub fn is_complete(&self) -> bool {
        self.exhausted.is_empty()
    }
}

/// Whether the text has anything a translator could change
pub fn has_alphabetic(text: &str) -> bool {
    text.chars().any(char::is_alphabetic)
}

/// Find entries whose translation is identical to the source
///
/// Both documents must have the same number of entries. With `skip_non_alphabetic`,
/// entries without a single letter (music notes, numbers, "...") are never flagged.
pub fn find_repair_candidates(
    source: &[SubtitleEntry],
    translated: &[SubtitleEntry],
    skip_non_alphabetic: bool,
) -> Result<Vec<RepairCandidate>, SubtitleError> {
    if source.len() != translated.len() {
        return Err(SubtitleError::EntryCountMismatch {
            expected: source.len(),
            actual: translated.len(),
        });
    }

    let candidates: Vec<RepairCandidate> = source.iter()
        .zip(translated)
        .enumerate()
        .filter(|(_, (original, current))| original.text == current.text)
        .filter(|(_, (original, _))| !skip_non_alphabetic || has_alphabetic(&original.text))
        .map(|(index, (original, _))| RepairCandidate {
            index,
            seq_num: original.seq_num,
            source_text: original.text.clone(),
        })
        .collect();

    debug!("{} of {} entries need repair", candidates.len(), source.len());
    Ok(candidates)
}

/// Re-translate `candidates` one entry per call, for up to `config.rounds` rounds
///
/// A candidate is repaired when the backend returns text different from the source;
/// failed calls and echoed text go into the next round. `progress` receives
/// (completed, total) within each round.
pub async fn repair_candidates<T, P>(
    translated: Vec<SubtitleEntry>,
    candidates: Vec<RepairCandidate>,
    translator: &T,
    config: &RepairConfig,
    cancel: &CancellationFlag,
    progress: P,
) -> Result<RepairOutcome, TranslationError>
where
    T: Translator + ?Sized,
    P: Fn(usize, usize) + Send + Sync,
{
    let mut entries = translated;
    let total_candidates = candidates.len();
    let mut pending = candidates;
    let mut repaired = 0;

    for round in 1..=config.rounds {
        if pending.is_empty() {
            break;
        }
        cancel.check()?;
        info!("Repair round {}/{}: {} entries", round, config.rounds, pending.len());

        let units: Vec<String> = pending.iter().map(|c| c.source_text.clone()).collect();
        let results = dispatch_all(&units, translator, config.concurrency, cancel, &progress).await?;

        let mut still_pending = Vec::new();
        for (candidate, result) in pending.into_iter().zip(results) {
            match result.outcome {
                Ok(text) => {
                    let text = normalize_piece(&text);
                    if !text.trim().is_empty() && text != candidate.source_text {
                        entries[candidate.index].text = text;
                        repaired += 1;
                    } else {
                        debug!("Entry {} came back unchanged", candidate.seq_num);
                        still_pending.push(candidate);
                    }
                },
                Err(e) => {
                    debug!("Entry {} failed to translate: {}", candidate.seq_num, e);
                    still_pending.push(candidate);
                },
            }
        }
        pending = still_pending;
    }

    if !pending.is_empty() {
        warn!("{} entries remain untranslated after {} repair rounds", pending.len(), config.rounds);
    }

    Ok(RepairOutcome {
        entries,
        candidates: total_candidates,
        repaired,
        exhausted: pending,
    })
}

/// Find untranslated entries and repair them
pub async fn verify_and_repair<T, P>(
    source: &[SubtitleEntry],
    translated: Vec<SubtitleEntry>,
    translator: &T,
    config: &RepairConfig,
    cancel: &CancellationFlag,
    progress: P,
) -> Result<RepairOutcome, TranslationError>
where
    T: Translator + ?Sized,
    P: Fn(usize, usize) + Send + Sync,
{
    let candidates = find_repair_candidates(source, &translated, config.skip_non_alphabetic)?;
    repair_candidates(translated, candidates, translator, config, cancel, progress).await
}
