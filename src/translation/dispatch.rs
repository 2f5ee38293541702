/*!
 * Concurrent, order-preserving dispatch of translation units.
 *
 * Units are submitted with bounded parallelism and complete in any order; each
 * result lands in the slot matching its input position, so the returned vector is
 * always in submission order no matter how the calls interleave.
 */

use futures::stream::{self, StreamExt};
use log::{debug, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{Notify, Semaphore};

use crate::errors::TranslationError;

use super::core::Translator;

/// Cooperative cancellation shared between the caller and running work
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancellationFlag {
    /// Create a flag that is not yet raised
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag and wake every waiter
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether the flag has been raised
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if the flag has been raised
    pub fn check(&self) -> Result<(), TranslationError> {
        if self.is_cancelled() {
            Err(TranslationError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolve once the flag is raised
    pub async fn cancelled(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Outcome of translating one unit
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationResult {
    /// Position of the unit in the submitted sequence
    pub batch_index: usize,
    /// Translated text, or why the unit failed
    pub outcome: Result<String, TranslationError>,
}

impl TranslationResult {
    /// Whether the unit was translated
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Translate every unit with at most `concurrency` calls in flight
///
/// Returns one result per unit in submission order. Individual failures are reported
/// in their slot; only cancellation aborts the whole dispatch, abandoning outstanding
/// calls without waiting for them. `progress` receives (completed, total) after every
/// completion.
pub async fn dispatch_all<T, P>(
    units: &[String],
    translator: &T,
    concurrency: usize,
    cancel: &CancellationFlag,
    progress: P,
) -> Result<Vec<TranslationResult>, TranslationError>
where
    T: Translator + ?Sized,
    P: Fn(usize, usize) + Send,
{
    cancel.check()?;

    let total = units.len();
    let concurrency = concurrency.max(1);
    let start_time = Instant::now();
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut slots: Vec<Option<Result<String, TranslationError>>> = (0..total).map(|_| None).collect();

    let mut in_flight = stream::iter(units.iter().enumerate())
        .map(|(index, text)| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (index, Err(TranslationError::Cancelled)),
                };
                if cancel.is_cancelled() {
                    return (index, Err(TranslationError::Cancelled));
                }
                (index, translator.translate(text).await)
            }
        })
        .buffer_unordered(concurrency);

    let mut completed = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Cancelled with {} of {} units outstanding", total - completed, total);
                return Err(TranslationError::Cancelled);
            }
            next = in_flight.next() => next,
        };

        let Some((index, outcome)) = next else { break };
        if let Err(e) = &outcome {
            debug!("Unit {} failed: {}", index + 1, e);
        }
        slots[index] = Some(outcome);
        completed += 1;
        progress(completed, total);
    }

    debug!("Dispatched {} units in {:?}", total, start_time.elapsed());

    Ok(slots
        .into_iter()
        .enumerate()
        .map(|(batch_index, slot)| TranslationResult {
            batch_index,
            outcome: slot.unwrap_or(Err(TranslationError::Cancelled)),
        })
        .collect())
}
