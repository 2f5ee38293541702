/*!
 * Tests for concurrent, order-preserving dispatch
 */

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use subrelay::errors::TranslationError;
use subrelay::providers::mock::MockTranslator;
use subrelay::translation::{dispatch_all, CancellationFlag};
use crate::common;
use crate::common::mock_translators::{CancellingTranslator, ReverseDelayTranslator, ScriptedTranslator};

fn units(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("Line {}", i + 1)).collect()
}

/// Completions arrive in reverse but results come back in submission order
#[tokio::test]
async fn test_dispatch_all_withReversedCompletion_shouldKeepSubmissionOrder() {
    common::init_test_logging();
    let input = units(12);
    let translator = ReverseDelayTranslator::new(input.len(), 5);

    let results = dispatch_all(&input, &translator, 12, &CancellationFlag::new(), |_, _| {}).await.unwrap();

    let texts: Vec<String> = results.into_iter().map(|r| r.outcome.unwrap()).collect();
    let expected: Vec<String> = input.iter().map(|u| ReverseDelayTranslator::render(u)).collect();
    assert_eq!(texts, expected);
}

/// In-flight calls never exceed the concurrency limit
#[tokio::test]
async fn test_dispatch_all_shouldRespectConcurrencyLimit() {
    let translator = MockTranslator::working().with_jitter(10);

    let results = dispatch_all(&units(40), &translator, 3, &CancellationFlag::new(), |_, _| {}).await.unwrap();

    assert_eq!(results.len(), 40);
    assert!(translator.peak_in_flight() <= 3);
    assert_eq!(translator.call_count(), 40);
}

/// A concurrency of zero is treated as one
#[tokio::test]
async fn test_dispatch_all_withZeroConcurrency_shouldStillRun() {
    let translator = MockTranslator::working();

    let results = dispatch_all(&units(3), &translator, 0, &CancellationFlag::new(), |_, _| {}).await.unwrap();

    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(translator.peak_in_flight(), 1);
}

/// Failures stay in their own slot and do not disturb neighbours
#[tokio::test]
async fn test_dispatch_all_withMixedOutcomes_shouldReportEachSlot() {
    let translator = ScriptedTranslator::new()
        .respond("Line 1", "第一行")
        .respond("Line 3", "第三行");

    let results = dispatch_all(&units(3), &translator, 2, &CancellationFlag::new(), |_, _| {}).await.unwrap();

    assert_eq!(results[0].outcome, Ok("第一行".to_string()));
    assert!(matches!(results[1].outcome, Err(TranslationError::Provider(_))));
    assert_eq!(results[2].outcome, Ok("第三行".to_string()));
    assert_eq!(translator.received().len(), 3);
}

/// Progress counts completions up to the total
#[tokio::test]
async fn test_dispatch_all_shouldReportMonotonicProgress() {
    let translator = MockTranslator::working().with_jitter(5);
    let last = AtomicUsize::new(0);

    dispatch_all(&units(20), &translator, 4, &CancellationFlag::new(), |done, total| {
        assert_eq!(total, 20);
        let previous = last.swap(done, Ordering::SeqCst);
        assert_eq!(done, previous + 1);
    }).await.unwrap();

    assert_eq!(last.load(Ordering::SeqCst), 20);
}

/// Cancellation raised by a running call stops the dispatch without waiting for it
#[tokio::test]
async fn test_dispatch_all_whenCancelledByTranslator_shouldStopPromptly() {
    let cancel = CancellationFlag::new();
    let translator = CancellingTranslator::new(cancel.clone(), 3);

    let started = Instant::now();
    let result = dispatch_all(&units(100), &translator, 2, &cancel, |_, _| {}).await;

    assert_eq!(result, Err(TranslationError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(translator.call_count() < 100);
}

/// The flag can be awaited and checked from any clone
#[test]
fn test_cancellation_flag_shouldBeSharedBetweenClones() {
    let flag = CancellationFlag::new();
    let other = flag.clone();
    assert!(flag.check().is_ok());

    other.cancel();

    assert!(flag.is_cancelled());
    assert_eq!(flag.check(), Err(TranslationError::Cancelled));
    tokio_test::block_on(flag.cancelled());
}
