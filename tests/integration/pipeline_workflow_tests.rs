/*!
 * End-to-end tests for the per-file pipeline
 */

use anyhow::Result;
use parking_lot::Mutex;
use std::sync::Arc;

use subrelay::errors::{AppError, TranslationError};
use subrelay::providers::mock::MockTranslator;
use subrelay::subtitle_processor::{SubtitleCollection, TextEncoding};
use subrelay::translation::batch;
use subrelay::translation::{
    CancellationFlag, PipelineDriver, PipelineOptions, PipelineStage, PipelineWarning, ProgressObserver,
};
use crate::common;
use crate::common::mock_translators::{CancellingTranslator, ReverseDelayTranslator, ScriptedTranslator};

/// Records everything the pipeline reports
#[derive(Default)]
struct RecordingObserver {
    percents: Mutex<Vec<u8>>,
    messages: Mutex<Vec<String>>,
}

impl ProgressObserver for RecordingObserver {
    fn on_progress(&self, percent: u8) {
        self.percents.lock().push(percent);
    }

    fn on_status(&self, message: &str) {
        self.messages.lock().push(message.to_string());
    }
}

fn read_entries(path: &std::path::Path) -> Result<Vec<String>> {
    let collection = SubtitleCollection::read_srt_file(path, TextEncoding::Utf8, "zh")?;
    Ok(collection.entries.into_iter().map(|e| e.text).collect())
}

/// Two entries in one batch translate cleanly into the final file
#[tokio::test]
async fn test_pipeline_withHiBye_shouldWriteTranslatedDocument() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "movie.srt", common::HI_BYE_SRT)?;
    let translator = MockTranslator::working()
        .with_translation("Hi", "你好")
        .with_translation("Bye", "再见");
    let calls = translator.clone();

    let mut driver = PipelineDriver::new(Arc::new(translator), PipelineOptions::default());
    let report = driver.run(&input, temp_dir.path()).await?;

    let written = std::fs::read_to_string(temp_dir.path().join("movie zh.srt"))?;
    assert_eq!(
        written,
        "1\n00:00:01,000 --> 00:00:02,000\n你好\n\n2\n00:00:03,000 --> 00:00:04,000\n再见\n\n"
    );
    assert_eq!(calls.calls(), vec!["Hi\n\n\nBye\n\n\n".to_string()]);
    assert_eq!(report.entry_count, 2);
    assert_eq!(report.batch_count, 1);
    assert_eq!(report.repair_candidates, 0);
    assert!(report.warnings.is_empty());
    Ok(())
}

/// A batch that comes back merged falls back to per-entry repair
#[tokio::test]
async fn test_pipeline_withMergedBatch_shouldRepairEntriesIndividually() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "movie.srt", common::HI_BYE_SRT)?;
    let translator = Arc::new(
        ScriptedTranslator::new()
            .respond("Hi\n\n\nBye\n\n\n", "你好 再见")
            .respond("Hi", "你好")
            .respond("Bye", "再见"),
    );

    let mut driver = PipelineDriver::new(translator.clone(), PipelineOptions::default());
    let report = driver.run(&input, temp_dir.path()).await?;

    assert_eq!(read_entries(&report.output_path)?, vec!["你好", "再见"]);
    assert_eq!(report.repair_candidates, 2);
    assert_eq!(report.repaired, 2);
    assert!(report.is_clean());
    assert!(matches!(
        report.warnings.as_slice(),
        [PipelineWarning::BatchFallback { batch_index: 0, first_seq: 1, last_seq: 2, .. }]
    ));
    assert_eq!(translator.received().len(), 3);
    Ok(())
}

/// Entries echoed on the batch call are translated by the individual repair call
#[tokio::test]
async fn test_pipeline_withEchoedEntryInBatch_shouldRepairOnlyThatEntry() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let content = "1\n00:00:01,000 --> 00:00:02,000\nHi\n\n\
                   2\n00:00:03,000 --> 00:00:04,000\nHi\n\n\
                   3\n00:00:05,000 --> 00:00:06,500\nBye\n\n";
    let input = common::create_test_file(temp_dir.path(), "movie.srt", content)?;
    let translator = Arc::new(
        ScriptedTranslator::new()
            .respond("Hi\n\n\nHi\n\n\nBye\n\n\n", "Salut\n\n\nSalut\n\n\nBye\n\n\n")
            .respond("Bye", "Au revoir"),
    );

    let mut driver = PipelineDriver::new(translator.clone(), PipelineOptions::default());
    let report = driver.run(&input, temp_dir.path()).await?;

    let written = std::fs::read_to_string(&report.output_path)?;
    assert_eq!(
        written,
        "1\n00:00:01,000 --> 00:00:02,000\nSalut\n\n\
         2\n00:00:03,000 --> 00:00:04,000\nSalut\n\n\
         3\n00:00:05,000 --> 00:00:06,500\nAu revoir\n\n"
    );
    assert_eq!(report.repair_candidates, 1);
    assert!(report.warnings.is_empty());
    assert_eq!(translator.received().last().map(String::as_str), Some("Bye"));
    Ok(())
}

/// Batches finishing in reverse order still produce a document in source order
#[tokio::test]
async fn test_pipeline_withReversedCompletion_shouldPreserveDocumentOrder() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "long.srt", &common::numbered_srt(150))?;
    let options = PipelineOptions { max_chars_per_batch: 200, batch_concurrency: 10, ..PipelineOptions::default() };
    let batch_count = batch::pack(&common::numbered_entries(150), options.max_chars_per_batch).len();
    let translator = ReverseDelayTranslator::new(batch_count, 2);

    let mut driver = PipelineDriver::new(Arc::new(translator), options);
    let report = driver.run(&input, temp_dir.path()).await?;

    let expected: Vec<String> = common::numbered_entries(150)
        .iter()
        .map(|e| ReverseDelayTranslator::render(&e.text))
        .collect();
    assert_eq!(report.batch_count, batch_count);
    assert!(batch_count > 10);
    assert_eq!(read_entries(&report.output_path)?, expected);
    assert_eq!(report.repair_candidates, 0);
    Ok(())
}

/// Entries the backend refuses to change end up as warnings, not errors
#[tokio::test]
async fn test_pipeline_withEchoingBackend_shouldReportExhaustedEntries() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let content = "1\n00:00:01,000 --> 00:00:02,000\nHi\n\n2\n00:00:03,000 --> 00:00:04,000\n♪ ♪\n\n";
    let input = common::create_test_file(temp_dir.path(), "movie.srt", content)?;
    let translator = MockTranslator::echo();
    let calls = translator.clone();

    let mut driver = PipelineDriver::new(Arc::new(translator), PipelineOptions::default());
    let report = driver.run(&input, temp_dir.path()).await?;

    assert!(!report.is_clean());
    assert_eq!(
        report.warnings,
        vec![PipelineWarning::RepairExhausted { seq_num: 1, text: "Hi".to_string() }]
    );
    assert_eq!(read_entries(&report.output_path)?, vec!["Hi", "♪ ♪"]);
    // One batch call plus one call per repair round
    assert_eq!(calls.call_count(), 1 + PipelineOptions::default().repair.rounds);
    Ok(())
}

/// An echoed entry with a space-only line inside is still caught and reported
#[tokio::test]
async fn test_pipeline_withEchoedSpaceOnlyLine_shouldFlagEntry() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let content = "1\n00:00:01,000 --> 00:00:02,000\nHi\n \nthere\n\n\
                   2\n00:00:03,000 --> 00:00:04,000\nBye\n\n";
    let input = common::create_test_file(temp_dir.path(), "movie.srt", content)?;

    let mut driver = PipelineDriver::new(Arc::new(MockTranslator::echo()), PipelineOptions::default());
    let report = driver.run(&input, temp_dir.path()).await?;

    assert_eq!(report.repair_candidates, 2);
    assert_eq!(
        report.warnings,
        vec![
            PipelineWarning::RepairExhausted { seq_num: 1, text: "Hi\n \nthere".to_string() },
            PipelineWarning::RepairExhausted { seq_num: 2, text: "Bye".to_string() },
        ]
    );
    assert_eq!(read_entries(&report.output_path)?, vec!["Hi\n \nthere", "Bye"]);
    Ok(())
}

/// A failing backend still yields a complete document in the source language
#[tokio::test]
async fn test_pipeline_withFailingBackend_shouldFallBackToSource() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "movie.srt", common::HI_BYE_SRT)?;

    let mut driver = PipelineDriver::new(Arc::new(MockTranslator::failing()), PipelineOptions::default());
    let report = driver.run(&input, temp_dir.path()).await?;

    assert_eq!(read_entries(&report.output_path)?, vec!["Hi", "Bye"]);
    let exhausted = report.warnings.iter()
        .filter(|w| matches!(w, PipelineWarning::RepairExhausted { .. }))
        .count();
    assert_eq!(exhausted, 2);
    assert_eq!(report.warnings.len(), 3);
    Ok(())
}

/// Cancellation mid-translation fails the run and leaves no output behind
#[tokio::test]
async fn test_pipeline_whenCancelledDuringTranslation_shouldStopWithoutOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "movie.srt", &common::numbered_srt(60))?;
    let cancel = CancellationFlag::new();
    let translator = CancellingTranslator::new(cancel.clone(), 2);
    let options = PipelineOptions { max_chars_per_batch: 50, batch_concurrency: 1, ..PipelineOptions::default() };

    let mut driver = PipelineDriver::new(Arc::new(translator), options).with_cancellation(cancel);
    let result = driver.run(&input, temp_dir.path()).await;

    assert!(matches!(result, Err(AppError::Translation(TranslationError::Cancelled))));
    assert_eq!(driver.stage(), PipelineStage::Failed);
    assert!(!temp_dir.path().join("movie zh.srt").exists());
    assert!(!temp_dir.path().join("movie.m.srt").exists());
    Ok(())
}

/// Progress runs from 0 to 100 and stage messages reach the observer
#[tokio::test]
async fn test_pipeline_shouldReportProgressToObserver() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "movie.srt", &common::numbered_srt(40))?;
    let observer = Arc::new(RecordingObserver::default());
    let options = PipelineOptions { max_chars_per_batch: 100, ..PipelineOptions::default() };

    let mut driver = PipelineDriver::new(Arc::new(MockTranslator::working()), options)
        .with_observer(observer.clone());
    driver.run(&input, temp_dir.path()).await?;

    let percents = observer.percents.lock().clone();
    assert_eq!(percents.first(), Some(&0));
    assert_eq!(percents.last(), Some(&100));
    let messages = observer.messages.lock().clone();
    assert!(messages.iter().any(|m| m.starts_with("Parsed 40 entries")));
    assert!(messages.iter().any(|m| m.starts_with("Wrote ")));
    Ok(())
}

/// UTF-16 input is decoded and the output is written as UTF-8
#[tokio::test]
async fn test_pipeline_withUtf16Input_shouldDecode() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut bytes = vec![0xFF, 0xFE];
    for unit in common::HI_BYE_SRT.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let input = temp_dir.path().join("movie.srt");
    std::fs::write(&input, bytes)?;
    let options = PipelineOptions { encoding: TextEncoding::Utf16Le, ..PipelineOptions::default() };

    let mut driver = PipelineDriver::new(Arc::new(MockTranslator::working()), options);
    let report = driver.run(&input, temp_dir.path()).await?;

    assert_eq!(
        read_entries(&report.output_path)?,
        vec![MockTranslator::render("Hi"), MockTranslator::render("Bye")]
    );
    Ok(())
}

/// Verification decodes the source with the run's encoding before comparing
#[tokio::test]
async fn test_pipeline_withUtf16InputEchoed_shouldFlagAgainstDecodedSource() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let mut bytes = vec![0xFF, 0xFE];
    for unit in common::HI_BYE_SRT.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let input = temp_dir.path().join("movie.srt");
    std::fs::write(&input, bytes)?;
    let options = PipelineOptions { encoding: TextEncoding::Utf16Le, ..PipelineOptions::default() };

    let mut driver = PipelineDriver::new(Arc::new(MockTranslator::echo()), options);
    let report = driver.run(&input, temp_dir.path()).await?;

    assert_eq!(report.repair_candidates, 2);
    let exhausted: Vec<usize> = report.warnings.iter()
        .filter_map(|w| match w {
            PipelineWarning::RepairExhausted { seq_num, .. } => Some(*seq_num),
            _ => None,
        })
        .collect();
    assert_eq!(exhausted, vec![1, 2]);
    assert_eq!(read_entries(&report.output_path)?, vec!["Hi", "Bye"]);
    Ok(())
}
