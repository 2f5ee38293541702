/*!
 * Tests for the application controller
 */

use anyhow::Result;
use std::sync::Arc;

use subrelay::app_config::Config;
use subrelay::app_controller::{Controller, RunOutcome, ISSUES_LOG_FILE};
use subrelay::providers::mock::MockTranslator;
use subrelay::translation::CancellationFlag;
use crate::common;

fn controller(translator: MockTranslator) -> Controller {
    Controller::with_translator(Config::default(), Arc::new(translator))
}

/// A single file is translated, then skipped unless overwriting is forced
#[tokio::test]
async fn test_run_withExistingOutput_shouldSkipUnlessForced() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_subtitle(temp_dir.path(), "episode.srt")?;
    let translator = MockTranslator::working();
    let calls = translator.clone();
    let controller = controller(translator);

    let first = controller.run(input.clone(), temp_dir.path().to_path_buf(), false).await?;
    let RunOutcome::Translated(report) = first else { panic!("expected a translation") };
    assert_eq!(report.output_path, temp_dir.path().join("episode zh.srt"));
    let calls_after_first = calls.call_count();

    let second = controller.run(input.clone(), temp_dir.path().to_path_buf(), false).await?;
    assert_eq!(second, RunOutcome::Skipped(temp_dir.path().join("episode zh.srt")));
    assert_eq!(calls.call_count(), calls_after_first);

    let third = controller.run(input, temp_dir.path().to_path_buf(), true).await?;
    assert!(matches!(third, RunOutcome::Translated(_)));
    Ok(())
}

/// A missing input is an error
#[tokio::test]
async fn test_run_withMissingInput_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = controller(MockTranslator::working());

    let result = controller.run(temp_dir.path().join("nope.srt"), temp_dir.path().to_path_buf(), false).await;

    assert!(result.is_err());
    Ok(())
}

/// Untranslatable entries are appended to the issues log beside the output
#[tokio::test]
async fn test_run_withExhaustedEntries_shouldWriteIssuesLog() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "movie.srt", common::HI_BYE_SRT)?;
    let controller = controller(MockTranslator::echo());

    controller.run(input, temp_dir.path().to_path_buf(), false).await?;

    let log = std::fs::read_to_string(temp_dir.path().join(ISSUES_LOG_FILE))?;
    assert!(log.contains("movie.srt (2 warnings)"));
    assert!(log.contains("Entry 1 left untranslated: \"Hi\""));
    assert!(log.contains("Entry 2 left untranslated: \"Bye\""));
    Ok(())
}

/// A clean run does not create an issues log
#[tokio::test]
async fn test_run_withCleanTranslation_shouldNotWriteIssuesLog() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "movie.srt", common::HI_BYE_SRT)?;

    controller(MockTranslator::working()).run(input, temp_dir.path().to_path_buf(), false).await?;

    assert!(!temp_dir.path().join(ISSUES_LOG_FILE).exists());
    Ok(())
}

/// Folder mode translates inputs in place and leaves generated files alone
#[tokio::test]
async fn test_run_folder_shouldSkipGeneratedFilesAndCountOutcomes() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let season = temp_dir.path().join("season1");
    std::fs::create_dir_all(&season)?;
    common::create_test_file(temp_dir.path(), "a.srt", common::HI_BYE_SRT)?;
    common::create_test_file(&season, "b.srt", &common::numbered_srt(5))?;
    common::create_test_file(temp_dir.path(), "broken.srt", "no subtitles here")?;
    common::create_test_file(temp_dir.path(), "a.m.srt", common::HI_BYE_SRT)?;
    common::create_test_file(temp_dir.path(), "lecture.m.srt", common::HI_BYE_SRT)?;
    let translator = MockTranslator::working();
    let calls = translator.clone();
    let controller = controller(translator);

    let summary = controller.run_folder(temp_dir.path().to_path_buf(), false).await?;

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 0);
    assert!(temp_dir.path().join("a zh.srt").exists());
    assert!(season.join("b zh.srt").exists());
    // No sibling lecture.srt, so this is a real input
    assert!(temp_dir.path().join("lecture.m zh.srt").exists());
    assert!(!temp_dir.path().join("a.m zh.srt").exists());
    assert!(calls.calls().iter().all(|text| !text.is_empty()));

    let rerun = controller.run_folder(temp_dir.path().to_path_buf(), false).await?;
    assert_eq!(rerun.skipped, 3);
    assert_eq!(rerun.processed, 0);
    assert_eq!(rerun.failed, 1);
    Ok(())
}

/// A directory without inputs is an error
#[tokio::test]
async fn test_run_folder_withNoSubtitles_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    common::create_test_file(temp_dir.path(), "notes.txt", "hello")?;

    let result = controller(MockTranslator::working()).run_folder(temp_dir.path().to_path_buf(), false).await;

    assert!(result.is_err());
    Ok(())
}

/// A raised flag stops folder processing before any file is translated
#[tokio::test]
async fn test_run_folder_whenCancelled_shouldStop() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    common::create_test_file(temp_dir.path(), "a.srt", common::HI_BYE_SRT)?;
    let cancel = CancellationFlag::new();
    cancel.cancel();
    let translator = MockTranslator::working();
    let calls = translator.clone();
    let controller = controller(translator).with_cancellation(cancel);

    let result = controller.run_folder(temp_dir.path().to_path_buf(), false).await;

    assert!(result.is_err());
    assert_eq!(calls.call_count(), 0);
    assert!(!temp_dir.path().join("a zh.srt").exists());
    Ok(())
}

/// The in-process translator always answers a connection test
#[tokio::test]
async fn test_test_connection_withMock_shouldSucceed() {
    assert!(controller(MockTranslator::working()).test_connection().await.is_ok());
}
