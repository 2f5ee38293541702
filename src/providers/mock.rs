/*!
 * Mock translator implementations for testing.
 *
 * This module provides an in-process translator that simulates different backend behaviors:
 * - `MockTranslator::working()` - Translates every piece of a packed batch
 * - `MockTranslator::echo()` - Returns the input unchanged
 * - `MockTranslator::failing()` - Always fails with a transient error
 * - `MockTranslator::merging()` - Swallows delimiters so batches fail to split
 *
 * Every call is recorded so tests can assert on what reached the backend and how
 * many calls were in flight at once.
 */

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::errors::{ProviderError, TranslationError};
use crate::translation::batch::ENTRY_DELIMITER;
use crate::translation::core::Translator;

/// Behavior mode for the mock translator
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a translation of every piece
    Working,
    /// Returns the input unchanged
    Echo,
    /// Returns the input unchanged for the first `calls` calls, then works
    EchoFirst { calls: usize },
    /// Fails the first `failures` calls, then works
    FailFirst { failures: usize },
    /// Always fails with a server error
    Failing,
    /// Joins the first two pieces of a batch, losing a delimiter
    MergePieces,
}

/// Mock translator for testing dispatch, reassembly and repair
#[derive(Debug, Clone)]
pub struct MockTranslator {
    /// Behavior mode
    behavior: MockBehavior,
    /// Fixed translations per piece, consulted before the default rendering
    mapping: HashMap<String, String>,
    /// Upper bound of the random delay added to every call
    max_delay_ms: u64,
    /// Texts received, in arrival order
    calls: Arc<Mutex<Vec<String>>>,
    /// Calls currently running
    in_flight: Arc<AtomicUsize>,
    /// Highest number of calls seen running at once
    peak_in_flight: Arc<AtomicUsize>,
}

impl MockTranslator {
    /// Create a new mock translator with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            mapping: HashMap::new(),
            max_delay_ms: 0,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a working mock translator that always succeeds
    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    /// Create a mock translator that returns its input
    pub fn echo() -> Self {
        Self::new(MockBehavior::Echo)
    }

    /// Create a failing mock translator that always errors
    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    /// Create a mock translator that merges the first two pieces of every batch
    pub fn merging() -> Self {
        Self::new(MockBehavior::MergePieces)
    }

    /// Add a fixed translation for one piece
    pub fn with_translation(mut self, source: impl Into<String>, translated: impl Into<String>) -> Self {
        self.mapping.insert(source.into(), translated.into());
        self
    }

    /// Delay every call by a random 0..=max_delay_ms so completions arrive out of order
    pub fn with_jitter(mut self, max_delay_ms: u64) -> Self {
        self.max_delay_ms = max_delay_ms;
        self
    }

    /// Texts received so far, in arrival order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Number of calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of simultaneous calls observed
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Default rendering of a translated piece
    pub fn render(piece: &str) -> String {
        format!("[译] {}", piece)
    }

    fn translate_piece(&self, piece: &str, echo: bool) -> String {
        match self.mapping.get(piece) {
            Some(translated) => translated.clone(),
            None if echo || piece.is_empty() => piece.to_string(),
            None => Self::render(piece),
        }
    }

    fn translate_pieces(&self, text: &str, echo: bool) -> String {
        text.split(ENTRY_DELIMITER)
            .map(|piece| self.translate_piece(piece, echo))
            .collect::<Vec<_>>()
            .join(ENTRY_DELIMITER)
    }

    fn respond(&self, text: &str, call_index: usize) -> Result<String, TranslationError> {
        match self.behavior {
            MockBehavior::Working => Ok(self.translate_pieces(text, false)),
            MockBehavior::Echo => Ok(self.translate_pieces(text, true)),
            MockBehavior::EchoFirst { calls } => Ok(self.translate_pieces(text, call_index < calls)),
            MockBehavior::FailFirst { failures } if call_index < failures => {
                Err(ProviderError::ApiError {
                    status_code: 503,
                    message: format!("Simulated failure (request #{})", call_index + 1),
                }.into())
            }
            MockBehavior::FailFirst { .. } => Ok(self.translate_pieces(text, false)),
            MockBehavior::Failing => Err(ProviderError::ApiError {
                status_code: 500,
                message: "Simulated provider failure".to_string(),
            }.into()),
            MockBehavior::MergePieces => {
                let translated = self.translate_pieces(text, false);
                Ok(translated.replacen(ENTRY_DELIMITER, " ", 1))
            }
        }
    }

    fn delay(&self) -> Duration {
        if self.max_delay_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=self.max_delay_ms))
    }
}

#[async_trait]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str) -> Result<String, TranslationError> {
        let call_index = {
            let mut calls = self.calls.lock();
            calls.push(text.to_string());
            calls.len() - 1
        };

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        let delay = self.delay();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.respond(text, call_index);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> String {
        "Mock".to_string()
    }
}
