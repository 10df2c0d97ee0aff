//! Testing utilities for story sessions.
//!
//! This module provides tools for integration testing:
//! - `MockGenerator` for deterministic sessions without API calls
//! - `MemoryCredentialStore` for a credential slot that never touches disk
//! - Assertion helpers for verifying session state

use crate::credential::{CredentialStore, CredentialStoreError};
use crate::generation::{FailureKind, GenerationError, GenerationOutcome, GenerationRequest, Generator};
use crate::session::{SessionController, Status};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

/// Sentence returned once the script runs out.
pub const FALLBACK_SENTENCE: &str = "The story went quietly on.";

/// A scripted reply from the mock generator.
#[derive(Debug, Clone)]
pub enum MockReply {
    Sentence(String),
    Failure(GenerationError),
}

impl MockReply {
    /// Reply with a sentence, passed through as-is.
    pub fn sentence(text: impl Into<String>) -> Self {
        MockReply::Sentence(text.into())
    }

    /// Reply with a classified failure.
    pub fn failure(kind: FailureKind, detail: impl Into<String>) -> Self {
        MockReply::Failure(GenerationError::new(kind, detail))
    }

    fn into_outcome(self) -> GenerationOutcome {
        match self {
            MockReply::Sentence(text) => Ok(text),
            MockReply::Failure(error) => Err(error),
        }
    }
}

/// A generator that returns scripted replies in order.
///
/// Each call takes the next reply at the moment it is made, then waits while
/// the generator is held. Holding lets a test observe the session with a
/// request in flight.
pub struct MockGenerator {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<GenerationRequest>>,
    calls: watch::Sender<usize>,
    held: watch::Sender<bool>,
    outstanding: AtomicUsize,
    peak_outstanding: AtomicUsize,
}

/// Counts a call as outstanding until it returns or is dropped.
struct Outstanding<'a>(&'a AtomicUsize);

impl Drop for Outstanding<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockGenerator {
    /// Create a mock generator with scripted replies.
    pub fn new(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: watch::Sender::new(0),
            held: watch::Sender::new(false),
            outstanding: AtomicUsize::new(0),
            peak_outstanding: AtomicUsize::new(0),
        }
    }

    /// Queue another reply.
    pub fn push(&self, reply: MockReply) {
        self.replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(reply);
    }

    /// Every request received so far, in call order.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Calls started but not yet returned or dropped.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// The most calls ever outstanding at once.
    pub fn peak_outstanding(&self) -> usize {
        self.peak_outstanding.load(Ordering::SeqCst)
    }

    /// Make subsequent and pending calls wait until [`release`](Self::release).
    pub fn hold(&self) {
        self.held.send_replace(true);
    }

    /// Let held calls complete.
    pub fn release(&self) {
        self.held.send_replace(false);
    }

    /// Wait until at least `count` calls have been made.
    pub async fn wait_for_requests(&self, count: usize) {
        let mut calls = self.calls.subscribe();
        let _ = calls.wait_for(|made| *made >= count).await;
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome {
        let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_outstanding.fetch_max(now, Ordering::SeqCst);
        let _outstanding = Outstanding(&self.outstanding);

        let reply = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| MockReply::sentence(FALLBACK_SENTENCE));

        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let mut held = self.held.subscribe();
        self.calls.send_modify(|made| *made += 1);
        let _ = held.wait_for(|held| !*held).await;

        reply.into_outcome()
    }
}

/// A credential slot kept in memory.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    value: Mutex<Option<String>>,
    sets: AtomicUsize,
    fail_writes: bool,
}

impl MemoryCredentialStore {
    /// An empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// A slot that already holds `value`.
    pub fn with_credential(value: impl Into<String>) -> Self {
        Self {
            value: Mutex::new(Some(value.into())),
            ..Self::default()
        }
    }

    /// An empty slot whose writes always fail.
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    /// How many times `set` has been called, successful or not.
    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Option<String> {
        self.value
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .filter(|value| !value.is_empty())
    }

    fn set(&self, value: &str) -> Result<(), CredentialStoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(CredentialStoreError::Io {
                path: PathBuf::from("<memory>"),
                source: io::Error::new(io::ErrorKind::PermissionDenied, "writes disabled"),
            });
        }
        *self.value.lock().unwrap_or_else(PoisonError::into_inner) = Some(value.to_string());
        Ok(())
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the session is in the given status.
#[track_caller]
pub fn assert_status(session: &SessionController, expected: Status) {
    let actual = session.status();
    assert_eq!(actual, expected, "Expected status {expected}, got {actual}");
}

/// Assert the transcript holds exactly these sentences.
#[track_caller]
pub fn assert_transcript(session: &SessionController, expected: &[&str]) {
    let transcript = session.transcript();
    assert_eq!(
        transcript.render(),
        expected,
        "Transcript does not match"
    );
}

/// Assert the last reported error has the given kind.
#[track_caller]
pub fn assert_last_error_kind(session: &SessionController, expected: FailureKind) {
    let last_error = session.snapshot().last_error;
    assert_eq!(
        last_error.as_ref().map(|e| e.kind),
        Some(expected),
        "Expected last error of kind {expected}, got {last_error:?}"
    );
}

/// Assert no error is being reported.
#[track_caller]
pub fn assert_no_error(session: &SessionController) {
    let last_error = session.snapshot().last_error;
    assert!(last_error.is_none(), "Expected no error, got {last_error:?}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::Mood;

    #[tokio::test]
    async fn test_mock_generator_follows_script() {
        let generator = MockGenerator::new(vec![
            MockReply::sentence("One."),
            MockReply::failure(FailureKind::ServiceError, "down"),
        ]);
        let request = GenerationRequest::seed(None);

        assert_eq!(generator.generate(&request).await, Ok("One.".to_string()));
        assert_eq!(
            generator.generate(&request).await.unwrap_err().kind,
            FailureKind::ServiceError
        );
        assert_eq!(
            generator.generate(&request).await,
            Ok(FALLBACK_SENTENCE.to_string())
        );
        assert_eq!(generator.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_pushed_replies_follow_script() {
        let generator = MockGenerator::new(vec![MockReply::sentence("First.")]);
        generator.push(MockReply::sentence("Second."));
        let request = GenerationRequest::seed(None);

        assert_eq!(generator.generate(&request).await, Ok("First.".to_string()));
        assert_eq!(generator.generate(&request).await, Ok("Second.".to_string()));
        assert_eq!(generator.outstanding(), 0);
        assert_eq!(generator.peak_outstanding(), 1);
    }

    #[tokio::test]
    async fn test_mock_generator_records_requests() {
        let generator = MockGenerator::new(vec![]);
        let request = GenerationRequest::new("tide", "Salt.", Mood::Dark, None).unwrap();
        generator.generate(&request).await.unwrap();

        assert_eq!(generator.requests(), vec![request]);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.get(), None);

        store.set("abc").unwrap();
        assert_eq!(store.get().as_deref(), Some("abc"));
        assert_eq!(store.set_count(), 1);

        store.set("").unwrap();
        assert_eq!(store.get(), None);
    }

    #[test]
    fn test_failing_store() {
        let store = MemoryCredentialStore::failing_writes();
        assert!(store.set("abc").is_err());
        assert_eq!(store.get(), None);
        assert_eq!(store.set_count(), 1);
    }
}
