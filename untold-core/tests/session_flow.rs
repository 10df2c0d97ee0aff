//! Scripted story sessions driven through the public API.
//!
//! These tests use `MockGenerator` and `MemoryCredentialStore`, so they run
//! without network access or API keys:
//! - Seeding on startup and after a key is saved
//! - Continuations, first-token truncation and story context
//! - Recovery from each failure kind
//! - Single-flight guarding, caller deadlines and stale-result handling

use std::sync::Arc;
use std::time::Duration;
use untold_core::generation::SEED_WORD;
use untold_core::testing::{
    assert_last_error_kind, assert_no_error, assert_status, assert_transcript,
};
use untold_core::{
    Completion, FailureKind, MemoryCredentialStore, MockGenerator, MockReply, Mood, Phase,
    Rejected, SessionController, Status,
};

struct Fixture {
    generator: Arc<MockGenerator>,
    store: Arc<MemoryCredentialStore>,
    session: Arc<SessionController>,
}

impl Fixture {
    fn new(store: MemoryCredentialStore, replies: Vec<MockReply>) -> Self {
        let generator = Arc::new(MockGenerator::new(replies));
        let store = Arc::new(store);
        let session = Arc::new(SessionController::new(generator.clone(), store.clone()));
        Self {
            generator,
            store,
            session,
        }
    }

    /// A session whose store already holds a key, started and seeded.
    async fn ready(replies: Vec<MockReply>) -> Self {
        let fixture = Self::new(MemoryCredentialStore::with_credential("stored-key"), replies);
        fixture.session.start().await.unwrap();
        fixture
    }
}

// =============================================================================
// SEEDING
// =============================================================================

#[tokio::test]
async fn test_saved_key_seeds_once() {
    let fixture = Fixture::new(
        MemoryCredentialStore::new(),
        vec![MockReply::sentence("The lighthouse blinked awake.")],
    );
    fixture.session.start().await.unwrap();
    assert_status(&fixture.session, Status::NeedsKey);

    let completion = fixture.session.save_credential("valid-key").await.unwrap();
    assert_eq!(
        completion,
        Completion::Appended("The lighthouse blinked awake.".to_string())
    );

    assert_status(&fixture.session, Status::Ready);
    assert_transcript(&fixture.session, &["The lighthouse blinked awake."]);
    assert_eq!(fixture.store.set_count(), 1);

    let requests = fixture.generator.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].word(), SEED_WORD);
    assert_eq!(requests[0].story_context(), "");
    assert_eq!(requests[0].mood(), Mood::Dreamy);
    assert_eq!(requests[0].credential(), Some("valid-key"));
}

#[tokio::test]
async fn test_empty_key_changes_nothing() {
    let fixture = Fixture::new(MemoryCredentialStore::new(), vec![]);
    fixture.session.start().await.unwrap();

    for value in ["", "   ", "\n"] {
        assert_eq!(
            fixture.session.save_credential(value).await,
            Err(Rejected::EmptyCredential)
        );
    }

    assert_status(&fixture.session, Status::NeedsKey);
    assert_eq!(fixture.store.set_count(), 0);
    assert!(fixture.generator.requests().is_empty());
}

#[tokio::test]
async fn test_seed_rejected_key_needs_new_key() {
    let fixture = Fixture::new(
        MemoryCredentialStore::with_credential("revoked"),
        vec![
            MockReply::failure(
                FailureKind::CredentialInvalid,
                "API key not valid. Please pass a valid API key.",
            ),
            MockReply::sentence("Fog rolled over the harbour."),
        ],
    );

    let completion = fixture.session.start().await.unwrap().unwrap();
    assert!(matches!(completion, Completion::Failed(ref e) if e.kind == FailureKind::CredentialInvalid));
    assert_status(&fixture.session, Status::NeedsKey);
    assert_transcript(&fixture.session, &[]);
    assert_last_error_kind(&fixture.session, FailureKind::CredentialInvalid);
    assert_eq!(
        fixture.session.snapshot().last_error.map(|e| e.phase),
        Some(Phase::Seed)
    );

    // A fresh key recovers the session.
    fixture.session.save_credential("fresh").await.unwrap();
    assert_status(&fixture.session, Status::Ready);
    assert_transcript(&fixture.session, &["Fog rolled over the harbour."]);
    assert_no_error(&fixture.session);
}

#[tokio::test]
async fn test_seed_malformed_keeps_ready() {
    let fixture = Fixture::ready(vec![MockReply::failure(
        FailureKind::MalformedResponse,
        "expected {\"sentence\": string}",
    )])
    .await;

    assert_status(&fixture.session, Status::Ready);
    assert_transcript(&fixture.session, &[]);
    assert_last_error_kind(&fixture.session, FailureKind::MalformedResponse);

    // Words still work without a seed sentence.
    fixture
        .session
        .submit_word("harbour", Mood::Dreamy)
        .await
        .unwrap();
    assert_transcript(&fixture.session, &[untold_core::testing::FALLBACK_SENTENCE]);
}

// =============================================================================
// CONTINUATIONS
// =============================================================================

#[tokio::test]
async fn test_transcript_grows_in_call_order() {
    let fixture = Fixture::ready(vec![
        MockReply::sentence("Seed."),
        MockReply::sentence("One."),
        MockReply::sentence("Two."),
        MockReply::sentence("Three."),
    ])
    .await;

    for word in ["one", "two", "three"] {
        fixture.session.submit_word(word, Mood::Dark).await.unwrap();
    }

    assert_transcript(&fixture.session, &["Seed.", "One.", "Two.", "Three."]);
    let words: Vec<String> = fixture
        .generator
        .requests()
        .iter()
        .skip(1)
        .map(|r| r.word().to_string())
        .collect();
    assert_eq!(words, ["one", "two", "three"]);
}

#[tokio::test]
async fn test_only_first_word_is_sent() {
    let fixture = Fixture::ready(vec![MockReply::sentence("Seed.")]).await;

    fixture
        .session
        .submit_word("hello world", Mood::Motivational)
        .await
        .unwrap();

    let requests = fixture.generator.requests();
    assert_eq!(requests[1].word(), "hello");
    assert_eq!(requests[1].mood(), Mood::Motivational);
    assert_eq!(requests[1].credential(), Some("stored-key"));
}

#[tokio::test]
async fn test_story_context_is_joined_with_spaces() {
    let fixture = Fixture::ready(vec![
        MockReply::sentence("A."),
        MockReply::sentence("B."),
        MockReply::sentence("C."),
    ])
    .await;

    fixture.session.submit_word("bee", Mood::Dark).await.unwrap();
    fixture.session.submit_word("sea", Mood::Dark).await.unwrap();

    let requests = fixture.generator.requests();
    assert_eq!(requests[1].story_context(), "A.");
    assert_eq!(requests[2].story_context(), "A. B.");
    assert_transcript(&fixture.session, &["A.", "B.", "C."]);
}

#[tokio::test]
async fn test_continuation_service_error_is_reported_only() {
    let fixture = Fixture::ready(vec![
        MockReply::sentence("Seed."),
        MockReply::failure(FailureKind::ServiceError, "Network error: connection reset"),
    ])
    .await;

    let completion = fixture.session.submit_word("storm", Mood::Dark).await.unwrap();
    assert!(matches!(completion, Completion::Failed(ref e) if e.kind == FailureKind::ServiceError));

    let snapshot = fixture.session.snapshot();
    assert_eq!(snapshot.status, Status::Ready);
    assert_eq!(snapshot.transcript, vec!["Seed.".to_string()]);
    assert!(!snapshot.in_flight);
    assert_eq!(snapshot.input_word.as_deref(), Some("storm"));
    assert_last_error_kind(&fixture.session, FailureKind::ServiceError);
}

#[tokio::test]
async fn test_words_before_key_are_refused() {
    let fixture = Fixture::new(MemoryCredentialStore::new(), vec![]);
    fixture.session.start().await.unwrap();

    assert_eq!(
        fixture.session.submit_word("early", Mood::Dark).await,
        Err(Rejected::NotReady)
    );
    assert!(fixture.generator.requests().is_empty());
    assert_no_error(&fixture.session);
}

// =============================================================================
// CONCURRENCY
// =============================================================================

#[tokio::test]
async fn test_second_word_while_in_flight_is_busy() {
    let fixture = Fixture::ready(vec![
        MockReply::sentence("Seed."),
        MockReply::sentence("Slow."),
    ])
    .await;

    fixture.generator.hold();
    let session = fixture.session.clone();
    let first = tokio::spawn(async move { session.submit_word("slow", Mood::Dark).await });
    fixture.generator.wait_for_requests(2).await;

    let snapshot = fixture.session.snapshot();
    assert!(snapshot.in_flight);
    assert_eq!(snapshot.input_word.as_deref(), Some("slow"));

    assert_eq!(
        fixture.session.submit_word("fast", Mood::Dark).await,
        Err(Rejected::Busy)
    );
    assert_eq!(fixture.generator.requests().len(), 2);
    assert_transcript(&fixture.session, &["Seed."]);

    fixture.generator.release();
    let completion = first.await.unwrap().unwrap();
    assert_eq!(completion, Completion::Appended("Slow.".to_string()));
    assert_transcript(&fixture.session, &["Seed.", "Slow."]);
    assert!(fixture.session.snapshot().input_word.is_none());
}

#[tokio::test]
async fn test_reset_while_in_flight_is_busy() {
    let fixture = Fixture::ready(vec![
        MockReply::sentence("Old story."),
        MockReply::sentence("Slow sentence."),
    ])
    .await;

    fixture.generator.hold();
    let session = fixture.session.clone();
    let continuation = tokio::spawn(async move { session.submit_word("slow", Mood::Dark).await });
    fixture.generator.wait_for_requests(2).await;

    assert_eq!(fixture.session.reset().await, Err(Rejected::Busy));
    assert_eq!(fixture.generator.requests().len(), 2);
    assert_transcript(&fixture.session, &["Old story."]);

    fixture.generator.release();
    assert_eq!(
        continuation.await.unwrap(),
        Ok(Completion::Appended("Slow sentence.".to_string()))
    );
    assert_eq!(fixture.generator.peak_outstanding(), 1);

    // Once the call settles, reset goes through.
    fixture.generator.push(MockReply::sentence("New story."));
    assert_eq!(
        fixture.session.reset().await,
        Ok(Some(Completion::Appended("New story.".to_string())))
    );
    assert_transcript(&fixture.session, &["New story."]);
}

#[tokio::test]
async fn test_new_key_while_in_flight_is_busy() {
    let fixture = Fixture::ready(vec![
        MockReply::sentence("Old story."),
        MockReply::sentence("Slow sentence."),
        MockReply::sentence("Second opening."),
    ])
    .await;

    fixture.generator.hold();
    let session = fixture.session.clone();
    let continuation = tokio::spawn(async move { session.submit_word("slow", Mood::Dark).await });
    fixture.generator.wait_for_requests(2).await;

    assert_eq!(
        fixture.session.save_credential("replacement").await,
        Err(Rejected::Busy)
    );
    assert_eq!(fixture.store.set_count(), 0);
    assert_eq!(fixture.generator.requests().len(), 2);

    fixture.generator.release();
    continuation.await.unwrap().unwrap();

    assert_eq!(
        fixture.session.save_credential("replacement").await,
        Ok(Completion::Appended("Second opening.".to_string()))
    );
    assert_transcript(&fixture.session, &["Second opening."]);
    assert_eq!(
        fixture.generator.requests()[2].credential(),
        Some("replacement")
    );
    assert_eq!(fixture.generator.peak_outstanding(), 1);
}

#[tokio::test]
async fn test_deadline_on_word_frees_session() {
    let fixture = Fixture::ready(vec![
        MockReply::sentence("Seed."),
        MockReply::sentence("Too late."),
        MockReply::sentence("In time."),
    ])
    .await;

    fixture.generator.hold();
    let attempt = tokio::time::timeout(
        Duration::from_millis(50),
        fixture.session.submit_word("slow", Mood::Dark),
    )
    .await;
    assert!(attempt.is_err());
    fixture.generator.release();

    let snapshot = fixture.session.snapshot();
    assert!(!snapshot.in_flight);
    assert_eq!(snapshot.status, Status::Ready);
    assert_eq!(snapshot.transcript, vec!["Seed.".to_string()]);
    assert_eq!(snapshot.input_word.as_deref(), Some("slow"));
    let last_error = snapshot.last_error.unwrap();
    assert_eq!(last_error.kind, FailureKind::ServiceError);
    assert_eq!(last_error.phase, Phase::Continuation);
    assert_eq!(fixture.generator.outstanding(), 0);

    let completion = fixture.session.submit_word("again", Mood::Dark).await.unwrap();
    assert_eq!(completion, Completion::Appended("In time.".to_string()));
    assert_no_error(&fixture.session);
    assert_eq!(fixture.generator.peak_outstanding(), 1);
}

#[tokio::test]
async fn test_deadline_on_seed_keeps_key() {
    let fixture = Fixture::new(
        MemoryCredentialStore::with_credential("stored-key"),
        vec![MockReply::sentence("Never seen.")],
    );

    fixture.generator.hold();
    let attempt = tokio::time::timeout(Duration::from_millis(50), fixture.session.start()).await;
    assert!(attempt.is_err());
    fixture.generator.release();

    assert_status(&fixture.session, Status::Ready);
    assert!(!fixture.session.is_in_flight());
    assert_last_error_kind(&fixture.session, FailureKind::ServiceError);
    assert_eq!(
        fixture.session.snapshot().last_error.map(|e| e.phase),
        Some(Phase::Seed)
    );

    // The story can be reseeded by hand.
    let completion = fixture.session.reset().await.unwrap();
    assert_eq!(
        completion,
        Some(Completion::Appended(untold_core::testing::FALLBACK_SENTENCE.to_string()))
    );
}

#[tokio::test]
async fn test_dispose_discards_outstanding_result() {
    let fixture = Fixture::ready(vec![
        MockReply::sentence("Seed."),
        MockReply::sentence("Never shown."),
    ])
    .await;

    fixture.generator.hold();
    let session = fixture.session.clone();
    let continuation = tokio::spawn(async move { session.submit_word("gone", Mood::Dark).await });
    fixture.generator.wait_for_requests(2).await;

    fixture.session.dispose();
    fixture.generator.release();

    assert_eq!(continuation.await.unwrap(), Ok(Completion::Discarded));
    assert_transcript(&fixture.session, &["Seed."]);
    assert!(!fixture.session.snapshot().in_flight);
    assert_eq!(
        fixture.session.submit_word("again", Mood::Dark).await,
        Err(Rejected::Disposed)
    );
}
