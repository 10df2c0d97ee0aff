//! Talking to the sentence generator.
//!
//! A [`Generator`] turns one [`GenerationRequest`] into one sentence. It never
//! returns a transport error directly: every failure is folded into a
//! [`GenerationError`] whose [`FailureKind`] tells the session how to recover.

mod google;
pub mod prompt;

pub use google::GeminiGenerator;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Word used for the opening sentence of every story.
pub const SEED_WORD: &str = "once upon a time";

/// Mood used for the opening sentence of every story.
pub const SEED_MOOD: Mood = Mood::Dreamy;

/// Atmosphere the next sentence should carry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    #[default]
    Dreamy,
    Dark,
    Motivational,
}

impl Mood {
    pub const ALL: [Mood; 3] = [Mood::Dreamy, Mood::Dark, Mood::Motivational];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Dreamy => "Dreamy",
            Mood::Dark => "Dark",
            Mood::Motivational => "Motivational",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown mood '{0}' (expected dreamy, dark or motivational)")]
pub struct ParseMoodError(String);

impl FromStr for Mood {
    type Err = ParseMoodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|mood| mood.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseMoodError(s.to_string()))
    }
}

/// First whitespace-delimited token of `input`, or `None` if it is blank.
pub fn first_token(input: &str) -> Option<&str> {
    input.split_whitespace().next()
}

/// One call's worth of input to a [`Generator`].
#[derive(Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    word: String,
    story_context: String,
    mood: Mood,
    credential: Option<String>,
}

impl GenerationRequest {
    /// Build a request for a user-offered word.
    ///
    /// Only the first token of `word` is kept. Returns `None` for a blank word.
    pub fn new(
        word: &str,
        story_context: impl Into<String>,
        mood: Mood,
        credential: Option<String>,
    ) -> Option<Self> {
        let word = first_token(word)?;
        Some(Self {
            word: word.to_string(),
            story_context: story_context.into(),
            mood,
            credential,
        })
    }

    /// The opening request: sentinel word, empty context, fixed mood.
    pub fn seed(credential: Option<String>) -> Self {
        Self {
            word: SEED_WORD.to_string(),
            story_context: String::new(),
            mood: SEED_MOOD,
            credential,
        }
    }

    pub fn word(&self) -> &str {
        &self.word
    }

    pub fn story_context(&self) -> &str {
        &self.story_context
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn credential(&self) -> Option<&str> {
        self.credential.as_deref()
    }

    /// Whether this is the sentinel opening request.
    pub fn is_seed(&self) -> bool {
        self.word == SEED_WORD && self.story_context.is_empty()
    }
}

impl fmt::Debug for GenerationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationRequest")
            .field("word", &self.word)
            .field("story_context", &self.story_context)
            .field("mood", &self.mood)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Why a generation did not produce a sentence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// No key available, or the service rejected it.
    CredentialInvalid,
    /// Transport or remote failure unrelated to the key.
    ServiceError,
    /// The service answered with something other than one sentence.
    MalformedResponse,
    /// A broken internal invariant. Indicates a bug.
    InvariantViolation,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::CredentialInvalid => "credential invalid",
            FailureKind::ServiceError => "service error",
            FailureKind::MalformedResponse => "malformed response",
            FailureKind::InvariantViolation => "invariant violation",
        })
    }
}

/// A classified generation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {detail}")]
pub struct GenerationError {
    pub kind: FailureKind,
    pub detail: String,
}

impl GenerationError {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn credential_invalid(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::CredentialInvalid, detail)
    }

    pub fn service(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ServiceError, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedResponse, detail)
    }

    pub fn invariant(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::InvariantViolation, detail)
    }

    /// Classify a transport or service failure by its message.
    pub fn from_failure_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::new(classify_failure(&message), message)
    }
}

/// Either the generated sentence (trimmed, non-empty) or why there is none.
pub type GenerationOutcome = Result<String, GenerationError>;

/// Decide whether a failure message means the key is bad.
///
/// This is a text heuristic: the service reports rejected keys with messages
/// such as "API key not valid" or the reason code `API_KEY_INVALID`. Anything
/// else is treated as a retryable service error.
pub fn classify_failure(message: &str) -> FailureKind {
    let message = message.to_lowercase();
    if message.contains("api key") || message.contains("api_key") {
        FailureKind::CredentialInvalid
    } else {
        FailureKind::ServiceError
    }
}

#[derive(Deserialize)]
struct SentencePayload {
    sentence: String,
}

/// Validate a raw model reply against `{"sentence": string}`.
pub fn parse_sentence(raw: &str) -> GenerationOutcome {
    let payload: SentencePayload = serde_json::from_str(raw.trim())
        .map_err(|e| GenerationError::malformed(format!("expected {{\"sentence\": string}}: {e}")))?;

    let sentence = payload.sentence.trim();
    if sentence.is_empty() {
        return Err(GenerationError::malformed("service returned an empty sentence"));
    }
    Ok(sentence.to_string())
}

/// Something that can write the next sentence of a story.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce one sentence for `request`. Expected failures come back classified.
    async fn generate(&self, request: &GenerationRequest) -> GenerationOutcome;
}
