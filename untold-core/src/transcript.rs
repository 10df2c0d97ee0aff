//! The story so far.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Appending an empty sentence. Indicates a bug upstream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("Refusing to append an empty sentence")]
    EmptySentence,
}

/// Errors from exporting the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    #[error("Nothing to export: the story is empty")]
    Empty,
}

/// Ordered, append-only sequence of generated sentences.
///
/// Sentences are never reordered or edited; the only way to shrink the
/// transcript is [`Transcript::reset`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    sentences: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sentence to the end of the story.
    pub fn append(&mut self, sentence: impl Into<String>) -> Result<(), TranscriptError> {
        let sentence = sentence.into();
        if sentence.trim().is_empty() {
            return Err(TranscriptError::EmptySentence);
        }
        self.sentences.push(sentence);
        Ok(())
    }

    /// Drop every sentence.
    pub fn reset(&mut self) {
        self.sentences.clear();
    }

    /// Read-only view of the sentences in narrative order.
    pub fn render(&self) -> &[String] {
        &self.sentences
    }

    /// The story so far as fed back to the model: sentences joined by one space.
    pub fn joined_context(&self) -> String {
        self.sentences.join(" ")
    }

    /// Plain-text export: one sentence per paragraph.
    pub fn export_text(&self) -> Result<String, ExportError> {
        if self.sentences.is_empty() {
            return Err(ExportError::Empty);
        }
        Ok(self.sentences.join("\n\n"))
    }

    pub fn len(&self) -> usize {
        self.sentences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sentences.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut transcript = Transcript::new();
        transcript.append("A.").unwrap();
        transcript.append("B.").unwrap();
        transcript.append("C.").unwrap();

        assert_eq!(transcript.render(), ["A.", "B.", "C."]);
        assert_eq!(transcript.len(), 3);
    }

    #[test]
    fn test_joined_context() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.joined_context(), "");

        transcript.append("A.").unwrap();
        transcript.append("B.").unwrap();
        assert_eq!(transcript.joined_context(), "A. B.");
    }

    #[test]
    fn test_empty_sentence_rejected() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.append(""), Err(TranscriptError::EmptySentence));
        assert_eq!(transcript.append("  \n"), Err(TranscriptError::EmptySentence));
        assert!(transcript.is_empty());
    }

    #[test]
    fn test_reset() {
        let mut transcript = Transcript::new();
        transcript.append("A.").unwrap();
        transcript.reset();
        assert!(transcript.is_empty());
        assert_eq!(transcript.joined_context(), "");
    }

    #[test]
    fn test_export_text() {
        let mut transcript = Transcript::new();
        assert_eq!(transcript.export_text(), Err(ExportError::Empty));

        transcript.append("The fog lifted.").unwrap();
        transcript.append("Nobody was there.").unwrap();
        assert_eq!(
            transcript.export_text().unwrap(),
            "The fog lifted.\n\nNobody was there."
        );
    }

    #[test]
    fn test_serializes_as_list() {
        let mut transcript = Transcript::new();
        transcript.append("A.").unwrap();
        assert_eq!(serde_json::to_string(&transcript).unwrap(), r#"["A."]"#);
    }
}
