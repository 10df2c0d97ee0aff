//! Co-write a story with Gemini, one word at a time.
//!
//! This crate provides:
//! - A session state machine that seeds, continues and resets a story
//! - Durable storage for the user's API key
//! - A Gemini-backed sentence generator behind a swappable trait
//! - Mocks and assertion helpers for testing front ends
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use untold_core::{Config, FileCredentialStore, GeminiGenerator, Mood, SessionController};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let session = SessionController::new(
//!         Arc::new(GeminiGenerator::from_config(&config)),
//!         Arc::new(FileCredentialStore::new()?),
//!     );
//!
//!     session.start().await?;
//!     session.submit_word("lantern", Mood::Dark).await?;
//!     println!("{}", session.transcript().export_text()?);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod credential;
pub mod generation;
pub mod session;
pub mod testing;
pub mod transcript;

// Primary public API
pub use config::{Config, ConfigError};
pub use credential::{CredentialStore, CredentialStoreError, FileCredentialStore};
pub use generation::{
    FailureKind, GeminiGenerator, GenerationError, GenerationOutcome, GenerationRequest,
    Generator, Mood,
};
pub use session::{
    Completion, Phase, Rejected, ReportedError, SessionController, SessionSnapshot, Status,
};
pub use testing::{MemoryCredentialStore, MockGenerator, MockReply};
pub use transcript::{ExportError, Transcript};

/// File name offered when exporting a story.
pub const DEFAULT_EXPORT_FILE: &str = "the-story-you-never-wrote.txt";
