//! StorySession - the state machine behind a co-written story.
//!
//! [`SessionController`] owns the transcript and the current key, decides
//! when the opening sentence is generated, and allows at most one
//! generation in flight: words, resets and new keys are all refused with
//! [`Rejected::Busy`] until the outstanding call settles. Every result is
//! tagged with the session generation current at dispatch; a result that
//! arrives after the session was disposed is dropped.
//!
//! A caller may bound latency by dropping the returned future (for example
//! with `tokio::time::timeout`). The abandoned call is then reported as a
//! [`FailureKind::ServiceError`] and the session accepts new requests.
//!
//! All methods take `&self`, so a controller can be shared behind an `Arc`
//! between an input loop and whatever renders [`SessionController::snapshot`].

use crate::credential::CredentialStore;
use crate::generation::{FailureKind, GenerationError, GenerationRequest, Generator, Mood};
use crate::transcript::Transcript;
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use uuid::Uuid;

/// Whether the session can generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Status {
    /// Credential store not consulted yet.
    Loading,
    /// No usable key; the user must save one.
    NeedsKey,
    /// A key is held and sentences can be requested.
    Ready,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Loading => "loading",
            Status::NeedsKey => "needs key",
            Status::Ready => "ready",
        })
    }
}

/// Which kind of generation a result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Phase {
    /// The opening sentence, generated on entering [`Status::Ready`].
    Seed,
    /// A sentence for a user-offered word.
    Continuation,
}

/// The most recent failure, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportedError {
    pub phase: Phase,
    pub kind: FailureKind,
    pub detail: String,
}

impl ReportedError {
    fn new(phase: Phase, error: &GenerationError) -> Self {
        Self {
            phase,
            kind: error.kind,
            detail: error.detail.clone(),
        }
    }
}

/// Everything a front end needs to draw the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub status: Status,
    pub transcript: Vec<String>,
    pub in_flight: bool,
    pub last_error: Option<ReportedError>,
    /// The word awaiting a successful continuation, if any.
    pub input_word: Option<String>,
}

/// Why an inbound operation was not carried out. Nothing changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejected {
    #[error("A sentence is already being written")]
    Busy,

    #[error("Offer a single word")]
    EmptyWord,

    #[error("API key missing: save a key before continuing")]
    NotReady,

    #[error("API key is empty")]
    EmptyCredential,

    #[error("Session already started")]
    AlreadyStarted,

    #[error("Session has been closed")]
    Disposed,
}

/// What became of a dispatched generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The sentence was appended to the transcript.
    Appended(String),
    /// The generation failed; the error is also in `last_error`.
    Failed(GenerationError),
    /// The session moved on while the request ran; the result was dropped.
    Discarded,
}

#[derive(Debug)]
struct Session {
    status: Status,
    credential: Option<String>,
    transcript: Transcript,
    in_flight: bool,
    last_error: Option<ReportedError>,
    input_word: Option<String>,
    /// Bumped whenever outstanding results must no longer apply.
    generation: u64,
    disposed: bool,
}

impl Session {
    fn new() -> Self {
        Self {
            status: Status::Loading,
            credential: None,
            transcript: Transcript::new(),
            in_flight: false,
            last_error: None,
            input_word: None,
            generation: 0,
            disposed: false,
        }
    }

    /// Invalidate outstanding results and start an empty story.
    fn restart(&mut self) {
        self.generation += 1;
        self.transcript.reset();
        self.input_word = None;
        self.last_error = None;
    }

    fn dispatch(&mut self, phase: Phase) -> Ticket {
        self.in_flight = true;
        Ticket {
            phase,
            generation: self.generation,
        }
    }

    fn seed(&mut self) -> (Ticket, GenerationRequest) {
        let request = GenerationRequest::seed(self.credential.clone());
        (self.dispatch(Phase::Seed), request)
    }
}

#[derive(Debug, Clone, Copy)]
struct Ticket {
    phase: Phase,
    generation: u64,
}

/// Drives a single story session.
pub struct SessionController {
    id: Uuid,
    generator: Arc<dyn Generator>,
    store: Arc<dyn CredentialStore>,
    session: Mutex<Session>,
}

impl SessionController {
    /// Create a controller in [`Status::Loading`]. Call [`start`](Self::start) next.
    pub fn new(generator: Arc<dyn Generator>, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            id: Uuid::new_v4(),
            generator,
            store,
            session: Mutex::new(Session::new()),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Consult the credential store and leave [`Status::Loading`].
    ///
    /// With a stored key the session becomes ready and the opening sentence
    /// is generated; the returned completion is that seed's. Without one the
    /// session waits for [`save_credential`](Self::save_credential) and
    /// `None` is returned.
    pub async fn start(&self) -> Result<Option<Completion>, Rejected> {
        let (ticket, request) = {
            let mut session = self.lock();
            if session.disposed {
                return Err(Rejected::Disposed);
            }
            if session.status != Status::Loading {
                return Err(Rejected::AlreadyStarted);
            }

            match self.store.get().filter(|key| !key.is_empty()) {
                Some(key) => {
                    session.credential = Some(key);
                    session.status = Status::Ready;
                    tracing::info!(session = %self.id, "stored key found, session ready");
                    session.seed()
                }
                None => {
                    session.status = Status::NeedsKey;
                    tracing::info!(session = %self.id, "no stored key, waiting for one");
                    return Ok(None);
                }
            }
        };

        Ok(Some(self.run(ticket, request).await))
    }

    /// Save a new key, start a fresh story, and generate its opening sentence.
    ///
    /// A blank key is rejected without touching the store or the session, as
    /// is any key offered while a generation is running.
    pub async fn save_credential(&self, value: &str) -> Result<Completion, Rejected> {
        if value.trim().is_empty() {
            return Err(Rejected::EmptyCredential);
        }

        let (ticket, request) = {
            let mut session = self.lock();
            if session.disposed {
                return Err(Rejected::Disposed);
            }
            if session.in_flight {
                return Err(Rejected::Busy);
            }

            if let Err(e) = self.store.set(value) {
                tracing::warn!(session = %self.id, error = %e, "could not persist key, keeping it for this run only");
            }

            session.credential = Some(value.to_string());
            session.restart();
            session.status = Status::Ready;
            tracing::info!(session = %self.id, "key saved, starting a new story");
            session.seed()
        };

        Ok(self.run(ticket, request).await)
    }

    /// Ask for a sentence built around `word` (first token only) in `mood`.
    ///
    /// Rejected while another generation is running, for a blank word, or
    /// when the session is not ready.
    pub async fn submit_word(&self, word: &str, mood: Mood) -> Result<Completion, Rejected> {
        let (ticket, request) = {
            let mut session = self.lock();
            if session.disposed {
                return Err(Rejected::Disposed);
            }
            if session.in_flight {
                return Err(Rejected::Busy);
            }
            if session.status != Status::Ready {
                return Err(Rejected::NotReady);
            }

            let request = GenerationRequest::new(
                word,
                session.transcript.joined_context(),
                mood,
                session.credential.clone(),
            )
            .ok_or(Rejected::EmptyWord)?;

            session.input_word = Some(request.word().to_string());
            (session.dispatch(Phase::Continuation), request)
        };

        Ok(self.run(ticket, request).await)
    }

    /// Throw the story away. When ready, a new opening sentence is generated.
    ///
    /// Refused while a generation is running.
    pub async fn reset(&self) -> Result<Option<Completion>, Rejected> {
        let (ticket, request) = {
            let mut session = self.lock();
            if session.disposed {
                return Err(Rejected::Disposed);
            }
            if session.in_flight {
                return Err(Rejected::Busy);
            }

            session.restart();
            tracing::info!(session = %self.id, "story reset");
            if session.status != Status::Ready {
                return Ok(None);
            }
            session.seed()
        };

        Ok(Some(self.run(ticket, request).await))
    }

    /// Tear the session down. Results still in flight will be dropped.
    pub fn dispose(&self) {
        let mut session = self.lock();
        if !session.disposed {
            session.disposed = true;
            session.generation += 1;
            session.in_flight = false;
            tracing::info!(session = %self.id, "session disposed");
        }
    }

    /// Current observable state.
    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.lock();
        SessionSnapshot {
            session_id: self.id,
            status: session.status,
            transcript: session.transcript.render().to_vec(),
            in_flight: session.in_flight,
            last_error: session.last_error.clone(),
            input_word: session.input_word.clone(),
        }
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    /// A copy of the transcript.
    pub fn transcript(&self) -> Transcript {
        self.lock().transcript.clone()
    }

    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight
    }

    pub fn is_disposed(&self) -> bool {
        self.lock().disposed
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Call the generator and apply its result if the ticket is still current.
    async fn run(&self, ticket: Ticket, request: GenerationRequest) -> Completion {
        tracing::debug!(
            session = %self.id,
            generation = ticket.generation,
            phase = ?ticket.phase,
            word = request.word(),
            mood = %request.mood(),
            "dispatching generation"
        );

        let pending = Pending {
            controller: self,
            ticket,
            armed: true,
        };
        let outcome = self.generator.generate(&request).await;
        pending.disarm();

        let mut session = self.lock();
        if session.disposed || session.generation != ticket.generation {
            tracing::warn!(
                session = %self.id,
                generation = ticket.generation,
                current = session.generation,
                "dropping result from a superseded generation"
            );
            return Completion::Discarded;
        }
        session.in_flight = false;

        let error = match outcome {
            Ok(sentence) => match session.transcript.append(sentence.clone()) {
                Ok(()) => {
                    if ticket.phase == Phase::Continuation {
                        session.input_word = None;
                    }
                    session.last_error = None;
                    tracing::debug!(
                        session = %self.id,
                        sentences = session.transcript.len(),
                        "sentence appended"
                    );
                    return Completion::Appended(sentence);
                }
                Err(e) => GenerationError::invariant(e.to_string()),
            },
            Err(error) => error,
        };

        if ticket.phase == Phase::Seed && error.kind == FailureKind::CredentialInvalid {
            session.status = Status::NeedsKey;
            tracing::warn!(session = %self.id, detail = %error.detail, "opening sentence rejected the key, asking for a new one");
        } else {
            tracing::warn!(
                session = %self.id,
                phase = ?ticket.phase,
                kind = ?error.kind,
                detail = %error.detail,
                "generation failed"
            );
        }

        session.last_error = Some(ReportedError::new(ticket.phase, &error));
        Completion::Failed(error)
    }
}

/// Settles the session if a dispatched call is dropped before it returns.
struct Pending<'a> {
    controller: &'a SessionController,
    ticket: Ticket,
    armed: bool,
}

impl Pending<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        let mut session = self.controller.lock();
        if session.disposed || session.generation != self.ticket.generation {
            return;
        }
        session.in_flight = false;

        let error = GenerationError::service("request abandoned before the service answered");
        tracing::warn!(
            session = %self.controller.id,
            generation = self.ticket.generation,
            phase = ?self.ticket.phase,
            "generation abandoned by the caller"
        );
        session.last_error = Some(ReportedError::new(self.ticket.phase, &error));
    }
}
