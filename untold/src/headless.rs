//! Line-oriented front end.
//!
//! Plain lines are words offered to the story; lines starting with `#` are
//! commands. Output lines are tagged so scripts can follow along:
//! `[STORY]`, `[KEY]`, `[STATUS]`, `[EXPORTED]`, `[ERROR]`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use untold_core::{
    Completion, FailureKind, GenerationError, Mood, Rejected, SessionController, Status,
    DEFAULT_EXPORT_FILE,
};

const HELP: &str = "\
  <word>          - Continue the story with a word (only the first word is used)
  #key <value>    - Save your Gemini API key and start a new story
  #mood <mood>    - Set the mood: dreamy, dark or motivational
  #reset          - Start the story over
  #export [path]  - Write the story to a file
  #status         - Show the session as JSON
  #help           - Show this help
  #quit           - Exit";

/// One parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Word(String),
    Key(String),
    Mood(String),
    Reset,
    Export(Option<PathBuf>),
    Status,
    Help,
    Quit,
    Unknown(String),
}

impl Input {
    /// Parse a line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let Some(command) = line.strip_prefix('#') else {
            return Some(Input::Word(line.to_string()));
        };

        let (name, rest) = match command.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (command, ""),
        };

        Some(match name {
            "key" => Input::Key(rest.to_string()),
            "mood" => Input::Mood(rest.to_string()),
            "reset" => Input::Reset,
            "export" if rest.is_empty() => Input::Export(None),
            "export" => Input::Export(Some(PathBuf::from(rest))),
            "status" => Input::Status,
            "help" => Input::Help,
            "quit" | "exit" => Input::Quit,
            other => Input::Unknown(other.to_string()),
        })
    }
}

/// Whether to keep reading input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// A session plus the mood applied to the next word.
pub struct Headless {
    session: SessionController,
    mood: Mood,
}

impl Headless {
    pub fn new(session: SessionController, mood: Mood) -> Self {
        Self { session, mood }
    }

    pub fn mood(&self) -> Mood {
        self.mood
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    /// Start the session and report how it came up.
    pub async fn start(&mut self, out: &mut impl Write) -> Result<(), Box<dyn std::error::Error>> {
        match self.session.start().await? {
            Some(completion) => report(&self.session, &completion, out)?,
            None => prompt_for_key(out)?,
        }
        Ok(())
    }

    /// Carry out one input line.
    pub async fn handle(&mut self, input: Input, out: &mut impl Write) -> io::Result<Flow> {
        match input {
            Input::Word(word) => {
                let result = self.session.submit_word(&word, self.mood).await;
                self.report_result(result, out)?;
            }
            Input::Key(value) => {
                let result = self.session.save_credential(&value).await;
                self.report_result(result, out)?;
            }
            Input::Mood(name) => match name.parse::<Mood>() {
                Ok(mood) => {
                    self.mood = mood;
                    writeln!(out, "[MOOD] {mood}")?;
                }
                Err(e) => writeln!(out, "[ERROR] {e}")?,
            },
            Input::Reset => match self.session.reset().await {
                Ok(Some(completion)) => report(&self.session, &completion, out)?,
                Ok(None) => writeln!(out, "[STORY] (empty)")?,
                Err(e) => writeln!(out, "[ERROR] {e}")?,
            },
            Input::Export(path) => {
                let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE));
                match self.session.transcript().export_text() {
                    Ok(text) => match tokio::fs::write(&path, text).await {
                        Ok(()) => writeln!(out, "[EXPORTED] {}", path.display())?,
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "export failed");
                            writeln!(out, "[ERROR] Could not write {}: {e}", path.display())?;
                        }
                    },
                    Err(e) => writeln!(out, "[ERROR] {e}")?,
                }
            }
            Input::Status => {
                let snapshot = serde_json::to_string_pretty(&self.session.snapshot())
                    .map_err(io::Error::other)?;
                writeln!(out, "[STATUS] mood: {}", self.mood)?;
                writeln!(out, "{snapshot}")?;
            }
            Input::Help => {
                writeln!(out, "[HELP]")?;
                writeln!(out, "{HELP}")?;
            }
            Input::Quit => {
                writeln!(out, "Goodbye!")?;
                return Ok(Flow::Quit);
            }
            Input::Unknown(name) => {
                writeln!(out, "[ERROR] Unknown command #{name}. Type #help for help.")?;
            }
        }
        out.flush()?;
        Ok(Flow::Continue)
    }

    fn report_result(
        &self,
        result: Result<Completion, Rejected>,
        out: &mut impl Write,
    ) -> io::Result<()> {
        match result {
            Ok(completion) => report(&self.session, &completion, out),
            Err(Rejected::NotReady) => prompt_for_key(out),
            Err(e) => writeln!(out, "[ERROR] {e}"),
        }
    }
}

fn report(
    session: &SessionController,
    completion: &Completion,
    out: &mut impl Write,
) -> io::Result<()> {
    match completion {
        Completion::Appended(sentence) => writeln!(out, "[STORY] {sentence}"),
        Completion::Failed(error) => {
            writeln!(out, "[ERROR] {}", describe(error))?;
            if session.status() == Status::NeedsKey {
                prompt_for_key(out)?;
            }
            Ok(())
        }
        Completion::Discarded => Ok(()),
    }
}

fn prompt_for_key(out: &mut impl Write) -> io::Result<()> {
    writeln!(
        out,
        "[KEY] A Gemini API key is needed. Enter it with: #key <your key>"
    )
}

/// User-facing wording for a failure.
fn describe(error: &GenerationError) -> String {
    match error.kind {
        FailureKind::CredentialInvalid => {
            format!("Your API key was not accepted ({})", error.detail)
        }
        FailureKind::ServiceError => {
            format!("The storyteller could not be reached, try again ({})", error.detail)
        }
        FailureKind::MalformedResponse => {
            format!("The storyteller answered oddly, try again ({})", error.detail)
        }
        FailureKind::InvariantViolation => format!("Internal error: {}", error.detail),
    }
}

/// Run the session against stdin and stdout until `#quit` or end of input.
pub async fn run_headless(mut headless: Headless) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    writeln!(stdout, "=== Untold ===")?;
    writeln!(stdout, "Offer one word at a time and the story grows by a sentence.")?;
    writeln!(stdout, "Mood: {}", headless.mood())?;
    writeln!(stdout)?;
    writeln!(stdout, "Commands:")?;
    writeln!(stdout, "{HELP}")?;
    writeln!(stdout)?;

    headless.start(&mut stdout).await?;
    stdout.flush()?;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                eprintln!("Error reading input: {e}");
                break;
            }
        };

        let Some(input) = Input::parse(&line) else {
            continue;
        };
        if headless.handle(input, &mut stdout).await? == Flow::Quit {
            break;
        }
    }

    headless.session().dispose();
    Ok(())
}
