//! Existing-file skip/overwrite policy for one run.
//!
//! The policy is a three-state machine (`Fresh`, `SkipAll`, `OverwriteAll`).
//! The transition itself is the pure function [`transition`]; the
//! [`ExistingFilePolicy`] object wraps the current state behind one mutex and
//! asks an [`ExistingFilePrompt`] only while the state is still `Fresh` and
//! the file already exists. Once a blanket answer is given the prompt is
//! never consulted again for the rest of the run. Prompts block, so they run
//! on tokio's blocking pool and a pending question never holds up cancellation.

use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};

/// Run-scoped policy state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyState {
    /// No blanket decision yet.
    #[default]
    Fresh,
    /// Every existing file is skipped.
    SkipAll,
    /// Every existing file is overwritten.
    OverwriteAll,
}

/// The four legal answers to "file exists, what now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingFileAnswer {
    /// Skip this file only.
    SkipOnce,
    /// Overwrite this file only.
    OverwriteOnce,
    /// Skip this and every later existing file.
    SkipAll,
    /// Overwrite this and every later existing file.
    OverwriteAll,
}

impl ExistingFileAnswer {
    /// Parses a prompt reply (`s`, `o`, `sa`, `oa` or their long forms).
    #[must_use]
    pub fn parse(reply: &str) -> Option<Self> {
        match reply.trim().to_ascii_lowercase().as_str() {
            "s" | "skip" => Some(Self::SkipOnce),
            "o" | "overwrite" => Some(Self::OverwriteOnce),
            "sa" | "skip-all" | "skip all" => Some(Self::SkipAll),
            "oa" | "overwrite-all" | "overwrite all" => Some(Self::OverwriteAll),
            _ => None,
        }
    }
}

/// Decision returned for one target path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileDecision {
    /// Leave the file alone; no network call.
    Skip,
    /// Proceed with the download (resuming if a partial file is present).
    Overwrite,
}

/// Applies an answer to a state.
///
/// Blanket answers move to their terminal state; once-answers leave the
/// state unchanged. Terminal states ignore the answer entirely.
#[must_use]
pub fn transition(state: PolicyState, answer: ExistingFileAnswer) -> (PolicyState, FileDecision) {
    match state {
        PolicyState::SkipAll => (state, FileDecision::Skip),
        PolicyState::OverwriteAll => (state, FileDecision::Overwrite),
        PolicyState::Fresh => match answer {
            ExistingFileAnswer::SkipOnce => (state, FileDecision::Skip),
            ExistingFileAnswer::OverwriteOnce => (state, FileDecision::Overwrite),
            ExistingFileAnswer::SkipAll => (PolicyState::SkipAll, FileDecision::Skip),
            ExistingFileAnswer::OverwriteAll => {
                (PolicyState::OverwriteAll, FileDecision::Overwrite)
            }
        },
    }
}

/// Boundary collaborator that answers for an existing file.
pub trait ExistingFilePrompt: Send {
    /// Returns the answer for `path`, whose current size is `existing_bytes`.
    fn ask(&mut self, path: &Path, existing_bytes: u64) -> ExistingFileAnswer;
}

/// Prompt that always returns the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub ExistingFileAnswer);

impl ExistingFilePrompt for FixedAnswer {
    fn ask(&mut self, _path: &Path, _existing_bytes: u64) -> ExistingFileAnswer {
        self.0
    }
}

/// Line-oriented prompt over any reader/writer pair.
///
/// Works for an interactive terminal as well as for a piped script of
/// answers. Invalid replies are asked again; end of input answers
/// [`ExistingFileAnswer::SkipOnce`] so nothing is overwritten unattended.
pub struct LinePrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead + Send, W: Write + Send> LinePrompt<R, W> {
    /// Wraps a reader for replies and a writer for the question.
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead + Send, W: Write + Send> ExistingFilePrompt for LinePrompt<R, W> {
    #[allow(clippy::cast_precision_loss)]
    fn ask(&mut self, path: &Path, existing_bytes: u64) -> ExistingFileAnswer {
        let size_mb = existing_bytes as f64 / (1024.0 * 1024.0);
        loop {
            let _ = write!(
                self.output,
                "\n{} already exists ({size_mb:.2} MB).\n  [s] skip  [o] overwrite  [sa] skip all  [oa] overwrite all\nChoice: ",
                path.display()
            );
            let _ = self.output.flush();

            let mut reply = String::new();
            match self.input.read_line(&mut reply) {
                Ok(0) | Err(_) => {
                    warn!(path = %path.display(), "No answer available; skipping existing file");
                    return ExistingFileAnswer::SkipOnce;
                }
                Ok(_) => {}
            }
            if let Some(answer) = ExistingFileAnswer::parse(&reply) {
                return answer;
            }
            let _ = writeln!(self.output, "Invalid option. Use s, o, sa or oa.");
        }
    }
}

/// Session-scoped existing-file policy.
///
/// Shared by reference; the single mutex guards both the state and the
/// prompt, so even concurrent callers can never be asked twice after a
/// blanket answer.
pub struct ExistingFilePolicy {
    inner: Arc<Mutex<PolicyInner>>,
}

struct PolicyInner {
    state: PolicyState,
    prompt: Box<dyn ExistingFilePrompt>,
}

impl ExistingFilePolicy {
    /// Creates a policy in the `Fresh` state that asks `prompt`.
    #[must_use]
    pub fn new(prompt: Box<dyn ExistingFilePrompt>) -> Self {
        Self::with_state(PolicyState::Fresh, prompt)
    }

    /// Creates a policy already in `state`.
    #[must_use]
    pub fn with_state(state: PolicyState, prompt: Box<dyn ExistingFilePrompt>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(PolicyInner { state, prompt })),
        }
    }

    /// Policy that overwrites (resumes) every existing file without asking.
    #[must_use]
    pub fn overwrite_all() -> Self {
        Self::with_state(
            PolicyState::OverwriteAll,
            Box::new(FixedAnswer(ExistingFileAnswer::OverwriteAll)),
        )
    }

    /// Policy that keeps every existing file without asking.
    #[must_use]
    pub fn skip_all() -> Self {
        Self::with_state(
            PolicyState::SkipAll,
            Box::new(FixedAnswer(ExistingFileAnswer::SkipAll)),
        )
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PolicyState {
        lock(&self.inner).state
    }

    /// Decides what to do with `path`.
    ///
    /// The prompt runs on tokio's blocking pool. Dropping this future (for
    /// example when a Ctrl-C wins a `select!`) abandons an unanswered prompt
    /// instead of stalling the runtime thread on stdin.
    pub async fn decide(&self, path: &Path) -> FileDecision {
        if let Some(decision) = blanket(self.state()) {
            return decision;
        }
        // Nothing to preserve.
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return FileDecision::Overwrite;
        };

        let inner = Arc::clone(&self.inner);
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || ask_locked(&inner, &owned, metadata.len()))
            .await
            .unwrap_or_else(|err| {
                warn!(path = %path.display(), error = %err, "Existing-file prompt failed; keeping the file");
                FileDecision::Skip
            })
    }
}

fn blanket(state: PolicyState) -> Option<FileDecision> {
    match state {
        PolicyState::SkipAll => Some(FileDecision::Skip),
        PolicyState::OverwriteAll => Some(FileDecision::Overwrite),
        PolicyState::Fresh => None,
    }
}

fn ask_locked(inner: &Mutex<PolicyInner>, path: &Path, existing_bytes: u64) -> FileDecision {
    let mut inner = lock(inner);
    // A blanket answer may have arrived while this caller waited for the lock.
    if let Some(decision) = blanket(inner.state) {
        return decision;
    }
    let answer = inner.prompt.ask(path, existing_bytes);
    let (next, decision) = transition(inner.state, answer);
    if next != inner.state {
        info!(from = ?inner.state, to = ?next, "Existing-file policy set for the rest of the run");
    }
    inner.state = next;
    debug!(path = %path.display(), ?answer, ?decision, "Existing file decision");
    decision
}

fn lock(inner: &Mutex<PolicyInner>) -> MutexGuard<'_, PolicyInner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl std::fmt::Debug for ExistingFilePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExistingFilePolicy")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
