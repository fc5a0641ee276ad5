//! Coder agent interface: the orchestrator's sole external collaborator for
//! producing and revising generated source.
//!
//! The planner/architect/reviewer agents, project-context gathering, and
//! the language-model transport itself are out of scope here — the
//! orchestrator only ever sees `coder(input) -> Result<Changes, CoderError>`
//! and knows nothing about how that call reaches a model.

use std::path::PathBuf;

use depforge_types::PipelineError;

/// One file the coder produced or revised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedFile {
    pub path: PathBuf,
    pub content: String,
}

/// The request handed to the coder: the original task description plus,
/// on retry, the previous attempt's feedback string from C10.
#[derive(Debug, Clone)]
pub struct CoderInput {
    pub task: String,
    pub feedback: Option<String>,
}

impl CoderInput {
    pub fn initial(task: impl Into<String>) -> Self {
        Self { task: task.into(), feedback: None }
    }

    pub fn retry(task: impl Into<String>, feedback: impl Into<String>) -> Self {
        Self { task: task.into(), feedback: Some(feedback.into()) }
    }
}

/// The coder's output: the set of files it produced or revised for this
/// attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changes {
    pub files: Vec<GeneratedFile>,
}

/// Opaque error from the coder's transport. The orchestrator treats any
/// `Err` as fatal to the current task's import-repair loop; it never
/// inspects the error's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoderError(pub String);

impl std::fmt::Display for CoderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CoderError {}

impl From<CoderError> for PipelineError {
    fn from(error: CoderError) -> Self {
        PipelineError::Coder(error.0)
    }
}

/// The language-model-backed code generator. Implemented externally to this
/// crate (structured generation over an OpenAI-compatible chat endpoint);
/// tests substitute a scripted fake.
pub trait CoderAgent {
    fn generate(&mut self, input: CoderInput) -> Result<Changes, CoderError>;
}
