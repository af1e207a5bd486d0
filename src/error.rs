use std::fmt;

use thiserror::Error;

use crate::llm::LlmError;

/// The five pipeline stages, named after their CLI subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    GenerateScript,
    GenerateCode,
    GenerateAudio,
    RenderVideo,
    CreateFinalVideo,
}

impl Stage {
    pub fn command_name(self) -> &'static str {
        match self {
            Stage::GenerateScript => "generate-script",
            Stage::GenerateCode => "generate-manim-code",
            Stage::GenerateAudio => "generate-audio",
            Stage::RenderVideo => "render-video",
            Stage::CreateFinalVideo => "create-final-video",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command_name())
    }
}

/// Run-aborting errors. Per-scene failures never show up here; they are
/// collected in a `StageSummary` instead.
#[derive(Error, Debug)]
pub enum EuiError {
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("input too long: {0}")]
    InputTooLong(String),

    #[error("missing credential: set {0} in the environment or a .env file")]
    MissingApiKey(String),

    #[error("malformed script: {0}")]
    MalformedScript(String),

    #[error("malformed code document: {0}")]
    MalformedCode(String),

    #[error("LLM error: {0}")]
    Llm(LlmError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("final assembly failed: {0}")]
    Assembly(String),

    #[error("IO error at {path}: {source}")]
    Path {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<LlmError> for EuiError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::InputTooLong(msg) => EuiError::InputTooLong(msg),
            other => EuiError::Llm(other),
        }
    }
}

impl EuiError {
    /// Attach the offending path to an IO error.
    pub fn at(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        EuiError::Path {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, EuiError>;

/// A fatal error tagged with the stage that raised it.
#[derive(Error, Debug)]
#[error("stage '{stage}' failed: {source}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub source: EuiError,
}

impl StageFailure {
    pub fn new(stage: Stage, source: EuiError) -> Self {
        Self { stage, source }
    }
}
