//! Pipeline configuration: an optional TOML file layered over defaults, plus
//! the LLM credential read once from the environment.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EuiError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub llm: LlmConfig,
    pub codegen: CodegenConfig,
    pub tts: TtsConfig,
    pub render: RenderConfig,
    pub stitch: StitchConfig,
}

impl PipelineConfig {
    /// Load from `path`, or fall back to defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let data = fs::read_to_string(path).map_err(|e| EuiError::at(path, e))?;
        let config: PipelineConfig = toml::from_str(&data)
            .map_err(|e| EuiError::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Read the LLM API key from the configured environment variable.
    pub fn api_key(&self) -> Result<String> {
        match std::env::var(&self.llm.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(EuiError::MissingApiKey(self.llm.api_key_env.clone())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the Gemini REST API.
    pub endpoint: String,
    pub model: String,
    /// Model used for repair attempts; `None` reuses `model`.
    pub retry_model: Option<String>,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Topics longer than this are rejected before any request is made.
    pub max_topic_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-2.5-pro".to_string(),
            retry_model: None,
            temperature: 0.7,
            timeout_secs: 300,
            api_key_env: "GOOGLE_API_KEY".to_string(),
            max_topic_chars: 2_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CodegenConfig {
    /// Total generation attempts per scene, including the first.
    pub max_attempts: u32,
    /// Static checker; the snippet path is appended as the last argument.
    pub checker: Vec<String>,
    /// Optional `Class: Name` / `  Method: ...` dump used as repair context.
    pub class_reference: Option<PathBuf>,
    /// Replaces the embedded common-errors document.
    pub common_errors: Option<PathBuf>,
    /// Replaces the embedded script guidelines document.
    pub video_guidelines: Option<PathBuf>,
}

impl Default for CodegenConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            checker: vec!["python3".into(), "-m".into(), "py_compile".into()],
            class_reference: None,
            common_errors: None,
            video_guidelines: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TtsEngine {
    #[default]
    Piper,
    Command,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    pub engine: TtsEngine,
    pub piper_program: String,
    pub piper_model: String,
    /// Argument vector for the command engine; `{text}` and `{output}` are
    /// substituted per scene.
    pub command: Vec<String>,
    pub ffmpeg: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            engine: TtsEngine::Piper,
            piper_program: "piper".to_string(),
            piper_model: "./tts/en_US-hfc_male-medium.onnx".to_string(),
            command: vec![
                "uv".into(),
                "run".into(),
                "chatterbox/cli_tty.py".into(),
                "{text}".into(),
                "{output}".into(),
            ],
            ffmpeg: "ffmpeg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub manim_program: String,
    pub extra_args: Vec<String>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            manim_program: "manim".to_string(),
            extra_args: vec!["-r".into(), "1080,1920".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    pub ffmpeg: String,
    pub ffprobe: String,
    pub crf: u32,
    /// Final videos longer than this are sped up to fit; `None` disables.
    pub max_total_seconds: Option<f64>,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            crf: 23,
            max_total_seconds: Some(60.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_path_gives_defaults() {
        let config = PipelineConfig::load(None).unwrap();
        assert_eq!(config.codegen.max_attempts, 3);
        assert_eq!(config.llm.api_key_env, "GOOGLE_API_KEY");
        assert_eq!(config.tts.engine, TtsEngine::Piper);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eui.toml");
        fs::write(
            &path,
            r#"
[codegen]
max_attempts = 5
checker = ["pyright"]

[tts]
engine = "command"

[stitch]
crf = 18
"#,
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.codegen.max_attempts, 5);
        assert_eq!(config.codegen.checker, vec!["pyright".to_string()]);
        assert_eq!(config.tts.engine, TtsEngine::Command);
        assert_eq!(config.stitch.crf, 18);
        assert_eq!(config.stitch.max_total_seconds, Some(60.0));
        assert_eq!(config.render.manim_program, "manim");
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("eui.toml");
        fs::write(&path, "[codegen\nmax_attempts = ").unwrap();
        let err = PipelineConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, EuiError::Config(_)));
    }

    #[test]
    fn unset_key_variable_is_missing_credential() {
        let mut config = PipelineConfig::default();
        config.llm.api_key_env = "EUI_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        let err = config.api_key().unwrap_err();
        assert!(matches!(err, EuiError::MissingApiKey(name) if name == "EUI_TEST_KEY_THAT_IS_NEVER_SET"));
    }
}
