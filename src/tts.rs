use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, error};

use crate::audio::wav_duration_seconds;
use crate::config::{TtsConfig, TtsEngine};
use crate::process::run_tool;

#[derive(Debug, Error)]
pub enum TtsError {
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' failed with {status}: {output}")]
    Failed {
        program: String,
        status: String,
        output: String,
    },

    #[error("synthesised audio is empty")]
    EmptyAudio,

    #[error("engine finished but {0} was not written")]
    NoOutput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesise `text` into an MP3 file at `output`.
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), TtsError>;
}

/// Build the engine selected in the configuration.
pub fn from_config(config: &TtsConfig) -> Box<dyn SpeechSynthesizer> {
    match config.engine {
        TtsEngine::Piper => Box::new(PiperSynthesizer {
            program: config.piper_program.clone(),
            model: config.piper_model.clone(),
            ffmpeg: config.ffmpeg.clone(),
        }),
        TtsEngine::Command => Box::new(CommandSynthesizer {
            command: config.command.clone(),
        }),
    }
}

async fn run_checked(program: &str, args: &[String], stdin: Option<&str>) -> Result<(), TtsError> {
    let out = run_tool(program, args, None, stdin)
        .await
        .map_err(|source| TtsError::Spawn {
            program: program.to_string(),
            source,
        })?;
    if !out.success {
        error!("{} failed with {}", program, out.status_text());
        return Err(TtsError::Failed {
            program: program.to_string(),
            status: out.status_text(),
            output: out.combined(),
        });
    }
    Ok(())
}

/// Piper reads text on stdin and writes WAV; ffmpeg then encodes the MP3.
pub struct PiperSynthesizer {
    program: String,
    model: String,
    ffmpeg: String,
}

#[async_trait]
impl SpeechSynthesizer for PiperSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), TtsError> {
        let tmp = tempfile::tempdir()?;
        let wav = tmp.path().join("speech.wav");
        let wav_str = wav.display().to_string();

        let piper_args = vec![
            "--model".to_string(),
            self.model.clone(),
            "--output_file".to_string(),
            wav_str.clone(),
        ];
        run_checked(&self.program, &piper_args, Some(text)).await?;

        let seconds = wav_duration_seconds(&wav_str).map_err(|_| TtsError::NoOutput(wav_str.clone()))?;
        if seconds <= 0.0 {
            return Err(TtsError::EmptyAudio);
        }
        debug!("Piper produced {:.2}s of audio", seconds);

        let ffmpeg_args = vec![
            "-y".to_string(),
            "-i".to_string(),
            wav_str,
            "-codec:a".to_string(),
            "libmp3lame".to_string(),
            "-q:a".to_string(),
            "2".to_string(),
            output.display().to_string(),
        ];
        run_checked(&self.ffmpeg, &ffmpeg_args, None).await
    }
}

/// Any CLI that takes the text and output path as arguments, e.g.
/// `uv run chatterbox/cli_tty.py {text} {output}`.
pub struct CommandSynthesizer {
    command: Vec<String>,
}

impl CommandSynthesizer {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }

    fn argv(&self, text: &str, output: &Path) -> Vec<String> {
        let out = output.display().to_string();
        self.command
            .iter()
            .map(|arg| arg.replace("{text}", text).replace("{output}", &out))
            .collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    async fn synthesize(&self, text: &str, output: &Path) -> Result<(), TtsError> {
        let argv = self.argv(text, output);
        let Some((program, args)) = argv.split_first() else {
            return Err(TtsError::NoOutput("no TTS command configured".to_string()));
        };
        run_checked(program, args, None).await?;
        if !output.exists() {
            return Err(TtsError::NoOutput(output.display().to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholders_are_substituted() {
        let tts = CommandSynthesizer::new(vec![
            "uv".into(),
            "run".into(),
            "cli_tty.py".into(),
            "{text}".into(),
            "{output}".into(),
        ]);
        let argv = tts.argv("Hello there.", Path::new("/tmp/out/1.mp3"));
        assert_eq!(argv, vec!["uv", "run", "cli_tty.py", "Hello there.", "/tmp/out/1.mp3"]);
    }

    #[tokio::test]
    async fn missing_engine_is_a_spawn_error() {
        let tts = CommandSynthesizer::new(vec!["eui-no-such-tts".into(), "{text}".into()]);
        let dir = tempfile::tempdir().unwrap();
        let err = tts.synthesize("hi", &dir.path().join("1.mp3")).await.unwrap_err();
        assert!(matches!(err, TtsError::Spawn { .. }));
    }

    #[tokio::test]
    async fn engine_selection_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("1.mp3");

        let mut config = TtsConfig::default();
        config.piper_program = "eui-no-such-piper".into();
        config.command = vec!["eui-no-such-command".into(), "{text}".into(), "{output}".into()];

        config.engine = TtsEngine::Command;
        match from_config(&config).synthesize("hi", &out).await {
            Err(TtsError::Spawn { program, .. }) => assert_eq!(program, "eui-no-such-command"),
            other => panic!("unexpected {other:?}"),
        }

        config.engine = TtsEngine::Piper;
        match from_config(&config).synthesize("hi", &out).await {
            Err(TtsError::Spawn { program, .. }) => assert_eq!(program, "eui-no-such-piper"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
