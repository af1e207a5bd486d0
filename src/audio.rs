use std::fs;
use std::path::{Path, PathBuf};

use hound::WavReader;
use tracing::{error, info, info_span, warn, Instrument};

use crate::error::{EuiError, Result};
use crate::pipeline::StageSummary;
use crate::script::Script;
use crate::tts::SpeechSynthesizer;
use crate::utils::preview;

pub fn wav_duration_seconds(path: &str) -> anyhow::Result<f64> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let samples = reader.len();
    let frames = samples as f64 / spec.channels as f64;
    let duration = frames / spec.sample_rate as f64;
    Ok(duration)
}

/// Path of the audio clip for a scene: `<dir>/<n>.mp3`.
pub fn audio_path(dir: &Path, ordinal: u32) -> PathBuf {
    dir.join(format!("{ordinal}.mp3"))
}

pub struct AudioGenerator<'a> {
    synthesizer: &'a dyn SpeechSynthesizer,
}

impl<'a> AudioGenerator<'a> {
    pub fn new(synthesizer: &'a dyn SpeechSynthesizer) -> Self {
        Self { synthesizer }
    }

    /// Synthesise one clip per scene into `output_dir`. A scene with empty
    /// speech or a failed synthesis is skipped; the rest still run.
    pub async fn generate(&self, script: &Script, output_dir: &Path) -> Result<StageSummary> {
        fs::create_dir_all(output_dir).map_err(|e| EuiError::at(output_dir, e))?;
        let mut summary = StageSummary::default();

        for scene in script.scenes() {
            let target = audio_path(output_dir, scene.ordinal);
            // A stale clip from an earlier run must not survive a failure now.
            if target.exists() {
                fs::remove_file(&target).map_err(|e| EuiError::at(&target, e))?;
            }

            let speech = scene.speech.trim();
            if speech.is_empty() {
                warn!("Scene {} has no speech; no audio generated", scene.ordinal);
                summary.skip(scene.ordinal, "empty speech");
                continue;
            }

            info!(
                "Generating audio {}/{}: \"{}\"",
                scene.ordinal,
                script.len(),
                preview(speech, 60)
            );
            let span = info_span!("scene", n = scene.ordinal);
            match self.synthesizer.synthesize(speech, &target).instrument(span).await {
                Ok(()) => {
                    info!("Audio written to {}", target.display());
                    summary.succeeded.push(scene.ordinal);
                }
                Err(e) => {
                    error!("Failed to generate audio for scene {}: {}", scene.ordinal, e);
                    // Engines may leave a partial file behind.
                    let _ = fs::remove_file(&target);
                    summary.skip(scene.ordinal, e.to_string());
                }
            }
        }
        Ok(summary)
    }
}
